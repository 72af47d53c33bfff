//! Settings for a layersync run.
//!
//! Sources are layered, later ones winning:
//!
//! 1. built-in defaults,
//! 2. a configuration file (TOML, YAML or JSON by extension), either given
//!    explicitly or found in the platform configuration directory,
//! 3. environment variables prefixed `LAYERSYNC_`, with `__` separating
//!    nested keys (`LAYERSYNC_LOCK__TIMEOUT_SECS=60`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const ENV_PREFIX: &str = "LAYERSYNC_";
const CONFIG_FILE: &str = "layersync.toml";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "layerindex", "layersync")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite database file.
    pub database: PathBuf,
    /// Directory layer repositories are cloned into; also holds the run lock.
    pub fetch_dir: PathBuf,
    /// Branch used when none is given, and the preferred source when seeding
    /// a layer branch that has never been indexed.
    pub default_branch: String,
    pub lock: LockSettings,
    pub toolkit: ToolkitSettings,
}
impl Default for Settings {
    fn default() -> Self {
        let (database, fetch_dir) = match project_dirs() {
            Some(dirs) => (dirs.data_dir().join("layerindex.db"), dirs.cache_dir().join("layers")),
            None => (PathBuf::from("layerindex.db"), PathBuf::from("layers")),
        };
        Self {
            database,
            fetch_dir,
            default_branch: "master".to_string(),
            lock: LockSettings::default(),
            toolkit: ToolkitSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    pub timeout_secs: u64,
}
impl LockSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
impl Default for LockSettings {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// The repository holding the parser toolkit's base configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolkitSettings {
    pub url: String,
    /// Directory name below `fetch_dir`.
    pub name: String,
}
impl Default for ToolkitSettings {
    fn default() -> Self {
        Self { url: "git://git.openembedded.org/bitbake".to_string(), name: "bitbake".to_string() }
    }
}

impl Settings {
    /// Load settings from every source.
    ///
    /// An explicit `path` must exist; the platform default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        match path {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
                }
                figment = merge_file(figment, path);
            },
            None => {
                let default = project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE));
                if let Some(default) = default
                    && default.is_file()
                {
                    figment = merge_file(figment, &default);
                }
            },
        }
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extract and validate settings from an already assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let settings: Settings = figment.extract().or_raise(|| ErrorKind::Load)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("database"));
        }
        if self.fetch_dir.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("fetch_dir"));
        }
        if self.default_branch.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("default_branch"));
        }
        if self.lock.timeout_secs == 0 {
            exn::bail!(ErrorKind::Invalid("lock.timeout_secs"));
        }
        if self.toolkit.url.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("toolkit.url"));
        }
        if self.toolkit.name.is_empty() || self.toolkit.name.contains(['/', '\\']) || self.toolkit.name == ".." {
            exn::bail!(ErrorKind::Invalid("toolkit.name"));
        }
        Ok(())
    }

    /// Where the toolkit repository is checked out.
    pub fn toolkit_dir(&self) -> PathBuf {
        self.fetch_dir.join(&self.toolkit.name)
    }

    /// The run lock file.
    pub fn lock_file(&self) -> PathBuf {
        self.fetch_dir.join("layerindex.lock")
    }
}

fn merge_file(figment: Figment, path: &Path) -> Figment {
    debug!(path = %path.display(), "loading configuration file");
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
        Some("json") => figment.merge(Json::file_exact(path)),
        _ => figment.merge(Toml::file_exact(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;

    fn from_toml(toml: &str) -> Result<Settings> {
        Settings::from_figment(Figment::from(Serialized::defaults(Settings::default())).merge(Toml::string(toml)))
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.default_branch, "master");
        assert_eq!(settings.lock.timeout(), Duration::from_secs(30));
        assert_eq!(settings.toolkit_dir(), settings.fetch_dir.join("bitbake"));
        assert_eq!(settings.lock_file(), settings.fetch_dir.join("layerindex.lock"));
    }

    #[test]
    fn test_file_overrides_defaults() {
        let settings = from_toml(
            r#"
            database = "/srv/index.db"
            fetch_dir = "/srv/layers"

            [lock]
            timeout_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(settings.database, PathBuf::from("/srv/index.db"));
        assert_eq!(settings.fetch_dir, PathBuf::from("/srv/layers"));
        assert_eq!(settings.lock.timeout_secs, 5);
        assert_eq!(settings.toolkit, ToolkitSettings::default());
    }

    #[rstest]
    #[case("fetch_dir = \"\"", "fetch_dir")]
    #[case("database = \"\"", "database")]
    #[case("default_branch = \"  \"", "default_branch")]
    #[case("[lock]\ntimeout_secs = 0", "lock.timeout_secs")]
    #[case("[toolkit]\nname = \"a/b\"", "toolkit.name")]
    #[case("[toolkit]\nurl = \"\"", "toolkit.url")]
    fn test_invalid_settings(#[case] toml: &str, #[case] field: &'static str) {
        let err = from_toml(toml).unwrap_err();
        assert_eq!(*err, ErrorKind::Invalid(field));
    }

    #[test]
    fn test_wrong_type_fails_to_load() {
        let err = from_toml("[lock]\ntimeout_secs = \"soon\"").unwrap_err();
        assert_eq!(*err, ErrorKind::Load);
    }

    #[test]
    fn test_explicit_file_formats() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("settings.yaml");
        fs::write(&yaml, "default_branch: kirkstone\n").unwrap();
        assert_eq!(Settings::load(Some(&yaml)).unwrap().default_branch, "kirkstone");

        let json = dir.path().join("settings.json");
        fs::write(&json, r#"{"toolkit": {"name": "bb"}}"#).unwrap();
        assert_eq!(Settings::load(Some(&json)).unwrap().toolkit.name, "bb");
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = Settings::load(Some(&missing)).unwrap_err();
        assert_eq!(*err, ErrorKind::NotFound(missing));
    }
}
