use crate::diff::ChangeSet;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use time::UtcDateTime;
use tokio::process::Command;
use tracing::{instrument, trace};

/// Characters replaced by `_` when turning a repository URL into a directory name.
const URL_SEPARATORS: [char; 7] = ['/', ' ', '.', '=', '+', '?', ':'];

/// Directory name (below the fetch directory) used for a repository URL.
///
/// `git://git.example.com/meta-foo` becomes `git___git_example_com_meta-foo`.
pub fn fetch_dir_name(url: &str) -> String {
    url.chars().map(|c| if URL_SEPARATORS.contains(&c) { '_' } else { c }).collect()
}

/// The `git` executable.
#[derive(Debug, Clone)]
pub struct Git {
    binary: PathBuf,
}
impl Git {
    /// Find `git` on `PATH`.
    pub fn discover() -> Result<Self> {
        let binary = which::which("git").or_raise(|| ErrorKind::GitNotFound)?;
        trace!(git = %binary.display(), "discovered git executable");
        Ok(Self { binary })
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    /// Clone `url` into `dest`, which must not exist yet.
    #[instrument(skip(self, dest), fields(dest = %dest.display()))]
    pub async fn clone_repository(&self, url: &str, dest: &Path) -> Result<Repository> {
        self.run(None, [OsStr::new("clone"), OsStr::new(url), dest.as_os_str()]).await?;
        Ok(self.open(dest))
    }

    /// A handle on an existing checkout; nothing is verified until it is used.
    pub fn open(&self, path: impl Into<PathBuf>) -> Repository {
        Repository { git: self.clone(), path: path.into() }
    }

    async fn run<I, S>(&self, cwd: Option<&Path>, args: I) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
        let mut command = Command::new(&self.binary);
        command
            .args(&args)
            // Never wait for credentials on a terminal nobody is watching.
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }
        trace!(?args, "running git");
        let output = command.output().await.or_raise(|| ErrorKind::Spawn)?;
        if !output.status.success() {
            exn::bail!(ErrorKind::Command {
                args: args.iter().map(|a| a.to_string_lossy()).collect::<Vec<_>>().join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

/// A local checkout.
#[derive(Debug, Clone)]
pub struct Repository {
    git: Git,
    path: PathBuf,
}
impl Repository {
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn run<I, S>(&self, args: I) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.git.run(Some(&self.path), args).await
    }

    async fn run_text<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let stdout = self.run(args).await?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    #[instrument(skip(self), fields(repo = %self.path.display()))]
    pub async fn fetch(&self) -> Result<()> {
        self.run(["fetch"]).await?;
        Ok(())
    }

    /// Check out `rev` (detached) in the working tree.
    #[instrument(skip(self), fields(repo = %self.path.display()))]
    pub async fn checkout(&self, rev: &str) -> Result<()> {
        self.run(["checkout", "-q", rev]).await?;
        Ok(())
    }

    /// Remove untracked and ignored files from the working tree.
    pub async fn clean(&self) -> Result<()> {
        self.run(["clean", "-q", "-f", "-x"]).await?;
        Ok(())
    }

    /// Full hash of the commit `rev` points to, or `None` if it does not exist.
    pub async fn resolve(&self, rev: &str) -> Result<Option<String>> {
        match self.run_text(["rev-parse", "--verify", "-q", &format!("{rev}^{{commit}}")]).await {
            Ok(hash) if !hash.is_empty() => Ok(Some(hash)),
            Ok(_) => Ok(None),
            Err(err) if matches!(&*err, ErrorKind::Command { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Most recent commit reachable from `rev` that touched `subdir`.
    pub async fn last_commit_touching(&self, rev: &str, subdir: &str) -> Result<Option<String>> {
        let hash = self.run_text(["log", "-1", "--format=%H", rev, "--", subdir]).await?;
        Ok(Some(hash).filter(|h| !h.is_empty()))
    }

    /// Committer date of `rev`.
    pub async fn commit_time(&self, rev: &str) -> Result<UtcDateTime> {
        let text = self.run_text(["show", "-s", "--format=%ct", rev]).await?;
        let seconds = text.parse::<i64>().or_raise(|| ErrorKind::InvalidOutput("commit timestamp"))?;
        UtcDateTime::from_unix_timestamp(seconds).or_raise(|| ErrorKind::InvalidOutput("commit timestamp"))
    }

    /// Paths that differ between two revisions, rename detection off.
    #[instrument(skip(self), fields(repo = %self.path.display()))]
    pub async fn diff(&self, old: &str, new: &str) -> Result<ChangeSet> {
        let output = self.run(["diff", "--name-status", "--no-renames", "-z", old, new]).await?;
        ChangeSet::from_name_status(&output)
    }
}
