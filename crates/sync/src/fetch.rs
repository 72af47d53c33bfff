//! Repository Fetcher: keeps one local clone per repository URL.

use layersync_vcs::{Git, Repository, fetch_dir_name};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

#[derive(Debug, Clone)]
pub struct Fetcher {
    git: Git,
    fetch_dir: PathBuf,
}

/// Which repository URLs were brought up to date in this run.
///
/// Failures are tracked per URL: several layers may live in one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub fetched: BTreeSet<String>,
    pub failed: BTreeSet<String>,
}
impl FetchReport {
    pub fn is_failed(&self, url: &str) -> bool {
        self.failed.contains(url)
    }
}

impl Fetcher {
    pub fn new(git: Git, fetch_dir: impl Into<PathBuf>) -> Self {
        Self { git, fetch_dir: fetch_dir.into() }
    }

    pub fn git(&self) -> &Git {
        &self.git
    }

    /// The local checkout of `url`, whether or not it has been cloned yet.
    pub fn repository(&self, url: &str) -> Repository {
        self.git.open(self.fetch_dir.join(fetch_dir_name(url)))
    }

    /// Clone `url` into `dest` if it is absent, otherwise fetch.
    #[instrument(skip(self, dest), fields(dest = %dest.display()))]
    pub async fn fetch_into(&self, url: &str, dest: &Path) -> layersync_vcs::error::Result<Repository> {
        if dest.exists() {
            let repository = self.git.open(dest);
            repository.fetch().await?;
            Ok(repository)
        } else {
            self.git.clone_repository(url, dest).await
        }
    }

    /// Fetch every distinct URL once, stopping early when cancelled.
    pub async fn fetch_all<'a>(&self, urls: impl IntoIterator<Item = &'a str>, cancel: &CancellationToken) -> FetchReport {
        let mut report = FetchReport::default();
        for url in urls {
            if cancel.is_cancelled() {
                break;
            }
            if report.fetched.contains(url) || report.failed.contains(url) {
                continue;
            }
            info!(url, "fetching remote repository");
            let dest = self.fetch_dir.join(fetch_dir_name(url));
            match self.fetch_into(url, &dest).await {
                Ok(_) => {
                    report.fetched.insert(url.to_string());
                },
                Err(err) => {
                    error!(url, error = ?err, "fetch failed; layers in this repository will be skipped");
                    report.failed.insert(url.to_string());
                },
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{commit_all, init_repo, write};

    #[tokio::test]
    async fn test_fetch_all_records_failures_per_url() {
        let Ok(git) = Git::discover() else { return };
        let source = tempfile::tempdir().unwrap();
        init_repo(source.path());
        write(source.path(), "README", "layer\n");
        commit_all(source.path(), "init");
        let fetch_dir = tempfile::tempdir().unwrap();
        let fetcher = Fetcher::new(git, fetch_dir.path());

        let good = source.path().to_string_lossy().into_owned();
        let bad = fetch_dir.path().join("does-not-exist").to_string_lossy().into_owned();
        let urls = [good.as_str(), bad.as_str(), good.as_str()];
        let report = fetcher.fetch_all(urls, &CancellationToken::new()).await;
        assert_eq!(report.fetched.len(), 1);
        assert!(report.is_failed(&bad));
        assert!(fetcher.repository(&good).path().join("README").exists());

        // A second pass fetches into the existing clone.
        let report = fetcher.fetch_all([good.as_str()], &CancellationToken::new()).await;
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_all_stops_when_cancelled() {
        let fetch_dir = tempfile::tempdir().unwrap();
        let fetcher = Fetcher::new(Git::with_binary("git"), fetch_dir.path());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = fetcher.fetch_all(["git://example.invalid/meta-foo"], &cancel).await;
        assert_eq!(report, FetchReport::default());
    }
}
