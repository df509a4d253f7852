//! Shared test helpers: an app wired to an in-memory store and a
//! fixture-backed fetcher.

use repolens_core::{async_trait, RepolensConfig, RepolensError, RepolensResult};
use repolens_engine::{AnalysisService, MemoryRecordStore};
use repolens_fetcher::{RepositoryFetcher, RepositoryMetadata, WorkingCopy};
use repolens_web::AppState;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Fetcher that materializes copies of a fixture directory instead of
/// talking to a remote host.
pub struct StubFetcher {
    fixture: PathBuf,
    scratch: PathBuf,
    counter: AtomicU64,
}

impl StubFetcher {
    pub fn new(fixture: PathBuf, scratch: PathBuf) -> Self {
        Self {
            fixture,
            scratch,
            counter: AtomicU64::new(0),
        }
    }

    fn copy_dir(src: &Path, dst: &Path) {
        std::fs::create_dir_all(dst).unwrap();
        for entry in std::fs::read_dir(src).unwrap() {
            let entry = entry.unwrap();
            let target = dst.join(entry.file_name());
            if entry.file_type().unwrap().is_dir() {
                Self::copy_dir(&entry.path(), &target);
            } else {
                std::fs::copy(entry.path(), target).unwrap();
            }
        }
    }
}

#[async_trait]
impl RepositoryFetcher for StubFetcher {
    async fn fetch_metadata(&self, _owner: &str, name: &str) -> RepolensResult<RepositoryMetadata> {
        Ok(RepositoryMetadata {
            name: name.to_string(),
            description: None,
            default_branch: "main".to_string(),
            size_kb: Some(4),
            private: false,
        })
    }

    async fn resolve_commit(
        &self,
        _owner: &str,
        _name: &str,
        _branch: &str,
    ) -> RepolensResult<String> {
        Ok("stubsha".to_string())
    }

    async fn materialize(&self, _url: &str, branch: &str) -> RepolensResult<WorkingCopy> {
        let serial = self.counter.fetch_add(1, Ordering::SeqCst);
        let target = self.scratch.join(format!("copy-{}", serial));
        Self::copy_dir(&self.fixture, &target);
        Ok(WorkingCopy {
            local_path: target,
            commit_sha: "stubsha".to_string(),
            branch: branch.to_string(),
            cloned_at: chrono::Utc::now(),
        })
    }

    async fn dispose(&self, copy: &WorkingCopy) -> RepolensResult<()> {
        match std::fs::remove_dir_all(&copy.local_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RepolensError::Io(e)),
        }
    }
}

/// Keeps the fixture directories alive for the duration of a test.
pub struct TestContext {
    pub state: AppState,
    _fixture: TempDir,
    _scratch: TempDir,
}

pub async fn test_context(config: RepolensConfig) -> TestContext {
    let fixture = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();

    std::fs::write(
        fixture.path().join("a.ts"),
        "export function hello(): void {}\n",
    )
    .unwrap();
    std::fs::write(fixture.path().join("b.py"), "def run():\n    pass\n").unwrap();

    let store = Arc::new(MemoryRecordStore::new());
    let fetcher = Arc::new(StubFetcher::new(
        fixture.path().to_path_buf(),
        scratch.path().to_path_buf(),
    ));
    let service = AnalysisService::new(config.clone(), store, fetcher);

    TestContext {
        state: AppState::new(config, service),
        _fixture: fixture,
        _scratch: scratch,
    }
}

pub async fn default_context() -> TestContext {
    test_context(RepolensConfig::default()).await
}
