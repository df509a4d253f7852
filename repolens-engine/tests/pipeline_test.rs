//! End-to-end pipeline tests against a fixture working copy

use repolens_core::{async_trait, AnalysisStatus, ErrorContext, RepolensError, RepolensResult};
use repolens_engine::{AnalysisService, MemoryRecordStore};
use repolens_fetcher::{RepositoryFetcher, RepositoryMetadata, WorkingCopy};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::Duration;

/// Fetcher that materializes copies of a local fixture directory.
struct FixtureFetcher {
    fixture: PathBuf,
    scratch: PathBuf,
    fail_metadata: bool,
}

impl FixtureFetcher {
    fn new(fixture: PathBuf, scratch: PathBuf) -> Self {
        Self {
            fixture,
            scratch,
            fail_metadata: false,
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
impl RepositoryFetcher for FixtureFetcher {
    async fn fetch_metadata(&self, _owner: &str, name: &str) -> RepolensResult<RepositoryMetadata> {
        if self.fail_metadata {
            return Err(RepolensError::NotFound {
                resource: format!("repository acme/{}", name),
                context: ErrorContext::new("fixture_fetcher"),
            });
        }
        Ok(RepositoryMetadata {
            name: name.to_string(),
            description: None,
            default_branch: "main".to_string(),
            size_kb: Some(16),
            private: false,
        })
    }

    async fn resolve_commit(
        &self,
        _owner: &str,
        _name: &str,
        _branch: &str,
    ) -> RepolensResult<String> {
        Ok("fixturesha".to_string())
    }

    async fn materialize(&self, _url: &str, branch: &str) -> RepolensResult<WorkingCopy> {
        let target = self.scratch.join(uuid::Uuid::new_v4().simple().to_string());
        Self::copy_dir(&self.fixture, &target);
        Ok(WorkingCopy {
            local_path: target,
            commit_sha: "fixturesha".to_string(),
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

fn write_fixture(root: &Path) {
    std::fs::create_dir_all(root.join("node_modules")).unwrap();
    std::fs::write(
        root.join("a.ts"),
        "import { x } from \"./b\";\n\nexport function hello(name: string): string {\n    return name;\n}\n\nexport class Greeter {\n    greet(): void {}\n}\n",
    )
    .unwrap();
    std::fs::write(
        root.join("b.py"),
        "import os\n\ndef run(path):\n    return os.listdir(path)\n",
    )
    .unwrap();
    std::fs::write(root.join("node_modules/ignored.js"), "module.exports = 1;\n").unwrap();
}

async fn wait_for_terminal(service: &AnalysisService, id: &str) -> AnalysisStatus {
    // Generous deadline: a failing job retries twice with backoff before
    // its terminal transition
    for _ in 0..1500 {
        let (record, _) = service.status(id).await.unwrap();
        if record.status.is_terminal() {
            return record.status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("analysis {} never reached a terminal status", id);
}

fn test_config() -> repolens_core::RepolensConfig {
    repolens_core::RepolensConfig {
        queue_concurrency: 2,
        job_timeout_ms: 30_000,
        ..Default::default()
    }
}

#[tokio::test]
async fn happy_path_produces_tree_and_parsed_files() {
    let fixture_dir = tempfile::tempdir().unwrap();
    let scratch_dir = tempfile::tempdir().unwrap();
    write_fixture(fixture_dir.path());

    let store = Arc::new(MemoryRecordStore::new());
    let fetcher = Arc::new(FixtureFetcher::new(
        fixture_dir.path().to_path_buf(),
        scratch_dir.path().to_path_buf(),
    ));
    let service = AnalysisService::new(test_config(), store, fetcher);

    let record = service
        .submit("https://github.com/acme/widgets", None, None)
        .await
        .unwrap();
    assert_eq!(record.status, AnalysisStatus::Queued);
    assert_eq!(record.branch, "main");

    let status = wait_for_terminal(&service, &record.id).await;
    assert_eq!(status, AnalysisStatus::Completed);

    let (record, _) = service.status(&record.id).await.unwrap();
    assert_eq!(record.commit_sha.as_deref(), Some("fixturesha"));
    assert!(record.started_at.is_some());
    assert!(record.completed_at.is_some());
    assert!(record.error.is_none());

    // Exactly a.ts and b.py survive the walk; node_modules is skipped
    let artifact = service.file_tree(&record.id).await.unwrap();
    assert_eq!(artifact.statistics.total_files, 2);
    assert_eq!(artifact.statistics.language_breakdown["typescript"], 1);
    assert_eq!(artifact.statistics.language_breakdown["python"], 1);

    let parsed = service.parsed_files(&record.id).await.unwrap();
    assert_eq!(parsed.len(), 2);

    let a_ts = parsed.iter().find(|p| p.path == "a.ts").unwrap();
    assert_eq!(a_ts.imports.len(), 1);
    assert_eq!(a_ts.functions.len(), 1);
    assert_eq!(a_ts.classes.len(), 1);
    assert!(a_ts.exports.iter().any(|e| e.name == "hello"));

    // Every working copy was reclaimed
    let leftovers: Vec<_> = std::fs::read_dir(scratch_dir.path()).unwrap().collect();
    assert!(leftovers.is_empty(), "working copies were not disposed");
}

#[tokio::test]
async fn metadata_failure_marks_record_failed_without_artifact() {
    let fixture_dir = tempfile::tempdir().unwrap();
    let scratch_dir = tempfile::tempdir().unwrap();
    write_fixture(fixture_dir.path());

    let mut fetcher = FixtureFetcher::new(
        fixture_dir.path().to_path_buf(),
        scratch_dir.path().to_path_buf(),
    );
    fetcher.fail_metadata = true;

    let store = Arc::new(MemoryRecordStore::new());
    let service = AnalysisService::new(test_config(), store, Arc::new(fetcher));

    // Branch is supplied so intake does not need remote metadata
    let record = service
        .submit(
            "https://github.com/acme/missing",
            Some("main".to_string()),
            None,
        )
        .await
        .unwrap();

    let status = wait_for_terminal(&service, &record.id).await;
    assert_eq!(status, AnalysisStatus::Failed);

    let (record, _) = service.status(&record.id).await.unwrap();
    let error = record.error.unwrap();
    assert!(error.contains("missing"), "unexpected error: {}", error);

    assert!(service.file_tree(&record.id).await.is_err());
}

#[tokio::test]
async fn delete_cancels_queued_work_and_removes_artifacts() {
    let fixture_dir = tempfile::tempdir().unwrap();
    let scratch_dir = tempfile::tempdir().unwrap();
    write_fixture(fixture_dir.path());

    let store = Arc::new(MemoryRecordStore::new());
    let fetcher = Arc::new(FixtureFetcher::new(
        fixture_dir.path().to_path_buf(),
        scratch_dir.path().to_path_buf(),
    ));
    let service = AnalysisService::new(test_config(), store, fetcher);

    let record = service
        .submit("https://github.com/acme/widgets", None, None)
        .await
        .unwrap();
    wait_for_terminal(&service, &record.id).await;

    service.delete(&record.id).await.unwrap();
    assert!(service.status(&record.id).await.is_err());
    // Idempotence at the boundary: a second delete reports not-found
    assert!(service.delete(&record.id).await.is_err());
}

#[tokio::test]
async fn same_url_twice_yields_two_distinct_analyses() {
    let fixture_dir = tempfile::tempdir().unwrap();
    let scratch_dir = tempfile::tempdir().unwrap();
    write_fixture(fixture_dir.path());

    let store = Arc::new(MemoryRecordStore::new());
    let fetcher = Arc::new(FixtureFetcher::new(
        fixture_dir.path().to_path_buf(),
        scratch_dir.path().to_path_buf(),
    ));
    let service = AnalysisService::new(test_config(), store, fetcher);

    let first = service
        .submit("https://github.com/acme/widgets", None, None)
        .await
        .unwrap();
    let second = service
        .submit("https://github.com/acme/widgets", None, None)
        .await
        .unwrap();
    assert_ne!(first.id, second.id);

    assert_eq!(wait_for_terminal(&service, &first.id).await, AnalysisStatus::Completed);
    assert_eq!(wait_for_terminal(&service, &second.id).await, AnalysisStatus::Completed);
}

#[tokio::test]
async fn invalid_url_is_rejected_at_intake() {
    let store = Arc::new(MemoryRecordStore::new());
    let fixture_dir = tempfile::tempdir().unwrap();
    let scratch_dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(FixtureFetcher::new(
        fixture_dir.path().to_path_buf(),
        scratch_dir.path().to_path_buf(),
    ));
    let service = AnalysisService::new(test_config(), store, fetcher);

    let result = service.submit("https://example.com/x", None, None).await;
    assert!(matches!(
        result,
        Err(RepolensError::Validation { .. })
    ));
}
