//! SQLite record store

use super::{apply_status_transition, AnalysisPage, RecordStore};
use chrono::{DateTime, Utc};
use repolens_core::{
    async_trait, not_found_error, storage_error, AnalysisRecord, AnalysisStatus, FileTreeArtifact,
    FileTreeStatistics, ParsedFile, RepolensResult,
};
use sqlx::{sqlite::SqliteConnectOptions, sqlite::SqlitePoolOptions, Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// SQLite-backed record store
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Connect and create the schema if missing.
    pub async fn new(database_url: &str) -> RepolensResult<Self> {
        info!("Connecting to database: {}", database_url);

        let pool = if database_url.contains(":memory:") {
            // A pooled in-memory database must stay on one connection or
            // every connection sees its own empty database.
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect(database_url)
                .await
                .map_err(|e| storage_error!(format!("Failed to connect to database: {}", e), "sqlite_store", e))?
        } else {
            let path = database_url
                .strip_prefix("sqlite:")
                .unwrap_or(database_url);
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        storage_error!(format!("Failed to create database directory: {}", e), "sqlite_store", e)
                    })?;
                }
            }

            let options = SqliteConnectOptions::from_str(database_url)
                .map_err(|e| storage_error!(format!("Invalid database URL: {}", e), "sqlite_store", e))?
                .create_if_missing(true);

            SqlitePool::connect_with(options)
                .await
                .map_err(|e| storage_error!(format!("Failed to connect to database: {}", e), "sqlite_store", e))?
        };

        Self::create_tables(&pool).await?;
        info!("Database schema ready");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn create_tables(pool: &SqlitePool) -> RepolensResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS analyses (
                id TEXT PRIMARY KEY,
                repository_url TEXT NOT NULL,
                owner TEXT NOT NULL,
                name TEXT NOT NULL,
                branch TEXT NOT NULL,
                commit_sha TEXT,
                status TEXT NOT NULL DEFAULT 'queued',
                options TEXT NOT NULL,
                error TEXT,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| storage_error!(format!("Failed to create analyses table: {}", e), "sqlite_store", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS file_trees (
                analysis_id TEXT PRIMARY KEY REFERENCES analyses(id),
                tree TEXT NOT NULL,
                total_files INTEGER NOT NULL,
                total_directories INTEGER NOT NULL,
                total_lines INTEGER NOT NULL,
                total_size INTEGER NOT NULL,
                language_breakdown TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| storage_error!(format!("Failed to create file_trees table: {}", e), "sqlite_store", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS parsed_files (
                id TEXT PRIMARY KEY,
                analysis_id TEXT NOT NULL REFERENCES analyses(id),
                file_path TEXT NOT NULL,
                language TEXT NOT NULL,
                data TEXT NOT NULL,
                UNIQUE(analysis_id, file_path)
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| storage_error!(format!("Failed to create parsed_files table: {}", e), "sqlite_store", e))?;

        Ok(())
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> RepolensResult<AnalysisRecord> {
        let status_str: String = row
            .try_get("status")
            .map_err(|e| storage_error!(format!("Failed to read status column: {}", e), "sqlite_store", e))?;
        let status = AnalysisStatus::parse(&status_str).unwrap_or(AnalysisStatus::Queued);

        let options_json: String = row
            .try_get("options")
            .map_err(|e| storage_error!(format!("Failed to read options column: {}", e), "sqlite_store", e))?;
        let options = serde_json::from_str(&options_json)
            .map_err(|e| storage_error!(format!("Failed to parse options JSON: {}", e), "sqlite_store", e))?;

        Ok(AnalysisRecord {
            id: row.try_get("id").unwrap_or_default(),
            repository_url: row.try_get("repository_url").unwrap_or_default(),
            owner: row.try_get("owner").unwrap_or_default(),
            name: row.try_get("name").unwrap_or_default(),
            branch: row.try_get("branch").unwrap_or_default(),
            commit_sha: row.try_get("commit_sha").ok().flatten(),
            status,
            options,
            error: row.try_get("error").ok().flatten(),
            created_at: parse_timestamp(row.try_get("created_at").ok())
                .unwrap_or_else(Utc::now),
            started_at: parse_timestamp(row.try_get("started_at").ok().flatten()),
            completed_at: parse_timestamp(row.try_get("completed_at").ok().flatten()),
        })
    }

    async fn write_record(&self, record: &AnalysisRecord) -> RepolensResult<()> {
        let options_json = serde_json::to_string(&record.options)?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO analyses
            (id, repository_url, owner, name, branch, commit_sha, status, options, error, created_at, started_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.repository_url)
        .bind(&record.owner)
        .bind(&record.name)
        .bind(&record.branch)
        .bind(&record.commit_sha)
        .bind(record.status.as_str())
        .bind(options_json)
        .bind(&record.error)
        .bind(record.created_at.to_rfc3339())
        .bind(record.started_at.map(|t| t.to_rfc3339()))
        .bind(record.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error!(format!("Failed to save analysis: {}", e), "sqlite_store", e))?;
        Ok(())
    }
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn create(&self, record: &AnalysisRecord) -> RepolensResult<()> {
        let existing = sqlx::query("SELECT id FROM analyses WHERE id = ?")
            .bind(&record.id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error!(format!("Failed to check for duplicate: {}", e), "sqlite_store", e))?;
        if existing.is_some() {
            return Err(repolens_core::RepolensError::Conflict {
                message: format!("Analysis {} already exists", record.id),
                context: repolens_core::ErrorContext::new("sqlite_store").with_operation("create"),
            });
        }

        self.write_record(record).await?;
        debug!("Saved analysis {} to SQLite store", record.id);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> RepolensResult<Option<AnalysisRecord>> {
        let row = sqlx::query("SELECT * FROM analyses WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error!(format!("Failed to load analysis: {}", e), "sqlite_store", e))?;

        match row {
            Some(row) => Ok(Some(Self::row_to_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_status(
        &self,
        id: &str,
        status: AnalysisStatus,
        error: Option<&str>,
    ) -> RepolensResult<()> {
        // The read, the DAG check and the write serialize inside one
        // transaction; the memory backend holds its write lock across the
        // same span.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error!(format!("Failed to begin transaction: {}", e), "sqlite_store", e))?;

        let row = sqlx::query("SELECT * FROM analyses WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| storage_error!(format!("Failed to load analysis: {}", e), "sqlite_store", e))?
            .ok_or_else(|| not_found_error!(format!("analysis {}", id), "sqlite_store"))?;

        let mut record = Self::row_to_record(&row)?;
        apply_status_transition(&mut record, status, error)?;

        // UPDATE rather than INSERT OR REPLACE: a row deleted since the
        // read stays deleted instead of being resurrected
        let result = sqlx::query(
            "UPDATE analyses SET status = ?, error = ?, started_at = ?, completed_at = ? WHERE id = ?",
        )
        .bind(record.status.as_str())
        .bind(&record.error)
        .bind(record.started_at.map(|t| t.to_rfc3339()))
        .bind(record.completed_at.map(|t| t.to_rfc3339()))
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| storage_error!(format!("Failed to update status: {}", e), "sqlite_store", e))?;

        if result.rows_affected() == 0 {
            return Err(not_found_error!(format!("analysis {}", id), "sqlite_store"));
        }

        tx.commit()
            .await
            .map_err(|e| storage_error!(format!("Failed to commit status update: {}", e), "sqlite_store", e))?;

        debug!(
            "Updated analysis {} status to {} in SQLite store",
            id,
            status.as_str()
        );
        Ok(())
    }

    async fn update_commit_sha(&self, id: &str, sha: &str) -> RepolensResult<()> {
        let result = sqlx::query("UPDATE analyses SET commit_sha = ? WHERE id = ?")
            .bind(sha)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error!(format!("Failed to update commit sha: {}", e), "sqlite_store", e))?;

        if result.rows_affected() == 0 {
            return Err(not_found_error!(format!("analysis {}", id), "sqlite_store"));
        }
        Ok(())
    }

    async fn list(
        &self,
        limit: u32,
        offset: u32,
        status: Option<AnalysisStatus>,
    ) -> RepolensResult<AnalysisPage> {
        let (rows, total_row) = if let Some(status) = status {
            let rows = sqlx::query(
                "SELECT * FROM analyses WHERE status = ? ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            )
            .bind(status.as_str())
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await;
            let total = sqlx::query("SELECT COUNT(*) as count FROM analyses WHERE status = ?")
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await;
            (rows, total)
        } else {
            let rows = sqlx::query(
                "SELECT * FROM analyses ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            )
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await;
            let total = sqlx::query("SELECT COUNT(*) as count FROM analyses")
                .fetch_one(&self.pool)
                .await;
            (rows, total)
        };

        let rows = rows
            .map_err(|e| storage_error!(format!("Failed to list analyses: {}", e), "sqlite_store", e))?;
        let total: i64 = total_row
            .map_err(|e| storage_error!(format!("Failed to count analyses: {}", e), "sqlite_store", e))?
            .try_get("count")
            .unwrap_or(0);

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(Self::row_to_record(row)?);
        }

        Ok(AnalysisPage {
            records,
            total: total as u64,
        })
    }

    async fn delete(&self, id: &str) -> RepolensResult<()> {
        // Dependent rows first; the cascade is explicit so it does not rely
        // on the foreign_keys pragma being enabled per connection, and runs
        // in one transaction so no partial cascade is ever visible.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error!(format!("Failed to begin transaction: {}", e), "sqlite_store", e))?;

        sqlx::query("DELETE FROM parsed_files WHERE analysis_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error!(format!("Failed to delete parsed files: {}", e), "sqlite_store", e))?;
        sqlx::query("DELETE FROM file_trees WHERE analysis_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error!(format!("Failed to delete file tree: {}", e), "sqlite_store", e))?;

        let result = sqlx::query("DELETE FROM analyses WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error!(format!("Failed to delete analysis: {}", e), "sqlite_store", e))?;

        if result.rows_affected() == 0 {
            return Err(not_found_error!(format!("analysis {}", id), "sqlite_store"));
        }

        tx.commit()
            .await
            .map_err(|e| storage_error!(format!("Failed to commit delete: {}", e), "sqlite_store", e))?;

        debug!("Deleted analysis {} from SQLite store", id);
        Ok(())
    }

    async fn save_file_tree(&self, id: &str, artifact: &FileTreeArtifact) -> RepolensResult<()> {
        let tree_json = serde_json::to_string(&artifact.root)?;
        let breakdown_json = serde_json::to_string(&artifact.statistics.language_breakdown)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO file_trees
            (analysis_id, tree, total_files, total_directories, total_lines, total_size, language_breakdown)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(tree_json)
        .bind(artifact.statistics.total_files as i64)
        .bind(artifact.statistics.total_directories as i64)
        .bind(artifact.statistics.total_lines as i64)
        .bind(artifact.statistics.total_size)
        .bind(breakdown_json)
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error!(format!("Failed to save file tree: {}", e), "sqlite_store", e))?;

        Ok(())
    }

    async fn load_file_tree(&self, id: &str) -> RepolensResult<Option<FileTreeArtifact>> {
        let row = sqlx::query("SELECT * FROM file_trees WHERE analysis_id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error!(format!("Failed to load file tree: {}", e), "sqlite_store", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let tree_json: String = row
            .try_get("tree")
            .map_err(|e| storage_error!(format!("Failed to read tree column: {}", e), "sqlite_store", e))?;
        let breakdown_json: String = row
            .try_get("language_breakdown")
            .map_err(|e| storage_error!(format!("Failed to read breakdown column: {}", e), "sqlite_store", e))?;

        Ok(Some(FileTreeArtifact {
            root: serde_json::from_str(&tree_json)?,
            statistics: FileTreeStatistics {
                total_files: row.try_get::<i64, _>("total_files").unwrap_or(0) as u64,
                total_directories: row.try_get::<i64, _>("total_directories").unwrap_or(0) as u64,
                total_lines: row.try_get::<i64, _>("total_lines").unwrap_or(0) as u64,
                total_size: row.try_get("total_size").unwrap_or(0),
                language_breakdown: serde_json::from_str(&breakdown_json)?,
            },
        }))
    }

    async fn save_parsed_files(&self, id: &str, files: &[ParsedFile]) -> RepolensResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error!(format!("Failed to begin transaction: {}", e), "sqlite_store", e))?;

        for file in files {
            let data_json = serde_json::to_string(file)?;
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO parsed_files (id, analysis_id, file_path, language, data)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(id)
            .bind(&file.path)
            .bind(&file.language)
            .bind(data_json)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error!(format!("Failed to save parsed file: {}", e), "sqlite_store", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| storage_error!(format!("Failed to commit parsed files: {}", e), "sqlite_store", e))?;
        Ok(())
    }

    async fn load_parsed_files(&self, id: &str) -> RepolensResult<Vec<ParsedFile>> {
        let rows =
            sqlx::query("SELECT data FROM parsed_files WHERE analysis_id = ? ORDER BY file_path")
                .bind(id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| storage_error!(format!("Failed to load parsed files: {}", e), "sqlite_store", e))?;

        let mut files = Vec::with_capacity(rows.len());
        for row in rows {
            let data_json: String = row.try_get("data").unwrap_or_default();
            files.push(serde_json::from_str(&data_json)?);
        }
        Ok(files)
    }

    async fn find_by_status(&self, status: AnalysisStatus) -> RepolensResult<Vec<AnalysisRecord>> {
        let rows = sqlx::query("SELECT * FROM analyses WHERE status = ? ORDER BY created_at ASC")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage_error!(format!("Failed to query by status: {}", e), "sqlite_store", e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(Self::row_to_record(row)?);
        }
        Ok(records)
    }

    async fn health_check(&self) -> RepolensResult<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| storage_error!(format!("Database health check failed: {}", e), "sqlite_store", e))?;
        Ok(())
    }
}
