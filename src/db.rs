use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{UploadRecord, UploadStatus};
use crate::store::{blob_path, BlobKind, StoreError, UploadStore};

const COLUMNS: &str = "id, title, source_file, school_name, status, message, grading_scheme, \
     custom_ignore_columns, analysis_summary, processed_file, subject_chart, passrate_chart, \
     reports_zip, uploaded_at, updated_at";

pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed store. Records live in `exam_analytics.uploads`; blob
/// payloads live on the filesystem under `storage_root`, addressed by the
/// relative paths kept on the record.
pub struct PgStore {
    pool: PgPool,
    storage_root: PathBuf,
}

impl PgStore {
    pub fn new(pool: PgPool, storage_root: impl Into<PathBuf>) -> Self {
        PgStore {
            pool,
            storage_root: storage_root.into(),
        }
    }

    fn record_from_row(row: &PgRow) -> Result<UploadRecord, StoreError> {
        let status_text: String = row.get("status");
        let status = UploadStatus::parse(&status_text).ok_or_else(|| {
            StoreError::Other(anyhow::anyhow!("unknown upload status '{status_text}'"))
        })?;
        Ok(UploadRecord {
            id: row.get("id"),
            title: row.get("title"),
            source_file: row.get("source_file"),
            school_name: row.get("school_name"),
            status,
            message: row.get("message"),
            grading_scheme: row.get("grading_scheme"),
            custom_ignore_columns: row.get("custom_ignore_columns"),
            analysis_summary: row.get("analysis_summary"),
            processed_file: row.get("processed_file"),
            subject_chart: row.get("subject_chart"),
            passrate_chart: row.get("passrate_chart"),
            reports_zip: row.get("reports_zip"),
            uploaded_at: row.get("uploaded_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl UploadStore for PgStore {
    async fn insert(&self, record: &UploadRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO exam_analytics.uploads
            (id, title, source_file, school_name, status, message, grading_scheme,
             custom_ignore_columns, analysis_summary, processed_file, subject_chart,
             passrate_chart, reports_zip, uploaded_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(record.id)
        .bind(&record.title)
        .bind(&record.source_file)
        .bind(&record.school_name)
        .bind(record.status.as_str())
        .bind(&record.message)
        .bind(&record.grading_scheme)
        .bind(&record.custom_ignore_columns)
        .bind(&record.analysis_summary)
        .bind(&record.processed_file)
        .bind(&record.subject_chart)
        .bind(&record.passrate_chart)
        .bind(&record.reports_zip)
        .bind(record.uploaded_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .context("failed to insert upload")?;
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<UploadRecord, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM exam_analytics.uploads WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch upload")?;

        match row {
            Some(row) => Self::record_from_row(&row),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn claim_processing(&self, id: Uuid) -> Result<UploadRecord, StoreError> {
        // Single guarded UPDATE so two concurrent claims cannot both win.
        let row = sqlx::query(&format!(
            "UPDATE exam_analytics.uploads \
             SET status = $2, updated_at = now() \
             WHERE id = $1 AND status <> $2 \
             RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(UploadStatus::Processing.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("failed to claim upload")?;

        match row {
            Some(row) => Self::record_from_row(&row),
            None => match self.fetch(id).await {
                Ok(_) => Err(StoreError::AlreadyProcessing(id)),
                Err(err) => Err(err),
            },
        }
    }

    async fn update(&self, record: &UploadRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE exam_analytics.uploads SET
                title = $2, source_file = $3, school_name = $4, status = $5, message = $6,
                grading_scheme = $7, custom_ignore_columns = $8, analysis_summary = $9,
                processed_file = $10, subject_chart = $11, passrate_chart = $12,
                reports_zip = $13, updated_at = $14
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(&record.title)
        .bind(&record.source_file)
        .bind(&record.school_name)
        .bind(record.status.as_str())
        .bind(&record.message)
        .bind(&record.grading_scheme)
        .bind(&record.custom_ignore_columns)
        .bind(&record.analysis_summary)
        .bind(&record.processed_file)
        .bind(&record.subject_chart)
        .bind(&record.passrate_chart)
        .bind(&record.reports_zip)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .context("failed to update upload")?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(record.id));
        }
        Ok(())
    }

    async fn list(&self, limit: i64) -> Result<Vec<UploadRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM exam_analytics.uploads ORDER BY uploaded_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("failed to list uploads")?;

        rows.iter().map(Self::record_from_row).collect()
    }

    async fn read_blob(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let bytes = read_blob_file(&self.storage_root, path).await?;
        Ok(bytes)
    }

    async fn put_blob(
        &self,
        kind: BlobKind,
        filename: &str,
        bytes: &[u8],
    ) -> Result<String, StoreError> {
        let rel = blob_path(kind, filename, Utc::now());
        write_blob_file(&self.storage_root, &rel, bytes).await?;
        Ok(rel)
    }
}

async fn read_blob_file(root: &Path, rel: &str) -> anyhow::Result<Vec<u8>> {
    let full = root.join(rel);
    let bytes = tokio::fs::read(&full)
        .await
        .with_context(|| format!("failed to read blob {}", full.display()))?;
    Ok(bytes)
}

async fn write_blob_file(root: &Path, rel: &str, bytes: &[u8]) -> anyhow::Result<()> {
    let full = root.join(rel);
    if let Some(parent) = full.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create blob directory {}", parent.display()))?;
    }
    tokio::fs::write(&full, bytes)
        .await
        .with_context(|| format!("failed to write blob {}", full.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blob_files_round_trip_under_nested_paths() {
        let dir = tempfile::tempdir().unwrap();
        let rel = "uploads/2026/08/25/marks.csv";

        write_blob_file(dir.path(), rel, b"Name,Math\nAlice,70\n")
            .await
            .unwrap();
        let bytes = read_blob_file(dir.path(), rel).await.unwrap();
        assert_eq!(bytes, b"Name,Math\nAlice,70\n");
    }

    #[tokio::test]
    async fn missing_blob_reads_fail_with_the_path_in_the_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_blob_file(dir.path(), "results/gone.xlsx")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("gone.xlsx"));
    }
}
