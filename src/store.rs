use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::UploadRecord;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("upload {0} not found")]
    NotFound(Uuid),
    #[error("upload {0} is already being processed")]
    AlreadyProcessing(Uuid),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
    Upload,
    Result,
    Chart,
    Report,
}

impl BlobKind {
    fn dir(self) -> &'static str {
        match self {
            BlobKind::Upload => "uploads",
            BlobKind::Result => "results",
            BlobKind::Chart => "charts",
            BlobKind::Report => "reports",
        }
    }

    fn dated(self) -> bool {
        !matches!(self, BlobKind::Chart)
    }
}

/// Storage-relative path for a new blob. Uploads, results and report archives
/// land under dated subdirectories (`uploads/2026/08/25/marks.csv`); charts
/// live flat under `charts/`. Path separators in the filename (titles are
/// user text) are flattened so blobs cannot escape their directory.
pub fn blob_path(kind: BlobKind, filename: &str, now: DateTime<Utc>) -> String {
    let filename = filename.replace(['/', '\\'], "_");
    if kind.dated() {
        format!("{}/{}/{}", kind.dir(), now.format("%Y/%m/%d"), filename)
    } else {
        format!("{}/{}", kind.dir(), filename)
    }
}

/// Persistence seam for upload records and their blobs. The pipeline only
/// talks to this trait; Postgres backs it in production and an in-memory
/// implementation backs the tests.
#[async_trait]
pub trait UploadStore: Send + Sync {
    async fn insert(&self, record: &UploadRecord) -> Result<(), StoreError>;

    async fn fetch(&self, id: Uuid) -> Result<UploadRecord, StoreError>;

    /// Atomically move a non-Processing upload into Processing and return the
    /// claimed record. A record already in Processing is rejected with
    /// `AlreadyProcessing`; this is the mutual exclusion for concurrent runs
    /// and retries.
    async fn claim_processing(&self, id: Uuid) -> Result<UploadRecord, StoreError>;

    async fn update(&self, record: &UploadRecord) -> Result<(), StoreError>;

    /// Newest first.
    async fn list(&self, limit: i64) -> Result<Vec<UploadRecord>, StoreError>;

    async fn read_blob(&self, path: &str) -> Result<Vec<u8>, StoreError>;

    /// Persist a blob and return its storage-relative path.
    async fn put_blob(
        &self,
        kind: BlobKind,
        filename: &str,
        bytes: &[u8],
    ) -> Result<String, StoreError>;
}

#[cfg(test)]
pub mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::models::UploadStatus;

    /// In-memory store for pipeline tests. The claim applies the same
    /// check-and-set rule as the SQL implementation.
    #[derive(Default)]
    pub struct MemStore {
        records: Mutex<HashMap<Uuid, UploadRecord>>,
        blobs: Mutex<HashMap<String, Vec<u8>>>,
        fail_artifact_blobs: bool,
    }

    impl MemStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// A store whose chart and report blob saves fail, for exercising the
        /// soft-stage boundaries.
        pub fn failing_artifacts() -> Self {
            MemStore {
                fail_artifact_blobs: true,
                ..Default::default()
            }
        }

        pub fn blob(&self, path: &str) -> Option<Vec<u8>> {
            self.blobs.lock().unwrap().get(path).cloned()
        }
    }

    #[async_trait]
    impl UploadStore for MemStore {
        async fn insert(&self, record: &UploadRecord) -> Result<(), StoreError> {
            self.records
                .lock()
                .unwrap()
                .insert(record.id, record.clone());
            Ok(())
        }

        async fn fetch(&self, id: Uuid) -> Result<UploadRecord, StoreError> {
            self.records
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .ok_or(StoreError::NotFound(id))
        }

        async fn claim_processing(&self, id: Uuid) -> Result<UploadRecord, StoreError> {
            let mut records = self.records.lock().unwrap();
            let record = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            if record.status == UploadStatus::Processing {
                return Err(StoreError::AlreadyProcessing(id));
            }
            record.status = UploadStatus::Processing;
            record.updated_at = Utc::now();
            Ok(record.clone())
        }

        async fn update(&self, record: &UploadRecord) -> Result<(), StoreError> {
            let mut records = self.records.lock().unwrap();
            if !records.contains_key(&record.id) {
                return Err(StoreError::NotFound(record.id));
            }
            records.insert(record.id, record.clone());
            Ok(())
        }

        async fn list(&self, limit: i64) -> Result<Vec<UploadRecord>, StoreError> {
            let records = self.records.lock().unwrap();
            let mut all: Vec<UploadRecord> = records.values().cloned().collect();
            all.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
            all.truncate(limit as usize);
            Ok(all)
        }

        async fn read_blob(&self, path: &str) -> Result<Vec<u8>, StoreError> {
            self.blobs
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| StoreError::Other(anyhow::anyhow!("blob {path} not found")))
        }

        async fn put_blob(
            &self,
            kind: BlobKind,
            filename: &str,
            bytes: &[u8],
        ) -> Result<String, StoreError> {
            if self.fail_artifact_blobs && matches!(kind, BlobKind::Chart | BlobKind::Report) {
                return Err(StoreError::Other(anyhow::anyhow!(
                    "blob store rejected {filename} (injected)"
                )));
            }
            let path = blob_path(kind, filename, Utc::now());
            self.blobs
                .lock()
                .unwrap()
                .insert(path.clone(), bytes.to_vec());
            Ok(path)
        }
    }
}
