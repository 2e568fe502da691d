use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregate;
use crate::charts;
use crate::columns;
use crate::error::AnalysisError;
use crate::grading::GradingScheme;
use crate::models::{UploadRecord, UploadStatus};
use crate::report;
use crate::store::{BlobKind, StoreError, UploadStore};
use crate::table;
use crate::workbook;

/// Claim the upload, run the analysis and persist the terminal state.
///
/// Claiming moves any non-Processing record into Processing; a record already
/// being processed is rejected before any work happens. Analysis errors land
/// on the record as a Failed status with the error text as the user-facing
/// message; only store failures propagate to the caller.
pub async fn process_upload(
    store: &dyn UploadStore,
    id: Uuid,
) -> Result<UploadRecord, StoreError> {
    let mut record = store.claim_processing(id).await?;
    info!(upload = %record.id, title = %record.title, "processing upload");

    match run_analysis(store, &mut record).await {
        Ok(()) => {
            record.status = UploadStatus::Completed;
            info!(upload = %record.id, "analysis completed");
        }
        Err(err) => {
            record.status = UploadStatus::Failed;
            record.message = err.to_string();
            warn!(upload = %record.id, error = %err, "analysis failed");
        }
    }

    record.updated_at = Utc::now();
    store.update(&record).await?;
    Ok(record)
}

async fn run_analysis(
    store: &dyn UploadStore,
    record: &mut UploadRecord,
) -> anyhow::Result<()> {
    let source = store.read_blob(&record.source_file).await?;
    let parsed = table::parse_table(&record.source_file, &source)?;

    let ignores = columns::parse_custom_ignores(record.custom_ignore_columns.as_deref());
    let subject_cols = columns::subject_columns(&parsed, &ignores)?;
    let name_col = columns::name_column(&parsed);
    let id_col = columns::id_column(&parsed);
    let scheme = GradingScheme::parse(record.grading_scheme.as_deref());

    let agg = aggregate::aggregate(&parsed, &subject_cols, name_col, &scheme);

    // Core artifact: the run fails if the workbook cannot be built or saved.
    let bytes = workbook::build_workbook(&parsed, &agg, &subject_cols)?;
    let filename = format!("Results_{}.xlsx", record.title);
    let path = store.put_blob(BlobKind::Result, &filename, &bytes).await?;
    record.processed_file = Some(path);

    // Soft artifacts: a failure leaves the reference empty and the run alive.
    record.subject_chart = save_soft(
        store,
        BlobKind::Chart,
        format!("{}_subject_chart.png", record.title),
        charts::subject_chart(&record.title, &agg.subject_stats),
        "subject chart",
    )
    .await;
    record.passrate_chart = save_soft(
        store,
        BlobKind::Chart,
        format!("{}_passrate_chart.png", record.title),
        charts::passrate_chart(&record.title, agg.summary.pass_rate),
        "pass-rate chart",
    )
    .await;
    record.reports_zip = save_soft(
        store,
        BlobKind::Report,
        format!("Reports_{}.zip", record.title),
        report::build_reports_zip(
            &parsed,
            &agg,
            &subject_cols,
            name_col,
            id_col,
            &scheme,
            &record.title,
            record.school_name.as_deref(),
        ),
        "report archive",
    )
    .await;

    record.analysis_summary = Some(serde_json::to_string(&agg.summary_payload())?);
    record.message = format!(
        "Analysis Ready! \nBest Subject: {} ({:.1})",
        agg.summary.best_subject, agg.summary.best_subject_mean
    );
    Ok(())
}

/// Soft-stage boundary: any error becomes a warning and a missing artifact.
async fn save_soft(
    store: &dyn UploadStore,
    kind: BlobKind,
    filename: String,
    artifact: Result<Vec<u8>, AnalysisError>,
    stage: &str,
) -> Option<String> {
    let bytes = match artifact {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(stage, error = %err, "stage skipped");
            return None;
        }
    };
    match store.put_blob(kind, &filename, &bytes).await {
        Ok(path) => Some(path),
        Err(err) => {
            warn!(stage, error = %err, "artifact not saved");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnalysisSummary;
    use crate::store::testing::MemStore;
    use std::io::Cursor;

    const SAMPLE_CSV: &str = "\
Name,Math,English,AdmNo
Alice,80,70,101
Bob,40,50,102
Carol,60,60,103
";

    async fn seed(store: &MemStore, csv: &str, filename: &str) -> Uuid {
        let path = store
            .put_blob(BlobKind::Upload, filename, csv.as_bytes())
            .await
            .unwrap();
        let record = UploadRecord::new(Uuid::new_v4(), "Term 2 Exam".to_string(), path);
        store.insert(&record).await.unwrap();
        record.id
    }

    #[tokio::test]
    async fn pipeline_completes_and_saves_all_artifacts() {
        let store = MemStore::new();
        let id = seed(&store, SAMPLE_CSV, "marks.csv").await;

        let record = process_upload(&store, id).await.unwrap();
        assert_eq!(record.status, UploadStatus::Completed);
        assert!(record.message.starts_with("Analysis Ready!"));

        let workbook = store.blob(record.processed_file.as_deref().unwrap()).unwrap();
        assert_eq!(&workbook[..2], b"PK");

        let chart = store.blob(record.subject_chart.as_deref().unwrap()).unwrap();
        assert_eq!(&chart[1..4], b"PNG");
        assert!(record.passrate_chart.is_some());

        let zip_bytes = store.blob(record.reports_zip.as_deref().unwrap()).unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(zip_bytes)).unwrap();
        assert_eq!(archive.len(), 3);

        let summary: AnalysisSummary =
            serde_json::from_str(record.analysis_summary.as_deref().unwrap()).unwrap();
        assert_eq!(summary.students, 3);
        assert_eq!(summary.subjects, vec!["Math", "English"]);
        // Averages 75, 45 and 60 put two of three over the pass mark.
        assert!((summary.pass_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn processing_upload_rejects_concurrent_retry() {
        let store = MemStore::new();
        let id = seed(&store, SAMPLE_CSV, "marks.csv").await;
        store.claim_processing(id).await.unwrap();

        let err = process_upload(&store, id).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyProcessing(got) if got == id));

        // The wedged record is untouched by the rejected attempt.
        let record = store.fetch(id).await.unwrap();
        assert_eq!(record.status, UploadStatus::Processing);
        assert!(record.processed_file.is_none());
    }

    #[tokio::test]
    async fn retry_from_failed_reruns_to_completion() {
        let store = MemStore::new();
        let id = seed(&store, SAMPLE_CSV, "marks.csv").await;

        let mut record = store.fetch(id).await.unwrap();
        record.status = UploadStatus::Failed;
        record.message = "previous failure".to_string();
        store.update(&record).await.unwrap();

        let record = process_upload(&store, id).await.unwrap();
        assert_eq!(record.status, UploadStatus::Completed);
        assert!(record.message.starts_with("Analysis Ready!"));
    }

    #[tokio::test]
    async fn no_subject_columns_fails_with_the_exact_message() {
        let store = MemStore::new();
        let id = seed(&store, "Name,Comments\nAlice,ok\nBob,late\n", "marks.csv").await;

        let record = process_upload(&store, id).await.unwrap();
        assert_eq!(record.status, UploadStatus::Failed);
        assert_eq!(record.message, "No subjects detected. Please check column names.");
        assert!(record.processed_file.is_none());
        assert!(record.analysis_summary.is_none());
    }

    #[tokio::test]
    async fn unsupported_extension_fails_the_run() {
        let store = MemStore::new();
        let id = seed(&store, SAMPLE_CSV, "marks.txt").await;

        let record = process_upload(&store, id).await.unwrap();
        assert_eq!(record.status, UploadStatus::Failed);
        assert!(record.message.starts_with("unsupported file format"));
    }

    #[tokio::test]
    async fn headers_only_source_fails_the_run() {
        let store = MemStore::new();
        let id = seed(&store, "Name,Math\n", "marks.csv").await;

        let record = process_upload(&store, id).await.unwrap();
        assert_eq!(record.status, UploadStatus::Failed);
        assert_eq!(record.message, "the file contains no header row or data");
    }

    #[tokio::test]
    async fn artifact_save_failures_degrade_softly() {
        let store = MemStore::failing_artifacts();
        let id = seed(&store, SAMPLE_CSV, "marks.csv").await;

        let record = process_upload(&store, id).await.unwrap();
        assert_eq!(record.status, UploadStatus::Completed);
        assert!(record.processed_file.is_some());
        assert!(record.subject_chart.is_none());
        assert!(record.passrate_chart.is_none());
        assert!(record.reports_zip.is_none());
        assert!(record.message.starts_with("Analysis Ready!"));
    }
}
