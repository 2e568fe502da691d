use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::grading::GradeOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "PENDING",
            UploadStatus::Processing => "PROCESSING",
            UploadStatus::Completed => "COMPLETED",
            UploadStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<UploadStatus> {
        match s {
            "PENDING" => Some(UploadStatus::Pending),
            "PROCESSING" => Some(UploadStatus::Processing),
            "COMPLETED" => Some(UploadStatus::Completed),
            "FAILED" => Some(UploadStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One exam upload as persisted by the store. The pipeline reads the
/// configuration fields and writes status/message/summary plus the artifact
/// references; everything else is set at registration time.
#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub id: Uuid,
    pub title: String,
    /// Storage-relative path of the raw source file.
    pub source_file: String,
    pub school_name: Option<String>,
    pub status: UploadStatus,
    pub message: String,
    /// Raw JSON rule list as supplied; parsed and validated at the pipeline
    /// boundary so garbage here degrades instead of crashing the run.
    pub grading_scheme: Option<String>,
    pub custom_ignore_columns: Option<String>,
    pub analysis_summary: Option<String>,
    pub processed_file: Option<String>,
    pub subject_chart: Option<String>,
    pub passrate_chart: Option<String>,
    pub reports_zip: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadRecord {
    pub fn new(id: Uuid, title: String, source_file: String) -> Self {
        let now = Utc::now();
        UploadRecord {
            id,
            title,
            source_file,
            school_name: None,
            status: UploadStatus::Pending,
            message: String::new(),
            grading_scheme: None,
            custom_ignore_columns: None,
            analysis_summary: None,
            processed_file: None,
            subject_chart: None,
            passrate_chart: None,
            reports_zip: None,
            uploaded_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubjectStat {
    pub name: String,
    pub mean: f64,
    pub max: f64,
    pub min: f64,
}

/// Derived fields for one table row. The original cells stay in the table;
/// `row` points back at them.
#[derive(Debug, Clone)]
pub struct StudentRow {
    pub row: usize,
    pub total: f64,
    pub average: f64,
    pub rank: u32,
    pub grade: GradeOutcome,
}

#[derive(Debug, Clone)]
pub struct ClassSummary {
    pub students: usize,
    pub class_average: f64,
    pub mean_total: f64,
    pub top_student: String,
    pub top_total: f64,
    /// Fraction of students with Average >= the pass mark, in [0, 1].
    pub pass_rate: f64,
    pub best_subject: String,
    pub best_subject_mean: f64,
    pub worst_subject: String,
    pub worst_subject_mean: f64,
}

/// JSON payload persisted to `analysis_summary` on the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub students: usize,
    pub subjects: Vec<String>,
    pub class_average: f64,
    pub pass_rate: f64,
    pub best_subject: String,
    pub best_subject_mean: f64,
    pub worst_subject: String,
    pub worst_subject_mean: f64,
    pub top_student: String,
    pub top_student_total: f64,
    pub grade_distribution: BTreeMap<String, usize>,
}
