/// Errors raised inside a pipeline run. Which of these are fatal to the run
/// and which degrade into a missing artifact is decided by the orchestrator,
/// not here: the same `Chart` error is soft during a run but fatal if a
/// caller chooses to treat it that way.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("unsupported file format '{0}' (expected .csv, .xlsx or .xls)")]
    UnsupportedFormat(String),

    #[error("failed to read input file: {0}")]
    FileRead(String),

    #[error("the file contains no header row or data")]
    EmptyTable,

    /// Message text is user-visible on the upload record; keep it actionable.
    #[error("No subjects detected. Please check column names.")]
    NoSubjectsDetected,

    #[error("failed to build results workbook: {0}")]
    Workbook(String),

    #[error("chart rendering failed: {0}")]
    Chart(String),

    #[error("report generation failed: {0}")]
    Report(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subjects_message_is_user_facing() {
        let msg = AnalysisError::NoSubjectsDetected.to_string();
        assert_eq!(msg, "No subjects detected. Please check column names.");
    }
}
