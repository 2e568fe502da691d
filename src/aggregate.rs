use std::collections::BTreeMap;

use crate::grading::GradingScheme;
use crate::models::{AnalysisSummary, ClassSummary, StudentRow, SubjectStat};
use crate::table::Table;

pub const PASS_MARK: f64 = 50.0;

/// Everything derived from one scored table: ranked students, per-subject
/// statistics and the class-level summary.
#[derive(Debug, Clone)]
pub struct Aggregation {
    /// Sorted by rank ascending; tied totals keep their original row order.
    pub students: Vec<StudentRow>,
    /// One entry per subject, in detected column order.
    pub subject_stats: Vec<SubjectStat>,
    pub summary: ClassSummary,
    pub grade_distribution: BTreeMap<String, usize>,
}

impl Aggregation {
    /// The JSON payload persisted on the upload record.
    pub fn summary_payload(&self) -> AnalysisSummary {
        AnalysisSummary {
            students: self.summary.students,
            subjects: self.subject_stats.iter().map(|s| s.name.clone()).collect(),
            class_average: self.summary.class_average,
            pass_rate: self.summary.pass_rate,
            best_subject: self.summary.best_subject.clone(),
            best_subject_mean: self.summary.best_subject_mean,
            worst_subject: self.summary.worst_subject.clone(),
            worst_subject_mean: self.summary.worst_subject_mean,
            top_student: self.summary.top_student.clone(),
            top_student_total: self.summary.top_total,
            grade_distribution: self.grade_distribution.clone(),
        }
    }
}

/// Score a single cell: missing or unparseable cells count as zero so one
/// absent mark never sinks a whole row.
fn score_at(table: &Table, row: usize, col: usize) -> f64 {
    table.rows[row][col].as_number().unwrap_or(0.0)
}

/// Compute totals, averages, ranks and grades for every row, plus subject and
/// class statistics. `subject_cols` must be non-empty, which the column
/// classifier guarantees. The average divides by the full subject count, so a
/// student missing one paper is averaged over all detected subjects.
pub fn aggregate(
    table: &Table,
    subject_cols: &[usize],
    name_col: Option<usize>,
    scheme: &GradingScheme,
) -> Aggregation {
    let n_rows = table.rows.len();
    let n_subjects = subject_cols.len() as f64;

    let totals: Vec<f64> = (0..n_rows)
        .map(|row| subject_cols.iter().map(|&col| score_at(table, row, col)).sum())
        .collect();

    let mut students: Vec<StudentRow> = totals
        .iter()
        .enumerate()
        .map(|(row, &total)| {
            let rank = 1 + totals.iter().filter(|&&other| other > total).count() as u32;
            let average = total / n_subjects;
            StudentRow {
                row,
                total,
                average,
                rank,
                grade: scheme.grade(average),
            }
        })
        .collect();
    // Stable sort keeps tied totals in upload order.
    students.sort_by_key(|s| s.rank);

    let subject_stats: Vec<SubjectStat> = subject_cols
        .iter()
        .map(|&col| {
            let mut sum = 0.0;
            let mut max = f64::MIN;
            let mut min = f64::MAX;
            for row in 0..n_rows {
                let score = score_at(table, row, col);
                sum += score;
                max = max.max(score);
                min = min.min(score);
            }
            SubjectStat {
                name: table.headers[col].clone(),
                mean: sum / n_rows as f64,
                max,
                min,
            }
        })
        .collect();

    let mut best = &subject_stats[0];
    let mut worst = &subject_stats[0];
    for stat in &subject_stats[1..] {
        if stat.mean > best.mean {
            best = stat;
        }
        if stat.mean < worst.mean {
            worst = stat;
        }
    }

    let passed = students.iter().filter(|s| s.average >= PASS_MARK).count();
    let top = &students[0];
    let top_student = name_col
        .map(|col| table.rows[top.row][col].display())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "N/A".to_string());

    let summary = ClassSummary {
        students: n_rows,
        class_average: students.iter().map(|s| s.average).sum::<f64>() / n_rows as f64,
        mean_total: totals.iter().sum::<f64>() / n_rows as f64,
        top_student,
        top_total: top.total,
        pass_rate: passed as f64 / n_rows as f64,
        best_subject: best.name.clone(),
        best_subject_mean: best.mean,
        worst_subject: worst.name.clone(),
        worst_subject_mean: worst.mean,
    };

    let mut grade_distribution: BTreeMap<String, usize> = BTreeMap::new();
    for student in &students {
        *grade_distribution
            .entry(student.grade.grade.clone())
            .or_insert(0) += 1;
    }

    Aggregation {
        students,
        subject_stats,
        summary,
        grade_distribution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns;
    use crate::table::parse_table;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn aggregate_csv(csv: &str) -> (Table, Aggregation) {
        let table = parse_table("marks.csv", csv.as_bytes()).unwrap();
        let cols = columns::subject_columns(&table, &[]).unwrap();
        let name_col = columns::name_column(&table);
        let scheme = GradingScheme::default_bands();
        let agg = aggregate(&table, &cols, name_col, &scheme);
        (table, agg)
    }

    #[test]
    fn totals_zero_fill_and_average_over_all_subjects() {
        let (_, agg) = aggregate_csv(
            "Name,Math,English,Kiswahili\n\
             Alice,78,65,\n\
             Bob,55,71,80\n\
             Carol,62,,74\n",
        );

        let alice = agg.students.iter().find(|s| s.row == 0).unwrap();
        assert!(approx(alice.total, 143.0));
        assert!(approx(alice.average, 143.0 / 3.0));
    }

    #[test]
    fn tied_totals_share_a_rank_and_keep_upload_order() {
        let (_, agg) = aggregate_csv(
            "Name,Math\n\
             Alice,70\n\
             Bob,90\n\
             Carol,70\n\
             Dan,60\n",
        );

        let ranks: Vec<(usize, u32)> = agg.students.iter().map(|s| (s.row, s.rank)).collect();
        assert_eq!(ranks, vec![(1, 1), (0, 2), (2, 2), (3, 4)]);

        let (_, agg) = aggregate_csv("Name,Math\nA,90\nB,90\nC,80\n");
        let ranks: Vec<u32> = agg.students.iter().map(|s| s.rank).collect();
        assert_eq!(ranks, vec![1, 1, 3]);
    }

    #[test]
    fn subject_stats_include_zero_filled_cells() {
        let (_, agg) = aggregate_csv(
            "Name,Math,English,Kiswahili\n\
             Alice,78,65,\n\
             Bob,55,71,80\n\
             Carol,62,,74\n",
        );

        let kis = &agg.subject_stats[2];
        assert_eq!(kis.name, "Kiswahili");
        assert!(approx(kis.mean, 154.0 / 3.0));
        assert!(approx(kis.max, 80.0));
        assert!(approx(kis.min, 0.0));
    }

    #[test]
    fn class_summary_fields() {
        let (_, agg) = aggregate_csv(
            "Name,Math,English,Kiswahili\n\
             Alice,78,65,\n\
             Bob,55,71,80\n\
             Carol,62,,74\n",
        );

        let s = &agg.summary;
        assert_eq!(s.students, 3);
        assert_eq!(s.top_student, "Bob");
        assert!(approx(s.top_total, 206.0));
        assert!(approx(s.pass_rate, 1.0 / 3.0));
        assert!(approx(s.mean_total, 485.0 / 3.0));
        assert!(approx(s.class_average, 485.0 / 9.0));
        assert_eq!(s.best_subject, "Math");
        assert!(approx(s.best_subject_mean, 65.0));
        assert_eq!(s.worst_subject, "English");
        assert!(approx(s.worst_subject_mean, 136.0 / 3.0));
    }

    #[test]
    fn top_student_without_name_column_is_not_applicable() {
        let (_, agg) = aggregate_csv("Math\n70\n90\n");
        assert_eq!(agg.summary.top_student, "N/A");
    }

    #[test]
    fn grade_distribution_counts_overall_grades() {
        let (_, agg) = aggregate_csv(
            "Name,Math,English,Kiswahili\n\
             Alice,78,65,\n\
             Bob,55,71,80\n\
             Carol,62,,74\n",
        );

        // Averages 47.67, 68.67 and 45.33 round into AE, ME, AE.
        assert_eq!(agg.grade_distribution.get("AE"), Some(&2));
        assert_eq!(agg.grade_distribution.get("ME"), Some(&1));
        assert_eq!(agg.grade_distribution.len(), 2);
    }

    #[test]
    fn summary_payload_round_trips_as_json() {
        let (_, agg) = aggregate_csv("Name,Math\nAlice,70\nBob,30\n");
        let payload = agg.summary_payload();
        let text = serde_json::to_string(&payload).unwrap();
        let back: AnalysisSummary = serde_json::from_str(&text).unwrap();
        assert_eq!(back.students, 2);
        assert_eq!(back.subjects, vec!["Math"]);
        assert!(approx(back.pass_rate, 0.5));
    }
}
