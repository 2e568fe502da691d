use rust_xlsxwriter::{Format, Workbook, XlsxError};

use crate::aggregate::Aggregation;
use crate::error::AnalysisError;
use crate::table::{Cell, Table};

/// Derived columns appended after the original ones on the ranks sheet.
const DERIVED_HEADERS: [&str; 5] = ["Total", "Average", "Rank", "Overall Grade", "Points"];

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Build the results workbook: the ranked table plus subject statistics and a
/// class overview sheet.
pub fn build_workbook(
    table: &Table,
    agg: &Aggregation,
    subject_cols: &[usize],
) -> Result<Vec<u8>, AnalysisError> {
    build(table, agg, subject_cols).map_err(|e| AnalysisError::Workbook(e.to_string()))
}

fn build(table: &Table, agg: &Aggregation, subject_cols: &[usize]) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    // Sheet 1: every original column, rank-ordered, with derived columns
    // appended on the right.
    let sheet = workbook.add_worksheet().set_name("Student Ranks")?;
    for (col, header) in table.headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, header, &bold)?;
    }
    let base = table.width() as u16;
    for (offset, header) in DERIVED_HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, base + offset as u16, *header, &bold)?;
    }

    for (i, student) in agg.students.iter().enumerate() {
        let row = (i + 1) as u32;
        for col in 0..table.width() {
            let cell = &table.rows[student.row][col];
            if subject_cols.contains(&col) {
                sheet.write_number(row, col as u16, cell.as_number().unwrap_or(0.0))?;
                continue;
            }
            match cell {
                Cell::Number(v) => {
                    sheet.write_number(row, col as u16, *v)?;
                }
                Cell::Text(t) => {
                    sheet.write_string(row, col as u16, t)?;
                }
                Cell::Empty => {}
            }
        }
        sheet.write_number(row, base, student.total)?;
        sheet.write_number(row, base + 1, round2(student.average))?;
        sheet.write_number(row, base + 2, student.rank as f64)?;
        sheet.write_string(row, base + 3, &student.grade.grade)?;
        sheet.write_number(row, base + 4, student.grade.points)?;
    }

    // Sheet 2: per-subject statistics.
    let sheet = workbook.add_worksheet().set_name("Subject Performance")?;
    sheet.write_string_with_format(0, 0, "Subject", &bold)?;
    sheet.write_string_with_format(0, 1, "Mean Score", &bold)?;
    sheet.write_string_with_format(0, 2, "Max", &bold)?;
    sheet.write_string_with_format(0, 3, "Min", &bold)?;
    for (i, stat) in agg.subject_stats.iter().enumerate() {
        let row = (i + 1) as u32;
        sheet.write_string(row, 0, &stat.name)?;
        sheet.write_number(row, 1, round2(stat.mean))?;
        sheet.write_number(row, 2, stat.max)?;
        sheet.write_number(row, 3, stat.min)?;
    }

    // Sheet 3: class overview and the grade distribution.
    let sheet = workbook.add_worksheet().set_name("Overview")?;
    sheet.write_string_with_format(0, 0, "Metric", &bold)?;
    sheet.write_string_with_format(0, 1, "Value", &bold)?;

    let s = &agg.summary;
    let mut row: u32 = 1;
    let metric_num = |sheet: &mut rust_xlsxwriter::Worksheet,
                          row: &mut u32,
                          label: &str,
                          value: f64|
     -> Result<(), XlsxError> {
        sheet.write_string(*row, 0, label)?;
        sheet.write_number(*row, 1, value)?;
        *row += 1;
        Ok(())
    };
    metric_num(sheet, &mut row, "Number of Students", s.students as f64)?;
    metric_num(sheet, &mut row, "Class Mean Total", round2(s.mean_total))?;
    metric_num(sheet, &mut row, "Class Average", round2(s.class_average))?;
    sheet.write_string(row, 0, "Pass Rate")?;
    sheet.write_string(row, 1, format!("{:.1}%", s.pass_rate * 100.0))?;
    row += 1;
    sheet.write_string(row, 0, "Best Subject")?;
    sheet.write_string(row, 1, &s.best_subject)?;
    row += 1;
    metric_num(sheet, &mut row, "Best Subject Mean", round2(s.best_subject_mean))?;
    sheet.write_string(row, 0, "Worst Subject")?;
    sheet.write_string(row, 1, &s.worst_subject)?;
    row += 1;
    metric_num(sheet, &mut row, "Worst Subject Mean", round2(s.worst_subject_mean))?;
    sheet.write_string(row, 0, "Top Student")?;
    sheet.write_string(row, 1, &s.top_student)?;
    row += 1;
    metric_num(sheet, &mut row, "Top Student Total", s.top_total)?;

    row += 1;
    sheet.write_string_with_format(row, 0, "Grade Distribution", &bold)?;
    row += 1;
    for (grade, count) in &agg.grade_distribution {
        sheet.write_string(row, 0, grade)?;
        sheet.write_number(row, 1, *count as f64)?;
        row += 1;
    }

    workbook.save_to_buffer()
}
