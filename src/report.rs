use std::io::{Cursor, Write};

use printpdf::path::PaintMode;
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfLayerReference, Point, Rect,
    Rgb,
};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::aggregate::Aggregation;
use crate::error::AnalysisError;
use crate::grading::{GradeOutcome, GradingScheme};
use crate::models::StudentRow;
use crate::table::Table;

const FALLBACK_SCHOOL: &str = "KENYA SCHOOL ANALYTICS";
const FOOTNOTE: &str = "Generated by School Analytics System";

// A4 in points; the layout is specified in points and converted at the edge.
const PAGE_WIDTH_PT: f32 = 595.276;
const PAGE_HEIGHT_PT: f32 = 841.89;
const MARGIN_BOTTOM_PT: f32 = 60.0;

fn pt(v: f32) -> Mm {
    Mm(v * 0.352_778)
}

fn light_grey() -> Color {
    Color::Rgb(Rgb::new(0.83, 0.83, 0.83, None))
}

fn black() -> Color {
    Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None))
}

/// One A4 report card per student, archived as `{rank}_{name}.pdf`.
#[allow(clippy::too_many_arguments)]
pub fn build_reports_zip(
    table: &Table,
    agg: &Aggregation,
    subject_cols: &[usize],
    name_col: Option<usize>,
    id_col: Option<usize>,
    scheme: &GradingScheme,
    title: &str,
    school_name: Option<&str>,
) -> Result<Vec<u8>, AnalysisError> {
    let school = school_name
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
        .unwrap_or_else(|| FALLBACK_SCHOOL.to_string());

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for student in &agg.students {
        let name = student_name(table, student, name_col);
        let pdf = render_student_pdf(
            table,
            student,
            &name,
            agg.students.len(),
            subject_cols,
            id_col,
            scheme,
            title,
            &school,
        )
        .map_err(|e| AnalysisError::Report(e.to_string()))?;

        let entry = format!("{}_{}.pdf", student.rank, sanitize_entry_name(&name));
        zip.start_file(entry, options)
            .map_err(|e| AnalysisError::Report(e.to_string()))?;
        zip.write_all(&pdf)
            .map_err(|e| AnalysisError::Report(e.to_string()))?;
    }

    let cursor = zip
        .finish()
        .map_err(|e| AnalysisError::Report(e.to_string()))?;
    Ok(cursor.into_inner())
}

/// Upper-cased display name, falling back to the 1-based row position when no
/// name column resolved or the cell is blank.
fn student_name(table: &Table, student: &StudentRow, name_col: Option<usize>) -> String {
    name_col
        .map(|col| table.rows[student.row][col].display())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("Student {}", student.row + 1))
        .to_uppercase()
}

/// Zip entry names keep alphanumerics and spaces only.
fn sanitize_entry_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ')
        .collect::<String>()
        .trim()
        .to_string()
}

/// First letter of each word upper, the rest lower.
fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

struct ReportFonts {
    bold: IndirectFontRef,
    regular: IndirectFontRef,
    italic: IndirectFontRef,
}

#[allow(clippy::too_many_arguments)]
fn render_student_pdf(
    table: &Table,
    student: &StudentRow,
    name: &str,
    class_size: usize,
    subject_cols: &[usize],
    id_col: Option<usize>,
    scheme: &GradingScheme,
    title: &str,
    school: &str,
) -> Result<Vec<u8>, printpdf::Error> {
    let (doc, page, layer) = PdfDocument::new(title, Mm(210.0), Mm(297.0), "Layer 1");
    let fonts = ReportFonts {
        bold: doc.add_builtin_font(BuiltinFont::HelveticaBold)?,
        regular: doc.add_builtin_font(BuiltinFont::Helvetica)?,
        italic: doc.add_builtin_font(BuiltinFont::HelveticaOblique)?,
    };

    let mut current = doc.get_page(page).get_layer(layer);
    draw_footnote(&current, &fonts);

    // Header block.
    draw_centred(&current, school, 18.0, PAGE_HEIGHT_PT - 50.0, &fonts.bold);
    draw_centred(
        &current,
        "COMPETENCY BASED ASSESSMENT",
        12.0,
        PAGE_HEIGHT_PT - 75.0,
        &fonts.bold,
    );
    draw_centred(&current, title, 12.0, PAGE_HEIGHT_PT - 95.0, &fonts.bold);
    current.set_outline_thickness(2.0);
    draw_line(
        &current,
        (30.0, PAGE_HEIGHT_PT - 105.0),
        (PAGE_WIDTH_PT - 30.0, PAGE_HEIGHT_PT - 105.0),
    );

    // Identity block.
    let adm = id_col
        .map(|col| table.rows[student.row][col].display())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "N/A".to_string());

    let text = |l: &PdfLayerReference, s: &str, size: f32, x: f32, y: f32, f: &IndirectFontRef| {
        l.use_text(s, size, pt(x), pt(y), f);
    };
    text(
        &current,
        &format!("NAME: {name}"),
        11.0,
        50.0,
        PAGE_HEIGHT_PT - 140.0,
        &fonts.bold,
    );
    text(
        &current,
        &format!("ADM NO: {adm}"),
        11.0,
        50.0,
        PAGE_HEIGHT_PT - 160.0,
        &fonts.bold,
    );
    text(
        &current,
        &format!("POSITION: {} / {}", student.rank, class_size),
        11.0,
        350.0,
        PAGE_HEIGHT_PT - 140.0,
        &fonts.bold,
    );
    text(
        &current,
        &format!("PERFORMANCE: {}", student.grade.grade),
        11.0,
        350.0,
        PAGE_HEIGHT_PT - 160.0,
        &fonts.bold,
    );

    // Subject table.
    let mut y = PAGE_HEIGHT_PT - 200.0;
    draw_table_header(&current, &fonts, y);
    y -= 25.0;

    for &col in subject_cols {
        if y < MARGIN_BOTTOM_PT {
            let (next_page, next_layer) = doc.add_page(Mm(210.0), Mm(297.0), "Layer 1");
            current = doc.get_page(next_page).get_layer(next_layer);
            draw_footnote(&current, &fonts);
            y = PAGE_HEIGHT_PT - 50.0;
            draw_table_header(&current, &fonts, y);
            y -= 25.0;
        }

        let cell = &table.rows[student.row][col];
        let (score_text, outcome) = match cell.as_number() {
            Some(score) => (format!("{score:.0}"), scheme.grade(score)),
            None => ("0".to_string(), GradeOutcome::unscored()),
        };

        text(
            &current,
            &title_case(&table.headers[col]),
            10.0,
            60.0,
            y,
            &fonts.regular,
        );
        text(&current, &score_text, 10.0, 250.0, y, &fonts.regular);
        text(&current, &outcome.grade, 10.0, 330.0, y, &fonts.regular);
        text(&current, &outcome.remark, 10.0, 400.0, y, &fonts.regular);

        current.set_outline_thickness(0.5);
        current.set_outline_color(light_grey());
        draw_line(&current, (50.0, y - 5.0), (550.0, y - 5.0));
        current.set_outline_color(black());

        y -= 20.0;
    }

    // Footer summary box.
    y -= 30.0;
    if y - 40.0 < 40.0 {
        let (next_page, next_layer) = doc.add_page(Mm(210.0), Mm(297.0), "Layer 1");
        current = doc.get_page(next_page).get_layer(next_layer);
        draw_footnote(&current, &fonts);
        y = PAGE_HEIGHT_PT - 80.0;
    }
    current.set_outline_thickness(1.0);
    current.add_rect(
        Rect::new(pt(50.0), pt(y - 40.0), pt(550.0), pt(y)).with_mode(PaintMode::Stroke),
    );
    text(
        &current,
        &format!("TOTAL: {:.0}", student.total),
        12.0,
        60.0,
        y - 25.0,
        &fonts.bold,
    );
    text(
        &current,
        &format!("AVERAGE: {:.2}", student.average),
        12.0,
        200.0,
        y - 25.0,
        &fonts.bold,
    );
    text(
        &current,
        &format!("LEVEL: {}", student.grade.grade),
        12.0,
        400.0,
        y - 25.0,
        &fonts.bold,
    );

    doc.save_to_bytes()
}

fn draw_table_header(layer: &PdfLayerReference, fonts: &ReportFonts, y: f32) {
    layer.set_fill_color(light_grey());
    layer.add_rect(
        Rect::new(pt(50.0), pt(y - 5.0), pt(550.0), pt(y + 15.0)).with_mode(PaintMode::Fill),
    );
    layer.set_fill_color(black());
    layer.use_text("SUBJECT", 10.0, pt(60.0), pt(y), &fonts.bold);
    layer.use_text("SCORE", 10.0, pt(250.0), pt(y), &fonts.bold);
    layer.use_text("LEVEL", 10.0, pt(330.0), pt(y), &fonts.bold);
    layer.use_text("REMARK", 10.0, pt(400.0), pt(y), &fonts.bold);
}

fn draw_footnote(layer: &PdfLayerReference, fonts: &ReportFonts) {
    draw_centred(layer, FOOTNOTE, 8.0, 30.0, &fonts.italic);
}

/// Centred via approximate Helvetica metrics (average glyph ~0.5 em).
fn draw_centred(
    layer: &PdfLayerReference,
    text: &str,
    size: f32,
    y: f32,
    font: &IndirectFontRef,
) {
    let width = text.chars().count() as f32 * size * 0.5;
    layer.use_text(text, size, pt((PAGE_WIDTH_PT - width) / 2.0), pt(y), font);
}

fn draw_line(layer: &PdfLayerReference, from: (f32, f32), to: (f32, f32)) {
    layer.add_line(Line {
        points: vec![
            (Point::new(pt(from.0), pt(from.1)), false),
            (Point::new(pt(to.0), pt(to.1)), false),
        ],
        is_closed: false,
    });
}
