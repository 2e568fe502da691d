use std::io::Cursor;

use image::RgbImage;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::IntoTextStyle;

use crate::aggregate::PASS_MARK;
use crate::error::AnalysisError;
use crate::models::SubjectStat;

const BAR_WIDTH: u32 = 1000;
const BAR_HEIGHT: u32 = 600;
const DONUT_SIZE: u32 = 600;

const BELOW_PASS: RGBColor = RGBColor(231, 76, 60);
const ABOVE_PASS: RGBColor = RGBColor(46, 204, 113);
const PASSED_SLICE: RGBColor = RGBColor(52, 152, 219);
const FAILED_SLICE: RGBColor = RGBColor(230, 126, 34);

/// Horizontal bar chart of subject means, one bar per subject, coloured by
/// whether the mean clears the pass mark.
pub fn subject_chart(title: &str, stats: &[SubjectStat]) -> Result<Vec<u8>, AnalysisError> {
    let mut raw = vec![0u8; (BAR_WIDTH * BAR_HEIGHT * 3) as usize];
    draw_subject_chart(&mut raw, title, stats)
        .map_err(|e| AnalysisError::Chart(e.to_string()))?;
    encode_png(raw, BAR_WIDTH, BAR_HEIGHT)
}

/// Donut chart of the class pass rate with the percentage in the hole.
pub fn passrate_chart(title: &str, pass_rate: f64) -> Result<Vec<u8>, AnalysisError> {
    let mut raw = vec![0u8; (DONUT_SIZE * DONUT_SIZE * 3) as usize];
    draw_passrate_chart(&mut raw, title, pass_rate)
        .map_err(|e| AnalysisError::Chart(e.to_string()))?;
    encode_png(raw, DONUT_SIZE, DONUT_SIZE)
}

fn draw_subject_chart(
    raw: &mut [u8],
    title: &str,
    stats: &[SubjectStat],
) -> Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::with_buffer(raw, (BAR_WIDTH, BAR_HEIGHT)).into_drawing_area();
    root.fill(&WHITE)?;

    let x_max = stats.iter().map(|s| s.mean).fold(100.0, f64::max) * 1.05;
    let n = stats.len() as f64;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("{title} - Subject Averages"), ("sans-serif", 26))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(140)
        .build_cartesian_2d(0.0..x_max, 0.0..n)?;

    chart
        .configure_mesh()
        .disable_y_mesh()
        .y_labels(stats.len())
        .y_label_formatter(&|y: &f64| {
            stats
                .get(y.floor() as usize)
                .map(|s| s.name.clone())
                .unwrap_or_default()
        })
        .x_desc("Mean score")
        .draw()?;

    for (i, stat) in stats.iter().enumerate() {
        let color = if stat.mean < PASS_MARK {
            BELOW_PASS
        } else {
            ABOVE_PASS
        };
        let base = i as f64;
        chart.draw_series(std::iter::once(Rectangle::new(
            [(0.0, base + 0.15), (stat.mean, base + 0.85)],
            color.filled(),
        )))?;
        chart.draw_series(std::iter::once(Text::new(
            format!("{:.1}", stat.mean),
            (stat.mean + x_max * 0.01, base + 0.5),
            ("sans-serif", 16),
        )))?;
    }

    root.present()?;
    Ok(())
}

fn draw_passrate_chart(
    raw: &mut [u8],
    title: &str,
    pass_rate: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::with_buffer(raw, (DONUT_SIZE, DONUT_SIZE)).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled(&format!("{title} - Pass Rate"), ("sans-serif", 26))?;

    let passed = (pass_rate * 100.0).clamp(0.0, 100.0);
    let sizes = vec![passed, 100.0 - passed];
    let colors = vec![PASSED_SLICE, FAILED_SLICE];
    let labels = vec!["Passed", "Failed"];

    let center = (DONUT_SIZE as i32 / 2, DONUT_SIZE as i32 / 2);
    let radius = DONUT_SIZE as f64 * 0.35;

    let mut pie = Pie::new(&center, &radius, &sizes, &colors, &labels);
    pie.start_angle(-90.0);
    pie.label_style(("sans-serif", 18).into_text_style(&root));
    root.draw(&pie)?;

    // Punch the hole and print the headline number inside it.
    root.draw(&Circle::new(
        center,
        (radius * 0.55) as i32,
        WHITE.filled(),
    ))?;
    let style = ("sans-serif", 32)
        .into_text_style(&root)
        .pos(Pos::new(HPos::Center, VPos::Center));
    root.draw(&Text::new(format!("{passed:.1}%"), center, style))?;

    root.present()?;
    Ok(())
}

fn encode_png(raw: Vec<u8>, width: u32, height: u32) -> Result<Vec<u8>, AnalysisError> {
    let img = RgbImage::from_raw(width, height, raw)
        .ok_or_else(|| AnalysisError::Chart("pixel buffer size mismatch".to_string()))?;
    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| AnalysisError::Chart(e.to_string()))?;
    Ok(png)
}
