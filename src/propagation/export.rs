//! Field export: diagnostic text dump, JSON snapshot and PNG heatmap.

use anyhow::{Context, bail};
use chrono::{SecondsFormat, Utc};
use image::{Rgb as Pixel, RgbImage};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::color::{ColorMapper, LegendEntry};
use super::field::{FieldSummary, SignalField, SignalSample};
use super::types::SamplingMode;

/// One diagnostic line:
/// `x, y, z: strength, hasLOS, distance, pathLoss, intersectDistance, intersectPoint, intersectId`.
///
/// Missing intersection fields print `none`; the intersection point prints as `x y z`.
pub fn diagnostic_line(sample: &SignalSample) -> String {
    let p = sample.position;
    let (distance, point, id) = match &sample.intersection {
        Some(hit) => (
            hit.distance.to_string(),
            format!("{} {} {}", hit.point.x, hit.point.y, hit.point.z),
            hit.building_id.to_string(),
        ),
        None => ("none".to_string(), "none".to_string(), "none".to_string()),
    };
    format!(
        "{}, {}, {}: {}, {}, {}, {}, {}, {}, {}",
        p.x, p.y, p.z, sample.signal_strength, sample.has_line_of_sight, sample.distance_3d, sample.path_loss, distance, point, id
    )
}

/// Write one diagnostic line per sample, in field order.
pub fn write_diagnostics<W: Write>(field: &SignalField, mut writer: W) -> std::io::Result<()> {
    for sample in &field.samples {
        writeln!(writer, "{}", diagnostic_line(sample))?;
    }
    writer.flush()
}

pub fn save_diagnostics(field: &SignalField, path: &Path) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create diagnostics file: {}", path.display()))?;
    write_diagnostics(field, BufWriter::new(file)).with_context(|| format!("Failed to write diagnostics file: {}", path.display()))?;
    log::info!("Wrote {} diagnostic lines to {}", field.samples.len(), path.display());
    Ok(())
}

/// JSON document written by `save_json`.
#[derive(Debug, Serialize)]
pub struct FieldExport<'a> {
    pub generated_at: String,
    pub mode: SamplingMode,
    pub summary: FieldSummary,
    pub legend: Vec<LegendEntry>,
    pub field: &'a SignalField,
}

impl<'a> FieldExport<'a> {
    pub fn new(field: &'a SignalField, mapper: &ColorMapper) -> Self {
        Self {
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            mode: field.mode,
            summary: field.summary(),
            legend: mapper.legend(),
            field,
        }
    }
}

pub fn save_json(field: &SignalField, mapper: &ColorMapper, path: &Path) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create JSON file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &FieldExport::new(field, mapper)).context("Failed to serialize field")?;
    writer.flush()?;
    log::info!("Wrote {} field to {}", field.mode, path.display());
    Ok(())
}

/// Heatmap of a ground field, one pixel per lattice point with north at the top.
pub fn render_heatmap(field: &SignalField) -> anyhow::Result<RgbImage> {
    let Some(grid) = field.grid.filter(|_| field.mode == SamplingMode::Ground) else {
        bail!("heatmap needs a 2d field, got {}", field.mode);
    };
    if grid.len() != field.samples.len() || grid.len() == 0 {
        bail!("field has {} samples for a {}x{} lattice", field.samples.len(), grid.x_count, grid.z_count);
    }
    let (width, height) = (grid.x_count as u32, grid.z_count as u32);
    let mut image = RgbImage::new(width, height);
    for (i, sample) in field.samples.iter().enumerate() {
        let (xi, zi) = ((i % grid.x_count) as u32, (i / grid.x_count) as u32);
        image.put_pixel(xi, height - 1 - zi, Pixel(sample.color.to_rgb8()));
    }
    Ok(image)
}

pub fn save_heatmap(field: &SignalField, path: &Path) -> anyhow::Result<()> {
    let image = render_heatmap(field)?;
    image.save(path).with_context(|| format!("Failed to write heatmap: {}", path.display()))?;
    log::info!("Wrote {}x{} heatmap to {}", image.width(), image.height(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::PropagationConfig;
    use crate::propagation::geometry::{BuildingSolid, Vec3};
    use crate::propagation::sampler::SignalSampler;
    use crate::propagation::spatial_index::LinearIndex;
    use crate::propagation::types::{GridParams, Transmitter};

    fn field_with_blocker(mode: SamplingMode) -> SignalField {
        let config = PropagationConfig::default().without_shadowing();
        let tx = Transmitter::new(0.0, 0.0, 25.0);
        let index = LinearIndex::new(vec![BuildingSolid::rectangle(5, 40.0, -10.0, 60.0, 10.0, 30.0).unwrap()]);
        let params = GridParams {
            origin_x: 0.0,
            origin_z: -20.0,
            ..GridParams::centered(mode, 120.0, 20.0)
        };
        SignalSampler::new(&tx, &config, &index).parallel(false).run(&params).unwrap()
    }

    #[test]
    fn diagnostic_line_without_intersection() {
        let field = field_with_blocker(SamplingMode::Ground);
        let line = diagnostic_line(&field.samples[0]);
        assert!(line.starts_with("0, 0, -20: "), "{}", line);
        assert!(line.ends_with(", none, none, none"), "{}", line);
        assert_eq!(line.split(": ").nth(1).unwrap().split(", ").count(), 7);
    }

    #[test]
    fn diagnostic_line_with_intersection() {
        let field = field_with_blocker(SamplingMode::Ground);
        let blocked = field.samples.iter().find(|s| s.position == Vec3::new(100.0, 0.0, 0.0)).unwrap();
        assert!(!blocked.has_line_of_sight);
        let line = diagnostic_line(blocked);
        let fields: Vec<&str> = line.split(": ").nth(1).unwrap().split(", ").collect();
        assert_eq!(fields[1], "false");
        assert_eq!(fields[6], "5");
        assert_eq!(fields[5].split(' ').count(), 3);
        assert!(fields[4].parse::<f64>().unwrap() > 0.0);
    }

    #[test]
    fn diagnostics_have_one_line_per_sample() {
        let field = field_with_blocker(SamplingMode::Ground);
        let mut out = Vec::new();
        write_diagnostics(&field, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), field.samples.len());
    }

    #[test]
    fn json_export_carries_header() {
        let field = field_with_blocker(SamplingMode::Ground);
        let mapper = ColorMapper::from_config(&PropagationConfig::default());
        let value = serde_json::to_value(FieldExport::new(&field, &mapper)).unwrap();
        assert_eq!(value["mode"], "2d");
        assert_eq!(value["legend"].as_array().unwrap().len(), 7);
        assert_eq!(value["summary"]["samples"], 36);
        assert!(chrono::DateTime::parse_from_rfc3339(value["generated_at"].as_str().unwrap()).is_ok());
        assert_eq!(value["field"]["samples"].as_array().unwrap().len(), 36);
    }

    #[test]
    fn heatmap_is_north_up() {
        let field = field_with_blocker(SamplingMode::Ground);
        let image = render_heatmap(&field).unwrap();
        assert_eq!(image.dimensions(), (6, 6));
        // First sample is the south-west corner, drawn bottom-left
        assert_eq!(image.get_pixel(0, 5).0, field.samples[0].color.to_rgb8());
        assert_eq!(image.get_pixel(5, 0).0, field.samples[35].color.to_rgb8());
    }

    #[test]
    fn heatmap_rejects_volume_fields() {
        let field = field_with_blocker(SamplingMode::Volume);
        assert!(render_heatmap(&field).is_err());
    }
}
