//! Urban signal propagation: samples a radio signal field over a city scene.
//!
//! Loads a scene of building footprints and a transmitter, builds the building
//! solids in a local metric frame, runs one sampling mode and writes the requested
//! exports.

use anyhow::{Context, bail};
use clap::Parser;
use env_logger::Builder;
use log::{LevelFilter, info, warn};
use std::path::PathBuf;
use std::time::Instant;

use urban_signal_propagation::common::{PropagationConfig, SceneGeometry, load_scene};
use urban_signal_propagation::propagation::color::ColorMapper;
use urban_signal_propagation::propagation::export;
use urban_signal_propagation::propagation::field::FieldSet;
use urban_signal_propagation::propagation::geometry::Vec3;
use urban_signal_propagation::propagation::types::DEFAULT_RESOLUTION;
use urban_signal_propagation::propagation::{GridParams, IndexKind, SamplingMode, SignalSampler, build_index};

/// Compute a radio signal-strength field over a city scene
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Scene JSON with building footprints and the transmitter
    #[arg(long)]
    scene: PathBuf,

    /// Propagation config (TOML). Defaults to propagation.toml next to the scene
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sampling mode
    #[arg(long, value_enum, default_value = "2d")]
    mode: SamplingMode,

    /// Horizontal lattice spacing in meters
    #[arg(long)]
    resolution: Option<f64>,

    /// Spacing between 3D layers in meters
    #[arg(long)]
    vertical_resolution: Option<f64>,

    /// Ceiling of the 3D lattice in meters
    #[arg(long)]
    max_height: Option<f64>,

    /// Edge length of indoor sampling cubes in meters
    #[arg(long)]
    cube_size: Option<f64>,

    /// Side of the square sampling area in meters, centred on the city
    #[arg(long)]
    extent: Option<f64>,

    /// Shadowing seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Building index used for ray queries
    #[arg(long, value_enum, default_value = "grid")]
    index: IndexKind,

    /// Evaluate rows on the calling thread only
    #[arg(long)]
    sequential: bool,

    /// Write one diagnostic line per sample
    #[arg(long)]
    diagnostics: Option<PathBuf>,

    /// Write the field as JSON
    #[arg(long)]
    json: Option<PathBuf>,

    /// Write a PNG heatmap (2d mode only)
    #[arg(long)]
    heatmap: Option<PathBuf>,

    /// Print the sample nearest to x,y,z
    #[arg(long, value_parser = parse_probe)]
    probe: Option<Vec3>,

    /// Log level for this program. RUST_LOG overrides it
    #[arg(long, default_value = "debug")]
    log_level: LevelFilter,
}

fn parse_probe(value: &str) -> Result<Vec3, String> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("invalid coordinate '{}': {}", p, e)))
        .collect::<Result<_, _>>()?;
    match parts.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(format!("expected x,y,z, got '{}'", value)),
    }
}

fn load_config(args: &Args) -> anyhow::Result<PropagationConfig> {
    let mut config = match &args.config {
        Some(path) => PropagationConfig::load(path)?,
        None => {
            let path = PropagationConfig::config_path_from_scene(&args.scene);
            if path.exists() {
                PropagationConfig::load(&path)?
            } else {
                info!("No {} found, using default propagation config", path.display());
                PropagationConfig::default()
            }
        }
    };
    if args.seed.is_some() {
        config.shadowing_seed = args.seed;
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logging setup
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some("urban_signal_propagation"), args.log_level)
        .parse_default_env()
        .init();

    info!("Starting up");

    let scene = load_scene(&args.scene).with_context(|| format!("Failed to load scene: {}", args.scene.display()))?;
    let config = load_config(&args)?;
    let geometry = SceneGeometry::from_scene(&scene)?;
    let transmitter = geometry.transmitter(&scene.transmitter);
    info!(
        "Transmitter at ({:.1}, {:.1}) height {} m, azimuth {}°, beamwidth {}°, {:?}",
        transmitter.position.x, transmitter.position.z, transmitter.height, transmitter.azimuth_deg, transmitter.beamwidth_deg, transmitter.pattern
    );

    let mapper = ColorMapper::from_config(&config);
    for entry in mapper.legend() {
        info!("Legend {:>7.1} dBm -> {:?}", entry.level_dbm, entry.color.to_rgb8());
    }

    let extent = args.extent.or(scene.grid.extent).unwrap_or(geometry.ground_extent);
    let resolution = args.resolution.or(scene.grid.resolution).unwrap_or(DEFAULT_RESOLUTION);
    let params = GridParams {
        vertical_resolution: args.vertical_resolution.or(scene.grid.vertical_resolution),
        max_height: args.max_height.or(scene.grid.max_height),
        cube_size: args.cube_size.or(scene.grid.cube_size),
        ..GridParams::centered(args.mode, extent, resolution)
    };

    let index = build_index(args.index, geometry.solids);
    let started = Instant::now();
    let field = SignalSampler::new(&transmitter, &config, index.as_ref())
        .parallel(!args.sequential)
        .run(&params)?;
    info!("Sampling finished in {:?}", started.elapsed());

    let mut fields = FieldSet::new();
    fields.install(field);
    let Some(field) = fields.visible_field() else {
        bail!("no field to report");
    };

    let summary = field.summary();
    println!(
        "{} field: {} samples ({} line-of-sight, {} skipped), strength min {:.1} / mean {:.1} / max {:.1} dBm",
        field.mode, summary.samples, summary.line_of_sight, summary.skipped, summary.min_dbm, summary.mean_dbm, summary.max_dbm
    );

    if let Some(point) = args.probe {
        match field.nearest_sample(point) {
            Some(sample) => println!("{}", export::diagnostic_line(sample)),
            None => warn!("Field is empty, nothing to probe"),
        }
    }
    if let Some(path) = &args.diagnostics {
        export::save_diagnostics(field, path)?;
    }
    if let Some(path) = &args.json {
        export::save_json(field, &mapper, path)?;
    }
    if let Some(path) = &args.heatmap {
        if field.mode == SamplingMode::Ground {
            export::save_heatmap(field, path)?;
        } else {
            warn!("Heatmap is only available for 2d fields, skipping {}", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_parses_three_coordinates() {
        assert_eq!(parse_probe("1.5, -2,30").unwrap(), Vec3::new(1.5, -2.0, 30.0));
        assert!(parse_probe("1,2").is_err());
        assert!(parse_probe("a,b,c").is_err());
    }

    #[test]
    fn cli_accepts_all_flags() {
        let args = Args::try_parse_from([
            "urban-signal-propagation",
            "--scene",
            "city.json",
            "--mode",
            "3d",
            "--resolution",
            "10",
            "--vertical-resolution",
            "5",
            "--max-height",
            "60",
            "--index",
            "linear",
            "--seed",
            "7",
            "--sequential",
            "--probe",
            "0,10,0",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.mode, SamplingMode::Volume);
        assert_eq!(args.index, IndexKind::Linear);
        assert_eq!(args.seed, Some(7));
        assert!(args.sequential);
        assert_eq!(args.log_level, LevelFilter::Debug);
        assert_eq!(args.probe, Some(Vec3::new(0.0, 10.0, 0.0)));
    }

    #[test]
    fn seed_flag_overrides_config() {
        let args = Args::try_parse_from(["prog", "--scene", "/nonexistent/dir/city.json", "--seed", "99"]).unwrap();
        let config = load_config(&args).unwrap();
        assert_eq!(config.shadowing_seed, Some(99));
        assert_eq!(config.frequency_ghz, PropagationConfig::default().frequency_ghz);
    }
}
