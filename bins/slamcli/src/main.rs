//! slamcli — example front-end for the SLAM core.
//!
//! Reads a whitespace-delimited text log where each line is
//! `timestamp tick_l tick_r <20 ignored fields> r_0 r_1 ... r_{N-1}`,
//! drives the wheel ticks through `odometry` and the ranges through
//! `slam::Slam::update`, then writes the final occupancy grid as a PGM
//! image. All I/O and parsing lives here; the core crates stay free of it.

use clap::Parser;
use serde::Deserialize;
use slam::{Slam, SlamConfig};
use slam_types::LaserSpec;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const IGNORED_FIELDS: usize = 20;

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config file {path}: {source}")]
    Config { path: PathBuf, source: toml::de::Error },
    #[error("log line {line_no}: expected {expected} range fields, got {got}")]
    MalformedLine { line_no: usize, expected: usize, got: usize },
    #[error("log line {0}: failed to parse a numeric field")]
    ParseNumber(usize),
    #[error("odometry error on line {line_no}: {source}")]
    Odometry { line_no: usize, source: odometry::OdometryError },
    #[error("SLAM core error: {0}")]
    Slam(#[from] slam::SlamError),
}

/// TOML config file structure (layered under CLI flags).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct FileConfig {
    laser: LaserFileConfig,
    grid: GridFileConfig,
    rmhc: RmhcFileConfig,
    odometry: OdometryFileConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct LaserFileConfig {
    scan_size: usize,
    scan_rate_hz: f64,
    detection_angle_deg: f64,
    distance_no_detection_mm: f64,
    detection_margin: usize,
    offset_mm: f64,
}

impl Default for LaserFileConfig {
    fn default() -> Self {
        Self {
            scan_size: 682,
            scan_rate_hz: 5.0,
            detection_angle_deg: 240.0,
            distance_no_detection_mm: 4000.0,
            detection_margin: 1,
            offset_mm: 140.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GridFileConfig {
    size_pixels: usize,
    size_meters: f64,
    hole_width_mm: f64,
    quality: u32,
}

impl Default for GridFileConfig {
    fn default() -> Self {
        Self { size_pixels: 800, size_meters: 32.0, hole_width_mm: 600.0, quality: 50 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RmhcFileConfig {
    sigma_xy_mm: f64,
    sigma_theta_deg: f64,
    max_iter: u32,
    seed: u64,
}

impl Default for RmhcFileConfig {
    fn default() -> Self {
        Self { sigma_xy_mm: 100.0, sigma_theta_deg: 20.0, max_iter: 1000, seed: 0 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct OdometryFileConfig {
    wheel_radius_mm: f64,
    half_axle_mm: f64,
    ticks_per_radian: f64,
}

impl Default for OdometryFileConfig {
    fn default() -> Self {
        Self { wheel_radius_mm: 77.5, half_axle_mm: 165.0, ticks_per_radian: 1.0 }
    }
}

impl FileConfig {
    fn load(path: &std::path::Path) -> Result<Self, AppError> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)
                .map_err(|source| AppError::Config { path: path.to_path_buf(), source })
        } else {
            warn!(path = %path.display(), "config file not found, using defaults");
            Ok(FileConfig::default())
        }
    }
}

#[derive(Parser)]
#[command(name = "slamcli", about = "Replay a wheel-tick/range log through the SLAM core")]
struct Args {
    /// Path to the whitespace-delimited log file to replay.
    log_file: PathBuf,

    /// Path to the PGM map to write on completion.
    #[arg(long, default_value = "map.pgm")]
    output: PathBuf,

    /// Path to a TOML config file (missing file falls back to defaults).
    #[arg(short, long, default_value = "config/slamcli.toml")]
    config: PathBuf,

    /// Write an intermediate PGM snapshot every N log lines (0 disables).
    #[arg(long, default_value = "0")]
    snapshot_every: usize,

    /// Skip RMHC localization and run the odometry-only deterministic variant.
    #[arg(long)]
    no_localize: bool,

    /// Log level (trace, debug, info, warn, error); overridden by RUST_LOG.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("slamcli={}", args.log_level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(args) {
        Ok(()) => ExitCode::from(0),
        Err(
            err @ (AppError::Io(_)
            | AppError::Config { .. }
            | AppError::MalformedLine { .. }
            | AppError::ParseNumber(_)
            | AppError::Odometry { .. }),
        ) => {
            error!(%err, "replay failed");
            ExitCode::from(1)
        }
        Err(err) => {
            error!(%err, "slam core error");
            ExitCode::from(2)
        }
    }
}

fn run(args: Args) -> Result<(), AppError> {
    let file_config = FileConfig::load(&args.config)?;

    let laser = LaserSpec {
        scan_size: file_config.laser.scan_size,
        scan_rate_hz: file_config.laser.scan_rate_hz,
        detection_angle_deg: file_config.laser.detection_angle_deg,
        distance_no_detection_mm: file_config.laser.distance_no_detection_mm,
        detection_margin: file_config.laser.detection_margin,
        offset_mm: file_config.laser.offset_mm,
    };

    let slam_config = SlamConfig {
        hole_width_mm: file_config.grid.hole_width_mm,
        quality: file_config.grid.quality,
        localize: !args.no_localize,
        rmhc: localize::RmhcParams {
            sigma_xy_mm: file_config.rmhc.sigma_xy_mm,
            sigma_theta_deg: file_config.rmhc.sigma_theta_deg,
            max_iter: file_config.rmhc.max_iter,
        },
        seed: file_config.rmhc.seed,
        ..SlamConfig::default()
    };

    let mut slam =
        Slam::new(laser, file_config.grid.size_pixels, file_config.grid.size_meters, slam_config)?;
    let mut odo = odometry::WheelOdometry::new(
        file_config.odometry.wheel_radius_mm,
        file_config.odometry.half_axle_mm,
    );

    let file = fs::File::open(&args.log_file)?;
    let reader = BufReader::new(file);

    let expected_fields = 1 + 2 + IGNORED_FIELDS + laser.scan_size;
    let ticks_per_radian = file_config.odometry.ticks_per_radian;

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let (timestamp_s, tick_l, tick_r, ranges_mm) =
            parse_log_line(&line, line_no, expected_fields)?;

        let pose_change = odo
            .update(timestamp_s, tick_l / ticks_per_radian, tick_r / ticks_per_radian)
            .map_err(|source| AppError::Odometry { line_no, source })?;

        let pose = slam.update(&ranges_mm, pose_change)?;
        debug!(line_no, x = pose.x_mm, y = pose.y_mm, theta = pose.theta_deg, "replayed scan");

        if args.snapshot_every > 0 && line_no % args.snapshot_every == 0 {
            let snapshot_path = args.output.with_extension(format!("{line_no}.pgm"));
            write_pgm(&snapshot_path, file_config.grid.size_pixels, &slam.map_snapshot())?;
        }
    }

    write_pgm(&args.output, file_config.grid.size_pixels, &slam.map_snapshot())?;
    info!(path = %args.output.display(), pose = ?slam.pose(), "replay complete");

    Ok(())
}

/// Parse one log line into `(timestamp_s, tick_l, tick_r, ranges_mm)`.
///
/// Rejects any line whose whitespace-separated field count doesn't match
/// `expected_fields` before parsing a single number, so a malformed line
/// never has a chance to partially mutate caller state.
fn parse_log_line(
    line: &str,
    line_no: usize,
    expected_fields: usize,
) -> Result<(f64, f64, f64, Vec<u32>), AppError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != expected_fields {
        return Err(AppError::MalformedLine { line_no, expected: expected_fields, got: fields.len() });
    }

    let parse_f64 = |s: &str| s.parse::<f64>().map_err(|_| AppError::ParseNumber(line_no));
    let timestamp_s = parse_f64(fields[0])?;
    let tick_l = parse_f64(fields[1])?;
    let tick_r = parse_f64(fields[2])?;

    let ranges_start = 1 + 2 + IGNORED_FIELDS;
    let ranges_mm: Vec<u32> = fields[ranges_start..]
        .iter()
        .map(|s| s.parse::<u32>().map_err(|_| AppError::ParseNumber(line_no)))
        .collect::<Result<_, _>>()?;

    Ok((timestamp_s, tick_l, tick_r, ranges_mm))
}

/// Write a PGM greyscale image: `P2\n{S} {S} 255\n` followed by
/// whitespace-separated pixel values, one per snapshot byte.
fn write_pgm(path: &std::path::Path, size_pixels: usize, pixels: &[u8]) -> Result<(), AppError> {
    let mut out = String::with_capacity(pixels.len() * 4);
    out.push_str("P2\n");
    out.push_str(&format!("{size_pixels} {size_pixels} 255\n"));
    for (i, &b) in pixels.iter().enumerate() {
        if i > 0 {
            out.push(if (i % size_pixels) == 0 { '\n' } else { ' ' });
        }
        out.push_str(&b.to_string());
    }
    out.push('\n');

    let mut file = fs::File::create(path)?;
    file.write_all(out.as_bytes())?;
    Ok(())
}
