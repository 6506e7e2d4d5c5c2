// src/bin/data_term_field.rs
//
// Evaluate the KillingFusion/SobolevFusion data term over a synthetic 2D scene.
//
// Builds a live/canonical TSDF pair (the synthetic orthographic scene, or one
// image row of two consecutive recorded depth frames), differentiates the live
// field, evaluates the data term at every cell and (optionally) smooths the
// resulting gradient with the Sobolev kernel.
//
// Examples:
//
//   cargo run --release --bin data_term_field
//       -> default 128x128 pair, serial pass, plots
//
//   cargo run --release --bin data_term_field -- --mimic-eta --live-smoothing 5 \
//         --parallel --sobolev --scaling-factor 2.5
//
//   cargo run --release --bin data_term_field -- --frames data/snoopy/frames \
//         --frame-index 10 --pixel-row 300 --fx 570.3 --fy 570.3 --cx 320 --cy 240
//       -> frames 10 / 11, row 300 (or the next non-empty row)
//
// Outputs (per run directory):
//   runs/<run_id>/
//     ├── config.json
//     ├── summary.json
//     ├── data_term.csv
//     ├── live.png / canonical.png
//     ├── energy.png
//     └── data_gradient.png

use clap::Parser;
use log::{info, warn};
use serde::Serialize;
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use sdf_fusion::config::{GeometryConfig, NumericsConfig, RunConfig, RunInfo};
use sdf_fusion::convolution::{
    convolve_with_kernel, convolve_with_kernel_preserve_zeros, SOBOLEV_KERNEL_1D,
};
use sdf_fusion::data_term::{compute_data_term, DataTermField, DataTermInputs};
use sdf_fusion::depth_frames::{CameraIntrinsics, FramePairOptions, FRAME_PAIR_ARRAY_OFFSET};
use sdf_fusion::gradient::field_gradient;
use sdf_fusion::logging::init_logging;
use sdf_fusion::params::{DataTermParams, OrthographicFieldOptions, DEFAULT_DATA_TERM_SCALING};
use sdf_fusion::scalar_field::ScalarField2D;
use sdf_fusion::tsdf::{generate_initial_orthographic_fields, DepthInterpolation, DepthRowParams};
use sdf_fusion::visualisation::{save_scalar_field_plot, save_vector_magnitude_plot};
use sdf_fusion::Result;

#[derive(Parser, Debug)]
#[command(name = "data_term_field")]
#[command(about = "Data term of a synthetic 2D live/canonical TSDF pair")]
struct Cli {
    /// Side length of the square fields, in voxels (at least 110)
    #[arg(long, default_value_t = 128)]
    field_size: usize,

    /// Narrow-band width, in voxels
    #[arg(long, default_value_t = 20)]
    band: usize,

    /// Limit the canonical field to 3 voxels behind its surface
    #[arg(long)]
    mimic_eta: bool,

    /// Gaussian kernel size for the live field (0 = off)
    #[arg(long, default_value_t = 0)]
    live_smoothing: usize,

    /// Gaussian kernel size for the canonical field (0 = off)
    #[arg(long, default_value_t = 0)]
    canonical_smoothing: usize,

    /// Data-term gradient scaling factor
    #[arg(long, default_value_t = DEFAULT_DATA_TERM_SCALING)]
    scaling_factor: f32,

    /// Evaluate rows in parallel
    #[arg(long)]
    parallel: bool,

    /// Smooth the data gradient with the Sobolev kernel
    #[arg(long)]
    sobolev: bool,

    /// Keep zero gradient components at zero while smoothing
    #[arg(long, requires = "sobolev")]
    preserve_zeros: bool,

    /// Directory of depth_*.png (and mask_*.png) frames; replaces the synthetic scene
    #[arg(long)]
    frames: Option<PathBuf>,

    /// Canonical frame index (live is the next frame)
    #[arg(long, default_value_t = 0)]
    frame_index: usize,

    /// Depth-image row to slice
    #[arg(long, default_value_t = 214)]
    pixel_row: usize,

    /// Rows searched when the requested one is empty: start,end
    #[arg(long, value_delimiter = ',', num_args = 2, default_values_t = [214, 400])]
    row_range: Vec<usize>,

    /// Fail instead of searching for another row when the requested one is empty
    #[arg(long, requires = "frames")]
    keep_empty_rows: bool,

    /// Ignore mask_*.png files
    #[arg(long, requires = "frames")]
    no_masks: bool,

    /// Sample depth bilinearly instead of at the nearest column
    #[arg(long, requires = "frames")]
    bilinear: bool,

    /// Depth camera focal lengths and principal point, in pixels
    #[arg(long, default_value_t = 525.0)]
    fx: f32,
    #[arg(long, default_value_t = 525.0)]
    fy: f32,
    #[arg(long, default_value_t = 319.5)]
    cx: f32,
    #[arg(long, default_value_t = 239.5)]
    cy: f32,

    /// Metres per raw depth unit
    #[arg(long, default_value_t = 0.001)]
    depth_unit_ratio: f32,

    /// Voxel size in metres (recorded frames only)
    #[arg(long, default_value_t = 0.004)]
    voxel_size: f32,

    /// Output root directory
    #[arg(long, default_value = "runs")]
    out: PathBuf,

    /// Run id (default: timestamp)
    #[arg(long)]
    run_id: Option<String>,

    /// Skip PNG output
    #[arg(long)]
    no_plots: bool,

    /// Log level (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Debug, Serialize)]
struct Summary {
    source: String,
    nx: usize,
    ny: usize,
    total_energy: f64,
    max_cell_energy: f32,
    max_gradient_norm: f32,
    cells_with_energy: usize,
}

fn sanitize_run_id(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn unix_now_s() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn default_run_id() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| std::time::Duration::from_secs(0));
    format!("{}{:03}_data_term", now.as_secs(), now.subsec_millis())
}

fn unique_run_dir(out_root: &Path, run_id: &str) -> PathBuf {
    let mut dir = out_root.join(run_id);
    if !dir.exists() {
        return dir;
    }
    for k in 1..1000 {
        let cand = out_root.join(format!("{}_{}", run_id, k));
        if !cand.exists() {
            dir = cand;
            break;
        }
    }
    dir
}

fn write_data_term_csv(
    path: &Path,
    live: &ScalarField2D,
    canonical: &ScalarField2D,
    result: &DataTermField,
) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "x,y,live,canonical,gradient_x,gradient_y,energy")?;
    let grid = live.grid;
    for y in 0..grid.ny {
        for x in 0..grid.nx {
            let g = result.gradient.get(x, y);
            writeln!(
                w,
                "{},{},{:.6},{:.6},{:.6e},{:.6e},{:.6e}",
                x,
                y,
                live.get(x, y),
                canonical.get(x, y),
                g[0],
                g[1],
                result.energy.get(x, y)
            )?;
        }
    }
    w.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let fields = OrthographicFieldOptions {
        field_size: cli.field_size,
        narrow_band_width_voxels: cli.band,
        mimic_eta: cli.mimic_eta,
        live_smoothing_kernel_size: cli.live_smoothing,
        canonical_smoothing_kernel_size: cli.canonical_smoothing,
        ..OrthographicFieldOptions::default()
    };
    let frames = cli.frames.as_ref().map(|dir| FramePairOptions {
        directory: dir.clone(),
        canonical_frame_index: cli.frame_index,
        pixel_row: cli.pixel_row,
        row_range: [cli.row_range[0], cli.row_range[1]],
        replace_empty_rows: !cli.keep_empty_rows,
        use_masks: !cli.no_masks,
        camera: CameraIntrinsics {
            fx: cli.fx,
            fy: cli.fy,
            cx: cli.cx,
            cy: cli.cy,
            depth_unit_ratio: cli.depth_unit_ratio,
        },
        depth: DepthRowParams {
            field_size: cli.field_size,
            voxel_size: cli.voxel_size,
            array_offset: FRAME_PAIR_ARRAY_OFFSET,
            narrow_band_width_voxels: cli.band,
            interpolation: if cli.bilinear {
                DepthInterpolation::Bilinear
            } else {
                DepthInterpolation::None
            },
            ..DepthRowParams::default()
        },
    });
    let params = DataTermParams::with_scaling_factor(cli.scaling_factor);
    params.validate()?;

    let run_id = sanitize_run_id(&cli.run_id.clone().unwrap_or_else(default_run_id));
    let run_dir = unique_run_dir(&cli.out, &run_id);
    create_dir_all(&run_dir)?;
    info!("writing outputs to {:?}", run_dir);

    let config = RunConfig {
        geometry: GeometryConfig {
            nx: cli.field_size,
            ny: cli.field_size,
        },
        fields,
        frames: frames.clone(),
        data_term: params,
        numerics: NumericsConfig {
            parallel: cli.parallel,
            sobolev_smoothing: cli.sobolev,
            preserve_zeros: cli.preserve_zeros,
        },
        run: RunInfo {
            binary: "data_term_field".to_string(),
            run_id: run_id.clone(),
            git_commit: None,
            timestamp_unix_s: Some(unix_now_s()),
        },
    };
    config.write_to_dir(&run_dir)?;

    let (live, canonical, source) = match &frames {
        Some(opts) => {
            let pair = opts.generate()?;
            let source = format!(
                "frames {:06}-{:06} line {:03}",
                pair.canonical_index,
                pair.canonical_index + 1,
                pair.pixel_row
            );
            info!("{}", source);
            (pair.live, pair.canonical, source)
        }
        None => {
            let (live, canonical) = generate_initial_orthographic_fields(&fields)?;
            (live, canonical, "synthetic orthographic".to_string())
        }
    };
    let (live_gx, live_gy) = field_gradient(&live);
    let inputs = DataTermInputs::new(&live, &canonical, &live_gx, &live_gy)?;
    let mut result = compute_data_term(&inputs, &params, cli.parallel)?;
    info!(
        "data term: total energy {:.6e}, max |gradient| {:.4e}",
        result.total_energy,
        result.gradient.max_norm()
    );

    if cli.sobolev {
        if cli.preserve_zeros {
            convolve_with_kernel_preserve_zeros(&mut result.gradient, &SOBOLEV_KERNEL_1D)?;
        } else {
            convolve_with_kernel(&mut result.gradient, &SOBOLEV_KERNEL_1D)?;
        }
        info!(
            "sobolev-smoothed gradient: max |gradient| {:.4e}",
            result.gradient.max_norm()
        );
    }

    write_data_term_csv(&run_dir.join("data_term.csv"), &live, &canonical, &result)?;

    let summary = Summary {
        source,
        nx: live.grid.nx,
        ny: live.grid.ny,
        total_energy: result.total_energy,
        max_cell_energy: result.energy.min_max().map_or(0.0, |(_, hi)| hi),
        max_gradient_norm: result.gradient.max_norm(),
        cells_with_energy: result.energy.data.iter().filter(|&&e| e > 0.0).count(),
    };
    let summary_file = BufWriter::new(File::create(run_dir.join("summary.json"))?);
    serde_json::to_writer_pretty(summary_file, &summary)?;

    if !cli.no_plots {
        let plots = [
            save_scalar_field_plot(&live, &run_dir.join("live.png"), Some((-1.0, 1.0))),
            save_scalar_field_plot(&canonical, &run_dir.join("canonical.png"), Some((-1.0, 1.0))),
            save_scalar_field_plot(&result.energy, &run_dir.join("energy.png"), None),
            save_vector_magnitude_plot(&result.gradient, &run_dir.join("data_gradient.png")),
        ];
        for err in plots.into_iter().filter_map(|r| r.err()) {
            warn!("plot not written: {}", err);
        }
    }

    info!("done: {:?}", run_dir);
    Ok(())
}
