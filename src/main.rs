use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use camgrab_rs::acquisition::{
    AcquisitionConfig, AcquisitionPipeline, FrameBuffer, ParameterKind, PixelFormat, SaveSession,
    SimulatedTransport, TiffCompression, list_cameras, open_camera, parameters,
    prepare_output_dir,
};
use camgrab_rs::logger;

use tracing::{error, info, warn};

/// Frame acquisition for industrial cameras.
///
/// Runs against the built-in simulated transport, which provides a
/// monochrome camera at index 0 and a Bayer colour camera at index 1.
#[derive(Parser, Debug)]
#[command(name = "camgrab", author, version, about, long_about = None)]
struct Cli {
    /// Index of the camera to use
    #[arg(short, long, global = true, default_value_t = 0)]
    camera: usize,

    /// Report parameter access and session progress
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List attached cameras
    List,
    /// Read a parameter as Float, Int, Bool or String
    Get { name: String, kind: ParameterKind },
    /// Write a parameter; the value is parsed according to the node's kind
    Set { name: String, value: String },
    /// Dump every node of the camera's node map
    Params,
    /// Capture frames into memory and print per-frame statistics
    Capture {
        #[arg(short = 'n', long, default_value_t = 1)]
        frames: usize,
        /// Output pixel format (defaults to the camera's PixelFormat)
        #[arg(short, long)]
        format: Option<PixelFormat>,
        /// Per-frame timeout in milliseconds
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },
    /// Capture frames and save each one as frame_NNNN.tif in a directory
    Save {
        dir: PathBuf,
        #[arg(short = 'n', long, default_value_t = 1)]
        frames: usize,
        #[arg(short, long)]
        format: Option<PixelFormat>,
        /// none, lzw, deflate-fast, deflate or deflate-best
        #[arg(long, default_value = "none")]
        compression: TiffCompression,
        /// Per-frame timeout in milliseconds
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
        /// Run the session on a background thread; its outcome is only logged.
        /// The process still waits for the session to finish before exiting.
        #[arg(long)]
        detach: bool,
    },
}

fn frame_stats(buffer: &FrameBuffer, frame: usize) -> (f64, f64, f64) {
    let layout = buffer.layout();
    let mut min = f64::MAX;
    let mut max = f64::MIN;
    let mut sum = 0.0;
    for band in 0..layout.samples_per_pixel {
        for row in 0..layout.height {
            for col in 0..layout.width {
                if let Some(v) = buffer.get(row, col, band, frame) {
                    min = min.min(v);
                    max = max.max(v);
                    sum += v;
                }
            }
        }
    }
    (min, max, sum / layout.frame_len() as f64)
}

fn main() -> anyhow::Result<()> {
    logger::init();
    let cli = Cli::parse();
    let transport = Arc::new(SimulatedTransport::demo());

    match cli.command {
        Command::List => {
            let cameras = list_cameras(transport.as_ref())?;
            if cameras.is_empty() {
                warn!("No camera found.");
            }
            for (index, device) in cameras {
                println!("{index}: {} ({})", device.model_name, device.serial_number);
            }
        }
        Command::Get { name, kind } => {
            let camera = open_camera(transport.as_ref(), cli.camera, cli.verbose)?;
            let value = parameters::get_parameter(&*camera, &name, kind, cli.verbose)?;
            println!("{value}");
        }
        Command::Set { name, value } => {
            let mut camera = open_camera(transport.as_ref(), cli.camera, cli.verbose)?;
            parameters::set_parameter_from_str(&mut *camera, &name, &value, cli.verbose)?;
            camera.close()?;
        }
        Command::Params => {
            let camera = open_camera(transport.as_ref(), cli.camera, cli.verbose)?;
            for node in parameters::dump_parameters(&*camera)? {
                let value = node.value.map(|v| v.to_string()).unwrap_or_default();
                println!("{:<32} {:<24} {:?}", node.name, value, node.visibility);
            }
        }
        Command::Capture {
            frames,
            format,
            timeout_ms,
        } => {
            let config = AcquisitionConfig::builder()
                .verbose(cli.verbose)
                .timeout(std::time::Duration::from_millis(timeout_ms))
                .build();
            let pipeline = AcquisitionPipeline::new(config);
            let mut camera = open_camera(transport.as_ref(), cli.camera, cli.verbose)?;
            let capture = pipeline.capture_images(&mut *camera, frames, format)?;
            camera.close()?;

            let [height, width, bands, _] = capture.buffer.layout().dims();
            println!(
                "{frames} frame(s) of {width}x{height}x{bands} {:?}",
                capture.buffer.element_type()
            );
            for (index, status) in capture.report.statuses.iter().enumerate() {
                let (min, max, mean) = frame_stats(&capture.buffer, index);
                println!("frame {index}: {status:?} min={min} max={max} mean={mean:.2}");
            }
        }
        Command::Save {
            dir,
            frames,
            format,
            compression,
            timeout_ms,
            detach,
        } => {
            let template = prepare_output_dir(&dir)
                .with_context(|| format!("cannot use output directory {}", dir.display()))?;
            let config = AcquisitionConfig::builder()
                .verbose(cli.verbose)
                .compression(compression)
                .timeout(std::time::Duration::from_millis(timeout_ms))
                .build();
            let session = SaveSession::new(transport, cli.camera, template, frames)
                .with_target(format)
                .with_config(config);

            if detach {
                let handle = session.spawn()?;
                info!("Acquisition running in the background");
                // the process must outlive the session thread; its outcome is only logged
                if handle.join().is_err() {
                    error!("Background acquisition did not complete");
                }
            } else if let Some(report) = session.run(false)? {
                for path in &report.written {
                    println!("{}", path.display());
                }
                for failed in &report.failed_writes {
                    warn!("Not written: {} ({})", failed.path.display(), failed.error);
                }
                if !report.failed_grabs.is_empty() {
                    warn!("Failed grabs: {:?}", report.failed_grabs);
                }
            }
        }
    }

    Ok(())
}
