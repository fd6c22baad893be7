//! gfcam binary: capture one still from the lid or head camera.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use gfcam::{Camera, CameraError, CaptureRequest, DeviceSettings};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Capture a single still image from the Glowforge camera.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Capture from the head camera instead of the lid camera
    #[arg(long, env = "GFCAM_HEAD")]
    head: bool,

    /// Sensor exposure (0-65535)
    #[arg(short, long, env = "GFCAM_EXPOSURE", default_value_t = 3000)]
    exposure: i64,

    /// Sensor gain (0-1023)
    #[arg(short, long, env = "GFCAM_GAIN", default_value_t = 30)]
    gain: i64,

    /// Capture device path
    #[arg(short, long, env = "GFCAM_DEVICE", default_value = gfcam::config::DEFAULT_DEVICE_PATH)]
    device: PathBuf,

    /// Bound on the frame wait, in milliseconds
    #[arg(long, env = "GFCAM_TIMEOUT_MS", default_value_t = 2000)]
    timeout_ms: u64,

    /// Save the uncompressed RGB capture, in the format named by the file
    /// extension
    #[arg(long)]
    rgb: bool,

    /// Output file
    #[arg(default_value = "capture.jpeg")]
    filename: PathBuf,
}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to save {}: {source}", .path.display())]
    Save {
        path: PathBuf,
        source: image::ImageError,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(err) = run(Args::parse()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), AppError> {
    let settings = DeviceSettings::default()
        .with_device_path(&args.device)
        .with_wait_timeout(Duration::from_millis(args.timeout_ms));
    let camera = Camera::with_settings(settings);

    let request = CaptureRequest::new(i64::from(args.head))
        .with_exposure(args.exposure)
        .with_gain(args.gain);

    if args.rgb {
        let image = camera.capture_rgb(&request)?;
        let (width, height) = (image.width(), image.height());
        let buffer = image.into_rgb_image().ok_or_else(|| {
            CameraError::Encoding(format!("RGB buffer does not match {width}x{height}"))
        })?;
        buffer.save(&args.filename).map_err(|source| AppError::Save {
            path: args.filename.clone(),
            source,
        })?;
    } else {
        let jpeg = camera.capture_jpeg(&request)?;
        std::fs::write(&args.filename, jpeg.as_bytes()).map_err(|source| AppError::Write {
            path: args.filename.clone(),
            source,
        })?;
    }

    tracing::info!(path = %args.filename.display(), "saved capture");
    Ok(())
}
