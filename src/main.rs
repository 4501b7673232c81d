//! ==============================================================================
//! main.rs - bloom snapper entry point
//! ==============================================================================
//!
//! purpose:
//!     one capture event, start to finish:
//!
//!         capture ──► resolve ──► compose ──► save
//!
//! responsibilities:
//!     - parse the command line and load the snapper config
//!     - initialise tracing
//!     - take the photo (camera.rs)
//!     - resolve the annotation, live or cached (annotation.rs)
//!     - burn it into the photo and write it back in place (composer.rs)
//!
//! failure policy:
//!     once the photo is taken it is never deleted. if no annotation can be
//!     produced the raw photo stays; `output.strict` decides whether that
//!     counts as a failed run. the annotated image is written to a temp file
//!     and renamed over the capture, so a failed save leaves the raw photo.
//!
//! ==============================================================================

use bloom_snapper::annotation::AnnotationService;
use bloom_snapper::cache::SnapshotCache;
use bloom_snapper::camera::{Camera, ImageGrabber};
use bloom_snapper::composer::{ComposerStyle, ImageAnnotator};
use bloom_snapper::config::SnapperConfig;
use bloom_snapper::controller::HttpController;
use bloom_snapper::domain::EnrichedView;

use anyhow::{bail, Context, Result};
use clap::Parser;
use image::{DynamicImage, ImageFormat};
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// bloom-snapper - annotated grow enclosure snapshots
#[derive(Parser, Debug)]
#[command(name = "bloom-snapper")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the snapper configuration file
    #[arg(short = 'c', long = "config-file", default_value = "../autobloomer_snapper_cfg.toml")]
    config_file: PathBuf,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // logging comes up before config errors are reported, so the level
    // falls back to "info" when the config itself is broken
    let config = SnapperConfig::load(&cli.config_file);
    let level = cli
        .log_level
        .clone()
        .or_else(|| config.as_ref().ok().map(|c| c.logging.level.clone()))
        .unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = match config {
        Ok(c) => {
            tracing::info!("[CONFIG] Loaded from {}", cli.config_file.display());
            c
        }
        Err(e) => {
            tracing::error!("[CONFIG] Could not obtain snapper config: {}", e);
            return Err(e.into());
        }
    };
    config.log_summary();

    run(config).await
}

async fn run(config: SnapperConfig) -> Result<()> {
    // step 1: capture
    let image_path = output_path(&config.output.image_destination)?;
    let grabber = ImageGrabber::new(config.camera.command.clone());
    let (width, height) = (config.camera.width, config.camera.height);
    let capture_path = image_path.clone();
    let captured = tokio::task::spawn_blocking(move || grabber.grab_image(width, height, &capture_path))
        .await
        .context("capture task panicked")?;
    if !captured {
        bail!("could not grab image");
    }
    tracing::info!("[CAPTURE] ✓ {}", image_path.display());

    // step 2: resolve annotation
    let controller = HttpController::new(&config.server).context("cannot build controller client")?;
    let service = AnnotationService::new(controller, SnapshotCache::new(&config.data.cache_directory));
    let view = service
        .resolve(&config.data.grow_system_id, &config.data.sensor_readings)
        .await;

    let Some(view) = view else {
        if config.output.strict {
            bail!(
                "no annotation available for grow system '{}'; photo kept unannotated at {}",
                config.data.grow_system_id,
                image_path.display()
            );
        }
        tracing::warn!("[ANNOTATE] No annotation available, keeping unannotated photo");
        return Ok(());
    };
    tracing::info!(
        rows = view.rows.len(),
        "[ANNOTATE] {} - {}",
        view.grow_system_name,
        view.age_text()
    );

    // step 3: compose + save
    let style_config = config.style.clone();
    let path = image_path.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let style = ComposerStyle::load(&style_config)?;
        annotate_in_place(&ImageAnnotator::new(style), &path, &view)
    })
    .await
    .context("annotation task panicked")?
    .with_context(|| format!("annotation failed, photo kept unannotated at {}", image_path.display()))?;

    tracing::info!("[SAVE] ✓ Annotated {}", image_path.display());
    Ok(())
}

/// `{destination}/{YYYYmmddHHMMSS}.jpg`, creating the destination if needed
fn output_path(destination: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(destination)
        .with_context(|| format!("cannot create image destination {}", destination.display()))?;
    let stamp = chrono::Local::now().format("%Y%m%d%H%M%S");
    Ok(destination.join(format!("{}.jpg", stamp)))
}

fn annotate_in_place(annotator: &ImageAnnotator, path: &Path, view: &EnrichedView) -> Result<()> {
    let annotated = annotator.annotate_file(path, view)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let temp = tempfile::NamedTempFile::new_in(dir).context("cannot create temp image")?;
    DynamicImage::ImageRgba8(annotated)
        .to_rgb8()
        .save_with_format(temp.path(), ImageFormat::Jpeg)
        .context("cannot encode annotated image")?;
    temp.persist(path)
        .with_context(|| format!("cannot replace {}", path.display()))?;
    Ok(())
}
