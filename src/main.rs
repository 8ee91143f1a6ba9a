//! Pyramid Stitcher - rebuild full images from deep-zoom tile pyramids.
//!
//! This binary reads a widget's scene document, stitches one level of each
//! selected pyramid folder and writes the joined images.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pyramid_stitcher::{
    fetch_scene, normalize_widget_url, output_path, save_image, Config, HttpTileSource,
    PyramidFolder, StitchRequest, Stitcher,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    run(config).await
}

async fn run(config: Config) -> ExitCode {
    let widget_url = match normalize_widget_url(&config.url) {
        Ok(url) => url,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let stitch_config = config.stitch_config();
    let stitcher = match Stitcher::http(&stitch_config) {
        Ok(stitcher) => stitcher,
        Err(e) => {
            error!("Failed to create HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Widget: {}", widget_url);
    info!("Cache directory: {}", stitch_config.cache_root.display());
    debug!(
        concurrency = stitch_config.max_concurrent_fetches,
        timeout_secs = stitch_config.request_timeout.as_secs(),
        "Stitch configuration"
    );

    let scene = match fetch_scene(stitcher.source().client(), &widget_url).await {
        Ok(scene) => scene,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let folders = match scene.folders() {
        Ok(folders) => folders,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = tokio::fs::create_dir_all(&config.out).await {
        error!("Failed to create output directory {}: {}", config.out.display(), e);
        return ExitCode::FAILURE;
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling downloads");
            ctrl_c.cancel();
        }
    });

    let mut processed = 0usize;
    let mut failed = 0usize;

    for folder in &folders {
        if !folder.matches(config.name.as_deref()) {
            debug!("Skipping {} because of the folder name filter", folder.name);
            continue;
        }
        if cancel.is_cancelled() {
            break;
        }

        processed += 1;
        match process_folder(&config, &stitcher, &widget_url, folder, &cancel).await {
            Ok(path) => info!("Wrote {}", path.display()),
            Err(e) => {
                error!("Folder {} failed: {}", folder.name, e);
                failed += 1;
            }
        }
    }

    if processed == 0 {
        warn!("No pyramid folder matched");
    }

    if failed > 0 || cancel.is_cancelled() {
        error!("{} of {} folder(s) failed", failed, processed);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Stitch one folder and write the joined image.
async fn process_folder(
    config: &Config,
    stitcher: &Stitcher<HttpTileSource>,
    widget_url: &str,
    folder: &PyramidFolder,
    cancel: &CancellationToken,
) -> Result<PathBuf, String> {
    let location = folder.location(widget_url);

    let mut request = StitchRequest::new(location, folder.metadata.clone())
        .with_force_refresh(config.force_download);
    if let Some(level) = config.level {
        request = request.with_level(level);
    }

    info!("Folder: {}", folder.name);
    debug!(
        url = %request.source.base_url,
        metadata = ?folder.metadata,
        "Folder source"
    );

    let output = stitcher
        .stitch(&request, cancel)
        .await
        .map_err(|e| e.to_string())?;

    let format = config.output_format(&folder.metadata.format);
    let path = output_path(
        &config.out,
        &folder.output_stem(output.report.level),
        format,
    );
    let quality = config.jpeg_quality;

    let target = path.clone();
    tokio::task::spawn_blocking(move || save_image(&output.image, &target, quality))
        .await
        .map_err(|e| format!("encoder task failed: {}", e))?
        .map_err(|e| e.to_string())?;

    Ok(path)
}

/// Initialize the logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "pyramid_stitcher=debug"
    } else {
        "pyramid_stitcher=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
