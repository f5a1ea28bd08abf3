use std::sync::Arc;

use anyhow::{bail, Context, Result};
use assets::{AssetKind, AssetSource, DirectoryAssets, VideoCache};
use renderer::{
    CrossfadeCurve, GpuPowerPreference, ImageSource, PlaybackEngine, RendererConfig, SceneSettings,
    WindowRuntime, WindowSignal,
};
use tracing_subscriber::EnvFilter;
use zoneconfig::{CurveSetting, DisplayConfig, PowerSetting};

use crate::bootstrap::{apply_overrides, bootstrap_filesystem};
use crate::cli::{Cli, Command, PathsAction, RunArgs};
use crate::paths::AppPaths;
use crate::playback::GifEngine;
use crate::video::{VideoWorker, VideoWorkerParts};

const DEFAULT_FILTER: &str = "warn,zonewall=info,renderer=info,assets=info,scheduler=info,\
zoneconfig=info,naga=error,wgpu=error,wgpu_core=error,wgpu_hal=error";

pub fn run(cli: Cli) -> Result<()> {
    initialise_tracing();

    let paths = AppPaths::discover()?;
    tracing::debug!(
        config = %paths.config_dir().display(),
        data = %paths.data_dir().display(),
        cache = %paths.cache_dir().display(),
        "resolved zonewall paths"
    );

    match cli.command {
        Some(Command::Paths(command)) => match command.action {
            PathsAction::Where => {
                print_paths(&paths);
                Ok(())
            }
        },
        None => run_display(&cli.run, &paths),
    }
}

fn initialise_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn print_paths(paths: &AppPaths) {
    println!("config: {}", paths.config_dir().display());
    println!("config file: {}", paths.config_file().display());
    println!("data: {}", paths.data_dir().display());
    println!("images: {}", paths.default_image_dir().display());
    println!("videos: {}", paths.default_video_dir().display());
    println!("cache: {}", paths.cache_dir().display());
    println!("video cache: {}", paths.video_cache_dir().display());
}

/// Reads the config file, applies flags, and validates the result.
pub fn resolve_config(args: &RunArgs, paths: &AppPaths) -> Result<DisplayConfig> {
    let path = match args.config.as_ref() {
        Some(path) if !path.exists() => bail!("config file {} does not exist", path.display()),
        Some(path) => path.clone(),
        None => paths.config_file(),
    };
    let mut config = DisplayConfig::load_or_default(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    apply_overrides(&mut config, args, paths);
    config.validate().context("invalid configuration")?;
    tracing::debug!(path = %path.display(), "configuration resolved");
    Ok(config)
}

fn run_display(args: &RunArgs, paths: &AppPaths) -> Result<()> {
    let config = resolve_config(args, paths)?;
    bootstrap_filesystem(paths, &config)?;

    let seed = args.seed.unwrap_or_else(rand::random);
    tracing::info!(seed, "starting zonewall");

    let stills = DirectoryAssets::new(config.images.dir.clone(), None);
    let images = load_images(&stills, &config, seed);
    let runtime = WindowRuntime::spawn(renderer_config(&config, images))
        .context("failed to start the renderer")?;

    let engine = GifEngine::new(runtime.mailbox());
    let source: Arc<dyn AssetSource> = Arc::new(video_source(&config, &engine));

    let cache_dir = config
        .video
        .cache_dir
        .clone()
        .unwrap_or_else(|| paths.video_cache_dir());
    let mut pending = Some(VideoWorkerParts {
        source,
        cache: VideoCache::new(
            cache_dir,
            config.video.max_cache_bytes,
            config.video.min_free_bytes,
        ),
        engine: Box::new(engine),
        poster: runtime.poster(),
        mute: runtime.mute_flag(),
        mode: config.video.order,
        seed,
    });

    let mut worker = None;
    for signal in runtime.signals().iter() {
        match signal {
            WindowSignal::SurfaceReady => {
                if let Some(parts) = pending.take() {
                    worker = Some(VideoWorker::spawn(parts)?);
                }
            }
            WindowSignal::Closed => break,
        }
    }

    if let Some(worker) = worker {
        worker.stop();
    }
    runtime.wait()
}

/// Reads every still image in playlist order, skipping unreadable files.
pub fn load_images(source: &dyn AssetSource, config: &DisplayConfig, seed: u64) -> Vec<ImageSource> {
    let ids = match source.list(AssetKind::Image) {
        Ok(ids) => ids,
        Err(err) => {
            tracing::warn!("image listing failed: {err}; picture zone shows its fallback");
            return Vec::new();
        }
    };
    let ordered = scheduler::arrange_seeded(ids, config.images.order, seed);
    let images: Vec<ImageSource> = ordered
        .into_iter()
        .filter_map(|id| match source.read(&id) {
            Ok(bytes) => Some(ImageSource {
                name: id.name,
                bytes,
            }),
            Err(err) => {
                tracing::warn!("skipping image: {err}");
                None
            }
        })
        .collect();
    tracing::info!(images = images.len(), "still images loaded");
    images
}

/// Lists videos in any format the engine can play.
pub fn video_source(config: &DisplayConfig, engine: &dyn PlaybackEngine) -> DirectoryAssets {
    DirectoryAssets::new(None, config.video.dir.clone())
        .with_video_extensions(engine.extensions().iter().copied())
}

pub fn renderer_config(config: &DisplayConfig, images: Vec<ImageSource>) -> RendererConfig {
    RendererConfig {
        surface_size: (config.surface.width, config.surface.height),
        vsync: config.surface.vsync,
        power: match config.surface.power {
            PowerSetting::Low => GpuPowerPreference::Low,
            PowerSetting::High => GpuPowerPreference::High,
        },
        title: "zonewall".to_string(),
        scene: SceneSettings {
            rotation_interval: config.images.rotation,
            crossfade: config.images.crossfade,
            curve: match config.images.curve {
                CurveSetting::Linear => CrossfadeCurve::Linear,
                CurveSetting::Smoothstep => CrossfadeCurve::Smoothstep,
                CurveSetting::EaseInOut => CrossfadeCurve::EaseInOut,
            },
            ticker_text: config.ticker.text.clone(),
            ticker_speed: config.ticker.speed,
            ticker_smoothing: config.ticker.smoothing,
            ticker_height: config.ticker.texture_height,
            font_path: config.ticker.font.clone(),
            ticker_dump_dir: config.ticker.dump_dir.clone(),
            show_fps: config.surface.show_fps,
            clear_color: config.surface.clear_color,
        },
        images,
        start_muted: config.video.muted,
    }
}
