use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};
use zoneconfig::DisplayConfig;

use crate::cli::RunArgs;
use crate::paths::AppPaths;

/// Creates the directories zonewall reads from and writes to.
pub fn bootstrap_filesystem(paths: &AppPaths, config: &DisplayConfig) -> Result<()> {
    let mut directories = vec![
        paths.config_dir().to_path_buf(),
        paths.data_dir().to_path_buf(),
        paths.cache_dir().to_path_buf(),
    ];
    if let Some(cache_dir) = config.video.cache_dir.as_ref() {
        directories.push(cache_dir.clone());
    }

    for dir in directories {
        ensure_directory(&dir)?;
    }
    Ok(())
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    if path.exists() {
        if path.is_dir() {
            debug!(path = %path.display(), "reusing existing directory");
            Ok(())
        } else {
            bail!("filesystem entry at {} is not a directory", path.display());
        }
    } else {
        fs::create_dir_all(path).with_context(|| {
            format!("failed to create zonewall directory at {}", path.display())
        })?;
        info!(path = %path.display(), "created zonewall directory");
        Ok(())
    }
}

/// Layers command-line flags and discovered defaults over the file config.
pub fn apply_overrides(config: &mut DisplayConfig, args: &RunArgs, paths: &AppPaths) {
    if let Some(dir) = args.images.as_ref() {
        config.images.dir = Some(dir.clone());
    }
    if let Some(dir) = args.videos.as_ref() {
        config.video.dir = Some(dir.clone());
    }
    if let Some(text) = args.ticker_text.as_ref() {
        config.ticker.text = text.clone();
    }
    if let Some((width, height)) = args.size {
        config.surface.width = width;
        config.surface.height = height;
    }
    if args.muted {
        config.video.muted = true;
    }
    if args.no_fps {
        config.surface.show_fps = false;
    }

    config
        .images
        .dir
        .get_or_insert_with(|| paths.default_image_dir());
    config
        .video
        .dir
        .get_or_insert_with(|| paths.default_video_dir());
    config
        .video
        .cache_dir
        .get_or_insert_with(|| paths.video_cache_dir());
}

pub fn parse_surface_size(value: &str) -> Result<(u32, u32)> {
    let trimmed = value.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| anyhow::anyhow!("expected WxH format, e.g. 1600x900"))?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid width in size specification"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid height in size specification"))?;

    if width == 0 || height == 0 {
        bail!("surface dimensions must be greater than zero");
    }

    Ok((width, height))
}
