use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::bootstrap::parse_surface_size;

#[derive(Parser, Debug)]
#[command(
    name = "zonewall",
    author,
    version,
    about = "Three-zone signage display: stills, video and a scrolling ticker"
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Configuration file (defaults to `zonewall.toml` in the config directory).
    #[arg(long, value_name = "FILE", env = "ZONEWALL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory of still images for the picture zone.
    #[arg(long, value_name = "DIR")]
    pub images: Option<PathBuf>,

    /// Directory of videos for the video zone.
    #[arg(long, value_name = "DIR")]
    pub videos: Option<PathBuf>,

    /// Text shown in the scrolling ticker.
    #[arg(long, value_name = "TEXT")]
    pub ticker_text: Option<String>,

    /// Window size in physical pixels (e.g. `1600x900`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size_arg)]
    pub size: Option<(u32, u32)>,

    /// Seed for playlist shuffling; random when omitted.
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// Start with video audio muted.
    #[arg(long)]
    pub muted: bool,

    /// Hide the FPS overlay.
    #[arg(long)]
    pub no_fps: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect resolved directories.
    Paths(PathsCommand),
}

#[derive(Parser, Debug)]
pub struct PathsCommand {
    #[command(subcommand)]
    pub action: PathsAction,
}

#[derive(Subcommand, Debug)]
pub enum PathsAction {
    /// Print resolved directories for config, data, and cache.
    Where,
}

pub fn parse() -> Cli {
    Cli::parse()
}

fn parse_size_arg(value: &str) -> Result<(u32, u32), String> {
    parse_surface_size(value).map_err(|err| err.to_string())
}
