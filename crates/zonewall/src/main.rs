mod bootstrap;
mod cli;
mod paths;
mod playback;
mod run;
mod video;

use anyhow::Result;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::run(cli)
}
