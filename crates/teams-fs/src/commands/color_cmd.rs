//! Palette-to-tmux color mapping command

use anyhow::Result;
use clap::Args;
use codex_teams_core::Color;

#[derive(Args, Debug)]
pub struct ColorMapArgs {
    #[arg(long)]
    color: String,
}

pub fn execute(args: ColorMapArgs) -> Result<()> {
    match args.color.parse::<Color>() {
        Ok(color) => println!("{}", color.tmux_border()),
        Err(_) => println!("default"),
    }
    Ok(())
}
