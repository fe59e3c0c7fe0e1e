//! rspi - Linux spidev transfer tool
//!
//! Opens a `/dev/spidevX.Y` node, configures mode and clock speed, and
//! clocks a buffer through it. Received bytes are printed as hex.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use commands::Action;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logger, RUST_LOG still takes precedence
    let default_filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let result = match cli.command {
        Commands::Transfer {
            device,
            at_speed,
            data,
        } => Action::transfer(&data, at_speed)
            .map_err(Into::into)
            .and_then(|action| commands::run(&device, action)),
        Commands::Write { device, data } => Action::write(&data)
            .map_err(Into::into)
            .and_then(|action| commands::run(&device, action)),
        Commands::Info { device } => commands::run(&device, Action::Info),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
