// SPDX-License-Identifier: GPL-3.0-only

use camera_capture::backends::camera::ImageFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-capture")]
#[command(about = "Autofocus and still-capture engine, driven against a simulated camera")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the simulated camera's characteristics
    Info,

    /// Run a scripted capture session and save the photos
    Simulate {
        /// Number of photos to take
        #[arg(short = 'n', long, default_value = "3")]
        shots: u32,

        /// Digital zoom factor
        #[arg(short, long)]
        zoom: Option<f32>,

        /// Tap to focus at a normalized preview point, e.g. 0.5,0.25
        #[arg(short, long, value_parser = cli::parse_point)]
        tap: Option<(f32, f32)>,

        /// Make passive focus settle out of focus, forcing a pre-shot scan
        #[arg(long)]
        unfocused: bool,

        /// Flash mode (auto, on, off)
        #[arg(long, default_value = "auto")]
        flash: camera_capture::FlashMode,

        /// Still capture format (jpeg or yuv420)
        #[arg(short, long, value_parser = cli::parse_format)]
        format: Option<ImageFormat>,

        /// Output directory (default: ~/Pictures/camera-capture)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Config file (default: ~/.config/camera-capture/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_capture=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info => cli::show_info(),
        Commands::Simulate {
            shots,
            zoom,
            tap,
            unfocused,
            flash,
            format,
            output,
            config,
        } => cli::simulate(cli::SimulateOptions {
            shots,
            zoom,
            tap,
            unfocused,
            flash,
            format,
            output,
            config,
        }),
    }
}
