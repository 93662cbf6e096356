// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod app;
mod compile;
mod config;
mod map;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eframe::egui;
use log::info;

use app::ReplayApp;
use config::AppConfig;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(version, about = "Replay recorded flight tracks on a map")]
struct Args {
    /// Track directory, overrides the configured one
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Open the track viewer (default)
    View,

    /// Convert IGC logs into track files
    Compile {
        /// Input directory containing IGC files
        #[arg(value_name = "IGC_DIR")]
        input: PathBuf,

        /// Output directory, defaults to the track directory
        #[arg(short, long, value_name = "JSON_DIR")]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let mut config = AppConfig::load_or_default();
    if let Ok(path) = AppConfig::get_config_path() {
        info!("Configuration file: {}", path.display());
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }

    match args.command.unwrap_or(Commands::View) {
        Commands::View => run_viewer(config)?,
        Commands::Compile { input, output } => {
            let output = output.unwrap_or_else(|| config.data_dir.clone());
            compile::compile(&input, &output)?;
        }
    }
    Ok(())
}

fn run_viewer(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting Flight Replay...");

    // Playback timers and render tasks are spawned from the UI thread
    let runtime = tokio::runtime::Runtime::new()?;
    let _guard = runtime.enter();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1400.0, 800.0])
            .with_title("Flight Replay"),
        ..Default::default()
    };

    eframe::run_native(
        "Flight Replay",
        options,
        Box::new(|_cc| Ok(Box::new(ReplayApp::new(config)))),
    )?;
    Ok(())
}
