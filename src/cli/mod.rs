//! CLI Module
//!
//! Offline tools around the ambient effect engine.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Ambience - ambient effect tools for live voice streaming
#[derive(Parser, Debug)]
#[command(name = "ambience-cli")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print per-frame loudness of a WAV file
    #[command(name = "meter")]
    Meter {
        /// WAV file to analyse
        path: PathBuf,

        /// Frame length in milliseconds
        #[arg(long, default_value_t = 100)]
        frame_ms: u64,
    },

    /// Load a local effect directory and report what decoded
    #[command(name = "library")]
    Library {
        /// Directory containing index.json
        dir: PathBuf,
    },

    /// Store a WAV file in a local effect directory
    #[command(name = "upload")]
    Upload {
        /// Effect directory
        dir: PathBuf,

        /// WAV file to store
        file: PathBuf,

        /// Stored filename (defaults to the file's name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Replay the activity gate over recorded input and output
    #[command(name = "simulate")]
    Simulate {
        /// Microphone recording
        #[arg(long)]
        input: PathBuf,

        /// Converted output recording
        #[arg(long)]
        output: PathBuf,

        /// Trigger level in dB
        #[arg(long, allow_hyphen_values = true)]
        threshold: Option<f32>,

        /// Effect gain
        #[arg(long)]
        gain: Option<f32>,

        /// Silence budget in milliseconds
        #[arg(long)]
        budget_ms: Option<f64>,
    },
}
