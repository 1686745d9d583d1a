use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "signlink", about = "SignLink - captions to sign clips")]
pub struct CliArgs {
    /// Settings file, created on first write
    #[arg(long, global = true, default_value = "signlink.json")]
    pub settings: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Play sign clips for a timed transcript against a simulated video clock
    Replay {
        /// JSON transcript: `[{"start": 0.0, "end": 1.2, "text": "..."}]`
        #[arg(long)]
        transcript: PathBuf,

        /// Simulated length of every sign clip
        #[arg(long, default_value_t = 1200)]
        clip_ms: u64,
    },

    /// Read caption lines from stdin and play their sign clips
    Captions {
        #[arg(long, default_value_t = 1200)]
        clip_ms: u64,
    },

    /// Show settings, or store a new backend URL
    Config {
        #[arg(long)]
        backend_url: Option<String>,
    },
}
