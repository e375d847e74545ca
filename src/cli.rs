use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "spedup-mv")]
#[command(author, version, about = "Sped-up and slowed music video renderer")]
pub struct Cli {
    /// Path to config file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Render a single video in the foreground
    Run {
        /// Source audio: local path, direct media URL or video page URL
        #[arg(required = true)]
        source: String,

        /// Background image or animation: local path or URL
        #[arg(short, long, required = true)]
        background: String,

        /// Treat the background as an animation and loop it
        #[arg(long)]
        looping: bool,

        /// Speed ratio: a number, or `nightcore` / `slowed`
        #[arg(short, long, default_value = "nightcore")]
        speed: String,

        /// Display title (defaults to the fetched title)
        #[arg(short, long)]
        title: Option<String>,

        /// Text drawn over the background
        #[arg(long)]
        overlay: Option<String>,

        /// Write a credits manifest next to the output
        #[arg(long)]
        manifest: bool,

        /// Destination directory (overrides config)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Print the final status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show detected hardware acceleration and the encoder ladder
    Capabilities {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses --config if not specified)
        config: Option<PathBuf>,
    },
}
