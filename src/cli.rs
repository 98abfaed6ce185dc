use clap::{Parser, Subcommand};
use pf_core::Device;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "photoforge")]
#[command(author, version, about = "Photogrammetry pipeline driver for COLMAP and OpenMVS")]
pub struct Cli {
    /// Path to config file
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
    /// Reconstruct a textured mesh from a directory of photos
    Run {
        /// Directory containing the input images
        #[arg(required = true)]
        dataset: PathBuf,

        /// Directory receiving intermediate artifacts and the result
        #[arg(short, long, default_value = "result")]
        result: PathBuf,

        /// Quality profile: SPEED, BALANCED or QUALITY
        #[arg(short, long)]
        profile: Option<String>,

        /// Compute device: AUTO, CPU or CUDA
        #[arg(short, long)]
        device: Option<Device>,

        /// Remove intermediate artifacts after a successful run
        #[arg(long)]
        clean: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that COLMAP and the OpenMVS tools are available
    CheckTools,

    /// Show the parameters a profile passes to each tool
    Profile {
        /// Profile to show (all profiles if omitted)
        name: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove intermediate artifacts, keeping the textured result
    Clean {
        /// Result directory of a finished run
        #[arg(required = true)]
        result_dir: PathBuf,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
