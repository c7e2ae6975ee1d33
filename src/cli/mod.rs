use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "naka")]
#[command(about = "Police duty assignment and geofence tracking service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// YAML settings file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Use the in-process store instead of PostgreSQL
    #[arg(long, global = true)]
    pub memory: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        #[arg(long, default_value = "8080")]
        port: u16,
    },

    /// Close out every lapsed duty once and exit
    Sweep,

    /// Print the geofence polygon for a circle
    Circle {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lng: f64,

        #[arg(long, default_value = "100")]
        radius: f64,

        #[arg(long)]
        sides: Option<usize>,
    },
}
