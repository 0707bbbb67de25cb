use clap::Parser;

/// Run the LiDAR-to-TUIO touch daemon.
#[derive(Debug, Parser)]
#[command(name = "lidar-touchd", about = "Real-time LiDAR touch fusion and TUIO emitter")]
pub struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "config.json")]
    pub config: String,

    /// Run against scripted mock scans instead of real hardware, using the
    /// scenario script named here.
    #[arg(long)]
    pub mock_scenario: Option<String>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}
