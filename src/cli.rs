use std::path::PathBuf;

/// Serve a music library over DACP/DAAP so Remote-compatible clients can
/// browse and control an MPD instance.
#[derive(clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Path to the TOML configuration file. Defaults to the platform
    /// config directory (see `Config::default_path`).
    #[arg(long)]
    pub config: Option<PathBuf>,
}
