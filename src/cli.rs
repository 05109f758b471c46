use clap::{Parser, ValueEnum};

#[derive(Parser)]
#[command(name = "scout", about = "Sitemap-driven store discovery and inventory tracker")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Which run mode to execute
    #[arg(long, value_enum, default_value_t = CliMode::Tunnel)]
    pub mode: CliMode,

    /// Cap the number of stores visited this run
    #[arg(long)]
    pub max_stores: Option<u64>,

    /// Force the run to behave without the tunnel supervisor even if
    /// --mode tunnel was requested
    #[arg(long)]
    pub no_tunnels: bool,

    /// Don't write to storage; emit the run report to stdout only
    #[arg(long)]
    pub no_database: bool,

    /// Debug-level logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum CliMode {
    Tunnel,
    Enhanced,
    Basic,
}
