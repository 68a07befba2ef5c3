//! CLI argument parsing

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "pppoxy")]
#[command(version, about = "PPPoE-over-TCP tunneling proxy", long_about = None)]
pub struct Cli {
    /// Network interface carrying the PPPoE traffic
    #[arg(short = 'I', long)]
    pub interface: String,

    /// Run as 'client' or 'server'
    #[arg(short, long, default_value = "client")]
    pub mode: String,

    /// Listen address (server) or server address to dial (client)
    #[arg(short, long)]
    pub address: String,

    /// Source IP allowed to connect; required in server mode
    #[arg(long, value_name = "IP")]
    pub allowed_ip: Option<String>,

    /// Verbose output (-v, -vv for increasing verbosity)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
