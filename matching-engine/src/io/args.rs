use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to a JSON engine config file
    /// Defaults apply for any field the file omits
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Base URL of the primary quote provider
    #[arg(long, default_value = "https://finnhub.io/api/v1")]
    pub primary_url: String,

    /// Base URL of the backup quote provider
    #[arg(long, default_value = "https://query1.finance.yahoo.com")]
    pub backup_url: String,
}
