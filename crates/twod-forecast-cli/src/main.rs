use anyhow::Result;
use clap::Parser;
use twod_forecast_cli::{init_tracing, run_cli, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level());
    run_cli(cli)
}
