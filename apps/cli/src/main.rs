use clap::Parser;
use sealstate_cli::{Cli, init_logger, run};
use std::process::ExitCode;

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let _log = init_logger(&cli)?;

    run(cli)
}
