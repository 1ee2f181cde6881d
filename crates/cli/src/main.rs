use std::process::ExitCode;

use clap::Parser;

mod commands;
mod event;
mod printer;

use commands::Command;
use ferry_runtime::logging;

#[derive(Debug, Parser)]
#[command(
    name = "ferry",
    version,
    about = "Push a synthetic event stream through a batching stage",
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

fn main() -> ExitCode {
    logging::init().ok();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => commands::run::run(args),
        Command::Config(args) => commands::config::run(args),
    }
}
