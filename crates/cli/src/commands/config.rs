use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use ferry_runtime::default_settings_path;
use log::error;

use crate::commands::SettingsArgs;

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(flatten)]
    pub settings: SettingsArgs,
}

pub fn run(args: ConfigArgs) -> ExitCode {
    match execute(args) {
        Ok(code) => code,
        Err(e) => {
            error!("[error] {e:#}");
            eprintln!("[config] {e:#}");
            ExitCode::from(2)
        }
    }
}

fn execute(args: ConfigArgs) -> Result<ExitCode> {
    let settings = args.settings.resolve()?;

    let source = args
        .settings
        .config
        .clone()
        .unwrap_or_else(default_settings_path);
    eprintln!("[config] file: {}", source.display());

    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(ExitCode::SUCCESS)
}
