use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use resparse_core::Apk;

const MANIFEST_ENTRY: &str = "AndroidManifest.xml";

#[derive(Parser)]
#[command(about = "Decode an APK's manifest to pretty, resolved XML")]
struct Cli {
    apk_file: PathBuf,
    out_file: PathBuf,
}

fn run(cli: Cli) -> Result<()> {
    let apk = Apk::open(&cli.apk_file)
        .with_context(|| format!("failed to open {:?}", cli.apk_file))?;
    let manifest = apk
        .parse_xml(MANIFEST_ENTRY, true, true)
        .context("failed to decode AndroidManifest.xml")?;
    fs::write(&cli.out_file, manifest.text)
        .with_context(|| format!("failed to write {:?}", cli.out_file))?;
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
