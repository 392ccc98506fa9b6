use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use resparse_codec::XmlAttribute;
use resparse_core::Apk;

const MANIFEST_ENTRY: &str = "AndroidManifest.xml";

#[derive(Parser)]
#[command(about = "Print [versionCode, versionName] for an APK")]
struct Cli {
    apk_file: PathBuf,
}

fn run(cli: Cli) -> Result<()> {
    let apk = Apk::open(&cli.apk_file)
        .with_context(|| format!("failed to open {:?}", cli.apk_file))?;
    let manifest = apk
        .parse_xml(MANIFEST_ENTRY, false, true)
        .context("failed to decode AndroidManifest.xml")?;

    let version_code = find_attr(&manifest.document.root.attributes, "versionCode");
    let version_name = find_attr(&manifest.document.root.attributes, "versionName");

    println!("[{}, {}]", version_code.unwrap_or("?"), version_name.unwrap_or("?"));
    Ok(())
}

fn find_attr<'a>(attrs: &'a [XmlAttribute], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|a| a.name == name)
        .map(|a| a.value.as_str())
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
