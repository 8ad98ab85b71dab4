use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use pktfwd_rs::hal::mock::MockConcentrator;
use pktfwd_rs::hal::Concentrator;
use pktfwd_rs::{fwd, init_logger, Config, FwdError};

#[derive(Parser)]
#[command(name = "pktfwd")]
#[command(about = "LoRaWAN gateway packet forwarder (Semtech UDP protocol)")]
struct Cli {
    /// Path of the global configuration file
    #[arg(short, long, default_value = "global_conf.json")]
    config: PathBuf,
}

fn open_concentrator(config: &Config) -> Result<Box<dyn Concentrator>, FwdError> {
    match config.sx130x.com_type.as_str() {
        "MOCK" => Ok(Box::new(MockConcentrator::wall_clock())),
        other => Err(FwdError::Config(format!(
            "com_type {other:?} needs the SX130x driver, which this build does not link"
        ))),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let concentrator = open_concentrator(&config)?;

    fwd::run(config, concentrator).await?;
    Ok(())
}
