use anyhow::Context as _;
use btleplug::api::Manager as _;
use btleplug::platform::Manager;
use clap::Parser;
use log::info;

mod advertiser;
mod audio;
mod beacon;
mod config;
mod manager;
mod messages;
mod mqtt;
mod presenter;

#[derive(Parser, Debug)]
#[command(version, about = "BLE shark warning beacon monitor")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let args = Args::parse();

    let config_contents = std::fs::read_to_string(&args.config)
        .with_context(|| format!("reading {}", args.config.display()))?;
    let config: config::AppConfig = toml::de::from_str(&config_contents)?;

    info!(
        "Beacon region {} ({}), role {:?}",
        config.beacon.name, config.beacon.uuid, config.role
    );

    let bt_manager = Manager::new().await?;

    // get the first bluetooth adapter
    let adapters = bt_manager.adapters().await?;
    let adapter = adapters.into_iter().next();

    match config.role {
        config::Role::Beacon => manager::run_beacon_loop(adapter, &config).await,
        config::Role::Monitor => {
            let adapter = adapter.context("no Bluetooth adapter found")?;
            let (mqtt_client, eventloop) = mqtt::MqttClient::new(&config.mqtt);
            let core = manager::Manager::new(adapter, mqtt_client, eventloop, &config);
            core.run_loop().await
        }
    }
}
