use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use tracing::{error, info};

use avhs_control::config::{DeviceSection, MulticastSection};
use avhs_control::{Switcher, SwitcherConfig};
use avhs_protocol::host::{Action, InstanceStatus};
use avhs_protocol::tables::{DeviceModel, DeviceModelProfile, Table};

const CONNECT_WAIT: Duration = Duration::from_secs(6);

#[derive(Parser, Debug)]
#[command(name = "avhs-control", about = "Panasonic AV-HS switcher control")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config/switcher.toml", global = true)]
    config: PathBuf,

    /// Device IP, overrides the config file
    #[arg(long, env = "AVHS_HOST", global = true)]
    host: Option<String>,

    /// Device model (UHS500, HS410, HS50), overrides the config file
    #[arg(long, global = true)]
    model: Option<DeviceModel>,

    /// Enable multicast tally on this local interface address
    #[arg(long, global = true)]
    multicast_interface: Option<String>,

    /// Local addresses the multicast interface must be one of
    #[arg(long, value_delimiter = ',', global = true)]
    known_interfaces: Vec<Ipv4Addr>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stay connected and report tally variables as they change
    Run {
        /// Print one JSON object per change instead of log lines
        #[arg(long)]
        json: bool,
    },
    /// Route an input onto a bus (code or label)
    Xpt { bus: String, input: String },
    /// Send an AUTO transition
    Auto { target: String },
    /// Send a CUT transition
    Cut { target: String },
    /// List the protocol tables
    Tables {
        /// Only this model
        #[arg(value_name = "MODEL")]
        only: Option<DeviceModel>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match &args.command {
        Commands::Tables { only } => {
            print_tables(*only);
            Ok(())
        }
        Commands::Run { json } => {
            let config = load_config(&args).await?;
            run(config, args.known_interfaces.clone(), *json).await
        }
        Commands::Xpt { bus, input } => {
            let config = load_config(&args).await?;
            let profile = config.device.model.profile();
            let action = Action::Crosspoint {
                bus: resolve(&profile.buses, bus)?,
                input: resolve(&profile.inputs, input)?,
            };
            one_shot(config, args.known_interfaces.clone(), action).await
        }
        Commands::Auto { target } => {
            let config = load_config(&args).await?;
            let profile = config.device.model.profile();
            let action = Action::Auto {
                target: resolve(&profile.targets, target)?,
            };
            one_shot(config, args.known_interfaces.clone(), action).await
        }
        Commands::Cut { target } => {
            let config = load_config(&args).await?;
            let profile = config.device.model.profile();
            let action = Action::Cut {
                target: resolve(&profile.cut_targets, target)?,
            };
            one_shot(config, args.known_interfaces.clone(), action).await
        }
    }
}

/// Config file plus command-line overrides. The file may be absent if
/// `--host` is given.
async fn load_config(args: &Args) -> anyhow::Result<SwitcherConfig> {
    let mut config = if args.config.exists() {
        SwitcherConfig::load(&args.config).await?
    } else if args.host.is_some() {
        SwitcherConfig {
            device: DeviceSection {
                host: String::new(),
                model: DeviceModel::Hs410,
                port: None,
            },
            multicast: MulticastSection::default(),
        }
    } else {
        bail!(
            "config file {:?} not found and no --host given",
            args.config
        );
    };

    if let Some(host) = &args.host {
        config.device.host = host.clone();
    }
    if let Some(model) = args.model {
        config.device.model = model;
    }
    if let Some(interface) = &args.multicast_interface {
        config.multicast.enabled = true;
        config.multicast.interface = Some(interface.clone());
    }
    Ok(config)
}

fn resolve(table: &Table, wanted: &str) -> anyhow::Result<String> {
    let entry = table.resolve(wanted)?;
    Ok(entry.code.to_string())
}

async fn wait_connected(switcher: &Switcher) -> anyhow::Result<()> {
    let mut status = switcher.status_receiver();
    let wait = async {
        loop {
            match &*status.borrow_and_update() {
                InstanceStatus::Ok => return Ok(()),
                InstanceStatus::BadConfig(msg) | InstanceStatus::UnknownError(msg) => {
                    bail!("{msg}")
                }
                InstanceStatus::Disconnected | InstanceStatus::Connecting => {}
            }
            status.changed().await.context("connection task stopped")?;
        }
    };
    tokio::time::timeout(CONNECT_WAIT, wait)
        .await
        .map_err(|_| anyhow!("timed out waiting for the switcher"))?
}

async fn one_shot(
    config: SwitcherConfig,
    interfaces: Vec<Ipv4Addr>,
    action: Action,
) -> anyhow::Result<()> {
    let (switcher, handle) = Switcher::spawn(interfaces);
    switcher.configure(config).await?;

    let result = async {
        wait_connected(&switcher).await?;
        switcher.dispatch(action.clone()).await?;
        Ok::<_, anyhow::Error>(())
    }
    .await;

    switcher.shutdown().await?;
    handle.await?;

    if result.is_ok() {
        info!(?action, "Sent");
    }
    result
}

async fn run(config: SwitcherConfig, interfaces: Vec<Ipv4Addr>, json_output: bool) -> anyhow::Result<()> {
    let (switcher, handle) = Switcher::spawn(interfaces);
    let mut status_rx = switcher.status_receiver();
    let mut tally_rx = switcher.tally_receiver();
    switcher.configure(config).await?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = status_rx.borrow_and_update().clone();
                if let InstanceStatus::BadConfig(msg) = &status {
                    error!("Switcher reports bad config: {}", msg);
                }
            }
            changed = tally_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = tally_rx.borrow_and_update().clone();
                let variables = snapshot.variables();
                if json_output {
                    let values: Map<String, Value> = variables
                        .into_iter()
                        .map(|(id, value)| (id.to_string(), Value::String(value)))
                        .collect();
                    let line = json!({
                        "status": switcher.status(),
                        "multicast": snapshot.multicast,
                        "variables": values,
                    });
                    println!("{line}");
                } else {
                    for (id, value) in variables {
                        info!(variable = id, value = %value, "Tally");
                    }
                }
            }
        }
    }

    info!("Shutting down...");
    switcher.shutdown().await?;
    handle.await?;
    Ok(())
}

fn print_tables(model: Option<DeviceModel>) {
    let models: Vec<DeviceModel> = match model {
        Some(model) => vec![model],
        None => DeviceModel::ALL.to_vec(),
    };
    for model in models {
        print_profile(model.profile());
    }
}

fn print_profile(profile: &DeviceModelProfile) {
    println!("{} ({})", profile.name, profile.model.id());
    println!("══════════════════════════════");
    match profile.multicast_port {
        Some(port) => println!("  Port:       {} ({} with multicast tally)", profile.port, port),
        None => println!("  Port:       {}", profile.port),
    }
    match profile.keepalive {
        Some(period) => println!("  Keepalive:  {} ms", period.as_millis()),
        None => println!("  Keepalive:  none"),
    }
    for table in [
        &profile.buses,
        &profile.inputs,
        &profile.targets,
        &profile.cut_targets,
    ] {
        println!("  {}:", table.kind());
        for entry in table.entries() {
            println!("    {:>4}  {}", entry.code, entry.label);
        }
    }
    println!();
}
