//! # faralite
//!
//! Access-control event hub binary: runs the device broker with its
//! dashboard consumer, a simulated device, or minimal user administration.

#![deny(unsafe_code)]

mod dashboard;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use faralite_device::{ClientStatus, DeviceClient, DeviceClientConfig, EventFactory};
use faralite_server::shutdown::DEFAULT_SHUTDOWN_TIMEOUT;
use faralite_server::{IngestionServer, ServerConfig};
use faralite_settings::FaraliteSettings;
use faralite_store::{Database, NewUser, UserRepo};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::dashboard::Dashboard;

/// How long `simulate --card` waits for the broker before giving up.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Faralite event hub.
#[derive(Parser, Debug)]
#[command(name = "faralite", version, about = "Access-control event hub")]
struct Cli {
    /// Settings file (defaults to `~/.faralite/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the device broker and the dashboard consumer (default).
    Serve {
        /// Host to bind (overrides settings).
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (overrides settings).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run a simulated device against a broker.
    Simulate {
        /// Broker URL (overrides settings).
        #[arg(long)]
        url: Option<String>,
        /// Device serial (overrides settings).
        #[arg(long)]
        serial: Option<String>,
        /// Send a single event for this card and exit.
        #[arg(long)]
        card: Option<String>,
        /// Stop after this many random events.
        #[arg(long)]
        count: Option<u64>,
    },
    /// Manage card holders.
    Users {
        #[command(subcommand)]
        action: UsersCommand,
    },
}

#[derive(Subcommand, Debug)]
enum UsersCommand {
    /// Register a card holder.
    Add {
        /// Letters and spaces only.
        #[arg(long)]
        name: String,
        /// Digits only.
        #[arg(long)]
        card: String,
        /// Explicit ID in 1..=5000.
        #[arg(long)]
        id: Option<i64>,
        #[arg(long, default_value = "")]
        unit: String,
        #[arg(long, default_value = "")]
        plate: String,
        /// Open, Limited or Restricted.
        #[arg(long, default_value = "Open")]
        permission: String,
    },
    /// Show the card holder for a card number.
    Lookup {
        /// Card number.
        card: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings = faralite_settings::load_settings_from(args.config.as_deref())
        .context("failed to load settings")?;
    faralite_logging::init_subscriber(&settings.logging)
        .context("failed to initialize logging")?;

    match args.command.unwrap_or(Command::Serve { host: None, port: None }) {
        Command::Serve { host, port } => serve(settings, host, port).await,
        Command::Simulate {
            url,
            serial,
            card,
            count,
        } => simulate(settings, url, serial, card, count).await,
        Command::Users { action } => users(&settings, action),
    }
}

fn open_database(settings: &FaraliteSettings) -> Result<Database> {
    let path = faralite_settings::resolve_path(
        &faralite_settings::faralite_home(),
        &settings.storage.db_path,
    );
    Database::open(&path)
        .with_context(|| format!("failed to open database at {}", path.display()))
}

async fn serve(
    mut settings: FaraliteSettings,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    if let Some(host) = host {
        settings.server.host = host;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }

    let db = open_database(&settings)?;

    let mut server = IngestionServer::new(ServerConfig::from(&settings.server));
    if settings.server.metrics_enabled {
        match faralite_server::metrics::install_recorder() {
            Ok(handle) => server = server.with_metrics(handle),
            Err(e) => warn!(error = %e, "metrics disabled"),
        }
    }

    // Subscribed before listening so no event is missed.
    let consumer = tokio::spawn(Dashboard::new(db).run(server.subscribe()));

    let (addr, handle) = server.listen().await.context("failed to bind device broker")?;
    info!(addr = %addr, "faralite broker listening on ws://{addr}");

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;

    info!("shutting down");
    if !server.shutdown(DEFAULT_SHUTDOWN_TIMEOUT).await {
        warn!("some sessions did not finish before the shutdown timeout");
    }
    let _ = handle.await;

    // Dropping the server closes the event stream, which ends the consumer.
    drop(server);
    if tokio::time::timeout(DEFAULT_SHUTDOWN_TIMEOUT, consumer).await.is_err() {
        warn!("dashboard consumer did not drain in time");
    }
    Ok(())
}

async fn simulate(
    mut settings: FaraliteSettings,
    url: Option<String>,
    serial: Option<String>,
    card: Option<String>,
    count: Option<u64>,
) -> Result<()> {
    if let Some(url) = url {
        settings.device.server_url = url;
    }
    if let Some(serial) = serial {
        settings.device.device_serial = serial;
    }
    let device = settings.device;
    let mut factory = EventFactory::new(device.device_serial.as_str(), device.site_code.as_str());
    let manual = card.map(|card| factory.event_for_card(&card)).transpose()?;

    let client = DeviceClient::spawn(DeviceClientConfig::from(&device));
    let mut status = client.subscribe_status();
    info!(url = %device.server_url, serial = %device.device_serial, "simulated device starting");

    if let Some(event) = manual {
        wait_connected(&client, &mut status).await?;
        let sent = client.send_event(&event);
        info!(card = %event.card_number, status = ?sent, "manual event sent");
        while client.pending() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        client.shutdown().await;
        return Ok(());
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(device.event_interval_ms.max(1)));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut sent_total: u64 = 0;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            update = status.recv() => match update {
                Ok(ClientStatus::GaveUp { attempts }) => {
                    client.shutdown().await;
                    bail!("gave up connecting to {} after {attempts} attempts", device.server_url);
                }
                Ok(update) => info!(status = ?update, "device status"),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            _ = ticker.tick() => {
                if !client.is_connected() {
                    warn!("not connected, event not sent");
                    continue;
                }
                let event = factory.random_event();
                let sent = client.send_event(&event);
                info!(
                    card = %event.card_number,
                    direction = %event.direction,
                    status = ?sent,
                    "random event sent"
                );
                sent_total += 1;
                if count.is_some_and(|limit| sent_total >= limit) {
                    break;
                }
            }
        }
    }

    while client.pending() > 0 && client.is_connected() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    client.shutdown().await;
    info!(sent = sent_total, "simulated device stopped");
    Ok(())
}

async fn wait_connected(
    client: &DeviceClient,
    status: &mut tokio::sync::broadcast::Receiver<ClientStatus>,
) -> Result<()> {
    let connected = tokio::time::timeout(CONNECT_TIMEOUT, async {
        while !client.is_connected() {
            match status.recv().await {
                Ok(ClientStatus::Connected) => return true,
                Ok(ClientStatus::GaveUp { .. }) | Err(RecvError::Closed) => return false,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
            }
        }
        true
    })
    .await;
    match connected {
        Ok(true) => Ok(()),
        Ok(false) => bail!("device client gave up connecting"),
        Err(_) => bail!("timed out connecting to broker"),
    }
}

fn users(settings: &FaraliteSettings, action: UsersCommand) -> Result<()> {
    let repo = UserRepo::new(open_database(settings)?);
    match action {
        UsersCommand::Add {
            name,
            card,
            id,
            unit,
            plate,
            permission,
        } => {
            let row = repo
                .insert(&NewUser {
                    id,
                    name,
                    card_number: card,
                    unit_number: unit,
                    plate_number: plate,
                    permission,
                })
                .context("failed to add user")?;
            println!("{}", serde_json::to_string_pretty(&row)?);
        }
        UsersCommand::Lookup { card } => match repo.find_by_card(&card)? {
            Some(row) => println!("{}", serde_json::to_string_pretty(&row)?),
            None => bail!("no user with card {card}"),
        },
    }
    Ok(())
}
