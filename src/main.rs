use anyhow::Result;
use log::{LevelFilter, error, info, warn};
use tokio::sync::broadcast::error::RecvError;

use falcons_deck_lib::commands;
use falcons_deck_lib::config::AppConfig;
use falcons_deck_lib::core::ManagerEvent;
use falcons_deck_lib::state::{self, AppState};
use falcons_deck_lib::{logging, utils};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init(LevelFilter::Info);

    let config_dir = utils::default_config_dir();
    let config = match AppConfig::load_config(&config_dir).await {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to load config, using default: {}", e);
            AppConfig::default()
        }
    };

    info!("Starting AppState initialization.");
    let mut app_state = AppState::new(config).await?;

    let mut manager_events = app_state.connection_manager.lock().await.subscribe();
    tokio::spawn(async move {
        loop {
            match manager_events.recv().await {
                Ok(ManagerEvent::ConnectedCountChanged(count)) => info!("Connected devices: {}", count),
                Ok(ManagerEvent::DeviceConnected(index)) => info!("Device {} ready", index),
                Ok(ManagerEvent::DeviceDisconnected(index)) => info!("Device {} disconnected", index),
                Ok(ManagerEvent::DeviceError { index, message }) => error!("Device {}: {}", index, message),
                Ok(ManagerEvent::TelemetryChanged { .. }) => {}
                Err(RecvError::Lagged(skipped)) => warn!("Missed {} manager events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let found = app_state.scanner.lock().await.subscribe();
    commands::start_scan(&app_state).await.map_err(anyhow::Error::msg)?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Cannot listen for Ctrl-C: {}", e);
        }
        info!("Interrupted, shutting down");
    };
    state::auto_connect(app_state.get_connection_manager_arc(), found, shutdown).await;

    for record in commands::list_devices(&app_state).await {
        info!(
            "{} {} [{}] {}",
            record.display_name, record.address, record.kind, record.connection_state
        );
    }
    app_state.shutdown().await
}
