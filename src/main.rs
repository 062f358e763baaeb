use std::env;
use std::sync::Arc;
use std::time::Duration;
use sunmi_printer::{
    Alignment, CommandEvent, ConnectionManager, ManagerConfig, PrinterStatus, ProbeReport,
    QrErrorLevel, SimulatedBackend,
};
use tracing::{error, info, warn};

/// Packages the simulated device pretends to have installed.
const DEFAULT_INSTALLED: &str = "com.sunmi.printerservice";

fn load_config() -> anyhow::Result<ManagerConfig> {
    match env::var("SUNMI_PRINTER_CONFIG") {
        Ok(path) if !path.is_empty() => {
            let config = ManagerConfig::load(&path)?;
            info!("Config loaded from {}", path);
            Ok(config)
        }
        _ => {
            info!("No config file set, using vendor defaults");
            Ok(ManagerConfig::default())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with structured output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .init();

    info!("========================================");
    info!("Sunmi Printer Demo Starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("========================================");

    let config = load_config()?;

    let installed = env::var("SUNMI_INSTALLED_SERVICES").unwrap_or_else(|_| DEFAULT_INSTALLED.to_string());
    let backend = Arc::new(SimulatedBackend::new(
        installed
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from),
    ));

    let report = ProbeReport::collect(&*backend, &config.identities);
    info!("\n{}", report);
    if !report.has_any() {
        warn!("No printer service found on this device, commands will be dropped");
    }

    let manager = ConnectionManager::new(backend.clone(), config.identities.clone());
    manager.set_connection_listener(|connected| {
        if connected {
            info!("Printer connected");
        } else {
            warn!("Printer disconnected");
        }
    });

    // Issued before any connection exists: queued, then replayed in order
    let header = manager.print_text_with_font("Sunmi V1s\n", "default", 24.0, Alignment::Center);
    manager.print_text("Connection manager demo\n", Alignment::Center);
    manager.print_qr_code("https://www.sunmi.com", 8, QrErrorLevel::H);
    manager.line_wrap(3);

    if let Err(e) = manager.reconnect_with_backoff(&config.reconnect).await {
        error!("Could not reach a printer service: {}", e);
        info!("\n{}", manager.connection_info());
        return Ok(());
    }

    match header.outcome().await {
        Some(CommandEvent::RunResult(true)) => info!("Header printed"),
        other => warn!("Header did not print cleanly: {:?}", other),
    }

    let status = manager.status().await;
    info!("Printer status: {}", status);
    if status == PrinterStatus::Normal {
        manager.print_text(format!("Status: {}\n", status.description()), Alignment::Center);
    }
    info!("\n{}", manager.connection_info());

    // Service death: the manager rebinds on its own
    if backend.kill() {
        manager.line_wrap(1);
        tokio::time::sleep(Duration::from_millis(200)).await;
        manager.reconnect_with_backoff(&config.reconnect).await?;
        info!("\n{}", manager.connection_info());
    }

    manager.disconnect();
    info!("Sunmi Printer Demo shutting down...");
    Ok(())
}
