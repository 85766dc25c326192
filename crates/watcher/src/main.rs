//! Terminal watcher: prints every new transaction touching the given
//! addresses until interrupted.

use std::{io, sync::Arc};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use watchline_domain::config::{split_list, WatcherConfig};
use watchline_domain::services::telemetry::{init_telemetry, TelemetryConfig};
use watchline_watcher::{listener_fn, AddressWatcher, TransactionListener, WatcherError};

#[tokio::main]
async fn main() -> io::Result<()> {
    if let Err(err) = bootstrap().await {
        eprintln!("[watchline] bootstrap failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}

async fn bootstrap() -> Result<(), WatcherError> {
    let config = WatcherConfig::load_from_env()?;
    let telemetry_config = TelemetryConfig::from_env("WATCHER");
    init_telemetry(&telemetry_config)?;

    let watcher = AddressWatcher::connect(&config)?;
    let printer: Arc<dyn TransactionListener> = Arc::new(listener_fn(|notice| {
        println!(
            "New transaction for {}: {}",
            notice.address, notice.signature.signature
        );
        Ok(())
    }));
    watcher.on_transaction(printer);

    let requested = if config.addresses().is_empty() {
        prompt_addresses().await?
    } else {
        config.addresses().to_vec()
    };
    for address in &requested {
        if let Err(err) = watcher.add_address(address) {
            warn!(address = address.as_str(), %err, "skipping address");
        }
    }
    if watcher.addresses().is_empty() {
        return Err(WatcherError::Io(io::Error::other(
            "no valid addresses to watch",
        )));
    }

    watcher.start(config.poll_interval())?;
    println!("Watching addresses. Press Ctrl+C to exit.");
    info!(
        addresses = watcher.addresses().len(),
        rpc = config.rpc_url(),
        commitment = %config.commitment(),
        "watchline running"
    );

    tokio::signal::ctrl_c().await?;
    watcher.stop();
    Ok(())
}

async fn prompt_addresses() -> Result<Vec<String>, WatcherError> {
    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(b"Enter addresses to watch (comma-separated): ")
        .await?;
    stdout.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(split_list(&line))
}
