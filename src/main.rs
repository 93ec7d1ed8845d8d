//! spacelink - connect, register every space and log delivered data.

use std::sync::Arc;

use spacelink::Client;
use spacelink::config::Config;
use spacelink::data::DataObserver;
use spacelink::proto::DataObject;
use spacelink::telemetry;
use tracing::{error, info, warn};

struct LogObserver;

impl DataObserver for LogObserver {
    fn on_item(&self, object: &DataObject, space_id: &str) {
        info!(
            space_id = %space_id,
            name = %object.name,
            namespace = %object.namespace,
            id = ?object.id(),
            "data object received"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "spacelink.toml".to_string());

    let config = Config::load(&config_path)?;
    telemetry::init(&config.logging.level, config.logging.format);

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!(error = %e, "invalid configuration");
        }
        return Err(anyhow::anyhow!(
            "{} configuration error(s) in {}",
            errors.len(),
            config_path
        ));
    }

    info!(
        user = %config.session_settings().user(),
        host = %config.connection.host,
        "Starting spacelink"
    );

    let client = Client::from_config(&config).await?;
    client.data.add_observer(Arc::new(LogObserver));
    client.connect().await?;

    let spaces = client.spaces.list_all().await?;
    info!(count = spaces.len(), "spaces available");
    for space in &spaces {
        if let Err(e) = client.data.register_space(&space.id).await {
            warn!(space_id = %space.id, error = %e, code = e.error_code(), "failed to register space");
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    client.disconnect().await;
    Ok(())
}
