//! Console demo binary
//!
//! Loads one admin list and prints it.
//!
//! ```text
//! console-demo                         # list the known resources
//! console-demo withdrawals status=pending
//! console-demo --offline withdrawals   # scripted server, no network
//! ```
//!
//! Live mode reads `ADMIN_API_BASE_URL`, `ADMIN_API_TOKEN` and friends from
//! the environment.

use anyhow::{Context, bail};
use resource_sync::mocks::MockTransport;
use resource_sync::{
    ConsoleConfig, FilterSet, HttpTransport, ResourceConfig, ResourceController, Transport,
    TransportResponse, catalog,
};
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let console = ConsoleConfig::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_new(&console.log_level)
                .unwrap_or_else(|_| "info,resource_sync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    resource_sync::describe_metrics();

    let mut args = std::env::args().skip(1).peekable();
    let offline = args.next_if(|arg| arg == "--offline").is_some();

    let Some(name) = args.next() else {
        println!("Known resources:");
        for config in catalog::all() {
            println!("  {:<14} {}", config.name, config.list_path);
        }
        return Ok(());
    };

    let config = catalog::by_name(&name)
        .with_context(|| format!("unknown resource: {name}"))?
        .with_console(&console);

    let mut filters = FilterSet::new();
    for arg in args {
        let Some((key, value)) = arg.split_once('=') else {
            bail!("filters are key=value, got {arg:?}");
        };
        filters.insert(key, value);
    }

    if offline {
        let transport = Arc::new(scripted(&config));
        run(ResourceController::new(config, transport), filters).await
    } else {
        tracing::info!(base_url = %console.base_url, "Using live API");
        let transport = Arc::new(HttpTransport::from_config(&console)?);
        run(ResourceController::new(config, transport), filters).await
    }
}

async fn run<T: Transport>(
    controller: ResourceController<T>,
    filters: FilterSet,
) -> anyhow::Result<()> {
    let name = controller.config().display_name.clone();
    let cursor = controller.fetch_list(filters).await?;

    println!(
        "{name}: page {} of {} ({} total)",
        cursor.page(),
        cursor.total_pages(),
        cursor.total
    );
    for record in controller.items().await {
        println!("  {}", record.into_value());
    }
    if cursor.has_more {
        println!("  ...");
    }

    controller.shutdown(controller.config().await_timeout).await?;
    Ok(())
}

/// A transport that answers one list request with sample rows
fn scripted(config: &ResourceConfig) -> MockTransport {
    let transport = MockTransport::new();
    let rows: Vec<_> = (1..=3)
        .map(|id| json!({"id": id, "status": "pending", "createdAt": "2025-06-01T10:00:00Z"}))
        .collect();
    transport.reply(TransportResponse::new(
        200,
        json!({
            "data": rows,
            "pagination": {"total": 3, "limit": config.page_size, "offset": 0}
        }),
    ));
    transport
}
