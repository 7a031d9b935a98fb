//! Event listener - example of subscribing to server notifications.
//!
//! This example demonstrates:
//! - Sharing a signal bus between the application and the engine
//! - Typed handlers for lifecycle and notification signals
//! - Registering for events with `servernotifyregister`
//! - Idling on `wait_for_event()` between commands
//!
//! # Running
//!
//! ```text
//! SQ_HOST=127.0.0.1 SQ_PORT=10011 SQ_USER=serveradmin SQ_PASS=secret \
//!     RUST_LOG=debug cargo run --example events
//! ```

use std::sync::Arc;
use std::time::Duration;

use serverquery_client::config::ConnectionConfig;
use serverquery_client::protocol::Command;
use serverquery_client::signal::{names, Handler, SignalBus};
use serverquery_client::{QueryError, ServerQuery, ADAPTER_KIND};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let host = std::env::var("SQ_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port = std::env::var("SQ_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(10011);

    let config = ConnectionConfig::builder()
        .host(host)
        .port(port)
        .blocking(false)
        .timeout(Duration::from_secs(5))
        .build()?;

    let signals = Arc::new(SignalBus::new());

    signals.subscribe(
        &names::connected(ADAPTER_KIND),
        Handler::on_unit(|| {
            tracing::info!("Connected");
            Ok(())
        }),
    )?;
    signals.subscribe(
        &names::wait_timeout(ADAPTER_KIND),
        Handler::on_elapsed(|elapsed| {
            tracing::info!("Still idle after {:?}", elapsed);
            Ok(())
        }),
    )?;
    signals.subscribe(
        "notifyTextMessage",
        Handler::on_event(|event| {
            tracing::info!(
                "{} says: {}",
                event.get("invokername").unwrap_or("?"),
                event.get("msg").unwrap_or_default()
            );
            Ok(())
        }),
    )?;
    signals.subscribe(
        names::NOTIFY_EVENT,
        Handler::on_event(|event| {
            tracing::debug!("Event {} with {} fields", event.name(), event.payload().len());
            Ok(())
        }),
    )?;

    let query = ServerQuery::builder()
        .config(config)
        .signals(signals)
        .connect()
        .await?;

    if let (Ok(user), Ok(pass)) = (std::env::var("SQ_USER"), std::env::var("SQ_PASS")) {
        query
            .run(
                &Command::new("login")
                    .arg("client_login_name", user)
                    .arg("client_login_password", pass),
            )
            .await?;
    }

    query.run(&Command::new("use").arg("sid", 1)).await?;
    query
        .run(&Command::new("servernotifyregister").arg("event", "textserver"))
        .await?;
    query
        .run(&Command::new("servernotifyregister").arg("event", "server"))
        .await?;

    loop {
        match query.wait_for_event().await {
            Ok(event) if event.name() == "notifyclientleftview" => {
                tracing::info!("Client {:?} left", event.get("clid"));
            }
            Ok(_) => {}
            Err(QueryError::WaitTimeout { .. }) => continue,
            Err(e) => {
                tracing::error!("Stopped listening: {}", e);
                break;
            }
        }
    }

    query.close().await;
    Ok(())
}
