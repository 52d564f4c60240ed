//! # Chat Core Server
//!
//! Entry point for the chat connection core. Initializes:
//! - Tracing/logging subsystem
//! - Configuration loading
//! - Reactor pool, dispatcher, and TCP acceptor
//!
//! Business-logic handlers live in their own services; the ping handler
//! registered here demonstrates the handler seam and keeps a bare deployment
//! answering health probes.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use chat_core::config::Settings;
use chat_core::net::Session;
use chat_core::startup::Application;

/// Client liveness probe.
const MESSAGE_PING: u16 = 1001;
/// Reply to [`MESSAGE_PING`].
const MESSAGE_PING_RESPONSE: u16 = 1002;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for structured logging
    chat_core::telemetry::init_tracing();

    info!("Starting Chat Core...");

    // Load configuration from environment and config files
    let settings = Settings::load()?;
    info!(
        host = %settings.server.host,
        port = %settings.server.port,
        environment = %settings.environment,
        "Configuration loaded"
    );

    let application = Application::build(settings).await?;

    application.dispatcher().register_handler(
        MESSAGE_PING,
        |session: Arc<Session>, _message_id: u16, _body: &[u8]| {
            let reply = serde_json::json!({ "error": 0 });
            if let Err(e) = session.send(MESSAGE_PING_RESPONSE, reply.to_string().as_bytes()) {
                tracing::warn!(session_id = %session.id(), error = %e, "ping reply failed");
            }
        },
    );

    info!("Server ready to accept connections");
    application.run_until_stopped().await?;

    Ok(())
}
