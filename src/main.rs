//! # LeadClaw — WhatsApp Outreach Sequence Engine
//!
//! Timed multi-step campaigns for lead nurturing: schedule planner,
//! channel dispatcher, bulk coordinator, and lifecycle webhooks behind
//! one HTTP gateway.
//!
//! Usage:
//!   leadclaw                       # Start the gateway (default port 8787)
//!   leadclaw --port 9000           # Custom port
//!   leadclaw --config ./dev.toml   # Explicit config file

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use leadclaw_core::config::LeadClawConfig;
use leadclaw_core::types::Step;
use leadclaw_dispatch::DispatchEngine;
use leadclaw_gateway::AppState;
use leadclaw_lifecycle::LifecycleReconciler;
use leadclaw_store::Store;
use leadclaw_transport::WhatsAppTransport;

#[derive(Parser)]
#[command(
    name = "leadclaw",
    version,
    about = "📬 LeadClaw — WhatsApp outreach sequence engine"
)]
struct Cli {
    /// Gateway port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Gateway bind address (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Config file path (default: ~/.leadclaw/config.toml or LEADCLAW_CONFIG)
    #[arg(short, long)]
    config: Option<String>,

    /// SQLite database path (overrides config)
    #[arg(long)]
    db_path: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Install the two lifecycle sequences on first run. Existing definitions
/// are never overwritten; the admin API owns them after that.
fn seed_sequences(store: &Store, config: &LeadClawConfig) -> leadclaw_core::error::Result<()> {
    let defaults = [
        (
            config.lifecycle.web_sent_sequence.as_str(),
            vec![
                {
                    let mut s = Step::text(
                        "¿Ya pudiste ver tu página de muestra? Ábrela desde tu celular, \
                         tarda menos de un minuto.",
                    );
                    s.delay = 60;
                    s
                },
                Step::text(
                    "Si algo no te convence dime y lo ajustamos. La muestra es tuya, \
                     sin compromiso.",
                ),
            ],
        ),
        (
            config.lifecycle.link_opened_sequence.as_str(),
            vec![
                {
                    let mut s = Step::text(
                        "¡Qué bien que ya viste tu página! ¿Qué te pareció?",
                    );
                    s.delay = 30;
                    s
                },
                Step::text(
                    "Si quieres la dejamos lista hoy mismo con tus datos y fotos. \
                     Respóndeme y lo vemos.",
                ),
            ],
        ),
    ];

    for (name, steps) in defaults {
        if store.get_sequence(name)?.is_none() {
            store.put_sequence(name, &steps)?;
            tracing::info!("📚 seeded default sequence '{}' ({} steps)", name, steps.len());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "leadclaw=debug,tower_http=debug"
    } else {
        "leadclaw=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    // Load config, then apply CLI overrides
    let mut config = match &cli.config {
        Some(path) => LeadClawConfig::load_from(std::path::Path::new(path))?,
        None => LeadClawConfig::load()?,
    };
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    if let Some(host) = cli.host {
        config.gateway.host = host;
    }
    if let Some(db_path) = cli.db_path {
        config.store.db_path = db_path;
    }

    let db_path = config.store.resolved_path();
    let store = Arc::new(Store::open(&db_path)?);
    seed_sequences(&store, &config)?;

    // The gateway stays up even without WhatsApp credentials — scheduling
    // still works, delivery fails per step until the transport is configured.
    let transport = Arc::new(WhatsAppTransport::new(config.whatsapp.clone()));
    match transport.connect().await {
        Ok(()) => tracing::info!("✅ WhatsApp transport connected"),
        Err(e) => tracing::warn!("⚠️ WhatsApp transport not ready: {e}"),
    }

    let engine = DispatchEngine::new(store.clone(), transport, &config.dispatch);

    // Re-arm schedule rows left pending by a previous process.
    match engine.resume_pending() {
        Ok(0) => {}
        Ok(n) => tracing::info!("🔁 resumed {n} pending step(s)"),
        Err(e) => tracing::warn!("⚠️ resume failed: {e}"),
    }

    let lifecycle = Arc::new(LifecycleReconciler::new(
        store.clone(),
        engine.clone(),
        config.lifecycle.clone(),
    ));

    println!("📬 LeadClaw v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "   🌐 Gateway:  http://{}:{}",
        config.gateway.host, config.gateway.port
    );
    println!("   🗄️  Database: {}", db_path.display());
    println!(
        "   👷 Workers:  {} (queue {})",
        config.dispatch.workers, config.dispatch.queue_capacity
    );
    println!();

    leadclaw_gateway::start(AppState {
        config,
        store,
        engine,
        lifecycle,
        start_time: std::time::Instant::now(),
    })
    .await
}
