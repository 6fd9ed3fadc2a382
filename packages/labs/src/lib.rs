//! Shared scaffolding for the console labs: environment config, console
//! helpers, the SQLite sales store, and the query tools registered with
//! the model.

pub mod config;
pub mod console;
pub mod store;
pub mod tools;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging for a lab binary. `RUST_LOG` overrides the
/// default filter.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,openai_chat=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
