use std::sync::OnceLock;

use anyhow::Result;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

static RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

fn env_filter() -> EnvFilter {
    // RUST_LOG controls the logging level.
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::INFO.into()))
}

pub fn setup_tracing() -> Result<()> {
    let (filter, handle) = reload::Layer::new(env_filter());
    let subscriber = Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact());
    tracing::subscriber::set_global_default(subscriber)?;
    let _ = RELOAD_HANDLE.set(handle);
    Ok(())
}

/// Raise verbosity when the transform asks for debug logging. A no-op when
/// tracing was never set up (tests).
pub fn enable_debug() {
    if let Some(handle) = RELOAD_HANDLE.get() {
        let filter = EnvFilter::default().add_directive(LevelFilter::DEBUG.into());
        if handle.reload(filter).is_ok() {
            tracing::debug!("debug logging enabled by transform");
        }
    }
}
