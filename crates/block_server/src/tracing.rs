use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer};

fn env_filter() -> EnvFilter {
    // RUST_LOG controls the logging level.
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::default().add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
    })
}

pub fn setup_tracing() -> Result<()> {
    let log_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_filter(env_filter());
    let subscriber = tracing_subscriber::Registry::default().with(log_layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
