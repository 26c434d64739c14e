use anyhow::Result;
use std::io::IsTerminal as _;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt::Layer as FmtLayer, layer::SubscriberExt as _, Layer as _, Registry};

/// `-v` shows what is sent to the API server, `-vv` everything.
pub fn level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Log to stderr; stdout is reserved for protocol responses.
pub fn set_up(verbosity: u8) -> Result<()> {
    let fmt_layer = FmtLayer::new()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_filter(level(verbosity));
    let subscriber = Registry::default().with(fmt_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("failed to set up tracing: {}", e))?;

    Ok(())
}
