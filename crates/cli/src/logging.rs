//! Logging setup for the chatdex binary.

/// Console logging, INFO by default, overridable via RUST_LOG.
pub fn init() {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
    .init();
}
