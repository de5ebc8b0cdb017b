/// Initialise the global `tracing` subscriber. Honors `RUST_LOG` when set,
/// otherwise defaults to `info` for this crate family and `warn` elsewhere.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "outreach=info,warn".into()),
        )
        .init();
}
