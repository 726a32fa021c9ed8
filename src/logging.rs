//! Ambient logging. Structured via `tracing`, with `DISTRIBOX_LOG`
//! (falling back to `RUST_LOG`) selecting the filter the way the rest of
//! the corpus lets an env var override an otherwise-quiet default.

use tracing_subscriber::EnvFilter;

pub fn init(debug: bool) {
    let default_directive = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("DISTRIBOX_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
