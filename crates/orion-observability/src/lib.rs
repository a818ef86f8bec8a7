//! Structured logging init shared by `orion-cli` and `orion-harness`
//! (spec's ambient stack: the teacher carries `tracing`/`tracing-subscriber`
//! across its crates for exactly this purpose).

use tracing_subscriber::EnvFilter;

/// Installs a `tracing-subscriber` fmt layer reading its filter from
/// `ORION_LOG`, falling back to `RUST_LOG`, falling back to `info`.
///
/// Safe to call more than once; later calls are no-ops (`set_global_default`
/// failures are swallowed since test binaries each call this independently).
pub fn init() {
    let filter = EnvFilter::try_from_env("ORION_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_does_not_panic_when_called_repeatedly() {
        init();
        init();
    }
}
