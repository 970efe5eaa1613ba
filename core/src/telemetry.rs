// Logging setup shared by the binaries
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` is used. Calling this
/// twice is harmless (the second install is ignored).
pub fn init_tracing(default_filter: &str) {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(true)
        .try_init();
}

/// Default filter for a binary named `bin`
pub fn default_filter(bin: &str) -> String {
    format!("info,onair_core=info,onair_audio=info,{bin}=info")
}
