use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` wins over the configured filter when it is set. Calling this more than once is
/// harmless: later calls leave the first subscriber in place.
pub fn init(cfg: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok();

    if installed {
        tracing::trace!("Subscriber installed with filter {}", cfg.filter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_is_harmless() {
        let cfg = LogConfig::default();
        init(&cfg);
        init(&cfg);
        tracing::debug!("still logging");
    }
}
