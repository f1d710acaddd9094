use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Directives read before falling back to `-v`.
pub const LOG_ENV: &str = "KBOX_LOG";

/// Install the stderr subscriber. `KBOX_LOG` wins over `-v`; the default only shows warnings.
pub fn init(verbose: u8) {
    let _ = tracing_subscriber::registry()
        .with(filter(verbose))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}

fn filter(verbose: u8) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
}

fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "kbox=warn",
        1 => "kbox=info",
        2 => "kbox=debug",
        _ => "kbox=trace",
    }
}
