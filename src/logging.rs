//! Logging bootstrap for the server binary.
//!
//! A long-running server writes to stderr under the process supervisor's
//! control rather than to a fixed file of its own — unlike the desktop
//! dashboard this module started life in, there is no single-user `$HOME`
//! to drop a log file into. Level filtering is controlled by `RUST_LOG`
//! (`tracing_subscriber::EnvFilter`), defaulting to `info` when unset.
//!
//! A panic hook still logs the panic as a `tracing::error!` event before
//! delegating to the previous hook, so a worker-thread panic inside
//! `spawn_blocking` is visible in the structured log stream.

use tracing_subscriber::EnvFilter;

/// Initialise the global tracing subscriber. Call once at process startup.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    install_panic_hook();
}

fn install_panic_hook() {
    let prev_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "<unknown location>".to_string());

        let message = if let Some(s) = info.payload().downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "<non-string panic payload>".to_string()
        };

        tracing::error!(location = %location, "PANIC: {}", message);
        prev_hook(info);
    }));
}
