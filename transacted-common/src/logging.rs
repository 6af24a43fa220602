//! Subscriber setup and span-scoped log macros.
//!
//! Events from the transacted crates are written through a compact fmt layer
//! with UTC timestamps. The maximum level is read from [`LOG_LEVEL_VAR`].

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    filter::Targets,
    fmt::time::ChronoUtc,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

/// Environment variable naming the maximum level, e.g. `LOG_LEVEL=debug`
pub const LOG_LEVEL_VAR: &str = "LOG_LEVEL";

/// Crates whose events reach the subscriber
const TARGETS: [&str; 3] = ["transacted_common", "transacted_tx", "transacted_errorhandler"];

/// Emit an event at `$level` with the named span entered around it
#[macro_export]
macro_rules! log_in {
    ($span:literal, $level:expr, $($arg:expr),+ $(,)?) => {{
        let _entered = $crate::tracing::span!($level, $span).entered();
        $crate::tracing::event!($level, $($arg),+)
    }};
}

/// Log inside the `transaction` span, for transaction boundary events.
/// Defaults to TRACE.
#[macro_export]
macro_rules! transaction {
    (level = $level:ident, $($arg:expr),+ $(,)?) => {
        $crate::log_in!("transaction", $crate::tracing::Level::$level, $($arg),+)
    };
    ($($arg:expr),+ $(,)?) => {
        $crate::transaction!(level = TRACE, $($arg),+)
    };
}

/// Log inside the `handler` span, for exception policy dispatch.
/// Defaults to TRACE.
#[macro_export]
macro_rules! handler {
    (level = $level:ident, $($arg:expr),+ $(,)?) => {
        $crate::log_in!("handler", $crate::tracing::Level::$level, $($arg),+)
    };
    ($($arg:expr),+ $(,)?) => {
        $crate::handler!(level = TRACE, $($arg),+)
    };
}

fn parse_level(value: &str) -> Option<LevelFilter> {
    value.trim().parse().ok()
}

fn max_level() -> LevelFilter {
    let fallback = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    let Ok(value) = std::env::var(LOG_LEVEL_VAR) else {
        return fallback;
    };

    parse_level(&value).unwrap_or_else(|| {
        // No subscriber exists yet to report this through
        eprintln!("{LOG_LEVEL_VAR}={value} is not a log level, using {fallback}");
        fallback
    })
}

/// Install the global subscriber.
///
/// # Errors
/// If a global subscriber has already been installed
pub fn try_init() -> Result<(), TryInitError> {
    let level = max_level();
    let targets = TARGETS
        .into_iter()
        .fold(Targets::new(), |targets, target| targets.with_target(target, level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_file(false)
                .with_line_number(false)
                .with_timer(ChronoUtc::rfc_3339()),
        )
        .with(targets)
        .try_init()
}

/// Like [`try_init`], but a second call is silently ignored
pub fn init() {
    let _ = try_init();
}
