//! Logging and error tracking setup for host applications.

use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ClientConfig;

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "shopez_storefront=info";

/// Initialize Sentry error tracking and return the guard that must be kept
/// alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Install the global tracing subscriber, and Sentry when a DSN is
/// configured.
///
/// Sentry must be initialized before the subscriber, so call this once, early.
/// A second call leaves the existing subscriber in place.
#[must_use]
pub fn init(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let guard = init_sentry(config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_FILTER.into());

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .try_init();

    match installed {
        Ok(()) => tracing::info!(sentry = guard.is_some(), "Telemetry initialized"),
        Err(e) => tracing::debug!(error = %e, "Tracing subscriber already installed"),
    }
    guard
}
