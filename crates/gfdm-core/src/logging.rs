//! Structured logging setup
//!
//! Initializes the `tracing` subscriber used by the receiver kernels. The
//! detector emits `debug!` events on frame detections and `trace!` events
//! for deferred or rejected peaks; host applications that already install
//! their own subscriber can skip this entirely.
//!
//! The filter honors `RUST_LOG` when set, falling back to the directive
//! passed by the caller.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a global `tracing` subscriber.
///
/// Safe to call more than once; later calls are no-ops if a subscriber is
/// already installed.
pub fn init_logging(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
