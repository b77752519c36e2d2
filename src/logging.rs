//! Tracing initialization.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "NOTION_HARNESS_LOG";

static INIT: Once = Once::new();

/// Initialize the global subscriber.
///
/// Reads `NOTION_HARNESS_LOG` (e.g. `notion_harness=debug,rmcp=warn`) and
/// falls back to `info`. Output goes to stderr because stdout carries the
/// MCP stdio transport. Safe to call more than once.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .with(filter)
            .init();
    });
}
