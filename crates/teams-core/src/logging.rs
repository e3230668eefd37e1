//! Tracing setup for the codex-teams binaries.

use tracing_subscriber::filter::LevelFilter;

/// Verbosity from `TEAMS_LOG` (`error`, `warn`, `info`, `debug`, `trace`,
/// or `off`). Unset or unparsable values fall back to `info`.
fn level_from(raw: Option<&str>) -> LevelFilter {
    raw.and_then(|value| value.trim().parse().ok())
        .unwrap_or(LevelFilter::INFO)
}

/// Install the process-wide subscriber.
///
/// Diagnostics go to stderr so command stdout stays machine-readable.
/// `try_init` refuses a second subscriber, which makes repeat calls from
/// library consumers harmless.
pub fn init() {
    let level = level_from(std::env::var("TEAMS_LOG").ok().as_deref());
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
