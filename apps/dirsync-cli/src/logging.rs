//! Tracing subscriber setup
//!
//! Logs go to stderr so plan and summary output on stdout stays clean.

use tracing_subscriber::EnvFilter;

/// Filter directives used when `RUST_LOG` is not set.
pub fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "info,dirsync=debug,dirsync_cli=debug,dirsync_reconcile=debug,dirsync_graph=debug"
    } else {
        "warn,dirsync=info,dirsync_cli=info,dirsync_reconcile=info,dirsync_graph=info"
    }
}

/// Install the global subscriber.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .init();
}
