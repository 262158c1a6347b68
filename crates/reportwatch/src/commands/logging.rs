//! Logging initialization and configuration.
//!
//! Long-running commands log to stdout. One-shot commands print their
//! results on stdout, so their logs go to a file in the platform log
//! directory instead.

use reportwatch_util::{LogConfig, LogLevel};
use std::path::PathBuf;

/// Initialize logging based on verbosity and mode.
///
/// Returns the log file path if logging to file.
pub fn init_logging(verbose: bool, foreground: bool, level: Option<LogLevel>) -> Option<PathBuf> {
    let level = level.unwrap_or_default();
    let directives = if verbose {
        "reportwatch=debug,reportwatch_core=debug,reportwatch_storage=debug,reportwatch_server=debug,tower_http=debug".to_string()
    } else if foreground {
        // Include info-level HTTP request logging when serving
        format!("{level},tower_http=info", level = level.as_str())
    } else {
        level.as_str().to_string()
    };

    let file = if foreground {
        None
    } else {
        reportwatch_util::log::default_log_path()
    };

    let config = LogConfig {
        print: foreground,
        level,
        directives: Some(directives),
        include_location: verbose,
        file: file.clone(),
    };

    if let Err(e) = reportwatch_util::log::init(config) {
        eprintln!("Warning: Could not open log file: {e}");
        return None;
    }

    file
}
