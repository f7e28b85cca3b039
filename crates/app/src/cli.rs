use anyhow::Result;

use crate::{dual, tracking};

pub const USAGE: &str = "Usage: app <command> [flags]\n\nCommands:\n  \
track   Run one capture/estimate/stream pipeline (app track --help)\n  \
dual    Run two isolated pipelines in child processes (app dual --help)";

/// Dispatch a subcommand. Returns `Ok(false)` when no command matched so
/// the caller can print usage.
pub fn handle_commands(args: &[String]) -> Result<bool> {
    match args.get(1).map(|s| s.as_str()) {
        Some("track") => {
            tracking::run_from_args(args)?;
            Ok(true)
        }
        Some("dual") => {
            dual::run_from_args(args)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}
