//! Macro scripts: line-oriented sequences of commands and pauses.
//!
//! ```text
//! # evening scene
//! tv/power
//! pause 1500
//! amplifier/input/hdmi
//! ```

use std::time::Duration;

use crate::command::CommandName;
use crate::error::ValidationError;

/// One step of a macro.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroStep {
    /// Replay a stored command.
    Replay(CommandName),
    /// Wait before the next step.
    Pause(Duration),
}

/// Parse a macro definition.
///
/// Blank lines and lines starting with `#` are skipped. `pause <ms>` waits;
/// any other line is a command name.
///
/// # Errors
///
/// Returns a validation error for a malformed pause or command name; no
/// steps are returned in that case.
pub fn parse(text: &str) -> Result<Vec<MacroStep>, ValidationError> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(parse_line)
        .collect()
}

fn parse_line(line: &str) -> Result<MacroStep, ValidationError> {
    if let Some(millis) = line.strip_prefix("pause ") {
        let millis = millis
            .trim()
            .parse::<u64>()
            .map_err(|_| ValidationError::InvalidPause(line.to_string()))?;
        return Ok(MacroStep::Pause(Duration::from_millis(millis)));
    }
    CommandName::new(line).map(MacroStep::Replay)
}
