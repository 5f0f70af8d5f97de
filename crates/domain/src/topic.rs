//! Inbound topic and payload parsing.

use crate::error::ValidationError;

/// A parsed inbound message, after the device reference has been resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRoute {
    /// Command segment, e.g. `power` or `tv/volume`.
    pub command: String,
    /// Normalized payload: trimmed and lower-cased.
    pub action: String,
}

impl TopicRoute {
    /// Build a route from its parts; the payload is normalized.
    #[must_use]
    pub fn new(command: impl Into<String>, payload: &[u8]) -> Self {
        Self {
            command: command.into(),
            action: normalize_action(payload),
        }
    }
}

/// Decode a payload as UTF-8 (lossily), trim it and lower-case it.
#[must_use]
pub fn normalize_action(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).trim().to_lowercase()
}

/// `on` and `1` switch on; anything else switches off.
#[must_use]
pub fn is_switched_on(action: &str) -> bool {
    action.eq_ignore_ascii_case("on") || action == "1"
}

/// Socket addressing for multi-socket strips.
///
/// Accepts `power` with an `<index>/<state>` payload, or `power/<index>` with
/// a `<state>` payload. Returns `None` when the command is not a power
/// command at all.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidSocket`] when the index is missing, not
/// a number, or outside `1..=sockets`.
pub fn parse_socket(
    command: &str,
    action: &str,
    sockets: u8,
) -> Result<Option<(u8, bool)>, ValidationError> {
    let (index, state) = match command.split_once('/') {
        Some(("power", index)) => (index, action),
        None if command == "power" => action
            .split_once('/')
            .ok_or_else(|| ValidationError::InvalidSocket(action.to_string()))?,
        _ => return Ok(None),
    };
    let socket = index
        .trim()
        .parse::<u8>()
        .ok()
        .filter(|socket| (1..=sockets).contains(socket))
        .ok_or_else(|| ValidationError::InvalidSocket(index.to_string()))?;
    Ok(Some((socket, is_switched_on(state.trim()))))
}

/// Parse an actuator target in percent.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidPercentage`] for non-numbers and values
/// above 100.
pub fn parse_percentage(action: &str) -> Result<u8, ValidationError> {
    action
        .trim()
        .parse::<u8>()
        .ok()
        .filter(|value| *value <= 100)
        .ok_or_else(|| ValidationError::InvalidPercentage(action.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_normalize_payload() {
        let route = TopicRoute::new("power", b"  ON \n");
        assert_eq!(route.action, "on");
        assert_eq!(route.command, "power");
    }

    #[test]
    fn should_switch_on_for_on_and_one_in_any_case() {
        for action in ["on", "ON", "On", "1"] {
            assert!(is_switched_on(action), "{action}");
        }
        for action in ["off", "0", "true", "", "yes", "11"] {
            assert!(!is_switched_on(action), "{action}");
        }
    }

    #[test]
    fn should_parse_socket_from_payload() {
        assert_eq!(parse_socket("power", "2/on", 4), Ok(Some((2, true))));
    }

    #[test]
    fn should_parse_socket_from_topic() {
        assert_eq!(parse_socket("power/2", "on", 4), Ok(Some((2, true))));
    }

    #[test]
    fn should_produce_same_call_for_both_socket_forms() {
        for state in ["on", "off", "1", "0"] {
            assert_eq!(
                parse_socket("power", &format!("3/{state}"), 4),
                parse_socket("power/3", state, 4)
            );
        }
    }

    #[test]
    fn should_reject_out_of_range_socket() {
        assert_eq!(
            parse_socket("power/5", "on", 4),
            Err(ValidationError::InvalidSocket("5".into()))
        );
        assert!(parse_socket("power/0", "on", 4).is_err());
        assert!(parse_socket("power", "on", 4).is_err());
    }

    #[test]
    fn should_ignore_non_power_commands() {
        assert_eq!(parse_socket("light", "on", 4), Ok(None));
        assert_eq!(parse_socket("tv/power", "on", 4), Ok(None));
    }

    #[test]
    fn should_parse_percentage() {
        assert_eq!(parse_percentage("42"), Ok(42));
        assert_eq!(parse_percentage("100"), Ok(100));
        assert!(parse_percentage("101").is_err());
        assert!(parse_percentage("half").is_err());
    }
}
