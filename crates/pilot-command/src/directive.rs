//! Text form of a function call as emitted by a language model:
//!
//! ```text
//! EXECUTE_FUNCTION: land
//! ARGUMENTS: {}
//! ```

use pilot_proto::function::{ARGS_MARKER, NAME_MARKER};
use pilot_proto::FunctionCall;
use serde_json::{Map, Value};
use tracing::debug;

/// Extracts the first directive in `text`.
///
/// Only the first name line and the first arguments line are used. A
/// missing arguments line means no arguments. Returns `None` when there is
/// no name, or the arguments are not a JSON object.
pub fn parse(text: &str) -> Option<FunctionCall> {
    let mut name: Option<&str> = None;
    let mut args: Option<&str> = None;

    for line in text.lines() {
        let line = line.trim();
        if name.is_none() {
            if let Some(rest) = line.strip_prefix(NAME_MARKER) {
                name = rest.split_whitespace().next();
                continue;
            }
        }
        if args.is_none() {
            if let Some(rest) = line.strip_prefix(ARGS_MARKER) {
                args = Some(rest.trim());
            }
        }
    }

    let name = name?;
    let arguments = match args {
        None | Some("") => Map::new(),
        Some(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(m)) => m,
            Ok(other) => {
                debug!("dispatch: arguments are not an object: {}", other);
                return None;
            }
            Err(e) => {
                debug!("dispatch: malformed arguments {:?}: {}", raw, e);
                return None;
            }
        },
    };
    Some(FunctionCall { name: name.to_string(), arguments })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_a_plain_directive() {
        let call = parse("EXECUTE_FUNCTION: arm_and_takeoff\nARGUMENTS: {\"altitude\": 20}").unwrap();
        assert_eq!(call, FunctionCall::new("arm_and_takeoff").arg("altitude", 20));
    }

    #[test]
    fn finds_directive_inside_prose() {
        let text = "Sure, taking off now.\n\n  EXECUTE_FUNCTION: land  \n  ARGUMENTS: {}\nLet me know!";
        assert_eq!(parse(text), Some(FunctionCall::new("land")));
    }

    #[test]
    fn only_the_first_directive_is_honored() {
        let text = "EXECUTE_FUNCTION: land\nARGUMENTS: {}\nEXECUTE_FUNCTION: arm_and_takeoff\nARGUMENTS: {\"altitude\": 5}";
        assert_eq!(parse(text), Some(FunctionCall::new("land")));
    }

    #[test]
    fn missing_arguments_line_means_empty_arguments() {
        assert_eq!(parse("EXECUTE_FUNCTION: get_status"), Some(FunctionCall::new("get_status")));
    }

    #[test]
    fn no_directive_or_bad_arguments_is_not_a_call() {
        assert_eq!(parse("The drone is at 20 meters."), None);
        assert_eq!(parse("EXECUTE_FUNCTION:\nARGUMENTS: {}"), None);
        assert_eq!(parse("EXECUTE_FUNCTION: land\nARGUMENTS: {not json"), None);
        assert_eq!(parse("EXECUTE_FUNCTION: land\nARGUMENTS: [1, 2]"), None);
    }
}
