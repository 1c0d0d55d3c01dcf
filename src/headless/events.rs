//! Event DSL parser for headless mode.
//!
//! Parses event strings like "execute", "param:region=us", "wait:100ms" into
//! commands for a running session.

use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::error::{QueryViewError, Result};
use crate::model::{Schedule, VisualizationId};
use crate::view::{ExecuteOptions, ViewSnapshot};

/// An assertion to check against the transcript or the view state.
#[derive(Debug, Clone)]
pub enum Assertion {
    /// Transcript contains text (case-insensitive).
    Contains(String),
    /// Transcript does not contain text.
    NotContains(String),
    /// Transcript matches regex pattern.
    Matches(Regex),
    /// Snapshot field equals value.
    StateEquals { field: String, value: String },
    /// Snapshot field comparison (>=, <=, >, <, !=).
    StateCompare {
        field: String,
        op: String,
        value: String,
    },
}

impl Assertion {
    /// Checks the assertion against the transcript and the current snapshot.
    pub fn check(&self, transcript: &str, snapshot: &ViewSnapshot) -> bool {
        match self {
            Self::Contains(text) => transcript.to_lowercase().contains(&text.to_lowercase()),
            Self::NotContains(text) => !transcript.to_lowercase().contains(&text.to_lowercase()),
            Self::Matches(re) => re.is_match(transcript),
            Self::StateEquals { field, value } => {
                snapshot.field(field).as_deref() == Some(value.as_str())
            }
            Self::StateCompare { field, op, value } => {
                compare_values(snapshot.field(field).as_deref(), op, value)
            }
        }
    }
}

/// Compares values using the given operator.
fn compare_values(actual: Option<&str>, op: &str, expected: &str) -> bool {
    let actual = match actual {
        Some(v) => v,
        None => return false,
    };

    if let (Ok(a), Ok(e)) = (actual.parse::<f64>(), expected.parse::<f64>()) {
        return match op {
            ">=" => a >= e,
            "<=" => a <= e,
            ">" => a > e,
            "<" => a < e,
            "!=" => a != e,
            _ => false,
        };
    }

    match op {
        "!=" => actual != expected,
        _ => false,
    }
}

/// A parsed event that can be executed.
#[derive(Debug, Clone)]
pub enum Event {
    /// Run the query through the execution gate.
    Execute(ExecuteOptions),
    /// Cancel the in-flight execution.
    Cancel,
    /// Edit a parameter without applying it.
    Param { name: String, value: Value },
    /// Apply pending parameters and re-run.
    Apply,
    /// Drop pending parameter edits.
    Discard,
    Select(VisualizationId),
    AddViz { kind: String, name: String },
    DeleteViz(VisualizationId),
    Describe(String),
    /// Set a refresh interval in seconds, or clear the schedule.
    Schedule(Option<u64>),
    /// Wait for a duration.
    Wait(Duration),
    /// Wait until nothing is in flight.
    Settle,
    /// Assert something about the transcript or state.
    Assert(Assertion),
}

impl Event {
    /// The schedule an `Event::Schedule` stands for.
    pub fn schedule(interval: Option<u64>) -> Option<Schedule> {
        interval.map(Schedule::every)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Execute(opts) => match (opts.skip_dirty_check, opts.supersede) {
                (false, false) => write!(f, "execute"),
                (true, false) => write!(f, "execute:bypass"),
                (false, true) => write!(f, "execute:supersede"),
                (true, true) => write!(f, "execute:bypass+supersede"),
            },
            Self::Cancel => write!(f, "cancel"),
            Self::Param { name, value } => match value {
                Value::String(s) => write!(f, "param:{}={}", name, s),
                other => write!(f, "param:{}={}", name, other),
            },
            Self::Apply => write!(f, "apply"),
            Self::Discard => write!(f, "discard"),
            Self::Select(id) => write!(f, "select:{}", id),
            Self::AddViz { kind, name } => write!(f, "add-viz:{}:{}", kind, name),
            Self::DeleteViz(id) => write!(f, "delete-viz:{}", id),
            Self::Describe(text) => write!(f, "describe:{}", text),
            Self::Schedule(Some(secs)) => write!(f, "schedule:{}", secs),
            Self::Schedule(None) => write!(f, "schedule:none"),
            Self::Wait(d) => write!(f, "wait:{}ms", d.as_millis()),
            Self::Settle => write!(f, "settle"),
            Self::Assert(a) => match a {
                Assertion::Contains(t) => write!(f, "assert:contains:{}", t),
                Assertion::NotContains(t) => write!(f, "assert:not-contains:{}", t),
                Assertion::Matches(re) => write!(f, "assert:matches:{}", re.as_str()),
                Assertion::StateEquals { field, value } => {
                    write!(f, "assert:state:{}={}", field, value)
                }
                Assertion::StateCompare { field, op, value } => {
                    write!(f, "assert:state:{}{}{}", field, op, value)
                }
            },
        }
    }
}

/// Parser for the event DSL.
#[derive(Debug, Default)]
pub struct EventParser;

impl EventParser {
    /// Creates a new event parser.
    pub fn new() -> Self {
        Self
    }

    /// Parses all events from an input string.
    /// Supports comma-separated and newline-separated events.
    pub fn parse_all(&self, input: &str) -> Result<Vec<Event>> {
        let mut events = Vec::new();

        for line in input.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            for part in line.split(',') {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }

                events.push(self.parse_one(part)?);
            }
        }

        Ok(events)
    }

    /// Parses a single event string.
    pub fn parse_one(&self, input: &str) -> Result<Event> {
        let (event_type, value) = match input.split_once(':') {
            Some((t, v)) => (t.trim().to_lowercase(), Some(v.trim())),
            None => (input.trim().to_lowercase(), None),
        };

        match (event_type.as_str(), value) {
            ("execute", None) => Ok(Event::Execute(ExecuteOptions::default())),
            ("execute", Some(mode)) => self.parse_execute(mode),
            ("cancel", None) => Ok(Event::Cancel),
            ("apply", None) => Ok(Event::Apply),
            ("discard", None) => Ok(Event::Discard),
            ("settle", None) => Ok(Event::Settle),
            ("param", Some(v)) => self.parse_param(v),
            ("select", Some(v)) => Ok(Event::Select(parse_viz_id(v)?)),
            ("add-viz", Some(v)) => self.parse_add_viz(v),
            ("delete-viz", Some(v)) => Ok(Event::DeleteViz(parse_viz_id(v)?)),
            ("describe", Some(v)) => Ok(Event::Describe(v.to_string())),
            ("schedule", Some(v)) => self.parse_schedule(v),
            ("wait", Some(v)) => self.parse_wait(v),
            ("assert", Some(v)) => self.parse_assert(v),
            (
                "param" | "select" | "add-viz" | "delete-viz" | "describe" | "schedule" | "wait"
                | "assert",
                None,
            ) => Err(QueryViewError::config(format!(
                "Event '{}' needs a value: '{}:<value>'",
                event_type, event_type
            ))),
            ("cancel" | "apply" | "discard" | "settle", Some(_)) => Err(QueryViewError::config(
                format!("Event '{}' takes no value", event_type),
            )),
            _ => Err(QueryViewError::config(format!(
                "Unknown event type: '{}'. Valid types: execute, cancel, param, apply, discard, \
                 select, add-viz, delete-viz, describe, schedule, wait, settle, assert",
                event_type
            ))),
        }
    }

    /// Parses an execute mode like "bypass" or "bypass+supersede".
    fn parse_execute(&self, value: &str) -> Result<Event> {
        let mut options = ExecuteOptions::default();
        for flag in value.split('+') {
            match flag.trim().to_lowercase().as_str() {
                "bypass" => options.skip_dirty_check = true,
                "supersede" => options.supersede = true,
                other => {
                    return Err(QueryViewError::config(format!(
                        "Unknown execute mode: '{}'. Expected bypass or supersede",
                        other
                    )));
                }
            }
        }
        Ok(Event::Execute(options))
    }

    /// Parses "name=value". The value is read as JSON when it parses, and
    /// as a plain string otherwise.
    fn parse_param(&self, value: &str) -> Result<Event> {
        let (name, raw) = value.split_once('=').ok_or_else(|| {
            QueryViewError::config(format!(
                "Invalid param syntax: '{}'. Expected param:name=value",
                value
            ))
        })?;

        let name = name.trim();
        if name.is_empty() {
            return Err(QueryViewError::config("Parameter name cannot be empty"));
        }

        let raw = raw.trim();
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

        Ok(Event::Param {
            name: name.to_string(),
            value,
        })
    }

    /// Parses "KIND:name".
    fn parse_add_viz(&self, value: &str) -> Result<Event> {
        match value.split_once(':') {
            Some((kind, name)) if !kind.trim().is_empty() && !name.trim().is_empty() => {
                Ok(Event::AddViz {
                    kind: kind.trim().to_uppercase(),
                    name: name.trim().to_string(),
                })
            }
            _ => Err(QueryViewError::config(format!(
                "Invalid add-viz syntax: '{}'. Expected add-viz:<kind>:<name>",
                value
            ))),
        }
    }

    fn parse_schedule(&self, value: &str) -> Result<Event> {
        if value.eq_ignore_ascii_case("none") {
            return Ok(Event::Schedule(None));
        }
        let secs: u64 = value.parse().map_err(|_| {
            QueryViewError::config(format!(
                "Invalid schedule: '{}'. Expected seconds or 'none'",
                value
            ))
        })?;
        Ok(Event::Schedule(Some(secs)))
    }

    /// Parses a wait duration like "100ms" or "1s".
    fn parse_wait(&self, value: &str) -> Result<Event> {
        let value = value.to_lowercase();

        let duration = if let Some(ms) = value.strip_suffix("ms") {
            let num: u64 = ms
                .parse()
                .map_err(|_| QueryViewError::config(format!("Invalid wait duration: '{}'", value)))?;
            Duration::from_millis(num)
        } else if let Some(s) = value.strip_suffix('s') {
            let num: u64 = s
                .parse()
                .map_err(|_| QueryViewError::config(format!("Invalid wait duration: '{}'", value)))?;
            Duration::from_secs(num)
        } else {
            // Bare numbers are milliseconds.
            let num: u64 = value
                .parse()
                .map_err(|_| QueryViewError::config(format!("Invalid wait duration: '{}'", value)))?;
            Duration::from_millis(num)
        };

        Ok(Event::Wait(duration))
    }

    /// Parses an assertion like "contains:hello" or "state:row_count>=2".
    fn parse_assert(&self, value: &str) -> Result<Event> {
        let (assert_type, rest) = match value.split_once(':') {
            Some((t, r)) => (t.trim().to_lowercase(), r.trim()),
            None => {
                return Err(QueryViewError::config(format!(
                    "Invalid assertion syntax: '{}'. Expected assert:type:value",
                    value
                )));
            }
        };

        let assertion = match assert_type.as_str() {
            "contains" => Assertion::Contains(rest.to_string()),
            "not-contains" => Assertion::NotContains(rest.to_string()),
            "matches" => Assertion::Matches(Regex::new(rest).map_err(|e| {
                QueryViewError::config(format!("Invalid regex '{}': {}", rest, e))
            })?),
            "state" => self.parse_state_assertion(rest)?,
            _ => {
                return Err(QueryViewError::config(format!(
                    "Unknown assertion type: '{}'. Valid types: contains, not-contains, matches, state",
                    assert_type
                )));
            }
        };

        Ok(Event::Assert(assertion))
    }

    /// Parses a state assertion like "state=succeeded" or "row_count>=2".
    fn parse_state_assertion(&self, value: &str) -> Result<Assertion> {
        // Two-character operators first so ">=" is not read as ">".
        for op in &["!=", ">=", "<=", ">", "<", "="] {
            if let Some(pos) = value.find(op) {
                let field = value[..pos].trim().to_string();
                let val = value[pos + op.len()..].trim().to_string();

                if field.is_empty() {
                    break;
                }

                if *op == "=" {
                    return Ok(Assertion::StateEquals { field, value: val });
                } else {
                    return Ok(Assertion::StateCompare {
                        field,
                        op: op.to_string(),
                        value: val,
                    });
                }
            }
        }

        Err(QueryViewError::config(format!(
            "Invalid state assertion: '{}'. Expected field=value or field>=value",
            value
        )))
    }
}

fn parse_viz_id(value: &str) -> Result<VisualizationId> {
    value.parse().map_err(QueryViewError::config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_bare_execute() {
        let parser = EventParser::new();
        match parser.parse_one("execute").unwrap() {
            Event::Execute(opts) => assert_eq!(opts, ExecuteOptions::default()),
            _ => panic!("Expected Execute event"),
        }
    }

    #[test]
    fn test_parse_execute_modes() {
        let parser = EventParser::new();
        match parser.parse_one("execute:bypass").unwrap() {
            Event::Execute(opts) => {
                assert!(opts.skip_dirty_check);
                assert!(!opts.supersede);
            }
            _ => panic!("Expected Execute event"),
        }
        match parser.parse_one("execute:bypass+supersede").unwrap() {
            Event::Execute(opts) => {
                assert!(opts.skip_dirty_check);
                assert!(opts.supersede);
            }
            _ => panic!("Expected Execute event"),
        }
        assert!(parser.parse_one("execute:now").is_err());
    }

    #[test]
    fn test_parse_param_values() {
        let parser = EventParser::new();
        match parser.parse_one("param:limit=10").unwrap() {
            Event::Param { name, value } => {
                assert_eq!(name, "limit");
                assert_eq!(value, json!(10));
            }
            _ => panic!("Expected Param event"),
        }
        match parser.parse_one("param:region=us west").unwrap() {
            Event::Param { value, .. } => assert_eq!(value, json!("us west")),
            _ => panic!("Expected Param event"),
        }
        assert!(parser.parse_one("param:region").is_err());
        assert!(parser.parse_one("param:=1").is_err());
    }

    #[test]
    fn test_parse_visualization_events() {
        let parser = EventParser::new();
        match parser.parse_one("select:2").unwrap() {
            Event::Select(id) => assert_eq!(id, VisualizationId(2)),
            _ => panic!("Expected Select event"),
        }
        match parser.parse_one("add-viz:counter:Total signups").unwrap() {
            Event::AddViz { kind, name } => {
                assert_eq!(kind, "COUNTER");
                assert_eq!(name, "Total signups");
            }
            _ => panic!("Expected AddViz event"),
        }
        assert!(parser.parse_one("select:abc").is_err());
        assert!(parser.parse_one("add-viz:TABLE").is_err());
    }

    #[test]
    fn test_parse_schedule() {
        let parser = EventParser::new();
        assert!(matches!(
            parser.parse_one("schedule:3600").unwrap(),
            Event::Schedule(Some(3600))
        ));
        assert!(matches!(
            parser.parse_one("schedule:none").unwrap(),
            Event::Schedule(None)
        ));
        assert!(parser.parse_one("schedule:daily").is_err());
    }

    #[test]
    fn test_parse_wait() {
        let parser = EventParser::new();
        let cases = [
            ("wait:100ms", Duration::from_millis(100)),
            ("wait:2s", Duration::from_secs(2)),
            ("wait:250", Duration::from_millis(250)),
        ];
        for (input, expected) in cases {
            match parser.parse_one(input).unwrap() {
                Event::Wait(d) => assert_eq!(d, expected, "{input}"),
                _ => panic!("Expected Wait event"),
            }
        }
    }

    #[test]
    fn test_parse_assert_state() {
        let parser = EventParser::new();
        match parser.parse_one("assert:state:state=succeeded").unwrap() {
            Event::Assert(Assertion::StateEquals { field, value }) => {
                assert_eq!(field, "state");
                assert_eq!(value, "succeeded");
            }
            _ => panic!("Expected StateEquals assertion"),
        }
        match parser.parse_one("assert:state:row_count>=2").unwrap() {
            Event::Assert(Assertion::StateCompare { field, op, value }) => {
                assert_eq!(field, "row_count");
                assert_eq!(op, ">=");
                assert_eq!(value, "2");
            }
            _ => panic!("Expected StateCompare assertion"),
        }
    }

    #[test]
    fn test_parse_assert_rejects_bad_regex() {
        let parser = EventParser::new();
        assert!(parser.parse_one("assert:matches:[unclosed").is_err());
        assert!(parser.parse_one("assert:matches:rows? returned").is_ok());
    }

    #[test]
    fn test_parse_all_with_comments() {
        let parser = EventParser::new();
        let input = r#"
            # Run once and check
            param:region=us, apply
            settle
            assert:state:state=succeeded
        "#;
        let events = parser.parse_all(input).unwrap();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[1], Event::Apply));
        assert!(matches!(events[2], Event::Settle));
    }

    #[test]
    fn test_unknown_event_and_stray_values() {
        let parser = EventParser::new();
        assert!(parser.parse_one("explode").is_err());
        assert!(parser.parse_one("cancel:now").is_err());
        assert!(parser.parse_one("wait").is_err());
    }

    #[test]
    fn test_display_round_trips_through_parser() {
        let parser = EventParser::new();
        for input in [
            "execute:supersede",
            "param:limit=10",
            "schedule:none",
            "wait:100ms",
            "assert:state:row_count>=2",
        ] {
            let event = parser.parse_one(input).unwrap();
            assert_eq!(event.to_string(), input);
        }
    }

    #[test]
    fn test_compare_values() {
        assert!(compare_values(Some("3"), ">=", "2"));
        assert!(compare_values(Some("1.5"), "<", "2"));
        assert!(!compare_values(Some("3"), "<", "2"));
        assert!(compare_values(Some("failed"), "!=", "succeeded"));
        assert!(!compare_values(Some("failed"), ">", "succeeded"));
        assert!(!compare_values(None, ">=", "1"));
    }
}
