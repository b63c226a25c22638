//! Progress telemetry contract between the engine and its display layer.

use serde::Deserialize;

/// Spinner lifecycle action.
///
/// Anything that is not a start stops the spinner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpinnerAction {
    Start,
    #[serde(other)]
    Stop,
}

/// One telemetry event, keyed by a display name.
///
/// The runner container emits these as JSON lines on its stdout.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Event {
    /// Percentage update for a named indicator.
    Progress { name: String, percentage: f64 },
    /// Start/stop of a named spinner.
    Spinner { name: String, action: SpinnerAction },
}

impl Event {
    /// Parses one runner output line. Non-event lines yield `None`.
    #[must_use]
    pub fn from_json_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        serde_json::from_str(line).ok()
    }
}

/// Receives telemetry events as they are decoded.
///
/// Implementations must tolerate events arriving for names they have never
/// seen; indicators are created on first use.
pub trait EventSink: Send + Sync {
    /// A named indicator reached the given percentage.
    fn progress(&self, name: &str, percentage: f64);

    /// A named spinner started or stopped.
    fn spinner(&self, name: &str, action: SpinnerAction);
}

/// Sink that discards all events.
pub struct NullSink;

impl EventSink for NullSink {
    fn progress(&self, _name: &str, _percentage: f64) {}
    fn spinner(&self, _name: &str, _action: SpinnerAction) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress_event() {
        let event = Event::from_json_line(r#"{"name":"preloading","percentage":45}"#).unwrap();
        match event {
            Event::Progress { name, percentage } => {
                assert_eq!(name, "preloading");
                assert!((percentage - 45.0).abs() < f64::EPSILON);
            }
            other => panic!("wrong event: {other:?}"),
        }
    }

    #[test]
    fn test_parse_spinner_start() {
        let event = Event::from_json_line(r#"{"name":"copying","action":"start"}"#).unwrap();
        assert!(matches!(
            event,
            Event::Spinner {
                action: SpinnerAction::Start,
                ..
            }
        ));
    }

    #[test]
    fn test_non_start_action_is_stop() {
        let event = Event::from_json_line(r#"{"name":"copying","action":"done"}"#).unwrap();
        assert!(matches!(
            event,
            Event::Spinner {
                action: SpinnerAction::Stop,
                ..
            }
        ));
    }

    #[test]
    fn test_non_event_lines_are_ignored() {
        assert!(Event::from_json_line("").is_none());
        assert!(Event::from_json_line("plain log output").is_none());
        assert!(Event::from_json_line(r#"{"error":"boom"}"#).is_none());
    }
}
