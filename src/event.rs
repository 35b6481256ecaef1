//! The [`Event`] type produced by the output classifier.

use std::fmt;

/// What kind of terminal output an [`Event`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Printable runes accumulated since the last flush.
    Text,
    /// A CSI sequence (`ESC [` ... final byte), without the introducer.
    Ansi,
    /// A single `\r` or `\n`.
    Control,
    /// The rune following an `ESC` that was not `[`.
    Unhandled,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Text => "TEXT",
            EventKind::Ansi => "ANSI",
            EventKind::Control => "CONTROL",
            EventKind::Unhandled => "UNHANDLED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One token of classified terminal output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    kind: EventKind,
    payload: String,
}

impl Event {
    /// Create an event of the given kind
    pub fn new(kind: EventKind, payload: impl Into<String>) -> Self {
        Event {
            kind,
            payload: payload.into(),
        }
    }

    /// Create a Text event
    pub fn text(payload: impl Into<String>) -> Self {
        Event::new(EventKind::Text, payload)
    }

    /// Create an ANSI event from the bytes after `ESC [`
    pub fn ansi(payload: impl Into<String>) -> Self {
        Event::new(EventKind::Ansi, payload)
    }

    /// Create a Control event for a single control character
    pub fn control(ch: char) -> Self {
        Event::new(EventKind::Control, ch)
    }

    /// Create an Unhandled event for the rune that followed an `ESC`
    pub fn unhandled(ch: char) -> Self {
        Event::new(EventKind::Unhandled, ch)
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn into_payload(self) -> String {
        self.payload
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[EVENT:{}] {:?}", self.kind, self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_payload() {
        assert_eq!(Event::text("hello world").to_string(), r#"[EVENT:TEXT] "hello world""#);
        assert_eq!(Event::control('\n').to_string(), r#"[EVENT:CONTROL] "\n""#);
        assert_eq!(Event::ansi("?25l").to_string(), r#"[EVENT:ANSI] "?25l""#);
        assert_eq!(Event::unhandled(']').to_string(), r#"[EVENT:UNHANDLED] "]""#);
    }

    #[test]
    fn test_accessors() {
        let event = Event::ansi("31m");
        assert_eq!(event.kind(), EventKind::Ansi);
        assert_eq!(event.payload(), "31m");
        assert_eq!(event.into_payload(), "31m");
    }
}
