//! Typed names for headers commonly read from Event Socket events.

use std::fmt;

/// A name did not match any variant of one of the crate's name enums
/// ([`EventHeader`], [`EventFormat`](crate::EventFormat)).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseNameError {
    kind: &'static str,
    name: String,
}

impl ParseNameError {
    pub(crate) fn new(kind: &'static str, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
        }
    }

    /// The rejected input.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ParseNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {}", self.kind, self.name)
    }
}

impl std::error::Error for ParseNameError {}

define_header_enum! {
    kind: "event header",
    /// Header names that appear on decoded events and replies.
    ///
    /// Events are generic key/value maps; this enum only saves callers from
    /// typing well-known names by hand. Use with [`EslEvent::header()`].
    ///
    /// [`EslEvent::header()`]: crate::EslEvent::header
    pub enum EventHeader {
        EventName => "Event-Name",
        EventSubclass => "Event-Subclass",
        UniqueId => "Unique-ID",
        CallerUniqueId => "Caller-Unique-ID",
        JobUuid => "Job-UUID",
        ChannelName => "Channel-Name",
        AnswerState => "Answer-State",
        HangupCause => "Hangup-Cause",
        Application => "Application",
        ApplicationData => "Application-Data",
        ApplicationResponse => "Application-Response",
        ApplicationUuid => "Application-UUID",
        CoreUuid => "Core-UUID",
        ContentType => "Content-Type",
        ContentLength => "Content-Length",
        ContentDisposition => "Content-Disposition",
        ReplyText => "Reply-Text",
    }
}
