//! Decoded Event Socket frames

use crate::command::ReplyStatus;
use crate::constants::{
    CONTENT_TYPE_TEXT_EVENT_JSON, CONTENT_TYPE_TEXT_EVENT_XML, HEADER_REPLY_TEXT,
};
use crate::error::{EslError, EslResult};
use crate::headers::EventHeader;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;
use std::fmt;

define_header_enum! {
    kind: "event format",
    /// Event encodings FreeSWITCH can deliver (`event plain|json|xml ...`).
    pub enum EventFormat {
        Plain => "plain",
        Json => "json",
        Xml => "xml",
    }
}

impl EventFormat {
    /// Determine event format from a Content-Type header value.
    pub fn from_content_type(ct: &str) -> Self {
        match ct {
            CONTENT_TYPE_TEXT_EVENT_JSON => Self::Json,
            CONTENT_TYPE_TEXT_EVENT_XML => Self::Xml,
            _ => Self::Plain,
        }
    }
}

/// One decoded frame: a command reply, an API response or an event.
///
/// Headers keep the order in which they were received; that order is used
/// for [`Display`](fmt::Display) and serialization only, lookups go by name.
/// Events are built by the frame reader and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EslEvent {
    content_type: Option<String>,
    headers: HashMap<String, String>,
    order: Vec<String>,
    body: Option<String>,
}

impl EslEvent {
    pub(crate) fn with_content_type(content_type: Option<String>) -> Self {
        Self {
            content_type,
            ..Self::default()
        }
    }

    /// Insert a header; a repeated name keeps its first position.
    pub(crate) fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if !self
            .headers
            .contains_key(&name)
        {
            self.order
                .push(name.clone());
        }
        self.headers
            .insert(name, value.into());
    }

    pub(crate) fn take_header(&mut self, name: &str) -> Option<String> {
        let value = self
            .headers
            .remove(name)?;
        self.order
            .retain(|k| k != name);
        Some(value)
    }

    pub(crate) fn set_body(&mut self, body: String) {
        self.body = Some(body);
    }

    /// `Content-Type` of the frame this event was decoded from.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type
            .as_deref()
    }

    /// Look up a header by name (case-sensitive).
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .map(|s| s.as_str())
    }

    /// Headers in arrival order.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.order
            .iter()
            .filter_map(|k| {
                self.headers
                    .get(k)
                    .map(|v| (k.as_str(), v.as_str()))
            })
    }

    /// Number of headers.
    pub fn header_count(&self) -> usize {
        self.order
            .len()
    }

    /// Frame body, present only when the frame carried a `Content-Length`.
    pub fn body(&self) -> Option<&str> {
        self.body
            .as_deref()
    }

    /// `Event-Name` header.
    pub fn event_name(&self) -> Option<&str> {
        self.header(EventHeader::EventName)
    }

    /// `Event-Subclass` header for `CUSTOM` events (e.g. `sofia::register`).
    pub fn event_subclass(&self) -> Option<&str> {
        self.header(EventHeader::EventSubclass)
    }

    /// `Unique-ID` header, falling back to `Caller-Unique-ID`.
    pub fn unique_id(&self) -> Option<&str> {
        self.header(EventHeader::UniqueId)
            .or_else(|| self.header(EventHeader::CallerUniqueId))
    }

    /// `Job-UUID` header from `bgapi` replies and `BACKGROUND_JOB` events.
    pub fn job_uuid(&self) -> Option<&str> {
        self.header(EventHeader::JobUuid)
    }

    /// `Application` header of `CHANNEL_EXECUTE*` events.
    pub fn application(&self) -> Option<&str> {
        self.header(EventHeader::Application)
    }

    /// `Application-Response` header of `CHANNEL_EXECUTE_COMPLETE` events.
    pub fn application_response(&self) -> Option<&str> {
        self.header(EventHeader::ApplicationResponse)
    }

    /// Look up a channel variable (`variable_{name}` header).
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.header(format!("variable_{}", name))
    }

    /// Raw `Reply-Text` header value (e.g. `+OK`, `-ERR invalid command`).
    pub fn reply_text(&self) -> Option<&str> {
        self.header(HEADER_REPLY_TEXT)
    }

    /// Classification of the `Reply-Text` header.
    pub fn reply_status(&self) -> ReplyStatus {
        ReplyStatus::from_reply_text(self.reply_text())
    }

    /// `true` if Reply-Text is `+OK` or absent.
    pub fn is_success(&self) -> bool {
        self.reply_status() == ReplyStatus::Ok
    }

    /// Convert a reply into an error when its Reply-Text is not `+OK`.
    pub fn into_result(self) -> EslResult<Self> {
        match self.reply_status() {
            ReplyStatus::Ok => Ok(self),
            ReplyStatus::Err => Err(EslError::CommandFailed {
                reply_text: self
                    .reply_text()
                    .unwrap_or("-ERR")
                    .to_string(),
            }),
            ReplyStatus::Other => Err(EslError::UnexpectedReply {
                reply_text: self
                    .reply_text()
                    .unwrap_or("")
                    .to_string(),
            }),
        }
    }
}

impl fmt::Display for EslEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in self.headers() {
            writeln!(f, "{}: {}", key, value)?;
        }
        if let Some(body) = &self.body {
            writeln!(f)?;
            f.write_str(body)?;
        }
        Ok(())
    }
}

impl Serialize for EslEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = usize::from(self.body.is_some());
        let mut map = serializer.serialize_map(Some(self.header_count() + extra))?;
        for (key, value) in self.headers() {
            map.serialize_entry(key, value)?;
        }
        if let Some(body) = &self.body {
            map.serialize_entry("_body", body)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EslEvent {
        let mut event = EslEvent::with_content_type(Some("text/event-plain".into()));
        event.set_header("Event-Name", "CHANNEL_EXECUTE_COMPLETE");
        event.set_header("Unique-ID", "abc-123");
        event.set_header("Application", "playback");
        event.set_header("Application-Response", "FILE PLAYED");
        event
    }

    #[test]
    fn headers_keep_arrival_order() {
        let mut event = EslEvent::default();
        event.set_header("Zeta", "1");
        event.set_header("Alpha", "2");
        event.set_header("Mid", "3");
        event.set_header("Zeta", "4");

        let keys: Vec<_> = event
            .headers()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, ["Zeta", "Alpha", "Mid"]);
        assert_eq!(event.header("Zeta"), Some("4"));
        assert_eq!(event.header_count(), 3);
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let event = sample();
        assert_eq!(event.header("Unique-ID"), Some("abc-123"));
        assert_eq!(event.header("unique-id"), None);
        assert_eq!(event.header(EventHeader::UniqueId), Some("abc-123"));
    }

    #[test]
    fn convenience_accessors() {
        let mut event = sample();
        event.set_header("variable_sip_from_user", "1000");
        assert_eq!(event.event_name(), Some("CHANNEL_EXECUTE_COMPLETE"));
        assert_eq!(event.unique_id(), Some("abc-123"));
        assert_eq!(event.application(), Some("playback"));
        assert_eq!(event.application_response(), Some("FILE PLAYED"));
        assert_eq!(event.variable("sip_from_user"), Some("1000"));
        assert_eq!(event.variable("nonexistent"), None);
        assert_eq!(event.content_type(), Some("text/event-plain"));
        assert!(event
            .body()
            .is_none());
    }

    #[test]
    fn unique_id_falls_back_to_caller_unique_id() {
        let mut event = EslEvent::default();
        event.set_header("Caller-Unique-ID", "caller-1");
        assert_eq!(event.unique_id(), Some("caller-1"));
    }

    #[test]
    fn take_header_removes_from_order() {
        let mut event = sample();
        assert_eq!(event.take_header("Application"), Some("playback".into()));
        assert!(event
            .headers()
            .all(|(k, _)| k != "Application"));
        assert_eq!(event.take_header("Application"), None);
    }

    #[test]
    fn display_renders_headers_then_body() {
        let mut event = EslEvent::default();
        event.set_header("Content-Type", "api/response");
        event.set_header("Content-Length", "3");
        event.set_body("+OK".into());
        assert_eq!(
            event.to_string(),
            "Content-Type: api/response\nContent-Length: 3\n\n+OK"
        );
    }

    #[test]
    fn serialize_as_ordered_map() {
        let mut event = EslEvent::default();
        event.set_header("B", "2");
        event.set_header("A", "1");
        event.set_body("hello".into());
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"B":"2","A":"1","_body":"hello"}"#);
    }

    #[test]
    fn reply_helpers() {
        let mut ok = EslEvent::default();
        ok.set_header("Reply-Text", "+OK accepted");
        assert!(ok.is_success());
        assert!(ok
            .into_result()
            .is_ok());

        let mut err = EslEvent::default();
        err.set_header("Reply-Text", "-ERR invalid command");
        assert_eq!(err.reply_status(), ReplyStatus::Err);
        let e = err
            .into_result()
            .unwrap_err();
        assert!(
            matches!(e, EslError::CommandFailed { ref reply_text } if reply_text == "-ERR invalid command")
        );

        let mut other = EslEvent::default();
        other.set_header("Reply-Text", "sip_from_user");
        assert!(matches!(
            other.into_result(),
            Err(EslError::UnexpectedReply { .. })
        ));
    }

    #[test]
    fn event_format_names() {
        assert_eq!(EventFormat::Json.to_string(), "json");
        assert_eq!("XML".parse::<EventFormat>(), Ok(EventFormat::Xml));
        assert!("yaml"
            .parse::<EventFormat>()
            .is_err());
        assert_eq!(
            EventFormat::from_content_type("text/event-json"),
            EventFormat::Json
        );
        assert_eq!(
            EventFormat::from_content_type("text/event-plain"),
            EventFormat::Plain
        );
        assert_eq!(
            EventFormat::from_content_type("log/data"),
            EventFormat::Plain
        );
    }
}
