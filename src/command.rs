//! Outgoing command construction and reply classification

use crate::{
    constants::{COMMAND_TERMINATOR, LINE_TERMINATOR},
    error::{EslError, EslResult},
    event::EventFormat,
};
use std::fmt;

/// Validate that a user-provided string contains no line terminators.
///
/// Commands are line-delimited; embedded CR or LF would allow injection
/// of arbitrary protocol commands.
pub(crate) fn validate_no_newlines(s: &str, context: &str) -> EslResult<()> {
    if s.contains('\n') || s.contains('\r') {
        return Err(EslError::invalid_command(format!(
            "{} must not contain newlines",
            context
        )));
    }
    Ok(())
}

/// Reply-Text classification per the ESL wire protocol.
///
/// FreeSWITCH commands return `+OK …` on success and `-ERR …` on failure.
/// A handful of commands (`getvar`) return the raw value with no prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReplyStatus {
    /// Reply-Text starts with `+OK` or is absent/empty.
    Ok,
    /// Reply-Text starts with `-ERR`.
    Err,
    /// Reply-Text present but matches neither `+OK` nor `-ERR`.
    Other,
}

impl ReplyStatus {
    pub(crate) fn from_reply_text(reply_text: Option<&str>) -> Self {
        match reply_text {
            None | Some("") => ReplyStatus::Ok,
            Some(t) if t.starts_with("+OK") => ReplyStatus::Ok,
            Some(t) if t.starts_with("-ERR") => ReplyStatus::Err,
            Some(_) => ReplyStatus::Other,
        }
    }
}

/// Headers for an outgoing `sendevent` or `sendmsg` frame.
///
/// Keeps insertion order; setting an existing key replaces its value in
/// place. Keys whose value is empty are skipped when the frame is built,
/// which makes optional headers easy to express.
///
/// ```
/// use freeswitch_eventsocket::Evt;
///
/// let evt = Evt::new()
///     .header("profile", "internal")
///     .header("content-type", "text/plain")
///     .header("user", "");
/// assert_eq!(evt.get("profile"), Some("internal"));
/// assert_eq!(evt.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evt {
    entries: Vec<(String, String)>,
}

impl Evt {
    /// Empty header set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set a header, replacing the value of an existing key.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| *k == name)
        {
            Some(entry) => entry.1 = value,
            None => self
                .entries
                .push((name, value)),
        }
    }

    /// Value of `name` (exact match).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Entries in insertion order, including empty-valued ones.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries
            .len()
    }

    /// `true` when no headers were set.
    pub fn is_empty(&self) -> bool {
        self.entries
            .is_empty()
    }

    /// Whether a non-empty `content-length` header is present (key matched
    /// case-insensitively).
    fn has_content_length(&self) -> bool {
        self.entries
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case("content-length") && !v.is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Evt {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut evt = Evt::new();
        for (k, v) in iter {
            evt.insert(k, v);
        }
        evt
    }
}

/// Build a header-block frame: `first_line`, header lines, blank line, body.
///
/// Every key and value is validated before anything is emitted. The body is
/// appended only when a non-empty `content-length` header accompanies a
/// non-empty body; keeping the length in step with the body is the caller's
/// job.
fn build_header_frame(first_line: &str, evt: &Evt, body: &str) -> EslResult<String> {
    use std::fmt::Write;

    for (key, value) in evt.iter() {
        if key.is_empty() {
            return Err(EslError::invalid_command("header name must not be empty"));
        }
        validate_no_newlines(key, "header name")?;
        validate_no_newlines(value, "header value")?;
    }

    let mut frame = String::from(first_line);
    frame.push_str(LINE_TERMINATOR);
    for (key, value) in evt
        .iter()
        .filter(|(_, v)| !v.is_empty())
    {
        let _ = write!(frame, "{}: {}{}", key, value, LINE_TERMINATOR);
    }
    frame.push_str(LINE_TERMINATOR);

    if evt.has_content_length() && !body.is_empty() {
        frame.push_str(body);
    }
    Ok(frame)
}

/// Wire text for `sendevent <name>`.
pub(crate) fn build_sendevent(name: &str, evt: &Evt, body: &str) -> EslResult<String> {
    if name.is_empty() {
        return Err(EslError::EmptyEventName);
    }
    validate_no_newlines(name, "event name")?;
    build_header_frame(&format!("sendevent {}", name), evt, body)
}

/// Wire text for `sendmsg [<uuid>]`.
pub(crate) fn build_sendmsg(uuid: Option<&str>, evt: &Evt, body: &str) -> EslResult<String> {
    let first_line = match uuid.filter(|u| !u.is_empty()) {
        Some(u) => {
            validate_no_newlines(u, "sendmsg uuid")?;
            format!("sendmsg {}", u)
        }
        None => "sendmsg".to_string(),
    };
    build_header_frame(&first_line, evt, body)
}

/// Headers for `sendmsg` asking the channel to run a dialplan application.
pub(crate) fn execute_headers(app: &str, arg: &str, lock: bool) -> Evt {
    Evt::new()
        .header("call-command", "execute")
        .header("execute-app-name", app)
        .header("execute-app-arg", arg)
        .header("event-lock", if lock { "true" } else { "" })
}

/// Headers for a SIP `NOTIFY` (`event-string: check-sync`) sent through the
/// `internal` profile to `user@host`.
pub(crate) fn notify_headers(user: &str, host: &str, content_type: &str, content: &str) -> Evt {
    Evt::new()
        .header("profile", "internal")
        .header("event-string", "check-sync")
        .header("content-type", content_type)
        .header("content-length", content.len().to_string())
        .header("user", user)
        .header("host", host)
}

/// Session-level commands with a fixed syntax.
///
/// Anything not listed here can be sent verbatim through
/// [`EslConnection::command`](crate::EslConnection::command).
#[derive(Clone)]
pub enum EslCommand {
    /// Authenticate with password
    Auth { password: String },
    /// Execute API command (blocking, `api/response` reply)
    Api { command: String },
    /// Execute background API command
    BgApi { command: String },
    /// Subscribe to events
    Events { format: EventFormat, events: String },
    /// Subscribe to session events (outbound mode)
    MyEvents { format: EventFormat },
    /// Keep socket open after channel hangup
    Linger { timeout: Option<u32> },
    /// Cancel linger mode
    NoLinger,
    /// Take control of the session (outbound mode)
    Connect,
    /// Resume dialplan execution on socket disconnect
    Resume,
    /// Exit/logout
    Exit,
}

impl fmt::Debug for EslCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EslCommand::Auth { .. } => f
                .debug_struct("Auth")
                .field("password", &"[REDACTED]")
                .finish(),
            EslCommand::Api { command } => f
                .debug_struct("Api")
                .field("command", command)
                .finish(),
            EslCommand::BgApi { command } => f
                .debug_struct("BgApi")
                .field("command", command)
                .finish(),
            EslCommand::Events { format, events } => f
                .debug_struct("Events")
                .field("format", format)
                .field("events", events)
                .finish(),
            EslCommand::MyEvents { format } => f
                .debug_struct("MyEvents")
                .field("format", format)
                .finish(),
            EslCommand::Linger { timeout } => f
                .debug_struct("Linger")
                .field("timeout", timeout)
                .finish(),
            EslCommand::NoLinger => write!(f, "NoLinger"),
            EslCommand::Connect => write!(f, "Connect"),
            EslCommand::Resume => write!(f, "Resume"),
            EslCommand::Exit => write!(f, "Exit"),
        }
    }
}

impl EslCommand {
    fn join(cmd: &str, args: &[&str]) -> String {
        let mut result = String::from(cmd);
        for arg in args {
            result.push(' ');
            result.push_str(arg);
        }
        result
    }

    /// Validate user-supplied fields and render the command line, without
    /// the trailing terminator.
    pub fn to_command_line(&self) -> EslResult<String> {
        match self {
            EslCommand::Auth { password } => {
                validate_no_newlines(password, "password")?;
                Ok(Self::join("auth", &[password]))
            }
            EslCommand::Api { command } => {
                validate_no_newlines(command, "api command")?;
                Ok(Self::join("api", &[command]))
            }
            EslCommand::BgApi { command } => {
                validate_no_newlines(command, "bgapi command")?;
                Ok(Self::join("bgapi", &[command]))
            }
            EslCommand::Events { format, events } => {
                validate_no_newlines(events, "event list")?;
                Ok(Self::join("event", &[format.as_str(), events]))
            }
            EslCommand::MyEvents { format } => Ok(Self::join("myevents", &[format.as_str()])),
            EslCommand::Linger { timeout } => Ok(match timeout {
                Some(n) => Self::join("linger", &[&n.to_string()]),
                None => Self::join("linger", &[]),
            }),
            EslCommand::NoLinger => Ok(Self::join("nolinger", &[])),
            EslCommand::Connect => Ok(Self::join("connect", &[])),
            EslCommand::Resume => Ok(Self::join("resume", &[])),
            EslCommand::Exit => Ok(Self::join("exit", &[])),
        }
    }

    /// Full wire text including the blank-line terminator.
    pub fn to_wire_format(&self) -> EslResult<String> {
        let mut line = self.to_command_line()?;
        line.push_str(COMMAND_TERMINATOR);
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_commands() {
        let auth = EslCommand::Auth {
            password: "ClueCon".to_string(),
        };
        assert_eq!(
            auth.to_wire_format()
                .unwrap(),
            "auth ClueCon\r\n\r\n"
        );

        let api = EslCommand::Api {
            command: "status".to_string(),
        };
        assert_eq!(
            api.to_command_line()
                .unwrap(),
            "api status"
        );

        let events = EslCommand::Events {
            format: EventFormat::Json,
            events: "ALL".to_string(),
        };
        assert_eq!(
            events
                .to_command_line()
                .unwrap(),
            "event json ALL"
        );

        let myevents = EslCommand::MyEvents {
            format: EventFormat::Plain,
        };
        assert_eq!(
            myevents
                .to_command_line()
                .unwrap(),
            "myevents plain"
        );
    }

    #[test]
    fn test_linger_variants() {
        assert_eq!(
            EslCommand::Linger { timeout: None }
                .to_command_line()
                .unwrap(),
            "linger"
        );
        assert_eq!(
            EslCommand::Linger { timeout: Some(10) }
                .to_command_line()
                .unwrap(),
            "linger 10"
        );
        assert_eq!(
            EslCommand::NoLinger
                .to_command_line()
                .unwrap(),
            "nolinger"
        );
        assert_eq!(
            EslCommand::Connect
                .to_command_line()
                .unwrap(),
            "connect"
        );
    }

    #[test]
    fn test_newline_injection_rejected() {
        let api = EslCommand::Api {
            command: "status\n\nevent plain ALL".to_string(),
        };
        assert!(matches!(
            api.to_wire_format(),
            Err(EslError::InvalidCommand { .. })
        ));

        let auth = EslCommand::Auth {
            password: "test\rapi status".to_string(),
        };
        assert!(auth
            .to_wire_format()
            .is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let auth = EslCommand::Auth {
            password: "secret".to_string(),
        };
        let debug_str = format!("{:?}", auth);
        assert!(!debug_str.contains("secret"));
        assert!(debug_str.contains("REDACTED"));
    }

    #[test]
    fn test_sendevent_drops_empty_values() {
        let evt = Evt::new()
            .header("profile", "internal")
            .header("user", "")
            .header("host", "192.168.10.4");
        let wire = build_sendevent("NOTIFY", &evt, "").unwrap();
        assert_eq!(
            wire,
            "sendevent NOTIFY\nprofile: internal\nhost: 192.168.10.4\n\n"
        );
        assert!(!wire.contains("user"));
    }

    #[test]
    fn test_sendevent_appends_body_with_content_length() {
        let evt = Evt::new()
            .header("Event-Subclass", "foo::bar")
            .header("content-type", "text/plain")
            .header("content-length", "2");
        let wire = build_sendevent("CUSTOM", &evt, "OK").unwrap();
        assert_eq!(
            wire,
            "sendevent CUSTOM\nEvent-Subclass: foo::bar\ncontent-type: text/plain\ncontent-length: 2\n\nOK"
        );
    }

    #[test]
    fn test_sendevent_body_requires_both_length_and_body() {
        let no_length = Evt::new().header("content-type", "text/plain");
        let wire = build_sendevent("CUSTOM", &no_length, "ignored").unwrap();
        assert!(wire.ends_with("\n\n"));
        assert!(!wire.contains("ignored"));

        let empty_length = Evt::new().header("content-length", "");
        let wire = build_sendevent("CUSTOM", &empty_length, "ignored").unwrap();
        assert_eq!(wire, "sendevent CUSTOM\n\n");

        let with_length = Evt::new().header("content-length", "5");
        let wire = build_sendevent("CUSTOM", &with_length, "").unwrap();
        assert_eq!(wire, "sendevent CUSTOM\ncontent-length: 5\n\n");
    }

    #[test]
    fn test_sendevent_validation() {
        assert!(matches!(
            build_sendevent("", &Evt::new(), ""),
            Err(EslError::EmptyEventName)
        ));
        assert!(matches!(
            build_sendevent("CUSTOM\n", &Evt::new(), ""),
            Err(EslError::InvalidCommand { .. })
        ));
        assert!(matches!(
            build_sendevent("\rCUSTOM", &Evt::new(), ""),
            Err(EslError::InvalidCommand { .. })
        ));
        let bad_key = Evt::new().header("X-Bad\n", "v");
        assert!(build_sendevent("CUSTOM", &bad_key, "").is_err());
        let bad_value = Evt::new().header("X-Key", "bad\r\nvalue");
        assert!(build_sendevent("CUSTOM", &bad_value, "").is_err());
        let empty_key = Evt::new().header("", "v");
        assert!(build_sendevent("CUSTOM", &empty_key, "").is_err());
    }

    #[test]
    fn test_sendmsg_and_execute() {
        let wire = build_sendmsg(None, &execute_headers("answer", "", false), "").unwrap();
        assert_eq!(
            wire,
            "sendmsg\ncall-command: execute\nexecute-app-name: answer\n\n"
        );

        let wire = build_sendmsg(
            Some("abc-123"),
            &execute_headers("playback", "/tmp/welcome.wav", true),
            "",
        )
        .unwrap();
        assert!(wire.starts_with("sendmsg abc-123\n"));
        assert!(wire.contains("execute-app-arg: /tmp/welcome.wav\n"));
        assert!(wire.contains("event-lock: true\n"));

        assert!(build_sendmsg(Some("abc\n"), &Evt::new(), "").is_err());
    }

    #[test]
    fn test_evt_insert_replaces_in_place() {
        let mut evt: Evt = [("a", "1"), ("b", "2")]
            .into_iter()
            .collect();
        evt.insert("a", "3");
        let pairs: Vec<_> = evt
            .iter()
            .collect();
        assert_eq!(pairs, [("a", "3"), ("b", "2")]);
        assert!(!evt.is_empty());
    }

    #[test]
    fn test_reply_status_classification() {
        assert_eq!(ReplyStatus::from_reply_text(None), ReplyStatus::Ok);
        assert_eq!(ReplyStatus::from_reply_text(Some("")), ReplyStatus::Ok);
        assert_eq!(
            ReplyStatus::from_reply_text(Some("+OK accepted")),
            ReplyStatus::Ok
        );
        assert_eq!(ReplyStatus::from_reply_text(Some("-ERR")), ReplyStatus::Err);
        assert_eq!(
            ReplyStatus::from_reply_text(Some("sip_from_user")),
            ReplyStatus::Other
        );
    }
}
