//! Error types for the Event Socket engine

use crate::connection::DisconnectReason;

/// Result alias used throughout the crate.
pub type EslResult<T> = Result<T, EslError>;

/// Errors returned by connection, command and parsing operations.
///
/// Validation errors and timeouts are local to a single call and leave the
/// connection usable. Transport errors are terminal: once the connection has
/// failed, every pending and subsequent call reports
/// [`EslError::Disconnected`] carrying the same [`DisconnectReason`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EslError {
    /// Socket I/O failed before a connection existed (connect, bind, accept).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No reply arrived within the configured timeout.
    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// A command, header name or header value was rejected before writing.
    #[error("invalid command: {message}")]
    InvalidCommand { message: String },

    /// `sendevent` was called without an event name.
    #[error("sendevent requires a non-empty event name")]
    EmptyEventName,

    /// The connection is closed; the reason is shared by every waiter.
    #[error("connection closed: {0}")]
    Disconnected(DisconnectReason),

    /// The peer rejected our password.
    #[error("authentication failed: {reason}")]
    AuthFailed { reason: String },

    /// Malformed or unexpected frame.
    #[error("protocol error: {message}")]
    ProtocolError { message: String },

    /// Header line without a colon, or an unparseable framing header.
    #[error("invalid header: {header}")]
    InvalidHeader { header: String },

    /// Reply-Text started with `-ERR`.
    #[error("command failed: {reply_text}")]
    CommandFailed { reply_text: String },

    /// Reply-Text was neither `+OK` nor `-ERR`.
    #[error("unexpected reply: {reply_text}")]
    UnexpectedReply { reply_text: String },

    /// A `text/event-json` body did not decode.
    #[error("JSON event error: {0}")]
    Json(#[from] serde_json::Error),

    /// A `text/event-xml` body did not decode.
    #[error("XML event error: {0}")]
    XmlError(#[from] quick_xml::Error),
}

impl EslError {
    pub(crate) fn protocol_error(message: impl Into<String>) -> Self {
        EslError::ProtocolError {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_command(message: impl Into<String>) -> Self {
        EslError::InvalidCommand {
            message: message.into(),
        }
    }

    pub(crate) fn auth_failed(reason: impl Into<String>) -> Self {
        EslError::AuthFailed {
            reason: reason.into(),
        }
    }

    /// `true` when the connection survives this error and the caller may
    /// issue further commands.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EslError::Timeout { .. }
                | EslError::InvalidCommand { .. }
                | EslError::EmptyEventName
                | EslError::CommandFailed { .. }
                | EslError::UnexpectedReply { .. }
        )
    }

    /// The terminal reason, if this error reports a closed connection.
    pub fn disconnect_reason(&self) -> Option<&DisconnectReason> {
        match self {
            EslError::Disconnected(reason) => Some(reason),
            _ => None,
        }
    }
}
