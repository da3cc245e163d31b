//! Protocol constants and configuration defaults

/// Default FreeSWITCH ESL port for inbound connections
pub const DEFAULT_ESL_PORT: u16 = 8021;

/// Socket buffer size for reading from TCP stream (64KB)
pub const SOCKET_BUF_SIZE: usize = 65536;

/// Maximum single message size (8MB) - validates Content-Length header
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

/// Maximum total buffer size (16MB) - safety limit to prevent runaway memory
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Incoming frames end their header block with a blank line.
pub const HEADER_TERMINATOR: &str = "\n\n";
/// Line ending used inside outgoing `sendevent` / `sendmsg` frames.
pub const LINE_TERMINATOR: &str = "\n";
/// Terminator appended to every plain command.
pub const COMMAND_TERMINATOR: &str = "\r\n\r\n";

/// Content-Type header values
pub const CONTENT_TYPE_AUTH_REQUEST: &str = "auth/request";
pub const CONTENT_TYPE_COMMAND_REPLY: &str = "command/reply";
pub const CONTENT_TYPE_API_RESPONSE: &str = "api/response";
pub const CONTENT_TYPE_TEXT_EVENT_PLAIN: &str = "text/event-plain";
pub const CONTENT_TYPE_TEXT_EVENT_JSON: &str = "text/event-json";
pub const CONTENT_TYPE_TEXT_EVENT_XML: &str = "text/event-xml";
pub const CONTENT_TYPE_DISCONNECT_NOTICE: &str = "text/disconnect-notice";
pub const CONTENT_TYPE_LOG_DATA: &str = "log/data";

/// Protocol framing header: payload type.
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
/// Protocol framing header: body length.
pub const HEADER_CONTENT_LENGTH: &str = "Content-Length";
/// Protocol framing header: command reply status.
pub const HEADER_REPLY_TEXT: &str = "Reply-Text";
/// Protocol framing header on disconnect notices (`disconnect` or `linger`).
pub const HEADER_CONTENT_DISPOSITION: &str = "Content-Disposition";

/// TCP connect and auth handshake timeout in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2000;

/// Command reply timeout in milliseconds (60 seconds)
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 60_000;
