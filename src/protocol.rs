//! Frame parsing and classification

use crate::{
    buffer::EslBuffer,
    constants::{
        CONTENT_TYPE_API_RESPONSE, CONTENT_TYPE_AUTH_REQUEST, CONTENT_TYPE_COMMAND_REPLY,
        CONTENT_TYPE_DISCONNECT_NOTICE, CONTENT_TYPE_LOG_DATA, CONTENT_TYPE_TEXT_EVENT_JSON,
        CONTENT_TYPE_TEXT_EVENT_PLAIN, CONTENT_TYPE_TEXT_EVENT_XML, HEADER_CONTENT_LENGTH,
        HEADER_CONTENT_TYPE, HEADER_TERMINATOR, MAX_MESSAGE_SIZE,
    },
    error::{EslError, EslResult},
    event::{EslEvent, EventFormat},
};
use percent_encoding::percent_decode_str;

/// Routing class of an incoming frame, derived from `Content-Type`.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageType {
    /// Authentication request from server
    AuthRequest,
    /// Command reply
    CommandReply,
    /// API response
    ApiResponse,
    /// Event notification whose body must be decoded
    Event(EventFormat),
    /// Forwarded log line (`log/data`)
    Log,
    /// Disconnect notice
    Disconnect,
    /// Unknown message type
    Unknown(String),
}

impl MessageType {
    /// Parse message type from Content-Type header
    pub fn from_content_type(content_type: &str) -> Self {
        match content_type {
            CONTENT_TYPE_AUTH_REQUEST => MessageType::AuthRequest,
            CONTENT_TYPE_COMMAND_REPLY => MessageType::CommandReply,
            CONTENT_TYPE_API_RESPONSE => MessageType::ApiResponse,
            CONTENT_TYPE_TEXT_EVENT_PLAIN
            | CONTENT_TYPE_TEXT_EVENT_JSON
            | CONTENT_TYPE_TEXT_EVENT_XML => {
                MessageType::Event(EventFormat::from_content_type(content_type))
            }
            CONTENT_TYPE_LOG_DATA => MessageType::Log,
            CONTENT_TYPE_DISCONNECT_NOTICE => MessageType::Disconnect,
            _ => MessageType::Unknown(content_type.to_string()),
        }
    }
}

/// One frame as read off the socket: classified envelope plus raw body.
#[derive(Debug, Clone)]
pub struct EslMessage {
    /// Message type
    pub message_type: MessageType,
    /// Envelope headers in arrival order
    pub headers: Vec<(String, String)>,
    /// Message body (optional)
    pub body: Option<String>,
}

impl EslMessage {
    /// Create new message
    pub fn new(
        message_type: MessageType,
        headers: Vec<(String, String)>,
        body: Option<String>,
    ) -> Self {
        Self {
            message_type,
            headers,
            body,
        }
    }

    /// Look up an envelope header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The frame itself as an event: envelope headers plus raw body.
    pub fn into_event(self) -> EslEvent {
        let content_type = self
            .header(HEADER_CONTENT_TYPE)
            .map(str::to_string);
        let mut event = EslEvent::with_content_type(content_type);
        for (key, value) in self.headers {
            event.set_header(key, value);
        }
        if let Some(body) = self.body {
            event.set_body(body);
        }
        event
    }

    /// Decode the body of an event frame into the event it carries.
    ///
    /// Non-event frames decode to their envelope, as with
    /// [`into_event`](Self::into_event).
    pub fn decode_event(&self) -> EslResult<EslEvent> {
        match self.message_type {
            MessageType::Event(EventFormat::Json) => parse_json_event(self),
            MessageType::Event(EventFormat::Xml) => parse_xml_event(self),
            MessageType::Event(_) => parse_plain_event(self),
            _ => Ok(self
                .clone()
                .into_event()),
        }
    }
}

/// Parser state for handling incomplete messages
#[derive(Debug)]
enum ParseState {
    WaitingForHeaders,
    WaitingForBody {
        message_type: MessageType,
        headers: Vec<(String, String)>,
        body_length: usize,
    },
}

/// Incremental frame parser fed with raw socket bytes.
pub struct EslParser {
    buffer: EslBuffer,
    state: ParseState,
}

impl EslParser {
    /// Create new parser
    pub fn new() -> Self {
        Self {
            buffer: EslBuffer::new(),
            state: ParseState::WaitingForHeaders,
        }
    }

    /// Add data to the parser buffer
    pub fn add_data(&mut self, data: &[u8]) -> EslResult<()> {
        self.buffer
            .extend_from_slice(data);
        self.buffer
            .check_size_limits()
    }

    /// `true` when bytes of an unfinished frame are buffered.
    pub fn has_partial_frame(&self) -> bool {
        !self
            .buffer
            .is_empty()
            || matches!(self.state, ParseState::WaitingForBody { .. })
    }

    /// Try to parse a complete message from the buffer
    pub fn parse_message(&mut self) -> EslResult<Option<EslMessage>> {
        if let ParseState::WaitingForHeaders = self.state {
            let Some(headers_data) = self
                .buffer
                .extract_until_pattern(HEADER_TERMINATOR.as_bytes())
            else {
                return Ok(None);
            };
            self.buffer
                .compact();

            let headers_str = String::from_utf8(headers_data)
                .map_err(|_| EslError::protocol_error("Invalid UTF-8 in headers"))?;
            let headers = parse_headers(&headers_str)?;

            // A frame without Content-Type means the stream lost sync
            // (e.g. a wrong Content-Length on the previous frame).
            let content_type = lookup(&headers, HEADER_CONTENT_TYPE).ok_or_else(|| {
                EslError::protocol_error("Missing Content-Type header, likely protocol desync")
            })?;
            let message_type = MessageType::from_content_type(content_type);

            let body_length = match lookup(&headers, HEADER_CONTENT_LENGTH) {
                Some(length_str) => {
                    let length: usize =
                        length_str
                            .trim()
                            .parse()
                            .map_err(|_| EslError::InvalidHeader {
                                header: format!("Content-Length: {}", length_str),
                            })?;
                    if length > MAX_MESSAGE_SIZE {
                        return Err(EslError::protocol_error(format!(
                            "Message too large: Content-Length {} exceeds limit {}",
                            length, MAX_MESSAGE_SIZE
                        )));
                    }
                    length
                }
                None => 0,
            };

            if body_length == 0 {
                return Ok(Some(EslMessage::new(message_type, headers, None)));
            }
            self.state = ParseState::WaitingForBody {
                message_type,
                headers,
                body_length,
            };
        }

        let ParseState::WaitingForBody { body_length, .. } = &self.state else {
            return Ok(None);
        };
        let Some(body_data) = self
            .buffer
            .extract_bytes(*body_length)
        else {
            return Ok(None);
        };
        self.buffer
            .compact();

        match std::mem::replace(&mut self.state, ParseState::WaitingForHeaders) {
            ParseState::WaitingForBody {
                message_type,
                headers,
                ..
            } => {
                let body = String::from_utf8(body_data)
                    .map_err(|_| EslError::protocol_error("Invalid UTF-8 in body"))?;
                Ok(Some(EslMessage::new(message_type, headers, Some(body))))
            }
            ParseState::WaitingForHeaders => Ok(None),
        }
    }
}

impl Default for EslParser {
    fn default() -> Self {
        Self::new()
    }
}

fn lookup<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Percent-decode a header value, keeping the raw text if it is not valid.
fn decode_value(raw_value: &str) -> String {
    percent_decode_str(raw_value)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw_value.to_string())
}

/// Split `key: value` lines on the first colon. Later duplicates overwrite
/// earlier ones but keep the first position.
fn parse_headers(headers_str: &str) -> EslResult<Vec<(String, String)>> {
    let mut headers: Vec<(String, String)> = Vec::new();

    for line in headers_str.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some((key, raw_value)) = line.split_once(':') else {
            return Err(EslError::InvalidHeader {
                header: line.to_string(),
            });
        };
        let key = key
            .trim()
            .to_string();
        let value = decode_value(raw_value.trim());
        match headers
            .iter_mut()
            .find(|(k, _)| *k == key)
        {
            Some(existing) => existing.1 = value,
            None => headers.push((key, value)),
        }
    }

    Ok(headers)
}

/// Plain events carry their own header block (percent-encoded values) in the
/// body, optionally followed by an inner body after a blank line.
fn parse_plain_event(message: &EslMessage) -> EslResult<EslEvent> {
    let content_type = message
        .header(HEADER_CONTENT_TYPE)
        .map(str::to_string);
    let body = message
        .body
        .as_deref()
        .ok_or_else(|| EslError::protocol_error("Plain event missing body"))?;

    let (header_section, inner_body) = match body.split_once(HEADER_TERMINATOR) {
        Some((headers, rest)) => (headers, Some(rest)),
        None => (body, None),
    };

    let mut event = EslEvent::with_content_type(content_type);
    for line in header_section.lines() {
        let line = line.trim();
        if let Some((key, raw_value)) = line.split_once(':') {
            event.set_header(key.trim(), decode_value(raw_value.trim()));
        }
    }

    if let Some(ib) = inner_body.filter(|ib| !ib.is_empty()) {
        event.set_body(ib.to_string());
    }
    Ok(event)
}

/// JSON events are a flat object; `_body` holds the inner body.
fn parse_json_event(message: &EslMessage) -> EslResult<EslEvent> {
    let content_type = message
        .header(HEADER_CONTENT_TYPE)
        .map(str::to_string);
    let body = message
        .body
        .as_deref()
        .ok_or_else(|| EslError::protocol_error("JSON event missing body"))?;

    let json_value: serde_json::Value = serde_json::from_str(body)?;
    let serde_json::Value::Object(obj) = json_value else {
        return Err(EslError::protocol_error("JSON event body is not an object"));
    };

    let mut event = EslEvent::with_content_type(content_type);
    for (key, value) in obj {
        let value_str = match value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        event.set_header(key, value_str);
    }
    if let Some(inner) = event.take_header("_body") {
        event.set_body(inner);
    }
    Ok(event)
}

/// XML events:
/// ```xml
/// <event>
///   <headers>
///     <Event-Name>HEARTBEAT</Event-Name>
///   </headers>
///   <body>...</body>
/// </event>
/// ```
fn parse_xml_event(message: &EslMessage) -> EslResult<EslEvent> {
    use quick_xml::events::Event as XmlEvent;
    use quick_xml::Reader;

    let content_type = message
        .header(HEADER_CONTENT_TYPE)
        .map(str::to_string);
    let body = message
        .body
        .as_deref()
        .ok_or_else(|| EslError::protocol_error("XML event missing body"))?;

    let mut reader = Reader::from_str(body);
    let mut event = EslEvent::with_content_type(content_type);
    let mut in_headers = false;
    let mut in_body = false;
    let mut current_tag: Option<String> = None;

    loop {
        match reader.read_event()? {
            XmlEvent::Start(e) => {
                let tag = String::from_utf8_lossy(
                    e.name()
                        .as_ref(),
                )
                .into_owned();
                match tag.as_str() {
                    "headers" => in_headers = true,
                    "body" => in_body = true,
                    _ if in_headers => current_tag = Some(tag),
                    _ => {}
                }
            }
            XmlEvent::End(e) => match e
                .name()
                .as_ref()
            {
                b"headers" => in_headers = false,
                b"body" => in_body = false,
                _ if in_headers => current_tag = None,
                _ => {}
            },
            XmlEvent::Text(e) => {
                let text = e
                    .unescape()?
                    .into_owned();
                if in_body {
                    event.set_body(text);
                } else if let Some(tag) = current_tag.as_ref() {
                    event.set_header(tag.clone(), text);
                }
            }
            XmlEvent::Eof => break,
            _ => {}
        }
    }

    Ok(event)
}
