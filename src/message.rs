//! Data message helpers shared by the echo loop and the client.
//!
//! Only text and binary messages carry payload. Ping, pong, close and raw
//! frames are control traffic and are never echoed.

use tokio_tungstenite::tungstenite::Message;

/// Kind of a data message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Binary,
}

impl MessageKind {
    /// Kind of `msg`, or `None` for control frames.
    pub fn of(msg: &Message) -> Option<Self> {
        match msg {
            Message::Text(_) => Some(MessageKind::Text),
            Message::Binary(_) => Some(MessageKind::Binary),
            _ => None,
        }
    }
}

/// Build the echo for a data message.
///
/// The reply keeps the received kind. A prefix only ever applies to text;
/// binary payloads are returned untouched.
pub fn echo_reply(msg: Message, prefix: Option<&str>) -> Option<Message> {
    match msg {
        Message::Text(text) => match prefix {
            Some(prefix) => Some(Message::text(format!("{prefix}{}", text.as_str()))),
            None => Some(Message::Text(text)),
        },
        Message::Binary(data) => Some(Message::Binary(data)),
        _ => None,
    }
}

/// Render a message for log lines.
pub fn describe(msg: &Message) -> String {
    match msg {
        Message::Text(text) => text.as_str().to_string(),
        Message::Binary(data) => format!("<{} bytes>", data.len()),
        Message::Ping(_) => "<ping>".to_string(),
        Message::Pong(_) => "<pong>".to_string(),
        Message::Close(_) => "<close>".to_string(),
        Message::Frame(_) => "<frame>".to_string(),
    }
}
