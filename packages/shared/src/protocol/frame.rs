//! Frame encoding and decoding.

use std::{fmt, str::FromStr};

use super::{
    PROTOCOL_VERSION,
    error::CodecError,
    heartbeat::HeartBeat,
};

/// Header names used by the protocol.
pub mod header {
    pub const ACCEPT_VERSION: &str = "accept-version";
    pub const ACK: &str = "ack";
    pub const CONTENT_LENGTH: &str = "content-length";
    pub const CONTENT_TYPE: &str = "content-type";
    pub const DESTINATION: &str = "destination";
    pub const HEART_BEAT: &str = "heart-beat";
    pub const HOST: &str = "host";
    pub const ID: &str = "id";
    pub const MESSAGE: &str = "message";
    pub const MESSAGE_ID: &str = "message-id";
    pub const RECEIPT: &str = "receipt";
    pub const RECEIPT_ID: &str = "receipt-id";
    pub const SUBSCRIPTION: &str = "subscription";
    pub const USER_ID: &str = "user-id";
    pub const VERSION: &str = "version";
}

const JSON_CONTENT_TYPE: &str = "application/json";

/// Frame command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Send => "SEND",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
            Command::Disconnect => "DISCONNECT",
        }
    }

    /// CONNECT and CONNECTED headers are never escaped.
    fn escapes_headers(self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            // STOMP is accepted as an alias of CONNECT
            "CONNECT" | "STOMP" => Ok(Command::Connect),
            "CONNECTED" => Ok(Command::Connected),
            "SUBSCRIBE" => Ok(Command::Subscribe),
            "UNSUBSCRIBE" => Ok(Command::Unsubscribe),
            "SEND" => Ok(Command::Send),
            "MESSAGE" => Ok(Command::Message),
            "RECEIPT" => Ok(Command::Receipt),
            "ERROR" => Ok(Command::Error),
            "DISCONNECT" => Ok(Command::Disconnect),
            other => Err(CodecError::UnknownCommand(other.to_string())),
        }
    }
}

/// One protocol frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Append a header (builder style).
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Header lookup. When a header repeats, the first occurrence wins.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Header lookup that fails with [`CodecError::MissingHeader`].
    pub fn require(&self, key: &'static str) -> Result<&str, CodecError> {
        self.get(key).ok_or(CodecError::MissingHeader {
            command: self.command.as_str(),
            header: key,
        })
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    // ========================================
    // Client frames
    // ========================================

    pub fn connect(host: &str, heart_beat: HeartBeat) -> Self {
        Frame::new(Command::Connect)
            .header(header::ACCEPT_VERSION, PROTOCOL_VERSION)
            .header(header::HOST, host)
            .header(header::HEART_BEAT, heart_beat.to_header())
    }

    pub fn subscribe(id: &str, destination: &str, receipt: &str) -> Self {
        Frame::new(Command::Subscribe)
            .header(header::ID, id)
            .header(header::DESTINATION, destination)
            .header(header::ACK, "auto")
            .header(header::RECEIPT, receipt)
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).header(header::ID, id)
    }

    pub fn send(destination: &str, json_body: impl Into<String>) -> Self {
        Frame::new(Command::Send)
            .header(header::DESTINATION, destination)
            .header(header::CONTENT_TYPE, JSON_CONTENT_TYPE)
            .with_body(json_body)
    }

    pub fn disconnect(receipt: &str) -> Self {
        Frame::new(Command::Disconnect).header(header::RECEIPT, receipt)
    }

    // ========================================
    // Server frames
    // ========================================

    pub fn connected(heart_beat: HeartBeat) -> Self {
        Frame::new(Command::Connected)
            .header(header::VERSION, PROTOCOL_VERSION)
            .header(header::HEART_BEAT, heart_beat.to_header())
    }

    pub fn message(
        destination: &str,
        message_id: &str,
        subscription: &str,
        json_body: impl Into<String>,
    ) -> Self {
        Frame::new(Command::Message)
            .header(header::DESTINATION, destination)
            .header(header::MESSAGE_ID, message_id)
            .header(header::SUBSCRIPTION, subscription)
            .header(header::CONTENT_TYPE, JSON_CONTENT_TYPE)
            .with_body(json_body)
    }

    pub fn receipt(receipt_id: &str) -> Self {
        Frame::new(Command::Receipt).header(header::RECEIPT_ID, receipt_id)
    }

    pub fn error(message: &str, receipt_id: Option<&str>) -> Self {
        let frame = Frame::new(Command::Error).header(header::MESSAGE, message);
        match receipt_id {
            Some(id) => frame.header(header::RECEIPT_ID, id),
            None => frame,
        }
    }

    /// Serialize to wire text.
    ///
    /// A `content-length` header is added for non-empty bodies unless one is
    /// already present.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');

        for (key, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(key));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(key);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }

        if !self.body.is_empty() && self.get(header::CONTENT_LENGTH).is_none() {
            out.push_str(header::CONTENT_LENGTH);
            out.push(':');
            out.push_str(&self.body.len().to_string());
            out.push('\n');
        }

        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

/// Decode every frame contained in one transport message.
///
/// Leading and interleaved EOLs are heartbeats and are skipped, so a pure
/// heartbeat decodes to an empty vector.
pub fn decode_frames(text: &str) -> Result<Vec<Frame>, CodecError> {
    let mut frames = Vec::new();
    let mut rest = text;

    loop {
        rest = rest.trim_start_matches(['\n', '\r']);
        if rest.is_empty() {
            break;
        }
        let (frame, remaining) = decode_one(rest)?;
        frames.push(frame);
        rest = remaining;
    }

    Ok(frames)
}

/// Decode a single frame from the start of `input`, returning the remainder.
fn decode_one(input: &str) -> Result<(Frame, &str), CodecError> {
    let mut cursor = 0;

    let (command_line, next) = next_line(input, cursor).ok_or(CodecError::Truncated)?;
    let command: Command = command_line.parse()?;
    cursor = next;

    let mut frame = Frame::new(command);
    loop {
        let (line, next) = next_line(input, cursor).ok_or(CodecError::Truncated)?;
        cursor = next;
        if line.is_empty() {
            break;
        }
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| CodecError::MalformedHeader(line.to_string()))?;
        if command.escapes_headers() {
            frame.headers.push((unescape_header(key)?, unescape_header(value)?));
        } else {
            frame.headers.push((key.to_string(), value.to_string()));
        }
    }

    let body_end = match frame.get(header::CONTENT_LENGTH) {
        Some(raw) => {
            let length: usize = raw
                .trim()
                .parse()
                .map_err(|_| CodecError::InvalidContentLength(raw.to_string()))?;
            let end = cursor
                .checked_add(length)
                .filter(|end| input.is_char_boundary(*end) && *end <= input.len())
                .ok_or_else(|| CodecError::InvalidContentLength(raw.to_string()))?;
            if input.as_bytes().get(end) != Some(&0) {
                return Err(CodecError::MissingNul);
            }
            end
        }
        None => {
            cursor
                + input[cursor..]
                    .find('\0')
                    .ok_or(CodecError::MissingNul)?
        }
    };

    frame.body = input[cursor..body_end].to_string();
    Ok((frame, &input[body_end + 1..]))
}

/// Return the line starting at `from` (without EOL) and the offset after it.
fn next_line(input: &str, from: usize) -> Option<(&str, usize)> {
    let rest = input.get(from..)?;
    let newline = rest.find('\n')?;
    let line = rest[..newline].strip_suffix('\r').unwrap_or(&rest[..newline]);
    Some((line, from + newline + 1))
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String, CodecError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(CodecError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_subscribe_frame() {
        // テスト項目: SUBSCRIBE フレームが正しい形式でエンコードされる
        // given (前提条件):
        let frame = Frame::subscribe("sub-0", "/topic/rooms/7", "sub-0");

        // when (操作):
        let encoded = frame.encode();

        // then (期待する結果):
        assert_eq!(
            encoded,
            "SUBSCRIBE\nid:sub-0\ndestination:/topic/rooms/7\nack:auto\nreceipt:sub-0\n\n\0"
        );
    }

    #[test]
    fn test_encode_adds_content_length_for_body() {
        // テスト項目: ボディを持つフレームには content-length が付与される
        // given (前提条件):
        let frame = Frame::send("/app/rooms/1", "{\"body\":\"hi\"}");

        // when (操作):
        let encoded = frame.encode();

        // then (期待する結果):
        assert!(encoded.contains("content-length:13\n"));
        assert!(encoded.ends_with("\n\n{\"body\":\"hi\"}\0"));
    }

    #[test]
    fn test_decode_message_frame() {
        // テスト項目: MESSAGE フレームがヘッダーとボディに分解される
        // given (前提条件):
        let text = "MESSAGE\ndestination:/topic/rooms/3\nmessage-id:42\nsubscription:sub-1\n\n{}\0";

        // when (操作):
        let frames = decode_frames(text).unwrap();

        // then (期待する結果):
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.get(header::DESTINATION), Some("/topic/rooms/3"));
        assert_eq!(frame.get(header::MESSAGE_ID), Some("42"));
        assert_eq!(frame.get(header::SUBSCRIPTION), Some("sub-1"));
        assert_eq!(frame.body, "{}");
    }

    #[test]
    fn test_decode_heartbeat_only_yields_no_frames() {
        // テスト項目: 改行のみのハートビートはフレームを生成しない
        // given (前提条件):
        let text = "\n";

        // when (操作):
        let frames = decode_frames(text).unwrap();

        // then (期待する結果):
        assert!(frames.is_empty());
    }

    #[test]
    fn test_decode_multiple_frames_with_interleaved_heartbeats() {
        // テスト項目: 1 メッセージ内の複数フレームとハートビートが処理される
        // given (前提条件):
        let text = "\r\nRECEIPT\nreceipt-id:a\n\n\0\nRECEIPT\nreceipt-id:b\n\n\0\n";

        // when (操作):
        let frames = decode_frames(text).unwrap();

        // then (期待する結果):
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].get(header::RECEIPT_ID), Some("a"));
        assert_eq!(frames[1].get(header::RECEIPT_ID), Some("b"));
    }

    #[test]
    fn test_decode_honours_content_length_with_embedded_nul() {
        // テスト項目: content-length 指定時は NUL を含むボディも読み取れる
        // given (前提条件):
        let text = "SEND\ndestination:/app/rooms/1\ncontent-length:3\n\na\0b\0";

        // when (操作):
        let frames = decode_frames(text).unwrap();

        // then (期待する結果):
        assert_eq!(frames[0].body, "a\0b");
    }

    #[test]
    fn test_header_escaping_is_symmetric() {
        // テスト項目: エスケープが必要なヘッダー値がエンコード後も復元される
        // given (前提条件):
        let frame = Frame::error("bad: line\nbreak \\ slash", Some("sub-3"));

        // when (操作):
        let decoded = decode_frames(&frame.encode()).unwrap();

        // then (期待する結果):
        assert_eq!(
            decoded[0].get(header::MESSAGE),
            Some("bad: line\nbreak \\ slash")
        );
    }

    #[test]
    fn test_connected_headers_are_not_unescaped() {
        // テスト項目: CONNECTED フレームのヘッダーはエスケープ解除されない
        // given (前提条件):
        let text = "CONNECTED\nversion:1.2\nserver:a\\cb\n\n\0";

        // when (操作):
        let frames = decode_frames(text).unwrap();

        // then (期待する結果):
        assert_eq!(frames[0].get("server"), Some("a\\cb"));
    }

    #[test]
    fn test_repeated_header_first_occurrence_wins() {
        // テスト項目: 重複ヘッダーは最初の値が採用される
        // given (前提条件):
        let text = "MESSAGE\nmessage-id:1\nmessage-id:2\n\n\0";

        // when (操作):
        let frames = decode_frames(text).unwrap();

        // then (期待する結果):
        assert_eq!(frames[0].get(header::MESSAGE_ID), Some("1"));
    }

    #[test]
    fn test_decode_errors() {
        // テスト項目: 不正なフレームはそれぞれのエラーになる
        // given (前提条件) / when (操作) / then (期待する結果):
        assert_eq!(
            decode_frames("PUBLISH\n\n\0"),
            Err(CodecError::UnknownCommand("PUBLISH".to_string()))
        );
        assert_eq!(
            decode_frames("MESSAGE\nno-separator\n\n\0"),
            Err(CodecError::MalformedHeader("no-separator".to_string()))
        );
        assert_eq!(
            decode_frames("MESSAGE\ndestination:/x"),
            Err(CodecError::Truncated)
        );
        assert_eq!(
            decode_frames("MESSAGE\ndestination:/x\n\nbody"),
            Err(CodecError::MissingNul)
        );
        assert_eq!(
            decode_frames("ERROR\nmessage:a\\tb\n\n\0"),
            Err(CodecError::InvalidEscape("a\\tb".to_string()))
        );
        assert_eq!(
            decode_frames("SEND\ncontent-length:99\n\nshort\0"),
            Err(CodecError::InvalidContentLength("99".to_string()))
        );
    }

    #[test]
    fn test_require_reports_missing_header() {
        // テスト項目: 必須ヘッダーが無い場合 MissingHeader エラーになる
        // given (前提条件):
        let frame = Frame::new(Command::Message);

        // when (操作):
        let result = frame.require(header::SUBSCRIPTION);

        // then (期待する結果):
        assert_eq!(
            result,
            Err(CodecError::MissingHeader {
                command: "MESSAGE",
                header: "subscription"
            })
        );
    }
}
