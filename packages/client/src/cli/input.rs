//! Parsing of terminal input lines.

use crate::domain::RoomId;

/// One line typed by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Plain text to send to the current room
    Say(String),
    /// `/older`: load the previous history page
    Older,
    /// `/room <id>`: leave the current room and enter another
    Switch(RoomId),
    /// `/status`: print the connection state
    Status,
    /// `/quit`
    Quit,
    /// A slash command that could not be understood
    Invalid(String),
}

/// Parse a trimmed, non-empty input line.
pub fn parse_input(line: &str) -> Input {
    let Some(command) = line.strip_prefix('/') else {
        return Input::Say(line.to_string());
    };

    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some("older"), None, _) => Input::Older,
        (Some("status"), None, _) => Input::Status,
        (Some("quit" | "exit"), None, _) => Input::Quit,
        (Some("room"), Some(id), None) => match id.parse::<u64>() {
            Ok(id) => Input::Switch(RoomId::new(id)),
            Err(_) => Input::Invalid(format!("'{}' is not a room id", id)),
        },
        (Some("room"), _, _) => Input::Invalid("usage: /room <id>".to_string()),
        _ => Input::Invalid(format!("unknown command '{}'", line)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_sent() {
        // テスト項目: スラッシュで始まらない行はそのまま送信対象になる
        // given (前提条件):
        let line = "hello everyone";

        // when (操作):
        let input = parse_input(line);

        // then (期待する結果):
        assert_eq!(input, Input::Say("hello everyone".to_string()));
    }

    #[test]
    fn test_room_switch_is_parsed() {
        // テスト項目: /room コマンドでルーム ID が取り出される
        // given (前提条件):
        let line = "/room 42";

        // when (操作):
        let input = parse_input(line);

        // then (期待する結果):
        assert_eq!(input, Input::Switch(RoomId::new(42)));
    }

    #[test]
    fn test_malformed_commands_are_invalid() {
        // テスト項目: 不正なコマンドは Invalid になる
        // given (前提条件) / when (操作) / then (期待する結果):
        assert!(matches!(parse_input("/room general"), Input::Invalid(_)));
        assert!(matches!(parse_input("/room"), Input::Invalid(_)));
        assert!(matches!(parse_input("/room 1 2"), Input::Invalid(_)));
        assert!(matches!(parse_input("/dance"), Input::Invalid(_)));
        assert_eq!(parse_input("/older"), Input::Older);
        assert_eq!(parse_input("/exit"), Input::Quit);
    }
}
