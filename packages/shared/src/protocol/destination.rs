//! Room destinations.

/// Subscribe destination prefix; the room id follows.
pub const ROOM_TOPIC_PREFIX: &str = "/topic/rooms/";

/// Send destination prefix; the room id follows.
pub const ROOM_SEND_PREFIX: &str = "/app/rooms/";

pub fn room_topic(room_id: u64) -> String {
    format!("{ROOM_TOPIC_PREFIX}{room_id}")
}

pub fn room_send(room_id: u64) -> String {
    format!("{ROOM_SEND_PREFIX}{room_id}")
}

pub fn parse_room_topic(destination: &str) -> Option<u64> {
    destination.strip_prefix(ROOM_TOPIC_PREFIX)?.parse().ok()
}

pub fn parse_room_send(destination: &str) -> Option<u64> {
    destination.strip_prefix(ROOM_SEND_PREFIX)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_topic_is_parsed_back() {
        // テスト項目: ルームのトピックからルーム ID が取り出せる
        // given (前提条件):
        let topic = room_topic(12);

        // when (操作):
        let parsed = parse_room_topic(&topic);

        // then (期待する結果):
        assert_eq!(topic, "/topic/rooms/12");
        assert_eq!(parsed, Some(12));
    }

    #[test]
    fn test_foreign_destinations_are_rejected() {
        // テスト項目: 別種の宛先や数値でない ID は None になる
        // given (前提条件) / when (操作) / then (期待する結果):
        assert_eq!(parse_room_topic("/app/rooms/3"), None);
        assert_eq!(parse_room_send("/topic/rooms/3"), None);
        assert_eq!(parse_room_send("/app/rooms/general"), None);
        assert_eq!(parse_room_send(&room_send(3)), Some(3));
    }
}
