//! `heart-beat` header negotiation.

use std::time::Duration;

use super::error::CodecError;

/// One side's `heart-beat:<outgoing>,<incoming>` offer, in milliseconds.
///
/// `outgoing_ms` is the smallest interval at which this side can send
/// heartbeats, `incoming_ms` the interval at which it wants to receive them.
/// Zero means "cannot" / "does not want".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartBeat {
    pub outgoing_ms: u64,
    pub incoming_ms: u64,
}

/// Effective heartbeat schedule for the local side after negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NegotiatedHeartBeat {
    /// How often we must send something
    pub send_every: Option<Duration>,
    /// How often the peer promised to send something
    pub expect_every: Option<Duration>,
}

impl HeartBeat {
    pub const DISABLED: HeartBeat = HeartBeat {
        outgoing_ms: 0,
        incoming_ms: 0,
    };

    pub fn new(outgoing: Duration, incoming: Duration) -> Self {
        Self {
            outgoing_ms: outgoing.as_millis() as u64,
            incoming_ms: incoming.as_millis() as u64,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, CodecError> {
        let invalid = || CodecError::InvalidHeader {
            header: "heart-beat",
            value: raw.to_string(),
        };
        let (outgoing, incoming) = raw.split_once(',').ok_or_else(invalid)?;
        Ok(Self {
            outgoing_ms: outgoing.trim().parse().map_err(|_| invalid())?,
            incoming_ms: incoming.trim().parse().map_err(|_| invalid())?,
        })
    }

    pub fn to_header(self) -> String {
        format!("{},{}", self.outgoing_ms, self.incoming_ms)
    }

    /// Negotiate `self` (local offer) against the peer's offer.
    pub fn negotiate(self, peer: HeartBeat) -> NegotiatedHeartBeat {
        let pick = |mine: u64, theirs: u64| {
            (mine != 0 && theirs != 0).then(|| Duration::from_millis(mine.max(theirs)))
        };
        NegotiatedHeartBeat {
            send_every: pick(self.outgoing_ms, peer.incoming_ms),
            expect_every: pick(self.incoming_ms, peer.outgoing_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_heart_beat_header() {
        // テスト項目: heart-beat ヘッダーが解析される
        // given (前提条件):
        let raw = "10000, 5000";

        // when (操作):
        let result = HeartBeat::parse(raw);

        // then (期待する結果):
        assert_eq!(
            result,
            Ok(HeartBeat {
                outgoing_ms: 10000,
                incoming_ms: 5000
            })
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        // テスト項目: 不正な heart-beat ヘッダーはエラーになる
        // given (前提条件):
        let raw = "fast";

        // when (操作):
        let result = HeartBeat::parse(raw);

        // then (期待する結果):
        assert!(matches!(
            result,
            Err(CodecError::InvalidHeader {
                header: "heart-beat",
                ..
            })
        ));
    }

    #[test]
    fn test_negotiate_takes_the_larger_interval() {
        // テスト項目: 双方が有効な場合、大きい方の間隔が採用される
        // given (前提条件):
        let client = HeartBeat {
            outgoing_ms: 10000,
            incoming_ms: 10000,
        };
        let server = HeartBeat {
            outgoing_ms: 20000,
            incoming_ms: 4000,
        };

        // when (操作):
        let negotiated = client.negotiate(server);

        // then (期待する結果):
        assert_eq!(negotiated.send_every, Some(Duration::from_millis(10000)));
        assert_eq!(negotiated.expect_every, Some(Duration::from_millis(20000)));
    }

    #[test]
    fn test_negotiate_zero_disables_direction() {
        // テスト項目: どちらかが 0 の方向はハートビートが無効になる
        // given (前提条件):
        let client = HeartBeat {
            outgoing_ms: 10000,
            incoming_ms: 10000,
        };
        let server = HeartBeat {
            outgoing_ms: 0,
            incoming_ms: 5000,
        };

        // when (操作):
        let negotiated = client.negotiate(server);

        // then (期待する結果):
        assert_eq!(negotiated.send_every, Some(Duration::from_millis(10000)));
        assert_eq!(negotiated.expect_every, None);
    }
}
