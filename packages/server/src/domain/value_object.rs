//! Value objects.

use std::fmt;

use thiserror::Error;

pub const USER_ID_MAX_LEN: usize = 64;
pub const MESSAGE_BODY_MAX_LEN: usize = 4000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("user id must not be empty")]
    EmptyUserId,

    #[error("user id is {0} characters long (max {USER_ID_MAX_LEN})")]
    UserIdTooLong(usize),

    #[error("message body must not be blank")]
    EmptyBody,

    #[error("message body is {0} characters long (max {MESSAGE_BODY_MAX_LEN})")]
    BodyTooLong(usize),
}

/// Identity of a connected user
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: String) -> Result<Self, ValueError> {
        let value = value.trim().to_string();
        if value.is_empty() {
            return Err(ValueError::EmptyUserId);
        }
        let len = value.chars().count();
        if len > USER_ID_MAX_LEN {
            return Err(ValueError::UserIdTooLong(len));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = ValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Text of a chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBody(String);

impl MessageBody {
    pub fn new(value: String) -> Result<Self, ValueError> {
        if value.trim().is_empty() {
            return Err(ValueError::EmptyBody);
        }
        let len = value.chars().count();
        if len > MESSAGE_BODY_MAX_LEN {
            return Err(ValueError::BodyTooLong(len));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for MessageBody {
    type Error = ValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_is_trimmed_and_validated() {
        // テスト項目: ユーザー ID は前後の空白が除去され、空や長すぎる値は拒否される
        // given (前提条件):
        let too_long = "a".repeat(USER_ID_MAX_LEN + 1);

        // when (操作):
        let trimmed = UserId::new("  alice ".to_string());
        let empty = UserId::new("   ".to_string());
        let long = UserId::new(too_long);

        // then (期待する結果):
        assert_eq!(trimmed.unwrap().as_str(), "alice");
        assert_eq!(empty, Err(ValueError::EmptyUserId));
        assert_eq!(long, Err(ValueError::UserIdTooLong(USER_ID_MAX_LEN + 1)));
    }

    #[test]
    fn test_message_body_keeps_whitespace_but_rejects_blank() {
        // テスト項目: 本文は空白を保持するが、空白のみの本文は拒否される
        // given (前提条件) / when (操作) / then (期待する結果):
        assert_eq!(
            MessageBody::new(" hi ".to_string()).unwrap().as_str(),
            " hi "
        );
        assert_eq!(
            MessageBody::new("\n\t".to_string()),
            Err(ValueError::EmptyBody)
        );
    }
}
