//! Time-related utilities with clock abstraction for testability.

use chrono::{DateTime, Utc};

/// Clock trait for dependency injection and testing
pub trait Clock: Send + Sync {
    /// Current Unix timestamp in milliseconds (UTC)
    fn now_millis(&self) -> i64;
}

/// System clock implementation (uses actual system time)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        now_millis()
    }
}

/// Fixed clock implementation for testing (returns a fixed time)
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    fixed_time: i64,
}

impl FixedClock {
    /// Create a new fixed clock with the given timestamp
    pub fn new(fixed_time_millis: i64) -> Self {
        Self {
            fixed_time: fixed_time_millis,
        }
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.fixed_time
    }
}

/// Current Unix timestamp in milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Short `HH:MM:SS` rendering used by terminal output.
pub fn timestamp_to_clock_time(timestamp_millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_millis)
        .map(|dt| dt.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_returns_increasing_timestamps() {
        // テスト項目: SystemClock が呼び出すたびに増加するタイムスタンプを返す
        // given (前提条件):
        let clock = SystemClock;

        // when (操作):
        let timestamp1 = clock.now_millis();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let timestamp2 = clock.now_millis();

        // then (期待する結果):
        assert!(timestamp1 > 0);
        assert!(timestamp2 >= timestamp1);
    }

    #[test]
    fn test_fixed_clock_returns_fixed_timestamp() {
        // テスト項目: FixedClock が固定されたタイムスタンプを返す
        // given (前提条件):
        let clock = FixedClock::new(1234567890123);

        // when (操作):
        let first = clock.now_millis();
        let second = clock.now_millis();

        // then (期待する結果):
        assert_eq!(first, 1234567890123);
        assert_eq!(second, 1234567890123);
    }

    #[test]
    fn test_timestamp_to_clock_time() {
        // テスト項目: 端末表示用の時刻文字列が生成される
        // given (前提条件):
        let timestamp = 1672531200000 + (13 * 3600 + 5 * 60 + 9) * 1000;

        // when (操作):
        let result = timestamp_to_clock_time(timestamp);

        // then (期待する結果):
        assert_eq!(result, "13:05:09");
    }

    #[test]
    fn test_out_of_range_timestamp_is_rendered_as_placeholder() {
        // テスト項目: 範囲外のタイムスタンプはプレースホルダーで表示される
        // given (前提条件):
        let timestamp = i64::MAX;

        // when (操作):
        let result = timestamp_to_clock_time(timestamp);

        // then (期待する結果):
        assert_eq!(result, "--:--:--");
    }
}
