//! Monotonicity of the last-read marker under arbitrary visibility reports.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use proptest::prelude::*;

use chatline_client::{
    ReadTracker,
    domain::{CollaboratorError, LastReadClient, MessageId, RoomId, UnreadCounter},
};

const DEBOUNCE: Duration = Duration::from_millis(500);

/// Records every update; fails those listed in `failing`.
#[derive(Default)]
struct RecordingClient {
    calls: Mutex<Vec<u64>>,
    failing: Vec<usize>,
}

#[async_trait]
impl LastReadClient for RecordingClient {
    async fn set_last_read(
        &self,
        _room_id: RoomId,
        message_id: MessageId,
    ) -> Result<(), CollaboratorError> {
        let mut calls = self.calls.lock().unwrap();
        let attempt = calls.len();
        calls.push(message_id.value());
        if self.failing.contains(&attempt) {
            return Err(CollaboratorError::Status(503));
        }
        Ok(())
    }
}

struct NoUnread;

impl UnreadCounter for NoUnread {
    fn invalidate(&self, _room_id: RoomId) {}
}

proptest! {
    #[test]
    fn marker_never_moves_backwards(
        reports in prop::collection::vec((1u64..200, 0u64..800), 1..40),
        failing in prop::collection::vec(0usize..10, 0..3),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        runtime.block_on(async {
            let room = RoomId::new(1);
            let client = Arc::new(RecordingClient { failing, ..RecordingClient::default() });
            let tracker = ReadTracker::new(client.clone(), Arc::new(NoUnread), DEBOUNCE);

            let mut markers = Vec::new();
            for (id, pause_ms) in &reports {
                tracker.mark_visible(room, MessageId::new(*id)).await;
                tokio::time::sleep(Duration::from_millis(*pause_ms)).await;
                markers.push(tracker.marker(room).await);
            }
            tracker.leave_room(room).await;
            markers.push(tracker.marker(room).await);

            prop_assert!(markers.windows(2).all(|pair| pair[0] <= pair[1]));

            let highest = reports.iter().map(|(id, _)| *id).max();
            let acknowledged = tracker.marker(room).await.map(MessageId::value);
            prop_assert!(acknowledged <= highest);

            // every successful update was for a higher id than the last one
            let calls = client.calls.lock().unwrap().clone();
            let successes: Vec<u64> = calls
                .iter()
                .enumerate()
                .filter(|(attempt, _)| !client.failing.contains(attempt))
                .map(|(_, id)| *id)
                .collect();
            prop_assert!(successes.windows(2).all(|pair| pair[0] < pair[1]));
            Ok(())
        })?;
    }
}
