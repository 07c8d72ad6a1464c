//! Ordering properties of the merged room history under arbitrary
//! interleavings of live pushes, history pages and local sends.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use async_trait::async_trait;
use proptest::prelude::*;
use tokio::sync::{mpsc, oneshot};

use chatline_client::{
    MessageReconciler,
    domain::{
        ClientTempId, CollaboratorError, HistoryClient, IncomingMessage, Message, MessageId,
        RoomId, RoomMessagePage, SenderId, Timestamp, UnreadCounter,
    },
    reconciler::{PageKind, RoomHistory},
};

#[derive(Debug, Clone)]
enum Step {
    /// Live push from another user
    Live(u64),
    /// Echo of the n-th local send, confirmed as the given id
    Echo(usize, u64),
    /// A history page holding the given ids
    Page(Vec<u64>, bool),
    /// Local send, shown as pending
    Send,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (1u64..80).prop_map(Step::Live),
        2 => (0usize..6, 1u64..80).prop_map(|(n, id)| Step::Echo(n, id)),
        2 => (prop::collection::vec(1u64..80, 0..12), any::<bool>())
            .prop_map(|(ids, initial)| Step::Page(ids, initial)),
        1 => Just(Step::Send),
    ]
}

fn room() -> RoomId {
    RoomId::new(1)
}

fn confirmed(id: u64, sender: &str, body: String) -> Message {
    Message::confirmed(
        room(),
        MessageId::new(id),
        SenderId::new(sender.to_string()).unwrap(),
        body,
        Timestamp::new(id as i64),
    )
}

fn temp_id(n: usize) -> ClientTempId {
    ClientTempId::new(format!("tmp-{n}")).unwrap()
}

proptest! {
    #[test]
    fn merged_history_is_ordered_and_duplicate_free(steps in prop::collection::vec(step(), 1..60)) {
        let mut history = RoomHistory::new();
        let mut expected_ids = BTreeSet::new();
        let mut sent = 0usize;
        let mut pending = BTreeSet::new();

        for step in steps {
            match step {
                Step::Live(id) => {
                    let message = confirmed(id, "bob", format!("live {id}"));
                    history.ingest(IncomingMessage::new(message, None).unwrap());
                    expected_ids.insert(id);
                }
                Step::Echo(n, id) => {
                    let message = confirmed(id, "alice", format!("mine {n}"));
                    history.ingest(IncomingMessage::new(message, Some(temp_id(n))).unwrap());
                    expected_ids.insert(id);
                    pending.remove(&n);
                }
                Step::Page(ids, initial) => {
                    let ids: BTreeSet<u64> = ids.into_iter().collect();
                    let page = RoomMessagePage {
                        last_id: ids.first().map(|id| MessageId::new(*id)),
                        items: ids
                            .iter()
                            .map(|id| confirmed(*id, "bob", format!("live {id}")))
                            .collect(),
                        has_next: true,
                    };
                    let kind = if initial { PageKind::Initial } else { PageKind::Older };
                    history.merge_page(page, kind);
                    expected_ids.extend(ids);
                }
                Step::Send => {
                    history.add_pending(Message::pending(
                        room(),
                        temp_id(sent),
                        SenderId::new("alice".to_string()).unwrap(),
                        format!("mine {sent}"),
                        Timestamp::new(0),
                    ));
                    pending.insert(sent);
                    sent += 1;
                }
            }

            let snapshot = history.snapshot();
            let ids: Vec<u64> = snapshot
                .iter()
                .filter_map(Message::message_id)
                .map(MessageId::value)
                .collect();
            prop_assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
            prop_assert_eq!(ids.iter().copied().collect::<BTreeSet<_>>(), expected_ids.clone());

            // pending entries trail every confirmed one
            let first_pending = snapshot.iter().position(|message| message.message_id().is_none());
            if let Some(first_pending) = first_pending {
                prop_assert!(snapshot[first_pending..].iter().all(|message| message.message_id().is_none()));
            }
            prop_assert_eq!(snapshot.len() - ids.len(), pending.len());
        }
    }
}

const PAGE_SIZE: usize = 5;

/// Room log `1..=latest`. Each response is computed when requested and
/// held until the test releases it.
struct HeldHistory {
    published_at_entry: u64,
    releases: mpsc::UnboundedSender<oneshot::Sender<()>>,
}

#[async_trait]
impl HistoryClient for HeldHistory {
    async fn fetch_page(
        &self,
        _room_id: RoomId,
        before_id: Option<MessageId>,
        size: usize,
    ) -> Result<RoomMessagePage, CollaboratorError> {
        let end = before_id.map_or(self.published_at_entry, |id| id.value() - 1);
        let start = end.saturating_sub(size as u64 - 1).max(1);
        let page = RoomMessagePage {
            last_id: Some(MessageId::new(start)),
            items: (start..=end)
                .map(|id| confirmed(id, "bob", format!("live {id}")))
                .collect(),
            has_next: start > 1,
        };

        let (release, released) = oneshot::channel();
        self.releases
            .send(release)
            .map_err(|e| CollaboratorError::Request(e.to_string()))?;
        released
            .await
            .map_err(|e| CollaboratorError::Request(e.to_string()))?;
        Ok(page)
    }
}

struct NoUnread;

impl UnreadCounter for NoUnread {
    fn invalidate(&self, _room_id: RoomId) {}
}

/// Let every spawned task run until it blocks.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

fn scenario() -> impl Strategy<Value = (u64, u64, Vec<bool>, Vec<(bool, usize)>)> {
    (2u64..30).prop_flat_map(|latest| {
        (
            Just(latest),
            1..latest,
            prop::collection::vec(any::<bool>(), latest as usize),
            prop::collection::vec((any::<bool>(), any::<usize>()), 0..80),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn history_is_contiguous_when_fetches_complete_out_of_order(
        (latest, published_at_entry, dropped, schedule) in scenario(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        runtime.block_on(async {
            let (releases, mut requests) = mpsc::unbounded_channel();
            let history = HeldHistory { published_at_entry, releases };
            let reconciler = MessageReconciler::new(Arc::new(history), Arc::new(NoUnread), PAGE_SIZE);

            let mut tasks = Vec::new();
            let loader = reconciler.clone();
            tasks.push(tokio::spawn(async move {
                let _ = loader.load_latest(room()).await;
            }));
            // the room is tracked before its first page is requested
            settle().await;

            // live delivery after entry; the newest message is never dropped
            let mut live = (published_at_entry + 1..=latest)
                .filter(|id| *id == latest || !dropped[*id as usize - 1]);
            let mut held: Vec<oneshot::Sender<()>> = Vec::new();

            let deliver = |id: u64, tasks: &mut Vec<tokio::task::JoinHandle<()>>| {
                let reconciler = reconciler.clone();
                let message = confirmed(id, "bob", format!("live {id}"));
                tasks.push(tokio::spawn(async move {
                    reconciler.ingest(IncomingMessage::new(message, None).unwrap()).await;
                }));
            };

            for (release, pick) in schedule {
                settle().await;
                while let Ok(request) = requests.try_recv() {
                    held.push(request);
                }
                if release && !held.is_empty() {
                    let index = pick % held.len();
                    let _ = held.remove(index).send(());
                } else if let Some(id) = live.next() {
                    deliver(id, &mut tasks);
                }
            }
            for id in live {
                deliver(id, &mut tasks);
            }

            loop {
                settle().await;
                while let Ok(request) = requests.try_recv() {
                    held.push(request);
                }
                if held.is_empty() && tasks.iter().all(|task| task.is_finished()) {
                    break;
                }
                for request in held.drain(..) {
                    let _ = request.send(());
                }
            }

            let first = published_at_entry.saturating_sub(PAGE_SIZE as u64 - 1).max(1);
            let ids: Vec<u64> = reconciler
                .snapshot(room())
                .await
                .iter()
                .filter_map(Message::message_id)
                .map(MessageId::value)
                .collect();
            prop_assert_eq!(ids, (first..=latest).collect::<Vec<_>>());
            prop_assert!(!reconciler.is_incomplete(room()).await);
            Ok(())
        })?;
    }
}
