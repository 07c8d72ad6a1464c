//! Reference-counted room subscriptions.

use std::collections::BTreeMap;

use crate::domain::RoomId;

/// Where a room's subscription stands on the current connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionPhase {
    /// Wanted, SUBSCRIBE not sent yet on this connection
    Queued,
    /// SUBSCRIBE sent, receipt pending
    Requested,
    /// Server acknowledged the subscription
    Active,
    /// Connection dropped; will be re-requested on reconnect
    Stale,
    /// Server refused; not retried until a consumer subscribes from zero
    Rejected(String),
}

#[derive(Debug, Clone)]
struct Entry {
    ref_count: usize,
    token: String,
    phase: SubscriptionPhase,
}

/// Result of releasing a room whose count reached zero
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Released {
    pub token: String,
    /// SUBSCRIBE is outstanding on the current connection and needs an UNSUBSCRIBE
    pub needs_unsubscribe: bool,
}

/// Subscriptions keyed by room, iterated in ascending room order
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    entries: BTreeMap<RoomId, Entry>,
    next_token: u64,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one consumer for `room_id`. Returns `true` when this is the first.
    pub fn acquire(&mut self, room_id: RoomId) -> bool {
        if let Some(entry) = self.entries.get_mut(&room_id) {
            entry.ref_count += 1;
            return false;
        }
        let token = format!("sub-{}", self.next_token);
        self.next_token += 1;
        self.entries.insert(
            room_id,
            Entry {
                ref_count: 1,
                token,
                phase: SubscriptionPhase::Queued,
            },
        );
        true
    }

    /// Remove one consumer. Returns the entry once the last consumer is gone.
    pub fn release(&mut self, room_id: RoomId) -> Option<Released> {
        let entry = self.entries.get_mut(&room_id)?;
        entry.ref_count -= 1;
        if entry.ref_count > 0 {
            return None;
        }
        let entry = self.entries.remove(&room_id)?;
        Some(Released {
            needs_unsubscribe: matches!(
                entry.phase,
                SubscriptionPhase::Requested | SubscriptionPhase::Active
            ),
            token: entry.token,
        })
    }

    /// Rooms that should be subscribed on the next connection, ascending
    pub fn wanted(&self) -> Vec<RoomId> {
        self.entries
            .iter()
            .filter(|(_, entry)| !matches!(entry.phase, SubscriptionPhase::Rejected(_)))
            .map(|(room_id, _)| *room_id)
            .collect()
    }

    /// Record that SUBSCRIBE is being sent; returns its token.
    pub fn mark_requested(&mut self, room_id: RoomId) -> Option<String> {
        let entry = self.entries.get_mut(&room_id)?;
        entry.phase = SubscriptionPhase::Requested;
        Some(entry.token.clone())
    }

    /// The connection is gone: every live subscription must be re-requested.
    pub fn mark_all_stale(&mut self) {
        for entry in self.entries.values_mut() {
            if matches!(
                entry.phase,
                SubscriptionPhase::Requested | SubscriptionPhase::Active
            ) {
                entry.phase = SubscriptionPhase::Stale;
            }
        }
    }

    /// Receipt for a SUBSCRIBE arrived.
    pub fn confirm(&mut self, token: &str) -> Option<RoomId> {
        let (room_id, entry) = self.find_mut(token)?;
        if entry.phase != SubscriptionPhase::Requested {
            return None;
        }
        entry.phase = SubscriptionPhase::Active;
        Some(room_id)
    }

    /// Server refused the SUBSCRIBE carrying `token`.
    pub fn reject(&mut self, token: &str, reason: &str) -> Option<RoomId> {
        let (room_id, entry) = self.find_mut(token)?;
        entry.phase = SubscriptionPhase::Rejected(reason.to_string());
        Some(room_id)
    }

    /// Room whose live subscription uses `token`
    pub fn room_for_token(&self, token: &str) -> Option<RoomId> {
        self.entries
            .iter()
            .find(|(_, entry)| {
                entry.token == token
                    && matches!(
                        entry.phase,
                        SubscriptionPhase::Requested | SubscriptionPhase::Active
                    )
            })
            .map(|(room_id, _)| *room_id)
    }

    pub fn ref_count(&self, room_id: RoomId) -> usize {
        self.entries.get(&room_id).map_or(0, |entry| entry.ref_count)
    }

    pub fn phase(&self, room_id: RoomId) -> Option<&SubscriptionPhase> {
        self.entries.get(&room_id).map(|entry| &entry.phase)
    }

    /// `(room, ref_count)` for every room with consumers, ascending
    pub fn counts(&self) -> Vec<(RoomId, usize)> {
        self.entries
            .iter()
            .map(|(room_id, entry)| (*room_id, entry.ref_count))
            .collect()
    }

    fn find_mut(&mut self, token: &str) -> Option<(RoomId, &mut Entry)> {
        self.entries
            .iter_mut()
            .find(|(_, entry)| entry.token == token)
            .map(|(room_id, entry)| (*room_id, entry))
    }
}
