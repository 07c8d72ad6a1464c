//! Per-room merged message sequence.
//!
//! Confirmed messages are keyed by id, so the confirmed part of the sequence
//! is strictly increasing and duplicate-free by construction. Pending
//! messages follow in send order.

use std::collections::BTreeMap;

use crate::domain::{
    ClientTempId, IncomingMessage, Message, MessageId, MessageState, RoomMessagePage,
};

/// Inclusive range of message ids missing from the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapRange {
    pub from: MessageId,
    pub to: MessageId,
}

impl GapRange {
    pub fn len(&self) -> usize {
        (self.to.value() - self.from.value() + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.to < self.from
    }

    fn overlaps(&self, other: &GapRange) -> bool {
        self.from <= other.to && other.from <= self.to
    }

    fn within(&self, low: MessageId, high: MessageId) -> bool {
        low <= self.from && self.to <= high
    }
}

/// What [`RoomHistory::ingest`] did with a live message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Added as a new message; `gap` is set when ids are missing before it
    Inserted { gap: Option<GapRange> },
    /// Confirmed one of our pending messages
    Replaced { gap: Option<GapRange> },
    /// Already known
    Duplicate,
}

impl IngestOutcome {
    pub fn gap(&self) -> Option<GapRange> {
        match self {
            IngestOutcome::Inserted { gap } | IngestOutcome::Replaced { gap } => *gap,
            IngestOutcome::Duplicate => None,
        }
    }
}

/// Which request produced a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Latest page, fetched when the viewer enters the room
    Initial,
    /// Next older page by cursor
    Older,
    /// Re-fetch of a missing range
    Gap(GapRange),
}

#[derive(Debug, Default)]
pub struct RoomHistory {
    confirmed: BTreeMap<MessageId, Message>,
    pending: Vec<Message>,
    cursor: Option<MessageId>,
    has_next: bool,
    loaded: bool,
    gaps_in_flight: Vec<GapRange>,
    failed_gaps: Vec<GapRange>,
    incomplete: bool,
}

impl RoomHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` once the initial page has been merged
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn has_next(&self) -> bool {
        self.loaded && self.has_next
    }

    /// Cursor for the next older page
    pub fn cursor(&self) -> Option<MessageId> {
        self.cursor
    }

    pub fn max_id(&self) -> Option<MessageId> {
        self.confirmed.keys().next_back().copied()
    }

    pub fn is_incomplete(&self) -> bool {
        self.incomplete || !self.failed_gaps.is_empty()
    }

    pub fn ingest(&mut self, incoming: IncomingMessage) -> IngestOutcome {
        let message_id = incoming.message_id;
        let replaced = match &incoming.client_temp_id {
            Some(temp_id) => self.take_pending(temp_id),
            None if !self.confirmed.contains_key(&message_id) => {
                self.take_pending_like(&incoming.message)
            }
            None => false,
        };

        if self.confirmed.contains_key(&message_id) {
            return IngestOutcome::Duplicate;
        }

        let gap = self.detect_gap(message_id);
        self.confirmed.insert(message_id, incoming.message);

        if replaced {
            IngestOutcome::Replaced { gap }
        } else {
            IngestOutcome::Inserted { gap }
        }
    }

    /// Merge a fetched page. Returns ranges that still need fetching: holes
    /// an initial page reveals, or the part of a gap a short page left out.
    /// A returned range is claimed as in flight.
    pub fn merge_page(&mut self, page: RoomMessagePage, kind: PageKind) -> Vec<GapRange> {
        let low = page.items.iter().filter_map(Message::message_id).min();
        let high = page.items.iter().filter_map(Message::message_id).max();

        for message in page.items {
            if let Some(message_id) = message.message_id() {
                self.confirmed.entry(message_id).or_insert(message);
            }
        }

        if let (Some(low), Some(high)) = (low, high) {
            self.failed_gaps.retain(|gap| !gap.within(low, high));
        }

        match kind {
            PageKind::Initial => {
                let first_load = !self.loaded;
                self.loaded = true;
                self.incomplete = false;
                if first_load || self.cursor.is_none() {
                    self.cursor = page.last_id;
                    self.has_next = page.has_next;
                }
                let floor = high.or_else(|| self.confirmed.keys().next().copied());
                match floor {
                    Some(floor) => self.claim_holes_above(floor),
                    None => Vec::new(),
                }
            }
            PageKind::Older => {
                self.cursor = page.last_id;
                self.has_next = page.has_next;
                Vec::new()
            }
            PageKind::Gap(range) => {
                self.gaps_in_flight.retain(|gap| *gap != range);
                self.failed_gaps.retain(|gap| *gap != range);
                match self.still_missing(range) {
                    Some(rest) => {
                        self.gaps_in_flight.push(rest);
                        vec![rest]
                    }
                    None => Vec::new(),
                }
            }
        }
    }

    /// A gap re-fetch failed.
    pub fn fail_gap(&mut self, range: GapRange) {
        self.gaps_in_flight.retain(|gap| *gap != range);
        if !self.failed_gaps.contains(&range) {
            self.failed_gaps.push(range);
        }
    }

    /// History could not be loaded at all.
    pub fn mark_incomplete(&mut self) {
        self.incomplete = true;
    }

    pub fn add_pending(&mut self, message: Message) {
        self.pending.push(message);
    }

    /// Flag a pending message as failed; returns `false` if it is unknown.
    pub fn mark_failed(&mut self, temp_id: &ClientTempId) -> bool {
        match self
            .pending
            .iter_mut()
            .find(|message| message.temp_id() == Some(temp_id))
        {
            Some(message) => {
                message.state = MessageState::Failed(temp_id.clone());
                true
            }
            None => false,
        }
    }

    /// Confirmed messages ascending by id, then pending ones in send order.
    pub fn snapshot(&self) -> Vec<Message> {
        self.confirmed
            .values()
            .chain(self.pending.iter())
            .cloned()
            .collect()
    }

    fn take_pending(&mut self, temp_id: &ClientTempId) -> bool {
        match self
            .pending
            .iter()
            .position(|message| message.temp_id() == Some(temp_id))
        {
            Some(index) => {
                self.pending.remove(index);
                true
            }
            None => false,
        }
    }

    /// Echo without a temp id: match the oldest pending message with the
    /// same sender and body.
    fn take_pending_like(&mut self, confirmed: &Message) -> bool {
        match self
            .pending
            .iter()
            .position(|message| message.is_pending() && message.same_content(confirmed))
        {
            Some(index) => {
                self.pending.remove(index);
                true
            }
            None => false,
        }
    }

    fn detect_gap(&mut self, message_id: MessageId) -> Option<GapRange> {
        if !self.loaded {
            return None;
        }
        let max = self.max_id()?;
        if message_id <= max.next() {
            return None;
        }
        self.claim(GapRange {
            from: max.next(),
            to: message_id.prev(),
        })
    }

    fn claim_holes_above(&mut self, floor: MessageId) -> Vec<GapRange> {
        let holes: Vec<GapRange> = self
            .confirmed
            .range(floor..)
            .map(|(id, _)| *id)
            .collect::<Vec<_>>()
            .windows(2)
            .filter(|pair| pair[1] > pair[0].next())
            .map(|pair| GapRange {
                from: pair[0].next(),
                to: pair[1].prev(),
            })
            .collect();

        holes.into_iter().filter_map(|hole| self.claim(hole)).collect()
    }

    /// Lower part of `range` not cached yet. Pages are fetched newest
    /// first, so the range is scanned down from its top.
    fn still_missing(&self, range: GapRange) -> Option<GapRange> {
        let mut top = range.to;
        while self.confirmed.contains_key(&top) {
            if top == range.from {
                return None;
            }
            top = top.prev();
        }
        Some(GapRange {
            from: range.from,
            to: top,
        })
    }

    /// Register a range as being fetched, unless it already is.
    fn claim(&mut self, range: GapRange) -> Option<GapRange> {
        if self.gaps_in_flight.iter().any(|gap| gap.overlaps(&range)) {
            return None;
        }
        self.gaps_in_flight.push(range);
        Some(range)
    }
}
