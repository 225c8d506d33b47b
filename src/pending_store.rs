//! Two-tier storage for pending host calls.
//!
//! The fast lane is a fixed-capacity ring indexed by `id % capacity`, giving
//! allocation-free storage for calls that resolve before `capacity` newer
//! calls are issued. A call that outlives that window is spilled into the
//! overflow map when a newer id claims its slot; it stays pending, just
//! relocated.
//!
//! Lookup picks the tier by the eviction threshold `id < next_id - capacity`,
//! not by probing both tiers. The threshold assumes an id that old cannot
//! still occupy its ring slot under its own identity; the ring read keeps an
//! occupant-id match guard so a stale decision degrades to "not found"
//! rather than settling the wrong call.

use futures::channel::oneshot;
use std::collections::HashMap;

use crate::call_id::CallId;
use crate::error_registry::CallPayload;

/// Default ring capacity for the primary storage tier.
pub const PENDING_RING_CAPACITY: usize = 1024;

/// Sending half of a pending call's completion handle.
pub type CompletionSender = oneshot::Sender<CallPayload>;
/// Receiving half of a pending call's completion handle.
pub type CompletionReceiver = oneshot::Receiver<CallPayload>;

#[derive(Debug)]
struct PendingSlot {
    call_id: CallId,
    sender: CompletionSender,
}

/// Point-in-time diagnostics for the store internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingStoreStats {
    pub capacity: usize,
    pub ring_depth: usize,
    pub overflow_depth: usize,
    pub total_depth: usize,
    pub spills_total: u64,
    pub settled_total: u64,
    pub max_overflow_seen: usize,
}

/// Ring-plus-overflow store holding the completion handle for every
/// in-flight call, keyed by correlation id.
#[derive(Debug)]
pub struct PendingCallStore {
    ring: Vec<Option<PendingSlot>>,
    overflow: HashMap<CallId, PendingSlot>,
    capacity: usize,
    ring_depth: usize,
    /// One past the highest id ever registered; drives tier selection.
    next_id: u64,
    spills_total: u64,
    settled_total: u64,
    max_overflow_seen: usize,
}

impl PendingCallStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(PENDING_RING_CAPACITY)
    }

    /// Create a store with a custom ring capacity (clamped to at least 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut ring = Vec::with_capacity(capacity);
        ring.resize_with(capacity, || None);
        Self {
            ring,
            overflow: HashMap::new(),
            capacity,
            ring_depth: 0,
            next_id: 1,
            spills_total: 0,
            settled_total: 0,
            max_overflow_seen: 0,
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of calls currently pending across both tiers.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.ring_depth + self.overflow.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending_count() == 0
    }

    /// All pending correlation ids, for debugging.
    #[must_use]
    pub fn pending_ids(&self) -> Vec<CallId> {
        let mut ids: Vec<CallId> = self
            .ring
            .iter()
            .flatten()
            .map(|slot| slot.call_id)
            .chain(self.overflow.keys().copied())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Register a new pending call under `id` and return the awaitable half
    /// of its completion handle.
    ///
    /// If the ring slot for `id` still holds an older call, that call is
    /// spilled into the overflow map under its own id.
    pub fn register(&mut self, id: CallId) -> CompletionReceiver {
        debug_assert!(id.value() >= self.next_id, "ids must register in issue order");
        self.next_id = self.next_id.max(id.value().saturating_add(1));

        let slot_index = self.slot_index(id);
        let (sender, receiver) = oneshot::channel();

        if let Some(evicted) = self.ring[slot_index].take() {
            debug_assert!(evicted.call_id < id);
            self.ring_depth -= 1;
            tracing::debug!(
                target: "hostcall_bridge.pending_store",
                event = "pending_store.spill",
                evicted_id = %evicted.call_id,
                incoming_id = %id,
                slot = slot_index,
                overflow_depth = self.overflow.len() + 1,
                "Ring slot reclaimed, older pending call moved to overflow"
            );
            self.overflow.insert(evicted.call_id, evicted);
            self.spills_total = self.spills_total.saturating_add(1);
            self.max_overflow_seen = self.max_overflow_seen.max(self.overflow.len());
        }

        self.ring[slot_index] = Some(PendingSlot {
            call_id: id,
            sender,
        });
        self.ring_depth += 1;
        tracing::trace!(
            target: "hostcall_bridge.pending_store",
            event = "pending_store.register",
            call_id = %id,
            slot = slot_index,
            pending = self.pending_count(),
            "Registered pending call"
        );
        receiver
    }

    /// Remove and return the completion sender for `id`, if it is pending.
    pub fn take(&mut self, id: CallId) -> Option<CompletionSender> {
        let slot = if self.assumed_evicted(id) {
            self.overflow.remove(&id)
        } else {
            let slot_index = self.slot_index(id);
            let occupant_matches = self.ring[slot_index]
                .as_ref()
                .is_some_and(|occupant| occupant.call_id == id);
            if occupant_matches {
                self.ring_depth -= 1;
                self.ring[slot_index].take()
            } else {
                None
            }
        }?;

        self.settled_total = self.settled_total.saturating_add(1);
        tracing::trace!(
            target: "hostcall_bridge.pending_store",
            event = "pending_store.take",
            call_id = %id,
            pending = self.pending_count(),
            "Removed pending call"
        );
        Some(slot.sender)
    }

    /// Whether `id` is currently pending, using the same tier-selection rule
    /// as [`PendingCallStore::take`] without removing anything.
    #[must_use]
    pub fn contains(&self, id: CallId) -> bool {
        if self.assumed_evicted(id) {
            self.overflow.contains_key(&id)
        } else {
            self.ring[self.slot_index(id)]
                .as_ref()
                .is_some_and(|occupant| occupant.call_id == id)
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> PendingStoreStats {
        PendingStoreStats {
            capacity: self.capacity,
            ring_depth: self.ring_depth,
            overflow_depth: self.overflow.len(),
            total_depth: self.pending_count(),
            spills_total: self.spills_total,
            settled_total: self.settled_total,
            max_overflow_seen: self.max_overflow_seen,
        }
    }

    const fn slot_index(&self, id: CallId) -> usize {
        (id.value() % self.capacity as u64) as usize
    }

    /// Eviction-threshold approximation: an id more than `capacity` behind
    /// the issuance frontier can no longer hold its ring slot.
    const fn assumed_evicted(&self, id: CallId) -> bool {
        id.value() < self.next_id.saturating_sub(self.capacity as u64)
    }
}

impl Default for PendingCallStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_registry::CallPayload;
    use serde_json::json;

    fn settle(sender: CompletionSender, value: serde_json::Value) {
        sender
            .send(CallPayload::Success(value))
            .expect("receiver alive");
    }

    fn received(receiver: &mut CompletionReceiver) -> Option<CallPayload> {
        receiver.try_recv().expect("sender not dropped")
    }

    #[test]
    fn register_then_take_round_trips_the_handle() {
        let mut store = PendingCallStore::with_capacity(4);
        let mut receiver = store.register(CallId(1));
        assert!(store.contains(CallId(1)));
        assert_eq!(store.pending_count(), 1);

        let sender = store.take(CallId(1)).expect("pending");
        assert!(!store.contains(CallId(1)));
        assert!(store.is_empty());

        settle(sender, json!({"bytes": 5}));
        assert_eq!(
            received(&mut receiver),
            Some(CallPayload::Success(json!({"bytes": 5})))
        );
    }

    #[test]
    fn wraparound_spills_oldest_id_to_overflow() {
        let mut store = PendingCallStore::with_capacity(4);
        let mut receivers: Vec<CompletionReceiver> =
            (1..=4).map(|id| store.register(CallId(id))).collect();

        // Slots are 1, 2, 3, 0; no spill yet.
        assert_eq!(store.snapshot().spills_total, 0);
        assert_eq!(store.snapshot().overflow_depth, 0);

        // Id 5 claims slot 1 and relocates id 1 into overflow, still pending.
        let mut receiver5 = store.register(CallId(5));
        let stats = store.snapshot();
        assert_eq!(stats.spills_total, 1);
        assert_eq!(stats.overflow_depth, 1);
        assert_eq!(stats.total_depth, 5);
        assert!(store.contains(CallId(1)));

        // take(1) consults the overflow tier and returns id 1's original handle.
        let sender1 = store.take(CallId(1)).expect("spilled but pending");
        settle(sender1, json!("one"));
        assert_eq!(
            received(&mut receivers[0]),
            Some(CallPayload::Success(json!("one")))
        );

        // take(5) reads the ring and empties slot 1.
        let sender5 = store.take(CallId(5)).expect("in ring");
        settle(sender5, json!("five"));
        assert_eq!(
            received(&mut receiver5),
            Some(CallPayload::Success(json!("five")))
        );
        assert_eq!(store.pending_count(), 3);
    }

    #[test]
    fn every_pending_id_lives_in_exactly_one_tier() {
        let mut store = PendingCallStore::with_capacity(4);
        let _receivers: Vec<CompletionReceiver> =
            (1..=10).map(|id| store.register(CallId(id))).collect();

        let stats = store.snapshot();
        assert_eq!(stats.ring_depth + stats.overflow_depth, 10);
        assert_eq!(store.pending_ids().len(), 10);
        for id in 1..=10 {
            assert!(store.contains(CallId(id)), "id {id} lost");
        }
    }

    #[test]
    fn take_of_unknown_or_already_taken_id_returns_none() {
        let mut store = PendingCallStore::with_capacity(4);
        assert!(store.take(CallId(1)).is_none());

        let _receiver = store.register(CallId(1));
        assert!(store.take(CallId(1)).is_some());
        assert!(store.take(CallId(1)).is_none());
        assert!(!store.contains(CallId(1)));
    }

    #[test]
    fn ring_read_guards_on_occupant_identity() {
        let mut store = PendingCallStore::with_capacity(4);
        let _r1 = store.register(CallId(1));
        let sender = store.take(CallId(1)).expect("pending");
        drop(sender);

        // Slot 1 is empty now; a later id mapping to the same slot must not
        // be confused with the settled one.
        let _r5 = store.register(CallId(5));
        assert!(!store.contains(CallId(1)));
        assert!(store.take(CallId(1)).is_none());
        assert!(store.contains(CallId(5)));
    }

    #[test]
    fn pending_ids_are_sorted_across_tiers() {
        let mut store = PendingCallStore::with_capacity(2);
        let _receivers: Vec<CompletionReceiver> =
            (1..=5).map(|id| store.register(CallId(id))).collect();
        assert_eq!(
            store.pending_ids(),
            vec![CallId(1), CallId(2), CallId(3), CallId(4), CallId(5)]
        );
    }
}
