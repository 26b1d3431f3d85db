//! LRU-K Core
//!
//! Single-threaded two-tier list. Entries live in a slab (`Vec<Option<Slot>>`)
//! and are threaded into one of two intrusive doubly-linked lists by index, so
//! promotion is an O(1) unlink/relink that keeps the entry's metadata intact.
//!
//! Pairs that leave the cache are buffered in `evicted` and handed to the
//! caller through [`LruKCache::take_evicted`]; the thread-safe wrapper drains
//! them after releasing its lock.

use bytes::Bytes;
use std::collections::HashMap;

use super::types::{CacheEntry, Tier};

struct Slot {
    entry: CacheEntry,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Head is most recent, tail is the next victim.
#[derive(Debug, Default, Clone, Copy)]
struct Segment {
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

pub struct LruKCache {
    k: u32,
    max_bytes: u64,
    used_bytes: u64,
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    candidates: Segment,
    residents: Segment,
    evicted: Vec<(String, Bytes)>,
}

impl LruKCache {
    /// `k` must already be validated (>= 2). `max_bytes == 0` means unbounded.
    pub fn new(k: u32, max_bytes: u64) -> Self {
        Self {
            k,
            max_bytes,
            used_bytes: 0,
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            candidates: Segment::default(),
            residents: Segment::default(),
            evicted: Vec::new(),
        }
    }

    pub fn get(&mut self, key: &str) -> Option<Bytes> {
        let idx = *self.index.get(key)?;
        self.touch(idx, false);
        self.slot(idx).map(|slot| slot.entry.value.clone())
    }

    /// Reads without counting a touch or reordering.
    pub fn peek(&self, key: &str) -> Option<Bytes> {
        let idx = *self.index.get(key)?;
        self.slot(idx).map(|slot| slot.entry.value.clone())
    }

    pub fn set(&mut self, key: &str, value: Bytes) {
        if let Some(&idx) = self.index.get(key) {
            let Some(slot) = self.slot_mut(idx) else {
                return;
            };
            let old_len = slot.entry.value.len() as u64;
            let new_len = value.len() as u64;
            slot.entry.value = value;
            self.used_bytes = self.used_bytes - old_len + new_len;
            self.touch(idx, true);
        } else {
            let entry = CacheEntry::new(key.to_string(), value);
            self.used_bytes += entry.size();
            let idx = self.allocate(entry);
            self.index.insert(key.to_string(), idx);
            self.attach_front(idx, Tier::Candidate);
        }
        self.enforce_budget();
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let Some(idx) = self.index.get(key).copied() else {
            return false;
        };
        match self.release(idx) {
            Some(entry) => {
                self.evicted.push((entry.key, entry.value));
                true
            }
            None => false,
        }
    }

    /// Evicts the candidate tail, or the resident tail once no candidates remain.
    /// Returns false on an empty cache.
    pub fn remove_oldest(&mut self) -> bool {
        let Some(idx) = self.candidates.tail.or(self.residents.tail) else {
            return false;
        };
        let Some(entry) = self.release(idx) else {
            return false;
        };
        tracing::trace!("Evicted '{}' from {:?} tier", entry.key, entry.tier);
        self.evicted.push((entry.key, entry.value));
        true
    }

    /// Removes and returns every entry whose key matches `predicate`.
    pub fn extract_where<F>(&mut self, mut predicate: F) -> HashMap<String, Bytes>
    where
        F: FnMut(&str) -> bool,
    {
        let keys: Vec<String> = self
            .index
            .keys()
            .filter(|key| predicate(key))
            .cloned()
            .collect();

        let mut extracted = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(idx) = self.index.get(&key).copied()
                && let Some(entry) = self.release(idx)
            {
                self.evicted.push((entry.key.clone(), entry.value.clone()));
                extracted.insert(entry.key, entry.value);
            }
        }
        extracted
    }

    pub fn snapshot(&self) -> HashMap<String, Bytes> {
        self.slots
            .iter()
            .flatten()
            .map(|slot| (slot.entry.key.clone(), slot.entry.value.clone()))
            .collect()
    }

    /// Drops every entry without reporting them as evicted.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.candidates = Segment::default();
        self.residents = Segment::default();
        self.used_bytes = 0;
    }

    pub fn take_evicted(&mut self) -> Vec<(String, Bytes)> {
        std::mem::take(&mut self.evicted)
    }

    pub fn tier(&self, key: &str) -> Option<Tier> {
        let idx = *self.index.get(key)?;
        self.slot(idx).map(|slot| slot.entry.tier)
    }

    pub fn touches(&self, key: &str) -> Option<u32> {
        let idx = *self.index.get(key)?;
        self.slot(idx).map(|slot| slot.entry.touches)
    }

    /// Keys of one tier, most recent first.
    pub fn keys_in(&self, tier: Tier) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.segment(tier).len);
        let mut cursor = self.segment(tier).head;
        while let Some(slot) = cursor.and_then(|idx| self.slot(idx)) {
            keys.push(slot.entry.key.clone());
            cursor = slot.next;
        }
        keys
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn promote_after(&self) -> u32 {
        self.k
    }

    fn enforce_budget(&mut self) {
        if self.max_bytes == 0 {
            return;
        }
        while self.used_bytes > self.max_bytes {
            if !self.remove_oldest() {
                break;
            }
        }
    }

    /// Counts a touch and moves the entry to the front of its (possibly new) tier.
    /// Reads only count touches on candidates; writes count on both tiers.
    fn touch(&mut self, idx: usize, count_resident: bool) {
        let k = self.k;
        let Some(slot) = self.slot_mut(idx) else {
            return;
        };
        let tier = slot.entry.tier;
        if tier == Tier::Candidate || count_resident {
            slot.entry.touches = slot.entry.touches.saturating_add(1);
        }
        let target = if slot.entry.touches >= k {
            Tier::Resident
        } else {
            tier
        };
        self.detach(idx);
        self.attach_front(idx, target);
    }

    fn allocate(&mut self, entry: CacheEntry) -> usize {
        let slot = Slot {
            entry,
            prev: None,
            next: None,
        };
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(slot);
                idx
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        }
    }

    /// Unlinks and frees a slot. `None` if `idx` is not a live slot.
    fn release(&mut self, idx: usize) -> Option<CacheEntry> {
        self.detach(idx);
        let slot = self.slots.get_mut(idx)?.take()?;
        self.free.push(idx);
        self.index.remove(&slot.entry.key);
        self.used_bytes -= slot.entry.size();
        Some(slot.entry)
    }

    fn detach(&mut self, idx: usize) {
        let Some((prev, next, tier)) = self
            .slot(idx)
            .map(|slot| (slot.prev, slot.next, slot.entry.tier))
        else {
            return;
        };
        match prev.and_then(|p| self.slot_mut(p)) {
            Some(prev_slot) => prev_slot.next = next,
            None => self.segment_mut(tier).head = next,
        }
        match next.and_then(|n| self.slot_mut(n)) {
            Some(next_slot) => next_slot.prev = prev,
            None => self.segment_mut(tier).tail = prev,
        }
        let segment = self.segment_mut(tier);
        segment.len = segment.len.saturating_sub(1);

        if let Some(slot) = self.slot_mut(idx) {
            slot.prev = None;
            slot.next = None;
        }
    }

    fn attach_front(&mut self, idx: usize, tier: Tier) {
        let old_head = self.segment(tier).head;
        let Some(slot) = self.slot_mut(idx) else {
            return;
        };
        slot.entry.tier = tier;
        slot.prev = None;
        slot.next = old_head;
        if let Some(head) = old_head.and_then(|head| self.slot_mut(head)) {
            head.prev = Some(idx);
        }
        let segment = self.segment_mut(tier);
        segment.head = Some(idx);
        if segment.tail.is_none() {
            segment.tail = Some(idx);
        }
        segment.len += 1;
    }

    fn segment(&self, tier: Tier) -> &Segment {
        match tier {
            Tier::Candidate => &self.candidates,
            Tier::Resident => &self.residents,
        }
    }

    fn segment_mut(&mut self, tier: Tier) -> &mut Segment {
        match tier {
            Tier::Candidate => &mut self.candidates,
            Tier::Resident => &mut self.residents,
        }
    }

    fn slot(&self, idx: usize) -> Option<&Slot> {
        self.slots.get(idx)?.as_ref()
    }

    fn slot_mut(&mut self, idx: usize) -> Option<&mut Slot> {
        self.slots.get_mut(idx)?.as_mut()
    }
}
