//! Per-rank slot storage.
//!
//! A `Shard` is one rank's slice of the table: a fixed array of slots
//! addressed by open addressing with linear probing. It is a plain
//! single-owner value with `&mut self` mutators; serialization of concurrent
//! requests is the job of the rank actor in [`crate::rank`], which is the
//! only code that ever holds a shard.
//!
//! Slots are never freed, so a slot that becomes occupied stays occupied
//! for the lifetime of the shard and the table never resizes. A full shard
//! rejects further inserts by returning `false`.
//!
//! # Example
//!
//! ```
//! use disthash::shard::Shard;
//! use disthash::types::RankId;
//!
//! let mut shard: Shard<(u64, &str)> = Shard::new(RankId::new(0), 16).unwrap();
//! assert!(shard.insert((7, "seven")));
//! assert_eq!(shard.find(&7), Some(&(7, "seven")));
//! assert_eq!(shard.find(&8), None);
//! ```

mod probe;

use crate::key::{TableEntry, TableKey};
use crate::types::{RankId, ShardStats, TableError, TableResult};
use probe::ProbeSequence;

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    inserts: u64,
    rejected: u64,
    hits: u64,
    misses: u64,
    probes: u64,
}

/// One rank's fixed-capacity open-addressing table.
#[derive(Debug)]
pub struct Shard<E: TableEntry> {
    rank: RankId,
    /// `Some` marks an occupied slot.
    slots: Box<[Option<E>]>,
    occupied: usize,
    counters: Counters,
}

impl<E: TableEntry> Shard<E> {
    /// Allocate a shard with `capacity` empty slots.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `capacity` is 0.
    pub fn new(rank: RankId, capacity: usize) -> TableResult<Self> {
        if capacity == 0 {
            return Err(TableError::InvalidConfig(
                "local capacity must be greater than 0".to_string(),
            ));
        }
        let slots = (0..capacity).map(|_| None).collect::<Vec<_>>();
        Ok(Self {
            rank,
            slots: slots.into_boxed_slice(),
            occupied: 0,
            counters: Counters::default(),
        })
    }

    /// Store `entry` in the first free slot of its probe sequence.
    ///
    /// Returns `false` if every slot was probed and found occupied. Keys are
    /// not deduplicated: inserting an existing key takes another slot.
    pub fn insert(&mut self, entry: E) -> bool {
        let mut probes = 0;
        for slot in ProbeSequence::new(entry.key().table_hash(), self.slots.len()) {
            probes += 1;
            if self.slots[slot].is_none() {
                self.slots[slot] = Some(entry);
                self.occupied += 1;
                self.counters.inserts += 1;
                self.counters.probes += probes;
                return true;
            }
        }
        self.counters.rejected += 1;
        self.counters.probes += probes;
        false
    }

    /// Find the first entry along `key`'s probe sequence whose key equals `key`.
    ///
    /// Stops at the first empty slot: insert would have used that slot before
    /// any later one, so the key cannot be further along.
    pub fn find(&mut self, key: &E::Key) -> Option<&E> {
        let (found, probes) = self.locate(key);
        self.counters.probes += probes;
        match found {
            Some(_) => self.counters.hits += 1,
            None => self.counters.misses += 1,
        }
        found.and_then(|slot| self.slots[slot].as_ref())
    }

    /// Slot index holding `key`, without touching the counters.
    pub fn position(&self, key: &E::Key) -> Option<usize> {
        self.locate(key).0
    }

    fn locate(&self, key: &E::Key) -> (Option<usize>, u64) {
        let mut probes = 0;
        for slot in ProbeSequence::new(key.table_hash(), self.slots.len()) {
            probes += 1;
            match &self.slots[slot] {
                Some(entry) if entry.key() == key => return (Some(slot), probes),
                Some(_) => continue,
                None => break,
            }
        }
        (None, probes)
    }

    /// The entry in slot `index`, if that slot is in range and occupied.
    pub fn slot(&self, index: usize) -> Option<&E> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Occupied entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn rank(&self) -> RankId {
        self.rank
    }

    /// Number of slots, fixed at construction.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.occupied
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    pub fn is_full(&self) -> bool {
        self.occupied == self.slots.len()
    }

    pub fn load_factor(&self) -> f64 {
        self.occupied as f64 / self.slots.len() as f64
    }

    /// Snapshot of occupancy and operation counters.
    pub fn stats(&self) -> ShardStats {
        ShardStats {
            rank: self.rank,
            capacity: self.slots.len(),
            occupied: self.occupied,
            inserts: self.counters.inserts,
            rejected: self.counters.rejected,
            hits: self.counters.hits,
            misses: self.counters.misses,
            probes: self.counters.probes,
        }
    }
}
