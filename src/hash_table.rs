//! A dynamic open-addressing hash table from byte-string labels to `i64`
//! values, which also remembers the order in which labels first arrived.
//!
//! Collisions are resolved by re-hashing the key seeded with the previous
//! hash, rather than by a fixed stride or a second hash function. The table
//! doubles in size once three quarters of its slots are in use, and every
//! entry is re-placed by walking its probe sequence again against the new
//! size. Entries are never removed.
//!
//! How labels are stored is decided by the key type when the table is
//! created:
//!
//! - [`BorrowedTable`] keeps `&[u8]` slices, so the caller's buffers have to
//!   outlive the table.
//! - [`OwnedTable`] copies every inserted label into a `Box<[u8]>`.
//! - `HashTable<Cow<[u8]>>` mixes the two, borrowing what it can.

use std::mem;

use crate::error::TableError;
use crate::helpers::{hash, rehash};

/// Consecutive collisions after which a probe sequence is given up on.
pub const PROBE_LIMIT: usize = 1000;

/// Value conventionally stored for a label that hasn't been located yet.
pub const NOT_FOUND: i64 = -1;

pub type BorrowedTable<'a> = HashTable<&'a [u8]>;
pub type OwnedTable = HashTable<Box<[u8]>>;

#[derive(Debug)]
struct Entry<K> {
    order: u64,
    key: K,
    value: i64,
}

#[derive(Debug)]
enum Slot<K> {
    Free,
    Occupied(Entry<K>),
}

enum Probe {
    Found(usize),
    Vacant(usize),
}

/// Slot indices visited while looking for `key` in a table of `size` slots.
struct ProbeSequence<'k> {
    key: &'k [u8],
    hash: u64,
    size: u64,
    remaining: usize,
    started: bool,
}

impl<'k> ProbeSequence<'k> {
    fn new(key: &'k [u8], size: usize, limit: usize) -> ProbeSequence<'k> {
        ProbeSequence {
            key,
            hash: hash(key),
            size: size as u64,
            remaining: limit + 1,
            started: false,
        }
    }
}

impl<'k> Iterator for ProbeSequence<'k> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None
        }
        if self.started {
            self.hash = rehash(self.key, self.hash);
        }
        self.started = true;
        self.remaining -= 1;
        Some((self.hash % self.size) as usize)
    }
}

/// A label as seen through [`HashTable::iter`] or a [`Cursor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryRef<'a> {
    pub key: &'a [u8],
    pub order: u64,
    pub value: i64,
}

/// A detached position in a table's slot array.
///
/// Unlike [`Iter`], a cursor doesn't borrow the table, so values can be
/// changed between steps. Inserting a new label (or growing the table)
/// invalidates it, and the next step reports [`TableError::StaleCursor`].
#[derive(Clone, Copy, Debug)]
pub struct Cursor {
    slot: usize,
    generation: u64,
}

#[derive(Debug)]
pub struct HashTable<K = Box<[u8]>> {
    slots: Vec<Slot<K>>,
    count: usize,
    load_limit: usize,
    probe_limit: usize,
    generation: u64,
}

fn load_limit(size: usize) -> usize {
    size * 3 / 4
}

fn free_slots<K>(size: usize) -> Vec<Slot<K>> {
    (0..size).map(|_| Slot::Free).collect()
}

impl<K: AsRef<[u8]>> HashTable<K> {
    /// Creates an empty table with `initial_size` slots (at least one).
    pub fn new(initial_size: usize) -> HashTable<K> {
        let size = initial_size.max(1);
        HashTable {
            slots: free_slots(size),
            count: 0,
            load_limit: load_limit(size),
            probe_limit: PROBE_LIMIT,
            generation: 0,
        }
    }

    #[cfg(test)]
    fn with_probe_limit(initial_size: usize, probe_limit: usize) -> HashTable<K> {
        HashTable { probe_limit, ..HashTable::new(initial_size) }
    }

    /// Number of slots.
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Number of distinct labels.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn probe(&self, key: &[u8]) -> Option<Probe> {
        for idx in ProbeSequence::new(key, self.slots.len(), self.probe_limit) {
            match self.slots[idx] {
                Slot::Free => return Some(Probe::Vacant(idx)),
                Slot::Occupied(ref entry) if entry.key.as_ref() == key => {
                    return Some(Probe::Found(idx))
                },
                Slot::Occupied(_) => (),
            }
        }
        None
    }

    // Lookups treat an exhausted probe sequence as "absent": a stored key was
    // placed within the limit, and slots are never freed, so its lookup ends
    // within the limit too.
    fn find(&self, key: &[u8]) -> Option<&Entry<K>> {
        match self.probe(key) {
            Some(Probe::Found(idx)) => match self.slots[idx] {
                Slot::Occupied(ref entry) => Some(entry),
                Slot::Free => None,
            },
            _ => None,
        }
    }

    fn find_mut(&mut self, key: &[u8]) -> Option<&mut Entry<K>> {
        match self.probe(key) {
            Some(Probe::Found(idx)) => match self.slots[idx] {
                Slot::Occupied(ref mut entry) => Some(entry),
                Slot::Free => None,
            },
            _ => None,
        }
    }

    /// Inserts `key` with value 0 unless it's already present.
    /// Returns the label's order either way.
    pub fn insert<Q>(&mut self, key: Q) -> Result<u64, TableError>
        where Q: AsRef<[u8]> + Into<K>
    {
        self.upsert(key, None)
    }

    /// Inserts `key` with `value`, or overwrites the value of an existing key.
    pub fn insert_or_set_value<Q>(&mut self, key: Q, value: i64) -> Result<u64, TableError>
        where Q: AsRef<[u8]> + Into<K>
    {
        self.upsert(key, Some(value))
    }

    /// A new key that would bring the table to its load limit grows the
    /// table first, so an `Err` always leaves the table as it was.
    fn upsert<Q>(&mut self, key: Q, value: Option<i64>) -> Result<u64, TableError>
        where Q: AsRef<[u8]> + Into<K>
    {
        let mut idx = match self.probe(key.as_ref()) {
            Some(Probe::Found(idx)) => {
                if let Slot::Occupied(ref mut entry) = self.slots[idx] {
                    if let Some(value) = value {
                        entry.value = value;
                    }
                    return Ok(entry.order)
                }
                idx
            },
            Some(Probe::Vacant(idx)) => idx,
            None => return Err(self.exhausted()),
        };

        if self.count + 1 >= self.load_limit {
            self.grow()?;
            idx = match self.probe(key.as_ref()) {
                Some(Probe::Vacant(idx)) => idx,
                _ => return Err(self.exhausted()),
            };
        }

        let order = self.count as u64;
        self.slots[idx] = Slot::Occupied(Entry {
            order,
            key: key.into(),
            value: value.unwrap_or(0),
        });
        self.count += 1;
        self.generation += 1;
        Ok(order)
    }

    fn exhausted(&self) -> TableError {
        TableError::ProbeLimitExceeded { probes: self.probe_limit }
    }

    /// Doubles the slot count and re-places every entry.
    ///
    /// All placements are worked out before anything moves, so a failure
    /// leaves the table exactly as it was.
    fn grow(&mut self) -> Result<(), TableError> {
        let new_size = self.slots.len() * 2;
        let mut taken = vec![false; new_size];
        let mut moves = Vec::with_capacity(self.count);

        for (old_idx, slot) in self.slots.iter().enumerate() {
            if let Slot::Occupied(ref entry) = *slot {
                let new_idx = ProbeSequence::new(entry.key.as_ref(), new_size, self.probe_limit)
                    .find(|&idx| !taken[idx])
                    .ok_or_else(|| self.exhausted())?;
                taken[new_idx] = true;
                moves.push((old_idx, new_idx));
            }
        }

        let mut old = mem::replace(&mut self.slots, free_slots(new_size));
        for (old_idx, new_idx) in moves {
            self.slots[new_idx] = mem::replace(&mut old[old_idx], Slot::Free);
        }
        self.load_limit = load_limit(new_size);
        self.generation += 1;
        Ok(())
    }

    /// Sets the value of `key` if it's present, without ever inserting.
    /// Returns whether the key was found.
    pub fn set_value_if_present(&mut self, key: &[u8], value: i64) -> bool {
        match self.find_mut(key) {
            Some(entry) => {
                entry.value = value;
                true
            },
            None => false,
        }
    }

    /// Sets every stored value to `value`.
    pub fn reset_values(&mut self, value: i64) {
        for slot in self.slots.iter_mut() {
            if let Slot::Occupied(ref mut entry) = *slot {
                entry.value = value;
            }
        }
    }

    pub fn get_value(&self, key: &[u8]) -> Option<i64> {
        self.find(key).map(|entry| entry.value)
    }

    pub fn get_order(&self, key: &[u8]) -> Option<u64> {
        self.find(key).map(|entry| entry.order)
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.find(key).is_some()
    }

    /// Number of labels whose value is `value`.
    pub fn count_equal(&self, value: i64) -> usize {
        self.iter().filter(|entry| entry.value == value).count()
    }

    /// Number of labels whose value isn't `value`.
    pub fn count_not_equal(&self, value: i64) -> usize {
        self.count - self.count_equal(value)
    }

    /// Iterates over all labels in slot order (which is unrelated to
    /// insertion order).
    pub fn iter(&self) -> Iter<'_, K> {
        Iter { slots: self.slots.iter() }
    }

    pub fn cursor(&self) -> Cursor {
        Cursor { slot: 0, generation: self.generation }
    }

    /// Advances `cursor` to the next occupied slot.
    pub fn next_entry(&self, cursor: &mut Cursor) -> Result<Option<EntryRef<'_>>, TableError> {
        if cursor.generation != self.generation {
            return Err(TableError::StaleCursor)
        }
        while cursor.slot < self.slots.len() {
            let idx = cursor.slot;
            cursor.slot += 1;
            if let Slot::Occupied(ref entry) = self.slots[idx] {
                return Ok(Some(entry_ref(entry)))
            }
        }
        Ok(None)
    }

    /// Every label, positioned by its order.
    pub fn labels_in_order(&self) -> Vec<&[u8]> {
        let mut labels = vec![&[][..]; self.count];
        for entry in self.iter() {
            labels[entry.order as usize] = entry.key;
        }
        labels
    }
}

fn entry_ref<K: AsRef<[u8]>>(entry: &Entry<K>) -> EntryRef<'_> {
    EntryRef {
        key: entry.key.as_ref(),
        order: entry.order,
        value: entry.value,
    }
}

pub struct Iter<'a, K: 'a> {
    slots: ::std::slice::Iter<'a, Slot<K>>,
}

impl<'a, K: AsRef<[u8]>> Iterator for Iter<'a, K> {
    type Item = EntryRef<'a>;

    fn next(&mut self) -> Option<EntryRef<'a>> {
        for slot in self.slots.by_ref() {
            if let Slot::Occupied(ref entry) = *slot {
                return Some(entry_ref(entry))
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    fn key(i: usize) -> Vec<u8> {
        format!("label-{}", i).into_bytes()
    }

    #[test]
    fn orders_follow_first_insertion() {
        let mut table = OwnedTable::new(4);
        assert_eq!(table.insert("b".as_bytes()).unwrap(), 0);
        assert_eq!(table.insert("a".as_bytes()).unwrap(), 1);
        assert_eq!(table.insert("b".as_bytes()).unwrap(), 0);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get_order(b"a"), Some(1));
        assert_eq!(table.get_value(b"a"), Some(0));
        assert_eq!(table.get_order(b"c"), None);
        assert_eq!(table.get_value(b"c"), None);
    }

    #[test]
    fn values_update_in_place() {
        let mut table = OwnedTable::new(8);
        table.insert_or_set_value("x".as_bytes(), 10).unwrap();
        table.insert_or_set_value("x".as_bytes(), 20).unwrap();
        assert_eq!(table.get_value(b"x"), Some(20));

        assert!(table.set_value_if_present(b"x", 30));
        assert!(!table.set_value_if_present(b"y", 30));
        assert_eq!(table.get_value(b"x"), Some(30));
        assert!(!table.contains(b"y"));
    }

    #[test]
    fn counting_values() {
        let mut table = OwnedTable::new(2);
        for i in 0..10 {
            table.insert_or_set_value(key(i), NOT_FOUND).unwrap();
        }
        table.set_value_if_present(&key(3), 42);
        table.set_value_if_present(&key(7), 0);
        assert_eq!(table.count_equal(NOT_FOUND), 8);
        assert_eq!(table.count_not_equal(NOT_FOUND), 2);

        table.reset_values(5);
        assert_eq!(table.count_equal(5), 10);
    }

    #[test]
    fn growth_keeps_everything() {
        let mut table = OwnedTable::new(1);
        for i in 0..500 {
            table.insert_or_set_value(key(i), i as i64 * 3).unwrap();
        }
        assert!(table.size() >= 512);
        assert!(table.len() < table.size());
        for i in 0..500 {
            assert_eq!(table.get_order(&key(i)), Some(i as u64));
            assert_eq!(table.get_value(&key(i)), Some(i as i64 * 3));
        }
    }

    #[test]
    fn borrowed_keys() {
        let labels = vec!["geneA".to_string(), "geneB".to_string()];
        let mut table = BorrowedTable::new(16);
        for label in &labels {
            table.insert(label.as_bytes()).unwrap();
        }
        assert_eq!(table.labels_in_order(), vec![&b"geneA"[..], &b"geneB"[..]]);
    }

    #[test]
    fn mixed_keys() {
        let requested = "geneA".to_string();
        let mut table: HashTable<Cow<[u8]>> = HashTable::new(16);
        table.insert(requested.as_bytes()).unwrap();
        {
            let scratch = b"geneB".to_vec();
            table.insert(scratch.to_vec()).unwrap();
        }
        assert_eq!(table.get_order(b"geneB"), Some(1));
    }

    #[test]
    fn empty_key_is_a_key() {
        let mut table = OwnedTable::new(4);
        table.insert_or_set_value("".as_bytes(), 9).unwrap();
        assert_eq!(table.get_value(b""), Some(9));
    }

    #[test]
    fn failed_insert_leaves_table_unchanged() {
        // a single probe per key makes collisions fatal almost at once
        let mut table: OwnedTable = HashTable::with_probe_limit(4, 0);
        let mut failures = 0;
        for i in 0..100 {
            let (len, size) = (table.len(), table.size());
            match table.insert_or_set_value(key(i), 1) {
                Ok(order) => assert_eq!(order, len as u64),
                Err(e) => {
                    assert_eq!(e, TableError::ProbeLimitExceeded { probes: 0 });
                    assert_eq!((table.len(), table.size()), (len, size));
                    assert!(!table.contains(&key(i)));
                    failures += 1;
                },
            }
        }
        assert!(failures > 0);
        let orders: Vec<u64> = table.iter().map(|entry| entry.order).collect();
        assert_eq!(orders.len(), table.len());
        assert!(orders.iter().all(|&o| (o as usize) < table.len()));
    }

    #[test]
    fn cursor_walks_every_entry() {
        let mut table = OwnedTable::new(4);
        for i in 0..20 {
            table.insert(key(i)).unwrap();
        }
        let mut cursor = table.cursor();
        let mut seen = Vec::new();
        while let Some(entry) = table.next_entry(&mut cursor).unwrap() {
            seen.push(entry.order);
        }
        seen.sort();
        assert_eq!(seen, (0..20).collect::<Vec<u64>>());
    }

    #[test]
    fn cursor_survives_value_updates() {
        let mut table = OwnedTable::new(8);
        table.insert("a".as_bytes()).unwrap();
        let mut cursor = table.cursor();
        table.reset_values(4);
        let entry = table.next_entry(&mut cursor).unwrap().unwrap();
        assert_eq!(entry.value, 4);
    }

    #[test]
    fn cursor_is_invalidated_by_insertion() {
        let mut table = OwnedTable::new(8);
        table.insert("a".as_bytes()).unwrap();
        let mut cursor = table.cursor();
        table.insert("b".as_bytes()).unwrap();
        assert_eq!(table.next_entry(&mut cursor), Err(TableError::StaleCursor));

        // re-inserting an existing key is not a modification
        let mut cursor = table.cursor();
        table.insert("a".as_bytes()).unwrap();
        assert!(table.next_entry(&mut cursor).is_ok());
    }
}
