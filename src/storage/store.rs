//! Typed keyspace with TTL support.
//!
//! The store is a single map from key to [`Entry`], where every entry
//! carries one of four value kinds plus an optional expiry instant. One
//! readers-writer lock protects the whole map: read commands take the
//! shared lock, mutating commands and the sweeper take the exclusive
//! lock, and each public operation is exactly one lock acquisition, so a
//! command observes and mutates one consistent snapshot.
//!
//! ## Expiry model
//!
//! A key whose expiry instant has passed is logically absent the moment
//! the clock reaches it: every access path checks [`Entry::is_expired`]
//! before using an entry. Physical removal happens on the next write that
//! touches the key, or in bulk from the background sweeper
//! ([`crate::storage::expiry`]). Read paths never upgrade to the write
//! lock just to delete.
//!
//! ## Type discipline
//!
//! Each kind-specific operation first resolves the key: absent (or
//! logically expired) keys are created by the write ops that create on
//! absence (LPUSH/RPUSH, HSET, SADD) and reported as absent by the rest;
//! a live entry of a different kind fails with [`WrongTypeError`]
//! before any mutation.
//!
//! ## Structural emptiness
//!
//! A list, hash, or set that a mutation leaves empty is removed from the
//! map, so EXISTS reports 0 afterwards and the key is free to hold a
//! different kind.

use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Error returned when a key holds a value of a different kind.
///
/// The only failure the per-kind operations can produce: absent keys are
/// neutral results (`None`, 0, empty), never errors.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("wrong type operation")]
pub struct WrongTypeError;

/// Error returned by the rename operations when the source key is
/// absent. Rename is the one place where absence is an error rather
/// than a neutral result.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("key not found")]
pub struct NotFoundError;

/// The four storable value kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue {
    /// Byte string payload.
    Str(Bytes),
    /// Ordered sequence with O(1) push/pop at both ends.
    List(VecDeque<Bytes>),
    /// Field-to-value mapping.
    Hash(HashMap<Bytes, Bytes>),
    /// Membership-only collection.
    Set(HashSet<Bytes>),
}

impl StoredValue {
    /// The kind tag reported by the TYPE command.
    pub fn kind(&self) -> &'static str {
        match self {
            StoredValue::Str(_) => "string",
            StoredValue::List(_) => "list",
            StoredValue::Hash(_) => "hash",
            StoredValue::Set(_) => "set",
        }
    }
}

/// A stored value together with its optional expiry instant.
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: StoredValue,
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates an entry without expiry.
    pub fn new(value: StoredValue) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Creates an entry expiring `ttl` from now. A duration too large to
    /// represent as an instant degrades to no expiry.
    pub fn with_ttl(value: StoredValue, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    /// Whether the entry is logically absent.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|exp| Instant::now() >= exp)
            .unwrap_or(false)
    }
}

/// The shared keyspace.
///
/// Designed to be wrapped in an `Arc` and shared across all connection
/// tasks and the sweeper.
///
/// # Example
///
/// ```
/// use fluxkv::storage::Store;
/// use bytes::Bytes;
///
/// let store = Store::new();
/// store.set(Bytes::from("name"), Bytes::from("flux"), None);
/// assert_eq!(
///     store.get(&Bytes::from("name")).unwrap(),
///     Some(Bytes::from("flux"))
/// );
/// ```
#[derive(Debug, Default)]
pub struct Store {
    data: RwLock<HashMap<Bytes, Entry>>,
}

/// Drops the entry under `key` if it is physically present but logically
/// expired. Callers holding the write lock run this before resolving the
/// key so that expired state never shadows a fresh write.
fn purge_expired(data: &mut HashMap<Bytes, Entry>, key: &Bytes) {
    if data.get(key).is_some_and(Entry::is_expired) {
        data.remove(key);
    }
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of physically present keys (expired stragglers included).
    pub fn len(&self) -> usize {
        self.data.read().unwrap().len()
    }

    /// Returns true if no keys are physically present.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    // String operations
    // ========================================================================

    /// Installs a string value, replacing any prior kind.
    ///
    /// A `ttl` of `None` clears any existing expiry; `Some` attaches an
    /// absolute expiry of now plus the duration.
    pub fn set(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) {
        let entry = match ttl {
            Some(ttl) => Entry::with_ttl(StoredValue::Str(value), ttl),
            None => Entry::new(StoredValue::Str(value)),
        };
        self.data.write().unwrap().insert(key, entry);
    }

    /// Returns the string value, or `None` if the key is absent or expired.
    pub fn get(&self, key: &Bytes) -> Result<Option<Bytes>, WrongTypeError> {
        let data = self.data.read().unwrap();
        match data.get(key) {
            Some(entry) if !entry.is_expired() => match &entry.value {
                StoredValue::Str(value) => Ok(Some(value.clone())),
                _ => Err(WrongTypeError),
            },
            _ => Ok(None),
        }
    }

    /// Removes the given keys and returns how many were actually removed.
    ///
    /// Expired entries encountered along the way are purged but do not
    /// count as removals; they were already logically absent.
    pub fn del(&self, keys: &[Bytes]) -> u64 {
        let mut data = self.data.write().unwrap();
        let mut removed = 0;
        for key in keys {
            purge_expired(&mut data, key);
            if data.remove(key).is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// Counts how many of the given keys are live. Duplicates count twice.
    pub fn exists(&self, keys: &[Bytes]) -> u64 {
        let data = self.data.read().unwrap();
        keys.iter()
            .filter(|key| data.get(*key).is_some_and(|e| !e.is_expired()))
            .count() as u64
    }

    /// Attaches an expiry of now plus `ttl` to a live key.
    ///
    /// Returns `true` if the key exists, `false` otherwise.
    pub fn expire(&self, key: &Bytes, ttl: Duration) -> bool {
        let mut data = self.data.write().unwrap();
        purge_expired(&mut data, key);
        match data.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Instant::now().checked_add(ttl);
                true
            }
            None => false,
        }
    }

    /// Remaining time to live in whole seconds.
    ///
    /// Returns -2 if the key is absent or expired, -1 if it has no expiry,
    /// and the remaining seconds (clamped to 0) otherwise.
    pub fn ttl(&self, key: &Bytes) -> i64 {
        let data = self.data.read().unwrap();
        match data.get(key) {
            Some(entry) if !entry.is_expired() => match entry.expires_at {
                Some(exp) => exp.saturating_duration_since(Instant::now()).as_secs() as i64,
                None => -1,
            },
            _ => -2,
        }
    }

    /// The kind tag for a key: "string", "list", "hash", "set", or "none".
    pub fn key_type(&self, key: &Bytes) -> &'static str {
        let data = self.data.read().unwrap();
        match data.get(key) {
            Some(entry) if !entry.is_expired() => entry.value.kind(),
            _ => "none",
        }
    }

    /// Moves the value under `src` (expiry included) to `dst`, overwriting
    /// any value at `dst`. Renaming a key onto itself is a no-op.
    pub fn rename(&self, src: &Bytes, dst: &Bytes) -> Result<(), NotFoundError> {
        let mut data = self.data.write().unwrap();
        purge_expired(&mut data, src);
        if !data.contains_key(src) {
            return Err(NotFoundError);
        }
        if src == dst {
            return Ok(());
        }
        let entry = data.remove(src).unwrap();
        data.insert(dst.clone(), entry);
        Ok(())
    }

    /// As [`Store::rename`], but refuses to overwrite a live destination.
    ///
    /// Returns `Ok(true)` if the value moved and `Ok(false)` if `dst`
    /// already exists.
    pub fn rename_nx(&self, src: &Bytes, dst: &Bytes) -> Result<bool, NotFoundError> {
        let mut data = self.data.write().unwrap();
        purge_expired(&mut data, src);
        if !data.contains_key(src) {
            return Err(NotFoundError);
        }
        purge_expired(&mut data, dst);
        if data.contains_key(dst) {
            return Ok(false);
        }
        let entry = data.remove(src).unwrap();
        data.insert(dst.clone(), entry);
        Ok(true)
    }

    // ========================================================================
    // List operations
    // ========================================================================

    /// Prepends each value in the order given, so the last value pushed
    /// ends up at the head. Creates the list if the key is absent.
    ///
    /// Returns the length after the push.
    pub fn lpush(&self, key: Bytes, values: Vec<Bytes>) -> Result<usize, WrongTypeError> {
        let mut data = self.data.write().unwrap();
        purge_expired(&mut data, &key);
        let entry = data
            .entry(key)
            .or_insert_with(|| Entry::new(StoredValue::List(VecDeque::new())));
        match &mut entry.value {
            StoredValue::List(list) => {
                for value in values {
                    list.push_front(value);
                }
                Ok(list.len())
            }
            _ => Err(WrongTypeError),
        }
    }

    /// Appends each value in the order given. Creates the list if the key
    /// is absent. Returns the length after the push.
    pub fn rpush(&self, key: Bytes, values: Vec<Bytes>) -> Result<usize, WrongTypeError> {
        let mut data = self.data.write().unwrap();
        purge_expired(&mut data, &key);
        let entry = data
            .entry(key)
            .or_insert_with(|| Entry::new(StoredValue::List(VecDeque::new())));
        match &mut entry.value {
            StoredValue::List(list) => {
                for value in values {
                    list.push_back(value);
                }
                Ok(list.len())
            }
            _ => Err(WrongTypeError),
        }
    }

    /// Removes and returns the head element, or `None` if the key is
    /// absent. The key is removed once the list empties.
    pub fn lpop(&self, key: &Bytes) -> Result<Option<Bytes>, WrongTypeError> {
        self.pop(key, VecDeque::pop_front)
    }

    /// Removes and returns the tail element, or `None` if the key is
    /// absent. The key is removed once the list empties.
    pub fn rpop(&self, key: &Bytes) -> Result<Option<Bytes>, WrongTypeError> {
        self.pop(key, VecDeque::pop_back)
    }

    fn pop(
        &self,
        key: &Bytes,
        take: impl FnOnce(&mut VecDeque<Bytes>) -> Option<Bytes>,
    ) -> Result<Option<Bytes>, WrongTypeError> {
        let mut data = self.data.write().unwrap();
        purge_expired(&mut data, key);
        match data.get_mut(key) {
            Some(entry) => match &mut entry.value {
                StoredValue::List(list) => {
                    let value = take(list);
                    if list.is_empty() {
                        data.remove(key);
                    }
                    Ok(value)
                }
                _ => Err(WrongTypeError),
            },
            None => Ok(None),
        }
    }

    /// Returns the closed interval `[start, stop]` of the list.
    ///
    /// Negative indices count from the end (-1 is the last element). After
    /// resolution, `start` is clamped to 0 and `stop` to the last index;
    /// an inverted range or an absent key yields an empty vector.
    pub fn lrange(&self, key: &Bytes, start: i64, stop: i64) -> Result<Vec<Bytes>, WrongTypeError> {
        let data = self.data.read().unwrap();
        match data.get(key) {
            Some(entry) if !entry.is_expired() => match &entry.value {
                StoredValue::List(list) => {
                    let len = list.len() as i64;
                    let start = if start < 0 { len + start } else { start }.max(0);
                    let stop = if stop < 0 { len + stop } else { stop }.min(len - 1);

                    if start > stop {
                        return Ok(Vec::new());
                    }

                    Ok(list
                        .iter()
                        .skip(start as usize)
                        .take((stop - start + 1) as usize)
                        .cloned()
                        .collect())
                }
                _ => Err(WrongTypeError),
            },
            _ => Ok(Vec::new()),
        }
    }

    /// The list length, 0 if the key is absent.
    pub fn llen(&self, key: &Bytes) -> Result<usize, WrongTypeError> {
        let data = self.data.read().unwrap();
        match data.get(key) {
            Some(entry) if !entry.is_expired() => match &entry.value {
                StoredValue::List(list) => Ok(list.len()),
                _ => Err(WrongTypeError),
            },
            _ => Ok(0),
        }
    }

    // ========================================================================
    // Hash operations
    // ========================================================================

    /// Sets the given field/value pairs, creating the hash if the key is
    /// absent. Returns how many fields were newly created (overwrites do
    /// not count).
    pub fn hset(&self, key: Bytes, pairs: Vec<(Bytes, Bytes)>) -> Result<usize, WrongTypeError> {
        let mut data = self.data.write().unwrap();
        purge_expired(&mut data, &key);
        let entry = data
            .entry(key)
            .or_insert_with(|| Entry::new(StoredValue::Hash(HashMap::new())));
        match &mut entry.value {
            StoredValue::Hash(fields) => {
                let mut created = 0;
                for (field, value) in pairs {
                    if fields.insert(field, value).is_none() {
                        created += 1;
                    }
                }
                Ok(created)
            }
            _ => Err(WrongTypeError),
        }
    }

    /// Returns the value of a field, or `None` if the key or field is
    /// absent.
    pub fn hget(&self, key: &Bytes, field: &Bytes) -> Result<Option<Bytes>, WrongTypeError> {
        let data = self.data.read().unwrap();
        match data.get(key) {
            Some(entry) if !entry.is_expired() => match &entry.value {
                StoredValue::Hash(fields) => Ok(fields.get(field).cloned()),
                _ => Err(WrongTypeError),
            },
            _ => Ok(None),
        }
    }

    /// Returns all fields and values as a flat `[f1, v1, f2, v2, ...]`
    /// sequence, empty if the key is absent. Pair order is unspecified.
    pub fn hgetall(&self, key: &Bytes) -> Result<Vec<Bytes>, WrongTypeError> {
        let data = self.data.read().unwrap();
        match data.get(key) {
            Some(entry) if !entry.is_expired() => match &entry.value {
                StoredValue::Hash(fields) => {
                    let mut flat = Vec::with_capacity(fields.len() * 2);
                    for (field, value) in fields {
                        flat.push(field.clone());
                        flat.push(value.clone());
                    }
                    Ok(flat)
                }
                _ => Err(WrongTypeError),
            },
            _ => Ok(Vec::new()),
        }
    }

    /// Removes the given fields and returns how many were actually
    /// removed. The key is removed once the hash empties.
    pub fn hdel(&self, key: &Bytes, fields: &[Bytes]) -> Result<usize, WrongTypeError> {
        let mut data = self.data.write().unwrap();
        purge_expired(&mut data, key);
        match data.get_mut(key) {
            Some(entry) => match &mut entry.value {
                StoredValue::Hash(map) => {
                    let removed = fields.iter().filter(|f| map.remove(*f).is_some()).count();
                    if map.is_empty() {
                        data.remove(key);
                    }
                    Ok(removed)
                }
                _ => Err(WrongTypeError),
            },
            None => Ok(0),
        }
    }

    /// Whether the field exists in the hash.
    pub fn hexists(&self, key: &Bytes, field: &Bytes) -> Result<bool, WrongTypeError> {
        let data = self.data.read().unwrap();
        match data.get(key) {
            Some(entry) if !entry.is_expired() => match &entry.value {
                StoredValue::Hash(fields) => Ok(fields.contains_key(field)),
                _ => Err(WrongTypeError),
            },
            _ => Ok(false),
        }
    }

    /// The field count, 0 if the key is absent.
    pub fn hlen(&self, key: &Bytes) -> Result<usize, WrongTypeError> {
        let data = self.data.read().unwrap();
        match data.get(key) {
            Some(entry) if !entry.is_expired() => match &entry.value {
                StoredValue::Hash(fields) => Ok(fields.len()),
                _ => Err(WrongTypeError),
            },
            _ => Ok(0),
        }
    }

    // ========================================================================
    // Set operations
    // ========================================================================

    /// Adds the given members, creating the set if the key is absent.
    /// Returns how many members were newly added.
    pub fn sadd(&self, key: Bytes, members: Vec<Bytes>) -> Result<usize, WrongTypeError> {
        let mut data = self.data.write().unwrap();
        purge_expired(&mut data, &key);
        let entry = data
            .entry(key)
            .or_insert_with(|| Entry::new(StoredValue::Set(HashSet::new())));
        match &mut entry.value {
            StoredValue::Set(set) => {
                let added = members.into_iter().filter(|m| set.insert(m.clone())).count();
                Ok(added)
            }
            _ => Err(WrongTypeError),
        }
    }

    /// Removes the given members and returns how many were actually
    /// removed. The key is removed once the set empties.
    pub fn srem(&self, key: &Bytes, members: &[Bytes]) -> Result<usize, WrongTypeError> {
        let mut data = self.data.write().unwrap();
        purge_expired(&mut data, key);
        match data.get_mut(key) {
            Some(entry) => match &mut entry.value {
                StoredValue::Set(set) => {
                    let removed = members.iter().filter(|m| set.remove(*m)).count();
                    if set.is_empty() {
                        data.remove(key);
                    }
                    Ok(removed)
                }
                _ => Err(WrongTypeError),
            },
            None => Ok(0),
        }
    }

    /// Whether the member belongs to the set.
    pub fn sismember(&self, key: &Bytes, member: &Bytes) -> Result<bool, WrongTypeError> {
        let data = self.data.read().unwrap();
        match data.get(key) {
            Some(entry) if !entry.is_expired() => match &entry.value {
                StoredValue::Set(set) => Ok(set.contains(member)),
                _ => Err(WrongTypeError),
            },
            _ => Ok(false),
        }
    }

    /// All members, in unspecified order; empty if the key is absent.
    pub fn smembers(&self, key: &Bytes) -> Result<Vec<Bytes>, WrongTypeError> {
        let data = self.data.read().unwrap();
        match data.get(key) {
            Some(entry) if !entry.is_expired() => match &entry.value {
                StoredValue::Set(set) => Ok(set.iter().cloned().collect()),
                _ => Err(WrongTypeError),
            },
            _ => Ok(Vec::new()),
        }
    }

    /// The cardinality, 0 if the key is absent.
    pub fn scard(&self, key: &Bytes) -> Result<usize, WrongTypeError> {
        let data = self.data.read().unwrap();
        match data.get(key) {
            Some(entry) if !entry.is_expired() => match &entry.value {
                StoredValue::Set(set) => Ok(set.len()),
                _ => Err(WrongTypeError),
            },
            _ => Ok(0),
        }
    }

    /// Intersection of the sets under the given keys, in unspecified
    /// order.
    ///
    /// Any absent key or non-set participant short-circuits to an empty
    /// result. Iterates the smallest participant and keeps the members
    /// present in every other one.
    pub fn sinter(&self, keys: &[Bytes]) -> Vec<Bytes> {
        let data = self.data.read().unwrap();

        let mut sets: Vec<&HashSet<Bytes>> = Vec::with_capacity(keys.len());
        for key in keys {
            match data.get(key) {
                Some(entry) if !entry.is_expired() => match &entry.value {
                    StoredValue::Set(set) => sets.push(set),
                    _ => return Vec::new(),
                },
                _ => return Vec::new(),
            }
        }

        let Some(smallest) = sets.iter().min_by_key(|s| s.len()) else {
            return Vec::new();
        };

        smallest
            .iter()
            .filter(|member| sets.iter().all(|s| s.contains(*member)))
            .cloned()
            .collect()
    }

    // ========================================================================
    // Sweeper support
    // ========================================================================

    /// Physically removes every expired entry.
    ///
    /// Called by the background sweeper under the exclusive lock. Returns
    /// the number of entries removed.
    pub fn remove_expired(&self) -> u64 {
        let mut data = self.data.write().unwrap();
        let before = data.len();
        data.retain(|_, entry| !entry.is_expired());
        (before - data.len()) as u64
    }
}
