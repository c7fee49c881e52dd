use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use serde_json::{Map, Value as Json};

use crate::engine::keyspace::Keyspace;
use crate::engine::value::{Entry, KeyType, Value};
use crate::{Adapter, Error, Result};

/// Number of logical databases a store accepts unless told otherwise.
pub const DEFAULT_DATABASES: u32 = 16;

type Tags = Map<String, Json>;

/// The command engine.
///
/// Each command targets exactly one value type and fails with
/// [`Error::TypeMismatch`] before changing anything when the key holds another
/// type. Absent keys behave like empty values: `None`, `0` or an empty list.
/// A list or set that loses its last element is deleted.
pub struct Store {
    keyspace: Keyspace,
    databases: u32,
    rng: fastrand::Rng,
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb:{}", self.keyspace.db())
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("db", &self.keyspace.db())
            .field("databases", &self.databases)
            .field("keys", &self.keyspace.len())
            .finish()
    }
}

fn check_db(db: u32, databases: u32) -> Result<()> {
    if db >= databases {
        return Err(Error::Config(format!(
            "db index {} out of range (0..{})",
            db, databases
        )));
    }
    Ok(())
}

/// Resolves a possibly negative list position.
fn position(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let index = if index < 0 { len + index } else { index };
    if index < 0 || index >= len {
        None
    } else {
        Some(index as usize)
    }
}

/// Resolves an inclusive `start..=end` range the way LRANGE does.
fn span(start: i64, end: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let end = if end < 0 { len + end } else { end.min(len - 1) };
    if start >= len || end < 0 || start > end {
        None
    } else {
        Some((start as usize, end as usize))
    }
}

impl Store {
    /// Opens database `db` on `adapter` with [`DEFAULT_DATABASES`] databases.
    pub fn open<A: Adapter + 'static>(adapter: A, db: u32) -> Result<Self> {
        Self::with_databases(adapter, db, DEFAULT_DATABASES)
    }

    /// Opens database `db` on `adapter`, accepting indexes below `databases`.
    pub fn with_databases<A: Adapter + 'static>(adapter: A, db: u32, databases: u32) -> Result<Self> {
        check_db(db, databases)?;
        Ok(Self {
            keyspace: Keyspace::open(Box::new(adapter), db)?,
            databases,
            rng: fastrand::Rng::new(),
        })
    }

    /// Closes the store and hands back its adapter.
    pub fn into_adapter(self) -> Box<dyn Adapter> {
        self.keyspace.into_adapter()
    }

    // ---- type-checked access ----

    fn lookup(&mut self, key: &str, expected: KeyType) -> Result<Option<&Entry>> {
        match self.keyspace.get(key)? {
            Some(entry) if entry.key_type() != expected => Err(Error::TypeMismatch {
                expected,
                found: entry.key_type(),
            }),
            found => Ok(found),
        }
    }

    fn string_for_update(&mut self, key: &str) -> Result<Option<(String, Tags)>> {
        Ok(match self.lookup(key, KeyType::String)?.cloned() {
            Some(Entry {
                value: Value::String(s),
                tags,
            }) => Some((s, tags)),
            _ => None,
        })
    }

    fn list_for_update(&mut self, key: &str) -> Result<Option<(VecDeque<String>, Tags)>> {
        Ok(match self.lookup(key, KeyType::List)?.cloned() {
            Some(Entry {
                value: Value::List(items),
                tags,
            }) => Some((items, tags)),
            _ => None,
        })
    }

    fn set_for_update(&mut self, key: &str) -> Result<Option<(BTreeSet<String>, Tags)>> {
        Ok(match self.lookup(key, KeyType::Set)?.cloned() {
            Some(Entry {
                value: Value::Set(members),
                tags,
            }) => Some((members, tags)),
            _ => None,
        })
    }

    fn save(&mut self, key: &str, value: Value, tags: Tags) -> Result<()> {
        self.keyspace.put(key, Entry { value, tags })
    }

    // ---- keys ----

    /// Deletes `key` whatever its type. Returns whether it existed.
    pub fn del(&mut self, key: &str) -> Result<bool> {
        self.keyspace.remove(key)
    }

    pub fn exists(&mut self, key: &str) -> Result<bool> {
        Ok(self.keyspace.get(key)?.is_some())
    }

    /// The type of `key`, or `None` if it does not exist.
    pub fn key_type(&mut self, key: &str) -> Result<Option<KeyType>> {
        Ok(self.keyspace.get(key)?.map(Entry::key_type))
    }

    // ---- strings ----

    /// Stores a string, replacing any previous string value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let tags = self
            .string_for_update(key)?
            .map(|(_, tags)| tags)
            .unwrap_or_default();
        self.save(key, Value::String(value.to_string()), tags)
    }

    /// Sets `key` only if it does not exist. Returns whether it was set.
    pub fn setnx(&mut self, key: &str, value: &str) -> Result<bool> {
        if self.lookup(key, KeyType::String)?.is_some() {
            return Ok(false);
        }
        self.set(key, value)?;
        Ok(true)
    }

    pub fn get(&mut self, key: &str) -> Result<Option<String>> {
        Ok(match self.lookup(key, KeyType::String)? {
            Some(Entry {
                value: Value::String(s),
                ..
            }) => Some(s.clone()),
            _ => None,
        })
    }

    /// Sets `key` and returns its previous value.
    pub fn getset(&mut self, key: &str, value: &str) -> Result<Option<String>> {
        let old = self.get(key)?;
        self.set(key, value)?;
        Ok(old)
    }

    /// Appends to the string at `key`, creating it if needed. Returns the new length.
    pub fn append(&mut self, key: &str, value: &str) -> Result<usize> {
        let (mut current, tags) = self.string_for_update(key)?.unwrap_or_default();
        current.push_str(value);
        let len = current.len();
        self.save(key, Value::String(current), tags)?;
        Ok(len)
    }

    pub fn incr(&mut self, key: &str) -> Result<i64> {
        self.incrby(key, 1)
    }

    pub fn decr(&mut self, key: &str) -> Result<i64> {
        self.incrby(key, -1)
    }

    pub fn decrby(&mut self, key: &str, decrement: i64) -> Result<i64> {
        self.incrby(key, decrement.checked_neg().ok_or(Error::Overflow)?)
    }

    /// Adds `increment` to the integer stored at `key`; an absent key counts as 0.
    pub fn incrby(&mut self, key: &str, increment: i64) -> Result<i64> {
        let (current, tags) = match self.string_for_update(key)? {
            Some((s, tags)) => (s.parse::<i64>().map_err(|_| Error::NotAnInteger)?, tags),
            None => (0, Tags::new()),
        };
        let next = current.checked_add(increment).ok_or(Error::Overflow)?;
        self.save(key, Value::String(next.to_string()), tags)?;
        Ok(next)
    }

    pub fn strlen(&mut self, key: &str) -> Result<usize> {
        Ok(self.get(key)?.map_or(0, |s| s.len()))
    }

    // ---- lists ----

    pub fn lpush(&mut self, key: &str, value: &str) -> Result<usize> {
        let (mut items, tags) = self.list_for_update(key)?.unwrap_or_default();
        items.push_front(value.to_string());
        let len = items.len();
        self.save(key, Value::List(items), tags)?;
        Ok(len)
    }

    pub fn rpush(&mut self, key: &str, value: &str) -> Result<usize> {
        let (mut items, tags) = self.list_for_update(key)?.unwrap_or_default();
        items.push_back(value.to_string());
        let len = items.len();
        self.save(key, Value::List(items), tags)?;
        Ok(len)
    }

    /// Like [`Store::lpush`], but only when the list already exists. Returns 0 otherwise.
    pub fn lpushx(&mut self, key: &str, value: &str) -> Result<usize> {
        if self.lookup(key, KeyType::List)?.is_none() {
            return Ok(0);
        }
        self.lpush(key, value)
    }

    /// Like [`Store::rpush`], but only when the list already exists. Returns 0 otherwise.
    pub fn rpushx(&mut self, key: &str, value: &str) -> Result<usize> {
        if self.lookup(key, KeyType::List)?.is_none() {
            return Ok(0);
        }
        self.rpush(key, value)
    }

    pub fn lpop(&mut self, key: &str) -> Result<Option<String>> {
        let Some((mut items, tags)) = self.list_for_update(key)? else {
            return Ok(None);
        };
        let popped = items.pop_front();
        self.save(key, Value::List(items), tags)?;
        Ok(popped)
    }

    pub fn rpop(&mut self, key: &str) -> Result<Option<String>> {
        let Some((mut items, tags)) = self.list_for_update(key)? else {
            return Ok(None);
        };
        let popped = items.pop_back();
        self.save(key, Value::List(items), tags)?;
        Ok(popped)
    }

    pub fn llen(&mut self, key: &str) -> Result<usize> {
        Ok(match self.lookup(key, KeyType::List)? {
            Some(Entry {
                value: Value::List(items),
                ..
            }) => items.len(),
            _ => 0,
        })
    }

    /// Element at `index`; negative indexes count from the tail.
    pub fn lindex(&mut self, key: &str, index: i64) -> Result<Option<String>> {
        Ok(match self.lookup(key, KeyType::List)? {
            Some(Entry {
                value: Value::List(items),
                ..
            }) => position(index, items.len()).map(|i| items[i].clone()),
            _ => None,
        })
    }

    /// Elements from `start` to `end` inclusive; `-1` is the last element.
    pub fn lrange(&mut self, key: &str, start: i64, end: i64) -> Result<Vec<String>> {
        Ok(match self.lookup(key, KeyType::List)? {
            Some(Entry {
                value: Value::List(items),
                ..
            }) => match span(start, end, items.len()) {
                Some((from, to)) => items.range(from..=to).cloned().collect(),
                None => Vec::new(),
            },
            _ => Vec::new(),
        })
    }

    /// Removes elements equal to `value`.
    ///
    /// `count > 0` removes up to `count` matches from the head, `count < 0` up
    /// to `|count|` from the tail, and `0` removes every match. Returns how
    /// many were removed.
    pub fn lrem(&mut self, key: &str, count: i64, value: &str) -> Result<usize> {
        let Some((items, tags)) = self.list_for_update(key)? else {
            return Ok(0);
        };

        let mut matches: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| *item == value)
            .map(|(i, _)| i)
            .collect();
        let limit = count.unsigned_abs() as usize;
        if count > 0 {
            matches.truncate(limit);
        } else if count < 0 {
            matches.drain(..matches.len().saturating_sub(limit));
        }
        if matches.is_empty() {
            return Ok(0);
        }

        let removed = matches.len();
        let mut doomed = matches.into_iter().peekable();
        let kept: VecDeque<String> = items
            .into_iter()
            .enumerate()
            .filter_map(|(i, item)| {
                if doomed.peek() == Some(&i) {
                    doomed.next();
                    None
                } else {
                    Some(item)
                }
            })
            .collect();
        self.save(key, Value::List(kept), tags)?;
        Ok(removed)
    }

    /// Replaces the element at `index`.
    ///
    /// Fails with [`Error::NoSuchKey`] on an absent list and
    /// [`Error::IndexOutOfRange`] outside it.
    pub fn lset(&mut self, key: &str, index: i64, value: &str) -> Result<()> {
        let (mut items, tags) = self.list_for_update(key)?.ok_or(Error::NoSuchKey)?;
        let i = position(index, items.len()).ok_or(Error::IndexOutOfRange)?;
        items[i] = value.to_string();
        self.save(key, Value::List(items), tags)
    }

    /// Keeps only the elements from `start` to `end` inclusive.
    pub fn ltrim(&mut self, key: &str, start: i64, end: i64) -> Result<()> {
        let Some((items, tags)) = self.list_for_update(key)? else {
            return Ok(());
        };
        let kept = match span(start, end, items.len()) {
            Some((from, to)) => items.into_iter().skip(from).take(to - from + 1).collect(),
            None => VecDeque::new(),
        };
        self.save(key, Value::List(kept), tags)
    }

    /// Moves the tail of `src` to the head of `dest` and returns it.
    ///
    /// Returns `None` and leaves `dest` alone when `src` is empty.
    pub fn rpoplpush(&mut self, src: &str, dest: &str) -> Result<Option<String>> {
        self.lookup(src, KeyType::List)?;
        self.lookup(dest, KeyType::List)?;

        let Some(value) = self.rpop(src)? else {
            return Ok(None);
        };
        if let Err(e) = self.lpush(dest, &value) {
            self.rpush(src, &value)?;
            return Err(e);
        }
        Ok(Some(value))
    }

    // ---- sets ----

    /// Adds `member`. Returns whether it was new.
    pub fn sadd(&mut self, key: &str, member: &str) -> Result<bool> {
        let (mut members, tags) = self.set_for_update(key)?.unwrap_or_default();
        if !members.insert(member.to_string()) {
            return Ok(false);
        }
        self.save(key, Value::Set(members), tags)?;
        Ok(true)
    }

    /// Removes `member`. Returns whether it was present.
    pub fn srem(&mut self, key: &str, member: &str) -> Result<bool> {
        let Some((mut members, tags)) = self.set_for_update(key)? else {
            return Ok(false);
        };
        if !members.remove(member) {
            return Ok(false);
        }
        self.save(key, Value::Set(members), tags)?;
        Ok(true)
    }

    /// Number of members.
    pub fn scard(&mut self, key: &str) -> Result<usize> {
        Ok(match self.lookup(key, KeyType::Set)? {
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => members.len(),
            _ => 0,
        })
    }

    pub fn sismember(&mut self, key: &str, member: &str) -> Result<bool> {
        Ok(match self.lookup(key, KeyType::Set)? {
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => members.contains(member),
            _ => false,
        })
    }

    /// All members, in sorted order.
    pub fn smembers(&mut self, key: &str) -> Result<Vec<String>> {
        Ok(match self.lookup(key, KeyType::Set)? {
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => members.iter().cloned().collect(),
            _ => Vec::new(),
        })
    }

    /// Moves `member` from `src` to `dest`. Returns false if `src` lacks it.
    pub fn smove(&mut self, src: &str, dest: &str, member: &str) -> Result<bool> {
        self.lookup(src, KeyType::Set)?;
        self.lookup(dest, KeyType::Set)?;

        if !self.srem(src, member)? {
            return Ok(false);
        }
        if let Err(e) = self.sadd(dest, member) {
            self.sadd(src, member)?;
            return Err(e);
        }
        Ok(true)
    }

    /// A uniformly random member, or `None` for an empty set.
    pub fn srandmember(&mut self, key: &str) -> Result<Option<String>> {
        let len = self.scard(key)?;
        if len == 0 {
            return Ok(None);
        }
        let pick = self.rng.usize(..len);
        Ok(match self.lookup(key, KeyType::Set)? {
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => members.iter().nth(pick).cloned(),
            _ => None,
        })
    }

    /// Removes and returns a uniformly random member.
    pub fn spop(&mut self, key: &str) -> Result<Option<String>> {
        let member = self.srandmember(key)?;
        if let Some(member) = &member {
            self.srem(key, member)?;
        }
        Ok(member)
    }

    // ---- databases ----

    /// Every live key in the active database.
    ///
    /// Patterns are not supported; every call matches all keys.
    pub fn keys(&self) -> Vec<String> {
        self.keyspace.keys().cloned().collect()
    }

    /// Number of live keys in the active database.
    pub fn dbsize(&self) -> usize {
        self.keyspace.len()
    }

    /// Deletes every key in the active database.
    pub fn flushdb(&mut self) -> Result<()> {
        self.keyspace.flush()
    }

    /// Switches the active database.
    pub fn select(&mut self, db: u32) -> Result<()> {
        check_db(db, self.databases)?;
        self.keyspace.select(db)
    }

    /// Index of the active database.
    pub fn db(&self) -> u32 {
        self.keyspace.db()
    }

    pub fn databases(&self) -> u32 {
        self.databases
    }
}
