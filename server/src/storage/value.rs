//! The value kinds that can live behind a key.
//!
//! Where the original system dispatches on a value's Python runtime type,
//! this is a plain sum type: encoding transitions between a cheap
//! "compact" representation and a general one become ordinary variant
//! conversions instead of `isinstance` checks scattered across call sites.

use std::collections::{HashMap, VecDeque};

pub const HASH_PROMOTE_LEN: usize = 64;
pub const SET_PROMOTE_LEN: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Str,
    Hash,
    List,
    Set,
    ZSet,
    Stream,
}

impl TypeTag {
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Str => "string",
            TypeTag::Hash => "hash",
            TypeTag::List => "list",
            TypeTag::Set => "set",
            TypeTag::ZSet => "zset",
            TypeTag::Stream => "stream",
        }
    }
}

#[derive(Debug, Clone)]
pub enum HashValue {
    /// Insertion-ordered pairs; cheap for the small hashes that dominate.
    Compact(Vec<(Vec<u8>, Vec<u8>)>),
    General(HashMap<Vec<u8>, Vec<u8>>),
}

impl HashValue {
    pub fn new() -> Self {
        HashValue::Compact(Vec::new())
    }

    pub fn len(&self) -> usize {
        match self {
            HashValue::Compact(v) => v.len(),
            HashValue::General(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, field: &[u8]) -> Option<&[u8]> {
        match self {
            HashValue::Compact(v) => v
                .iter()
                .find(|(f, _)| f.as_slice() == field)
                .map(|(_, v)| v.as_slice()),
            HashValue::General(m) => m.get(field).map(|v| v.as_slice()),
        }
    }

    /// Inserts or overwrites `field`. Returns `true` if the field was new.
    pub fn set(&mut self, field: Vec<u8>, value: Vec<u8>) -> bool {
        let created = match self {
            HashValue::Compact(v) => {
                if let Some(slot) = v.iter_mut().find(|(f, _)| f == &field) {
                    slot.1 = value;
                    false
                } else {
                    v.push((field, value));
                    true
                }
            }
            HashValue::General(m) => m.insert(field, value).is_none(),
        };
        self.maybe_promote();
        created
    }

    pub fn remove(&mut self, field: &[u8]) -> bool {
        match self {
            HashValue::Compact(v) => {
                let before = v.len();
                v.retain(|(f, _)| f.as_slice() != field);
                v.len() != before
            }
            HashValue::General(m) => m.remove(field).is_some(),
        }
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = (&[u8], &[u8])> + '_> {
        match self {
            HashValue::Compact(v) => {
                Box::new(v.iter().map(|(f, val)| (f.as_slice(), val.as_slice())))
            }
            HashValue::General(m) => {
                Box::new(m.iter().map(|(f, val)| (f.as_slice(), val.as_slice())))
            }
        }
    }

    fn maybe_promote(&mut self) {
        if let HashValue::Compact(v) = self {
            if v.len() >= HASH_PROMOTE_LEN {
                let map = v.drain(..).collect();
                *self = HashValue::General(map);
            }
        }
    }
}

impl Default for HashValue {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub enum SetValue {
    /// Sorted so membership is a binary search; used while every member
    /// parses as an integer and the set stays small.
    IntSet(Vec<i64>),
    HashSet(std::collections::HashSet<Vec<u8>>),
}

impl SetValue {
    pub fn new() -> Self {
        SetValue::IntSet(Vec::new())
    }

    pub fn len(&self) -> usize {
        match self {
            SetValue::IntSet(v) => v.len(),
            SetValue::HashSet(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, member: &[u8]) -> bool {
        match self {
            SetValue::IntSet(v) => parse_i64(member)
                .map(|n| v.binary_search(&n).is_ok())
                .unwrap_or(false),
            SetValue::HashSet(s) => s.contains(member),
        }
    }

    /// Inserts `member`, returns `true` if it was newly added.
    pub fn insert(&mut self, member: Vec<u8>) -> bool {
        match self {
            SetValue::IntSet(v) => {
                if let Some(n) = parse_i64(&member) {
                    match v.binary_search(&n) {
                        Ok(_) => false,
                        Err(idx) => {
                            v.insert(idx, n);
                            self.maybe_promote();
                            true
                        }
                    }
                } else {
                    self.promote_to_hashset();
                    self.insert(member)
                }
            }
            SetValue::HashSet(s) => s.insert(member),
        }
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self {
            SetValue::IntSet(v) => {
                if let Some(n) = parse_i64(member) {
                    if let Ok(idx) = v.binary_search(&n) {
                        v.remove(idx);
                        return true;
                    }
                }
                false
            }
            SetValue::HashSet(s) => s.remove(member),
        }
    }

    pub fn members(&self) -> Vec<Vec<u8>> {
        match self {
            SetValue::IntSet(v) => v.iter().map(|n| n.to_string().into_bytes()).collect(),
            SetValue::HashSet(s) => s.iter().cloned().collect(),
        }
    }

    fn maybe_promote(&mut self) {
        if let SetValue::IntSet(v) = self {
            if v.len() >= SET_PROMOTE_LEN {
                self.promote_to_hashset();
            }
        }
    }

    fn promote_to_hashset(&mut self) {
        if let SetValue::IntSet(v) = self {
            let members = v.iter().map(|n| n.to_string().into_bytes()).collect();
            *self = SetValue::HashSet(members);
        }
    }
}

impl Default for SetValue {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_i64(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.parse::<i64>().ok()
}

/// Always kept in both a lookup map and a sorted list: the two must agree
/// member-for-member (enforced by only ever mutating through [`ZSetValue`]
/// methods, never the fields directly).
#[derive(Debug, Clone, Default)]
pub struct ZSetValue {
    members: HashMap<Vec<u8>, f64>,
    sorted: Vec<(f64, Vec<u8>)>,
}

impl ZSetValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.members.get(member).copied()
    }

    /// Inserts or updates `member`'s score. Returns `true` if `member` was
    /// newly added (as opposed to an existing member's score changing).
    pub fn upsert(&mut self, member: Vec<u8>, score: f64) -> bool {
        if let Some(old) = self.members.insert(member.clone(), score) {
            let pos = self
                .sorted
                .iter()
                .position(|(s, m)| *s == old && m == &member)
                .expect("sorted/members invariant");
            self.sorted.remove(pos);
            self.insort(score, member);
            false
        } else {
            self.insort(score, member);
            true
        }
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        if let Some(score) = self.members.remove(member) {
            let pos = self
                .sorted
                .iter()
                .position(|(s, m)| *s == score && m == member)
                .expect("sorted/members invariant");
            self.sorted.remove(pos);
            true
        } else {
            false
        }
    }

    fn insort(&mut self, score: f64, member: Vec<u8>) {
        let idx = self
            .sorted
            .partition_point(|(s, m)| (*s, m.as_slice()) < (score, member.as_slice()));
        self.sorted.insert(idx, (score, member));
    }

    pub fn rank(&self, member: &[u8]) -> Option<usize> {
        let score = self.score(member)?;
        self.sorted
            .iter()
            .position(|(s, m)| *s == score && m == member)
    }

    pub fn range_by_index(&self, start: i64, stop: i64) -> &[(f64, Vec<u8>)] {
        let len = self.sorted.len() as i64;
        let (lo, hi) = clamp_range(start, stop, len);
        if lo > hi {
            &[]
        } else {
            &self.sorted[lo as usize..=hi as usize]
        }
    }

    pub fn range_by_score(&self, min: f64, min_excl: bool, max: f64, max_excl: bool) -> Vec<&(f64, Vec<u8>)> {
        self.sorted
            .iter()
            .filter(|(s, _)| {
                let above_min = if min_excl { *s > min } else { *s >= min };
                let below_max = if max_excl { *s < max } else { *s <= max };
                above_min && below_max
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(f64, Vec<u8>)> {
        self.sorted.iter()
    }
}

pub fn clamp_range(start: i64, stop: i64, len: i64) -> (i64, i64) {
    if len == 0 {
        return (0, -1);
    }
    let norm = |i: i64| -> i64 {
        if i < 0 {
            (len + i).max(0)
        } else {
            i
        }
    };
    let lo = norm(start).min(len - 1).max(0);
    let hi = norm(stop).min(len - 1);
    if hi < lo || hi < 0 {
        (0, -1)
    } else {
        (lo, hi)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreamValue {
    pub entries: Vec<(String, Vec<(Vec<u8>, Vec<u8>)>)>,
    pub last_ms: u64,
    pub last_seq: u64,
}

impl StreamValue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Str(Vec<u8>),
    Hash(HashValue),
    List(VecDeque<Vec<u8>>),
    Set(SetValue),
    ZSet(ZSetValue),
    Stream(StreamValue),
}

impl Value {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Str(_) => TypeTag::Str,
            Value::Hash(_) => TypeTag::Hash,
            Value::List(_) => TypeTag::List,
            Value::Set(_) => TypeTag::Set,
            Value::ZSet(_) => TypeTag::ZSet,
            Value::Stream(_) => TypeTag::Stream,
        }
    }

    pub fn is_empty_collection(&self) -> bool {
        match self {
            Value::Str(_) => false,
            Value::Hash(h) => h.is_empty(),
            Value::List(l) => l.is_empty(),
            Value::Set(s) => s.is_empty(),
            Value::ZSet(z) => z.is_empty(),
            Value::Stream(s) => s.entries.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&[u8]> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}
