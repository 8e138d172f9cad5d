//! Nested terminal-or-map values backing oosvars, map-valued locals and
//! temporaries, plus the ownership wrapper handed between evaluators.

use crate::runtime::{
    error::{RuntimeError, RuntimeResult},
    value::Mlrval,
};
use indexmap::{map::Iter, IndexMap};
use std::{fmt, ops::Deref};

/// Map key. Int and string keys never compare equal: `3` and `"3"` are
/// different entries.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MapKey {
    Int(i64),
    String(String),
}

impl MapKey {
    /// `Ok(None)` for absent, which callers treat as a skipped access.
    pub fn from_mlrval(value: &Mlrval) -> RuntimeResult<Option<MapKey>> {
        match value {
            Mlrval::Absent => Ok(None),
            Mlrval::Int(i) => Ok(Some(MapKey::Int(*i))),
            Mlrval::String(s) => Ok(Some(MapKey::String(s.clone()))),
            Mlrval::Void => Ok(Some(MapKey::String(String::new()))),
            other => Err(RuntimeError::InvalidMapKey {
                type_name: other.type_name(),
            }),
        }
    }

    pub fn to_mlrval(&self) -> Mlrval {
        match self {
            MapKey::Int(i) => Mlrval::Int(*i),
            MapKey::String(s) => Mlrval::from_string(s.clone()),
        }
    }
}

impl From<&str> for MapKey {
    fn from(s: &str) -> Self {
        MapKey::String(s.to_string())
    }
}

impl From<i64> for MapKey {
    fn from(i: i64) -> Self {
        MapKey::Int(i)
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Int(i) => write!(f, "{i}"),
            MapKey::String(s) => write!(f, "{s}"),
        }
    }
}

/// One map level. Iteration follows insertion order; overwriting a key keeps
/// its position.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Level {
    entries: IndexMap<MapKey, Xvalue>,
}

impl Level {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, MapKey, Xvalue> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &MapKey> {
        self.entries.keys()
    }

    pub fn get(&self, key: &MapKey) -> Option<&Xvalue> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &MapKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: MapKey, value: Xvalue) {
        self.entries.insert(key, value);
    }

    pub fn remove(&mut self, key: &MapKey) -> Option<Xvalue> {
        self.entries.shift_remove(key)
    }

    pub fn lookup(&self, path: &[MapKey]) -> Option<&Xvalue> {
        let (first, rest) = path.split_first()?;
        self.entries.get(first)?.lookup(rest)
    }

    /// Stores `value` at `path`, creating intermediate maps as needed. An
    /// empty path is ignored.
    pub fn put(&mut self, path: &[MapKey], value: Xvalue) {
        let Some((first, rest)) = path.split_first() else {
            return;
        };
        if rest.is_empty() {
            self.entries.insert(first.clone(), value);
            return;
        }
        self.entries
            .entry(first.clone())
            .or_insert_with(Xvalue::empty_map)
            .put(rest, value);
    }

    pub fn remove_path(&mut self, path: &[MapKey]) -> Option<Xvalue> {
        let (first, rest) = path.split_first()?;
        if rest.is_empty() {
            return self.remove(first);
        }
        match self.entries.get_mut(first)? {
            Xvalue::Map(level) => level.remove_path(rest),
            Xvalue::Terminal(_) => None,
        }
    }
}

impl FromIterator<(MapKey, Xvalue)> for Level {
    fn from_iter<T: IntoIterator<Item = (MapKey, Xvalue)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Level {
    type Item = (MapKey, Xvalue);
    type IntoIter = indexmap::map::IntoIter<MapKey, Xvalue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Level {
    type Item = (&'a MapKey, &'a Xvalue);
    type IntoIter = Iter<'a, MapKey, Xvalue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Xvalue {
    Terminal(Mlrval),
    Map(Level),
}

impl Xvalue {
    pub fn empty_map() -> Self {
        Xvalue::Map(Level::new())
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Xvalue::Map(_))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Xvalue::Terminal(Mlrval::Absent))
    }

    pub fn as_terminal(&self) -> Option<&Mlrval> {
        match self {
            Xvalue::Terminal(value) => Some(value),
            Xvalue::Map(_) => None,
        }
    }

    pub fn as_map(&self) -> Option<&Level> {
        match self {
            Xvalue::Map(level) => Some(level),
            Xvalue::Terminal(_) => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Xvalue::Terminal(value) => value.type_name(),
            Xvalue::Map(_) => "map",
        }
    }

    /// Reference at `path`, or `None` when missing or when the path runs
    /// through a terminal.
    pub fn lookup(&self, path: &[MapKey]) -> Option<&Xvalue> {
        if path.is_empty() {
            return Some(self);
        }
        match self {
            Xvalue::Map(level) => level.lookup(path),
            Xvalue::Terminal(_) => None,
        }
    }

    /// Stores `value` at `path`. A terminal met along the way is replaced by
    /// a map.
    pub fn put(&mut self, path: &[MapKey], value: Xvalue) {
        if path.is_empty() {
            *self = value;
            return;
        }
        if !self.is_map() {
            *self = Xvalue::empty_map();
        }
        if let Xvalue::Map(level) = self {
            level.put(path, value);
        }
    }

    pub fn remove(&mut self, path: &[MapKey]) -> Option<Xvalue> {
        match self {
            Xvalue::Map(level) => level.remove_path(path),
            Xvalue::Terminal(_) => None,
        }
    }

    /// Deep copy. The result is always owned by the caller.
    pub fn copy(&self) -> Xvalue {
        self.clone()
    }

    pub fn length(&self) -> usize {
        match self {
            Xvalue::Terminal(_) => 1,
            Xvalue::Map(level) => level.len(),
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            Xvalue::Terminal(_) => 0,
            Xvalue::Map(level) => level
                .iter()
                .map(|(_, child)| 1 + child.depth())
                .max()
                .unwrap_or(0),
        }
    }

    pub fn leaf_count(&self) -> usize {
        match self {
            Xvalue::Terminal(_) => 1,
            Xvalue::Map(level) => level.iter().map(|(_, child)| child.leaf_count()).sum(),
        }
    }

    /// Lazily walks terminal leaves in insertion order, yielding each one's
    /// key path joined with `separator` and prefixed with `prefix`.
    pub fn flatten<'a>(&'a self, prefix: &str, separator: &'a str) -> Leaves<'a> {
        match self {
            Xvalue::Terminal(value) => Leaves {
                separator,
                stack: Vec::new(),
                single: Some((prefix.to_string(), value)),
            },
            Xvalue::Map(level) => Leaves {
                separator,
                stack: vec![(prefix.to_string(), level.iter())],
                single: None,
            },
        }
    }
}

impl From<Mlrval> for Xvalue {
    fn from(value: Mlrval) -> Self {
        Xvalue::Terminal(value)
    }
}

impl From<Level> for Xvalue {
    fn from(level: Level) -> Self {
        Xvalue::Map(level)
    }
}

pub struct Leaves<'a> {
    separator: &'a str,
    stack: Vec<(String, Iter<'a, MapKey, Xvalue>)>,
    single: Option<(String, &'a Mlrval)>,
}

impl<'a> Iterator for Leaves<'a> {
    type Item = (String, &'a Mlrval);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(single) = self.single.take() {
            return Some(single);
        }
        loop {
            let (prefix, iter) = self.stack.last_mut()?;
            let Some((key, child)) = iter.next() else {
                self.stack.pop();
                continue;
            };
            let path = if prefix.is_empty() {
                key.to_string()
            } else {
                format!("{prefix}{}{key}", self.separator)
            };
            match child {
                Xvalue::Terminal(value) => return Some((path, value)),
                Xvalue::Map(level) => self.stack.push((path, level.iter())),
            }
        }
    }
}

/// An xvalue together with its ownership: `Ephemeral` values were built for
/// this call and belong to the receiver, `Aliased` ones borrow persistent
/// storage and may only be copied from.
#[derive(Debug)]
pub enum BoxedXvalue<'a> {
    Ephemeral(Xvalue),
    Aliased(&'a Xvalue),
}

impl<'a> BoxedXvalue<'a> {
    pub fn absent() -> Self {
        BoxedXvalue::Ephemeral(Xvalue::Terminal(Mlrval::Absent))
    }

    pub fn is_ephemeral(&self) -> bool {
        matches!(self, BoxedXvalue::Ephemeral(_))
    }

    /// Moves an ephemeral value out; copies an aliased one.
    pub fn into_owned(self) -> Xvalue {
        match self {
            BoxedXvalue::Ephemeral(value) => value,
            BoxedXvalue::Aliased(value) => value.copy(),
        }
    }

    /// Owned map, or `None` for terminals.
    pub fn into_level(self) -> Option<Level> {
        match self {
            BoxedXvalue::Ephemeral(Xvalue::Map(level)) => Some(level),
            BoxedXvalue::Aliased(Xvalue::Map(level)) => Some(level.clone()),
            _ => None,
        }
    }

    /// Owned terminal, or `None` for maps.
    pub fn into_terminal(self) -> Option<Mlrval> {
        match self {
            BoxedXvalue::Ephemeral(Xvalue::Terminal(value)) => Some(value),
            BoxedXvalue::Aliased(Xvalue::Terminal(value)) => Some(value.clone()),
            _ => None,
        }
    }
}

impl Deref for BoxedXvalue<'_> {
    type Target = Xvalue;

    fn deref(&self) -> &Xvalue {
        match self {
            BoxedXvalue::Ephemeral(value) => value,
            BoxedXvalue::Aliased(value) => value,
        }
    }
}
