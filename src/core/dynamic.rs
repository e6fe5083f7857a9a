//! # Safe Dynamic Values
//!
//! Template authors write deep paths such as `resources.sql.primary.connectionString`
//! against a topology that differs per environment. [`Dyn`] makes those paths total:
//! every step on a missing path yields [`Dyn::Absent`], and `Absent` answers every
//! further operation (member access, indexing, invocation, operators) with itself.
//! Converting it to text gives the empty string, so a gap surfaces as emptiness at the
//! point of rendering and never as an error.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Not};
use std::sync::Arc;

/// A node in a resolved configuration tree. Containers are reference counted, so
/// walking into a sub-tree never deep-copies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    Text(String),
    Bool(bool),
    Integer(i64),
    List(Arc<Vec<ConfigValue>>),
    Map(Arc<ConfigMap>),
}

/// A string-keyed map with case-insensitive lookup that remembers each key's original spelling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigMap {
    entries: BTreeMap<String, (String, ConfigValue)>,
}

impl ConfigMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value`, replacing any entry whose key differs only by case.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        let key = key.into();
        self.entries
            .insert(key.to_lowercase(), (key, value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.get(&key.to_lowercase()).map(|(_, v)| v)
    }

    /// Applies `update` to the nested map stored under `key`. A missing or non-map value is
    /// replaced by a fresh map first.
    pub fn update_map(&mut self, key: &str, update: impl FnOnce(&mut ConfigMap)) {
        let slot = self
            .entries
            .entry(key.to_lowercase())
            .or_insert_with(|| (key.to_string(), ConfigValue::Map(Arc::default())));
        match &mut slot.1 {
            ConfigValue::Map(map) => update(Arc::make_mut(map)),
            other => {
                let mut map = ConfigMap::new();
                update(&mut map);
                *other = map.into();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in case-insensitive key order, with their original key spelling.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.entries.values().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K, V> FromIterator<(K, V)> for ConfigMap
where
    K: Into<String>,
    V: Into<ConfigValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<ConfigMap> for ConfigValue {
    fn from(value: ConfigMap) -> Self {
        Self::Map(Arc::new(value))
    }
}

impl From<Vec<ConfigValue>> for ConfigValue {
    fn from(value: Vec<ConfigValue>) -> Self {
        Self::List(Arc::new(value))
    }
}

impl From<&BTreeMap<String, String>> for ConfigValue {
    fn from(value: &BTreeMap<String, String>) -> Self {
        value
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<ConfigMap>()
            .into()
    }
}

/// A value that is either present or contagiously absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Dyn {
    Present(ConfigValue),
    #[default]
    Absent,
}

impl Dyn {
    /// Wraps anything convertible into a `Dyn`. Wrapping a `Dyn` returns it unchanged.
    pub fn wrap(value: impl Into<Self>) -> Self {
        value.into()
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn is_present(&self) -> bool {
        !self.is_absent()
    }

    pub fn as_value(&self) -> Option<&ConfigValue> {
        match self {
            Self::Present(v) => Some(v),
            Self::Absent => None,
        }
    }

    /// Member access by key, case-insensitive. Anything but a map yields `Absent`.
    pub fn get(&self, key: &str) -> Self {
        match self {
            Self::Present(ConfigValue::Map(map)) => map.get(key).cloned().into(),
            _ => Self::Absent,
        }
    }

    /// Positional access into a list. Out of range or non-list yields `Absent`.
    pub fn index(&self, position: usize) -> Self {
        match self {
            Self::Present(ConfigValue::List(items)) => items.get(position).cloned().into(),
            _ => Self::Absent,
        }
    }

    /// Configuration data holds nothing invocable, so any call yields `Absent`.
    pub fn call(&self, _args: &[Self]) -> Self {
        Self::Absent
    }

    /// Walks a path such as `a.b[0].c`. Keys that contain dots are written in quoted
    /// brackets: `attributes["Microsoft.WindowsAzure.Plugins.Setting"]`. Malformed steps
    /// behave like missing keys.
    pub fn path(&self, path: &str) -> Self {
        let mut current = self.clone();
        let mut rest = path.trim();
        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('[') {
                let Some((step, tail)) = bracket_step(after) else {
                    return Self::Absent;
                };
                current = match step {
                    PathStep::Key(key) => current.get(key),
                    PathStep::Index(position) => current.index(position),
                };
                rest = tail;
            } else {
                let end = rest.find(['.', '[']).unwrap_or(rest.len());
                let (key, tail) = rest.split_at(end);
                let key = key.trim();
                if !key.is_empty() {
                    current = current.get(key);
                }
                rest = tail;
            }
            rest = rest.strip_prefix('.').unwrap_or(rest).trim_start();
        }
        current
    }

    /// The elements of a list, or the values of a map, each individually wrapped.
    pub fn items(&self) -> Vec<Self> {
        match self {
            Self::Present(ConfigValue::List(items)) => {
                items.iter().cloned().map(Self::Present).collect()
            }
            Self::Present(ConfigValue::Map(map)) => {
                map.iter().map(|(_, v)| Self::Present(v.clone())).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Text conversion. `Absent` and maps become `""`; lists join their elements with `,`.
    pub fn to_text(&self) -> String {
        match self {
            Self::Absent => String::new(),
            Self::Present(value) => value_text(value),
        }
    }

    pub fn to_bool(&self) -> bool {
        match self {
            Self::Present(ConfigValue::Bool(b)) => *b,
            Self::Present(ConfigValue::Integer(i)) => *i != 0,
            Self::Present(ConfigValue::Text(s)) => s.trim().eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    pub fn to_i64(&self) -> i64 {
        match self {
            Self::Present(ConfigValue::Integer(i)) => *i,
            Self::Present(ConfigValue::Text(s)) => s.trim().parse().unwrap_or_default(),
            Self::Present(ConfigValue::Bool(b)) => i64::from(*b),
            _ => 0,
        }
    }
}

enum PathStep<'a> {
    Key(&'a str),
    Index(usize),
}

/// Parses the inside of `[...]` (the text after `[`), returning the step and what follows `]`.
fn bracket_step(after: &str) -> Option<(PathStep<'_>, &str)> {
    let after = after.trim_start();
    for quote in ['"', '\''] {
        if let Some(body) = after.strip_prefix(quote) {
            let (key, tail) = body.split_once(quote)?;
            let tail = tail.trim_start().strip_prefix(']')?;
            return Some((PathStep::Key(key), tail));
        }
    }
    let (inner, tail) = after.split_once(']')?;
    let position = inner.trim().parse().ok()?;
    Some((PathStep::Index(position), tail))
}

fn value_text(value: &ConfigValue) -> String {
    match value {
        ConfigValue::Text(s) => s.clone(),
        ConfigValue::Bool(b) => b.to_string(),
        ConfigValue::Integer(i) => i.to_string(),
        ConfigValue::List(items) => items
            .iter()
            .map(value_text)
            .collect::<Vec<_>>()
            .join(","),
        ConfigValue::Map(_) => String::new(),
    }
}

impl fmt::Display for Dyn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<ConfigValue> for Dyn {
    fn from(value: ConfigValue) -> Self {
        Self::Present(value)
    }
}

impl From<Option<ConfigValue>> for Dyn {
    fn from(value: Option<ConfigValue>) -> Self {
        value.map_or(Self::Absent, Self::Present)
    }
}

impl From<ConfigMap> for Dyn {
    fn from(value: ConfigMap) -> Self {
        Self::Present(value.into())
    }
}

impl From<Dyn> for String {
    fn from(value: Dyn) -> Self {
        value.to_text()
    }
}

/// `Absent` on either side gives `Absent`. Integers add, everything else concatenates as text.
impl Add for Dyn {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Self::Absent, _) | (_, Self::Absent) => Self::Absent,
            (Self::Present(ConfigValue::Integer(a)), Self::Present(ConfigValue::Integer(b))) => {
                a.checked_add(b)
                    .map_or(Self::Absent, |sum| Self::Present(ConfigValue::Integer(sum)))
            }
            (lhs, rhs) => Self::Present(ConfigValue::Text(lhs.to_text() + &rhs.to_text())),
        }
    }
}

impl Not for Dyn {
    type Output = Self;

    fn not(self) -> Self {
        match self {
            Self::Absent => Self::Absent,
            other => Self::Present(ConfigValue::Bool(!other.to_bool())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dyn {
        let mut primary = ConfigMap::new();
        primary.insert("connectionString", "Server=tcp:db;");

        let mut sql = ConfigMap::new();
        sql.insert("primary", primary);

        let mut root = ConfigMap::new();
        root.insert("sql", sql);
        root.insert("count", 3_i64);
        root.insert(
            "nodes",
            vec![
                ConfigValue::from([("host", "a")].into_iter().collect::<ConfigMap>()),
                ConfigValue::from([("host", "b")].into_iter().collect::<ConfigMap>()),
            ],
        );
        Dyn::wrap(root)
    }

    #[test]
    fn test_chained_member_access_is_case_insensitive() {
        let root = sample();
        assert_eq!(
            root.get("SQL").get("Primary").get("connectionstring").to_text(),
            "Server=tcp:db;"
        );
        assert_eq!(root.path("sql.primary.connectionString").to_text(), "Server=tcp:db;");
    }

    #[test]
    fn test_sequence_elements_are_rewrapped() {
        let root = sample();
        let hosts: Vec<String> = root.get("nodes").items().iter().map(|n| n.get("host").to_text()).collect();
        assert_eq!(hosts, ["a", "b"]);
        assert_eq!(root.path("nodes[1].host").to_text(), "b");
    }

    #[test]
    fn test_absent_is_closed_under_every_operation() {
        let absent = Dyn::Absent;
        let deep = absent.get("a").get("b").index(0).get("c");
        assert_eq!(deep, absent);
        assert_eq!(absent.call(&[Dyn::wrap(ConfigValue::from("x"))]), absent);
        assert_eq!(absent.path("x.y[3].z"), absent);
        assert_eq!(!absent.clone(), absent);
        assert_eq!(absent.clone() + sample(), absent);
        assert_eq!(sample() + absent.clone(), absent);
        assert!(absent.items().is_empty());

        assert_eq!(deep.to_text(), "");
        assert_eq!(deep.to_string(), "");
        assert!(!deep.to_bool());
        assert_eq!(deep.to_i64(), 0);
        assert_eq!(String::from(deep), "");
    }

    #[test]
    fn test_missing_paths_on_present_values_degrade_to_absent() {
        let root = sample();
        assert!(root.get("missing").is_absent());
        assert!(root.path("sql.primary.connectionString.more").is_absent());
        assert!(root.get("count").get("x").is_absent());
        assert!(root.path("nodes[9].host").is_absent());
        assert!(root.path("nodes[x].host").is_absent());
        assert!(root.get("count").call(&[]).is_absent());
    }

    #[test]
    fn test_quoted_brackets_address_dotted_keys() {
        let mut settings = ConfigMap::new();
        settings.insert("Microsoft.WindowsAzure.Plugins.Diagnostics.ConnectionString", "UseDevelopmentStorage=true");
        let mut root = ConfigMap::new();
        root.insert("attributes", settings);
        let root = Dyn::wrap(root);

        let expected = "UseDevelopmentStorage=true";
        assert_eq!(
            root.path(r#"attributes["Microsoft.WindowsAzure.Plugins.Diagnostics.ConnectionString"]"#).to_text(),
            expected
        );
        assert_eq!(
            root.path("attributes['microsoft.windowsazure.plugins.diagnostics.connectionstring']").to_text(),
            expected
        );
        assert!(root.path("attributes.Microsoft.WindowsAzure").is_absent());
        assert!(root.path(r#"attributes["unterminated]"#).is_absent());
        assert!(root.path("attributes[").is_absent());
        assert_eq!(sample().path(r#"nodes[0]["host"]"#).to_text(), "a");
    }

    #[test]
    fn test_wrapping_is_idempotent() {
        let nested = sample().get("sql");
        let rewrapped = Dyn::wrap(nested.clone());
        assert_eq!(rewrapped, nested);
        assert_eq!(Dyn::wrap(Dyn::wrap(rewrapped.clone())).path("primary.connectionString"), nested.path("primary.connectionString"));
    }

    #[test]
    fn test_operators_on_present_values() {
        let root = sample();
        assert_eq!((root.get("count") + root.get("count")).to_i64(), 6);
        let joined = Dyn::wrap(ConfigValue::from("a")) + Dyn::wrap(ConfigValue::from("b"));
        assert_eq!(joined.to_text(), "ab");
        assert!((!Dyn::wrap(ConfigValue::from(false))).to_bool());
    }

    #[test]
    fn test_update_map_creates_or_replaces_nested_maps() {
        let mut map = ConfigMap::new();
        map.insert("storage", "scalar");
        map.update_map("Storage", |m| m.insert("primary", "a"));
        map.update_map("storage", |m| m.insert("backup", "b"));
        map.update_map("sql", |m| m.insert("orders", ""));

        let root = Dyn::wrap(map);
        assert_eq!(root.path("storage.primary").to_text(), "a");
        assert_eq!(root.path("storage.backup").to_text(), "b");
        assert!(root.path("sql.orders").is_present());
    }

    #[test]
    fn test_insert_replaces_keys_differing_by_case() {
        let mut map = ConfigMap::new();
        map.insert("Key", "one");
        map.insert("KEY", "two");
        assert_eq!(map.len(), 1);
        assert_eq!(map.iter().next().map(|(k, _)| k), Some("KEY"));
        assert_eq!(Dyn::wrap(map).get("key").to_text(), "two");
    }
}
