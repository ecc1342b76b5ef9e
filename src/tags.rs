//! Tag collection
//!
//! Members of a tag are ordered by descending priority. Members with no
//! priority sort after every member that has one, and ties keep
//! registration order (the sort is stable), so the order is total and
//! deterministic.

use crate::definition::{TagPriority, TagQuery};
use crate::locator::WeakLocator;
use crate::storage::DefinitionStore;
use crate::value::{AnyValue, Injectable, downcast_value};
use crate::{DiError, Result};
use ahash::AHashSet;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// One member of a tag, after ordering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagMember {
    /// Container identifier of the member
    pub id: String,
    /// Key in the resulting collection
    pub key: String,
    /// Effective priority (`None` sorts last)
    pub priority: Option<i64>,
}

/// Ordered members of `query.tag`.
///
/// `owner` is the identifier requesting the collection, excluded when
/// `query.exclude_self` is set. `default_method` is the container-wide
/// priority function; the query's own setting takes precedence.
pub(crate) fn collect_members(
    store: &DefinitionStore,
    query: &TagQuery,
    owner: Option<&str>,
    default_method: Option<&str>,
) -> Result<Vec<TagMember>> {
    let tag = query.tag.as_str();
    let default_method = query.priority_default_method.as_deref().or(default_method);

    let mut members = Vec::new();
    for (id, stored) in store.tagged(tag) {
        if query.exclude.iter().any(|excluded| *excluded == id) {
            continue;
        }
        if query.exclude_self && owner == Some(id.as_str()) {
            continue;
        }

        let definition = &stored.definition;
        let Some(spec) = definition.tag_spec(tag) else {
            continue;
        };

        let priority = match &spec.priority {
            TagPriority::Value(priority) => Some(*priority),
            TagPriority::Method(method) => {
                let declared = definition
                    .class()
                    .and_then(|class| class.priority_for(method, tag));
                match declared {
                    Some(priority) => Some(priority),
                    None => {
                        return Err(DiError::invalid(
                            id.as_str(),
                            format!("tag `{tag}` names priority function `{method}`, which the class does not declare"),
                        ));
                    }
                }
            }
            TagPriority::Unset => default_method.and_then(|method| {
                definition
                    .class()
                    .and_then(|class| class.priority_for(method, tag))
            }),
        };

        let key = match &query.key_option {
            Some(option) => spec.metadata.get(option).cloned().unwrap_or_else(|| id.clone()),
            None => id.clone(),
        };

        members.push(TagMember { id, key, priority });
    }

    members.sort_by(|a, b| b.priority.cmp(&a.priority));

    if query.key_option.is_some() {
        let mut seen = AHashSet::with_capacity(members.len());
        for member in &members {
            if !seen.insert(member.key.as_str()) {
                return Err(DiError::invalid(
                    member.id.as_str(),
                    format!("duplicate key `{}` in tag `{tag}`", member.key),
                ));
            }
        }
    }

    #[cfg(feature = "logging")]
    debug!(
        target: "definition_injector",
        tag = tag,
        members = members.len(),
        lazy = query.lazy,
        "Collected tag members"
    );

    Ok(members)
}

/// An eagerly resolved tag collection, in member order
#[derive(Clone, Default)]
pub struct TaggedValues {
    entries: Vec<(String, AnyValue)>,
}

impl TaggedValues {
    pub(crate) fn new(entries: Vec<(String, AnyValue)>) -> Self {
        Self { entries }
    }

    /// Value stored under `key`
    pub fn get(&self, key: &str) -> Option<&AnyValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value)
    }

    /// Value stored under `key`, downcast
    pub fn get_as<T: Injectable>(&self, key: &str) -> Result<Arc<T>> {
        let value = self.get(key).ok_or_else(|| DiError::not_found(key))?;
        downcast_value(Arc::clone(value), key)
    }

    /// Keys in member order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    /// `(key, value)` pairs in member order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AnyValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Every value downcast to `T`
    pub fn values_as<T: Injectable>(&self) -> Result<Vec<Arc<T>>> {
        self.entries
            .iter()
            .map(|(key, value)| downcast_value(Arc::clone(value), key))
            .collect()
    }

    /// Number of members
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for TaggedValues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}

/// A tag collection resolved member by member, on access.
///
/// Every `iter()` call starts a new single-pass cursor; values are resolved
/// as the cursor advances, never up front.
#[derive(Clone)]
pub struct LazyTagged {
    locator: WeakLocator,
    tag: String,
    members: Vec<(String, String)>,
}

impl LazyTagged {
    pub(crate) fn new(locator: WeakLocator, tag: impl Into<String>, members: Vec<(String, String)>) -> Self {
        Self {
            locator,
            tag: tag.into(),
            members,
        }
    }

    /// Tag name
    #[inline]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Keys in member order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(key, _)| key.as_str())
    }

    /// Container identifiers in member order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(_, id)| id.as_str())
    }

    /// Check whether `key` is a member
    pub fn has(&self, key: &str) -> bool {
        self.members.iter().any(|(k, _)| k == key)
    }

    /// Resolve the member stored under `key`
    pub fn get(&self, key: &str) -> Result<AnyValue> {
        let (_, id) = self
            .members
            .iter()
            .find(|(k, _)| k == key)
            .ok_or_else(|| DiError::not_found(key))?;
        self.resolve(id)
    }

    /// Resolve the member stored under `key`, downcast
    pub fn get_as<T: Injectable>(&self, key: &str) -> Result<Arc<T>> {
        downcast_value(self.get(key)?, key)
    }

    /// Start a new cursor over the members
    pub fn iter(&self) -> LazyTaggedIter<'_> {
        LazyTaggedIter {
            collection: self,
            position: 0,
        }
    }

    /// Number of members
    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn resolve(&self, id: &str) -> Result<AnyValue> {
        let locator = self.locator.upgrade().ok_or(DiError::ContainerDropped)?;
        locator.get(id)
    }
}

impl<'a> IntoIterator for &'a LazyTagged {
    type Item = Result<(&'a str, AnyValue)>;
    type IntoIter = LazyTaggedIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl std::fmt::Debug for LazyTagged {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyTagged")
            .field("tag", &self.tag)
            .field("keys", &self.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Single-pass cursor over a [`LazyTagged`]
pub struct LazyTaggedIter<'a> {
    collection: &'a LazyTagged,
    position: usize,
}

impl<'a> Iterator for LazyTaggedIter<'a> {
    type Item = Result<(&'a str, AnyValue)>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, id) = self.collection.members.get(self.position)?;
        self.position += 1;
        Some(self.collection.resolve(id).map(|value| (key.as_str(), value)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.collection.members.len() - self.position;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for LazyTaggedIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Definition, TagSpec};
    use crate::descriptor::ClassDescriptor;
    use crate::locator::ServiceLocator;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Plugin;

    fn store(entries: Vec<(&str, Definition)>) -> DefinitionStore {
        let store = DefinitionStore::new();
        for (id, definition) in entries {
            store.insert(id, definition).unwrap();
        }
        store
    }

    fn ids(members: &[TagMember]) -> Vec<&str> {
        members.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_priority_descending_ties_in_registration_order() {
        let store = store(vec![
            ("low", Definition::value(1u8).tag_with("t", TagSpec::priority(1))),
            ("none", Definition::value(2u8).tag("t")),
            ("high.a", Definition::value(3u8).tag_with("t", TagSpec::priority(10))),
            ("high.b", Definition::value(4u8).tag_with("t", TagSpec::priority(10))),
            ("negative", Definition::value(5u8).tag_with("t", TagSpec::priority(-5))),
        ]);

        let members = collect_members(&store, &TagQuery::new("t"), None, None).unwrap();
        assert_eq!(ids(&members), vec!["high.a", "high.b", "low", "negative", "none"]);
    }

    #[test]
    fn test_priority_functions() {
        let class = ClassDescriptor::named::<Plugin, _>("Plugin", [], |_| Ok(Plugin))
            .priority("get_priority", |_| 7)
            .priority("boost", |tag| if tag == "t" { 100 } else { 0 });
        let class = Arc::new(class);

        let store = store(vec![
            ("explicit", Definition::value(1u8).tag_with("t", TagSpec::priority(50))),
            ("defaulted", Definition::autowire(Arc::clone(&class)).tag("t")),
            ("boosted", Definition::autowire(Arc::clone(&class)).tag_with("t", TagSpec::priority_method("boost"))),
        ]);

        let members = collect_members(&store, &TagQuery::new("t"), None, Some("get_priority")).unwrap();
        assert_eq!(ids(&members), vec!["boosted", "explicit", "defaulted"]);
        assert_eq!(members[2].priority, Some(7));

        let without_default = collect_members(&store, &TagQuery::new("t"), None, None).unwrap();
        assert_eq!(without_default[2].priority, None);
    }

    #[test]
    fn test_missing_priority_function_is_invalid() {
        let store = store(vec![(
            "x",
            Definition::value(1u8).tag_with("t", TagSpec::priority_method("nope")),
        )]);
        let err = collect_members(&store, &TagQuery::new("t"), None, None).unwrap_err();
        assert!(matches!(err, DiError::InvalidDefinition { id, .. } if id == "x"));
    }

    #[test]
    fn test_exclusions() {
        let store = store(vec![
            ("a", Definition::value(1u8).tag("t")),
            ("b", Definition::value(2u8).tag("t")),
            ("c", Definition::value(3u8).tag("t")),
        ]);

        let query = TagQuery::new("t").excluding("c");
        assert_eq!(ids(&collect_members(&store, &query, Some("a"), None).unwrap()), vec!["b"]);

        let query = query.include_self();
        assert_eq!(ids(&collect_members(&store, &query, Some("a"), None).unwrap()), vec!["a", "b"]);
    }

    #[test]
    fn test_unknown_tag_is_empty() {
        let store = store(vec![("a", Definition::value(1u8).tag("t"))]);
        assert!(collect_members(&store, &TagQuery::new("other"), None, None).unwrap().is_empty());
    }

    #[test]
    fn test_key_option() {
        let store = store(vec![
            ("mysql.driver", Definition::value(1u8).tag_with("drivers", TagSpec::default().with("name", "mysql"))),
            ("sqlite.driver", Definition::value(2u8).tag_with("drivers", TagSpec::default().with("name", "sqlite"))),
            ("other", Definition::value(3u8).tag("drivers")),
        ]);

        let members = collect_members(&store, &TagQuery::new("drivers").key_by("name"), None, None).unwrap();
        let keys: Vec<&str> = members.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, vec!["mysql", "sqlite", "other"]);
    }

    #[test]
    fn test_duplicate_keys_are_invalid() {
        let store = store(vec![
            ("a", Definition::value(1u8).tag_with("t", TagSpec::default().with("name", "same"))),
            ("b", Definition::value(2u8).tag_with("t", TagSpec::default().with("name", "same"))),
        ]);
        let err = collect_members(&store, &TagQuery::new("t").key_by("name"), None, None).unwrap_err();
        assert!(matches!(err, DiError::InvalidDefinition { .. }));
    }

    struct CountingLocator {
        calls: AtomicU32,
    }

    impl ServiceLocator for CountingLocator {
        fn get(&self, id: &str) -> Result<AnyValue> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(id.to_owned()))
        }

        fn has(&self, _id: &str) -> bool {
            true
        }
    }

    #[test]
    fn test_lazy_resolves_on_advance() {
        let locator = Arc::new(CountingLocator {
            calls: AtomicU32::new(0),
        });
        let weak: WeakLocator = Arc::downgrade(&locator) as WeakLocator;
        let lazy = LazyTagged::new(
            weak,
            "t",
            vec![("k1".into(), "id1".into()), ("k2".into(), "id2".into())],
        );

        assert_eq!(locator.calls.load(Ordering::SeqCst), 0);
        assert!(lazy.has("k2"));
        assert!(!lazy.has("id2"));

        let mut cursor = lazy.iter();
        let (key, value) = cursor.next().unwrap().unwrap();
        assert_eq!(key, "k1");
        assert_eq!(value.downcast_ref::<String>().map(String::as_str), Some("id1"));
        assert_eq!(locator.calls.load(Ordering::SeqCst), 1);

        assert_eq!(lazy.iter().count(), 2);
        assert_eq!(*lazy.get_as::<String>("k2").unwrap(), "id2");
        assert!(lazy.get("missing").is_err());
    }

    #[test]
    fn test_lazy_after_container_drop() {
        let locator = Arc::new(CountingLocator {
            calls: AtomicU32::new(0),
        });
        let weak: WeakLocator = Arc::downgrade(&locator) as WeakLocator;
        let lazy = LazyTagged::new(weak, "t", vec![("k".into(), "id".into())]);
        drop(locator);

        assert!(matches!(lazy.get("k"), Err(DiError::ContainerDropped)));
    }

    #[test]
    fn test_tagged_values() {
        let values = TaggedValues::new(vec![
            ("a".into(), Arc::new(1u32) as AnyValue),
            ("b".into(), Arc::new(2u32) as AnyValue),
        ]);
        assert_eq!(values.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(*values.get_as::<u32>("b").unwrap(), 2);
        let all: Vec<u32> = values.values_as::<u32>().unwrap().into_iter().map(|v| *v).collect();
        assert_eq!(all, vec![1, 2]);
    }
}
