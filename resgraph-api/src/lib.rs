//! Public data model for the resgraph catalog.
//!
//! The catalog is a typed resource graph: nodes ("instances") have a kind
//! (e.g. `ApplicationComponent`), a name unique within that kind, a string
//! attribute map, and typed directed edges ("relations") to other instances.
//! The resource-loading layer produces a populated [`Catalog`]; the query
//! engine consumes it read-only through the [`ResourceGraph`] trait.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Separator used inside the stored value of a list attribute.
///
/// A list attribute holds several logical values joined into one string,
/// e.g. `"java, kotlin ,scala"`. Use [`split_list`] to get the elements back.
pub const LIST_SEPARATOR: char = ',';

/// Splits a list-attribute value into its trimmed elements.
///
/// Empty elements (e.g. from a trailing separator) are dropped.
pub fn split_list(value: &str) -> Vec<&str> {
    value
        .split(LIST_SEPARATOR)
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .collect()
}

/// Identity of an instance: `(kind, name)`.
///
/// Names are unique within a kind, so the pair identifies an instance across
/// the whole catalog. Used for relation endpoints and visited-set membership
/// during graph traversal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceKey {
    pub kind: String,
    pub name: String,
}

impl InstanceKey {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// One typed node in the resource graph.
///
/// Relations are stored outgoing-only, keyed by verb, with endpoints already
/// resolved to [`InstanceKey`]s by the loading layer. There is no reverse
/// index; incoming-edge questions require a store scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    kind: String,
    name: String,
    attributes: BTreeMap<String, String>,
    relations: BTreeMap<String, Vec<InstanceKey>>,
}

impl Instance {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            attributes: BTreeMap::new(),
            relations: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> InstanceKey {
        InstanceKey::new(self.kind.clone(), self.name.clone())
    }

    /// Returns the raw attribute value, if present.
    pub fn attribute(&self, path: &str) -> Option<&str> {
        self.attributes.get(path).map(String::as_str)
    }

    /// Sets an attribute value, replacing any previous one.
    pub fn set_attribute(&mut self, path: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(path.into(), value.into());
    }

    /// Outgoing relation lists, keyed by verb.
    pub fn relations(&self) -> &BTreeMap<String, Vec<InstanceKey>> {
        &self.relations
    }

    /// Appends a resolved outgoing relation under `verb`.
    pub fn add_relation(&mut self, verb: impl Into<String>, target: InstanceKey) {
        self.relations.entry(verb.into()).or_default().push(target);
    }

    /// True if the instance has no outgoing relations at all.
    pub fn has_no_relations(&self) -> bool {
        self.relations.values().all(Vec::is_empty)
    }
}

/// Read-only view of a resource graph, as consumed by the query engine.
///
/// Implementors must guarantee the graph does not mutate for the duration of
/// a single query call; the engine takes no locks.
pub trait ResourceGraph {
    /// All instances of one kind. Unknown kinds yield an empty slice.
    fn instances_of(&self, kind: &str) -> &[Instance];

    /// All instances of every kind, in stable store order.
    fn instances(&self) -> Box<dyn Iterator<Item = &Instance> + '_>;

    /// Looks up one instance by identity.
    fn get(&self, key: &InstanceKey) -> Option<&Instance>;

    /// Whether `attribute` is declared as a list attribute on `kind`.
    ///
    /// List attributes store several values joined by [`LIST_SEPARATOR`];
    /// comparison and membership operators treat them element-wise.
    fn is_list_attribute(&self, kind: &str, attribute: &str) -> bool;
}

/// In-memory resource graph.
///
/// Populated by the resource-loading layer (or directly in tests) and then
/// treated as immutable while queries run. Kind insertion order is preserved
/// so `filter` results come back in a stable order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    instances: IndexMap<String, Vec<Instance>>,
    list_attributes: BTreeMap<String, BTreeSet<String>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an instance under its kind.
    ///
    /// Name uniqueness within a kind is the loader's responsibility and is
    /// not re-checked here.
    pub fn add_instance(&mut self, instance: Instance) {
        self.instances
            .entry(instance.kind.clone())
            .or_default()
            .push(instance);
    }

    /// Declares `attribute` on `kind` as a list attribute.
    pub fn declare_list_attribute(&mut self, kind: impl Into<String>, attribute: impl Into<String>) {
        self.list_attributes
            .entry(kind.into())
            .or_default()
            .insert(attribute.into());
    }

    /// Kind names in insertion order.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.instances.keys().map(String::as_str)
    }

    /// Total number of instances across all kinds.
    pub fn len(&self) -> usize {
        self.instances.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResourceGraph for Catalog {
    fn instances_of(&self, kind: &str) -> &[Instance] {
        self.instances.get(kind).map(Vec::as_slice).unwrap_or(&[])
    }

    fn instances(&self) -> Box<dyn Iterator<Item = &Instance> + '_> {
        Box::new(self.instances.values().flatten())
    }

    fn get(&self, key: &InstanceKey) -> Option<&Instance> {
        self.instances
            .get(&key.kind)?
            .iter()
            .find(|i| i.name == key.name)
    }

    fn is_list_attribute(&self, kind: &str, attribute: &str) -> bool {
        self.list_attributes
            .get(kind)
            .is_some_and(|attrs| attrs.contains(attribute))
    }
}
