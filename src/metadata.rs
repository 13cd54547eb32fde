//! Declarative metadata table populated while modules are scanned.
//!
//! Builder declarations (`ModuleDef`, `ControllerDef`, `RouteDef`, the
//! `Injectable` trait) play the role of decorators: scanning applies them to a
//! [`MetadataStore`], and the resolver and dispatcher read them back. The store
//! is written during scanning only; afterwards it is frozen behind an `Arc`.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::internal::AnyArc;
use crate::token::Token;

/// Reserved metadata keys written by the framework.
pub mod keys {
    /// Controller base path or handler sub-path (`String`)
    pub const PATH: &str = "path";
    /// Handler HTTP method (`HttpMethod`)
    pub const METHOD: &str = "method";
    /// Handler parameter bindings (`Vec<ParamSpec>`)
    pub const ROUTE_ARGS: &str = "route_args";
    /// Handler function (`HandlerFn`)
    pub const HANDLER: &str = "handler";
    /// Handler names of a controller in declaration order (list of `String`)
    pub const HANDLERS: &str = "handlers";
    /// Guards (list of `Enhancer<dyn Guard>`)
    pub const GUARDS: &str = "guards";
    /// Interceptors (list of `Enhancer<dyn Interceptor>`)
    pub const INTERCEPTORS: &str = "interceptors";
    /// Pipes (list of `Enhancer<dyn PipeTransform>`)
    pub const PIPES: &str = "pipes";
    /// Exception filters (list of `Enhancer<dyn ExceptionFilter>`)
    pub const FILTERS: &str = "filters";
    /// Constructor parameter metadata (`Vec<Dependency>`)
    pub const PARAM_TYPES: &str = "param_types";
    /// Declared scope (`Lifetime`)
    pub const SCOPE: &str = "scope";
    /// Response status code (`u16`)
    pub const HTTP_CODE: &str = "http_code";
    /// Response headers (list of `(String, String)`)
    pub const HEADERS: &str = "headers";
}

enum Entry {
    Value(AnyArc),
    List(Vec<AnyArc>),
}

type KeyTable = HashMap<String, Entry>;

/// Metadata table: target → member → key → value.
///
/// Reads never fail: an undecorated target, an unknown key or a value of a
/// different type all read as absent (`None` or an empty list).
///
/// # Examples
///
/// ```rust
/// use ferrous_nest::{MetadataStore, Token};
///
/// struct CatsController;
///
/// let mut store = MetadataStore::new();
/// let target = Token::of::<CatsController>();
///
/// store.set_metadata("roles", vec!["admin".to_string()], &target, Some("create"));
/// store.merge_metadata("tags", ["a", "b"], &target, None);
/// store.merge_metadata("tags", ["c"], &target, None);
///
/// let roles = store.get_metadata::<Vec<String>>("roles", &target, Some("create"));
/// assert_eq!(roles.as_deref(), Some(&vec!["admin".to_string()]));
///
/// let tags: Vec<&str> = store.get_list::<&str>("tags", &target, None)
///     .into_iter()
///     .map(|t| *t)
///     .collect();
/// assert_eq!(tags, ["a", "b", "c"]);
///
/// assert!(store.get_metadata::<u16>("missing", &target, None).is_none());
/// ```
#[derive(Default)]
pub struct MetadataStore {
    classes: HashMap<Token, KeyTable>,
    members: HashMap<Token, HashMap<String, KeyTable>>,
}

impl MetadataStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, target: &Token, member: Option<&str>) -> Option<&KeyTable> {
        match member {
            None => self.classes.get(target),
            Some(member) => self.members.get(target)?.get(member),
        }
    }

    fn table_mut(&mut self, target: &Token, member: Option<&str>) -> &mut KeyTable {
        match member {
            None => self.classes.entry(target.clone()).or_default(),
            Some(member) => self
                .members
                .entry(target.clone())
                .or_default()
                .entry(member.to_string())
                .or_default(),
        }
    }

    /// Overwrites the value stored under `key`.
    pub fn set_metadata<V: Any + Send + Sync>(
        &mut self,
        key: &str,
        value: V,
        target: &Token,
        member: Option<&str>,
    ) {
        self.set_metadata_arc(key, Arc::new(value), target, member);
    }

    pub(crate) fn set_metadata_arc(
        &mut self,
        key: &str,
        value: AnyArc,
        target: &Token,
        member: Option<&str>,
    ) {
        self.table_mut(target, member)
            .insert(key.to_string(), Entry::Value(value));
    }

    /// Reads the value stored under `key`.
    ///
    /// List-valued entries read as absent; use [`get_list`](Self::get_list).
    pub fn get_metadata<V: Any + Send + Sync>(
        &self,
        key: &str,
        target: &Token,
        member: Option<&str>,
    ) -> Option<Arc<V>> {
        match self.table(target, member)?.get(key)? {
            Entry::Value(value) => value.clone().downcast::<V>().ok(),
            Entry::List(_) => None,
        }
    }

    /// Appends `values` to the list stored under `key`, creating it if needed.
    ///
    /// A plain value already stored under the key becomes the first element.
    pub fn merge_metadata<V, I>(&mut self, key: &str, values: I, target: &Token, member: Option<&str>)
    where
        V: Any + Send + Sync,
        I: IntoIterator<Item = V>,
    {
        let values = values.into_iter().map(|v| Arc::new(v) as AnyArc);
        let table = self.table_mut(target, member);
        let entry = table
            .remove(key)
            .unwrap_or_else(|| Entry::List(Vec::new()));
        let mut list = match entry {
            Entry::List(list) => list,
            Entry::Value(value) => vec![value],
        };
        list.extend(values);
        table.insert(key.to_string(), Entry::List(list));
    }

    /// Reads the list stored under `key`, keeping elements of type `V`.
    pub fn get_list<V: Any + Send + Sync>(
        &self,
        key: &str,
        target: &Token,
        member: Option<&str>,
    ) -> Vec<Arc<V>> {
        let Some(entry) = self.table(target, member).and_then(|t| t.get(key)) else {
            return Vec::new();
        };
        let items: &[AnyArc] = match entry {
            Entry::List(list) => list,
            Entry::Value(value) => std::slice::from_ref(value),
        };
        items
            .iter()
            .filter_map(|v| v.clone().downcast::<V>().ok())
            .collect()
    }

    /// True when anything is stored under `key`.
    pub fn has_metadata(&self, key: &str, target: &Token, member: Option<&str>) -> bool {
        self.table(target, member)
            .map(|t| t.contains_key(key))
            .unwrap_or(false)
    }

    /// First value found under `key`, trying `targets` in order.
    ///
    /// Typical use passes the handler first and the controller second, so a
    /// handler-level declaration overrides the controller-level one.
    pub fn get_all_and_override<V: Any + Send + Sync>(
        &self,
        key: &str,
        targets: &[(&Token, Option<&str>)],
    ) -> Option<Arc<V>> {
        targets
            .iter()
            .find_map(|(target, member)| self.get_metadata::<V>(key, target, *member))
    }

    /// Concatenation of the lists under `key` across `targets`, in order.
    pub fn get_all_and_merge<V: Any + Send + Sync>(
        &self,
        key: &str,
        targets: &[(&Token, Option<&str>)],
    ) -> Vec<Arc<V>> {
        targets
            .iter()
            .flat_map(|(target, member)| self.get_list::<V>(key, target, *member))
            .collect()
    }

    /// Members of `target` that carry any metadata.
    pub fn members(&self, target: &Token) -> Vec<&str> {
        self.members
            .get(target)
            .map(|m| m.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore")
            .field("classes", &self.classes.len())
            .field("members", &self.members.values().map(HashMap::len).sum::<usize>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Target;

    #[test]
    fn absent_and_mismatched_reads_are_none() {
        let mut store = MetadataStore::new();
        let t = Token::of::<Target>();
        assert!(store.get_metadata::<u16>(keys::HTTP_CODE, &t, None).is_none());

        store.set_metadata(keys::HTTP_CODE, 201u16, &t, Some("create"));
        assert!(store.get_metadata::<u32>(keys::HTTP_CODE, &t, Some("create")).is_none());
        assert!(store.get_metadata::<u16>(keys::HTTP_CODE, &t, None).is_none());
        assert_eq!(
            store.get_metadata::<u16>(keys::HTTP_CODE, &t, Some("create")).as_deref(),
            Some(&201)
        );
    }

    #[test]
    fn set_overwrites_and_merge_promotes_value_to_list() {
        let mut store = MetadataStore::new();
        let t = Token::of::<Target>();
        store.set_metadata("k", 1u8, &t, None);
        store.set_metadata("k", 2u8, &t, None);
        assert_eq!(store.get_metadata::<u8>("k", &t, None).as_deref(), Some(&2));

        store.merge_metadata("k", [3u8], &t, None);
        let list: Vec<u8> = store.get_list::<u8>("k", &t, None).iter().map(|v| **v).collect();
        assert_eq!(list, vec![2, 3]);
        assert!(store.get_metadata::<u8>("k", &t, None).is_none());
    }

    #[test]
    fn override_prefers_first_target() {
        let mut store = MetadataStore::new();
        let t = Token::of::<Target>();
        store.set_metadata("roles", "user", &t, None);
        store.set_metadata("roles", "admin", &t, Some("remove"));

        let handler_first = [(&t, Some("remove")), (&t, None)];
        let found = store.get_all_and_override::<&str>("roles", &handler_first);
        assert_eq!(found.as_deref(), Some(&"admin"));

        let other = [(&t, Some("list")), (&t, None)];
        let found = store.get_all_and_override::<&str>("roles", &other);
        assert_eq!(found.as_deref(), Some(&"user"));
    }
}
