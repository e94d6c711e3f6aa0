//! The parameter model: an immutable accumulator of compiled query state.
//!
//! Each `with_*` method returns a new [`QueryParameters`] and leaves the
//! receiver untouched, so a chain of compilation steps never aliases an
//! earlier step's state. The state is small, so every step is a plain copy;
//! only the compiled projector is shared, behind an `Arc`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// One result row: wire property name to raw value. Text content is stored under `*`.
pub type Row = BTreeMap<String, String>;

/// A compiled projection, applied to every result row.
#[derive(Clone)]
pub struct Projector(Arc<dyn Fn(&Row) -> serde_json::Value + Send + Sync>);

impl Projector {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Row) -> serde_json::Value + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Projector returning the whole row as a JSON object.
    pub fn identity() -> Self {
        Self::new(row_to_json)
    }

    pub fn apply(&self, row: &Row) -> serde_json::Value {
        (self.0)(row)
    }
}

impl std::fmt::Debug for Projector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Projector(..)")
    }
}

pub(crate) fn row_to_json(row: &Row) -> serde_json::Value {
    serde_json::Value::Object(
        row.iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect(),
    )
}

/// Accumulated wire parameters, sort order and projection of one query chain.
#[derive(Debug, Clone, Default)]
pub struct QueryParameters {
    values: Vec<(String, String)>,
    sort: Option<String>,
    ascending: Option<bool>,
    properties: Option<BTreeSet<String>>,
    projector: Option<Projector>,
}

impl QueryParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter values in insertion order.
    pub fn values(&self) -> &[(String, String)] {
        &self.values
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn sort(&self) -> Option<&str> {
        self.sort.as_deref()
    }

    /// Sort direction, if an order clause was compiled.
    pub fn ascending(&self) -> Option<bool> {
        self.ascending
    }

    /// Properties to fetch; `None` means all of them.
    pub fn properties(&self) -> Option<&BTreeSet<String>> {
        self.properties.as_ref()
    }

    pub fn projector(&self) -> Option<&Projector> {
        self.projector.as_ref()
    }

    /// Set a filter value. A repeated name overwrites the earlier value in place.
    pub fn with_filter_value(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        let mut next = self.clone();
        match next.values.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => next.values.push((name, value)),
        }
        next
    }

    /// Set the sort key (`None` for natural order) and direction.
    pub fn with_sort(&self, key: Option<String>, ascending: bool) -> Self {
        let mut next = self.clone();
        next.sort = key;
        next.ascending = Some(ascending);
        next
    }

    /// Set the fetched property set (`None` for all) and the row projector.
    pub fn with_select(&self, properties: Option<BTreeSet<String>>, projector: Projector) -> Self {
        let mut next = self.clone();
        next.properties = properties;
        next.projector = Some(projector);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_filter_value_leaves_previous_untouched() {
        let first = QueryParameters::new().with_filter_value("ns", "0");
        let second = first.with_filter_value("title", "Main Page");

        assert_eq!(first.values().len(), 1);
        assert_eq!(second.values().len(), 2);
        assert_eq!(second.value("title"), Some("Main Page"));
        assert_eq!(first.value("title"), None);
    }

    #[test]
    fn test_with_filter_value_overwrites() {
        let params = QueryParameters::new()
            .with_filter_value("ns", "0")
            .with_filter_value("title", "A")
            .with_filter_value("ns", "14");

        assert_eq!(
            params.values(),
            &[
                ("ns".to_string(), "14".to_string()),
                ("title".to_string(), "A".to_string())
            ]
        );
    }

    #[test]
    fn test_with_sort_last_write_wins() {
        let base = QueryParameters::new();
        let sorted = base.with_sort(Some("timestamp".into()), true);
        let resorted = sorted.with_sort(None, false);

        assert_eq!(base.ascending(), None);
        assert_eq!(sorted.sort(), Some("timestamp"));
        assert_eq!(sorted.ascending(), Some(true));
        assert_eq!(resorted.sort(), None);
        assert_eq!(resorted.ascending(), Some(false));
    }

    #[test]
    fn test_with_select() {
        let props: BTreeSet<String> = ["id".to_string(), "name".to_string()].into();
        let params = QueryParameters::new().with_select(Some(props.clone()), Projector::identity());

        assert_eq!(params.properties(), Some(&props));

        let mut row = Row::new();
        row.insert("id".into(), "7".into());
        let out = params.projector().unwrap().apply(&row);
        assert_eq!(out["id"], "7");
    }
}
