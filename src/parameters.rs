//! Query parameter values with pending (unconfirmed) edits.
//!
//! Each parameter keeps the value last applied to an execution and the value
//! currently shown in the editor. The set is dirty whenever the two differ;
//! there is no separate dirty flag to fall out of sync.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{QueryViewError, Result};
use crate::model::Query;

/// A parameter's applied and pending value.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterValue {
    pub name: String,
    /// Value used by the last (or next) execution.
    pub applied: Value,
    /// Value currently entered in the editor.
    pub pending: Value,
}

impl ParameterValue {
    /// Returns true if the pending value differs from the applied one.
    pub fn is_dirty(&self) -> bool {
        self.pending != self.applied
    }
}

/// The parameter values of one query, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ParameterSet {
    params: Vec<ParameterValue>,
}

impl ParameterSet {
    /// Builds the set from the query's parameter definitions and defaults.
    pub fn from_query(query: &Query) -> Self {
        let params = query
            .parameters
            .iter()
            .map(|def| ParameterValue {
                name: def.name.clone(),
                applied: def.value.clone(),
                pending: def.value.clone(),
            })
            .collect();
        Self { params }
    }

    /// Returns the applied values, keyed by parameter name.
    pub fn values(&self) -> BTreeMap<String, Value> {
        self.params
            .iter()
            .map(|p| (p.name.clone(), p.applied.clone()))
            .collect()
    }

    /// Returns the pending values, keyed by parameter name.
    pub fn pending_values(&self) -> BTreeMap<String, Value> {
        self.params
            .iter()
            .map(|p| (p.name.clone(), p.pending.clone()))
            .collect()
    }

    /// Records an edit without applying it.
    pub fn set_pending(&mut self, name: &str, value: Value) -> Result<()> {
        let param = self
            .params
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| QueryViewError::UnknownParameter(name.to_string()))?;
        param.pending = value;
        Ok(())
    }

    /// Promotes every pending value to applied.
    ///
    /// Returns true if any applied value changed.
    pub fn commit(&mut self) -> bool {
        let mut changed = false;
        for param in &mut self.params {
            if param.is_dirty() {
                param.applied = param.pending.clone();
                changed = true;
            }
        }
        changed
    }

    /// Throws away pending edits.
    pub fn discard(&mut self) {
        for param in &mut self.params {
            param.pending = param.applied.clone();
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.params.iter().any(ParameterValue::is_dirty)
    }

    /// Names of the parameters with unapplied edits.
    pub fn dirty_names(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter(|p| p.is_dirty())
            .map(|p| p.name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterValue> {
        self.params.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn demo_set() -> ParameterSet {
        ParameterSet::from_query(&Query::demo())
    }

    #[test]
    fn test_initial_values_come_from_defaults() {
        let set = demo_set();
        let values = set.values();

        assert_eq!(values["region"], json!("eu"));
        assert_eq!(values["limit"], json!(3));
        assert!(!set.is_dirty());
    }

    #[test]
    fn test_set_pending_marks_dirty_without_applying() {
        let mut set = demo_set();
        set.set_pending("region", json!("us")).unwrap();

        assert!(set.is_dirty());
        assert_eq!(set.dirty_names(), vec!["region"]);
        assert_eq!(set.values()["region"], json!("eu"));
        assert_eq!(set.pending_values()["region"], json!("us"));
    }

    #[test]
    fn test_setting_back_to_applied_value_is_clean() {
        let mut set = demo_set();
        set.set_pending("region", json!("us")).unwrap();
        set.set_pending("region", json!("eu")).unwrap();

        assert!(!set.is_dirty());
    }

    #[test]
    fn test_commit_promotes_and_reports_change() {
        let mut set = demo_set();
        set.set_pending("limit", json!(10)).unwrap();

        assert!(set.commit());
        assert!(!set.is_dirty());
        assert_eq!(set.values()["limit"], json!(10));

        // Nothing pending: a second commit changes nothing.
        assert!(!set.commit());
    }

    #[test]
    fn test_discard_restores_applied() {
        let mut set = demo_set();
        set.set_pending("region", json!("apac")).unwrap();
        set.discard();

        assert!(!set.is_dirty());
        assert_eq!(set.pending_values()["region"], json!("eu"));
    }

    #[test]
    fn test_unknown_parameter() {
        let mut set = demo_set();
        let err = set.set_pending("country", json!("fr")).unwrap_err();

        assert!(matches!(err, QueryViewError::UnknownParameter(name) if name == "country"));
        assert!(!set.is_dirty());
    }

    #[test]
    fn test_query_without_parameters() {
        let mut query = Query::demo();
        query.parameters.clear();
        let set = ParameterSet::from_query(&query);

        assert!(set.is_empty());
        assert!(!set.is_dirty());
        assert!(set.values().is_empty());
    }
}
