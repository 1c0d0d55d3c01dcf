//! Domain model: queries, visualizations and data sources.
//!
//! Every type here is a plain value. Query snapshots are shared as
//! `Arc<Query>` and replaced wholesale on edit, so readers never observe a
//! partially-updated query.

mod data_source;
mod query;

pub use data_source::DataSource;
pub use query::{ParameterDefinition, ParameterKind, Query, Schedule, Visualization};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a saved query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(pub i64);

/// Identifier of a visualization, unique across queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisualizationId(pub i64);

/// Identifier of a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataSourceId(pub i64);

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for VisualizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for DataSourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for VisualizationId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| format!("Invalid visualization id: '{s}'"))
    }
}
