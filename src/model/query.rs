//! Saved query snapshot and the visualizations it owns.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{DataSourceId, QueryId, VisualizationId};

/// Kind of a query parameter, as declared on the query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    #[default]
    Text,
    Number,
    Date,
    Enum,
}

/// A parameter declared by the query text (`{{ name }}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    /// Parameter name as referenced in the query text.
    pub name: String,

    /// Human-readable title, if different from the name.
    #[serde(default)]
    pub title: Option<String>,

    /// Declared kind.
    #[serde(rename = "type", default)]
    pub kind: ParameterKind,

    /// Initial value when the page opens.
    #[serde(default)]
    pub value: Value,
}

impl ParameterDefinition {
    /// Creates a text parameter with the given default value.
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            kind: ParameterKind::Text,
            value: Value::String(value.into()),
        }
    }

    /// Creates a number parameter with the given default value.
    pub fn number(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            title: None,
            kind: ParameterKind::Number,
            value: Value::from(value),
        }
    }
}

/// Refresh schedule attached to a query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Refresh interval in seconds.
    pub interval: Option<u64>,
    /// Time of day (`HH:MM`) for daily/weekly schedules.
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub day_of_week: Option<String>,
    /// Last day the schedule applies (`YYYY-MM-DD`).
    #[serde(default)]
    pub until: Option<String>,
}

impl Schedule {
    /// Creates a plain interval schedule.
    pub fn every(interval_secs: u64) -> Self {
        Self {
            interval: Some(interval_secs),
            ..Default::default()
        }
    }
}

/// A visualization of a query's result (table, chart, counter...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visualization {
    pub id: VisualizationId,

    /// Renderer kind, e.g. `TABLE` or `CHART`.
    #[serde(rename = "type")]
    pub kind: String,

    pub name: String,

    /// Renderer-specific configuration, opaque to the core.
    #[serde(default)]
    pub options: Value,
}

impl Visualization {
    /// Creates a visualization with empty options.
    pub fn new(id: VisualizationId, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            kind: kind.into(),
            name: name.into(),
            options: Value::Object(Default::default()),
        }
    }
}

/// An immutable snapshot of a saved query.
///
/// Edits go through the `with_*` methods, which return a new snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// `None` for a query that has never been saved.
    #[serde(default)]
    pub id: Option<QueryId>,

    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// The query text sent to the data source.
    #[serde(rename = "query", default)]
    pub text: String,

    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,

    #[serde(default)]
    pub visualizations: Vec<Visualization>,

    pub data_source_id: DataSourceId,

    #[serde(default)]
    pub schedule: Option<Schedule>,

    #[serde(default)]
    pub is_archived: bool,

    #[serde(default)]
    pub is_draft: bool,
}

impl Query {
    /// Returns true if the query has never been saved.
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    /// Looks up a visualization by id.
    pub fn visualization(&self, id: VisualizationId) -> Option<&Visualization> {
        self.visualizations.iter().find(|v| v.id == id)
    }

    /// Returns true if the visualization belongs to this query.
    pub fn has_visualization(&self, id: VisualizationId) -> bool {
        self.visualization(id).is_some()
    }

    /// Returns the id of the first visualization, which is the default tab.
    pub fn first_visualization_id(&self) -> Option<VisualizationId> {
        self.visualizations.first().map(|v| v.id)
    }

    /// Returns a copy with a new description. Blank text clears it.
    pub fn with_description(&self, text: &str) -> Self {
        let mut next = self.clone();
        next.description = if text.trim().is_empty() {
            None
        } else {
            Some(text.to_string())
        };
        next
    }

    /// Returns a copy with a new refresh schedule.
    pub fn with_schedule(&self, schedule: Option<Schedule>) -> Self {
        let mut next = self.clone();
        next.schedule = schedule;
        next
    }

    /// Returns a copy with the visualization appended, or replaced if a
    /// visualization with the same id already exists.
    pub fn with_visualization(&self, visualization: Visualization) -> Self {
        let mut next = self.clone();
        match next
            .visualizations
            .iter_mut()
            .find(|v| v.id == visualization.id)
        {
            Some(existing) => *existing = visualization,
            None => next.visualizations.push(visualization),
        }
        next
    }

    /// Returns a copy without the given visualization, or `None` if the query
    /// does not own it.
    pub fn without_visualization(&self, id: VisualizationId) -> Option<Self> {
        if !self.has_visualization(id) {
            return None;
        }
        let mut next = self.clone();
        next.visualizations.retain(|v| v.id != id);
        Some(next)
    }

    /// A small parameterized query with two visualizations, used by headless
    /// mode when no fixture is given.
    pub fn demo() -> Self {
        Self {
            id: Some(QueryId(1)),
            name: "Daily signups".to_string(),
            description: Some("New accounts per day".to_string()),
            text: "SELECT day, count(*) FROM signups WHERE region = '{{ region }}' \
                   GROUP BY day LIMIT {{ limit }}"
                .to_string(),
            parameters: vec![
                ParameterDefinition::text("region", "eu"),
                ParameterDefinition::number("limit", 3),
            ],
            visualizations: vec![
                Visualization::new(VisualizationId(1), "TABLE", "Table"),
                Visualization::new(VisualizationId(2), "CHART", "Signups chart"),
            ],
            data_source_id: DataSourceId(1),
            schedule: None,
            is_archived: false,
            is_draft: false,
        }
    }
}
