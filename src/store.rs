//! Persistence seams: saving query edits and resolving data sources.
//!
//! Both are async traits so a host can back them with HTTP calls; the
//! in-memory implementations serve headless mode and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

use crate::error::{QueryViewError, Result};
use crate::model::{DataSource, DataSourceId, Query, QueryId, Visualization, VisualizationId};

/// Saves edits to a query and its visualizations.
#[async_trait]
pub trait QueryStore: Send + Sync {
    /// Saves description and schedule changes; returns the stored copy.
    async fn save_query(&self, query: &Query) -> Result<Query>;

    /// Creates a visualization for `query` and assigns its id.
    async fn create_visualization(
        &self,
        query: &Query,
        kind: &str,
        name: &str,
    ) -> Result<Visualization>;

    async fn update_visualization(&self, visualization: &Visualization) -> Result<Visualization>;

    async fn delete_visualization(&self, id: VisualizationId) -> Result<()>;
}

/// Looks up data source descriptors.
#[async_trait]
pub trait DataSourceProvider: Send + Sync {
    async fn get(&self, id: DataSourceId) -> Result<DataSource>;
}

/// A query store that keeps everything in memory.
pub struct MemoryQueryStore {
    queries: Mutex<HashMap<QueryId, Query>>,
    next_visualization: AtomicI64,
    failure: Option<String>,
    saves: AtomicUsize,
}

impl MemoryQueryStore {
    pub fn new() -> Self {
        Self {
            queries: Mutex::new(HashMap::new()),
            next_visualization: AtomicI64::new(1),
            failure: None,
            saves: AtomicUsize::new(0),
        }
    }

    /// Seeds the store with `query` and continues visualization ids after
    /// the largest one it owns.
    pub fn with_query(self, query: &Query) -> Self {
        let max_id = query
            .visualizations
            .iter()
            .map(|v| v.id.0)
            .max()
            .unwrap_or(0);
        self.next_visualization.fetch_max(max_id + 1, Ordering::SeqCst);
        if let (Some(id), Ok(mut queries)) = (query.id, self.queries.lock()) {
            queries.insert(id, query.clone());
        }
        self
    }

    /// Makes every write fail with the given message.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Number of successful writes.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// The stored copy of a query.
    pub fn get(&self, id: QueryId) -> Option<Query> {
        self.queries.lock().ok()?.get(&id).cloned()
    }

    fn check_writable(&self) -> Result<()> {
        match &self.failure {
            Some(message) => Err(QueryViewError::store(message.clone())),
            None => Ok(()),
        }
    }

    fn queries(&self) -> Result<MutexGuard<'_, HashMap<QueryId, Query>>> {
        self.queries
            .lock()
            .map_err(|_| QueryViewError::internal("query store poisoned"))
    }

    fn saved(&self) {
        self.saves.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for MemoryQueryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryStore for MemoryQueryStore {
    async fn save_query(&self, query: &Query) -> Result<Query> {
        self.check_writable()?;
        let id = query
            .id
            .ok_or_else(|| QueryViewError::store("Cannot save an unsaved query"))?;

        let mut queries = self.queries()?;
        // Visualizations are stored through their own calls.
        let stored = match queries.get(&id) {
            Some(existing) => Query {
                visualizations: existing.visualizations.clone(),
                ..query.clone()
            },
            None => query.clone(),
        };
        queries.insert(id, stored.clone());
        self.saved();
        debug!(query = %id, "Query saved");
        Ok(stored)
    }

    async fn create_visualization(
        &self,
        query: &Query,
        kind: &str,
        name: &str,
    ) -> Result<Visualization> {
        self.check_writable()?;
        let id = VisualizationId(self.next_visualization.fetch_add(1, Ordering::SeqCst));
        let visualization = Visualization::new(id, kind, name);

        if let Some(query_id) = query.id {
            let mut queries = self.queries()?;
            let entry = queries.entry(query_id).or_insert_with(|| query.clone());
            *entry = entry.with_visualization(visualization.clone());
        }
        self.saved();
        debug!(visualization = %id, "Visualization created");
        Ok(visualization)
    }

    async fn update_visualization(&self, visualization: &Visualization) -> Result<Visualization> {
        self.check_writable()?;
        let mut queries = self.queries()?;
        if let Some(query) = queries
            .values_mut()
            .find(|q| q.has_visualization(visualization.id))
        {
            *query = query.with_visualization(visualization.clone());
        }
        self.saved();
        Ok(visualization.clone())
    }

    async fn delete_visualization(&self, id: VisualizationId) -> Result<()> {
        self.check_writable()?;
        let mut queries = self.queries()?;
        for query in queries.values_mut() {
            if let Some(next) = query.without_visualization(id) {
                *query = next;
            }
        }
        self.saved();
        debug!(visualization = %id, "Visualization deleted");
        Ok(())
    }
}

/// Serves data sources from a fixed list, optionally after a delay.
pub struct StaticDataSourceProvider {
    sources: HashMap<DataSourceId, DataSource>,
    delay: Duration,
}

impl StaticDataSourceProvider {
    pub fn new(sources: impl IntoIterator<Item = DataSource>) -> Self {
        Self {
            sources: sources.into_iter().map(|s| (s.id, s)).collect(),
            delay: Duration::ZERO,
        }
    }

    /// Delays every lookup, to exercise the pending state.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl DataSourceProvider for StaticDataSourceProvider {
    async fn get(&self, id: DataSourceId) -> Result<DataSource> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.sources
            .get(&id)
            .cloned()
            .ok_or_else(|| QueryViewError::store(format!("Data source {id} not found")))
    }
}
