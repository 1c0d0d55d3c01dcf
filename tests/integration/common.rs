//! Shared fixtures for integration tests.

use queryview::config::ExecutionSettings;
use queryview::execution::MockExecutionBackend;
use queryview::model::{DataSource, DataSourceId, Query};
use queryview::store::{MemoryQueryStore, StaticDataSourceProvider};
use queryview::view::{Capabilities, QueryView};
use queryview::{QueryViewActor, QueryViewHandle};
use std::sync::Arc;

pub fn warehouse() -> DataSource {
    DataSource {
        id: DataSourceId(1),
        name: "warehouse".to_string(),
        kind: "pg".to_string(),
        url: None,
        view_only: false,
        paused: false,
    }
}

/// A demo-query view whose data source has already resolved.
pub fn resolved_view(settings: ExecutionSettings) -> QueryView {
    let mut view = QueryView::new(Arc::new(Query::demo()), Capabilities::default(), settings);
    view.resolve_data_source(Ok(warehouse()));
    view
}

/// Everything a session needs, with knobs for the parts tests vary.
pub struct SessionBuilder {
    pub backend: MockExecutionBackend,
    pub settings: ExecutionSettings,
    pub capabilities: Capabilities,
    pub store: MemoryQueryStore,
    pub data_sources: StaticDataSourceProvider,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            backend: MockExecutionBackend::new(),
            settings: ExecutionSettings::default(),
            capabilities: Capabilities::default(),
            store: MemoryQueryStore::new().with_query(&Query::demo()),
            data_sources: StaticDataSourceProvider::new(vec![warehouse()]),
        }
    }

    pub fn start(self) -> QueryViewHandle {
        self.start_with_backend().0
    }

    /// Starts the session and keeps a handle on the backend for inspection.
    pub fn start_with_backend(self) -> (QueryViewHandle, Arc<MockExecutionBackend>) {
        let view = QueryView::new(Arc::new(Query::demo()), self.capabilities, self.settings);
        let backend = Arc::new(self.backend);
        let (handle, _task) = QueryViewActor::spawn(
            view,
            backend.clone(),
            Arc::new(self.store),
            Arc::new(self.data_sources),
        );
        (handle, backend)
    }
}
