//! Data source descriptor, resolved asynchronously after the page opens.

use serde::{Deserialize, Serialize};
use url::Url;

use super::DataSourceId;

/// Connection metadata for the data source a query runs against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub id: DataSourceId,

    pub name: String,

    /// Backend type, e.g. `pg` or `mysql`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Connection URL, if the backend is URL-addressed.
    #[serde(default)]
    pub url: Option<Url>,

    /// Members may view results but not edit queries against it.
    #[serde(default)]
    pub view_only: bool,

    /// Execution is suspended for this data source.
    #[serde(default)]
    pub paused: bool,
}

impl DataSource {
    /// Returns a display-safe string (no password) for UI purposes.
    pub fn display_string(&self) -> String {
        match &self.url {
            Some(url) => {
                let host = url.host_str().unwrap_or("localhost");
                let database = url.path().trim_start_matches('/');
                match url.port() {
                    Some(port) => format!("{} ({database} @ {host}:{port})", self.name),
                    None => format!("{} ({database} @ {host})", self.name),
                }
            }
            None => format!("{} ({})", self.name, self.kind),
        }
    }
}
