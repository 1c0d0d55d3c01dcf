//! View state of a saved query page.
//!
//! `QueryView` is the single owner of parameters, execution lifecycle and
//! visualization selection. Everything else here is a projection of it.

pub mod events;
pub mod facade;
pub mod flags;
pub mod result_view;
pub mod snapshot;
pub mod visualization;

pub use events::ViewEvent;
pub use facade::{ExecuteOptions, QueryView};
pub use flags::{Capabilities, DataSourceState, QueryFlags};
pub use result_view::ResultView;
pub use snapshot::{ViewSnapshot, VisualizationSummary};
pub use visualization::VisualizationSelector;
