//! queryview - execution orchestration for a saved-query page.
//!
//! The core is [`view::QueryView`], a synchronous state machine that gates
//! execution requests, tracks the result lifecycle and keeps the selected
//! visualization consistent. [`session`] wraps it in an actor that owns the
//! asynchronous side effects, and [`headless`] drives a session from a
//! script.

pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod headless;
pub mod logging;
pub mod model;
pub mod parameters;
pub mod session;
pub mod store;
pub mod view;

pub use config::{Config, ExecutionSettings};
pub use error::{GateRejection, QueryViewError, Result};
pub use session::{QueryViewActor, QueryViewHandle};
pub use view::{ExecuteOptions, QueryView, ViewEvent, ViewSnapshot};
