//! A running query view session.
//!
//! `QueryViewActor` owns the view and serializes every event through one
//! loop; `QueryViewHandle` is how hosts talk to it.

pub mod actor;
pub mod handle;
pub mod runners;

pub use actor::{QueryViewActor, ViewCommand};
pub use handle::QueryViewHandle;
pub use runners::RunnerRegistry;
