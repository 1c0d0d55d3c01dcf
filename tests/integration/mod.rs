//! Integration tests for queryview.

pub mod common;
pub mod headless_test;
pub mod scenarios_test;
pub mod session_test;
