//! Drives a repository change end to end: ask an analysis service for file
//! changes, commit them to a new branch, and open a pull request.

pub mod api;
pub mod config;
pub mod error;
pub mod platform;
pub mod server;
pub mod shutdown;
pub mod workflow;
