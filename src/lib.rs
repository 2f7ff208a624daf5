//! SAUCE Judge - Submission lifecycle service
//!
//! This library coordinates what happens to a student's submission for a
//! programming assignment: saving a draft, running the visible tests,
//! grading against every test exactly once, and resetting a draft.
//!
//! # Features
//!
//! - Per-test visibility: students only ever see output of visible tests
//! - Configurable output comparison (case, whitespace, sorting, numbers)
//! - Docker or local-process sandboxes, released on every exit path
//! - Transactional grading guarded by a per-student lock
//!
//! # Architecture
//!
//! The application follows a layered architecture:
//! - **Handlers**: HTTP request handlers (thin layer)
//! - **Services**: Submission lifecycle coordination
//! - **Runner**: Compilation, execution and output judging
//! - **Repositories**: Database access behind the `SubmissionStore` trait
//! - **Models**: Domain models

pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod runner;
pub mod services;
pub mod state;
pub mod utils;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, AppResult};
pub use state::AppState;
