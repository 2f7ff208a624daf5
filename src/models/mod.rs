//! Domain models
//!
//! This module contains all domain models used throughout the application.

pub mod assignment;
pub mod judgement;
pub mod language;
pub mod submission;
pub mod test_case;
pub mod test_run;

pub use assignment::*;
pub use judgement::*;
pub use language::*;
pub use submission::*;
pub use test_case::*;
pub use test_run::*;
