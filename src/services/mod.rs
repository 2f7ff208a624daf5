//! Business logic services

pub mod auth_service;
pub mod locks;
pub mod submission_service;

pub use auth_service::AuthService;
pub use locks::KeyedLocks;
pub use submission_service::{
    ActionOutcome, ActionStatus, ActionTarget, SubmissionInput, SubmissionService,
};
