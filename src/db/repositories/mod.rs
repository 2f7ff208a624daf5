//! Database repositories
//!
//! Repositories handle all direct database interactions.

pub mod assignment_repo;
pub mod judgement_repo;
pub mod language_repo;
pub mod submission_repo;

pub use assignment_repo::AssignmentRepository;
pub use judgement_repo::JudgementRepository;
pub use language_repo::LanguageRepository;
pub use submission_repo::SubmissionRepository;
