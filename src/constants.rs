//! Application-wide constants
//!
//! This module contains all constant values used throughout the application.
//! Constants are grouped by their purpose for better organization.

// =============================================================================
// SERVER DEFAULTS
// =============================================================================

/// Default server host address
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// Default server port
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default log filter when RUST_LOG is unset
pub const DEFAULT_LOG_FILTER: &str = "info";

// =============================================================================
// DATABASE DEFAULTS
// =============================================================================

/// Default maximum database connections in the pool
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 20;

// =============================================================================
// SANDBOX DEFAULTS
// =============================================================================

/// Default time limit for the compilation step in seconds
pub const DEFAULT_COMPILE_TIMEOUT_SECONDS: f64 = 30.0;

/// Default time limit for a single test run when neither the test nor the
/// assignment specifies one
pub const DEFAULT_TEST_TIMEOUT_SECONDS: f64 = 5.0;

/// Maximum captured bytes per output stream
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 64 * 1024;

/// Memory limit for sandbox containers in megabytes
pub const DEFAULT_MEMORY_LIMIT_MB: u64 = 256;

/// Process limit for sandbox containers
pub const SANDBOX_PIDS_LIMIT: i64 = 64;

/// Exit code reported by `timeout(1)` and used for our own timeouts
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Sandbox backend identifiers
pub mod sandbox_backends {
    pub const DOCKER: &str = "docker";
    pub const PROCESS: &str = "process";

    /// All supported backends
    pub const ALL: &[&str] = &[DOCKER, PROCESS];
}

/// Working directory inside sandbox containers
pub const CONTAINER_WORKDIR: &str = "/workspace";

// =============================================================================
// TEST I/O CHANNELS
// =============================================================================

/// Where a test feeds its input from
pub mod input_types {
    pub const STDIN: &str = "stdin";
    pub const FILE: &str = "file";
}

/// Where a test collects its output from
pub mod output_types {
    pub const STDOUT: &str = "stdout";
    pub const FILE: &str = "file";
}

/// Default file names used for file-based test I/O
pub const DEFAULT_INPUT_FILENAME: &str = "input.txt";
pub const DEFAULT_OUTPUT_FILENAME: &str = "output.txt";

// =============================================================================
// USER ROLES
// =============================================================================

/// User role identifiers
pub mod roles {
    pub const ADMIN: &str = "admin";
    pub const TEACHER: &str = "teacher";
    pub const STUDENT: &str = "student";

    /// All user roles
    pub const ALL: &[&str] = &[ADMIN, TEACHER, STUDENT];
}

// =============================================================================
// API VERSIONING
// =============================================================================

/// API base path
pub const API_BASE_PATH: &str = "/api/v1";

// =============================================================================
// RATE LIMITING
// =============================================================================

/// Rate limiting configuration
pub mod rate_limits {
    /// Submission actions - max requests
    pub const SUBMISSION_MAX_REQUESTS: i64 = 10;
    /// Submission actions - window in seconds
    pub const SUBMISSION_WINDOW_SECS: i64 = 60;

    /// General API - max requests
    pub const GENERAL_MAX_REQUESTS: i64 = 100;
    /// General API - window in seconds
    pub const GENERAL_WINDOW_SECS: i64 = 60;
}

// =============================================================================
// PAGINATION
// =============================================================================

/// Submissions shown per page in listings
pub const SUBMISSIONS_PER_PAGE: u32 = 10;

// =============================================================================
// VALIDATION
// =============================================================================

/// Maximum source code size in bytes (1 MB)
pub const MAX_SOURCE_CODE_SIZE: usize = 1024 * 1024;

/// Maximum filename length
pub const MAX_FILENAME_LENGTH: usize = 255;
