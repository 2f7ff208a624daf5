//! Language model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Programming language a submission can be written in
///
/// Command templates may reference `{path}` (working directory),
/// `{srcfile}` (source file) and `{binfile}` (compiled artifact).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Language {
    pub id: Uuid,
    pub name: String,
    /// Extension used for default source filenames
    pub extension_src: String,
    /// Syntax highlighting hint for clients
    pub lexer_name: Option<String>,
    /// Container image for the docker sandbox
    pub image: String,
    pub compile_command: Option<String>,
    pub run_command: String,
    pub created_at: DateTime<Utc>,
}

impl Language {
    /// Interpreted languages have no compilation step
    pub fn needs_compilation(&self) -> bool {
        self.compile_command
            .as_deref()
            .is_some_and(|cmd| !cmd.trim().is_empty())
    }

    /// Name of the compiled artifact inside the working directory
    pub fn binary_name(&self) -> &'static str {
        "solution"
    }
}

/// Public language summary
#[derive(Debug, Clone, Serialize)]
pub struct LanguageSummary {
    pub id: Uuid,
    pub name: String,
    pub lexer_name: Option<String>,
}

impl From<&Language> for LanguageSummary {
    fn from(language: &Language) -> Self {
        Self {
            id: language.id,
            name: language.name.clone(),
            lexer_name: language.lexer_name.clone(),
        }
    }
}
