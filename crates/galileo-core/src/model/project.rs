use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A directory of user code that jobs are built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Owner.
    pub user_id: String,
    pub description: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: Option<DateTime<Utc>>,
}

/// One uploaded file of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFile {
    /// `/`-separated path relative to the project root.
    pub path: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}
