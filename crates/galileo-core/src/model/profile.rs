use serde::{Deserialize, Serialize};

/// A backend user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub userid: String,
    pub username: String,
    /// Machines owned by this user.
    pub mids: Vec<String>,
}
