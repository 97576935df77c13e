//! Profile of the current user, returned by `GET /v1/me`.
//!
//! Only requested to verify that the access token works.

use serde::Deserialize;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: String,

    /// `null` for accounts that never set one
    #[serde(default)]
    pub display_name: Option<String>,
}

impl User {
    #[must_use]
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }
}
