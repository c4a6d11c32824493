//! Paperspace API payloads.

use serde::Deserialize;

/// Machine as reported by the control plane.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    /// Machine identifier, for example `psq1w2e3r`.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Public address, when one is assigned.
    #[serde(default)]
    pub public_ip: Option<String>,
}

impl Machine {
    /// Public address, ignoring blank values.
    #[must_use]
    pub fn public_address(&self) -> Option<&str> {
        self.public_ip
            .as_deref()
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
    }
}

/// Authenticated user.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct SessionUser {
    /// Account email address.
    pub email: String,
}

/// Team owning the API key.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct SessionTeam {
    /// Team identifier.
    pub id: String,
}

/// Result of `GET /auth/session`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct AuthSession {
    /// Authenticated user.
    pub user: SessionUser,
    /// Team owning the key.
    pub team: SessionTeam,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct MachinePage {
    pub(super) items: Vec<Machine>,
    #[serde(default)]
    pub(super) has_more: bool,
    #[serde(default)]
    pub(super) next_page: Option<String>,
}

impl MachinePage {
    pub(super) fn next_cursor(&self) -> Option<&str> {
        if !self.has_more {
            return None;
        }
        self.next_page
            .as_deref()
            .filter(|cursor| !cursor.trim().is_empty())
    }
}
