//! Restriction status parsing and authorization.
//!
//! A document status is either empty (public), `DELETED`, or a restriction of
//! the form `type: value`. A bare value is treated as `status: value`.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Status marking a soft-deleted document.
pub const DELETED_STATUS: &str = "DELETED";

static STATUS_PARSER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^(email|group|egroup|role|firerole|status):\s*(.*)$").unwrap()
});

/// Kind of restriction encoded in a status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    Email,
    Group,
    Egroup,
    Role,
    Firerole,
    Status,
}

/// Split a status into its restriction type and value.
pub fn parse_status(status: &str) -> (AuthType, String) {
    let Some(caps) = STATUS_PARSER.captures(status) else {
        return (AuthType::Status, status.to_string());
    };
    let auth_type = match caps[1].to_ascii_lowercase().as_str() {
        "email" => AuthType::Email,
        "group" => AuthType::Group,
        "egroup" => AuthType::Egroup,
        "role" => AuthType::Role,
        "firerole" => AuthType::Firerole,
        _ => AuthType::Status,
    };
    (auth_type, caps[2].to_string())
}

/// Identity of the user asking for a file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserInfo {
    pub email: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub superadmin: bool,
}

impl UserInfo {
    pub fn guest() -> Self {
        Self::default()
    }
}

/// Decides whether a user may access a restricted document.
///
/// Returns `(0, "")` when access is granted and a positive code with a
/// message otherwise.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, user: &UserInfo, auth_type: AuthType, value: &str) -> (i32, String);
}

/// Check `status` for `user`, delegating restricted statuses to `authorizer`.
pub fn check_bibdoc_authorization(
    authorizer: &dyn Authorizer,
    user: &UserInfo,
    status: &str,
) -> (i32, String) {
    if status.is_empty() || user.superadmin {
        return (0, String::new());
    }
    let (auth_type, value) = parse_status(status);
    authorizer.authorize(user, auth_type, &value)
}

/// Authorizer backed by the user's own groups and roles.
///
/// `status` restrictions are granted to the roles listed for that status.
/// `firerole` definitions are not evaluated and always deny.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalAuthorizer {
    #[serde(default)]
    pub status_roles: HashMap<String, Vec<String>>,
}

impl Authorizer for LocalAuthorizer {
    fn authorize(&self, user: &UserInfo, auth_type: AuthType, value: &str) -> (i32, String) {
        match auth_type {
            AuthType::Email => {
                if value.trim().eq_ignore_ascii_case(user.email.trim()) {
                    (0, String::new())
                } else {
                    (1, format!("You must be {:?} in order to access this document", value))
                }
            }
            AuthType::Group | AuthType::Egroup => {
                if user.groups.iter().any(|g| g == value) {
                    (0, String::new())
                } else {
                    (
                        1,
                        format!("You must be member of the group {:?} in order to access this document", value),
                    )
                }
            }
            AuthType::Role => {
                if user.roles.iter().any(|r| r == value) {
                    (0, String::new())
                } else {
                    (
                        1,
                        format!("You must be member in the role {:?} in order to access this document", value),
                    )
                }
            }
            AuthType::Status => {
                let allowed = self
                    .status_roles
                    .get(value)
                    .is_some_and(|roles| roles.iter().any(|r| user.roles.contains(r)));
                if allowed {
                    (0, String::new())
                } else {
                    (1, "You are not authorized to view this restricted document".to_string())
                }
            }
            AuthType::Firerole => (1, "You must be authorized in order to access this document".to_string()),
        }
    }
}

/// Grants everything. Useful for batch tools running as an administrator.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _user: &UserInfo, _auth_type: AuthType, _value: &str) -> (i32, String) {
        (0, String::new())
    }
}

/// Denies every restricted document.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyRestricted;

impl Authorizer for DenyRestricted {
    fn authorize(&self, _user: &UserInfo, _auth_type: AuthType, _value: &str) -> (i32, String) {
        (1, "This document is restricted".to_string())
    }
}
