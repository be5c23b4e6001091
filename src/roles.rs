use serde::{Deserialize, Serialize};

/// Fixed role set. Roles are not ordered: every capability is an explicit
/// membership test, never a numeric comparison.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Creator,
    Support,
    Admin,
}

impl Role {
    pub fn from_str(role: &str) -> Self {
        match role {
            "creator" => Role::Creator,
            "support" => Role::Support,
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Creator => "creator",
            Role::Support => "support",
            Role::Admin => "admin",
        }
    }

    pub fn can_delete_comments(&self) -> bool {
        matches!(self, Role::Support | Role::Creator | Role::Admin)
    }

    pub fn can_block_users(&self) -> bool {
        matches!(self, Role::Creator | Role::Admin)
    }

    pub fn can_manage_roles(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// Account lifecycle state. Governs whether tokens may be minted for or
/// accepted from an identity; re-checked against the store on every
/// protected call rather than cached in the token.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    PendingVerification,
    Blocked,
    Deleted,
}
