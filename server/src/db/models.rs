use serde::{Deserialize, Serialize};

/// A user row, without linked accounts.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub online_status: String,
    pub display_account: Option<String>,
}

/// An external account linked to a user.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserAccountRow {
    pub user_id: String,
    pub account_type: String,
    pub display_name: String,
}

/// A claimed user-to-role assignment.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRoleRow {
    pub user_id: String,
    pub role_id: String,
}

/// A live (not deleted) role of a community.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RoleRow {
    pub id: String,
    pub community_id: String,
    pub title: String,
    pub role_type: String,
}

/// The grants of one role in one channel. `permissions` is a JSON array.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChannelRolePermissionRow {
    pub community_id: String,
    pub channel_id: String,
    pub role_id: String,
    pub permissions: String,
}
