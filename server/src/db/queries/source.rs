use sqlx::SqlitePool;

use crate::db::models::{
    ChannelRolePermissionRow, RoleRow, UserAccountRow, UserRoleRow, UserRow,
};

/// Every user with presence and chosen display account.
pub async fn list_users(pool: &SqlitePool) -> Result<Vec<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>("SELECT id, online_status, display_account FROM users")
        .fetch_all(pool)
        .await
}

/// Every linked account of every user.
pub async fn list_user_accounts(pool: &SqlitePool) -> Result<Vec<UserAccountRow>, sqlx::Error> {
    sqlx::query_as::<_, UserAccountRow>(
        "SELECT user_id, account_type, display_name FROM user_accounts",
    )
    .fetch_all(pool)
    .await
}

/// Every claimed assignment of a role that has not been deleted.
pub async fn list_claimed_user_roles(pool: &SqlitePool) -> Result<Vec<UserRoleRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRoleRow>(
        "SELECT ur.user_id, ur.role_id \
         FROM user_roles ur \
         JOIN roles r ON r.id = ur.role_id \
         WHERE ur.claimed = 1 AND r.deleted_at IS NULL",
    )
    .fetch_all(pool)
    .await
}

/// Every role that has not been deleted.
pub async fn list_live_roles(pool: &SqlitePool) -> Result<Vec<RoleRow>, sqlx::Error> {
    sqlx::query_as::<_, RoleRow>(
        "SELECT id, community_id, title, role_type FROM roles WHERE deleted_at IS NULL",
    )
    .fetch_all(pool)
    .await
}

/// Every channel grant whose role has not been deleted.
pub async fn list_channel_role_permissions(
    pool: &SqlitePool,
) -> Result<Vec<ChannelRolePermissionRow>, sqlx::Error> {
    sqlx::query_as::<_, ChannelRolePermissionRow>(
        "SELECT p.community_id, p.channel_id, p.role_id, p.permissions \
         FROM channel_role_permissions p \
         JOIN roles r ON r.id = p.role_id \
         WHERE r.deleted_at IS NULL",
    )
    .fetch_all(pool)
    .await
}
