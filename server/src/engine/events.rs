use serde::Deserialize;
use uuid::Uuid;

use super::identity::{CompactId, encode};
use super::roles::{ChannelPermissions, RoleKind, RoleRecord};
use super::state::{LinkedAccount, OnlineStatus, resolve_display_name};

/// A change notification as published by the source store.
/// Identifiers are still in external form.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Notification {
    /// Presence or profile of a user changed (or the user was created).
    #[serde(rename_all = "camelCase")]
    UserDataChange {
        user_id: Uuid,
        online_status: OnlineStatus,
        #[serde(default)]
        display_account: Option<String>,
        #[serde(default)]
        accounts: Vec<LinkedAccount>,
    },

    /// A user claimed or lost a role.
    #[serde(rename_all = "camelCase")]
    UserRoleChange {
        user_id: Uuid,
        role_id: Uuid,
        has_role: bool,
    },

    /// A role was created, updated or deleted.
    #[serde(rename_all = "camelCase")]
    RoleChange {
        role_id: Uuid,
        community_id: Uuid,
        title: String,
        role_type: RoleKind,
        #[serde(default)]
        deleted: bool,
    },

    /// The grants of one role in one channel were replaced.
    #[serde(rename_all = "camelCase")]
    ChannelRolePermissionChange {
        community_id: Uuid,
        channel_id: Uuid,
        role_id: Uuid,
        permissions: ChannelPermissions,
    },
}

/// A change event in internal form, queued for the maintainer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    UserData {
        user_id: CompactId,
        status: OnlineStatus,
        display_name: String,
    },
    UserRole {
        user_id: CompactId,
        role_id: CompactId,
        granted: bool,
    },
    Role {
        role_id: CompactId,
        community_id: CompactId,
        role: RoleRecord,
        deleted: bool,
    },
    ChannelPermission {
        community_id: CompactId,
        channel_id: CompactId,
        role_id: CompactId,
        permissions: ChannelPermissions,
    },
}

impl ChangeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UserData { .. } => "userdatachange",
            Self::UserRole { .. } => "userrolechange",
            Self::Role { .. } => "rolechange",
            Self::ChannelPermission { .. } => "channelrolepermissionchange",
        }
    }
}

impl From<Notification> for ChangeEvent {
    fn from(notification: Notification) -> Self {
        match notification {
            Notification::UserDataChange {
                user_id,
                online_status,
                display_account,
                accounts,
            } => Self::UserData {
                user_id: encode(user_id),
                status: online_status,
                display_name: resolve_display_name(display_account.as_deref(), &accounts),
            },
            Notification::UserRoleChange {
                user_id,
                role_id,
                has_role,
            } => Self::UserRole {
                user_id: encode(user_id),
                role_id: encode(role_id),
                granted: has_role,
            },
            Notification::RoleChange {
                role_id,
                community_id,
                title,
                role_type,
                deleted,
            } => Self::Role {
                role_id: encode(role_id),
                community_id: encode(community_id),
                role: RoleRecord::new(title, role_type),
                deleted,
            },
            Notification::ChannelRolePermissionChange {
                community_id,
                channel_id,
                role_id,
                permissions,
            } => Self::ChannelPermission {
                community_id: encode(community_id),
                channel_id: encode(channel_id),
                role_id: encode(role_id),
                permissions,
            },
        }
    }
}

/// Decode one raw payload into an internal event.
pub fn decode_notification(payload: &str) -> Result<ChangeEvent, serde_json::Error> {
    serde_json::from_str::<Notification>(payload).map(ChangeEvent::from)
}
