use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::identity::CompactId;
use super::roles::{ChannelRoleBuckets, RoleRecord};

/// Presence as reported by the source store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnlineStatus {
    Online,
    Away,
    Dnd,
    Invisible,
    Offline,
}

impl OnlineStatus {
    /// Everything but `offline` counts as online for member lists.
    pub fn is_online(self) -> bool {
        self != Self::Offline
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "online" => Some(Self::Online),
            "away" => Some(Self::Away),
            "dnd" => Some(Self::Dnd),
            "invisible" => Some(Self::Invisible),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }
}

/// An external account linked to a user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedAccount {
    pub display_name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Resolve the name shown in member lists: the display name of the linked
/// account matching the user's chosen display account, or empty.
pub fn resolve_display_name(display_account: Option<&str>, accounts: &[LinkedAccount]) -> String {
    display_account
        .and_then(|kind| accounts.iter().find(|a| a.kind == kind))
        .map(|a| a.display_name.clone())
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub role_ids: HashSet<CompactId>,
    pub status: OnlineStatus,
    pub display_name: String,
    pub display_name_lower: String,
}

impl UserRecord {
    pub fn new(display_name: String, status: OnlineStatus) -> Self {
        let display_name_lower = display_name.to_lowercase();
        Self {
            role_ids: HashSet::new(),
            status,
            display_name,
            display_name_lower,
        }
    }

    /// Placeholder for a user first seen through a role change.
    pub fn unseen() -> Self {
        Self::new(String::new(), OnlineStatus::Offline)
    }

    /// Returns whether the name actually changed.
    pub fn set_display_name(&mut self, display_name: String) -> bool {
        if self.display_name == display_name {
            return false;
        }
        self.display_name_lower = display_name.to_lowercase();
        self.display_name = display_name;
        true
    }

    pub fn is_online(&self) -> bool {
        self.status.is_online()
    }
}

/// Canonical indices mirrored from the source store.
///
/// Only the maintainer and the bootstrap loader mutate this.
#[derive(Debug, Default)]
pub struct BaseState {
    pub users: HashMap<CompactId, UserRecord>,
    /// Role id -> ids of the users holding it.
    pub role_holders: HashMap<CompactId, HashSet<CompactId>>,
    pub community_by_role: HashMap<CompactId, CompactId>,
    /// Community id -> its roles, ordered by key so role lists are stable.
    pub community_roles: HashMap<CompactId, BTreeMap<CompactId, RoleRecord>>,
    /// Community id -> channel id -> bucket definition.
    pub channel_buckets: HashMap<CompactId, HashMap<CompactId, ChannelRoleBuckets>>,
}

impl BaseState {
    pub fn member_role_of(&self, community_id: CompactId) -> Option<CompactId> {
        self.community_roles
            .get(&community_id)?
            .iter()
            .find(|(_, role)| role.is_member_role())
            .map(|(role_id, _)| *role_id)
    }

    pub fn admin_role_of(&self, community_id: CompactId) -> Option<CompactId> {
        self.community_roles
            .get(&community_id)?
            .iter()
            .find(|(_, role)| role.is_admin_role())
            .map(|(role_id, _)| *role_id)
    }

    pub fn role(&self, community_id: CompactId, role_id: CompactId) -> Option<&RoleRecord> {
        self.community_roles.get(&community_id)?.get(&role_id)
    }

    pub fn is_community_member(&self, community_id: CompactId, user_id: CompactId) -> bool {
        match (self.member_role_of(community_id), self.users.get(&user_id)) {
            (Some(member_role), Some(user)) => user.role_ids.contains(&member_role),
            _ => false,
        }
    }

    /// Record that `user_id` holds `role_id`. Idempotent.
    pub fn grant(&mut self, user_id: CompactId, role_id: CompactId) {
        self.users
            .entry(user_id)
            .or_insert_with(UserRecord::unseen)
            .role_ids
            .insert(role_id);
        self.role_holders.entry(role_id).or_default().insert(user_id);
    }

    /// Record that `user_id` no longer holds `role_id`. Idempotent.
    pub fn revoke(&mut self, user_id: CompactId, role_id: CompactId) {
        if let Some(user) = self.users.get_mut(&user_id) {
            user.role_ids.remove(&role_id);
        }
        if let Some(holders) = self.role_holders.get_mut(&role_id) {
            holders.remove(&user_id);
        }
    }

    /// Role ids of `community_id` held by `user_id`, in the community's role order.
    pub fn community_role_ids_of(&self, community_id: CompactId, user_id: CompactId) -> Vec<CompactId> {
        match (self.community_roles.get(&community_id), self.users.get(&user_id)) {
            (Some(roles), Some(user)) => roles
                .keys()
                .filter(|role_id| user.role_ids.contains(role_id))
                .copied()
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Communities in which the user holds at least one role.
    pub fn communities_of(&self, user_id: CompactId) -> HashSet<CompactId> {
        let Some(user) = self.users.get(&user_id) else {
            return HashSet::new();
        };
        user.role_ids
            .iter()
            .filter_map(|role_id| self.community_by_role.get(role_id).copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::roles::RoleKind;

    fn id(n: u8) -> CompactId {
        CompactId::from_bytes([n; 16])
    }

    fn account(kind: &str, name: &str) -> LinkedAccount {
        LinkedAccount {
            display_name: name.into(),
            kind: kind.into(),
        }
    }

    #[test]
    fn test_display_name_uses_selected_account() {
        let accounts = vec![account("twitter", "alice_tw"), account("cg", "Alice")];
        assert_eq!(resolve_display_name(Some("cg"), &accounts), "Alice");
        assert_eq!(resolve_display_name(Some("twitter"), &accounts), "alice_tw");
    }

    #[test]
    fn test_display_name_empty_without_match() {
        let accounts = vec![account("twitter", "alice_tw")];
        assert_eq!(resolve_display_name(None, &accounts), "");
        assert_eq!(resolve_display_name(Some("lukso"), &accounts), "");
    }

    #[test]
    fn test_online_status_partition() {
        for s in [
            OnlineStatus::Online,
            OnlineStatus::Away,
            OnlineStatus::Dnd,
            OnlineStatus::Invisible,
        ] {
            assert!(s.is_online(), "{s:?} should count as online");
        }
        assert!(!OnlineStatus::Offline.is_online());
        assert_eq!(OnlineStatus::parse("dnd"), Some(OnlineStatus::Dnd));
        assert_eq!(OnlineStatus::parse("busy"), None);
    }

    #[test]
    fn test_set_display_name_tracks_lowercase() {
        let mut user = UserRecord::new("Alice".into(), OnlineStatus::Online);
        assert_eq!(user.display_name_lower, "alice");
        assert!(!user.set_display_name("Alice".into()));
        assert!(user.set_display_name("ALICIA".into()));
        assert_eq!(user.display_name_lower, "alicia");
    }

    #[test]
    fn test_grant_creates_unseen_user_and_is_idempotent() {
        let mut state = BaseState::default();
        state.grant(id(1), id(10));
        state.grant(id(1), id(10));
        let user = &state.users[&id(1)];
        assert_eq!(user.role_ids.len(), 1);
        assert_eq!(user.status, OnlineStatus::Offline);
        assert_eq!(state.role_holders[&id(10)].len(), 1);

        state.revoke(id(1), id(10));
        state.revoke(id(1), id(10));
        assert!(state.users[&id(1)].role_ids.is_empty());
        assert!(state.role_holders[&id(10)].is_empty());
    }

    #[test]
    fn test_member_and_admin_role_lookup() {
        let mut state = BaseState::default();
        let roles = state.community_roles.entry(id(100)).or_default();
        roles.insert(id(1), RoleRecord::new("Admin", RoleKind::Predefined));
        roles.insert(id(2), RoleRecord::new("Member", RoleKind::Predefined));
        roles.insert(id(3), RoleRecord::new("Member", RoleKind::CustomManualAssign));

        assert_eq!(state.member_role_of(id(100)), Some(id(2)));
        assert_eq!(state.admin_role_of(id(100)), Some(id(1)));
        assert_eq!(state.member_role_of(id(101)), None);

        state.grant(id(50), id(3));
        assert!(!state.is_community_member(id(100), id(50)));
        state.grant(id(50), id(2));
        assert!(state.is_community_member(id(100), id(50)));
        assert_eq!(state.community_role_ids_of(id(100), id(50)), vec![id(2), id(3)]);
    }
}
