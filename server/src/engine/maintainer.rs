use std::collections::{HashMap, HashSet};

use tracing::{debug, error, info, warn};

use super::events::ChangeEvent;
use super::identity::CompactId;
use super::member_sets::{ChannelMemberSet, CommunityMemberSet};
use super::roles::{ChannelPermissions, ChannelRoleBuckets, RoleRecord};
use super::state::{OnlineStatus, UserRecord};
use super::view::MemberView;

/// Communities and channels whose member sets changed during a batch.
#[derive(Debug, Default)]
pub struct Touched {
    communities: HashSet<CompactId>,
    channels: HashMap<CompactId, HashSet<CompactId>>,
}

impl Touched {
    fn community(&mut self, community_id: CompactId) {
        self.communities.insert(community_id);
    }

    fn channel(&mut self, community_id: CompactId, channel_id: CompactId) {
        self.channels.entry(community_id).or_default().insert(channel_id);
    }

    fn channel_count(&self) -> usize {
        self.channels.values().map(HashSet::len).sum()
    }
}

/// Summary of one applied batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    pub events: usize,
    pub communities_rebuilt: usize,
    pub channels_rebuilt: usize,
}

impl MemberView {
    /// Apply a drained batch in arrival order, then regenerate the sorted
    /// cache of every community and channel the batch touched.
    pub fn apply_batch(&mut self, events: Vec<ChangeEvent>) -> BatchOutcome {
        let mut touched = Touched::default();
        let event_count = events.len();

        for event in events {
            debug!(kind = event.kind(), "applying change event");
            self.apply_event(event, &mut touched);
        }

        for community_id in &touched.communities {
            self.rebuild_community_list(*community_id);
        }
        for (community_id, channel_ids) in &touched.channels {
            for channel_id in channel_ids {
                self.rebuild_channel_list(*community_id, *channel_id);
            }
        }

        BatchOutcome {
            events: event_count,
            communities_rebuilt: touched.communities.len(),
            channels_rebuilt: touched.channel_count(),
        }
    }

    fn apply_event(&mut self, event: ChangeEvent, touched: &mut Touched) {
        match event {
            ChangeEvent::UserData {
                user_id,
                status,
                display_name,
            } => self.apply_user_data(user_id, status, display_name, touched),
            ChangeEvent::UserRole {
                user_id,
                role_id,
                granted,
            } => self.apply_user_role(user_id, role_id, granted, touched),
            ChangeEvent::Role {
                role_id,
                community_id,
                role,
                deleted,
            } => {
                if deleted {
                    self.apply_role_deleted(role_id, community_id, touched);
                } else {
                    self.apply_role_upsert(role_id, community_id, role, touched);
                }
            }
            ChangeEvent::ChannelPermission {
                community_id,
                channel_id,
                role_id,
                permissions,
            } => self.apply_channel_permission(community_id, channel_id, role_id, permissions, touched),
        }
    }

    fn apply_user_data(
        &mut self,
        user_id: CompactId,
        status: OnlineStatus,
        display_name: String,
        touched: &mut Touched,
    ) {
        let Some(user) = self.state.users.get_mut(&user_id) else {
            // A new user holds no roles yet, so no member set can change.
            self.state
                .users
                .insert(user_id, UserRecord::new(display_name, status));
            return;
        };
        let status_changed = user.status != status;
        user.status = status;
        let name_changed = user.set_display_name(display_name);
        if !status_changed && !name_changed {
            return;
        }

        for community_id in self.state.communities_of(user_id) {
            let moved = status_changed && self.reclassify_in_community(community_id, user_id);
            let listed = self
                .community_sets
                .get(&community_id)
                .is_some_and(|set| set.all.contains(&user_id));
            if moved || (name_changed && listed) {
                touched.community(community_id);
            }

            for channel_id in self.defined_channels(community_id) {
                let moved = status_changed && self.reclassify_in_channel(community_id, channel_id, user_id);
                let listed = self
                    .channel_set(community_id, channel_id)
                    .is_some_and(|set| set.all.contains(&user_id));
                if moved || (name_changed && listed) {
                    touched.channel(community_id, channel_id);
                }
            }
        }
    }

    fn apply_user_role(
        &mut self,
        user_id: CompactId,
        role_id: CompactId,
        granted: bool,
        touched: &mut Touched,
    ) {
        let Some(community_id) = self.state.community_by_role.get(&role_id).copied() else {
            warn!(user_id = %user_id, role_id = %role_id, granted, "community not found for role, dropping event");
            return;
        };

        if granted {
            self.state.grant(user_id, role_id);
        } else {
            self.state.revoke(user_id, role_id);
        }

        if self.state.member_role_of(community_id) == Some(role_id) {
            if !self.community_sets.contains_key(&community_id) {
                error!(community_id = %community_id, "member set missing for community with member role");
            } else if self.reclassify_in_community(community_id, user_id) {
                touched.community(community_id);
            }
        }

        for channel_id in self.defined_channels(community_id) {
            if self.reclassify_in_channel(community_id, channel_id, user_id) {
                touched.channel(community_id, channel_id);
            }
        }
    }

    fn apply_role_upsert(
        &mut self,
        role_id: CompactId,
        community_id: CompactId,
        role: RoleRecord,
        touched: &mut Touched,
    ) {
        let is_member_role = role.is_member_role();
        let roles = self.state.community_roles.entry(community_id).or_default();
        let previous = roles.insert(role_id, role);
        let was_member_role = previous.as_ref().is_some_and(RoleRecord::is_member_role);
        if previous.is_none() {
            self.state.community_by_role.insert(role_id, community_id);
            self.state.role_holders.entry(role_id).or_default();
        }
        if is_member_role == was_member_role {
            return;
        }

        if !self.community_sets.contains_key(&community_id) {
            if !is_member_role {
                return;
            }
            self.community_sets
                .insert(community_id, CommunityMemberSet::default());
            info!(community_id = %community_id, "member role established, member list initialised");
        }
        touched.community(community_id);

        // Membership now follows a different role: re-derive everyone it
        // may have gained or lost.
        let mut affected: HashSet<CompactId> = self
            .community_sets
            .get(&community_id)
            .map(|set| set.all.clone())
            .unwrap_or_default();
        if let Some(holders) = self.state.role_holders.get(&role_id) {
            affected.extend(holders.iter().copied());
        }
        for user_id in affected {
            self.reclassify_in_community(community_id, user_id);
        }
    }

    fn apply_role_deleted(&mut self, role_id: CompactId, community_id: CompactId, touched: &mut Touched) {
        let removed = self
            .state
            .community_roles
            .get_mut(&community_id)
            .and_then(|roles| roles.remove(&role_id));
        if removed.is_none() {
            error!(community_id = %community_id, role_id = %role_id, "deleted role missing from its community's roles");
        }
        let was_member_role = removed.as_ref().is_some_and(RoleRecord::is_member_role);

        self.state.community_by_role.remove(&role_id);
        let holders = self.state.role_holders.remove(&role_id).unwrap_or_default();
        for user_id in &holders {
            if let Some(user) = self.state.users.get_mut(user_id) {
                user.role_ids.remove(&role_id);
            }
        }

        if was_member_role {
            if let Some(set) = self.community_sets.get_mut(&community_id) {
                set.clear();
                touched.community(community_id);
            }
        }

        for channel_id in self.defined_channels(community_id) {
            let referenced = self
                .state
                .channel_buckets
                .get_mut(&community_id)
                .and_then(|channels| channels.get_mut(&channel_id))
                .is_some_and(|buckets| {
                    let referenced = buckets.references(role_id);
                    buckets.remove_role(role_id);
                    referenced
                });
            if !referenced {
                continue;
            }
            for user_id in &holders {
                if self.reclassify_in_channel(community_id, channel_id, *user_id) {
                    touched.channel(community_id, channel_id);
                }
            }
        }
    }

    fn apply_channel_permission(
        &mut self,
        community_id: CompactId,
        channel_id: CompactId,
        role_id: CompactId,
        permissions: ChannelPermissions,
        touched: &mut Touched,
    ) {
        if self.state.community_by_role.get(&role_id) != Some(&community_id) {
            warn!(
                community_id = %community_id,
                channel_id = %channel_id,
                role_id = %role_id,
                "role does not belong to community, dropping channel permission event"
            );
            return;
        }

        let defined = self
            .state
            .channel_buckets
            .get(&community_id)
            .is_some_and(|channels| channels.contains_key(&channel_id));
        if !defined && !self.define_channel(community_id, channel_id, touched) {
            return;
        }

        if let Some(buckets) = self
            .state
            .channel_buckets
            .get_mut(&community_id)
            .and_then(|channels| channels.get_mut(&channel_id))
        {
            buckets.assign(role_id, permissions);
        }

        let holders: Vec<CompactId> = self
            .state
            .role_holders
            .get(&role_id)
            .map(|h| h.iter().copied().collect())
            .unwrap_or_default();
        for user_id in holders {
            if self.reclassify_in_channel(community_id, channel_id, user_id) {
                touched.channel(community_id, channel_id);
            }
        }
    }

    /// Establish a channel's bucket definition and an empty member set,
    /// seating the holders of the community's admin role.
    fn define_channel(&mut self, community_id: CompactId, channel_id: CompactId, touched: &mut Touched) -> bool {
        let Some(admin_role) = self.state.admin_role_of(community_id) else {
            warn!(
                community_id = %community_id,
                channel_id = %channel_id,
                "admin role not found, dropping channel permission event"
            );
            return false;
        };

        self.state
            .channel_buckets
            .entry(community_id)
            .or_default()
            .insert(channel_id, ChannelRoleBuckets::new(admin_role));
        self.channel_sets
            .entry(community_id)
            .or_default()
            .insert(channel_id, ChannelMemberSet::default());
        touched.channel(community_id, channel_id);
        info!(community_id = %community_id, channel_id = %channel_id, "channel bucket definition created");

        let admins: Vec<CompactId> = self
            .state
            .role_holders
            .get(&admin_role)
            .map(|h| h.iter().copied().collect())
            .unwrap_or_default();
        for user_id in admins {
            self.reclassify_in_channel(community_id, channel_id, user_id);
        }
        true
    }
}
