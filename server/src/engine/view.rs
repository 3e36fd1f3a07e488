use std::collections::HashMap;

use tracing::error;

use super::identity::CompactId;
use super::member_sets::{
    ChannelBucket, ChannelMemberList, ChannelMemberSet, CommunityMemberList, CommunityMemberSet,
};
use super::state::BaseState;

/// The complete in-memory projection: base indices, member sets and the
/// sorted caches derived from them.
#[derive(Debug, Default)]
pub struct MemberView {
    pub state: BaseState,
    pub(crate) community_sets: HashMap<CompactId, CommunityMemberSet>,
    pub(crate) community_lists: HashMap<CompactId, CommunityMemberList>,
    pub(crate) channel_sets: HashMap<CompactId, HashMap<CompactId, ChannelMemberSet>>,
    pub(crate) channel_lists: HashMap<CompactId, HashMap<CompactId, ChannelMemberList>>,
}

impl MemberView {
    pub fn community_set(&self, community_id: CompactId) -> Option<&CommunityMemberSet> {
        self.community_sets.get(&community_id)
    }

    pub fn community_list(&self, community_id: CompactId) -> Option<&CommunityMemberList> {
        self.community_lists.get(&community_id)
    }

    pub fn channel_set(&self, community_id: CompactId, channel_id: CompactId) -> Option<&ChannelMemberSet> {
        self.channel_sets.get(&community_id)?.get(&channel_id)
    }

    pub fn channel_list(&self, community_id: CompactId, channel_id: CompactId) -> Option<&ChannelMemberList> {
        self.channel_lists.get(&community_id)?.get(&channel_id)
    }

    /// Channels of `community_id` that have a bucket definition.
    pub fn defined_channels(&self, community_id: CompactId) -> Vec<CompactId> {
        self.state
            .channel_buckets
            .get(&community_id)
            .map(|channels| channels.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Re-derive the community placement of `user_id` from its roles and
    /// presence. Returns whether the member set changed.
    pub(crate) fn reclassify_in_community(&mut self, community_id: CompactId, user_id: CompactId) -> bool {
        let Some(set) = self.community_sets.get_mut(&community_id) else {
            return false;
        };
        let target = if self.state.is_community_member(community_id, user_id) {
            self.state.users.get(&user_id).map(|u| u.is_online())
        } else {
            None
        };
        set.place(user_id, target)
    }

    /// Re-derive the channel bucket of `user_id` from its roles, presence and
    /// the channel's bucket definition. Returns whether the channel set changed.
    pub(crate) fn reclassify_in_channel(
        &mut self,
        community_id: CompactId,
        channel_id: CompactId,
        user_id: CompactId,
    ) -> bool {
        let Some(buckets) = self
            .state
            .channel_buckets
            .get(&community_id)
            .and_then(|channels| channels.get(&channel_id))
        else {
            return false;
        };
        let target = self
            .state
            .users
            .get(&user_id)
            .and_then(|user| ChannelBucket::classify(buckets.best_rank(&user.role_ids), user.is_online()));
        let Some(set) = self
            .channel_sets
            .get_mut(&community_id)
            .and_then(|channels| channels.get_mut(&channel_id))
        else {
            error!(
                community_id = %community_id,
                channel_id = %channel_id,
                "channel member set missing for defined channel"
            );
            return false;
        };
        set.place(user_id, target)
    }

    /// Regenerate the sorted cache of one community from its member set.
    pub(crate) fn rebuild_community_list(&mut self, community_id: CompactId) {
        let Some(set) = self.community_sets.get(&community_id) else {
            error!(community_id = %community_id, "member set missing for touched community");
            return;
        };
        let list = CommunityMemberList::build(set, &self.state.users);
        self.community_lists.insert(community_id, list);
    }

    /// Regenerate the sorted cache of one channel from its member set.
    pub(crate) fn rebuild_channel_list(&mut self, community_id: CompactId, channel_id: CompactId) {
        let Some(set) = self.channel_set(community_id, channel_id) else {
            error!(
                community_id = %community_id,
                channel_id = %channel_id,
                "member set missing for touched channel"
            );
            return;
        };
        let list = ChannelMemberList::build(set, &self.state.users);
        self.channel_lists
            .entry(community_id)
            .or_default()
            .insert(channel_id, list);
    }
}
