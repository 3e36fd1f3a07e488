use std::collections::{HashMap, HashSet};

use super::identity::CompactId;
use super::roles::ChannelRank;
use super::state::UserRecord;

/// Community membership, partitioned by presence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommunityMemberSet {
    pub all: HashSet<CompactId>,
    pub online: HashSet<CompactId>,
    pub offline: HashSet<CompactId>,
}

impl CommunityMemberSet {
    /// Put `user_id` where it belongs: `Some(is_online)` for a member,
    /// `None` to drop it. Returns whether anything moved.
    pub fn place(&mut self, user_id: CompactId, target: Option<bool>) -> bool {
        match target {
            None => {
                let was_member = self.all.remove(&user_id);
                self.online.remove(&user_id);
                self.offline.remove(&user_id);
                was_member
            }
            Some(true) => {
                let added = self.all.insert(user_id);
                let moved = self.offline.remove(&user_id);
                self.online.insert(user_id) || added || moved
            }
            Some(false) => {
                let added = self.all.insert(user_id);
                let moved = self.online.remove(&user_id);
                self.offline.insert(user_id) || added || moved
            }
        }
    }

    pub fn clear(&mut self) -> bool {
        let had_members = !self.all.is_empty();
        self.all.clear();
        self.online.clear();
        self.offline.clear();
        had_members
    }
}

/// One of the mutually exclusive groups of a channel member list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelBucket {
    Admin,
    Moderator,
    Writer,
    Reader,
    Offline,
}

impl ChannelBucket {
    /// Display order of a channel member list.
    pub const ORDER: [ChannelBucket; 5] = [
        ChannelBucket::Admin,
        ChannelBucket::Moderator,
        ChannelBucket::Writer,
        ChannelBucket::Reader,
        ChannelBucket::Offline,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Offline always wins; otherwise the rank decides. No rank, no bucket.
    pub fn classify(rank: Option<ChannelRank>, is_online: bool) -> Option<Self> {
        let rank = rank?;
        if !is_online {
            return Some(Self::Offline);
        }
        Some(match rank {
            ChannelRank::Admin => Self::Admin,
            ChannelRank::Moderator => Self::Moderator,
            ChannelRank::Writer => Self::Writer,
            ChannelRank::Reader => Self::Reader,
        })
    }
}

/// Channel membership, partitioned into the five buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMemberSet {
    pub all: HashSet<CompactId>,
    buckets: [HashSet<CompactId>; 5],
}

impl ChannelMemberSet {
    pub fn bucket(&self, bucket: ChannelBucket) -> &HashSet<CompactId> {
        &self.buckets[bucket.index()]
    }

    pub fn bucket_of(&self, user_id: CompactId) -> Option<ChannelBucket> {
        ChannelBucket::ORDER
            .into_iter()
            .find(|b| self.buckets[b.index()].contains(&user_id))
    }

    /// Move `user_id` into `target` (or out of the channel for `None`).
    /// Returns whether anything moved.
    pub fn place(&mut self, user_id: CompactId, target: Option<ChannelBucket>) -> bool {
        let current = self.bucket_of(user_id);
        if current == target && self.all.contains(&user_id) == target.is_some() {
            return false;
        }
        for set in &mut self.buckets {
            set.remove(&user_id);
        }
        match target {
            Some(bucket) => {
                self.all.insert(user_id);
                self.buckets[bucket.index()].insert(user_id);
            }
            None => {
                self.all.remove(&user_id);
            }
        }
        true
    }
}

/// Sort key of a member: lower-cased display name, then key for stability.
fn sorted_members(
    members: &HashSet<CompactId>,
    users: &HashMap<CompactId, UserRecord>,
) -> Vec<CompactId> {
    let mut ids: Vec<CompactId> = members.iter().copied().collect();
    ids.sort_by_cached_key(|id| {
        let name = users
            .get(id)
            .map(|u| u.display_name_lower.clone())
            .unwrap_or_default();
        (name, *id)
    });
    ids
}

/// Sorted snapshot of a community member set. Regenerated, never edited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommunityMemberList {
    pub count: usize,
    pub online: Vec<CompactId>,
    pub offline: Vec<CompactId>,
}

impl CommunityMemberList {
    pub fn build(set: &CommunityMemberSet, users: &HashMap<CompactId, UserRecord>) -> Self {
        Self {
            count: set.all.len(),
            online: sorted_members(&set.online, users),
            offline: sorted_members(&set.offline, users),
        }
    }

    /// Full ordered membership: online first, then offline.
    pub fn iter_all(&self) -> impl Iterator<Item = CompactId> + '_ {
        self.online.iter().chain(self.offline.iter()).copied()
    }
}

/// Sorted snapshot of a channel member set. Regenerated, never edited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMemberList {
    pub count: usize,
    buckets: [Vec<CompactId>; 5],
}

impl ChannelMemberList {
    pub fn build(set: &ChannelMemberSet, users: &HashMap<CompactId, UserRecord>) -> Self {
        Self {
            count: set.all.len(),
            buckets: ChannelBucket::ORDER.map(|b| sorted_members(set.bucket(b), users)),
        }
    }

    pub fn bucket(&self, bucket: ChannelBucket) -> &[CompactId] {
        &self.buckets[bucket.index()]
    }

    /// Full ordered membership in bucket rank order.
    pub fn iter_all(&self) -> impl Iterator<Item = (ChannelBucket, CompactId)> + '_ {
        ChannelBucket::ORDER
            .into_iter()
            .flat_map(move |b| self.buckets[b.index()].iter().map(move |id| (b, *id)))
    }
}
