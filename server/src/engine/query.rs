use tracing::error;

use super::identity::CompactId;
use super::member_sets::ChannelBucket;
use super::state::UserRecord;
use super::view::MemberView;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberListRequest {
    pub community_id: CompactId,
    pub offset: usize,
    pub limit: usize,
    pub search: Option<String>,
    pub role_id: Option<CompactId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMemberListRequest {
    pub community_id: CompactId,
    pub channel_id: CompactId,
    pub offset: usize,
    pub limit: usize,
    pub search: Option<String>,
    pub starts_with_search: bool,
}

/// A member in a window, with the community roles it currently holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberEntry {
    pub user_id: CompactId,
    pub role_ids: Vec<CompactId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleCount {
    pub role_id: CompactId,
    pub holders: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberListWindow {
    pub total_count: usize,
    /// Members matching the filter, or `total_count` when unfiltered.
    pub result_count: usize,
    pub roles: Vec<RoleCount>,
    pub online: Vec<MemberEntry>,
    pub offline: Vec<MemberEntry>,
}

impl MemberListWindow {
    pub fn len(&self) -> usize {
        self.online.len() + self.offline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMemberListWindow {
    /// Channel members, or matches when a search is given.
    pub count: usize,
    /// Per-bucket totals (matches only, when a search is given).
    pub bucket_counts: [usize; 5],
    buckets: [Vec<MemberEntry>; 5],
}

impl ChannelMemberListWindow {
    pub fn bucket(&self, bucket: ChannelBucket) -> &[MemberEntry] {
        &self.buckets[bucket.index()]
    }

    pub fn bucket_count(&self, bucket: ChannelBucket) -> usize {
        self.bucket_counts[bucket.index()]
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Remaining offset and limit while walking an ordered membership.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    offset: usize,
    limit: usize,
}

impl Cursor {
    fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// Consume one match. Returns whether it falls inside the window.
    fn admit(&mut self) -> bool {
        if self.offset > 0 {
            self.offset -= 1;
            false
        } else if self.limit > 0 {
            self.limit -= 1;
            true
        } else {
            false
        }
    }

    /// The part of a bucket of `len` entries that falls inside the window.
    fn slice(&mut self, len: usize) -> std::ops::Range<usize> {
        let start = self.offset.min(len);
        self.offset -= start;
        let take = (len - start).min(self.limit);
        self.limit -= take;
        start..start + take
    }
}

/// Text filter of a window, applied to lower-cased display names.
#[derive(Debug)]
enum NameFilter {
    Contains(String),
    StartsWith(String),
}

impl NameFilter {
    fn new(search: &str, prefix: bool) -> Self {
        let needle = search.to_lowercase();
        if prefix {
            Self::StartsWith(needle)
        } else {
            Self::Contains(needle)
        }
    }

    fn matches(&self, user: &UserRecord) -> bool {
        match self {
            Self::Contains(needle) => user.display_name_lower.contains(needle.as_str()),
            Self::StartsWith(needle) => user.display_name_lower.starts_with(needle.as_str()),
        }
    }
}

impl MemberView {
    fn entry(&self, community_id: CompactId, user_id: CompactId) -> Option<MemberEntry> {
        if !self.state.users.contains_key(&user_id) {
            error!(user_id = %user_id, "listed member has no user record");
            return None;
        }
        Some(MemberEntry {
            user_id,
            role_ids: self.state.community_role_ids_of(community_id, user_id),
        })
    }

    fn entries(&self, community_id: CompactId, ids: &[CompactId]) -> Vec<MemberEntry> {
        ids.iter()
            .filter_map(|user_id| self.entry(community_id, *user_id))
            .collect()
    }

    /// A window over a community's members, online first. `None` when the
    /// community has no member list.
    pub fn member_list_window(&self, request: &MemberListRequest) -> Option<MemberListWindow> {
        let community_id = request.community_id;
        let roles = self.state.community_roles.get(&community_id)?;
        let member_role = self.state.member_role_of(community_id)?;
        let list = self.community_list(community_id)?;
        let set = self.community_set(community_id)?;

        let total_count = self
            .state
            .role_holders
            .get(&member_role)
            .map_or(0, |holders| holders.len());
        let mut window = MemberListWindow {
            total_count,
            result_count: total_count,
            roles: roles
                .keys()
                .map(|role_id| RoleCount {
                    role_id: *role_id,
                    holders: self.state.role_holders.get(role_id).map_or(0, |h| h.len()),
                })
                .collect(),
            ..MemberListWindow::default()
        };

        let mut cursor = Cursor::new(request.offset, request.limit);
        if request.search.is_none() && request.role_id.is_none() {
            let online = cursor.slice(list.online.len());
            window.online = self.entries(community_id, &list.online[online]);
            let offline = cursor.slice(list.offline.len());
            window.offline = self.entries(community_id, &list.offline[offline]);
            return Some(window);
        }

        let filter = request.search.as_deref().map(|s| NameFilter::new(s, false));
        window.result_count = 0;
        for user_id in list.iter_all() {
            let Some(user) = self.state.users.get(&user_id) else {
                error!(user_id = %user_id, "listed member has no user record");
                continue;
            };
            if filter.as_ref().is_some_and(|f| !f.matches(user)) {
                continue;
            }
            if request.role_id.is_some_and(|role_id| !user.role_ids.contains(&role_id)) {
                continue;
            }
            window.result_count += 1;
            if !cursor.admit() {
                continue;
            }
            let Some(entry) = self.entry(community_id, user_id) else {
                continue;
            };
            if set.online.contains(&user_id) {
                window.online.push(entry);
            } else {
                window.offline.push(entry);
            }
        }
        Some(window)
    }

    /// A window over a channel's members in bucket rank order. `None` when
    /// the channel has no member list.
    pub fn channel_member_list_window(
        &self,
        request: &ChannelMemberListRequest,
    ) -> Option<ChannelMemberListWindow> {
        let community_id = request.community_id;
        let list = self.channel_list(community_id, request.channel_id)?;
        self.state.community_roles.get(&community_id)?;

        let mut window = ChannelMemberListWindow {
            count: list.count,
            bucket_counts: ChannelBucket::ORDER.map(|b| list.bucket(b).len()),
            ..ChannelMemberListWindow::default()
        };
        let mut cursor = Cursor::new(request.offset, request.limit);

        let Some(search) = request.search.as_deref() else {
            for bucket in ChannelBucket::ORDER {
                let ids = list.bucket(bucket);
                let range = cursor.slice(ids.len());
                window.buckets[bucket.index()] = self.entries(community_id, &ids[range]);
            }
            return Some(window);
        };

        let filter = NameFilter::new(search, request.starts_with_search);
        window.bucket_counts = [0; 5];
        for (bucket, user_id) in list.iter_all() {
            let Some(user) = self.state.users.get(&user_id) else {
                error!(user_id = %user_id, "listed member has no user record");
                continue;
            };
            if !filter.matches(user) {
                continue;
            }
            window.bucket_counts[bucket.index()] += 1;
            if cursor.admit() {
                if let Some(entry) = self.entry(community_id, user_id) {
                    window.buckets[bucket.index()].push(entry);
                }
            }
        }
        window.count = window.bucket_counts.iter().sum();
        Some(window)
    }

    /// Role ids of `community_id` held by `user_id`; empty if either is unknown.
    pub fn user_community_role_ids(&self, user_id: CompactId, community_id: CompactId) -> Vec<CompactId> {
        self.state.community_role_ids_of(community_id, user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::bootstrap::{GrantSeed, RoleSeed, SourceSnapshot, UserSeed};
    use crate::engine::roles::{ChannelPermissions, RoleKind, RoleRecord};
    use crate::engine::state::OnlineStatus;
    use proptest::prelude::*;

    fn id(n: u8) -> CompactId {
        CompactId::from_bytes([n; 16])
    }

    const COMMUNITY: u8 = 100;
    const CHANNEL: u8 = 200;
    const ADMIN: u8 = 1;
    const MEMBER: u8 = 2;
    const WRITERS: u8 = 3;

    /// Members 10.. with the given names; even indices online.
    fn view_with(names: &[&str]) -> MemberView {
        let users = names
            .iter()
            .enumerate()
            .map(|(i, name)| UserSeed {
                user_id: id(10 + i as u8),
                status: if i % 2 == 0 {
                    OnlineStatus::Online
                } else {
                    OnlineStatus::Offline
                },
                display_name: (*name).into(),
            })
            .collect();
        let mut memberships: Vec<_> = (0..names.len())
            .map(|i| (id(10 + i as u8), id(MEMBER)))
            .collect();
        memberships.push((id(10), id(ADMIN)));
        for i in 1..names.len().min(3) {
            memberships.push((id(10 + i as u8), id(WRITERS)));
        }
        let role = |n: u8, title: &str, kind| RoleSeed {
            role_id: id(n),
            community_id: id(COMMUNITY),
            role: RoleRecord::new(title, kind),
        };
        MemberView::bootstrap(SourceSnapshot {
            users,
            memberships,
            roles: vec![
                role(ADMIN, "Admin", RoleKind::Predefined),
                role(MEMBER, "Member", RoleKind::Predefined),
                role(WRITERS, "Writers", RoleKind::CustomManualAssign),
            ],
            grants: vec![GrantSeed {
                community_id: id(COMMUNITY),
                channel_id: id(CHANNEL),
                role_id: id(WRITERS),
                permissions: ChannelPermissions::CHANNEL_WRITE,
            }],
        })
    }

    fn abc() -> MemberView {
        // Alice online, Bob offline, Carol online
        view_with(&["Alice", "Bob", "Carol"])
    }

    fn request(offset: usize, limit: usize) -> MemberListRequest {
        MemberListRequest {
            community_id: id(COMMUNITY),
            offset,
            limit,
            search: None,
            role_id: None,
        }
    }

    fn channel_request(offset: usize, limit: usize, search: Option<&str>, prefix: bool) -> ChannelMemberListRequest {
        ChannelMemberListRequest {
            community_id: id(COMMUNITY),
            channel_id: id(CHANNEL),
            offset,
            limit,
            search: search.map(String::from),
            starts_with_search: prefix,
        }
    }

    fn ids(entries: &[MemberEntry]) -> Vec<CompactId> {
        entries.iter().map(|e| e.user_id).collect()
    }

    #[test]
    fn test_first_window_online_first() {
        let view = abc();
        let window = view.member_list_window(&request(0, 2)).unwrap();
        assert_eq!(window.total_count, 3);
        assert_eq!(window.result_count, 3);
        assert_eq!(ids(&window.online), vec![id(10), id(12)]);
        assert!(window.offline.is_empty());
    }

    #[test]
    fn test_window_crosses_bucket_boundary() {
        let view = abc();
        let window = view.member_list_window(&request(1, 5)).unwrap();
        assert_eq!(ids(&window.online), vec![id(12)]);
        assert_eq!(ids(&window.offline), vec![id(11)]);

        let window = view.member_list_window(&request(2, 5)).unwrap();
        assert!(window.online.is_empty());
        assert_eq!(ids(&window.offline), vec![id(11)]);

        let window = view.member_list_window(&request(10, 5)).unwrap();
        assert!(window.is_empty());
        assert_eq!(window.total_count, 3);
    }

    #[test]
    fn test_zero_limit_returns_counts_only() {
        let view = abc();
        let window = view.member_list_window(&request(0, 0)).unwrap();
        assert!(window.is_empty());
        assert_eq!(window.total_count, 3);
    }

    #[test]
    fn test_entries_carry_community_roles() {
        let view = abc();
        let window = view.member_list_window(&request(0, 1)).unwrap();
        assert_eq!(window.online[0].role_ids, vec![id(ADMIN), id(MEMBER)]);
    }

    #[test]
    fn test_role_census() {
        let view = abc();
        let window = view.member_list_window(&request(0, 0)).unwrap();
        assert_eq!(
            window.roles,
            vec![
                RoleCount { role_id: id(ADMIN), holders: 1 },
                RoleCount { role_id: id(MEMBER), holders: 3 },
                RoleCount { role_id: id(WRITERS), holders: 2 },
            ]
        );
    }

    #[test]
    fn test_search_is_case_insensitive_substring() {
        let view = view_with(&["Alice", "Malia", "Bob", "ALINA"]);
        let mut req = request(0, 10);
        req.search = Some("LI".into());
        let window = view.member_list_window(&req).unwrap();
        assert_eq!(window.result_count, 3);
        // Alice and Bob online, Malia and ALINA offline
        assert_eq!(ids(&window.online), vec![id(10)]);
        assert_eq!(ids(&window.offline), vec![id(13), id(11)]);
    }

    #[test]
    fn test_filtered_window_counts_all_matches() {
        let view = view_with(&["ann", "anna", "annie", "bob", "annabel"]);
        let mut req = request(1, 2);
        req.search = Some("ann".into());
        let window = view.member_list_window(&req).unwrap();
        assert_eq!(window.result_count, 4);
        assert_eq!(window.len(), 2);
        // online order: ann, annabel, annie; offline: anna
        assert_eq!(ids(&window.online), vec![id(14), id(12)]);
    }

    #[test]
    fn test_role_filter() {
        let view = abc();
        let mut req = request(0, 10);
        req.role_id = Some(id(WRITERS));
        let window = view.member_list_window(&req).unwrap();
        assert_eq!(window.result_count, 2);
        assert_eq!(ids(&window.online), vec![id(12)]);
        assert_eq!(ids(&window.offline), vec![id(11)]);
    }

    #[test]
    fn test_unknown_community_is_not_found() {
        let view = abc();
        let mut req = request(0, 10);
        req.community_id = id(99);
        assert!(view.member_list_window(&req).is_none());
    }

    #[test]
    fn test_community_without_member_role_is_not_found() {
        let view = MemberView::bootstrap(SourceSnapshot {
            roles: vec![RoleSeed {
                role_id: id(ADMIN),
                community_id: id(COMMUNITY),
                role: RoleRecord::new("Admin", RoleKind::Predefined),
            }],
            ..SourceSnapshot::default()
        });
        assert!(view.member_list_window(&request(0, 10)).is_none());
    }

    #[test]
    fn test_channel_window_in_rank_order() {
        let view = abc();
        let window = view
            .channel_member_list_window(&channel_request(0, 10, None, false))
            .unwrap();
        assert_eq!(window.count, 3);
        assert_eq!(ids(window.bucket(ChannelBucket::Admin)), vec![id(10)]);
        assert_eq!(ids(window.bucket(ChannelBucket::Writer)), vec![id(12)]);
        assert_eq!(ids(window.bucket(ChannelBucket::Offline)), vec![id(11)]);
        assert_eq!(window.bucket_count(ChannelBucket::Writer), 1);
        assert_eq!(window.bucket_count(ChannelBucket::Moderator), 0);
    }

    #[test]
    fn test_channel_window_pages_across_buckets() {
        let view = abc();
        let window = view
            .channel_member_list_window(&channel_request(1, 1, None, false))
            .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(ids(window.bucket(ChannelBucket::Writer)), vec![id(12)]);
        // Unfiltered counts cover the whole channel
        assert_eq!(window.bucket_count(ChannelBucket::Offline), 1);
    }

    #[test]
    fn test_channel_search_prefix_and_substring() {
        let view = view_with(&["Alice", "Malia", "Carla"]);
        let substring = view
            .channel_member_list_window(&channel_request(0, 10, Some("al"), false))
            .unwrap();
        assert_eq!(substring.count, 3);

        let prefix = view
            .channel_member_list_window(&channel_request(0, 10, Some("AL"), true))
            .unwrap();
        assert_eq!(prefix.count, 1);
        assert_eq!(ids(prefix.bucket(ChannelBucket::Admin)), vec![id(10)]);
        assert_eq!(prefix.bucket_count(ChannelBucket::Writer), 0);
    }

    #[test]
    fn test_channel_search_honours_limit() {
        let view = view_with(&["Alice", "Malia", "Carla"]);
        let window = view
            .channel_member_list_window(&channel_request(1, 1, Some("a"), false))
            .unwrap();
        assert_eq!(window.count, 3);
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_unknown_channel_is_not_found() {
        let view = abc();
        let mut req = channel_request(0, 10, None, false);
        req.channel_id = id(201);
        assert!(view.channel_member_list_window(&req).is_none());
    }

    #[test]
    fn test_user_community_role_ids() {
        let view = abc();
        assert_eq!(
            view.user_community_role_ids(id(11), id(COMMUNITY)),
            vec![id(MEMBER), id(WRITERS)]
        );
        assert!(view.user_community_role_ids(id(99), id(COMMUNITY)).is_empty());
        assert!(view.user_community_role_ids(id(11), id(99)).is_empty());
    }

    proptest! {
        #[test]
        fn prop_consecutive_windows_cover_membership_once(
            count in 0usize..30,
            limit in 1usize..8,
        ) {
            let names: Vec<String> = (0..count).map(|i| format!("user{:02}", (i * 7) % 31)).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let view = view_with(&refs);
            let expected: Vec<CompactId> = view.community_list(id(COMMUNITY)).unwrap().iter_all().collect();

            let mut seen = Vec::new();
            let mut offset = 0;
            while offset < count {
                let window = view.member_list_window(&request(offset, limit)).unwrap();
                prop_assert!(window.len() <= limit);
                seen.extend(ids(&window.online));
                seen.extend(ids(&window.offline));
                offset += limit;
            }
            prop_assert_eq!(seen, expected);
        }

        #[test]
        fn prop_channel_windows_cover_channel_once(
            count in 0usize..20,
            limit in 1usize..6,
        ) {
            let names: Vec<String> = (0..count).map(|i| format!("member{i}")).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let view = view_with(&refs);
            let Some(list) = view.channel_list(id(COMMUNITY), id(CHANNEL)) else {
                return Ok(());
            };
            let expected: Vec<CompactId> = list.iter_all().map(|(_, user_id)| user_id).collect();

            let mut seen = Vec::new();
            let mut offset = 0;
            while offset < expected.len() {
                let window = view
                    .channel_member_list_window(&channel_request(offset, limit, None, false))
                    .unwrap();
                for bucket in ChannelBucket::ORDER {
                    seen.extend(ids(window.bucket(bucket)));
                }
                offset += limit;
            }
            prop_assert_eq!(seen, expected);
        }
    }
}
