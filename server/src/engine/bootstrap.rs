use std::collections::{HashMap, HashSet};
use std::time::Instant;

use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::queries::source;

use super::identity::{CompactId, encode};
use super::member_sets::{
    ChannelBucket, ChannelMemberList, ChannelMemberSet, CommunityMemberList, CommunityMemberSet,
};
use super::roles::{ChannelPermissions, ChannelRoleBuckets, RoleKind, RoleRecord};
use super::state::{LinkedAccount, OnlineStatus, UserRecord, resolve_display_name};
use super::view::MemberView;

#[derive(Debug, Clone)]
pub struct UserSeed {
    pub user_id: CompactId,
    pub status: OnlineStatus,
    pub display_name: String,
}

#[derive(Debug, Clone)]
pub struct RoleSeed {
    pub role_id: CompactId,
    pub community_id: CompactId,
    pub role: RoleRecord,
}

#[derive(Debug, Clone)]
pub struct GrantSeed {
    pub community_id: CompactId,
    pub channel_id: CompactId,
    pub role_id: CompactId,
    pub permissions: ChannelPermissions,
}

/// Full state of the source store, already in internal form.
#[derive(Debug, Clone, Default)]
pub struct SourceSnapshot {
    pub users: Vec<UserSeed>,
    /// (user id, role id) for every claimed role.
    pub memberships: Vec<(CompactId, CompactId)>,
    pub roles: Vec<RoleSeed>,
    pub grants: Vec<GrantSeed>,
}

fn parse_id(raw: &str, what: &str) -> Option<CompactId> {
    match Uuid::parse_str(raw) {
        Ok(id) => Some(encode(id)),
        Err(e) => {
            warn!(id = raw, error = %e, "skipping {what} with malformed id");
            None
        }
    }
}

/// Read the whole source store. The reads run concurrently.
pub async fn load_snapshot(pool: &SqlitePool) -> Result<SourceSnapshot, String> {
    let (users, accounts, user_roles, roles, grants) = tokio::try_join!(
        source::list_users(pool),
        source::list_user_accounts(pool),
        source::list_claimed_user_roles(pool),
        source::list_live_roles(pool),
        source::list_channel_role_permissions(pool),
    )
    .map_err(|e| format!("Failed to load source state: {e}"))?;

    let mut accounts_by_user: HashMap<String, Vec<LinkedAccount>> = HashMap::new();
    for row in accounts {
        accounts_by_user
            .entry(row.user_id)
            .or_default()
            .push(LinkedAccount {
                display_name: row.display_name,
                kind: row.account_type,
            });
    }

    let mut snapshot = SourceSnapshot::default();

    for row in users {
        let Some(user_id) = parse_id(&row.id, "user") else {
            continue;
        };
        let status = OnlineStatus::parse(&row.online_status).unwrap_or_else(|| {
            warn!(user_id = %user_id, status = %row.online_status, "unknown online status, treating as offline");
            OnlineStatus::Offline
        });
        let accounts = accounts_by_user.remove(&row.id).unwrap_or_default();
        snapshot.users.push(UserSeed {
            user_id,
            status,
            display_name: resolve_display_name(row.display_account.as_deref(), &accounts),
        });
    }

    for row in user_roles {
        if let (Some(user_id), Some(role_id)) =
            (parse_id(&row.user_id, "user role"), parse_id(&row.role_id, "user role"))
        {
            snapshot.memberships.push((user_id, role_id));
        }
    }

    for row in roles {
        let (Some(role_id), Some(community_id)) =
            (parse_id(&row.id, "role"), parse_id(&row.community_id, "role"))
        else {
            continue;
        };
        let Some(kind) = RoleKind::parse(&row.role_type) else {
            warn!(role_id = %role_id, role_type = %row.role_type, "skipping role with unknown type");
            continue;
        };
        snapshot.roles.push(RoleSeed {
            role_id,
            community_id,
            role: RoleRecord::new(row.title, kind),
        });
    }

    for row in grants {
        let (Some(community_id), Some(channel_id), Some(role_id)) = (
            parse_id(&row.community_id, "channel grant"),
            parse_id(&row.channel_id, "channel grant"),
            parse_id(&row.role_id, "channel grant"),
        ) else {
            continue;
        };
        let permissions = match serde_json::from_str::<ChannelPermissions>(&row.permissions) {
            Ok(p) => p,
            Err(e) => {
                warn!(role_id = %role_id, channel_id = %channel_id, error = %e, "skipping unreadable channel grant");
                continue;
            }
        };
        snapshot.grants.push(GrantSeed {
            community_id,
            channel_id,
            role_id,
            permissions,
        });
    }

    Ok(snapshot)
}

impl MemberView {
    /// Build every index, member set and sorted cache from a full snapshot.
    ///
    /// Inconsistent rows are logged and skipped; the affected community or
    /// channel is simply left without a view.
    pub fn bootstrap(snapshot: SourceSnapshot) -> Self {
        let started = Instant::now();
        let mut view = MemberView::default();
        let state = &mut view.state;

        for seed in snapshot.users {
            state
                .users
                .insert(seed.user_id, UserRecord::new(seed.display_name, seed.status));
        }

        for (user_id, role_id) in snapshot.memberships {
            if !state.users.contains_key(&user_id) {
                warn!(user_id = %user_id, role_id = %role_id, "role holder has no user record, skipping");
                continue;
            }
            state.grant(user_id, role_id);
        }

        for seed in snapshot.roles {
            state.community_by_role.insert(seed.role_id, seed.community_id);
            state.role_holders.entry(seed.role_id).or_default();
            state
                .community_roles
                .entry(seed.community_id)
                .or_default()
                .insert(seed.role_id, seed.role);
        }

        let mut communities_without_admin = HashSet::new();
        for grant in snapshot.grants {
            if state.community_by_role.get(&grant.role_id) != Some(&grant.community_id) {
                warn!(
                    community_id = %grant.community_id,
                    role_id = %grant.role_id,
                    "channel grant for a role outside its community, skipping"
                );
                continue;
            }
            let admin_role = state.admin_role_of(grant.community_id);
            let channels = state.channel_buckets.entry(grant.community_id).or_default();
            if !channels.contains_key(&grant.channel_id) {
                let Some(admin_role) = admin_role else {
                    if communities_without_admin.insert(grant.community_id) {
                        warn!(community_id = %grant.community_id, "admin role not found, skipping channel buckets");
                    }
                    continue;
                };
                channels.insert(grant.channel_id, ChannelRoleBuckets::new(admin_role));
            }
            if let Some(buckets) = channels.get_mut(&grant.channel_id) {
                buckets.assign(grant.role_id, grant.permissions);
            }
        }

        let communities: Vec<CompactId> = view.state.community_roles.keys().copied().collect();
        for community_id in communities {
            let Some(member_role) = view.state.member_role_of(community_id) else {
                continue;
            };
            let mut set = CommunityMemberSet::default();
            for user_id in view.state.role_holders.get(&member_role).into_iter().flatten() {
                let online = view.state.users.get(user_id).is_some_and(|u| u.is_online());
                set.place(*user_id, Some(online));
            }
            let list = CommunityMemberList::build(&set, &view.state.users);
            view.community_sets.insert(community_id, set);
            view.community_lists.insert(community_id, list);
        }

        for (community_id, channels) in &view.state.channel_buckets {
            for (channel_id, buckets) in channels {
                let mut set = ChannelMemberSet::default();
                let candidates = std::iter::once(&buckets.admin)
                    .chain(&buckets.moderator)
                    .chain(&buckets.writer)
                    .chain(&buckets.reader)
                    .filter_map(|role_id| view.state.role_holders.get(role_id))
                    .flatten();
                for user_id in candidates {
                    let Some(user) = view.state.users.get(user_id) else {
                        continue;
                    };
                    let bucket =
                        ChannelBucket::classify(buckets.best_rank(&user.role_ids), user.is_online());
                    set.place(*user_id, bucket);
                }
                let list = ChannelMemberList::build(&set, &view.state.users);
                view.channel_sets
                    .entry(*community_id)
                    .or_default()
                    .insert(*channel_id, set);
                view.channel_lists
                    .entry(*community_id)
                    .or_default()
                    .insert(*channel_id, list);
            }
        }

        info!(
            users = view.state.users.len(),
            communities = view.community_sets.len(),
            channels = view.channel_sets.values().map(HashMap::len).sum::<usize>(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "member view bootstrapped"
        );
        view
    }

    /// Load the source store and build the view from it.
    pub async fn bootstrap_from_db(pool: &SqlitePool) -> Result<Self, String> {
        let snapshot = load_snapshot(pool).await?;
        Ok(Self::bootstrap(snapshot))
    }
}
