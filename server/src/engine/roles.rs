use std::collections::HashSet;

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize};

use super::identity::CompactId;

bitflags! {
    /// Channel-level grants held by a role.
    /// Arrives on the wire as an array of permission names.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChannelPermissions: u8 {
        const CHANNEL_EXISTS    = 1 << 0;
        const CHANNEL_READ      = 1 << 1;
        const CHANNEL_WRITE     = 1 << 2;
        const CHANNEL_MODERATE  = 1 << 3;
    }
}

impl ChannelPermissions {
    /// Build a grant set from permission names. Unknown names are ignored.
    pub fn from_names<'a, I>(names: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .filter_map(Self::from_name)
            .fold(Self::empty(), |acc, p| acc | p)
    }

    /// The rank this grant set earns in a channel, if any.
    /// Moderate beats write, write beats read.
    pub fn rank(self) -> Option<ChannelRank> {
        if self.contains(Self::CHANNEL_MODERATE) {
            Some(ChannelRank::Moderator)
        } else if self.contains(Self::CHANNEL_WRITE) {
            Some(ChannelRank::Writer)
        } else if self.contains(Self::CHANNEL_READ) {
            Some(ChannelRank::Reader)
        } else {
            None
        }
    }
}

impl<'de> Deserialize<'de> for ChannelPermissions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        Ok(Self::from_names(names.iter().map(String::as_str)))
    }
}

/// How a role came to exist in a community.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleKind {
    Predefined,
    CustomManualAssign,
    CustomAutoAssign,
}

impl RoleKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PREDEFINED" => Some(Self::Predefined),
            "CUSTOM_MANUAL_ASSIGN" => Some(Self::CustomManualAssign),
            "CUSTOM_AUTO_ASSIGN" => Some(Self::CustomAutoAssign),
            _ => None,
        }
    }
}

/// Title of the predefined role whose holders are the community's members.
pub const MEMBER_ROLE_TITLE: &str = "Member";
/// Title of the predefined role that ranks above every channel bucket.
pub const ADMIN_ROLE_TITLE: &str = "Admin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRecord {
    pub title: String,
    pub kind: RoleKind,
}

impl RoleRecord {
    pub fn new(title: impl Into<String>, kind: RoleKind) -> Self {
        Self {
            title: title.into(),
            kind,
        }
    }

    pub fn is_member_role(&self) -> bool {
        self.kind == RoleKind::Predefined && self.title == MEMBER_ROLE_TITLE
    }

    pub fn is_admin_role(&self) -> bool {
        self.kind == RoleKind::Predefined && self.title == ADMIN_ROLE_TITLE
    }
}

/// A user's rank inside one channel, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelRank {
    Admin,
    Moderator,
    Writer,
    Reader,
}

/// Which roles of a community earn which rank in one channel.
///
/// The admin role is fixed when the definition is created. A role sits in at
/// most one of the three grant sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRoleBuckets {
    pub admin: CompactId,
    pub moderator: HashSet<CompactId>,
    pub writer: HashSet<CompactId>,
    pub reader: HashSet<CompactId>,
}

impl ChannelRoleBuckets {
    pub fn new(admin: CompactId) -> Self {
        Self {
            admin,
            moderator: HashSet::new(),
            writer: HashSet::new(),
            reader: HashSet::new(),
        }
    }

    /// Place `role_id` in the bucket its grants earn, removing it from the
    /// other two. An empty grant removes it everywhere. Grants for the admin
    /// role are ignored. Returns whether the definition changed.
    pub fn assign(&mut self, role_id: CompactId, permissions: ChannelPermissions) -> bool {
        if role_id == self.admin {
            return false;
        }
        let target = permissions.rank();
        if self.rank_of_role(role_id) == target {
            return false;
        }
        self.moderator.remove(&role_id);
        self.writer.remove(&role_id);
        self.reader.remove(&role_id);
        match target {
            Some(ChannelRank::Moderator) => self.moderator.insert(role_id),
            Some(ChannelRank::Writer) => self.writer.insert(role_id),
            Some(ChannelRank::Reader) => self.reader.insert(role_id),
            Some(ChannelRank::Admin) | None => false,
        };
        true
    }

    /// Drop `role_id` from the three grant sets. Returns whether it was present.
    pub fn remove_role(&mut self, role_id: CompactId) -> bool {
        let moderator = self.moderator.remove(&role_id);
        let writer = self.writer.remove(&role_id);
        let reader = self.reader.remove(&role_id);
        moderator || writer || reader
    }

    pub fn references(&self, role_id: CompactId) -> bool {
        role_id == self.admin
            || self.moderator.contains(&role_id)
            || self.writer.contains(&role_id)
            || self.reader.contains(&role_id)
    }

    pub fn rank_of_role(&self, role_id: CompactId) -> Option<ChannelRank> {
        if role_id == self.admin {
            Some(ChannelRank::Admin)
        } else if self.moderator.contains(&role_id) {
            Some(ChannelRank::Moderator)
        } else if self.writer.contains(&role_id) {
            Some(ChannelRank::Writer)
        } else if self.reader.contains(&role_id) {
            Some(ChannelRank::Reader)
        } else {
            None
        }
    }

    /// Highest rank earned by any of `role_ids`, or `None` if no role qualifies.
    pub fn best_rank<'a, I>(&self, role_ids: I) -> Option<ChannelRank>
    where
        I: IntoIterator<Item = &'a CompactId>,
    {
        role_ids
            .into_iter()
            .filter_map(|role_id| self.rank_of_role(*role_id))
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> CompactId {
        CompactId::from_bytes([n; 16])
    }

    #[test]
    fn test_grant_precedence_moderate_write_read() {
        let all = ChannelPermissions::CHANNEL_READ
            | ChannelPermissions::CHANNEL_WRITE
            | ChannelPermissions::CHANNEL_MODERATE;
        assert_eq!(all.rank(), Some(ChannelRank::Moderator));
        let rw = ChannelPermissions::CHANNEL_READ | ChannelPermissions::CHANNEL_WRITE;
        assert_eq!(rw.rank(), Some(ChannelRank::Writer));
        assert_eq!(ChannelPermissions::CHANNEL_READ.rank(), Some(ChannelRank::Reader));
        assert_eq!(ChannelPermissions::CHANNEL_EXISTS.rank(), None);
        assert_eq!(ChannelPermissions::empty().rank(), None);
    }

    #[test]
    fn test_permissions_deserialize_from_names() {
        let perms: ChannelPermissions =
            serde_json::from_str(r#"["CHANNEL_EXISTS","CHANNEL_WRITE","SOMETHING_NEW"]"#).unwrap();
        assert_eq!(
            perms,
            ChannelPermissions::CHANNEL_EXISTS | ChannelPermissions::CHANNEL_WRITE
        );
    }

    #[test]
    fn test_role_kind_wire_names() {
        let kind: RoleKind = serde_json::from_str(r#""CUSTOM_AUTO_ASSIGN""#).unwrap();
        assert_eq!(kind, RoleKind::CustomAutoAssign);
        assert_eq!(RoleKind::parse("PREDEFINED"), Some(RoleKind::Predefined));
        assert_eq!(RoleKind::parse("predefined"), None);
    }

    #[test]
    fn test_member_role_needs_kind_and_title() {
        assert!(RoleRecord::new("Member", RoleKind::Predefined).is_member_role());
        assert!(!RoleRecord::new("Member", RoleKind::CustomManualAssign).is_member_role());
        assert!(!RoleRecord::new("Admin", RoleKind::Predefined).is_member_role());
        assert!(RoleRecord::new("Admin", RoleKind::Predefined).is_admin_role());
    }

    #[test]
    fn test_assign_moves_role_between_buckets() {
        let mut buckets = ChannelRoleBuckets::new(id(1));
        assert!(buckets.assign(id(2), ChannelPermissions::CHANNEL_WRITE));
        assert!(buckets.writer.contains(&id(2)));

        assert!(buckets.assign(id(2), ChannelPermissions::CHANNEL_READ));
        assert!(!buckets.writer.contains(&id(2)));
        assert!(buckets.reader.contains(&id(2)));

        // Same grant twice is a no-op
        assert!(!buckets.assign(id(2), ChannelPermissions::CHANNEL_READ));

        assert!(buckets.assign(id(2), ChannelPermissions::empty()));
        assert!(!buckets.references(id(2)));
    }

    #[test]
    fn test_assign_ignores_admin_role() {
        let mut buckets = ChannelRoleBuckets::new(id(1));
        assert!(!buckets.assign(id(1), ChannelPermissions::CHANNEL_READ));
        assert!(buckets.reader.is_empty());
        assert_eq!(buckets.rank_of_role(id(1)), Some(ChannelRank::Admin));
    }

    #[test]
    fn test_best_rank_picks_highest() {
        let mut buckets = ChannelRoleBuckets::new(id(1));
        buckets.assign(id(2), ChannelPermissions::CHANNEL_MODERATE);
        buckets.assign(id(3), ChannelPermissions::CHANNEL_READ);

        assert_eq!(buckets.best_rank(&[id(3), id(2)]), Some(ChannelRank::Moderator));
        assert_eq!(buckets.best_rank(&[id(3), id(1)]), Some(ChannelRank::Admin));
        assert_eq!(buckets.best_rank(&[id(3)]), Some(ChannelRank::Reader));
        assert_eq!(buckets.best_rank(&[id(9)]), None);
    }

    #[test]
    fn test_remove_role_reports_presence() {
        let mut buckets = ChannelRoleBuckets::new(id(1));
        buckets.assign(id(2), ChannelPermissions::CHANNEL_WRITE);
        assert!(buckets.remove_role(id(2)));
        assert!(!buckets.remove_role(id(2)));
    }
}
