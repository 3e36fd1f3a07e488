use std::fmt;

use uuid::Uuid;

/// Compact, fixed-size internal key for users, roles, communities and channels.
///
/// Every index in the member view is keyed by `CompactId`. External UUIDs are
/// turned into keys once, at the ingestion and bootstrap boundary, and turned
/// back only when a query result leaves the engine.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct CompactId([u8; 16]);

impl CompactId {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

/// Map an external identifier to its internal key.
pub fn encode(id: Uuid) -> CompactId {
    CompactId(id.into_bytes())
}

/// Map an internal key back to its external identifier.
pub fn decode(key: CompactId) -> Uuid {
    Uuid::from_bytes(key.0)
}

impl From<Uuid> for CompactId {
    fn from(id: Uuid) -> Self {
        encode(id)
    }
}

impl From<CompactId> for Uuid {
    fn from(key: CompactId) -> Self {
        decode(key)
    }
}

// Log fields always show the external form.
impl fmt::Display for CompactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&decode(*self), f)
    }
}

impl fmt::Debug for CompactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompactId({})", decode(*self))
    }
}
