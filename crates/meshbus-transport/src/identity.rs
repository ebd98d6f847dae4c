use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use uuid::Uuid;

/// Identity of one endpoint on the mesh.
///
/// Minted once per bus and never changed afterwards. Equality, ordering and
/// hashing only consider the UUID; the display name is for humans and logs.
#[derive(Clone)]
pub struct PeerId {
    uuid: Uuid,
    display_name: Arc<str>,
}

impl PeerId {
    /// Mint a fresh identity whose display name is the UUID string.
    pub fn generate() -> Self {
        let uuid = Uuid::new_v4();
        Self {
            uuid,
            display_name: Arc::from(uuid.to_string()),
        }
    }

    /// Mint a fresh identity with an explicit display name.
    pub fn with_display_name(name: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            display_name: Arc::from(name.into()),
        }
    }

    /// Rebuild an identity from a known UUID (e.g. one reported by a transport).
    pub fn from_uuid(uuid: Uuid, display_name: impl Into<String>) -> Self {
        Self {
            uuid,
            display_name: Arc::from(display_name.into()),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

impl PartialEq for PeerId {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}

impl Eq for PeerId {}

impl Hash for PeerId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uuid.hash(state);
    }
}

impl PartialOrd for PeerId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PeerId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.uuid.cmp(&other.uuid)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerId")
            .field("uuid", &self.uuid)
            .field("display_name", &&*self.display_name)
            .finish()
    }
}
