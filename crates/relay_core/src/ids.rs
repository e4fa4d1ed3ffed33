//! Stable synthetic identities.
//!
//! Identities are a hash of a type tag and the source path, so the same
//! object keeps its key across re-evaluation at another subframe and across
//! runs. Live host object handles are never used as keys.

use std::fmt;

use serde::{Deserialize, Serialize};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(tag: &str, path: &str) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in tag.bytes().chain(std::iter::once(b':')).chain(path.bytes()) {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Identity of a source object or data block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl EntityId {
    /// Hash a type tag and source path into an identity.
    pub fn from_path(tag: &str, path: &str) -> Self {
        Self(fnv1a(tag, path))
    }

    /// Identity of a scene object by name.
    pub fn object(name: &str) -> Self {
        Self::from_path("OBJECT", name)
    }

    /// Identity of a particle system owned by `owner`.
    pub fn particle_system(owner: &str, name: &str) -> Self {
        Self::from_path("PSYS", &format!("{owner}/{name}"))
    }

    /// 31-bit value suitable for integer object-id attributes.
    pub fn short(self) -> i32 {
        (self.0 & 0x7fff_ffff) as i32
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Identity of a source material.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MaterialId(pub u64);

impl MaterialId {
    pub fn from_name(name: &str) -> Self {
        Self(fnv1a("MATERIAL", name))
    }
}

impl fmt::Display for MaterialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
