use std::fmt;
use std::str::FromStr;

use sha1::{Digest, Sha1};

use crate::core::{DeployError, Result};

/// SHA-1 name of a blob, tree or commit, hashed the way git hashes it
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 20]);

/// Kinds of objects the history backend stores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    Commit,
    Tree,
    Blob,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Commit => "commit",
            ObjectType::Tree => "tree",
            ObjectType::Blob => "blob",
        }
    }
}

impl ObjectId {
    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Id from a raw digest handed out by a backend
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        <[u8; 20]>::try_from(bytes)
            .map(Self)
            .map_err(|_| DeployError::Backend(format!("object id of {} bytes", bytes.len())))
    }

    /// Hash `content` behind a `"<type> <len>\0"` header
    pub fn compute(object_type: ObjectType, content: &[u8]) -> Self {
        let header = format!("{} {}\0", object_type.as_str(), content.len());
        let digest = Sha1::new()
            .chain_update(header.as_bytes())
            .chain_update(content)
            .finalize();

        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First seven hex digits, for log lines and messages
    pub fn short(&self) -> String {
        self.to_hex()[..7].to_string()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short())
    }
}

impl FromStr for ObjectId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}
