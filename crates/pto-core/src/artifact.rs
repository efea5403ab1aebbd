//! Compiled binaries produced by a build.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::platform::TargetType;

/// Opaque binary payload for one target.
#[derive(Clone, PartialEq, Eq)]
pub struct CompiledArtifact {
    pub target: TargetType,
    pub bytes: Vec<u8>,
}

impl CompiledArtifact {
    pub fn new(target: TargetType, bytes: Vec<u8>) -> Self {
        Self { target, bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Hex-encoded SHA-256 of the payload.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}

impl fmt::Debug for CompiledArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CompiledArtifact({}, {} bytes, {})",
            self.target,
            self.bytes.len(),
            &self.digest()[..12]
        )
    }
}

/// The three binaries of one runtime build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeArtifacts {
    pub host: CompiledArtifact,
    pub aicpu: CompiledArtifact,
    pub aicore: CompiledArtifact,
}

impl RuntimeArtifacts {
    /// `(host, aicpu, aicore)` byte payloads.
    pub fn into_tuple(self) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        (self.host.bytes, self.aicpu.bytes, self.aicore.bytes)
    }
}
