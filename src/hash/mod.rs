//! Content hashing and duplicate resource detection

use crate::analysis::RetainedSet;
use crate::archive::{ArchiveIndex, ArchiveMember, MemberKind};
use crate::error::Result;
use md5::{Digest as _, Md5};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write;
use tracing::{debug, info};

/// Fixed-length content digest
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest(Vec<u8>);

impl Digest {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex form
    pub fn to_hex(&self) -> String {
        let mut hex = String::with_capacity(self.0.len() * 2);
        for byte in &self.0 {
            let _ = write!(hex, "{:02x}", byte);
        }
        hex
    }
}

/// Hash function used for duplicate detection
pub trait ContentHasher: Send + Sync {
    fn hash(&self, bytes: &[u8]) -> Digest;
}

/// MD5, sufficient for spotting identical content
#[derive(Debug, Clone, Copy, Default)]
pub struct Md5Hasher;

impl ContentHasher for Md5Hasher {
    fn hash(&self, bytes: &[u8]) -> Digest {
        let mut hasher = Md5::new();
        hasher.update(bytes);
        Digest::new(hasher.finalize().to_vec())
    }
}

/// Retained resources with identical content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub digest: String,
    /// Uncompressed size of each copy
    pub size: u64,
    /// Member paths in archive order
    pub paths: Vec<String>,
}

impl DuplicateGroup {
    /// Bytes that would be saved if only one copy existed
    pub fn redundant_bytes(&self) -> u64 {
        self.size * (self.paths.len() as u64).saturating_sub(1)
    }
}

/// Finds retained resources whose decompressed content is identical
pub struct DuplicateFinder<H: ContentHasher = Md5Hasher> {
    hasher: H,
}

impl DuplicateFinder<Md5Hasher> {
    pub fn md5() -> Self {
        Self::new(Md5Hasher)
    }
}

impl<H: ContentHasher> DuplicateFinder<H> {
    pub fn new(hasher: H) -> Self {
        Self { hasher }
    }

    /// Report duplicate groups in order of their first member
    ///
    /// Members are bucketed by size and CRC-32 first, so only likely
    /// duplicates are decompressed and hashed.
    pub fn find(&self, index: &ArchiveIndex, retained: &RetainedSet) -> Result<Vec<DuplicateGroup>> {
        let mut buckets: HashMap<(u32, u32), Vec<&ArchiveMember>> = HashMap::new();
        let mut bucket_order = Vec::new();

        for member in index.members() {
            if member.kind != MemberKind::Resource
                || member.uncompressed_size == 0
                || !retained.contains(&member.path)
            {
                continue;
            }
            let key = (member.uncompressed_size, member.crc32);
            let bucket = buckets.entry(key).or_default();
            if bucket.is_empty() {
                bucket_order.push(key);
            }
            bucket.push(member);
        }

        let candidates: Vec<&ArchiveMember> = bucket_order
            .iter()
            .filter_map(|key| buckets.get(key))
            .filter(|bucket| bucket.len() > 1)
            .flatten()
            .copied()
            .collect();
        debug!("Hashing {} duplicate candidates", candidates.len());

        let digests: Vec<Digest> = candidates
            .par_iter()
            .map(|member| -> Result<Digest> { Ok(self.hasher.hash(&member.data()?)) })
            .collect::<Result<_>>()?;

        let mut groups: Vec<DuplicateGroup> = Vec::new();
        let mut by_digest: HashMap<&Digest, usize> = HashMap::new();
        for (member, digest) in candidates.iter().zip(&digests) {
            match by_digest.get(digest) {
                Some(&group) => groups[group].paths.push(member.path.clone()),
                None => {
                    by_digest.insert(digest, groups.len());
                    groups.push(DuplicateGroup {
                        digest: digest.to_hex(),
                        size: u64::from(member.uncompressed_size),
                        paths: vec![member.path.clone()],
                    });
                }
            }
        }
        groups.retain(|g| g.paths.len() > 1);
        // Keep first-appearance order across buckets
        groups.sort_by_key(|g| g.paths.first().and_then(|p| index.position(p)));

        if !groups.is_empty() {
            let redundant: u64 = groups.iter().map(DuplicateGroup::redundant_bytes).sum();
            info!(
                "Found {} groups of duplicate resources ({} redundant bytes)",
                groups.len(),
                redundant
            );
        }
        Ok(groups)
    }
}
