/// Cache entries
///
/// An entry is self-describing: a short header, the metadata as JSON and the
/// zstd-compressed graph stream.
///
/// ```text
/// entry := "CCEN" metadata_len:u32 metadata_json payload
/// ```
use anyhow::{Context, Result};
use bytes::{BufMut, BytesMut};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;

use super::inputs::InputFingerprint;
use super::key::CacheKey;
use crate::codec::wire::{self, WireError, FORMAT_VERSION};
use crate::codec::EncodedGraph;

pub const ENTRY_MAGIC: &[u8; 4] = b"CCEN";

/// Cache entry metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub format_version: u16,
    pub key: CacheKey,
    pub tasks: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub payload_sha256: String,
    pub payload_size: u64,
    pub file_inputs: Vec<InputFingerprint>,
    pub problem_count: usize,
}

impl EntryMetadata {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }
}

/// Reasons a stored entry cannot be used. All of them send the orchestrator down the
/// miss path.
#[derive(Error, Debug)]
pub enum EntryError {
    #[error("not a cache entry (bad magic)")]
    BadMagic,

    #[error("entry truncated")]
    Truncated,

    #[error("unreadable entry metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("payload checksum mismatch (expected {expected}, found {found})")]
    ChecksumMismatch { expected: String, found: String },

    #[error("payload could not be decompressed: {0}")]
    Decompress(#[source] std::io::Error),

    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Parameters for sealing an entry
#[derive(Debug, Clone)]
pub struct SealParams {
    pub key: CacheKey,
    pub tasks: Vec<String>,
    pub compression_level: i32,
    pub ttl: Option<Duration>,
    pub file_inputs: Vec<InputFingerprint>,
    pub problem_count: usize,
}

/// Metadata plus the compressed graph stream
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub metadata: EntryMetadata,
    pub payload: Vec<u8>,
}

impl CacheEntry {
    /// Encode, compress and checksum a graph
    pub fn seal(graph: &EncodedGraph, params: SealParams) -> Result<Self> {
        let stream = wire::encode(graph);
        let payload = zstd::encode_all(&stream[..], params.compression_level)
            .context("Failed to compress graph stream")?;

        let created_at = Utc::now();
        let expires_at = match params.ttl {
            Some(ttl) => Some(
                created_at
                    + chrono::Duration::from_std(ttl)
                        .with_context(|| format!("Invalid entry lifetime: {:?}", ttl))?,
            ),
            None => None,
        };

        Ok(Self {
            metadata: EntryMetadata {
                format_version: FORMAT_VERSION,
                key: params.key,
                tasks: params.tasks,
                created_at,
                expires_at,
                payload_sha256: hex::encode(Sha256::digest(&payload)),
                payload_size: payload.len() as u64,
                file_inputs: params.file_inputs,
                problem_count: params.problem_count,
            },
            payload,
        })
    }

    /// Verify, decompress and parse the graph stream
    pub fn open(&self) -> Result<EncodedGraph, EntryError> {
        let found = hex::encode(Sha256::digest(&self.payload));
        if found != self.metadata.payload_sha256 {
            return Err(EntryError::ChecksumMismatch {
                expected: self.metadata.payload_sha256.clone(),
                found,
            });
        }
        let stream = zstd::decode_all(&self.payload[..]).map_err(EntryError::Decompress)?;
        Ok(wire::decode(&stream)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let metadata =
            serde_json::to_vec(&self.metadata).context("Failed to serialize entry metadata")?;
        let mut buf = BytesMut::with_capacity(8 + metadata.len() + self.payload.len());
        buf.put_slice(ENTRY_MAGIC);
        buf.put_u32_le(metadata.len() as u32);
        buf.put_slice(&metadata);
        buf.put_slice(&self.payload);
        Ok(buf.to_vec())
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, EntryError> {
        let metadata = Self::read_metadata(data)?;
        let header_len = 8 + metadata_len(data)?;
        Ok(Self {
            metadata,
            payload: data[header_len..].to_vec(),
        })
    }

    /// Parse only the header and metadata, leaving the payload untouched
    pub fn read_metadata(data: &[u8]) -> Result<EntryMetadata, EntryError> {
        let len = metadata_len(data)?;
        Ok(serde_json::from_slice(&data[8..8 + len])?)
    }
}

fn metadata_len(data: &[u8]) -> Result<usize, EntryError> {
    if data.len() < 8 {
        return Err(EntryError::Truncated);
    }
    if &data[..4] != ENTRY_MAGIC {
        return Err(EntryError::BadMagic);
    }
    let len = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
    if data.len() < 8 + len {
        return Err(EntryError::Truncated);
    }
    Ok(len)
}
