//! On-disk cache of an ingested corpus.
//!
//! Layout of `rag_cache.bin`:
//!
//! ```text
//! MAGIC "RAGDBCC\0" | version u32 LE | header_len u64 LE | header JSON
//! | per passage: present u8, len u32 LE, len x f32 LE
//! | blake3 of everything above (32 bytes)
//! ```
//!
//! The JSON header carries the passages (without vectors) and the index
//! snapshots. Files are written to a temporary sibling and renamed into place.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tracing::debug;

use ragdb_core::types::Passage;
use ragdb_core::{Error, Result};
use ragdb_text::SparseSnapshot;
use ragdb_vector::DenseSnapshot;

pub const CACHE_FILE: &str = "rag_cache.bin";
pub const MAGIC: &[u8; 8] = b"RAGDBCC\0";
pub const FORMAT_VERSION: u32 = 1;
const CHECKSUM_LEN: usize = 32;
const PREAMBLE_LEN: usize = 8 + 4 + 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheHeader {
    pub created_at: String,
    pub passages: Vec<Passage>,
    pub sparse: Option<SparseSnapshot>,
    pub dense: Option<DenseSnapshot>,
}

/// Encode `header` plus the embeddings of `header.passages`, taken from `vectors`.
pub fn encode(header: &CacheHeader, vectors: &[Option<&[f32]>]) -> Result<Vec<u8>> {
    if vectors.len() != header.passages.len() {
        return Err(Error::Operation(format!("{} vectors for {} passages", vectors.len(), header.passages.len())));
    }
    let json = serde_json::to_vec(header).map_err(|e| Error::operation("encode cache header", e))?;
    let mut buf = Vec::with_capacity(PREAMBLE_LEN + json.len() + CHECKSUM_LEN);
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&(json.len() as u64).to_le_bytes());
    buf.extend_from_slice(&json);
    for v in vectors {
        match v {
            Some(values) => {
                let len = u32::try_from(values.len()).map_err(|e| Error::operation("embedding length", e))?;
                buf.push(1);
                buf.extend_from_slice(&len.to_le_bytes());
                for x in *values {
                    buf.extend_from_slice(&x.to_le_bytes());
                }
            }
            None => buf.push(0),
        }
    }
    let checksum = blake3::hash(&buf);
    buf.extend_from_slice(checksum.as_bytes());
    Ok(buf)
}

/// Decode a cache image into its header and the passages with embeddings attached.
pub fn decode(bytes: &[u8]) -> Result<(CacheHeader, Vec<Passage>)> {
    if bytes.len() < PREAMBLE_LEN + CHECKSUM_LEN {
        return Err(Error::CacheCorrupt(format!("file too short ({} bytes)", bytes.len())));
    }
    let (body, trailer) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    if blake3::hash(body).as_bytes() != trailer {
        return Err(Error::CacheCorrupt("checksum mismatch".into()));
    }

    let mut r = Reader { buf: body, pos: 0 };
    if r.take(8)? != MAGIC {
        return Err(Error::CacheCorrupt("bad magic".into()));
    }
    let version = r.u32()?;
    if version != FORMAT_VERSION {
        return Err(Error::CacheCorrupt(format!("unsupported version {version}")));
    }
    let header_len = usize::try_from(r.u64()?).map_err(|e| Error::corrupt("header length", e))?;
    let header: CacheHeader = serde_json::from_slice(r.take(header_len)?).map_err(|e| Error::corrupt("header", e))?;

    let mut passages = Vec::with_capacity(header.passages.len());
    for p in &header.passages {
        let mut p = p.clone();
        match r.u8()? {
            0 => {}
            1 => {
                let len = r.u32()? as usize;
                let raw = r.take(len.checked_mul(4).ok_or_else(|| Error::CacheCorrupt("embedding length overflow".into()))?)?;
                let values = raw.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect();
                p.embedding = Some(values);
            }
            other => return Err(Error::CacheCorrupt(format!("bad embedding marker {other}"))),
        }
        passages.push(p);
    }
    if r.pos != body.len() {
        return Err(Error::CacheCorrupt(format!("{} trailing bytes", body.len() - r.pos)));
    }
    Ok((header, passages))
}

/// Write atomically: temp file in the same directory, then rename.
pub fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    debug!(path = %path.display(), bytes = bytes.len(), "cache written");
    Ok(())
}

pub fn read_file(path: &Path) -> Result<(CacheHeader, Vec<Passage>)> {
    let bytes = std::fs::read(path)?;
    decode(&bytes)
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.buf.len()).ok_or_else(|| {
            Error::CacheCorrupt(format!("truncated: wanted {n} bytes at offset {}", self.pos))
        })?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> { Ok(self.take(1)?[0]) }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let mut a = [0u8; 8];
        a.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(a))
    }
}
