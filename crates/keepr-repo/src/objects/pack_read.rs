//! Just enough packfile reading for the commit-graph probe: index
//! lookup, entry inflation and delta resolution. Pack *writing* is the
//! repack worker's business, never ours.

use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use memmap2::Mmap;

use crate::error::RepoError;
use crate::objects::ObjectType;
use crate::oid::{HashAlgorithm, ObjectId};

const IDX_SIGNATURE: [u8; 4] = [0xff, b't', b'O', b'c'];
const PACK_SIGNATURE: &[u8; 4] = b"PACK";
const MAX_DELTA_CHAIN: usize = 64;

/// Resolves a ref-delta base that lives outside this pack.
pub type BaseResolver<'a> = &'a dyn Fn(&ObjectId) -> Option<(ObjectType, Vec<u8>)>;

/// A memory-mapped pack with its v2 index.
pub struct PackReader {
    pack: Mmap,
    idx: Mmap,
    num_objects: usize,
    algo: HashAlgorithm,
    // Byte offsets into the index.
    fanout: usize,
    oids: usize,
    off32: usize,
    off64: usize,
}

impl PackReader {
    pub fn open(pack_path: &Path, algo: HashAlgorithm) -> Result<Self, RepoError> {
        let idx_path = pack_path.with_extension("idx");
        let pack = map(pack_path)?;
        let idx = map(&idx_path)?;

        if pack.len() < 12 || &pack[0..4] != PACK_SIGNATURE {
            return Err(RepoError::corrupt(
                format!("pack {}", pack_path.display()),
                "bad signature",
            ));
        }

        let digest = algo.digest_len();
        if idx.len() < 8 + 1024 + 2 * digest || idx[0..4] != IDX_SIGNATURE {
            return Err(RepoError::corrupt(
                format!("pack index {}", idx_path.display()),
                "not a v2 index",
            ));
        }
        let version = u32::from_be_bytes([idx[4], idx[5], idx[6], idx[7]]);
        if version != 2 {
            return Err(RepoError::corrupt(
                format!("pack index {}", idx_path.display()),
                format!("unsupported version {version}"),
            ));
        }

        let fanout = 8;
        let num_objects = be32(&idx, fanout + 255 * 4) as usize;
        let oids = fanout + 256 * 4;
        let crcs = oids + num_objects * digest;
        let off32 = crcs + num_objects * 4;
        let off64 = off32 + num_objects * 4;
        if idx.len() < off64 {
            return Err(RepoError::corrupt(
                format!("pack index {}", idx_path.display()),
                "truncated",
            ));
        }

        Ok(Self {
            pack,
            idx,
            num_objects,
            algo,
            fanout,
            oids,
            off32,
            off64,
        })
    }

    pub fn num_objects(&self) -> usize {
        self.num_objects
    }

    /// OID → pack offset via fanout narrowing and binary search.
    pub fn lookup(&self, oid: &ObjectId) -> Option<u64> {
        let digest = self.algo.digest_len();
        let first = oid.first_byte() as usize;
        let mut lo = if first == 0 {
            0
        } else {
            be32(&self.idx, self.fanout + (first - 1) * 4) as usize
        };
        let mut hi = be32(&self.idx, self.fanout + first * 4) as usize;

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let at = self.oids + mid * digest;
            match oid.as_bytes().cmp(&self.idx[at..at + digest]) {
                std::cmp::Ordering::Equal => return Some(self.offset_at(mid)),
                std::cmp::Ordering::Less => hi = mid,
                std::cmp::Ordering::Greater => lo = mid + 1,
            }
        }
        None
    }

    fn offset_at(&self, pos: usize) -> u64 {
        let raw = be32(&self.idx, self.off32 + pos * 4);
        if raw & 0x8000_0000 == 0 {
            raw as u64
        } else {
            let large = (raw & 0x7fff_ffff) as usize;
            be64(&self.idx, self.off64 + large * 8)
        }
    }

    /// Read and fully resolve the entry at `offset`.
    pub fn read_at(
        &self,
        offset: u64,
        resolve_base: BaseResolver<'_>,
    ) -> Result<(ObjectType, Vec<u8>), RepoError> {
        self.read_at_depth(offset, resolve_base, 0)
    }

    fn read_at_depth(
        &self,
        offset: u64,
        resolve_base: BaseResolver<'_>,
        depth: usize,
    ) -> Result<(ObjectType, Vec<u8>), RepoError> {
        if depth > MAX_DELTA_CHAIN {
            return Err(self.corrupt(offset, "delta chain too deep"));
        }

        let mut pos = offset as usize;
        if pos >= self.pack.len() {
            return Err(self.corrupt(offset, "offset past end of pack"));
        }

        // Entry header: bits 6-4 of the first byte are the type, the
        // size continues in little-endian 7-bit groups while the MSB
        // is set.
        let mut byte = self.pack[pos];
        pos += 1;
        let type_num = (byte >> 4) & 0x07;
        let mut size = (byte & 0x0f) as u64;
        let mut shift = 4;
        while byte & 0x80 != 0 {
            byte = *self
                .pack
                .get(pos)
                .ok_or_else(|| self.corrupt(offset, "truncated entry header"))?;
            pos += 1;
            size |= ((byte & 0x7f) as u64) << shift;
            shift += 7;
        }

        let (base_type, base_data): (ObjectType, Vec<u8>) = match type_num {
            1 | 2 | 3 | 4 => {
                let obj_type = match type_num {
                    1 => ObjectType::Commit,
                    2 => ObjectType::Tree,
                    3 => ObjectType::Blob,
                    _ => ObjectType::Tag,
                };
                let data = self.inflate(pos, size as usize, offset)?;
                return Ok((obj_type, data));
            }
            6 => {
                // OFS_DELTA: variable-length negative offset.
                let mut c = *self
                    .pack
                    .get(pos)
                    .ok_or_else(|| self.corrupt(offset, "truncated ofs-delta"))?;
                pos += 1;
                let mut back = (c & 0x7f) as u64;
                while c & 0x80 != 0 {
                    c = *self
                        .pack
                        .get(pos)
                        .ok_or_else(|| self.corrupt(offset, "truncated ofs-delta"))?;
                    pos += 1;
                    back += 1;
                    back = (back << 7) + (c & 0x7f) as u64;
                }
                if back > offset {
                    return Err(self.corrupt(offset, "ofs-delta base before pack start"));
                }
                self.read_at_depth(offset - back, resolve_base, depth + 1)?
            }
            7 => {
                // REF_DELTA: base named by id, possibly in another pack
                // or loose.
                let digest = self.algo.digest_len();
                let raw = self
                    .pack
                    .get(pos..pos + digest)
                    .ok_or_else(|| self.corrupt(offset, "truncated ref-delta"))?;
                let base_oid = ObjectId::from_bytes(raw, self.algo)?;
                pos += digest;
                match self.lookup(&base_oid) {
                    Some(base_off) => self.read_at_depth(base_off, resolve_base, depth + 1)?,
                    None => resolve_base(&base_oid).ok_or_else(|| {
                        self.corrupt(offset, format!("missing delta base {base_oid}"))
                    })?,
                }
            }
            t => return Err(self.corrupt(offset, format!("unknown entry type {t}"))),
        };

        let delta = self.inflate(pos, size as usize, offset)?;
        let data = apply_delta(&base_data, &delta)
            .map_err(|reason| self.corrupt(offset, reason))?;
        Ok((base_type, data))
    }

    fn inflate(&self, pos: usize, expected: usize, offset: u64) -> Result<Vec<u8>, RepoError> {
        let slice = self
            .pack
            .get(pos..)
            .ok_or_else(|| self.corrupt(offset, "truncated entry data"))?;
        let mut decoder = ZlibDecoder::new(slice);
        let mut out = Vec::with_capacity(expected);
        decoder
            .read_to_end(&mut out)
            .map_err(|e| self.corrupt(offset, e.to_string()))?;
        if out.len() != expected {
            return Err(self.corrupt(
                offset,
                format!("entry inflated to {} bytes, expected {expected}", out.len()),
            ));
        }
        Ok(out)
    }

    fn corrupt(&self, offset: u64, reason: impl Into<String>) -> RepoError {
        RepoError::corrupt(format!("pack entry at offset {offset}"), reason.into())
    }
}

fn map(path: &Path) -> Result<Mmap, RepoError> {
    let file = std::fs::File::open(path)?;
    // Safety: packs and indexes are append-only from our perspective;
    // concurrent rewriters replace whole files via rename.
    unsafe { Mmap::map(&file) }.map_err(RepoError::Io)
}

fn be32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn be64(data: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[at..at + 8]);
    u64::from_be_bytes(buf)
}

/// Read a delta-format varint (little-endian 7-bit groups).
fn read_varint(data: &[u8]) -> Option<(usize, usize)> {
    let mut value = 0usize;
    let mut shift = 0;
    for (i, &byte) in data.iter().enumerate() {
        value |= ((byte & 0x7f) as usize) << shift;
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
        shift += 7;
    }
    None
}

/// Apply a delta instruction stream to `base`.
fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>, String> {
    let (source_size, n) = read_varint(delta).ok_or("truncated source size")?;
    let mut pos = n;
    let (target_size, n) = read_varint(&delta[pos..]).ok_or("truncated target size")?;
    pos += n;

    if source_size != base.len() {
        return Err(format!(
            "delta source size {source_size} does not match base {}",
            base.len()
        ));
    }

    let mut out = Vec::with_capacity(target_size);
    while pos < delta.len() {
        let cmd = delta[pos];
        pos += 1;
        if cmd & 0x80 != 0 {
            // Copy from base: optional offset/size bytes selected by flag bits.
            let mut offset = 0usize;
            let mut size = 0usize;
            for (bit, shift) in [(0x01u8, 0), (0x02, 8), (0x04, 16), (0x08, 24)] {
                if cmd & bit != 0 {
                    offset |= (*delta.get(pos).ok_or("truncated copy offset")? as usize) << shift;
                    pos += 1;
                }
            }
            for (bit, shift) in [(0x10u8, 0), (0x20, 8), (0x40, 16)] {
                if cmd & bit != 0 {
                    size |= (*delta.get(pos).ok_or("truncated copy size")? as usize) << shift;
                    pos += 1;
                }
            }
            if size == 0 {
                size = 0x10000;
            }
            let end = offset.checked_add(size).ok_or("copy overflow")?;
            if end > base.len() {
                return Err("copy past end of base".into());
            }
            out.extend_from_slice(&base[offset..end]);
        } else if cmd != 0 {
            // Insert literal bytes.
            let len = cmd as usize;
            let chunk = delta.get(pos..pos + len).ok_or("truncated insert")?;
            out.extend_from_slice(chunk);
            pos += len;
        } else {
            return Err("zero delta opcode".into());
        }
    }

    if out.len() != target_size {
        return Err(format!(
            "delta produced {} bytes, expected {target_size}",
            out.len()
        ));
    }
    Ok(out)
}
