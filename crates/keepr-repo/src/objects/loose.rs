//! The loose side of an object directory: fan-out bucket walks and
//! zlib reads.

use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;

use crate::error::RepoError;
use crate::objects::ObjectType;
use crate::oid::{HashAlgorithm, ObjectId};

pub struct LooseStore {
    objects_dir: PathBuf,
    algo: HashAlgorithm,
}

impl LooseStore {
    pub fn new(objects_dir: impl AsRef<Path>, algo: HashAlgorithm) -> Self {
        Self {
            objects_dir: objects_dir.as_ref().to_path_buf(),
            algo,
        }
    }

    fn object_path(&self, oid: &ObjectId) -> PathBuf {
        let hex = oid.to_hex();
        self.objects_dir.join(&hex[..2]).join(&hex[2..])
    }

    /// A file name is a loose object iff it is exactly the remaining
    /// hex digits of an id (the first two live in the directory name).
    fn is_loose_name(&self, name: &str) -> bool {
        name.len() == self.algo.hex_len() - 2
            && name.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
    }

    /// Count loose objects in a single fan-out bucket, stopping early
    /// at `limit`. One bucket is an unbiased 1/256 sample because ids
    /// are uniformly distributed.
    pub fn count_in_bucket(&self, bucket: &str, limit: usize) -> usize {
        if limit == 0 {
            return 0;
        }
        let dir = self.objects_dir.join(bucket);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return 0,
        };
        let mut count = 0;
        for entry in entries.flatten() {
            if let Some(name) = entry.file_name().to_str() {
                if self.is_loose_name(name) {
                    count += 1;
                    if count >= limit {
                        break;
                    }
                }
            }
        }
        count
    }

    /// Count loose objects across every bucket, stopping early at `limit`.
    pub fn count_up_to(&self, limit: usize) -> usize {
        let mut count = 0;
        for bucket in 0..=0xffu16 {
            count += self.count_in_bucket(&format!("{bucket:02x}"), limit - count);
            if count >= limit {
                break;
            }
        }
        count
    }

    /// Is there any loose object at all?
    pub fn any(&self) -> bool {
        self.count_up_to(1) > 0
    }

    /// Collect up to `max` loose object ids, in bucket order.
    pub fn collect_ids(&self, max: usize) -> Vec<ObjectId> {
        let mut ids = Vec::new();
        'outer: for bucket in 0..=0xffu16 {
            let prefix = format!("{bucket:02x}");
            let entries = match std::fs::read_dir(self.objects_dir.join(&prefix)) {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            for entry in entries.flatten() {
                let Some(name) = entry.file_name().into_string().ok() else {
                    continue;
                };
                if !self.is_loose_name(&name) {
                    continue;
                }
                if let Ok(oid) = ObjectId::from_hex(&format!("{prefix}{name}")) {
                    ids.push(oid);
                    if ids.len() >= max {
                        break 'outer;
                    }
                }
            }
        }
        ids
    }

    /// Read and inflate a loose object. `Ok(None)` when absent.
    pub fn read(&self, oid: &ObjectId) -> Result<Option<(ObjectType, Vec<u8>)>, RepoError> {
        let path = self.object_path(oid);
        let compressed = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RepoError::Io(e)),
        };

        let mut decoder = ZlibDecoder::new(compressed.as_slice());
        let mut raw = Vec::new();
        decoder.read_to_end(&mut raw).map_err(|e| {
            RepoError::corrupt(format!("loose object {oid}"), e.to_string())
        })?;

        let nul = raw
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| RepoError::corrupt(format!("loose object {oid}"), "missing header"))?;
        let header = std::str::from_utf8(&raw[..nul])
            .map_err(|_| RepoError::corrupt(format!("loose object {oid}"), "bad header"))?;
        let (type_name, size) = header
            .split_once(' ')
            .ok_or_else(|| RepoError::corrupt(format!("loose object {oid}"), "bad header"))?;
        let obj_type = ObjectType::from_name(type_name)
            .ok_or_else(|| RepoError::corrupt(format!("loose object {oid}"), "unknown type"))?;
        let size: usize = size
            .parse()
            .map_err(|_| RepoError::corrupt(format!("loose object {oid}"), "bad size"))?;

        let body = raw[nul + 1..].to_vec();
        if body.len() != size {
            return Err(RepoError::corrupt(
                format!("loose object {oid}"),
                format!("size {size} but {} bytes of content", body.len()),
            ));
        }
        Ok(Some((obj_type, body)))
    }
}

/// Deflate `type size\0content` into loose-object file bytes.
#[cfg(test)]
pub(crate) fn encode_loose(obj_type: ObjectType, content: &[u8]) -> Vec<u8> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut raw = format!("{} {}\0", obj_type.name(), content.len()).into_bytes();
    raw.extend_from_slice(content);
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(&raw).unwrap();
    enc.finish().unwrap()
}
