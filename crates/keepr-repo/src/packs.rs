//! Pack directory enumeration.
//!
//! One scan produces the read-only pack descriptors the trigger
//! policies work from, plus the pack-garbage list (orphaned `.idx`
//! files). Descriptors are valid for one probe cycle; callers re-scan
//! after a repack rather than holding on to them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::RepoError;
use crate::objects::midx;

/// Read-only view of one packfile.
#[derive(Debug, Clone)]
pub struct PackInfo {
    pub pack_path: PathBuf,
    pub pack_size: u64,
    pub index_size: u64,
    /// Objects in the pack, from the index fanout (0 when unreadable).
    pub num_objects: u64,
    /// A `.keep` file excludes the pack from repacking.
    pub keep: bool,
    /// False for packs borrowed through objects/info/alternates.
    pub local: bool,
    /// Listed in the multi-pack-index of its object directory.
    pub midx_covered: bool,
}

impl PackInfo {
    /// The pack's file name, e.g. `pack-1234.pack`.
    pub fn file_name(&self) -> &str {
        self.pack_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
    }
}

/// Result of one pack-directory probe cycle.
#[derive(Debug, Default)]
pub struct PackScan {
    pub packs: Vec<PackInfo>,
    /// Orphaned `.idx` paths (index present, pack missing), local only.
    pub garbage: Vec<PathBuf>,
}

impl PackScan {
    /// Estimated packed-object count across every pack.
    pub fn approximate_object_count(&self) -> u64 {
        self.packs.iter().map(|p| p.num_objects).sum()
    }
}

/// Scan the repository's pack directory and those of its alternates.
pub fn scan(objects_dir: &Path) -> Result<PackScan, RepoError> {
    let mut result = PackScan::default();
    scan_object_dir(objects_dir, true, &mut result)?;
    for alternate in read_alternates(objects_dir) {
        scan_object_dir(&alternate, false, &mut result)?;
    }
    result
        .packs
        .sort_by(|a, b| a.pack_path.cmp(&b.pack_path));
    result.garbage.sort();
    Ok(result)
}

fn scan_object_dir(
    objects_dir: &Path,
    local: bool,
    out: &mut PackScan,
) -> Result<(), RepoError> {
    let pack_dir = objects_dir.join("pack");
    let entries = match std::fs::read_dir(&pack_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(RepoError::Io(e)),
    };

    let midx_stems = midx::read_pack_stems(objects_dir);

    // stem -> (has_pack, has_idx, has_keep)
    let mut seen: BTreeMap<String, (bool, bool, bool)> = BTreeMap::new();
    for entry in entries.flatten() {
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };
        let (stem, slot) = if let Some(stem) = name.strip_suffix(".pack") {
            (stem, 0)
        } else if let Some(stem) = name.strip_suffix(".idx") {
            (stem, 1)
        } else if let Some(stem) = name.strip_suffix(".keep") {
            (stem, 2)
        } else {
            continue;
        };
        let flags = seen.entry(stem.to_string()).or_default();
        match slot {
            0 => flags.0 = true,
            1 => flags.1 = true,
            _ => flags.2 = true,
        }
    }

    for (stem, (has_pack, has_idx, has_keep)) in seen {
        if !has_pack {
            if has_idx && local {
                out.garbage.push(pack_dir.join(format!("{stem}.idx")));
            }
            continue;
        }
        let pack_path = pack_dir.join(format!("{stem}.pack"));
        let idx_path = pack_dir.join(format!("{stem}.idx"));
        let pack_size = std::fs::metadata(&pack_path).map(|m| m.len()).unwrap_or(0);
        let index_size = std::fs::metadata(&idx_path).map(|m| m.len()).unwrap_or(0);
        let num_objects = if has_idx {
            read_idx_object_count(&idx_path).unwrap_or(0)
        } else {
            0
        };
        out.packs.push(PackInfo {
            pack_path,
            pack_size,
            index_size,
            num_objects,
            keep: has_keep,
            local,
            midx_covered: midx_stems
                .as_ref()
                .map(|stems| stems.contains(&stem))
                .unwrap_or(false),
        });
    }

    Ok(())
}

/// Object count from a pack index: the last fanout entry.
///
/// Supports index v2 (magic `\xfftOc`) and the legacy headerless v1.
pub(crate) fn read_idx_object_count(idx_path: &Path) -> Option<u64> {
    use std::io::Read;

    let mut file = std::fs::File::open(idx_path).ok()?;
    let mut header = [0u8; 8];
    file.read_exact(&mut header).ok()?;

    let fanout_base = if header[..4] == [0xff, b't', b'O', b'c'] {
        let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if version != 2 {
            return None;
        }
        8u64
    } else {
        0u64
    };

    use std::io::Seek;
    file.seek(std::io::SeekFrom::Start(fanout_base + 255 * 4))
        .ok()?;
    let mut buf = [0u8; 4];
    file.read_exact(&mut buf).ok()?;
    Some(u32::from_be_bytes(buf) as u64)
}

/// Other object directories listed in objects/info/alternates.
fn read_alternates(objects_dir: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let Ok(contents) = std::fs::read_to_string(objects_dir.join("info/alternates")) else {
        return dirs;
    };
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let path = Path::new(line);
        if path.is_absolute() {
            dirs.push(path.to_path_buf());
        } else {
            dirs.push(objects_dir.join(path));
        }
    }
    dirs
}
