//! Minimal multi-pack-index reading.
//!
//! The supervisor never resolves objects through the midx; it only
//! needs to know which packs the midx covers, from the PNAM chunk.

use std::collections::HashSet;
use std::path::Path;

use memmap2::Mmap;

const MIDX_SIGNATURE: &[u8; 4] = b"MIDX";
const CHUNK_PACK_NAMES: u32 = 0x504e_414d; // "PNAM"

/// Pack stems (file names without extension) covered by the midx of
/// `objects_dir`, or `None` when there is no readable midx.
pub(crate) fn read_pack_stems(objects_dir: &Path) -> Option<HashSet<String>> {
    let path = objects_dir.join("pack/multi-pack-index");
    let file = std::fs::File::open(&path).ok()?;
    let data = unsafe { Mmap::map(&file) }.ok()?;
    parse_pack_stems(&data)
}

fn parse_pack_stems(data: &[u8]) -> Option<HashSet<String>> {
    // Header: MIDX | version | oid version | num_chunks | base count | num_packs
    if data.len() < 12 || &data[0..4] != MIDX_SIGNATURE || data[4] != 1 {
        return None;
    }
    let num_chunks = data[6] as usize;
    let num_packs = u32::from_be_bytes([data[8], data[9], data[10], data[11]]) as usize;

    // Chunk lookup table: (id, offset) rows plus a zero-id terminator
    // whose offset marks the end of the last chunk.
    let table = 12;
    if data.len() < table + (num_chunks + 1) * 12 {
        return None;
    }
    let row = |i: usize| -> (u32, usize) {
        let base = table + i * 12;
        let id = u32::from_be_bytes([data[base], data[base + 1], data[base + 2], data[base + 3]]);
        let off = u64::from_be_bytes([
            data[base + 4],
            data[base + 5],
            data[base + 6],
            data[base + 7],
            data[base + 8],
            data[base + 9],
            data[base + 10],
            data[base + 11],
        ]);
        (id, off as usize)
    };

    let mut names_range = None;
    for i in 0..num_chunks {
        let (id, start) = row(i);
        if id == CHUNK_PACK_NAMES {
            let (_, end) = row(i + 1);
            names_range = Some((start, end));
            break;
        }
    }
    let (start, end) = names_range?;
    if start > end || end > data.len() {
        return None;
    }

    let mut stems = HashSet::new();
    for raw in data[start..end].split(|&b| b == 0) {
        if raw.is_empty() {
            continue;
        }
        let name = std::str::from_utf8(raw).ok()?;
        let stem = name
            .strip_suffix(".idx")
            .or_else(|| name.strip_suffix(".pack"))
            .unwrap_or(name);
        stems.insert(stem.to_string());
        if stems.len() == num_packs {
            break;
        }
    }
    Some(stems)
}

#[cfg(test)]
pub(crate) fn write_midx_fixture(objects_dir: &Path, pack_idx_names: &[&str]) {
    let pack_dir = objects_dir.join("pack");
    std::fs::create_dir_all(&pack_dir).unwrap();

    let mut names = Vec::new();
    for name in pack_idx_names {
        names.extend_from_slice(name.as_bytes());
        names.push(0);
    }
    // Pad the chunk to four-byte alignment the way writers do.
    while names.len() % 4 != 0 {
        names.push(0);
    }

    let mut data = Vec::new();
    data.extend_from_slice(b"MIDX");
    data.push(1); // version
    data.push(1); // oid version: sha1
    data.push(1); // one chunk
    data.push(0); // base midx count
    data.extend_from_slice(&(pack_idx_names.len() as u32).to_be_bytes());

    let header_and_table = 12 + 2 * 12;
    data.extend_from_slice(&CHUNK_PACK_NAMES.to_be_bytes());
    data.extend_from_slice(&(header_and_table as u64).to_be_bytes());
    data.extend_from_slice(&0u32.to_be_bytes());
    data.extend_from_slice(&((header_and_table + names.len()) as u64).to_be_bytes());
    data.extend_from_slice(&names);

    std::fs::write(pack_dir.join("multi-pack-index"), data).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covered_stems_parsed() {
        let tmp = tempfile::tempdir().unwrap();
        let objects = tmp.path().join("objects");
        write_midx_fixture(&objects, &["pack-aa.idx", "pack-bb.idx"]);

        let stems = read_pack_stems(&objects).unwrap();
        assert!(stems.contains("pack-aa"));
        assert!(stems.contains("pack-bb"));
        assert_eq!(stems.len(), 2);
    }

    #[test]
    fn missing_midx_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(read_pack_stems(tmp.path()).is_none());
    }

    #[test]
    fn truncated_midx_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let pack_dir = tmp.path().join("pack");
        std::fs::create_dir_all(&pack_dir).unwrap();
        std::fs::write(pack_dir.join("multi-pack-index"), b"MIDX\x01").unwrap();
        assert!(read_pack_stems(tmp.path()).is_none());
    }
}
