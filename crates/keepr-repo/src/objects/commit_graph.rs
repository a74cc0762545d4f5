//! Commit-graph membership queries.
//!
//! The probe only asks "is this commit already covered by the graph?";
//! ancestry data stays with the commit-graph worker. Both the single
//! `info/commit-graph` file and split chains are understood.

use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::oid::{HashAlgorithm, ObjectId};

const GRAPH_SIGNATURE: &[u8; 4] = b"CGPH";
const CHUNK_OID_FANOUT: u32 = 0x4f49_4446; // "OIDF"
const CHUNK_OID_LOOKUP: u32 = 0x4f49_444c; // "OIDL"

/// All commit-graph layers of one object directory.
///
/// Unreadable or corrupt layers are dropped silently: for the probe, a
/// broken graph is the same as no graph, and the commit-graph task will
/// rewrite it anyway.
pub struct CommitGraph {
    layers: Vec<GraphLayer>,
}

struct GraphLayer {
    data: Mmap,
    num_commits: usize,
    fanout: usize,
    oids: usize,
    digest: usize,
}

impl CommitGraph {
    pub fn open(objects_dir: &Path, algo: HashAlgorithm) -> Self {
        let mut layers = Vec::new();

        if let Some(layer) = GraphLayer::open(&objects_dir.join("info/commit-graph"), algo) {
            layers.push(layer);
        }

        let chain_dir = objects_dir.join("info/commit-graphs");
        if let Ok(chain) = std::fs::read_to_string(chain_dir.join("commit-graph-chain")) {
            for line in chain.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let path = chain_dir.join(format!("graph-{line}.graph"));
                if let Some(layer) = GraphLayer::open(&path, algo) {
                    layers.push(layer);
                }
            }
        }

        Self { layers }
    }

    /// Path of the split-chain marker file, the thing the commit-graph
    /// task deletes before a rewrite.
    pub fn chain_path(objects_dir: &Path) -> PathBuf {
        objects_dir.join("info/commit-graphs/commit-graph-chain")
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn num_commits(&self) -> u64 {
        self.layers.iter().map(|l| l.num_commits as u64).sum()
    }

    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.layers.iter().any(|l| l.contains(oid))
    }
}

impl GraphLayer {
    fn open(path: &Path, algo: HashAlgorithm) -> Option<Self> {
        let file = std::fs::File::open(path).ok()?;
        let data = unsafe { Mmap::map(&file) }.ok()?;

        // Header: CGPH | version | hash version | num chunks | base count
        if data.len() < 8 || &data[0..4] != GRAPH_SIGNATURE || data[4] != 1 {
            return None;
        }
        let num_chunks = data[6] as usize;

        let table = 8;
        if data.len() < table + (num_chunks + 1) * 12 {
            return None;
        }
        let mut fanout = None;
        let mut oids = None;
        for i in 0..num_chunks {
            let base = table + i * 12;
            let id = u32::from_be_bytes([
                data[base],
                data[base + 1],
                data[base + 2],
                data[base + 3],
            ]);
            let mut off = [0u8; 8];
            off.copy_from_slice(&data[base + 4..base + 12]);
            let off = u64::from_be_bytes(off) as usize;
            match id {
                CHUNK_OID_FANOUT => fanout = Some(off),
                CHUNK_OID_LOOKUP => oids = Some(off),
                _ => {}
            }
        }
        let fanout = fanout?;
        let oids = oids?;
        if data.len() < fanout + 256 * 4 {
            return None;
        }
        let num_commits = be32(&data, fanout + 255 * 4) as usize;
        let digest = algo.digest_len();
        if data.len() < oids + num_commits * digest {
            return None;
        }

        Some(Self {
            data,
            num_commits,
            fanout,
            oids,
            digest,
        })
    }

    fn contains(&self, oid: &ObjectId) -> bool {
        let first = oid.first_byte() as usize;
        let mut lo = if first == 0 {
            0
        } else {
            be32(&self.data, self.fanout + (first - 1) * 4) as usize
        };
        let mut hi = be32(&self.data, self.fanout + first * 4) as usize;
        if hi > self.num_commits {
            return false;
        }

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let at = self.oids + mid * self.digest;
            match oid.as_bytes().cmp(&self.data[at..at + self.digest]) {
                std::cmp::Ordering::Equal => return true,
                std::cmp::Ordering::Less => hi = mid,
                std::cmp::Ordering::Greater => lo = mid + 1,
            }
        }
        false
    }
}

fn be32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

/// Write a minimal single-layer graph file covering `oids`.
#[cfg(test)]
pub(crate) fn write_graph_fixture(objects_dir: &Path, hex_oids: &[&str]) {
    let mut oids: Vec<ObjectId> = hex_oids
        .iter()
        .map(|h| ObjectId::from_hex(h).unwrap())
        .collect();
    oids.sort();

    let mut data = Vec::new();
    data.extend_from_slice(GRAPH_SIGNATURE);
    data.push(1); // version
    data.push(1); // hash version: sha1
    data.push(2); // chunks: OIDF, OIDL
    data.push(0); // base graphs

    let table = 8;
    let after_table = table + 3 * 12;
    let fanout_off = after_table as u64;
    let oidl_off = fanout_off + 256 * 4;
    let end_off = oidl_off + (oids.len() * 20) as u64;

    data.extend_from_slice(&CHUNK_OID_FANOUT.to_be_bytes());
    data.extend_from_slice(&fanout_off.to_be_bytes());
    data.extend_from_slice(&CHUNK_OID_LOOKUP.to_be_bytes());
    data.extend_from_slice(&oidl_off.to_be_bytes());
    data.extend_from_slice(&0u32.to_be_bytes());
    data.extend_from_slice(&end_off.to_be_bytes());

    for bucket in 0..256usize {
        let count = oids
            .iter()
            .filter(|oid| (oid.first_byte() as usize) <= bucket)
            .count() as u32;
        data.extend_from_slice(&count.to_be_bytes());
    }
    for oid in &oids {
        data.extend_from_slice(oid.as_bytes());
    }

    let info = objects_dir.join("info");
    std::fs::create_dir_all(&info).unwrap();
    std::fs::write(info.join("commit-graph"), data).unwrap();
}
