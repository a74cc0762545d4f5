//! Object access for the housekeeping probes.
//!
//! This is deliberately a probe-grade reader: enough to count loose
//! objects, walk commit parents and answer commit-graph membership.
//! Nothing here writes to the store.

pub mod commit_graph;
pub mod loose;
pub(crate) mod midx;
pub mod pack_read;

use std::cell::OnceCell;
use std::path::{Path, PathBuf};

use crate::error::RepoError;
use crate::oid::{HashAlgorithm, ObjectId};
use commit_graph::CommitGraph;
use loose::LooseStore;
use pack_read::PackReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl ObjectType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "commit" => Some(ObjectType::Commit),
            "tree" => Some(ObjectType::Tree),
            "blob" => Some(ObjectType::Blob),
            "tag" => Some(ObjectType::Tag),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ObjectType::Commit => "commit",
            ObjectType::Tree => "tree",
            ObjectType::Blob => "blob",
            ObjectType::Tag => "tag",
        }
    }
}

/// Read-only view over the object directory and its alternates.
///
/// Pack readers and the commit-graph are opened lazily and live only as
/// long as this value; probes drop it before any destructive worker
/// runs, so no file stays mapped across a repack.
pub struct ObjectStore {
    /// Own object directory first, then alternates.
    dirs: Vec<PathBuf>,
    algo: HashAlgorithm,
    loose: LooseStore,
    packs: OnceCell<Vec<PackReader>>,
    graph: OnceCell<CommitGraph>,
}

impl ObjectStore {
    pub fn new(objects_dir: impl AsRef<Path>, algo: HashAlgorithm) -> Self {
        let objects_dir = objects_dir.as_ref().to_path_buf();
        let mut dirs = vec![objects_dir.clone()];
        dirs.extend(read_alternate_dirs(&objects_dir));
        Self {
            loose: LooseStore::new(&objects_dir, algo),
            dirs,
            algo,
            packs: OnceCell::new(),
            graph: OnceCell::new(),
        }
    }

    /// The repository's own loose store (alternates are never counted
    /// by the trigger probes, only consulted for object reads).
    pub fn loose(&self) -> &LooseStore {
        &self.loose
    }

    pub fn commit_graph(&self) -> &CommitGraph {
        self.graph
            .get_or_init(|| CommitGraph::open(&self.dirs[0], self.algo))
    }

    fn packs(&self) -> &[PackReader] {
        self.packs.get_or_init(|| {
            let mut readers = Vec::new();
            for dir in &self.dirs {
                let pack_dir = dir.join("pack");
                let Ok(entries) = std::fs::read_dir(&pack_dir) else {
                    continue;
                };
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) != Some("pack") {
                        continue;
                    }
                    // A pack with a missing or unreadable index is
                    // invisible here; repack will regenerate it.
                    if let Ok(reader) = PackReader::open(&path, self.algo) {
                        readers.push(reader);
                    }
                }
            }
            readers
        })
    }

    /// Read an object from wherever it lives. `Ok(None)` when absent.
    pub fn read_raw(&self, oid: &ObjectId) -> Result<Option<(ObjectType, Vec<u8>)>, RepoError> {
        for dir in &self.dirs {
            let store = if dir == &self.dirs[0] {
                // Reuse the primary store rather than re-deriving it.
                None
            } else {
                Some(LooseStore::new(dir, self.algo))
            };
            let loose = store.as_ref().unwrap_or(&self.loose);
            if let Some(found) = loose.read(oid)? {
                return Ok(Some(found));
            }
        }
        for pack in self.packs() {
            if let Some(offset) = pack.lookup(oid) {
                let resolve = |base: &ObjectId| self.read_raw(base).ok().flatten();
                return pack.read_at(offset, &resolve).map(Some);
            }
        }
        Ok(None)
    }

    /// Parents of a commit. `Ok(None)` when the object is absent,
    /// an error when it exists but is not a commit.
    pub fn commit_parents(&self, oid: &ObjectId) -> Result<Option<Vec<ObjectId>>, RepoError> {
        match self.read_raw(oid)? {
            None => Ok(None),
            Some((ObjectType::Commit, body)) => parse_commit_parents(&body).map(Some),
            Some((other, _)) => Err(RepoError::corrupt(
                format!("object {oid}"),
                format!("expected commit, found {}", other.name()),
            )),
        }
    }

    /// Follow tag indirection until a commit (or give up).
    pub fn peel_to_commit(&self, oid: &ObjectId) -> Result<Option<ObjectId>, RepoError> {
        let mut cursor = *oid;
        for _ in 0..16 {
            if self.commit_graph().contains(&cursor) {
                return Ok(Some(cursor));
            }
            match self.read_raw(&cursor)? {
                None => return Ok(None),
                Some((ObjectType::Commit, _)) => return Ok(Some(cursor)),
                Some((ObjectType::Tag, body)) => match parse_tag_target(&body)? {
                    Some(target) => cursor = target,
                    None => return Ok(None),
                },
                Some(_) => return Ok(None),
            }
        }
        Ok(None)
    }
}

/// Parse the `parent <oid>` headers of a commit body.
fn parse_commit_parents(body: &[u8]) -> Result<Vec<ObjectId>, RepoError> {
    let mut parents = Vec::new();
    for line in body.split(|&b| b == b'\n') {
        if line.is_empty() {
            break; // end of headers
        }
        if let Some(hex) = line.strip_prefix(b"parent ") {
            let hex = std::str::from_utf8(hex)
                .map_err(|_| RepoError::corrupt("commit", "non-ASCII parent line"))?;
            parents.push(ObjectId::from_hex(hex)?);
        }
    }
    Ok(parents)
}

/// The `object <oid>` header of a tag body.
fn parse_tag_target(body: &[u8]) -> Result<Option<ObjectId>, RepoError> {
    for line in body.split(|&b| b == b'\n') {
        if line.is_empty() {
            break;
        }
        if let Some(hex) = line.strip_prefix(b"object ") {
            let hex = std::str::from_utf8(hex)
                .map_err(|_| RepoError::corrupt("tag", "non-ASCII object line"))?;
            return Ok(Some(ObjectId::from_hex(hex)?));
        }
    }
    Ok(None)
}

fn read_alternate_dirs(objects_dir: &Path) -> Vec<PathBuf> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::loose::encode_loose;

    const ROOT: &str = "aa11000000000000000000000000000000000001";
    const CHILD: &str = "bb22000000000000000000000000000000000002";
    const TAG: &str = "cc33000000000000000000000000000000000003";

    fn put_loose(objects: &Path, hex: &str, obj_type: ObjectType, content: &[u8]) {
        let dir = objects.join(&hex[..2]);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(&hex[2..]), encode_loose(obj_type, content)).unwrap();
    }

    fn commit_body(parents: &[&str]) -> Vec<u8> {
        let mut body = format!("tree {}\n", "e0".repeat(20));
        for p in parents {
            body.push_str(&format!("parent {p}\n"));
        }
        body.push_str("author A <a@example.com> 1700000000 +0000\n");
        body.push_str("committer A <a@example.com> 1700000000 +0000\n");
        body.push('\n');
        body.push_str("message\n");
        body.into_bytes()
    }

    #[test]
    fn commit_parents_from_loose() {
        let tmp = tempfile::tempdir().unwrap();
        let objects = tmp.path().join("objects");
        put_loose(&objects, ROOT, ObjectType::Commit, &commit_body(&[]));
        put_loose(&objects, CHILD, ObjectType::Commit, &commit_body(&[ROOT]));

        let store = ObjectStore::new(&objects, HashAlgorithm::Sha1);
        let parents = store
            .commit_parents(&ObjectId::from_hex(CHILD).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].to_hex(), ROOT);

        let none = store
            .commit_parents(&ObjectId::from_hex(ROOT).unwrap())
            .unwrap()
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn peel_tag_to_commit() {
        let tmp = tempfile::tempdir().unwrap();
        let objects = tmp.path().join("objects");
        put_loose(&objects, ROOT, ObjectType::Commit, &commit_body(&[]));
        let tag_body = format!(
            "object {ROOT}\ntype commit\ntag v1\ntagger A <a@example.com> 1700000000 +0000\n\nv1\n"
        );
        put_loose(&objects, TAG, ObjectType::Tag, tag_body.as_bytes());

        let store = ObjectStore::new(&objects, HashAlgorithm::Sha1);
        let peeled = store
            .peel_to_commit(&ObjectId::from_hex(TAG).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(peeled.to_hex(), ROOT);
    }

    #[test]
    fn missing_object_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let objects = tmp.path().join("objects");
        std::fs::create_dir_all(&objects).unwrap();
        let store = ObjectStore::new(&objects, HashAlgorithm::Sha1);
        let oid = ObjectId::from_hex(ROOT).unwrap();
        assert!(store.read_raw(&oid).unwrap().is_none());
        assert!(store.peel_to_commit(&oid).unwrap().is_none());
    }

    #[test]
    fn graph_membership_short_circuits_peel() {
        let tmp = tempfile::tempdir().unwrap();
        let objects = tmp.path().join("objects");
        std::fs::create_dir_all(&objects).unwrap();
        // The commit is in the graph but pruned from the store.
        commit_graph::write_graph_fixture(&objects, &[ROOT]);

        let store = ObjectStore::new(&objects, HashAlgorithm::Sha1);
        let peeled = store
            .peel_to_commit(&ObjectId::from_hex(ROOT).unwrap())
            .unwrap();
        assert_eq!(peeled.unwrap().to_hex(), ROOT);
    }
}
