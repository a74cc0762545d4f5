//! Reference enumeration: loose files under `refs/` plus `packed-refs`.
//!
//! Only what the commit-graph probe needs: names, targets and the
//! pre-peeled values packed-refs already carries. Symbolic refs are
//! skipped; HEAD is reachable through whatever branch it names.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::RepoError;
use crate::oid::ObjectId;

#[derive(Debug, Clone)]
pub struct Reference {
    pub name: String,
    pub target: ObjectId,
    /// Peeled tag value from a `^` line in packed-refs.
    pub peeled: Option<ObjectId>,
}

pub(crate) fn enumerate(common_dir: &Path) -> Result<Vec<Reference>, RepoError> {
    let mut refs: BTreeMap<String, Reference> = BTreeMap::new();

    // packed-refs first; loose files override entries packed earlier.
    if let Ok(contents) = std::fs::read_to_string(common_dir.join("packed-refs")) {
        let mut last: Option<String> = None;
        for line in contents.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(hex) = line.strip_prefix('^') {
                if let Some(name) = &last {
                    if let (Some(entry), Ok(peeled)) =
                        (refs.get_mut(name), ObjectId::from_hex(hex))
                    {
                        entry.peeled = Some(peeled);
                    }
                }
                continue;
            }
            let Some((hex, name)) = line.split_once(' ') else {
                continue;
            };
            let Ok(target) = ObjectId::from_hex(hex) else {
                continue;
            };
            refs.insert(
                name.to_string(),
                Reference {
                    name: name.to_string(),
                    target,
                    peeled: None,
                },
            );
            last = Some(name.to_string());
        }
    }

    let refs_dir = common_dir.join("refs");
    if refs_dir.is_dir() {
        collect_loose(&refs_dir, "refs", &mut refs)?;
    }

    Ok(refs.into_values().collect())
}

fn collect_loose(
    dir: &Path,
    prefix: &str,
    out: &mut BTreeMap<String, Reference>,
) -> Result<(), RepoError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(file_name) = entry.file_name().into_string().ok() else {
            continue;
        };
        let name = format!("{prefix}/{file_name}");
        if path.is_dir() {
            collect_loose(&path, &name, out)?;
            continue;
        }
        if file_name.ends_with(".lock") {
            continue;
        }
        let Ok(contents) = std::fs::read_to_string(&path) else {
            continue;
        };
        let contents = contents.trim();
        if contents.starts_with("ref:") {
            continue;
        }
        if let Ok(target) = ObjectId::from_hex(contents) {
            out.insert(
                name.clone(),
                Reference {
                    name,
                    target,
                    peeled: None,
                },
            );
        }
    }
    Ok(())
}
