//! Peak working-set estimate for a hypothetical repack.
//!
//! The terms mirror what pack-objects actually allocates per object,
//! with struct sizes taken from git's in-core layouts.

use keepr_repo::PackInfo;

use crate::settings::GcSettings;

/// pack-objects' per-object bookkeeping entry.
const OBJECT_ENTRY_SIZE: u64 = 80;
/// In-core blob struct (rev-list keeps roughly half of N as blobs).
const BLOB_SIZE: u64 = 32;
/// In-core tree struct (the other half).
const TREE_SIZE: u64 = 48;
/// One obj_hash[] slot.
const POINTER_SIZE: u64 = 8;
/// One reverse-index record.
const REVINDEX_ENTRY_SIZE: u64 = 16;

/// core.deltaBaseCacheLimit's default.
const DELTA_BASE_CACHE_LIMIT: u64 = 96 * 1024 * 1024;
/// pack.deltaCacheSize's default.
pub const DEFAULT_DELTA_CACHE_SIZE: u64 = 256 * 1024 * 1024;

pub use keepr_utils::proc::total_ram;

/// Approximate peak memory of repacking on top of `base_pack`, given
/// `nr_objects` objects in the store. 0 when there is nothing to size.
pub fn estimate_repack_memory(
    settings: &GcSettings,
    base_pack: Option<&PackInfo>,
    nr_objects: u64,
) -> u64 {
    let Some(pack) = base_pack else { return 0 };
    if nr_objects == 0 {
        return 0;
    }

    // The whole pack and its index end up in the OS page cache while
    // objects are scanned; budget for it so other processes are not
    // evicted.
    let os_cache = pack.pack_size + pack.index_size;

    let mut heap = OBJECT_ENTRY_SIZE * nr_objects;
    // rev-list --all --objects keeps blobs and trees in core, roughly
    // half of the objects each (commits and tags are noise).
    heap += BLOB_SIZE * nr_objects / 2;
    heap += TREE_SIZE * nr_objects / 2;
    // obj_hash[], an underestimate in practice.
    heap += POINTER_SIZE * nr_objects;
    heap += REVINDEX_ENTRY_SIZE * nr_objects;
    // Object reads fill the delta base cache, and pack-objects keeps
    // its own delta cache on top.
    heap += DELTA_BASE_CACHE_LIMIT;
    heap += settings.delta_cache_size;

    os_cache + heap
}
