//! Configured remotes, as the fetch task and prune need them.

use crate::Repository;

impl Repository {
    /// Names of configured remotes, in config order.
    pub fn remotes(&self) -> Vec<String> {
        self.config().subsections("remote")
    }

    /// Is any remote a promisor (partial clone)? Prune must then leave
    /// objects the remote can resupply alone.
    pub fn has_promisor_remote(&self) -> bool {
        if let Ok(Some(name)) = self.config().get_string("extensions.partialClone") {
            if !name.is_empty() {
                return true;
            }
        }
        for remote in self.remotes() {
            if self
                .config()
                .get_bool(&format!("remote.{remote}.promisor"))
                .ok()
                .flatten()
                .unwrap_or(false)
            {
                return true;
            }
            if let Ok(Some(filter)) = self
                .config()
                .get_string(&format!("remote.{remote}.partialCloneFilter"))
            {
                if !filter.is_empty() {
                    return true;
                }
            }
        }
        false
    }
}
