use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tenantry_core::{AppError, AppResult};
use tenantry_domain::ClientKey;
use tokio::sync::Mutex;

/// One async mutex per client key, created on demand.
///
/// Entries nobody holds are pruned whenever a new key is registered.
#[derive(Default)]
pub(super) struct KeyLocks {
    locks: StdMutex<HashMap<ClientKey, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub(super) fn handle(&self, client_key: &ClientKey) -> AppResult<Arc<Mutex<()>>> {
        let mut locks = self.locks.lock().map_err(|error| {
            AppError::Internal(format!("failed to lock tenant key registry: {error}"))
        })?;

        if let Some(lock) = locks.get(client_key) {
            return Ok(Arc::clone(lock));
        }

        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        let lock = Arc::new(Mutex::new(()));
        locks.insert(client_key.clone(), Arc::clone(&lock));
        Ok(lock)
    }

    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}
