//! Boundary operations consumed by the HTTP layer.

pub mod report;
pub mod sync;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-fiche operation lock. Render and Send on the same record would
/// otherwise race on the generated artifact and the persisted status;
/// operations on different records stay fully parallel.
#[derive(Default)]
pub struct FicheLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl FicheLocks {
    pub fn new() -> FicheLocks {
        FicheLocks::default()
    }

    pub async fn acquire(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap();
            map.entry(id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
