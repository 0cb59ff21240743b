use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::Address;
use uuid::Uuid;

use safe_authz_core::{
    PortError, PublishStatus, PushSyncRecord, StorePort, TransactionDescription,
};

/// Process-local persistence for descriptions, subscriptions and push sync.
#[derive(Debug, Clone, Default)]
pub struct MemoryStoreAdapter {
    inner: Arc<Mutex<StoreState>>,
}

#[derive(Debug, Default)]
struct StoreState {
    last_synced_push: Option<PushSyncRecord>,
    subscribed_safes: BTreeSet<Address>,
    descriptions: HashMap<Uuid, TransactionDescription>,
}

impl MemoryStoreAdapter {
    fn state(&self) -> Result<MutexGuard<'_, StoreState>, PortError> {
        self.inner
            .lock()
            .map_err(|e| PortError::Transport(format!("store lock poisoned: {e}")))
    }

    /// Descriptions ordered by submission time, oldest first.
    pub fn descriptions(&self) -> Result<Vec<TransactionDescription>, PortError> {
        let g = self.state()?;
        let mut out: Vec<TransactionDescription> = g.descriptions.values().cloned().collect();
        out.sort_by_key(|d| d.submitted_at.0);
        Ok(out)
    }
}

impl StorePort for MemoryStoreAdapter {
    fn last_synced_push(&self) -> Result<Option<PushSyncRecord>, PortError> {
        Ok(self.state()?.last_synced_push.clone())
    }

    fn save_last_synced_push(&self, record: &PushSyncRecord) -> Result<(), PortError> {
        self.state()?.last_synced_push = Some(record.clone());
        Ok(())
    }

    fn subscribed_safes(&self) -> Result<BTreeSet<Address>, PortError> {
        Ok(self.state()?.subscribed_safes.clone())
    }

    fn save_subscribed_safes(&self, safes: &BTreeSet<Address>) -> Result<(), PortError> {
        self.state()?.subscribed_safes = safes.clone();
        Ok(())
    }

    fn save_description(&self, description: &TransactionDescription) -> Result<(), PortError> {
        self.state()?
            .descriptions
            .insert(description.id, description.clone());
        Ok(())
    }

    fn load_description(&self, id: Uuid) -> Result<Option<TransactionDescription>, PortError> {
        Ok(self.state()?.descriptions.get(&id).cloned())
    }

    fn update_publish_status(&self, id: Uuid, status: PublishStatus) -> Result<(), PortError> {
        let mut g = self.state()?;
        let description = g
            .descriptions
            .get_mut(&id)
            .ok_or_else(|| PortError::NotFound(format!("transaction description missing: {id}")))?;
        description.status = status;
        Ok(())
    }
}
