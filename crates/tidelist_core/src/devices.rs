//! Per-account device registry.

use crate::error::CoreResult;
use crate::types::{DeviceId, OwnerId, Timestamp};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;

/// Display name given to devices that have never introduced themselves.
const PLACEHOLDER_NAME: &str = "unnamed device";

/// One device known to an account.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    /// Device identifier.
    pub device_id: DeviceId,
    /// Human-readable name.
    pub display_name: String,
    /// When the device last synced.
    pub last_sync_at: Timestamp,
}

/// Tracks the devices of each account and when they last synced.
///
/// Records are upserted on every sync call and never deleted by the sync
/// path.
pub struct DeviceRegistry {
    accounts: RwLock<HashMap<OwnerId, Vec<DeviceRecord>>>,
}

impl DeviceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
        }
    }

    /// Records a sync from `device`, inserting a record with a placeholder
    /// display name on first sight.
    pub fn touch(&self, owner: &OwnerId, device: &DeviceId, now: Timestamp) -> CoreResult<()> {
        let mut accounts = self.accounts.write();
        let records = accounts.entry(owner.clone()).or_default();
        match records.iter_mut().find(|r| &r.device_id == device) {
            Some(record) => record.last_sync_at = now,
            None => records.push(DeviceRecord {
                device_id: device.clone(),
                display_name: PLACEHOLDER_NAME.to_string(),
                last_sync_at: now,
            }),
        }
        Ok(())
    }

    /// Returns the device records of an account.
    pub fn list(&self, owner: &OwnerId) -> CoreResult<Vec<DeviceRecord>> {
        Ok(self
            .accounts
            .read()
            .get(owner)
            .cloned()
            .unwrap_or_default())
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
