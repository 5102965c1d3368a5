// Driver registry for looking up radio drivers by vendor and model

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Information about a radio driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverInfo {
    pub vendor: String,
    pub model: String,
    pub description: String,
    pub is_clone_mode: bool,
}

impl DriverInfo {
    pub fn new(
        vendor: impl Into<String>,
        model: impl Into<String>,
        description: impl Into<String>,
        is_clone_mode: bool,
    ) -> Self {
        Self {
            vendor: vendor.into(),
            model: model.into(),
            description: description.into(),
            is_clone_mode,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.vendor, self.model)
    }
}

lazy_static::lazy_static! {
    static ref DRIVER_REGISTRY: Mutex<HashMap<String, DriverInfo>> = Mutex::new(HashMap::new());
}

fn registry() -> MutexGuard<'static, HashMap<String, DriverInfo>> {
    // Entries are plain data, so a poisoned lock still holds a usable map
    DRIVER_REGISTRY
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

fn key(vendor: &str, model: &str) -> String {
    format!("{}::{}", vendor, model)
}

/// Register a driver, replacing any earlier entry for the same model
pub fn register_driver(info: DriverInfo) {
    registry().insert(key(&info.vendor, &info.model), info);
}

pub fn get_driver(vendor: &str, model: &str) -> Option<DriverInfo> {
    registry().get(&key(vendor, model)).cloned()
}

/// All registered drivers, sorted by vendor then model
pub fn list_drivers() -> Vec<DriverInfo> {
    let mut drivers: Vec<DriverInfo> = registry().values().cloned().collect();
    drivers.sort_by(|a, b| (&a.vendor, &a.model).cmp(&(&b.vendor, &b.model)));
    drivers
}
