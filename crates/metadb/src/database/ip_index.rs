//! IP address → cluster object index

use crate::models::HasIps;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Map from IP string to the object currently believed to own it.
///
/// Each bulk insert/remove runs under a single write lock, so readers never
/// see a half-applied object. Writes are last-writer-wins per IP.
pub(crate) struct IpIndex<T> {
    entries: RwLock<HashMap<String, Arc<T>>>,
}

impl<T: HasIps> IpIndex<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<T>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<T>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Map every IP of `obj` to it, overwriting previous owners
    pub(crate) fn insert_all(&self, obj: &Arc<T>) {
        if obj.ips().is_empty() {
            return;
        }
        let mut entries = self.write();
        for ip in obj.ips() {
            entries.insert(ip.clone(), Arc::clone(obj));
        }
    }

    /// Unmap every IP of `obj`.
    ///
    /// Removal is by key only: if an IP was already reassigned to another
    /// object, that newer mapping is dropped too.
    pub(crate) fn remove_all(&self, obj: &T) {
        if obj.ips().is_empty() {
            return;
        }
        let mut entries = self.write();
        for ip in obj.ips() {
            entries.remove(ip);
        }
    }

    pub(crate) fn get(&self, ip: &str) -> Option<Arc<T>> {
        self.read().get(ip).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.read().len()
    }
}
