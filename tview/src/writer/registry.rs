use std::collections::HashMap;

use crate::domain::{ObjectId, SyncHandle, SyncKind};

/// One synchronization object as it will appear in the sync table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncObjectRecord {
    pub id: ObjectId,
    pub handle: SyncHandle,
    pub kind: SyncKind,
    pub name: Option<String>,
}

impl SyncObjectRecord {
    /// Explicit name, or the hex rendering of the handle
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.handle.to_string())
    }
}

/// Maps raw handles to dense per-trace object ids
///
/// Ids start at 1 and follow registration order. A handle seen again with a
/// different kind gets a fresh record, and lookups by handle return the most
/// recent one. Reuse of a handle with the same kind is not detected.
#[derive(Debug, Default)]
pub struct SyncRegistry {
    records: Vec<SyncObjectRecord>,
    latest: HashMap<SyncHandle, usize>,
}

impl SyncRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the current record for `handle`, registering one if needed
    pub fn identify(&mut self, handle: SyncHandle, kind: SyncKind) -> ObjectId {
        if let Some(&index) = self.latest.get(&handle) {
            let record = &self.records[index];
            if record.kind == kind {
                return record.id;
            }
        }

        let index = self.records.len();
        let id = ObjectId(index as u64 + 1);
        self.records.push(SyncObjectRecord {
            id,
            handle,
            kind,
            name: None,
        });
        self.latest.insert(handle, index);
        id
    }

    /// Attach a display name to every record for `handle` with this kind.
    ///
    /// Registers a record only if there is none yet. Returns the id of the
    /// most recent matching record.
    pub fn set_name(&mut self, handle: SyncHandle, kind: SyncKind, name: impl Into<String>) -> ObjectId {
        let name = name.into();
        let mut named = None;
        for record in self.records.iter_mut().filter(|r| r.handle == handle && r.kind == kind) {
            record.name = Some(name.clone());
            named = Some(record.id);
        }
        if let Some(id) = named {
            return id;
        }

        let id = self.identify(handle, kind);
        if let Some(record) = self.get_mut(id) {
            record.name = Some(name);
        }
        id
    }

    /// Display name of `id`, `None` if the id was never assigned
    #[must_use]
    pub fn name_for(&self, id: ObjectId) -> Option<String> {
        self.get(id).map(SyncObjectRecord::display_name)
    }

    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<&SyncObjectRecord> {
        let index = usize::try_from(id.0).ok()?.checked_sub(1)?;
        self.records.get(index)
    }

    fn get_mut(&mut self, id: ObjectId) -> Option<&mut SyncObjectRecord> {
        let index = usize::try_from(id.0).ok()?.checked_sub(1)?;
        self.records.get_mut(index)
    }

    /// Records in id order
    #[must_use]
    pub fn records(&self) -> &[SyncObjectRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identify_is_stable() {
        let mut registry = SyncRegistry::new();
        let a = registry.identify(SyncHandle(0xaa), SyncKind::Mutex);
        let b = registry.identify(SyncHandle(0xbb), SyncKind::Mutex);
        assert_eq!(a, ObjectId(1));
        assert_eq!(b, ObjectId(2));
        assert_eq!(registry.identify(SyncHandle(0xaa), SyncKind::Mutex), a);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_kind_change_creates_new_record() {
        let mut registry = SyncRegistry::new();
        let mutex = registry.identify(SyncHandle(0x10), SyncKind::Mutex);
        let condition = registry.identify(SyncHandle(0x10), SyncKind::Condition);
        assert_ne!(mutex, condition);
        // Latest registration wins for later lookups
        assert_eq!(registry.identify(SyncHandle(0x10), SyncKind::Condition), condition);
        assert_eq!(registry.records()[0].kind, SyncKind::Mutex);
    }

    #[test]
    fn test_default_name_is_hex_handle() {
        let mut registry = SyncRegistry::new();
        let id = registry.identify(SyncHandle(0xaa), SyncKind::Mutex);
        assert_eq!(registry.name_for(id).unwrap(), "0xaa");
        assert_eq!(registry.name_for(ObjectId(0)), None);
        assert_eq!(registry.name_for(ObjectId(9)), None);
    }

    #[test]
    fn test_set_name() {
        let mut registry = SyncRegistry::new();
        let id = registry.identify(SyncHandle(0xaa), SyncKind::Mutex);
        assert_eq!(registry.set_name(SyncHandle(0xaa), SyncKind::Mutex, "queue lock"), id);
        assert_eq!(registry.name_for(id).unwrap(), "queue lock");
    }

    #[test]
    fn test_set_name_finds_older_record_without_registering() {
        let mut registry = SyncRegistry::new();
        let mutex = registry.identify(SyncHandle(0x10), SyncKind::Mutex);
        let condition = registry.identify(SyncHandle(0x10), SyncKind::Condition);

        // The condition is the latest record for 0x10, the mutex is still named
        assert_eq!(registry.set_name(SyncHandle(0x10), SyncKind::Mutex, "state lock"), mutex);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.name_for(mutex).unwrap(), "state lock");
        assert_eq!(registry.name_for(condition).unwrap(), "0x10");
    }

    #[test]
    fn test_set_name_covers_every_matching_record() {
        let mut registry = SyncRegistry::new();
        let first = registry.identify(SyncHandle(0x20), SyncKind::Mutex);
        registry.identify(SyncHandle(0x20), SyncKind::Condition);
        let second = registry.identify(SyncHandle(0x20), SyncKind::Mutex);
        assert_ne!(first, second);

        registry.set_name(SyncHandle(0x20), SyncKind::Mutex, "pool lock");
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.name_for(first).unwrap(), "pool lock");
        assert_eq!(registry.name_for(second).unwrap(), "pool lock");
    }

    #[test]
    fn test_set_name_registers_unseen_object() {
        let mut registry = SyncRegistry::new();
        let id = registry.set_name(SyncHandle(0x30), SyncKind::Condition, "ready");
        assert_eq!(id, ObjectId(1));
        assert_eq!(registry.get(id).unwrap().kind, SyncKind::Condition);
        assert_eq!(registry.name_for(id).unwrap(), "ready");
    }
}
