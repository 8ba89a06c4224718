//! # Reference Index
//!
//! A watch-fed object cache with field indexes, one per referencing kind.
//!
//! Extractor functions are registered per kind and field key. Each object seen on a
//! kind's watch stream is stored and its extracted values are indexed by
//! `(field key, namespace, value)`, so "which objects in namespace N reference
//! secret S" is a map lookup rather than a scan.
//!
//! The index is eventually consistent with the cluster. Until a kind completes its
//! first list every query against it fails with `StoreError::NotSynced`; a kind whose
//! list returns 404 (its CRD is not installed) answers `StoreError::NotFound`.

use crate::constants::SECRET_REF_INDEX_KEY;
use crate::crd::{secret_ref_index_fn, ExtractorFn, ReferenceKind};
use crate::store::{ObjectKey, ReferenceLookup, StoreError};
use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::ResourceExt;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

pub mod watch;

pub use watch::{
    apply_event, apply_watch_error, start_index_watches, watch_error_effect, WatchErrorEffect,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Registered, initial list not complete
    Pending,
    /// Initial list complete, kept current by watch events
    Synced,
    /// The cluster does not serve this kind
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EntryKey {
    field_key: String,
    namespace: String,
    value: String,
}

#[derive(Debug, Default)]
struct IndexData {
    objects: HashMap<ObjectKey, Arc<DynamicObject>>,
    entries: HashMap<EntryKey, BTreeSet<ObjectKey>>,
}

impl IndexData {
    fn insert_entries(&mut self, key: &ObjectKey, obj: &DynamicObject, field_key: &str, extractor: ExtractorFn) {
        let namespace = key.namespace.clone().unwrap_or_default();
        for value in extractor(obj) {
            self.entries
                .entry(EntryKey {
                    field_key: field_key.to_string(),
                    namespace: namespace.clone(),
                    value,
                })
                .or_default()
                .insert(key.clone());
        }
    }

    fn remove_entries(&mut self, key: &ObjectKey, obj: &DynamicObject, field_key: &str, extractor: ExtractorFn) {
        let namespace = key.namespace.clone().unwrap_or_default();
        for value in extractor(obj) {
            let entry_key = EntryKey {
                field_key: field_key.to_string(),
                namespace: namespace.clone(),
                value,
            };
            if let Some(set) = self.entries.get_mut(&entry_key) {
                set.remove(key);
                if set.is_empty() {
                    self.entries.remove(&entry_key);
                }
            }
        }
    }

    fn upsert(&mut self, obj: DynamicObject, extractors: &[(String, ExtractorFn)]) {
        let key = object_key(&obj);
        self.remove(&key, extractors);
        for (field_key, extractor) in extractors {
            self.insert_entries(&key, &obj, field_key, *extractor);
        }
        self.objects.insert(key, Arc::new(obj));
    }

    fn remove(&mut self, key: &ObjectKey, extractors: &[(String, ExtractorFn)]) {
        if let Some(old) = self.objects.remove(key) {
            for (field_key, extractor) in extractors {
                self.remove_entries(key, &old, field_key, *extractor);
            }
        }
    }

    fn reindex(&mut self, field_key: &str, extractor: ExtractorFn) {
        let objects: Vec<(ObjectKey, Arc<DynamicObject>)> = self
            .objects
            .iter()
            .map(|(k, o)| (k.clone(), Arc::clone(o)))
            .collect();
        for (key, obj) in objects {
            self.insert_entries(&key, &obj, field_key, extractor);
        }
    }
}

#[derive(Debug)]
struct KindIndex {
    state: SyncState,
    extractors: Vec<(String, ExtractorFn)>,
    live: IndexData,
    resync: Option<IndexData>,
}

impl KindIndex {
    fn new() -> Self {
        Self {
            state: SyncState::Pending,
            extractors: Vec::new(),
            live: IndexData::default(),
            resync: None,
        }
    }
}

fn object_key(obj: &DynamicObject) -> ObjectKey {
    ObjectKey::new(obj.namespace().as_deref(), &obj.name_any())
}

/// Field indexes over the referencing kinds
#[derive(Debug, Default)]
pub struct FieldIndexer {
    kinds: RwLock<HashMap<ReferenceKind, KindIndex>>,
}

impl FieldIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extractor for `field_key` on `kind`
    ///
    /// Objects already cached for the kind are indexed immediately. Registering the
    /// same field key twice for a kind fails with `StoreError::IndexConflict`.
    pub fn register_index(
        &self,
        kind: &ReferenceKind,
        field_key: &str,
        extractor: ExtractorFn,
    ) -> Result<(), StoreError> {
        let mut kinds = self.kinds.write().unwrap_or_else(PoisonError::into_inner);
        let index = kinds.entry(*kind).or_insert_with(KindIndex::new);
        if index.extractors.iter().any(|(k, _)| k == field_key) {
            return Err(StoreError::IndexConflict {
                kind: kind.kind,
                field_key: field_key.to_string(),
            });
        }
        index.live.reindex(field_key, extractor);
        if let Some(resync) = index.resync.as_mut() {
            resync.reindex(field_key, extractor);
        }
        index.extractors.push((field_key.to_string(), extractor));
        Ok(())
    }

    /// Start a fresh generation for `kind`; live queries keep using the old one
    pub fn begin_resync(&self, kind: &ReferenceKind) {
        self.with_kind(kind, |index| index.resync = Some(IndexData::default()));
    }

    /// Add an object to the generation being rebuilt by a resync
    pub fn resync_apply(&self, kind: &ReferenceKind, obj: DynamicObject) {
        self.with_kind(kind, |index| {
            let extractors = index.extractors.clone();
            index
                .resync
                .get_or_insert_with(IndexData::default)
                .upsert(obj, &extractors);
        });
    }

    /// Swap in the rebuilt generation and mark the kind synced
    pub fn finish_resync(&self, kind: &ReferenceKind) {
        self.with_kind(kind, |index| {
            if let Some(fresh) = index.resync.take() {
                index.live = fresh;
            }
            index.state = SyncState::Synced;
        });
    }

    /// Insert or replace an object from a live watch event
    pub fn apply(&self, kind: &ReferenceKind, obj: DynamicObject) {
        self.with_kind(kind, |index| {
            let extractors = index.extractors.clone();
            index.live.upsert(obj, &extractors);
        });
    }

    /// Remove an object from a live watch event
    pub fn delete(&self, kind: &ReferenceKind, obj: &DynamicObject) {
        self.with_kind(kind, |index| {
            let extractors = index.extractors.clone();
            index.live.remove(&object_key(obj), &extractors);
        });
    }

    /// The cluster does not serve `kind`; drop its objects
    pub fn mark_unavailable(&self, kind: &ReferenceKind) {
        self.with_kind(kind, |index| {
            index.live = IndexData::default();
            index.resync = None;
            index.state = SyncState::Unavailable;
        });
    }

    /// Sync state of `kind`, `None` when nothing is registered for it
    pub fn sync_state(&self, kind: &ReferenceKind) -> Option<SyncState> {
        let kinds = self.kinds.read().unwrap_or_else(PoisonError::into_inner);
        kinds.get(kind).map(|index| index.state)
    }

    /// True once every registered kind has synced or been found unavailable
    pub fn all_settled(&self) -> bool {
        let kinds = self.kinds.read().unwrap_or_else(PoisonError::into_inner);
        kinds.values().all(|index| index.state != SyncState::Pending)
    }

    /// Number of cached objects for `kind`
    pub fn indexed_objects(&self, kind: &ReferenceKind) -> usize {
        let kinds = self.kinds.read().unwrap_or_else(PoisonError::into_inner);
        kinds.get(kind).map_or(0, |index| index.live.objects.len())
    }

    /// Up to `limit` objects of `kind` in `namespace` whose `field_key` value is `value`
    ///
    /// Results are ordered by object key.
    pub fn list(
        &self,
        kind: &ReferenceKind,
        field_key: &str,
        namespace: &str,
        value: &str,
        limit: usize,
    ) -> Result<Vec<ObjectKey>, StoreError> {
        let kinds = self.kinds.read().unwrap_or_else(PoisonError::into_inner);
        let index = kinds
            .get(kind)
            .ok_or_else(|| StoreError::NotFound(format!("no index registered for {kind}")))?;
        if !index.extractors.iter().any(|(k, _)| k == field_key) {
            return Err(StoreError::UnknownIndex {
                kind: kind.kind,
                field_key: field_key.to_string(),
            });
        }
        match index.state {
            SyncState::Unavailable => Err(StoreError::NotFound(format!(
                "{} is not served by the cluster",
                kind.plural
            ))),
            SyncState::Pending => Err(StoreError::NotSynced { kind: kind.kind }),
            SyncState::Synced => {
                let key = EntryKey {
                    field_key: field_key.to_string(),
                    namespace: namespace.to_string(),
                    value: value.to_string(),
                };
                Ok(index
                    .live
                    .entries
                    .get(&key)
                    .map(|set| set.iter().take(limit).cloned().collect())
                    .unwrap_or_default())
            }
        }
    }

    fn with_kind<F>(&self, kind: &ReferenceKind, f: F)
    where
        F: FnOnce(&mut KindIndex),
    {
        let mut kinds = self.kinds.write().unwrap_or_else(PoisonError::into_inner);
        f(kinds.entry(*kind).or_insert_with(KindIndex::new));
    }
}

#[async_trait]
impl ReferenceLookup for FieldIndexer {
    async fn list_referencing(
        &self,
        kind: &ReferenceKind,
        namespace: &str,
        secret_name: &str,
        limit: usize,
    ) -> Result<Vec<ObjectKey>, StoreError> {
        self.list(kind, SECRET_REF_INDEX_KEY, namespace, secret_name, limit)
    }
}

/// Register the secret reference index for every kind in `kinds`
pub fn register_reference_indexes(
    indexer: &FieldIndexer,
    kinds: &[ReferenceKind],
) -> Result<(), StoreError> {
    for kind in kinds {
        indexer.register_index(kind, SECRET_REF_INDEX_KEY, secret_ref_index_fn)?;
    }
    Ok(())
}
