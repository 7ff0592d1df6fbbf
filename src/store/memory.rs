//! In-memory resource store for tests and offline use.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use super::{
    AclDocument, Acr, Dataset, PolicyDocument, ResourceInfo, ResourceStore, StoreResult,
};
use crate::error::StoreError;

/// Kind of document written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Acl,
    Acr,
    PolicyDocument,
}

/// One write seen by the store, stamped with a logical clock.
#[derive(Debug, Clone)]
pub struct WriteRecord {
    pub iri: String,
    pub kind: WriteKind,
    /// Tick at which the write call was issued.
    pub started: u64,
    /// Tick at which the write call returned.
    pub finished: u64,
}

/// Resource store backed by hash maps.
pub struct MemoryResourceStore {
    resources: RwLock<HashMap<String, (ResourceInfo, Option<Dataset>)>>,
    acls: RwLock<HashMap<String, AclDocument>>,
    acrs: RwLock<HashMap<String, Acr>>,
    policy_documents: RwLock<HashMap<String, PolicyDocument>>,
    failures: RwLock<HashMap<String, StoreError>>,
    write_budget: Mutex<Option<(usize, StoreError)>>,
    empty_save_responses: AtomicBool,
    write_latency: Option<Duration>,
    clock: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    info_reads: AtomicUsize,
    writes: Mutex<Vec<WriteRecord>>,
}

impl MemoryResourceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            resources: RwLock::new(HashMap::new()),
            acls: RwLock::new(HashMap::new()),
            acrs: RwLock::new(HashMap::new()),
            policy_documents: RwLock::new(HashMap::new()),
            failures: RwLock::new(HashMap::new()),
            write_budget: Mutex::new(None),
            empty_save_responses: AtomicBool::new(false),
            write_latency: None,
            clock: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            info_reads: AtomicUsize::new(0),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Delay every write by `latency`, so overlapping writes become observable.
    pub fn with_write_latency(mut self, latency: Duration) -> Self {
        self.write_latency = Some(latency);
        self
    }

    /// Register a resource and its contents.
    pub fn put_resource(&self, info: ResourceInfo, dataset: Option<Dataset>) {
        self.resources
            .write()
            .insert(info.iri.clone(), (info, dataset));
    }

    pub fn put_acl(&self, acl: AclDocument) {
        self.acls.write().insert(acl.iri.clone(), acl);
    }

    pub fn put_acr(&self, acr: Acr) {
        self.acrs.write().insert(acr.iri.clone(), acr);
    }

    pub fn put_policy_document(&self, doc: PolicyDocument) {
        self.policy_documents.write().insert(doc.iri.clone(), doc);
    }

    /// Make every call touching `iri` fail with `error`.
    pub fn fail_on(&self, iri: impl Into<String>, error: StoreError) {
        self.failures.write().insert(iri.into(), error);
    }

    pub fn clear_failure(&self, iri: &str) {
        self.failures.write().remove(iri);
    }

    /// Let the next `allowed` writes through, then fail every write with
    /// `error` until [`clear_write_failure`](Self::clear_write_failure).
    pub fn fail_writes_after(&self, allowed: usize, error: StoreError) {
        *self.write_budget.lock() = Some((allowed, error));
    }

    pub fn clear_write_failure(&self) {
        *self.write_budget.lock() = None;
    }

    /// Make saves succeed server-side but return an empty response.
    pub fn set_empty_save_responses(&self, empty: bool) {
        self.empty_save_responses.store(empty, Ordering::SeqCst);
    }

    pub fn acl(&self, iri: &str) -> Option<AclDocument> {
        self.acls.read().get(iri).cloned()
    }

    pub fn acr(&self, iri: &str) -> Option<Acr> {
        self.acrs.read().get(iri).cloned()
    }

    pub fn policy_document(&self, iri: &str) -> Option<PolicyDocument> {
        self.policy_documents.read().get(iri).cloned()
    }

    /// Writes in the order they were issued.
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.lock().clone()
    }

    /// Largest number of writes observed in flight at once.
    pub fn max_concurrent_writes(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Number of metadata reads served.
    pub fn resource_info_reads(&self) -> usize {
        self.info_reads.load(Ordering::SeqCst)
    }

    fn check(&self, iri: &str) -> StoreResult<()> {
        match self.failures.read().get(iri) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn spend_write_budget(&self) -> StoreResult<()> {
        if let Some((remaining, error)) = self.write_budget.lock().as_mut() {
            if *remaining == 0 {
                return Err(error.clone());
            }
            *remaining -= 1;
        }
        Ok(())
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst)
    }

    async fn record_write<T, F>(&self, iri: &str, kind: WriteKind, apply: F) -> StoreResult<Option<T>>
    where
        F: FnOnce() -> T,
    {
        self.check(iri)?;
        self.spend_write_budget()?;
        let started = self.tick();
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(latency) = self.write_latency {
            tokio::time::sleep(latency).await;
        }
        let stored = apply();

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let finished = self.tick();
        self.writes.lock().push(WriteRecord {
            iri: iri.to_string(),
            kind,
            started,
            finished,
        });
        tracing::debug!(iri, ?kind, "memory store write");

        if self.empty_save_responses.load(Ordering::SeqCst) {
            Ok(None)
        } else {
            Ok(Some(stored))
        }
    }
}

impl Default for MemoryResourceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn get_resource_info(&self, iri: &str) -> StoreResult<ResourceInfo> {
        self.info_reads.fetch_add(1, Ordering::SeqCst);
        self.check(iri)?;
        self.resources
            .read()
            .get(iri)
            .map(|(info, _)| info.clone())
            .ok_or_else(|| StoreError::not_found(iri))
    }

    async fn get_dataset(&self, iri: &str) -> StoreResult<Option<Dataset>> {
        self.check(iri)?;
        match self.resources.read().get(iri) {
            Some((_, dataset)) => Ok(dataset.clone()),
            None => Err(StoreError::not_found(iri)),
        }
    }

    async fn get_acl(&self, acl_iri: &str) -> StoreResult<Option<AclDocument>> {
        self.check(acl_iri)?;
        Ok(self.acls.read().get(acl_iri).cloned())
    }

    async fn save_acl(&self, acl: AclDocument) -> StoreResult<Option<AclDocument>> {
        let iri = acl.iri.clone();
        self.record_write(&iri, WriteKind::Acl, || {
            self.acls.write().insert(iri.clone(), acl.clone());
            acl
        })
        .await
    }

    async fn get_acr(&self, acr_iri: &str) -> StoreResult<Option<Acr>> {
        self.check(acr_iri)?;
        Ok(self.acrs.read().get(acr_iri).cloned())
    }

    async fn save_acr(&self, acr: Acr) -> StoreResult<Option<Acr>> {
        let iri = acr.iri.clone();
        self.record_write(&iri, WriteKind::Acr, || {
            self.acrs.write().insert(iri.clone(), acr.clone());
            acr
        })
        .await
    }

    async fn get_policy_document(&self, iri: &str) -> StoreResult<Option<PolicyDocument>> {
        self.check(iri)?;
        Ok(self.policy_documents.read().get(iri).cloned())
    }

    async fn save_policy_document(&self, doc: PolicyDocument) -> StoreResult<Option<PolicyDocument>> {
        let iri = doc.iri.clone();
        self.record_write(&iri, WriteKind::PolicyDocument, || {
            self.policy_documents
                .write()
                .insert(iri.clone(), doc.clone());
            doc
        })
        .await
    }
}
