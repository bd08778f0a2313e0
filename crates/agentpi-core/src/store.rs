// crates/agentpi-core/src/store.rs
// ============================================================================
// Module: AgentPI In-Memory Stores
// Description: Mutex-protected replay and idempotency stores plus shared wrappers.
// Purpose: Provide deterministic store implementations without external deps.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! In-memory implementations of [`JtiStore`] and [`IdempotencyStore`] for
//! single-process deployments, tests, and demos. Admission is a
//! check-and-insert under one lock, which satisfies the atomicity contract;
//! expired entries are dropped lazily on access. Database-backed deployments
//! substitute their own implementations behind the same traits.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use crate::core::identifiers::OrgId;
use crate::core::identifiers::ToolId;
use crate::core::time::UnixSeconds;
use crate::core::time::now_unix;
use crate::interfaces::IdempotencyRecord;
use crate::interfaces::IdempotencyStore;
use crate::interfaces::JtiStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: In-Memory Replay Store
// ============================================================================

/// In-memory replay guard keyed by grant identifier.
#[derive(Debug, Default, Clone)]
pub struct MemoryJtiStore {
    /// Admitted grant identifiers mapped to their expiry, behind one lock.
    used: Arc<Mutex<BTreeMap<String, UnixSeconds>>>,
}

impl MemoryJtiStore {
    /// Creates an empty replay store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl JtiStore for MemoryJtiStore {
    fn has(&self, jti: &str) -> Result<bool, StoreError> {
        let mut guard =
            self.used.lock().map_err(|_| StoreError::Store("jti store mutex poisoned".to_string()))?;
        let now = now_unix();
        match guard.get(jti) {
            Some(expires_at) if *expires_at > now => Ok(true),
            Some(_) => {
                guard.remove(jti);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    fn add(&self, jti: &str, expires_at: UnixSeconds) -> Result<(), StoreError> {
        let mut guard =
            self.used.lock().map_err(|_| StoreError::Store("jti store mutex poisoned".to_string()))?;
        let now = now_unix();
        if let Some(existing) = guard.get(jti)
            && *existing > now
        {
            return Err(StoreError::AlreadyExists(jti.to_string()));
        }
        guard.insert(jti.to_string(), expires_at);
        Ok(())
    }
}

// ============================================================================
// SECTION: In-Memory Idempotency Store
// ============================================================================

/// In-memory idempotency record store keyed by (key, org, tool).
#[derive(Debug, Default, Clone)]
pub struct MemoryIdempotencyStore {
    /// Records keyed by the composite tuple key, behind one lock.
    entries: Arc<Mutex<BTreeMap<String, IdempotencyRecord>>>,
}

impl MemoryIdempotencyStore {
    /// Creates an empty idempotency store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdempotencyStore for MemoryIdempotencyStore {
    fn get(
        &self,
        key: &str,
        org_id: &OrgId,
        tool_id: &ToolId,
    ) -> Result<Option<IdempotencyRecord>, StoreError> {
        let composite = record_key(key, org_id, tool_id);
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| StoreError::Store("idempotency store mutex poisoned".to_string()))?;
        let now = now_unix();
        match guard.get(&composite) {
            Some(record) if record.expires_at > now => Ok(Some(record.clone())),
            Some(_) => {
                guard.remove(&composite);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(
        &self,
        key: &str,
        org_id: &OrgId,
        tool_id: &ToolId,
        record: IdempotencyRecord,
    ) -> Result<(), StoreError> {
        let composite = record_key(key, org_id, tool_id);
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| StoreError::Store("idempotency store mutex poisoned".to_string()))?;
        let now = now_unix();
        if let Some(existing) = guard.get(&composite)
            && existing.expires_at > now
        {
            return Err(StoreError::AlreadyExists(composite));
        }
        guard.insert(composite, record);
        Ok(())
    }
}

/// Builds the composite tuple key for idempotency records.
fn record_key(key: &str, org_id: &OrgId, tool_id: &ToolId) -> String {
    format!("{key}:{org_id}:{tool_id}")
}

// ============================================================================
// SECTION: Shared Store Wrappers
// ============================================================================

/// Shared replay store backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedJtiStore {
    /// Inner store implementation.
    inner: Arc<dyn JtiStore>,
}

impl SharedJtiStore {
    /// Wraps a replay store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl JtiStore + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared store.
    #[must_use]
    pub const fn new(store: Arc<dyn JtiStore>) -> Self {
        Self {
            inner: store,
        }
    }
}

impl JtiStore for SharedJtiStore {
    fn has(&self, jti: &str) -> Result<bool, StoreError> {
        self.inner.has(jti)
    }

    fn add(&self, jti: &str, expires_at: UnixSeconds) -> Result<(), StoreError> {
        self.inner.add(jti, expires_at)
    }
}

/// Shared idempotency store backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedIdempotencyStore {
    /// Inner store implementation.
    inner: Arc<dyn IdempotencyStore>,
}

impl SharedIdempotencyStore {
    /// Wraps an idempotency store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl IdempotencyStore + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared store.
    #[must_use]
    pub const fn new(store: Arc<dyn IdempotencyStore>) -> Self {
        Self {
            inner: store,
        }
    }
}

impl IdempotencyStore for SharedIdempotencyStore {
    fn get(
        &self,
        key: &str,
        org_id: &OrgId,
        tool_id: &ToolId,
    ) -> Result<Option<IdempotencyRecord>, StoreError> {
        self.inner.get(key, org_id, tool_id)
    }

    fn set(
        &self,
        key: &str,
        org_id: &OrgId,
        tool_id: &ToolId,
        record: IdempotencyRecord,
    ) -> Result<(), StoreError> {
        self.inner.set(key, org_id, tool_id, record)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
