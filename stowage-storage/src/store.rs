//! Primary record store.
//!
//! The record store is the source of truth. The relational implementation
//! lives outside this crate; [`InMemoryRecordStore`] serves tests and
//! single-process deployments.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use stowage_core::{Customer, CustomerId, CustomerUpdate, NewCustomer, StoreError};

/// Result alias for record store calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Async record store for customers.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Get a customer by ID.
    async fn find_by_id(&self, id: CustomerId) -> StoreResult<Option<Customer>>;

    /// Insert a new customer, returning it with its assigned id.
    async fn save(&self, customer: NewCustomer) -> StoreResult<Customer>;

    /// Apply `fields` to an existing customer.
    async fn update(&self, customer: &Customer, fields: &CustomerUpdate) -> StoreResult<()>;

    /// Delete a customer.
    async fn delete(&self, customer: &Customer) -> StoreResult<()>;

    /// List all customers in id order.
    async fn find_all(&self) -> StoreResult<Vec<Customer>>;
}

/// In-memory record store.
#[derive(Debug)]
pub struct InMemoryRecordStore {
    customers: RwLock<BTreeMap<CustomerId, Customer>>,
    next_id: AtomicU64,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self {
            customers: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl InMemoryRecordStore {
    /// Create a new empty store. Ids start at 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get count of stored customers.
    pub fn customer_count(&self) -> usize {
        self.customers.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Clear all stored data. Ids are not reused.
    pub fn clear(&self) {
        if let Ok(mut customers) = self.customers.write() {
            customers.clear();
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn find_by_id(&self, id: CustomerId) -> StoreResult<Option<Customer>> {
        let customers = self.customers.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(customers.get(&id).cloned())
    }

    async fn save(&self, customer: NewCustomer) -> StoreResult<Customer> {
        let mut customers = self.customers.write().map_err(|_| StoreError::LockPoisoned)?;
        let id = CustomerId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let now = Utc::now();
        let record = Customer {
            id,
            first_name: customer.first_name,
            last_name: customer.last_name,
            email: customer.email,
            created_at: now,
            updated_at: now,
        };
        if customers.contains_key(&id) {
            return Err(StoreError::InsertFailed {
                reason: format!("id {id} already assigned"),
            });
        }
        customers.insert(id, record.clone());
        Ok(record)
    }

    async fn update(&self, customer: &Customer, fields: &CustomerUpdate) -> StoreResult<()> {
        let mut customers = self.customers.write().map_err(|_| StoreError::LockPoisoned)?;
        let stored = customers
            .get_mut(&customer.id)
            .ok_or(StoreError::NotFound { id: customer.id })?;
        stored.apply(fields, Utc::now());
        Ok(())
    }

    async fn delete(&self, customer: &Customer) -> StoreResult<()> {
        let mut customers = self.customers.write().map_err(|_| StoreError::LockPoisoned)?;
        customers
            .remove(&customer.id)
            .map(|_| ())
            .ok_or(StoreError::NotFound { id: customer.id })
    }

    async fn find_all(&self) -> StoreResult<Vec<Customer>> {
        let customers = self.customers.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(customers.values().cloned().collect())
    }
}
