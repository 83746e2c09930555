//! Address book trait and in-memory implementation.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::{AddressId, CustomerId};
use serde::{Deserialize, Serialize};

use crate::error::OrderError;

/// A customer's shipping address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub customer_id: CustomerId,
    pub recipient: String,
    pub line1: String,
    pub city: String,
    pub postal_code: String,
    pub is_default: bool,
}

/// Read access to customers' addresses.
#[async_trait]
pub trait AddressBook: Send + Sync {
    /// The customer's default address, if any.
    async fn default_address(&self, customer_id: CustomerId) -> Result<Option<Address>, OrderError>;

    /// An address by id, only if it belongs to `customer_id`.
    async fn find_address(
        &self,
        customer_id: CustomerId,
        address_id: AddressId,
    ) -> Result<Option<Address>, OrderError>;
}

/// In-memory address book for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAddressBook {
    addresses: Arc<RwLock<BTreeMap<AddressId, Address>>>,
}

impl InMemoryAddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an address. A new default clears the customer's
    /// previous default.
    pub fn insert(&self, address: Address) {
        let mut addresses = self
            .addresses
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if address.is_default {
            for existing in addresses.values_mut() {
                if existing.customer_id == address.customer_id {
                    existing.is_default = false;
                }
            }
        }
        addresses.insert(address.id, address);
    }
}

#[async_trait]
impl AddressBook for InMemoryAddressBook {
    async fn default_address(&self, customer_id: CustomerId) -> Result<Option<Address>, OrderError> {
        let addresses = self.addresses.read().unwrap_or_else(PoisonError::into_inner);
        Ok(addresses
            .values()
            .find(|a| a.customer_id == customer_id && a.is_default)
            .cloned())
    }

    async fn find_address(
        &self,
        customer_id: CustomerId,
        address_id: AddressId,
    ) -> Result<Option<Address>, OrderError> {
        let addresses = self.addresses.read().unwrap_or_else(PoisonError::into_inner);
        Ok(addresses
            .get(&address_id)
            .filter(|a| a.customer_id == customer_id)
            .cloned())
    }
}
