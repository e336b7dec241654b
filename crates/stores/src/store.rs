use serde::{Deserialize, Serialize};

use phonestore_core::{DomainError, DomainResult, Entity, StoreId};

/// A retail store record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    id: StoreId,
    store_name: String,
    address: String,
    manager_name: String,
}

impl Store {
    /// Materialize a validated draft under `id`.
    pub fn from_draft(id: StoreId, draft: StoreDraft) -> DomainResult<Self> {
        let draft = draft.validated()?;
        Ok(Self {
            id,
            store_name: draft.store_name,
            address: draft.address,
            manager_name: draft.manager_name,
        })
    }

    pub fn id_typed(&self) -> &StoreId {
        &self.id
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn manager_name(&self) -> &str {
        &self.manager_name
    }

    /// Whether this store sits at the same name + address pair.
    ///
    /// Comparison is exact after trimming, as the uniqueness rule is.
    pub fn same_location(&self, store_name: &str, address: &str) -> bool {
        self.store_name == store_name.trim() && self.address == address.trim()
    }

    /// Apply an update; the id is never changed.
    pub fn apply(&mut self, update: StoreUpdate) -> DomainResult<()> {
        let draft = update.into_draft().validated()?;
        self.store_name = draft.store_name;
        self.address = draft.address;
        self.manager_name = draft.manager_name;
        Ok(())
    }
}

impl Entity for Store {
    type Id = StoreId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Request to create a store.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDraft {
    #[serde(default)]
    pub store_name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub manager_name: String,
}

impl StoreDraft {
    /// Trim every field and reject blanks.
    pub fn validated(self) -> DomainResult<Self> {
        Ok(Self {
            store_name: required("storeName", self.store_name)?,
            address: required("address", self.address)?,
            manager_name: required("managerName", self.manager_name)?,
        })
    }
}

/// Request to replace a store's details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreUpdate {
    pub id: StoreId,
    #[serde(default)]
    pub store_name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub manager_name: String,
}

impl StoreUpdate {
    pub fn into_draft(self) -> StoreDraft {
        StoreDraft {
            store_name: self.store_name,
            address: self.address,
            manager_name: self.manager_name,
        }
    }
}

fn required(field: &str, value: String) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} must not be blank")));
    }
    Ok(trimmed.to_string())
}
