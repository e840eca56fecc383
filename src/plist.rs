//! A local stand-in for the object model's property-list service.
//!
//! Lists are registered under numeric ids. `PlistId::DEFAULT` names the shared default list
//! of every class and is never stored; closing it is a no-op.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{RestError, Result};

pub const CREATE_INTERMEDIATE_GROUP: &str = "create_intermediate_group";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlistId(pub u64);

impl PlistId {
    pub const DEFAULT: PlistId = PlistId(0);
    pub const INVALID: PlistId = PlistId(u64::MAX);

    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlistClass {
    FileCreate,
    FileAccess,
    GroupCreate,
    GroupAccess,
    DatasetCreate,
    DatasetAccess,
    DatatypeCreate,
    DatatypeAccess,
    AttributeCreate,
    AttributeAccess,
    LinkCreate,
    LinkAccess,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyList {
    pub class: PlistClass,
    pub props: BTreeMap<String, PropValue>,
}

impl PropertyList {
    pub fn new(class: PlistClass) -> Self {
        Self {
            class,
            props: BTreeMap::new(),
        }
    }
}

pub struct PlistRegistry {
    lists: DashMap<u64, PropertyList>,
    next_id: AtomicU64,
}

impl Default for PlistRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PlistRegistry {
    pub fn new() -> Self {
        Self {
            lists: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn register(&self, list: PropertyList) -> PlistId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lists.insert(id, list);
        PlistId(id)
    }

    fn check(id: PlistId) -> Result<()> {
        if id == PlistId::INVALID {
            return Err(RestError::Argument("invalid property list id".to_string()));
        }
        Ok(())
    }

    fn snapshot(&self, id: PlistId, class: PlistClass) -> Result<PropertyList> {
        Self::check(id)?;
        if id.is_default() {
            return Ok(PropertyList::new(class));
        }
        self.lists
            .get(&id.0)
            .map(|l| l.clone())
            .ok_or_else(|| RestError::Argument(format!("property list {} is not open", id.0)))
    }

    pub fn create(&self, class: PlistClass) -> PlistId {
        self.register(PropertyList::new(class))
    }

    /// Copies `id`. Copying the default list yields the default list again.
    pub fn copy(&self, id: PlistId) -> Result<PlistId> {
        Self::check(id)?;
        if id.is_default() {
            return Ok(PlistId::DEFAULT);
        }
        let list = self
            .lists
            .get(&id.0)
            .map(|l| l.clone())
            .ok_or_else(|| RestError::Argument(format!("can't copy property list {}", id.0)))?;
        Ok(self.register(list))
    }

    pub fn close(&self, id: PlistId) -> Result<()> {
        Self::check(id)?;
        if id.is_default() {
            return Ok(());
        }
        match self.lists.remove(&id.0) {
            Some(_) => Ok(()),
            None => Err(RestError::Argument(format!(
                "property list {} is already closed",
                id.0
            ))),
        }
    }

    pub fn class_of(&self, id: PlistId) -> Result<Option<PlistClass>> {
        Self::check(id)?;
        Ok(self.lists.get(&id.0).map(|l| l.class))
    }

    pub fn encode(&self, id: PlistId, class: PlistClass) -> Result<Vec<u8>> {
        let list = self.snapshot(id, class)?;
        Ok(bincode::serialize(&list)?)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<PlistId> {
        let list: PropertyList = bincode::deserialize(bytes)?;
        Ok(self.register(list))
    }

    pub fn get(&self, id: PlistId, key: &str) -> Result<Option<PropValue>> {
        Self::check(id)?;
        if id.is_default() {
            return Ok(None);
        }
        let list = self
            .lists
            .get(&id.0)
            .ok_or_else(|| RestError::Argument(format!("property list {} is not open", id.0)))?;
        Ok(list.props.get(key).cloned())
    }

    pub fn set(&self, id: PlistId, key: &str, value: PropValue) -> Result<()> {
        Self::check(id)?;
        if id.is_default() {
            return Err(RestError::Argument(
                "the default property list is read-only".to_string(),
            ));
        }
        let mut list = self
            .lists
            .get_mut(&id.0)
            .ok_or_else(|| RestError::Argument(format!("property list {} is not open", id.0)))?;
        list.props.insert(key.to_string(), value);
        Ok(())
    }

    pub fn create_intermediate_group(&self, lcpl: PlistId) -> Result<bool> {
        match self.get(lcpl, CREATE_INTERMEDIATE_GROUP)? {
            Some(PropValue::Bool(v)) => Ok(v),
            Some(other) => Err(RestError::Argument(format!(
                "'{CREATE_INTERMEDIATE_GROUP}' holds {other:?}, expected a boolean"
            ))),
            None => Ok(false),
        }
    }

    /// A fresh link-creation list with intermediate group creation switched on or off.
    pub fn link_create_list(&self, create_intermediate: bool) -> Result<PlistId> {
        let id = self.create(PlistClass::LinkCreate);
        self.set(
            id,
            CREATE_INTERMEDIATE_GROUP,
            PropValue::Bool(create_intermediate),
        )?;
        Ok(id)
    }

    pub fn live_count(&self) -> usize {
        self.lists.len()
    }
}
