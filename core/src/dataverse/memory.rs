//! Process-local organization service for offline runs and tests

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::service::{DataverseResult, OrganizationService};
use super::{fetch, Entity, EntityCollection, EntityReference, WhoAmIResponse};
use crate::error::DataverseError;

#[derive(Default)]
struct Store {
    /// logical name -> id -> row
    tables: BTreeMap<String, BTreeMap<Uuid, Entity>>,
    /// (relationship, target, related)
    links: BTreeSet<(String, EntityReference, EntityReference)>,
}

/// Keeps rows in memory. FetchXML queries return every row of the root
/// entity; filters, ordering and column lists are not interpreted.
pub struct InMemoryOrganizationService {
    identity: WhoAmIResponse,
    store: RwLock<Store>,
}

impl InMemoryOrganizationService {
    pub fn new() -> Self {
        Self {
            identity: WhoAmIResponse {
                user_id: Uuid::new_v4(),
                business_unit_id: Uuid::new_v4(),
                organization_id: Uuid::new_v4(),
            },
            store: RwLock::new(Store::default()),
        }
    }

    /// Copy of a stored row
    pub async fn get(&self, reference: &EntityReference) -> Option<Entity> {
        self.store
            .read()
            .await
            .tables
            .get(&reference.logical_name)
            .and_then(|rows| rows.get(&reference.id))
            .cloned()
    }

    /// Rows linked to `target` over `relationship`
    pub async fn related(&self, target: &EntityReference, relationship: &str) -> Vec<EntityReference> {
        self.store
            .read()
            .await
            .links
            .iter()
            .filter(|(rel, t, _)| rel == relationship && t == target)
            .map(|(_, _, related)| related.clone())
            .collect()
    }

    pub async fn count(&self, logical_name: &str) -> usize {
        self.store
            .read()
            .await
            .tables
            .get(logical_name)
            .map_or(0, |rows| rows.len())
    }

    fn exists(store: &Store, reference: &EntityReference) -> bool {
        store
            .tables
            .get(&reference.logical_name)
            .is_some_and(|rows| rows.contains_key(&reference.id))
    }

    fn not_found(reference: &EntityReference) -> DataverseError {
        DataverseError::NotFound {
            entity: reference.logical_name.clone(),
            id: reference.id.to_string(),
        }
    }
}

impl Default for InMemoryOrganizationService {
    fn default() -> Self {
        Self::new()
    }
}

fn to_record(entity: &Entity) -> Value {
    let mut record = entity.attributes.clone();
    if let Some(id) = entity.id {
        record.insert(
            Entity::primary_id_attribute(&entity.logical_name),
            Value::String(id.to_string()),
        );
    }
    Value::Object(record)
}

#[async_trait]
impl OrganizationService for InMemoryOrganizationService {
    async fn who_am_i(&self) -> DataverseResult<WhoAmIResponse> {
        Ok(self.identity)
    }

    async fn retrieve_multiple(&self, fetch_xml: &str) -> DataverseResult<EntityCollection> {
        let entity_name = fetch::entity_name(fetch_xml)?;
        let store = self.store.read().await;
        let entities = store
            .tables
            .get(&entity_name)
            .map(|rows| rows.values().map(to_record).collect())
            .unwrap_or_default();

        Ok(EntityCollection {
            entity_name,
            entities,
            more_records: false,
            paging_cookie: None,
        })
    }

    async fn create(&self, entity: &Entity) -> DataverseResult<Uuid> {
        if !fetch::is_logical_name(&entity.logical_name) {
            return Err(DataverseError::invalid_input(
                "logical_name",
                format!("'{}' is not a valid logical name", entity.logical_name),
            ));
        }

        let id = entity.id.unwrap_or_else(Uuid::new_v4);
        let mut store = self.store.write().await;
        let rows = store.tables.entry(entity.logical_name.clone()).or_default();
        if rows.contains_key(&id) {
            return Err(DataverseError::Api {
                status: 412,
                code: "0x80040237".to_string(),
                message: format!("A record with id {} already exists", id),
            });
        }
        rows.insert(id, entity.clone().with_id(id));
        Ok(id)
    }

    async fn update(&self, entity: &Entity) -> DataverseResult<()> {
        let reference = entity
            .to_reference()
            .ok_or_else(|| DataverseError::invalid_input("id", "update needs a record id"))?;

        let mut store = self.store.write().await;
        let row = store
            .tables
            .get_mut(&reference.logical_name)
            .and_then(|rows| rows.get_mut(&reference.id))
            .ok_or_else(|| Self::not_found(&reference))?;
        row.attributes
            .extend(entity.attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn associate(
        &self,
        target: &EntityReference,
        relationship: &str,
        related: &[EntityReference],
    ) -> DataverseResult<()> {
        let mut store = self.store.write().await;
        if !Self::exists(&store, target) {
            return Err(Self::not_found(target));
        }
        if let Some(missing) = related.iter().find(|r| !Self::exists(&store, r)) {
            return Err(Self::not_found(missing));
        }
        for reference in related {
            store
                .links
                .insert((relationship.to_string(), target.clone(), reference.clone()));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "in-memory organization".to_string()
    }
}
