//! The seam between tools and a Dataverse environment

use async_trait::async_trait;
use uuid::Uuid;

use super::{Entity, EntityCollection, EntityReference, WhoAmIResponse};
use crate::error::DataverseError;

pub type DataverseResult<T> = std::result::Result<T, DataverseError>;

/// Operations the tools need from an organization
#[async_trait]
pub trait OrganizationService: Send + Sync {
    /// Identity of the connected user
    async fn who_am_i(&self) -> DataverseResult<WhoAmIResponse>;

    /// Run a FetchXML query
    async fn retrieve_multiple(&self, fetch_xml: &str) -> DataverseResult<EntityCollection>;

    /// Create a row and return its id
    async fn create(&self, entity: &Entity) -> DataverseResult<Uuid>;

    /// Update columns of an existing row; `entity.id` is required
    async fn update(&self, entity: &Entity) -> DataverseResult<()>;

    /// Link `related` rows to `target` over a many-to-many relationship
    async fn associate(
        &self,
        target: &EntityReference,
        relationship: &str,
        related: &[EntityReference],
    ) -> DataverseResult<()>;

    /// Short label for logs
    fn describe(&self) -> String;
}
