//! Organization service backed by the Dataverse Web API

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use url::Url;
use uuid::Uuid;

use super::auth::TokenProvider;
use super::service::{DataverseResult, OrganizationService};
use super::{fetch, Entity, EntityCollection, EntityReference, WhoAmIResponse};
use crate::config::DataverseConfig;
use crate::error::DataverseError;

const ENTITY_ID_HEADER: &str = "OData-EntityId";
const INCLUDE_ANNOTATIONS: &str = "odata.include-annotations=\"Microsoft.Dynamics.CRM.*\"";

#[derive(Debug, Deserialize)]
struct ODataError {
    error: ODataErrorBody,
}

#[derive(Debug, Deserialize)]
struct ODataErrorBody {
    #[serde(default)]
    code: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ODataCollection {
    #[serde(default)]
    value: Vec<Value>,
    #[serde(rename = "@Microsoft.Dynamics.CRM.morerecords", default)]
    more_records: Option<bool>,
    #[serde(rename = "@Microsoft.Dynamics.CRM.fetchxmlpagingcookie", default)]
    paging_cookie: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EntityDefinition {
    #[serde(rename = "EntitySetName")]
    entity_set_name: String,
}

/// Web API client authenticated with client credentials
pub struct WebApiClient {
    http: reqwest::Client,
    api_base: Url,
    tokens: TokenProvider,
    entity_sets: RwLock<HashMap<String, String>>,
}

impl WebApiClient {
    pub fn new(config: &DataverseConfig) -> DataverseResult<Self> {
        config
            .validate()
            .map_err(|err| DataverseError::invalid_input("dataverse", err.to_string()))?;
        let api_base = config
            .api_base_url()
            .map_err(|err| DataverseError::invalid_input("dataverse.url", err.to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert("OData-MaxVersion", HeaderValue::from_static("4.0"));
        headers.insert("OData-Version", HeaderValue::from_static("4.0"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            tokens: TokenProvider::new(http.clone(), config),
            http,
            api_base,
            entity_sets: RwLock::new(HashMap::new()),
        })
    }

    fn url(&self, path: &str) -> DataverseResult<Url> {
        Ok(self.api_base.join(path)?)
    }

    async fn request(&self, method: Method, path: &str) -> DataverseResult<RequestBuilder> {
        let token = self.tokens.access_token().await?;
        Ok(self
            .http
            .request(method, self.url(path)?)
            .bearer_auth(token))
    }

    /// Send and turn non-success statuses into [`DataverseError::Api`]
    async fn send(&self, request: RequestBuilder) -> DataverseResult<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(api_error(status, &body))
    }

    /// Entity set name for a logical name, e.g. `contact` -> `contacts`
    async fn entity_set(&self, logical_name: &str) -> DataverseResult<String> {
        if !fetch::is_logical_name(logical_name) {
            return Err(DataverseError::invalid_input(
                "logical_name",
                format!("'{}' is not a valid logical name", logical_name),
            ));
        }

        if let Some(set) = self.entity_sets.read().await.get(logical_name) {
            return Ok(set.clone());
        }

        let path = format!("EntityDefinitions(LogicalName='{}')", logical_name);
        let request = self
            .request(Method::GET, &path)
            .await?
            .query(&[("$select", "EntitySetName")]);
        let definition: EntityDefinition = self.send(request).await?.json().await?;

        tracing::debug!(
            logical_name,
            entity_set = %definition.entity_set_name,
            "Resolved entity set"
        );
        self.entity_sets
            .write()
            .await
            .insert(logical_name.to_string(), definition.entity_set_name.clone());
        Ok(definition.entity_set_name)
    }

    async fn record_path(&self, reference: &EntityReference) -> DataverseResult<String> {
        let set = self.entity_set(&reference.logical_name).await?;
        Ok(format!("{}({})", set, reference.id))
    }
}

#[async_trait]
impl OrganizationService for WebApiClient {
    async fn who_am_i(&self) -> DataverseResult<WhoAmIResponse> {
        let request = self.request(Method::GET, "WhoAmI").await?;
        Ok(self.send(request).await?.json().await?)
    }

    async fn retrieve_multiple(&self, fetch_xml: &str) -> DataverseResult<EntityCollection> {
        let entity_name = fetch::entity_name(fetch_xml)?;
        let set = self.entity_set(&entity_name).await?;

        let request = self
            .request(Method::GET, &set)
            .await?
            .header("Prefer", INCLUDE_ANNOTATIONS)
            .query(&[("fetchXml", fetch_xml)]);
        let page: ODataCollection = self.send(request).await?.json().await?;

        tracing::debug!(entity = %entity_name, count = page.value.len(), "FetchXML query returned");
        Ok(EntityCollection {
            entity_name,
            entities: page.value,
            more_records: page.more_records.unwrap_or(false),
            paging_cookie: page.paging_cookie,
        })
    }

    async fn create(&self, entity: &Entity) -> DataverseResult<Uuid> {
        let set = self.entity_set(&entity.logical_name).await?;
        let request = self
            .request(Method::POST, &set)
            .await?
            .json(&entity.attributes);
        let response = self.send(request).await?;

        let header = response
            .headers()
            .get(ENTITY_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| DataverseError::InvalidResponse {
                message: format!("create response had no {} header", ENTITY_ID_HEADER),
            })?;
        parse_entity_id(header)
    }

    async fn update(&self, entity: &Entity) -> DataverseResult<()> {
        let reference = entity
            .to_reference()
            .ok_or_else(|| DataverseError::invalid_input("id", "update needs a record id"))?;
        let path = self.record_path(&reference).await?;

        // If-Match keeps PATCH from creating a missing row
        let request = self
            .request(Method::PATCH, &path)
            .await?
            .header("If-Match", "*")
            .json(&entity.attributes);

        match self.send(request).await {
            Err(DataverseError::Api { status: 404, .. }) => Err(DataverseError::NotFound {
                entity: reference.logical_name,
                id: reference.id.to_string(),
            }),
            other => other.map(|_| ()),
        }
    }

    async fn associate(
        &self,
        target: &EntityReference,
        relationship: &str,
        related: &[EntityReference],
    ) -> DataverseResult<()> {
        if !fetch::is_logical_name(relationship) {
            return Err(DataverseError::invalid_input(
                "relationship",
                format!("'{}' is not a valid relationship name", relationship),
            ));
        }
        let target_path = self.record_path(target).await?;

        for reference in related {
            let related_url = self.url(&self.record_path(reference).await?)?;
            let path = format!("{}/{}/$ref", target_path, relationship);
            let request = self
                .request(Method::POST, &path)
                .await?
                .json(&json!({ "@odata.id": related_url.as_str() }));
            self.send(request).await?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.api_base.to_string()
    }
}

/// Id from an `OData-EntityId` value such as `.../contacts(<guid>)`
pub fn parse_entity_id(header: &str) -> DataverseResult<Uuid> {
    let invalid = || DataverseError::InvalidResponse {
        message: format!("cannot read record id from '{}'", header),
    };
    let open = header.rfind('(').ok_or_else(invalid)?;
    let close = header.rfind(')').ok_or_else(invalid)?;
    if close <= open {
        return Err(invalid());
    }
    Uuid::parse_str(&header[open + 1..close]).map_err(|_| invalid())
}

fn api_error(status: StatusCode, body: &str) -> DataverseError {
    match serde_json::from_str::<ODataError>(body) {
        Ok(err) => DataverseError::Api {
            status: status.as_u16(),
            code: err.error.code,
            message: err.error.message,
        },
        Err(_) => DataverseError::Api {
            status: status.as_u16(),
            code: String::new(),
            message: if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                body.trim().to_string()
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entity_id() {
        let id = parse_entity_id(
            "https://org.crm.dynamics.com/api/data/v9.2/contacts(00000000-0000-0000-0000-000000000001)",
        )
        .unwrap();
        assert_eq!(id.to_string(), "00000000-0000-0000-0000-000000000001");

        assert!(parse_entity_id("https://org.crm.dynamics.com/contacts").is_err());
        assert!(parse_entity_id("contacts(not-a-guid)").is_err());
    }

    #[test]
    fn test_api_error_from_odata_body() {
        let body = r#"{"error":{"code":"0x80040217","message":"contact With Id = 42 Does Not Exist"}}"#;
        match api_error(StatusCode::NOT_FOUND, body) {
            DataverseError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 404);
                assert_eq!(code, "0x80040217");
                assert!(message.contains("Does Not Exist"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_api_error_without_body() {
        let err = api_error(StatusCode::SERVICE_UNAVAILABLE, "");
        assert_eq!(
            err.to_string(),
            "Web API error 503 (): Service Unavailable"
        );
    }

    #[test]
    fn test_client_requires_valid_config() {
        let config = DataverseConfig::new("https://org.crm.dynamics.com", "", "id", "secret");
        assert!(matches!(
            WebApiClient::new(&config),
            Err(DataverseError::InvalidInput { .. })
        ));

        let config = DataverseConfig::new("https://org.crm.dynamics.com", "t", "id", "secret");
        let client = WebApiClient::new(&config).unwrap();
        assert_eq!(client.describe(), "https://org.crm.dynamics.com/api/data/v9.2/");
        assert_eq!(
            client.url("contacts(1)/$ref").unwrap().as_str(),
            "https://org.crm.dynamics.com/api/data/v9.2/contacts(1)/$ref"
        );
    }
}
