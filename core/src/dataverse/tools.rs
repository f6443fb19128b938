//! The CRM tool object bound to agents, scripts and the MCP server.
//!
//! Each operation exists twice: a typed `try_*` method returning
//! [`DataverseResult`], and a text method that is what models see. The text
//! methods never fail; errors come back as [`crate::reply::ERROR_MARKER`]
//! text.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rhai::Engine;
use serde::{Deserialize, Serialize};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task;
use uuid::Uuid;

use super::schema::{contact, event};
use super::service::{DataverseResult, OrganizationService};
use super::{Entity, EntityCollection, EntityReference, WhoAmIResponse};
use crate::error::{DataverseError, ScriptError};
use crate::reply::into_reply;
use crate::script::ScriptHost;

/// How successful creates are acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStyle {
    /// Plain `OK`, which the import prompt waits for
    #[default]
    Terse,
    /// Sentence including the new record id
    Detailed,
}

pub struct DataverseTools {
    service: Arc<dyn OrganizationService>,
    reply_style: ReplyStyle,
}

impl DataverseTools {
    pub fn new(service: Arc<dyn OrganizationService>) -> Self {
        Self {
            service,
            reply_style: ReplyStyle::default(),
        }
    }

    pub fn with_reply_style(mut self, reply_style: ReplyStyle) -> Self {
        self.reply_style = reply_style;
        self
    }

    pub fn reply_style(&self) -> ReplyStyle {
        self.reply_style
    }

    pub fn service(&self) -> &Arc<dyn OrganizationService> {
        &self.service
    }

    pub async fn try_who_am_i(&self) -> DataverseResult<WhoAmIResponse> {
        self.service.who_am_i().await
    }

    pub async fn try_execute_fetch(&self, fetch_xml: &str) -> DataverseResult<EntityCollection> {
        self.service.retrieve_multiple(fetch_xml).await
    }

    pub async fn try_create_speaker(&self, first_name: &str, last_name: &str) -> DataverseResult<Uuid> {
        let last_name = require_text(contact::LAST_NAME, last_name)?;
        let speaker = Entity::new(contact::ENTITY)
            .with_attribute(contact::FIRST_NAME, first_name.trim())
            .with_attribute(contact::LAST_NAME, last_name);

        let id = self.service.create(&speaker).await?;
        tracing::info!(%id, first_name, last_name, "Created speaker");
        Ok(id)
    }

    pub async fn try_create_event(
        &self,
        event_name: &str,
        location: &str,
        event_date: &str,
    ) -> DataverseResult<Uuid> {
        let event_name = require_text(event::NAME, event_name)?;
        let date = parse_event_date(event_date)?;
        let record = Entity::new(event::ENTITY)
            .with_attribute(event::NAME, event_name)
            .with_attribute(event::LOCATION, location.trim())
            .with_attribute(
                event::DATE,
                date.to_rfc3339_opts(SecondsFormat::Secs, true),
            );

        let id = self.service.create(&record).await?;
        tracing::info!(%id, event_name, %date, "Created event");
        Ok(id)
    }

    pub async fn try_add_speaker_to_event(&self, event_id: &str, speaker_id: &str) -> DataverseResult<()> {
        let event_ref = EntityReference::new(event::ENTITY, parse_id("event_id", event_id)?);
        let speaker_ref = EntityReference::new(contact::ENTITY, parse_id("speaker_id", speaker_id)?);

        self.service
            .associate(&event_ref, event::SPEAKERS_RELATIONSHIP, &[speaker_ref])
            .await
    }

    pub async fn try_update_speaker_biography(&self, speaker_id: &str, biography: &str) -> DataverseResult<()> {
        let id = parse_id("speaker_id", speaker_id)?;
        let update = Entity::new(contact::ENTITY)
            .with_id(id)
            .with_attribute(contact::BIOGRAPHY, biography);
        self.service.update(&update).await
    }

    /// WhoAmI as pretty JSON
    pub async fn who_am_i(&self) -> String {
        into_reply("who_am_i", self.try_who_am_i().await.and_then(|r| to_json(&r)), |json| json)
    }

    /// FetchXML result as pretty JSON
    pub async fn execute_fetch(&self, fetch_xml: &str) -> String {
        let result = self
            .try_execute_fetch(fetch_xml)
            .await
            .and_then(|collection| to_json(&collection));
        into_reply("execute_fetch", result, |json| json)
    }

    pub async fn create_speaker(&self, first_name: &str, last_name: &str) -> String {
        let style = self.reply_style;
        into_reply(
            "create_speaker",
            self.try_create_speaker(first_name, last_name).await,
            |id| match style {
                ReplyStyle::Terse => "OK".to_string(),
                ReplyStyle::Detailed => format!("Contact created successfully with ID: {}", id),
            },
        )
    }

    pub async fn create_event(&self, event_name: &str, location: &str, event_date: &str) -> String {
        let style = self.reply_style;
        into_reply(
            "create_event",
            self.try_create_event(event_name, location, event_date).await,
            |id| match style {
                ReplyStyle::Terse => "OK".to_string(),
                ReplyStyle::Detailed => format!("Event created successfully with ID: {}", id),
            },
        )
    }

    pub async fn add_speaker_to_event(&self, event_id: &str, speaker_id: &str) -> String {
        into_reply(
            "add_speaker_to_event",
            self.try_add_speaker_to_event(event_id, speaker_id).await,
            |()| format!("Speaker {} successfully added to event {}", speaker_id.trim(), event_id.trim()),
        )
    }

    pub async fn update_speaker_biography(&self, speaker_id: &str, biography: &str) -> String {
        into_reply(
            "update_speaker_biography",
            self.try_update_speaker_biography(speaker_id, biography).await,
            |()| format!("Speaker biography successfully updated for {}.", speaker_id.trim()),
        )
    }
}

/// Run a tool future to completion from a synchronous script member.
///
/// On a multi-thread runtime the current worker (if any) is handed off with
/// `block_in_place` first, so members work even when a script is evaluated
/// directly on an async task. A current-thread runtime cannot do that;
/// scripts there go through [`crate::script::ScriptRunner::run_script_async`].
fn block_on<F: Future>(rt: &Handle, future: F) -> F::Output {
    match Handle::try_current().map(|current| current.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => task::block_in_place(|| rt.block_on(future)),
        _ => rt.block_on(future),
    }
}

impl ScriptHost for DataverseTools {
    fn register(self: Arc<Self>, engine: &mut Engine) -> Result<(), ScriptError> {
        let handle = Handle::try_current().map_err(|err| ScriptError::Host {
            message: format!("Dataverse calls need a Tokio runtime: {}", err),
        })?;

        let (tools, rt) = (Arc::clone(&self), handle.clone());
        engine.register_fn("who_am_i", move || block_on(&rt, tools.who_am_i()));

        let (tools, rt) = (Arc::clone(&self), handle.clone());
        engine.register_fn("execute_fetch", move |fetch_xml: &str| {
            block_on(&rt, tools.execute_fetch(fetch_xml))
        });

        let (tools, rt) = (Arc::clone(&self), handle.clone());
        engine.register_fn("create_speaker", move |first_name: &str, last_name: &str| {
            block_on(&rt, tools.create_speaker(first_name, last_name))
        });

        let (tools, rt) = (Arc::clone(&self), handle.clone());
        engine.register_fn(
            "create_event",
            move |event_name: &str, location: &str, event_date: &str| {
                block_on(&rt, tools.create_event(event_name, location, event_date))
            },
        );

        let (tools, rt) = (Arc::clone(&self), handle.clone());
        engine.register_fn("add_speaker_to_event", move |event_id: &str, speaker_id: &str| {
            block_on(&rt, tools.add_speaker_to_event(event_id, speaker_id))
        });

        let (tools, rt) = (self, handle);
        engine.register_fn(
            "update_speaker_biography",
            move |speaker_id: &str, biography: &str| {
                block_on(&rt, tools.update_speaker_biography(speaker_id, biography))
            },
        );

        Ok(())
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD`, and `YYYY-MM-DD[ T]HH:MM[:SS]`.
/// Values without an offset are taken as UTC.
pub fn parse_event_date(input: &str) -> DataverseResult<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(input) {
        return Ok(date.with_timezone(&Utc));
    }
    for format in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(day) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(midnight) = day.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    Err(DataverseError::invalid_input(
        "event_date",
        format!("'{}' is not a date (expected YYYY-MM-DD or RFC 3339)", input),
    ))
}

fn parse_id(field: &str, input: &str) -> DataverseResult<Uuid> {
    Uuid::parse_str(input.trim())
        .map_err(|_| DataverseError::invalid_input(field, format!("'{}' is not a GUID", input)))
}

fn require_text<'a>(field: &str, value: &'a str) -> DataverseResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DataverseError::invalid_input(field, "value is required"));
    }
    Ok(value)
}

fn to_json<T: Serialize>(value: &T) -> DataverseResult<String> {
    serde_json::to_string_pretty(value).map_err(|err| DataverseError::InvalidResponse {
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataverse::InMemoryOrganizationService;
    use crate::reply::is_error_text;
    use crate::script::ScriptRunner;

    fn tools(style: ReplyStyle) -> (Arc<InMemoryOrganizationService>, DataverseTools) {
        let service = Arc::new(InMemoryOrganizationService::new());
        let tools = DataverseTools::new(service.clone()).with_reply_style(style);
        (service, tools)
    }

    #[tokio::test]
    async fn test_create_speaker_terse() {
        let (service, tools) = tools(ReplyStyle::Terse);
        assert_eq!(tools.create_speaker("Ada", "Lovelace").await, "OK");
        assert_eq!(service.count(contact::ENTITY).await, 1);
    }

    #[tokio::test]
    async fn test_create_speaker_detailed() {
        let (_, tools) = tools(ReplyStyle::Detailed);
        let reply = tools.create_speaker("Grace", "Hopper").await;
        let id = reply
            .strip_prefix("Contact created successfully with ID: ")
            .unwrap();
        assert!(Uuid::parse_str(id).is_ok());
    }

    #[tokio::test]
    async fn test_create_speaker_needs_last_name() {
        let (service, tools) = tools(ReplyStyle::Terse);
        let reply = tools.create_speaker("Ada", "  ").await;
        assert!(is_error_text(&reply), "{}", reply);
        assert!(reply.contains("lastname"));
        assert_eq!(service.count(contact::ENTITY).await, 0);
    }

    #[tokio::test]
    async fn test_create_event_stores_utc_date() {
        let (service, tools) = tools(ReplyStyle::Detailed);
        let reply = tools
            .create_event("RustConf", "Montreal", "2024-09-10")
            .await;
        let id = reply
            .strip_prefix("Event created successfully with ID: ")
            .unwrap();

        let row = service
            .get(&EntityReference::new(event::ENTITY, Uuid::parse_str(id).unwrap()))
            .await
            .unwrap();
        assert_eq!(row.get_str(event::DATE), Some("2024-09-10T00:00:00Z"));
        assert_eq!(row.get_str(event::LOCATION), Some("Montreal"));
    }

    #[tokio::test]
    async fn test_create_event_rejects_bad_date() {
        let (_, tools) = tools(ReplyStyle::Terse);
        let reply = tools.create_event("RustConf", "Montreal", "next tuesday").await;
        assert!(reply.starts_with("[ERROR] Invalid value for 'event_date'"), "{}", reply);
    }

    #[tokio::test]
    async fn test_add_speaker_and_biography() {
        let (service, tools) = tools(ReplyStyle::Terse);
        let event_id = tools
            .try_create_event("Summit", "Oslo", "2023-06-01 09:30")
            .await
            .unwrap();
        let speaker_id = tools.try_create_speaker("Ada", "Lovelace").await.unwrap();

        let reply = tools
            .add_speaker_to_event(&event_id.to_string(), &speaker_id.to_string())
            .await;
        assert_eq!(
            reply,
            format!("Speaker {} successfully added to event {}", speaker_id, event_id)
        );
        let linked = service
            .related(
                &EntityReference::new(event::ENTITY, event_id),
                event::SPEAKERS_RELATIONSHIP,
            )
            .await;
        assert_eq!(linked.len(), 1);

        let reply = tools
            .update_speaker_biography(&speaker_id.to_string(), "First programmer.")
            .await;
        assert_eq!(
            reply,
            format!("Speaker biography successfully updated for {}.", speaker_id)
        );
    }

    #[tokio::test]
    async fn test_bad_guid_is_error_text() {
        let (_, tools) = tools(ReplyStyle::Terse);
        let reply = tools.add_speaker_to_event("nope", "also-nope").await;
        assert!(reply.starts_with("[ERROR]"));
        assert!(reply.contains("event_id"));

        let reply = tools
            .update_speaker_biography(&Uuid::new_v4().to_string(), "bio")
            .await;
        assert!(reply.starts_with("[ERROR] Record not found"), "{}", reply);
    }

    #[tokio::test]
    async fn test_fetch_and_who_am_i_return_json() {
        let (_, tools) = tools(ReplyStyle::Terse);
        tools.try_create_speaker("Ada", "Lovelace").await.unwrap();

        let json: serde_json::Value = serde_json::from_str(
            &tools
                .execute_fetch(r#"<fetch><entity name="contact"><attribute name="lastname"/></entity></fetch>"#)
                .await,
        )
        .unwrap();
        assert_eq!(json["entity_name"], "contact");
        assert_eq!(json["entities"][0]["lastname"], "Lovelace");

        let who: serde_json::Value = serde_json::from_str(&tools.who_am_i().await).unwrap();
        assert!(who.get("UserId").is_some());

        assert!(is_error_text(&tools.execute_fetch("<fetch/>").await));
    }

    #[test]
    fn test_parse_event_date_formats() {
        for input in [
            "2024-05-01",
            "2024-05-01 00:00",
            "2024-05-01T00:00:00",
            "2024-05-01T02:00:00+02:00",
        ] {
            assert_eq!(
                parse_event_date(input).unwrap().to_rfc3339(),
                "2024-05-01T00:00:00+00:00",
                "{}",
                input
            );
        }
        assert!(parse_event_date("01/05/2024").is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_script_calls_bound_members() {
        let (service, tools) = tools(ReplyStyle::Terse);
        let runner = ScriptRunner::new(Arc::new(tools));

        let reply = runner
            .run_script_async(
                r#"
                let a = create_speaker("Ada", "Lovelace");
                let b = create_event("RustConf", "Montreal", "2024-09-10");
                a + " " + b
                "#,
            )
            .await;
        assert_eq!(reply, "OK OK");
        assert_eq!(service.count(contact::ENTITY).await, 1);
        assert_eq!(service.count(event::ENTITY).await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_script_sees_tool_errors_as_text() {
        let (_, tools) = tools(ReplyStyle::Terse);
        let runner = ScriptRunner::new(Arc::new(tools));

        let reply = runner
            .run_script_async(r#"add_speaker_to_event("x", "y")"#)
            .await;
        assert!(reply.starts_with("[ERROR] Invalid value for 'event_id'"), "{}", reply);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sync_script_on_async_worker() {
        let (service, tools) = tools(ReplyStyle::Terse);
        let runner = ScriptRunner::new(Arc::new(tools));

        let reply = runner.run_script(r#"create_speaker("Ada", "Lovelace")"#);
        assert_eq!(reply, "OK");
        assert_eq!(service.count(contact::ENTITY).await, 1);
    }

    #[test]
    fn test_script_without_runtime() {
        let (_, tools) = tools(ReplyStyle::Terse);
        let runner = ScriptRunner::new(Arc::new(tools));
        let reply = runner.run_script("1 + 1");
        assert!(reply.starts_with("[ERROR] Script host unavailable"), "{}", reply);
    }
}
