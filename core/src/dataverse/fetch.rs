//! FetchXML helpers

use regex::Regex;

use crate::error::DataverseError;

const ENTITY_PATTERN: &str = r#"<entity\s+name\s*=\s*["']([^"']+)["']"#;

/// Logical name of the root `<entity>` of a FetchXML query
pub fn entity_name(fetch_xml: &str) -> Result<String, DataverseError> {
    if fetch_xml.trim().is_empty() {
        return Err(DataverseError::invalid_input("fetch_xml", "query is empty"));
    }

    let pattern = Regex::new(ENTITY_PATTERN)
        .map_err(|err| DataverseError::invalid_input("fetch_xml", err.to_string()))?;

    pattern
        .captures(fetch_xml)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            DataverseError::invalid_input("fetch_xml", "no <entity name=\"...\"> element found")
        })
}

/// Whether `name` looks like a logical name, so it can be spliced into URLs
pub fn is_logical_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}
