//! Validated row shapes returned by the remote data service.
//!
//! Remote rows arrive as untyped JSON. They are parsed here into a tagged
//! union so that malformed rows surface as [`DomainError`]s instead of
//! leaking half-shaped data into snapshots.

use serde_json::Value;

use super::content::SectionContent;
use super::error::DomainError;

/// One section of one page.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentRow {
    pub page_key: String,
    pub section_key: String,
    pub section_content: SectionContent,
}

/// One settings group.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsRow {
    pub setting_key: String,
    pub setting_value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteRow {
    Content(ContentRow),
    Settings(SettingsRow),
}

impl RemoteRow {
    /// Classify a raw row by the key columns it carries.
    pub fn parse(table: &str, row: &Value) -> Result<Self, DomainError> {
        if row.get("page_key").is_some() {
            ContentRow::parse(table, row).map(RemoteRow::Content)
        } else if row.get("setting_key").is_some() {
            SettingsRow::parse(table, row).map(RemoteRow::Settings)
        } else {
            Err(DomainError::missing_field(table, "page_key"))
        }
    }
}

impl ContentRow {
    pub fn parse(table: &str, row: &Value) -> Result<Self, DomainError> {
        let page_key = required_key(table, row, "page_key")?;
        let section_key = required_key(table, row, "section_key")?;
        let section_content = match row.get("section_content") {
            None | Some(Value::Null) => {
                return Err(DomainError::missing_field(table, "section_content"));
            }
            Some(Value::Object(map)) => map.clone(),
            // Some backends store the document as JSON text.
            Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    return Err(DomainError::invalid_field(
                        table,
                        "section_content",
                        "encoded document is not an object",
                    ));
                }
                Err(err) => {
                    return Err(DomainError::invalid_field(
                        table,
                        "section_content",
                        format!("unparseable document: {err}"),
                    ));
                }
            },
            Some(other) => {
                return Err(DomainError::invalid_field(
                    table,
                    "section_content",
                    format!("expected object, found {}", kind_name(other)),
                ));
            }
        };

        Ok(Self {
            page_key,
            section_key,
            section_content,
        })
    }
}

impl SettingsRow {
    pub fn parse(table: &str, row: &Value) -> Result<Self, DomainError> {
        let setting_key = required_key(table, row, "setting_key")?;
        let setting_value = match row.get("setting_value") {
            None | Some(Value::Null) => {
                return Err(DomainError::missing_field(table, "setting_value"));
            }
            Some(value) => value.clone(),
        };
        Ok(Self {
            setting_key,
            setting_value,
        })
    }
}

fn required_key(table: &str, row: &Value, field: &'static str) -> Result<String, DomainError> {
    match row.get(field) {
        None | Some(Value::Null) => Err(DomainError::missing_field(table, field)),
        Some(Value::String(value)) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Err(DomainError::invalid_field(table, field, "must not be empty"))
            } else {
                Ok(trimmed.to_string())
            }
        }
        Some(other) => Err(DomainError::invalid_field(
            table,
            field,
            format!("expected string, found {}", kind_name(other)),
        )),
    }
}

pub(crate) fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn content_row_parses_object_document() {
        let row = json!({
            "page_key": "homepage",
            "section_key": "hero",
            "section_content": {"title": "Hello"},
            "is_active": true,
        });
        let parsed = ContentRow::parse("site_content", &row).expect("valid row");
        assert_eq!(parsed.page_key, "homepage");
        assert_eq!(parsed.section_content["title"], "Hello");
    }

    #[test]
    fn content_row_accepts_json_text_document() {
        let row = json!({
            "page_key": "about",
            "section_key": "story",
            "section_content": "{\"body\":\"text\"}",
        });
        let parsed = ContentRow::parse("site_content", &row).expect("valid row");
        assert_eq!(parsed.section_content["body"], "text");
    }

    #[test]
    fn content_row_rejects_non_object_document() {
        let row = json!({
            "page_key": "about",
            "section_key": "story",
            "section_content": [1, 2, 3],
        });
        let err = ContentRow::parse("site_content", &row).unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidField {
                field: "section_content",
                ..
            }
        ));
    }

    #[test]
    fn content_row_requires_keys() {
        let row = json!({"section_key": "hero", "section_content": {}});
        assert_eq!(
            ContentRow::parse("site_content", &row).unwrap_err(),
            DomainError::missing_field("site_content", "page_key")
        );

        let blank = json!({"page_key": "  ", "section_key": "hero", "section_content": {}});
        assert!(ContentRow::parse("site_content", &blank).is_err());
    }

    #[test]
    fn remote_row_classifies_by_key_column() {
        let settings = json!({"setting_key": "theme", "setting_value": {"dark_mode": true}});
        assert!(matches!(
            RemoteRow::parse("site_settings", &settings),
            Ok(RemoteRow::Settings(_))
        ));

        let content = json!({"page_key": "homepage", "section_key": "hero", "section_content": {}});
        assert!(matches!(
            RemoteRow::parse("site_content", &content),
            Ok(RemoteRow::Content(_))
        ));

        assert!(RemoteRow::parse("unknown", &json!({"id": 1})).is_err());
    }

    #[test]
    fn settings_row_requires_value() {
        let row = json!({"setting_key": "seo", "setting_value": null});
        assert_eq!(
            SettingsRow::parse("site_settings", &row).unwrap_err(),
            DomainError::missing_field("site_settings", "setting_value")
        );
    }
}
