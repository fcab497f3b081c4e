//! Site configuration snapshot with per-field fallback to compiled defaults.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::defaults;
use super::rows::kind_name;
use super::types::SettingGroup;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteIdentity {
    pub site_name: String,
    pub tagline: String,
    pub description: String,
    pub owner_name: String,
    /// Remote fields this build does not declare, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branding {
    pub favicon_url: String,
    pub favicon_type: String,
    pub logo_url: String,
    pub logo_alt: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub primary_color: String,
    pub accent_color: String,
    pub font_family: String,
    pub dark_mode: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seo {
    pub meta_title: String,
    pub meta_description: String,
    pub og_image: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub email: String,
    pub phone: String,
    pub location: String,
    pub booking_url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Fully-resolved site configuration.
///
/// Every known group is always populated. Groups this build does not know
/// about are kept verbatim in `extra`, as are undeclared fields of known groups.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsSnapshot {
    pub identity: SiteIdentity,
    pub branding: Branding,
    pub theme: Theme,
    pub seo: Seo,
    pub contact: Contact,
    pub extra: BTreeMap<String, Value>,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        defaults::settings().clone()
    }
}

impl SettingsSnapshot {
    /// Overlay raw `setting_key → setting_value` groups onto the compiled defaults.
    pub fn from_groups(groups: &BTreeMap<String, Value>) -> Self {
        let base = defaults::settings();
        let mut extra = BTreeMap::new();
        for (key, value) in groups {
            if SettingGroup::from_key(key).is_none() {
                extra.insert(key.clone(), value.clone());
            }
        }

        let lookup = |group: SettingGroup| groups.get(group.as_str());
        Self {
            identity: merge_group(
                SettingGroup::Identity,
                &base.identity,
                lookup(SettingGroup::Identity),
            ),
            branding: merge_group(
                SettingGroup::Branding,
                &base.branding,
                lookup(SettingGroup::Branding),
            ),
            theme: merge_group(SettingGroup::Theme, &base.theme, lookup(SettingGroup::Theme)),
            seo: merge_group(SettingGroup::Seo, &base.seo, lookup(SettingGroup::Seo)),
            contact: merge_group(
                SettingGroup::Contact,
                &base.contact,
                lookup(SettingGroup::Contact),
            ),
            extra,
        }
    }

    /// Document title: SEO title when set, otherwise the site name.
    pub fn document_title(&self) -> &str {
        if self.seo.meta_title.trim().is_empty() {
            &self.identity.site_name
        } else {
            &self.seo.meta_title
        }
    }

    pub fn document_description(&self) -> &str {
        if self.seo.meta_description.trim().is_empty() {
            &self.identity.description
        } else {
            &self.seo.meta_description
        }
    }
}

/// Per-field overlay: a non-blank remote field replaces a declared default when
/// the JSON kinds agree. Undeclared fields are carried into the group's `extra`.
fn merge_group<T>(group: SettingGroup, default: &T, remote: Option<&Value>) -> T
where
    T: Clone + Serialize + DeserializeOwned,
{
    let Some(remote) = remote else {
        return default.clone();
    };
    let Some(fields) = remote.as_object() else {
        warn!(
            group = group.as_str(),
            found = kind_name(remote),
            "Settings group is not an object; using defaults"
        );
        return default.clone();
    };
    let mut merged: Map<String, Value> = match serde_json::to_value(default) {
        Ok(Value::Object(map)) => map,
        _ => return default.clone(),
    };

    for (field, value) in fields {
        if is_blank(value) {
            continue;
        }
        let Some(current) = merged.get(field) else {
            debug!(group = group.as_str(), field = %field, "Keeping undeclared settings field");
            merged.insert(field.clone(), value.clone());
            continue;
        };
        if std::mem::discriminant(current) != std::mem::discriminant(value) {
            warn!(
                group = group.as_str(),
                field = %field,
                expected = kind_name(current),
                found = kind_name(value),
                "Ignoring settings field with unexpected type"
            );
            continue;
        }
        merged.insert(field.clone(), value.clone());
    }

    match serde_json::from_value(Value::Object(merged)) {
        Ok(resolved) => resolved,
        Err(err) => {
            warn!(group = group.as_str(), error = %err, "Settings group failed to decode; using defaults");
            default.clone()
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}
