//! Document-head side effects derived from site settings.
//!
//! The settings synchronizer never edits the head element-by-element.
//! It computes the complete managed set and hands it to
//! [`DocumentHead::swap_managed`], which replaces the previous managed set
//! (and any conflicting static element) in one step. Applying the same set
//! twice therefore leaves the head unchanged.

use std::fmt::Write as _;

use crate::domain::settings::SettingsSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadElement {
    Title(String),
    Meta {
        name: String,
        content: String,
    },
    Link {
        rel: String,
        href: String,
        mime: Option<String>,
    },
}

/// Identity of the position an element occupies in the head.
///
/// Two elements with the same slot cannot coexist; inserting one replaces the other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HeadSlot {
    Title,
    Meta(String),
    Icon,
    Link(String),
}

impl HeadElement {
    pub fn meta(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Meta {
            name: name.into(),
            content: content.into(),
        }
    }

    pub fn slot(&self) -> HeadSlot {
        match self {
            HeadElement::Title(_) => HeadSlot::Title,
            HeadElement::Meta { name, .. } => HeadSlot::Meta(name.to_ascii_lowercase()),
            // `icon`, `shortcut icon`, `apple-touch-icon` all compete for the favicon.
            HeadElement::Link { rel, .. } if rel.to_ascii_lowercase().contains("icon") => {
                HeadSlot::Icon
            }
            HeadElement::Link { rel, .. } => HeadSlot::Link(rel.to_ascii_lowercase()),
        }
    }

    /// Render as an HTML fragment.
    pub fn render(&self) -> String {
        let mut out = String::new();
        match self {
            HeadElement::Title(title) => {
                let _ = write!(out, "<title>{}</title>", escape(title));
            }
            HeadElement::Meta { name, content } => {
                let _ = write!(
                    out,
                    r#"<meta name="{}" content="{}">"#,
                    escape(name),
                    escape(content)
                );
            }
            HeadElement::Link { rel, href, mime } => {
                let _ = write!(out, r#"<link rel="{}" href="{}""#, escape(rel), escape(href));
                if let Some(mime) = mime {
                    let _ = write!(out, r#" type="{}""#, escape(mime));
                }
                out.push('>');
            }
        }
        out
    }
}

/// The document head the synchronizer writes into.
pub trait DocumentHead: Send + Sync {
    /// Replace every previously managed element, plus any element sharing a
    /// slot with `elements`, by `elements`, atomically.
    fn swap_managed(&self, elements: Vec<HeadElement>);

    /// Current head contents in document order.
    fn elements(&self) -> Vec<HeadElement>;
}

/// Managed head elements for `settings`, in a fixed order.
pub fn head_elements(settings: &SettingsSnapshot) -> Vec<HeadElement> {
    let mut elements = vec![
        HeadElement::Title(settings.document_title().to_string()),
        HeadElement::meta("description", settings.document_description()),
    ];

    let favicon = settings.branding.favicon_url.trim();
    if !favicon.is_empty() {
        let mime = settings.branding.favicon_type.trim();
        elements.push(HeadElement::Link {
            rel: "icon".to_string(),
            href: favicon.to_string(),
            mime: (!mime.is_empty()).then(|| mime.to_string()),
        });
    }

    let theme_color = settings.theme.primary_color.trim();
    if !theme_color.is_empty() {
        elements.push(HeadElement::meta("theme-color", theme_color));
    }

    elements
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
