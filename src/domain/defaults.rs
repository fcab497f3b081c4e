//! Compiled-in fallback content and settings.
//!
//! These values are the last tier of every fallback chain: whatever the remote
//! service and the local store fail to provide is served from here.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use serde_json::{Map, Value, json};

use super::content::{ContentSnapshot, PageContent, SectionContent};
use super::settings::{Branding, Contact, Seo, SettingsSnapshot, SiteIdentity, Theme};

static DEFAULT_CONTENT: Lazy<ContentSnapshot> = Lazy::new(|| {
    let pages = json!({
        "homepage": {
            "hero": {
                "title": "Designing calm, useful software",
                "subtitle": "Independent engineer and designer helping small teams ship.",
                "cta_label": "See my work",
                "cta_href": "/portfolio"
            },
            "about_preview": {
                "heading": "About me",
                "body": "A decade of building products for the web, from first sketch to production."
            },
            "services_preview": {
                "heading": "What I do",
                "items": ["Product design", "Web development", "Technical consulting"]
            },
            "cta": {
                "heading": "Have a project in mind?",
                "label": "Get in touch",
                "href": "/contact"
            }
        },
        "about": {
            "hero": {"title": "About", "subtitle": "The person behind the work."},
            "story": {"heading": "My story", "body": "I started building websites as a teenager and never stopped."},
            "skills": {"heading": "Skills", "items": ["Rust", "TypeScript", "Interaction design"]}
        },
        "services": {
            "hero": {"title": "Services", "subtitle": "Ways we can work together."},
            "offerings": {"heading": "Offerings", "items": []}
        },
        "portfolio": {
            "hero": {"title": "Portfolio", "subtitle": "Selected projects."},
            "intro": {"body": "A few things I have built recently."}
        },
        "blog": {
            "hero": {"title": "Writing", "subtitle": "Notes on craft and process."}
        },
        "contact": {
            "hero": {"title": "Contact", "subtitle": "Let's talk about your project."},
            "form": {"submit_label": "Send message", "success_message": "Thanks, I'll reply soon."},
            "details": {"heading": "Other ways to reach me"}
        }
    });
    serde_json::from_value(pages).unwrap_or_default()
});

static DEFAULT_SETTINGS: Lazy<SettingsSnapshot> = Lazy::new(|| SettingsSnapshot {
    identity: SiteIdentity {
        site_name: "Portfolio".to_string(),
        tagline: "Design & Engineering".to_string(),
        description: "Personal portfolio showcasing projects, services and writing.".to_string(),
        owner_name: String::new(),
        extra: Map::new(),
    },
    branding: Branding {
        favicon_url: "/favicon.ico".to_string(),
        favicon_type: "image/x-icon".to_string(),
        logo_url: String::new(),
        logo_alt: "Logo".to_string(),
        extra: Map::new(),
    },
    theme: Theme {
        primary_color: "#1f2937".to_string(),
        accent_color: "#f59e0b".to_string(),
        font_family: "Inter, system-ui, sans-serif".to_string(),
        dark_mode: false,
        extra: Map::new(),
    },
    seo: Seo {
        meta_title: "Portfolio | Design & Engineering".to_string(),
        meta_description: "Personal portfolio showcasing projects, services and writing."
            .to_string(),
        og_image: String::new(),
        extra: Map::new(),
    },
    contact: Contact {
        email: String::new(),
        phone: String::new(),
        location: String::new(),
        booking_url: String::new(),
        extra: Map::new(),
    },
    extra: BTreeMap::new(),
});

pub fn settings() -> &'static SettingsSnapshot {
    &DEFAULT_SETTINGS
}

/// Compiled content for a page; unknown pages resolve to an empty page.
pub fn page(page_key: &str) -> PageContent {
    DEFAULT_CONTENT.page(page_key).cloned().unwrap_or_default()
}

/// Compiled content for a section, or an empty stub when none is compiled in.
pub fn section(page_key: &str, section_key: &str) -> SectionContent {
    DEFAULT_CONTENT
        .page(page_key)
        .and_then(|page| page.section(section_key))
        .cloned()
        .unwrap_or_default()
}

/// Whether a section value came from the stub rather than real content.
pub fn is_stub(section: &SectionContent) -> bool {
    section.is_empty() || section.values().all(Value::is_null)
}
