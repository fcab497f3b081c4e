//! In-memory document head.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::application::document::{DocumentHead, HeadElement, HeadSlot};
use crate::cache::lock::mutex_lock;

const SOURCE: &str = "infra::document";

#[derive(Debug, Clone)]
struct Entry {
    element: HeadElement,
    managed: bool,
}

/// Head contents held in memory, in document order.
///
/// Elements present before the first swap are static; a swap removes a static
/// element only when a managed element takes its slot.
#[derive(Debug, Default)]
pub struct InMemoryDocument {
    entries: Mutex<Vec<Entry>>,
}

impl InMemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_static(elements: impl IntoIterator<Item = HeadElement>) -> Self {
        let entries = elements
            .into_iter()
            .map(|element| Entry {
                element,
                managed: false,
            })
            .collect();
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Number of elements occupying `slot`.
    pub fn count(&self, slot: &HeadSlot) -> usize {
        mutex_lock(&self.entries, SOURCE, "count")
            .iter()
            .filter(|entry| &entry.element.slot() == slot)
            .count()
    }

    /// The head as HTML, one element per line.
    pub fn render(&self) -> String {
        mutex_lock(&self.entries, SOURCE, "render")
            .iter()
            .map(|entry| entry.element.render())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl DocumentHead for InMemoryDocument {
    fn swap_managed(&self, elements: Vec<HeadElement>) {
        let slots: HashSet<HeadSlot> = elements.iter().map(HeadElement::slot).collect();
        let mut entries = mutex_lock(&self.entries, SOURCE, "swap_managed");
        entries.retain(|entry| !entry.managed && !slots.contains(&entry.element.slot()));
        entries.extend(elements.into_iter().map(|element| Entry {
            element,
            managed: true,
        }));
    }

    fn elements(&self) -> Vec<HeadElement> {
        mutex_lock(&self.entries, SOURCE, "elements")
            .iter()
            .map(|entry| entry.element.clone())
            .collect()
    }
}
