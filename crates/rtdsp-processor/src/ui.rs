//! Introspection descriptors for external control surfaces.
//!
//! The shape loosely follows the JSON a Faust program describes itself
//! with: the program name, its channel counts, and a list of widget
//! groups. Serialization format is left to the caller; these types only
//! derive `Serialize`.

use crate::params::{ParamRegistry, Widget};
use serde::Serialize;
use std::collections::BTreeMap;

/// One control in a UI group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiItem {
    #[serde(rename = "type")]
    pub widget: Widget,
    pub label: String,
    /// Parameter id, usable with `set_value`
    pub address: String,
    /// Parameter index, usable with `set_value`
    pub index: usize,
    pub init: f32,
    pub min: f32,
    pub max: f32,
    pub step: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// A labelled group of controls
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiGroup {
    pub label: String,
    pub items: Vec<UiItem>,
}

/// Complete UI description of a program
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UiDescriptor {
    pub name: String,
    pub inputs: usize,
    pub outputs: usize,
    pub ui: Vec<UiGroup>,
}

impl UiDescriptor {
    /// Build from a registry, grouping parameters by their `group` field.
    ///
    /// Groups appear in the order their first parameter was registered.
    /// Parameters without a group land in a group labelled `name`.
    pub fn from_registry(
        name: impl Into<String>,
        inputs: usize,
        outputs: usize,
        registry: &ParamRegistry,
    ) -> Self {
        let name = name.into();
        let mut ui: Vec<UiGroup> = Vec::new();

        for (index, descriptor) in registry.iter().enumerate() {
            let label = if descriptor.group.is_empty() {
                name.as_str()
            } else {
                descriptor.group.as_str()
            };

            let item = UiItem {
                widget: descriptor.widget,
                label: descriptor.label.clone(),
                address: descriptor.id.clone(),
                index,
                init: descriptor.default,
                min: descriptor.min,
                max: descriptor.max,
                step: descriptor.step,
                unit: descriptor.unit.clone(),
            };

            match ui.iter_mut().find(|group| group.label == label) {
                Some(group) => group.items.push(item),
                None => ui.push(UiGroup {
                    label: label.to_string(),
                    items: vec![item],
                }),
            }
        }

        Self {
            name,
            inputs,
            outputs,
            ui,
        }
    }

    /// Total number of controls across all groups.
    pub fn item_count(&self) -> usize {
        self.ui.iter().map(|group| group.items.len()).sum()
    }
}

/// Key/value metadata about a program
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Metadata {
    entries: BTreeMap<String, String>,
}

impl Metadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
