//! Typed property bags shared by entities, relationships and classifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single typed property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    String(String),
    Int(i32),
    Long(i64),
    Double(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
    /// Enumerated value stored by ordinal; the symbolic name is informational.
    Enum { ordinal: i32, symbolic_name: String },
    StringList(Vec<String>),
    StringMap(BTreeMap<String, String>),
    IntMap(BTreeMap<String, i32>),
    LongMap(BTreeMap<String, i64>),
    BooleanMap(BTreeMap<String, bool>),
}

impl PropertyValue {
    /// Short name of the value kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            PropertyValue::String(_) => "string",
            PropertyValue::Int(_) => "int",
            PropertyValue::Long(_) => "long",
            PropertyValue::Double(_) => "double",
            PropertyValue::Boolean(_) => "boolean",
            PropertyValue::Date(_) => "date",
            PropertyValue::Enum { .. } => "enum",
            PropertyValue::StringList(_) => "string-list",
            PropertyValue::StringMap(_) => "string-map",
            PropertyValue::IntMap(_) => "int-map",
            PropertyValue::LongMap(_) => "long-map",
            PropertyValue::BooleanMap(_) => "boolean-map",
        }
    }

    /// String views used for search: the string itself, every element of a
    /// list, or the symbolic name of an enum.
    pub fn searchable_strings(&self) -> Vec<&str> {
        match self {
            PropertyValue::String(s) => vec![s.as_str()],
            PropertyValue::StringList(values) => values.iter().map(String::as_str).collect(),
            PropertyValue::Enum { symbolic_name, .. } => vec![symbolic_name.as_str()],
            _ => Vec::new(),
        }
    }
}

/// `[from, to]` validity window. Both ends are inclusive and optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivityWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl EffectivityWindow {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to }
    }

    pub fn is_open(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// `from <= to` whenever both are set.
    pub fn is_well_formed(&self) -> bool {
        match (self.from, self.to) {
            (Some(from), Some(to)) => from <= to,
            _ => true,
        }
    }

    pub fn is_active_at(&self, time: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| time >= from) && self.to.map_or(true, |to| time <= to)
    }
}

/// Named property bag with an effectivity window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceProperties {
    values: BTreeMap<String, PropertyValue>,
    pub effective_from: Option<DateTime<Utc>>,
    pub effective_to: Option<DateTime<Utc>>,
}

impl InstanceProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.get(name)
    }

    pub fn get_string(&self, name: &str) -> Option<&str> {
        match self.values.get(name)? {
            PropertyValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn get_string_list(&self, name: &str) -> Option<&[String]> {
        match self.values.get(name)? {
            PropertyValue::StringList(values) => Some(values.as_slice()),
            _ => None,
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: PropertyValue) {
        self.values.insert(name.into(), value);
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<PropertyValue> {
        self.values.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn into_values(self) -> BTreeMap<String, PropertyValue> {
        self.values
    }

    pub fn window(&self) -> EffectivityWindow {
        EffectivityWindow::new(self.effective_from, self.effective_to)
    }

    pub fn set_window(&mut self, window: EffectivityWindow) {
        self.effective_from = window.from;
        self.effective_to = window.to;
    }

    pub fn is_active_at(&self, time: DateTime<Utc>) -> bool {
        self.window().is_active_at(time)
    }

    /// Overlay `other` onto `self`: values present in `other` win, everything
    /// else in `self` is retained. A window set on `other` replaces ours.
    pub fn merged_with(mut self, other: &InstanceProperties) -> Self {
        for (name, value) in &other.values {
            self.values.insert(name.clone(), value.clone());
        }
        if !other.window().is_open() {
            self.set_window(other.window());
        }
        self
    }
}

impl FromIterator<(String, PropertyValue)> for InstanceProperties {
    fn from_iter<I: IntoIterator<Item = (String, PropertyValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
            effective_from: None,
            effective_to: None,
        }
    }
}
