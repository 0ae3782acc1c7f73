//! Typed bean fields <-> generic property bags.
//!
//! `put` keeps bags minimal: absent values, empty strings and empty
//! collections are never written. Scalars that are present are always
//! written, so `0` and `false` round-trip.
//!
//! `remove` and [`PropertyCursor`] consume properties. A converter takes every
//! field its type's ancestor chain knows about; whatever the cursor still
//! holds afterwards is subtype-specific or unknown data.

use chrono::{DateTime, Utc};
use metaweave_store::{InstanceProperties, PropertyValue};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// Typed values
// ============================================================================

/// A Rust type that maps onto one [`PropertyValue`] variant.
pub trait PropertyType: Sized {
    const KIND: &'static str;

    fn is_zero(&self) -> bool {
        false
    }

    fn into_value(self) -> PropertyValue;

    /// `None` when `value` is of an incompatible kind.
    fn from_value(value: PropertyValue) -> Option<Self>;
}

impl PropertyType for String {
    const KIND: &'static str = "string";

    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn into_value(self) -> PropertyValue {
        PropertyValue::String(self)
    }

    fn from_value(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl PropertyType for i32 {
    const KIND: &'static str = "int";

    fn into_value(self) -> PropertyValue {
        PropertyValue::Int(self)
    }

    fn from_value(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Int(v) => Some(v),
            _ => None,
        }
    }
}

impl PropertyType for i64 {
    const KIND: &'static str = "long";

    fn into_value(self) -> PropertyValue {
        PropertyValue::Long(self)
    }

    fn from_value(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Long(v) => Some(v),
            PropertyValue::Int(v) => Some(i64::from(v)),
            _ => None,
        }
    }
}

impl PropertyType for f64 {
    const KIND: &'static str = "double";

    fn into_value(self) -> PropertyValue {
        PropertyValue::Double(self)
    }

    fn from_value(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Double(v) => Some(v),
            PropertyValue::Int(v) => Some(f64::from(v)),
            PropertyValue::Long(v) => Some(v as f64),
            _ => None,
        }
    }
}

impl PropertyType for bool {
    const KIND: &'static str = "boolean";

    fn into_value(self) -> PropertyValue {
        PropertyValue::Boolean(self)
    }

    fn from_value(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Boolean(v) => Some(v),
            _ => None,
        }
    }
}

impl PropertyType for DateTime<Utc> {
    const KIND: &'static str = "date";

    fn into_value(self) -> PropertyValue {
        PropertyValue::Date(self)
    }

    fn from_value(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Date(v) => Some(v),
            _ => None,
        }
    }
}

impl PropertyType for Vec<String> {
    const KIND: &'static str = "string-list";

    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn into_value(self) -> PropertyValue {
        PropertyValue::StringList(self)
    }

    fn from_value(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::StringList(v) => Some(v),
            _ => None,
        }
    }
}

macro_rules! map_property_type {
    ($value:ty, $variant:ident, $kind:literal) => {
        impl PropertyType for BTreeMap<String, $value> {
            const KIND: &'static str = $kind;

            fn is_zero(&self) -> bool {
                self.is_empty()
            }

            fn into_value(self) -> PropertyValue {
                PropertyValue::$variant(self)
            }

            fn from_value(value: PropertyValue) -> Option<Self> {
                match value {
                    PropertyValue::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

map_property_type!(String, StringMap, "string-map");
map_property_type!(i32, IntMap, "int-map");
map_property_type!(i64, LongMap, "long-map");
map_property_type!(bool, BooleanMap, "boolean-map");

/// Enumerations stored by ordinal.
pub trait OrdinalEnum: Sized {
    fn ordinal(&self) -> i32;
    fn symbolic_name(&self) -> &'static str;
    /// Unrecognised ordinals map to a catch-all variant.
    fn from_ordinal(ordinal: i32) -> Self;

    fn into_value(self) -> PropertyValue {
        PropertyValue::Enum {
            ordinal: self.ordinal(),
            symbolic_name: self.symbolic_name().to_string(),
        }
    }
}

fn enum_ordinal(value: &PropertyValue) -> Option<i32> {
    match value {
        PropertyValue::Enum { ordinal, .. } => Some(*ordinal),
        PropertyValue::Int(ordinal) => Some(*ordinal),
        _ => None,
    }
}

// ============================================================================
// Bag operations
// ============================================================================

/// Add `value` to `bag` unless it is absent or a zero value.
pub fn put<T: PropertyType>(mut bag: InstanceProperties, name: &str, value: Option<T>) -> InstanceProperties {
    if let Some(value) = value.filter(|v| !v.is_zero()) {
        bag.insert(name, value.into_value());
    }
    bag
}

pub fn put_enum<E: OrdinalEnum>(mut bag: InstanceProperties, name: &str, value: Option<E>) -> InstanceProperties {
    if let Some(value) = value {
        bag.insert(name, value.into_value());
    }
    bag
}

/// Extract and delete `name`. A value of an incompatible kind is still
/// removed; it is reported and `None` is returned.
pub fn remove<T: PropertyType>(mut bag: InstanceProperties, name: &str) -> (Option<T>, InstanceProperties) {
    let value = bag.remove(name).and_then(|value| decode::<T>(name, value));
    (value, bag)
}

fn decode<T: PropertyType>(name: &str, value: PropertyValue) -> Option<T> {
    let found = value.kind();
    let decoded = T::from_value(value);
    if decoded.is_none() {
        tracing::warn!(
            property = name,
            expected = T::KIND,
            found,
            "property has unexpected type; value dropped"
        );
    }
    decoded
}

// ============================================================================
// Cursor
// ============================================================================

/// Private copy of an element's properties that records what was consumed.
#[derive(Debug, Clone)]
pub struct PropertyCursor {
    remaining: InstanceProperties,
    consumed: BTreeSet<String>,
}

impl PropertyCursor {
    pub fn new(properties: &InstanceProperties) -> Self {
        Self {
            remaining: properties.clone(),
            consumed: BTreeSet::new(),
        }
    }

    pub fn take<T: PropertyType>(&mut self, name: &str) -> Option<T> {
        let value = self.remaining.remove(name)?;
        self.consumed.insert(name.to_string());
        decode(name, value)
    }

    pub fn take_enum<E: OrdinalEnum>(&mut self, name: &str) -> Option<E> {
        let value = self.remaining.remove(name)?;
        self.consumed.insert(name.to_string());
        match enum_ordinal(&value) {
            Some(ordinal) => Some(E::from_ordinal(ordinal)),
            None => {
                tracing::warn!(
                    property = name,
                    found = value.kind(),
                    "enum property is not an ordinal; value dropped"
                );
                None
            }
        }
    }

    /// Take a string-map, treating absence as empty.
    pub fn take_map(&mut self, name: &str) -> BTreeMap<String, String> {
        self.take(name).unwrap_or_default()
    }

    /// Take a string list, treating absence as empty.
    pub fn take_list(&mut self, name: &str) -> Vec<String> {
        self.take(name).unwrap_or_default()
    }

    pub fn is_consumed(&self, name: &str) -> bool {
        self.consumed.contains(name)
    }

    pub fn remaining(&self) -> &InstanceProperties {
        &self.remaining
    }

    /// Everything not consumed: the extended-properties overflow.
    pub fn into_remaining(self) -> BTreeMap<String, PropertyValue> {
        self.remaining.into_values()
    }
}

/// Read an ordinal enum from a bag without consuming it.
pub fn get_enum<E: OrdinalEnum>(bag: &InstanceProperties, name: &str) -> Option<E> {
    bag.get(name).and_then(enum_ordinal).map(E::from_ordinal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Colour {
        Red,
        Blue,
        Unknown,
    }

    impl OrdinalEnum for Colour {
        fn ordinal(&self) -> i32 {
            match self {
                Colour::Red => 0,
                Colour::Blue => 1,
                Colour::Unknown => 99,
            }
        }

        fn symbolic_name(&self) -> &'static str {
            match self {
                Colour::Red => "RED",
                Colour::Blue => "BLUE",
                Colour::Unknown => "UNKNOWN",
            }
        }

        fn from_ordinal(ordinal: i32) -> Self {
            match ordinal {
                0 => Colour::Red,
                1 => Colour::Blue,
                _ => Colour::Unknown,
            }
        }
    }

    #[test]
    fn zero_values_are_not_written() {
        let bag = InstanceProperties::new();
        let bag = put::<String>(bag, "empty", Some(String::new()));
        let bag = put::<String>(bag, "absent", None);
        let bag = put::<Vec<String>>(bag, "list", Some(vec![]));
        let bag = put(bag, "zero", Some(0i32));
        let bag = put(bag, "flag", Some(false));
        assert_eq!(bag.names().collect::<Vec<_>>(), vec!["flag", "zero"]);
    }

    #[test]
    fn remove_widens_numeric_kinds() {
        let bag = InstanceProperties::new().with("count", PropertyValue::Int(7));
        let (count, bag) = remove::<i64>(bag, "count");
        assert_eq!(count, Some(7));
        assert!(bag.is_empty());

        let bag = InstanceProperties::new().with("score", PropertyValue::Long(3));
        let (score, _) = remove::<f64>(bag, "score");
        assert_eq!(score, Some(3.0));
    }

    #[test]
    fn mismatched_kind_is_consumed_but_dropped() {
        let bag = InstanceProperties::new().with("summary", PropertyValue::Int(1));
        let mut cursor = PropertyCursor::new(&bag);
        assert_eq!(cursor.take::<String>("summary"), None);
        assert!(cursor.is_consumed("summary"));
        assert!(cursor.remaining().is_empty());
    }

    #[test]
    fn cursor_leaves_only_unconsumed_properties() {
        let bag = InstanceProperties::new()
            .with("summary", PropertyValue::String("s".into()))
            .with("colour", Colour::Blue.into_value())
            .with("futureField", PropertyValue::Boolean(true));
        let mut cursor = PropertyCursor::new(&bag);
        assert_eq!(cursor.take::<String>("summary").as_deref(), Some("s"));
        assert_eq!(cursor.take_enum::<Colour>("colour"), Some(Colour::Blue));
        let rest = cursor.into_remaining();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest.get("futureField"), Some(&PropertyValue::Boolean(true)));
    }

    #[test]
    fn unknown_ordinals_fall_back() {
        let bag = InstanceProperties::new().with("colour", PropertyValue::Int(42));
        assert_eq!(get_enum::<Colour>(&bag, "colour"), Some(Colour::Unknown));
    }
}
