//! The outgoing log record that enrichment writes into.
//!
//! A record owns its properties. The context stack only guarantees the order
//! in which entries are applied (top to bottom); what happens on a key
//! collision is decided here, by whichever insertion method an enricher calls.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use tracing::Level;

use crate::value::{LogProperty, PropertyValue};

/// A log record under construction.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    timestamp: DateTime<Utc>,
    level: Level,
    target: String,
    message: String,
    properties: BTreeMap<String, PropertyValue>,
}

impl LogRecord {
    /// Creates an empty record stamped with the current time.
    #[must_use]
    pub fn new(level: Level, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            target: target.into(),
            message: message.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Overrides the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Returns when the record was created.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the record level.
    #[must_use]
    pub const fn level(&self) -> Level {
        self.level
    }

    /// Returns the record target.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns the rendered message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns all properties, ordered by name.
    #[must_use]
    pub const fn properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.properties
    }

    /// Looks up a single property.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// Returns `true` if a property with this name is present.
    #[must_use]
    pub fn contains_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Adds a property unless one with the same name is already present.
    ///
    /// Returns `true` if the property was added. Because context entries are
    /// applied top to bottom, an enricher using this method gives precedence
    /// to the most recently pushed entry.
    pub fn add_property_if_absent(&mut self, property: LogProperty) -> bool {
        if self.properties.contains_key(&property.name) {
            return false;
        }
        self.properties.insert(property.name, property.value);
        true
    }

    /// Adds a property, replacing any existing value with the same name.
    pub fn add_or_update_property(&mut self, property: LogProperty) {
        self.properties.insert(property.name, property.value);
    }

    /// Removes a property, returning its value if it was present.
    pub fn remove_property(&mut self, name: &str) -> Option<PropertyValue> {
        self.properties.remove(name)
    }

    /// Renders the record as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let properties: Map<String, Value> = self
            .properties
            .iter()
            .map(|(name, value)| {
                (
                    name.clone(),
                    serde_json::to_value(value).unwrap_or(Value::Null),
                )
            })
            .collect();

        json!({
            "timestamp": self.timestamp.to_rfc3339(),
            "level": self.level.to_string(),
            "target": self.target,
            "message": self.message,
            "properties": properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> LogRecord {
        LogRecord::new(Level::INFO, "test", "hello")
    }

    #[test]
    fn test_add_if_absent_keeps_first_write() {
        let mut record = record();

        assert!(record.add_property_if_absent(LogProperty::new("A", 2)));
        assert!(!record.add_property_if_absent(LogProperty::new("A", 1)));

        assert_eq!(record.property("A"), Some(&PropertyValue::Int(2)));
    }

    #[test]
    fn test_add_or_update_keeps_last_write() {
        let mut record = record();

        record.add_or_update_property(LogProperty::new("A", 2));
        record.add_or_update_property(LogProperty::new("A", 1));

        assert_eq!(record.property("A"), Some(&PropertyValue::Int(1)));
    }

    #[test]
    fn test_remove_property() {
        let mut record = record();
        record.add_or_update_property(LogProperty::new("A", 1));

        assert_eq!(record.remove_property("A"), Some(PropertyValue::Int(1)));
        assert!(!record.contains_property("A"));
        assert!(record.properties().is_empty());
    }

    #[test]
    fn test_to_json_shape() {
        let mut record = record();
        record.add_or_update_property(LogProperty::new("AppName", "svc"));

        let json = record.to_json();
        assert_eq!(json["level"], "INFO");
        assert_eq!(json["target"], "test");
        assert_eq!(json["message"], "hello");
        assert_eq!(json["properties"]["AppName"], "svc");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_with_timestamp_overrides_creation_time() {
        let at = chrono::DateTime::parse_from_rfc3339("2012-10-28T00:01:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let record = record().with_timestamp(at);

        assert_eq!(record.timestamp(), at);
        assert_eq!(record.to_json()["timestamp"], at.to_rfc3339());
    }
}
