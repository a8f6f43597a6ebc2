//! Enrichers: the entries held by a context stack.
//!
//! An enricher is an immutable unit of work applied to each outgoing record.
//! The common case is [`PropertyEnricher`], a name/value pair; any closure
//! with the right signature is an enricher too.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::error::{ContextError, ContextResult};
use crate::record::LogRecord;
use crate::value::PropertyFactory;

/// Applies itself to an outgoing record.
pub trait Enrich: Send + Sync {
    /// Writes into `record`, building values with `factory`.
    fn enrich(&self, record: &mut LogRecord, factory: &dyn PropertyFactory);
}

impl<F> Enrich for F
where
    F: Fn(&mut LogRecord, &dyn PropertyFactory) + Send + Sync,
{
    fn enrich(&self, record: &mut LogRecord, factory: &dyn PropertyFactory) {
        self(record, factory);
    }
}

/// A shared, immutable enricher as stored on a stack.
pub type SharedEnricher = Arc<dyn Enrich>;

/// Attaches a single named property.
///
/// The value is captured when the enricher is created, so later changes to the
/// original value are not observed. The property is added only if the record
/// does not already carry one with the same name.
#[derive(Clone, PartialEq)]
pub struct PropertyEnricher {
    name: String,
    value: Value,
    destructure: bool,
}

impl PropertyEnricher {
    /// Creates a property enricher.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::InvalidArgument`] if `name` is empty or only
    /// whitespace, or if `value` cannot be serialized.
    pub fn new(
        name: impl Into<String>,
        value: impl Serialize,
        destructure: bool,
    ) -> ContextResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ContextError::invalid_argument(
                "name",
                "property name must not be empty",
            ));
        }

        let value = serde_json::to_value(value).map_err(|e| {
            ContextError::invalid_argument("value", format!("value cannot be captured: {e}"))
        })?;

        Ok(Self {
            name,
            value,
            destructure,
        })
    }

    /// Returns the property name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the captured value.
    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.value
    }

    /// Returns the destructure hint.
    #[must_use]
    pub const fn destructure(&self) -> bool {
        self.destructure
    }

    /// Wraps this enricher for pushing.
    #[must_use]
    pub fn shared(self) -> SharedEnricher {
        Arc::new(self)
    }
}

impl Enrich for PropertyEnricher {
    fn enrich(&self, record: &mut LogRecord, factory: &dyn PropertyFactory) {
        record.add_property_if_absent(factory.create_property(
            &self.name,
            &self.value,
            self.destructure,
        ));
    }
}

impl fmt::Debug for PropertyEnricher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyEnricher")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("destructure", &self.destructure)
            .finish()
    }
}

/// Convenience constructor for a shared [`PropertyEnricher`].
///
/// # Errors
///
/// See [`PropertyEnricher::new`].
pub fn property(name: impl Into<String>, value: impl Serialize) -> ContextResult<SharedEnricher> {
    PropertyEnricher::new(name, value, false).map(PropertyEnricher::shared)
}
