use media_api::{FieldDescriptor, RecordType};
use tracing::debug;

/// A persisted record type declaring its columns to the catalogue.
pub trait Persisted {
    const TABLE: &'static str;

    fn fields() -> Vec<FieldDescriptor>;

    fn record_type() -> RecordType {
        RecordType::new(Self::TABLE, Self::fields())
    }
}

/// Explicit list of every record type the collector has to inspect.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    types: Vec<RecordType>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Persisted>(&mut self) -> &mut Self {
        self.register_type(T::record_type())
    }

    /// Register a record type; a later registration of the same table
    /// replaces the earlier one.
    pub fn register_type(&mut self, record: RecordType) -> &mut Self {
        if let Some(existing) = self.types.iter_mut().find(|t| t.name == record.name) {
            debug!("replacing registration of {}", record.name);
            *existing = record;
        } else {
            self.types.push(record);
        }
        self
    }

    pub fn record_types(&self) -> &[RecordType] {
        &self.types
    }

    pub fn get(&self, name: &str) -> Option<&RecordType> {
        self.types.iter().find(|t| t.name == name)
    }
}
