//! Rendering fingerprint inputs as JSON.
//!
//! The store treats input documents as opaque text. Producers describe their
//! inputs through [`FingerprintInputs`] and a [`JsonTreeWriter`]. Object
//! properties are sorted by name, so the same inputs always render to the same
//! text regardless of the order they were added in.

use serde_json::{Map, Value};

/// Something that can describe its fingerprint inputs.
pub trait FingerprintInputs {
    /// Write every input as a property of the current object.
    fn write_inputs(&self, writer: &mut JsonTreeWriter);
}

/// Builder for one JSON object tree.
#[derive(Debug, Default)]
pub struct JsonTreeWriter {
    root: Map<String, Value>,
}

impl JsonTreeWriter {
    /// Start an empty object.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scalar or pre-built value.
    pub fn add_property(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.root.insert(name.to_owned(), value.into());
        self
    }

    /// Add a nested object filled in by `build`.
    pub fn add_nested<F>(&mut self, name: &str, build: F) -> &mut Self
    where
        F: FnOnce(&mut Self),
    {
        let mut nested = Self::new();
        build(&mut nested);
        self.root.insert(name.to_owned(), Value::Object(nested.root));
        self
    }

    /// Add an array with one object per item, each filled in by `write`.
    pub fn add_collection<I, T, F>(&mut self, name: &str, items: I, mut write: F) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        F: FnMut(&mut Self, T),
    {
        let values = items
            .into_iter()
            .map(|item| {
                let mut element = Self::new();
                write(&mut element, item);
                Value::Object(element.root)
            })
            .collect();
        self.root.insert(name.to_owned(), Value::Array(values));
        self
    }

    /// Add an array of plain values.
    pub fn add_values<I, V>(&mut self, name: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.root.insert(name.to_owned(), Value::Array(values));
        self
    }

    /// The finished object.
    #[must_use]
    pub fn finish(self) -> Value {
        Value::Object(self.root)
    }
}

/// Render `inputs` to the text stored in the fingerprint columns.
#[must_use]
pub fn render_inputs(inputs: &(impl FingerprintInputs + ?Sized)) -> String {
    let mut writer = JsonTreeWriter::new();
    inputs.write_inputs(&mut writer);
    writer.finish().to_string()
}
