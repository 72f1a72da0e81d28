//! Construction-time view of the graph node a kernel is instantiated for.
//!
//! The surrounding framework owns graph parsing; it hands the kernel a [`NodeDescriptor`]
//! with named attributes, statically known value shapes, and any constant initializers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, UnpoolError};
use crate::tensor::DType;

/// Represents a single axis extent in a statically inferred shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Static(usize),
    Dynamic(String),
}

impl Dimension {
    pub fn as_static(&self) -> Option<usize> {
        match self {
            Dimension::Static(value) => Some(*value),
            Dimension::Dynamic(_) => None,
        }
    }
}

impl From<usize> for Dimension {
    fn from(value: usize) -> Self {
        Dimension::Static(value)
    }
}

/// Type and (optional) shape of a graph value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueInfo {
    pub name: String,
    pub dtype: Option<DType>,
    #[serde(default)]
    pub shape: Option<Vec<Dimension>>,
}

impl ValueInfo {
    pub fn new(name: impl Into<String>, dtype: DType, shape: Option<Vec<Dimension>>) -> Self {
        Self {
            name: name.into(),
            dtype: Some(dtype),
            shape,
        }
    }

    /// Fully static shape helper.
    pub fn with_static_shape(name: impl Into<String>, dtype: DType, dims: &[usize]) -> Self {
        Self::new(
            name,
            dtype,
            Some(dims.iter().copied().map(Dimension::Static).collect()),
        )
    }

    pub fn rank(&self) -> Option<usize> {
        self.shape.as_ref().map(Vec::len)
    }

    pub fn static_dim(&self, axis: usize) -> Option<usize> {
        self.shape.as_ref()?.get(axis)?.as_static()
    }
}

/// Attribute payloads used by pooling-style operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    Int(i64),
    Ints(Vec<i64>),
    String(String),
}

/// Named node attributes with typed accessors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeMap {
    values: BTreeMap<String, AttributeValue>,
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: AttributeValue) -> &mut Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn with_int(mut self, name: impl Into<String>, value: i64) -> Self {
        self.insert(name, AttributeValue::Int(value));
        self
    }

    pub fn with_ints(mut self, name: impl Into<String>, values: impl Into<Vec<i64>>) -> Self {
        self.insert(name, AttributeValue::Ints(values.into()));
        self
    }

    pub fn with_string(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, AttributeValue::String(value.into()));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.values.get(name)
    }

    pub fn get_int(&self, op: &'static str, name: &'static str) -> Result<Option<i64>> {
        match self.values.get(name) {
            None => Ok(None),
            Some(AttributeValue::Int(value)) => Ok(Some(*value)),
            Some(other) => Err(type_error(op, name, "int", other)),
        }
    }

    pub fn get_int_or(&self, op: &'static str, name: &'static str, default: i64) -> Result<i64> {
        Ok(self.get_int(op, name)?.unwrap_or(default))
    }

    pub fn get_ints(&self, op: &'static str, name: &'static str) -> Result<Option<&[i64]>> {
        match self.values.get(name) {
            None => Ok(None),
            Some(AttributeValue::Ints(values)) => Ok(Some(values)),
            Some(other) => Err(type_error(op, name, "ints", other)),
        }
    }

    pub fn get_string_or<'a>(
        &'a self,
        op: &'static str,
        name: &'static str,
        default: &'a str,
    ) -> Result<&'a str> {
        match self.values.get(name) {
            None => Ok(default),
            Some(AttributeValue::String(value)) => Ok(value),
            Some(other) => Err(type_error(op, name, "string", other)),
        }
    }
}

fn type_error(
    op: &'static str,
    name: &'static str,
    expected: &str,
    found: &AttributeValue,
) -> UnpoolError {
    let found = match found {
        AttributeValue::Int(_) => "int",
        AttributeValue::Ints(_) => "ints",
        AttributeValue::String(_) => "string",
    };
    UnpoolError::invalid_attribute(op, name, format!("expected {expected}, found {found}"))
}

/// Constant integer tensor known at graph-build time (e.g. a MaxUnpool `output_shape`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstTensor {
    pub dims: Vec<usize>,
    pub data: Vec<i64>,
}

/// Everything the kernel may inspect about its node before the first invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub op_type: String,
    #[serde(default)]
    pub domain: String,
    pub since_version: u32,
    pub inputs: Vec<ValueInfo>,
    pub outputs: Vec<ValueInfo>,
    #[serde(default)]
    pub attributes: AttributeMap,
    #[serde(default)]
    pub initializers: BTreeMap<String, ConstTensor>,
}

impl NodeDescriptor {
    pub fn new(op_type: impl Into<String>, domain: impl Into<String>, since_version: u32) -> Self {
        Self {
            op_type: op_type.into(),
            domain: domain.into(),
            since_version,
            inputs: Vec::new(),
            outputs: Vec::new(),
            attributes: AttributeMap::new(),
            initializers: BTreeMap::new(),
        }
    }

    pub fn with_input(mut self, value: ValueInfo) -> Self {
        self.inputs.push(value);
        self
    }

    pub fn with_output(mut self, value: ValueInfo) -> Self {
        self.outputs.push(value);
        self
    }

    pub fn with_attributes(mut self, attributes: AttributeMap) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_initializer(mut self, name: impl Into<String>, tensor: ConstTensor) -> Self {
        self.initializers.insert(name.into(), tensor);
        self
    }

    /// Returns the constant value feeding input `index`, if that input is an initializer.
    pub fn constant_input(&self, index: usize) -> Option<&ConstTensor> {
        let value = self.inputs.get(index)?;
        self.initializers.get(&value.name)
    }

    pub fn from_json_str(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_string(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors_report_mismatched_kinds() {
        let attrs = AttributeMap::new()
            .with_ints("kernel_shape", [2, 2])
            .with_int("mode", 1);
        assert_eq!(
            attrs.get_ints("MaxUnpool", "kernel_shape").unwrap(),
            Some(&[2i64, 2][..])
        );
        assert_eq!(attrs.get_int_or("MaxUnpool", "missing", 7).unwrap(), 7);
        let err = attrs.get_int("MaxUnpool", "kernel_shape").unwrap_err();
        assert!(matches!(err, UnpoolError::InvalidAttribute { name: "kernel_shape", .. }));
    }

    #[test]
    fn constant_input_resolves_by_value_name() {
        let node = NodeDescriptor::new("MaxUnpool", "", 11)
            .with_input(ValueInfo::new("x", DType::F32, None))
            .with_input(ValueInfo::new("i", DType::I64, None))
            .with_input(ValueInfo::new("shape", DType::I64, None))
            .with_initializer(
                "shape",
                ConstTensor {
                    dims: vec![4],
                    data: vec![1, 1, 4, 4],
                },
            );
        assert!(node.constant_input(1).is_none());
        assert_eq!(node.constant_input(2).unwrap().data, vec![1, 1, 4, 4]);
    }
}
