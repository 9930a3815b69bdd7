//! Operator nodes, attributes, and tensor literals
//!
//! Defines the building blocks of the graph model: typed attribute values,
//! raw tensor payloads with their decode path, and the operator [`Node`].

use indexmap::IndexMap;
use ndarray::{ArrayD, IxDyn};

/// Decoded tensor literal used for value comparison and attribute capture.
///
/// All tensor payloads are decoded to `f32` before comparison, matching the
/// engine's single numeric domain.
pub type TensorData = ArrayD<f32>;

/// Element type of a raw tensor payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// 32-bit IEEE float
    Float,
    /// 64-bit IEEE float
    Double,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 8-bit unsigned integer
    Uint8,
    /// Boolean stored as one byte
    Bool,
}

impl DataType {
    /// Size of one element in bytes
    pub fn elem_size(&self) -> usize {
        match self {
            DataType::Float | DataType::Int32 => 4,
            DataType::Double | DataType::Int64 => 8,
            DataType::Uint8 | DataType::Bool => 1,
        }
    }
}

/// A named constant tensor: shape, element type, and raw data.
///
/// Used both for graph-owned weights (initializers) and for the `value`
/// attribute of `Constant` nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    /// Tensor name (empty for anonymous attribute tensors)
    pub name: String,
    /// Shape; empty means a 0-d scalar
    pub dims: Vec<i64>,
    /// Element type of `data`
    pub dtype: DataType,
    /// Raw little-endian payload
    pub data: Vec<u8>,
}

/// Weights are graph-owned constant tensors referenced by name from node inputs
pub type Weight = Tensor;

impl Tensor {
    /// Build a float tensor from decoded values
    pub fn from_f32(name: &str, values: &TensorData) -> Self {
        let mut data = Vec::with_capacity(values.len() * 4);
        for v in values.iter() {
            data.extend_from_slice(&v.to_le_bytes());
        }
        Self {
            name: name.to_string(),
            dims: values.shape().iter().map(|&d| d as i64).collect(),
            dtype: DataType::Float,
            data,
        }
    }

    /// Build a 0-d float scalar
    pub fn scalar_f32(name: &str, value: f32) -> Self {
        Self {
            name: name.to_string(),
            dims: vec![],
            dtype: DataType::Float,
            data: value.to_le_bytes().to_vec(),
        }
    }

    /// Total number of elements (1 for a 0-d scalar)
    pub fn num_elements(&self) -> usize {
        self.dims.iter().map(|&d| d as usize).product()
    }

    /// Decode the raw payload to an `f32` array.
    ///
    /// Integer and boolean payloads are widened to `f32`. Returns `None` if
    /// the payload length does not agree with the declared shape.
    pub fn to_f32_array(&self) -> Option<TensorData> {
        let count = self.num_elements();
        if self.data.len() != count * self.dtype.elem_size() {
            return None;
        }
        let values: Vec<f32> = match self.dtype {
            DataType::Float => self
                .data
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
            DataType::Double => self
                .data
                .chunks_exact(8)
                .map(|c| {
                    f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32
                })
                .collect(),
            DataType::Int32 => self
                .data
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32)
                .collect(),
            DataType::Int64 => self
                .data
                .chunks_exact(8)
                .map(|c| {
                    i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32
                })
                .collect(),
            DataType::Uint8 | DataType::Bool => self.data.iter().map(|&b| b as f32).collect(),
        };
        let shape: Vec<usize> = self.dims.iter().map(|&d| d as usize).collect();
        ArrayD::from_shape_vec(IxDyn(&shape), values).ok()
    }
}

/// Typed attribute value carried by a [`Node`]
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Single float
    Float(f32),
    /// Single integer
    Int(i64),
    /// Byte string
    Bytes(Vec<u8>),
    /// Tensor literal
    Tensor(Tensor),
    /// List of floats
    Floats(Vec<f32>),
    /// List of integers
    Ints(Vec<i64>),
    /// List of strings
    Strings(Vec<String>),
}

impl AttrValue {
    /// Float value, if this is a `Float`
    pub fn as_float(&self) -> Option<f32> {
        match self {
            AttrValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer value, if this is an `Int`
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Integer list, if this is an `Ints`
    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            AttrValue::Ints(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Tensor literal, if this is a `Tensor`
    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            AttrValue::Tensor(t) => Some(t),
            _ => None,
        }
    }
}

/// A single computation step: operator type tag, ordered input and output
/// tensor names, and named attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Operator type tag (e.g. `"ReduceMean"`, `"Constant"`)
    pub op_type: String,
    /// Ordered input tensor names
    pub input: Vec<String>,
    /// Ordered output tensor names
    pub output: Vec<String>,
    /// Attribute mapping, insertion-ordered
    pub attribute: IndexMap<String, AttrValue>,
    /// Human-readable node name (may be empty)
    pub name: String,
}

impl Node {
    /// Get an attribute by name
    pub fn get_attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attribute.get(name)
    }

    /// First output name, the node's primary output
    pub fn primary_output(&self) -> Option<&str> {
        self.output.first().map(|s| s.as_str())
    }

    /// Whether this node is a constant producer
    pub fn is_constant(&self) -> bool {
        self.op_type == "Constant"
    }
}

/// Create a new attribute-free node
pub fn make_node(op_type: &str, inputs: &[&str], outputs: &[&str], name: &str) -> Node {
    Node {
        op_type: op_type.to_string(),
        input: inputs.iter().map(|s| s.to_string()).collect(),
        output: outputs.iter().map(|s| s.to_string()).collect(),
        attribute: IndexMap::new(),
        name: name.to_string(),
    }
}

/// Create a `Constant` node producing `tensor` under the given output name
pub fn make_constant(output: &str, tensor: Tensor) -> Node {
    let mut node = make_node("Constant", &[], &[output], output);
    node.attribute
        .insert("value".to_string(), AttrValue::Tensor(tensor));
    node
}
