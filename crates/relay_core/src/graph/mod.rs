//! Target scene graph contract.
//!
//! The retained renderer graph the exporter writes into. Nodes are created
//! by kind, linked parent to child (a node may have several parents, which
//! is how one geometry node is shared by many instance groups), and carry
//! attributes, primvars, transform samples and material bindings.
//!
//! Materials are bound by node reference: changing the material node later
//! is seen by every node bound to it.

mod memory;

pub use memory::{MemoryGraph, MemoryNode, SampleTrack};

use relay_math::Mat4;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Handle to a node in a [`SceneGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Node kinds the target graph can create.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Group,
    Mesh,
    Curves,
    Points,
    Volume,
    Blobby,
    Light,
    Camera,
    Material,
}

/// Hidden state of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hidden {
    /// Follow the parent
    #[default]
    Inherit,
    Hide,
    Show,
}

/// Attribute / primvar value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i32),
    Float(f32),
    String(String),
    Ints(Vec<i32>),
    Floats(Vec<f32>),
    Strings(Vec<String>),
}

impl AttrValue {
    pub fn as_int(&self) -> Option<i32> {
        match self {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_floats(&self) -> Option<&[f32]> {
        match self {
            AttrValue::Floats(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        AttrValue::Int(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Int(v as i32)
    }
}

impl From<f32> for AttrValue {
    fn from(v: f32) -> Self {
        AttrValue::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::String(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::String(v)
    }
}

impl From<Vec<f32>> for AttrValue {
    fn from(v: Vec<f32>) -> Self {
        AttrValue::Floats(v)
    }
}

impl From<Vec<i32>> for AttrValue {
    fn from(v: Vec<i32>) -> Self {
        AttrValue::Ints(v)
    }
}

/// Errors raised by the target graph. These are structural and fatal to a
/// pass.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),

    #[error("sample index {index} out of range for node {node:?} ({reserved} reserved)")]
    SampleOutOfRange { node: NodeId, index: usize, reserved: usize },

    #[error("cannot create {kind:?} node '{name}': {reason}")]
    Rejected { kind: NodeKind, name: String, reason: String },

    #[error("cannot delete the root node")]
    RootDeletion,
}

/// Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// The renderer's retained scene graph.
pub trait SceneGraph {
    /// The root group.
    fn root(&self) -> NodeId;

    /// Discard every node except the root, and clear root state.
    fn reset(&mut self) -> GraphResult<()>;

    fn create_node(&mut self, kind: NodeKind, name: &str) -> GraphResult<NodeId>;

    fn delete_node(&mut self, node: NodeId) -> GraphResult<()>;

    /// Attach `child` under `parent`. Attaching twice is a no-op.
    fn add_child(&mut self, parent: NodeId, child: NodeId) -> GraphResult<()>;

    fn set_attribute(&mut self, node: NodeId, name: &str, value: AttrValue) -> GraphResult<()>;

    /// Scene-wide renderer option.
    fn set_option(&mut self, name: &str, value: AttrValue) -> GraphResult<()>;

    /// Static (non time-sampled) primvar.
    fn set_primvar(&mut self, node: NodeId, name: &str, value: AttrValue) -> GraphResult<()>;

    /// Reserve deformation samples at the given time offsets.
    fn set_deform_num_samples(&mut self, node: NodeId, times: &[f32]) -> GraphResult<()>;

    /// Write one deformation sample of a primvar.
    fn set_primvar_sample(
        &mut self,
        node: NodeId,
        name: &str,
        index: usize,
        value: AttrValue,
    ) -> GraphResult<()>;

    /// Set a single static transform.
    fn set_transform(&mut self, node: NodeId, matrix: Mat4) -> GraphResult<()>;

    /// Reserve transform samples at the given time offsets.
    fn set_transform_num_samples(&mut self, node: NodeId, times: &[f32]) -> GraphResult<()>;

    /// Write one reserved transform sample.
    fn set_transform_sample(&mut self, node: NodeId, index: usize, matrix: Mat4) -> GraphResult<()>;

    /// Number of transform samples reserved (valid before any is written).
    fn num_transform_samples(&self, node: NodeId) -> usize;

    fn set_hidden(&mut self, node: NodeId, hidden: Hidden) -> GraphResult<()>;

    fn set_inherit_transform(&mut self, node: NodeId, inherit: bool) -> GraphResult<()>;

    /// Bind `material` (a material node) to `node` by reference.
    fn bind_material(&mut self, node: NodeId, material: NodeId) -> GraphResult<()>;

    /// Register `node` as a named coordinate system on the root.
    fn add_coordinate_system(&mut self, node: NodeId) -> GraphResult<()>;
}
