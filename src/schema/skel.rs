//! Skeleton and blend-shape prim schemas.

use crate::sdf::{Path, Value};

/// `SkelRoot` prim: the boundary of a skeletal subtree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkelRoot {}

/// `Skeleton` prim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Skeleton {
    /// Joint paths in hierarchy order.
    pub joints: Vec<String>,
    pub joint_names: Vec<String>,
    /// Raw matrix4d[] values; row-major flattening.
    pub bind_transforms: Option<Value>,
    pub rest_transforms: Option<Value>,
    /// Target of `rel skel:animationSource`, when bound.
    pub animation_source: Option<Path>,
}

/// `SkelAnimation` prim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkelAnimation {
    pub joints: Vec<String>,
    pub blend_shapes: Vec<String>,
    pub translations: Option<Value>,
    pub rotations: Option<Value>,
    pub scales: Option<Value>,
    pub blend_shape_weights: Option<Value>,
}

/// `BlendShape` prim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlendShape {
    /// Flattened xyz offset triples.
    pub offsets: Vec<f32>,
    pub normal_offsets: Vec<f32>,
    pub point_indices: Vec<i32>,
}
