//! Geometric prim schemas.

use crate::sdf::Value;

/// A single transform operation, in `xformOpOrder` order.
#[derive(Debug, Clone, PartialEq)]
pub struct XformOp {
    pub kind: XformOpKind,
    /// Namespaced suffix, e.g. `pivot` in `xformOp:translate:pivot`.
    pub suffix: String,
    /// Raw value; resolution to a matrix is left to consumers.
    pub value: Option<Value>,
    pub inverted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XformOpKind {
    Translate,
    Scale,
    Orient,
    Transform,
    RotateX,
    RotateY,
    RotateZ,
    RotateXYZ,
    RotateXZY,
    RotateYXZ,
    RotateYZX,
    RotateZXY,
    RotateZYX,
    ResetXformStack,
}

impl XformOpKind {
    /// Maps an `xformOp:*` token (with any suffix and `!invert!` prefix
    /// already stripped) to an op kind.
    pub fn from_token(token: &str) -> Option<Self> {
        let kind = match token {
            "xformOp:translate" => XformOpKind::Translate,
            "xformOp:scale" => XformOpKind::Scale,
            "xformOp:orient" => XformOpKind::Orient,
            "xformOp:transform" => XformOpKind::Transform,
            "xformOp:rotateX" => XformOpKind::RotateX,
            "xformOp:rotateY" => XformOpKind::RotateY,
            "xformOp:rotateZ" => XformOpKind::RotateZ,
            "xformOp:rotateXYZ" => XformOpKind::RotateXYZ,
            "xformOp:rotateXZY" => XformOpKind::RotateXZY,
            "xformOp:rotateYXZ" => XformOpKind::RotateYXZ,
            "xformOp:rotateYZX" => XformOpKind::RotateYZX,
            "xformOp:rotateZXY" => XformOpKind::RotateZXY,
            "xformOp:rotateZYX" => XformOpKind::RotateZYX,
            "!resetXformStack!" => XformOpKind::ResetXformStack,
            _ => return None,
        };
        Some(kind)
    }
}

/// `Xform` prim: a transform node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Xform {
    pub xform_ops: Vec<XformOp>,
}

/// `Scope` prim: a pure grouping node with no schema attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {}

/// Fallback prim for declarations without a recognized schema type.
///
/// Keeps the declared type-name string so unknown types survive a round
/// trip through the reader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    pub prim_type_name: String,
}

/// `GPrim`-typed prim. No schema-specific decoding is performed; the
/// property map on the owning prim carries everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GPrim {}

/// `Mesh` prim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeomMesh {
    /// Flattened xyz triples.
    pub points: Vec<f32>,
    pub normals: Vec<f32>,
    pub face_vertex_counts: Vec<i32>,
    pub face_vertex_indices: Vec<i32>,
    pub extent: Vec<f32>,
    pub double_sided: Option<bool>,
    pub subdivision_scheme: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeomSphere {
    pub radius: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeomCube {
    pub size: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeomCone {
    pub height: Option<f64>,
    pub radius: Option<f64>,
    pub axis: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeomCylinder {
    pub height: Option<f64>,
    pub radius: Option<f64>,
    pub axis: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeomCapsule {
    pub height: Option<f64>,
    pub radius: Option<f64>,
    pub axis: Option<String>,
}

/// `Points` prim (point cloud).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeomPoints {
    pub points: Vec<f32>,
    pub widths: Vec<f32>,
}

/// `BasisCurves` prim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeomBasisCurves {
    pub curve_vertex_counts: Vec<i32>,
    pub points: Vec<f32>,
    pub widths: Vec<f32>,
    pub curve_type: Option<String>,
    pub basis: Option<String>,
    pub wrap: Option<String>,
}

/// `GeomSubset` prim: a named subset of its parent mesh's elements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeomSubset {
    pub element_type: Option<String>,
    pub family_name: Option<String>,
    pub indices: Vec<u32>,
}

/// `Camera` prim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeomCamera {
    pub focal_length: Option<f64>,
    pub focus_distance: Option<f64>,
    pub horizontal_aperture: Option<f64>,
    pub vertical_aperture: Option<f64>,
    /// Near/far pair.
    pub clipping_range: Vec<f32>,
    pub projection: Option<String>,
}
