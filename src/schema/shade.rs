//! Shading prim schemas.

use crate::sdf::Path;

/// `Material` prim. Surface/displacement/volume terminal connections are
/// lifted out of the property map; everything else stays there.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Material {
    pub surface: Option<Path>,
    pub displacement: Option<Path>,
    pub volume: Option<Path>,
}

/// `Shader` prim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shader {
    /// The shader identifier, e.g. `UsdPreviewSurface` or `UsdUVTexture`.
    pub info_id: Option<String>,
}

/// `NodeGraph` prim. Connectivity decoding is left to consumers; the
/// property map on the owning prim carries the inputs/outputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeGraph {}
