//! The closed set of prim schemas the reader understands.
//!
//! `TypedPrim` is the tagged union over every schema type. New schemas are
//! added by extending the table in [`typed_prim_table!`]'s invocation and
//! registering another callback on the reader; there is no open inheritance.

pub mod geom;
pub mod lux;
mod reconstruct;
pub mod shade;
pub mod skel;

pub use geom::{
    GPrim, GeomBasisCurves, GeomCamera, GeomCapsule, GeomCone, GeomCube, GeomCylinder, GeomMesh,
    GeomPoints, GeomSphere, GeomSubset, Model, Scope, Xform, XformOp, XformOpKind,
};
pub use lux::{CylinderLight, DiskLight, DistantLight, DomeLight, LightCommon, SphereLight};
pub use shade::{Material, NodeGraph, Shader};
pub use skel::{BlendShape, SkelAnimation, SkelRoot, Skeleton};

use anyhow::Result;

use crate::sdf::{ListEditQual, PropertyMap, Reference};

/// The list-edit qualified `references` handed to reconstructors, decoded
/// from prim metadata before the schema sees the properties.
pub type ReferenceList = (ListEditQual, Vec<Reference>);

/// Builds a schema value from a prim's parsed properties.
///
/// Reconstructors pull out the attributes they know; the full property map
/// stays on the owning `Prim` regardless, so nothing is lost for attributes
/// a schema does not model. Non-fatal oddities go to `warns`.
pub trait ReconstructPrim: Sized + Default {
    /// Canonical type-name token as written in USDA (`Xform`, `Mesh`, ...).
    const TYPE_NAME: &'static str;

    fn reconstruct(
        props: &PropertyMap,
        references: &ReferenceList,
        warns: &mut Vec<String>,
    ) -> Result<Self>;
}

/// Declares `TypedPrim` plus the per-variant plumbing in one place, the way
/// the schema table is meant to be extended.
macro_rules! typed_prim_table {
    ($( $variant:ident => $name:literal ),+ $(,)?) => {
        /// Tagged union over the supported schema types.
        #[derive(Debug, Clone, PartialEq)]
        pub enum TypedPrim {
            $( $variant($variant), )+
        }

        impl TypedPrim {
            /// Canonical type-name token of the contained schema.
            pub fn type_name(&self) -> &'static str {
                match self {
                    $( TypedPrim::$variant(_) => $name, )+
                }
            }
        }

        $(
            impl From<$variant> for TypedPrim {
                fn from(v: $variant) -> TypedPrim {
                    TypedPrim::$variant(v)
                }
            }

            impl $variant {
                pub const PRIM_TYPE_NAME: &'static str = $name;
            }
        )+
    };
}

typed_prim_table! {
    Model => "Model",
    Scope => "Scope",
    GPrim => "GPrim",
    Xform => "Xform",
    GeomMesh => "Mesh",
    GeomSphere => "Sphere",
    GeomCube => "Cube",
    GeomCone => "Cone",
    GeomCylinder => "Cylinder",
    GeomCapsule => "Capsule",
    GeomPoints => "Points",
    GeomBasisCurves => "BasisCurves",
    GeomSubset => "GeomSubset",
    GeomCamera => "Camera",
    SphereLight => "SphereLight",
    DomeLight => "DomeLight",
    DiskLight => "DiskLight",
    DistantLight => "DistantLight",
    CylinderLight => "CylinderLight",
    Material => "Material",
    Shader => "Shader",
    NodeGraph => "NodeGraph",
    SkelRoot => "SkelRoot",
    Skeleton => "Skeleton",
    SkelAnimation => "SkelAnimation",
    BlendShape => "BlendShape",
}

impl TypedPrim {
    /// The `Model` payload, when this prim is the unknown-type fallback.
    pub fn as_model(&self) -> Option<&Model> {
        match self {
            TypedPrim::Model(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_model_mut(&mut self) -> Option<&mut Model> {
        match self {
            TypedPrim::Model(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_xform(&self) -> Option<&Xform> {
        match self {
            TypedPrim::Xform(x) => Some(x),
            _ => None,
        }
    }

    pub fn as_mesh(&self) -> Option<&GeomMesh> {
        match self {
            TypedPrim::GeomMesh(m) => Some(m),
            _ => None,
        }
    }
}

impl Default for TypedPrim {
    fn default() -> Self {
        TypedPrim::Model(Model::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_match_table() {
        assert_eq!(TypedPrim::from(Xform::default()).type_name(), "Xform");
        assert_eq!(TypedPrim::from(GeomMesh::default()).type_name(), "Mesh");
        assert_eq!(GeomSubset::PRIM_TYPE_NAME, "GeomSubset");
        assert_eq!(SkelAnimation::PRIM_TYPE_NAME, "SkelAnimation");
    }

    #[test]
    fn default_is_model() {
        assert!(TypedPrim::default().as_model().is_some());
    }
}
