//! The typed scene-graph node and its metadata.

use std::collections::BTreeMap;

use crate::schema::TypedPrim;
use crate::sdf::{Dictionary, ListEditQual, Path, Payload, PropertyMap, Reference, Specifier};

/// Model hierarchy kind. Closed set; `sceneLibrary` is the USDZ-specific
/// addition from Apple's AR schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Subcomponent,
    Component,
    Model,
    Group,
    Assembly,
    SceneLibrary,
}

impl Kind {
    pub fn from_token(token: &str) -> Option<Self> {
        let kind = match token {
            "subcomponent" => Kind::Subcomponent,
            "component" => Kind::Component,
            "model" => Kind::Model,
            "group" => Kind::Group,
            "assembly" => Kind::Assembly,
            "sceneLibrary" => Kind::SceneLibrary,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Subcomponent => "subcomponent",
            Kind::Component => "component",
            Kind::Model => "model",
            Kind::Group => "group",
            Kind::Assembly => "assembly",
            Kind::SceneLibrary => "sceneLibrary",
        }
    }
}

/// Recognized applied API schema names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiName {
    SkelBindingApi,
    MaterialBindingApi,
    PhysicsMaterialApi,
    PhysicsRigidBodyApi,
    PhysicsColliderApi,
}

impl ApiName {
    pub fn from_token(token: &str) -> Option<Self> {
        let name = match token {
            "SkelBindingAPI" => ApiName::SkelBindingApi,
            "MaterialBindingAPI" => ApiName::MaterialBindingApi,
            "Preliminary_PhysicsMaterialAPI" => ApiName::PhysicsMaterialApi,
            "Preliminary_PhysicsRigidBodyAPI" => ApiName::PhysicsRigidBodyApi,
            "Preliminary_PhysicsColliderAPI" => ApiName::PhysicsColliderApi,
            _ => return None,
        };
        Some(name)
    }
}

/// `apiSchemas` metadata: the applied schemas plus the list-edit qualifier
/// they were declared with (only Prepend or ResetToExplicit are legal).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiSchemas {
    pub list_edit: ListEditQual,
    /// (name, multi-apply instance name); the instance name is empty for
    /// single-apply schemas.
    pub names: Vec<(ApiName, String)>,
}

/// Structured prim metadata, decoded from the raw parser map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrimMeta {
    pub active: Option<bool>,
    pub hidden: Option<bool>,
    pub kind: Option<Kind>,
    pub scene_name: Option<String>,
    pub display_name: Option<String>,
    pub custom_data: Option<Dictionary>,
    pub asset_info: Option<Dictionary>,
    /// Chosen variant per variant set.
    pub variants: Option<BTreeMap<String, String>>,
    pub inherits: Option<(ListEditQual, Vec<Path>)>,
    pub specializes: Option<(ListEditQual, Vec<Path>)>,
    pub variant_sets: Option<(ListEditQual, Vec<String>)>,
    pub api_schemas: Option<ApiSchemas>,
    pub references: Option<(ListEditQual, Vec<Reference>)>,
    pub payload: Option<(ListEditQual, Vec<Payload>)>,
    pub comment: Option<String>,
}

/// One variant of a variant set: its own metadata, properties and the prims
/// declared inside its braces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variant {
    pub meta: PrimMeta,
    pub properties: PropertyMap,
    pub children: Vec<Prim>,
}

/// A named variant set on a prim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantSet {
    pub name: String,
    pub variants: BTreeMap<String, Variant>,
}

/// A node in the reconstructed stage tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Prim {
    /// Element name, e.g. `Geo` for `/World/Geo`.
    pub name: String,
    pub spec: Specifier,
    /// Declared type name as written in the source. Empty for typeless
    /// `def`s; preserved verbatim for unknown types read as `Model`.
    pub type_name: String,
    pub meta: PrimMeta,
    /// Schema payload.
    pub typed: TypedPrim,
    /// All properties, including the ones the schema lifted into `typed`.
    pub props: PropertyMap,
    pub variant_sets: BTreeMap<String, VariantSet>,
    pub children: Vec<Prim>,
    /// Absolute path, assigned by `Stage::reconstruct` bookkeeping.
    pub abs_path: Path,
    /// Stable id equal to the prim's position in a pre-order traversal of
    /// the stage; −1 until assigned.
    pub prim_id: i64,
}

impl Prim {
    pub fn new(typed: TypedPrim) -> Self {
        Prim {
            name: String::new(),
            spec: Specifier::Def,
            type_name: String::new(),
            meta: PrimMeta::default(),
            typed,
            props: PropertyMap::new(),
            variant_sets: BTreeMap::new(),
            children: Vec::new(),
            abs_path: Path::default(),
            prim_id: -1,
        }
    }

    pub fn children(&self) -> &[Prim] {
        &self.children
    }

    /// Name of a child variant set, when present.
    pub fn variant_set(&self, name: &str) -> Option<&VariantSet> {
        self.variant_sets.get(name)
    }

    /// Depth-first search for a descendant by element-name chain.
    pub fn find_descendant(&self, names: &[&str]) -> Option<&Prim> {
        match names {
            [] => Some(self),
            [head, rest @ ..] => self
                .children
                .iter()
                .find(|c| c.name == *head)
                .and_then(|c| c.find_descendant(rest)),
        }
    }
}

impl Default for Prim {
    fn default() -> Self {
        Prim::new(TypedPrim::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trip() {
        for token in ["subcomponent", "component", "model", "group", "assembly", "sceneLibrary"] {
            assert_eq!(Kind::from_token(token).unwrap().as_str(), token);
        }
        assert!(Kind::from_token("prop").is_none());
    }

    #[test]
    fn api_name_closed_set() {
        assert!(ApiName::from_token("SkelBindingAPI").is_some());
        assert!(ApiName::from_token("MadeUpAPI").is_none());
    }

    #[test]
    fn find_descendant_walks_names() {
        let mut root = Prim::default();
        root.name = "A".into();
        let mut b = Prim::default();
        b.name = "B".into();
        let mut c = Prim::default();
        c.name = "C".into();
        b.children.push(c);
        root.children.push(b);

        assert!(root.find_descendant(&["B", "C"]).is_some());
        assert!(root.find_descendant(&["C"]).is_none());
    }
}
