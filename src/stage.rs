//! Stage (typed output) and Layer/PrimSpec (untyped output for composition).

use std::collections::BTreeMap;

use crate::prim::Prim;
use crate::sdf::{Dictionary, Path, PropertyMap, Specifier, SubLayer, Value};
use crate::usda::parser::PrimMetaMap;

/// Stage-level `upAxis`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "X" => Some(Axis::X),
            "Y" => Some(Axis::Y),
            "Z" => Some(Axis::Z),
            _ => None,
        }
    }
}

/// Stage-level `playbackMode`. Closed set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlaybackMode {
    #[default]
    None,
    Loop,
}

impl PlaybackMode {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "none" => Some(PlaybackMode::None),
            "loop" => Some(PlaybackMode::Loop),
            _ => None,
        }
    }
}

/// Metadata from the pseudo-root block of the layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageMetas {
    pub doc: Option<String>,
    pub comment: Option<String>,
    pub up_axis: Option<Axis>,
    pub sub_layers: Vec<SubLayer>,
    pub default_prim: Option<String>,
    pub meters_per_unit: Option<f64>,
    pub time_codes_per_second: Option<f64>,
    pub start_time_code: Option<f64>,
    pub end_time_code: Option<f64>,
    pub frames_per_second: Option<f64>,
    pub auto_play: Option<bool>,
    pub playback_mode: Option<PlaybackMode>,
    pub custom_layer_data: Dictionary,
    /// Pseudo-root fields outside the recognized set, kept raw.
    pub unregistered: BTreeMap<String, Value>,
}

/// The fully typed scene tree produced by `UsdaReader::reconstruct_stage`.
#[derive(Debug, Clone, Default)]
pub struct Stage {
    metas: StageMetas,
    root_prims: Vec<Prim>,
}

impl Stage {
    pub fn metas(&self) -> &StageMetas {
        &self.metas
    }

    pub fn metas_mut(&mut self) -> &mut StageMetas {
        &mut self.metas
    }

    pub fn root_prims(&self) -> &[Prim] {
        &self.root_prims
    }

    pub fn root_prims_mut(&mut self) -> &mut Vec<Prim> {
        &mut self.root_prims
    }

    /// Walks every prim depth-first, parents before children.
    pub fn traverse<F: FnMut(&Prim)>(&self, mut visit: F) {
        fn rec<F: FnMut(&Prim)>(prim: &Prim, visit: &mut F) {
            visit(prim);
            for child in &prim.children {
                rec(child, visit);
            }
        }
        for prim in &self.root_prims {
            rec(prim, &mut visit);
        }
    }

    /// Finds a prim by absolute path (prim part only).
    pub fn find_prim_at_path(&self, path: &Path) -> Option<&Prim> {
        let mut elements = path.prim_part().trim_start_matches('/').split('/');
        let first = elements.next()?;
        let mut current = self.root_prims.iter().find(|p| p.name == first)?;
        for element in elements {
            current = current.children.iter().find(|p| p.name == element)?;
        }
        Some(current)
    }

    /// Assigns absolute paths from element-name chains and gives every prim
    /// a stable id equal to its position in a pre-order traversal. Variant
    /// children are inside their variant's subtree, not the main tree, and
    /// get paths below the owning prim's variant selection.
    pub fn compute_paths_and_assign_ids(&mut self) {
        fn rec(prim: &mut Prim, parent_path: &Path, next_id: &mut i64) {
            prim.abs_path = parent_path
                .append_path(&prim.name)
                .unwrap_or_else(|_| Path::from_element(&prim.name));
            prim.prim_id = *next_id;
            *next_id += 1;

            let base = prim.abs_path.clone();
            for (set_name, set) in &mut prim.variant_sets {
                for (variant_name, variant) in &mut set.variants {
                    let variant_path = base
                        .append_variant_selection(set_name, variant_name)
                        .unwrap_or_else(|_| base.clone());
                    for child in &mut variant.children {
                        rec(child, &variant_path, next_id);
                    }
                }
            }
            for child in &mut prim.children {
                rec(child, &base, next_id);
            }
        }

        let mut next_id = 0;
        let root = Path::abs_root();
        for prim in &mut self.root_prims {
            rec(prim, &root, &mut next_id);
        }
    }
}

/// Raw variant payload on a `PrimSpec`: kept opaque for later composition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantSpec {
    pub metas: PrimMetaMap,
    pub properties: PropertyMap,
    pub children: Vec<PrimSpec>,
}

/// The untyped pre-composition representation of a prim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrimSpec {
    pub name: String,
    pub specifier: Specifier,
    pub type_name: String,
    pub properties: PropertyMap,
    /// Raw metadata, not decoded; composition interprets it later.
    pub metas: PrimMetaMap,
    /// variant-set name → variant name → body.
    pub variant_sets: BTreeMap<String, BTreeMap<String, VariantSpec>>,
    pub children: Vec<PrimSpec>,
}

/// An untyped layer: root prim specs plus the stage metadata bucket.
#[derive(Debug, Clone, Default)]
pub struct Layer {
    pub metas: StageMetas,
    pub prim_specs: Vec<PrimSpec>,
}

impl Layer {
    /// Finds a root spec by name.
    pub fn find_root(&self, name: &str) -> Option<&PrimSpec> {
        self.prim_specs.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prim::{Variant, VariantSet};

    fn named(name: &str) -> Prim {
        let mut p = Prim::default();
        p.name = name.to_string();
        p
    }

    #[test]
    fn preorder_ids_and_paths() {
        let mut a = named("A");
        a.children.push(named("B"));
        a.children.push(named("C"));
        let mut stage = Stage::default();
        stage.root_prims_mut().push(a);
        stage.compute_paths_and_assign_ids();

        let a = &stage.root_prims()[0];
        assert_eq!(a.prim_id, 0);
        assert_eq!(a.abs_path.prim_part(), "/A");
        assert_eq!(a.children[0].prim_id, 1);
        assert_eq!(a.children[0].abs_path.prim_part(), "/A/B");
        assert_eq!(a.children[1].prim_id, 2);
    }

    #[test]
    fn variant_children_get_variant_scoped_paths() {
        let mut a = named("A");
        let mut variant = Variant::default();
        variant.children.push(named("C"));
        let mut set = VariantSet::default();
        set.name = "v".into();
        set.variants.insert("x".into(), variant);
        a.variant_sets.insert("v".into(), set);

        let mut stage = Stage::default();
        stage.root_prims_mut().push(a);
        stage.compute_paths_and_assign_ids();

        let a = &stage.root_prims()[0];
        let c = &a.variant_sets["v"].variants["x"].children[0];
        assert_eq!(c.abs_path.to_string(), "/A{v=x}/C");
        assert!(c.prim_id > a.prim_id);
    }

    #[test]
    fn find_prim_at_path_walks_tree() {
        let mut a = named("A");
        a.children.push(named("B"));
        let mut stage = Stage::default();
        stage.root_prims_mut().push(a);

        assert!(stage.find_prim_at_path(&Path::new("/A/B").unwrap()).is_some());
        assert!(stage.find_prim_at_path(&Path::new("/A/Z").unwrap()).is_none());
    }
}
