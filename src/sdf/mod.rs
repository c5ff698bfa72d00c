//! Scene description foundations: paths, value types and properties.
//!
//! These are the data types the USDA grammar produces. They deliberately
//! carry no schema knowledge; the `schema` module interprets them.

mod path;

pub use path::{path, Path};

use half::f16;
use std::collections::BTreeMap;

/// Prim declaration specifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Specifier {
    #[default]
    Def,
    Over,
    Class,
}

impl Specifier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Specifier::Def => "def",
            Specifier::Over => "over",
            Specifier::Class => "class",
        }
    }
}

/// List-edit qualifier on list-valued metadata and relationships.
///
/// `ResetToExplicit` is the default when no qualifier keyword is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListEditQual {
    #[default]
    ResetToExplicit,
    Append,
    Add,
    Delete,
    Prepend,
    Order,
}

impl ListEditQual {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListEditQual::ResetToExplicit => "",
            ListEditQual::Append => "append",
            ListEditQual::Add => "add",
            ListEditQual::Delete => "delete",
            ListEditQual::Prepend => "prepend",
            ListEditQual::Order => "reorder",
        }
    }
}

/// Attribute variability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Variability {
    #[default]
    Varying,
    Uniform,
}

/// Time offset/scale applied to a referenced or sublayered layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerOffset {
    pub offset: f64,
    pub scale: f64,
}

impl Default for LayerOffset {
    fn default() -> Self {
        LayerOffset {
            offset: 0.0,
            scale: 1.0,
        }
    }
}

impl LayerOffset {
    pub fn is_identity(&self) -> bool {
        self.offset == 0.0 && self.scale == 1.0
    }
}

/// A `references` arc: an asset path plus an optional prim path within it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reference {
    pub asset_path: String,
    pub prim_path: Path,
    pub layer_offset: LayerOffset,
    pub custom_data: Dictionary,
}

/// A `payload` arc. Layer offsets are optional on payloads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    pub asset_path: String,
    pub prim_path: Path,
    pub layer_offset: Option<LayerOffset>,
}

/// A `subLayers` entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubLayer {
    pub asset_path: String,
    pub layer_offset: LayerOffset,
}

/// Nested string-keyed dictionary, as produced by `customData` et al.
pub type Dictionary = BTreeMap<String, Value>;

/// Time-indexed samples for one attribute.
pub type TimeSampleMap = Vec<(f64, Value)>;

/// A parsed USDA value.
///
/// Fixed-size tuples and arrays-of-tuples share flattened storage; the type
/// name on the owning attribute disambiguates them.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicit `None` (a blocked value).
    Block,

    Bool(bool),
    BoolVec(Vec<bool>),

    Uchar(u8),
    UcharVec(Vec<u8>),
    Int(i32),
    IntVec(Vec<i32>),
    Vec2i(Vec<i32>),
    Vec3i(Vec<i32>),
    Vec4i(Vec<i32>),
    Uint(u32),
    UintVec(Vec<u32>),
    Int64(i64),
    Int64Vec(Vec<i64>),
    Uint64(u64),
    Uint64Vec(Vec<u64>),

    Half(f16),
    HalfVec(Vec<f16>),
    Vec2h(Vec<f16>),
    Vec3h(Vec<f16>),
    Vec4h(Vec<f16>),

    Float(f32),
    FloatVec(Vec<f32>),
    Vec2f(Vec<f32>),
    Vec3f(Vec<f32>),
    Vec4f(Vec<f32>),

    Double(f64),
    DoubleVec(Vec<f64>),
    Vec2d(Vec<f64>),
    Vec3d(Vec<f64>),
    Vec4d(Vec<f64>),

    Quath(Vec<f16>),
    Quatf(Vec<f32>),
    Quatd(Vec<f64>),

    Matrix2d(Vec<f64>),
    Matrix3d(Vec<f64>),
    Matrix4d(Vec<f64>),

    String(String),
    Token(String),
    StringVec(Vec<String>),
    TokenVec(Vec<String>),

    AssetPath(String),
    AssetPathVec(Vec<String>),

    Path(Path),
    PathVec(Vec<Path>),

    Reference(Reference),
    ReferenceVec(Vec<Reference>),
    Payload(Payload),
    PayloadVec(Vec<Payload>),
    SubLayerVec(Vec<SubLayer>),

    Dictionary(Dictionary),
    TimeSamples(TimeSampleMap),
}

impl Value {
    /// Human-readable type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Block => "None",
            Value::Bool(_) => "bool",
            Value::BoolVec(_) => "bool[]",
            Value::Uchar(_) => "uchar",
            Value::UcharVec(_) => "uchar[]",
            Value::Int(_) => "int",
            Value::IntVec(_) => "int[]",
            Value::Vec2i(_) => "int2",
            Value::Vec3i(_) => "int3",
            Value::Vec4i(_) => "int4",
            Value::Uint(_) => "uint",
            Value::UintVec(_) => "uint[]",
            Value::Int64(_) => "int64",
            Value::Int64Vec(_) => "int64[]",
            Value::Uint64(_) => "uint64",
            Value::Uint64Vec(_) => "uint64[]",
            Value::Half(_) => "half",
            Value::HalfVec(_) => "half[]",
            Value::Vec2h(_) => "half2",
            Value::Vec3h(_) => "half3",
            Value::Vec4h(_) => "half4",
            Value::Float(_) => "float",
            Value::FloatVec(_) => "float[]",
            Value::Vec2f(_) => "float2",
            Value::Vec3f(_) => "float3",
            Value::Vec4f(_) => "float4",
            Value::Double(_) => "double",
            Value::DoubleVec(_) => "double[]",
            Value::Vec2d(_) => "double2",
            Value::Vec3d(_) => "double3",
            Value::Vec4d(_) => "double4",
            Value::Quath(_) => "quath",
            Value::Quatf(_) => "quatf",
            Value::Quatd(_) => "quatd",
            Value::Matrix2d(_) => "matrix2d",
            Value::Matrix3d(_) => "matrix3d",
            Value::Matrix4d(_) => "matrix4d",
            Value::String(_) => "string",
            Value::Token(_) => "token",
            Value::StringVec(_) => "string[]",
            Value::TokenVec(_) => "token[]",
            Value::AssetPath(_) => "asset",
            Value::AssetPathVec(_) => "asset[]",
            Value::Path(_) => "path",
            Value::PathVec(_) => "path[]",
            Value::Reference(_) => "reference",
            Value::ReferenceVec(_) => "reference[]",
            Value::Payload(_) => "payload",
            Value::PayloadVec(_) => "payload[]",
            Value::SubLayerVec(_) => "sublayer[]",
            Value::Dictionary(_) => "dictionary",
            Value::TimeSamples(_) => "timeSamples",
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Value::Block)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Token(s) | Value::AssetPath(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_token(&self) -> Option<&str> {
        match self {
            Value::Token(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            Value::Float(v) => Some(f64::from(*v)),
            Value::Int(v) => Some(f64::from(*v)),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&Dictionary> {
        match self {
            Value::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Approximate heap footprint in bytes, used for the reader's memory
    /// bound. A monotone estimate is all that is required.
    pub fn approx_size(&self) -> usize {
        fn vec_size<T>(v: &[T]) -> usize {
            std::mem::size_of_val(v)
        }
        let payload = match self {
            Value::Block => 0,
            Value::Bool(_) | Value::Uchar(_) => 1,
            Value::Int(_) | Value::Uint(_) | Value::Float(_) => 4,
            Value::Half(_) => 2,
            Value::Int64(_) | Value::Uint64(_) | Value::Double(_) => 8,
            Value::BoolVec(v) => vec_size(v),
            Value::UcharVec(v) => vec_size(v),
            Value::IntVec(v) | Value::Vec2i(v) | Value::Vec3i(v) | Value::Vec4i(v) => vec_size(v),
            Value::UintVec(v) => vec_size(v),
            Value::Int64Vec(v) => vec_size(v),
            Value::Uint64Vec(v) => vec_size(v),
            Value::HalfVec(v) | Value::Vec2h(v) | Value::Vec3h(v) | Value::Vec4h(v) | Value::Quath(v) => vec_size(v),
            Value::FloatVec(v) | Value::Vec2f(v) | Value::Vec3f(v) | Value::Vec4f(v) | Value::Quatf(v) => vec_size(v),
            Value::DoubleVec(v)
            | Value::Vec2d(v)
            | Value::Vec3d(v)
            | Value::Vec4d(v)
            | Value::Quatd(v)
            | Value::Matrix2d(v)
            | Value::Matrix3d(v)
            | Value::Matrix4d(v) => vec_size(v),
            Value::String(s) | Value::Token(s) | Value::AssetPath(s) => s.len(),
            Value::StringVec(v) | Value::TokenVec(v) | Value::AssetPathVec(v) => {
                v.iter().map(|s| s.len() + 24).sum()
            }
            Value::Path(p) => p.to_string().len(),
            Value::PathVec(v) => v.iter().map(|p| p.to_string().len() + 24).sum(),
            Value::Reference(r) => r.asset_path.len() + 64,
            Value::ReferenceVec(v) => v.iter().map(|r| r.asset_path.len() + 64).sum(),
            Value::Payload(p) => p.asset_path.len() + 64,
            Value::PayloadVec(v) => v.iter().map(|p| p.asset_path.len() + 64).sum(),
            Value::SubLayerVec(v) => v.iter().map(|s| s.asset_path.len() + 24).sum(),
            Value::Dictionary(d) => d.iter().map(|(k, v)| k.len() + v.approx_size() + 48).sum(),
            Value::TimeSamples(s) => s.iter().map(|(_, v)| v.approx_size() + 8).sum(),
        };
        payload + std::mem::size_of::<Value>()
    }
}

/// Attribute-level metadata (`interpolation`, `elementSize`, ...), kept raw.
pub type AttrMeta = BTreeMap<String, Value>;

/// A typed attribute as declared in the source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attribute {
    /// Declared type token, e.g. `float3[]` or `texCoord2f`.
    pub type_name: String,
    pub variability: Variability,
    pub custom: bool,
    /// Default value. `None` when the attribute is declared without one.
    pub value: Option<Value>,
    pub time_samples: Option<TimeSampleMap>,
    /// Targets of a `.connect` declaration.
    pub connections: Vec<Path>,
    pub meta: AttrMeta,
}

/// A relationship declaration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Relationship {
    pub targets: Vec<Path>,
    pub list_edit: ListEditQual,
    pub custom: bool,
    pub meta: AttrMeta,
}

/// Either kind of prim property.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Attribute(Attribute),
    Relationship(Relationship),
}

impl Property {
    pub fn as_attribute(&self) -> Option<&Attribute> {
        match self {
            Property::Attribute(a) => Some(a),
            Property::Relationship(_) => None,
        }
    }

    pub fn as_relationship(&self) -> Option<&Relationship> {
        match self {
            Property::Attribute(_) => None,
            Property::Relationship(r) => Some(r),
        }
    }

    pub fn is_relationship(&self) -> bool {
        matches!(self, Property::Relationship(_))
    }

    pub fn approx_size(&self) -> usize {
        match self {
            Property::Attribute(a) => {
                a.value.as_ref().map(Value::approx_size).unwrap_or(0)
                    + a.time_samples
                        .as_ref()
                        .map(|s| s.iter().map(|(_, v)| v.approx_size() + 8).sum())
                        .unwrap_or(0)
            }
            Property::Relationship(r) => r.targets.len() * 32,
        }
    }
}

/// Ordered property map. Order is textual order of declarations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyMap(Vec<(String, Property)>);

impl PropertyMap {
    pub fn new() -> Self {
        PropertyMap(Vec::new())
    }

    /// Insert or replace; later declarations of the same name win, as they
    /// do in the text format.
    pub fn insert(&mut self, name: String, prop: Property) {
        if let Some(slot) = self.0.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = prop;
        } else {
            self.0.push((name, prop));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.0.iter_mut().find(|(n, _)| n == name).map(|(_, p)| p)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Property)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn approx_size(&self) -> usize {
        self.0.iter().map(|(n, p)| n.len() + p.approx_size()).sum()
    }
}

impl IntoIterator for PropertyMap {
    type Item = (String, Property);
    type IntoIter = std::vec::IntoIter<(String, Property)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<(String, Property)> for PropertyMap {
    fn from_iter<I: IntoIterator<Item = (String, Property)>>(iter: I) -> Self {
        PropertyMap(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_map_preserves_order() {
        let mut props = PropertyMap::new();
        props.insert("b".into(), Property::Attribute(Attribute::default()));
        props.insert("a".into(), Property::Attribute(Attribute::default()));
        let names: Vec<_> = props.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["b", "a"]);
    }

    #[test]
    fn property_map_replaces_in_place() {
        let mut props = PropertyMap::new();
        props.insert("a".into(), Property::Attribute(Attribute::default()));
        let rel = Property::Relationship(Relationship::default());
        props.insert("a".into(), rel);
        assert_eq!(props.len(), 1);
        assert!(props.get("a").unwrap().is_relationship());
    }

    #[test]
    fn approx_size_counts_array_payloads() {
        let v = Value::FloatVec(vec![0.0; 1024]);
        assert!(v.approx_size() >= 4096);
        assert!(Value::Bool(true).approx_size() < 128);
    }

    #[test]
    fn layer_offset_identity() {
        assert!(LayerOffset::default().is_identity());
        assert!(!LayerOffset { offset: 1.0, scale: 1.0 }.is_identity());
    }
}
