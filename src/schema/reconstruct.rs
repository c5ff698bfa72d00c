//! Per-schema reconstruction from parsed property maps.
//!
//! Each impl pulls the attributes its schema models and leaves the rest in
//! the owning prim's property map. Type mismatches on modeled attributes are
//! errors; unmodeled attributes are never an error here.

use anyhow::{bail, Result};

use crate::sdf::{Attribute, Path, Property, PropertyMap, Value};

use super::geom::*;
use super::lux::*;
use super::shade::*;
use super::skel::*;
use super::{ReconstructPrim, ReferenceList};

fn attribute<'a>(props: &'a PropertyMap, name: &str) -> Result<Option<&'a Attribute>> {
    match props.get(name) {
        None => Ok(None),
        Some(Property::Attribute(attr)) => Ok(Some(attr)),
        Some(Property::Relationship(_)) => {
            bail!("property `{name}` must be an attribute, not a relationship")
        }
    }
}

fn opt_double(props: &PropertyMap, name: &str) -> Result<Option<f64>> {
    let Some(attr) = attribute(props, name)? else {
        return Ok(None);
    };
    match &attr.value {
        None => Ok(None),
        Some(v) => match v.as_double() {
            Some(d) => Ok(Some(d)),
            None => bail!("attribute `{name}` must be a scalar number, got `{}`", v.type_name()),
        },
    }
}

fn opt_float(props: &PropertyMap, name: &str) -> Result<Option<f32>> {
    Ok(opt_double(props, name)?.map(|d| d as f32))
}

fn opt_bool(props: &PropertyMap, name: &str) -> Result<Option<bool>> {
    let Some(attr) = attribute(props, name)? else {
        return Ok(None);
    };
    match &attr.value {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(v) => bail!("attribute `{name}` must be `bool`, got `{}`", v.type_name()),
    }
}

fn opt_token(props: &PropertyMap, name: &str) -> Result<Option<String>> {
    let Some(attr) = attribute(props, name)? else {
        return Ok(None);
    };
    match &attr.value {
        None => Ok(None),
        Some(v) => match v.as_str() {
            Some(s) => Ok(Some(s.to_string())),
            None => bail!("attribute `{name}` must be `token`, got `{}`", v.type_name()),
        },
    }
}

/// Flattened float array; `float[]`, `float3[]` and friends all qualify.
fn float_vec(props: &PropertyMap, name: &str) -> Result<Vec<f32>> {
    let Some(attr) = attribute(props, name)? else {
        return Ok(Vec::new());
    };
    match &attr.value {
        None | Some(Value::Block) => Ok(Vec::new()),
        Some(
            Value::FloatVec(v) | Value::Vec2f(v) | Value::Vec3f(v) | Value::Vec4f(v) | Value::Quatf(v),
        ) => Ok(v.clone()),
        Some(Value::DoubleVec(v) | Value::Vec2d(v) | Value::Vec3d(v) | Value::Vec4d(v)) => {
            Ok(v.iter().map(|d| *d as f32).collect())
        }
        Some(v) => bail!("attribute `{name}` must be a float array, got `{}`", v.type_name()),
    }
}

fn int_vec(props: &PropertyMap, name: &str) -> Result<Vec<i32>> {
    let Some(attr) = attribute(props, name)? else {
        return Ok(Vec::new());
    };
    match &attr.value {
        None | Some(Value::Block) => Ok(Vec::new()),
        Some(Value::IntVec(v)) => Ok(v.clone()),
        Some(v) => bail!("attribute `{name}` must be `int[]`, got `{}`", v.type_name()),
    }
}

fn token_vec(props: &PropertyMap, name: &str) -> Result<Vec<String>> {
    let Some(attr) = attribute(props, name)? else {
        return Ok(Vec::new());
    };
    match &attr.value {
        None | Some(Value::Block) => Ok(Vec::new()),
        Some(Value::TokenVec(v) | Value::StringVec(v)) => Ok(v.clone()),
        Some(v) => bail!("attribute `{name}` must be `token[]`, got `{}`", v.type_name()),
    }
}

fn opt_asset(props: &PropertyMap, name: &str) -> Result<Option<String>> {
    let Some(attr) = attribute(props, name)? else {
        return Ok(None);
    };
    match &attr.value {
        None => Ok(None),
        Some(Value::AssetPath(s)) => Ok(Some(s.clone())),
        Some(v) => bail!("attribute `{name}` must be `asset`, got `{}`", v.type_name()),
    }
}

/// Default value, falling back to the sample map for time-sampled-only
/// attributes.
fn raw_value(props: &PropertyMap, name: &str) -> Result<Option<Value>> {
    Ok(attribute(props, name)?.and_then(|a| {
        a.value
            .clone()
            .or_else(|| a.time_samples.clone().map(Value::TimeSamples))
    }))
}

/// First target of a relationship, or `None` when absent or empty.
fn rel_target(props: &PropertyMap, name: &str) -> Option<Path> {
    props
        .get(name)
        .and_then(Property::as_relationship)
        .and_then(|r| r.targets.first().cloned())
}

/// First connection target of an `outputs:*` style attribute.
fn connection(props: &PropertyMap, name: &str) -> Option<Path> {
    props
        .get(name)
        .and_then(Property::as_attribute)
        .and_then(|a| a.connections.first().cloned())
}

impl ReconstructPrim for Xform {
    const TYPE_NAME: &'static str = "Xform";

    fn reconstruct(props: &PropertyMap, _refs: &ReferenceList, warns: &mut Vec<String>) -> Result<Self> {
        let mut xform = Xform::default();

        for op_token in token_vec(props, "xformOpOrder")? {
            let (inverted, lookup) = match op_token.strip_prefix("!invert!") {
                Some(rest) => (true, rest),
                None => (false, op_token.as_str()),
            };

            // Kind is determined by the token up to the second `:`; the
            // remainder is a user suffix (e.g. `xformOp:translate:pivot`).
            let (base, suffix) = match lookup
                .match_indices(':')
                .nth(1)
                .map(|(pos, _)| (&lookup[..pos], &lookup[pos + 1..]))
            {
                Some((base, suffix)) => (base, suffix.to_string()),
                None => (lookup, String::new()),
            };

            let Some(kind) = XformOpKind::from_token(base) else {
                bail!("unknown entry `{op_token}` in xformOpOrder");
            };

            let value = if kind == XformOpKind::ResetXformStack {
                None
            } else {
                let v = raw_value(props, lookup)?;
                if v.is_none() {
                    warns.push(format!("xformOpOrder names `{lookup}` but no such attribute exists"));
                }
                v
            };

            xform.xform_ops.push(XformOp {
                kind,
                suffix,
                value,
                inverted,
            });
        }

        Ok(xform)
    }
}

impl ReconstructPrim for Scope {
    const TYPE_NAME: &'static str = "Scope";

    fn reconstruct(_props: &PropertyMap, _refs: &ReferenceList, _warns: &mut Vec<String>) -> Result<Self> {
        Ok(Scope {})
    }
}

impl ReconstructPrim for Model {
    const TYPE_NAME: &'static str = "Model";

    fn reconstruct(_props: &PropertyMap, _refs: &ReferenceList, _warns: &mut Vec<String>) -> Result<Self> {
        // prim_type_name is filled in by the reader from the declaration.
        Ok(Model::default())
    }
}

impl ReconstructPrim for GPrim {
    const TYPE_NAME: &'static str = "GPrim";

    fn reconstruct(_props: &PropertyMap, _refs: &ReferenceList, warns: &mut Vec<String>) -> Result<Self> {
        warns.push("GPrim-typed prim carries no schema-specific decoding".to_string());
        Ok(GPrim {})
    }
}

impl ReconstructPrim for GeomMesh {
    const TYPE_NAME: &'static str = "Mesh";

    fn reconstruct(props: &PropertyMap, _refs: &ReferenceList, _warns: &mut Vec<String>) -> Result<Self> {
        Ok(GeomMesh {
            points: float_vec(props, "points")?,
            normals: float_vec(props, "normals")?,
            face_vertex_counts: int_vec(props, "faceVertexCounts")?,
            face_vertex_indices: int_vec(props, "faceVertexIndices")?,
            extent: float_vec(props, "extent")?,
            double_sided: opt_bool(props, "doubleSided")?,
            subdivision_scheme: opt_token(props, "subdivisionScheme")?,
        })
    }
}

impl ReconstructPrim for GeomSphere {
    const TYPE_NAME: &'static str = "Sphere";

    fn reconstruct(props: &PropertyMap, _refs: &ReferenceList, _warns: &mut Vec<String>) -> Result<Self> {
        Ok(GeomSphere {
            radius: opt_double(props, "radius")?,
        })
    }
}

impl ReconstructPrim for GeomCube {
    const TYPE_NAME: &'static str = "Cube";

    fn reconstruct(props: &PropertyMap, _refs: &ReferenceList, _warns: &mut Vec<String>) -> Result<Self> {
        Ok(GeomCube {
            size: opt_double(props, "size")?,
        })
    }
}

impl ReconstructPrim for GeomCone {
    const TYPE_NAME: &'static str = "Cone";

    fn reconstruct(props: &PropertyMap, _refs: &ReferenceList, _warns: &mut Vec<String>) -> Result<Self> {
        Ok(GeomCone {
            height: opt_double(props, "height")?,
            radius: opt_double(props, "radius")?,
            axis: opt_token(props, "axis")?,
        })
    }
}

impl ReconstructPrim for GeomCylinder {
    const TYPE_NAME: &'static str = "Cylinder";

    fn reconstruct(props: &PropertyMap, _refs: &ReferenceList, _warns: &mut Vec<String>) -> Result<Self> {
        Ok(GeomCylinder {
            height: opt_double(props, "height")?,
            radius: opt_double(props, "radius")?,
            axis: opt_token(props, "axis")?,
        })
    }
}

impl ReconstructPrim for GeomCapsule {
    const TYPE_NAME: &'static str = "Capsule";

    fn reconstruct(props: &PropertyMap, _refs: &ReferenceList, _warns: &mut Vec<String>) -> Result<Self> {
        Ok(GeomCapsule {
            height: opt_double(props, "height")?,
            radius: opt_double(props, "radius")?,
            axis: opt_token(props, "axis")?,
        })
    }
}

impl ReconstructPrim for GeomPoints {
    const TYPE_NAME: &'static str = "Points";

    fn reconstruct(props: &PropertyMap, _refs: &ReferenceList, _warns: &mut Vec<String>) -> Result<Self> {
        Ok(GeomPoints {
            points: float_vec(props, "points")?,
            widths: float_vec(props, "widths")?,
        })
    }
}

impl ReconstructPrim for GeomBasisCurves {
    const TYPE_NAME: &'static str = "BasisCurves";

    fn reconstruct(props: &PropertyMap, _refs: &ReferenceList, _warns: &mut Vec<String>) -> Result<Self> {
        Ok(GeomBasisCurves {
            curve_vertex_counts: int_vec(props, "curveVertexCounts")?,
            points: float_vec(props, "points")?,
            widths: float_vec(props, "widths")?,
            curve_type: opt_token(props, "type")?,
            basis: opt_token(props, "basis")?,
            wrap: opt_token(props, "wrap")?,
        })
    }
}

impl ReconstructPrim for GeomSubset {
    const TYPE_NAME: &'static str = "GeomSubset";

    fn reconstruct(props: &PropertyMap, _refs: &ReferenceList, _warns: &mut Vec<String>) -> Result<Self> {
        let indices = int_vec(props, "indices")?;
        if let Some(bad) = indices.iter().find(|i| **i < 0) {
            bail!("GeomSubset indices must be non-negative, got {bad}");
        }
        Ok(GeomSubset {
            element_type: opt_token(props, "elementType")?,
            family_name: opt_token(props, "familyName")?,
            indices: indices.into_iter().map(|i| i as u32).collect(),
        })
    }
}

impl ReconstructPrim for GeomCamera {
    const TYPE_NAME: &'static str = "Camera";

    fn reconstruct(props: &PropertyMap, _refs: &ReferenceList, _warns: &mut Vec<String>) -> Result<Self> {
        Ok(GeomCamera {
            focal_length: opt_double(props, "focalLength")?,
            focus_distance: opt_double(props, "focusDistance")?,
            horizontal_aperture: opt_double(props, "horizontalAperture")?,
            vertical_aperture: opt_double(props, "verticalAperture")?,
            clipping_range: float_vec(props, "clippingRange")?,
            projection: opt_token(props, "projection")?,
        })
    }
}

/// Both the `inputs:` form and the bare legacy form appear in the wild.
fn light_float(props: &PropertyMap, name: &str) -> Result<Option<f32>> {
    match opt_float(props, &format!("inputs:{name}"))? {
        Some(v) => Ok(Some(v)),
        None => opt_float(props, name),
    }
}

fn light_common(props: &PropertyMap) -> Result<LightCommon> {
    let mut color = float_vec(props, "inputs:color")?;
    if color.is_empty() {
        color = float_vec(props, "color")?;
    }
    Ok(LightCommon {
        intensity: light_float(props, "intensity")?,
        exposure: light_float(props, "exposure")?,
        color,
    })
}

impl ReconstructPrim for SphereLight {
    const TYPE_NAME: &'static str = "SphereLight";

    fn reconstruct(props: &PropertyMap, _refs: &ReferenceList, _warns: &mut Vec<String>) -> Result<Self> {
        Ok(SphereLight {
            light: light_common(props)?,
            radius: opt_float(props, "inputs:radius")?,
        })
    }
}

impl ReconstructPrim for DomeLight {
    const TYPE_NAME: &'static str = "DomeLight";

    fn reconstruct(props: &PropertyMap, _refs: &ReferenceList, _warns: &mut Vec<String>) -> Result<Self> {
        Ok(DomeLight {
            light: light_common(props)?,
            texture_file: opt_asset(props, "inputs:texture:file")?,
            texture_format: opt_token(props, "inputs:texture:format")?,
        })
    }
}

impl ReconstructPrim for DiskLight {
    const TYPE_NAME: &'static str = "DiskLight";

    fn reconstruct(props: &PropertyMap, _refs: &ReferenceList, _warns: &mut Vec<String>) -> Result<Self> {
        Ok(DiskLight {
            light: light_common(props)?,
            radius: opt_float(props, "inputs:radius")?,
        })
    }
}

impl ReconstructPrim for DistantLight {
    const TYPE_NAME: &'static str = "DistantLight";

    fn reconstruct(props: &PropertyMap, _refs: &ReferenceList, _warns: &mut Vec<String>) -> Result<Self> {
        Ok(DistantLight {
            light: light_common(props)?,
            angle: opt_float(props, "inputs:angle")?,
        })
    }
}

impl ReconstructPrim for CylinderLight {
    const TYPE_NAME: &'static str = "CylinderLight";

    fn reconstruct(props: &PropertyMap, _refs: &ReferenceList, _warns: &mut Vec<String>) -> Result<Self> {
        Ok(CylinderLight {
            light: light_common(props)?,
            length: opt_float(props, "inputs:length")?,
            radius: opt_float(props, "inputs:radius")?,
        })
    }
}

impl ReconstructPrim for Material {
    const TYPE_NAME: &'static str = "Material";

    fn reconstruct(props: &PropertyMap, _refs: &ReferenceList, _warns: &mut Vec<String>) -> Result<Self> {
        Ok(Material {
            surface: connection(props, "outputs:surface"),
            displacement: connection(props, "outputs:displacement"),
            volume: connection(props, "outputs:volume"),
        })
    }
}

impl ReconstructPrim for Shader {
    const TYPE_NAME: &'static str = "Shader";

    fn reconstruct(props: &PropertyMap, _refs: &ReferenceList, _warns: &mut Vec<String>) -> Result<Self> {
        Ok(Shader {
            info_id: opt_token(props, "info:id")?,
        })
    }
}

impl ReconstructPrim for NodeGraph {
    const TYPE_NAME: &'static str = "NodeGraph";

    fn reconstruct(_props: &PropertyMap, _refs: &ReferenceList, warns: &mut Vec<String>) -> Result<Self> {
        warns.push("NodeGraph connectivity is not decoded; properties are kept raw".to_string());
        Ok(NodeGraph {})
    }
}

impl ReconstructPrim for SkelRoot {
    const TYPE_NAME: &'static str = "SkelRoot";

    fn reconstruct(_props: &PropertyMap, _refs: &ReferenceList, _warns: &mut Vec<String>) -> Result<Self> {
        Ok(SkelRoot {})
    }
}

impl ReconstructPrim for Skeleton {
    const TYPE_NAME: &'static str = "Skeleton";

    fn reconstruct(props: &PropertyMap, _refs: &ReferenceList, _warns: &mut Vec<String>) -> Result<Self> {
        Ok(Skeleton {
            joints: token_vec(props, "joints")?,
            joint_names: token_vec(props, "jointNames")?,
            bind_transforms: raw_value(props, "bindTransforms")?,
            rest_transforms: raw_value(props, "restTransforms")?,
            animation_source: rel_target(props, "skel:animationSource"),
        })
    }
}

impl ReconstructPrim for SkelAnimation {
    const TYPE_NAME: &'static str = "SkelAnimation";

    fn reconstruct(props: &PropertyMap, _refs: &ReferenceList, _warns: &mut Vec<String>) -> Result<Self> {
        Ok(SkelAnimation {
            joints: token_vec(props, "joints")?,
            blend_shapes: token_vec(props, "blendShapes")?,
            translations: raw_value(props, "translations")?,
            rotations: raw_value(props, "rotations")?,
            scales: raw_value(props, "scales")?,
            blend_shape_weights: raw_value(props, "blendShapeWeights")?,
        })
    }
}

impl ReconstructPrim for BlendShape {
    const TYPE_NAME: &'static str = "BlendShape";

    fn reconstruct(props: &PropertyMap, _refs: &ReferenceList, _warns: &mut Vec<String>) -> Result<Self> {
        Ok(BlendShape {
            offsets: float_vec(props, "offsets")?,
            normal_offsets: float_vec(props, "normalOffsets")?,
            point_indices: int_vec(props, "pointIndices")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdf::{ListEditQual, Variability};

    fn attr(type_name: &str, value: Value) -> Property {
        Property::Attribute(Attribute {
            type_name: type_name.to_string(),
            variability: Variability::Varying,
            custom: false,
            value: Some(value),
            time_samples: None,
            connections: Vec::new(),
            meta: Default::default(),
        })
    }

    fn no_refs() -> ReferenceList {
        (ListEditQual::ResetToExplicit, Vec::new())
    }

    #[test]
    fn sphere_radius() {
        let mut props = PropertyMap::new();
        props.insert("radius".into(), attr("double", Value::Double(2.5)));
        let mut warns = Vec::new();
        let sphere = GeomSphere::reconstruct(&props, &no_refs(), &mut warns).unwrap();
        assert_eq!(sphere.radius, Some(2.5));
        assert!(warns.is_empty());
    }

    #[test]
    fn sphere_rejects_token_radius() {
        let mut props = PropertyMap::new();
        props.insert("radius".into(), attr("token", Value::Token("big".into())));
        let err = GeomSphere::reconstruct(&props, &no_refs(), &mut Vec::new()).unwrap_err();
        assert!(err.to_string().contains("radius"));
    }

    #[test]
    fn mesh_topology() {
        let mut props = PropertyMap::new();
        props.insert(
            "points".into(),
            attr("point3f[]", Value::Vec3f(vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0])),
        );
        props.insert("faceVertexCounts".into(), attr("int[]", Value::IntVec(vec![3])));
        props.insert("faceVertexIndices".into(), attr("int[]", Value::IntVec(vec![0, 1, 2])));
        let mesh = GeomMesh::reconstruct(&props, &no_refs(), &mut Vec::new()).unwrap();
        assert_eq!(mesh.points.len(), 9);
        assert_eq!(mesh.face_vertex_counts, vec![3]);
        assert_eq!(mesh.face_vertex_indices, vec![0, 1, 2]);
    }

    #[test]
    fn xform_op_order_builds_ops() {
        let mut props = PropertyMap::new();
        props.insert(
            "xformOp:translate".into(),
            attr("double3", Value::Vec3d(vec![1.0, 2.0, 3.0])),
        );
        props.insert(
            "xformOpOrder".into(),
            attr("token[]", Value::TokenVec(vec!["xformOp:translate".into()])),
        );
        let xform = Xform::reconstruct(&props, &no_refs(), &mut Vec::new()).unwrap();
        assert_eq!(xform.xform_ops.len(), 1);
        assert_eq!(xform.xform_ops[0].kind, XformOpKind::Translate);
        assert!(!xform.xform_ops[0].inverted);
    }

    #[test]
    fn xform_warns_on_missing_op_attribute() {
        let mut props = PropertyMap::new();
        props.insert(
            "xformOpOrder".into(),
            attr("token[]", Value::TokenVec(vec!["xformOp:scale".into()])),
        );
        let mut warns = Vec::new();
        let xform = Xform::reconstruct(&props, &no_refs(), &mut warns).unwrap();
        assert_eq!(xform.xform_ops.len(), 1);
        assert_eq!(warns.len(), 1);
    }

    #[test]
    fn xform_rejects_unknown_op() {
        let mut props = PropertyMap::new();
        props.insert(
            "xformOpOrder".into(),
            attr("token[]", Value::TokenVec(vec!["xformOp:teleport".into()])),
        );
        assert!(Xform::reconstruct(&props, &no_refs(), &mut Vec::new()).is_err());
    }

    #[test]
    fn geom_subset_rejects_negative_indices() {
        let mut props = PropertyMap::new();
        props.insert("indices".into(), attr("int[]", Value::IntVec(vec![0, -1])));
        assert!(GeomSubset::reconstruct(&props, &no_refs(), &mut Vec::new()).is_err());
    }

    #[test]
    fn gprim_reconstruct_warns() {
        let mut warns = Vec::new();
        GPrim::reconstruct(&PropertyMap::new(), &no_refs(), &mut warns).unwrap();
        assert_eq!(warns.len(), 1);
    }
}
