//! End-to-end reader scenarios: parse USDA text, reconstruct the stage (or
//! extract a layer) and check the resulting tree.

use openstage::prim::Kind;
use openstage::schema::TypedPrim;
use openstage::sdf::{self, Property, Specifier, Value};
use openstage::stage::{Axis, PlaybackMode};
use openstage::usda::{LoadState, ReaderConfig, UsdaReader};
use openstage::Error;

fn fixture(name: &str) -> String {
    let path = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("read fixture {name}: {e}"))
}

fn read_stage(source: &str) -> UsdaReader {
    let mut reader = UsdaReader::new(ReaderConfig::default());
    reader.read(source, LoadState::Toplevel).expect("read should succeed");
    reader.reconstruct_stage().expect("reconstruct should succeed");
    reader
}

#[test]
fn empty_stage() {
    let reader = read_stage("#usda 1.0\n");
    let stage = reader.stage();
    assert!(stage.root_prims().is_empty());
    assert!(stage.metas().up_axis.is_none());
}

#[test]
fn single_xform() {
    let reader = read_stage("#usda 1.0\ndef Xform \"Root\" {}\n");
    let stage = reader.stage();
    assert_eq!(stage.root_prims().len(), 1);

    let root = &stage.root_prims()[0];
    assert_eq!(root.name, "Root");
    assert_eq!(root.spec, Specifier::Def);
    assert_eq!(root.type_name, "Xform");
    assert!(matches!(root.typed, TypedPrim::Xform(_)));
    assert!(root.children.is_empty());
}

#[test]
fn nested_prims_preorder() {
    let reader = read_stage("#usda 1.0\ndef Xform \"A\" { def Xform \"B\" {} }\n");
    let stage = reader.stage();

    let a = &stage.root_prims()[0];
    assert_eq!(a.name, "A");
    assert_eq!(a.prim_id, 0);
    assert_eq!(a.children.len(), 1);

    let b = &a.children[0];
    assert_eq!(b.name, "B");
    assert_eq!(b.prim_id, 1);
    assert_eq!(b.abs_path.prim_part(), "/A/B");
}

#[test]
fn unknown_prim_type_falls_back_to_model() {
    let reader = read_stage("#usda 1.0\ndef Wobble \"X\" {}\n");
    assert!(reader.warning().contains("Wobble"));

    let stage = reader.stage();
    let prim = &stage.root_prims()[0];
    assert_eq!(prim.name, "X");
    assert_eq!(prim.type_name, "Wobble");
    let model = prim.typed.as_model().expect("unknown type should become Model");
    assert_eq!(model.prim_type_name, "Wobble");
}

#[test]
fn unknown_prim_type_rejected_in_strict_mode() {
    let config = ReaderConfig {
        allow_unknown_prims: false,
        ..Default::default()
    };
    let mut reader = UsdaReader::new(config);
    let err = reader
        .read("#usda 1.0\ndef Wobble \"X\" {}\n", LoadState::Toplevel)
        .unwrap_err();
    assert!(matches!(err, Error::UnknownPrimType(ref t) if t == "Wobble"));
    assert!(reader.error().contains("Wobble"));
}

#[test]
fn typeless_def_becomes_model() {
    let reader = read_stage("#usda 1.0\ndef \"Group\" {}\n");
    let stage = reader.stage();
    let prim = &stage.root_prims()[0];
    assert!(prim.type_name.is_empty());
    assert!(prim.typed.as_model().is_some());
}

#[test]
fn empty_prim_name_is_invalid() {
    let mut reader = UsdaReader::new(ReaderConfig::default());
    let err = reader
        .read("#usda 1.0\ndef Xform \"\" {}\n", LoadState::Toplevel)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidName(_)));
}

#[test]
fn stage_metadata_fields() {
    let source = r#"#usda 1.0
(
    doc = "test stage"
    upAxis = "Z"
    metersPerUnit = 0.01
    timeCodesPerSecond = 24
    startTimeCode = 1
    endTimeCode = 48
    framesPerSecond = 24
    autoPlay = true
    playbackMode = "loop"
    defaultPrim = "World"
)

def Xform "World" {}
"#;
    let reader = read_stage(source);
    let stage = reader.stage();
    let metas = stage.metas();
    assert_eq!(metas.doc.as_deref(), Some("test stage"));
    assert_eq!(metas.up_axis, Some(Axis::Z));
    assert_eq!(metas.meters_per_unit, Some(0.01));
    assert_eq!(metas.start_time_code, Some(1.0));
    assert_eq!(metas.end_time_code, Some(48.0));
    assert_eq!(metas.auto_play, Some(true));
    assert_eq!(metas.playback_mode, Some(PlaybackMode::Loop));
    assert_eq!(metas.default_prim.as_deref(), Some("World"));
}

#[test]
fn bad_playback_mode_errors() {
    let mut reader = UsdaReader::new(ReaderConfig::default());
    let err = reader
        .read("#usda 1.0\n(\n    playbackMode = \"bounce\"\n)\n", LoadState::Toplevel)
        .unwrap_err();
    assert!(matches!(err, Error::UnknownEnumToken { key: "playbackMode", .. }));
}

#[test]
fn bad_kind_errors() {
    let mut reader = UsdaReader::new(ReaderConfig::default());
    let err = reader
        .read(
            "#usda 1.0\ndef Xform \"A\" (\n    kind = \"prop\"\n) {}\n",
            LoadState::Toplevel,
        )
        .unwrap_err();
    assert!(matches!(err, Error::UnknownEnumToken { key: "kind", ref token } if token == "prop"));
}

#[test]
fn api_schemas_append_rejected() {
    let mut reader = UsdaReader::new(ReaderConfig::default());
    let err = reader
        .read(
            "#usda 1.0\ndef Xform \"A\" (\n    append apiSchemas = [\"SkelBindingAPI\"]\n) {}\n",
            LoadState::Toplevel,
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvalidListEditQualifier { key: "apiSchemas", .. }));
}

#[test]
fn references_metadata_decoded() {
    let source = r#"#usda 1.0
def Xform "A" (
    prepend references = @./asset.usda@</Root>
) {}
"#;
    let reader = read_stage(source);
    let stage = reader.stage();
    let (qual, refs) = stage.root_prims()[0].meta.references.clone().unwrap();
    assert_eq!(qual, sdf::ListEditQual::Prepend);
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].asset_path, "./asset.usda");
    assert_eq!(refs[0].prim_path.prim_part(), "/Root");
}

#[test]
fn blocked_payload_is_empty_list() {
    let reader = read_stage("#usda 1.0\ndef Xform \"A\" (\n    payload = None\n) {}\n");
    let stage = reader.stage();
    let (_, payloads) = stage.root_prims()[0].meta.payload.clone().unwrap();
    assert!(payloads.is_empty());
}

#[test]
fn hierarchy_fixture_reconstructs() {
    let reader = read_stage(&fixture("hierarchy.usda"));
    let stage = reader.stage();
    assert_eq!(stage.root_prims().len(), 2);

    let world = stage
        .find_prim_at_path(&sdf::path("/World").unwrap())
        .expect("/World");
    assert_eq!(world.meta.kind, Some(Kind::Assembly));
    assert_eq!(world.children.len(), 2);

    let quad = stage
        .find_prim_at_path(&sdf::path("/World/Geo/Quad").unwrap())
        .expect("/World/Geo/Quad");
    assert_eq!(quad.meta.active, Some(true));
    let mesh = quad.typed.as_mesh().expect("Quad is a mesh");
    assert_eq!(mesh.points.len(), 12);
    assert_eq!(mesh.face_vertex_counts, vec![4]);
    assert_eq!(mesh.double_sided, Some(true));
    assert_eq!(mesh.subdivision_scheme.as_deref(), Some("none"));

    let subset = &quad.children[0];
    assert_eq!(subset.name, "Front");
    match &subset.typed {
        TypedPrim::GeomSubset(s) => {
            assert_eq!(s.indices, vec![0]);
            assert_eq!(s.family_name.as_deref(), Some("materialBind"));
        }
        other => panic!("expected GeomSubset, got {other:?}"),
    }

    let ball = stage
        .find_prim_at_path(&sdf::path("/World/Geo/Ball").unwrap())
        .expect("/World/Geo/Ball");
    match &ball.typed {
        TypedPrim::GeomSphere(s) => assert_eq!(s.radius, Some(2.5)),
        other => panic!("expected Sphere, got {other:?}"),
    }

    // Time-sampled translate survives on the animated xform.
    let anim = stage
        .find_prim_at_path(&sdf::path("/Anim").unwrap())
        .expect("/Anim");
    let xform = anim.typed.as_xform().expect("Anim is an Xform");
    assert_eq!(xform.xform_ops.len(), 1);
    assert!(matches!(xform.xform_ops[0].value, Some(Value::TimeSamples(ref s)) if s.len() == 2));

    // Pre-order ids are dense and consistent with traversal order.
    let mut seen = Vec::new();
    stage.traverse(|p| seen.push(p.prim_id));
    assert_eq!(seen, (0..seen.len() as i64).collect::<Vec<_>>());
}

#[test]
fn variant_children_spliced_out_of_ordinary_children() {
    let reader = read_stage(&fixture("variants.usda"));
    let stage = reader.stage();

    let asset = stage
        .find_prim_at_path(&sdf::path("/Asset").unwrap())
        .expect("/Asset");

    // Only the non-variant child remains an ordinary child.
    let child_names: Vec<_> = asset.children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(child_names, ["Common"]);

    let selections = asset.meta.variants.clone().expect("variant selections");
    assert_eq!(selections["shape"], "ball");

    let shape_set = asset.variant_set("shape").expect("shape variant set");
    assert_eq!(shape_set.variants.len(), 2);

    let ball = &shape_set.variants["ball"];
    assert_eq!(ball.children.len(), 1);
    assert_eq!(ball.children[0].name, "Shape");
    assert!(matches!(ball.children[0].typed, TypedPrim::GeomSphere(_)));

    let boxed = &shape_set.variants["box"];
    assert_eq!(boxed.meta.comment.as_deref(), Some("axis-aligned fallback"));
    assert!(boxed.properties.contains("fallbackWeight"));
    assert_eq!(boxed.children.len(), 1);
    assert!(matches!(boxed.children[0].typed, TypedPrim::GeomCube(_)));

    // Variant children live below the variant selection path.
    assert_eq!(ball.children[0].abs_path.to_string(), "/Asset{shape=ball}/Shape");
}

#[test]
fn shading_fixture_connections_and_relationships() {
    let reader = read_stage(&fixture("shading.usda"));
    let stage = reader.stage();

    let board = stage
        .find_prim_at_path(&sdf::path("/Root/Board").unwrap())
        .expect("/Root/Board");
    let binding = board
        .props
        .get("material:binding")
        .and_then(Property::as_relationship)
        .expect("material:binding relationship");
    assert_eq!(binding.targets[0].prim_part(), "/Root/Looks/BoardMat");

    let mat = stage
        .find_prim_at_path(&sdf::path("/Root/Looks/BoardMat").unwrap())
        .expect("material");
    match &mat.typed {
        TypedPrim::Material(m) => {
            let surface = m.surface.as_ref().expect("surface connection");
            assert_eq!(surface.prim_part(), "/Root/Looks/BoardMat/PBRShader");
            assert_eq!(surface.prop_part(), "outputs:surface");
        }
        other => panic!("expected Material, got {other:?}"),
    }

    let shader = &mat.children[0];
    match &shader.typed {
        TypedPrim::Shader(s) => assert_eq!(s.info_id.as_deref(), Some("UsdPreviewSurface")),
        other => panic!("expected Shader, got {other:?}"),
    }

    let light = stage
        .find_prim_at_path(&sdf::path("/Root/Key").unwrap())
        .expect("light");
    match &light.typed {
        TypedPrim::SphereLight(l) => {
            assert_eq!(l.light.intensity, Some(1000.0));
            assert_eq!(l.radius, Some(0.5));
            assert_eq!(l.light.color, vec![1.0, 0.9, 0.8]);
        }
        other => panic!("expected SphereLight, got {other:?}"),
    }
}

#[test]
fn same_child_name_in_two_variants_is_legal() {
    // Each variant declares its own prim; the element names may collide
    // across variants because the subtrees are disjoint.
    let source = r#"#usda 1.0
def Xform "A"
{
    variantSet "v" = {
        "a" {
            def Xform "C" {}
        }
        "b" {
            def Xform "C" {}
        }
    }
}
"#;
    let reader = read_stage(source);
    let stage = reader.stage();
    let a = &stage.root_prims()[0];
    assert!(a.children.is_empty());
    let set = a.variant_set("v").unwrap();
    assert_eq!(set.variants["a"].children[0].name, "C");
    assert_eq!(set.variants["b"].children[0].name, "C");
}

fn nested_source(depth: usize) -> String {
    let mut source = String::from("#usda 1.0\n");
    for i in 0..depth {
        source.push_str(&format!("def Xform \"P{i}\" {{\n"));
    }
    source.push_str(&"}\n".repeat(depth));
    source
}

#[test]
fn nesting_at_limit_succeeds_one_past_fails() {
    let limit = 32;
    let config = ReaderConfig {
        max_prim_nest_level: limit,
        ..Default::default()
    };

    let mut reader = UsdaReader::new(config.clone());
    reader
        .read(&nested_source(limit), LoadState::Toplevel)
        .expect("nesting exactly at the limit should parse");
    reader.reconstruct_stage().unwrap();

    let mut reader = UsdaReader::new(config);
    let err = reader
        .read(&nested_source(limit + 1), LoadState::Toplevel)
        .unwrap_err();
    assert!(matches!(err, Error::ResourceLimitExceeded(_)));
}

#[test]
fn memory_budget_zero_rejects_any_prim() {
    let config = ReaderConfig {
        max_memory_mb: 0,
        ..Default::default()
    };
    let mut reader = UsdaReader::new(config);
    let err = reader
        .read("#usda 1.0\ndef Xform \"A\" {}\n", LoadState::Toplevel)
        .unwrap_err();
    assert!(matches!(err, Error::ResourceLimitExceeded(_)));
}

#[test]
fn schema_failure_is_per_prim_not_fatal() {
    // A Sphere whose radius has the wrong type still reads; the prim is
    // kept (as a Model) and the error is reported on the error channel.
    let source = "#usda 1.0\ndef Sphere \"S\" {\n    token radius = \"big\"\n}\n";
    let mut reader = UsdaReader::new(ReaderConfig::default());
    reader.read(source, LoadState::Toplevel).expect("read should succeed");
    reader.reconstruct_stage().unwrap();

    assert!(reader.error().contains("radius"));
    let stage = reader.stage();
    let prim = &stage.root_prims()[0];
    assert_eq!(prim.type_name, "Sphere");
    assert!(prim.typed.as_model().is_some());
}

#[test]
fn geom_subset_at_root_is_rejected() {
    let mut reader = UsdaReader::new(ReaderConfig::default());
    let err = reader
        .read("#usda 1.0\ndef GeomSubset \"S\" {}\n", LoadState::Toplevel)
        .unwrap_err();
    assert!(matches!(err, Error::SchemaReconstructFailed { .. }));
}

#[test]
fn read_twice_requires_fresh_reader() {
    let mut reader = UsdaReader::new(ReaderConfig::default());
    reader.read("#usda 1.0\n", LoadState::Toplevel).unwrap();
    let err = reader.read("#usda 1.0\n", LoadState::Toplevel).unwrap_err();
    assert!(matches!(err, Error::StateViolation(_)));
}

#[test]
fn reconstruct_requires_toplevel_load() {
    let mut reader = UsdaReader::new(ReaderConfig::default());
    reader
        .read("#usda 1.0\ndef Xform \"A\" {}\n", LoadState::SubLayer)
        .unwrap();
    let err = reader.reconstruct_stage().unwrap_err();
    assert!(matches!(err, Error::StateViolation(_)));
}

#[test]
fn layer_mode_builds_primspec_tree() {
    let source = r#"#usda 1.0
(
    defaultPrim = "Root"
)

def Xform "Root" (
    kind = "component"
)
{
    double3 xformOp:translate = (1, 2, 3)

    def Mesh "Geo"
    {
        int[] faceVertexCounts = [3]
    }

    variantSet "lod" = {
        "high" {
            def Mesh "HighRes" {}
        }
    }
}
"#;
    let mut reader = UsdaReader::new(ReaderConfig::default());
    reader.read(source, LoadState::Reference).unwrap();

    let layer = reader.get_as_layer().expect("layer extraction");
    assert_eq!(layer.metas.default_prim.as_deref(), Some("Root"));
    assert_eq!(layer.prim_specs.len(), 1);

    let root = layer.find_root("Root").expect("Root spec");
    assert_eq!(root.specifier, Specifier::Def);
    assert_eq!(root.type_name, "Xform");
    assert!(root.properties.contains("xformOp:translate"));
    // Raw metadata is preserved untouched for composition.
    assert!(root.metas.iter().any(|(k, _)| k == "kind"));
    // Children include prims declared inside variants; variants stay opaque.
    let child_names: Vec<_> = root.children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(child_names, ["Geo", "HighRes"]);
    assert!(root.variant_sets.contains_key("lod"));

    // One-shot: the store is consumed.
    let err = reader.get_as_layer().unwrap_err();
    assert!(matches!(err, Error::StateViolation(_)));
}

#[test]
fn unknown_metadata_key_warns_and_reads() {
    let reader = read_stage("#usda 1.0\ndef Xform \"A\" (\n    frobnicate = 7\n) {}\n");
    assert!(reader.warning().contains("frobnicate"));
    assert_eq!(reader.stage().root_prims().len(), 1);
}
