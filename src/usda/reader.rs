//! USDA reader: turns the parser's callback stream into a typed `Stage` or
//! an untyped `Layer`.
//!
//! The reader owns two flat, index-addressed stores. Prim indices are
//! assigned by the index callback when a prim header is seen; construct
//! callbacks then fill the reserved slots bottom-up. Reconstruction walks
//! the stores from the recorded top-level indices and produces owned trees,
//! splicing variant children into their variant sets.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use crate::error::Error;
use crate::prim::{ApiName, ApiSchemas, Kind, Prim, PrimMeta, Variant, VariantSet};
use crate::schema::{
    BlendShape, CylinderLight, DiskLight, DistantLight, DomeLight, GPrim, GeomBasisCurves,
    GeomCamera, GeomCapsule, GeomCone, GeomCube, GeomCylinder, GeomMesh, GeomPoints, GeomSphere,
    GeomSubset, Material, Model, NodeGraph, ReconstructPrim, Scope, Shader, SkelAnimation,
    SkelRoot, Skeleton, SphereLight, TypedPrim, Xform,
};
use crate::sdf::{ListEditQual, Payload, PropertyMap, Reference, Value};
use crate::stage::{Axis, Layer, PlaybackMode, PrimSpec, Stage, StageMetas, VariantSpec};
use crate::usda::parser::{
    Parser, ParserOptions, PrimDecl, PrimMetaMap, RawStageMetas, VariantSetList,
};

const TAG: &str = "[USDA]";

/// How the layer being read will be used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadState {
    /// The top stage: prims are reconstructed into typed values.
    #[default]
    Toplevel,
    /// Loaded as the target of a `references` arc.
    Reference,
    /// Loaded as a `subLayers` entry.
    SubLayer,
    /// Loaded as the target of a `payload` arc.
    Payload,
}

/// Reader configuration. Limits are forwarded to the parser verbatim.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Reserved for a future parallel decode path; the text reader is
    /// single-threaded and ignores it.
    pub num_threads: i32,
    pub max_prim_nest_level: usize,
    pub max_field_value_pairs: usize,
    pub max_token_length: usize,
    pub max_string_length: usize,
    pub max_element_size: i64,
    /// Hard cap on cumulative stored payload bytes, in MiB.
    pub max_memory_mb: usize,
    /// Unknown prim types become `Model` prims with a warning.
    pub allow_unknown_prims: bool,
    /// Unknown `apiSchemas` names are dropped with a warning.
    pub allow_unknown_api_schemas: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            num_threads: -1,
            max_prim_nest_level: 256,
            max_field_value_pairs: 4096,
            max_token_length: 4096,
            max_string_length: 64 * 1024 * 1024,
            max_element_size: 512,
            max_memory_mb: 16384,
            allow_unknown_prims: true,
            allow_unknown_api_schemas: true,
        }
    }
}

/// One variant's body inside a `PrimNode`, with decoded metadata and the
/// indices of prims that textually appeared inside the variant braces.
#[derive(Debug, Clone, Default)]
struct VariantNode {
    metas: PrimMeta,
    props: PropertyMap,
    prim_children: Vec<i64>,
}

/// Intermediate record for one prim, addressed by its assigned index.
#[derive(Debug, Clone, Default)]
struct PrimNode {
    /// Typed payload plus name/spec/meta/props; children and variant sets
    /// stay empty until reconstruction.
    prim: Prim,
    type_name: String,
    parent: i64,
    /// Set when this node's index appears in some variant's children.
    parent_is_variant: bool,
    /// Child indices in textual order; variant children included.
    children: Vec<usize>,
    variant_node_map: BTreeMap<String, BTreeMap<String, VariantNode>>,
}

/// Intermediate record for layer-mode loads.
#[derive(Debug, Clone, Default)]
struct PrimSpecNode {
    spec: PrimSpec,
    parent: i64,
    children: Vec<usize>,
}

#[derive(Default)]
struct ReaderState {
    stage: Stage,
    prim_nodes: Vec<PrimNode>,
    toplevel_prims: Vec<usize>,
    primspec_nodes: Vec<PrimSpecNode>,
    toplevel_primspecs: Vec<usize>,
    primspec_invalidated: bool,
    errs: Vec<String>,
    warns: Vec<String>,
    memory_used: usize,
    memory_budget: usize,
    allow_unknown_api_schemas: bool,
}

/// Reader facade over one USDA source.
pub struct UsdaReader {
    config: ReaderConfig,
    base_dir: String,
    load_state: Option<LoadState>,
    read_ok: bool,
    state: Rc<RefCell<ReaderState>>,
}

impl UsdaReader {
    pub fn new(config: ReaderConfig) -> Self {
        UsdaReader {
            config,
            base_dir: String::new(),
            load_state: None,
            read_ok: false,
            state: Rc::new(RefCell::new(ReaderState::default())),
        }
    }

    /// Records the directory used by the caller's asset resolver. Pure
    /// bookkeeping; the reader itself never touches the filesystem.
    pub fn set_base_dir(&mut self, dir: &str) {
        self.base_dir = dir.to_string();
    }

    pub fn base_dir(&self) -> &str {
        &self.base_dir
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn is_toplevel(&self) -> bool {
        matches!(self.load_state, Some(LoadState::Toplevel))
    }

    pub fn is_referenced(&self) -> bool {
        matches!(self.load_state, Some(LoadState::Reference))
    }

    pub fn is_sub_layered(&self) -> bool {
        matches!(self.load_state, Some(LoadState::SubLayer))
    }

    pub fn is_payloaded(&self) -> bool {
        matches!(self.load_state, Some(LoadState::Payload))
    }

    /// Accumulated error text, `[USDA]`-tagged, one entry per line.
    pub fn error(&self) -> String {
        self.state.borrow().errs.join("\n")
    }

    /// Accumulated warning text, `[USDA]`-tagged, one entry per line.
    pub fn warning(&self) -> String {
        self.state.borrow().warns.join("\n")
    }

    /// The stage. Meaningful after a successful `reconstruct_stage`.
    pub fn stage(&self) -> std::cell::Ref<'_, Stage> {
        std::cell::Ref::map(self.state.borrow(), |st| &st.stage)
    }

    /// Clone the reconstructed stage out of the reader.
    pub fn take_stage(&self) -> Stage {
        self.state.borrow().stage.clone()
    }

    /// Run the parser over `source` with the callbacks for `load_state`
    /// installed. One-shot per reader: intermediate state from a failed
    /// read is kept for diagnostics only.
    pub fn read(&mut self, source: &str, load_state: LoadState) -> Result<(), Error> {
        if self.load_state.is_some() {
            return Err(self.fatal(Error::StateViolation(
                "read was already called; create a fresh reader for another parse",
            )));
        }
        self.load_state = Some(load_state);
        log::debug!("{TAG} read: {} bytes, load state {:?}", source.len(), load_state);

        {
            let mut st = self.state.borrow_mut();
            st.memory_budget = self.config.max_memory_mb.saturating_mul(1024 * 1024);
            st.allow_unknown_api_schemas = self.config.allow_unknown_api_schemas;
            st.primspec_invalidated = true;
        }

        let options = ParserOptions {
            max_prim_nest_level: self.config.max_prim_nest_level,
            max_field_value_pairs: self.config.max_field_value_pairs,
            max_token_length: self.config.max_token_length,
            max_string_length: self.config.max_string_length,
            max_element_size: self.config.max_element_size,
            allow_unknown_prims: self.config.allow_unknown_prims,
        };
        let mut parser = Parser::new(source, options);

        self.register_stage_meta(&mut parser);
        self.register_prim_idx_assign(&mut parser);

        if load_state == LoadState::Toplevel {
            self.register_typed::<Model>(&mut parser);
            self.register_typed::<GPrim>(&mut parser);

            self.register_typed::<Xform>(&mut parser);
            self.register_typed::<Scope>(&mut parser);
            self.register_typed::<GeomMesh>(&mut parser);
            self.register_typed::<GeomSphere>(&mut parser);
            self.register_typed::<GeomCube>(&mut parser);
            self.register_typed::<GeomCone>(&mut parser);
            self.register_typed::<GeomCylinder>(&mut parser);
            self.register_typed::<GeomCapsule>(&mut parser);
            self.register_typed::<GeomPoints>(&mut parser);
            self.register_typed::<GeomBasisCurves>(&mut parser);
            self.register_typed::<GeomSubset>(&mut parser);
            self.register_typed::<GeomCamera>(&mut parser);

            self.register_typed::<SphereLight>(&mut parser);
            self.register_typed::<DomeLight>(&mut parser);
            self.register_typed::<DiskLight>(&mut parser);
            self.register_typed::<DistantLight>(&mut parser);
            self.register_typed::<CylinderLight>(&mut parser);

            self.register_typed::<Material>(&mut parser);
            self.register_typed::<Shader>(&mut parser);
            self.register_typed::<NodeGraph>(&mut parser);

            self.register_typed::<SkelRoot>(&mut parser);
            self.register_typed::<Skeleton>(&mut parser);
            self.register_typed::<SkelAnimation>(&mut parser);
            self.register_typed::<BlendShape>(&mut parser);
        } else {
            self.register_prim_spec(&mut parser);
        }

        let parse_result = parser.parse();

        {
            let mut st = self.state.borrow_mut();
            for warn in parser.take_warnings() {
                st.warns.push(format!("{TAG} {warn}"));
            }
        }

        match parse_result {
            Ok(()) => {
                self.read_ok = true;
                if load_state != LoadState::Toplevel {
                    self.state.borrow_mut().primspec_invalidated = false;
                }
                Ok(())
            }
            Err(err) => {
                let err = Error::from_parse(err);
                let mut message = err.to_string();
                if let Some(context) = parser.source_context() {
                    message.push('\n');
                    message.push_str(&context.render());
                }
                self.state.borrow_mut().errs.push(message);
                Err(err)
            }
        }
    }

    /// Build the typed stage from the prim store. Valid after a successful
    /// toplevel read. Clears previously reconstructed roots first.
    pub fn reconstruct_stage(&mut self) -> Result<(), Error> {
        if !self.is_toplevel() || !self.read_ok {
            return Err(self.fatal(Error::StateViolation(
                "reconstruct_stage requires a successful toplevel read",
            )));
        }

        let mut st = self.state.borrow_mut();
        let result = st.reconstruct_stage();
        if let Err(err) = &result {
            let message = err.to_string();
            st.errs.push(message);
        }
        result
    }

    /// Extract the untyped layer built by a non-toplevel read. One-shot:
    /// the PrimSpec store is consumed and further calls fail.
    pub fn get_as_layer(&mut self) -> Result<Layer, Error> {
        let mut st = self.state.borrow_mut();
        let result = st.get_as_layer();
        if let Err(err) = &result {
            let message = err.to_string();
            st.errs.push(message);
        }
        result
    }

    fn fatal(&self, err: Error) -> Error {
        self.state.borrow_mut().errs.push(err.to_string());
        err
    }

    fn register_stage_meta(&self, parser: &mut Parser) {
        let state = Rc::clone(&self.state);
        parser.register_stage_meta_fn(Box::new(move |raw| {
            let mut st = state.borrow_mut();
            let metas = st.decode_stage_metas(raw)?;
            *st.stage.metas_mut() = metas;
            Ok(())
        }));
    }

    fn register_prim_idx_assign(&self, parser: &mut Parser) {
        let state = Rc::clone(&self.state);
        parser.register_prim_idx_assign_fn(Box::new(move |_parent_idx| {
            let mut st = state.borrow_mut();
            let idx = st.prim_nodes.len();
            st.prim_nodes.push(PrimNode::default());
            idx as i64
        }));
    }

    fn register_typed<T>(&self, parser: &mut Parser)
    where
        T: ReconstructPrim + Into<TypedPrim> + 'static,
    {
        let state = Rc::clone(&self.state);
        parser.register_prim_construct_fn(
            T::TYPE_NAME,
            Box::new(move |decl| {
                state.borrow_mut().construct_typed::<T>(decl)?;
                Ok(())
            }),
        );
    }

    fn register_prim_spec(&self, parser: &mut Parser) {
        let state = Rc::clone(&self.state);
        parser.register_prim_spec_fn(Box::new(move |decl| {
            state.borrow_mut().construct_prim_spec(decl)?;
            Ok(())
        }));
    }
}

impl ReaderState {
    fn push_warn(&mut self, message: String) {
        log::warn!("{TAG} {message}");
        self.warns.push(format!("{TAG} {message}"));
    }

    fn push_err(&mut self, message: String) {
        log::debug!("{TAG} per-prim error: {message}");
        self.errs.push(format!("{TAG} {message}"));
    }

    fn charge_memory(&mut self, bytes: usize) -> Result<(), Error> {
        self.memory_used = self.memory_used.saturating_add(bytes);
        if self.memory_used > self.memory_budget {
            return Err(Error::ResourceLimitExceeded(format!(
                "stored prim payloads exceed the {} MiB budget",
                self.memory_budget / (1024 * 1024)
            )));
        }
        Ok(())
    }

    /// Shared header validation for both callback paths.
    fn validate_decl(&self, decl: &PrimDecl) -> Result<(), Error> {
        let name = decl.element_name.prim_part();
        if name.is_empty() || name.contains('/') || name.contains('.') {
            return Err(Error::InvalidName(name.to_string()));
        }
        if decl.element_name.is_absolute() || decl.element_name.is_root() {
            return Err(Error::InvalidName(name.to_string()));
        }
        if decl.prim_idx < 0 {
            return Err(Error::IndexOutOfRange {
                index: decl.prim_idx,
                size: self.prim_nodes.len(),
            });
        }
        Ok(())
    }

    /// Typed construct callback body: validate, decode metadata, run the
    /// schema reconstructor, build the variant map, and link the node.
    fn construct_typed<T>(&mut self, decl: PrimDecl) -> Result<(), Error>
    where
        T: ReconstructPrim + Into<TypedPrim>,
    {
        self.validate_decl(&decl)?;
        let name = decl.element_name.prim_part().to_string();
        let idx = decl.prim_idx as usize;

        // GeomSubset only makes sense under a parent prim (its indices
        // subset the parent's elements).
        if T::TYPE_NAME == GeomSubset::PRIM_TYPE_NAME && decl.parent_prim_idx < 0 {
            return Err(Error::SchemaReconstructFailed {
                type_name: T::TYPE_NAME,
                name,
                message: "GeomSubset must be declared as a child prim".to_string(),
            });
        }

        log::debug!(
            "{TAG} prim[{idx}] {} `{name}` (parent {})",
            T::TYPE_NAME,
            decl.parent_prim_idx
        );

        let meta = self.decode_prim_meta(&decl.metas)?;
        let references = meta
            .references
            .clone()
            .unwrap_or((ListEditQual::ResetToExplicit, Vec::new()));

        let mut warns = Vec::new();
        let typed: TypedPrim = match T::reconstruct(&decl.properties, &references, &mut warns) {
            Ok(value) => value.into(),
            Err(err) => {
                // A schema failure is a per-prim error: record it and keep
                // the prim as a Model so the store stays index-consistent.
                self.push_err(format!(
                    "failed to reconstruct {} prim `{}`: {err:#}",
                    T::TYPE_NAME, name
                ));
                TypedPrim::Model(Model::default())
            }
        };
        for warn in warns {
            self.push_warn(format!("{}: {warn}", decl.full_path));
        }

        let mut prim = Prim::new(typed);
        prim.name = name;
        prim.spec = decl.specifier;
        prim.type_name = decl.type_name.clone();
        prim.meta = meta;
        prim.props = decl.properties;
        if let Some(model) = prim.typed.as_model_mut() {
            model.prim_type_name = decl.type_name.clone();
        }

        let variant_node_map = self.build_variant_nodes(decl.variants)?;

        self.charge_memory(prim.props.approx_size() + prim.name.len() + 64)?;

        if idx >= self.prim_nodes.len() {
            self.prim_nodes.resize_with(idx + 1, PrimNode::default);
        }
        let node = &mut self.prim_nodes[idx];
        node.prim = prim;
        node.type_name = decl.type_name;
        node.parent = decl.parent_prim_idx;
        node.variant_node_map = variant_node_map;

        self.link_node(idx, decl.parent_prim_idx)
    }

    /// Decode the raw variant list and flag each variant child in the store.
    fn build_variant_nodes(
        &mut self,
        variants: VariantSetList,
    ) -> Result<BTreeMap<String, BTreeMap<String, VariantNode>>, Error> {
        let mut variant_node_map = BTreeMap::new();
        for (set_name, set_variants) in variants {
            let mut nodes = BTreeMap::new();
            for (variant_name, content) in set_variants {
                let metas = self.decode_prim_meta(&content.metas)?;
                for &child_idx in &content.prim_indices {
                    if child_idx < 0 || child_idx as usize >= self.prim_nodes.len() {
                        return Err(Error::IndexOutOfRange {
                            index: child_idx,
                            size: self.prim_nodes.len(),
                        });
                    }
                    self.prim_nodes[child_idx as usize].parent_is_variant = true;
                }
                nodes.insert(
                    variant_name,
                    VariantNode {
                        metas,
                        props: content.props,
                        prim_children: content.prim_indices,
                    },
                );
            }
            variant_node_map.insert(set_name, nodes);
        }
        Ok(variant_node_map)
    }

    fn link_node(&mut self, idx: usize, parent_idx: i64) -> Result<(), Error> {
        if parent_idx < 0 {
            self.toplevel_prims.push(idx);
            return Ok(());
        }
        let parent = parent_idx as usize;
        if parent >= self.prim_nodes.len() {
            return Err(Error::IndexOutOfRange {
                index: parent_idx,
                size: self.prim_nodes.len(),
            });
        }
        self.prim_nodes[parent].children.push(idx);
        Ok(())
    }

    /// Untyped construct callback body for layer-mode loads. Properties,
    /// metadata and variants are kept raw for later composition.
    fn construct_prim_spec(&mut self, decl: PrimDecl) -> Result<(), Error> {
        self.validate_decl(&decl)?;
        let idx = decl.prim_idx as usize;

        let mut variant_sets = BTreeMap::new();
        for (set_name, set_variants) in decl.variants {
            let mut variants = BTreeMap::new();
            for (variant_name, content) in set_variants {
                variants.insert(
                    variant_name,
                    VariantSpec {
                        metas: content.metas,
                        properties: content.props,
                        children: Vec::new(),
                    },
                );
            }
            variant_sets.insert(set_name, variants);
        }

        let spec = PrimSpec {
            name: decl.element_name.prim_part().to_string(),
            specifier: decl.specifier,
            type_name: decl.type_name,
            properties: decl.properties,
            metas: decl.metas,
            variant_sets,
            children: Vec::new(),
        };

        self.charge_memory(spec.properties.approx_size() + spec.name.len() + 64)?;

        if idx >= self.primspec_nodes.len() {
            self.primspec_nodes.resize_with(idx + 1, PrimSpecNode::default);
        }
        self.primspec_nodes[idx].spec = spec;
        self.primspec_nodes[idx].parent = decl.parent_prim_idx;

        if decl.parent_prim_idx < 0 {
            self.toplevel_primspecs.push(idx);
            Ok(())
        } else {
            let parent = decl.parent_prim_idx as usize;
            if parent >= self.primspec_nodes.len() {
                self.primspec_nodes.resize_with(parent + 1, PrimSpecNode::default);
            }
            self.primspec_nodes[parent].children.push(idx);
            Ok(())
        }
    }

    fn decode_stage_metas(&mut self, raw: &RawStageMetas) -> Result<StageMetas, Error> {
        let mut metas = StageMetas {
            doc: raw.doc.clone(),
            comment: raw.comment.clone(),
            up_axis: None,
            sub_layers: raw.sub_layers.clone(),
            default_prim: raw.default_prim.clone(),
            meters_per_unit: raw.meters_per_unit,
            time_codes_per_second: raw.time_codes_per_second,
            start_time_code: raw.start_time_code,
            end_time_code: raw.end_time_code,
            frames_per_second: raw.frames_per_second,
            auto_play: raw.auto_play,
            playback_mode: None,
            custom_layer_data: raw.custom_layer_data.clone(),
            unregistered: raw.unregistered.clone(),
        };

        if let Some(token) = &raw.up_axis {
            metas.up_axis = Some(Axis::from_token(token).ok_or_else(|| Error::UnknownEnumToken {
                key: "upAxis",
                token: token.clone(),
            })?);
        }
        if let Some(token) = &raw.playback_mode {
            metas.playback_mode =
                Some(PlaybackMode::from_token(token).ok_or_else(|| Error::UnknownEnumToken {
                    key: "playbackMode",
                    token: token.clone(),
                })?);
        }

        Ok(metas)
    }

    /// Decode the raw metadata map into structured `PrimMeta`, enforcing
    /// the per-key type contracts. Unknown keys warn and are dropped.
    fn decode_prim_meta(&mut self, metas: &PrimMetaMap) -> Result<PrimMeta, Error> {
        fn mismatch(key: &'static str, expected: &'static str, got: &Value) -> Error {
            Error::InvalidMetadataType {
                key,
                expected,
                got: got.type_name().to_string(),
            }
        }

        let mut out = PrimMeta::default();

        for (key, (qual, value)) in metas {
            match key.as_str() {
                "active" => {
                    out.active = Some(value.as_bool().ok_or_else(|| mismatch("active", "bool", value))?);
                }
                "hidden" => {
                    out.hidden = Some(value.as_bool().ok_or_else(|| mismatch("hidden", "bool", value))?);
                }
                "sceneName" => {
                    out.scene_name = Some(
                        value
                            .as_str()
                            .ok_or_else(|| mismatch("sceneName", "string", value))?
                            .to_string(),
                    );
                }
                "displayName" => {
                    out.display_name = Some(
                        value
                            .as_str()
                            .ok_or_else(|| mismatch("displayName", "string", value))?
                            .to_string(),
                    );
                }
                "kind" => {
                    let token = value.as_str().ok_or_else(|| mismatch("kind", "token", value))?;
                    out.kind = Some(Kind::from_token(token).ok_or_else(|| Error::UnknownEnumToken {
                        key: "kind",
                        token: token.to_string(),
                    })?);
                }
                "customData" => {
                    out.custom_data = Some(
                        value
                            .as_dictionary()
                            .ok_or_else(|| mismatch("customData", "dictionary", value))?
                            .clone(),
                    );
                }
                "assetInfo" => {
                    out.asset_info = Some(
                        value
                            .as_dictionary()
                            .ok_or_else(|| mismatch("assetInfo", "dictionary", value))?
                            .clone(),
                    );
                }
                "variants" => {
                    let dict = value
                        .as_dictionary()
                        .ok_or_else(|| mismatch("variants", "dictionary", value))?;
                    let mut selections = BTreeMap::new();
                    for (set_name, selection) in dict {
                        match selection {
                            Value::String(s) | Value::Token(s) => {
                                selections.insert(set_name.clone(), s.clone());
                            }
                            other => {
                                return Err(mismatch("variants", "string values", other));
                            }
                        }
                    }
                    out.variants = Some(selections);
                }
                "inherits" => {
                    out.inherits = Some((*qual, decode_path_list("inherits", value)?));
                }
                "specializes" => {
                    out.specializes = Some((*qual, decode_path_list("specializes", value)?));
                }
                "variantSets" => {
                    let names = match value {
                        Value::Block => Vec::new(),
                        Value::String(s) | Value::Token(s) => vec![s.clone()],
                        Value::StringVec(v) | Value::TokenVec(v) => v.clone(),
                        other => return Err(mismatch("variantSets", "string or string[]", other)),
                    };
                    out.variant_sets = Some((*qual, names));
                }
                "apiSchemas" => {
                    out.api_schemas = Some(self.decode_api_schemas(*qual, value)?);
                }
                "references" => {
                    out.references = Some((*qual, decode_reference_list("references", value)?));
                }
                "payload" => {
                    let payloads = decode_reference_list("payload", value)?
                        .into_iter()
                        .map(|r| Payload {
                            asset_path: r.asset_path,
                            prim_path: r.prim_path,
                            layer_offset: (!r.layer_offset.is_identity()).then_some(r.layer_offset),
                        })
                        .collect();
                    out.payload = Some((*qual, payloads));
                }
                "comment" => {
                    out.comment = Some(
                        value
                            .as_str()
                            .ok_or_else(|| mismatch("comment", "string", value))?
                            .to_string(),
                    );
                }
                other => {
                    self.push_warn(format!("unknown prim metadata key `{other}`; value ignored"));
                }
            }
        }

        Ok(out)
    }

    fn decode_api_schemas(&mut self, qual: ListEditQual, value: &Value) -> Result<ApiSchemas, Error> {
        if !matches!(qual, ListEditQual::Prepend | ListEditQual::ResetToExplicit) {
            return Err(Error::InvalidListEditQualifier {
                key: "apiSchemas",
                qual: qual.as_str().to_string(),
            });
        }

        let tokens: Vec<String> = match value {
            Value::Block => Vec::new(),
            Value::String(s) | Value::Token(s) => vec![s.clone()],
            Value::StringVec(v) | Value::TokenVec(v) => v.clone(),
            other => {
                return Err(Error::InvalidMetadataType {
                    key: "apiSchemas",
                    expected: "token[]",
                    got: other.type_name().to_string(),
                });
            }
        };

        let mut schemas = ApiSchemas {
            list_edit: qual,
            names: Vec::new(),
        };
        for token in tokens {
            // Multi-apply schemas carry an instance name after the colon.
            let (name, instance) = match token.split_once(':') {
                Some((name, instance)) => (name, instance.to_string()),
                None => (token.as_str(), String::new()),
            };
            match ApiName::from_token(name) {
                Some(api) => schemas.names.push((api, instance)),
                None if self.allow_unknown_api_schemas => {
                    self.push_warn(format!("unknown apiSchema `{token}` dropped"));
                }
                None => {
                    return Err(Error::UnknownEnumToken {
                        key: "apiSchemas",
                        token,
                    });
                }
            }
        }
        Ok(schemas)
    }

    /// Checks the parent/child links the callbacks recorded: every
    /// non-root node must appear in its parent's child list, and the
    /// variant flag must agree with variant membership.
    fn validate_store_links(&self) -> Result<(), Error> {
        for (idx, node) in self.prim_nodes.iter().enumerate() {
            if node.parent < 0 {
                continue;
            }
            let parent_idx = node.parent as usize;
            if parent_idx >= self.prim_nodes.len() {
                return Err(Error::IndexOutOfRange {
                    index: node.parent,
                    size: self.prim_nodes.len(),
                });
            }
            let parent = &self.prim_nodes[parent_idx];
            if !parent.children.contains(&idx) {
                return Err(Error::StateViolation(
                    "prim store node missing from its parent's child list",
                ));
            }
            let in_variant = parent.variant_node_map.values().any(|variants| {
                variants.values().any(|v| v.prim_children.contains(&(idx as i64)))
            });
            if node.parent_is_variant != in_variant {
                return Err(Error::StateViolation(
                    "variant membership flag disagrees with the variant map",
                ));
            }
        }
        Ok(())
    }

    /// Bottom-up stage reconstruction over the prim store.
    fn reconstruct_stage(&mut self) -> Result<(), Error> {
        log::debug!(
            "{TAG} reconstructing stage: {} nodes, {} roots",
            self.prim_nodes.len(),
            self.toplevel_prims.len()
        );
        self.stage.root_prims_mut().clear();
        self.validate_store_links()?;

        let mut visited = vec![false; self.prim_nodes.len()];
        let roots = self.toplevel_prims.clone();
        let mut root_prims = Vec::with_capacity(roots.len());
        for idx in roots {
            root_prims.push(construct_prim_tree(idx as i64, &self.prim_nodes, &mut visited)?);
        }

        // Every slot must have been reached exactly once; an unreached slot
        // means the parent/child links are inconsistent.
        if visited.iter().any(|v| !*v) {
            return Err(Error::StateViolation(
                "prim store contains nodes unreachable from the top-level list",
            ));
        }

        *self.stage.root_prims_mut() = root_prims;
        self.stage.compute_paths_and_assign_ids();
        Ok(())
    }

    /// Bottom-up layer extraction; consumes the PrimSpec store.
    fn get_as_layer(&mut self) -> Result<Layer, Error> {
        if self.primspec_invalidated {
            return Err(Error::StateViolation(
                "PrimSpec data is invalid: no non-toplevel read, or get_as_layer already consumed it",
            ));
        }

        let mut nodes = std::mem::take(&mut self.primspec_nodes);
        let roots = std::mem::take(&mut self.toplevel_primspecs);
        self.primspec_invalidated = true;
        log::debug!("{TAG} extracting layer: {} nodes, {} roots", nodes.len(), roots.len());

        let mut layer = Layer {
            metas: self.stage.metas().clone(),
            prim_specs: Vec::with_capacity(roots.len()),
        };

        for idx in roots {
            layer.prim_specs.push(take_primspec_tree(idx, &mut nodes)?);
        }

        Ok(layer)
    }
}

/// Recursively build one typed prim from the store. `visited` marks each
/// index as it is consumed; a second visit is an error.
fn construct_prim_tree(prim_idx: i64, nodes: &[PrimNode], visited: &mut [bool]) -> Result<Prim, Error> {
    if prim_idx < 0 || prim_idx as usize >= nodes.len() {
        return Err(Error::IndexOutOfRange {
            index: prim_idx,
            size: nodes.len(),
        });
    }
    let idx = prim_idx as usize;
    if visited[idx] {
        return Err(Error::StateViolation("prim store node reached more than once"));
    }
    visited[idx] = true;

    let node = &nodes[idx];
    let mut prim = node.prim.clone();
    prim.type_name = node.type_name.clone();

    // Variants first: a child that belongs to a variant is emitted inside
    // that variant and suppressed from the ordinary child list below.
    let mut variant_children: BTreeSet<i64> = BTreeSet::new();
    for (set_name, variant_nodes) in &node.variant_node_map {
        let mut variant_set = VariantSet {
            name: set_name.clone(),
            variants: BTreeMap::new(),
        };
        for (variant_name, vn) in variant_nodes {
            let mut variant = Variant {
                meta: vn.metas.clone(),
                properties: vn.props.clone(),
                children: Vec::new(),
            };
            for &child_idx in &vn.prim_children {
                if variant_children.contains(&child_idx) {
                    return Err(Error::DuplicateVariantChild(child_idx));
                }
                variant.children.push(construct_prim_tree(child_idx, nodes, visited)?);
                variant_children.insert(child_idx);
            }
            variant_set.variants.insert(variant_name.clone(), variant);
        }
        prim.variant_sets.insert(set_name.clone(), variant_set);
    }

    for &child_idx in &node.children {
        if variant_children.contains(&(child_idx as i64)) {
            continue;
        }
        prim.children.push(construct_prim_tree(child_idx as i64, nodes, visited)?);
    }

    Ok(prim)
}

/// Move one spec subtree out of the store, children first.
fn take_primspec_tree(idx: usize, nodes: &mut [PrimSpecNode]) -> Result<PrimSpec, Error> {
    if idx >= nodes.len() {
        return Err(Error::IndexOutOfRange {
            index: idx as i64,
            size: nodes.len(),
        });
    }
    let children = std::mem::take(&mut nodes[idx].children);
    let mut spec = std::mem::take(&mut nodes[idx].spec);
    for child_idx in children {
        spec.children.push(take_primspec_tree(child_idx, nodes)?);
    }
    Ok(spec)
}

fn decode_path_list(key: &'static str, value: &Value) -> Result<Vec<crate::sdf::Path>, Error> {
    match value {
        Value::Block => Ok(Vec::new()),
        Value::Path(p) => Ok(vec![p.clone()]),
        Value::PathVec(v) => Ok(v.clone()),
        Value::StringVec(v) if v.is_empty() => Ok(Vec::new()),
        other => Err(Error::InvalidMetadataType {
            key,
            expected: "path or path[]",
            got: other.type_name().to_string(),
        }),
    }
}

/// References and payloads share syntax; a blocked value yields an empty
/// list, a single entry is promoted to a one-element list, and a bare
/// `<path>` is an internal reference.
fn decode_reference_list(key: &'static str, value: &Value) -> Result<Vec<Reference>, Error> {
    match value {
        Value::Block => Ok(Vec::new()),
        Value::Reference(r) => Ok(vec![r.clone()]),
        Value::ReferenceVec(v) => Ok(v.clone()),
        Value::Path(p) => Ok(vec![Reference {
            prim_path: p.clone(),
            ..Default::default()
        }]),
        Value::PathVec(v) => Ok(v
            .iter()
            .map(|p| Reference {
                prim_path: p.clone(),
                ..Default::default()
            })
            .collect()),
        Value::StringVec(v) if v.is_empty() => Ok(Vec::new()),
        other => Err(Error::InvalidMetadataType {
            key,
            expected: "reference or reference[]",
            got: other.type_name().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ReaderState {
        ReaderState {
            memory_budget: usize::MAX,
            allow_unknown_api_schemas: true,
            ..Default::default()
        }
    }

    fn meta_entry(key: &str, qual: ListEditQual, value: Value) -> PrimMetaMap {
        vec![(key.to_string(), (qual, value))]
    }

    #[test]
    fn decode_active_requires_bool() {
        let mut st = state();
        let ok = st
            .decode_prim_meta(&meta_entry("active", ListEditQual::ResetToExplicit, Value::Bool(false)))
            .unwrap();
        assert_eq!(ok.active, Some(false));

        let err = st
            .decode_prim_meta(&meta_entry("active", ListEditQual::ResetToExplicit, Value::Int64(1)))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidMetadataType { key: "active", .. }));
    }

    #[test]
    fn decode_kind_closed_set() {
        let mut st = state();
        let ok = st
            .decode_prim_meta(&meta_entry(
                "kind",
                ListEditQual::ResetToExplicit,
                Value::String("assembly".into()),
            ))
            .unwrap();
        assert_eq!(ok.kind, Some(Kind::Assembly));

        let err = st
            .decode_prim_meta(&meta_entry(
                "kind",
                ListEditQual::ResetToExplicit,
                Value::String("prop".into()),
            ))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownEnumToken { key: "kind", ref token } if token == "prop"));
    }

    #[test]
    fn decode_single_reference_promoted_to_list() {
        let mut st = state();
        let reference = Reference {
            asset_path: "./a.usda".into(),
            ..Default::default()
        };
        let meta = st
            .decode_prim_meta(&meta_entry(
                "references",
                ListEditQual::Prepend,
                Value::Reference(reference),
            ))
            .unwrap();
        let (qual, refs) = meta.references.unwrap();
        assert_eq!(qual, ListEditQual::Prepend);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].asset_path, "./a.usda");
    }

    #[test]
    fn decode_blocked_references_yield_empty_list() {
        let mut st = state();
        let meta = st
            .decode_prim_meta(&meta_entry("references", ListEditQual::ResetToExplicit, Value::Block))
            .unwrap();
        assert_eq!(meta.references.unwrap().1.len(), 0);
    }

    #[test]
    fn decode_api_schemas_rejects_append() {
        let mut st = state();
        let err = st
            .decode_prim_meta(&meta_entry(
                "apiSchemas",
                ListEditQual::Append,
                Value::TokenVec(vec!["SkelBindingAPI".into()]),
            ))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidListEditQualifier { key: "apiSchemas", .. }));
    }

    #[test]
    fn decode_api_schemas_drops_unknown_with_warning() {
        let mut st = state();
        let meta = st
            .decode_prim_meta(&meta_entry(
                "apiSchemas",
                ListEditQual::Prepend,
                Value::TokenVec(vec!["SkelBindingAPI".into(), "MadeUpAPI".into()]),
            ))
            .unwrap();
        let schemas = meta.api_schemas.unwrap();
        assert_eq!(schemas.names.len(), 1);
        assert_eq!(st.warns.len(), 1);

        st.allow_unknown_api_schemas = false;
        let err = st
            .decode_prim_meta(&meta_entry(
                "apiSchemas",
                ListEditQual::Prepend,
                Value::TokenVec(vec!["MadeUpAPI".into()]),
            ))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownEnumToken { key: "apiSchemas", .. }));
    }

    #[test]
    fn decode_unknown_key_warns_only() {
        let mut st = state();
        let meta = st
            .decode_prim_meta(&meta_entry(
                "frobnicate",
                ListEditQual::ResetToExplicit,
                Value::Int64(7),
            ))
            .unwrap();
        assert_eq!(meta, PrimMeta::default());
        assert_eq!(st.warns.len(), 1);
    }

    #[test]
    fn decode_variants_requires_string_values() {
        let mut st = state();
        let mut dict = crate::sdf::Dictionary::new();
        dict.insert("lod".into(), Value::String("high".into()));
        let meta = st
            .decode_prim_meta(&meta_entry(
                "variants",
                ListEditQual::ResetToExplicit,
                Value::Dictionary(dict),
            ))
            .unwrap();
        assert_eq!(meta.variants.unwrap()["lod"], "high");

        let mut bad = crate::sdf::Dictionary::new();
        bad.insert("lod".into(), Value::Int64(3));
        let err = st
            .decode_prim_meta(&meta_entry(
                "variants",
                ListEditQual::ResetToExplicit,
                Value::Dictionary(bad),
            ))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidMetadataType { key: "variants", .. }));
    }

    #[test]
    fn playback_mode_closed_set() {
        let mut st = state();
        let raw = RawStageMetas {
            playback_mode: Some("loop".into()),
            ..Default::default()
        };
        assert_eq!(
            st.decode_stage_metas(&raw).unwrap().playback_mode,
            Some(PlaybackMode::Loop)
        );

        let bad = RawStageMetas {
            playback_mode: Some("bounce".into()),
            ..Default::default()
        };
        let err = st.decode_stage_metas(&bad).unwrap_err();
        assert!(matches!(err, Error::UnknownEnumToken { key: "playbackMode", .. }));
    }

    #[test]
    fn memory_budget_is_enforced() {
        let mut st = state();
        st.memory_budget = 16;
        assert!(st.charge_memory(8).is_ok());
        assert!(matches!(
            st.charge_memory(64),
            Err(Error::ResourceLimitExceeded(_))
        ));
    }

    #[test]
    fn duplicate_variant_child_detected() {
        // Two variants in one set both claiming node 1.
        let mut nodes = vec![PrimNode::default(), PrimNode::default()];
        nodes[0].children.push(1);
        nodes[1].parent = 0;
        nodes[1].parent_is_variant = true;
        let vn = |indices: Vec<i64>| VariantNode {
            prim_children: indices,
            ..Default::default()
        };
        let mut variants = BTreeMap::new();
        variants.insert("a".to_string(), vn(vec![1]));
        variants.insert("b".to_string(), vn(vec![1]));
        nodes[0].variant_node_map.insert("v".to_string(), variants);

        let mut visited = vec![false; nodes.len()];
        let err = construct_prim_tree(0, &nodes, &mut visited).unwrap_err();
        assert!(matches!(err, Error::DuplicateVariantChild(1)));
    }

    #[test]
    fn variant_child_not_duplicated_in_children() {
        let mut nodes = vec![PrimNode::default(), PrimNode::default()];
        nodes[0].prim.name = "A".into();
        nodes[0].children.push(1);
        nodes[1].prim.name = "C".into();
        nodes[1].parent = 0;
        nodes[1].parent_is_variant = true;
        let mut variants = BTreeMap::new();
        variants.insert(
            "a".to_string(),
            VariantNode {
                prim_children: vec![1],
                ..Default::default()
            },
        );
        nodes[0].variant_node_map.insert("v".to_string(), variants);

        let mut visited = vec![false; nodes.len()];
        let prim = construct_prim_tree(0, &nodes, &mut visited).unwrap();
        assert!(prim.children.is_empty());
        assert_eq!(prim.variant_sets["v"].variants["a"].children.len(), 1);
        assert!(visited.iter().all(|v| *v));
    }
}
