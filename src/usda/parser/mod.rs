//! Streaming USDA parser.
//!
//! The parser is push-based: it owns no scene state and reports structure
//! through registered callbacks as it goes. Prim indices are assigned when a
//! prim header is first seen (via the index-assign callback), and construct
//! callbacks fire bottom-up once a prim's body is complete, so a callback
//! always sees its children already reported.

mod error;
mod hierarchy;
mod metadata;
mod token_ops;
mod value;

use anyhow::Result;
use logos::Logos;
use std::collections::{BTreeMap, HashMap};
use std::iter::Peekable;
use std::ops::Range;

use crate::sdf::{Dictionary, ListEditQual, Path, PropertyMap, Specifier, SubLayer, Value};
use crate::usda::token::Token;

pub use error::SourceContext;
pub use value::types::Type;

/// Raw prim metadata as written: ordered `(key, (qualifier, value))` pairs.
/// Decoding into structured `PrimMeta` happens in the reader.
pub type PrimMetaMap = Vec<(String, (ListEditQual, Value))>;

/// Body of one variant inside a `variantSet` statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantContent {
    pub metas: PrimMetaMap,
    pub props: PropertyMap,
    /// Indices of prims declared inside this variant's braces. The prims
    /// themselves were already reported through the construct callback.
    pub prim_indices: Vec<i64>,
}

/// Variant sets in textual order: `(set name, [(variant name, content)])`.
pub type VariantSetList = Vec<(String, Vec<(String, VariantContent)>)>;

/// Everything the parser knows about one prim when its body completes.
#[derive(Debug, Clone, Default)]
pub struct PrimDecl {
    /// Absolute path of the prim, variant selections included.
    pub full_path: Path,
    pub specifier: Specifier,
    /// Declared type name; empty when the `def` has no type.
    pub type_name: String,
    /// Bare element name, as a path for validity queries.
    pub element_name: Path,
    pub prim_idx: i64,
    pub parent_prim_idx: i64,
    pub properties: PropertyMap,
    pub metas: PrimMetaMap,
    pub variants: VariantSetList,
}

/// Stage metadata as parsed from the pseudo-root block. Enum-like tokens
/// (`upAxis`, `playbackMode`) stay raw here; the reader validates them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawStageMetas {
    pub doc: Option<String>,
    pub comment: Option<String>,
    pub up_axis: Option<String>,
    pub sub_layers: Vec<SubLayer>,
    pub default_prim: Option<String>,
    pub meters_per_unit: Option<f64>,
    pub time_codes_per_second: Option<f64>,
    pub start_time_code: Option<f64>,
    pub end_time_code: Option<f64>,
    pub frames_per_second: Option<f64>,
    pub auto_play: Option<bool>,
    pub playback_mode: Option<String>,
    pub custom_layer_data: Dictionary,
    pub unregistered: BTreeMap<String, Value>,
}

/// Fires once, after the pseudo-root metadata block parses.
pub type StageMetaFn = Box<dyn FnMut(&RawStageMetas) -> Result<()>>;

/// Fires once per prim header; returns the index reserved for that prim.
pub type PrimIdxAssignFn = Box<dyn FnMut(i64) -> i64>;

/// Fires once per completed prim body (typed construct or untyped spec).
pub type PrimConstructFn = Box<dyn FnMut(PrimDecl) -> Result<()>>;

/// Parser-enforced limits and fallback switches.
#[derive(Debug, Clone)]
pub struct ParserOptions {
    /// Max prim nesting depth before a parse error.
    pub max_prim_nest_level: usize,
    /// Max metadata entries per prim.
    pub max_field_value_pairs: usize,
    /// Max bytes per token.
    pub max_token_length: usize,
    /// Max bytes per string value.
    pub max_string_length: usize,
    /// Max declared `elementSize` in attribute metadata.
    pub max_element_size: i64,
    /// Unknown prim type falls back to `Model` with a warning.
    pub allow_unknown_prims: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions {
            max_prim_nest_level: 256,
            max_field_value_pairs: 4096,
            max_token_length: 4096,
            max_string_length: 64 * 1024 * 1024,
            max_element_size: 512,
            allow_unknown_prims: true,
        }
    }
}

/// Parser translates a token stream into callback invocations.
pub struct Parser<'a> {
    iter: Peekable<logos::SpannedIter<'a, Token<'a>>>,
    source: &'a str,
    last_span: Option<Range<usize>>,
    options: ParserOptions,
    warnings: Vec<String>,

    stage_meta_fn: Option<StageMetaFn>,
    prim_idx_fn: Option<PrimIdxAssignFn>,
    construct_fns: HashMap<String, PrimConstructFn>,
    prim_spec_fn: Option<PrimConstructFn>,
}

impl<'a> Parser<'a> {
    /// Create a new parser from source text.
    pub fn new(data: &'a str, options: ParserOptions) -> Self {
        Self {
            iter: Token::lexer(data).spanned().peekable(),
            source: data,
            last_span: None,
            options,
            warnings: Vec::new(),
            stage_meta_fn: None,
            prim_idx_fn: None,
            construct_fns: HashMap::new(),
            prim_spec_fn: None,
        }
    }

    /// Register the callback that receives the pseudo-root metadata.
    pub fn register_stage_meta_fn(&mut self, f: StageMetaFn) {
        self.stage_meta_fn = Some(f);
    }

    /// Register the prim index allocator.
    pub fn register_prim_idx_assign_fn(&mut self, f: PrimIdxAssignFn) {
        self.prim_idx_fn = Some(f);
    }

    /// Register a typed construct callback for one prim type name.
    pub fn register_prim_construct_fn(&mut self, type_name: &str, f: PrimConstructFn) {
        self.construct_fns.insert(type_name.to_string(), f);
    }

    /// Register the untyped prim-spec callback. When present it takes
    /// precedence over every typed callback (layer-mode loads).
    pub fn register_prim_spec_fn(&mut self, f: PrimConstructFn) {
        self.prim_spec_fn = Some(f);
    }

    /// Run the parse: header, pseudo-root metadata, then every root prim.
    /// The first callback failure aborts the parse.
    pub fn parse(&mut self) -> Result<()> {
        let metas = self.read_pseudo_root()?;
        if let Some(f) = self.stage_meta_fn.as_mut() {
            f(&metas)?;
        }

        while self.peek_next().is_some() {
            self.read_prim(-1, 0, &Path::abs_root())?;
        }

        Ok(())
    }

    /// Warnings accumulated during the parse (unknown prim types, ...).
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    /// Source context for the most recent token span the parser consumed.
    pub fn source_context(&self) -> Option<SourceContext> {
        self.last_span
            .clone()
            .and_then(|span| SourceContext::from_span(self.source, span))
    }

    pub(super) fn push_warning(&mut self, message: String) {
        self.warnings.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_array() {
        let mut parser = Parser::new("[]", ParserOptions::default());
        let array = parser.parse_array::<u32>().unwrap();
        assert!(array.is_empty());
    }

    #[test]
    fn parse_tuple() {
        let mut parser = Parser::new("(1, 2, 3)", ParserOptions::default());
        let result = parser.parse_tuple::<u32, 3>().unwrap();
        assert_eq!(result, [1_u32, 2, 3]);
    }

    #[test]
    fn parse_array_of_tuples() {
        let mut parser = Parser::new("[(1, 2), (3, 4)]", ParserOptions::default());
        let result = parser.parse_array_of_tuples::<u32, 2>().unwrap();
        assert_eq!(result, vec![1_u32, 2, 3, 4]);
    }

    #[test]
    fn parse_pseudo_root() {
        let mut parser = Parser::new(
            r#"
            #usda 1.0
            (
                doc = """test string"""

                upAxis = "Y"
                metersPerUnit = 0.01

                defaultPrim = "World"
            )
            "#,
            ParserOptions::default(),
        );

        let metas = parser.read_pseudo_root().unwrap();
        assert_eq!(metas.doc.as_deref(), Some("test string"));
        assert_eq!(metas.up_axis.as_deref(), Some("Y"));
        assert_eq!(metas.meters_per_unit, Some(0.01));
        assert_eq!(metas.default_prim.as_deref(), Some("World"));
    }

    #[test]
    fn parse_pseudo_root_with_sublayers() {
        let mut parser = Parser::new(
            r#"
            #usda 1.0
            (
                subLayers = [
                    @./a.usda@,
                    @./b.usda@ (offset = 10; scale = 2)
                ]
            )
            "#,
            ParserOptions::default(),
        );

        let metas = parser.read_pseudo_root().unwrap();
        assert_eq!(metas.sub_layers.len(), 2);
        assert_eq!(metas.sub_layers[0].asset_path, "./a.usda");
        assert!(metas.sub_layers[0].layer_offset.is_identity());
        assert_eq!(metas.sub_layers[1].layer_offset.offset, 10.0);
        assert_eq!(metas.sub_layers[1].layer_offset.scale, 2.0);
    }

    #[test]
    fn parse_custom_layer_data_dictionary() {
        let mut parser = Parser::new(
            r#"
#usda 1.0
(
    customLayerData = {
        dictionary renderSettings = {
            bool "rtx:raytracing:fractionalCutoutOpacity" = 1
            token "rtx:rendermode" = "PathTracing"
        }
    }
)
"#,
            ParserOptions::default(),
        );

        let metas = parser.read_pseudo_root().unwrap();
        let render_settings = match metas.custom_layer_data.get("renderSettings") {
            Some(Value::Dictionary(d)) => d,
            other => panic!("renderSettings parsed as unexpected value: {other:?}"),
        };
        assert!(render_settings.contains_key("rtx:raytracing:fractionalCutoutOpacity"));
        assert!(render_settings.contains_key("rtx:rendermode"));
    }
}
