use anyhow::{anyhow, bail, ensure, Context, Result};

use crate::sdf::{
    Attribute, ListEditQual, Path, Property, PropertyMap, Relationship, Specifier, TimeSampleMap,
    Variability,
};
use crate::usda::token::{keyword_lexeme, Token};

use super::value::types::parse_data_type;
use super::{PrimDecl, PrimMetaMap, RawStageMetas, VariantContent, VariantSetList};

/// Hierarchy parsing: pseudo-root, prims, properties and variant sets.
impl<'a> super::Parser<'a> {
    /// Parse the file header and pseudo-root block into raw stage metadata.
    pub(super) fn read_pseudo_root(&mut self) -> Result<RawStageMetas> {
        let version = self
            .fetch_next()?
            .try_as_magic()
            .ok_or_else(|| anyhow!("Text file must start with magic token, got {:?}", self.peek_next()))?
            .to_string();
        ensure!(version == "1.0", "File must start with '#usda 1.0', got: {version:?}");

        let mut metas = RawStageMetas::default();

        if !self.is_next(Token::Punctuation('(')) {
            return Ok(metas);
        }

        self.ensure_pun('(')?;

        loop {
            let next = self.fetch_next().context("Unable to fetch next pseudo root property")?;

            match next {
                Token::Punctuation(')') => break,
                // A bare string is the layer comment.
                Token::String(text) => {
                    metas.comment = Some(text.to_owned());
                }
                Token::Doc => {
                    self.ensure_pun('=')?;
                    metas.doc = Some(self.fetch_str()?.to_owned());
                }
                Token::SubLayers => {
                    self.ensure_pun('=')?;
                    metas.sub_layers = self.parse_sublayers().context("Unable to parse subLayers")?;
                }
                Token::Identifier(name) => {
                    self.ensure_pun('=')?;
                    match name {
                        "defaultPrim" => metas.default_prim = Some(self.fetch_str()?.to_owned()),
                        "upAxis" => metas.up_axis = Some(self.fetch_str_or_ident()?),
                        "playbackMode" => metas.playback_mode = Some(self.fetch_str_or_ident()?),
                        "metersPerUnit" => metas.meters_per_unit = Some(self.parse_token()?),
                        "timeCodesPerSecond" => metas.time_codes_per_second = Some(self.parse_token()?),
                        "startTimeCode" => metas.start_time_code = Some(self.parse_token()?),
                        "endTimeCode" => metas.end_time_code = Some(self.parse_token()?),
                        "framesPerSecond" => metas.frames_per_second = Some(self.parse_token()?),
                        "autoPlay" => metas.auto_play = Some(self.parse_bool()?),
                        "comment" => metas.comment = Some(self.fetch_str()?.to_owned()),
                        "customLayerData" => {
                            let value = self
                                .parse_dictionary()
                                .context("Unable to parse customLayerData dictionary")?;
                            if let crate::sdf::Value::Dictionary(dict) = value {
                                metas.custom_layer_data = dict;
                            }
                        }
                        other => {
                            let value = self
                                .parse_meta_value()
                                .with_context(|| format!("Unable to parse pseudo root metadata value for {other}"))?;
                            metas.unregistered.insert(other.to_owned(), value);
                        }
                    }
                }
                _ => bail!("Unexpected token {next:?} in pseudo root block"),
            }
        }

        Ok(metas)
    }

    /// Parse one prim declaration, recursing through its body, then report
    /// it through the matching callback. Returns the assigned prim index.
    ///
    /// The index is requested as soon as the header is read, before the
    /// body parses, so nested prims can name their parent slot; the
    /// construct callback fires only after the body completes (bottom-up).
    pub(super) fn read_prim(&mut self, parent_idx: i64, depth: usize, parent_path: &Path) -> Result<i64> {
        if depth >= self.options.max_prim_nest_level {
            return Err(crate::Error::ResourceLimitExceeded(format!(
                "prim nesting exceeds {} levels",
                self.options.max_prim_nest_level
            ))
            .into());
        }

        let specifier = {
            let token = self.fetch_next().context("Unable to read prim specifier")?;
            match token {
                Token::Def => Specifier::Def,
                Token::Over => Specifier::Over,
                Token::Class => Specifier::Class,
                _ => bail!("Unexpected prim specifier: {token:?}"),
            }
        };

        // Optional type name (valid for def, over, and class).
        let mut name_token = self.fetch_next()?;
        let mut type_name = String::new();
        if let Some(prim_type) = name_token.try_as_identifier() {
            type_name = prim_type.to_string();
            name_token = self.fetch_next()?;
        }

        let name = name_token
            .try_as_string()
            .ok_or_else(|| anyhow!("Unexpected token {name_token:?} (want prim name string)"))?
            .to_string();

        // Name validation is the construct callback's job; keep going with
        // a lenient path so the reader can report InvalidName itself.
        let prim_path = parent_path
            .append_path(&name)
            .unwrap_or_else(|_| Path::from_element(&name));

        let prim_idx = match self.prim_idx_fn.as_mut() {
            Some(f) => f(parent_idx),
            None => -1,
        };

        let metas = if self.is_next(Token::Punctuation('(')) {
            self.fetch_next()?;
            self.read_prim_metadata().context("Unable to parse prim metadata")?
        } else {
            PrimMetaMap::new()
        };

        self.ensure_pun('{')?;

        let mut properties = PropertyMap::new();
        let mut variants: VariantSetList = Vec::new();
        self.read_prim_body(prim_idx, depth, &prim_path, &mut properties, &mut variants)?;

        let decl = PrimDecl {
            full_path: prim_path,
            specifier,
            type_name,
            element_name: Path::from_element(&name),
            prim_idx,
            parent_prim_idx: parent_idx,
            properties,
            metas,
            variants,
        };
        self.dispatch_prim(decl)?;

        Ok(prim_idx)
    }

    /// Parse statements until the closing `}` of a prim body.
    fn read_prim_body(
        &mut self,
        prim_idx: i64,
        depth: usize,
        prim_path: &Path,
        properties: &mut PropertyMap,
        variants: &mut VariantSetList,
    ) -> Result<()> {
        loop {
            let next = self
                .peek_next()
                .context("Unexpected end of prim body")?
                .as_ref()
                .map_err(|e| anyhow!("{e:?}"))?;

            match next {
                Token::Punctuation('}') => {
                    self.fetch_next()?;
                    break;
                }
                Token::Def | Token::Over | Token::Class => {
                    self.read_prim(prim_idx, depth + 1, prim_path)
                        .context("Unable to read nested prim")?;
                }
                Token::VariantSet => {
                    self.fetch_next()?;
                    let set = self
                        .read_variant_set(prim_idx, depth, prim_path)
                        .context("Unable to read variant set")?;
                    variants.push(set);
                }
                Token::Rel => {
                    self.fetch_next()?;
                    self.read_relationship(properties, None)
                        .context("Unable to read relationship")?;
                }
                // List ops may prefix relationships or attributes.
                Token::Add | Token::Append | Token::Delete | Token::Prepend | Token::Reorder => {
                    let qual = match self.fetch_next()? {
                        Token::Add => ListEditQual::Add,
                        Token::Append => ListEditQual::Append,
                        Token::Delete => ListEditQual::Delete,
                        Token::Prepend => ListEditQual::Prepend,
                        _ => ListEditQual::Order,
                    };
                    if self.is_next(Token::Rel) {
                        self.fetch_next()?;
                        self.read_relationship(properties, Some(qual))
                            .context("Unable to read relationship")?;
                    } else {
                        self.read_attribute(properties)
                            .context("Unable to read attribute")?;
                    }
                }
                _ => {
                    self.read_attribute(properties)
                        .context("Unable to read attribute")?;
                }
            }
        }

        Ok(())
    }

    /// Route a completed prim to the right callback: the untyped prim-spec
    /// callback when registered (layer loads), else the typed callback for
    /// its type name, else the `Model` fallback when unknown prim types are
    /// allowed.
    fn dispatch_prim(&mut self, decl: PrimDecl) -> Result<()> {
        if let Some(f) = self.prim_spec_fn.as_mut() {
            return f(decl);
        }

        let key = if decl.type_name.is_empty() {
            "Model"
        } else {
            decl.type_name.as_str()
        };

        if let Some(f) = self.construct_fns.get_mut(key) {
            return f(decl);
        }

        if self.options.allow_unknown_prims {
            self.push_warning(format!(
                "unknown prim type `{}` at {}; reading as Model",
                decl.type_name, decl.full_path
            ));
            if let Some(f) = self.construct_fns.get_mut("Model") {
                return f(decl);
            }
        }

        Err(crate::Error::UnknownPrimType(decl.type_name).into())
    }

    /// Parse a `variantSet "name" = { "variant" (metas) { ... } ... }`
    /// statement. Prims inside a variant are reported through the normal
    /// callback path with the owning prim as parent; their indices are
    /// recorded on the variant so the reader can splice them later.
    fn read_variant_set(
        &mut self,
        owner_idx: i64,
        depth: usize,
        owner_path: &Path,
    ) -> Result<(String, Vec<(String, VariantContent)>)> {
        let name_token = self.fetch_next()?;
        let set_name = name_token
            .try_as_string()
            .ok_or_else(|| anyhow!("Expected variant set name string, got {name_token:?}"))?
            .to_string();

        self.ensure_pun('=').context("Expected '=' after variant set name")?;
        self.ensure_pun('{').context("Expected '{' to start variant set block")?;

        let mut variants = Vec::new();

        loop {
            if self.is_next(Token::Punctuation('}')) {
                self.fetch_next()?;
                break;
            }

            let variant_token = self.fetch_next()?;
            let variant_name = variant_token
                .try_as_string()
                .ok_or_else(|| anyhow!("Expected variant name string, got {variant_token:?}"))?
                .to_string();

            let variant_path = owner_path.append_variant_selection(&set_name, &variant_name)?;

            let mut content = VariantContent::default();

            if self.is_next(Token::Punctuation('(')) {
                self.fetch_next()?;
                content.metas = self
                    .read_prim_metadata()
                    .context("Unable to parse variant metadata")?;
            }

            self.ensure_pun('{').context("Expected '{' to start variant body")?;

            loop {
                let next = self
                    .peek_next()
                    .context("Unexpected end of variant body")?
                    .as_ref()
                    .map_err(|e| anyhow!("{e:?}"))?;

                match next {
                    Token::Punctuation('}') => {
                        self.fetch_next()?;
                        break;
                    }
                    Token::Def | Token::Over | Token::Class => {
                        let child_idx = self
                            .read_prim(owner_idx, depth + 1, &variant_path)
                            .context("Unable to read nested prim in variant")?;
                        content.prim_indices.push(child_idx);
                    }
                    Token::VariantSet => {
                        bail!(
                            "variantSet statement nested directly inside variant {set_name:?} is not supported; wrap it in a prim"
                        );
                    }
                    Token::Rel => {
                        self.fetch_next()?;
                        self.read_relationship(&mut content.props, None)
                            .context("Unable to read relationship in variant")?;
                    }
                    Token::Add | Token::Append | Token::Delete | Token::Prepend | Token::Reorder => {
                        let qual = match self.fetch_next()? {
                            Token::Add => ListEditQual::Add,
                            Token::Append => ListEditQual::Append,
                            Token::Delete => ListEditQual::Delete,
                            Token::Prepend => ListEditQual::Prepend,
                            _ => ListEditQual::Order,
                        };
                        if self.is_next(Token::Rel) {
                            self.fetch_next()?;
                            self.read_relationship(&mut content.props, Some(qual))
                                .context("Unable to read relationship in variant")?;
                        } else {
                            self.read_attribute(&mut content.props)
                                .context("Unable to read attribute in variant")?;
                        }
                    }
                    _ => {
                        self.read_attribute(&mut content.props)
                            .context("Unable to read attribute in variant")?;
                    }
                }
            }

            variants.push((variant_name, content));
        }

        Ok((set_name, variants))
    }

    /// Parse an attribute declaration: variability and custom markers, the
    /// declared type, the name (possibly `.connect` or `.timeSamples`
    /// suffixed), optional metadata, and the optional default value.
    fn read_attribute(&mut self, properties: &mut PropertyMap) -> Result<()> {
        let mut custom = false;
        let mut variability = Variability::Varying;

        if self.is_next(Token::Custom) {
            custom = true;
            self.fetch_next()?;
        }

        if self.is_next(Token::Varying) {
            self.fetch_next()?;
        } else if self.is_next(Token::Uniform) {
            variability = Variability::Uniform;
            self.fetch_next()?;
        }

        let type_token = self.fetch_next()?;
        let type_name = match type_token {
            Token::Identifier(s) | Token::NamespacedIdentifier(s) => s,
            other => bail!("Unexpected token for attribute type, expected identifier, got {other:?}"),
        };
        let data_type = parse_data_type(type_name)?;

        let name_token = self.fetch_next()?;
        let name = match name_token {
            Token::Identifier(s) | Token::NamespacedIdentifier(s) => s,
            _ => keyword_lexeme(&name_token)
                .ok_or_else(|| anyhow!("Unexpected token for attribute name: {name_token:?}"))?,
        };

        let mut meta = if self.is_next(Token::Punctuation('(')) {
            self.parse_property_metadata()
                .context("Unable to parse attribute metadata")?
        } else {
            Default::default()
        };

        // `.connect` declarations attach connection targets to the base
        // attribute rather than declaring a separate property.
        if let Some(base) = name.strip_suffix(".connect") {
            let mut connections = Vec::new();
            if self.is_next(Token::Punctuation('=')) {
                self.fetch_next()?;
                // A list-edit keyword may prefix the target list; the
                // targets themselves are what the reader keeps.
                if matches!(
                    self.peek_next(),
                    Some(Ok(Token::Add | Token::Append | Token::Prepend | Token::Delete | Token::Reorder))
                ) {
                    self.fetch_next()?;
                }
                connections = self
                    .parse_connection_targets()
                    .context("Unable to parse connection targets")?;
            }

            match properties.get_mut(base) {
                Some(Property::Attribute(attr)) => {
                    attr.connections.extend(connections);
                }
                _ => {
                    properties.insert(
                        base.to_string(),
                        Property::Attribute(Attribute {
                            type_name: type_name.to_string(),
                            variability,
                            custom,
                            value: None,
                            time_samples: None,
                            connections,
                            meta,
                        }),
                    );
                }
            }
            return Ok(());
        }

        // `.timeSamples` declarations attach samples to the base attribute.
        if let Some(base) = name.strip_suffix(".timeSamples") {
            self.ensure_pun('=')?;
            let samples = self
                .parse_time_samples(data_type)
                .context("Unable to parse time samples")?;

            match properties.get_mut(base) {
                Some(Property::Attribute(attr)) => {
                    attr.time_samples = Some(samples);
                }
                _ => {
                    properties.insert(
                        base.to_string(),
                        Property::Attribute(Attribute {
                            type_name: type_name.to_string(),
                            variability,
                            custom,
                            value: None,
                            time_samples: Some(samples),
                            connections: Vec::new(),
                            meta,
                        }),
                    );
                }
            }
            return Ok(());
        }

        let value = if self.is_next(Token::Punctuation('=')) {
            self.fetch_next()?;
            Some(self.parse_value(data_type)?)
        } else {
            None
        };

        // Metadata may also trail the value.
        if self.is_next(Token::Punctuation('(')) {
            let trailing = self
                .parse_property_metadata()
                .context("Unable to parse attribute metadata")?;
            meta.extend(trailing);
        }

        properties.insert(
            name.to_string(),
            Property::Attribute(Attribute {
                type_name: type_name.to_string(),
                variability,
                custom,
                value,
                time_samples: None,
                connections: Vec::new(),
                meta,
            }),
        );

        Ok(())
    }

    /// Parse a relationship declaration with optional targets and metadata.
    fn read_relationship(
        &mut self,
        properties: &mut PropertyMap,
        list_edit: Option<ListEditQual>,
    ) -> Result<()> {
        let mut custom = false;
        if self.is_next(Token::Custom) {
            custom = true;
            self.fetch_next()?;
        }

        let name_token = self.fetch_next()?;
        let name = match name_token {
            Token::Identifier(s) | Token::NamespacedIdentifier(s) => s,
            other => bail!("Unexpected token in relationship declaration: {other:?}"),
        };

        let mut meta = if self.is_next(Token::Punctuation('(')) {
            self.parse_property_metadata()
                .context("Unable to parse relationship metadata")?
        } else {
            Default::default()
        };

        let mut targets = Vec::new();
        if self.is_next(Token::Punctuation('=')) {
            self.fetch_next()?;
            targets = self
                .parse_connection_targets()
                .context("Unable to parse relationship targets")?;

            if self.is_next(Token::Punctuation('(')) {
                let trailing = self
                    .parse_property_metadata()
                    .context("Unable to parse relationship metadata")?;
                meta.extend(trailing);
            }
        } else if list_edit.is_some() {
            bail!("List-edited relationship `{name}` must have a target list");
        }

        properties.insert(
            name.to_string(),
            Property::Relationship(Relationship {
                targets,
                list_edit: list_edit.unwrap_or_default(),
                custom,
                meta,
            }),
        );

        Ok(())
    }

    /// Parses a connection/relationship target list into paths.
    ///
    /// Handles `None` (empty), a single `<path>`, or `[<path>, ...]`.
    fn parse_connection_targets(&mut self) -> Result<Vec<Path>> {
        if self.is_next(Token::None) {
            self.fetch_next()?;
            return Ok(Vec::new());
        }

        if self.is_next(Token::Punctuation('[')) {
            let mut paths = Vec::new();
            self.parse_list(|this| {
                paths.push(this.parse_path_reference().context("Connection path expected")?);
                Ok(())
            })?;
            Ok(paths)
        } else {
            Ok(vec![self.parse_path_reference()?])
        }
    }

    /// Parses a single `<...>` path reference token.
    fn parse_path_reference(&mut self) -> Result<Path> {
        let token = self.fetch_next()?;
        let path_str = token
            .try_as_path_ref()
            .ok_or_else(|| anyhow!("Path reference expected, got {token:?}"))?;
        Path::new(path_str)
    }

    /// Parse time samples in the format `{ time: value, time: value, ... }`.
    ///
    /// Example:
    /// ```text
    /// double3 xformOp:translate.timeSamples = {
    ///     0: (0, 0, 0),
    ///     100: (100, 0, 0),
    /// }
    /// ```
    fn parse_time_samples(&mut self, data_type: super::Type) -> Result<TimeSampleMap> {
        self.ensure_pun('{').context("Time samples must start with {")?;

        let mut samples = Vec::new();

        loop {
            if self.is_next(Token::Punctuation('}')) {
                self.fetch_next()?;
                break;
            }

            let time_token = self.fetch_next()?;
            let time = match time_token {
                Token::Number(n) => n
                    .parse::<f64>()
                    .with_context(|| format!("Unable to parse time sample time: {n}"))?,
                other => bail!("Expected number for time sample time, got: {other:?}"),
            };

            self.ensure_pun(':').context("Expected ':' after time in time sample")?;

            let value = self.parse_value(data_type)?;
            samples.push((time, value));

            if self.is_next(Token::Punctuation(',')) {
                self.fetch_next()?;
            }
        }

        Ok(samples)
    }
}
