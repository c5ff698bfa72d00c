use anyhow::{anyhow, bail, Context, Result};

use crate::sdf::{AttrMeta, Dictionary, ListEditQual, Path, Reference, Value};
use crate::usda::token::{keyword_lexeme, Token};

use super::value::types::{is_type_hint_name, parse_data_type};
use super::PrimMetaMap;

/// Metadata and dictionary parsing functions.
///
/// Prim metadata is collected raw: the parser preserves syntax shapes
/// (references, paths, dictionaries, scalars) and the list-edit qualifier
/// per key; the reader is responsible for the per-key type contracts.
impl<'a> super::Parser<'a> {
    /// Parse a prim metadata block. The opening `(` must already be
    /// consumed; parsing stops after the matching `)`.
    pub(super) fn read_prim_metadata(&mut self) -> Result<PrimMetaMap> {
        let mut metas = PrimMetaMap::new();

        loop {
            if self.is_next(Token::Punctuation(')')) {
                self.fetch_next()?;
                break;
            }

            if metas.len() >= self.options.max_field_value_pairs {
                return Err(crate::Error::ResourceLimitExceeded(format!(
                    "prim metadata exceeds {} entries",
                    self.options.max_field_value_pairs
                ))
                .into());
            }

            let token = self.fetch_next()?;

            // A bare string in the metadata block is the prim comment.
            if let Some(text) = token.try_as_string() {
                metas.push((
                    "comment".to_string(),
                    (ListEditQual::ResetToExplicit, Value::String(text.to_owned())),
                ));
                continue;
            }

            let (qual, name_token) = match token {
                Token::Add => (ListEditQual::Add, self.fetch_next()?),
                Token::Append => (ListEditQual::Append, self.fetch_next()?),
                Token::Delete => (ListEditQual::Delete, self.fetch_next()?),
                Token::Prepend => (ListEditQual::Prepend, self.fetch_next()?),
                Token::Reorder => (ListEditQual::Order, self.fetch_next()?),
                other => (ListEditQual::ResetToExplicit, other),
            };

            let name = match name_token {
                Token::Identifier(s) | Token::NamespacedIdentifier(s) => s.to_owned(),
                other => keyword_lexeme(&other)
                    .map(str::to_owned)
                    .ok_or_else(|| anyhow!("Unexpected metadata name token: {other:?}"))?,
            };

            self.ensure_pun('=')?;
            let value = self
                .parse_meta_value()
                .with_context(|| format!("Unable to parse metadata value for {name}"))?;

            metas.push((name, (qual, value)));

            if self.is_next(Token::Punctuation(',')) {
                self.fetch_next()?;
            }
        }

        Ok(metas)
    }

    /// Parse a single metadata value by syntax shape.
    pub(super) fn parse_meta_value(&mut self) -> Result<Value> {
        if self.is_next(Token::Punctuation('[')) {
            return self.parse_meta_array();
        }
        if self.is_next(Token::Punctuation('{')) {
            return self.parse_dictionary();
        }

        let token = self.fetch_next()?;
        match token {
            Token::None => Ok(Value::Block),
            Token::String(value) => Ok(Value::String(value.to_owned())),
            Token::Identifier("true") => Ok(Value::Bool(true)),
            Token::Identifier("false") => Ok(Value::Bool(false)),
            Token::Identifier(value) | Token::NamespacedIdentifier(value) => Ok(Value::Token(value.to_owned())),
            Token::Number(raw) => {
                if let Ok(int) = raw.parse::<i64>() {
                    Ok(Value::Int64(int))
                } else if let Ok(float) = raw.parse::<f64>() {
                    Ok(Value::Double(float))
                } else {
                    bail!("Unable to parse numeric metadata value: {raw}");
                }
            }
            Token::PathRef(path) => Ok(Value::Path(Path::new(path)?)),
            Token::AssetRef(asset) => Ok(Value::Reference(self.finish_reference(asset)?)),
            other => bail!("Unsupported metadata value token: {other:?}"),
        }
    }

    /// Parse a bracketed metadata list; the element shape is decided by the
    /// first element's token.
    fn parse_meta_array(&mut self) -> Result<Value> {
        enum Shape {
            Unknown,
            References(Vec<Reference>),
            Paths(Vec<Path>),
            Strings(Vec<String>),
            Tokens(Vec<String>),
        }
        let mut shape = Shape::Unknown;

        self.parse_list(|this| {
            let token = this.fetch_next()?;
            match (&mut shape, token) {
                (Shape::Unknown, Token::AssetRef(asset)) => {
                    shape = Shape::References(vec![this.finish_reference(asset)?]);
                }
                (Shape::References(refs), Token::AssetRef(asset)) => {
                    refs.push(this.finish_reference(asset)?);
                }
                (Shape::Unknown, Token::PathRef(p)) => {
                    shape = Shape::Paths(vec![Path::new(p)?]);
                }
                (Shape::Paths(paths), Token::PathRef(p)) => {
                    paths.push(Path::new(p)?);
                }
                (Shape::Unknown, Token::String(s)) => {
                    shape = Shape::Strings(vec![s.to_owned()]);
                }
                (Shape::Strings(strings), Token::String(s)) => {
                    strings.push(s.to_owned());
                }
                (Shape::Unknown, Token::Identifier(s) | Token::NamespacedIdentifier(s) | Token::Number(s)) => {
                    shape = Shape::Tokens(vec![s.to_owned()]);
                }
                (Shape::Tokens(tokens), Token::Identifier(s) | Token::NamespacedIdentifier(s) | Token::Number(s)) => {
                    tokens.push(s.to_owned());
                }
                (_, other) => bail!("Mixed or unsupported metadata array element: {other:?}"),
            }
            Ok(())
        })?;

        Ok(match shape {
            Shape::Unknown => Value::StringVec(Vec::new()),
            Shape::References(refs) => Value::ReferenceVec(refs),
            Shape::Paths(paths) => Value::PathVec(paths),
            Shape::Strings(strings) => Value::StringVec(strings),
            Shape::Tokens(tokens) => Value::TokenVec(tokens),
        })
    }

    /// Finish a reference whose `@asset@` token was just consumed: optional
    /// `<primPath>` target and optional `(offset = ...)` block.
    pub(super) fn finish_reference(&mut self, asset_path: &str) -> Result<Reference> {
        let mut reference = Reference {
            asset_path: asset_path.to_string(),
            ..Default::default()
        };

        if matches!(self.peek_next(), Some(Ok(Token::PathRef(..)))) {
            let path = self
                .fetch_next()?
                .try_as_path_ref()
                .ok_or_else(|| anyhow!("Path reference expected"))?;
            reference.prim_path = Path::new(path)?;
        }

        if self.is_next(Token::Punctuation('(')) {
            reference.layer_offset = self
                .parse_layer_offset()
                .context("Unable to parse reference layer offset")?;
        }

        Ok(reference)
    }

    /// Parse a dictionary value from `{` to `}`.
    pub(super) fn parse_dictionary(&mut self) -> Result<Value> {
        self.ensure_pun('{').context("Dictionary must start with {")?;

        let mut dict = Dictionary::new();

        loop {
            if self.is_next(Token::Punctuation('}')) {
                self.fetch_next()?;
                break;
            }

            let first_token = self.fetch_next()?;

            // Entries may carry a type hint: `bool flag = 1`, `dictionary d = {...}`.
            let (type_hint, key_token) = match first_token {
                Token::Identifier(name) if is_type_hint_name(name) => (Some(first_token), self.fetch_next()?),
                Token::Dictionary => (Some(first_token), self.fetch_next()?),
                _ => (None, first_token),
            };

            let key = match key_token {
                Token::Identifier(s) | Token::NamespacedIdentifier(s) | Token::String(s) => s.to_owned(),
                other => keyword_lexeme(&other)
                    .map(str::to_owned)
                    .ok_or_else(|| anyhow!("Expected identifier as dictionary key, got: {other:?}"))?,
            };

            self.ensure_pun('=')?;

            let value = match type_hint {
                Some(Token::Dictionary) => self.parse_dictionary()?,
                Some(Token::Identifier(type_name)) => {
                    let ty = parse_data_type(type_name)
                        .with_context(|| format!("Unable to parse dictionary value type {type_name}"))?;
                    self.parse_value(ty)?
                }
                _ => self.parse_meta_value()?,
            };
            dict.insert(key, value);

            if self.is_next(Token::Punctuation(',')) {
                self.fetch_next()?;
            }
        }

        Ok(Value::Dictionary(dict))
    }

    /// Parse the metadata block attached to a property. The opening `(` is
    /// consumed here; entries are kept raw except `elementSize`, which is
    /// bounds-checked against the parser limit.
    pub(super) fn parse_property_metadata(&mut self) -> Result<AttrMeta> {
        self.ensure_pun('(')?;

        let mut meta = AttrMeta::new();

        loop {
            if self.is_next(Token::Punctuation(')')) {
                self.fetch_next()?;
                break;
            }

            let name_token = self.fetch_next()?;

            if let Some(text) = name_token.try_as_string() {
                meta.insert("comment".to_string(), Value::String(text.to_owned()));
                continue;
            }

            let name = match name_token {
                Token::Identifier(s) | Token::NamespacedIdentifier(s) => s.to_owned(),
                other => keyword_lexeme(&other)
                    .map(str::to_owned)
                    .ok_or_else(|| anyhow!("Unexpected attribute metadata name token: {other:?}"))?,
            };

            self.ensure_pun('=')?;
            let value = self
                .parse_meta_value()
                .with_context(|| format!("Unable to parse attribute metadata value for {name}"))?;

            if name == "elementSize" {
                let element_size = match &value {
                    Value::Int64(v) => *v,
                    other => bail!("elementSize must be an integer, got {}", other.type_name()),
                };
                if element_size <= 0 || element_size > self.options.max_element_size {
                    return Err(crate::Error::ResourceLimitExceeded(format!(
                        "elementSize {element_size} is outside (0, {}]",
                        self.options.max_element_size
                    ))
                    .into());
                }
            }

            meta.insert(name, value);

            if self.is_next(Token::Punctuation(',')) {
                self.fetch_next()?;
            }
        }

        Ok(meta)
    }
}
