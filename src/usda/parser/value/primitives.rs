use anyhow::{anyhow, bail, ensure, Context, Result};
use std::{any::type_name, str::FromStr};

use crate::sdf::{LayerOffset, SubLayer};
use crate::usda::token::Token;

/// Primitive value parsing functions.
impl<'a> super::super::Parser<'a> {
    /// Parse single token as `T` which can be deserialized from string (such as `int`, `float`, etc).
    pub(in crate::usda::parser) fn parse_token<T: FromStr>(&mut self) -> Result<T>
    where
        <T as FromStr>::Err: std::fmt::Debug,
    {
        let token = self.fetch_next()?;
        let value_str = match token {
            Token::Number(s) | Token::Identifier(s) | Token::String(s) | Token::NamespacedIdentifier(s) => s,
            Token::Inf => "inf",
            Token::Punctuation('-') => {
                let next = self.fetch_next()?;
                if matches!(next, Token::Inf) {
                    "-inf"
                } else {
                    bail!("Expected number after '-', got {next:?}")
                }
            }
            Token::Punctuation('+') => {
                let next = self.fetch_next()?;
                if matches!(next, Token::Inf) {
                    "inf"
                } else {
                    bail!("Expected number after '+', got {next:?}")
                }
            }
            _ => bail!("Expected a number, identifier, or string, got {token:?}"),
        };
        let value = T::from_str(value_str)
            .map_err(|err| anyhow!("Failed to parse {} from '{}': {:?}", type_name::<T>(), value_str, err))?;

        Ok(value)
    }

    /// Parse USD's flexible boolean literal forms (identifiers, numeric, or string).
    pub(in crate::usda::parser) fn parse_bool(&mut self) -> Result<bool> {
        let token = self.fetch_next()?;
        match token {
            Token::Identifier(value) | Token::NamespacedIdentifier(value) => match value {
                "true" => Ok(true),
                "false" => Ok(false),
                other => bail!("Unexpected identifier for bool literal: {other}"),
            },
            Token::Number(value) => {
                let parsed = value.parse::<f64>().context("Unable to parse numeric bool")?;
                if parsed == 0.0 {
                    Ok(false)
                } else if parsed == 1.0 {
                    Ok(true)
                } else {
                    bail!("Numeric bool literals must be 0 or 1, got {value}");
                }
            }
            Token::String(value) => match value {
                "true" => Ok(true),
                "false" => Ok(false),
                other => bail!("Unexpected string for bool literal: {other}"),
            },
            other => bail!("Unexpected token for bool literal: {other:?}"),
        }
    }

    /// Parse an array of booleans, reusing the permissive literal parsing rules.
    pub(in crate::usda::parser) fn parse_bool_array(&mut self) -> Result<Vec<bool>> {
        let mut out = Vec::new();
        self.parse_list(|this| {
            out.push(this.parse_bool()?);
            Ok(())
        })?;
        Ok(out)
    }

    /// Parse an asset path reference.
    pub(in crate::usda::parser) fn parse_asset_path(&mut self) -> Result<String> {
        let token = self.fetch_next()?;
        token
            .try_as_asset_ref()
            .map(|value| value.to_owned())
            .ok_or_else(|| anyhow!("Asset reference expected"))
    }

    /// Parse an array of asset paths.
    pub(in crate::usda::parser) fn parse_asset_path_array(&mut self) -> Result<Vec<String>> {
        let mut result = Vec::new();
        self.parse_list(|this| {
            result.push(this.parse_asset_path()?);
            Ok(())
        })?;
        Ok(result)
    }

    /// Parse `(offset = ...; scale = ...)` blocks attached to sublayers,
    /// references and payloads.
    pub(in crate::usda::parser) fn parse_layer_offset(&mut self) -> Result<LayerOffset> {
        let mut offset = None;
        let mut scale = None;

        self.parse_group(';', |this, _| {
            let token = this.fetch_next()?;
            this.ensure_pun('=')?;
            let value = this.parse_token::<f64>()?;
            match token {
                Token::Offset => {
                    ensure!(offset.is_none(), "offset specified twice");
                    offset = Some(value);
                }
                Token::Scale => {
                    ensure!(scale.is_none(), "scale specified twice");
                    scale = Some(value);
                }
                unexpected => bail!("Unexpected token in layer offset: {unexpected:?}"),
            }
            Ok(())
        })?;

        let mut layer_offset = LayerOffset::default();
        if let Some(offset) = offset {
            layer_offset.offset = offset;
        }
        if let Some(scale) = scale {
            layer_offset.scale = scale;
        }
        Ok(layer_offset)
    }

    /// Parse `subLayers` entries along with their optional `(offset/scale)` metadata.
    pub(in crate::usda::parser) fn parse_sublayers(&mut self) -> Result<Vec<SubLayer>> {
        let mut sublayers = Vec::new();

        self.parse_list(|this| {
            let asset_path = this
                .fetch_next()?
                .try_as_asset_ref()
                .ok_or_else(|| anyhow!("Asset ref expected, got {:?}", this.peek_next()))?
                .to_string();

            let layer_offset = if this.is_next(Token::Punctuation('(')) {
                this.parse_layer_offset().context("Unable to parse sublayer offset")?
            } else {
                LayerOffset::default()
            };

            sublayers.push(SubLayer {
                asset_path,
                layer_offset,
            });
            Ok(())
        })?;

        Ok(sublayers)
    }
}
