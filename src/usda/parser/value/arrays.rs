use anyhow::{anyhow, bail, ensure, Context, Result};
use std::fmt::Debug;
use std::str::FromStr;

use crate::usda::token::Token;

/// Array, tuple, and matrix parsing.
///
/// Every bracketed form funnels through one delimiter walker, so the empty
/// sequence, separator-then-close, and close-after-element all behave the
/// same for lists, tuples and layer-offset groups.
impl<'a> super::super::Parser<'a> {
    fn parse_delimited(
        &mut self,
        open: char,
        close: char,
        sep: char,
        mut element: impl FnMut(&mut Self, usize) -> Result<()>,
    ) -> Result<()> {
        self.ensure_pun(open)
            .with_context(|| format!("Expected `{open}` to open a sequence"))?;

        let mut index = 0;
        loop {
            if self.is_next(Token::Punctuation(close)) {
                self.fetch_next()?;
                return Ok(());
            }

            element(self, index).with_context(|| format!("Bad element {index} in `{open}...{close}`"))?;
            index += 1;

            match self.fetch_next()? {
                Token::Punctuation(c) if c == sep => {}
                Token::Punctuation(c) if c == close => return Ok(()),
                other => bail!("Expected `{sep}` or `{close}` after element {index}, got {other:?}"),
            }
        }
    }

    /// Walk the elements of a `[...]` list.
    pub(in crate::usda::parser) fn parse_list(
        &mut self,
        mut element: impl FnMut(&mut Self) -> Result<()>,
    ) -> Result<()> {
        self.parse_delimited('[', ']', ',', |this, _| element(this))
    }

    /// Walk the elements of a `(...)` group separated by `sep` (`,` for
    /// tuples and matrix rows, `;` for layer offsets).
    pub(in crate::usda::parser) fn parse_group(
        &mut self,
        sep: char,
        element: impl FnMut(&mut Self, usize) -> Result<()>,
    ) -> Result<()> {
        self.parse_delimited('(', ')', sep, element)
    }

    /// Parse a fixed-size `(a, b, ...)` tuple literal.
    pub(in crate::usda::parser) fn parse_tuple<T, const N: usize>(&mut self) -> Result<[T; N]>
    where
        T: FromStr,
        <T as FromStr>::Err: Debug,
    {
        let mut values = Vec::with_capacity(N);
        self.parse_group(',', |this, index| {
            ensure!(index < N, "Tuple literal has more than {N} elements");
            values.push(this.parse_token::<T>()?);
            Ok(())
        })?;

        let count = values.len();
        values
            .try_into()
            .map_err(|_| anyhow!("Tuple literal must have {N} elements, got {count}"))
    }

    /// Parse a `[a, b, ...]` array of scalars.
    pub(in crate::usda::parser) fn parse_array<T>(&mut self) -> Result<Vec<T>>
    where
        T: FromStr,
        <T as FromStr>::Err: Debug,
    {
        let mut out = Vec::new();
        self.parse_list(|this| {
            out.push(this.parse_token::<T>()?);
            Ok(())
        })?;
        Ok(out)
    }

    /// Parse `[(a, b), (c, d), ...]`, flattening the tuples.
    pub(in crate::usda::parser) fn parse_array_of_tuples<T, const N: usize>(&mut self) -> Result<Vec<T>>
    where
        T: FromStr,
        <T as FromStr>::Err: Debug,
    {
        let mut out = Vec::new();
        self.parse_list(|this| {
            out.extend(this.parse_tuple::<T, N>()?);
            Ok(())
        })?;
        Ok(out)
    }

    /// Parse one `((r, ...), (r, ...), ...)` matrix literal, rows flattened
    /// in row-major order.
    pub(in crate::usda::parser) fn parse_matrix<const N: usize>(&mut self) -> Result<Vec<f64>> {
        let mut values = Vec::with_capacity(N * N);
        self.parse_group(',', |this, index| {
            ensure!(index < N, "matrix{N}d literal has more than {N} rows");
            values.extend(this.parse_tuple::<f64, N>()?);
            Ok(())
        })?;
        ensure!(values.len() == N * N, "matrix{N}d literal must have {N} rows");
        Ok(values)
    }

    /// A single matrix or an array of matrices, decided by the next token;
    /// arrays concatenate in declaration order.
    pub(in crate::usda::parser) fn parse_matrix_value<const N: usize>(&mut self) -> Result<Vec<f64>> {
        if !self.is_next(Token::Punctuation('[')) {
            return self.parse_matrix::<N>();
        }

        let mut matrices = Vec::new();
        self.parse_list(|this| {
            matrices.extend(this.parse_matrix::<N>()?);
            Ok(())
        })?;
        Ok(matrices)
    }
}
