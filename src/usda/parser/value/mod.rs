pub mod arrays;
pub mod primitives;
pub mod types;

use anyhow::{anyhow, Result};

use crate::sdf::Value;
use crate::usda::token::Token;
pub use types::Type;

/// Value parsing dispatcher.
impl<'a> super::Parser<'a> {
    /// Decode a typed value based on USD's scalar/array/role type tables.
    /// `None` is legal for any type and yields the explicit block marker.
    pub(in crate::usda::parser) fn parse_value(&mut self, ty: Type) -> Result<Value> {
        if self.is_next(Token::None) {
            self.fetch_next()?;
            return Ok(Value::Block);
        }

        let value = match ty {
            // Bool
            Type::Bool => Value::Bool(self.parse_bool()?),
            Type::BoolVec => Value::BoolVec(self.parse_bool_array()?),

            // Asset paths
            Type::Asset => Value::AssetPath(self.parse_asset_path()?),
            Type::AssetVec => Value::AssetPathVec(self.parse_asset_path_array()?),

            // Ints
            Type::Uchar => Value::Uchar(self.parse_token()?),
            Type::UcharVec => Value::UcharVec(self.parse_array()?),

            Type::Int => Value::Int(self.parse_token()?),
            Type::Int2 => Value::Vec2i(self.parse_tuple::<_, 2>()?.into()),
            Type::Int3 => Value::Vec3i(self.parse_tuple::<_, 3>()?.into()),
            Type::Int4 => Value::Vec4i(self.parse_tuple::<_, 4>()?.into()),
            Type::IntVec => Value::IntVec(self.parse_array()?),
            Type::Int2Vec => Value::Vec2i(self.parse_array_of_tuples::<_, 2>()?),
            Type::Int3Vec => Value::Vec3i(self.parse_array_of_tuples::<_, 3>()?),
            Type::Int4Vec => Value::Vec4i(self.parse_array_of_tuples::<_, 4>()?),
            Type::Uint => Value::Uint(self.parse_token()?),
            Type::UintVec => Value::UintVec(self.parse_array()?),
            Type::Int64 => Value::Int64(self.parse_token()?),
            Type::Int64Vec => Value::Int64Vec(self.parse_array()?),
            Type::Uint64 => Value::Uint64(self.parse_token()?),
            Type::Uint64Vec => Value::Uint64Vec(self.parse_array()?),

            // Half
            Type::Half => Value::Half(self.parse_token()?),
            Type::Half2 => Value::Vec2h(self.parse_tuple::<_, 2>()?.into()),
            Type::Half3 => Value::Vec3h(self.parse_tuple::<_, 3>()?.into()),
            Type::Half4 => Value::Vec4h(self.parse_tuple::<_, 4>()?.into()),
            Type::HalfVec => Value::HalfVec(self.parse_array()?),
            Type::Half2Vec => Value::Vec2h(self.parse_array_of_tuples::<_, 2>()?),
            Type::Half3Vec => Value::Vec3h(self.parse_array_of_tuples::<_, 3>()?),
            Type::Half4Vec => Value::Vec4h(self.parse_array_of_tuples::<_, 4>()?),

            // Float
            Type::Float => Value::Float(self.parse_token()?),
            Type::Float2 => Value::Vec2f(self.parse_tuple::<_, 2>()?.into()),
            Type::Float3 => Value::Vec3f(self.parse_tuple::<_, 3>()?.into()),
            Type::Float4 => Value::Vec4f(self.parse_tuple::<_, 4>()?.into()),
            Type::FloatVec => Value::FloatVec(self.parse_array()?),
            Type::Float2Vec => Value::Vec2f(self.parse_array_of_tuples::<_, 2>()?),
            Type::Float3Vec => Value::Vec3f(self.parse_array_of_tuples::<_, 3>()?),
            Type::Float4Vec => Value::Vec4f(self.parse_array_of_tuples::<_, 4>()?),

            // Double
            Type::Double => Value::Double(self.parse_token()?),
            Type::Double2 => Value::Vec2d(self.parse_tuple::<_, 2>()?.into()),
            Type::Double3 => Value::Vec3d(self.parse_tuple::<_, 3>()?.into()),
            Type::Double4 => Value::Vec4d(self.parse_tuple::<_, 4>()?.into()),
            Type::DoubleVec => Value::DoubleVec(self.parse_array()?),
            Type::Double2Vec => Value::Vec2d(self.parse_array_of_tuples::<_, 2>()?),
            Type::Double3Vec => Value::Vec3d(self.parse_array_of_tuples::<_, 3>()?),
            Type::Double4Vec => Value::Vec4d(self.parse_array_of_tuples::<_, 4>()?),

            // Quats
            Type::Quath => Value::Quath(self.parse_tuple::<_, 4>()?.into()),
            Type::Quatf => Value::Quatf(self.parse_tuple::<_, 4>()?.into()),
            Type::Quatd => Value::Quatd(self.parse_tuple::<_, 4>()?.into()),
            Type::QuathVec => Value::Quath(self.parse_array_of_tuples::<_, 4>()?),
            Type::QuatfVec => Value::Quatf(self.parse_array_of_tuples::<_, 4>()?),
            Type::QuatdVec => Value::Quatd(self.parse_array_of_tuples::<_, 4>()?),

            // String and tokens
            Type::String => Value::String(self.fetch_str()?.to_owned()),
            Type::Token => Value::Token(self.fetch_str_or_ident()?),
            Type::StringVec => Value::StringVec(self.parse_array()?),
            Type::TokenVec => Value::TokenVec(self.parse_array()?),

            Type::Matrix2d => Value::Matrix2d(self.parse_matrix_value::<2>()?),
            Type::Matrix3d => Value::Matrix3d(self.parse_matrix_value::<3>()?),
            Type::Matrix4d => Value::Matrix4d(self.parse_matrix_value::<4>()?),

            Type::Dictionary => self.parse_dictionary()?,
        };

        Ok(value)
    }

    /// Token values are usually quoted but appear bare in older assets.
    pub(in crate::usda::parser) fn fetch_str_or_ident(&mut self) -> Result<String> {
        let token = self.fetch_next()?;
        token
            .try_as_string()
            .or_else(|| token.try_as_identifier())
            .map(str::to_owned)
            .ok_or_else(|| anyhow!("Unexpected token {token:?} (want string or identifier)"))
    }
}
