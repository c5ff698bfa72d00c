use anyhow::{bail, Result};

/// Internal parse-shape for a declared USD data type.
///
/// Role types (`point3f`, `color4h`, `texCoord2d`, ...) collapse onto their
/// underlying shape; the declared type token is preserved on the attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Bool,
    BoolVec,

    Asset,
    AssetVec,

    Uchar,
    UcharVec,
    Int,
    Int2,
    Int3,
    Int4,
    IntVec,
    Int2Vec,
    Int3Vec,
    Int4Vec,
    Uint,
    UintVec,
    Int64,
    Int64Vec,
    Uint64,
    Uint64Vec,

    Half,
    Half2,
    Half3,
    Half4,
    HalfVec,
    Half2Vec,
    Half3Vec,
    Half4Vec,

    Float,
    Float2,
    Float3,
    Float4,
    FloatVec,
    Float2Vec,
    Float3Vec,
    Float4Vec,

    Double,
    Double2,
    Double3,
    Double4,
    DoubleVec,
    Double2Vec,
    Double3Vec,
    Double4Vec,

    Quath,
    Quatf,
    Quatd,
    QuathVec,
    QuatfVec,
    QuatdVec,

    Matrix2d,
    Matrix3d,
    Matrix4d,

    String,
    Token,
    StringVec,
    TokenVec,

    Dictionary,
}

/// Map a declared type token to its parse shape.
/// See
/// - <https://openusd.org/dev/api/_usd__page__datatypes.html#Usd_Basic_Datatypes>
/// - <https://openusd.org/dev/api/_usd__page__datatypes.html#Usd_Roles>
pub fn parse_data_type(ty: &str) -> Result<Type> {
    let data_type = match ty {
        // Bool
        "bool" => Type::Bool,
        "bool[]" => Type::BoolVec,

        // Ints
        "uchar" => Type::Uchar,
        "uchar[]" => Type::UcharVec,
        "int" => Type::Int,
        "int2" => Type::Int2,
        "int3" => Type::Int3,
        "int4" => Type::Int4,
        "int[]" => Type::IntVec,
        "int2[]" => Type::Int2Vec,
        "int3[]" => Type::Int3Vec,
        "int4[]" => Type::Int4Vec,
        "uint" => Type::Uint,
        "uint[]" => Type::UintVec,
        "int64" => Type::Int64,
        "int64[]" => Type::Int64Vec,
        "uint64" => Type::Uint64,
        "uint64[]" => Type::Uint64Vec,

        // Half
        "half" => Type::Half,
        "half2" | "texCoord2h" => Type::Half2,
        "half3" | "point3h" | "normal3h" | "vector3h" | "color3h" | "texCoord3h" => Type::Half3,
        "half4" | "color4h" => Type::Half4,
        "half[]" => Type::HalfVec,
        "half2[]" | "texCoord2h[]" => Type::Half2Vec,
        "half3[]" | "point3h[]" | "normal3h[]" | "vector3h[]" | "color3h[]" | "texCoord3h[]" => Type::Half3Vec,
        "half4[]" | "color4h[]" => Type::Half4Vec,

        // Float
        "float" => Type::Float,
        "float2" | "texCoord2f" => Type::Float2,
        "float3" | "point3f" | "normal3f" | "vector3f" | "color3f" | "texCoord3f" => Type::Float3,
        "float4" | "color4f" => Type::Float4,
        "float[]" => Type::FloatVec,
        "float2[]" | "texCoord2f[]" => Type::Float2Vec,
        "float3[]" | "point3f[]" | "normal3f[]" | "vector3f[]" | "color3f[]" | "texCoord3f[]" => Type::Float3Vec,
        "float4[]" | "color4f[]" => Type::Float4Vec,

        // Double
        "double" => Type::Double,
        "double2" | "texCoord2d" => Type::Double2,
        "double3" | "point3d" | "normal3d" | "vector3d" | "color3d" | "texCoord3d" => Type::Double3,
        "double4" | "color4d" => Type::Double4,
        "double[]" => Type::DoubleVec,
        "double2[]" | "texCoord2d[]" => Type::Double2Vec,
        "double3[]" | "point3d[]" | "normal3d[]" | "vector3d[]" | "color3d[]" | "texCoord3d[]" => Type::Double3Vec,
        "double4[]" => Type::Double4Vec,

        // Matrices
        "matrix2d" | "matrix2d[]" => Type::Matrix2d,
        "matrix3d" | "matrix3d[]" => Type::Matrix3d,
        "matrix4d" | "matrix4d[]" | "frame4d" | "frame4d[]" => Type::Matrix4d,

        // Quats
        "quatd" => Type::Quatd,
        "quatf" => Type::Quatf,
        "quath" => Type::Quath,
        "quatd[]" => Type::QuatdVec,
        "quatf[]" => Type::QuatfVec,
        "quath[]" => Type::QuathVec,

        // String, tokens
        "string" => Type::String,
        "token" => Type::Token,
        "string[]" => Type::StringVec,
        "token[]" => Type::TokenVec,
        "asset" => Type::Asset,
        "asset[]" => Type::AssetVec,

        "dictionary" => Type::Dictionary,

        _ => bail!("Unsupported data type: {ty}"),
    };

    Ok(data_type)
}

/// True when the name is a declared-type token; used to spot type hints in
/// dictionary entries.
pub fn is_type_hint_name(name: &str) -> bool {
    parse_data_type(name).is_ok()
}
