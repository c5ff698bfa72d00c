//! Token definitions for the USDA text format.

use logos::{Lexer, Logos};

fn quoted<'a>(lex: &mut Lexer<'a, Token<'a>>, quote: char) -> Option<&'a str> {
    let rem = lex.remainder();
    let mut escaped = false;
    for (i, ch) in rem.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '\n' => return None,
            c if c == quote => {
                let content = &rem[..i];
                lex.bump(i + 1);
                return Some(content);
            }
            _ => {}
        }
    }
    None
}

fn triple_quoted<'a>(lex: &mut Lexer<'a, Token<'a>>, fence: &str) -> Option<&'a str> {
    let rem = lex.remainder();
    rem.find(fence).map(|i| {
        let content = &rem[..i];
        lex.bump(i + fence.len());
        content
    })
}

fn double_quoted<'a>(lex: &mut Lexer<'a, Token<'a>>) -> Option<&'a str> {
    quoted(lex, '"')
}

fn single_quoted<'a>(lex: &mut Lexer<'a, Token<'a>>) -> Option<&'a str> {
    quoted(lex, '\'')
}

fn triple_double_quoted<'a>(lex: &mut Lexer<'a, Token<'a>>) -> Option<&'a str> {
    triple_quoted(lex, "\"\"\"")
}

fn triple_single_quoted<'a>(lex: &mut Lexer<'a, Token<'a>>) -> Option<&'a str> {
    triple_quoted(lex, "'''")
}

fn asset_ref<'a>(lex: &mut Lexer<'a, Token<'a>>) -> Option<&'a str> {
    let rem = lex.remainder();
    rem.find('@').map(|i| {
        let content = &rem[..i];
        lex.bump(i + 1);
        content
    })
}

/// A lexical token of the USDA grammar.
///
/// String-carrying variants borrow from the source text; the parser decides
/// ownership when it builds values.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token<'a> {
    /// `#usda <version>` header; carries the version string. Consumes to
    /// end of line so the comment rule can never win on length.
    #[regex(r"#usda [^\n]*", |lex| lex.slice()[6..].trim_end(), priority = 10)]
    Magic(&'a str),

    /// Comments run to end of line and are skipped. The magic header wins
    /// on priority.
    #[regex(r"#[^\n]*", logos::skip, priority = 5)]
    Comment,

    #[token("def")]
    Def,
    #[token("over")]
    Over,
    #[token("class")]
    Class,
    #[token("variantSet")]
    VariantSet,
    #[token("variants")]
    Variants,
    #[token("variantSets")]
    VariantSets,
    #[token("references")]
    References,
    #[token("payload")]
    Payload,
    #[token("inherits")]
    Inherits,
    #[token("specializes")]
    Specializes,
    #[token("kind")]
    Kind,
    #[token("customData")]
    CustomData,
    #[token("doc")]
    Doc,
    #[token("subLayers")]
    SubLayers,
    #[token("rel")]
    Rel,
    #[token("custom")]
    Custom,
    #[token("uniform")]
    Uniform,
    #[token("varying")]
    Varying,
    #[token("add")]
    Add,
    #[token("append")]
    Append,
    #[token("delete")]
    Delete,
    #[token("prepend")]
    Prepend,
    #[token("reorder")]
    Reorder,
    #[token("None")]
    None,
    #[token("offset")]
    Offset,
    #[token("scale")]
    Scale,
    #[token("dictionary")]
    Dictionary,
    #[token("timeSamples")]
    TimeSamples,
    #[token("inf")]
    Inf,

    #[token("\"\"\"", triple_double_quoted)]
    #[token("'''", triple_single_quoted)]
    #[token("\"", double_quoted)]
    #[token("'", single_quoted)]
    String(&'a str),

    /// `@asset/path.usda@`
    #[token("@", asset_ref)]
    AssetRef(&'a str),

    /// `</Prim/Path.prop>`
    #[regex(r"<[^>\n]*>", |lex| { let s = lex.slice(); &s[1..s.len() - 1] })]
    PathRef(&'a str),

    #[regex(r"[+-]?([0-9]+\.?[0-9]*([eE][+-]?[0-9]+)?|\.[0-9]+([eE][+-]?[0-9]+)?)")]
    Number(&'a str),

    /// Bare identifier; may carry a `.suffix` (`.connect`, `.timeSamples`).
    #[regex(r"[A-Za-z_][A-Za-z_0-9]*(\.[A-Za-z_][A-Za-z_0-9]*)?")]
    Identifier(&'a str),

    /// Identifier with `:` namespace separators, e.g. `xformOp:translate`.
    #[regex(r"[A-Za-z_][A-Za-z_0-9]*(:[A-Za-z_0-9]+)+(\.[A-Za-z_][A-Za-z_0-9]*)?")]
    NamespacedIdentifier(&'a str),

    #[regex(r"[()\[\]{}=,;:.+-]", |lex| lex.slice().chars().next())]
    Punctuation(char),
}

impl<'a> Token<'a> {
    /// The version string when this is the `#usda` header token.
    pub fn try_as_magic(&self) -> Option<&'a str> {
        match self {
            Token::Magic(v) => Some(v),
            _ => None,
        }
    }

    pub fn try_as_string(&self) -> Option<&'a str> {
        match self {
            Token::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn try_as_identifier(&self) -> Option<&'a str> {
        match self {
            Token::Identifier(s) | Token::NamespacedIdentifier(s) => Some(s),
            _ => None,
        }
    }

    pub fn try_as_path_ref(&self) -> Option<&'a str> {
        match self {
            Token::PathRef(s) => Some(s),
            _ => None,
        }
    }

    pub fn try_as_asset_ref(&self) -> Option<&'a str> {
        match self {
            Token::AssetRef(s) => Some(s),
            _ => None,
        }
    }
}

/// Source lexeme for keyword tokens, for the places keywords are legal as
/// plain names (metadata keys, dictionary keys).
pub fn keyword_lexeme(token: &Token) -> Option<&'static str> {
    let lexeme = match token {
        Token::Def => "def",
        Token::Over => "over",
        Token::Class => "class",
        Token::VariantSet => "variantSet",
        Token::Variants => "variants",
        Token::VariantSets => "variantSets",
        Token::References => "references",
        Token::Payload => "payload",
        Token::Inherits => "inherits",
        Token::Specializes => "specializes",
        Token::Kind => "kind",
        Token::CustomData => "customData",
        Token::Doc => "doc",
        Token::SubLayers => "subLayers",
        Token::Rel => "rel",
        Token::Custom => "custom",
        Token::Uniform => "uniform",
        Token::Varying => "varying",
        Token::Add => "add",
        Token::Append => "append",
        Token::Delete => "delete",
        Token::Prepend => "prepend",
        Token::Reorder => "reorder",
        Token::Offset => "offset",
        Token::Scale => "scale",
        Token::Dictionary => "dictionary",
        Token::TimeSamples => "timeSamples",
        Token::Inf => "inf",
        _ => return None,
    };
    Some(lexeme)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token<'_>> {
        Token::lexer(source).map(|t| t.expect("lex error")).collect()
    }

    #[test]
    fn lex_magic_and_comment() {
        let tokens = lex("#usda 1.0\n# a comment\ndef");
        assert_eq!(tokens, vec![Token::Magic("1.0"), Token::Def]);
    }

    #[test]
    fn lex_prim_header() {
        let tokens = lex("def Xform \"Root\" {");
        assert_eq!(
            tokens,
            vec![
                Token::Def,
                Token::Identifier("Xform"),
                Token::String("Root"),
                Token::Punctuation('{'),
            ]
        );
    }

    #[test]
    fn lex_namespaced_attribute() {
        let tokens = lex("double3 xformOp:translate = (1, 2, 3)");
        assert_eq!(tokens[1], Token::NamespacedIdentifier("xformOp:translate"));
    }

    #[test]
    fn lex_connect_suffix() {
        let tokens = lex("outputs:surface.connect");
        assert_eq!(tokens, vec![Token::NamespacedIdentifier("outputs:surface.connect")]);
    }

    #[test]
    fn lex_triple_quoted_string() {
        let tokens = lex("doc = \"\"\"line one\nline two\"\"\"");
        assert_eq!(tokens[2], Token::String("line one\nline two"));
    }

    #[test]
    fn lex_asset_and_path_refs() {
        let tokens = lex("@./layer.usda@</World>");
        assert_eq!(tokens, vec![Token::AssetRef("./layer.usda"), Token::PathRef("/World")]);
    }

    #[test]
    fn lex_numbers() {
        let tokens = lex("1 -2.5 3e10 .5");
        assert_eq!(
            tokens,
            vec![
                Token::Number("1"),
                Token::Number("-2.5"),
                Token::Number("3e10"),
                Token::Number(".5"),
            ]
        );
    }
}
