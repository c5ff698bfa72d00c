use anyhow::{bail, Result};
use std::fmt;

/// A USD scene path.
///
/// Paths address prims (`/World/Geo`), properties (`/World/Geo.points`) and
/// variant selections (`/World/Geo{lod=high}`). The reader mostly works with
/// the prim part; the property and variant parts are kept so paths survive a
/// round trip through the parser unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path {
    prim_part: String,
    prop_part: String,
    variant_part: String,
}

/// Shorthand for [`Path::new`].
pub fn path(s: &str) -> Result<Path> {
    Path::new(s)
}

impl Path {
    /// Parse a path string into prim/property/variant parts.
    pub fn new(s: &str) -> Result<Path> {
        if s.is_empty() {
            bail!("Empty path");
        }

        let (rest, prop_part) = match s.rsplit_once('.') {
            Some((prim, prop)) if !prop.is_empty() => (prim, prop.to_string()),
            Some(_) => bail!("Path `{s}` has an empty property part"),
            None => (s, String::new()),
        };

        let (prim_part, variant_part) = match rest.find('{') {
            Some(pos) => {
                let variant = &rest[pos..];
                if !variant.ends_with('}') {
                    bail!("Unterminated variant selection in path `{s}`");
                }
                (rest[..pos].to_string(), variant.to_string())
            }
            None => (rest.to_string(), String::new()),
        };

        if prim_part.contains("//") {
            bail!("Path `{s}` contains an empty element");
        }

        Ok(Path {
            prim_part,
            prop_part,
            variant_part,
        })
    }

    /// The absolute root path `/`.
    pub fn abs_root() -> Path {
        Path {
            prim_part: "/".to_string(),
            prop_part: String::new(),
            variant_part: String::new(),
        }
    }

    /// Builds a path from a bare element name, without validation against
    /// the prim naming rules (the reader validates separately).
    pub fn from_element(name: &str) -> Path {
        Path {
            prim_part: name.to_string(),
            prop_part: String::new(),
            variant_part: String::new(),
        }
    }

    /// The prim portion, e.g. `/World/Geo` for `/World/Geo.points`.
    pub fn prim_part(&self) -> &str {
        &self.prim_part
    }

    /// The property portion, empty when the path names a prim.
    pub fn prop_part(&self) -> &str {
        &self.prop_part
    }

    /// The variant-selection portion including braces, or empty.
    pub fn variant_part(&self) -> &str {
        &self.variant_part
    }

    pub fn is_absolute(&self) -> bool {
        self.prim_part.starts_with('/')
    }

    pub fn is_root(&self) -> bool {
        self.prim_part == "/" && self.prop_part.is_empty()
    }

    /// True when the prim part is non-empty and each element is a legal prim
    /// name (no embedded `.`; `/` only as separator).
    pub fn is_valid(&self) -> bool {
        if self.prim_part.is_empty() {
            return false;
        }
        if self.is_root() {
            return true;
        }
        self.prim_part
            .trim_start_matches('/')
            .split('/')
            .all(|el| !el.is_empty() && !el.contains('.'))
    }

    /// The final element of the prim part, e.g. `Geo` for `/World/Geo`.
    pub fn element_name(&self) -> &str {
        self.prim_part.rsplit('/').next().unwrap_or("")
    }

    /// Path of the parent prim, or `None` at the root.
    pub fn parent_prim_path(&self) -> Option<Path> {
        if self.is_root() || self.prim_part.is_empty() {
            return None;
        }
        match self.prim_part.rsplit_once('/') {
            Some(("", _)) => Some(Path::abs_root()),
            Some((parent, _)) => Some(Path {
                prim_part: parent.to_string(),
                prop_part: String::new(),
                variant_part: String::new(),
            }),
            None => None,
        }
    }

    /// Append a child prim element.
    pub fn append_path(&self, name: &str) -> Result<Path> {
        if name.is_empty() || name.contains('/') || name.contains('.') {
            bail!("Invalid prim element name: `{name}`");
        }
        let prim_part = if self.prim_part == "/" {
            format!("/{name}")
        } else {
            format!("{}/{name}", self.prim_part)
        };
        Ok(Path {
            prim_part,
            prop_part: String::new(),
            variant_part: String::new(),
        })
    }

    /// Append a property part to a prim path.
    pub fn append_property(&self, name: &str) -> Result<Path> {
        if name.is_empty() {
            bail!("Empty property name");
        }
        Ok(Path {
            prim_part: self.prim_part.clone(),
            prop_part: name.to_string(),
            variant_part: self.variant_part.clone(),
        })
    }

    /// Append a variant selection, e.g. `{lod=high}`.
    pub fn append_variant_selection(&self, set: &str, variant: &str) -> Result<Path> {
        if set.is_empty() {
            bail!("Empty variant set name");
        }
        Ok(Path {
            prim_part: self.prim_part.clone(),
            prop_part: String::new(),
            variant_part: format!("{}{{{}={}}}", self.variant_part, set, variant),
        })
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prim_part, self.variant_part)?;
        if !self.prop_part.is_empty() {
            write!(f, ".{}", self.prop_part)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_prim_path() {
        let p = Path::new("/World/Geo").unwrap();
        assert_eq!(p.prim_part(), "/World/Geo");
        assert_eq!(p.element_name(), "Geo");
        assert!(p.prop_part().is_empty());
        assert!(p.is_absolute());
    }

    #[test]
    fn parse_property_path() {
        let p = Path::new("/World/Geo.points").unwrap();
        assert_eq!(p.prim_part(), "/World/Geo");
        assert_eq!(p.prop_part(), "points");
    }

    #[test]
    fn parse_variant_path() {
        let p = Path::new("/World{lod=high}").unwrap();
        assert_eq!(p.prim_part(), "/World");
        assert_eq!(p.variant_part(), "{lod=high}");
    }

    #[test]
    fn parent_of_root_child() {
        let p = Path::new("/World").unwrap();
        assert_eq!(p.parent_prim_path().unwrap(), Path::abs_root());
        assert!(Path::abs_root().parent_prim_path().is_none());
    }

    #[test]
    fn append_rejects_bad_names() {
        let root = Path::abs_root();
        assert!(root.append_path("ok_name").is_ok());
        assert!(root.append_path("").is_err());
        assert!(root.append_path("a/b").is_err());
        assert!(root.append_path("a.b").is_err());
    }

    #[test]
    fn display_round_trip() {
        for s in ["/World/Geo", "/World/Geo.points", "/A{v=x}"] {
            assert_eq!(Path::new(s).unwrap().to_string(), s);
        }
    }
}
