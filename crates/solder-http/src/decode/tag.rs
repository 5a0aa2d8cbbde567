//! Field annotation grammar: `kind[,key=value,...]`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Where a field's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// The request body.
    Model,
    /// A path parameter captured by the router.
    Path,
    /// A request header, matched case-insensitively.
    Header,
    /// A query string parameter.
    Query,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Model => "model",
            FieldKind::Path => "path",
            FieldKind::Header => "header",
            FieldKind::Query => "query",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKind {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "model" => Ok(FieldKind::Model),
            "path" => Ok(FieldKind::Path),
            "header" => Ok(FieldKind::Header),
            "query" => Ok(FieldKind::Query),
            other => Err(TagError::UnknownKind(other.to_string())),
        }
    }
}

/// Failures parsing an annotation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    #[error("empty annotation")]
    Empty,

    #[error("unknown kind `{0}`, expected one of model, path, header, query")]
    UnknownKind(String),

    #[error("unknown key `{0}`")]
    UnknownKey(String),

    #[error("key `{0}` needs a value")]
    MissingValue(String),
}

/// A parsed field annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub kind: FieldKind,
    /// The `name=` override.
    pub name: Option<String>,
}

impl Tag {
    pub fn parse(tag: &str) -> Result<Self, TagError> {
        let mut parts = tag.split(',').map(str::trim);
        let kind = match parts.next() {
            Some("") | None => return Err(TagError::Empty),
            Some(kind) => kind.parse::<FieldKind>()?,
        };

        let mut name = None;
        for part in parts.filter(|part| !part.is_empty()) {
            let Some((key, value)) = part.split_once('=') else {
                return Err(TagError::MissingValue(part.to_string()));
            };
            let (key, value) = (key.trim(), value.trim());
            match key {
                "name" if !value.is_empty() => name = Some(value.to_string()),
                "name" => return Err(TagError::MissingValue(key.to_string())),
                other => return Err(TagError::UnknownKey(other.to_string())),
            }
        }

        Ok(Self { kind, name })
    }

    /// The lookup name: the override, or `field`.
    pub fn lookup_name<'a>(&'a self, field: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kind_and_name() {
        let tag = Tag::parse("query,name=page").unwrap();
        assert_eq!(tag.kind, FieldKind::Query);
        assert_eq!(tag.lookup_name("p"), "page");

        let tag = Tag::parse(" header ").unwrap();
        assert_eq!(tag.kind, FieldKind::Header);
        assert_eq!(tag.lookup_name("x_trace"), "x_trace");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Tag::parse(""), Err(TagError::Empty));
        assert_eq!(
            Tag::parse("cookie"),
            Err(TagError::UnknownKind("cookie".into()))
        );
        assert_eq!(
            Tag::parse("query,alias=x"),
            Err(TagError::UnknownKey("alias".into()))
        );
        assert_eq!(
            Tag::parse("path,name"),
            Err(TagError::MissingValue("name".into()))
        );
    }
}
