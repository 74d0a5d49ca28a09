// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! Attribute type expressions
//!
//! Grammar accepted for one attribute:
//!
//! ```text
//! attr    := type [ "=" default ] [ "%" description ]
//!          | type [ "%" description ] [ "=" default ]
//! type    := type "?" | "list[" type "]" | "Optional[" type "]"
//!          | "Literal[" values "]" | primitive | NamedType
//! ```

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::{DefinitionTable, RecordType};
use crate::errors::ChainflowError;

/// Fixed primitive vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Text,
    Integer,
    Number,
    Boolean,
    Any,
    /// Bare `list`, elements unconstrained
    List,
    /// Bare `dict`
    Map,
}

impl Primitive {
    /// Look up a bare type token
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "str" | "string" | "text" => Some(Self::Text),
            "int" | "integer" => Some(Self::Integer),
            "float" | "number" => Some(Self::Number),
            "bool" | "boolean" => Some(Self::Boolean),
            "Any" | "any" => Some(Self::Any),
            "list" | "List" => Some(Self::List),
            "dict" | "Dict" | "map" => Some(Self::Map),
            _ => None,
        }
    }

    fn json_type(self) -> Option<&'static str> {
        match self {
            Self::Text => Some("string"),
            Self::Integer => Some("integer"),
            Self::Number => Some("number"),
            Self::Boolean => Some("boolean"),
            Self::Any => None,
            Self::List => Some("array"),
            Self::Map => Some("object"),
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "str"),
            Self::Integer => write!(f, "int"),
            Self::Number => write!(f, "float"),
            Self::Boolean => write!(f, "bool"),
            Self::Any => write!(f, "Any"),
            Self::List => write!(f, "list"),
            Self::Map => write!(f, "dict"),
        }
    }
}

/// Parsed type of one attribute
#[derive(Debug, Clone)]
pub enum TypeExpr {
    Primitive(Primitive),
    /// `Literal["a", "b"]`
    Literal(Vec<String>),
    Optional(Box<TypeExpr>),
    List(Box<TypeExpr>),
    /// Reference to a record declared in a `def` section
    Named(Arc<RecordType>),
}

impl TypeExpr {
    /// Parse a type expression, resolving named types against `known`
    pub fn parse(
        attribute: &str,
        expr: &str,
        known: &DefinitionTable,
    ) -> Result<Self, ChainflowError> {
        let expr = expr.trim();

        if expr.is_empty() {
            return Err(ChainflowError::InvalidTypeExpr {
                attribute: attribute.to_string(),
                expr: expr.to_string(),
                reason: "type is empty".to_string(),
            });
        }

        if let Some(inner) = expr.strip_suffix('?') {
            return Ok(Self::Optional(Box::new(Self::parse(attribute, inner, known)?)));
        }

        if let Some(inner) = bracketed(expr, &["list", "List"]) {
            return Ok(Self::List(Box::new(Self::parse(attribute, inner, known)?)));
        }

        if let Some(inner) = bracketed(expr, &["Optional"]) {
            return Ok(Self::Optional(Box::new(Self::parse(attribute, inner, known)?)));
        }

        if let Some(inner) = bracketed(expr, &["Literal"]) {
            let values: Vec<String> = inner
                .split(',')
                .map(|v| v.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
                .filter(|v| !v.is_empty())
                .collect();

            if values.is_empty() {
                return Err(ChainflowError::InvalidTypeExpr {
                    attribute: attribute.to_string(),
                    expr: expr.to_string(),
                    reason: "Literal needs at least one value".to_string(),
                });
            }

            return Ok(Self::Literal(values));
        }

        // Declared names shadow the primitive vocabulary
        if let Some(record) = known.get(expr) {
            return Ok(Self::Named(record));
        }

        Primitive::from_token(expr)
            .map(Self::Primitive)
            .ok_or_else(|| ChainflowError::UnresolvedType {
                attribute: attribute.to_string(),
                expr: expr.to_string(),
            })
    }

    /// Whether a missing value is acceptable
    pub fn is_optional(&self) -> bool {
        matches!(self, Self::Optional(_))
    }

    /// Strip one level of `Optional`
    pub fn unwrap_optional(&self) -> &TypeExpr {
        match self {
            Self::Optional(inner) => inner,
            other => other,
        }
    }

    /// JSON Schema fragment for this type; named records become `$ref`s
    pub fn json_schema(&self) -> Value {
        match self {
            Self::Primitive(p) => match p.json_type() {
                Some(ty) => serde_json::json!({ "type": ty }),
                None => serde_json::json!({}),
            },
            Self::Literal(values) => serde_json::json!({ "type": "string", "enum": values }),
            Self::Optional(inner) => {
                serde_json::json!({ "anyOf": [inner.json_schema(), { "type": "null" }] })
            }
            Self::List(inner) => {
                serde_json::json!({ "type": "array", "items": inner.json_schema() })
            }
            Self::Named(record) => {
                serde_json::json!({ "$ref": format!("#/$defs/{}", record.name) })
            }
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(p) => write!(f, "{}", p),
            Self::Literal(values) => write!(f, "Literal[{}]", values.join(", ")),
            Self::Optional(inner) => write!(f, "{}?", inner),
            Self::List(inner) => write!(f, "list[{}]", inner),
            Self::Named(record) => write!(f, "{}", record.name),
        }
    }
}

fn bracketed<'a>(expr: &'a str, heads: &[&str]) -> Option<&'a str> {
    heads.iter().find_map(|head| {
        expr.strip_prefix(head)
            .and_then(|rest| rest.strip_prefix('['))
            .and_then(|rest| rest.strip_suffix(']'))
    })
}

/// One attribute split into its type text and modifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSpec<'a> {
    pub type_text: &'a str,
    pub default: Option<&'a str>,
    pub description: Option<&'a str>,
}

impl<'a> AttributeSpec<'a> {
    /// Split `T = default % description` (modifiers in either order)
    ///
    /// The description is free text, so `%` and `=` inside it are literal
    /// once its own marker has been seen. A default holds neither.
    pub fn split(attribute: &str, spec: &'a str) -> Result<Self, ChainflowError> {
        let eq = spec.find('=');
        let pct = spec.find('%');

        let type_end = match (eq, pct) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => spec.len(),
        };

        let (default, description) = match (eq, pct) {
            (Some(e), Some(p)) if p < e => (Some(&spec[e + 1..]), Some(&spec[p + 1..e])),
            (Some(e), Some(p)) => (Some(&spec[e + 1..p]), Some(&spec[p + 1..])),
            (Some(e), None) => (Some(&spec[e + 1..]), None),
            (None, Some(p)) => (None, Some(&spec[p + 1..])),
            (None, None) => (None, None),
        };

        if let Some(text) = default {
            for modifier in ['=', '%'] {
                if text.contains(modifier) {
                    return Err(ChainflowError::RepeatedModifier {
                        attribute: attribute.to_string(),
                        modifier,
                    });
                }
            }
        }

        Ok(Self {
            type_text: spec[..type_end].trim(),
            default: default.map(str::trim),
            description: description.map(str::trim).filter(|d| !d.is_empty()),
        })
    }
}
