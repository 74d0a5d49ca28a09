// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! Link body sections
//!
//! A block body is a YAML mapping with the keys `in`, `purpose`, `prompt`,
//! `def`, `out` and `mask`. This module only reads their shape; templates are
//! resolved by the compiler.

use serde_yaml::{Mapping, Value as Yaml};
use tracing::warn;

use crate::errors::ChainflowError;
use crate::resolve::InputVariable;

const KNOWN_SECTIONS: [&str; 6] = ["in", "purpose", "prompt", "def", "out", "mask"];

/// Ordered attribute name to type-expression pairs
pub type Attributes = Vec<(String, String)>;

/// Where a chain link's instruction template comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptSource {
    /// Literal template, with an optional description
    Template { text: String, purpose: Option<String> },
    /// Template to be generated from a purpose
    Purpose(String),
}

/// Where a mask's template comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaskSource {
    /// Literal template; explicit variables override the placeholders
    Template { text: String, variables: Vec<String> },
    /// Generated from the previous link's `out` fields
    Auto,
    /// Generated from the given variables
    Variables(Vec<String>),
}

/// `prompt` as written
#[derive(Debug, Clone, PartialEq, Eq)]
enum PromptSection {
    Text(String),
    Object {
        template: Option<String>,
        purpose: Option<String>,
    },
}

/// Parsed sections of one block body
#[derive(Debug, Clone, Default)]
pub struct LinkSections {
    pub input: Vec<InputVariable>,
    pub definitions: Vec<(String, Attributes)>,
    pub output: Option<Attributes>,
    pub mask: Option<MaskSource>,
    purpose: Option<String>,
    prompt: Option<PromptSection>,
}

impl LinkSections {
    /// Parse a block body
    pub fn parse(body: &str) -> Result<Self, ChainflowError> {
        let root: Yaml = if body.trim().is_empty() {
            Yaml::Mapping(Mapping::new())
        } else {
            serde_yaml::from_str(body)?
        };

        let root = match root {
            Yaml::Mapping(m) => m,
            Yaml::Null => Mapping::new(),
            other => {
                return Err(invalid(
                    "<body>",
                    format!("expected a mapping of sections, got {}", yaml_kind(&other)),
                ))
            }
        };

        let mut sections = Self::default();

        for (key, value) in &root {
            let key = scalar_text(key).unwrap_or_default();
            match key.as_str() {
                "in" => sections.input = parse_input(value)?,
                "purpose" => sections.purpose = Some(text_section("purpose", value)?),
                "prompt" => sections.prompt = Some(parse_prompt(value)?),
                "def" => sections.definitions = parse_definitions(value)?,
                "out" => sections.output = Some(parse_attributes("out", value)?),
                "mask" => sections.mask = Some(parse_mask(value)?),
                other => {
                    warn!(section = %other, known = ?KNOWN_SECTIONS, "ignoring unknown section")
                }
            }
        }

        Ok(sections)
    }

    /// Whether the body uses any section a tool link ignores
    pub fn has_prompt_sections(&self) -> bool {
        self.purpose.is_some() || self.prompt.is_some() || self.mask.is_some()
    }

    /// Decide where the instruction template comes from
    pub fn prompt_source(&self, line: usize, name: &str) -> Result<PromptSource, ChainflowError> {
        match (&self.purpose, &self.prompt) {
            (Some(_), Some(_)) => Err(ChainflowError::ConflictingPrompt {
                line,
                name: name.to_string(),
            }),
            (Some(purpose), None) => Ok(PromptSource::Purpose(purpose.clone())),
            (None, Some(PromptSection::Text(text))) => Ok(PromptSource::Template {
                text: text.clone(),
                purpose: None,
            }),
            (None, Some(PromptSection::Object { template: Some(text), purpose })) => {
                Ok(PromptSource::Template {
                    text: text.clone(),
                    purpose: purpose.clone(),
                })
            }
            (None, Some(PromptSection::Object { template: None, purpose: Some(purpose) })) => {
                Ok(PromptSource::Purpose(purpose.clone()))
            }
            (None, Some(PromptSection::Object { template: None, purpose: None }))
            | (None, None) => {
                Err(ChainflowError::MissingPrompt {
                    line,
                    name: name.to_string(),
                })
            }
        }
    }
}

fn parse_input(value: &Yaml) -> Result<Vec<InputVariable>, ChainflowError> {
    match value {
        Yaml::Null => Ok(Vec::new()),
        // Annotations are documentation only
        Yaml::Mapping(map) => map
            .keys()
            .map(|k| {
                scalar_text(k)
                    .map(|k| InputVariable::parse(&k))
                    .ok_or_else(|| invalid("in", "variable names must be scalars"))
            })
            .collect(),
        Yaml::Sequence(items) => items
            .iter()
            .map(|v| {
                scalar_text(v)
                    .map(|v| InputVariable::parse(&v))
                    .ok_or_else(|| invalid("in", "variable names must be scalars"))
            })
            .collect(),
        Yaml::String(name) => Ok(vec![InputVariable::parse(name)]),
        other => Err(invalid("in", format!("expected a map or a list, got {}", yaml_kind(other)))),
    }
}

fn parse_prompt(value: &Yaml) -> Result<PromptSection, ChainflowError> {
    match value {
        Yaml::String(text) => Ok(PromptSection::Text(text.clone())),
        Yaml::Mapping(map) => {
            let field = |key: &str| -> Result<Option<String>, ChainflowError> {
                map.get(key).map(|v| text_section("prompt", v)).transpose()
            };
            Ok(PromptSection::Object {
                template: field("template")?,
                purpose: field("purpose")?,
            })
        }
        other => Err(invalid(
            "prompt",
            format!("expected text or a mapping, got {}", yaml_kind(other)),
        )),
    }
}

fn parse_definitions(value: &Yaml) -> Result<Vec<(String, Attributes)>, ChainflowError> {
    let Yaml::Mapping(map) = value else {
        return Err(invalid("def", "expected a mapping of type names"));
    };

    map.iter()
        .map(|(name, attributes)| {
            let name =
                scalar_text(name).ok_or_else(|| invalid("def", "type names must be scalars"))?;
            Ok((name, parse_attributes("def", attributes)?))
        })
        .collect()
}

fn parse_attributes(section: &str, value: &Yaml) -> Result<Attributes, ChainflowError> {
    let Yaml::Mapping(map) = value else {
        return Err(invalid(
            section,
            format!("expected a mapping of attributes, got {}", yaml_kind(value)),
        ));
    };

    map.iter()
        .map(|(attribute, spec)| {
            let attribute = scalar_text(attribute)
                .ok_or_else(|| invalid(section, "attribute names must be scalars"))?;
            let spec = scalar_text(spec).ok_or_else(|| {
                invalid(section, format!("attribute '{}' needs a type expression", attribute))
            })?;
            Ok((attribute, spec))
        })
        .collect()
}

fn parse_mask(value: &Yaml) -> Result<MaskSource, ChainflowError> {
    match value {
        Yaml::String(text) if text.trim() == "auto" => Ok(MaskSource::Auto),
        Yaml::String(text) => Ok(MaskSource::Template {
            text: text.clone(),
            variables: Vec::new(),
        }),
        Yaml::Mapping(map) => {
            let template = map.get("template").map(|v| text_section("mask", v)).transpose()?;
            let variables = match map.get("variables") {
                None | Some(Yaml::Null) => Vec::new(),
                Some(Yaml::Sequence(items)) => items
                    .iter()
                    .map(|v| {
                        scalar_text(v).ok_or_else(|| invalid("mask", "variables must be scalars"))
                    })
                    .collect::<Result<_, _>>()?,
                Some(other) => {
                    let reason = format!("variables must be a list, got {}", yaml_kind(other));
                    return Err(invalid("mask", reason));
                }
            };

            match template {
                Some(text) => Ok(MaskSource::Template { text, variables }),
                None if !variables.is_empty() => Ok(MaskSource::Variables(variables)),
                None => Err(ChainflowError::InvalidMask {
                    reason: "a mask object needs `template` or `variables`".to_string(),
                }),
            }
        }
        other => Err(invalid(
            "mask",
            format!("expected text, \"auto\" or a mapping, got {}", yaml_kind(other)),
        )),
    }
}

fn text_section(section: &str, value: &Yaml) -> Result<String, ChainflowError> {
    match value {
        Yaml::String(text) => Ok(text.clone()),
        other => Err(invalid(section, format!("expected text, got {}", yaml_kind(other)))),
    }
}

fn scalar_text(value: &Yaml) -> Option<String> {
    match value {
        Yaml::String(s) => Some(s.clone()),
        Yaml::Number(n) => Some(n.to_string()),
        Yaml::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn yaml_kind(value: &Yaml) -> &'static str {
    match value {
        Yaml::Null => "null",
        Yaml::Bool(_) => "a boolean",
        Yaml::Number(_) => "a number",
        Yaml::String(_) => "text",
        Yaml::Sequence(_) => "a list",
        Yaml::Mapping(_) => "a mapping",
        Yaml::Tagged(_) => "a tagged value",
    }
}

fn invalid(section: &str, reason: impl Into<String>) -> ChainflowError {
    ChainflowError::InvalidSection {
        section: section.to_string(),
        reason: reason.into(),
    }
}
