// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! Instruction and mask templates
//!
//! `{name}` is a placeholder, `{{` and `}}` are literal braces. Placeholder
//! names are stored in canonical `$`-separated form, so `{gen.title}` and
//! `{gen$title}` are the same variable.

use serde_json::{Map, Value};
use std::fmt;

use crate::errors::ChainflowError;
use crate::resolve::FieldPath;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parse template text
    pub fn parse(text: &str) -> Result<Self, ChainflowError> {
        let invalid = || ChainflowError::InvalidTemplate {
            template: text.to_string(),
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') | None => return Err(invalid()),
                            Some(c) => name.push(c),
                        }
                    }

                    let path = FieldPath::parse(&name);
                    if path.segments().is_empty() {
                        return Err(invalid());
                    }

                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(path.canonical()));
                }
                '}' => return Err(invalid()),
                c => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    /// Placeholder names in order of first appearance
    pub fn variables(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for segment in &self.segments {
            if let Segment::Placeholder(name) = segment {
                if !seen.contains(name) {
                    seen.push(name.clone());
                }
            }
        }
        seen
    }

    /// Whether the template has at least one placeholder
    pub fn has_variables(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Placeholder(_)))
    }

    /// Rename every occurrence of placeholder `from` to `to`
    pub fn rename(&mut self, from: &str, to: &str) {
        for segment in &mut self.segments {
            if let Segment::Placeholder(name) = segment {
                if name == from {
                    *name = to.to_string();
                }
            }
        }
    }

    /// Substitute values; strings are inserted verbatim, other values as compact JSON
    pub fn render(&self, values: &Map<String, Value>) -> Result<String, ChainflowError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => {
                    let value = values
                        .get(name)
                        .ok_or_else(|| ChainflowError::MissingTemplateVariable {
                            variable: name.clone(),
                        })?;
                    out.push_str(&value_text(value));
                }
            }
        }
        Ok(out)
    }
}

/// Template source text with canonical placeholders and escaped braces
impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => {
                    write!(f, "{}", text.replace('{', "{{").replace('}', "}}"))?
                }
                Segment::Placeholder(name) => write!(f, "{{{}}}", name)?,
            }
        }
        Ok(())
    }
}

/// Text form of a value inside rendered instructions
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_variables_are_canonical() {
        let template = Template::parse("Write about {topic} in {style.tone} ({topic})").unwrap();
        assert_eq!(template.variables(), vec!["topic", "style$tone"]);
        assert_eq!(template.to_string(), "Write about {topic} in {style$tone} ({topic})");
    }

    #[test]
    fn test_escaped_braces() {
        let template = Template::parse("Return {{\"k\": {v}}}").unwrap();
        assert_eq!(template.variables(), vec!["v"]);
        let rendered = template.render(&map(json!({ "v": 1 }))).unwrap();
        assert_eq!(rendered, "Return {\"k\": 1}");
    }

    #[test]
    fn test_unbalanced_braces_rejected() {
        assert!(Template::parse("oops {name").is_err());
        assert!(Template::parse("oops }").is_err());
        assert!(Template::parse("empty {}").is_err());
    }

    #[test]
    fn test_render_is_idempotent() {
        let template = Template::parse("{title}: {score}").unwrap();
        let values = map(json!({ "title": "Dune", "score": 9.5 }));

        let first = template.render(&values).unwrap();
        let second = template.render(&values).unwrap();
        assert_eq!(first, "Dune: 9.5");
        assert_eq!(first, second);
    }

    #[test]
    fn test_render_missing_variable() {
        let template = Template::parse("{a} {b}").unwrap();
        let err = template.render(&map(json!({ "a": 1 }))).unwrap_err();
        assert!(matches!(
            err,
            ChainflowError::MissingTemplateVariable { variable } if variable == "b"
        ));
    }

    #[test]
    fn test_rename() {
        let mut template = Template::parse("{x} and {x}").unwrap();
        template.rename("x", "gen$element$x");
        assert_eq!(template.variables(), vec!["gen$element$x"]);
    }
}
