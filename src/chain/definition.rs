// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! Compiled pipeline model
//!
//! A [`Factory`] is the ordered list of [`Link`]s produced by the compiler plus
//! the definition table visible after the last link. Links are immutable once
//! built and shared with the engine behind `Arc`.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use super::template::Template;
use crate::resolve::{FieldPath, InputVariable};
use crate::schema::{DefinitionTable, RecordType};

/// How a link consumes its predecessor's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FanShape {
    /// One invocation per run
    #[default]
    Sequential,
    /// One concurrent invocation per element of the predecessor's list output
    Parallel,
}

impl FanShape {
    /// Parse a shape token (`sequential`, `--`, `parallel`, `||`)
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "sequential" | "--" => Some(Self::Sequential),
            "parallel" | "||" => Some(Self::Parallel),
            _ => None,
        }
    }

    pub fn is_parallel(self) -> bool {
        self == Self::Parallel
    }
}

impl fmt::Display for FanShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Parallel => write!(f, "parallel"),
        }
    }
}

/// What backs a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// Rendered instruction sent to the completion backend
    Chain,
    /// Registered tool function
    Tool,
}

/// Instruction template of a chain link
#[derive(Debug, Clone)]
pub struct Prompt {
    pub template: Template,
    /// Purpose the template was generated from, or its description
    pub purpose: Option<String>,
}

/// Projection applied to each element of a parallel predecessor's output
#[derive(Debug, Clone)]
pub struct Mask {
    pub template: Template,
    pub variables: Vec<FieldPath>,
}

impl Mask {
    /// Build a mask from a template; its placeholders are the variables
    pub fn from_template(template: Template) -> Self {
        let variables = template
            .variables()
            .iter()
            .map(|v| FieldPath::parse(v))
            .collect();
        Self { template, variables }
    }
}

/// One compiled stage of a pipeline
#[derive(Debug, Clone)]
pub struct Link {
    pub name: String,
    pub shape: FanShape,
    pub kind: LinkKind,
    /// 1-based line of the directive that opened the link
    pub line: usize,
    /// Instruction template; `None` for tools
    pub prompt: Option<Prompt>,
    /// Variables the link consumes, from `in` or the template placeholders
    pub variables: Vec<InputVariable>,
    /// Whether the variables were declared with `in`
    pub declared_input: bool,
    /// Expected output record
    pub output: Option<Arc<RecordType>>,
    /// Records declared by this link's `def` section
    pub definitions: DefinitionTable,
    pub mask: Option<Mask>,
    /// Sequential link directly after a parallel one
    pub convex: bool,
}

impl Link {
    pub fn is_tool(&self) -> bool {
        self.kind == LinkKind::Tool
    }

    /// Rewrite variables to address one element of `previous`'s list output
    ///
    /// Applied to a parallel link following a parallel link: `x` becomes
    /// `previous$element$x` and `element$x` becomes `previous$element$x`.
    /// Template placeholders are renamed to match unless the variable is aliased.
    pub fn qualify_for_element(&mut self, previous: &str) {
        for variable in &mut self.variables {
            if variable.path.starts_with(previous) {
                continue;
            }

            let qualified = if variable.path.starts_with(crate::resolve::ELEMENT) {
                variable.path.prefixed(&[previous])
            } else {
                variable.path.prefixed(&[previous, crate::resolve::ELEMENT])
            };

            if variable.alias.is_none() {
                if let Some(ref mut prompt) = self.prompt {
                    prompt
                        .template
                        .rename(&variable.path.canonical(), &qualified.canonical());
                }
            }

            variable.path = qualified;
        }
    }
}

/// A compiled pipeline
#[derive(Debug, Clone, Default)]
pub struct Factory {
    /// Links in execution order, base links first
    pub links: Vec<Arc<Link>>,
    /// Every record visible after the last link
    pub definitions: DefinitionTable,
    /// Pipeline named by `@extends`, already prepended to `links`
    pub base: Option<Box<Factory>>,
}

impl Factory {
    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Find a link by name; for repeated tools the first one wins
    pub fn link(&self, name: &str) -> Option<&Arc<Link>> {
        self.links.iter().find(|l| l.name == name)
    }

    pub fn link_names(&self) -> Vec<&str> {
        self.links.iter().map(|l| l.name.as_str()).collect()
    }

    pub fn last(&self) -> Option<&Arc<Link>> {
        self.links.last()
    }
}
