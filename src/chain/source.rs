// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! Directive scanner
//!
//! Splits a pipeline document into blocks at `@chainlink`, `@tool` and
//! `@extends` lines. Block bodies are kept verbatim apart from indentation:
//! each leading pair of spaces is stored as a tab and expanded again when the
//! body is handed to the YAML parser.

use uuid::Uuid;

use super::definition::{FanShape, LinkKind};
use crate::errors::ChainflowError;

const CHAINLINK: &str = "@chainlink";
const TOOL: &str = "@tool";
const EXTENDS: &str = "@extends";

/// Name given to the link of a document without directives
pub const IMPLICIT_LINK: &str = "chainlink-0";

/// Generate a name for an unnamed link
pub fn generated_name() -> String {
    format!("chainlink-{}", Uuid::new_v4().simple())
}

/// `@extends` target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extends {
    pub line: usize,
    pub path: String,
}

/// One directive and the lines that belong to it
#[derive(Debug, Clone)]
pub struct Block {
    pub name: String,
    pub kind: LinkKind,
    pub shape: FanShape,
    /// 1-based line of the directive
    pub line: usize,
    lines: Vec<String>,
}

impl Block {
    fn new(name: String, kind: LinkKind, shape: FanShape, line: usize) -> Self {
        Self {
            name,
            kind,
            shape,
            line,
            lines: Vec::new(),
        }
    }

    /// Whether the block has no content besides blank lines
    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|l| l.trim().is_empty())
    }

    /// Body text ready for the YAML parser
    pub fn body(&self) -> String {
        self.lines
            .iter()
            .map(|line| {
                let tabs = line.chars().take_while(|&c| c == '\t').count();
                format!("{}{}", "  ".repeat(tabs), &line[tabs..])
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A scanned pipeline document
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub extends: Option<Extends>,
    pub blocks: Vec<Block>,
}

impl Document {
    /// Split `source` into blocks
    pub fn scan(source: &str) -> Result<Self, ChainflowError> {
        let has_directive = source
            .lines()
            .any(|line| directive_of(line.trim_start()).is_some());

        if !has_directive {
            let mut block = Block::new(
                IMPLICIT_LINK.to_string(),
                LinkKind::Chain,
                FanShape::Sequential,
                1,
            );
            block.lines = source
                .lines()
                .filter(|l| !l.starts_with('#'))
                .map(normalize_indent)
                .collect();
            return Ok(Self {
                extends: None,
                blocks: vec![block],
            });
        }

        let mut document = Self::default();
        let mut current: Option<Block> = None;

        for (index, raw) in source.lines().enumerate() {
            let line = index + 1;
            let trimmed = raw.trim();

            if let Some(directive) = directive_of(trimmed) {
                let tokens: Vec<&str> = trimmed.split_whitespace().skip(1).collect();
                if let Some(block) = current.take() {
                    document.blocks.push(block);
                }

                match directive {
                    EXTENDS => document.set_extends(line, &tokens)?,
                    TOOL => current = Some(tool_block(line, &tokens)?),
                    _ => current = Some(chainlink_block(line, &tokens)?),
                }
                continue;
            }

            // Column-0 comments only: indented `#` may be literal block content
            if raw.starts_with('#') {
                continue;
            }

            match current {
                Some(ref mut block) => block.lines.push(normalize_indent(raw)),
                None if trimmed.is_empty() => {}
                None => {
                    let mut block =
                        Block::new(generated_name(), LinkKind::Chain, FanShape::Sequential, line);
                    block.lines.push(normalize_indent(raw));
                    current = Some(block);
                }
            }
        }

        if let Some(block) = current {
            document.blocks.push(block);
        }

        Ok(document)
    }

    fn set_extends(&mut self, line: usize, tokens: &[&str]) -> Result<(), ChainflowError> {
        if self.extends.is_some() {
            return Err(ChainflowError::DuplicateExtends { line });
        }

        match tokens {
            [path] => {
                self.extends = Some(Extends {
                    line,
                    path: path.to_string(),
                });
                Ok(())
            }
            _ => Err(malformed(line, EXTENDS, "expected exactly one path")),
        }
    }
}

fn directive_of(trimmed: &str) -> Option<&'static str> {
    let head = trimmed.split_whitespace().next()?;
    [CHAINLINK, TOOL, EXTENDS].into_iter().find(|d| *d == head)
}

fn chainlink_block(line: usize, tokens: &[&str]) -> Result<Block, ChainflowError> {
    let (name, shape) = match tokens {
        [] => (generated_name(), FanShape::Sequential),
        [token] => match FanShape::from_token(token) {
            Some(shape) => (generated_name(), shape),
            None => (token.to_string(), FanShape::Sequential),
        },
        [name, token] => (name.to_string(), parse_shape(line, token)?),
        _ => return Err(malformed(line, CHAINLINK, "too many tokens")),
    };

    Ok(Block::new(name, LinkKind::Chain, shape, line))
}

fn tool_block(line: usize, tokens: &[&str]) -> Result<Block, ChainflowError> {
    let (name, shape) = match tokens {
        [] => return Err(malformed(line, TOOL, "missing tool name")),
        [name] if FanShape::from_token(name).is_some() => {
            return Err(malformed(line, TOOL, "missing tool name"))
        }
        [name] => (name.to_string(), FanShape::Sequential),
        [name, token] => (name.to_string(), parse_shape(line, token)?),
        _ => return Err(malformed(line, TOOL, "too many tokens")),
    };

    Ok(Block::new(name, LinkKind::Tool, shape, line))
}

fn parse_shape(line: usize, token: &str) -> Result<FanShape, ChainflowError> {
    FanShape::from_token(token).ok_or_else(|| ChainflowError::UnknownShape {
        line,
        token: token.to_string(),
    })
}

fn malformed(line: usize, directive: &str, reason: &str) -> ChainflowError {
    ChainflowError::MalformedDirective {
        line,
        directive: directive.to_string(),
        reason: reason.to_string(),
    }
}

/// Store each leading double space as a tab
fn normalize_indent(raw: &str) -> String {
    let mut rest = raw;
    let mut tabs = 0;
    loop {
        if let Some(r) = rest.strip_prefix("  ") {
            rest = r;
            tabs += 1;
        } else if let Some(r) = rest.strip_prefix('\t') {
            rest = r;
            tabs += 1;
        } else {
            break;
        }
    }
    format!("{}{}", "\t".repeat(tabs), rest)
}
