// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! Error types
//!
//! Every failure the compiler or the engine can raise is a variant of
//! [`ChainflowError`]. Variants are grouped by [`ErrorKind`]: compile errors
//! surface before any link executes, resolution and invocation errors abort the
//! run at the link where they are detected.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

use crate::engine::TraceEntry;

/// Result type for chainflow operations
pub type ChainflowResult<T> = Result<T, ChainflowError>;

/// Broad category of a [`ChainflowError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Compile,
    Resolution,
    Invocation,
    Config,
    Cache,
    Io,
}

/// Main error type for chainflow
#[derive(Error, Debug, Diagnostic)]
pub enum ChainflowError {
    // ─────────────────────────────────────────────────────────────────────────
    // Compile Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("line {line}: malformed {directive} directive: {reason}")]
    #[diagnostic(
        code(chainflow::malformed_directive),
        help(
            "Directives are `@chainlink [name] [shape]`, `@tool <name> [shape]` \
             and `@extends <path>`"
        )
    )]
    MalformedDirective {
        line: usize,
        directive: String,
        reason: String,
    },

    #[error("line {line}: unknown link shape '{token}'")]
    #[diagnostic(
        code(chainflow::unknown_shape),
        help("Valid shapes: sequential, --, parallel, ||")
    )]
    UnknownShape { line: usize, token: String },

    #[error("line {line}: a link named '{name}' already exists")]
    #[diagnostic(code(chainflow::duplicate_link))]
    DuplicateLink { line: usize, name: String },

    #[error("line {line}: tool '{name}' clashes with a chainlink of the same name")]
    #[diagnostic(code(chainflow::tool_name_conflict))]
    ToolNameConflict { line: usize, name: String },

    #[error("line {line}: link '{name}' has an empty body")]
    #[diagnostic(code(chainflow::empty_link))]
    EmptyLink { line: usize, name: String },

    #[error("line {line}: link '{name}' follows a parallel link and must declare a mask")]
    #[diagnostic(
        code(chainflow::missing_mask),
        help(
            "Add a `mask` section, or make '{name}' parallel, \
             or make the preceding link sequential"
        )
    )]
    MissingMask { line: usize, name: String },

    #[error("line {line}: link '{name}' declares neither `purpose` nor `prompt`")]
    #[diagnostic(code(chainflow::missing_prompt))]
    MissingPrompt { line: usize, name: String },

    #[error("line {line}: link '{name}' declares both `purpose` and `prompt`")]
    #[diagnostic(
        code(chainflow::conflicting_prompt),
        help(
            "Use `prompt: {{ template: ..., purpose: ... }}` to keep a description \
             next to a literal template"
        )
    )]
    ConflictingPrompt { line: usize, name: String },

    #[error("line {line}: tool '{name}' is not registered")]
    #[diagnostic(code(chainflow::unknown_tool))]
    UnknownTool { line: usize, name: String },

    #[error("line {line}: @extends may only be used once")]
    #[diagnostic(code(chainflow::duplicate_extends))]
    DuplicateExtends { line: usize },

    #[error("cyclic @extends chain through '{path}'")]
    #[diagnostic(code(chainflow::extends_cycle))]
    ExtendsCycle { path: String },

    #[error("failed to load '{path}': {error}")]
    #[diagnostic(code(chainflow::source_load))]
    SourceLoad { path: String, error: String },

    #[error("line {line}: link '{link}': {source}")]
    #[diagnostic(code(chainflow::link))]
    InLink {
        line: usize,
        link: String,
        #[source]
        source: Box<ChainflowError>,
    },

    #[error("invalid `{section}` section: {reason}")]
    #[diagnostic(code(chainflow::invalid_section))]
    InvalidSection { section: String, reason: String },

    #[error("invalid mask: {reason}")]
    #[diagnostic(code(chainflow::invalid_mask))]
    InvalidMask { reason: String },

    #[error("no template generator configured to derive a template for {what}")]
    #[diagnostic(
        code(chainflow::missing_generator),
        help("Provide a literal template or attach a TemplateGenerator to the compiler")
    )]
    MissingGenerator { what: String },

    #[error("attribute '{attribute}': unresolved type '{expr}'")]
    #[diagnostic(
        code(chainflow::unresolved_type),
        help(
            "Built-in types: str, int, float, bool, Any, list, dict, Literal[...]; \
             named types must be declared in an earlier `def`"
        )
    )]
    UnresolvedType { attribute: String, expr: String },

    #[error("attribute '{attribute}': modifier '{modifier}' can only be used once")]
    #[diagnostic(code(chainflow::repeated_modifier))]
    RepeatedModifier { attribute: String, modifier: char },

    #[error("attribute '{attribute}': invalid type expression '{expr}': {reason}")]
    #[diagnostic(code(chainflow::invalid_type_expr))]
    InvalidTypeExpr {
        attribute: String,
        expr: String,
        reason: String,
    },

    #[error("record '{record}': schema does not compile: {reason}")]
    #[diagnostic(code(chainflow::invalid_schema))]
    InvalidSchema { record: String, reason: String },

    #[error("unbalanced braces in template: {template}")]
    #[diagnostic(
        code(chainflow::invalid_template),
        help("Use `{{{{` and `}}}}` for literal braces")
    )]
    InvalidTemplate { template: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Resolution Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("link '{link}': iterable field '{field}' is not present in the previous output")]
    #[diagnostic(code(chainflow::missing_iterable))]
    MissingIterable { link: String, field: String },

    #[error("link '{link}': field '{field}' is not a list")]
    #[diagnostic(code(chainflow::not_iterable))]
    NotIterable { link: String, field: String },

    #[error(
        "link '{link}': all iterable fields must have the same length, \
         {first} has {first_len} elements and {second} has {second_len} elements"
    )]
    #[diagnostic(code(chainflow::iterable_length_mismatch))]
    IterableLengthMismatch {
        link: String,
        first: String,
        first_len: usize,
        second: String,
        second_len: usize,
    },

    #[error("link '{link}': no iterable field found in the output of '{previous}'")]
    #[diagnostic(
        code(chainflow::no_iterable_field),
        help("Parallel links address list elements with paths like `field.element.subfield`")
    )]
    NoIterableField { link: String, previous: String },

    #[error("link '{link}': field address '{variable}' cannot start with 'element'")]
    #[diagnostic(code(chainflow::element_at_root))]
    ElementAtRoot { link: String, variable: String },

    #[error(
        "link '{link}': none of the input variables [{}] match the previous output",
        .variables.join(", ")
    )]
    #[diagnostic(code(chainflow::no_matching_inputs))]
    NoMatchingInputs { link: String, variables: Vec<String> },

    #[error(
        "link '{link}': none of the mask variables resolve in any element \
         of the previous output"
    )]
    #[diagnostic(code(chainflow::mask_unresolved))]
    MaskUnresolved { link: String },

    #[error("link '{link}': the previous output is empty")]
    #[diagnostic(code(chainflow::empty_previous_output))]
    EmptyPreviousOutput { link: String },

    #[error("template variable '{variable}' has no value")]
    #[diagnostic(code(chainflow::missing_template_variable))]
    MissingTemplateVariable { variable: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Invocation Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("tool '{tool}' must return a map or nothing, got {found}")]
    #[diagnostic(code(chainflow::tool_returned_non_map))]
    ToolReturnedNonMap { tool: String, found: String },

    #[error("tool '{tool}' is not registered")]
    #[diagnostic(code(chainflow::tool_not_registered))]
    ToolNotRegistered { tool: String },

    #[error("tool '{tool}' failed: {message}")]
    #[diagnostic(code(chainflow::tool_failed))]
    ToolFailed { tool: String, message: String },

    #[error("completion for link '{link}' failed: {message}")]
    #[diagnostic(code(chainflow::completion_failed))]
    CompletionFailed { link: String, message: String },

    #[error("no completion backend configured")]
    #[diagnostic(
        code(chainflow::missing_completion),
        help("Attach a Completion implementation with Engine::with_completion")
    )]
    MissingCompletion,

    #[error("output does not match '{record}': field '{field}' {reason}")]
    #[diagnostic(code(chainflow::output_mismatch))]
    OutputMismatch {
        record: String,
        field: String,
        reason: String,
    },

    #[error("link '{link}': fan-out worker failed: {message}")]
    #[diagnostic(code(chainflow::worker_failed))]
    WorkerFailed { link: String, message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Run Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("engine input is empty")]
    #[diagnostic(
        code(chainflow::empty_input),
        help("Pass one input map or at least one keyword argument")
    )]
    EmptyInput,

    #[error("run produced an empty trace")]
    #[diagnostic(code(chainflow::empty_trace))]
    EmptyTrace,

    #[error("link '{link}' failed after {} completed link(s): {source}", .trace.len())]
    #[diagnostic(code(chainflow::stage_failed))]
    StageFailed {
        link: String,
        #[source]
        source: Box<ChainflowError>,
        trace: Vec<TraceEntry>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Config Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("invalid configuration for '{field}': {reason}")]
    #[diagnostic(code(chainflow::invalid_config))]
    InvalidConfig { field: String, reason: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Cache Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Cache error: {message}")]
    #[diagnostic(code(chainflow::cache_error))]
    CacheError { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(chainflow::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    #[error("IO error: {message}")]
    #[diagnostic(code(chainflow::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(chainflow::yaml_error))]
    Yaml { message: String },

    #[error("JSON parsing error: {message}")]
    #[diagnostic(code(chainflow::json_error))]
    Json { message: String },

    #[error("TOML parsing error: {message}")]
    #[diagnostic(code(chainflow::toml_error))]
    Toml { message: String },
}

impl From<std::io::Error> for ChainflowError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for ChainflowError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for ChainflowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<toml::de::Error> for ChainflowError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml { message: e.to_string() }
    }
}

impl ChainflowError {
    /// Category of this error; wrappers report the category of what they wrap
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InLink { source, .. } | Self::StageFailed { source, .. } => source.kind(),

            Self::MalformedDirective { .. }
            | Self::UnknownShape { .. }
            | Self::DuplicateLink { .. }
            | Self::ToolNameConflict { .. }
            | Self::EmptyLink { .. }
            | Self::MissingMask { .. }
            | Self::MissingPrompt { .. }
            | Self::ConflictingPrompt { .. }
            | Self::UnknownTool { .. }
            | Self::DuplicateExtends { .. }
            | Self::ExtendsCycle { .. }
            | Self::SourceLoad { .. }
            | Self::InvalidSection { .. }
            | Self::InvalidMask { .. }
            | Self::MissingGenerator { .. }
            | Self::UnresolvedType { .. }
            | Self::RepeatedModifier { .. }
            | Self::InvalidTypeExpr { .. }
            | Self::InvalidSchema { .. }
            | Self::InvalidTemplate { .. }
            | Self::Yaml { .. } => ErrorKind::Compile,

            Self::MissingIterable { .. }
            | Self::NotIterable { .. }
            | Self::IterableLengthMismatch { .. }
            | Self::NoIterableField { .. }
            | Self::ElementAtRoot { .. }
            | Self::NoMatchingInputs { .. }
            | Self::MaskUnresolved { .. }
            | Self::EmptyPreviousOutput { .. }
            | Self::MissingTemplateVariable { .. }
            | Self::EmptyInput
            | Self::EmptyTrace => ErrorKind::Resolution,

            Self::ToolReturnedNonMap { .. }
            | Self::ToolNotRegistered { .. }
            | Self::ToolFailed { .. }
            | Self::CompletionFailed { .. }
            | Self::MissingCompletion
            | Self::OutputMismatch { .. }
            | Self::WorkerFailed { .. } => ErrorKind::Invocation,

            Self::InvalidConfig { .. } | Self::Toml { .. } => ErrorKind::Config,

            Self::CacheError { .. } => ErrorKind::Cache,

            Self::FileReadError { .. } | Self::Io { .. } | Self::Json { .. } => ErrorKind::Io,
        }
    }

    /// Attach the source position of the link being compiled
    pub fn in_link(self, line: usize, link: &str) -> Self {
        match self {
            // Already positioned, either by the directive scanner or a nested link
            Self::InLink { .. }
            | Self::MalformedDirective { .. }
            | Self::UnknownShape { .. }
            | Self::DuplicateLink { .. }
            | Self::EmptyLink { .. }
            | Self::MissingMask { .. }
            | Self::MissingPrompt { .. }
            | Self::ConflictingPrompt { .. }
            | Self::UnknownTool { .. } => self,
            other => Self::InLink {
                line,
                link: link.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Source line of a compile error, if it carries one
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::MalformedDirective { line, .. }
            | Self::UnknownShape { line, .. }
            | Self::DuplicateLink { line, .. }
            | Self::ToolNameConflict { line, .. }
            | Self::EmptyLink { line, .. }
            | Self::MissingMask { line, .. }
            | Self::MissingPrompt { line, .. }
            | Self::ConflictingPrompt { line, .. }
            | Self::UnknownTool { line, .. }
            | Self::DuplicateExtends { line }
            | Self::InLink { line, .. } => Some(*line),
            _ => None,
        }
    }

    /// Whether this error belongs to the compile phase
    pub fn is_compile_error(&self) -> bool {
        self.kind() == ErrorKind::Compile
    }
}
