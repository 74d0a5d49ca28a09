// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! Pipeline DSL
//!
//! A pipeline document is a sequence of directive blocks:
//!
//! ```text
//! @chainlink ideas
//! prompt: List three story ideas about {topic}
//! def:
//!   Idea:
//!     title: str
//! out:
//!   ideas: list[Idea]
//!
//! @chainlink openings ||
//! prompt: Write an opening line for {ideas.element.title}
//! out:
//!   line: str
//!
//! @chainlink pick
//! prompt: Choose the best opening from {pick}
//! mask: "{line}"
//! ```
//!
//! [`Compiler`] turns such a document into a [`Factory`], the ordered list of
//! [`Link`]s the engine executes.

mod compiler;
mod definition;
mod sections;
mod source;
mod template;

pub use compiler::Compiler;
pub use definition::{FanShape, Factory, Link, LinkKind, Mask, Prompt};
pub use sections::{Attributes, LinkSections, MaskSource, PromptSource};
pub use source::{generated_name, Block, Document, Extends, IMPLICIT_LINK};
pub use template::{value_text, Template};
