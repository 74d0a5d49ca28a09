// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! Schema builder
//!
//! Turns the textual attribute maps of `def` and `out` sections into
//! [`RecordType`]s. Type expressions are parsed once into a [`TypeExpr`] tree;
//! references to declared records are resolved at build time, so a built record
//! is self-contained and can be shared between links.

mod expr;
mod record;

pub use expr::{AttributeSpec, Primitive, TypeExpr};
pub use record::{DefinitionTable, FieldSpec, RecordType};
