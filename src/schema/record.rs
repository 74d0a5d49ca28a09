// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! Structural record types and the definition table

use jsonschema::Validator;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::expr::{AttributeSpec, Primitive, TypeExpr};
use crate::errors::ChainflowError;

/// One field of a record
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub ty: TypeExpr,
    pub default: Option<Value>,
    pub description: Option<String>,
}

/// A named set of typed fields
#[derive(Debug, Clone)]
pub struct RecordType {
    pub name: String,
    pub fields: Vec<FieldSpec>,
    validator: CompiledSchema,
}

/// A record's JSON Schema, compiled once at build time
#[derive(Clone)]
struct CompiledSchema(Arc<Validator>);

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompiledSchema")
    }
}

impl RecordType {
    /// Build a record from an ordered attribute -> type-expression list
    ///
    /// Building performs no caching and is idempotent for identical inputs.
    pub fn build(
        name: &str,
        attributes: &[(String, String)],
        known: &DefinitionTable,
    ) -> Result<Self, ChainflowError> {
        let mut fields = Vec::with_capacity(attributes.len());

        for (attribute, spec) in attributes {
            let parts = AttributeSpec::split(attribute, spec)?;
            let ty = TypeExpr::parse(attribute, parts.type_text, known)?;
            let default = match parts.default {
                Some(text) => {
                    let value = parse_default(attribute, &ty, text)?;
                    check_default(attribute, &ty, text, &value)?;
                    Some(value)
                }
                None => None,
            };

            fields.push(FieldSpec {
                name: attribute.clone(),
                ty,
                default,
                description: parts.description.map(str::to_string),
            });
        }

        let schema = record_schema(name, &fields);
        let validator = Validator::new(&schema).map_err(|e| ChainflowError::InvalidSchema {
            record: name.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            name: name.to_string(),
            fields,
            validator: CompiledSchema(Arc::new(validator)),
        })
    }

    /// Get a field by name
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field names in declaration order
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Check `value` against this record, filling defaults and dropping unknown keys
    ///
    /// The shaped value is validated against [`RecordType::json_schema`]; the first
    /// violation is reported with its location as `a.b[2].c`.
    pub fn conform(&self, value: &Value) -> Result<Value, ChainflowError> {
        let shaped = self.shape(value);

        let violation = self.validator.0.iter_errors(&shaped).next().map(|error| {
            let mut field = field_path(&error.instance_path.to_string());
            let message = error.to_string();
            if format!("{:?}", error.kind).contains("Required") {
                if let Some(missing) = quoted(&message) {
                    if !field.is_empty() {
                        field.push('.');
                    }
                    field.push_str(missing);
                }
            }
            (field, message)
        });

        match violation {
            Some((field, reason)) => Err(self.mismatch(&field, reason)),
            None => Ok(shaped),
        }
    }

    /// Fill missing defaults and optionals and drop unknown keys, recursively
    fn shape(&self, value: &Value) -> Value {
        let Value::Object(object) = value else {
            return value.clone();
        };

        let mut shaped = Map::new();
        for field in &self.fields {
            let filled = match object.get(&field.name) {
                Some(v) => shape_type(&field.ty, v),
                None => match (&field.default, field.ty.is_optional()) {
                    (Some(default), _) => default.clone(),
                    (None, true) => Value::Null,
                    // left out so the schema reports it
                    (None, false) => continue,
                },
            };
            shaped.insert(field.name.clone(), filled);
        }

        Value::Object(shaped)
    }

    fn mismatch(&self, field: &str, reason: String) -> ChainflowError {
        ChainflowError::OutputMismatch {
            record: self.name.clone(),
            field: if field.is_empty() { "<root>".into() } else { field.into() },
            reason,
        }
    }

    /// JSON Schema describing this record, with referenced records under `$defs`
    pub fn json_schema(&self) -> Value {
        record_schema(&self.name, &self.fields)
    }
}

fn shape_type(ty: &TypeExpr, value: &Value) -> Value {
    match (ty, value) {
        (TypeExpr::Optional(inner), v) => shape_type(inner, v),
        (TypeExpr::Named(record), v) => record.shape(v),
        (TypeExpr::List(inner), Value::Array(items)) => {
            Value::Array(items.iter().map(|item| shape_type(inner, item)).collect())
        }
        (_, v) => v.clone(),
    }
}

fn record_schema(name: &str, fields: &[FieldSpec]) -> Value {
    let mut defs = Map::new();
    for field in fields {
        collect_defs(&field.ty, &mut defs);
    }

    let mut schema = object_schema(name, fields);
    if !defs.is_empty() {
        schema["$defs"] = Value::Object(defs);
    }
    schema
}

fn object_schema(name: &str, fields: &[FieldSpec]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for field in fields {
        let mut property = field.ty.json_schema();
        if let Some(ref description) = field.description {
            property["description"] = Value::String(description.clone());
        }
        if let Some(ref default) = field.default {
            property["default"] = default.clone();
        } else if !field.ty.is_optional() {
            required.push(Value::String(field.name.clone()));
        }
        properties.insert(field.name.clone(), property);
    }

    serde_json::json!({
        "title": name,
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn collect_defs(ty: &TypeExpr, defs: &mut Map<String, Value>) {
    match ty {
        TypeExpr::Optional(inner) | TypeExpr::List(inner) => collect_defs(inner, defs),
        TypeExpr::Named(record) => {
            if !defs.contains_key(&record.name) {
                defs.insert(record.name.clone(), object_schema(&record.name, &record.fields));
                for field in &record.fields {
                    collect_defs(&field.ty, defs);
                }
            }
        }
        TypeExpr::Primitive(_) | TypeExpr::Literal(_) => {}
    }
}

/// Text defaults stay verbatim; everything else is read as a YAML scalar
fn parse_default(attribute: &str, ty: &TypeExpr, text: &str) -> Result<Value, ChainflowError> {
    if matches!(
        ty.unwrap_optional(),
        TypeExpr::Primitive(Primitive::Text) | TypeExpr::Literal(_)
    ) {
        return Ok(Value::String(text.trim_matches(|c| c == '"' || c == '\'').to_string()));
    }

    serde_yaml::from_str::<Value>(text).map_err(|e| ChainflowError::InvalidTypeExpr {
        attribute: attribute.to_string(),
        expr: text.to_string(),
        reason: format!("invalid default value: {}", e),
    })
}

fn check_default(
    attribute: &str,
    ty: &TypeExpr,
    text: &str,
    value: &Value,
) -> Result<(), ChainflowError> {
    let invalid = |reason: String| ChainflowError::InvalidTypeExpr {
        attribute: attribute.to_string(),
        expr: text.to_string(),
        reason,
    };

    let mut schema = ty.json_schema();
    let mut defs = Map::new();
    collect_defs(ty, &mut defs);
    if !defs.is_empty() {
        schema["$defs"] = Value::Object(defs);
    }

    let validator = Validator::new(&schema).map_err(|e| invalid(e.to_string()))?;
    if validator.is_valid(value) {
        Ok(())
    } else {
        Err(invalid(format!("default {} is not a valid {}", value, ty)))
    }
}

/// `/haikus/1/haiku` -> `haikus[1].haiku`
fn field_path(pointer: &str) -> String {
    let mut path = String::new();
    for token in pointer.split('/').skip(1) {
        let token = token.replace("~1", "/").replace("~0", "~");
        if token.parse::<usize>().is_ok() {
            path.push_str(&format!("[{}]", token));
        } else {
            if !path.is_empty() {
                path.push('.');
            }
            path.push_str(&token);
        }
    }
    path
}

fn quoted(message: &str) -> Option<&str> {
    let start = message.find('"')? + 1;
    let len = message[start..].find('"')?;
    Some(&message[start..start + len])
}

/// User-declared record types, in declaration order
///
/// Redefining a name replaces the earlier record but keeps its position.
#[derive(Debug, Clone, Default)]
pub struct DefinitionTable {
    records: Vec<Arc<RecordType>>,
    index: HashMap<String, usize>,
}

impl DefinitionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and register each declaration in order; later ones may reference earlier ones
    pub fn define_all(
        &mut self,
        declarations: &[(String, Vec<(String, String)>)],
    ) -> Result<(), ChainflowError> {
        for (name, attributes) in declarations {
            let record = RecordType::build(name, attributes, self)?;
            self.insert(Arc::new(record));
        }
        Ok(())
    }

    /// Register a record
    pub fn insert(&mut self, record: Arc<RecordType>) {
        match self.index.get(&record.name) {
            Some(&i) => self.records[i] = record,
            None => {
                self.index.insert(record.name.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    /// Merge every record of `other` into this table
    pub fn extend(&mut self, other: &DefinitionTable) {
        for record in &other.records {
            self.insert(Arc::clone(record));
        }
    }

    /// Look up a record by name
    pub fn get(&self, name: &str) -> Option<Arc<RecordType>> {
        self.index.get(name).map(|&i| Arc::clone(&self.records[i]))
    }

    /// Whether a record is declared
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Declared names in order
    pub fn names(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
