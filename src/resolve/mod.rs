// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! Field resolver
//!
//! Builds the input of a link from the previous link's output. Variables are
//! matched by direct key first, then by path traversal. A path whose head names
//! an earlier link is looked up in the [`StageHistory`] instead of the
//! immediate predecessor, which lets a link reach back past a parallel link.

mod path;

pub use path::{traverse, FieldPath, ELEMENT, SEPARATOR};

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::errors::ChainflowError;

/// A declared input variable, optionally renamed with `path as alias`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputVariable {
    pub path: FieldPath,
    pub alias: Option<String>,
}

impl InputVariable {
    /// Parse `path` or `path as alias`
    pub fn parse(spec: &str) -> Self {
        match spec.split_once(" as ") {
            Some((path, alias)) if !alias.trim().is_empty() => Self {
                path: FieldPath::parse(path),
                alias: Some(alias.trim().to_string()),
            },
            _ => Self::from_path(FieldPath::parse(spec)),
        }
    }

    pub fn from_path(path: FieldPath) -> Self {
        Self { path, alias: None }
    }

    /// Key under which the resolved value is handed to the link
    pub fn key(&self) -> String {
        self.alias.clone().unwrap_or_else(|| self.path.canonical())
    }
}

/// Outputs of every link executed so far, keyed by link name
#[derive(Debug, Clone, Default)]
pub struct StageHistory {
    outputs: HashMap<String, Value>,
}

impl StageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a link's output; a later link with the same name replaces it
    pub fn record(&mut self, link: &str, output: Value) {
        self.outputs.insert(link.to_string(), output);
    }

    pub fn get(&self, link: &str) -> Option<&Value> {
        self.outputs.get(link)
    }

    pub fn contains(&self, link: &str) -> bool {
        self.outputs.contains_key(link)
    }
}

/// Result of looking up one variable
enum Lookup<'a> {
    /// Found, possibly as a null leaf of a known root
    Found(Option<&'a Value>),
    /// Root of the path is unknown
    Unmatched,
}

/// Resolves variables against a previous output and the history side-table
pub struct FieldResolver<'a> {
    history: &'a StageHistory,
}

impl<'a> FieldResolver<'a> {
    pub fn new(history: &'a StageHistory) -> Self {
        Self { history }
    }

    fn lookup<'v>(&'v self, path: &FieldPath, previous: &'v Map<String, Value>) -> Lookup<'v> {
        if let Some(value) = previous.get(&path.canonical()) {
            return Lookup::Found(Some(value));
        }

        if path.is_simple() {
            return Lookup::Unmatched;
        }

        let Some(head) = path.head() else {
            return Lookup::Unmatched;
        };

        if let Some(output) = self.history.get(head) {
            return Lookup::Found(traverse(output, path.tail()));
        }

        match previous.get(head) {
            Some(root) => Lookup::Found(traverse(root, path.tail())),
            None => Lookup::Unmatched,
        }
    }

    /// Build the input of a sequential link
    ///
    /// With no declared variables the previous output passes through unchanged.
    /// Otherwise at least one variable must match, or the link fails with a
    /// piping error instead of running on an empty input.
    pub fn resolve(
        &self,
        link: &str,
        variables: &[InputVariable],
        previous: &Value,
    ) -> Result<Map<String, Value>, ChainflowError> {
        let Value::Object(previous) = previous else {
            return Err(ChainflowError::EmptyPreviousOutput { link: link.to_string() });
        };

        if variables.is_empty() {
            return Ok(previous.clone());
        }

        let mut input = Map::new();
        for variable in variables {
            if let Lookup::Found(value) = self.lookup(&variable.path, previous) {
                input.insert(variable.key(), value.cloned().unwrap_or(Value::Null));
            }
        }

        if input.is_empty() {
            return Err(ChainflowError::NoMatchingInputs {
                link: link.to_string(),
                variables: variables.iter().map(InputVariable::key).collect(),
            });
        }

        Ok(input)
    }

    /// Like [`resolve`](Self::resolve) but tolerant of unmatched variables
    pub fn resolve_available(
        &self,
        variables: &[InputVariable],
        previous: &Value,
    ) -> Map<String, Value> {
        let mut input = Map::new();
        if let Value::Object(previous) = previous {
            for variable in variables {
                if let Lookup::Found(value) = self.lookup(&variable.path, previous) {
                    input.insert(variable.key(), value.cloned().unwrap_or(Value::Null));
                }
            }
        }
        input
    }

    /// Split the previous output into one input map per element
    ///
    /// Variables containing `element` address an iterable; all of them must
    /// address iterables of equal length. Other matched variables are broadcast
    /// into every element's input.
    pub fn partition(
        &self,
        link: &str,
        previous_link: &str,
        variables: &[InputVariable],
        previous: &Value,
    ) -> Result<Vec<Map<String, Value>>, ChainflowError> {
        let Value::Object(previous) = previous else {
            return Err(ChainflowError::EmptyPreviousOutput { link: link.to_string() });
        };

        let mut broadcast = Map::new();
        let mut iterables: Vec<(&InputVariable, &Vec<Value>)> = Vec::new();

        for variable in variables {
            let path = &variable.path;

            if let Some(value) = previous.get(&path.canonical()) {
                broadcast.insert(variable.key(), value.clone());
                continue;
            }

            if !path.is_element() {
                if let Lookup::Found(value) = self.lookup(path, previous) {
                    broadcast.insert(variable.key(), value.cloned().unwrap_or(Value::Null));
                }
                continue;
            }

            let field = path.iterable();
            if field.is_empty() {
                return Err(ChainflowError::ElementAtRoot {
                    link: link.to_string(),
                    variable: path.canonical(),
                });
            }

            let located = previous
                .get(&field[0])
                .and_then(|root| traverse(root, &field[1..]))
                .or_else(|| {
                    self.history
                        .get(&field[0])
                        .and_then(|output| traverse(output, &field[1..]))
                });

            let items = match located {
                Some(Value::Array(items)) => items,
                Some(_) => {
                    return Err(ChainflowError::NotIterable {
                        link: link.to_string(),
                        field: field.join("."),
                    })
                }
                None => {
                    return Err(ChainflowError::MissingIterable {
                        link: link.to_string(),
                        field: field.join("."),
                    })
                }
            };

            if let Some((first, first_items)) = iterables.first() {
                if first_items.len() != items.len() {
                    return Err(ChainflowError::IterableLengthMismatch {
                        link: link.to_string(),
                        first: first.key(),
                        first_len: first_items.len(),
                        second: variable.key(),
                        second_len: items.len(),
                    });
                }
            }

            iterables.push((variable, items));
        }

        let Some((_, first_items)) = iterables.first() else {
            return Err(ChainflowError::NoIterableField {
                link: link.to_string(),
                previous: previous_link.to_string(),
            });
        };

        let inputs = (0..first_items.len())
            .map(|i| {
                let mut input = broadcast.clone();
                for (variable, items) in &iterables {
                    let value = traverse(&items[i], variable.path.within_element())
                        .cloned()
                        .unwrap_or(Value::Null);
                    input.insert(variable.key(), value);
                }
                input
            })
            .collect();

        Ok(inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(names: &[&str]) -> Vec<InputVariable> {
        names.iter().map(|n| InputVariable::parse(n)).collect()
    }

    #[test]
    fn test_parse_alias() {
        let var = InputVariable::parse("gen.title as title");
        assert_eq!(var.path.canonical(), "gen$title");
        assert_eq!(var.key(), "title");
    }

    #[test]
    fn test_direct_and_nested_lookup() {
        let history = StageHistory::new();
        let resolver = FieldResolver::new(&history);
        let previous = json!({ "topic": "rust", "meta": { "lang": "en" } });

        let input = resolver
            .resolve("l", &vars(&["topic", "meta.lang", "meta.missing"]), &previous)
            .unwrap();

        assert_eq!(input["topic"], "rust");
        assert_eq!(input["meta$lang"], "en");
        assert_eq!(input["meta$missing"], Value::Null);
    }

    #[test]
    fn test_no_variables_passes_through() {
        let history = StageHistory::new();
        let resolver = FieldResolver::new(&history);
        let previous = json!({ "a": 1 });

        let input = resolver.resolve("l", &[], &previous).unwrap();
        assert_eq!(Value::Object(input), previous);
    }

    #[test]
    fn test_no_matching_variables_is_an_error() {
        let history = StageHistory::new();
        let resolver = FieldResolver::new(&history);

        let err = resolver
            .resolve("l", &vars(&["nope", "also.nope"]), &json!({ "a": 1 }))
            .unwrap_err();
        assert!(matches!(err, ChainflowError::NoMatchingInputs { .. }));
    }

    #[test]
    fn test_history_lookup_reaches_past_predecessor() {
        let mut history = StageHistory::new();
        history.record("plan", json!({ "topic": "tides" }));
        let resolver = FieldResolver::new(&history);

        let previous = json!({ "fan": [{ "x": 1 }] });
        let input = resolver
            .resolve("l", &vars(&["plan.topic as topic"]), &previous)
            .unwrap();
        assert_eq!(input["topic"], "tides");
    }

    #[test]
    fn test_partition_preserves_order() {
        let history = StageHistory::new();
        let resolver = FieldResolver::new(&history);
        let previous = json!({ "gen": [{ "x": 1 }, { "x": 2 }, { "x": 3 }] });

        let inputs = resolver
            .partition("fan", "gen", &vars(&["gen$element$x"]), &previous)
            .unwrap();

        assert_eq!(
            inputs.into_iter().map(Value::Object).collect::<Vec<_>>(),
            vec![
                json!({ "gen$element$x": 1 }),
                json!({ "gen$element$x": 2 }),
                json!({ "gen$element$x": 3 }),
            ]
        );
    }

    #[test]
    fn test_partition_broadcasts_scalars() {
        let history = StageHistory::new();
        let resolver = FieldResolver::new(&history);
        let previous = json!({ "tone": "dry", "items": ["a", "b"] });

        let inputs = resolver
            .partition("fan", "prev", &vars(&["tone", "items.element"]), &previous)
            .unwrap();

        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[1]["tone"], "dry");
        assert_eq!(inputs[1]["items$element"], "b");
    }

    #[test]
    fn test_partition_length_mismatch() {
        let history = StageHistory::new();
        let resolver = FieldResolver::new(&history);
        let previous = json!({ "a": [1, 2, 3], "b": [1, 2] });

        let err = resolver
            .partition("fan", "prev", &vars(&["a.element", "b.element"]), &previous)
            .unwrap_err();

        match err {
            ChainflowError::IterableLengthMismatch { first, second, first_len, second_len, .. } => {
                assert_eq!((first.as_str(), first_len), ("a$element", 3));
                assert_eq!((second.as_str(), second_len), ("b$element", 2));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_partition_requires_iterable() {
        let history = StageHistory::new();
        let resolver = FieldResolver::new(&history);

        let err = resolver
            .partition("fan", "prev", &vars(&["missing.element.x"]), &json!({ "a": 1 }))
            .unwrap_err();
        assert!(matches!(err, ChainflowError::MissingIterable { .. }));

        let err = resolver
            .partition("fan", "prev", &vars(&["a.element"]), &json!({ "a": 1 }))
            .unwrap_err();
        assert!(matches!(err, ChainflowError::NotIterable { .. }));

        let err = resolver
            .partition("fan", "prev", &vars(&["element.x"]), &json!({ "a": [1] }))
            .unwrap_err();
        assert!(matches!(err, ChainflowError::ElementAtRoot { .. }));

        let err = resolver
            .partition("fan", "prev", &vars(&["a"]), &json!({ "a": [1] }))
            .unwrap_err();
        assert!(matches!(err, ChainflowError::NoIterableField { .. }));
    }
}
