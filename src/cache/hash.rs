// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 chainflow contributors

//! Cache keys for generated templates
//!
//! Uses BLAKE3. Variable lists are sorted first so the key does not depend on
//! declaration order.

use blake3::Hasher;

/// Key of an instruction template generated from a purpose
pub fn instruction_key<S: AsRef<str>>(purpose: &str, variables: &[S]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(purpose.as_bytes());
    hasher.update(b"\0");
    hasher.update(sorted_list(variables).as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Key of a mask template generated from its variables
pub fn mask_key<S: AsRef<str>>(variables: &[S]) -> String {
    hash_string(&sorted_list(variables))
}

/// Compute a quick hash of a string
pub fn hash_string(s: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(s.as_bytes());
    hasher.finalize().to_hex().to_string()
}

fn sorted_list<S: AsRef<str>>(variables: &[S]) -> String {
    let mut names: Vec<&str> = variables.iter().map(AsRef::as_ref).collect();
    names.sort_unstable();
    names.join(",")
}
