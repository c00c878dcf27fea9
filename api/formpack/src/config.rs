// Copyright 2015-2023 Swim Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

/// Wire layout for multi-dimensional arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiDimFormat {
    /// Nested arrays matching the rank.
    Nested,
    /// A single array of the dimensions followed by the elements.
    Flat,
}

/// Transformation applied to property names before they are written.
#[derive(Clone, Copy)]
pub enum NamingPolicy {
    Identity,
    CamelCase,
    PascalCase,
    Custom(fn(&str) -> String),
}

impl NamingPolicy {
    pub fn apply(&self, name: &str) -> String {
        match self {
            NamingPolicy::Identity => name.to_owned(),
            NamingPolicy::CamelCase => to_camel_case(name),
            NamingPolicy::PascalCase => to_pascal_case(name),
            NamingPolicy::Custom(transform) => transform(name),
        }
    }
}

impl std::fmt::Debug for NamingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NamingPolicy::Identity => "Identity",
            NamingPolicy::CamelCase => "CamelCase",
            NamingPolicy::PascalCase => "PascalCase",
            NamingPolicy::Custom(_) => "Custom",
        };
        f.write_str(name)
    }
}

fn transform_words(name: &str, mut capitalize: bool) -> String {
    let mut out = String::with_capacity(name.len());
    let mut first = true;
    for word in name.split('_').filter(|w| !w.is_empty()) {
        let mut chars = word.chars();
        if let Some(head) = chars.next() {
            if capitalize {
                out.extend(head.to_uppercase());
            } else if first {
                out.extend(head.to_lowercase());
            } else {
                out.push(head);
            }
            out.push_str(chars.as_str());
        }
        capitalize = true;
        first = false;
    }
    out
}

/// Render a (typically snake_case) name in camelCase.
pub fn to_camel_case(name: &str) -> String {
    transform_words(name, false)
}

/// Render a (typically snake_case) name in PascalCase.
pub fn to_pascal_case(name: &str) -> String {
    transform_words(name, true)
}

/// Configuration of a serializer instance. Options are fixed once the
/// serializer is constructed; converters synthesized under one configuration
/// are never shared with another.
#[derive(Debug, Clone)]
pub struct SerializerOptions {
    /// Dedupe object identity across the graph with reference extension
    /// tokens.
    pub preserve_references: bool,
    /// When `false`, properties whose current value equals their declared
    /// default are omitted from map-shaped encodings.
    pub serialize_default_values: bool,
    /// Wire layout for multi-dimensional arrays.
    pub multi_dim_format: MultiDimFormat,
    /// Transformation applied to property names.
    pub naming_policy: NamingPolicy,
    /// Depth budget for a single top-level operation.
    pub max_depth: i32,
    /// Number of staged bytes after which asynchronous writers flush.
    pub unflushed_bytes_threshold: usize,
}

impl Default for SerializerOptions {
    fn default() -> Self {
        SerializerOptions {
            preserve_references: false,
            serialize_default_values: true,
            multi_dim_format: MultiDimFormat::Nested,
            naming_policy: NamingPolicy::Identity,
            max_depth: 64,
            unflushed_bytes_threshold: 64 * 1024,
        }
    }
}
