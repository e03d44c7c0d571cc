// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Decoding of raw byte streams into resource documents.

use serde::Deserialize;
use serde_yaml::Value;

use crate::error::{MeshctlError, Result};
use crate::resource::ResourceDocument;

/// Decode a raw stream into zero or more resource documents.
///
/// Handles multi-document YAML/JSON streams (`---` separated). Malformed
/// input fails the whole stream without emitting a partial document;
/// `origin` names the source in the error.
pub fn decode_stream(input: &str, origin: &str) -> Result<Vec<ResourceDocument>> {
    let mut documents = Vec::new();

    for deserializer in serde_yaml::Deserializer::from_str(input) {
        let value = Value::deserialize(deserializer)
            .map_err(|e| MeshctlError::decode(origin, e))?;
        if value.is_null() {
            // Empty documents between separators carry no content.
            continue;
        }
        documents.push(document_from_value(value, origin)?);
    }

    Ok(documents)
}

fn document_from_value(value: Value, origin: &str) -> Result<ResourceDocument> {
    if !value.is_mapping() {
        return Err(MeshctlError::decode(origin, "document is not a mapping"));
    }

    let kind = string_field(&value, "kind")
        .ok_or_else(|| MeshctlError::decode(origin, "document has no \"kind\" field"))?;
    let name = string_field(&value, "name")
        .or_else(|| nested_string_field(&value, "metadata", "name"))
        .ok_or_else(|| MeshctlError::decode(origin, "document has no \"name\" field"))?;
    let namespace = string_field(&value, "namespace")
        .or_else(|| nested_string_field(&value, "metadata", "namespace"));

    Ok(ResourceDocument {
        kind,
        name,
        namespace,
        body: value,
    })
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_string)
}

fn nested_string_field(value: &Value, outer: &str, inner: &str) -> Option<String> {
    value
        .get(outer)
        .and_then(|v| v.get(inner))
        .and_then(Value::as_str)
        .map(str::to_string)
}
