// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeshctlError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode {input}: {message}")]
    Decode { input: String, message: String },

    /// Accumulated source-configuration errors, reported jointly.
    #[error("invalid resource sources: [{}]", .0.join("; "))]
    InvalidSources(Vec<String>),

    #[error("{kind} {name:?} not found")]
    NotFound { kind: String, name: String },

    #[error("{kind} {name:?} already exists")]
    Conflict { kind: String, name: String },

    #[error("mesh API returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid server address {address:?}: {message}")]
    InvalidServer { address: String, message: String },

    #[error("deploy failed: {0}")]
    NotReady(String),

    #[error("rc file error: {0}")]
    RcFile(String),
}

impl MeshctlError {
    pub fn decode(input: impl Into<String>, message: impl std::fmt::Display) -> Self {
        MeshctlError::Decode {
            input: input.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MeshctlError>;
