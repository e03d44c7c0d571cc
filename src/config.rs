// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use std::env;

use crate::constants::ports;

/// Installation configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct InstallConfig {
    /// Namespace the mesh components are installed into
    pub mesh_namespace: String,
    pub operator_image: String,
    pub control_plane_image: String,
    pub ingress_image: String,
    pub control_plane_replicas: i32,
    pub client_port: i32,
    pub peer_port: i32,
    pub admin_port: i32,
}

impl InstallConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let mesh_namespace =
            env::var("MESH_NAMESPACE").unwrap_or_else(|_| "mesh-system".to_string());
        let operator_image = env::var("MESH_OPERATOR_IMAGE")
            .unwrap_or_else(|_| "ghcr.io/meshctl/mesh-operator:latest".to_string());
        let control_plane_image = env::var("MESH_CONTROL_PLANE_IMAGE")
            .unwrap_or_else(|_| "ghcr.io/meshctl/mesh-control-plane:latest".to_string());
        let ingress_image = env::var("MESH_INGRESS_IMAGE")
            .unwrap_or_else(|_| "ghcr.io/meshctl/mesh-ingress:latest".to_string());
        let control_plane_replicas = parse_var("MESH_CONTROL_PLANE_REPLICAS", 1)?;
        let client_port = parse_var("MESH_CLIENT_PORT", ports::CLIENT_PORT)?;
        let peer_port = parse_var("MESH_PEER_PORT", ports::PEER_PORT)?;
        let admin_port = parse_var("MESH_ADMIN_PORT", ports::ADMIN_PORT)?;

        Ok(InstallConfig {
            mesh_namespace,
            operator_image,
            control_plane_image,
            ingress_image,
            control_plane_replicas,
            client_port,
            peer_port,
            admin_port,
        })
    }
}

fn parse_var(name: &str, default: i32) -> Result<i32> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{} is not a valid number: {}", name, value)),
        Err(_) => Ok(default),
    }
}
