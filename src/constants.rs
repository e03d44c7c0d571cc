// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Mesh control-plane REST API paths
pub mod api {
    /// Collection path for mesh configuration objects
    pub const OBJECTS_URL: &str = "/apis/v1/objects";
    /// Cluster membership status path
    pub const MEMBERS_URL: &str = "/apis/v1/status/members";
}

/// The field manager name used for server-side apply
pub const FIELD_MANAGER: &str = "meshctl";

/// Recognized resource-definition file extensions
pub const FILE_EXTENSIONS: &[&str] = &[".json", ".yaml", ".yml"];

/// Default mesh API server endpoint when no rc file is present
pub const DEFAULT_SERVER: &str = "127.0.0.1:2381";

/// Default number of attempts for fetching resource definitions over HTTP
pub const DEFAULT_HTTP_ATTEMPTS: u32 = 3;

/// Name of the persisted CLI state file in the user's home directory
pub const RCFILE_NAME: &str = ".meshctlrc";

/// Well-known names of the installed cluster resources
pub mod names {
    pub const OPERATOR: &str = "mesh-operator";
    pub const OPERATOR_CONFIG: &str = "mesh-operator-config";
    pub const OPERATOR_METRICS_SERVICE: &str = "mesh-operator-controller-manager-metrics-service";

    pub const CONTROL_PLANE: &str = "mesh-control-plane";
    pub const CONTROL_PLANE_CONFIG: &str = "mesh-cluster-cm";
    pub const CONTROL_PLANE_PUBLIC_SERVICE: &str = "mesh-controlplane-public";
    pub const CONTROL_PLANE_HEADLESS_SERVICE: &str = "mesh-controlplane-hs";

    pub const INGRESS_CONTROLLER: &str = "mesh-ingress-controller";
    pub const INGRESS_CONFIG: &str = "mesh-ingress-config";
    pub const INGRESS_SERVICE: &str = "mesh-ingress-service";
}

/// RBAC resource names created by the operator stage
pub mod rbac {
    pub const LEADER_ELECTION_ROLE: &str = "mesh-operator-leader-election-role";
    pub const LEADER_ELECTION_ROLE_BINDING: &str = "mesh-operator-leader-election-rolebinding";

    pub const MANAGER_CLUSTER_ROLE: &str = "mesh-operator-manager-role";
    pub const MANAGER_CLUSTER_ROLE_BINDING: &str = "mesh-operator-manager-rolebinding";

    pub const METRICS_READER_CLUSTER_ROLE: &str = "mesh-operator-metrics-reader-role";
    pub const METRICS_READER_CLUSTER_ROLE_BINDING: &str = "mesh-operator-metrics-reader-rolebinding";

    pub const PROXY_CLUSTER_ROLE: &str = "mesh-operator-proxy-role";
    pub const PROXY_CLUSTER_ROLE_BINDING: &str = "mesh-operator-proxy-rolebinding";

    /// API group of the custom resources the operator manages
    pub const MESH_API_GROUP: &str = "mesh.meshctl.io";
}

/// Control-plane port assignments
pub mod ports {
    pub const CLIENT_PORT: i32 = 2379;
    pub const CLIENT_PORT_NAME: &str = "client-port";
    pub const PEER_PORT: i32 = 2380;
    pub const PEER_PORT_NAME: &str = "peer-port";
    pub const ADMIN_PORT: i32 = 2381;
    pub const ADMIN_PORT_NAME: &str = "admin-port";
}

/// Readiness polling configuration
pub mod poll {
    /// Interval between readiness checks in milliseconds
    pub const INTERVAL_MS: u64 = 100;
    /// Maximum number of readiness checks before giving up (60s budget)
    pub const MAX_ATTEMPTS: u32 = 600;
}
