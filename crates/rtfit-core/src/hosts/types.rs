//! Host and cluster descriptions.

use serde::{Deserialize, Serialize};

use crate::units::Quantity;

/// Hardware layout of a cluster behind a scheduler host.
///
/// Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Nodes available to one job
    pub nodes: u32,
    /// Sockets per node
    pub sockets_per_node: u32,
    /// Cores per socket
    pub cores_per_socket: u32,
    /// Installed memory per node
    pub memory_per_node: Quantity,
    /// Whether hyperthreading should be used
    #[serde(default)]
    pub hyperthreading: bool,
    /// Hardware threads per core
    #[serde(default = "default_threads_per_core")]
    pub threads_per_core: u32,
}

fn default_threads_per_core() -> u32 {
    1
}

impl ClusterSpec {
    /// Cores of one node.
    pub fn cores_per_node(&self) -> u32 {
        self.sockets_per_node * self.cores_per_socket
    }

    /// Cores across all nodes.
    pub fn total_cores(&self) -> u32 {
        self.nodes * self.cores_per_node()
    }
}

/// One execution target. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSpec {
    /// Identifier used throughout tables and the CLI
    pub id: String,
    /// Login user
    pub user: String,
    /// Host name or address
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Whether jobs go through a batch scheduler
    #[serde(default)]
    pub scheduler: bool,
    /// Cluster name reported in the timing table (scheduler hosts)
    #[serde(default)]
    pub cluster_name: Option<String>,
    /// Hardware layout, required for scheduler hosts
    #[serde(default)]
    pub cluster: Option<ClusterSpec>,
    /// Whether MPI is available on the host
    #[serde(default = "default_true")]
    pub mpi: bool,
    /// Base poll interval override for this host, in seconds
    #[serde(default)]
    pub poll_interval: Option<f64>,
}

fn default_port() -> u16 {
    22
}

fn default_true() -> bool {
    true
}

impl HostSpec {
    /// `user@hostname` as passed to the remote shell.
    pub fn address(&self) -> String {
        format!("{}@{}", self.user, self.hostname)
    }

    pub fn cluster_name(&self) -> &str {
        self.cluster_name.as_deref().unwrap_or("--")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_core_counts() {
        let cluster = ClusterSpec {
            nodes: 4,
            sockets_per_node: 2,
            cores_per_socket: 12,
            memory_per_node: Quantity::gibibytes(64.0),
            hyperthreading: false,
            threads_per_core: 1,
        };
        assert_eq!(cluster.cores_per_node(), 24);
        assert_eq!(cluster.total_cores(), 96);
    }

    #[test]
    fn test_host_spec_from_json_defaults() {
        let host: HostSpec = serde_json::from_str(
            r#"{"id": "delcatty", "user": "obs", "hostname": "login.example.org"}"#,
        )
        .unwrap();
        assert_eq!(host.port, 22);
        assert!(!host.scheduler);
        assert!(host.mpi);
        assert_eq!(host.address(), "obs@login.example.org");
    }
}
