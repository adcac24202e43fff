//! The host inventory: configured execution targets and their liveness.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::hosts::types::HostSpec;

/// All configured hosts plus the availability cache.
///
/// Availability is probed once per fitting-run startup and cached for the
/// run; `is_available` never re-probes.
#[derive(Debug)]
pub struct Inventory {
    hosts: Vec<HostSpec>,
    availability: HashMap<String, bool>,
}

impl Inventory {
    pub fn new(hosts: Vec<HostSpec>) -> Self {
        Inventory {
            hosts,
            availability: HashMap::new(),
        }
    }

    /// Load `hosts.json`: a JSON array of host specs.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let hosts: Vec<HostSpec> = serde_json::from_str(&content)?;
        let mut seen = std::collections::HashSet::new();
        for host in &hosts {
            if !seen.insert(host.id.clone()) {
                return Err(Error::Configuration(format!(
                    "duplicate host id '{}' in {}",
                    host.id,
                    path.display()
                )));
            }
            if host.scheduler && host.cluster.is_none() {
                return Err(Error::Configuration(format!(
                    "scheduler host '{}' has no cluster spec",
                    host.id
                )));
            }
        }
        Ok(Inventory::new(hosts))
    }

    pub fn list_hosts(&self) -> &[HostSpec] {
        &self.hosts
    }

    pub fn host(&self, id: &str) -> Result<&HostSpec> {
        self.hosts
            .iter()
            .find(|h| h.id == id)
            .ok_or_else(|| Error::Configuration(format!("unknown host '{id}'")))
    }

    pub fn is_scheduler(&self, id: &str) -> Result<bool> {
        Ok(self.host(id)?.scheduler)
    }

    /// Probe every listed host once with the given connectivity check and
    /// cache the results for the rest of the run.
    pub fn probe_availability<F>(&mut self, ids: &[String], probe: F)
    where
        F: Fn(&HostSpec) -> bool,
    {
        for id in ids {
            let Some(host) = self.hosts.iter().find(|h| &h.id == id) else {
                continue;
            };
            let alive = probe(host);
            if !alive {
                tracing::warn!(host = %id, "host failed its liveness probe");
            }
            self.availability.insert(id.clone(), alive);
        }
    }

    /// Cached availability; a host that was never probed counts as
    /// unavailable.
    pub fn is_available(&self, id: &str) -> bool {
        self.availability.get(id).copied().unwrap_or(false)
    }

    /// The subset of `ids` that passed the probe, or `NoAvailableHost` when
    /// every preferred host failed.
    pub fn available_hosts(&self, ids: &[String]) -> Result<Vec<&HostSpec>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let alive: Vec<&HostSpec> = ids
            .iter()
            .filter(|id| self.is_available(id))
            .filter_map(|id| self.hosts.iter().find(|h| &h.id == id))
            .collect();
        if alive.is_empty() {
            return Err(Error::NoAvailableHost(ids.to_vec()));
        }
        Ok(alive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Quantity;

    fn inventory() -> Inventory {
        Inventory::new(vec![
            HostSpec {
                id: "batch1".into(),
                user: "obs".into(),
                hostname: "batch1.example.org".into(),
                port: 22,
                scheduler: true,
                cluster_name: Some("delcatty".into()),
                cluster: Some(crate::hosts::ClusterSpec {
                    nodes: 4,
                    sockets_per_node: 2,
                    cores_per_socket: 12,
                    memory_per_node: Quantity::gibibytes(64.0),
                    hyperthreading: false,
                    threads_per_core: 1,
                }),
                mpi: true,
                poll_interval: None,
            },
            HostSpec {
                id: "plain".into(),
                user: "obs".into(),
                hostname: "plain.example.org".into(),
                port: 22,
                scheduler: false,
                cluster_name: None,
                cluster: None,
                mpi: true,
                poll_interval: None,
            },
        ])
    }

    #[test]
    fn test_lookup() {
        let inv = inventory();
        assert!(inv.is_scheduler("batch1").unwrap());
        assert!(!inv.is_scheduler("plain").unwrap());
        assert!(matches!(
            inv.host("nope"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_availability_cache() {
        let mut inv = inventory();
        let ids = vec!["batch1".to_string(), "plain".to_string()];
        inv.probe_availability(&ids, |h| h.id == "plain");
        assert!(!inv.is_available("batch1"));
        assert!(inv.is_available("plain"));
        let alive = inv.available_hosts(&ids).unwrap();
        assert_eq!(alive.len(), 1);
        assert_eq!(alive[0].id, "plain");
    }

    #[test]
    fn test_all_hosts_down() {
        let mut inv = inventory();
        let ids = vec!["batch1".to_string()];
        inv.probe_availability(&ids, |_| false);
        assert!(matches!(
            inv.available_hosts(&ids),
            Err(Error::NoAvailableHost(_))
        ));
    }
}
