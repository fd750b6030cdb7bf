use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Key for one (internal source host, external FQDN) pair observed through
/// a proxy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairSelector {
    pub src_ip: IpAddr,
    pub src_network_name: String,
    pub fqdn: String,
}

impl PairSelector {
    /// The source-host document key for this pair.
    pub fn source(&self) -> SourceKey {
        SourceKey {
            ip: self.src_ip,
            network_name: self.src_network_name.clone(),
        }
    }
}

/// Key for a source-host document: address plus the network it was observed
/// on, so overlapping RFC1918 spaces stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceKey {
    pub ip: IpAddr,
    pub network_name: String,
}

/// One unit of analysis, produced by the upstream grouping stage.
///
/// `ts_list` is ascending and deduplicated when present;
/// `connection_count` is at least its length. An absent `ts_list` marks a
/// strobe: the pair crossed the upstream connection limit and timestamp
/// retention was disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputRecord {
    pub hosts: PairSelector,
    pub proxy: String,
    pub connection_count: i64,
    pub ts_list: Option<Vec<i64>>,
}

/// Per-run analysis window, immutable after the workers start.
///
/// `ts_min`/`ts_max` span the whole dataset; `chunk` identifies the rolling
/// analysis slice (0 outside rolling mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringWindow {
    pub ts_min: i64,
    pub ts_max: i64,
    pub chunk: i64,
}
