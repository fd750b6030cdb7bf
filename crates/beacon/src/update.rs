use serde::Serialize;

use crate::input::{PairSelector, SourceKey};

/// Full scoring document for one pair, written to the beacon collection.
#[derive(Debug, Clone, Serialize)]
pub struct PairScoreDoc {
    pub connection_count: i64,
    pub proxy: String,
    pub src_network_name: String,
    pub ts_range: i64,
    pub ts_mode: i64,
    pub ts_mode_count: i64,
    pub ts_intervals: Vec<i64>,
    pub ts_interval_counts: Vec<i64>,
    pub ts_dispersion: i64,
    pub ts_skew: f64,
    pub ts_conns_score: f64,
    pub ts_score: f64,
    pub ts_list: Vec<i64>,
    pub score: f64,
    pub cid: i64,
    pub strobe_fqdn: bool,
}

/// Marks the pair as a strobe on the upstream pair table.
#[derive(Debug, Clone)]
pub struct StrobeUpdate {
    pub selector: PairSelector,
}

/// Upsert of the full scoring document, keyed by the pair.
#[derive(Debug, Clone)]
pub struct PairRecordUpdate {
    pub selector: PairSelector,
    pub doc: PairScoreDoc,
}

/// One `dat` element on a source-host document.
#[derive(Debug, Clone, PartialEq)]
pub struct HostDatElement {
    pub max_beacon_proxy_score: f64,
    pub mbproxy: String,
    pub cid: i64,
}

/// The predicate the reconciler matched. It doubles as the update selector
/// so the writer mutates exactly the element the counted query saw.
#[derive(Debug, Clone, PartialEq)]
pub enum HostDatSelector {
    /// Element already carrying `fqdn` as this source's max, any chunk.
    Fqdn { src: SourceKey, fqdn: String },
    /// Element in `cid` scoring at or below `score` for some other FQDN.
    ChunkAtOrBelow {
        src: SourceKey,
        cid: i64,
        score: f64,
        excluding_fqdn: String,
    },
}

/// Mutation of the source-host document. The noop outcome is represented by
/// an absent `host_max` on the envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum HostMaxUpdate {
    Replace {
        selector: HostDatSelector,
        dat: HostDatElement,
    },
    Insert {
        src: SourceKey,
        dat: HostDatElement,
    },
}

/// Tagged output of analyzing one input record. Created once, handed to the
/// writer sink, never mutated.
#[derive(Debug, Clone, Default)]
pub struct UpdateEnvelope {
    pub uconn_proxy: Option<StrobeUpdate>,
    pub pair_record: Option<PairRecordUpdate>,
    pub host_max: Option<HostMaxUpdate>,
}
