mod analyzer;
mod input;
mod reconciler;
mod scorer;
pub mod stats;
mod update;

pub use analyzer::BeaconProxyAnalyzer;
pub use input::{InputRecord, PairSelector, ScoringWindow, SourceKey};
pub use reconciler::{reconcile_host_max, HostQueries};
pub use update::{
    HostDatElement, HostDatSelector, HostMaxUpdate, PairRecordUpdate, PairScoreDoc, StrobeUpdate,
    UpdateEnvelope,
};
