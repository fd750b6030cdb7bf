//! Groups proxied HTTP traffic into per-pair analysis inputs.
//!
//! A CONNECT request names the destination FQDN while the responder is the
//! proxy itself, so each qualifying entry folds into a
//! (source, FQDN) accumulator carrying the connection total and the
//! deduplicated, ordered timestamp set. Pairs that cross the strobe limit
//! stop retaining timestamps and surface as strobes.

use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;

use tracing::warn;

use beacon::{InputRecord, PairSelector};

use crate::http::HttpRecord;

/// Connection-count ceiling past which a pair becomes a strobe: one
/// connection per second over a full day.
pub const DEFAULT_STROBE_LIMIT: i64 = 86_400;

/// Interval statistics need at least this many distinct timestamps.
pub const MIN_TS_SAMPLES: usize = 4;

pub struct ProxyPairAggregator {
    network_name: String,
    strobe_limit: i64,
    pairs: HashMap<PairSelector, PairAccumulator>,
}

struct PairAccumulator {
    proxy: String,
    connection_count: i64,
    ts_set: BTreeSet<i64>,
}

impl ProxyPairAggregator {
    pub fn new(network_name: impl Into<String>, strobe_limit: i64) -> Self {
        Self {
            network_name: network_name.into(),
            strobe_limit,
            pairs: HashMap::new(),
        }
    }

    /// Folds one HTTP entry in. Non-CONNECT traffic and entries without a
    /// host header do not participate.
    pub fn observe(&mut self, record: &HttpRecord) {
        if record.method != "CONNECT" || record.host.is_empty() {
            return;
        }

        let src_ip: IpAddr = match record.src_ip.parse() {
            Ok(ip) => ip,
            Err(err) => {
                warn!(
                    error = %err,
                    value = %record.src_ip,
                    "skipping http entry with unparsable source address"
                );
                return;
            }
        };

        let selector = PairSelector {
            src_ip,
            src_network_name: self.network_name.clone(),
            fqdn: strip_port(&record.host).to_string(),
        };

        let acc = self
            .pairs
            .entry(selector)
            .or_insert_with(|| PairAccumulator {
                proxy: record.dst_ip.clone(),
                connection_count: 0,
                ts_set: BTreeSet::new(),
            });

        acc.connection_count += 1;
        if acc.connection_count > self.strobe_limit {
            // strobes stop paying the retention cost
            acc.ts_set.clear();
        } else {
            acc.ts_set.insert(record.ts);
        }
    }

    /// Number of pairs currently accumulating.
    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// Emits the analysis inputs and resets the aggregator. Pairs with too
    /// few distinct timestamps for interval analysis are withheld.
    pub fn drain(&mut self) -> Vec<InputRecord> {
        let mut out = Vec::with_capacity(self.pairs.len());

        for (selector, acc) in self.pairs.drain() {
            if acc.connection_count > self.strobe_limit {
                out.push(InputRecord {
                    hosts: selector,
                    proxy: acc.proxy,
                    connection_count: acc.connection_count,
                    ts_list: None,
                });
            } else {
                if acc.ts_set.len() < MIN_TS_SAMPLES {
                    continue;
                }
                let ts_list: Vec<i64> = acc.ts_set.into_iter().collect();
                out.push(InputRecord {
                    hosts: selector,
                    proxy: acc.proxy,
                    connection_count: acc.connection_count,
                    ts_list: Some(ts_list),
                });
            }
        }

        out
    }
}

/// Drops a trailing `:port` from an HTTP host header.
fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}
