//! Reconciles one pair's score into the source host's chunked maxima.
//!
//! Host documents carry a `dat` list with at most one element per
//! (chunk, FQDN). The reconciler never reads the elements themselves; it
//! decides between replace, insert, and noop purely from counted predicate
//! queries, which keeps the read path a single round trip per decision.

use anyhow::Result;
use tracing::error;

use crate::input::SourceKey;
use crate::update::{HostDatElement, HostDatSelector, HostMaxUpdate};

/// Counted predicate queries against the hosts collection. Implemented by
/// the store; workers call these concurrently.
pub trait HostQueries {
    /// Elements carrying `fqdn` as this source's max beacon, any chunk.
    fn count_fqdn_matches(&self, src: &SourceKey, fqdn: &str) -> Result<u64>;

    /// Elements in `cid` scoring at or below `score` for an FQDN other than
    /// `excluding_fqdn`.
    fn count_chunk_at_or_below(
        &self,
        src: &SourceKey,
        cid: i64,
        score: f64,
        excluding_fqdn: &str,
    ) -> Result<u64>;

    /// Elements in `cid` scoring at or above `score`.
    fn count_chunk_at_or_above(&self, src: &SourceKey, cid: i64, score: f64) -> Result<u64>;
}

/// Decides how the host document must change to reflect this pair's score.
///
/// `None` means noop: either a higher max already exists for the chunk, or
/// a query failed and we refuse to touch the document rather than risk
/// corrupting it. Failures are logged; the pair record itself is unaffected.
pub fn reconcile_host_max(
    queries: &dyn HostQueries,
    score: f64,
    src: &SourceKey,
    fqdn: &str,
    cid: i64,
) -> Option<HostMaxUpdate> {
    let dat = HostDatElement {
        max_beacon_proxy_score: score,
        mbproxy: fqdn.to_string(),
        cid,
    };

    // Exact match first: if this destination is already the recorded max,
    // overwrite unconditionally. A beacon that starts strong and fades must
    // not keep its stale high-water mark.
    let exact = match queries.count_fqdn_matches(src, fqdn) {
        Ok(n) => n,
        Err(err) => {
            log_refusal(&err, src, fqdn, "existing");
            return None;
        }
    };
    if exact > 0 {
        return Some(HostMaxUpdate::Replace {
            selector: HostDatSelector::Fqdn {
                src: src.clone(),
                fqdn: fqdn.to_string(),
            },
            dat,
        });
    }

    // Otherwise promote over a lower-scoring element in this chunk.
    let lower = match queries.count_chunk_at_or_below(src, cid, score, fqdn) {
        Ok(n) => n,
        Err(err) => {
            log_refusal(&err, src, fqdn, "lower scoring");
            return None;
        }
    };
    if lower > 0 {
        return Some(HostMaxUpdate::Replace {
            selector: HostDatSelector::ChunkAtOrBelow {
                src: src.clone(),
                cid,
                score,
                excluding_fqdn: fqdn.to_string(),
            },
            dat,
        });
    }

    // No lower element to replace: insert a fresh one unless something in
    // this chunk already scores at least as high.
    let upper = match queries.count_chunk_at_or_above(src, cid, score) {
        Ok(n) => n,
        Err(err) => {
            log_refusal(&err, src, fqdn, "higher scoring");
            return None;
        }
    };
    if upper == 0 {
        return Some(HostMaxUpdate::Insert {
            src: src.clone(),
            dat,
        });
    }

    None
}

fn log_refusal(err: &anyhow::Error, src: &SourceKey, fqdn: &str, which: &str) {
    error!(
        error = %err,
        src = %src.ip,
        src_network_name = %src.network_name,
        fqdn = %fqdn,
        "could not check for {which} max proxy beacon in hosts collection; \
         refusing to update source's max proxy beacon"
    );
}
