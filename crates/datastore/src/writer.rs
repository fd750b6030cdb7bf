//! Applies update envelopes to their collections.
//!
//! Safe to call from every analyzer worker at once: each call borrows a
//! pooled connection, and the three sub-updates are independent point
//! operations. Replace-updates touch a single matched row, mirroring the
//! counted predicate that produced the selector. Application is idempotent,
//! so at-least-once delivery upstream is harmless.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use tracing::warn;

use beacon::{HostDatSelector, HostMaxUpdate, PairRecordUpdate, StrobeUpdate, UpdateEnvelope};

use crate::pool::Pool;

#[derive(Clone)]
pub struct BeaconWriter {
    pool: Pool,
}

impl BeaconWriter {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Infallible sink surface for the analyzer callback: failures are
    /// logged, never surfaced back into the worker loop.
    pub fn collect(&self, envelope: &UpdateEnvelope) {
        if let Err(err) = self.apply(envelope) {
            warn!(error = %err, "failed applying update envelope");
        }
    }

    pub fn apply(&self, envelope: &UpdateEnvelope) -> Result<()> {
        let conn = self.pool.get()?;
        if let Some(strobe) = &envelope.uconn_proxy {
            set_strobe(&conn, strobe)?;
        }
        if let Some(pair) = &envelope.pair_record {
            upsert_pair_record(&conn, pair)?;
        }
        if let Some(host_max) = &envelope.host_max {
            apply_host_max(&conn, host_max)?;
        }
        Ok(())
    }
}

fn set_strobe(conn: &Connection, update: &StrobeUpdate) -> Result<()> {
    conn.execute(
        "INSERT INTO uconn_proxy (src_ip, src_network_name, fqdn, strobe_fqdn)
         VALUES (?1, ?2, ?3, 1)
         ON CONFLICT(src_ip, src_network_name, fqdn) DO UPDATE SET strobe_fqdn = 1",
        params![
            update.selector.src_ip.to_string(),
            update.selector.src_network_name,
            update.selector.fqdn
        ],
    )
    .context("failed setting strobe flag")?;
    Ok(())
}

fn upsert_pair_record(conn: &Connection, update: &PairRecordUpdate) -> Result<()> {
    let doc = &update.doc;
    let intervals = serde_json::to_string(&doc.ts_intervals)
        .context("failed encoding interval histogram")?;
    let interval_counts = serde_json::to_string(&doc.ts_interval_counts)
        .context("failed encoding interval counts")?;
    let ts_list = serde_json::to_string(&doc.ts_list).context("failed encoding timestamp list")?;

    conn.execute(
        "INSERT INTO beacon_proxy
             (src_ip, src_network_name, fqdn, connection_count, proxy,
              ts_range, ts_mode, ts_mode_count, ts_intervals, ts_interval_counts,
              ts_dispersion, ts_skew, ts_conns_score, ts_score, tslist,
              score, cid, strobe_fqdn)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, 0)
         ON CONFLICT(src_ip, src_network_name, fqdn) DO UPDATE SET
             connection_count = excluded.connection_count,
             proxy = excluded.proxy,
             ts_range = excluded.ts_range,
             ts_mode = excluded.ts_mode,
             ts_mode_count = excluded.ts_mode_count,
             ts_intervals = excluded.ts_intervals,
             ts_interval_counts = excluded.ts_interval_counts,
             ts_dispersion = excluded.ts_dispersion,
             ts_skew = excluded.ts_skew,
             ts_conns_score = excluded.ts_conns_score,
             ts_score = excluded.ts_score,
             tslist = excluded.tslist,
             score = excluded.score,
             cid = excluded.cid,
             strobe_fqdn = 0",
        params![
            update.selector.src_ip.to_string(),
            update.selector.src_network_name,
            update.selector.fqdn,
            doc.connection_count,
            doc.proxy,
            doc.ts_range,
            doc.ts_mode,
            doc.ts_mode_count,
            intervals,
            interval_counts,
            doc.ts_dispersion,
            doc.ts_skew,
            doc.ts_conns_score,
            doc.ts_score,
            ts_list,
            doc.score,
            doc.cid
        ],
    )
    .context("failed upserting beacon record")?;
    Ok(())
}

fn apply_host_max(conn: &Connection, update: &HostMaxUpdate) -> Result<()> {
    match update {
        HostMaxUpdate::Insert { src, dat } => {
            // The unique (source, cid, mbproxy) key collapses duplicate
            // deliveries into one element.
            conn.execute(
                "INSERT INTO hosts
                     (src_ip, src_network_name, mbproxy, max_beacon_proxy_score, cid)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(src_ip, src_network_name, cid, mbproxy) DO UPDATE SET
                     max_beacon_proxy_score = excluded.max_beacon_proxy_score",
                params![
                    src.ip.to_string(),
                    src.network_name,
                    dat.mbproxy,
                    dat.max_beacon_proxy_score,
                    dat.cid
                ],
            )
            .context("failed inserting host max element")?;
        }
        HostMaxUpdate::Replace { selector, dat } => match selector {
            HostDatSelector::Fqdn { src, fqdn } => {
                conn.execute(
                    "UPDATE OR IGNORE hosts SET
                         max_beacon_proxy_score = ?1, mbproxy = ?2, cid = ?3
                     WHERE rowid IN (
                         SELECT rowid FROM hosts
                         WHERE src_ip = ?4 AND src_network_name = ?5 AND mbproxy = ?6
                         LIMIT 1
                     )",
                    params![
                        dat.max_beacon_proxy_score,
                        dat.mbproxy,
                        dat.cid,
                        src.ip.to_string(),
                        src.network_name,
                        fqdn
                    ],
                )
                .context("failed replacing host max element by fqdn")?;
            }
            HostDatSelector::ChunkAtOrBelow {
                src,
                cid,
                score,
                excluding_fqdn,
            } => {
                conn.execute(
                    "UPDATE OR IGNORE hosts SET
                         max_beacon_proxy_score = ?1, mbproxy = ?2, cid = ?3
                     WHERE rowid IN (
                         SELECT rowid FROM hosts
                         WHERE src_ip = ?4 AND src_network_name = ?5 AND cid = ?6
                           AND max_beacon_proxy_score <= ?7 AND mbproxy <> ?8
                         LIMIT 1
                     )",
                    params![
                        dat.max_beacon_proxy_score,
                        dat.mbproxy,
                        dat.cid,
                        src.ip.to_string(),
                        src.network_name,
                        cid,
                        score,
                        excluding_fqdn
                    ],
                )
                .context("failed replacing lower host max element")?;
            }
        },
    }
    Ok(())
}
