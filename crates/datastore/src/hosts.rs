//! The hosts collection: per-source documents whose `dat` elements record
//! the chunked max beacon scores. Elements are rows; the unique key on
//! (source, cid, mbproxy) enforces at most one element per (chunk, FQDN).

use anyhow::{Context, Result};
use rusqlite::params;

use beacon::{HostDatElement, HostQueries, SourceKey};

use crate::pool::Pool;

#[derive(Clone)]
pub struct HostStore {
    pool: Pool,
}

impl HostStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// All `dat` elements for one source, highest score first. Downstream
    /// ranking treats the largest score as authoritative when the benign
    /// insert race left more than one element in a chunk.
    pub fn dat_elements(&self, src: &SourceKey) -> Result<Vec<HostDatElement>> {
        let conn = self.pool.get()?;
        let mut stmt = conn
            .prepare(
                "SELECT max_beacon_proxy_score, mbproxy, cid FROM hosts
                 WHERE src_ip = ?1 AND src_network_name = ?2
                 ORDER BY max_beacon_proxy_score DESC, mbproxy ASC",
            )
            .context("failed preparing host dat query")?;

        let rows = stmt
            .query_map(params![src.ip.to_string(), src.network_name], |row| {
                Ok(HostDatElement {
                    max_beacon_proxy_score: row.get(0)?,
                    mbproxy: row.get(1)?,
                    cid: row.get(2)?,
                })
            })
            .context("failed querying host dat elements")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("failed reading host dat row")?);
        }
        Ok(out)
    }

    fn count(&self, sql: &str, params: impl rusqlite::Params) -> Result<u64> {
        let conn = self.pool.get()?;
        let n: i64 = conn
            .query_row(sql, params, |row| row.get(0))
            .context("failed counting host dat elements")?;
        Ok(n.max(0) as u64)
    }
}

impl HostQueries for HostStore {
    fn count_fqdn_matches(&self, src: &SourceKey, fqdn: &str) -> Result<u64> {
        self.count(
            "SELECT COUNT(*) FROM hosts
             WHERE src_ip = ?1 AND src_network_name = ?2 AND mbproxy = ?3",
            params![src.ip.to_string(), src.network_name, fqdn],
        )
    }

    fn count_chunk_at_or_below(
        &self,
        src: &SourceKey,
        cid: i64,
        score: f64,
        excluding_fqdn: &str,
    ) -> Result<u64> {
        self.count(
            "SELECT COUNT(*) FROM hosts
             WHERE src_ip = ?1 AND src_network_name = ?2 AND cid = ?3
               AND max_beacon_proxy_score <= ?4 AND mbproxy <> ?5",
            params![
                src.ip.to_string(),
                src.network_name,
                cid,
                score,
                excluding_fqdn
            ],
        )
    }

    fn count_chunk_at_or_above(&self, src: &SourceKey, cid: i64, score: f64) -> Result<u64> {
        self.count(
            "SELECT COUNT(*) FROM hosts
             WHERE src_ip = ?1 AND src_network_name = ?2 AND cid = ?3
               AND max_beacon_proxy_score >= ?4",
            params![src.ip.to_string(), src.network_name, cid, score],
        )
    }
}
