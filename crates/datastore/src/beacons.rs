//! Read side of the beacon collection, for ranking and verification.

use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};

use beacon::PairSelector;

use crate::pool::Pool;

/// A scored pair as persisted, in downstream ranking order.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedPair {
    pub fqdn: String,
    pub score: f64,
    pub connection_count: i64,
}

#[derive(Clone)]
pub struct BeaconProxyStore {
    pool: Pool,
}

impl BeaconProxyStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// The persisted score for one pair.
    pub fn score(&self, selector: &PairSelector) -> Result<Option<f64>> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT score FROM beacon_proxy
             WHERE src_ip = ?1 AND src_network_name = ?2 AND fqdn = ?3",
            params![
                selector.src_ip.to_string(),
                selector.src_network_name,
                selector.fqdn
            ],
            |row| row.get(0),
        )
        .optional()
        .context("failed reading beacon score")
    }

    /// Top scored pairs across the dataset. The three-decimal score
    /// quantization makes the (score, fqdn) order stable between runs.
    pub fn top_pairs(&self, limit: usize) -> Result<Vec<RankedPair>> {
        let conn = self.pool.get()?;
        let mut stmt = conn
            .prepare(
                "SELECT fqdn, score, connection_count FROM beacon_proxy
                 ORDER BY score DESC, fqdn ASC LIMIT ?1",
            )
            .context("failed preparing ranking query")?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(RankedPair {
                    fqdn: row.get(0)?,
                    score: row.get(1)?,
                    connection_count: row.get(2)?,
                })
            })
            .context("failed querying ranked pairs")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("failed reading ranked pair row")?);
        }
        Ok(out)
    }
}
