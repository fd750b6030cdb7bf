//! The upstream pair table. The grouping stage records connection totals
//! here; the analyzer only ever touches the strobe flag.

use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};

use beacon::{InputRecord, PairSelector};

use crate::pool::Pool;

#[derive(Clone)]
pub struct UconnProxyStore {
    pool: Pool,
}

impl UconnProxyStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Upserts the pair's proxy and connection total, leaving any strobe
    /// flag a previous chunk set in place.
    pub fn record_pair(&self, input: &InputRecord) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO uconn_proxy
                 (src_ip, src_network_name, fqdn, proxy, connection_count)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(src_ip, src_network_name, fqdn) DO UPDATE SET
                 proxy = excluded.proxy,
                 connection_count = excluded.connection_count",
            params![
                input.hosts.src_ip.to_string(),
                input.hosts.src_network_name,
                input.hosts.fqdn,
                input.proxy,
                input.connection_count
            ],
        )
        .context("failed recording uconn proxy pair")?;
        Ok(())
    }

    /// The strobe flag for one pair, or `None` when the pair is unknown.
    pub fn strobe_fqdn(&self, selector: &PairSelector) -> Result<Option<bool>> {
        let conn = self.pool.get()?;
        let flag: Option<i64> = conn
            .query_row(
                "SELECT strobe_fqdn FROM uconn_proxy
                 WHERE src_ip = ?1 AND src_network_name = ?2 AND fqdn = ?3",
                params![
                    selector.src_ip.to_string(),
                    selector.src_network_name,
                    selector.fqdn
                ],
                |row| row.get(0),
            )
            .optional()
            .context("failed reading uconn proxy strobe flag")?;
        Ok(flag.map(|f| f != 0))
    }
}
