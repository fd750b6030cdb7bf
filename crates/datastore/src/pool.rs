//! Scoped connection pool over a single SQLite database file.
//!
//! Every store call borrows a handle with [`Pool::get`] and returns it by
//! dropping the guard, on all exit paths. There is no global session.

use std::ops::Deref;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex};

use anyhow::{anyhow, Context, Result};
use rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS uconn_proxy (
    src_ip TEXT NOT NULL,
    src_network_name TEXT NOT NULL,
    fqdn TEXT NOT NULL,
    proxy TEXT NOT NULL DEFAULT '',
    connection_count INTEGER NOT NULL DEFAULT 0,
    strobe_fqdn INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (src_ip, src_network_name, fqdn)
);
CREATE TABLE IF NOT EXISTS beacon_proxy (
    src_ip TEXT NOT NULL,
    src_network_name TEXT NOT NULL,
    fqdn TEXT NOT NULL,
    connection_count INTEGER NOT NULL,
    proxy TEXT NOT NULL,
    ts_range INTEGER NOT NULL,
    ts_mode INTEGER NOT NULL,
    ts_mode_count INTEGER NOT NULL,
    ts_intervals TEXT NOT NULL,
    ts_interval_counts TEXT NOT NULL,
    ts_dispersion INTEGER NOT NULL,
    ts_skew REAL NOT NULL,
    ts_conns_score REAL NOT NULL,
    ts_score REAL NOT NULL,
    tslist TEXT NOT NULL,
    score REAL NOT NULL,
    cid INTEGER NOT NULL,
    strobe_fqdn INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (src_ip, src_network_name, fqdn)
);
CREATE INDEX IF NOT EXISTS idx_beacon_proxy_score ON beacon_proxy(score);
CREATE TABLE IF NOT EXISTS hosts (
    src_ip TEXT NOT NULL,
    src_network_name TEXT NOT NULL,
    mbproxy TEXT NOT NULL,
    max_beacon_proxy_score REAL NOT NULL,
    cid INTEGER NOT NULL,
    UNIQUE (src_ip, src_network_name, cid, mbproxy)
);
";

#[derive(Clone)]
pub struct Pool {
    shared: Arc<PoolShared>,
}

struct PoolShared {
    connections: Mutex<Vec<Connection>>,
    available: Condvar,
}

impl Pool {
    /// Opens `size` connections against `path` and initializes the schema.
    /// WAL keeps concurrent analyzer workers from serializing on reads.
    pub fn open(path: &Path, size: usize) -> Result<Self> {
        let size = size.max(1);
        let mut connections = Vec::with_capacity(size);

        for i in 0..size {
            let conn = Connection::open(path)
                .with_context(|| format!("failed opening database {}", path.display()))?;
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA synchronous=NORMAL;
                 PRAGMA busy_timeout=5000;",
            )
            .context("failed configuring database connection")?;
            if i == 0 {
                conn.execute_batch(SCHEMA)
                    .context("failed initializing database schema")?;
            }
            connections.push(conn);
        }

        Ok(Self {
            shared: Arc::new(PoolShared {
                connections: Mutex::new(connections),
                available: Condvar::new(),
            }),
        })
    }

    /// Borrows a connection, blocking until one is free.
    pub fn get(&self) -> Result<PooledConnection> {
        let mut connections = self
            .shared
            .connections
            .lock()
            .map_err(|_| anyhow!("connection pool lock poisoned"))?;

        loop {
            if let Some(conn) = connections.pop() {
                return Ok(PooledConnection {
                    conn: Some(conn),
                    shared: Arc::clone(&self.shared),
                });
            }
            connections = self
                .shared
                .available
                .wait(connections)
                .map_err(|_| anyhow!("connection pool lock poisoned"))?;
        }
    }
}

/// A borrowed connection. Dropping it returns the handle to the pool.
pub struct PooledConnection {
    conn: Option<Connection>,
    shared: Arc<PoolShared>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // only emptied by Drop
        self.conn.as_ref().expect("pooled connection already returned")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Ok(mut connections) = self.shared.connections.lock() {
                connections.push(conn);
                self.shared.available.notify_one();
            }
        }
    }
}
