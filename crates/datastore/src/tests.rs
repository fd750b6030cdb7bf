use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use beacon::{
    reconcile_host_max, BeaconProxyAnalyzer, HostDatElement, HostMaxUpdate, InputRecord,
    PairSelector, ScoringWindow, SourceKey, UpdateEnvelope,
};

use super::*;

fn temp_db(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "beaconwatch-{tag}-{}.db",
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default()
    ))
}

fn cleanup(path: &PathBuf) {
    let _ = std::fs::remove_file(path);
    let _ = std::fs::remove_file(path.with_extension("db-wal"));
    let _ = std::fs::remove_file(path.with_extension("db-shm"));
}

fn src() -> SourceKey {
    SourceKey {
        ip: "10.44.0.7".parse::<IpAddr>().expect("ip"),
        network_name: "corp".to_string(),
    }
}

fn selector(fqdn: &str) -> PairSelector {
    PairSelector {
        src_ip: "10.44.0.7".parse::<IpAddr>().expect("ip"),
        src_network_name: "corp".to_string(),
        fqdn: fqdn.to_string(),
    }
}

fn insert_envelope(fqdn: &str, score: f64, cid: i64) -> UpdateEnvelope {
    UpdateEnvelope {
        host_max: Some(HostMaxUpdate::Insert {
            src: src(),
            dat: HostDatElement {
                max_beacon_proxy_score: score,
                mbproxy: fqdn.to_string(),
                cid,
            },
        }),
        ..UpdateEnvelope::default()
    }
}

#[test]
fn pool_hands_back_connections_on_drop() {
    let path = temp_db("pool");
    let pool = Pool::open(&path, 1).expect("open pool");

    {
        let conn = pool.get().expect("first borrow");
        let one: i64 = conn
            .query_row("SELECT 1", [], |row| row.get(0))
            .expect("probe");
        assert_eq!(one, 1);
    }
    // the single handle must be back in the pool or this would block forever
    let conn = pool.get().expect("second borrow");
    drop(conn);

    let peer = pool.clone();
    let worker = std::thread::spawn(move || {
        let conn = peer.get().expect("borrow from thread");
        let one: i64 = conn
            .query_row("SELECT 1", [], |row| row.get(0))
            .expect("probe");
        assert_eq!(one, 1);
    });
    worker.join().expect("worker join");

    cleanup(&path);
}

#[test]
fn counted_queries_match_their_predicates() {
    let path = temp_db("queries");
    let pool = Pool::open(&path, 2).expect("open pool");
    let hosts = HostStore::new(pool.clone());
    let writer = BeaconWriter::new(pool);

    writer.apply(&insert_envelope("a.example.com", 0.5, 0)).expect("seed a");
    writer.apply(&insert_envelope("b.example.com", 0.9, 1)).expect("seed b");

    use beacon::HostQueries;
    assert_eq!(hosts.count_fqdn_matches(&src(), "a.example.com").expect("exact"), 1);
    assert_eq!(hosts.count_fqdn_matches(&src(), "z.example.com").expect("exact"), 0);

    // at-or-below in chunk 0, excluding some other fqdn
    assert_eq!(
        hosts
            .count_chunk_at_or_below(&src(), 0, 0.6, "z.example.com")
            .expect("lower"),
        1
    );
    // the exclusion removes the only candidate
    assert_eq!(
        hosts
            .count_chunk_at_or_below(&src(), 0, 0.6, "a.example.com")
            .expect("lower"),
        0
    );
    // nothing scores below 0.4 in chunk 0
    assert_eq!(
        hosts
            .count_chunk_at_or_below(&src(), 0, 0.4, "z.example.com")
            .expect("lower"),
        0
    );

    assert_eq!(hosts.count_chunk_at_or_above(&src(), 1, 0.9).expect("upper"), 1);
    assert_eq!(hosts.count_chunk_at_or_above(&src(), 1, 0.95).expect("upper"), 0);

    cleanup(&path);
}

#[test]
fn strobe_update_touches_only_the_flag() {
    let path = temp_db("strobe");
    let pool = Pool::open(&path, 2).expect("open pool");
    let uconn = UconnProxyStore::new(pool.clone());
    let writer = BeaconWriter::new(pool.clone());

    let input = InputRecord {
        hosts: selector("burst.example.com"),
        proxy: "192.168.10.2".to_string(),
        connection_count: 123_456,
        ts_list: None,
    };
    uconn.record_pair(&input).expect("record pair");
    assert_eq!(
        uconn.strobe_fqdn(&selector("burst.example.com")).expect("flag"),
        Some(false)
    );

    let envelope = UpdateEnvelope {
        uconn_proxy: Some(beacon::StrobeUpdate {
            selector: selector("burst.example.com"),
        }),
        ..UpdateEnvelope::default()
    };
    writer.apply(&envelope).expect("apply strobe");

    assert_eq!(
        uconn.strobe_fqdn(&selector("burst.example.com")).expect("flag"),
        Some(true)
    );

    // the flag write must not clobber what the grouping stage recorded
    let conn = pool.get().expect("conn");
    let count: i64 = conn
        .query_row(
            "SELECT connection_count FROM uconn_proxy WHERE fqdn = 'burst.example.com'",
            [],
            |row| row.get(0),
        )
        .expect("count");
    assert_eq!(count, 123_456);

    cleanup(&path);
}

#[test]
fn duplicate_insert_delivery_leaves_one_element() {
    let path = temp_db("idempotent");
    let pool = Pool::open(&path, 1).expect("open pool");
    let hosts = HostStore::new(pool.clone());
    let writer = BeaconWriter::new(pool);

    let envelope = insert_envelope("c2.example.com", 0.75, 2);
    writer.apply(&envelope).expect("first delivery");
    writer.apply(&envelope).expect("duplicate delivery");

    let dat = hosts.dat_elements(&src()).expect("dat");
    assert_eq!(dat.len(), 1);
    assert_eq!(dat[0].max_beacon_proxy_score, 0.75);
    assert_eq!(dat[0].cid, 2);

    cleanup(&path);
}

#[test]
fn lower_replace_touches_exactly_one_element() {
    let path = temp_db("replace");
    let pool = Pool::open(&path, 1).expect("open pool");
    let hosts = HostStore::new(pool.clone());
    let writer = BeaconWriter::new(pool);

    writer.apply(&insert_envelope("a.example.com", 0.2, 0)).expect("seed a");
    writer.apply(&insert_envelope("b.example.com", 0.3, 0)).expect("seed b");

    let envelope = UpdateEnvelope {
        host_max: Some(HostMaxUpdate::Replace {
            selector: beacon::HostDatSelector::ChunkAtOrBelow {
                src: src(),
                cid: 0,
                score: 0.9,
                excluding_fqdn: "c.example.com".to_string(),
            },
            dat: HostDatElement {
                max_beacon_proxy_score: 0.9,
                mbproxy: "c.example.com".to_string(),
                cid: 0,
            },
        }),
        ..UpdateEnvelope::default()
    };
    writer.apply(&envelope).expect("replace");

    let dat = hosts.dat_elements(&src()).expect("dat");
    assert_eq!(dat.len(), 2);
    assert_eq!(dat[0].mbproxy, "c.example.com");
    assert_eq!(dat[0].max_beacon_proxy_score, 0.9);
    // the other seeded element is untouched
    assert!(dat[1].max_beacon_proxy_score == 0.2 || dat[1].max_beacon_proxy_score == 0.3);

    cleanup(&path);
}

#[test]
fn chunk_max_discipline_over_three_pairs() {
    let path = temp_db("discipline");
    let pool = Pool::open(&path, 2).expect("open pool");
    let hosts = HostStore::new(pool.clone());
    let writer = BeaconWriter::new(pool);

    // first pair of the chunk inserts
    let first = reconcile_host_max(&hosts, 0.9, &src(), "one.example.com", 0)
        .expect("insert for empty host");
    assert!(matches!(first, HostMaxUpdate::Insert { .. }));
    writer
        .apply(&UpdateEnvelope {
            host_max: Some(first),
            ..UpdateEnvelope::default()
        })
        .expect("apply insert");

    // a weaker pair in the same chunk is a noop: an upper match exists
    assert!(reconcile_host_max(&hosts, 0.5, &src(), "two.example.com", 0).is_none());

    let dat = hosts.dat_elements(&src()).expect("dat");
    assert_eq!(dat.len(), 1);
    assert_eq!(dat[0].mbproxy, "one.example.com");
    assert_eq!(dat[0].max_beacon_proxy_score, 0.9);

    // the record holder fading must overwrite downward, not keep the mark
    let third = reconcile_host_max(&hosts, 0.4, &src(), "one.example.com", 0)
        .expect("exact replace");
    assert!(matches!(third, HostMaxUpdate::Replace { .. }));
    writer
        .apply(&UpdateEnvelope {
            host_max: Some(third),
            ..UpdateEnvelope::default()
        })
        .expect("apply replace");

    let dat = hosts.dat_elements(&src()).expect("dat");
    assert_eq!(dat.len(), 1);
    assert_eq!(dat[0].mbproxy, "one.example.com");
    assert_eq!(dat[0].max_beacon_proxy_score, 0.4);
    assert_eq!(dat[0].cid, 0);

    cleanup(&path);
}

#[test]
fn analyzer_pipeline_end_to_end() {
    let path = temp_db("pipeline");
    let pool = Pool::open(&path, 4).expect("open pool");
    let hosts = Arc::new(HostStore::new(pool.clone()));
    let beacons = BeaconProxyStore::new(pool.clone());
    let uconn = UconnProxyStore::new(pool.clone());
    let writer = BeaconWriter::new(pool);

    let window = ScoringWindow {
        ts_min: 0,
        ts_max: 36_000,
        chunk: 0,
    };
    let closed = Arc::new(AtomicUsize::new(0));

    let sink = writer.clone();
    let closes = Arc::clone(&closed);
    // one worker keeps reconciliation deterministic for the assertions
    let analyzer = BeaconProxyAnalyzer::new(
        window,
        Arc::clone(&hosts) as Arc<dyn beacon::HostQueries + Send + Sync>,
        move |envelope| sink.collect(&envelope),
        move || {
            closes.fetch_add(1, Ordering::SeqCst);
        },
    );
    analyzer.start();

    // saturated 60s metronome: component scores all 1.0
    let ts: Vec<i64> = (0..32).map(|i| i * 60).collect();
    analyzer.collect(InputRecord {
        hosts: selector("alpha.example.com"),
        proxy: "192.168.10.2".to_string(),
        connection_count: 100_000,
        ts_list: Some(ts),
    });

    // dispersed stragglers: scores near the floor, loses the chunk max
    analyzer.collect(InputRecord {
        hosts: selector("beta.example.com"),
        proxy: "192.168.10.2".to_string(),
        connection_count: 7,
        ts_list: Some(vec![0, 1, 2, 3, 1000, 2000, 3000]),
    });

    // a strobe only flags the pair table
    analyzer.collect(InputRecord {
        hosts: selector("burst.example.com"),
        proxy: "192.168.10.2".to_string(),
        connection_count: 500_000,
        ts_list: None,
    });

    analyzer.close();
    assert_eq!(closed.load(Ordering::SeqCst), 1);

    let alpha = beacons
        .score(&selector("alpha.example.com"))
        .expect("alpha score")
        .expect("alpha present");
    assert_eq!(alpha, 1.0);

    let beta = beacons
        .score(&selector("beta.example.com"))
        .expect("beta score")
        .expect("beta present");
    assert!(beta < 0.1, "beta = {beta}");

    assert!(beacons
        .score(&selector("burst.example.com"))
        .expect("burst score")
        .is_none());
    assert_eq!(
        uconn.strobe_fqdn(&selector("burst.example.com")).expect("flag"),
        Some(true)
    );

    let ranked = beacons.top_pairs(10).expect("ranking");
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].fqdn, "alpha.example.com");

    // only the chunk max survives on the host document
    let dat = hosts.dat_elements(&src()).expect("dat");
    assert_eq!(dat.len(), 1);
    assert_eq!(dat[0].mbproxy, "alpha.example.com");
    assert_eq!(dat[0].max_beacon_proxy_score, 1.0);

    cleanup(&path);
}
