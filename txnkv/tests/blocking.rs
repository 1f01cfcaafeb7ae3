//! The synchronous API, driven from plain threads.

use std::thread;

use txnkv::{
    blocking::TransactionClient, impls::mem::MemCluster, Config, Error, Key, KvPair,
    TransactionState,
};

#[test]
fn commit_and_read_back() {
    let client = TransactionClient::new(MemCluster::new()).unwrap();
    let mut txn = client.begin().unwrap();
    txn.put("a", "1").unwrap();
    txn.put("b", "2").unwrap();
    txn.put("c", "3").unwrap();
    let commit_ts = txn.commit().unwrap().unwrap();
    assert_eq!(txn.state(), TransactionState::Committed);

    let snapshot = client.snapshot().unwrap();
    assert!(snapshot.timestamp() > commit_ts);
    assert_eq!(snapshot.get("b").unwrap(), Some(b"2".to_vec()));
    assert_eq!(
        snapshot.scan("a".."c", 10).unwrap(),
        vec![KvPair::new("a", "1"), KvPair::new("b", "2")]
    );
    assert_eq!(snapshot.batch_get(["c", "zz", "a"]).unwrap().len(), 2);
    assert_eq!(snapshot.scan_keys(.., 1).unwrap(), vec![Key::from("a")]);
}

#[test]
fn connect_checks_endpoints() {
    let result = TransactionClient::<MemCluster>::connect(Vec::new(), Config::default());
    assert!(matches!(result, Err(Error::Config(_))));

    let client = TransactionClient::<MemCluster>::connect(
        vec!["127.0.0.1:2379".into()],
        Config::default(),
    )
    .unwrap();
    assert!(client.current_timestamp().is_ok());
}

#[test]
fn pessimistic_transactions_across_threads() {
    let client = TransactionClient::new(MemCluster::new()).unwrap();
    let mut holder = client.begin_pessimistic().unwrap();
    assert_eq!(holder.get_for_update("k").unwrap(), None);

    let cluster = client.cluster().clone();
    let contender = thread::spawn(move || {
        let client = TransactionClient::new(cluster).unwrap();
        let mut txn = client.begin_pessimistic().unwrap();
        let result = txn.get_for_update("k");
        (result, txn.state())
    });
    let (result, state) = contender.join().unwrap();
    assert!(matches!(result, Err(Error::LockContention { .. })));
    assert_eq!(state, TransactionState::Failed);

    holder.put("k", "v").unwrap();
    holder.commit().unwrap();
    assert_eq!(
        client.snapshot().unwrap().get("k").unwrap(),
        Some(b"v".to_vec())
    );
}

#[test]
fn split_commit_and_gc() {
    let client = TransactionClient::new(MemCluster::new()).unwrap();
    let mut primary = client.begin().unwrap();
    let mut secondary = client.begin().unwrap();
    primary.put("a", "1").unwrap();
    secondary.put("b", "2").unwrap();

    let prewritten = primary.prewrite_primary(None).unwrap();
    secondary
        .prewrite_secondary(prewritten.key, prewritten.start_ts)
        .unwrap();
    let commit_ts = primary.commit_primary().unwrap();
    primary.commit_secondary(commit_ts).unwrap();
    secondary.commit_secondary(commit_ts).unwrap();

    let safepoint = client.current_timestamp().unwrap();
    assert!(client.gc(safepoint).unwrap());
    let snapshot = client.snapshot_at(safepoint);
    assert_eq!(snapshot.get("b").unwrap(), Some(b"2".to_vec()));
}

#[test]
fn rollback_discards_writes() {
    let client = TransactionClient::new(MemCluster::new()).unwrap();
    let mut txn = client.begin().unwrap();
    txn.put("a", "1").unwrap();
    txn.remove("b").unwrap();
    assert_eq!(txn.get("a").unwrap(), Some(b"1".to_vec()));
    txn.rollback().unwrap();
    assert!(matches!(txn.get("a"), Err(Error::InvalidState { .. })));
    assert_eq!(client.snapshot().unwrap().get("a").unwrap(), None);
}
