#![cfg(test)]

use std::sync::Arc;

use futures_executor::block_on;
use rstest::fixture;
use txnkv_core::{ClusterFacade, Mutation};

use crate::{client::TransactionClient, executor::NoopTimer, impls::mem::MemCluster};

#[fixture]
pub(crate) fn cluster() -> MemCluster {
    MemCluster::new()
}

/// A cluster holding `a`, `b`, `c` and `d`, each mapped to its upper-cased name.
#[fixture]
pub(crate) fn seeded_cluster(cluster: MemCluster) -> MemCluster {
    block_on(async {
        let start_ts = cluster.allocate_timestamp().await.unwrap();
        let mutations: Vec<Mutation> = ["a", "b", "c", "d"]
            .into_iter()
            .map(|k| Mutation::put(k, k.to_uppercase()))
            .collect();
        let keys = mutations.iter().map(|m| m.key.clone()).collect();
        cluster
            .prewrite(start_ts, "a".into(), mutations)
            .await
            .unwrap();
        let commit_ts = cluster.allocate_timestamp().await.unwrap();
        cluster.commit(start_ts, commit_ts, keys, true).await.unwrap();
    });
    cluster
}

#[fixture]
pub(crate) fn client(cluster: MemCluster) -> TransactionClient<MemCluster> {
    TransactionClient::new(cluster).with_timer(Arc::new(NoopTimer))
}
