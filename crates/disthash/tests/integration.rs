//! End-to-end tests for the distributed table.
//!
//! Covers routing, insert/find agreement, probe-sequence behaviour at the
//! cluster level, isolation between ranks, and a two-rank table talking to
//! itself over tarpc on the loopback interface.

use disthash::bench::random_kmers;
use disthash::rpc::ShardServer;
use disthash::*;
use std::collections::HashSet;

/// A key whose hash is chosen by the test.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Pinned {
    id: u32,
    hash: u64,
}

impl TableKey for Pinned {
    fn table_hash(&self) -> u64 {
        self.hash
    }
}

fn pinned(id: u32, hash: u64) -> (Pinned, u32) {
    (Pinned { id, hash }, id * 10)
}

/// Helper: start a rank actor plus its RPC server on an ephemeral port.
async fn start_rank(rank: u32, capacity: usize) -> (RankHandle<KmerPair>, std::net::SocketAddr) {
    let handle = spawn_rank(Shard::new(RankId::new(rank), capacity).unwrap());
    let server = ShardServer::new(handle.mailbox().clone());
    let (addr, serve) = server.bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    tokio::spawn(serve);
    (handle, addr)
}

#[tokio::test]
async fn test_routing_is_deterministic_across_ranks() {
    let cluster = LocalCluster::<(u64, u64)>::create(5, 64).unwrap();
    let tables = cluster.tables();

    for key in 0..500u64 {
        let owner = tables[0].target_rank(&key);
        assert!(owner.as_u32() < 5);
        for table in &tables[1..] {
            assert_eq!(table.target_rank(&key), owner);
        }
        assert_eq!(owner, PartitionRouter::new(5).unwrap().target_rank(&key));
    }
}

#[tokio::test]
async fn test_insert_then_find_everything() {
    let cluster = LocalCluster::<KmerPair>::create(4, 512).unwrap();
    let tables = cluster.tables();
    let entries = random_kmers(1000, 19, 11).unwrap();

    let pending: Vec<_> = entries
        .iter()
        .enumerate()
        .map(|(i, e)| tables[i % 4].insert(*e))
        .collect();
    for stored in futures::future::join_all(pending).await {
        assert_eq!(stored, Ok(true));
    }

    for (i, entry) in entries.iter().enumerate() {
        let found = tables[(i + 1) % 4].find(&entry.kmer).await.unwrap();
        assert_eq!(found, Some(*entry));
    }

    let occupied: usize = cluster.stats().await.unwrap().iter().map(|s| s.occupied).sum();
    assert_eq!(occupied, 1000);
}

#[tokio::test]
async fn test_colliding_keys_fill_rank_and_wrap() {
    // 4 ranks x 8 slots. Hashes 6, 14, 22, ... all map to rank 2 and start
    // probing at slot 6.
    let cluster = LocalCluster::<(Pinned, u32)>::create(4, 8).unwrap();
    let table = cluster.table(RankId::new(0)).unwrap();
    let keys: Vec<_> = (1..=9u32).map(|i| pinned(i, 6 + 8 * u64::from(i - 1))).collect();
    for (key, _) in &keys {
        assert_eq!(table.target_rank(key), RankId::new(2));
    }

    for entry in &keys[..8] {
        assert_eq!(table.insert(entry.clone()).await, Ok(true));
    }
    assert_eq!(table.insert(keys[8].clone()).await, Ok(false));

    assert_eq!(table.find(&keys[4].0).await, Ok(Some(keys[4].clone())));
    assert_eq!(table.find(&keys[8].0).await, Ok(None));

    let shards = cluster.shutdown().await.unwrap();
    assert!(shards[2].is_full());
    for (rank, shard) in shards.iter().enumerate() {
        if rank != 2 {
            assert!(shard.is_empty());
        }
    }
    let expected_slots = [6, 7, 0, 1, 2, 3, 4, 5];
    for (i, slot) in expected_slots.iter().enumerate() {
        assert_eq!(shards[2].slot(*slot).map(|e| e.0.id), Some(i as u32 + 1));
    }
}

#[test]
fn test_probe_wraps_from_start_three() {
    let mut shard = Shard::new(RankId::new(2), 8).unwrap();
    let keys: Vec<_> = (1..=9u32).map(|i| pinned(i, 3 + 8 * u64::from(i))).collect();

    for entry in &keys[..8] {
        assert!(shard.insert(entry.clone()));
    }
    assert!(!shard.insert(keys[8].clone()));

    let occupied: Vec<_> = [3, 4, 5, 6, 7, 0, 1, 2]
        .iter()
        .map(|s| shard.slot(*s).map(|e| e.0.id))
        .collect();
    assert_eq!(occupied, (1..=8).map(Some).collect::<Vec<_>>());
    assert_eq!(shard.find(&keys[4].0), Some(&keys[4]));
    assert_eq!(shard.find(&keys[8].0), None);
}

#[tokio::test]
async fn test_absent_key_not_found() {
    let cluster = LocalCluster::<(Pinned, u32)>::create(2, 8).unwrap();
    let table = cluster.table(RankId::new(1)).unwrap();

    // Two keys on rank 0 starting at slot 2; slot 4 stays empty.
    assert_eq!(table.insert(pinned(1, 2)).await, Ok(true));
    assert_eq!(table.insert(pinned(2, 10)).await, Ok(true));

    let absent = Pinned { id: 3, hash: 18 };
    assert_eq!(table.find(&absent).await, Ok(None));
    let stats = table.stats(RankId::new(0)).await.unwrap();
    assert_eq!(stats.misses, 1);
    // Probed slots 2 and 3 (occupied, other keys) then stopped at empty 4.
    assert_eq!(stats.probes, 1 + 2 + 3);
}

#[tokio::test]
async fn test_full_rank_does_not_affect_others() {
    let cluster = LocalCluster::<(Pinned, u32)>::create(3, 4).unwrap();
    let table = cluster.table(RankId::new(0)).unwrap();

    // Hashes divisible by 3 land on rank 0.
    let rank0: Vec<_> = (0..5u32).map(|i| pinned(i, 3 * u64::from(i))).collect();
    let results: Vec<_> = futures::future::join_all(rank0.iter().map(|e| table.insert(e.clone())))
        .await;
    assert_eq!(results.iter().filter(|r| **r == Ok(true)).count(), 4);
    assert_eq!(results.iter().filter(|r| **r == Ok(false)).count(), 1);

    // Rank 1 still accepts all of its keys.
    for i in 0..4u32 {
        assert_eq!(table.insert(pinned(100 + i, 3 * u64::from(i) + 1)).await, Ok(true));
    }

    let stats = cluster.stats().await.unwrap();
    assert_eq!(stats[0].occupied, 4);
    assert_eq!(stats[0].rejected, 1);
    assert_eq!(stats[1].occupied, 4);
    assert_eq!(stats[1].rejected, 0);
    assert_eq!(stats[2].occupied, 0);
}

#[tokio::test]
async fn test_duplicate_keys_first_wins() {
    let cluster = LocalCluster::<(u64, &'static str)>::create(2, 16).unwrap();
    let table = cluster.table(RankId::new(0)).unwrap();

    assert_eq!(table.insert((42, "first")).await, Ok(true));
    assert_eq!(table.insert((42, "second")).await, Ok(true));
    assert_eq!(table.find(&42).await, Ok(Some((42, "first"))));

    let occupied: usize = cluster.stats().await.unwrap().iter().map(|s| s.occupied).sum();
    assert_eq!(occupied, 2);
}

#[tokio::test]
async fn test_dropped_handle_still_executes() {
    let cluster = LocalCluster::<(u64, u8)>::create(2, 8).unwrap();
    let table = cluster.table(RankId::new(0)).unwrap();

    drop(table.insert((9, 1)));
    assert_eq!(table.find(&9).await, Ok(Some((9, 1))));
}

#[tokio::test]
async fn test_config_sized_cluster_holds_expected_keys() {
    let config = TableConfig::sized_for(2000, 4, 0.7).unwrap();
    let cluster = LocalCluster::<KmerPair>::from_config(&config).unwrap();
    let table = cluster.table(RankId::new(3)).unwrap();

    let entries = random_kmers(2000, config.kmer_len, 5).unwrap();
    let pending: Vec<_> = entries.iter().map(|e| table.insert(*e)).collect();
    let stored = futures::future::join_all(pending).await;
    assert!(stored.iter().all(|r| *r == Ok(true)));

    for stats in cluster.stats().await.unwrap() {
        assert!(stats.load_factor() < 0.9, "{} too full", stats.rank);
    }
}

#[tokio::test]
async fn test_kmer_traversal_across_ranks() {
    // One contig split into overlapping 5-mers, linked by forward extensions.
    let contig = "ACGTTGCATGGCAT";
    let k = 5;
    let bases = contig.as_bytes();
    let cluster = LocalCluster::<KmerPair>::create(3, 32).unwrap();
    let table = cluster.table(RankId::new(0)).unwrap();

    for i in 0..=bases.len() - k {
        let kmer = Kmer::from_bases(&bases[i..i + k]).unwrap();
        let backward = if i == 0 { b'F' } else { bases[i - 1] };
        let forward = if i + k == bases.len() { b'F' } else { bases[i + k] };
        let pair = KmerPair::new(kmer, backward, forward).unwrap();
        assert_eq!(table.insert(pair).await, Ok(true));
    }

    let mut current = table
        .find(&Kmer::from_bases(&bases[..k]).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(current.is_start());
    let mut assembled = current.kmer.to_string();
    while let Some(next) = current.next_kmer() {
        current = table.find(&next).await.unwrap().unwrap();
        assembled.push(current.kmer.base(k - 1).unwrap());
    }
    assert!(current.is_end());
    assert_eq!(assembled, contig);
}

#[tokio::test]
async fn test_two_ranks_over_tarpc() {
    let (rank0, addr0) = start_rank(0, 256).await;
    let (rank1, addr1) = start_rank(1, 256).await;

    let config = TableConfig {
        rank_count: 2,
        local_capacity: 256,
        peers: vec![addr0.to_string(), addr1.to_string()],
        ..Default::default()
    };
    let table0 = DistTable::connect(&config, rank0.mailbox().clone()).await.unwrap();
    let table1 = DistTable::connect(&config, rank1.mailbox().clone()).await.unwrap();

    let entries = random_kmers(200, 19, 3).unwrap();
    let pending: Vec<_> = entries.iter().map(|e| table0.insert(*e)).collect();
    for stored in futures::future::join_all(pending).await {
        assert_eq!(stored, Ok(true));
    }

    let owners: HashSet<RankId> = entries.iter().map(|e| table1.target_rank(&e.kmer)).collect();
    assert_eq!(owners.len(), 2);

    for entry in &entries {
        assert_eq!(table1.find(&entry.kmer).await, Ok(Some(*entry)));
    }
    let missing: Kmer = "ACGTACGTACGTACGTACGTACGTA".parse().unwrap();
    assert_eq!(table1.find(&missing).await, Ok(None));

    let stats = table0.all_stats().await.unwrap();
    assert_eq!(stats.iter().map(|s| s.occupied).sum::<usize>(), 200);
    assert!(stats.iter().all(|s| s.occupied > 0));
}

#[tokio::test]
async fn test_stopped_remote_rank_is_unavailable() {
    let (rank0, addr0) = start_rank(0, 16).await;
    let (rank1, addr1) = start_rank(1, 16).await;

    let config = TableConfig {
        rank_count: 2,
        local_capacity: 16,
        peers: vec![addr0.to_string(), addr1.to_string()],
        ..Default::default()
    };
    let table0 = DistTable::connect(&config, rank0.mailbox().clone()).await.unwrap();
    rank1.shutdown().await.unwrap();

    assert_eq!(
        table0.stats(RankId::new(1)).await,
        Err(TableError::RankUnavailable(RankId::new(1)))
    );
    assert!(table0.stats(RankId::new(0)).await.is_ok());
}
