use std::sync::Arc;
use std::time::Duration;

use qluster::{
    Clock, InMemoryCluster, JobOptions, JobQueue, ManualClock, NodeAddress, Priority, QueueConfig,
    QueueError, StoreClient,
};
use serde_json::json;

struct TestCluster {
    queue: JobQueue,
    cluster: InMemoryCluster,
    clock: ManualClock,
    nodes: Vec<NodeAddress>,
}

impl TestCluster {
    async fn new() -> Self {
        let nodes = vec![
            NodeAddress::localhost(11910),
            NodeAddress::localhost(11911),
            NodeAddress::localhost(11912),
        ];
        let cluster = InMemoryCluster::with_nodes(&nodes).await;
        let clock = ManualClock::starting_now();
        let queue = JobQueue::with_clock(
            QueueConfig::default(),
            Arc::new(cluster.clone()),
            Arc::new(clock.clone()),
        )
        .unwrap();
        Self {
            queue,
            cluster,
            clock,
            nodes,
        }
    }

    /// A second worker process sharing the same store nodes and clock.
    fn other_worker(&self) -> JobQueue {
        JobQueue::with_clock(
            QueueConfig::default(),
            Arc::new(self.cluster.clone()),
            Arc::new(self.clock.clone()),
        )
        .unwrap()
    }

    async fn create(&self, kind: &str, assign: usize, options: JobOptions) -> String {
        let (job_id, owner) = self
            .queue
            .create_job(
                kind,
                json!({"pie": 42}),
                &self.nodes,
                Some(self.nodes[assign].clone()),
                options,
            )
            .await
            .unwrap();
        assert_eq!(owner, self.nodes[assign]);
        job_id
    }

    async fn store(&self, index: usize) -> Arc<qluster::InMemoryStore> {
        self.cluster.node(&self.nodes[index]).await.unwrap()
    }
}

#[tokio::test]
async fn test_job_is_replicated_everywhere_and_active_only_on_owner() {
    let t = TestCluster::new().await;
    let job_id = t.create("baking", 1, JobOptions::new()).await;

    for (i, node) in t.nodes.iter().enumerate() {
        let store = t.store(i).await;
        assert!(store.exists(&format!("q:job:{job_id}")).await.unwrap());
        assert_eq!(t.queue.jobs(node).await.unwrap(), vec![job_id.clone()]);
        assert_eq!(
            t.queue.jobs_owned_by(node, &t.nodes[1]).await.unwrap(),
            vec![job_id.clone()]
        );
        assert_eq!(t.queue.pool_members(node).await.unwrap(), t.nodes);

        let indexed = t.queue.jobs_in_state(node, "inactive").await.unwrap();
        let by_kind = t
            .queue
            .jobs_of_kind_in_state(node, "baking", "inactive")
            .await
            .unwrap();
        if i == 1 {
            assert_eq!(indexed, vec![job_id.clone()]);
            assert_eq!(by_kind, vec![job_id.clone()]);
        } else {
            assert!(indexed.is_empty());
            assert!(by_kind.is_empty());
        }
    }
}

#[tokio::test]
async fn test_created_job_round_trips_without_lease() {
    let t = TestCluster::new().await;
    let job_id = t
        .create(
            "baking",
            0,
            JobOptions::new().with_timeout(Duration::from_secs(60)),
        )
        .await;

    let record = t.queue.load_record(&t.nodes[2], &job_id).await.unwrap();
    assert_eq!(record.kind, "baking");
    assert_eq!(record.data, json!({"pie": 42}));
    assert_eq!(record.state.as_deref(), Some("inactive"));
    assert_eq!(record.timeout, Duration::from_secs(60));
    assert_eq!(record.get("timeout").as_deref(), Some("60"));
    assert_eq!(record.created_at, None);
    assert_eq!(record.get("error"), None);
    assert_eq!(record.get("no-such-field"), None);
    assert_eq!(
        t.queue.lease_expiration(&t.nodes[0], &job_id).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_claim_sets_lease_on_owner() {
    let t = TestCluster::new().await;
    let job_id = t.create("baking", 0, JobOptions::new()).await;

    let job = t.queue.claim_job(&job_id, &t.nodes[0]).await.unwrap();
    let expected = t.clock.epoch_seconds() + 60.0;
    assert_eq!(job.expiration(), expected);
    assert!((job.time_to_live().as_secs_f64() - 60.0).abs() < 1e-3);
    assert_eq!(
        t.queue.lease_expiration(&t.nodes[0], &job_id).await.unwrap(),
        Some(expected)
    );
    assert_eq!(job.pool(), t.nodes.as_slice());
}

#[tokio::test]
async fn test_claim_through_replica_follows_owner() {
    let t = TestCluster::new().await;
    let job_id = t.create("baking", 2, JobOptions::new()).await;

    let job = t.queue.claim_job(&job_id, &t.nodes[0]).await.unwrap();
    assert_eq!(job.owner(), &t.nodes[2]);
    assert!(t
        .queue
        .lease_expiration(&t.nodes[2], &job_id)
        .await
        .unwrap()
        .is_some());
    assert_eq!(
        t.queue.lease_expiration(&t.nodes[0], &job_id).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_missing_job_does_not_exist() {
    let t = TestCluster::new().await;
    let err = t
        .queue
        .claim_job("no-such-job", &t.nodes[0])
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_live_lease_locks_out_other_workers() {
    let t = TestCluster::new().await;
    let job_id = t.create("baking", 0, JobOptions::new()).await;
    let job = t.queue.claim_job(&job_id, &t.nodes[0]).await.unwrap();

    t.clock.advance(Duration::from_secs(30));
    let err = t
        .other_worker()
        .claim_job(&job_id, &t.nodes[0])
        .await
        .unwrap_err();
    assert!(err.is_locked());
    assert_eq!(err.lock_expiration(), Some(job.expiration()));
    assert_eq!(err.to_string(), format!("Job {job_id} is locked"));
    assert_eq!(
        t.queue.lease_expiration(&t.nodes[0], &job_id).await.unwrap(),
        Some(job.expiration())
    );
}

#[tokio::test]
async fn test_lapsed_lease_is_reclaimed_and_old_handle_loses() {
    let t = TestCluster::new().await;
    let job_id = t.create("baking", 0, JobOptions::new()).await;
    let mut first = t.queue.claim_job(&job_id, &t.nodes[0]).await.unwrap();

    t.clock.advance(Duration::from_secs(61));
    let mut second = t
        .other_worker()
        .claim_job(&job_id, &t.nodes[0])
        .await
        .unwrap();
    assert!(second.expiration() > first.expiration());

    // The new owner writes without claiming again.
    second.set("progress", "half").await.unwrap();

    let err = first.set("progress", "done").await.unwrap_err();
    assert!(err.is_locked());
    assert_eq!(
        err.to_string(),
        "Job timed out and claimed by another worker"
    );
    assert_eq!(err.lock_expiration(), Some(second.expiration()));

    let record = t.queue.load_record(&t.nodes[0], &job_id).await.unwrap();
    assert_eq!(record.get("progress").as_deref(), Some("half"));
}

#[tokio::test]
async fn test_short_timeout_lapses_and_can_be_reclaimed() {
    let t = TestCluster::new().await;
    let job_id = t
        .create(
            "baking",
            0,
            JobOptions::new().with_timeout(Duration::from_millis(100)),
        )
        .await;
    let mut job = t.queue.claim_job(&job_id, &t.nodes[0]).await.unwrap();

    t.clock.advance(Duration::from_millis(200));
    assert_eq!(job.time_to_live(), Duration::ZERO);
    let stored = t
        .queue
        .lease_expiration(&t.nodes[0], &job_id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored < t.clock.epoch_seconds());

    // Same worker: the guard re-claims transparently.
    job.set("progress", "resumed").await.unwrap();
    assert!(job.time_to_live() > Duration::ZERO);

    t.clock.advance(Duration::from_millis(200));
    t.other_worker()
        .claim_job(&job_id, &t.nodes[0])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_short_timeout_with_system_clock() {
    let nodes = vec![NodeAddress::localhost(11920)];
    let cluster = InMemoryCluster::with_nodes(&nodes).await;
    let queue = JobQueue::new(QueueConfig::default(), Arc::new(cluster)).unwrap();
    let (job_id, _) = queue
        .create_job(
            "baking",
            json!({"pie": 42}),
            &nodes,
            None,
            JobOptions::new().with_timeout(Duration::from_millis(100)),
        )
        .await
        .unwrap();
    let job = queue.claim_job(&job_id, &nodes[0]).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(job.time_to_live(), Duration::ZERO);
    queue.claim_job(&job_id, &nodes[0]).await.unwrap();
}

#[tokio::test]
async fn test_transition_reindexes_exactly_once() {
    let t = TestCluster::new().await;
    let job_id = t.create("baking", 0, JobOptions::new()).await;
    let owner = &t.nodes[0];
    let mut job = t.queue.claim_job(&job_id, owner).await.unwrap();

    job.transition_to("leavening").await.unwrap();
    assert_eq!(job.state(), Some("leavening"));

    let q = &t.queue;
    assert!(q.jobs_in_state(owner, "inactive").await.unwrap().is_empty());
    assert!(q
        .jobs_of_kind_in_state(owner, "baking", "inactive")
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        q.jobs_in_state(owner, "leavening").await.unwrap(),
        vec![job_id.clone()]
    );
    assert_eq!(
        q.jobs_of_kind_in_state(owner, "baking", "leavening")
            .await
            .unwrap(),
        vec![job_id.clone()]
    );

    let record = q.load_record(owner, &job_id).await.unwrap();
    assert_eq!(record.state.as_deref(), Some("leavening"));
    assert!(record.updated_at.is_some());

    // Non-owner replicas never see state indices.
    assert!(q
        .jobs_in_state(&t.nodes[1], "leavening")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_set_state_dispatches_with_supplied_value() {
    let t = TestCluster::new().await;
    let job_id = t.create("baking", 0, JobOptions::new()).await;
    let mut job = t.queue.claim_job(&job_id, &t.nodes[0]).await.unwrap();

    job.set("state", "baked").await.unwrap();
    assert_eq!(job.state(), Some("baked"));
    assert_eq!(
        t.queue.jobs_in_state(&t.nodes[0], "baked").await.unwrap(),
        vec![job_id]
    );
    assert!(t
        .queue
        .jobs_in_state(&t.nodes[0], "value")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_first_save_registers_kind_and_renews_lease() {
    let t = TestCluster::new().await;
    let job_id = t.create("baking", 0, JobOptions::new()).await;
    let mut job = t.queue.claim_job(&job_id, &t.nodes[0]).await.unwrap();
    assert!(t.queue.known_kinds(&t.nodes[0]).await.unwrap().is_empty());

    t.clock.advance(Duration::from_secs(20));
    job.set("data", r#"{"pie": 43}"#).await.unwrap();
    assert_eq!(job.data(), &json!({"pie": 43}));
    assert_eq!(job.expiration(), t.clock.epoch_seconds() + 60.0);
    assert_eq!(t.queue.known_kinds(&t.nodes[0]).await.unwrap(), vec!["baking"]);

    let created_at = job.record().created_at;
    assert!(created_at.is_some());
    t.clock.advance(Duration::from_secs(5));
    job.save().await.unwrap();
    assert_eq!(job.record().created_at, created_at);
    assert!(job.record().updated_at > created_at);

    let other = t.other_worker();
    let record = other.load_record(&t.nodes[0], &job_id).await.unwrap();
    assert_eq!(record.data, json!({"pie": 43}));
    assert_eq!(record.state.as_deref(), Some("inactive"));
    other.close().await;
}

#[tokio::test]
async fn test_identity_fields_are_read_only() {
    let t = TestCluster::new().await;
    let job_id = t.create("baking", 0, JobOptions::new()).await;
    let mut job = t.queue.claim_job(&job_id, &t.nodes[0]).await.unwrap();

    let err = job.set("kind", "frying").await.unwrap_err();
    assert!(matches!(err, QueueError::InvalidArgument(_)));
    assert_eq!(job.kind(), "baking");
}

#[tokio::test]
async fn test_fail_records_error() {
    let t = TestCluster::new().await;
    let job_id = t.create("baking", 0, JobOptions::new()).await;
    let mut job = t.queue.claim_job(&job_id, &t.nodes[0]).await.unwrap();

    job.fail("oven on fire").await.unwrap();
    job.reload().await.unwrap();
    assert_eq!(job.get("error").as_deref(), Some("oven on fire"));
    let failed_at = job.record().failed_at.unwrap();
    assert_eq!(failed_at.timestamp_micros(), t.clock.now().timestamp_micros());
}

#[tokio::test]
async fn test_remove_purges_every_node_and_poisons_handle() {
    let t = TestCluster::new().await;
    let job_id = t.create("baking", 1, JobOptions::new()).await;
    let mut job = t.queue.claim_job(&job_id, &t.nodes[1]).await.unwrap();
    job.transition_to("leavening").await.unwrap();

    job.remove().await.unwrap();
    assert!(job.is_removed());
    assert_eq!(job.time_to_live(), Duration::ZERO);

    for (i, node) in t.nodes.iter().enumerate() {
        let store = t.store(i).await;
        assert!(!store.exists(&format!("q:job:{job_id}")).await.unwrap());
        assert!(!store
            .exists(&format!("q:job:{job_id}:expires"))
            .await
            .unwrap());
        assert!(t.queue.jobs(node).await.unwrap().is_empty());
        assert!(t
            .queue
            .jobs_owned_by(node, &t.nodes[1])
            .await
            .unwrap()
            .is_empty());
        assert!(t
            .queue
            .jobs_in_state(node, "leavening")
            .await
            .unwrap()
            .is_empty());
    }

    assert!(job.set("progress", "x").await.unwrap_err().is_removed());
    assert!(job.transition_to("baked").await.unwrap_err().is_removed());
    assert!(job.transition_to("").await.unwrap_err().is_removed());
    assert!(job.save().await.unwrap_err().is_removed());
    assert!(job.remove().await.unwrap_err().is_removed());
    assert!(job.fail("late").await.unwrap_err().is_removed());

    let err = t.queue.claim_job(&job_id, &t.nodes[1]).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_priority_order_in_indices() {
    let t = TestCluster::new().await;
    let mut ids = Vec::new();
    for priority in [
        Priority::Low,
        Priority::Normal,
        Priority::Critical,
        Priority::High,
    ] {
        let job_id = t
            .create("baking", 0, JobOptions::new().with_priority(priority))
            .await;
        ids.push((priority, job_id));
    }
    let id_of = |p: Priority| ids.iter().find(|(q, _)| *q == p).unwrap().1.clone();
    let expected = vec![
        id_of(Priority::Critical),
        id_of(Priority::High),
        id_of(Priority::Normal),
        id_of(Priority::Low),
    ];

    assert_eq!(
        t.queue.jobs_in_state(&t.nodes[0], "inactive").await.unwrap(),
        expected
    );
    assert_eq!(t.queue.jobs(&t.nodes[2]).await.unwrap(), expected);
}

#[tokio::test]
async fn test_unreachable_replica_is_skipped() {
    let t = TestCluster::new().await;
    t.cluster.set_online(&t.nodes[2], false).await;

    let job_id = t.create("baking", 0, JobOptions::new()).await;
    assert_eq!(t.queue.jobs(&t.nodes[1]).await.unwrap(), vec![job_id.clone()]);
    assert_eq!(t.store(2).await.key_count().await, 0);

    let mut job = t.queue.claim_job(&job_id, &t.nodes[0]).await.unwrap();
    t.cluster.set_online(&t.nodes[1], false).await;
    job.remove().await.unwrap();

    assert!(!t
        .store(0)
        .await
        .exists(&format!("q:job:{job_id}"))
        .await
        .unwrap());
    // The offline replica keeps its stale copy.
    t.cluster.set_online(&t.nodes[1], true).await;
    assert!(t
        .store(1)
        .await
        .exists(&format!("q:job:{job_id}"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_unreachable_owner_fails_creation() {
    let t = TestCluster::new().await;
    t.cluster.set_online(&t.nodes[0], false).await;

    let err = t
        .queue
        .create_job(
            "baking",
            json!({}),
            &t.nodes,
            Some(t.nodes[0].clone()),
            JobOptions::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Store(_)));
}
