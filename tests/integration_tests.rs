//! gridcache Integration Tests
//!
//! Multi-member clusters in one process:
//! - Lazy deserialization across replication
//! - Cluster cache loader
//! - Cache API surface (views, flags, lifecycle, configuration)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use gridcache::marshall::{Codec, CodecRegistry, RepresentationState, USER_TAG_START};
use gridcache::{
    Address, Cache, CacheConfig, CacheManager, CacheMode, Error, Flag, LocalCluster, Object,
    VersionAwareMarshaller,
};

// =============================================================================
// Fixtures
// =============================================================================

/// Application type with a codec that counts its invocations
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Pojo {
    i: i32,
    b: bool,
}

/// Application type nobody registered a codec for
#[derive(Debug, PartialEq, Eq, Hash)]
struct Opaque(u32);

#[derive(Default)]
struct Counters {
    serializations: AtomicUsize,
    deserializations: AtomicUsize,
}

impl Counters {
    fn serializations(&self) -> usize {
        self.serializations.load(Ordering::SeqCst)
    }

    fn deserializations(&self) -> usize {
        self.deserializations.load(Ordering::SeqCst)
    }
}

fn counting_marshaller(counters: &Arc<Counters>) -> VersionAwareMarshaller {
    let on_write = Arc::clone(counters);
    let on_read = Arc::clone(counters);
    let mut registry = CodecRegistry::with_builtins();
    registry
        .register(Codec::new::<Pojo, _, _>(
            USER_TAG_START,
            move |out, pojo| {
                on_write.serializations.fetch_add(1, Ordering::SeqCst);
                out.write_i32(pojo.i);
                out.write_bool(pojo.b);
                Ok(())
            },
            move |input| {
                on_read.deserializations.fetch_add(1, Ordering::SeqCst);
                Ok(Pojo {
                    i: input.read_i32()?,
                    b: input.read_bool()?,
                })
            },
        ))
        .unwrap();
    VersionAwareMarshaller::new(registry)
}

struct Node {
    manager: Arc<CacheManager>,
    cache: Arc<Cache>,
    counters: Arc<Counters>,
}

async fn cluster_of(size: usize, config: CacheConfig) -> (Arc<LocalCluster>, Vec<Node>) {
    let cluster = LocalCluster::new();
    let mut nodes = Vec::with_capacity(size);
    for i in 0..size {
        let counters = Arc::new(Counters::default());
        let manager = CacheManager::clustered_as(
            &cluster,
            Address::new(format!("node-{i}")),
            counting_marshaller(&counters),
        );
        let cache = manager.define_cache("test", config.clone()).await.unwrap();
        nodes.push(Node {
            manager,
            cache,
            counters,
        });
    }
    (cluster, nodes)
}

fn lazy_sync() -> CacheConfig {
    CacheConfig::replicated(CacheMode::ReplSync).with_lazy_deserialization(true)
}

fn lazy_with_loader() -> CacheConfig {
    lazy_sync().with_cluster_loader(1_000)
}

fn pojo() -> Object {
    Object::new(Pojo { i: 1, b: true })
}

fn only_value_state(cache: &Cache) -> RepresentationState {
    let entries = cache.data_container().entries();
    assert_eq!(entries.len(), 1);
    entries[0].value().as_marshalled().unwrap().state()
}

// =============================================================================
// Lazy Deserialization
// =============================================================================

mod lazy_tests {
    use super::*;
    use async_trait::async_trait;
    use gridcache::commands::{Command, Reply};
    use gridcache::context::InvocationContext;
    use gridcache::interceptors::{Interceptor, MarshalledValueInterceptor, Next};

    #[tokio::test]
    async fn test_local_put_serializes_once() {
        let (_cluster, nodes) = cluster_of(2, lazy_sync()).await;
        let a = &nodes[0];

        assert_eq!(a.cache.put("k", pojo()).await.unwrap(), None);
        assert_eq!(a.counters.serializations(), 1);
        assert_eq!(a.counters.deserializations(), 0);
        assert_eq!(only_value_state(&a.cache), RepresentationState::InstanceOnly);

        let value = a.cache.get("k").await.unwrap().unwrap();
        assert_eq!(value, pojo());
        assert!(!value.is_marshalled());
        assert_eq!(a.counters.serializations(), 1);
        assert_eq!(a.counters.deserializations(), 0);
    }

    #[tokio::test]
    async fn test_replicated_value_deserialized_on_first_read() {
        let (_cluster, nodes) = cluster_of(2, lazy_sync()).await;
        let (a, b) = (&nodes[0], &nodes[1]);

        a.cache.put("k", pojo()).await.unwrap();
        assert_eq!(only_value_state(&b.cache), RepresentationState::RawOnly);
        assert_eq!(b.counters.deserializations(), 0);

        assert_eq!(b.cache.get("k").await.unwrap(), Some(pojo()));
        assert_eq!(b.counters.deserializations(), 1);
        assert_eq!(b.counters.serializations(), 0);

        // Second read reuses the instance
        assert_eq!(b.cache.get("k").await.unwrap(), Some(pojo()));
        assert_eq!(b.counters.deserializations(), 1);
    }

    #[tokio::test]
    async fn test_compact_keeps_only_bytes() {
        let (_cluster, nodes) = cluster_of(2, lazy_sync()).await;
        let a = &nodes[0];

        a.cache.put("k", pojo()).await.unwrap();
        a.cache.compact().unwrap();

        assert_eq!(only_value_state(&a.cache), RepresentationState::RawOnly);
        assert_eq!(a.counters.serializations(), 2);
        assert_eq!(a.cache.get("k").await.unwrap(), Some(pojo()));
        assert_eq!(a.counters.deserializations(), 1);
    }

    /// Counts commands reaching the stage after marshalling
    struct Tripwire(Arc<AtomicUsize>);

    #[async_trait]
    impl Interceptor for Tripwire {
        fn name(&self) -> &'static str {
            "tripwire"
        }

        async fn handle(
            &self,
            ctx: &mut InvocationContext,
            command: Command,
            next: Next<'_>,
        ) -> gridcache::Result<Reply> {
            self.0.fetch_add(1, Ordering::SeqCst);
            next.run(ctx, command).await
        }
    }

    #[tokio::test]
    async fn test_non_serializable_write_stops_at_marshalling() {
        let (_cluster, nodes) = cluster_of(2, lazy_sync()).await;
        let (a, b) = (&nodes[0], &nodes[1]);
        let seen = Arc::new(AtomicUsize::new(0));
        assert!(a
            .cache
            .chain()
            .add_interceptor_after(Arc::new(Tripwire(Arc::clone(&seen))), MarshalledValueInterceptor::NAME));

        let err = a.cache.put("k", Object::new(Opaque(7))).await.unwrap_err();
        assert_matches!(err, Error::NonSerializable { .. });
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        assert!(!a.cache.contains_key("k").await.unwrap());
        assert!(!b.cache.contains_key("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_non_serializable_write_without_lazy_leaves_no_trace() {
        let (_cluster, nodes) = cluster_of(2, CacheConfig::replicated(CacheMode::ReplSync)).await;
        let a = &nodes[0];

        let err = a.cache.put("k", Object::new(Opaque(7))).await.unwrap_err();
        assert_matches!(err, Error::NonSerializable { .. });
        assert!(!a.cache.contains_key("k").await.unwrap());
        assert_eq!(a.cache.stats().snapshot().stores, 0);
    }

    #[tokio::test]
    async fn test_remove_replicates() {
        let (_cluster, nodes) = cluster_of(3, lazy_sync()).await;
        nodes[0].cache.put("k", pojo()).await.unwrap();
        assert_eq!(nodes[1].cache.remove("k").await.unwrap(), Some(pojo()));

        for node in &nodes {
            assert!(!node.cache.contains_key("k").await.unwrap());
        }
        assert_eq!(nodes[1].cache.stats().snapshot().replications, 1);
    }

    #[tokio::test]
    async fn test_clear_replicates() {
        let (_cluster, nodes) = cluster_of(2, lazy_sync()).await;
        nodes[0].cache.put("a", 1).await.unwrap();
        nodes[0].cache.put("b", 2).await.unwrap();
        assert_eq!(nodes[1].cache.size().await.unwrap(), 2);

        nodes[1].cache.clear().await.unwrap();
        assert_eq!(nodes[0].cache.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_async_replication_arrives() {
        let config = CacheConfig::replicated(CacheMode::ReplAsync).with_lazy_deserialization(true);
        let (_cluster, nodes) = cluster_of(2, config).await;
        nodes[0].cache.put("k", pojo()).await.unwrap();

        let mut arrived = false;
        for _ in 0..100 {
            if nodes[1].cache.contains_key("k").await.unwrap() {
                arrived = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(arrived, "asynchronous write never reached the peer");
    }

    #[tokio::test]
    async fn test_departed_member_fails_synchronous_write() {
        let (_cluster, mut nodes) = cluster_of(2, lazy_sync()).await;
        // Dropping the manager without leaving makes the member unreachable
        let gone = nodes.pop().unwrap();
        drop(gone);

        let err = nodes[0].cache.put("k", pojo()).await.unwrap_err();
        assert_matches!(err, Error::MemberUnreachable(ref who) if who == "node-1");
    }

    #[tokio::test]
    async fn test_member_that_left_is_not_targeted() {
        let (cluster, nodes) = cluster_of(2, lazy_sync()).await;
        nodes[1].manager.stop().await.unwrap();
        assert_eq!(cluster.members(), vec![Address::from("node-0")]);

        nodes[0].cache.put("k", pojo()).await.unwrap();
        assert_eq!(nodes[0].cache.stats().snapshot().replications, 1);
    }
}

// =============================================================================
// Cluster Cache Loader
// =============================================================================

mod loader_tests {
    use super::*;

    #[tokio::test]
    async fn test_miss_loaded_from_peer() {
        let (_cluster, nodes) = cluster_of(2, lazy_with_loader()).await;
        let (a, b) = (&nodes[0], &nodes[1]);

        a.cache
            .with_flags(&[Flag::CacheModeLocal])
            .put("k", pojo())
            .await
            .unwrap();
        assert!(b.cache.data_container().is_empty());

        assert_eq!(b.cache.get("k").await.unwrap(), Some(pojo()));
        assert_eq!(b.cache.data_container().size(), 1);
        assert_eq!(b.counters.deserializations(), 1);

        let stats = b.cache.stats().snapshot();
        assert_eq!(stats.cluster_loads, 1);
        assert_eq!(stats.hits, 1);
    }

    // Both peers answer in-process before the loader inspects its queue, so
    // on the current-thread test runtime both replies are always seen. The
    // loader's own tests cover divergence against a scripted transport.
    #[tokio::test]
    async fn test_distinct_values_diverge() {
        let (_cluster, nodes) = cluster_of(3, lazy_with_loader()).await;
        let local = [Flag::CacheModeLocal];
        nodes[0]
            .cache
            .with_flags(&local)
            .put("k", Object::new(Pojo { i: 1, b: true }))
            .await
            .unwrap();
        nodes[1]
            .cache
            .with_flags(&local)
            .put("k", Object::new(Pojo { i: 2, b: false }))
            .await
            .unwrap();

        let err = nodes[2].cache.get("k").await.unwrap_err();
        assert_matches!(err, Error::LoaderDivergence { count: 2, .. });
        assert!(nodes[2].cache.data_container().is_empty());
    }

    #[tokio::test]
    async fn test_equal_values_collapse() {
        let (_cluster, nodes) = cluster_of(3, lazy_with_loader()).await;
        for node in &nodes[..2] {
            node.cache
                .with_flags(&[Flag::CacheModeLocal])
                .put("k", pojo())
                .await
                .unwrap();
        }
        assert_eq!(nodes[2].cache.get("k").await.unwrap(), Some(pojo()));
    }

    #[tokio::test]
    async fn test_replicated_expiring_entry_loads_without_divergence() {
        let (_cluster, nodes) = cluster_of(3, lazy_with_loader()).await;
        nodes[0]
            .cache
            .put_with_lifespan("mortal", pojo(), 60_000)
            .await
            .unwrap();
        nodes[0]
            .cache
            .put_with_expiry("transient", pojo(), 60_000, 30_000)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let local = [Flag::CacheModeLocal];
        for key in ["mortal", "transient"] {
            nodes[2].cache.with_flags(&local).remove(key).await.unwrap();
            assert_eq!(nodes[2].cache.get(key).await.unwrap(), Some(pojo()), "{key}");
        }

        let created = |node: &Node| node.cache.data_container().peek(&Object::from("mortal")).unwrap().created();
        assert_eq!(created(&nodes[0]), created(&nodes[1]));
        assert_eq!(created(&nodes[0]), created(&nodes[2]));
        assert_eq!(nodes[2].cache.stats().snapshot().cluster_loads, 2);
    }

    #[tokio::test]
    async fn test_nobody_has_the_key() {
        let (_cluster, nodes) = cluster_of(3, lazy_with_loader()).await;
        assert_eq!(nodes[0].cache.get("missing").await.unwrap(), None);

        let stats = nodes[0].cache.stats().snapshot();
        assert_eq!(stats.cluster_load_misses, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_skip_cache_load_flag() {
        let (_cluster, nodes) = cluster_of(2, lazy_with_loader()).await;
        nodes[0]
            .cache
            .with_flags(&[Flag::CacheModeLocal])
            .put("k", pojo())
            .await
            .unwrap();

        let value = nodes[1]
            .cache
            .with_flags(&[Flag::SkipCacheLoad])
            .get("k")
            .await
            .unwrap();
        assert_eq!(value, None);
        assert_eq!(nodes[1].cache.stats().snapshot().cluster_loads, 0);
    }

    #[tokio::test]
    async fn test_force_return_values_loads_previous() {
        let config = lazy_with_loader().with_force_return_values(true);
        let (_cluster, nodes) = cluster_of(2, config).await;
        nodes[0]
            .cache
            .with_flags(&[Flag::CacheModeLocal])
            .put("k", "v1")
            .await
            .unwrap();

        let previous = nodes[1].cache.put("k", "v2").await.unwrap();
        assert_eq!(previous, Some(Object::from("v1")));
        assert_eq!(nodes[0].cache.get("k").await.unwrap(), Some(Object::from("v2")));
    }

    #[tokio::test]
    async fn test_stopped_peer_answers_invalid() {
        let (_cluster, nodes) = cluster_of(2, lazy_with_loader()).await;
        nodes[0]
            .cache
            .with_flags(&[Flag::CacheModeLocal])
            .put("k", pojo())
            .await
            .unwrap();
        nodes[0].cache.stop().await.unwrap();

        assert_eq!(nodes[1].cache.get("k").await.unwrap(), None);
    }
}

// =============================================================================
// Cache API
// =============================================================================

mod api_tests {
    use super::*;

    #[tokio::test]
    async fn test_views_are_unmodifiable() {
        let (_cluster, nodes) = cluster_of(2, lazy_sync()).await;
        let cache = &nodes[0].cache;
        cache.put("a", pojo()).await.unwrap();
        cache.put("b", 2).await.unwrap();

        let keys = cache.key_set().await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&Object::from("a")));
        assert_matches!(keys.add(Object::from("c")), Err(Error::UnsupportedOperation(_)));
        assert_matches!(keys.clear(), Err(Error::UnsupportedOperation(_)));

        let values = cache.values().await.unwrap();
        assert!(values.contains(&pojo()));
        assert!(values.iter().all(|v| !v.is_marshalled()));
        assert_matches!(values.retain_all(&[]), Err(Error::UnsupportedOperation(_)));

        let entries = cache.entry_set().await.unwrap();
        for entry in &entries {
            assert_matches!(entry.set_value(Object::from(0)), Err(Error::UnsupportedOperation(_)));
        }
        assert_eq!(cache.size().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cache_mode_local_flag_skips_replication() {
        let (_cluster, nodes) = cluster_of(2, lazy_sync()).await;
        nodes[0]
            .cache
            .with_flags(&[Flag::CacheModeLocal])
            .put("k", pojo())
            .await
            .unwrap();

        assert!(nodes[0].cache.contains_key("k").await.unwrap());
        assert!(!nodes[1].cache.contains_key("k").await.unwrap());
        assert_eq!(nodes[0].counters.serializations(), 0);
    }

    #[tokio::test]
    async fn test_lifespan_replicates() {
        let (_cluster, nodes) = cluster_of(2, lazy_sync()).await;
        nodes[0].cache.put_with_lifespan("k", pojo(), 60_000).await.unwrap();

        let entries = nodes[1].cache.data_container().entries();
        assert_eq!(entries[0].lifespan(), 60_000);
        assert!(entries[0].is_mortal());
    }

    #[tokio::test]
    async fn test_stopped_cache_refuses_calls() {
        let (_cluster, nodes) = cluster_of(2, lazy_sync()).await;
        nodes[0].cache.stop().await.unwrap();
        assert_matches!(nodes[0].cache.put("k", 1).await, Err(Error::CacheNotRunning { .. }));

        nodes[0].cache.start().await.unwrap();
        tokio_test::assert_ok!(nodes[0].cache.put("k", 1).await);
    }

    #[tokio::test]
    async fn test_undefined_cache() {
        let (_cluster, nodes) = cluster_of(1, CacheConfig::default()).await;
        tokio_test::assert_err!(nodes[0].manager.cache("other"));
    }

    #[tokio::test]
    async fn test_config_from_yaml() {
        let config = CacheConfig::from_yaml_str(
            "cache_mode: repl_sync\nuse_lazy_deserialization: true\ncluster_loader:\n  remote_call_timeout_ms: 500\n",
        )
        .unwrap();
        let (_cluster, nodes) = cluster_of(2, config).await;

        nodes[0]
            .cache
            .with_flags(&[Flag::CacheModeLocal])
            .put("k", pojo())
            .await
            .unwrap();
        assert_eq!(nodes[1].cache.get("k").await.unwrap(), Some(pojo()));
    }
}
