//! 快速失败路由与均衡策略的契约测试。
//!
//! # 教案级导览
//!
//! - **Why**：快速失败的核心承诺是“不重试”；均衡策略的核心承诺是“不改候选集”；
//! - **How**：以计数闭包观察调用次数，以 `futures::executor::block_on` 驱动异步路由，
//!   以 proptest 生成任意候选集检查选择结果；
//! - **What**：覆盖成功、失败、无候选三条路径与策略的只读性。

use std::sync::atomic::{AtomicUsize, Ordering};

use ferry_core::{ChannelError, ErrorKind};
use ferry_router::{
    Candidate, FailfastRouter, Invocation, LoadBalance, LoadBalanceRegistry, ROUND_ROBIN,
    RouteError, RoundRobin, STICKY, Sticky,
};
use futures::executor::block_on;
use proptest::prelude::*;
use tracing_test::traced_test;

fn invocation() -> Invocation {
    Invocation::new("demo.Greeter", "hello")
}

fn candidate(keys: &[&str]) -> Candidate<String> {
    keys.iter().map(|key| key.to_string()).collect()
}

#[test]
fn failfast_invokes_the_selected_node_once() {
    let router = LoadBalanceRegistry::<String>::with_defaults()
        .failfast(ROUND_ROBIN)
        .expect("default policy");
    let nodes = candidate(&["n1", "n2"]);
    let calls = AtomicUsize::new(0);

    let reply = block_on(router.route(&nodes, &invocation(), |node| {
        calls.fetch_add(1, Ordering::SeqCst);
        let key = node.clone();
        async move { Ok::<_, ChannelError>(format!("served by {key}")) }
    }))
    .expect("route");
    assert_eq!(reply, "served by n1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
#[traced_test]
fn failfast_does_not_retry_a_failed_invocation() {
    let router = FailfastRouter::new(Box::new(RoundRobin::new()));
    let nodes = candidate(&["n1", "n2", "n3"]);
    let calls = AtomicUsize::new(0);

    let err = block_on(router.route(&nodes, &invocation(), |node| {
        calls.fetch_add(1, Ordering::SeqCst);
        let channel = node.clone();
        async move {
            Err::<(), _>(ChannelError::ChannelClosed {
                channel,
                message: None,
            })
        }
    }))
    .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1, "快速失败不得重试其他节点");
    match &err {
        RouteError::Channel(cause) => assert_eq!(cause.kind(), ErrorKind::ChannelClosed),
        other => panic!("expected a channel error, got {other:?}"),
    }
    assert!(!err.is_retryable());
    assert!(logs_contain("invocation failed without retry"));
}

#[test]
fn empty_candidate_fails_without_invoking() {
    let router = FailfastRouter::new(Box::new(Sticky::new()));
    let nodes = Candidate::<String>::empty();
    let calls = AtomicUsize::new(0);

    let err = block_on(router.route(&nodes, &invocation(), |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, ChannelError>(()) }
    }))
    .unwrap_err();
    assert!(matches!(err, RouteError::NoCandidate { ref service, .. } if service == "demo.Greeter"));
    assert_eq!(err.code(), "ferry.router.no_candidate");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn registry_accepts_custom_policies() {
    struct LastNode;
    impl LoadBalance<String> for LastNode {
        fn name(&self) -> &'static str {
            "last"
        }

        fn select<'a>(
            &self,
            candidate: &'a Candidate<String>,
            _invocation: &Invocation,
        ) -> Option<&'a String> {
            candidate.nodes().last()
        }
    }

    let registry = LoadBalanceRegistry::<String>::with_defaults();
    assert!(!registry.register("last", || Box::new(LastNode)));
    assert_eq!(registry.names(), ["last", ROUND_ROBIN, STICKY]);
    let router = registry.failfast("last").expect("custom policy");
    assert_eq!(router.balance_name(), "last");

    let nodes = candidate(&["a", "b"]);
    let picked = block_on(router.route(&nodes, &invocation(), |node| {
        let key = node.clone();
        async move { Ok::<_, ChannelError>(key) }
    }))
    .expect("route");
    assert_eq!(picked, "b");
}

proptest! {
    #[test]
    fn selection_is_a_member_and_leaves_the_candidate_untouched(
        keys in proptest::collection::vec("[a-z]{1,6}", 0..8),
        rounds in 1usize..16,
    ) {
        let nodes: Candidate<String> = keys.iter().cloned().collect();
        let before: Vec<String> = nodes.nodes().to_vec();
        let policies: [Box<dyn LoadBalance<String>>; 2] =
            [Box::new(RoundRobin::new()), Box::new(Sticky::new())];
        for policy in &policies {
            for _ in 0..rounds {
                match policy.select(&nodes, &invocation()) {
                    Some(node) => prop_assert!(nodes.iter().any(|n| std::ptr::eq(n, node))),
                    None => prop_assert!(nodes.is_empty()),
                }
            }
        }
        prop_assert_eq!(nodes.nodes(), &before[..]);
    }
}
