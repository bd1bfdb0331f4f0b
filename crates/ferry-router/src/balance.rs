use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use arc_swap::ArcSwapOption;
use tracing::debug;

use crate::candidate::{Candidate, Invocation, Node};

/// 轮询策略的注册名。
pub const ROUND_ROBIN: &str = "round_robin";
/// 粘滞策略的注册名。
pub const STICKY: &str = "sticky";

/// 负载均衡策略。
///
/// # 教案级注释
///
/// ## 契约（What）
/// - `select` 从候选集中挑选一个节点，返回的引用来自候选集本身；
/// - 不得修改候选集；候选集为空或没有可用节点时返回 `None`；
/// - 策略实例可被多个任务并发调用，内部状态须自行同步。
pub trait LoadBalance<N: Node>: Send + Sync {
    fn name(&self) -> &'static str;

    fn select<'a>(&self, candidate: &'a Candidate<N>, invocation: &Invocation) -> Option<&'a N>;
}

/// 轮询：依次循环返回候选节点。
///
/// 计数器在进程内单调递增并对候选数取模；候选集变化时从当前计数位置继续。
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<N: Node> LoadBalance<N> for RoundRobin {
    fn name(&self) -> &'static str {
        ROUND_ROBIN
    }

    fn select<'a>(&self, candidate: &'a Candidate<N>, _invocation: &Invocation) -> Option<&'a N> {
        if candidate.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % candidate.len();
        candidate.get(index)
    }
}

/// 粘滞：只要上次选中的节点仍在候选集中就继续使用它，否则轮询挑选新节点并记住。
///
/// # 注意事项（Trade-offs）
/// - 记住的是节点键而不是引用，候选快照更新后仍能识别同一节点；
/// - 并发首次选择时可能各自选出不同节点，最终以最后一次写入为准。
#[derive(Debug, Default)]
pub struct Sticky {
    last: ArcSwapOption<String>,
    fallback: RoundRobin,
}

impl Sticky {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前粘住的节点键。
    pub fn current(&self) -> Option<Arc<String>> {
        self.last.load_full()
    }
}

impl<N: Node> LoadBalance<N> for Sticky {
    fn name(&self) -> &'static str {
        STICKY
    }

    fn select<'a>(&self, candidate: &'a Candidate<N>, invocation: &Invocation) -> Option<&'a N> {
        let previous = self.last.load_full();
        if let Some(key) = previous.as_deref()
            && let Some(node) = candidate.find(key)
        {
            return Some(node);
        }
        let node = self.fallback.select(candidate, invocation)?;
        debug!(
            previous = previous.as_deref().map(String::as_str),
            next = node.key(),
            "sticky load balance switched node"
        );
        self.last.store(Some(Arc::new(node.key().to_owned())));
        Some(node)
    }
}
