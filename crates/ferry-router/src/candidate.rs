use std::{fmt, slice, sync::Arc};

/// 可被路由选中的节点。
///
/// `key` 在同一候选集中唯一，粘滞等策略以它识别“同一个节点”。
pub trait Node: Send + Sync {
    fn key(&self) -> &str;
}

impl Node for String {
    fn key(&self) -> &str {
        self
    }
}

impl Node for Arc<str> {
    fn key(&self) -> &str {
        self
    }
}

impl Node for &'static str {
    fn key(&self) -> &str {
        self
    }
}

/// 一次调用的路由上下文。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Invocation {
    service: Arc<str>,
    method: Arc<str>,
}

impl Invocation {
    pub fn new(service: impl Into<Arc<str>>, method: impl Into<Arc<str>>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

/// 不可变的候选节点快照。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 服务发现可能随时更新节点列表；路由期间看到的集合必须稳定，
///   均衡策略也不得改动它。
///
/// ## 契约（What）
/// - 内部以 `Arc<[N]>` 存放，克隆只复制引用；
/// - 只提供只读访问，更新节点列表意味着构造新的快照。
pub struct Candidate<N> {
    nodes: Arc<[N]>,
}

impl<N> Candidate<N> {
    pub fn new(nodes: Vec<N>) -> Self {
        Self {
            nodes: nodes.into(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn nodes(&self) -> &[N] {
        &self.nodes
    }

    pub fn get(&self, index: usize) -> Option<&N> {
        self.nodes.get(index)
    }

    pub fn iter(&self) -> slice::Iter<'_, N> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<N: Node> Candidate<N> {
    /// 按节点键查找。
    pub fn find(&self, key: &str) -> Option<&N> {
        self.nodes.iter().find(|node| node.key() == key)
    }
}

impl<N> Clone for Candidate<N> {
    fn clone(&self) -> Self {
        Self {
            nodes: Arc::clone(&self.nodes),
        }
    }
}

impl<N> From<Vec<N>> for Candidate<N> {
    fn from(nodes: Vec<N>) -> Self {
        Self::new(nodes)
    }
}

impl<N> FromIterator<N> for Candidate<N> {
    fn from_iter<I: IntoIterator<Item = N>>(iter: I) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
        }
    }
}

impl<N: Node> fmt::Debug for Candidate<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.nodes.iter().map(Node::key))
            .finish()
    }
}
