use std::fmt;

use ferry_core::ChannelError;
use tracing::{debug, trace};

use crate::{
    balance::LoadBalance,
    candidate::{Candidate, Invocation, Node},
    error::RouteError,
};

/// 快速失败路由：选一次节点，调用一次，失败立即返回。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 非幂等调用不能被自动重放；失败分类交给调用方，由其决定是否换节点重试。
///
/// ## 契约（What）
/// - 每次 [`route`](Self::route) 恰好调用一次均衡策略；
/// - 选出节点时恰好调用一次 `invoke`，其错误包装为 [`RouteError::Channel`] 原样返回；
/// - 没有节点时不调用 `invoke`，返回 [`RouteError::NoCandidate`]。
pub struct FailfastRouter<N: Node> {
    balance: Box<dyn LoadBalance<N>>,
}

impl<N: Node> FailfastRouter<N> {
    pub fn new(balance: Box<dyn LoadBalance<N>>) -> Self {
        Self { balance }
    }

    pub fn balance_name(&self) -> &'static str {
        self.balance.name()
    }

    /// 选取节点并执行一次调用。
    pub async fn route<'a, F, Fut, T>(
        &self,
        candidate: &'a Candidate<N>,
        invocation: &Invocation,
        invoke: F,
    ) -> Result<T, RouteError>
    where
        F: FnOnce(&'a N) -> Fut,
        Fut: Future<Output = Result<T, ChannelError>>,
    {
        let Some(node) = self.balance.select(candidate, invocation) else {
            debug!(
                service = invocation.service(),
                method = invocation.method(),
                balance = self.balance.name(),
                candidates = candidate.len(),
                "no node selected"
            );
            return Err(RouteError::NoCandidate {
                service: invocation.service().to_owned(),
                method: invocation.method().to_owned(),
            });
        };
        trace!(node = node.key(), method = invocation.method(), "routing invocation");
        invoke(node).await.map_err(|err| {
            debug!(
                node = node.key(),
                method = invocation.method(),
                code = err.code(),
                "invocation failed without retry"
            );
            RouteError::Channel(err)
        })
    }
}

impl<N: Node> fmt::Debug for FailfastRouter<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailfastRouter")
            .field("balance", &self.balance.name())
            .finish()
    }
}
