use ferry_core::ChannelError;
use thiserror::Error;

/// 路由失败。
#[derive(Clone, Debug, Error)]
pub enum RouteError {
    /// 均衡策略没有选出任何节点。
    #[error("no candidate available for {service}.{method}")]
    NoCandidate { service: String, method: String },
    /// 配置中的策略名未注册。
    #[error("unknown load balance `{name}`, registered: {available:?}")]
    UnknownPolicy {
        name: String,
        available: Vec<String>,
    },
    /// 选中节点后调用失败，原样携带通道错误。
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl RouteError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoCandidate { .. } => "ferry.router.no_candidate",
            Self::UnknownPolicy { .. } => "ferry.router.unknown_policy",
            Self::Channel(err) => err.code(),
        }
    }

    /// 快速失败路由从不重试；该标志只转述底层通道错误的分类，供调用方决策。
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Channel(err) => err.is_retryable(),
            Self::NoCandidate { .. } | Self::UnknownPolicy { .. } => false,
        }
    }
}
