use std::fmt;

use ferry_core::ExtensionRegistry;

use crate::{
    balance::{LoadBalance, ROUND_ROBIN, RoundRobin, STICKY, Sticky},
    candidate::Node,
    error::RouteError,
    router::FailfastRouter,
};

/// 按名字创建负载均衡策略的注册表。
///
/// [`with_defaults`](Self::with_defaults) 预先登记 `round_robin` 与 `sticky`；
/// 自定义策略通过 [`register`](Self::register) 显式加入，同名时覆盖。
pub struct LoadBalanceRegistry<N: Node + 'static> {
    inner: ExtensionRegistry<dyn LoadBalance<N>>,
}

impl<N: Node + 'static> LoadBalanceRegistry<N> {
    /// 空注册表。
    pub fn new() -> Self {
        Self {
            inner: ExtensionRegistry::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(ROUND_ROBIN, || Box::new(RoundRobin::new()));
        registry.register(STICKY, || Box::new(Sticky::new()));
        registry
    }

    pub fn register<F>(&self, name: impl Into<String>, factory: F) -> bool
    where
        F: Fn() -> Box<dyn LoadBalance<N>> + Send + Sync + 'static,
    {
        self.inner.register(name, factory)
    }

    /// 创建全新的策略实例；每个实例持有独立的轮询或粘滞状态。
    pub fn create(&self, name: &str) -> Result<Box<dyn LoadBalance<N>>, RouteError> {
        self.inner
            .create(name)
            .ok_or_else(|| RouteError::UnknownPolicy {
                name: name.to_owned(),
                available: self.inner.names(),
            })
    }

    /// 以指定策略构造快速失败路由。
    pub fn failfast(&self, name: &str) -> Result<FailfastRouter<N>, RouteError> {
        self.create(name).map(FailfastRouter::new)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.names()
    }
}

impl<N: Node + 'static> Default for LoadBalanceRegistry<N> {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl<N: Node + 'static> fmt::Debug for LoadBalanceRegistry<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadBalanceRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_registered() {
        let registry = LoadBalanceRegistry::<String>::with_defaults();
        assert_eq!(registry.names(), vec![ROUND_ROBIN.to_owned(), STICKY.to_owned()]);
        assert_eq!(registry.create(STICKY).map(|b| b.name()).ok(), Some(STICKY));
    }

    #[test]
    fn unknown_policy_lists_the_alternatives() {
        let registry = LoadBalanceRegistry::<String>::with_defaults();
        match registry.failfast("random") {
            Err(RouteError::UnknownPolicy { name, available }) => {
                assert_eq!(name, "random");
                assert_eq!(available.len(), 2);
            }
            other => panic!("expected UnknownPolicy, got {other:?}"),
        }
    }
}
