use std::{fmt, sync::Arc};

use dashmap::DashMap;
use tracing::trace;

type Factory<T> = Arc<dyn Fn() -> Box<T> + Send + Sync>;

/// 以字符串键索引的扩展工厂表。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 负载均衡、路由、序列化等可替换实现需要按配置中的名字选取；
/// - 注册在进程启动阶段显式完成，不依赖任何运行期扫描。
///
/// ## 契约（What）
/// - `register`：同名再次注册时覆盖旧工厂，并返回 `true` 表示发生了覆盖；
/// - `create`：每次调用都执行一次工厂，返回全新实例；未注册返回 `None`；
/// - `names`：返回排序后的已注册名字，便于在配置错误时给出候选列表。
pub struct ExtensionRegistry<T: ?Sized> {
    factories: DashMap<String, Factory<T>>,
}

impl<T: ?Sized> ExtensionRegistry<T> {
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
        }
    }

    /// 注册工厂。
    pub fn register<F>(&self, name: impl Into<String>, factory: F) -> bool
    where
        F: Fn() -> Box<T> + Send + Sync + 'static,
    {
        let name = name.into();
        trace!(extension = %name, "extension registered");
        self.factories.insert(name, Arc::new(factory)).is_some()
    }

    /// 按名字创建实例。
    pub fn create(&self, name: &str) -> Option<Box<T>> {
        // 先克隆工厂再调用，工厂执行期间不持有分片锁。
        let factory = self.factories.get(name).map(|slot| Arc::clone(slot.value()))?;
        Some(factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.iter().map(|slot| slot.key().clone()).collect();
        names.sort();
        names
    }
}

impl<T: ?Sized> Default for ExtensionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for ExtensionRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("names", &self.names())
            .finish()
    }
}
