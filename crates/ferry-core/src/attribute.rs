use std::{any::Any, fmt, sync::Arc};

use dashmap::DashMap;

/// 属性值：任意可跨线程共享的不透明对象。
pub type AttributeValue = Arc<dyn Any + Send + Sync>;

/// 通道（或会话）级的键值扩展存储。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 协议扩展与会话需要在连接上挂载自己的状态，又不应该为此修改通道结构；
/// - 键只在所属通道内唯一，不存在进程级命名空间，调用方需自行为键加前缀。
///
/// ## 契约（What）
/// - 所有方法的键参数都接受 `impl Into<Option<&str>>`，`None` 等价于“空键”：
///   读取返回 `None`，写入与删除为空操作；
/// - 类型化读取通过 `Arc::downcast` 完成，类型不匹配时返回 `None`，存储内容不受影响；
/// - [`AttributeStore::get_or_insert_with`]：**至少一次计算、至多一个可见胜者**。
///   计算闭包在任何分片锁之外执行，并发下可能被调用多次；安装步骤是单次“空位才插入”，
///   败者丢弃自己的计算结果并返回胜者的值，不会重试计算。闭包应无副作用或幂等。
///
/// ## 逻辑（How）
/// - 底层为 `DashMap<String, AttributeValue>`，单键操作各自只占用一次分片锁。
#[derive(Default)]
pub struct AttributeStore {
    slots: DashMap<String, AttributeValue>,
}

impl AttributeStore {
    /// 创建空存储。
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取原始值。
    pub fn get_raw<'k>(&self, key: impl Into<Option<&'k str>>) -> Option<AttributeValue> {
        let key = key.into()?;
        self.slots.get(key).map(|slot| Arc::clone(slot.value()))
    }

    /// 按类型读取值。
    pub fn get<'k, T>(&self, key: impl Into<Option<&'k str>>) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.get_raw(key)?.downcast::<T>().ok()
    }

    /// 读取值；缺失时计算并尝试安装，返回最终可见的值。
    pub fn get_or_insert_with<'k, T, F>(
        &self,
        key: impl Into<Option<&'k str>>,
        compute: F,
    ) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce(&str) -> T,
    {
        let key = key.into()?;
        if let Some(existing) = self.get_raw(key) {
            return existing.downcast::<T>().ok();
        }
        let computed: AttributeValue = Arc::new(compute(key));
        let winner = Arc::clone(self.slots.entry(key.to_owned()).or_insert(computed).value());
        winner.downcast::<T>().ok()
    }

    /// 无条件写入。
    pub fn set<'k, T>(&self, key: impl Into<Option<&'k str>>, value: T)
    where
        T: Any + Send + Sync,
    {
        self.set_raw(key, Arc::new(value));
    }

    /// 写入已包装的值，便于多个存储共享同一对象。
    pub fn set_raw<'k>(&self, key: impl Into<Option<&'k str>>, value: AttributeValue) {
        if let Some(key) = key.into() {
            self.slots.insert(key.to_owned(), value);
        }
    }

    /// 原子地移除并返回旧值。
    pub fn remove_raw<'k>(&self, key: impl Into<Option<&'k str>>) -> Option<AttributeValue> {
        let key = key.into()?;
        self.slots.remove(key).map(|(_, value)| value)
    }

    /// 原子地移除并按类型返回旧值。类型不匹配时值仍被移除，但返回 `None`。
    pub fn remove<'k, T>(&self, key: impl Into<Option<&'k str>>) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.remove_raw(key)?.downcast::<T>().ok()
    }

    /// 键是否存在。
    pub fn contains<'k>(&self, key: impl Into<Option<&'k str>>) -> bool {
        key.into().is_some_and(|key| self.slots.contains_key(key))
    }

    /// 属性数量。
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// 是否为空。
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for AttributeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self.slots.iter().map(|slot| slot.key().clone()).collect();
        keys.sort();
        f.debug_struct("AttributeStore").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Marker(u32);

    #[test]
    fn none_key_is_always_absent() {
        let store = AttributeStore::new();
        store.set(None, Marker(1));
        assert!(store.is_empty());
        assert!(store.get::<Marker>(None).is_none());
        assert!(store.remove::<Marker>(None).is_none());
        assert!(
            store
                .get_or_insert_with(None, |_| Marker(2))
                .is_none()
        );
    }

    #[test]
    fn set_get_remove_round_trip() {
        let store = AttributeStore::new();
        store.set("k", Marker(7));
        assert_eq!(store.get::<Marker>("k").as_deref(), Some(&Marker(7)));
        assert_eq!(store.remove::<Marker>("k").as_deref(), Some(&Marker(7)));
        assert!(store.get::<Marker>("k").is_none());
    }

    #[test]
    fn type_mismatch_reads_as_absent_without_clobbering() {
        let store = AttributeStore::new();
        store.set("k", Marker(1));
        assert!(store.get::<String>("k").is_none());
        assert!(store.contains("k"));
        let kept = store.get_or_insert_with("k", |_| String::from("other"));
        assert!(kept.is_none(), "已有值类型不同，不应被计算值覆盖");
        assert_eq!(store.get::<Marker>("k").as_deref(), Some(&Marker(1)));
    }

    #[test]
    fn compute_receives_key_and_skips_when_present() {
        let store = AttributeStore::new();
        let first = store.get_or_insert_with("session", |key| key.len());
        assert_eq!(first.as_deref(), Some(&7));
        let second = store.get_or_insert_with("session", |_| -> usize {
            panic!("值已存在时不应再次计算")
        });
        assert!(Arc::ptr_eq(&first.unwrap(), &second.unwrap()));
    }

    #[test]
    fn set_raw_shares_the_same_allocation() {
        let store = AttributeStore::new();
        let shared: AttributeValue = Arc::new(Marker(3));
        store.set_raw("a", Arc::clone(&shared));
        store.set_raw("b", Arc::clone(&shared));
        let a = store.get_raw("a").unwrap();
        let b = store.get_raw("b").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
