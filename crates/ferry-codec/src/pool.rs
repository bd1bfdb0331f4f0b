use std::{
    fmt,
    ops::{Deref, DerefMut},
};

use bytes::BytesMut;
use parking_lot::Mutex;
use tracing::trace;

/// 可被编码器池复用的状态。
///
/// `reset` 在每次借出前调用，必须清空上一次使用遗留的全部状态。
pub trait Reusable: Send {
    fn reset(&mut self);
}

impl Reusable for BytesMut {
    fn reset(&mut self) {
        self.clear();
    }
}

impl Reusable for Vec<u8> {
    fn reset(&mut self) {
        self.clear();
    }
}

/// 有上限的编码器/解码器状态池。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 编码缓冲的分配是热路径上的主要开销；按线程缓存会让状态与线程生命周期耦合，
///   共享池则允许任意线程借用并归还。
///
/// ## 契约（What）
/// - [`acquire`](Self::acquire) 返回的对象一定已 `reset`，调用方看不到前一次使用的残留；
/// - 守卫 [`Pooled`] 析构时归还对象；空闲数达到 `max_idle` 时直接丢弃；
/// - 同一对象任一时刻只被一个借用者持有。
///
/// ## 注意事项（Trade-offs）
/// - 池内只在借出/归还时短暂持锁，编码过程不持锁。
pub struct CodecPool<T: Reusable> {
    idle: Mutex<Vec<T>>,
    factory: Box<dyn Fn() -> T + Send + Sync>,
    max_idle: usize,
}

impl<T: Reusable> CodecPool<T> {
    pub fn new<F>(max_idle: usize, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            idle: Mutex::new(Vec::with_capacity(max_idle)),
            factory: Box::new(factory),
            max_idle,
        }
    }

    /// 借出一个已重置的对象。
    pub fn acquire(&self) -> Pooled<'_, T> {
        let reused = self.idle.lock().pop();
        let mut value = reused.unwrap_or_else(|| {
            trace!(max_idle = self.max_idle, "codec pool empty, creating a new instance");
            (self.factory)()
        });
        value.reset();
        Pooled {
            pool: self,
            value: Some(value),
        }
    }

    /// 当前空闲对象数量。
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn max_idle(&self) -> usize {
        self.max_idle
    }

    fn release(&self, value: T) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(value);
        } else {
            trace!(max_idle = self.max_idle, "codec pool full, dropping released instance");
        }
    }
}

impl<T: Reusable> fmt::Debug for CodecPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecPool")
            .field("idle", &self.idle())
            .field("max_idle", &self.max_idle)
            .finish()
    }
}

/// 借用守卫，析构时归还对象。
pub struct Pooled<'a, T: Reusable> {
    pool: &'a CodecPool<T>,
    value: Option<T>,
}

impl<T: Reusable> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // value 只在 drop 中被取走。
        match &self.value {
            Some(value) => value,
            None => unreachable!("pooled value taken before drop"),
        }
    }
}

impl<T: Reusable> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.value {
            Some(value) => value,
            None => unreachable!("pooled value taken before drop"),
        }
    }
}

impl<T: Reusable> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.release(value);
        }
    }
}
