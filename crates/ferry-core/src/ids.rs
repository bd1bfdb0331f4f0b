use crate::sync::{AtomicU32, Ordering};

/// 请求标识。由 `u32` 计数器加宽而来，因此取值范围实际为 `0..=u32::MAX`。
pub type MessageId = u64;

/// 通道级的单调请求 ID 生成器。
///
/// # 教案级注释
///
/// ## 契约（What）
/// - 每个 [`Channel`](crate::Channel) 独占一个生成器，`next_id` 在并发调用下总是返回互不相同的值；
/// - 首个 ID 为 `1`；到达 `u32::MAX` 后回绕为 `0` 并继续递增；
/// - **边界条件**：回绕后新 ID 可能与仍在等待回复的旧 ID 重复，生成器不做去重，
///   冲突由 [`FutureManager`](crate::FutureManager) 记录告警并以新条目替换旧条目。
///
/// ## 逻辑（How）
/// - 单次 `fetch_add`，无比较交换重试；`AtomicU32::fetch_add` 溢出时按回绕语义处理。
#[derive(Debug)]
pub struct IdGenerator {
    last: AtomicU32,
}

impl IdGenerator {
    /// 创建从 `1` 开始计数的生成器。
    pub fn new() -> Self {
        Self::starting_after(0)
    }

    /// 创建下一次返回 `last + 1`（回绕）的生成器，主要用于回绕场景测试。
    pub fn starting_after(last: u32) -> Self {
        Self {
            last: AtomicU32::new(last),
        }
    }

    /// 生成下一个请求 ID。
    pub fn next_id(&self) -> MessageId {
        let previous = self.last.fetch_add(1, Ordering::Relaxed);
        MessageId::from(previous.wrapping_add(1))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
