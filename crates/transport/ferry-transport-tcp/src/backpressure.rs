/// 管理 TCP 写路径的积压字节与可写状态。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 调用线程以“入队即返回”的方式写入，真正的套接字写由写任务串行完成；
///   若不限制积压，慢对端会让写队列无界增长；
/// - 把积压字节数映射为一个布尔的可写信号，供通道把失败分类为 `Overload`。
///
/// ## 逻辑 (How)
/// - `on_enqueue` 累加积压，超过高水位即转为不可写；
/// - `on_flushed` 扣减积压，只有回落到低水位以下才恢复可写（滞回），
///   避免在单一阈值附近反复翻转。
///
/// ## 契约 (What)
/// - **前置条件**：调用方以互斥方式访问（端点用 `Mutex` 包裹）；
/// - **后置条件**：`pending` 不会下溢；`on_flushed` 的字节数总是此前入队过的。
#[derive(Debug)]
pub(crate) struct WriteBackpressure {
    pending: usize,
    writable: bool,
    low: usize,
    high: usize,
}

impl WriteBackpressure {
    pub(crate) fn new(low: usize, high: usize) -> Self {
        Self {
            pending: 0,
            writable: true,
            low,
            high,
        }
    }

    /// 记录入队的字节数，返回此后是否仍可写。
    pub(crate) fn on_enqueue(&mut self, len: usize) -> bool {
        self.pending = self.pending.saturating_add(len);
        if self.pending > self.high {
            self.writable = false;
        }
        self.writable
    }

    /// 记录已写出（或被丢弃）的字节数，返回此后是否可写。
    pub(crate) fn on_flushed(&mut self, len: usize) -> bool {
        self.pending = self.pending.saturating_sub(len);
        if !self.writable && self.pending < self.low {
            self.writable = true;
        }
        self.writable
    }

    pub(crate) fn is_writable(&self) -> bool {
        self.writable
    }

    pub(crate) fn pending(&self) -> usize {
        self.pending
    }
}
