use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::{Duration, Instant},
};

use dashmap::DashMap;
use futures::channel::oneshot;
use tracing::{trace, warn};

use crate::{
    error::ChannelError,
    ids::{IdGenerator, MessageId},
};

/// 回复槽位最终交付的结果。
pub type ReplyResult<M> = Result<M, ChannelError>;

struct PendingEntry<M> {
    sender: oneshot::Sender<ReplyResult<M>>,
    created_at: Instant,
    expires_at: Option<Instant>,
}

/// 出站请求 ID 到待定回复的关联表。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 请求与回复在同一连接上交错到达，协议层需要凭请求 ID 找回发起方的等待点；
/// - 每个通道独占一张表与一个 [`IdGenerator`]，互不共享。
///
/// ## 契约（What）
/// - [`FutureManager::register`] 生成 ID 并创建槽位，返回的 [`ReplyFuture`] 最终得到回复或失败原因；
/// - [`FutureManager::complete`] 交付结果并移除槽位；未知 ID 静默忽略并返回 `false`；
/// - [`FutureManager::expire`] 以 [`ChannelError::Timeout`] 失败所有创建时刻不晚于截止点的条目；
/// - 所有“移除”操作之间互斥：同一条目只会被第一个移除者交付，其余操作看到的是缺失；
/// - 槽位被丢弃而未交付时（例如 ID 回绕冲突被替换），等待方得到 [`ChannelError::ChannelClosed`]。
///
/// ## 注意事项（Trade-offs）
/// - 过期清扫由外部定时器驱动，本类型不持有任何后台任务；
/// - 清扫先收集候选键再逐个条件移除，期间新注册的条目因创建时刻晚于截止点而不受影响。
pub struct FutureManager<M> {
    channel: Arc<str>,
    ids: IdGenerator,
    pending: DashMap<MessageId, PendingEntry<M>>,
}

impl<M> FutureManager<M> {
    /// 为给定通道描述创建空表，ID 从 `1` 开始。
    pub fn new(channel: impl Into<Arc<str>>) -> Self {
        Self::with_ids(channel, IdGenerator::new())
    }

    /// 使用指定的 ID 生成器创建空表。
    pub fn with_ids(channel: impl Into<Arc<str>>, ids: IdGenerator) -> Self {
        Self {
            channel: channel.into(),
            ids,
            pending: DashMap::new(),
        }
    }

    /// 生成请求 ID 并登记待定回复。
    pub fn register(&self) -> (MessageId, ReplyFuture<M>) {
        self.insert(None)
    }

    /// 同 [`FutureManager::register`]，并为条目设置独立的超时期限，由 [`FutureManager::expire_overdue`] 清理。
    pub fn register_with_timeout(&self, timeout: Duration) -> (MessageId, ReplyFuture<M>) {
        self.insert(Instant::now().checked_add(timeout))
    }

    fn insert(&self, expires_at: Option<Instant>) -> (MessageId, ReplyFuture<M>) {
        self.insert_with_id(self.ids.next_id(), expires_at)
    }

    fn insert_with_id(
        &self,
        id: MessageId,
        expires_at: Option<Instant>,
    ) -> (MessageId, ReplyFuture<M>) {
        let (sender, receiver) = oneshot::channel();
        let entry = PendingEntry {
            sender,
            created_at: Instant::now(),
            expires_at,
        };
        if self.pending.insert(id, entry).is_some() {
            // 回绕后旧请求仍未完成；旧条目随 sender 一起被丢弃。
            warn!(
                channel = %self.channel,
                id,
                "request id collided with a pending entry after wraparound; replacing it"
            );
        }
        trace!(channel = %self.channel, id, "reply slot registered");
        (
            id,
            ReplyFuture {
                id,
                channel: Arc::clone(&self.channel),
                receiver,
            },
        )
    }

    /// 交付结果；条目存在时返回 `true`。
    pub fn complete(&self, id: MessageId, result: ReplyResult<M>) -> bool {
        match self.pending.remove(&id) {
            Some((_, entry)) => {
                // 等待方已放弃时发送失败，结果直接丢弃。
                let _ = entry.sender.send(result);
                true
            }
            None => {
                trace!(channel = %self.channel, id, "completion for unknown request ignored");
                false
            }
        }
    }

    /// 以超时失败所有创建时刻不晚于 `deadline` 的条目，返回实际清理的数量。
    pub fn expire(&self, deadline: Instant) -> usize {
        self.drain_where(|entry| entry.created_at <= deadline, |id| self.timeout(id))
    }

    /// 以超时失败所有自身期限已过的条目。
    pub fn expire_overdue(&self, now: Instant) -> usize {
        self.drain_where(
            |entry| entry.expires_at.is_some_and(|at| at <= now),
            |id| self.timeout(id),
        )
    }

    /// 以 `cause` 生成的错误失败全部待定条目。
    pub fn fail_all<F>(&self, cause: F) -> usize
    where
        F: Fn(MessageId) -> ChannelError,
    {
        self.drain_where(|_| true, cause)
    }

    fn timeout(&self, id: MessageId) -> ChannelError {
        ChannelError::Timeout {
            channel: self.channel.to_string(),
            id,
        }
    }

    fn drain_where<P, F>(&self, predicate: P, cause: F) -> usize
    where
        P: Fn(&PendingEntry<M>) -> bool,
        F: Fn(MessageId) -> ChannelError,
    {
        let candidates: Vec<MessageId> = self
            .pending
            .iter()
            .filter(|slot| predicate(slot.value()))
            .map(|slot| *slot.key())
            .collect();
        let mut drained = 0;
        for id in candidates {
            if let Some((_, entry)) = self.pending.remove_if(&id, |_, entry| predicate(entry)) {
                let _ = entry.sender.send(Err(cause(id)));
                drained += 1;
            }
        }
        drained
    }

    /// 待定条目数量。
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// 给定 ID 是否仍在等待。
    pub fn contains(&self, id: MessageId) -> bool {
        self.pending.contains_key(&id)
    }
}

impl<M> fmt::Debug for FutureManager<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutureManager")
            .field("channel", &self.channel)
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// 单个请求的回复等待点。
pub struct ReplyFuture<M> {
    id: MessageId,
    channel: Arc<str>,
    receiver: oneshot::Receiver<ReplyResult<M>>,
}

impl<M> ReplyFuture<M> {
    /// 对应的请求 ID。
    pub fn id(&self) -> MessageId {
        self.id
    }
}

impl<M> Future for ReplyFuture<M> {
    type Output = ReplyResult<M>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(ChannelError::ChannelClosed {
                channel: self.channel.to_string(),
                message: None,
            })),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<M> fmt::Debug for ReplyFuture<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyFuture")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .finish()
    }
}
