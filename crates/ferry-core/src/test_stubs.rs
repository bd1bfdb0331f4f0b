//! 测试桩：可编程的内存端点，供本 crate 及下游 crate 的测试复用。
//!
//! # 设计定位（Why）
//! - 通道契约（不可写分类、回调恰好一次、关闭失败吞没）需要精确控制端点的存活、背压与完成时机，
//!   真实 TCP 连接无法稳定复现这些状态；
//! - 集中提供一个实现，避免各测试文件重复定义临时端点。
//!
//! # 使用方式（How）
//! - 构造 [`MockEndpoint`] 后交给 [`Channel::new`](crate::Channel::new)，之后通过
//!   [`Channel::endpoint`](crate::Channel::endpoint) 操纵状态并读取记录；
//! - 写入默认立即成功；调用 [`MockEndpoint::defer_writes`] 后由测试手动完成。
//!
//! # 风险提示（Trade-offs）
//! - 模块对外可见，仅应在测试或示例中使用。

use std::{
    borrow::Cow,
    collections::VecDeque,
    net::SocketAddr,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use parking_lot::Mutex;

use crate::{
    completion::{Completion, CompletionNotifier, CompletionResult},
    endpoint::Endpoint,
    error::{ChannelError, TransportError},
};

/// [`MockEndpoint::close`](Endpoint::close) 的行为。
#[derive(Clone, Debug, Default)]
pub enum CloseBehavior {
    /// 立即成功并转为不活跃。
    #[default]
    Immediate,
    /// 返回未完成的句柄，由 [`MockEndpoint::complete_close`] 完成。
    Deferred,
    /// 发起阶段即返回错误。
    FailOnInitiate(TransportError),
    /// 发起成功，完成时失败。
    FailAsync(TransportError),
    /// 通知端在完成前被丢弃。
    Abandon,
}

struct MockState<M> {
    written: Vec<M>,
    detached: Vec<M>,
    deferred: VecDeque<CompletionNotifier>,
    reject_next_write: Option<TransportError>,
    fail_next_write: Option<TransportError>,
    close: CloseBehavior,
    pending_close: Option<CompletionNotifier>,
    caught: Vec<ChannelError>,
}

/// 可编程的内存端点。
pub struct MockEndpoint<M> {
    id: String,
    active: AtomicBool,
    writable: AtomicBool,
    defer: AtomicBool,
    close_calls: AtomicUsize,
    state: Mutex<MockState<M>>,
}

impl<M> MockEndpoint<M> {
    /// 创建活跃、可写的端点。
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            active: AtomicBool::new(true),
            writable: AtomicBool::new(true),
            defer: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            state: Mutex::new(MockState {
                written: Vec::new(),
                detached: Vec::new(),
                deferred: VecDeque::new(),
                reject_next_write: None,
                fail_next_write: None,
                close: CloseBehavior::Immediate,
                pending_close: None,
                caught: Vec::new(),
            }),
        }
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    /// 设置背压状态；不活跃的端点始终不可写。
    pub fn set_writable(&self, writable: bool) {
        self.writable.store(writable, Ordering::SeqCst);
    }

    /// 之后的 `write` 返回未完成的句柄，按先进先出由 [`MockEndpoint::complete_next_write`] 完成。
    pub fn defer_writes(&self, defer: bool) {
        self.defer.store(defer, Ordering::SeqCst);
    }

    /// 下一次 `write` 在发起阶段返回 `error`。
    pub fn reject_next_write(&self, error: TransportError) {
        self.state.lock().reject_next_write = Some(error);
    }

    /// 下一次 `write` 发起成功但以 `error` 完成。
    pub fn fail_next_write(&self, error: TransportError) {
        self.state.lock().fail_next_write = Some(error);
    }

    /// 完成最早的延迟写入；没有待完成写入时返回 `false`。
    pub fn complete_next_write(&self, result: CompletionResult) -> bool {
        let notifier = self.state.lock().deferred.pop_front();
        match notifier {
            Some(notifier) => {
                notifier.complete(result);
                true
            }
            None => false,
        }
    }

    pub fn set_close_behavior(&self, behavior: CloseBehavior) {
        self.state.lock().close = behavior;
    }

    /// 完成延迟的关闭；成功时端点转为不活跃。
    pub fn complete_close(&self, result: CompletionResult) -> bool {
        let notifier = self.state.lock().pending_close.take();
        match notifier {
            Some(notifier) => {
                if result.is_ok() {
                    self.set_active(false);
                }
                notifier.complete(result);
                true
            }
            None => false,
        }
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// 经 `fire_exception_caught` 注入的错误。
    pub fn caught(&self) -> Vec<ChannelError> {
        self.state.lock().caught.clone()
    }
}

impl<M: Clone> MockEndpoint<M> {
    /// 经 `write` 收到的消息。
    pub fn written(&self) -> Vec<M> {
        self.state.lock().written.clone()
    }

    /// 经 `write_detached` 收到的消息。
    pub fn detached(&self) -> Vec<M> {
        self.state.lock().detached.clone()
    }
}

impl<M: Send + 'static> Endpoint for MockEndpoint<M> {
    type Message = M;

    fn id(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.id)
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn is_writable(&self) -> bool {
        self.is_active() && self.writable.load(Ordering::SeqCst)
    }

    fn write(&self, message: M) -> Result<Completion, TransportError> {
        let mut state = self.state.lock();
        if let Some(error) = state.reject_next_write.take() {
            return Err(error);
        }
        state.written.push(message);
        if self.defer.load(Ordering::SeqCst) {
            let (notifier, completion) = Completion::pair();
            state.deferred.push_back(notifier);
            return Ok(completion);
        }
        Ok(match state.fail_next_write.take() {
            Some(error) => Completion::ready(Err(error)),
            None => Completion::ready(Ok(())),
        })
    }

    fn write_detached(&self, message: M) {
        self.state.lock().detached.push(message);
    }

    fn close(&self) -> Result<Completion, TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.state.lock().close.clone();
        match behavior {
            CloseBehavior::Immediate => {
                self.set_active(false);
                Ok(Completion::ready(Ok(())))
            }
            CloseBehavior::Deferred => {
                let (notifier, completion) = Completion::pair();
                self.state.lock().pending_close = Some(notifier);
                Ok(completion)
            }
            CloseBehavior::FailOnInitiate(error) => Err(error),
            CloseBehavior::FailAsync(error) => Ok(Completion::ready(Err(error))),
            CloseBehavior::Abandon => {
                let (notifier, completion) = Completion::pair();
                drop(notifier);
                Ok(completion)
            }
        }
    }

    fn fire_exception_caught(&self, cause: ChannelError) {
        self.state.lock().caught.push(cause);
    }
}
