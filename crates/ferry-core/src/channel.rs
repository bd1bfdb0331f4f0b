use std::{any::Any, borrow::Cow, fmt, net::SocketAddr, sync::Arc};

use bytes::BytesMut;
use tracing::{debug, warn};

use crate::{
    attribute::{AttributeStore, AttributeValue},
    endpoint::Endpoint,
    error::{ChannelError, TransportError},
    future::FutureManager,
    result::{AsyncResult, SendResult},
    session::SessionManager,
};

/// 通道在连接中的角色，创建后不可变。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Server,
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Server => "server",
            Self::Client => "client",
        })
    }
}

struct ChannelInner<E: Endpoint> {
    endpoint: E,
    role: Role,
    label: Arc<str>,
    futures: FutureManager<E::Message>,
    sessions: SessionManager,
    attributes: AttributeStore,
}

/// 单条连接的面向对象门面：发送、关闭、回复关联、会话与属性。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把一条原始双工连接包装为可被大量调用线程并发使用的通道，并把失败精确分类，
///   让上层（路由器、重试策略）自行决定后续动作；
/// - 核心不做排队、重试与退避。
///
/// ## 体系定位（Architecture）
/// - 通道独占一个 [`Endpoint`]，以及各自一份 [`FutureManager`]、[`SessionManager`] 与
///   [`AttributeStore`]，生命周期与最后一个句柄一致；
/// - 句柄本身是 `Arc` 包装，`Clone` 代价低，克隆体指向同一条通道。
///
/// ## 契约（What）
/// - [`Channel::send`]：不可写时同步返回错误，活跃为 `Overload`，否则为 `ChannelClosed`；
///   可写时以“发出即忘”方式写入，之后的异步失败不可观测；
/// - [`Channel::send_with`]：从不返回错误，所有结果（包括发起阶段的失败）都交给回调，恰好一次；
/// - [`Channel::close`]：阻塞直至关闭完成，仅当成功完成时返回 `true`，任何失败都不外泄；
/// - [`Channel::close_with`]：非阻塞，回调恰好执行一次；
/// - 关闭成功完成后，仍在等待的回复统一以 `ChannelClosed` 失败。
///
/// ## 注意事项（Trade-offs）
/// - 回调在传输层工作线程上执行（同步失败时在调用线程上执行），不得阻塞；
/// - 在单线程 Tokio 运行时的工作线程里调用 [`Channel::close`] 会阻塞负责完成关闭的线程，
///   应改用 [`Channel::close_with`] 或 `spawn_blocking`。
pub struct Channel<E: Endpoint> {
    inner: Arc<ChannelInner<E>>,
}

impl<E: Endpoint> Clone for Channel<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Endpoint> fmt::Debug for Channel<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.inner.label)
            .field("role", &self.inner.role)
            .field("active", &self.is_active())
            .field("pending", &self.inner.futures.pending())
            .finish()
    }
}

impl<E: Endpoint> Channel<E> {
    /// 以给定角色接管端点。
    pub fn new(endpoint: E, role: Role) -> Self {
        let label: Arc<str> = Arc::from(endpoint.id().as_ref());
        Self {
            inner: Arc::new(ChannelInner {
                futures: FutureManager::new(Arc::clone(&label)),
                sessions: SessionManager::new(role),
                attributes: AttributeStore::new(),
                endpoint,
                role,
                label,
            }),
        }
    }

    /// 通道描述，形如 `local -> remote`。
    pub fn id(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.inner.label)
    }

    pub fn role(&self) -> Role {
        self.inner.role
    }

    pub fn is_server(&self) -> bool {
        self.inner.role == Role::Server
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.endpoint.local_addr()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.inner.endpoint.peer_addr()
    }

    pub fn is_active(&self) -> bool {
        self.inner.endpoint.is_active()
    }

    pub fn is_writable(&self) -> bool {
        self.inner.endpoint.is_writable()
    }

    pub fn endpoint(&self) -> &E {
        &self.inner.endpoint
    }

    pub fn future_manager(&self) -> &FutureManager<E::Message> {
        &self.inner.futures
    }

    pub fn session_manager(&self) -> &SessionManager {
        &self.inner.sessions
    }

    pub fn attributes(&self) -> &AttributeStore {
        &self.inner.attributes
    }

    /// 由端点分配一块默认容量的出站缓冲，供编码器直接写入。
    pub fn buffer(&self) -> BytesMut {
        let endpoint = &self.inner.endpoint;
        endpoint.allocate(endpoint.buffer_capacity())
    }

    pub fn buffer_with_capacity(&self, initial_capacity: usize) -> BytesMut {
        self.inner.endpoint.allocate(initial_capacity)
    }

    /// 分配带容量上限的缓冲。
    ///
    /// # Errors
    /// 初始容量超过 `max_capacity` 时返回 [`TransportError::Other`]。
    pub fn buffer_bounded(
        &self,
        initial_capacity: usize,
        max_capacity: usize,
    ) -> Result<BytesMut, TransportError> {
        if initial_capacity > max_capacity {
            return Err(TransportError::Other(
                format!(
                    "initial buffer capacity {initial_capacity} exceeds the maximum {max_capacity}"
                )
                .into(),
            ));
        }
        Ok(self.inner.endpoint.allocate(initial_capacity))
    }

    /// 发出即忘地发送消息。
    ///
    /// # Errors
    /// - 通道活跃但不可写：[`ChannelError::Overload`]；
    /// - 通道不活跃：[`ChannelError::ChannelClosed`]。
    pub fn send(&self, message: E::Message) -> Result<(), ChannelError>
    where
        E::Message: fmt::Debug,
    {
        if let Some(cause) = self.reject(&message) {
            return Err(cause);
        }
        self.inner.endpoint.write_detached(message);
        Ok(())
    }

    /// 发送消息并把结果交给 `sink`。
    ///
    /// 回调持有原始消息的副本，因此要求 `Message: Clone`。
    pub fn send_with<S>(&self, message: E::Message, sink: S)
    where
        E::Message: Clone + fmt::Debug,
        S: FnOnce(SendResult<E>) + Send + 'static,
    {
        if let Some(cause) = self.reject(&message) {
            sink(SendResult::failed(self.clone(), message, cause));
            return;
        }
        let retained = message.clone();
        match self.inner.endpoint.write(message) {
            Err(source) => {
                let cause = self.transport_failure("write", source);
                sink(SendResult::failed(self.clone(), retained, cause));
            }
            Ok(completion) => {
                let channel = self.clone();
                completion.on_complete(move |result| match result {
                    Ok(()) => sink(SendResult::succeeded(channel, retained)),
                    Err(source) => {
                        let cause = channel.transport_failure("write", source);
                        sink(SendResult::failed(channel, retained, cause));
                    }
                });
            }
        }
    }

    fn reject(&self, message: &E::Message) -> Option<ChannelError>
    where
        E::Message: fmt::Debug,
    {
        let endpoint = &self.inner.endpoint;
        if endpoint.is_writable() {
            return None;
        }
        let channel = self.inner.label.to_string();
        let cause = if endpoint.is_active() {
            ChannelError::Overload {
                channel,
                message: format!("{message:?}"),
                role: self.inner.role,
            }
        } else {
            ChannelError::ChannelClosed {
                channel,
                message: Some(format!("{message:?}")),
            }
        };
        debug!(
            channel = %self.inner.label,
            role = %self.inner.role,
            code = cause.code(),
            "send rejected before reaching the endpoint"
        );
        Some(cause)
    }

    fn transport_failure(&self, operation: &'static str, source: TransportError) -> ChannelError {
        warn!(
            channel = %self.inner.label,
            operation,
            error = %source,
            "transport operation failed"
        );
        ChannelError::Transport {
            channel: self.inner.label.to_string(),
            source,
        }
    }

    /// 阻塞关闭通道，仅当关闭成功完成时返回 `true`。
    pub fn close(&self) -> bool {
        let completion = match self.inner.endpoint.close() {
            Ok(completion) => completion,
            Err(error) => {
                debug!(channel = %self.inner.label, %error, "close initiation failed");
                return false;
            }
        };
        match completion.wait() {
            Ok(()) => {
                self.fail_pending();
                true
            }
            Err(error) => {
                debug!(channel = %self.inner.label, %error, "close did not complete");
                false
            }
        }
    }

    /// 非阻塞关闭，结果交给 `sink`，恰好一次。
    pub fn close_with<S>(&self, sink: S)
    where
        S: FnOnce(AsyncResult<E>) + Send + 'static,
    {
        match self.inner.endpoint.close() {
            Err(source) => {
                let cause = self.transport_failure("close", source);
                sink(AsyncResult::failed(self.clone(), cause));
            }
            Ok(completion) => {
                let channel = self.clone();
                completion.on_complete(move |result| match result {
                    Ok(()) => {
                        channel.fail_pending();
                        sink(AsyncResult::succeeded(channel));
                    }
                    Err(source) => {
                        let cause = channel.transport_failure("close", source);
                        sink(AsyncResult::failed(channel, cause));
                    }
                });
            }
        }
    }

    fn fail_pending(&self) {
        let label = &self.inner.label;
        let failed = self.inner.futures.fail_all(|_| ChannelError::ChannelClosed {
            channel: label.to_string(),
            message: None,
        });
        if failed > 0 {
            debug!(channel = %label, failed, "pending replies failed after close");
        }
    }

    /// 按类型读取属性；键缺失、为 `None` 或类型不符时返回 `None`。
    pub fn attribute<'k, T>(&self, key: impl Into<Option<&'k str>>) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.inner.attributes.get(key)
    }

    /// 读取属性，缺失时计算并安装；并发下计算可能执行多次，但只有一个结果可见。
    pub fn attribute_or_insert_with<'k, T, F>(
        &self,
        key: impl Into<Option<&'k str>>,
        compute: F,
    ) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce(&str) -> T,
    {
        self.inner.attributes.get_or_insert_with(key, compute)
    }

    /// 无条件写入属性；键为 `None` 时忽略。
    pub fn set_attribute<'k, T>(&self, key: impl Into<Option<&'k str>>, value: T) -> &Self
    where
        T: Any + Send + Sync,
    {
        self.inner.attributes.set(key, value);
        self
    }

    /// 原子地移除属性并返回旧值。
    pub fn remove_attribute<'k>(&self, key: impl Into<Option<&'k str>>) -> Option<AttributeValue> {
        self.inner.attributes.remove_raw(key)
    }

    /// 向端点的入站处理链注入带外错误。
    pub fn fire_caught(&self, cause: ChannelError) {
        self.inner.endpoint.fire_exception_caught(cause);
    }
}
