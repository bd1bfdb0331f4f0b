use std::{borrow::Cow, net::SocketAddr};

use bytes::BytesMut;

use crate::{
    completion::Completion,
    error::{ChannelError, TransportError},
};

/// 不透明的全双工连接端点，[`Channel`](crate::Channel) 通过它完成所有 IO。
///
/// # 教案级注释
///
/// ## 契约（What）
/// - `Message`：端点接受的出站消息类型（通常是编码后的 `Bytes`）；
/// - `id`：用于日志与错误文本的连接描述，约定为 `local -> remote`；
/// - `is_active` / `is_writable`：无副作用的存活与背压探测；
/// - `write`：发起一次写入并返回 [`Completion`]，发起阶段即可判定的失败以 `Err` 返回；
/// - `write_detached`：不跟踪结果的写入，任何失败都被端点自行吸收；
/// - `close`：发起关闭，语义同 `write`；对已关闭端点应返回已成功完成的句柄；
/// - `fire_exception_caught`：把带外错误注入入站处理链；
/// - `buffer_capacity` / `allocate`：为编码器分配出站缓冲，默认实现直接从堆上分配，
///   传输实现可按自身的读写缓冲配置覆盖。
///
/// ## 注意事项（Trade-offs）
/// - 完成监听器在端点的工作线程上执行，实现方不得在持锁状态下完成 `Completion`。
pub trait Endpoint: Send + Sync + 'static {
    /// 出站消息类型。
    type Message: Send + 'static;

    /// 连接描述。
    fn id(&self) -> Cow<'_, str>;

    /// 本地地址（若实现可提供）。
    fn local_addr(&self) -> Option<SocketAddr>;

    /// 对端地址（若实现可提供）。
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// 连接是否仍然活跃。
    fn is_active(&self) -> bool;

    /// 当前是否可以接受更多写入。
    fn is_writable(&self) -> bool;

    /// 发起写入。
    fn write(&self, message: Self::Message) -> Result<Completion, TransportError>;

    /// 发起写入但不跟踪结果。
    fn write_detached(&self, message: Self::Message);

    /// 发起关闭。
    fn close(&self) -> Result<Completion, TransportError>;

    /// 向入站处理链注入错误。
    fn fire_exception_caught(&self, cause: ChannelError);

    /// 未指定容量时分配的缓冲大小。
    fn buffer_capacity(&self) -> usize {
        DEFAULT_BUFFER_CAPACITY
    }

    /// 分配初始容量至少为 `initial_capacity` 的空缓冲。
    fn allocate(&self, initial_capacity: usize) -> BytesMut {
        BytesMut::with_capacity(initial_capacity)
    }
}

/// [`Endpoint::buffer_capacity`] 的默认值。
pub const DEFAULT_BUFFER_CAPACITY: usize = 256;
