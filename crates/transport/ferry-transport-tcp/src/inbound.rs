use bytes::Bytes;
use ferry_core::ChannelError;
use tracing::warn;

/// TCP 端点的入站回调。
///
/// # 教案级注释
///
/// ## 契约（What）
/// - `on_read`：读任务每收到一段字节调用一次，字节边界与对端写入边界无关，分帧由实现负责；
/// - `on_inactive`：连接转为不活跃时恰好调用一次；
/// - `on_exception_caught`：读路径上的非断连错误，以及经
///   [`Channel::fire_caught`](ferry_core::Channel::fire_caught) 注入的带外错误。
///
/// ## 注意事项（Trade-offs）
/// - 所有回调在端点的 Tokio 任务或调用线程上执行，不得阻塞；
/// - 默认的 `on_exception_caught` 只记录告警，需要断开连接的实现应自行关闭通道。
pub trait InboundHandler: Send + Sync + 'static {
    fn on_read(&self, frame: Bytes);

    fn on_inactive(&self) {}

    fn on_exception_caught(&self, cause: ChannelError) {
        warn!(code = cause.code(), error = %cause, "unhandled inbound exception");
    }
}

/// 丢弃所有入站数据的处理器，适用于只写的通道。
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardInbound;

impl InboundHandler for DiscardInbound {
    fn on_read(&self, _frame: Bytes) {}
}
