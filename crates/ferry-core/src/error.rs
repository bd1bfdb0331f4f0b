use std::{borrow::Cow, io, sync::Arc};

use thiserror::Error;

use crate::{channel::Role, ids::MessageId, session::SessionId};

/// 稳定错误码，格式为 `ferry.<域>.<语义>`，供日志与告警做精确匹配。
pub mod codes {
    /// 通道活跃但写缓冲已满。
    pub const CHANNEL_OVERLOAD: &str = "ferry.channel.overload";
    /// 通道已不再活跃。
    pub const CHANNEL_CLOSED: &str = "ferry.channel.closed";
    /// 底层写入/关闭失败。
    pub const CHANNEL_TRANSPORT: &str = "ferry.channel.transport_failed";
    /// 等待关联回复超时。
    pub const CHANNEL_TIMEOUT: &str = "ferry.channel.timeout";
    /// 读写路径之外检测到的协议违规。
    pub const CHANNEL_PROTOCOL: &str = "ferry.channel.protocol_violation";
}

/// `ChannelError` 的分类，决定调用方（通常是路由器）接下来的处置方式。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 背压：连接仍然活跃，稍后可在同一通道重试。
    Overload,
    /// 连接已关闭：需要换一条通道或直接失败。
    ChannelClosed,
    /// 底层传输在异步写入/关闭时报告的其他故障。
    Transport,
    /// 仅由 [`FutureManager`](crate::FutureManager) 的过期清扫产生。
    Timeout,
    /// 通过 [`Channel::fire_caught`](crate::Channel::fire_caught) 注入的带外错误。
    Protocol,
}

/// 通道层统一错误。
///
/// # 教案级注释
///
/// ## 契约（What）
/// - 所有变体都携带 `channel`（`local -> remote` 形式的通道描述），便于日志关联；
/// - `Overload`/`ChannelClosed` 额外携带消息的调试渲染，对应“发送前即判定失败”的场景；
/// - `Transport` 将底层 [`TransportError`] 原样作为 `source` 转发；
/// - 类型实现 `Clone`，同一原因可以分发给多个等待方。
///
/// ## 注意事项（Trade-offs）
/// - 消息渲染依赖 `Debug`，大消息会生成较长的错误文本；调用方可在 `Debug` 实现中自行截断。
#[derive(Clone, Debug, Error)]
pub enum ChannelError {
    #[error(
        "send request rejected: channel is not writable because requests are sent too fast. at {channel} : {message}"
    )]
    Overload {
        channel: String,
        message: String,
        role: Role,
    },
    #[error("send request rejected: channel is not active. at {channel}{}", render_payload(.message))]
    ChannelClosed {
        channel: String,
        message: Option<String>,
    },
    #[error("transport failure at {channel}: {source}")]
    Transport {
        channel: String,
        #[source]
        source: TransportError,
    },
    #[error("request {id} at {channel} timed out waiting for a reply")]
    Timeout { channel: String, id: MessageId },
    #[error("protocol violation at {channel}: {reason}")]
    Protocol {
        channel: String,
        reason: Cow<'static, str>,
    },
}

fn render_payload(message: &Option<String>) -> String {
    match message {
        Some(message) => format!(" : {message}"),
        None => String::new(),
    }
}

impl ChannelError {
    /// 构造协议违规错误，供 [`Channel::fire_caught`](crate::Channel::fire_caught) 使用。
    pub fn protocol(channel: impl Into<String>, reason: impl Into<Cow<'static, str>>) -> Self {
        Self::Protocol {
            channel: channel.into(),
            reason: reason.into(),
        }
    }

    /// 返回错误分类。
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Overload { .. } => ErrorKind::Overload,
            Self::ChannelClosed { .. } => ErrorKind::ChannelClosed,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Protocol { .. } => ErrorKind::Protocol,
        }
    }

    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Overload => codes::CHANNEL_OVERLOAD,
            ErrorKind::ChannelClosed => codes::CHANNEL_CLOSED,
            ErrorKind::Transport => codes::CHANNEL_TRANSPORT,
            ErrorKind::Timeout => codes::CHANNEL_TIMEOUT,
            ErrorKind::Protocol => codes::CHANNEL_PROTOCOL,
        }
    }

    /// 是否可以在**同一通道**上稍后重试。
    ///
    /// 只有 `Overload` 满足；超时与传输故障是否换节点重试由路由器决定，不在此判定。
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Overload)
    }

    /// 产生该错误的通道描述。
    pub fn channel(&self) -> &str {
        match self {
            Self::Overload { channel, .. }
            | Self::ChannelClosed { channel, .. }
            | Self::Transport { channel, .. }
            | Self::Timeout { channel, .. }
            | Self::Protocol { channel, .. } => channel,
        }
    }

    /// 若为传输故障，返回底层原因。
    pub fn transport_source(&self) -> Option<&TransportError> {
        match self {
            Self::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// 底层端点报告的故障。
///
/// `io::Error` 以 `Arc` 包裹以满足 `Clone`，同一故障可以同时交给阻塞等待方与监听器。
#[derive(Clone, Debug, Error)]
pub enum TransportError {
    #[error("{operation}: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("endpoint is closed")]
    Closed,
    #[error("completion abandoned before the operation finished")]
    Abandoned,
    #[error("{0}")]
    Other(Cow<'static, str>),
}

impl TransportError {
    /// 将 IO 错误包装为传输错误，并记录触发它的操作名。
    pub fn io(operation: &'static str, source: io::Error) -> Self {
        Self::Io {
            operation,
            source: Arc::new(source),
        }
    }

    /// 若为 IO 错误，返回其 `io::ErrorKind`。
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

/// 会话注册表错误。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("unknown session {id}")]
    Unknown { id: SessionId },
    #[error("{operation} is not permitted for a {role} session manager")]
    Role {
        role: Role,
        operation: &'static str,
    },
    #[error("peer rejected the session request: {reason}")]
    Rejected { reason: Cow<'static, str> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overload_is_the_only_retryable_kind() {
        let overload = ChannelError::Overload {
            channel: "a -> b".into(),
            message: "ping".into(),
            role: Role::Client,
        };
        let closed = ChannelError::ChannelClosed {
            channel: "a -> b".into(),
            message: None,
        };
        assert!(overload.is_retryable());
        assert!(!closed.is_retryable());
        assert_eq!(overload.code(), codes::CHANNEL_OVERLOAD);
        assert_eq!(closed.code(), codes::CHANNEL_CLOSED);
    }

    #[test]
    fn closed_message_renders_payload_when_present() {
        let err = ChannelError::ChannelClosed {
            channel: "a -> b".into(),
            message: Some("\"ping\"".into()),
        };
        let text = err.to_string();
        assert!(text.contains("a -> b"));
        assert!(text.contains("\"ping\""));

        let bare = ChannelError::ChannelClosed {
            channel: "a -> b".into(),
            message: None,
        };
        assert!(bare.to_string().ends_with("a -> b"));
    }

    #[test]
    fn transport_error_keeps_io_kind() {
        let err = TransportError::io(
            "tcp write",
            io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"),
        );
        assert_eq!(err.io_kind(), Some(io::ErrorKind::BrokenPipe));
        assert_eq!(err.to_string(), "tcp write: peer gone");
    }
}
