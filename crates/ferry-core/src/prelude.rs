//! # ferry-core Prelude
//!
//! 为传输实现、编解码与路由 crate 提供浅路径的统一导入入口：
//! `use ferry_core::prelude::*;` 即可获得通道、端点契约、完成句柄与错误类型。
//!
//! 仅收录跨 crate 高频使用的类型；会话、扩展注册表等仍建议使用明确路径。

pub use crate::{
    AsyncResult, Channel, ChannelError, Completion, CompletionNotifier, CompletionResult,
    Endpoint, ErrorKind, MessageId, Role, SendResult, TransportError,
};
