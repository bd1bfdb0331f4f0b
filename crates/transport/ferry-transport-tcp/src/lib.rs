#![deny(unsafe_code)]
//! ferry-transport-tcp：基于 Tokio 的 [`Endpoint`](ferry_core::Endpoint) 实现。
//!
//! # 教案级导览
//!
//! - **Why**：`ferry-core` 只定义端点契约，真实连接需要一个把同步发送/关闭调用桥接到
//!   异步套接字的实现；
//! - **How**：每条连接拆分为读、写两个 Tokio 任务，调用线程只向写任务入队命令；
//!   写缓冲积压由高低水位线换算为 `is_writable`；
//! - **What**：[`TcpListener`] 接受连接并生成服务端通道，[`connect_channel`] 建立客户端通道，
//!   [`TcpEndpointConfig`] 控制套接字选项与水位线。

mod backpressure;
mod config;
mod endpoint;
mod error;
mod inbound;
mod listener;

pub use config::{ConfigError, TcpEndpointConfig};
pub use endpoint::{TcpEndpoint, connect_channel};
pub use inbound::{DiscardInbound, InboundHandler};
pub use listener::{TcpListener, TcpListenerBuilder};
