#![deny(unsafe_code)]
//! ferry-router：在候选连接之间挑选节点并发起调用。
//!
//! # 教案级导览
//!
//! - **Why**：通道只负责单条连接；多节点之间的选择策略需要可替换、可按名字配置，
//!   并且不能悄悄重放失败的调用；
//! - **How**：[`Candidate`] 是不可变快照，[`LoadBalance`] 只读地从中挑选，
//!   [`FailfastRouter`] 选一次、调一次；
//! - **What**：内置 [`RoundRobin`] 与 [`Sticky`] 两种策略，通过 [`LoadBalanceRegistry`] 按名字创建。

mod balance;
mod candidate;
mod error;
mod registry;
mod router;

pub use balance::{LoadBalance, ROUND_ROBIN, RoundRobin, STICKY, Sticky};
pub use candidate::{Candidate, Invocation, Node};
pub use error::RouteError;
pub use registry::LoadBalanceRegistry;
pub use router::FailfastRouter;
