//! 原子类型的构建期切换点。
//!
//! 在 `--cfg loom` 且启用 `loom-model` Feature 时改用 loom 的原子实现，
//! 使 `tests/loom_concurrency.rs` 能穷举 ID 生成器的线程交错；其余构建直接使用标准库。

#[cfg(all(loom, feature = "loom-model"))]
pub(crate) use loom::sync::atomic::{AtomicU32, Ordering};

#[cfg(not(all(loom, feature = "loom-model")))]
pub(crate) use std::sync::atomic::{AtomicU32, Ordering};
