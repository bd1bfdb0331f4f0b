#![deny(unsafe_code)]
//! ferry-codec：通道之上的编解码协作边界。
//!
//! # 教案级导览
//!
//! - **Why**：通道只搬运字节；把字节变回本地类型时，必须先确认类型名可信，
//!   并避免每次编码都重新分配缓冲；
//! - **How**：[`TypeFilter`] 在实例化前按类型名放行或拒绝，[`TypeRegistry`] 只允许显式登记的类型，
//!   [`CodecPool`] 让编码缓冲在任意线程间安全复用；
//! - **What**：[`JsonCodec`] 组合上述三者，提供带类型名信封的 JSON 编解码。

mod error;
mod filter;
mod json;
mod pool;
mod registry;

pub use error::CodecError;
pub use filter::TypeFilter;
pub use json::JsonCodec;
pub use pool::{CodecPool, Pooled, Reusable};
pub use registry::{DecodedValue, TypeDecoder, TypeRegistry};
