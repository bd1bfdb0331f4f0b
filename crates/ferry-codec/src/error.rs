use std::borrow::Cow;

use thiserror::Error;

/// 编解码错误。
#[derive(Debug, Error)]
pub enum CodecError {
    /// 类型名被过滤器拒绝，解码在实例化任何值之前终止。
    #[error("type `{type_name}` is not permitted by the decode filter")]
    Denied { type_name: String },
    /// 类型未在注册表中登记。
    #[error("type `{type_name}` is not registered")]
    Unregistered { type_name: String },
    #[error("json codec failure: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed payload: {0}")]
    Malformed(Cow<'static, str>),
}

impl CodecError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Denied { .. } => "ferry.codec.type_denied",
            Self::Unregistered { .. } => "ferry.codec.type_unregistered",
            Self::Json(_) => "ferry.codec.json",
            Self::Malformed(_) => "ferry.codec.malformed",
        }
    }
}
