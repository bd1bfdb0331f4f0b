use std::{any::Any, sync::Arc};

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{
    error::CodecError,
    filter::TypeFilter,
    pool::CodecPool,
    registry::{DecodedValue, TypeRegistry},
};

const DEFAULT_MAX_IDLE: usize = 16;
const DEFAULT_BUFFER_CAPACITY: usize = 256;

#[derive(Serialize)]
struct OutboundEnvelope<'a, T: Serialize> {
    #[serde(rename = "type")]
    type_name: &'a str,
    body: &'a T,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct InboundEnvelope {
    #[serde(rename = "type")]
    type_name: String,
    body: Value,
}

/// 带类型名信封的 JSON 编解码器。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 载荷形如 `{"type": "<线上名>", "body": <值>}`，接收方据类型名决定实例化哪个本地类型；
///   这正是需要过滤器把关的地方。
///
/// ## 逻辑（How）
/// - 编码：从 [`CodecPool`] 借出缓冲，写入信封后复制为 [`Bytes`]，缓冲随守卫归还；
/// - 解码：先只解析信封（正文保持为通用 JSON 树，不实例化任何本地类型），
///   依次检查过滤器与注册表，通过后才调用类型解码器。
///
/// ## 契约（What）
/// - 被拒绝的类型名返回 [`CodecError::Denied`]，未登记的返回 [`CodecError::Unregistered`]；
///   两者都不会触发类型解码器；
/// - 编解码器可跨线程共享，内部状态只有池与只读配置。
#[derive(Debug)]
pub struct JsonCodec {
    registry: Arc<TypeRegistry>,
    filter: TypeFilter,
    buffers: CodecPool<BytesMut>,
}

impl JsonCodec {
    pub fn new(registry: Arc<TypeRegistry>, filter: TypeFilter) -> Self {
        Self::with_pool_size(registry, filter, DEFAULT_MAX_IDLE)
    }

    pub fn with_pool_size(registry: Arc<TypeRegistry>, filter: TypeFilter, max_idle: usize) -> Self {
        Self {
            registry,
            filter,
            buffers: CodecPool::new(max_idle, || BytesMut::with_capacity(DEFAULT_BUFFER_CAPACITY)),
        }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn filter(&self) -> &TypeFilter {
        &self.filter
    }

    pub fn buffer_pool(&self) -> &CodecPool<BytesMut> {
        &self.buffers
    }

    /// 编码已登记类型的值。
    pub fn encode<T>(&self, value: &T) -> Result<Bytes, CodecError>
    where
        T: Serialize + 'static,
    {
        let name = self.registry.name_of::<T>()?;
        let mut buffer = self.buffers.acquire();
        let envelope = OutboundEnvelope {
            type_name: &name,
            body: value,
        };
        serde_json::to_writer((&mut *buffer).writer(), &envelope)?;
        Ok(Bytes::copy_from_slice(&buffer))
    }

    /// 解码载荷，返回类型名与未转型的值。
    pub fn decode(&self, payload: &[u8]) -> Result<(String, DecodedValue), CodecError> {
        let envelope: InboundEnvelope = serde_json::from_slice(payload)?;
        if let Err(err) = self.filter.check(&envelope.type_name) {
            debug!(
                type_name = %envelope.type_name,
                code = err.code(),
                "rejected payload type before decoding"
            );
            return Err(err);
        }
        let decoder = self.registry.decoder(&envelope.type_name)?;
        let value = decoder.decode(envelope.body)?;
        Ok((envelope.type_name, value))
    }

    /// 解码并转型为 `T`；载荷类型与 `T` 不符时返回 [`CodecError::Malformed`]。
    pub fn decode_as<T: Any>(&self, payload: &[u8]) -> Result<T, CodecError> {
        let (name, value) = self.decode(payload)?;
        value.downcast::<T>().map(|boxed| *boxed).map_err(|_| {
            CodecError::Malformed(format!("payload type `{name}` is not the requested type").into())
        })
    }
}
