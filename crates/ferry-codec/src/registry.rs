use std::{
    any::{Any, TypeId, type_name},
    fmt,
    marker::PhantomData,
    sync::Arc,
};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;

use crate::error::CodecError;

/// 已解码、尚未向下转型的值。
pub type DecodedValue = Box<dyn Any + Send>;

/// 对象层的按类型解码契约。
///
/// # 契约说明（What）
/// - `decode` 只在类型名已通过过滤器之后被调用；
/// - 返回值的具体类型必须与注册时的泛型参数一致。
pub trait TypeDecoder: Send + Sync + 'static {
    fn decode(&self, body: Value) -> Result<DecodedValue, CodecError>;
}

/// 把 `serde` 反序列化能力包装为 [`TypeDecoder`] 的适配器。
struct SerdeDecoder<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypeDecoder for SerdeDecoder<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn decode(&self, body: Value) -> Result<DecodedValue, CodecError> {
        let value: T = serde_json::from_value(body)?;
        Ok(Box::new(value))
    }
}

/// 线上类型名与本地类型之间的显式注册表。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 线上载荷只携带类型名；只有显式登记过的类型才可能被实例化，
///   未登记的名字在到达任何反序列化逻辑前即被拒绝。
///
/// ## 契约（What）
/// - [`register`](Self::register) 同时登记名字到解码器、类型到名字两个方向；
///   重复登记同名类型时后者覆盖前者，返回 `true`；
/// - [`decoder`](Self::decoder) 找不到名字时返回 [`CodecError::Unregistered`]；
/// - [`name_of`](Self::name_of) 供编码侧查询本地类型的线上名。
#[derive(Default)]
pub struct TypeRegistry {
    decoders: DashMap<String, Arc<dyn TypeDecoder>>,
    names: DashMap<TypeId, Arc<str>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以线上名 `name` 登记类型 `T`。
    pub fn register<T>(&self, name: impl Into<String>) -> bool
    where
        T: DeserializeOwned + Send + 'static,
    {
        let name = name.into();
        trace!(type_name = %name, rust_type = type_name::<T>(), "codec type registered");
        let replaced = self
            .decoders
            .insert(
                name.clone(),
                Arc::new(SerdeDecoder::<T> {
                    _marker: PhantomData,
                }),
            )
            .is_some();
        self.names.insert(TypeId::of::<T>(), Arc::from(name));
        replaced
    }

    /// 以自定义解码器登记线上名，用于不经 `serde` 的类型。
    pub fn register_decoder(&self, name: impl Into<String>, decoder: Arc<dyn TypeDecoder>) -> bool {
        self.decoders.insert(name.into(), decoder).is_some()
    }

    pub fn decoder(&self, name: &str) -> Result<Arc<dyn TypeDecoder>, CodecError> {
        self.decoders
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| CodecError::Unregistered {
                type_name: name.to_owned(),
            })
    }

    /// 本地类型的线上名。
    pub fn name_of<T: 'static>(&self) -> Result<Arc<str>, CodecError> {
        self.names
            .get(&TypeId::of::<T>())
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| CodecError::Unregistered {
                type_name: type_name::<T>().to_owned(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.decoders.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.decoders.iter().map(|e| e.key().clone()).collect();
        names.sort();
        f.debug_struct("TypeRegistry").field("types", &names).finish()
    }
}
