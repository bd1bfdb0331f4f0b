use std::{io, time::Duration};

use serde::{Deserialize, Serialize};
use socket2::SockRef;
use thiserror::Error;
use tokio::net::TcpStream;

const DEFAULT_HIGH_WATERMARK: usize = 64 * 1024;
const DEFAULT_LOW_WATERMARK: usize = 32 * 1024;
const DEFAULT_READ_BUFFER: usize = 8 * 1024;

/// 配置加载或校验失败。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid tcp endpoint configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("write low watermark {low} must not exceed high watermark {high}")]
    Watermarks { low: usize, high: usize },
    #[error("read buffer size must be greater than zero")]
    ReadBuffer,
}

/// TCP 端点配置：套接字选项、写缓冲水位线与读缓冲大小。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把“优雅关闭等待多久后 RST”“写缓冲积压到多少算过载”这类决定显式配置化，
///   调用方无需直接操作 `socket2` 或平台相关常量；
/// - 支持从 TOML 片段加载，缺省字段取默认值。
///
/// ## 核心逻辑（How）
/// - `linger_ms` 通过 `SockRef::set_linger` 落地 `SO_LINGER`，`None` 表示遵循内核默认策略；
/// - `nodelay` 控制 `TCP_NODELAY`，默认开启，请求/响应式协议不希望被 Nagle 合并延迟；
/// - 水位线驱动端点的 `is_writable`：积压超过 `write_high_watermark` 后转为不可写，
///   回落到 `write_low_watermark` 以下才恢复。
///
/// ## 契约说明（What）
/// - **前置条件**：`apply` 调用前 `TcpStream` 必须已建立；
/// - **后置条件**：`validate` 通过时 `low <= high` 且读缓冲非零。
///
/// ## 注意事项（Trade-offs）
/// - `SO_LINGER` 在 Linux 上取整到秒；
/// - 高低水位过近会让可写状态频繁翻转。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TcpEndpointConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    linger_ms: Option<u64>,
    nodelay: bool,
    write_high_watermark: usize,
    write_low_watermark: usize,
    read_buffer_size: usize,
}

impl Default for TcpEndpointConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpEndpointConfig {
    /// 默认配置：无 linger、开启 nodelay、32KiB/64KiB 水位线、8KiB 读缓冲。
    pub const fn new() -> Self {
        Self {
            linger_ms: None,
            nodelay: true,
            write_high_watermark: DEFAULT_HIGH_WATERMARK,
            write_low_watermark: DEFAULT_LOW_WATERMARK,
            read_buffer_size: DEFAULT_READ_BUFFER,
        }
    }

    /// 从 TOML 片段加载并校验。
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// 设置 `SO_LINGER` 超时时长。
    pub fn with_linger(mut self, linger: Option<Duration>) -> Self {
        self.linger_ms = linger.map(|value| u64::try_from(value.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// 设置写缓冲水位线，单位字节。
    pub fn with_write_watermarks(mut self, low: usize, high: usize) -> Self {
        self.write_low_watermark = low;
        self.write_high_watermark = high;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    pub fn linger(&self) -> Option<Duration> {
        self.linger_ms.map(Duration::from_millis)
    }

    pub fn nodelay(&self) -> bool {
        self.nodelay
    }

    pub fn write_high_watermark(&self) -> usize {
        self.write_high_watermark
    }

    pub fn write_low_watermark(&self) -> usize {
        self.write_low_watermark
    }

    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }

    /// 校验字段之间的约束。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.write_low_watermark > self.write_high_watermark {
            return Err(ConfigError::Watermarks {
                low: self.write_low_watermark,
                high: self.write_high_watermark,
            });
        }
        if self.read_buffer_size == 0 {
            return Err(ConfigError::ReadBuffer);
        }
        Ok(())
    }

    pub(crate) fn apply(&self, stream: &TcpStream) -> io::Result<()> {
        let sock = SockRef::from(stream);
        sock.set_linger(self.linger())?;
        sock.set_tcp_nodelay(self.nodelay)
    }
}
