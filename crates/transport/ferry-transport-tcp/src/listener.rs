use std::{net::SocketAddr, sync::Arc, time::Duration};

use ferry_core::{Channel, Role, TransportError};
use tokio::net::TcpListener as TokioTcpListener;
use tracing::debug;

use crate::{
    config::TcpEndpointConfig,
    endpoint::TcpEndpoint,
    error::{self, map_io_error},
    inbound::InboundHandler,
};

/// TCP 监听器，接受连接并为每条连接创建服务端角色的端点。
///
/// # 教案级注释
///
/// ## 契约（What）
/// - `bind`/`bind_with_config`：绑定地址，端口为 0 时由内核分配，实际地址通过 `local_addr` 读取；
/// - `accept`：等待下一条连接，套用监听器的默认配置；
/// - `accept_channel`：同上，并直接包装为 `Role::Server` 的 [`Channel`]。
///
/// ## 注意事项（Trade-offs）
/// - 每条连接使用调用方提供的入站处理器，监听器本身不保存处理器。
#[derive(Debug)]
pub struct TcpListener {
    inner: TokioTcpListener,
    local_addr: SocketAddr,
    default_config: TcpEndpointConfig,
}

impl TcpListener {
    /// 以默认配置绑定监听地址。
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        Self::bind_with_config(addr, TcpEndpointConfig::default()).await
    }

    /// 绑定监听地址，并设置新连接使用的默认配置。
    pub async fn bind_with_config(
        addr: SocketAddr,
        default_config: TcpEndpointConfig,
    ) -> Result<Self, TransportError> {
        default_config
            .validate()
            .map_err(|err| TransportError::Other(err.to_string().into()))?;
        let listener = TokioTcpListener::bind(addr)
            .await
            .map_err(|err| map_io_error(error::BIND, err))?;
        let local_addr = listener
            .local_addr()
            .map_err(|err| map_io_error(error::BIND, err))?;
        debug!(%local_addr, "tcp listener bound");
        Ok(Self {
            inner: listener,
            local_addr,
            default_config,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn default_config(&self) -> &TcpEndpointConfig {
        &self.default_config
    }

    /// 接受下一条连接。
    pub async fn accept(
        &self,
        inbound: Arc<dyn InboundHandler>,
    ) -> Result<(TcpEndpoint, SocketAddr), TransportError> {
        let (stream, remote) = self
            .inner
            .accept()
            .await
            .map_err(|err| map_io_error(error::ACCEPT, err))?;
        let endpoint = TcpEndpoint::from_stream(stream, self.default_config.clone(), inbound)?;
        Ok((endpoint, remote))
    }

    /// 接受下一条连接并包装为服务端通道。
    pub async fn accept_channel(
        &self,
        inbound: Arc<dyn InboundHandler>,
    ) -> Result<Channel<TcpEndpoint>, TransportError> {
        let (endpoint, _) = self.accept(inbound).await?;
        Ok(Channel::new(endpoint, Role::Server))
    }
}

/// [`TcpListener`] 的构建器，便于在绑定前逐项调整默认连接配置。
#[derive(Clone, Debug)]
pub struct TcpListenerBuilder {
    addr: SocketAddr,
    default_config: TcpEndpointConfig,
}

impl TcpListenerBuilder {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            default_config: TcpEndpointConfig::default(),
        }
    }

    pub fn with_default_config(mut self, config: TcpEndpointConfig) -> Self {
        self.default_config = config;
        self
    }

    pub fn with_linger(mut self, linger: Option<Duration>) -> Self {
        self.default_config = self.default_config.with_linger(linger);
        self
    }

    pub async fn bind(self) -> Result<TcpListener, TransportError> {
        TcpListener::bind_with_config(self.addr, self.default_config).await
    }
}
