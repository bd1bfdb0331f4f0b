use std::{
    borrow::Cow,
    io,
    net::SocketAddr,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
};

use bytes::{Bytes, BytesMut};
use ferry_core::{
    Channel, ChannelError, Completion, CompletionNotifier, CompletionResult, Endpoint, Role,
    TransportError,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    runtime::Handle,
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, trace, warn};

use crate::{
    backpressure::WriteBackpressure,
    config::TcpEndpointConfig,
    error::{self, is_disconnect, map_io_error},
    inbound::InboundHandler,
};

struct WriteCommand {
    frame: Bytes,
    notifier: Option<CompletionNotifier>,
}

/// 关闭请求走独立队列，不排在积压的写入之后。
type CloseRequest = Option<CompletionNotifier>;

struct Shared {
    label: String,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    config: TcpEndpointConfig,
    active: AtomicBool,
    backpressure: Mutex<WriteBackpressure>,
    commands: mpsc::UnboundedSender<WriteCommand>,
    closes: mpsc::UnboundedSender<CloseRequest>,
    inbound: Arc<dyn InboundHandler>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn backpressure(&self) -> MutexGuard<'_, WriteBackpressure> {
        match self.backpressure.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn flushed(&self, len: usize) {
        if self.backpressure().on_flushed(len) {
            trace!(channel = %self.label, "write buffer drained below low watermark");
        }
    }

    /// 转为不活跃；只有第一次调用会通知入站处理器。
    fn mark_inactive(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            debug!(channel = %self.label, "tcp endpoint became inactive");
            self.inbound.on_inactive();
        }
    }

    fn abort_reader(&self) {
        let handle = match self.reader.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

/// 基于 Tokio 的 TCP 端点：一个读任务、一个写任务，调用线程只负责入队。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - [`Channel`] 的发送与关闭都是同步调用，可能来自任意线程；端点把它们转成命令，
///   交给独占写半部的写任务串行执行，调用方无需持有异步锁；
/// - 读任务独占读半部，把收到的字节交给 [`InboundHandler`]。
///
/// ## 逻辑 (How)
/// - 写入前先在 [`WriteBackpressure`] 中登记字节数，写任务完成后扣减，驱动 `is_writable`；
/// - 关闭请求走独立队列，写任务在空闲和写入进行中都优先响应它；对端不读取时，
///   进行中的写入被放弃，关闭不会排在积压数据之后无限等待；
/// - 写失败、收到关闭请求、对端 EOF（由读任务转发为关闭请求）都会让写任务进入收尾：
///   转为不活跃、关闭两个队列、以 `Closed` 失败进行中与排队的写入、半关闭写方向、
///   终止读任务，最后完成所有关闭句柄；
/// - 写入与关闭的 [`Completion`] 都在写任务上完成，监听器因此运行在 Tokio 工作线程上。
///
/// ## 契约 (What)
/// - `write` 在端点不活跃或命令队列已关闭时同步返回 [`TransportError::Closed`]；
/// - 对已不活跃的端点调用 `close` 返回已成功完成的句柄；
/// - `close` 不等待积压的写入完成：进行中与排队的写入以 `Closed` 失败；
/// - 端点被丢弃时自动发起关闭。
///
/// ## 注意事项 (Trade-offs)
/// - 命令队列无界，过载保护完全依赖调用方遵守 `is_writable`；
/// - 构造必须发生在 Tokio 运行时内。
pub struct TcpEndpoint {
    shared: Arc<Shared>,
}

impl TcpEndpoint {
    /// 连接到 `addr` 并启动读写任务。
    pub async fn connect(
        addr: SocketAddr,
        config: TcpEndpointConfig,
        inbound: Arc<dyn InboundHandler>,
    ) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|err| map_io_error(error::CONNECT, err))?;
        Self::from_stream(stream, config, inbound)
    }

    /// 接管已建立的连接并启动读写任务。
    pub fn from_stream(
        stream: TcpStream,
        config: TcpEndpointConfig,
        inbound: Arc<dyn InboundHandler>,
    ) -> Result<Self, TransportError> {
        config
            .validate()
            .map_err(|err| TransportError::Other(Cow::Owned(err.to_string())))?;
        let runtime = Handle::try_current()
            .map_err(|err| TransportError::Other(Cow::Owned(err.to_string())))?;
        config
            .apply(&stream)
            .map_err(|err| map_io_error(error::CONFIGURE, err))?;
        let local_addr = stream
            .local_addr()
            .map_err(|err| map_io_error(error::CONFIGURE, err))?;
        let peer_addr = stream
            .peer_addr()
            .map_err(|err| map_io_error(error::CONFIGURE, err))?;

        let (read_half, write_half) = stream.into_split();
        let (commands, receiver) = mpsc::unbounded_channel();
        let (closes, close_requests) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            label: format!("{local_addr} -> {peer_addr}"),
            local_addr,
            peer_addr,
            backpressure: Mutex::new(WriteBackpressure::new(
                config.write_low_watermark(),
                config.write_high_watermark(),
            )),
            config,
            active: AtomicBool::new(true),
            commands,
            closes,
            inbound,
            reader: Mutex::new(None),
        });

        let reader = runtime.spawn(read_loop(Arc::clone(&shared), read_half));
        match shared.reader.lock() {
            Ok(mut slot) => *slot = Some(reader),
            Err(poisoned) => *poisoned.into_inner() = Some(reader),
        }
        runtime.spawn(write_loop(
            Arc::clone(&shared),
            write_half,
            receiver,
            close_requests,
        ));
        debug!(channel = %shared.label, "tcp endpoint started");
        Ok(Self { shared })
    }

    pub fn config(&self) -> &TcpEndpointConfig {
        &self.shared.config
    }

    /// 已入队但尚未写出的字节数。
    pub fn pending_bytes(&self) -> usize {
        self.shared.backpressure().pending()
    }

    fn enqueue(
        &self,
        frame: Bytes,
        notifier: Option<CompletionNotifier>,
    ) -> Result<(), TransportError> {
        let len = frame.len();
        if !self.shared.backpressure().on_enqueue(len) {
            trace!(channel = %self.shared.label, len, "write buffer above high watermark");
        }
        self.shared
            .commands
            .send(WriteCommand { frame, notifier })
            .map_err(|_| {
                self.shared.flushed(len);
                TransportError::Closed
            })
    }
}

impl Endpoint for TcpEndpoint {
    type Message = Bytes;

    fn id(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.shared.label)
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.shared.local_addr)
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.shared.peer_addr)
    }

    fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    fn is_writable(&self) -> bool {
        self.is_active() && self.shared.backpressure().is_writable()
    }

    fn write(&self, message: Bytes) -> Result<Completion, TransportError> {
        if !self.is_active() {
            return Err(TransportError::Closed);
        }
        let (notifier, completion) = Completion::pair();
        self.enqueue(message, Some(notifier))?;
        Ok(completion)
    }

    fn write_detached(&self, message: Bytes) {
        if let Err(error) = self.enqueue(message, None) {
            debug!(channel = %self.shared.label, %error, "detached write dropped");
        }
    }

    fn close(&self) -> Result<Completion, TransportError> {
        if !self.is_active() {
            return Ok(Completion::ready(Ok(())));
        }
        let (notifier, completion) = Completion::pair();
        match self.shared.closes.send(Some(notifier)) {
            Ok(()) => Ok(completion),
            // 写任务已进入收尾，关闭命令队列前已转为不活跃。
            Err(_) => Ok(Completion::ready(Ok(()))),
        }
    }

    fn fire_exception_caught(&self, cause: ChannelError) {
        self.shared.inbound.on_exception_caught(cause);
    }

    fn buffer_capacity(&self) -> usize {
        self.shared.config.read_buffer_size()
    }
}

impl Drop for TcpEndpoint {
    fn drop(&mut self) {
        let _ = self.shared.closes.send(None);
    }
}

impl std::fmt::Debug for TcpEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpEndpoint")
            .field("channel", &self.shared.label)
            .field("active", &self.is_active())
            .field("pending_bytes", &self.pending_bytes())
            .finish()
    }
}

/// 连接到 `addr`，返回客户端角色的通道。
pub async fn connect_channel(
    addr: SocketAddr,
    config: TcpEndpointConfig,
    inbound: Arc<dyn InboundHandler>,
) -> Result<Channel<TcpEndpoint>, TransportError> {
    let endpoint = TcpEndpoint::connect(addr, config, inbound).await?;
    Ok(Channel::new(endpoint, Role::Client))
}

async fn read_loop(shared: Arc<Shared>, mut reader: OwnedReadHalf) {
    let capacity = shared.config.read_buffer_size();
    let mut buffer = BytesMut::with_capacity(capacity);
    loop {
        buffer.reserve(capacity);
        match reader.read_buf(&mut buffer).await {
            Ok(0) => {
                debug!(channel = %shared.label, "peer closed the connection");
                break;
            }
            Ok(_) => shared.inbound.on_read(buffer.split().freeze()),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                if !is_disconnect(&err) {
                    let source = map_io_error(error::READ, err);
                    shared.inbound.on_exception_caught(ChannelError::Transport {
                        channel: shared.label.clone(),
                        source,
                    });
                }
                break;
            }
        }
    }
    let _ = shared.closes.send(None);
}

async fn write_loop(
    shared: Arc<Shared>,
    mut writer: OwnedWriteHalf,
    mut commands: mpsc::UnboundedReceiver<WriteCommand>,
    mut close_requests: mpsc::UnboundedReceiver<CloseRequest>,
) {
    let mut close_notifiers = Vec::new();
    loop {
        let command = tokio::select! {
            biased;
            request = close_requests.recv() => {
                close_notifiers.extend(request.flatten());
                break;
            }
            command = commands.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };
        let WriteCommand { frame, notifier } = command;
        let result = tokio::select! {
            biased;
            request = close_requests.recv() => {
                shared.flushed(frame.len());
                trace!(
                    channel = %shared.label,
                    len = frame.len(),
                    "in-flight write abandoned by close"
                );
                if let Some(notifier) = notifier {
                    notifier.fail(TransportError::Closed);
                }
                close_notifiers.extend(request.flatten());
                break;
            }
            result = writer.write_all(&frame) => result,
        };
        shared.flushed(frame.len());
        match result {
            Ok(()) => {
                if let Some(notifier) = notifier {
                    notifier.succeed();
                }
            }
            Err(err) => {
                if !is_disconnect(&err) {
                    warn!(channel = %shared.label, error = %err, "tcp write failed; closing endpoint");
                }
                if let Some(notifier) = notifier {
                    notifier.fail(map_io_error(error::WRITE, err));
                }
                break;
            }
        }
    }

    shared.mark_inactive();
    commands.close();
    close_requests.close();
    let mut abandoned = 0usize;
    while let Ok(WriteCommand { frame, notifier }) = commands.try_recv() {
        shared.flushed(frame.len());
        abandoned += 1;
        if let Some(notifier) = notifier {
            notifier.fail(TransportError::Closed);
        }
    }
    while let Ok(request) = close_requests.try_recv() {
        close_notifiers.extend(request);
    }
    if abandoned > 0 {
        debug!(channel = %shared.label, abandoned, "queued writes failed on close");
    }

    let outcome = shutdown(&mut writer).await;
    shared.abort_reader();
    drop(writer);
    for notifier in close_notifiers {
        notifier.complete(outcome.clone());
    }
}

async fn shutdown(writer: &mut OwnedWriteHalf) -> CompletionResult {
    match writer.shutdown().await {
        Ok(()) => Ok(()),
        Err(err) if is_disconnect(&err) => Ok(()),
        Err(err) => Err(map_io_error(error::SHUTDOWN, err)),
    }
}
