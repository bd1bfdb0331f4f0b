//! TCP 通道端到端测试。
//!
//! # 教案级导览
//!
//! - **Why**：通道契约最终要在真实套接字上成立：发送成功要能到达对端，关闭后发送要被分类为
//!   `ChannelClosed`，写缓冲积压要翻转可写状态；
//! - **How**：在多线程 Tokio 运行时中绑定 `127.0.0.1:0`，入站事件通过无界通道回传给测试；
//!   阻塞的 `close()` 放到 `spawn_blocking` 中执行；
//! - **What**：覆盖往返、关闭后发送、对端关闭、关闭释放待定回复与水位线滞回。

use std::{net::SocketAddr, sync::Arc, time::Duration};

use bytes::Bytes;
use ferry_core::{Channel, ChannelError, ErrorKind, Role};
use ferry_transport_tcp::{
    DiscardInbound, InboundHandler, TcpEndpoint, TcpEndpointConfig, TcpListener, connect_channel,
};
use tokio::{
    io::AsyncReadExt,
    sync::{mpsc, oneshot},
    time::timeout,
};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug)]
enum Event {
    Read(Bytes),
    Inactive,
    Caught(ChannelError),
}

struct Recorder {
    events: mpsc::UnboundedSender<Event>,
}

impl InboundHandler for Recorder {
    fn on_read(&self, frame: Bytes) {
        let _ = self.events.send(Event::Read(frame));
    }

    fn on_inactive(&self) {
        let _ = self.events.send(Event::Inactive);
    }

    fn on_exception_caught(&self, cause: ChannelError) {
        let _ = self.events.send(Event::Caught(cause));
    }
}

fn recorder() -> (Arc<dyn InboundHandler>, mpsc::UnboundedReceiver<Event>) {
    let (events, receiver) = mpsc::unbounded_channel();
    (Arc::new(Recorder { events }), receiver)
}

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().expect("parse addr")
}

async fn read_exactly(events: &mut mpsc::UnboundedReceiver<Event>, len: usize) -> Vec<u8> {
    let mut received = Vec::new();
    while received.len() < len {
        match timeout(WAIT, events.recv()).await {
            Ok(Some(Event::Read(frame))) => received.extend_from_slice(&frame),
            Ok(Some(other)) => panic!("unexpected event before data arrived: {other:?}"),
            Ok(None) | Err(_) => panic!("timed out waiting for {len} bytes"),
        }
    }
    received
}

async fn wait_for_inactive(events: &mut mpsc::UnboundedReceiver<Event>) {
    loop {
        match timeout(WAIT, events.recv()).await {
            Ok(Some(Event::Inactive)) => return,
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => panic!("endpoint never reported inactive"),
        }
    }
}

async fn blocking_close(channel: &Channel<TcpEndpoint>) -> bool {
    let channel = channel.clone();
    tokio::task::spawn_blocking(move || channel.close())
        .await
        .expect("close task should not panic")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn send_with_reaches_the_peer_and_reports_success() {
    let listener = TcpListener::bind(loopback()).await.expect("bind listener");
    let (server_inbound, mut server_events) = recorder();
    let addr = listener.local_addr();
    let accept = tokio::spawn(async move { listener.accept_channel(server_inbound).await });

    let client = connect_channel(addr, TcpEndpointConfig::default(), Arc::new(DiscardInbound))
        .await
        .expect("connect");
    let server = accept.await.expect("accept task").expect("accept");
    assert_eq!(client.role(), Role::Client);
    assert_eq!(server.role(), Role::Server);
    assert_eq!(client.local_addr(), server.peer_addr());

    let (done, outcome) = oneshot::channel();
    client.send_with(Bytes::from_static(b"ping"), move |result| {
        let _ = done.send((result.is_success(), result.message().clone()));
    });
    let (success, echoed) = timeout(WAIT, outcome)
        .await
        .expect("send completion in time")
        .expect("sink invoked");
    assert!(success);
    assert_eq!(echoed, Bytes::from_static(b"ping"));

    client
        .send(Bytes::from_static(b"pong"))
        .expect("writable channel accepts detached send");
    assert_eq!(read_exactly(&mut server_events, 8).await, b"pingpong");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn send_after_close_is_classified_as_closed() {
    let listener = TcpListener::bind(loopback()).await.expect("bind listener");
    let addr = listener.local_addr();
    let accept =
        tokio::spawn(async move { listener.accept_channel(Arc::new(DiscardInbound)).await });
    let client = connect_channel(addr, TcpEndpointConfig::default(), Arc::new(DiscardInbound))
        .await
        .expect("connect");
    let _server = accept.await.expect("accept task").expect("accept");

    assert!(blocking_close(&client).await);
    assert!(!client.is_active());
    let err = client.send(Bytes::from_static(b"late")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ChannelClosed);
    assert!(blocking_close(&client).await, "关闭已关闭的通道仍视为成功");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn peer_close_marks_the_channel_inactive() {
    let listener = TcpListener::bind(loopback()).await.expect("bind listener");
    let (server_inbound, mut server_events) = recorder();
    let addr = listener.local_addr();
    let accept = tokio::spawn(async move { listener.accept_channel(server_inbound).await });
    let client = connect_channel(addr, TcpEndpointConfig::default(), Arc::new(DiscardInbound))
        .await
        .expect("connect");
    let server = accept.await.expect("accept task").expect("accept");

    let (done, closed) = oneshot::channel();
    client.close_with(move |result| {
        let _ = done.send(result.is_success());
    });
    assert!(timeout(WAIT, closed).await.expect("close in time").expect("sink"));

    wait_for_inactive(&mut server_events).await;
    assert!(!server.is_active());
    assert!(!server.is_writable());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_releases_pending_replies() {
    let listener = TcpListener::bind(loopback()).await.expect("bind listener");
    let addr = listener.local_addr();
    let accept =
        tokio::spawn(async move { listener.accept_channel(Arc::new(DiscardInbound)).await });
    let client = connect_channel(addr, TcpEndpointConfig::default(), Arc::new(DiscardInbound))
        .await
        .expect("connect");
    let _server = accept.await.expect("accept task").expect("accept");

    let (_, reply) = client.future_manager().register();
    assert!(blocking_close(&client).await);
    let err = timeout(WAIT, reply)
        .await
        .expect("reply released in time")
        .expect_err("pending reply fails after close");
    assert_eq!(err.kind(), ErrorKind::ChannelClosed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn write_watermarks_drive_writability() {
    // 对端使用裸套接字，在积压形成前不读取任何数据。
    let raw = tokio::net::TcpListener::bind(loopback())
        .await
        .expect("bind raw listener");
    let raw_addr = raw.local_addr().expect("raw addr");
    let config = TcpEndpointConfig::new().with_write_watermarks(1024, 4096);
    let client = connect_channel(raw_addr, config, Arc::new(DiscardInbound))
        .await
        .expect("connect");
    let (mut peer_stream, _) = raw.accept().await.expect("accept raw");

    const PAYLOAD: usize = 32 * 1024 * 1024;
    client
        .send(Bytes::from(vec![0u8; PAYLOAD]))
        .expect("first send is accepted while writable");
    assert!(!client.is_writable(), "积压超过高水位后应不可写");
    let err = client.send(Bytes::from_static(b"more")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Overload);

    let mut drained = 0usize;
    let mut buffer = vec![0u8; 64 * 1024];
    while drained < PAYLOAD {
        let read = timeout(WAIT, peer_stream.read(&mut buffer))
            .await
            .expect("peer read in time")
            .expect("peer read");
        assert!(read > 0, "client closed before the payload drained");
        drained += read;
    }

    timeout(WAIT, async {
        while !client.is_writable() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("writable again after draining below the low watermark");
    assert_eq!(client.endpoint().pending_bytes(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fire_caught_reaches_the_inbound_handler() {
    let listener = TcpListener::bind(loopback()).await.expect("bind listener");
    let (server_inbound, mut server_events) = recorder();
    let addr = listener.local_addr();
    let accept = tokio::spawn(async move { listener.accept_channel(server_inbound).await });
    let _client = connect_channel(addr, TcpEndpointConfig::default(), Arc::new(DiscardInbound))
        .await
        .expect("connect");
    let server = accept.await.expect("accept task").expect("accept");

    server.fire_caught(ChannelError::protocol(server.id(), "unexpected frame"));
    match timeout(WAIT, server_events.recv()).await {
        Ok(Some(Event::Caught(cause))) => assert_eq!(cause.kind(), ErrorKind::Protocol),
        other => panic!("expected an injected exception, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_preempts_writes_stalled_by_a_silent_peer() {
    // 对端接受连接后从不读取，写任务会卡在第一帧上。
    let raw = tokio::net::TcpListener::bind(loopback())
        .await
        .expect("bind raw listener");
    let raw_addr = raw.local_addr().expect("raw addr");
    let client = connect_channel(raw_addr, TcpEndpointConfig::default(), Arc::new(DiscardInbound))
        .await
        .expect("connect");
    let (_silent_peer, _) = raw.accept().await.expect("accept raw");

    let (sent, send_outcome) = oneshot::channel();
    client.send_with(Bytes::from(vec![0u8; 64 * 1024 * 1024]), move |result| {
        let _ = sent.send(result.cause().map(ChannelError::kind));
    });
    assert!(!client.is_writable());
    assert!(client.is_active());

    let (closed, close_outcome) = oneshot::channel();
    client.close_with(move |result| {
        let _ = closed.send(result.is_success());
    });
    let close_success = timeout(WAIT, close_outcome)
        .await
        .expect("close completes without waiting for the stalled write")
        .expect("close sink invoked");
    assert!(close_success);
    assert!(!client.is_active());

    let send_kind = timeout(WAIT, send_outcome)
        .await
        .expect("stalled write resolved in time")
        .expect("send sink invoked");
    assert_eq!(send_kind, Some(ErrorKind::Transport), "未写完的帧以 Closed 失败");
    assert_eq!(client.endpoint().pending_bytes(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn buffers_default_to_the_read_buffer_size() {
    let listener = TcpListener::bind(loopback()).await.expect("bind listener");
    let addr = listener.local_addr();
    let accept =
        tokio::spawn(async move { listener.accept_channel(Arc::new(DiscardInbound)).await });
    let config = TcpEndpointConfig::new().with_read_buffer_size(16 * 1024);
    let client = connect_channel(addr, config, Arc::new(DiscardInbound))
        .await
        .expect("connect");
    let _server = accept.await.expect("accept task").expect("accept");

    assert!(client.buffer().capacity() >= 16 * 1024);
    assert!(client.buffer_bounded(32, 16).is_err());
}
