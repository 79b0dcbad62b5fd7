//! 流适配层与真实 TCP 通道的组合测试：按行对话的最小闭环。

use std::time::Duration;

use tether_core::prelude::*;
use tether_stream::TransportStream;
use tether_transport_tcp::{TcpChannel, TcpListener};

/// 客户端按行发出指令，服务端逐行读取并按行应答。
#[tokio::test(flavor = "multi_thread")]
async fn line_dialogue_over_tcp() {
    let config = SocketConfig::builder()
        .with_timeout(Duration::from_secs(5))
        .build();
    let listener = TcpListener::bind(&Endpoint::new("127.0.0.1", 0), &config)
        .await
        .expect("bind listener");
    let target = Endpoint::from(listener.local_addr());

    let (server, client) = tokio::join!(listener.accept(), TcpChannel::connect(&target, &config));
    let mut server = TransportStream::owned(server.expect("accept"));
    let mut client = TransportStream::owned(client.expect("connect"));

    client
        .write_all(b"HELO mail.example\r\nNOOP\r\n")
        .await
        .expect("send commands");

    assert_eq!(
        server.read_line().await.expect("first command").as_deref(),
        Some("HELO mail.example")
    );
    assert_eq!(
        server.read_line().await.expect("second command").as_deref(),
        Some("NOOP")
    );

    server.write_all(b"250 ok\r\n").await.expect("reply");
    assert_eq!(
        client.read_line().await.expect("reply").as_deref(),
        Some("250 ok")
    );
}

/// 借用模式包装的通道在流关闭后保持可用。
#[tokio::test(flavor = "multi_thread")]
async fn leased_channel_survives_stream_close() {
    let config = SocketConfig::builder()
        .with_timeout(Duration::from_secs(5))
        .build();
    let listener = TcpListener::bind(&Endpoint::new("127.0.0.1", 0), &config)
        .await
        .expect("bind listener");
    let target = Endpoint::from(listener.local_addr());

    let (server, client) = tokio::join!(listener.accept(), TcpChannel::connect(&target, &config));
    let server = server.expect("accept");
    let client = client.expect("connect");

    let mut stream = TransportStream::leased(client);
    stream.write_all(b"first\n").await.expect("write via stream");
    stream.close().await.expect("close leased stream");
    let client = stream.into_inner();
    assert!(!client.is_closed(), "leased channel must stay open");

    // 流关闭之后，原通道仍可直接使用。
    client.write(b"second\n").await.expect("write after stream close");

    let mut server = TransportStream::owned(server);
    assert_eq!(server.read_line().await.expect("l1").as_deref(), Some("first"));
    assert_eq!(server.read_line().await.expect("l2").as_deref(), Some("second"));
}
