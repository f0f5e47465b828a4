//! Integration tests for the stream transport.
//!
//! These spin up a real listener on loopback and talk to it with a
//! `tokio-tungstenite` client, so frames actually cross a socket.

#[cfg(feature = "stream")]
mod stream {
    use std::net::SocketAddr;
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use relaychat_transport::{Endpoint, Incoming, StreamTransport, Transport, TransportError};
    use tokio_tungstenite::tungstenite::Message;

    type ClientWs = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    /// Binds a listener on an OS-assigned loopback port.
    async fn bind_open() -> (StreamTransport, SocketAddr) {
        let transport = StreamTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .expect("should bind");
        transport.open().await.expect("should open");
        let addr = transport.local_addr().unwrap();
        (transport, addr)
    }

    async fn connect_client(addr: SocketAddr) -> ClientWs {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client should connect");
        ws
    }

    async fn recv_within(transport: &StreamTransport) -> Incoming {
        tokio::time::timeout(Duration::from_secs(2), transport.recv())
            .await
            .expect("recv should not hang")
            .expect("recv should succeed")
    }

    #[tokio::test]
    async fn test_stream_accept_and_send_receive() {
        let (transport, addr) = bind_open().await;
        let mut client = connect_client(addr).await;

        // --- Client sends, server receives ---
        client
            .send(Message::Binary(b"hello from client".to_vec().into()))
            .await
            .unwrap();

        let (from, data) = match recv_within(&transport).await {
            Incoming::Frame { from, data } => (from, data),
            other => panic!("expected frame, got {other:?}"),
        };
        assert_eq!(data, b"hello from client");
        assert!(matches!(from, Endpoint::Connection(_)));

        // --- Server replies on the same endpoint ---
        transport.send(&from, b"hello from server").await.expect("send");
        let msg = client.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), b"hello from server");

        transport.close().await.expect("close");
    }

    #[tokio::test]
    async fn test_stream_frames_from_one_peer_keep_order() {
        let (transport, addr) = bind_open().await;
        let mut client = connect_client(addr).await;

        for i in 0u8..20 {
            client.send(Message::Binary(vec![i].into())).await.unwrap();
        }
        for i in 0u8..20 {
            match recv_within(&transport).await {
                Incoming::Frame { data, .. } => assert_eq!(data, vec![i]),
                other => panic!("expected frame, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_stream_client_close_reports_closed_endpoint() {
        let (transport, addr) = bind_open().await;
        let mut client = connect_client(addr).await;

        client.send(Message::Binary(b"hi".to_vec().into())).await.unwrap();
        let from = match recv_within(&transport).await {
            Incoming::Frame { from, .. } => from,
            other => panic!("expected frame, got {other:?}"),
        };

        client.send(Message::Close(None)).await.unwrap();

        assert_eq!(recv_within(&transport).await, Incoming::Closed { endpoint: from });
        assert_eq!(transport.connection_count().await, 0);

        let result = transport.send(&from, b"late").await;
        assert!(matches!(result, Err(TransportError::ConnectionClosed(_))));
    }

    #[tokio::test]
    async fn test_stream_close_unblocks_pending_recv() {
        let (transport, _addr) = bind_open().await;
        let transport = std::sync::Arc::new(transport);

        let pending = {
            let transport = std::sync::Arc::clone(&transport);
            tokio::spawn(async move { transport.recv().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        transport.close().await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("recv should unblock within 1s")
            .unwrap();
        assert!(matches!(result, Err(TransportError::Shutdown)));
    }

    #[tokio::test]
    async fn test_stream_send_to_address_endpoint_is_unsupported() {
        let (transport, _addr) = bind_open().await;
        let to = Endpoint::Addr("127.0.0.1:9".parse().unwrap());
        let result = transport.send(&to, b"x").await;
        assert!(matches!(result, Err(TransportError::UnsupportedEndpoint(_))));
    }

    #[tokio::test]
    async fn test_stream_send_to_stalled_peer_fails_and_drops_it() {
        let (transport, addr) = bind_open().await;
        let mut stalled = connect_client(addr).await;
        let mut reader = connect_client(addr).await;

        stalled.send(Message::Binary(b"stalled".to_vec().into())).await.unwrap();
        let stalled_at = match recv_within(&transport).await {
            Incoming::Frame { from, .. } => from,
            other => panic!("expected frame, got {other:?}"),
        };
        reader.send(Message::Binary(b"reader".to_vec().into())).await.unwrap();
        let reader_at = match recv_within(&transport).await {
            Incoming::Frame { from, .. } => from,
            other => panic!("expected frame, got {other:?}"),
        };

        // The stalled client never reads, so its queue fills up.
        let big = vec![7u8; 1024 * 1024];
        let mut failure = None;
        for _ in 0..1000 {
            let queued = tokio::time::timeout(Duration::from_secs(1), transport.send(&stalled_at, &big))
                .await
                .expect("send must not wait on the socket");
            if let Err(e) = queued {
                failure = Some(e);
                break;
            }
        }
        assert!(matches!(failure, Some(TransportError::SendFailed(_))));
        assert_eq!(recv_within(&transport).await, Incoming::Closed { endpoint: stalled_at });

        // Other peers are unaffected.
        transport.send(&reader_at, b"still here").await.expect("send");
        let msg = tokio::time::timeout(Duration::from_secs(2), reader.next())
            .await
            .expect("reader should get its frame")
            .unwrap()
            .unwrap();
        assert_eq!(msg.into_data().as_ref(), b"still here");

        tokio::time::timeout(Duration::from_secs(2), transport.close())
            .await
            .expect("close should not hang on the stalled peer")
            .unwrap();
    }
}
