//! Session tests against snow's NK responder over the in-memory transport.
//!
//! Server and client run in the same task via `tokio::join!`, so the snow
//! state never crosses threads.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use snow::{Builder, Keypair, TransportState};
use tessel_client::transport::MemoryTransport;
use tessel_client::{
    memory_pair, Connector, ErrorKind, InboxSender, MemoryPeer, Session, SessionError,
    SessionOptions, TransportError,
};
use tessel_noise::{OsProvider, StaticPublicKey, MESSAGE_1_LEN, PROTOCOL_NAME};

const MAX_MSG: usize = 65535;

struct Server {
    keypair: Keypair,
}

impl Server {
    fn new() -> Self {
        let keypair = Builder::new(PROTOCOL_NAME.parse().unwrap())
            .generate_keypair()
            .unwrap();
        Self { keypair }
    }

    fn public_key(&self) -> StaticPublicKey {
        let bytes: [u8; 32] = self.keypair.public.as_slice().try_into().unwrap();
        StaticPublicKey::from_bytes(bytes).unwrap()
    }

    /// Answer one handshake on `peer`; returns the transport state and the
    /// handshake hash.
    async fn accept(&self, peer: &mut MemoryPeer, payload: &[u8]) -> (TransportState, Vec<u8>) {
        let mut responder = Builder::new(PROTOCOL_NAME.parse().unwrap())
            .local_private_key(&self.keypair.private)
            .build_responder()
            .unwrap();
        let mut buf = vec![0u8; MAX_MSG];

        let msg1 = peer.recv().await.expect("message 1");
        responder.read_message(&msg1, &mut buf).unwrap();
        let len = responder.write_message(payload, &mut buf).unwrap();
        peer.send(buf[..len].to_vec()).await.unwrap();

        let hash = responder.get_handshake_hash().to_vec();
        (responder.into_transport_mode().unwrap(), hash)
    }
}

fn seal(server: &mut TransportState, plaintext: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; MAX_MSG];
    let len = server.write_message(plaintext, &mut buf).unwrap();
    buf[..len].to_vec()
}

fn open(server: &mut TransportState, ciphertext: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; MAX_MSG];
    let len = server.read_message(ciphertext, &mut buf).unwrap();
    buf[..len].to_vec()
}

async fn establish(
    options: SessionOptions,
) -> (Session<MemoryTransport>, MemoryPeer, TransportState) {
    let server = Server::new();
    let key = server.public_key();
    let (connector, mut peer) = memory_pair(16);

    let (session, (transport, hash)) = tokio::join!(
        Session::connect(&connector, &key, &OsProvider, options),
        server.accept(&mut peer, b""),
    );
    let session = session.unwrap();
    assert_eq!(session.handshake_hash().as_slice(), hash.as_slice());

    (session, peer, transport)
}

#[tokio::test]
async fn test_ping_pong() {
    let (mut session, mut peer, mut server) = establish(SessionOptions::default()).await;

    let (response, ()) = tokio::join!(session.send_and_receive(b"ping"), async {
        let request = peer.recv().await.unwrap();
        assert_eq!(request.len(), 4 + 16);
        assert_eq!(open(&mut server, &request), b"ping");
        peer.send(seal(&mut server, b"pong")).await.unwrap();
    });

    assert_eq!(response.unwrap(), b"pong");
    session.close().await;
}

#[tokio::test]
async fn test_directions_are_independently_keyed() {
    let (mut session, mut peer, mut server) = establish(SessionOptions::default()).await;

    // Same plaintext at nonce 0 in both directions.
    let (response, (upstream, downstream)) = tokio::join!(session.send_and_receive(b"echo"), async {
        let upstream = peer.recv().await.unwrap();
        let echoed = open(&mut server, &upstream);
        let downstream = seal(&mut server, &echoed);
        peer.send(downstream.clone()).await.unwrap();
        (upstream, downstream)
    });

    assert_eq!(response.unwrap(), b"echo");
    assert_ne!(upstream, downstream);
}

#[tokio::test]
async fn test_responder_payload_and_many_round_trips() {
    let (mut session, mut peer, mut server) = establish(SessionOptions::default()).await;

    for i in 0..20u32 {
        let request = format!("req {i}");
        let (response, ()) = tokio::join!(session.send_and_receive(request.as_bytes()), async {
            let ct = peer.recv().await.unwrap();
            let body = open(&mut server, &ct);
            let mut reply = b"re: ".to_vec();
            reply.extend_from_slice(&body);
            peer.send(seal(&mut server, &reply)).await.unwrap();
        });
        assert_eq!(response.unwrap(), format!("re: req {i}").as_bytes());
    }
}

#[tokio::test]
async fn test_stream_ends_on_empty_sentinel() {
    let (mut session, mut peer, mut server) = establish(SessionOptions::default()).await;

    let (chunks, ()) = tokio::join!(
        async {
            let stream = session.send_and_stream(b"tell me").await.unwrap();
            stream.collect().await
        },
        async {
            let request = peer.recv().await.unwrap();
            assert_eq!(open(&mut server, &request), b"tell me");
            for chunk in [&b"Hel"[..], &b"lo, "[..], &b"world"[..], &b""[..]] {
                peer.send(seal(&mut server, chunk)).await.unwrap();
            }
        }
    );

    let chunks = chunks.unwrap();
    assert_eq!(chunks.len(), 3);
    assert!(chunks.iter().all(|c| !c.is_empty()));
    assert_eq!(chunks.concat(), b"Hello, world");
}

#[tokio::test]
async fn test_stream_ends_on_zero_length_frame() {
    let (mut session, mut peer, mut server) = establish(SessionOptions::default()).await;

    peer.send(seal(&mut server, b"only")).await.unwrap();
    peer.send(Vec::new()).await.unwrap();

    let mut stream = session.send_and_stream(b"go").await.unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap(), b"only");
    assert!(stream.next().await.is_none());
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_stream_adapter() {
    let (mut session, mut peer, mut server) = establish(SessionOptions::default()).await;

    for chunk in [&b"a"[..], &b"b"[..], &b""[..]] {
        peer.send(seal(&mut server, chunk)).await.unwrap();
    }

    let stream = session.send_and_stream(b"go").await.unwrap();
    let items: Vec<_> = stream.into_stream().collect().await;
    let chunks: Vec<Vec<u8>> = items.into_iter().map(Result::unwrap).collect();
    assert_eq!(chunks, vec![b"a".to_vec(), b"b".to_vec()]);
}

#[tokio::test]
async fn test_transport_close_mid_stream_is_graceful() {
    let (mut session, mut peer, mut server) = establish(SessionOptions::default()).await;

    peer.send(seal(&mut server, b"partial")).await.unwrap();
    peer.close();

    let chunks = session
        .send_and_stream(b"go")
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(chunks, vec![b"partial".to_vec()]);
}

#[tokio::test]
async fn test_tampered_chunk_aborts_stream() {
    let (mut session, mut peer, mut server) = establish(SessionOptions::default()).await;

    peer.send(seal(&mut server, b"good")).await.unwrap();
    let mut bad = seal(&mut server, b"evil");
    bad[0] ^= 0x01;
    peer.send(bad).await.unwrap();
    peer.send(seal(&mut server, b"never")).await.unwrap();

    let mut stream = session.send_and_stream(b"go").await.unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap(), b"good");

    let err = stream.next().await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_replayed_response_rejected() {
    let (mut session, mut peer, mut server) = establish(SessionOptions::default()).await;

    let response = seal(&mut server, b"once");
    peer.send(response.clone()).await.unwrap();
    peer.send(response).await.unwrap();

    assert_eq!(session.send_and_receive(b"1").await.unwrap(), b"once");
    let err = session.send_and_receive(b"2").await.unwrap_err();
    assert!(matches!(err, SessionError::Authentication(_)));
    assert_eq!(err.user_message(), "secure connection failed");
}

#[tokio::test]
async fn test_oversized_request_keeps_nonce() {
    let options = SessionOptions {
        max_message_size: 64,
        ..SessionOptions::default()
    };
    let (mut session, mut peer, mut server) = establish(options).await;

    let err = session.send_and_receive(&[0u8; 100]).await.unwrap_err();
    assert!(matches!(err, SessionError::MessageTooLarge { size: 116, max: 64 }));
    assert_eq!(err.kind(), ErrorKind::Misuse);

    // The rejected request consumed no nonce, so the server stays in step.
    peer.send(seal(&mut server, b"ok")).await.unwrap();
    assert_eq!(session.send_and_receive(b"small").await.unwrap(), b"ok");
    assert_eq!(open(&mut server, &peer.recv().await.unwrap()), b"small");
}

#[tokio::test]
async fn test_response_after_peer_hangup() {
    let (mut session, mut peer, _server) = establish(SessionOptions::default()).await;
    peer.close();

    let err = session.send_and_receive(b"anyone?").await.unwrap_err();
    assert!(matches!(err, SessionError::Transport(TransportError::Closed)));
}

#[tokio::test]
async fn test_close_is_idempotent_and_fails_fast() {
    let (mut session, mut peer, _server) = establish(SessionOptions::default()).await;

    session.close().await;
    session.close().await;
    assert!(session.is_closed());

    // Transport released.
    assert!(peer.recv().await.is_none());

    let err = session.send_and_receive(b"after").await.unwrap_err();
    assert!(matches!(err, SessionError::Closed));
    assert_eq!(err.kind(), ErrorKind::Misuse);
    assert!(matches!(
        session.send_and_stream(b"after").await,
        Err(SessionError::Closed)
    ));
}

#[tokio::test]
async fn test_close_handle_interrupts_pending_receive() {
    let (mut session, mut peer, _server) = establish(SessionOptions::default()).await;
    let handle = session.close_handle();

    let (result, ()) = tokio::join!(session.send_and_receive(b"hang"), async {
        peer.recv().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.close();
    });

    assert!(matches!(result, Err(SessionError::Closed)));
    assert!(session.is_closed());
    assert!(peer.recv().await.is_none());
}

#[tokio::test]
async fn test_close_handle_interrupts_stream() {
    let (mut session, mut peer, mut server) = establish(SessionOptions::default()).await;
    let handle = session.close_handle();
    peer.send(seal(&mut server, b"first")).await.unwrap();

    let mut stream = session.send_and_stream(b"go").await.unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap(), b"first");

    handle.close();
    assert!(matches!(stream.next().await, Some(Err(SessionError::Closed))));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_close_handle_while_idle() {
    let (mut session, _peer, _server) = establish(SessionOptions::default()).await;
    session.close_handle().close();

    assert!(matches!(
        session.send_and_receive(b"x").await,
        Err(SessionError::Closed)
    ));
}

struct NeverReady;

#[async_trait]
impl Connector for NeverReady {
    type Transport = MemoryTransport;

    async fn connect(&self, _inbox: InboxSender) -> Result<MemoryTransport, TransportError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_connect_timeout() {
    let options = SessionOptions {
        connect_timeout: Duration::from_millis(50),
        ..SessionOptions::default()
    };
    let key = Server::new().public_key();

    let err = Session::connect(&NeverReady, &key, &OsProvider, options)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Transport(TransportError::ConnectTimeout(_))
    ));
    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn test_non_responding_peer_sees_well_formed_message_1() {
    let server = Server::new();
    let key = server.public_key();
    let (connector, mut peer) = memory_pair(4);

    let (result, ()) = tokio::join!(
        Session::connect(&connector, &key, &OsProvider, SessionOptions::default()),
        async {
            let msg1 = peer.recv().await.unwrap();
            assert_eq!(msg1.len(), MESSAGE_1_LEN);
            assert_eq!(msg1.len(), 48);
            assert!(msg1[..32].iter().any(|&b| b != 0));
            peer.close();
        }
    );

    assert!(matches!(
        result,
        Err(SessionError::Transport(TransportError::ClosedDuringHandshake))
    ));
}

#[tokio::test]
async fn test_short_message_2_fails_and_closes_transport() {
    let server = Server::new();
    let key = server.public_key();
    let (connector, mut peer) = memory_pair(4);

    let (result, ()) = tokio::join!(
        Session::connect(&connector, &key, &OsProvider, SessionOptions::default()),
        async {
            peer.recv().await.unwrap();
            peer.send(vec![7u8; 10]).await.unwrap();
        }
    );

    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Handshake);
    assert!(peer.recv().await.is_none());
}

#[tokio::test]
async fn test_wrong_server_key_never_establishes() {
    let server = Server::new();
    let impostor = Server::new();
    let key = impostor.public_key();
    let (connector, mut peer) = memory_pair(4);

    // The client expects `impostor`, the responder holds `server`'s key.
    let (result, ()) = tokio::join!(
        Session::connect(&connector, &key, &OsProvider, SessionOptions::default()),
        async {
            let mut responder = Builder::new(PROTOCOL_NAME.parse().unwrap())
                .local_private_key(&server.keypair.private)
                .build_responder()
                .unwrap();
            let mut buf = vec![0u8; MAX_MSG];
            let msg1 = peer.recv().await.unwrap();
            assert!(responder.read_message(&msg1, &mut buf).is_err());
            peer.close();
        }
    );

    assert!(matches!(
        result,
        Err(SessionError::Transport(TransportError::ClosedDuringHandshake))
    ));
}

#[tokio::test]
async fn test_dropped_stream_poisons_session() {
    let (mut session, mut peer, mut server) = establish(SessionOptions::default()).await;

    for chunk in [&b"A-chunk-1"[..], &b"A-chunk-2"[..], &b""[..]] {
        peer.send(seal(&mut server, chunk)).await.unwrap();
    }

    {
        let mut stream = session.send_and_stream(b"A").await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), b"A-chunk-1");
    }
    assert_eq!(open(&mut server, &peer.recv().await.unwrap()), b"A");
    peer.send(seal(&mut server, b"B-response")).await.unwrap();

    // The leftover chunk must never surface as the answer to B.
    let err = session.send_and_receive(b"B").await.unwrap_err();
    assert!(matches!(err, SessionError::StreamAbandoned));
    assert_eq!(err.kind(), ErrorKind::Misuse);
    assert!(session.is_closed());
    assert!(peer.recv().await.is_none());

    assert!(matches!(
        session.send_and_receive(b"B").await,
        Err(SessionError::Closed)
    ));
}

#[tokio::test]
async fn test_finished_stream_leaves_session_usable() {
    let (mut session, mut peer, mut server) = establish(SessionOptions::default()).await;

    for chunk in [&b"one"[..], &b""[..]] {
        peer.send(seal(&mut server, chunk)).await.unwrap();
    }
    let chunks = session.send_and_stream(b"A").await.unwrap().collect().await.unwrap();
    assert_eq!(chunks, vec![b"one".to_vec()]);

    peer.send(seal(&mut server, b"two")).await.unwrap();
    assert_eq!(session.send_and_receive(b"B").await.unwrap(), b"two");
}

#[tokio::test]
async fn test_oversized_response_is_authentication_failure() {
    let (mut session, mut peer, _server) = establish(SessionOptions::default()).await;

    peer.send(vec![0u8; MAX_MSG + 1]).await.unwrap();

    let err = session.send_and_receive(b"q").await.unwrap_err();
    assert!(matches!(err, SessionError::Authentication(_)));
    assert_eq!(err.kind(), ErrorKind::Authentication);
}

#[tokio::test]
async fn test_cancelled_handshake_releases_transport() {
    let key = Server::new().public_key();
    let (connector, mut peer) = memory_pair(4);

    let connect = tokio::time::timeout(
        Duration::from_millis(50),
        Session::connect(&connector, &key, &OsProvider, SessionOptions::default()),
    );
    let (result, msg1) = tokio::join!(connect, async { peer.recv().await });

    // Message 1 arrived, message 2 never did.
    assert_eq!(msg1.unwrap().len(), MESSAGE_1_LEN);
    assert!(result.is_err());

    let released = tokio::time::timeout(Duration::from_secs(1), peer.recv()).await;
    assert_eq!(released.unwrap(), None);
}
