//! TLS failures surface as connect errors.

use std::sync::Arc;

use amqp_connect::transport::DefaultPorts;
use amqp_connect::{ConnectionFactory, Error};
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::net::TcpListener;

fn tls_config() -> Arc<rustls::ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(rustls::RootCertStore::empty())
        .with_no_client_auth();
    Arc::new(config)
}

fn factory_for(listener: &TcpListener) -> ConnectionFactory {
    let port = listener.local_addr().unwrap().port();
    ConnectionFactory::builder()
        .with_ports(DefaultPorts {
            secure: port,
            ..Default::default()
        })
        .with_tls(tls_config())
        .build()
}

#[tokio::test]
async fn plaintext_peer_fails_tls_handshake() {
    let _ = tracing_subscriber::fmt::try_init();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let factory = factory_for(&listener);

    let peer = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut hello = [0u8; 16];
        let _ = stream.read(&mut hello).await;
        // Answer the client hello with a plain protocol header.
        let _ = stream.write_all(b"AMQP\x00\x01\x00\x00").await;
        let _ = stream.shutdown().await;
    });

    let err = factory.open_connection("amqps://localhost").await.unwrap_err();
    assert!(matches!(err, Error::Connect(_)), "{err:?}");
    peer.await.unwrap();
}

#[tokio::test]
async fn peer_hangs_up_during_tls_handshake() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let factory = factory_for(&listener);

    let peer = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
    });

    let err = factory.open_connection("amqps://localhost").await.unwrap_err();
    assert!(matches!(err, Error::Connect(_)), "{err:?}");
    peer.await.unwrap();
}
