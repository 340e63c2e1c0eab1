use crate::common::{connect, drain, TestClient, TEST_IDENTITY, TEST_PSK};
use dpsk::message::PskCipherSuite;
use dpsk::{Config, Server, StaticPsk};
use std::sync::Arc;
use std::time::Instant;

fn dhe_config() -> Arc<Config> {
    let config = Config::builder()
        .psk_identity_hint(b"cyassl server".to_vec())
        .rng_seed(42)
        .build()
        .expect("config");
    Arc::new(config)
}

#[test]
fn full_dhe_psk_handshake() {
    let mut server = Server::new(dhe_config(), Box::new(StaticPsk::new(TEST_PSK.to_vec())));
    let mut client = TestClient::new(TEST_IDENTITY, TEST_PSK);
    let now = Instant::now();

    // Flight 1: ClientHello without a cookie only buys a HelloVerifyRequest.
    server
        .handle_packet(&client.client_hello_datagram())
        .unwrap();
    let out = drain(&mut server, now);
    client.absorb(&out.packets);
    assert!(client.cookie.is_some());
    assert!(!server.is_connected());

    // Flight 3: with the cookie the server commits to its flight.
    server
        .handle_packet(&client.client_hello_datagram())
        .unwrap();
    let out = drain(&mut server, now);
    client.absorb(&out.packets);
    assert_eq!(client.suite, Some(PskCipherSuite::DHE_PSK_AES128_CBC_SHA256));
    assert_eq!(client.hint.as_deref(), Some(&b"cyassl server"[..]));
    assert!(client.dh_params.is_some());
    assert!(!server.is_connected());

    // Flight 5: key exchange and Finished complete the handshake.
    server.handle_packet(&client.flight5_datagram()).unwrap();
    let out = drain(&mut server, now);
    assert!(out.connected);
    assert!(server.is_connected());
    client.absorb(&out.packets);
    assert!(client.server_finished_verified);
}

#[test]
fn plain_psk_handshake() {
    let config = Config::builder()
        .cipher_suites(vec![PskCipherSuite::PSK_AES128_CBC_SHA256])
        .psk_identity_hint(b"cyassl server".to_vec())
        .build()
        .expect("config");
    let (server, client) = connect(Arc::new(config));

    assert!(server.is_connected());
    assert_eq!(client.suite, Some(PskCipherSuite::PSK_AES128_CBC_SHA256));
    // Plain PSK with a hint still gets a ServerKeyExchange, but no DH params.
    assert_eq!(client.hint.as_deref(), Some(&b"cyassl server"[..]));
    assert!(client.dh_params.is_none());
}

#[test]
fn plain_psk_without_hint_skips_server_key_exchange() {
    let config = Config::builder()
        .cipher_suites(vec![PskCipherSuite::PSK_AES128_CBC_SHA256])
        .build()
        .expect("config");
    let (server, client) = connect(Arc::new(config));

    assert!(server.is_connected());
    assert!(client.hint.is_none());
    assert!(client.dh_params.is_none());
}

#[test]
fn exchanges_application_data() {
    let (mut server, mut client) = connect(dhe_config());
    let now = Instant::now();

    server
        .handle_packet(&client.app_data_datagram(b"hello from the client"))
        .unwrap();
    let out = drain(&mut server, now);
    assert_eq!(out.app_data, vec![b"hello from the client".to_vec()]);

    let reply: &[u8] = b"Hello, this is the wolfSSL C# wrapper";
    server.send_application_data(reply).unwrap();
    let out = drain(&mut server, now);
    client.absorb(&out.packets);
    assert_eq!(client.server_app_data, vec![reply.to_vec()]);
}

#[test]
fn reassembles_reordered_client_hello_fragments() {
    let mut server = Server::new(dhe_config(), Box::new(StaticPsk::new(TEST_PSK.to_vec())));
    let mut client = TestClient::new(TEST_IDENTITY, TEST_PSK);
    let now = Instant::now();

    // Cookie round with a whole hello.
    server
        .handle_packet(&client.client_hello_datagram())
        .unwrap();
    client.absorb(&drain(&mut server, now).packets);
    assert!(client.cookie.is_some());

    // The second hello split over two datagrams, tail delivered first.
    let (head, tail) = client.client_hello_fragment_datagrams(20);
    server.handle_packet(&tail).unwrap();
    assert!(
        drain(&mut server, now).packets.is_empty(),
        "flight sent before the hello was complete"
    );

    server.handle_packet(&head).unwrap();
    client.absorb(&drain(&mut server, now).packets);
    assert_eq!(client.suite, Some(PskCipherSuite::DHE_PSK_AES128_CBC_SHA256));

    server.handle_packet(&client.flight5_datagram()).unwrap();
    let out = drain(&mut server, now);
    assert!(out.connected);
    client.absorb(&out.packets);
    assert!(client.server_finished_verified);
}

#[test]
fn fragments_server_flight_over_small_mtu() {
    // ServerKeyExchange with a 2048-bit group cannot fit in 120 bytes, so
    // the server must fragment and the client must reassemble.
    let config = Config::builder()
        .mtu(120)
        .psk_identity_hint(b"cyassl server".to_vec())
        .build()
        .expect("config");
    let (server, client) = connect(Arc::new(config));

    assert!(server.is_connected());
    assert!(client.server_finished_verified);
    assert!(client.dh_params.is_some());
}

#[test]
fn cannot_send_application_data_before_connected() {
    let mut server = Server::new(dhe_config(), Box::new(StaticPsk::new(TEST_PSK.to_vec())));
    assert!(server.send_application_data(b"too early").is_err());
}
