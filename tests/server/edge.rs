use crate::common::{connect, drain, split_records, TestClient, TEST_IDENTITY, TEST_PSK};
use dpsk::message::{ProtocolVersion, PskCipherSuite};
use dpsk::{Config, Error, PskStore, Server, StaticPsk};
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

fn config() -> Arc<Config> {
    let config = Config::builder()
        .psk_identity_hint(b"cyassl server".to_vec())
        .build()
        .expect("config");
    Arc::new(config)
}

/// Rejects every identity, counting lookups.
struct Rejecting(Rc<Cell<usize>>);

impl PskStore for Rejecting {
    fn psk_for_identity(&mut self, _identity: &[u8], _key_out: &mut [u8]) -> usize {
        self.0.set(self.0.get() + 1);
        0
    }
}

/// Serves a fixed key, counting lookups.
struct Counting {
    key: Vec<u8>,
    calls: Rc<Cell<usize>>,
}

impl PskStore for Counting {
    fn psk_for_identity(&mut self, _identity: &[u8], key_out: &mut [u8]) -> usize {
        self.calls.set(self.calls.get() + 1);
        key_out[..self.key.len()].copy_from_slice(&self.key);
        self.key.len()
    }
}

#[test]
fn unknown_psk_identity_is_rejected() {
    let calls = Rc::new(Cell::new(0));
    let mut server = Server::new(config(), Box::new(Rejecting(Rc::clone(&calls))));
    let mut client = TestClient::new(b"nobody", TEST_PSK);
    let now = Instant::now();

    server
        .handle_packet(&client.client_hello_datagram())
        .unwrap();
    client.absorb(&drain(&mut server, now).packets);
    server
        .handle_packet(&client.client_hello_datagram())
        .unwrap();
    client.absorb(&drain(&mut server, now).packets);

    let err = server
        .handle_packet(&client.flight5_datagram())
        .unwrap_err();
    assert_eq!(err, Error::UnknownPskIdentity);
    assert_eq!(calls.get(), 1);

    // A fatal unknown_psk_identity alert goes out in the clear.
    client.absorb(&drain(&mut server, now).packets);
    assert_eq!(client.alerts, vec![(2, 115)]);
    assert!(!server.is_connected());
}

#[test]
fn resolver_is_consulted_once_per_handshake() {
    let calls = Rc::new(Cell::new(0));
    let store = Counting {
        key: TEST_PSK.to_vec(),
        calls: Rc::clone(&calls),
    };
    let mut server = Server::new(config(), Box::new(store));
    let mut client = TestClient::new(TEST_IDENTITY, TEST_PSK);
    let now = Instant::now();

    server
        .handle_packet(&client.client_hello_datagram())
        .unwrap();
    client.absorb(&drain(&mut server, now).packets);
    server
        .handle_packet(&client.client_hello_datagram())
        .unwrap();
    client.absorb(&drain(&mut server, now).packets);
    server.handle_packet(&client.flight5_datagram()).unwrap();
    let out = drain(&mut server, now);
    assert!(out.connected);

    assert_eq!(calls.get(), 1);
}

#[test]
fn no_common_cipher_suite_fails_the_handshake() {
    let config = Config::builder()
        .cipher_suites(vec![PskCipherSuite::DHE_PSK_AES128_CBC_SHA256])
        .build()
        .expect("config");
    let mut server = Server::new(Arc::new(config), Box::new(StaticPsk::new(TEST_PSK.to_vec())));
    let mut client = TestClient::new(TEST_IDENTITY, TEST_PSK)
        .with_suites(vec![PskCipherSuite::PSK_AES128_CBC_SHA256]);
    let now = Instant::now();

    // The stateless cookie round happens before suite selection.
    server
        .handle_packet(&client.client_hello_datagram())
        .unwrap();
    client.absorb(&drain(&mut server, now).packets);
    assert!(client.cookie.is_some());

    let err = server
        .handle_packet(&client.client_hello_datagram())
        .unwrap_err();
    assert!(matches!(err, Error::SecurityError(_)));

    // handshake_failure
    client.absorb(&drain(&mut server, now).packets);
    assert_eq!(client.alerts, vec![(2, 40)]);
}

#[test]
fn rejects_old_protocol_version() {
    let mut server = Server::new(config(), Box::new(StaticPsk::new(TEST_PSK.to_vec())));
    let mut client = TestClient::new(TEST_IDENTITY, TEST_PSK);
    client.client_version = ProtocolVersion::DTLS1_0;
    let now = Instant::now();

    let err = server
        .handle_packet(&client.client_hello_datagram())
        .unwrap_err();
    assert!(matches!(err, Error::SecurityError(_)));

    client.absorb(&drain(&mut server, now).packets);
    assert_eq!(client.alerts, vec![(2, 40)]);
}

#[test]
fn rejects_degenerate_client_dh_public() {
    let mut server = Server::new(config(), Box::new(StaticPsk::new(TEST_PSK.to_vec())));
    let mut client = TestClient::new(TEST_IDENTITY, TEST_PSK);
    let now = Instant::now();

    server
        .handle_packet(&client.client_hello_datagram())
        .unwrap();
    client.absorb(&drain(&mut server, now).packets);
    server
        .handle_packet(&client.client_hello_datagram())
        .unwrap();
    client.absorb(&drain(&mut server, now).packets);

    // Yc = 1 forces the shared secret to 1 and must be refused.
    let err = server
        .handle_packet(&client.cke_datagram_with_yc(vec![1]))
        .unwrap_err();
    assert!(matches!(err, Error::SecurityError(_)));

    // illegal_parameter
    client.absorb(&drain(&mut server, now).packets);
    assert_eq!(client.alerts, vec![(2, 47)]);
}

#[test]
fn oversized_application_data_is_refused() {
    let (mut server, mut client) = connect(config());
    let now = Instant::now();

    // Larger than the 16-bit record length field can even express.
    let err = server
        .send_application_data(&vec![0x61; 70_000])
        .unwrap_err();
    assert!(matches!(err, Error::PayloadTooLarge { .. }));
    assert!(drain(&mut server, now).packets.is_empty());

    // A payload at the limit fits a single record in a single datagram.
    let max = server.max_application_data_len();
    server.send_application_data(&vec![0x62; max]).unwrap();
    let out = drain(&mut server, now);
    assert_eq!(out.packets.len(), 1);
    assert_eq!(split_records(&out.packets[0]).len(), 1);
    client.absorb(&out.packets);
    assert_eq!(client.server_app_data, vec![vec![0x62; max]]);
}

#[test]
fn corrupt_record_is_dropped_silently() {
    let (mut server, mut client) = connect(config());
    let now = Instant::now();

    let mut datagram = client.app_data_datagram(b"genuine");
    let last = datagram.len() - 1;
    datagram[last] ^= 0x01;
    server.handle_packet(&datagram).unwrap();
    assert!(drain(&mut server, now).app_data.is_empty());

    // The session is unharmed.
    server
        .handle_packet(&client.app_data_datagram(b"still here"))
        .unwrap();
    assert_eq!(
        drain(&mut server, now).app_data,
        vec![b"still here".to_vec()]
    );
}

#[test]
fn replayed_record_is_dropped() {
    let (mut server, mut client) = connect(config());
    let now = Instant::now();

    let datagram = client.app_data_datagram(b"only once");
    server.handle_packet(&datagram).unwrap();
    assert_eq!(
        drain(&mut server, now).app_data,
        vec![b"only once".to_vec()]
    );

    server.handle_packet(&datagram).unwrap();
    assert!(drain(&mut server, now).app_data.is_empty());
}

#[test]
fn renegotiation_is_rejected() {
    let (mut server, mut client) = connect(config());

    // A fresh handshake attempt after completion is refused outright.
    let hello = client.client_hello_with_seq(4);
    assert_eq!(
        server.handle_packet(&hello),
        Err(Error::RenegotiationAttempt)
    );
}
