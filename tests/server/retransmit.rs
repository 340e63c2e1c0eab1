use crate::common::{drain, split_records, TestClient, WireRecord, TEST_IDENTITY, TEST_PSK};
use dpsk::{Config, Error, Server, StaticPsk};
use std::sync::Arc;
use std::time::Instant;

fn config() -> Arc<Config> {
    let config = Config::builder()
        .psk_identity_hint(b"cyassl server".to_vec())
        .rng_seed(7)
        .build()
        .expect("config");
    Arc::new(config)
}

/// Drive the handshake up to the server's hello flight and return the
/// records it sent.
fn reach_server_flight(server: &mut Server, client: &mut TestClient, now: Instant) -> Vec<WireRecord> {
    server
        .handle_packet(&client.client_hello_datagram())
        .unwrap();
    client.absorb(&drain(server, now).packets);

    server
        .handle_packet(&client.client_hello_datagram())
        .unwrap();
    let out = drain(server, now);
    client.absorb(&out.packets);
    out.packets.iter().flat_map(|p| split_records(p)).collect()
}

#[test]
fn resends_flight_on_timeout() {
    let mut server = Server::new(config(), Box::new(StaticPsk::new(TEST_PSK.to_vec())));
    let mut client = TestClient::new(TEST_IDENTITY, TEST_PSK);
    let now = Instant::now();

    let first = reach_server_flight(&mut server, &mut client, now);
    assert!(!first.is_empty());

    // The client's next flight never arrives; the timer fires.
    let at = drain(&mut server, now).next_timeout;
    server.handle_timeout(at).unwrap();
    let out = drain(&mut server, at);
    let resent: Vec<WireRecord> = out.packets.iter().flat_map(|p| split_records(p)).collect();

    // Same flight, same handshake bytes, fresh record sequence numbers.
    assert_eq!(resent.len(), first.len());
    for (a, b) in first.iter().zip(&resent) {
        assert_eq!(a.content_type, b.content_type);
        assert_eq!(a.epoch, b.epoch);
        assert_eq!(a.fragment, b.fragment);
        assert!(b.sequence_number > a.sequence_number);
    }
}

#[test]
fn gives_up_after_flight_retries() {
    let mut server = Server::new(config(), Box::new(StaticPsk::new(TEST_PSK.to_vec())));
    let mut client = TestClient::new(TEST_IDENTITY, TEST_PSK);
    let now = Instant::now();

    reach_server_flight(&mut server, &mut client, now);

    let mut at = drain(&mut server, now).next_timeout;
    let mut result = Ok(());
    for _ in 0..16 {
        result = server.handle_timeout(at);
        if result.is_err() {
            break;
        }
        at = drain(&mut server, at).next_timeout;
    }

    assert!(matches!(result, Err(Error::Timeout(_))));
}

#[test]
fn duplicate_client_hello_triggers_resend() {
    let mut server = Server::new(config(), Box::new(StaticPsk::new(TEST_PSK.to_vec())));
    let mut client = TestClient::new(TEST_IDENTITY, TEST_PSK);
    let now = Instant::now();

    server
        .handle_packet(&client.client_hello_datagram())
        .unwrap();
    client.absorb(&drain(&mut server, now).packets);

    let hello = client.client_hello_datagram();
    server.handle_packet(&hello).unwrap();
    let first = drain(&mut server, now);
    assert!(!first.packets.is_empty());

    // The same hello again means the client never saw our flight.
    server.handle_packet(&hello).unwrap();
    let again = drain(&mut server, now);

    let first: Vec<WireRecord> = first.packets.iter().flat_map(|p| split_records(p)).collect();
    let again: Vec<WireRecord> = again.packets.iter().flat_map(|p| split_records(p)).collect();
    assert_eq!(first.len(), again.len());
    for (a, b) in first.iter().zip(&again) {
        assert_eq!(a.content_type, b.content_type);
        assert_eq!(a.fragment, b.fragment);
    }
}

#[test]
fn duplicate_client_flight_resends_change_cipher_spec_and_finished() {
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

    let flight5 = client.flight5_datagram();
    server.handle_packet(&flight5).unwrap();
    let out = drain(&mut server, now);
    assert!(out.connected);
    client.absorb(&out.packets);

    // The client retransmits its whole flight; the replayed Finished record
    // is silently dropped, the duplicate ClientKeyExchange makes the server
    // repeat ChangeCipherSpec + Finished.
    server.handle_packet(&flight5).unwrap();
    let out = drain(&mut server, now);
    let records: Vec<WireRecord> = out.packets.iter().flat_map(|p| split_records(p)).collect();

    assert!(records.iter().any(|r| r.content_type == 20 && r.epoch == 0));
    assert!(records.iter().any(|r| r.content_type == 22 && r.epoch == 1));

    // The resent Finished decrypts and verifies like the original.
    client.absorb(&out.packets);
    assert!(client.server_finished_verified);
}
