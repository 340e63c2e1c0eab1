//! A minimal in-test DTLS 1.2 PSK client.
//!
//! It speaks the real wire format and derives real keys, so the server is
//! exercised end to end: cookie round, key exchange, Finished verification
//! and protected application data.

use dpsk::buffer::Buf;
use dpsk::crypto::{
    master_secret, premaster_secret, prf_tls12, CbcAes128Sha256, DhDomainParams, DhKeyExchange,
    KeyBlock, MacHeader, CBC_EXPLICIT_IV_LEN,
};
use dpsk::message::{
    CipherSuiteVec, ClientHello, ClientKeyExchange, CompressionMethod, CompressionMethodVec,
    ContentType, Cookie, Finished, HelloVerifyRequest, KeyExchangeAlgorithm, ProtocolVersion,
    PskCipherSuite, Random, Sequence, ServerDhParams, ServerHello, ServerKeyExchange, SessionId,
};
use dpsk::{Config, Output, Server, StaticPsk};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;

pub const TEST_PSK: &[u8] = &[26, 43, 60, 77];
pub const TEST_IDENTITY: &[u8] = b"Client_identity";

/// Everything one poll loop produced, up to the final Timeout.
pub struct Drained {
    pub packets: Vec<Vec<u8>>,
    pub app_data: Vec<Vec<u8>>,
    pub connected: bool,
    pub next_timeout: Instant,
}

pub fn drain(server: &mut Server, now: Instant) -> Drained {
    let mut out = Drained {
        packets: Vec::new(),
        app_data: Vec::new(),
        connected: false,
        next_timeout: now,
    };
    let mut buffer = vec![0u8; 2048];

    loop {
        match server.poll_output(&mut buffer, now) {
            Output::Packet(data) => out.packets.push(data.to_vec()),
            Output::ApplicationData(data) => out.app_data.push(data.to_vec()),
            Output::Connected => out.connected = true,
            Output::Timeout(at) => {
                out.next_timeout = at;
                return out;
            }
        }
    }
}

/// One record as it appeared on the wire.
pub struct WireRecord {
    pub content_type: u8,
    pub epoch: u16,
    pub sequence_number: u64,
    pub fragment: Vec<u8>,
}

pub fn split_records(datagram: &[u8]) -> Vec<WireRecord> {
    let mut out = Vec::new();
    let mut input = datagram;

    while !input.is_empty() {
        assert!(input.len() >= 13, "truncated record header");
        let length = u16::from_be_bytes([input[11], input[12]]) as usize;
        let mut seq = [0u8; 8];
        seq[2..].copy_from_slice(&input[5..11]);

        out.push(WireRecord {
            content_type: input[0],
            epoch: u16::from_be_bytes([input[3], input[4]]),
            sequence_number: u64::from_be_bytes(seq),
            fragment: input[13..13 + length].to_vec(),
        });
        input = &input[13 + length..];
    }

    out
}

fn be_u24(bytes: &[u8]) -> usize {
    ((bytes[0] as usize) << 16) | ((bytes[1] as usize) << 8) | bytes[2] as usize
}

fn record(content_type: u8, epoch: u16, seq: u64, fragment: &[u8]) -> Vec<u8> {
    let mut out = vec![content_type, 0xfe, 0xfd];
    out.extend_from_slice(&epoch.to_be_bytes());
    out.extend_from_slice(&seq.to_be_bytes()[2..]);
    out.extend_from_slice(&(fragment.len() as u16).to_be_bytes());
    out.extend_from_slice(fragment);
    out
}

fn handshake_fragment(
    msg_type: u8,
    message_seq: u16,
    total_len: usize,
    offset: usize,
    data: &[u8],
) -> Vec<u8> {
    let mut out = vec![msg_type];
    out.extend_from_slice(&(total_len as u32).to_be_bytes()[1..]);
    out.extend_from_slice(&message_seq.to_be_bytes());
    out.extend_from_slice(&(offset as u32).to_be_bytes()[1..]);
    out.extend_from_slice(&(data.len() as u32).to_be_bytes()[1..]);
    out.extend_from_slice(data);
    out
}

fn handshake_message(msg_type: u8, message_seq: u16, body: &[u8]) -> Vec<u8> {
    handshake_fragment(msg_type, message_seq, body.len(), 0, body)
}

fn transcript_hash(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

struct Partial {
    msg_type: u8,
    message_seq: u16,
    length: usize,
    data: Vec<u8>,
}

pub struct TestClient {
    identity: Vec<u8>,
    psk: Vec<u8>,
    offered: Vec<PskCipherSuite>,
    pub client_version: ProtocolVersion,
    random: Random,
    pub cookie: Option<Cookie>,
    pub suite: Option<PskCipherSuite>,
    pub hint: Option<Vec<u8>>,
    pub dh_params: Option<ServerDhParams>,
    server_random: Option<[u8; 32]>,
    transcript: Vec<u8>,
    partial: Option<Partial>,
    epoch0_seq: u64,
    epoch1_seq: u64,
    master: Option<[u8; 48]>,
    keys: Option<KeyBlock>,
    pub server_finished_verified: bool,
    pub server_app_data: Vec<Vec<u8>>,
    pub alerts: Vec<(u8, u8)>,
}

impl TestClient {
    pub fn new(identity: &[u8], psk: &[u8]) -> TestClient {
        let _ = env_logger::builder().is_test(true).try_init();
        TestClient {
            identity: identity.to_vec(),
            psk: psk.to_vec(),
            offered: vec![
                PskCipherSuite::DHE_PSK_AES128_CBC_SHA256,
                PskCipherSuite::PSK_AES128_CBC_SHA256,
            ],
            client_version: ProtocolVersion::DTLS1_2,
            random: Random {
                gmt_unix_time: 0x5eed_0001,
                random_bytes: [7; 28],
            },
            cookie: None,
            suite: None,
            hint: None,
            dh_params: None,
            server_random: None,
            transcript: Vec::new(),
            partial: None,
            epoch0_seq: 0,
            epoch1_seq: 0,
            master: None,
            keys: None,
            server_finished_verified: false,
            server_app_data: Vec::new(),
            alerts: Vec::new(),
        }
    }

    pub fn with_suites(mut self, suites: Vec<PskCipherSuite>) -> TestClient {
        self.offered = suites;
        self
    }

    /// ClientHello, first without a cookie, then echoing the one from the
    /// HelloVerifyRequest.
    pub fn client_hello_datagram(&mut self) -> Vec<u8> {
        let message_seq = if self.cookie.is_some() { 1 } else { 0 };
        self.client_hello_with_seq(message_seq)
    }

    pub fn client_hello_with_seq(&mut self, message_seq: u16) -> Vec<u8> {
        let body = self.client_hello_body();
        let message = handshake_message(1, message_seq, &body);

        // Only the post-cookie hello enters the transcript.
        if self.cookie.is_some() {
            self.transcript.clear();
            self.transcript.extend_from_slice(&message);
        }

        let datagram = record(22, 0, self.epoch0_seq, &message);
        self.epoch0_seq += 1;
        datagram
    }

    /// The current ClientHello split at `split_at`, one handshake fragment
    /// per datagram. Deliver them in any order.
    pub fn client_hello_fragment_datagrams(&mut self, split_at: usize) -> (Vec<u8>, Vec<u8>) {
        let message_seq = if self.cookie.is_some() { 1 } else { 0 };
        let body = self.client_hello_body();
        assert!(split_at > 0 && split_at < body.len(), "bad split point");

        // The transcript always carries the whole reassembled message.
        if self.cookie.is_some() {
            let message = handshake_message(1, message_seq, &body);
            self.transcript.clear();
            self.transcript.extend_from_slice(&message);
        }

        let head = handshake_fragment(1, message_seq, body.len(), 0, &body[..split_at]);
        let tail = handshake_fragment(1, message_seq, body.len(), split_at, &body[split_at..]);

        let first = record(22, 0, self.epoch0_seq, &head);
        self.epoch0_seq += 1;
        let second = record(22, 0, self.epoch0_seq, &tail);
        self.epoch0_seq += 1;
        (first, second)
    }

    fn client_hello_body(&self) -> Buf {
        let mut cipher_suites = CipherSuiteVec::new();
        for suite in &self.offered {
            cipher_suites.push(*suite);
        }
        let mut compression_methods = CompressionMethodVec::new();
        compression_methods.push(CompressionMethod::Null);

        let hello = ClientHello {
            client_version: self.client_version,
            random: self.random,
            session_id: SessionId::empty(),
            cookie: self.cookie.unwrap_or_else(Cookie::empty),
            cipher_suites,
            compression_methods,
        };
        let mut body = Buf::new();
        hello.serialize(&mut body);
        body
    }

    /// ClientKeyExchange + ChangeCipherSpec + encrypted Finished, as one
    /// datagram.
    pub fn flight5_datagram(&mut self) -> Vec<u8> {
        let suite = self.suite.expect("no negotiated suite");
        let (other, dh_public) = match suite.key_exchange_algorithm() {
            KeyExchangeAlgorithm::DhePsk => {
                let params = self.dh_params.as_ref().expect("no ServerDHParams");
                let domain = DhDomainParams::new(params.p.clone(), params.g.clone());
                let mut kx = DhKeyExchange::new(&domain);
                let yc = kx.public_key();
                let z = kx.compute_shared_secret(&params.ys).expect("shared secret");
                (z.to_vec(), Some(yc))
            }
            KeyExchangeAlgorithm::Psk => (vec![0; self.psk.len()], None),
            KeyExchangeAlgorithm::Unknown => panic!("negotiated unknown suite"),
        };

        let client_random = self.random.to_bytes();
        let server_random = self.server_random.expect("no server random");
        let premaster = premaster_secret(&other, &self.psk);
        let master =
            master_secret(&premaster, &client_random, &server_random).expect("master secret");
        let keys =
            KeyBlock::derive(&master[..], &client_random, &server_random).expect("key block");
        self.master = Some(*master);
        self.keys = Some(keys);

        let cke = ClientKeyExchange {
            identity: self.identity.clone(),
            dh_public,
        };
        let mut body = Buf::new();
        cke.serialize(&mut body);
        let message = handshake_message(16, 2, &body);
        self.transcript.extend_from_slice(&message);

        let mut datagram = record(22, 0, self.epoch0_seq, &message);
        self.epoch0_seq += 1;

        datagram.extend_from_slice(&record(20, 0, self.epoch0_seq, &[1]));
        self.epoch0_seq += 1;

        let verify = prf_tls12(
            &master[..],
            b"client finished",
            &transcript_hash(&self.transcript),
            12,
        )
        .expect("client verify_data");
        let mut verify_data = [0; 12];
        verify_data.copy_from_slice(&verify);

        let mut fin_body = Buf::new();
        Finished { verify_data }.serialize(&mut fin_body);
        let message = handshake_message(20, 3, &fin_body);
        self.transcript.extend_from_slice(&message);

        let sealed = self.seal(22, &message);
        datagram.extend_from_slice(&record(22, 1, self.epoch1_seq, &sealed));
        self.epoch1_seq += 1;
        datagram
    }

    /// A ClientKeyExchange with an attacker-chosen DH public value.
    pub fn cke_datagram_with_yc(&mut self, yc: Vec<u8>) -> Vec<u8> {
        let cke = ClientKeyExchange {
            identity: self.identity.clone(),
            dh_public: Some(yc),
        };
        let mut body = Buf::new();
        cke.serialize(&mut body);
        let message = handshake_message(16, 2, &body);

        let datagram = record(22, 0, self.epoch0_seq, &message);
        self.epoch0_seq += 1;
        datagram
    }

    pub fn app_data_datagram(&mut self, data: &[u8]) -> Vec<u8> {
        let sealed = self.seal(23, data);
        let datagram = record(23, 1, self.epoch1_seq, &sealed);
        self.epoch1_seq += 1;
        datagram
    }

    fn seal(&mut self, content_type: u8, plaintext: &[u8]) -> Vec<u8> {
        let keys = self.keys.as_ref().expect("sealing before keys derived");
        let cipher = CbcAes128Sha256::new(keys.client_write_key, keys.client_write_mac);
        let header = MacHeader::new(
            ContentType::from_u8(content_type),
            Sequence {
                epoch: 1,
                sequence_number: self.epoch1_seq,
            },
            plaintext.len() as u16,
        );

        let mut iv = [0x42u8; 16];
        iv[..8].copy_from_slice(&self.epoch1_seq.to_be_bytes());

        let mut fragment = Buf::from_slice(plaintext);
        cipher.seal(header, iv, &mut fragment).expect("seal");
        fragment.to_vec()
    }

    /// Consume server datagrams: parse flights, decrypt protected records,
    /// verify the server Finished.
    pub fn absorb(&mut self, packets: &[Vec<u8>]) {
        for packet in packets {
            for rec in split_records(packet) {
                if rec.epoch == 0 {
                    match rec.content_type {
                        22 => self.absorb_handshake_fragment(&rec.fragment),
                        21 => self.alerts.push((rec.fragment[0], rec.fragment[1])),
                        _ => {}
                    }
                    continue;
                }

                let keys = self.keys.as_ref().expect("protected record before keys");
                let cipher = CbcAes128Sha256::new(keys.server_write_key, keys.server_write_mac);
                let mut fragment = rec.fragment.clone();
                let len = cipher
                    .open(
                        ContentType::from_u8(rec.content_type),
                        Sequence {
                            epoch: rec.epoch,
                            sequence_number: rec.sequence_number,
                        },
                        &mut fragment,
                    )
                    .expect("open server record");
                let plaintext = fragment[CBC_EXPLICIT_IV_LEN..CBC_EXPLICIT_IV_LEN + len].to_vec();

                match rec.content_type {
                    22 => self.absorb_handshake_fragment(&plaintext),
                    23 => self.server_app_data.push(plaintext),
                    21 => self.alerts.push((plaintext[0], plaintext[1])),
                    _ => {}
                }
            }
        }
    }

    fn absorb_handshake_fragment(&mut self, fragment: &[u8]) {
        let mut input = fragment;
        while !input.is_empty() {
            assert!(input.len() >= 12, "truncated handshake header");
            let msg_type = input[0];
            let length = be_u24(&input[1..4]);
            let message_seq = u16::from_be_bytes([input[4], input[5]]);
            let fragment_offset = be_u24(&input[6..9]);
            let fragment_length = be_u24(&input[9..12]);
            let data = &input[12..12 + fragment_length];
            input = &input[12 + fragment_length..];

            match &mut self.partial {
                Some(partial) if partial.msg_type == msg_type => {
                    assert_eq!(fragment_offset, partial.data.len(), "fragment gap");
                    partial.data.extend_from_slice(data);
                }
                _ => {
                    assert_eq!(fragment_offset, 0, "first fragment not at offset 0");
                    self.partial = Some(Partial {
                        msg_type,
                        message_seq,
                        length,
                        data: data.to_vec(),
                    });
                }
            }

            let complete = self
                .partial
                .as_ref()
                .map(|p| p.data.len() >= p.length)
                .unwrap_or(false);
            if complete {
                let partial = self.partial.take().expect("partial just checked");
                self.on_message(partial.msg_type, partial.message_seq, &partial.data);
            }
        }
    }

    fn on_message(&mut self, msg_type: u8, message_seq: u16, body: &[u8]) {
        let canonical = handshake_message(msg_type, message_seq, body);
        match msg_type {
            3 => {
                let (_, hvr) = HelloVerifyRequest::parse(body).expect("HelloVerifyRequest");
                self.cookie = Some(hvr.cookie);
            }
            2 => {
                let (_, hello) = ServerHello::parse(body).expect("ServerHello");
                self.suite = Some(hello.cipher_suite);
                self.server_random = Some(hello.random.to_bytes());
                self.transcript.extend_from_slice(&canonical);
            }
            12 => {
                let suite = self.suite.expect("ServerKeyExchange before ServerHello");
                let (_, ske) = ServerKeyExchange::parse(body, suite.key_exchange_algorithm())
                    .expect("ServerKeyExchange");
                self.hint = Some(ske.identity_hint);
                self.dh_params = ske.params;
                self.transcript.extend_from_slice(&canonical);
            }
            14 => {
                self.transcript.extend_from_slice(&canonical);
            }
            20 => {
                let suite = self.suite.expect("Finished before ServerHello");
                let (_, finished) = Finished::parse(body, suite).expect("Finished");
                let master = self.master.expect("Finished before key derivation");
                let expected = prf_tls12(
                    &master,
                    b"server finished",
                    &transcript_hash(&self.transcript),
                    12,
                )
                .expect("server verify_data");
                assert_eq!(&finished.verify_data[..], &expected[..]);
                self.server_finished_verified = true;
            }
            other => panic!("unexpected handshake message type {}", other),
        }
    }
}

/// Run the whole handshake against a fresh server with the default test
/// identity and key.
pub fn connect(config: Arc<Config>) -> (Server, TestClient) {
    let mut server = Server::new(config, Box::new(StaticPsk::new(TEST_PSK.to_vec())));
    let mut client = TestClient::new(TEST_IDENTITY, TEST_PSK);
    let now = Instant::now();

    server
        .handle_packet(&client.client_hello_datagram())
        .expect("first ClientHello");
    client.absorb(&drain(&mut server, now).packets);
    assert!(client.cookie.is_some(), "no HelloVerifyRequest cookie");

    server
        .handle_packet(&client.client_hello_datagram())
        .expect("second ClientHello");
    client.absorb(&drain(&mut server, now).packets);

    server
        .handle_packet(&client.flight5_datagram())
        .expect("client key exchange flight");
    let out = drain(&mut server, now);
    assert!(out.connected, "no Connected event");
    client.absorb(&out.packets);
    assert!(client.server_finished_verified);

    (server, client)
}
