//! Server-side DTLS 1.2 PSK handshake.
//!
//! Message flow (RFC 6347 / RFC 4279):
//!
//! ```text
//! Client                                   Server
//! ------                                   ------
//! ClientHello          -------->
//!                      <--------   HelloVerifyRequest (cookie)
//! ClientHello (cookie) -------->
//!                      <--------          ServerHello
//!                                    ServerKeyExchange (hint, DH params)
//!                                      ServerHelloDone
//! ClientKeyExchange
//! ChangeCipherSpec
//! Finished             -------->
//!                      <--------     ChangeCipherSpec
//!                                             Finished
//! ApplicationData      <------->      ApplicationData
//! ```

use crate::buffer::Buf;
use crate::config::Config;
use crate::engine::Engine;
use crate::message::{
    Alert, AlertDescription, Body, CompressionMethod, ContentType, Cookie, Finished,
    HelloVerifyRequest, KeyExchangeAlgorithm, MessageType, ProtocolVersion, Random, ServerDhParams,
    ServerHello, ServerKeyExchange, SessionId,
};
use crate::psk::{PskStore, MAX_PSK_KEY_LEN};
use crate::{Error, Output};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Instant;
use zeroize::Zeroizing;

/// Bytes of HMAC output used for the stateless cookie.
const COOKIE_LEN: usize = 32;

/// A single-session DTLS 1.2 PSK server.
///
/// Sans-IO: feed received datagrams with [`Server::handle_packet`], drive
/// time with [`Server::handle_timeout`] and drain work with
/// [`Server::poll_output`] until it returns [`Output::Timeout`].
pub struct Server {
    engine: Engine,
    state: ServerState,
    psk_store: Box<dyn PskStore>,
    random: Random,
    session_id: SessionId,
    client_random: Option<[u8; 32]>,
    defragment_buffer: Buf,
    cookie_secret: [u8; 32],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerState {
    AwaitClientHello,
    SendServerFlight,
    AwaitClientKeyExchange,
    AwaitClientFinished,
    Running,
}

impl Server {
    pub fn new(config: Arc<Config>, psk_store: Box<dyn PskStore>) -> Server {
        let mut engine = Engine::new(config);
        let random = Random::generate(&mut engine.rng);
        let session_id_bytes: [u8; 32] = engine.rng.random();
        let session_id =
            SessionId::try_new(&session_id_bytes).unwrap_or_else(|_| SessionId::empty());

        // The cookie secret is never part of the deterministic (seeded)
        // state; cookies only need to be consistent within this instance.
        let mut cookie_secret = [0; 32];
        OsRng.fill_bytes(&mut cookie_secret);

        Server {
            engine,
            state: ServerState::AwaitClientHello,
            psk_store,
            random,
            session_id,
            client_random: None,
            defragment_buffer: Buf::new(),
            cookie_secret,
        }
    }

    /// Process one received datagram.
    pub fn handle_packet(&mut self, packet: &[u8]) -> Result<(), Error> {
        self.engine.parse_packet(packet)?;
        self.process_input()
    }

    /// Drive timers. Call when the instant from [`Output::Timeout`] is
    /// reached.
    pub fn handle_timeout(&mut self, now: Instant) -> Result<(), Error> {
        self.engine.handle_timeout(now)
    }

    /// Drain pending output. Returns datagrams to transmit, decrypted
    /// application data, the connected event, and finally the next timeout.
    pub fn poll_output<'a>(&mut self, buffer: &'a mut [u8], now: Instant) -> Output<'a> {
        self.engine.poll_output(buffer, now)
    }

    /// Queue application data for transmission. Only valid once connected,
    /// and only up to [`Server::max_application_data_len`] bytes at a time.
    pub fn send_application_data(&mut self, data: &[u8]) -> Result<(), Error> {
        if self.state != ServerState::Running {
            return Err(Error::UnexpectedMessage(
                "cannot send before handshake completes".into(),
            ));
        }
        let max = self.engine.max_application_data_len();
        if data.len() > max {
            return Err(Error::PayloadTooLarge {
                len: data.len(),
                max,
            });
        }
        self.engine
            .create_record(ContentType::ApplicationData, 1, false, |body| {
                body.extend_from_slice(data)
            })
    }

    /// Largest payload [`Server::send_application_data`] accepts: one
    /// record within the configured MTU.
    pub fn max_application_data_len(&self) -> usize {
        self.engine.max_application_data_len()
    }

    pub fn is_connected(&self) -> bool {
        self.state == ServerState::Running
    }

    /// Run the state machine until no further progress is possible.
    fn process_input(&mut self) -> Result<(), Error> {
        loop {
            if let Some(alert) = self.engine.next_alert()? {
                warn!("Received alert: {:?}", alert);
                return Err(Error::PeerAlert(alert.description));
            }

            let state_before = self.state;
            self.do_process()?;
            if self.state == state_before {
                return Ok(());
            }
            trace!("{:?} -> {:?}", state_before, self.state);
        }
    }

    fn do_process(&mut self) -> Result<(), Error> {
        match self.state {
            ServerState::AwaitClientHello => self.process_client_hello(),
            ServerState::SendServerFlight => self.send_server_flight(),
            ServerState::AwaitClientKeyExchange => self.process_client_key_exchange(),
            ServerState::AwaitClientFinished => self.process_client_finished(),
            ServerState::Running => Ok(()),
        }
    }

    fn process_client_hello(&mut self) -> Result<(), Error> {
        let Some(handshake) = self
            .engine
            .next_handshake(MessageType::ClientHello, &mut self.defragment_buffer)?
        else {
            return Ok(());
        };
        let Body::ClientHello(hello) = handshake.body else {
            return Err(Error::UnexpectedMessage("expected ClientHello".into()));
        };

        if hello.client_version != ProtocolVersion::DTLS1_2 {
            self.queue_alert(AlertDescription::HandshakeFailure);
            return Err(Error::SecurityError(format!(
                "unsupported client version {:?}",
                hello.client_version
            )));
        }

        if !hello
            .compression_methods
            .contains(&CompressionMethod::Null)
        {
            self.queue_alert(AlertDescription::HandshakeFailure);
            return Err(Error::SecurityError(
                "client does not offer null compression".into(),
            ));
        }

        if !verify_cookie(&self.cookie_secret, &hello.random, &hello.cookie) {
            debug!("ClientHello without valid cookie, sending HelloVerifyRequest");
            return self.send_hello_verify_request(&hello.random);
        }

        // First suite in the client's order that we are configured for.
        let selected = hello
            .cipher_suites
            .iter()
            .copied()
            .find(|suite| self.engine.config().cipher_suites().contains(suite));
        let Some(suite) = selected else {
            self.queue_alert(AlertDescription::HandshakeFailure);
            return Err(Error::SecurityError("no cipher suite in common".into()));
        };

        debug!("Negotiated {:?}", suite);
        self.engine.set_cipher_suite(suite);
        self.client_random = Some(hello.random.to_bytes());
        self.state = ServerState::SendServerFlight;
        Ok(())
    }

    fn send_hello_verify_request(&mut self, client_random: &Random) -> Result<(), Error> {
        let cookie = compute_cookie(&self.cookie_secret, &client_random.to_bytes())?;

        self.engine.flight_begin();
        self.engine
            .create_handshake(MessageType::HelloVerifyRequest, move |body, _| {
                let hvr = HelloVerifyRequest {
                    server_version: ProtocolVersion::DTLS1_2,
                    cookie,
                };
                hvr.serialize(body);
                Ok(())
            })?;

        // The pre-cookie round never enters the transcript (RFC 6347 4.2.1).
        self.engine.reset_after_hello_verify();
        Ok(())
    }

    fn send_server_flight(&mut self) -> Result<(), Error> {
        let Some(suite) = self.engine.cipher_suite() else {
            return Err(Error::UnexpectedMessage("no cipher suite selected".into()));
        };

        self.engine.flight_begin();

        let random = self.random;
        let session_id = self.session_id;
        self.engine
            .create_handshake(MessageType::ServerHello, move |body, _| {
                let hello = ServerHello {
                    server_version: ProtocolVersion::DTLS1_2,
                    random,
                    session_id,
                    cipher_suite: suite,
                    compression_method: CompressionMethod::Null,
                };
                hello.serialize(body);
                Ok(())
            })?;

        let algorithm = suite.key_exchange_algorithm();
        let hint = self
            .engine
            .config()
            .psk_identity_hint()
            .map(|h| h.to_vec());

        // DHE_PSK always needs the ServerDHParams; plain PSK only sends a
        // ServerKeyExchange when a hint is configured (RFC 4279 2).
        let send_ske = algorithm == KeyExchangeAlgorithm::DhePsk || hint.is_some();
        if send_ske {
            self.engine
                .create_handshake(MessageType::ServerKeyExchange, move |body, engine| {
                    let params = if algorithm == KeyExchangeAlgorithm::DhePsk {
                        let dh_params = engine.config().dh_params().clone();
                        let ys = engine.crypto_mut().init_dh(&dh_params);
                        Some(ServerDhParams {
                            p: dh_params.p().to_vec(),
                            g: dh_params.g().to_vec(),
                            ys,
                        })
                    } else {
                        None
                    };
                    let ske = ServerKeyExchange {
                        identity_hint: hint.unwrap_or_default(),
                        params,
                    };
                    ske.serialize(body);
                    Ok(())
                })?;
        }

        self.engine
            .create_handshake(MessageType::ServerHelloDone, |_, _| Ok(()))?;

        self.state = ServerState::AwaitClientKeyExchange;
        Ok(())
    }

    fn process_client_key_exchange(&mut self) -> Result<(), Error> {
        let Some(handshake) = self
            .engine
            .next_handshake(MessageType::ClientKeyExchange, &mut self.defragment_buffer)?
        else {
            return Ok(());
        };
        let Body::ClientKeyExchange(cke) = handshake.body else {
            return Err(Error::UnexpectedMessage(
                "expected ClientKeyExchange".into(),
            ));
        };
        let Some(suite) = self.engine.cipher_suite() else {
            return Err(Error::UnexpectedMessage("no cipher suite selected".into()));
        };

        self.resolve_psk(&cke.identity)?;

        match suite.key_exchange_algorithm() {
            KeyExchangeAlgorithm::DhePsk => {
                let Some(yc) = cke.dh_public else {
                    self.queue_alert(AlertDescription::DecodeError);
                    return Err(Error::SecurityError(
                        "ClientKeyExchange without DH public value".into(),
                    ));
                };
                if let Err(e) = self.engine.crypto_mut().compute_dh_secret(&yc) {
                    self.queue_alert(AlertDescription::IllegalParameter);
                    return Err(Error::SecurityError(e));
                }
            }
            KeyExchangeAlgorithm::Psk => {
                self.engine
                    .crypto_mut()
                    .set_plain_psk_secret()
                    .map_err(Error::CryptoError)?;
            }
            KeyExchangeAlgorithm::Unknown => {
                return Err(Error::UnexpectedMessage("unknown key exchange".into()));
            }
        }

        let Some(client_random) = self.client_random else {
            return Err(Error::UnexpectedMessage("no client random".into()));
        };
        let server_random = self.random.to_bytes();

        self.engine
            .crypto_mut()
            .derive_master_secret(&client_random, &server_random)
            .map_err(Error::CryptoError)?;
        self.engine
            .crypto_mut()
            .derive_keys(&client_random, &server_random)
            .map_err(Error::CryptoError)?;

        self.state = ServerState::AwaitClientFinished;
        Ok(())
    }

    fn resolve_psk(&mut self, identity: &[u8]) -> Result<(), Error> {
        debug!("PSK client identity: {}", String::from_utf8_lossy(identity));

        let mut key = Zeroizing::new([0; MAX_PSK_KEY_LEN]);
        let len = self.psk_store.psk_for_identity(identity, &mut key[..]);
        if len == 0 || len > MAX_PSK_KEY_LEN {
            self.queue_alert(AlertDescription::UnknownPskIdentity);
            return Err(Error::UnknownPskIdentity);
        }

        self.engine.crypto_mut().set_psk(&key[..len]);
        Ok(())
    }

    fn process_client_finished(&mut self) -> Result<(), Error> {
        if !self.engine.is_peer_encryption_enabled() {
            if !self.engine.take_change_cipher_spec() {
                return Ok(());
            }
            self.engine.enable_peer_encryption()?;
        }

        if !self.engine.has_complete_handshake(MessageType::Finished) {
            return Ok(());
        }

        // The expected verify_data covers the transcript up to but not
        // including the client's Finished, so compute it before consuming.
        let expected = self.engine.generate_verify_data(true)?;

        let Some(handshake) = self
            .engine
            .next_handshake(MessageType::Finished, &mut self.defragment_buffer)?
        else {
            return Ok(());
        };
        let Body::Finished(finished) = handshake.body else {
            return Err(Error::UnexpectedMessage("expected Finished".into()));
        };

        // MAC-derived value, compare without short-circuiting.
        let mismatch = finished
            .verify_data
            .iter()
            .zip(expected.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        if mismatch != 0 {
            self.queue_alert(AlertDescription::DecryptError);
            return Err(Error::SecurityError(
                "Finished verify_data mismatch".into(),
            ));
        }

        self.engine.flight_begin();
        self.engine
            .create_record(ContentType::ChangeCipherSpec, 0, true, |body| body.push(1))?;
        let verify_data = self.engine.generate_verify_data(false)?;
        self.engine
            .create_handshake(MessageType::Finished, move |body, _| {
                Finished { verify_data }.serialize(body);
                Ok(())
            })?;

        // Our Finished is the last flight; it is only ever resent in
        // response to a duplicate of the client's flight, not on a timer.
        self.engine.flight_stop_resend_timers();
        self.engine.release_application_data();
        self.engine.push_connected();
        self.state = ServerState::Running;
        debug!("Handshake complete");
        Ok(())
    }

    fn queue_alert(&mut self, description: AlertDescription) {
        let epoch = if self.state == ServerState::Running { 1 } else { 0 };
        let alert = Alert::fatal(description);
        if let Err(e) = self
            .engine
            .create_record(ContentType::Alert, epoch, false, |body| {
                alert.serialize(body)
            })
        {
            warn!("Could not queue {:?} alert: {:?}", description, e);
        }
    }
}

fn compute_cookie(secret: &[u8; 32], client_random: &[u8; 32]) -> Result<Cookie, Error> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret)
        .map_err(|e| Error::CryptoError(format!("cookie HMAC: {}", e)))?;
    mac.update(client_random);
    let tag = mac.finalize().into_bytes();
    Cookie::try_new(&tag[..COOKIE_LEN])
}

fn verify_cookie(secret: &[u8; 32], client_random: &Random, cookie: &Cookie) -> bool {
    if cookie.is_empty() {
        return false;
    }
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret) else {
        return false;
    };
    mac.update(&client_random.to_bytes());
    // Cookies carry the full HMAC output; verify_slice also rejects
    // wrong-length cookies.
    mac.verify_slice(cookie).is_ok()
}
