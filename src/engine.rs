use crate::buffer::{Buf, BufferPool};
use crate::config::Config;
use crate::crypto::{CryptoContext, MacHeader, CBC_MAX_OVERHEAD};
use crate::incoming::{Incoming, RecordDecrypt};
use crate::message::{
    Alert, ContentType, DTLSRecord, Handshake, Header, MessageType, ProtocolVersion,
    PskCipherSuite, Sequence,
};
use crate::queue::{QueueRx, QueueTx};
use crate::rng::SeededRng;
use crate::timer::ExponentialBackoff;
use crate::window::ReplayWindow;
use crate::{Error, Output};
use arrayvec::ArrayVec;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound on queued datagrams examined while reassembling one
/// handshake message.
const MAX_DEFRAGMENT_PACKETS: usize = 50;

/// Timeout returned when nothing is pending.
const DISTANT_FUTURE: Duration = Duration::from_secs(30 * 24 * 3600);

/// Record plaintext cap (RFC 5246 6.2.1).
const MAX_PLAINTEXT_LEN: usize = 1 << 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timeout {
    /// No timeout will fire.
    Disabled,
    /// Should be armed relative to the next observed time.
    Unarmed,
    Armed(Instant),
}

/// Record-layer engine shared by the handshake driver: queues, sequence
/// numbers, retransmission state and the crypto context.
pub(crate) struct Engine {
    config: Arc<Config>,
    pub(crate) rng: SeededRng,
    buffers_free: BufferPool,
    sequence_epoch_0: Sequence,
    sequence_epoch_1: Sequence,
    queue_rx: QueueRx,
    queue_tx: QueueTx,
    cipher_suite: Option<PskCipherSuite>,
    crypto: CryptoContext,
    peer_encryption_enabled: bool,
    /// Next handshake message_seq we expect from the client.
    peer_handshake_seq_no: u16,
    /// message_seq for the next handshake message we send.
    next_handshake_seq_no: u16,
    /// Running transcript of handshake messages for Finished.
    transcript: Buf,
    replay: ReplayWindow,
    flight_saved_records: Vec<SavedRecord>,
    flight_backoff: ExponentialBackoff,
    flight_timeout: Timeout,
    connect_timeout: Timeout,
    release_app_data: bool,
    pending_connected: bool,
}

/// Plaintext fragment saved for flight retransmission. Resends reuse the
/// fragment but take fresh record sequence numbers.
struct SavedRecord {
    content_type: ContentType,
    epoch: u16,
    fragment: Buf,
}

impl Engine {
    pub fn new(config: Arc<Config>) -> Engine {
        let mut rng = SeededRng::new(config.rng_seed());
        let jitter = rng.random();
        let flight_backoff =
            ExponentialBackoff::new(config.flight_start_rto(), config.flight_retries(), jitter);

        Engine {
            config,
            rng,
            buffers_free: BufferPool::default(),
            sequence_epoch_0: Sequence::new(0),
            sequence_epoch_1: Sequence::new(1),
            queue_rx: QueueRx::default(),
            queue_tx: QueueTx::default(),
            cipher_suite: None,
            crypto: CryptoContext::new(),
            peer_encryption_enabled: false,
            peer_handshake_seq_no: 0,
            next_handshake_seq_no: 0,
            transcript: Buf::new(),
            replay: ReplayWindow::new(),
            flight_saved_records: Vec::new(),
            flight_backoff,
            flight_timeout: Timeout::Disabled,
            connect_timeout: Timeout::Unarmed,
            release_app_data: false,
            pending_connected: false,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cipher_suite(&self) -> Option<PskCipherSuite> {
        self.cipher_suite
    }

    pub fn set_cipher_suite(&mut self, suite: PskCipherSuite) {
        self.cipher_suite = Some(suite);
    }

    pub fn crypto_mut(&mut self) -> &mut CryptoContext {
        &mut self.crypto
    }

    pub fn is_peer_encryption_enabled(&self) -> bool {
        self.peer_encryption_enabled
    }

    // ---------------------------------------------------------- incoming

    pub fn parse_packet(&mut self, packet: &[u8]) -> Result<(), Error> {
        let cipher_suite = self.cipher_suite;
        let incoming = Incoming::parse_packet(packet, self, cipher_suite)?;
        if incoming.is_empty() {
            return Ok(());
        }
        self.insert_incoming(incoming)
    }

    fn insert_incoming(&mut self, incoming: Incoming) -> Result<(), Error> {
        if self.queue_rx.len() >= self.config.max_queue_rx() {
            return Err(Error::ReceiveQueueFull);
        }

        if let Some(key) = incoming.first_handshake_key() {
            let (message_seq, _) = key;

            // A duplicate of an already-processed client message means our
            // last flight was lost.
            if let Some(dupe_seq) = incoming.first_dupe_trigger() {
                if dupe_seq < self.peer_handshake_seq_no {
                    debug!("Duplicate of message_seq {}, resending flight", dupe_seq);
                    self.flight_resend()?;
                    return Ok(());
                }
            }

            if message_seq < self.peer_handshake_seq_no {
                trace!("Dropping old handshake message_seq {}", message_seq);
                return Ok(());
            }

            if self.release_app_data {
                return Err(Error::RenegotiationAttempt);
            }

            if self
                .queue_rx
                .iter()
                .any(|e| e.first_handshake_key() == Some(key))
            {
                trace!("Dropping duplicate handshake fragment {:?}", key);
                return Ok(());
            }

            // Keep handshake datagrams ordered by (message_seq, offset) so
            // reassembly can walk the queue front to back.
            let position = self.queue_rx.iter().position(|e| {
                e.first_handshake_key().map(|k| k > key).unwrap_or(false)
            });
            match position {
                Some(index) => self.queue_rx.insert(index, incoming),
                None => self.queue_rx.push_back(incoming),
            }
            return Ok(());
        }

        // Non-handshake records: drop record-layer duplicates, keep arrival
        // order otherwise.
        if let Some(sequence) = incoming.sequence() {
            let dupe = self
                .queue_rx
                .iter()
                .any(|e| e.first_handshake_key().is_none() && e.sequence() == Some(sequence));
            if dupe {
                trace!("Dropping duplicate record {}", sequence);
                return Ok(());
            }
        }
        self.queue_rx.push_back(incoming);
        Ok(())
    }

    fn purge_handled_queue_rx(&mut self) {
        self.queue_rx.retain(|incoming| !incoming.is_handled());
    }

    /// True when every fragment of the next expected message of this type
    /// has arrived.
    pub fn has_complete_handshake(&self, msg_type: MessageType) -> bool {
        let expected_seq = self.peer_handshake_seq_no;
        let mut have: u32 = 0;
        let mut checked = 0;

        for incoming in self.queue_rx.iter() {
            checked += 1;
            if checked > MAX_DEFRAGMENT_PACKETS {
                return false;
            }
            for record in incoming.records() {
                for handshake in record.handshakes() {
                    if handshake.is_handled()
                        || handshake.header.message_seq != expected_seq
                        || handshake.header.msg_type != msg_type
                        || handshake.header.fragment_offset != have
                    {
                        continue;
                    }
                    have += handshake.header.fragment_length;
                    if have >= handshake.header.length {
                        return true;
                    }
                }
            }
        }

        false
    }

    /// Reassemble and consume the next expected handshake message, if
    /// complete. Consumed messages go into the transcript.
    pub fn next_handshake(
        &mut self,
        msg_type: MessageType,
        buffer: &mut Buf,
    ) -> Result<Option<Handshake>, Error> {
        if !self.has_complete_handshake(msg_type) {
            return Ok(None);
        }

        let expected_seq = self.peer_handshake_seq_no;
        let cipher_suite = self.cipher_suite;

        let parts = self
            .queue_rx
            .iter()
            .flat_map(|incoming| incoming.records().iter())
            .flat_map(|record| {
                record
                    .handshakes()
                    .iter()
                    .map(move |handshake| (handshake, record.buffer()))
            })
            .filter(|(handshake, _)| {
                !handshake.is_handled()
                    && handshake.header.message_seq == expected_seq
                    && handshake.header.msg_type == msg_type
            });

        let handshake =
            Handshake::defragment(parts, buffer, cipher_suite, Some(&mut self.transcript))?;

        self.peer_handshake_seq_no = expected_seq + 1;
        Ok(Some(handshake))
    }

    /// Pull the next unhandled alert, if any.
    pub fn next_alert(&mut self) -> Result<Option<Alert>, Error> {
        for incoming in self.queue_rx.iter() {
            for record in incoming.records() {
                if record.is_handled() || record.record().content_type != ContentType::Alert {
                    continue;
                }
                let (_, alert) = Alert::parse(record.fragment())?;
                record.set_handled();
                return Ok(Some(alert));
            }
        }
        Ok(None)
    }

    /// Consume any pending ChangeCipherSpec records. Returns true if at
    /// least one was present.
    pub fn take_change_cipher_spec(&mut self) -> bool {
        let mut found = false;
        for incoming in self.queue_rx.iter() {
            for record in incoming.records() {
                if !record.is_handled()
                    && record.record().content_type == ContentType::ChangeCipherSpec
                {
                    record.set_handled();
                    found = true;
                }
            }
        }
        found
    }

    /// Switch to decrypting the client's records, and reparse protected
    /// records that arrived before the keys were derived.
    pub fn enable_peer_encryption(&mut self) -> Result<(), Error> {
        self.peer_encryption_enabled = true;
        debug!("Peer encryption enabled");

        let drained: VecDeque<Incoming> = mem::take(&mut *self.queue_rx);
        let mut raw_buffers: Vec<Buf> = Vec::new();

        for incoming in drained {
            let mut keep = ArrayVec::new();
            for record in incoming.into_records() {
                if record.is_handled() {
                    continue;
                }
                if record.record().sequence.epoch >= 1 && record.handshakes().is_empty() {
                    raw_buffers.push(record.into_buffer());
                } else {
                    // Cannot overflow, the source had the same capacity.
                    let _ = keep.try_push(record);
                }
            }
            if !keep.is_empty() {
                self.queue_rx.push_back(Incoming::from_records(keep));
            }
        }

        for buffer in raw_buffers {
            self.parse_packet(&buffer)?;
        }
        Ok(())
    }

    /// Start surfacing incoming application data from poll_output.
    pub fn release_application_data(&mut self) {
        self.release_app_data = true;
    }

    pub fn push_connected(&mut self) {
        self.pending_connected = true;
    }

    /// Forget everything gathered before the cookie exchange. The stateless
    /// HelloVerifyRequest round is excluded from the transcript
    /// (RFC 6347 4.2.1).
    pub fn reset_after_hello_verify(&mut self) {
        self.transcript.clear();
        self.queue_rx.clear();
    }

    // ---------------------------------------------------------- outgoing

    /// Largest application data payload that fits one protected record:
    /// the MTU minus record header and cipher overhead, capped by the
    /// record plaintext limit.
    pub fn max_application_data_len(&self) -> usize {
        let mtu_bound = self
            .config
            .mtu()
            .saturating_sub(DTLSRecord::HEADER_LEN + CBC_MAX_OVERHEAD);
        mtu_bound.min(MAX_PLAINTEXT_LEN)
    }

    /// Append a record to the outgoing queue, packing records into the
    /// current datagram while they fit within the MTU. Epoch 1 records are
    /// encrypted. With `save_fragment` the plaintext is kept for flight
    /// retransmission.
    pub fn create_record(
        &mut self,
        content_type: ContentType,
        epoch: u16,
        save_fragment: bool,
        f: impl FnOnce(&mut Buf),
    ) -> Result<(), Error> {
        let mut fragment = self.buffers_free.pop();
        f(&mut fragment);

        if save_fragment {
            self.flight_saved_records.push(SavedRecord {
                content_type,
                epoch,
                fragment: fragment.clone(),
            });
        }

        let overhead = if epoch >= 1 { CBC_MAX_OVERHEAD } else { 0 };
        let wire_len = DTLSRecord::HEADER_LEN + fragment.len() + overhead;

        let can_append = self
            .queue_tx
            .back()
            .map(|datagram| datagram.len() + wire_len <= self.config.mtu())
            .unwrap_or(false);
        if !can_append {
            if self.queue_tx.len() >= self.config.max_queue_tx() {
                return Err(Error::TransmitQueueFull);
            }
            let datagram = self.buffers_free.pop();
            self.queue_tx.push_back(datagram);
        }

        let sequence = if epoch == 0 {
            self.sequence_epoch_0
        } else {
            self.sequence_epoch_1
        };

        if epoch >= 1 {
            let header = MacHeader::new(content_type, sequence, fragment.len() as u16);
            let iv: [u8; 16] = self.rng.random();
            self.crypto
                .encrypt(header, iv, &mut fragment)
                .map_err(Error::CryptoError)?;
        }

        let record = DTLSRecord {
            content_type,
            version: ProtocolVersion::DTLS1_2,
            sequence,
            length: fragment.len() as u16,
            fragment_range: 0..fragment.len(),
        };

        let Some(datagram) = self.queue_tx.back_mut() else {
            return Err(Error::TransmitQueueFull);
        };
        record.serialize(&fragment, datagram);
        trace!("Created record {:?} {}", content_type, sequence);

        if epoch == 0 {
            self.sequence_epoch_0.sequence_number += 1;
        } else {
            self.sequence_epoch_1.sequence_number += 1;
        }

        self.buffers_free.push(fragment);
        Ok(())
    }

    /// Build a handshake message, append it to the transcript and emit it
    /// as one or more records, fragmenting over the MTU.
    pub fn create_handshake(
        &mut self,
        msg_type: MessageType,
        f: impl FnOnce(&mut Buf, &mut Engine) -> Result<(), Error>,
    ) -> Result<(), Error> {
        let mut body = self.buffers_free.pop();
        f(&mut body, self)?;

        let header = Header {
            msg_type,
            length: body.len() as u32,
            message_seq: self.next_handshake_seq_no,
            fragment_offset: 0,
            fragment_length: body.len() as u32,
        };
        self.next_handshake_seq_no += 1;

        header.serialize(&mut self.transcript);
        self.transcript.extend_from_slice(&body);

        let epoch = msg_type.epoch();
        let overhead = DTLSRecord::HEADER_LEN
            + Header::LEN
            + if epoch >= 1 { CBC_MAX_OVERHEAD } else { 0 };
        let max_fragment = self.config.mtu().saturating_sub(overhead).max(32);

        let mut offset = 0;
        loop {
            let chunk = (body.len() - offset).min(max_fragment);
            let fragment_header = Header {
                fragment_offset: offset as u32,
                fragment_length: chunk as u32,
                ..header
            };
            let body_ref = &body;
            self.create_record(ContentType::Handshake, epoch, true, |buf| {
                fragment_header.serialize(buf);
                buf.extend_from_slice(&body_ref[offset..offset + chunk]);
            })?;

            offset += chunk;
            if offset >= body.len() {
                break;
            }
        }

        self.buffers_free.push(body);
        Ok(())
    }

    /// Finished verify_data over the current transcript (RFC 5246 7.4.9).
    pub fn generate_verify_data(&self, is_client: bool) -> Result<[u8; 12], Error> {
        let mut hasher = Sha256::new();
        hasher.update(&self.transcript);
        let handshake_hash = hasher.finalize();
        self.crypto
            .verify_data(&handshake_hash, is_client)
            .map_err(Error::CryptoError)
    }

    // ------------------------------------------------------------ flights

    /// Start a new flight: drop saved records from the previous one and
    /// restart the retransmission backoff.
    pub fn flight_begin(&mut self) {
        self.flight_saved_records.clear();
        let jitter = self.rng.random();
        self.flight_backoff.reset(jitter);
        self.flight_timeout = Timeout::Unarmed;
    }

    /// The handshake is done, nothing fires on a timer anymore. Saved
    /// records stay around for dupe-triggered resends of the last flight.
    pub fn flight_stop_resend_timers(&mut self) {
        self.flight_timeout = Timeout::Disabled;
        self.connect_timeout = Timeout::Disabled;
    }

    fn flight_resend(&mut self) -> Result<(), Error> {
        if self.flight_saved_records.is_empty() {
            return Ok(());
        }
        debug!(
            "Resending flight of {} records",
            self.flight_saved_records.len()
        );

        let saved = mem::take(&mut self.flight_saved_records);
        for entry in &saved {
            self.create_record(entry.content_type, entry.epoch, false, |buf| {
                buf.extend_from_slice(&entry.fragment)
            })?;
        }
        self.flight_saved_records = saved;
        Ok(())
    }

    // ------------------------------------------------------------- timers

    pub fn handle_timeout(&mut self, now: Instant) -> Result<(), Error> {
        self.arm_timers(now);

        if let Timeout::Armed(at) = self.connect_timeout {
            if now >= at {
                return Err(Error::Timeout("handshake deadline"));
            }
        }

        if let Timeout::Armed(at) = self.flight_timeout {
            if now >= at {
                if !self.flight_backoff.can_retry() {
                    return Err(Error::Timeout("flight retries exhausted"));
                }
                let jitter = self.rng.random();
                self.flight_backoff.attempt(jitter);
                self.flight_timeout = Timeout::Armed(now + self.flight_backoff.rto());
                self.flight_resend()?;
            }
        }

        Ok(())
    }

    fn arm_timers(&mut self, now: Instant) {
        if self.connect_timeout == Timeout::Unarmed {
            self.connect_timeout = Timeout::Armed(now + self.config.handshake_timeout());
        }
        if self.flight_timeout == Timeout::Unarmed {
            self.flight_timeout = Timeout::Armed(now + self.flight_backoff.rto());
        }
    }

    fn poll_timeout(&mut self, now: Instant) -> Instant {
        self.arm_timers(now);

        let connect = match self.connect_timeout {
            Timeout::Armed(at) => Some(at),
            _ => None,
        };
        let flight = match self.flight_timeout {
            Timeout::Armed(at) => Some(at),
            _ => None,
        };

        match (connect, flight) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => now + DISTANT_FUTURE,
        }
    }

    // -------------------------------------------------------------- polling

    pub fn poll_output<'a>(&mut self, buffer: &'a mut [u8], now: Instant) -> Output<'a> {
        self.purge_handled_queue_rx();

        let buffer = match self.poll_app_data(buffer) {
            Ok(data) => return Output::ApplicationData(data),
            Err(buffer) => buffer,
        };

        if let Ok(packet) = self.poll_packet_tx(buffer) {
            return Output::Packet(packet);
        }

        if self.pending_connected {
            self.pending_connected = false;
            return Output::Connected;
        }

        Output::Timeout(self.poll_timeout(now))
    }

    fn poll_app_data<'a>(&mut self, buffer: &'a mut [u8]) -> Result<&'a [u8], &'a mut [u8]> {
        if !self.release_app_data {
            return Err(buffer);
        }

        let next = self.queue_rx.iter().find_map(|incoming| {
            incoming.records().iter().find(|record| {
                !record.is_handled()
                    && record.record().content_type == ContentType::ApplicationData
            })
        });

        let Some(record) = next else {
            return Err(buffer);
        };

        let data = record.fragment();
        let len = data.len().min(buffer.len());
        if len < data.len() {
            warn!("Truncating {} bytes of application data", data.len() - len);
        }
        buffer[..len].copy_from_slice(&data[..len]);
        record.set_handled();
        Ok(&buffer[..len])
    }

    fn poll_packet_tx<'a>(&mut self, buffer: &'a mut [u8]) -> Result<&'a [u8], &'a mut [u8]> {
        let Some(datagram) = self.queue_tx.pop_front() else {
            return Err(buffer);
        };

        let len = datagram.len().min(buffer.len());
        if len < datagram.len() {
            warn!("Truncating {} byte datagram to {}", datagram.len(), len);
        }
        buffer[..len].copy_from_slice(&datagram[..len]);
        self.buffers_free.push(datagram);
        Ok(&buffer[..len])
    }
}

impl RecordDecrypt for Engine {
    fn is_peer_encryption_enabled(&self) -> bool {
        self.peer_encryption_enabled
    }

    fn replay_check_and_update(&mut self, sequence: Sequence) -> bool {
        self.replay.check_and_update(sequence.sequence_number)
    }

    fn decrypt_record(
        &mut self,
        content_type: ContentType,
        sequence: Sequence,
        fragment: &mut [u8],
    ) -> Result<usize, String> {
        self.crypto.decrypt(content_type, sequence, fragment)
    }
}
