use crate::buffer::Buf;
use crate::crypto::CBC_EXPLICIT_IV_LEN;
use crate::message::{ContentType, DTLSRecord, Handshake, PskCipherSuite, Sequence};
use crate::Error;
use arrayvec::ArrayVec;
use std::sync::atomic::{AtomicBool, Ordering};

pub(crate) const MAX_RECORDS_PER_DATAGRAM: usize = 8;
pub(crate) const MAX_HANDSHAKES_PER_RECORD: usize = 8;

/// What the record parser needs from the engine to handle protected
/// records: keys and the replay window.
pub(crate) trait RecordDecrypt {
    fn is_peer_encryption_enabled(&self) -> bool;

    /// True if the sequence is fresh. Only called for protected records,
    /// after their MAC verified.
    fn replay_check_and_update(&mut self, sequence: Sequence) -> bool;

    /// Decrypt the fragment (explicit IV + ciphertext) in place, returning
    /// the plaintext length.
    fn decrypt_record(
        &mut self,
        content_type: ContentType,
        sequence: Sequence,
        fragment: &mut [u8],
    ) -> Result<usize, String>;
}

/// One incoming datagram, parsed into records.
#[derive(Debug)]
pub(crate) struct Incoming {
    records: ArrayVec<Record, MAX_RECORDS_PER_DATAGRAM>,
}

impl Incoming {
    /// Parse a datagram. Records that fail decryption or the replay check
    /// are dropped here and never show up in the result.
    pub fn parse_packet(
        packet: &[u8],
        decrypt: &mut dyn RecordDecrypt,
        cipher_suite: Option<PskCipherSuite>,
    ) -> Result<Incoming, Error> {
        let mut records = ArrayVec::new();

        let mut input = packet;
        while !input.is_empty() {
            if input.len() < DTLSRecord::HEADER_LEN {
                return Err(Error::ParseIncomplete);
            }
            let length = u16::from_be_bytes([
                input[DTLSRecord::LENGTH_OFFSET.start],
                input[DTLSRecord::LENGTH_OFFSET.start + 1],
            ]) as usize;
            let total = DTLSRecord::HEADER_LEN + length;
            if input.len() < total {
                return Err(Error::ParseIncomplete);
            }

            let (chunk, rest) = input.split_at(total);
            if let Some(record) = Record::parse(chunk, decrypt, cipher_suite)? {
                records.try_push(record).map_err(|_| Error::TooManyRecords)?;
            }
            input = rest;
        }

        Ok(Incoming { records })
    }

    pub(crate) fn from_records(records: ArrayVec<Record, MAX_RECORDS_PER_DATAGRAM>) -> Incoming {
        Incoming { records }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> ArrayVec<Record, MAX_RECORDS_PER_DATAGRAM> {
        self.records
    }

    pub fn is_handled(&self) -> bool {
        self.records.iter().all(|r| r.is_handled())
    }

    /// Sort/dupe key when this datagram starts with a handshake message:
    /// (message_seq, fragment_offset) of the first handshake.
    pub fn first_handshake_key(&self) -> Option<(u16, u32)> {
        let handshake = self.records.first()?.handshakes().first()?;
        Some((
            handshake.header.message_seq,
            handshake.header.fragment_offset,
        ))
    }

    /// The message_seq of the first handshake if its duplication should
    /// trigger a flight resend.
    pub fn first_dupe_trigger(&self) -> Option<u16> {
        self.records
            .first()?
            .handshakes()
            .first()?
            .dupe_triggers_resend()
    }

    /// Record-layer sequence of the first record.
    pub fn sequence(&self) -> Option<Sequence> {
        self.records.first().map(|r| r.record().sequence)
    }
}

/// A single parsed record with its raw bytes.
///
/// For protected records the buffer holds the decrypted bytes (with the
/// record length rewritten to the plaintext size). A protected record that
/// arrived before the peer's keys were derived keeps its ciphertext and has
/// no parsed handshakes; it is reparsed once encryption is enabled.
#[derive(Debug)]
pub(crate) struct Record {
    buffer: Buf,
    record: DTLSRecord,
    handshakes: ArrayVec<Handshake, MAX_HANDSHAKES_PER_RECORD>,
    handled: AtomicBool,
}

impl Record {
    fn parse(
        chunk: &[u8],
        decrypt: &mut dyn RecordDecrypt,
        cipher_suite: Option<PskCipherSuite>,
    ) -> Result<Option<Record>, Error> {
        let mut buffer = Buf::from_slice(chunk);

        let record = {
            let (_, record) = DTLSRecord::parse(&buffer, 0, 0)?;
            record
        };

        if record.sequence.epoch == 0 {
            let handshakes = parse_handshakes(&buffer, &record, cipher_suite)?;
            return Ok(Some(Record {
                buffer,
                record,
                handshakes,
                handled: AtomicBool::new(false),
            }));
        }

        if !decrypt.is_peer_encryption_enabled() {
            // Keys not derived yet. Keep the ciphertext for later.
            return Ok(Some(Record {
                buffer,
                record,
                handshakes: ArrayVec::new(),
                handled: AtomicBool::new(false),
            }));
        }

        let content_type = record.content_type;
        let sequence = record.sequence;

        let plaintext_len = {
            let fragment = &mut buffer[DTLSRecord::HEADER_LEN..];
            match decrypt.decrypt_record(content_type, sequence, fragment) {
                Ok(len) => len,
                Err(e) => {
                    trace!("Discarding record {}: {}", sequence, e);
                    return Ok(None);
                }
            }
        };

        if !decrypt.replay_check_and_update(sequence) {
            trace!("Discarding replayed record {}", sequence);
            return Ok(None);
        }

        // Rewrite the length to IV + plaintext and drop the MAC/padding
        // tail, then reparse skipping the IV.
        let new_len = (CBC_EXPLICIT_IV_LEN + plaintext_len) as u16;
        buffer[DTLSRecord::LENGTH_OFFSET].copy_from_slice(&new_len.to_be_bytes());
        buffer.truncate(DTLSRecord::HEADER_LEN + new_len as usize);

        let record = {
            let (_, record) = DTLSRecord::parse(&buffer, 0, CBC_EXPLICIT_IV_LEN)?;
            record
        };
        let handshakes = parse_handshakes(&buffer, &record, cipher_suite)?;

        Ok(Some(Record {
            buffer,
            record,
            handshakes,
            handled: AtomicBool::new(false),
        }))
    }

    pub fn record(&self) -> &DTLSRecord {
        &self.record
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_buffer(self) -> Buf {
        self.buffer
    }

    pub fn fragment(&self) -> &[u8] {
        self.record.fragment(&self.buffer)
    }

    pub fn handshakes(&self) -> &[Handshake] {
        &self.handshakes
    }

    pub fn is_handled(&self) -> bool {
        if self.handshakes.is_empty() {
            self.handled.load(Ordering::Relaxed)
        } else {
            self.handshakes.iter().all(|h| h.is_handled())
        }
    }

    pub fn set_handled(&self) {
        debug_assert!(self.handshakes.is_empty());
        self.handled.store(true, Ordering::Relaxed);
    }
}

fn parse_handshakes(
    buffer: &[u8],
    record: &DTLSRecord,
    cipher_suite: Option<PskCipherSuite>,
) -> Result<ArrayVec<Handshake, MAX_HANDSHAKES_PER_RECORD>, Error> {
    let mut handshakes = ArrayVec::new();
    if record.content_type != ContentType::Handshake {
        return Ok(handshakes);
    }

    let fragment = record.fragment(buffer);
    let base = record.fragment_range.start;

    let mut input = fragment;
    while !input.is_empty() {
        let offset = base + (fragment.len() - input.len());
        let (rest, handshake) = Handshake::parse(input, offset, cipher_suite, false)?;
        handshakes
            .try_push(handshake)
            .map_err(|_| Error::TooManyRecords)?;
        input = rest;
    }

    Ok(handshakes)
}
