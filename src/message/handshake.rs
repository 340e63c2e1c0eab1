use super::{
    length_value_failure, ClientHello, ClientKeyExchange, Finished, HelloVerifyRequest,
    PskCipherSuite, ServerHello, ServerKeyExchange,
};
use crate::buffer::Buf;
use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::{be_u16, be_u24, be_u8};
use nom::{Err, IResult};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};

/// Handshake message header (RFC 6347 4.2.2): the TLS header extended with
/// message_seq and fragment bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub msg_type: MessageType,
    pub length: u32,
    pub message_seq: u16,
    pub fragment_offset: u32,
    pub fragment_length: u32,
}

impl Header {
    pub const LEN: usize = 12;

    pub fn parse(input: &[u8]) -> IResult<&[u8], Header> {
        let (input, msg_type) = MessageType::parse(input)?;
        let (input, length) = be_u24(input)?;
        let (input, message_seq) = be_u16(input)?;
        let (input, fragment_offset) = be_u24(input)?;
        let (input, fragment_length) = be_u24(input)?;

        Ok((
            input,
            Header {
                msg_type,
                length,
                message_seq,
                fragment_offset,
                fragment_length,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.push(self.msg_type.as_u8());
        output.extend_from_slice(&self.length.to_be_bytes()[1..]);
        output.extend_from_slice(&self.message_seq.to_be_bytes());
        output.extend_from_slice(&self.fragment_offset.to_be_bytes()[1..]);
        output.extend_from_slice(&self.fragment_length.to_be_bytes()[1..]);
    }
}

/// One handshake message (or fragment of one) plus where its raw bytes live
/// in the backing record buffer.
#[derive(Debug)]
pub struct Handshake {
    pub header: Header,
    pub body: Body,
    pub fragment_range: Range<usize>,
    handled: AtomicBool,
}

impl PartialEq for Handshake {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header
            && self.body == other.body
            && self.fragment_range == other.fragment_range
    }
}

impl Eq for Handshake {}

impl Handshake {
    /// Parse one handshake message from a record fragment. `base_offset` is
    /// where `input` starts within the backing buffer. With `as_fragment`
    /// (or when the header says this is a partial message) the body is kept
    /// as an opaque byte range for later reassembly.
    pub fn parse(
        input: &[u8],
        base_offset: usize,
        cipher_suite: Option<PskCipherSuite>,
        as_fragment: bool,
    ) -> IResult<&[u8], Handshake> {
        let original_input = input;
        let (input, header) = Header::parse(input)?;

        let (input, fragment) = take(header.fragment_length as usize)(input)?;
        let relative_offset = fragment.as_ptr() as usize - original_input.as_ptr() as usize;
        let start = base_offset + relative_offset;
        let fragment_range = start..start + fragment.len();

        let is_fragment =
            as_fragment || header.fragment_offset != 0 || header.fragment_length != header.length;

        let body = if is_fragment {
            Body::Fragment(fragment_range.clone())
        } else {
            let (leftover, body) = Body::parse(fragment, header.msg_type, cipher_suite)?;
            if !leftover.is_empty() {
                return Err(length_value_failure(leftover));
            }
            body
        };

        Ok((
            input,
            Handshake {
                header,
                body,
                fragment_range,
                handled: AtomicBool::new(false),
            },
        ))
    }

    pub fn serialize(&self, buf: &[u8], output: &mut Buf) {
        self.header.serialize(output);
        self.body.serialize(buf, output);
    }

    /// Raw bytes of this message's fragment within the backing buffer.
    pub fn fragment_data<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.fragment_range.clone()]
    }

    pub fn is_handled(&self) -> bool {
        self.handled.load(Ordering::Relaxed)
    }

    pub fn set_handled(&self) {
        self.handled.store(true, Ordering::Relaxed);
    }

    /// A duplicate of these message types means the peer never saw our last
    /// flight and it should be retransmitted immediately (RFC 6347 4.2.4).
    pub fn dupe_triggers_resend(&self) -> Option<u16> {
        if self.header.fragment_offset != 0 {
            return None;
        }
        match self.header.msg_type {
            MessageType::ClientHello | MessageType::ClientKeyExchange => {
                Some(self.header.message_seq)
            }
            _ => None,
        }
    }

    /// Reassemble a full handshake message from ordered fragments.
    ///
    /// `parts` yields each fragment with its backing buffer; the caller has
    /// already verified contiguity. The reassembled bytes land in `buffer`.
    /// When a transcript is given, the canonical (unfragmented) header and
    /// body are appended to it.
    pub fn defragment<'b>(
        parts: impl Iterator<Item = (&'b Handshake, &'b [u8])>,
        buffer: &mut Buf,
        cipher_suite: Option<PskCipherSuite>,
        mut transcript: Option<&mut Buf>,
    ) -> Result<Handshake, crate::Error> {
        buffer.clear();

        let mut header: Option<Header> = None;
        for (handshake, backing) in parts {
            if header.is_none() {
                header = Some(handshake.header);
            }
            buffer.extend_from_slice(handshake.fragment_data(backing));
            handshake.set_handled();
        }

        let mut header = header.ok_or(crate::Error::ParseIncomplete)?;
        if buffer.len() != header.length as usize {
            return Err(crate::Error::ParseIncomplete);
        }
        header.fragment_offset = 0;
        header.fragment_length = header.length;

        if let Some(transcript) = transcript.as_deref_mut() {
            header.serialize(transcript);
            transcript.extend_from_slice(buffer);
        }

        let (leftover, body) = Body::parse(buffer, header.msg_type, cipher_suite)?;
        if !leftover.is_empty() {
            return Err(crate::Error::ParseError(format!(
                "{} bytes left over after {:?} body",
                leftover.len(),
                header.msg_type
            )));
        }

        Ok(Handshake {
            header,
            body,
            fragment_range: 0..buffer.len(),
            handled: AtomicBool::new(false),
        })
    }
}

/// Handshake message types used by the PSK flights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageType {
    ClientHello,
    ServerHello,
    HelloVerifyRequest,
    ServerKeyExchange,
    ServerHelloDone,
    ClientKeyExchange,
    Finished,
    Unknown(u8),
}

impl MessageType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => MessageType::ClientHello,
            2 => MessageType::ServerHello,
            3 => MessageType::HelloVerifyRequest,
            12 => MessageType::ServerKeyExchange,
            14 => MessageType::ServerHelloDone,
            16 => MessageType::ClientKeyExchange,
            20 => MessageType::Finished,
            _ => MessageType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            MessageType::ClientHello => 1,
            MessageType::ServerHello => 2,
            MessageType::HelloVerifyRequest => 3,
            MessageType::ServerKeyExchange => 12,
            MessageType::ServerHelloDone => 14,
            MessageType::ClientKeyExchange => 16,
            MessageType::Finished => 20,
            MessageType::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], MessageType> {
        let (input, value) = be_u8(input)?;
        Ok((input, MessageType::from_u8(value)))
    }

    /// Records carrying this message go out in this epoch. Only Finished is
    /// sent under the new cipher state.
    pub fn epoch(&self) -> u16 {
        match self {
            MessageType::Finished => 1,
            _ => 0,
        }
    }
}

/// Parsed handshake message body, or an opaque fragment awaiting reassembly.
#[derive(Debug, PartialEq, Eq)]
pub enum Body {
    ClientHello(ClientHello),
    ServerHello(ServerHello),
    HelloVerifyRequest(HelloVerifyRequest),
    ServerKeyExchange(ServerKeyExchange),
    ServerHelloDone,
    ClientKeyExchange(ClientKeyExchange),
    Finished(Finished),
    Fragment(Range<usize>),
}

impl Body {
    /// Parse a complete body. ServerKeyExchange, ClientKeyExchange and
    /// Finished can only be parsed once the cipher suite is known.
    pub fn parse(
        input: &[u8],
        msg_type: MessageType,
        cipher_suite: Option<PskCipherSuite>,
    ) -> IResult<&[u8], Body> {
        let needs_suite = || {
            cipher_suite.ok_or_else(|| Err::Failure(Error::new(input, ErrorKind::Fail)))
        };

        match msg_type {
            MessageType::ClientHello => {
                let (input, hello) = ClientHello::parse(input)?;
                Ok((input, Body::ClientHello(hello)))
            }
            MessageType::ServerHello => {
                let (input, hello) = ServerHello::parse(input)?;
                Ok((input, Body::ServerHello(hello)))
            }
            MessageType::HelloVerifyRequest => {
                let (input, hvr) = HelloVerifyRequest::parse(input)?;
                Ok((input, Body::HelloVerifyRequest(hvr)))
            }
            MessageType::ServerKeyExchange => {
                let suite = needs_suite()?;
                let (input, ske) =
                    ServerKeyExchange::parse(input, suite.key_exchange_algorithm())?;
                Ok((input, Body::ServerKeyExchange(ske)))
            }
            MessageType::ServerHelloDone => Ok((input, Body::ServerHelloDone)),
            MessageType::ClientKeyExchange => {
                let suite = needs_suite()?;
                let (input, cke) =
                    ClientKeyExchange::parse(input, suite.key_exchange_algorithm())?;
                Ok((input, Body::ClientKeyExchange(cke)))
            }
            MessageType::Finished => {
                let suite = needs_suite()?;
                let (input, finished) = Finished::parse(input, suite)?;
                Ok((input, Body::Finished(finished)))
            }
            MessageType::Unknown(_) => Err(Err::Failure(Error::new(input, ErrorKind::Tag))),
        }
    }

    pub fn serialize(&self, buf: &[u8], output: &mut Buf) {
        match self {
            Body::ClientHello(hello) => hello.serialize(output),
            Body::ServerHello(hello) => hello.serialize(output),
            Body::HelloVerifyRequest(hvr) => hvr.serialize(output),
            Body::ServerKeyExchange(ske) => ske.serialize(output),
            Body::ServerHelloDone => {}
            Body::ClientKeyExchange(cke) => cke.serialize(output),
            Body::Finished(finished) => finished.serialize(output),
            Body::Fragment(range) => output.extend_from_slice(&buf[range.clone()]),
        }
    }
}
