use super::{ContentType, ProtocolVersion, Sequence};
use crate::buffer::Buf;
use crate::util::be_u48;
use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::be_u16;
use nom::{Err, IResult};
use std::ops::Range;

/// A single DTLS record header plus the location of its fragment.
///
/// The fragment itself stays in the buffer the record was parsed from;
/// `fragment_range` is relative to that buffer.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DTLSRecord {
    pub content_type: ContentType,
    pub version: ProtocolVersion,
    pub sequence: Sequence,
    pub length: u16,
    pub fragment_range: Range<usize>,
}

impl DTLSRecord {
    /// Record header size: type(1) + version(2) + epoch(2) + sequence(6) +
    /// length(2).
    pub const HEADER_LEN: usize = 13;

    /// Byte range of the length field within the header.
    pub const LENGTH_OFFSET: Range<usize> = 11..13;

    /// Parse one record. `base_offset` is where `input` starts within the
    /// underlying buffer; `skip_offset` skips that many fragment bytes (the
    /// explicit IV, after decryption rewrote the record in place).
    pub fn parse(input: &[u8], base_offset: usize, skip_offset: usize) -> IResult<&[u8], Self> {
        let original_input = input;

        let (input, content_type) = ContentType::parse(input)?;
        let (input, version) = ProtocolVersion::parse(input)?;

        if !matches!(version, ProtocolVersion::DTLS1_0 | ProtocolVersion::DTLS1_2) {
            return Err(Err::Failure(Error::new(input, ErrorKind::Tag)));
        }

        let (input, epoch) = be_u16(input)?;
        let (input, sequence_number) = be_u48(input)?;
        let (input, length) = be_u16(input)?;

        let (input, _) = take(skip_offset)(input)?;
        let fragment_len = (length as usize)
            .checked_sub(skip_offset)
            .ok_or_else(|| Err::Failure(Error::new(input, ErrorKind::LengthValue)))?;
        let (input, fragment) = take(fragment_len)(input)?;

        let relative_offset = fragment.as_ptr() as usize - original_input.as_ptr() as usize;
        let start = base_offset + relative_offset;
        let fragment_range = start..start + fragment.len();

        Ok((
            input,
            DTLSRecord {
                content_type,
                version,
                sequence: Sequence {
                    epoch,
                    sequence_number,
                },
                length,
                fragment_range,
            },
        ))
    }

    pub fn serialize(&self, buf: &[u8], output: &mut Buf) {
        output.push(self.content_type.as_u8());
        output.extend_from_slice(&self.version.as_u16().to_be_bytes());
        output.extend_from_slice(&self.sequence.epoch.to_be_bytes());
        output.extend_from_slice(&self.sequence.sequence_number.to_be_bytes()[2..]);
        output.extend_from_slice(&self.length.to_be_bytes());
        output.extend_from_slice(self.fragment(buf));
    }

    pub fn fragment<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.fragment_range.clone()]
    }
}
