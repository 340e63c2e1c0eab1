use super::{
    length_value_failure, CipherSuiteVec, CompressionMethod, CompressionMethodVec, Cookie,
    ProtocolVersion, PskCipherSuite, Random, SessionId,
};
use crate::buffer::Buf;
use crate::util::many1;
use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u8};
use nom::IResult;

/// ClientHello (RFC 6347 4.2.1).
///
/// Cipher suites and compression methods we do not support are dropped at
/// parse time; extensions are skipped entirely (PSK negotiation needs none).
/// The handshake transcript keeps the raw bytes, so nothing is lost there.
#[derive(Debug, PartialEq, Eq)]
pub struct ClientHello {
    pub client_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionId,
    pub cookie: Cookie,
    pub cipher_suites: CipherSuiteVec,
    pub compression_methods: CompressionMethodVec,
}

impl ClientHello {
    pub fn parse(input: &[u8]) -> IResult<&[u8], ClientHello> {
        let (input, client_version) = ProtocolVersion::parse(input)?;
        let (input, random) = Random::parse(input)?;
        let (input, session_id) = SessionId::parse(input)?;
        let (input, cookie) = Cookie::parse(input)?;

        let (input, cipher_suites_len) = be_u16(input)?;
        let (input, suites_data) = take(cipher_suites_len as usize)(input)?;
        let (leftover, cipher_suites) =
            many1(PskCipherSuite::parse, PskCipherSuite::is_supported)(suites_data)?;
        if !leftover.is_empty() {
            return Err(length_value_failure(leftover));
        }

        let (input, compression_len) = be_u8(input)?;
        let (input, compression_data) = take(compression_len as usize)(input)?;
        let (leftover, compression_methods) = many1(
            CompressionMethod::parse,
            CompressionMethod::is_supported,
        )(compression_data)?;
        if !leftover.is_empty() {
            return Err(length_value_failure(leftover));
        }

        // Extensions, if any, are ignored.
        let (input, _) = take(input.len())(input)?;

        Ok((
            input,
            ClientHello {
                client_version,
                random,
                session_id,
                cookie,
                cipher_suites,
                compression_methods,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.extend_from_slice(&self.client_version.as_u16().to_be_bytes());
        self.random.serialize(output);
        self.session_id.serialize(output);
        self.cookie.serialize(output);

        let suites_len = (self.cipher_suites.len() * 2) as u16;
        output.extend_from_slice(&suites_len.to_be_bytes());
        for suite in &self.cipher_suites {
            output.extend_from_slice(&suite.as_u16().to_be_bytes());
        }

        output.push(self.compression_methods.len() as u8);
        for method in &self.compression_methods {
            output.push(method.as_u8());
        }
    }
}
