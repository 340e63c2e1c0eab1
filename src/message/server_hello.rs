use super::{CompressionMethod, ProtocolVersion, PskCipherSuite, Random, SessionId};
use crate::buffer::Buf;
use nom::bytes::complete::take;
use nom::IResult;

/// ServerHello (RFC 5246 7.4.1.3). No extensions are ever sent.
#[derive(Debug, PartialEq, Eq)]
pub struct ServerHello {
    pub server_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionId,
    pub cipher_suite: PskCipherSuite,
    pub compression_method: CompressionMethod,
}

impl ServerHello {
    pub fn parse(input: &[u8]) -> IResult<&[u8], ServerHello> {
        let (input, server_version) = ProtocolVersion::parse(input)?;
        let (input, random) = Random::parse(input)?;
        let (input, session_id) = SessionId::parse(input)?;
        let (input, cipher_suite) = PskCipherSuite::parse(input)?;
        let (input, compression_method) = CompressionMethod::parse(input)?;

        // A client that offered extensions may still get none back; tolerate
        // (and ignore) trailing extension bytes when parsing.
        let (input, _) = take(input.len())(input)?;

        Ok((
            input,
            ServerHello {
                server_version,
                random,
                session_id,
                cipher_suite,
                compression_method,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.extend_from_slice(&self.server_version.as_u16().to_be_bytes());
        self.random.serialize(output);
        self.session_id.serialize(output);
        output.extend_from_slice(&self.cipher_suite.as_u16().to_be_bytes());
        output.push(self.compression_method.as_u8());
    }
}
