use super::{length_value_failure, KeyExchangeAlgorithm};
use crate::buffer::Buf;
use crate::psk::MAX_PSK_IDENTITY_LEN;
use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::be_u16;
use nom::{Err, IResult};

/// ServerKeyExchange for PSK key exchanges (RFC 4279 2, 3).
///
/// Carries the PSK identity hint and, for DHE_PSK, the ephemeral
/// ServerDHParams. PSK key exchanges are never signed, so there is no
/// trailing DigitallySigned.
#[derive(Debug, PartialEq, Eq)]
pub struct ServerKeyExchange {
    pub identity_hint: Vec<u8>,
    pub params: Option<ServerDhParams>,
}

/// ServerDHParams (RFC 5246 7.4.3): prime, generator, server public value.
#[derive(Debug, PartialEq, Eq)]
pub struct ServerDhParams {
    pub p: Vec<u8>,
    pub g: Vec<u8>,
    pub ys: Vec<u8>,
}

fn parse_opaque16(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    let (input, len) = be_u16(input)?;
    let (input, data) = take(len as usize)(input)?;
    Ok((input, data.to_vec()))
}

fn serialize_opaque16(data: &[u8], output: &mut Buf) {
    output.extend_from_slice(&(data.len() as u16).to_be_bytes());
    output.extend_from_slice(data);
}

impl ServerKeyExchange {
    pub fn parse(
        input: &[u8],
        key_exchange_algorithm: KeyExchangeAlgorithm,
    ) -> IResult<&[u8], ServerKeyExchange> {
        let (input, identity_hint) = parse_opaque16(input)?;
        if identity_hint.len() > MAX_PSK_IDENTITY_LEN {
            return Err(length_value_failure(input));
        }

        let (input, params) = match key_exchange_algorithm {
            KeyExchangeAlgorithm::DhePsk => {
                let (input, params) = ServerDhParams::parse(input)?;
                (input, Some(params))
            }
            KeyExchangeAlgorithm::Psk => (input, None),
            KeyExchangeAlgorithm::Unknown => {
                return Err(Err::Failure(Error::new(input, ErrorKind::Tag)))
            }
        };

        Ok((
            input,
            ServerKeyExchange {
                identity_hint,
                params,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        serialize_opaque16(&self.identity_hint, output);
        if let Some(params) = &self.params {
            params.serialize(output);
        }
    }
}

impl ServerDhParams {
    pub fn parse(input: &[u8]) -> IResult<&[u8], ServerDhParams> {
        let (input, p) = parse_opaque16(input)?;
        let (input, g) = parse_opaque16(input)?;
        let (input, ys) = parse_opaque16(input)?;

        if p.is_empty() || g.is_empty() || ys.is_empty() {
            return Err(length_value_failure(input));
        }

        Ok((input, ServerDhParams { p, g, ys }))
    }

    pub fn serialize(&self, output: &mut Buf) {
        serialize_opaque16(&self.p, output);
        serialize_opaque16(&self.g, output);
        serialize_opaque16(&self.ys, output);
    }
}
