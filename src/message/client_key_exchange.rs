use super::{length_value_failure, KeyExchangeAlgorithm};
use crate::buffer::Buf;
use crate::psk::MAX_PSK_IDENTITY_LEN;
use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::be_u16;
use nom::{Err, IResult};

/// ClientKeyExchange for PSK key exchanges (RFC 4279 2, 3): the client's
/// PSK identity and, for DHE_PSK, its DH public value Yc.
#[derive(Debug, PartialEq, Eq)]
pub struct ClientKeyExchange {
    pub identity: Vec<u8>,
    pub dh_public: Option<Vec<u8>>,
}

impl ClientKeyExchange {
    pub fn parse(
        input: &[u8],
        key_exchange_algorithm: KeyExchangeAlgorithm,
    ) -> IResult<&[u8], ClientKeyExchange> {
        let (input, identity_len) = be_u16(input)?;
        if identity_len as usize > MAX_PSK_IDENTITY_LEN {
            return Err(length_value_failure(input));
        }
        let (input, identity) = take(identity_len as usize)(input)?;

        let (input, dh_public) = match key_exchange_algorithm {
            KeyExchangeAlgorithm::DhePsk => {
                let (input, yc_len) = be_u16(input)?;
                let (input, yc) = take(yc_len as usize)(input)?;
                if yc.is_empty() {
                    return Err(length_value_failure(input));
                }
                (input, Some(yc.to_vec()))
            }
            KeyExchangeAlgorithm::Psk => (input, None),
            KeyExchangeAlgorithm::Unknown => {
                return Err(Err::Failure(Error::new(input, ErrorKind::Tag)))
            }
        };

        Ok((
            input,
            ClientKeyExchange {
                identity: identity.to_vec(),
                dh_public,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.extend_from_slice(&(self.identity.len() as u16).to_be_bytes());
        output.extend_from_slice(&self.identity);
        if let Some(yc) = &self.dh_public {
            output.extend_from_slice(&(yc.len() as u16).to_be_bytes());
            output.extend_from_slice(yc);
        }
    }
}
