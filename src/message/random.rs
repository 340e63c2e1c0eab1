use crate::buffer::Buf;
use nom::bytes::complete::take;
use nom::number::complete::be_u32;
use nom::IResult;

/// The 32-byte hello random (RFC 5246 7.4.1.2).
///
/// All 32 bytes come from the RNG. RFC 5246 does not require the first four
/// bytes to be an actual clock, and the engine has no clock of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Random {
    pub gmt_unix_time: u32,
    pub random_bytes: [u8; 28],
}

impl Random {
    pub const LEN: usize = 32;

    pub(crate) fn generate(rng: &mut crate::rng::SeededRng) -> Self {
        Random {
            gmt_unix_time: rng.random(),
            random_bytes: rng.random(),
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Random> {
        let (input, gmt_unix_time) = be_u32(input)?;
        let (input, bytes) = take(28usize)(input)?;
        let mut random_bytes = [0; 28];
        random_bytes.copy_from_slice(bytes);
        Ok((
            input,
            Random {
                gmt_unix_time,
                random_bytes,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.extend_from_slice(&self.gmt_unix_time.to_be_bytes());
        output.extend_from_slice(&self.random_bytes);
    }

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0; Self::LEN];
        out[..4].copy_from_slice(&self.gmt_unix_time.to_be_bytes());
        out[4..].copy_from_slice(&self.random_bytes);
        out
    }
}
