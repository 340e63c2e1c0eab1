use super::PskCipherSuite;
use crate::buffer::Buf;
use nom::bytes::complete::take;
use nom::IResult;

/// Finished (RFC 5246 7.4.9). Both supported suites use a 12-byte
/// verify_data.
#[derive(Debug, PartialEq, Eq)]
pub struct Finished {
    pub verify_data: [u8; 12],
}

impl Finished {
    pub fn parse(input: &[u8], cipher_suite: PskCipherSuite) -> IResult<&[u8], Finished> {
        let (input, data) = take(cipher_suite.verify_data_length())(input)?;
        let mut verify_data = [0; 12];
        verify_data.copy_from_slice(data);
        Ok((input, Finished { verify_data }))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.extend_from_slice(&self.verify_data);
    }
}
