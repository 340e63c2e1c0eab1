use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::be_u8;
use nom::{Err, IResult};
use std::fmt;
use std::ops::Deref;

/// Declares a variable-length, bounded byte array with u8-prefixed wire
/// encoding (session ids, cookies).
macro_rules! var_array {
    ($name:ident, $min:expr, $max:expr) => {
        #[derive(Clone, Copy, PartialEq, Eq)]
        pub struct $name([u8; $max], usize);

        impl $name {
            pub const MIN_LEN: usize = $min;
            pub const MAX_LEN: usize = $max;

            pub fn empty() -> Self {
                $name([0; $max], 0)
            }

            pub fn try_new(data: &[u8]) -> Result<Self, crate::Error> {
                if data.len() < Self::MIN_LEN || data.len() > Self::MAX_LEN {
                    return Err(crate::Error::ParseError(format!(
                        "{} length {} outside {}..={}",
                        stringify!($name),
                        data.len(),
                        Self::MIN_LEN,
                        Self::MAX_LEN
                    )));
                }
                let mut array = [0; $max];
                array[..data.len()].copy_from_slice(data);
                Ok($name(array, data.len()))
            }

            pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
                let (input, len) = be_u8(input)?;
                let len = len as usize;
                if len < Self::MIN_LEN || len > Self::MAX_LEN {
                    return Err(Err::Failure(Error::new(input, ErrorKind::LengthValue)));
                }
                let (input, data) = take(len)(input)?;
                let mut array = [0; $max];
                array[..len].copy_from_slice(data);
                Ok((input, $name(array, len)))
            }

            pub fn serialize(&self, output: &mut crate::buffer::Buf) {
                output.push(self.1 as u8);
                output.extend_from_slice(&self.0[..self.1]);
            }

            pub fn is_empty(&self) -> bool {
                self.1 == 0
            }
        }

        impl Deref for $name {
            type Target = [u8];

            fn deref(&self) -> &Self::Target {
                &self.0[..self.1]
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({} bytes)", stringify!($name), self.1)
            }
        }
    };
}

var_array!(SessionId, 0, 32);
var_array!(Cookie, 0, 255);
