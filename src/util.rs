use arrayvec::ArrayVec;
use nom::error::{ErrorKind, ParseError};
use nom::number::complete::{be_u16, be_u32};
use nom::{Err, IResult, InputIter, InputLength, Parser, Slice};
use std::ops::RangeFrom;

/// Parse a big-endian 48-bit integer (DTLS record sequence numbers).
pub fn be_u48<I, E: ParseError<I>>(input: I) -> IResult<I, u64, E>
where
    I: Slice<RangeFrom<usize>> + InputIter<Item = u8> + InputLength,
{
    let (input, hi) = be_u16(input)?;
    let (input, lo) = be_u32(input)?;
    Ok((input, (u64::from(hi) << 32) | u64::from(lo)))
}

/// Run `f` until it fails, requiring at least one success. Parsed items are
/// collected into a bounded `ArrayVec`; only items for which `keep` returns
/// true are stored, duplicates and overflow are dropped rather than failing.
pub fn many1<I, O, E, F, G, const CAP: usize>(
    mut f: F,
    keep: G,
) -> impl FnMut(I) -> IResult<I, ArrayVec<O, CAP>, E>
where
    I: Clone + InputLength,
    F: Parser<I, O, E>,
    G: Fn(&O) -> bool,
    O: PartialEq,
    E: ParseError<I>,
{
    move |mut input: I| match f.parse(input.clone()) {
        Err(Err::Error(err)) => Err(Err::Error(E::append(input, ErrorKind::Many1, err))),
        Err(e) => Err(e),
        Ok((rest, first)) => {
            let mut acc: ArrayVec<O, CAP> = ArrayVec::new();
            if keep(&first) {
                acc.push(first);
            }
            input = rest;

            loop {
                let len = input.input_len();
                match f.parse(input.clone()) {
                    Err(Err::Error(_)) => return Ok((input, acc)),
                    Err(e) => return Err(e),
                    Ok((rest, item)) => {
                        // Parser must consume input or we would loop forever.
                        if rest.input_len() == len {
                            return Err(Err::Error(E::from_error_kind(input, ErrorKind::Many1)));
                        }
                        input = rest;
                        if keep(&item) && !acc.contains(&item) && !acc.is_full() {
                            acc.push(item);
                        }
                    }
                }
            }
        }
    }
}
