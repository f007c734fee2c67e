use nom::IResult;

use crate::data::Flag;
use crate::data::Flags;
use crate::data::FormatVersion;
use crate::data::Header;
use crate::data::SequenceType;

pub fn byte(i: &[u8]) -> IResult<&[u8], u8> {
    let (i, n) = nom::bytes::streaming::take(1usize)(i)?;
    Ok((i, n[0]))
}

/// Decode a 7-bit-per-byte, big-endian, continuation-encoded unsigned integer.
///
/// Rejects the redundant leading `0x80` encoding and any value that would
/// overflow 64 bits.
pub fn variable_u64(i: &[u8]) -> IResult<&[u8], u64> {
    let mut num: u64 = 0;
    let mut rest = i;
    let mut first = true;
    loop {
        let (next, b) = self::byte(rest)?;
        if first && b == 0x80 {
            let error = nom::error::Error::new(i, nom::error::ErrorKind::Verify);
            return Err(nom::Err::Failure(error));
        }
        first = false;
        if num & (0x7Fu64 << 57) != 0 {
            let error = nom::error::Error::new(i, nom::error::ErrorKind::TooLarge);
            return Err(nom::Err::Failure(error));
        }
        num = (num << 7) | u64::from(b & 0x7F);
        rest = next;
        if b & 0x80 == 0 {
            return Ok((rest, num));
        }
    }
}

pub fn format_descriptor(i: &[u8]) -> IResult<&[u8], &[u8]> {
    nom::bytes::streaming::tag([0x01, 0xF9, 0xEC])(i)
}

/// Parse the format version byte.
///
/// Unlike the other header fields, an unrecognized version is reported via
/// the returned `u8` rather than folded into the generic nom error path, so
/// callers can surface `Error::UnsupportedVersion` with the offending value.
pub fn format_version(i: &[u8]) -> IResult<&[u8], Result<FormatVersion, u8>> {
    self::byte(i).map(|(i, b)| {
        let version = match b {
            1 => Ok(FormatVersion::V1),
            2 => Ok(FormatVersion::V2),
            other => Err(other),
        };
        (i, version)
    })
}

pub fn sequence_type(i: &[u8]) -> IResult<&[u8], SequenceType> {
    match nom::combinator::verify(self::byte, |&byte: &u8| byte <= 0x03)(i) {
        Err(e) => Err(e),
        Ok((i, 0)) => Ok((i, SequenceType::Dna)),
        Ok((i, 1)) => Ok((i, SequenceType::Rna)),
        Ok((i, 2)) => Ok((i, SequenceType::Protein)),
        Ok((i, 3)) => Ok((i, SequenceType::Text)),
        _ => unreachable!(),
    }
}

/// Parse the header flags byte, bit-exact: bit 7 is `Quality`, bit 0 is
/// `Extended` (the reverse of the on-wire section order, which starts
/// from `Title` just above the reserved bit).
pub fn flags(i: &[u8]) -> IResult<&[u8], Flags> {
    self::byte(i).map(|(i, x)| {
        let mut flags = Flags::new();
        for flag in Flag::values() {
            if x & flag.as_byte() != 0 {
                flags.set(*flag);
            }
        }
        (i, flags)
    })
}

/// Parse the name separator byte. Printable policy is not enforced: any
/// byte value is accepted, even if it would be an odd choice of delimiter.
pub fn name_separator(i: &[u8]) -> IResult<&[u8], char> {
    self::byte(i).map(|(i, b)| (i, b as char))
}

pub fn line_length(i: &[u8]) -> IResult<&[u8], u64> {
    self::variable_u64(i)
}

pub fn number_of_sequences(i: &[u8]) -> IResult<&[u8], u64> {
    self::variable_u64(i)
}

/// Parse the archive header.
///
/// The outer `Result` is the nom parse result (truncation, malformed
/// framing); the inner `Result` singles out an unrecognized format version
/// byte, which is a recognized-but-unsupported input rather than a parse
/// failure, and maps to `Error::UnsupportedVersion` at the call site.
pub fn header(i: &[u8]) -> IResult<&[u8], Result<Header, u8>> {
    let (i, _) = format_descriptor(i)?;
    let (i, version) = format_version(i)?;
    let fmt = match version {
        Ok(fmt) => fmt,
        Err(byte) => return Ok((i, Err(byte))),
    };
    let (i, seqty) = match fmt {
        FormatVersion::V1 => (i, SequenceType::Dna),
        FormatVersion::V2 => sequence_type(i)?,
    };
    let (i, f) = flags(i)?;
    let (i, sep) = name_separator(i)?;
    let (i, ll) = line_length(i)?;
    let (i, nseq) = number_of_sequences(i)?;
    Ok((
        i,
        Ok(Header {
            format_version: fmt,
            sequence_type: seqty,
            flags: f,
            name_separator: sep,
            line_length: ll,
            number_of_sequences: nseq,
        }),
    ))
}

/// Parse a section frame header: `(original_size, compressed_size)`.
pub fn section_frame(i: &[u8]) -> IResult<&[u8], (u64, u64)> {
    let (i, original_size) = self::variable_u64(i)?;
    let (i, compressed_size) = self::variable_u64(i)?;
    Ok((i, (original_size, compressed_size)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header() {
        // magic, version 1, flags 0x00, separator ' ', line_length 60, n_sequences 32
        const HEADER: [u8; 8] = [0x01, 0xF9, 0xEC, 0x01, 0x00, 0x20, 0x3C, 0x20];
        let (i, h) = super::header(&HEADER[..]).unwrap();
        let h = h.unwrap();
        assert_eq!(h.name_separator(), ' ');
        assert_eq!(h.line_length(), 60);
        assert_eq!(h.number_of_sequences(), 32);
        assert_eq!(i, b"");
    }

    #[test]
    fn header_empty_archive() {
        const HEADER: [u8; 8] = [0x01, 0xF9, 0xEC, 0x01, 0x00, 0x20, 0x00, 0x00];
        let (i, h) = super::header(&HEADER[..]).unwrap();
        let h = h.unwrap();
        assert_eq!(h.number_of_sequences(), 0);
        assert_eq!(h.flags().as_byte(), 0x00);
        assert_eq!(i, b"");
    }

    #[test]
    fn flags_bit_order() {
        let (_, f) = super::flags(&[0x80][..]).unwrap();
        assert!(f.test(Flag::Quality));
        assert!(!f.test(Flag::Extended));

        let (_, f) = super::flags(&[0x01][..]).unwrap();
        assert!(f.test(Flag::Extended));
        assert!(!f.test(Flag::Quality));
    }

    #[test]
    fn header_reports_unsupported_version_byte() {
        const HEADER: [u8; 4] = [0x01, 0xF9, 0xEC, 0x03];
        let (_, h) = super::header(&HEADER[..]).unwrap();
        assert!(matches!(h, Err(3)));
    }

    #[test]
    fn variable_u64_rejects_redundant_leading_byte() {
        assert!(super::variable_u64(&[0x80, 0x01][..]).is_err());
    }
}
