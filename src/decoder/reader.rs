use std::ffi::CString;
use std::io::BufRead;

use crate::alphabet;
use crate::data::MaskUnit;
use crate::data::SequenceType;
use crate::error::Error;
use crate::varint;

// --- CStringReader -------------------------------------------------------------

/// Iterates over `\0`-delimited records of an already-decompressed section,
/// as used by the ids and names sections.
#[derive(Debug)]
pub struct CStringReader<R: BufRead> {
    reader: R,
}

impl<R: BufRead> CStringReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> Iterator for CStringReader<R> {
    type Item = Result<CString, std::io::Error>;
    fn next(&mut self) -> Option<Self::Item> {
        let mut buffer = Vec::new();
        match self.reader.read_until(0, &mut buffer) {
            Ok(0) => None,
            Err(e) => Some(Err(e)),
            Ok(_) => Some(Ok(CString::from_vec_with_nul(buffer)
                .expect("buffer should contain a single nul byte"))),
        }
    }
}

// --- lengths -----------------------------------------------------------------

/// Decode all `count` variable-length-encoded record lengths at once.
///
/// Unlike ids/names/sequence/quality, the lengths section is read eagerly
/// in full: the mask state machine needs the total base count (the sum of
/// all lengths) before it can start decoding its first run, so lengths
/// cannot be streamed lazily alongside the other per-record fields.
pub fn read_lengths<R: BufRead>(mut reader: R, count: u64) -> Result<Vec<u64>, Error> {
    let mut lengths = Vec::with_capacity(count as usize);
    for _ in 0..count {
        lengths.push(varint::read_u64(&mut reader)?);
    }
    Ok(lengths)
}

// --- SequenceReader ----------------------------------------------------------------

/// Streams decoded characters out of a packed 4-bit nucleotide section, or
/// verbatim bytes out of a protein/text section.
///
/// Nucleotide codes are packed two per byte, the first symbol of the pair
/// in the high nibble. A one-character cache absorbs the case where a
/// record boundary falls in the middle of a packed byte.
#[derive(Debug)]
pub struct SequenceReader<R: BufRead> {
    reader: R,
    ty: SequenceType,
    cache: Option<char>,
}

impl<R: BufRead> SequenceReader<R> {
    pub fn new(reader: R, ty: SequenceType) -> Self {
        Self {
            reader,
            ty,
            cache: None,
        }
    }

    pub fn next(&mut self, length: u64) -> Result<String, std::io::Error> {
        let l = length as usize;
        if self.ty.is_nucleotide() {
            let mut sequence = String::with_capacity(l);
            if self.cache.is_some() && l > 0 {
                sequence.push(self.cache.take().unwrap());
            }
            while sequence.len() < l {
                match self.ty {
                    SequenceType::Dna => self.read_nucleotide(l, &mut sequence, alphabet::decode_dna)?,
                    SequenceType::Rna => self.read_nucleotide(l, &mut sequence, alphabet::decode_rna)?,
                    _ => unreachable!(),
                }
            }
            Ok(sequence)
        } else {
            let mut sequence = Vec::with_capacity(l);
            while sequence.len() < l {
                self.read_text(l, &mut sequence)?;
            }
            String::from_utf8(sequence)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        }
    }

    /// Unwrap the reader, discarding the nibble cache.
    ///
    /// Used by the raw 4-bit passthrough projection, which wants the
    /// decompressed packed bytes verbatim rather than decoded characters.
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn read_text(&mut self, length: usize, sequence: &mut Vec<u8>) -> Result<(), std::io::Error> {
        let buffer = self.reader.fill_buf()?;
        let n_to_copy = buffer.len().min(length - sequence.len());
        sequence.extend_from_slice(&buffer[..n_to_copy]);
        self.reader.consume(n_to_copy);
        Ok(())
    }

    fn read_nucleotide(
        &mut self,
        length: usize,
        sequence: &mut String,
        decode: fn(u8) -> char,
    ) -> Result<(), std::io::Error> {
        let buffer = self.reader.fill_buf()?;

        let rem = length - sequence.len();
        let n = buffer.len().min(rem / 2);

        for x in buffer.iter().take(n) {
            let (hi, lo) = alphabet::split(*x);
            sequence.push(decode(hi));
            sequence.push(decode(lo));
        }

        if n < buffer.len() && sequence.len() == length - 1 {
            let (hi, lo) = alphabet::split(buffer[n]);
            sequence.push(decode(hi));
            self.cache = Some(decode(lo));
            self.reader.consume(n + 1);
        } else {
            self.reader.consume(n);
        }

        Ok(())
    }
}

// --- MaskReader --------------------------------------------------------------

/// Streams run-length-encoded mask units.
///
/// The first run is, by this format's convention, masked (lowercase). A
/// run byte of `0xFF` contributes 255 to the current run without flipping
/// the state; any byte below `0xFF` terminates the run and flips it.
#[derive(Debug)]
pub struct MaskReader<R: BufRead> {
    reader: R,
    total: u64,
    current: u64,
    mask: bool,
}

impl<R: BufRead> MaskReader<R> {
    pub fn new(reader: R, total: u64) -> Self {
        Self {
            reader,
            total,
            current: 0,
            mask: true,
        }
    }
}

impl<R: BufRead> Iterator for MaskReader<R> {
    type Item = Result<MaskUnit, std::io::Error>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.total {
            return None;
        }

        let mut n = 0u64;
        loop {
            let mut i = 0;
            let buf = match self.reader.fill_buf() {
                Err(e) => return Some(Err(e)),
                Ok(buf) if buf.is_empty() => break,
                Ok(buf) => buf,
            };
            while i < buf.len() && buf[i] == 0xFF {
                n += 0xFF;
                i += 1;
            }
            if i < buf.len() {
                n += buf[i] as u64;
                self.reader.consume(i + 1);
                break;
            }
            self.reader.consume(i);
        }

        self.current += n;
        if self.mask {
            self.mask = false;
            Some(Ok(MaskUnit::Masked(n)))
        } else {
            self.mask = true;
            Some(Ok(MaskUnit::Unmasked(n)))
        }
    }
}
