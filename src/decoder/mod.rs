use std::borrow::Cow;
use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Cursor;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::iter::FusedIterator;
use std::path::Path;
use std::sync::RwLock;

mod ioslice;
mod parser;
mod reader;

use self::ioslice::IoSlice;
use self::reader::CStringReader;
use self::reader::MaskReader;
use self::reader::SequenceReader;
use crate::data::Flag;
use crate::data::Flags;
use crate::data::Header;
use crate::data::MaskUnit;
use crate::data::Record;
use crate::data::SequenceType;
use crate::data::Size;
use crate::error::Error;
use crate::Rc;

/// The wrapper used to decode a Zstandard section stream.
type ZstdDecoder<'z, R> = BufReader<zstd::Decoder<'z, BufReader<IoSlice<R>>>>;

/// A builder to configure and initialize a [`Decoder`].
///
/// The fields to decode are *opt-out*: by default, the [`Decoder`] will
/// extract all available fields found in the archive into each [`Record`].
/// Use the provided methods to avoid decoding unneeded fields.
///
/// ```rust
/// let decoder = naf::DecoderBuilder::new()
///     .sequence(false)
///     .quality(false)
///     .with_bytes(&[0x01, 0xF9, 0xEC, 0x01, 0x00, 0x20, 0x00, 0x00])
///     .unwrap();
/// assert_eq!(decoder.count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct DecoderBuilder {
    buffer_size: usize,
    id: bool,
    name: bool,
    sequence: bool,
    quality: bool,
    mask: bool,
}

impl DecoderBuilder {
    /// Create a new decoder builder with default parameters.
    ///
    /// By default, all fields are extracted if they are available in
    /// the header.
    pub fn new() -> Self {
        Self {
            buffer_size: 4096,
            id: true,
            name: true,
            sequence: true,
            quality: true,
            mask: true,
        }
    }

    /// Create a new decoder builder from the given flags.
    ///
    /// This constructor can be used as a shortcut to setup decoding
    /// of a subset of supported fields. For instance, to read only the
    /// sequence identifiers and quality lines from an archive:
    /// ```
    /// # use naf::{DecoderBuilder, Flag};
    /// let mut builder = DecoderBuilder::from_flags(Flag::Id | Flag::Quality);
    /// ```
    pub fn from_flags<F: Into<Flags>>(flags: F) -> Self {
        let flags = flags.into();
        let mut builder = Self::new();
        builder.quality(flags.test(Flag::Quality));
        builder.sequence(flags.test(Flag::Data));
        builder.mask(flags.test(Flag::Mask));
        builder.name(flags.test(Flag::Name));
        builder
    }

    /// The buffer size to use while reading.
    ///
    /// Note that [`Decoder`] uses a lot of buffered I/O, and that more than
    /// one buffer will be created. Nevertheless, a higher value will reduce
    /// the necessity to seek the reader while reading the different blocks.
    ///
    /// By default, a buffer size of 4KiB is used for each internal buffer.
    pub fn buffer_size(&mut self, buffer_size: usize) -> &mut Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Whether or not to decode the sequence identifiers if available.
    #[inline]
    pub fn id(&mut self, id: bool) -> &mut Self {
        self.id = id;
        self
    }

    /// Whether or not to decode the sequence name if available.
    #[inline]
    pub fn name(&mut self, name: bool) -> &mut Self {
        self.name = name;
        self
    }

    /// Whether or not to decode the sequence string if available.
    #[inline]
    pub fn sequence(&mut self, sequence: bool) -> &mut Self {
        self.sequence = sequence;
        self
    }

    /// Whether or not to decode the quality string if available.
    #[inline]
    pub fn quality(&mut self, quality: bool) -> &mut Self {
        self.quality = quality;
        self
    }

    /// Whether or not to perform region masking in the output sequence.
    #[inline]
    pub fn mask(&mut self, mask: bool) -> &mut Self {
        self.mask = mask;
        self
    }

    /// Consume the builder to get a decoder reading data from the given buffer.
    pub fn with_bytes<'data, 'z>(
        &self,
        bytes: &'data [u8],
    ) -> Result<Decoder<'z, BufReader<Cursor<&'data [u8]>>>, Error> {
        self.with_reader(BufReader::new(Cursor::new(bytes)))
    }

    /// Consume the builder to get a decoder reading a file at the given path.
    pub fn with_path<'z, P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<Decoder<'z, BufReader<File>>, Error> {
        File::open(path.as_ref())
            .map_err(Error::from)
            .and_then(|f| self.with_reader(std::io::BufReader::new(f)))
    }

    /// Consume the builder to get a decoder reading data from `reader`.
    pub fn with_reader<'z, R: BufRead + Seek>(&self, mut reader: R) -> Result<Decoder<'z, R>, Error> {
        let buffer = reader.fill_buf()?;
        let header = match self::parser::header(buffer) {
            Ok((i, Ok(header))) => {
                let consumed = buffer.len() - i.len();
                reader.consume(consumed);
                header
            }
            Ok((_, Err(version))) => {
                log::debug!("unsupported archive format version: {version}");
                return Err(Error::UnsupportedVersion(version));
            }
            Err(nom::Err::Incomplete(_)) => {
                log::debug!("archive header truncated");
                return Err(Error::Truncated);
            }
            Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
                let err = Error::from(e);
                log::debug!("failed to parse archive header: {err}");
                return Err(err);
            }
        };

        log::trace!("parsed header: {:?}", header);

        let rc = Rc::new(RwLock::new(reader));
        let flags = header.flags();

        let title = if flags.test(Flag::Title) {
            Some(Self::read_section_to_string(&rc, self.buffer_size)?)
        } else {
            None
        };

        // The lengths section is decoded eagerly and in full: the mask
        // state machine needs the total base count (the sum of all
        // lengths) before it can decode its first run, so lengths must be
        // known before the mask section is set up.
        let lengths = if flags.test(Flag::Length) {
            Self::read_lengths_section(&rc, self.buffer_size, header.number_of_sequences())?
        } else {
            Vec::new()
        };
        let total_bases: u64 = lengths.iter().sum();

        macro_rules! setup_block {
            ($flags:expr, $flag:ident, $use_block:expr, $rc:ident, $block:ident) => {
                let $block;
                if $flags.test(Flag::$flag) {
                    let tee = $rc.clone();
                    let mut handle = $rc.write().unwrap();
                    let buf = handle.fill_buf()?;
                    let (i, (_original_size, compressed_size)) = self::parser::section_frame(buf)?;
                    let consumed = buf.len() - i.len();
                    handle.consume(consumed);
                    if $use_block {
                        let pos = handle.stream_position()?;
                        let tee_slice = IoSlice::new(tee, pos, pos + compressed_size);
                        let mut decoder = zstd::stream::read::Decoder::new(tee_slice)?;
                        decoder.include_magicbytes(false)?;
                        $block = Some(BufReader::with_capacity(self.buffer_size, decoder));
                    } else {
                        $block = None;
                    }
                    handle.seek(SeekFrom::Current(compressed_size as i64))?;
                } else {
                    $block = None;
                }
            };
        }

        setup_block!(flags, Id, self.id, rc, ids_block);
        setup_block!(flags, Name, self.name, rc, name_block);
        setup_block!(flags, Mask, self.mask, rc, mask_block);
        setup_block!(flags, Data, self.sequence, rc, seq_block);
        setup_block!(flags, Quality, self.quality, rc, quality_block);

        Ok(Decoder {
            title,
            lengths,
            ids: ids_block.map(CStringReader::new),
            name: name_block.map(CStringReader::new),
            seq: seq_block.map(|x| SequenceReader::new(x, header.sequence_type())),
            qual: quality_block.map(|x| SequenceReader::new(x, SequenceType::Text)),
            mask: mask_block.map(|x| MaskReader::new(x, total_bases)),
            n: 0,
            header,
            reader: rc,
            unit: MaskUnit::Masked(0),
        })
    }

    /// Decompress the lengths section in place and decode it into a vector
    /// of `count` varint-encoded sequence lengths.
    fn read_lengths_section<R: BufRead + Seek>(
        rc: &Rc<RwLock<R>>,
        buffer_size: usize,
        count: u64,
    ) -> Result<Vec<u64>, Error> {
        let (start, compressed_size) = {
            let mut handle = rc.write().unwrap();
            let buf = handle.fill_buf()?;
            let (i, (_original_size, compressed_size)) = self::parser::section_frame(buf)?;
            let consumed = buf.len() - i.len();
            handle.consume(consumed);
            let pos = handle.stream_position()?;
            handle.seek(SeekFrom::Current(compressed_size as i64))?;
            (pos, compressed_size)
        };

        let tee_slice = IoSlice::new(rc.clone(), start, start + compressed_size);
        let mut decoder = zstd::stream::read::Decoder::new(tee_slice)?;
        decoder.include_magicbytes(false)?;
        let buffered = BufReader::with_capacity(buffer_size, decoder);
        self::reader::read_lengths(buffered, count)
    }

    /// Fully decompress a section in place and return it as a `String`,
    /// advancing the shared reader past its compressed bytes.
    ///
    /// Used for the title section, which (unlike ids/names/lengths) is
    /// never streamed since it is read exactly once as a whole.
    fn read_section_to_string<R: BufRead + Seek>(
        rc: &Rc<RwLock<R>>,
        buffer_size: usize,
    ) -> Result<String, Error> {
        let (start, compressed_size, original_size) = {
            let mut handle = rc.write().unwrap();
            let buf = handle.fill_buf()?;
            let (i, (original_size, compressed_size)) = self::parser::section_frame(buf)?;
            let consumed = buf.len() - i.len();
            handle.consume(consumed);
            let pos = handle.stream_position()?;
            handle.seek(SeekFrom::Current(compressed_size as i64))?;
            (pos, compressed_size, original_size)
        };

        let tee_slice = IoSlice::new(rc.clone(), start, start + compressed_size);
        let mut decoder = zstd::stream::read::Decoder::new(tee_slice)?;
        decoder.include_magicbytes(false)?;
        let mut buffered = BufReader::with_capacity(buffer_size, decoder);
        let mut out = String::new();
        buffered.read_to_string(&mut out)?;
        if out.len() as u64 != original_size {
            return Err(Error::corrupt("title section size does not match declared size"));
        }
        Ok(out)
    }
}

impl Default for DecoderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A decoder for Nucleotide Archival Format archives.
///
/// The internal reader is shared and accessed non-sequentially to read the
/// different section components of the archive. This means that the
/// internal reader is heavily [`Seek`]-ed, so make sure that the actual
/// type has a fast seeking implementation.
///
/// By default, the decoder will decode all available fields, which may not
/// be needed. Use a [`DecoderBuilder`] to configure decoding of individual
/// fields.
///
/// # Thread safety
///
/// By default, `Decoder` objects are not [`Send`] because they use reference
/// counting to share the reader between the different section parsers.
/// Compile the crate with the *arc* feature to use [`Arc`](std::sync::Arc)
/// instead of [`Rc`](std::rc::Rc), making the decoder [`Send`].
pub struct Decoder<'z, R: BufRead + Seek> {
    header: Header,
    reader: Rc<RwLock<R>>,
    title: Option<String>,
    lengths: Vec<u64>,
    ids: Option<CStringReader<ZstdDecoder<'z, R>>>,
    name: Option<CStringReader<ZstdDecoder<'z, R>>>,
    seq: Option<SequenceReader<ZstdDecoder<'z, R>>>,
    qual: Option<SequenceReader<ZstdDecoder<'z, R>>>,
    mask: Option<MaskReader<ZstdDecoder<'z, R>>>,
    n: usize,
    unit: MaskUnit,
}

impl Decoder<'_, BufReader<File>> {
    /// Create a new decoder from the given path.
    ///
    /// This constructor is a shortcut for `DecoderBuilder::new().with_path(path)`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        DecoderBuilder::new().with_path(path)
    }
}

impl<R: BufRead + Seek> Decoder<'_, R> {
    /// Create a new decoder from the given reader.
    ///
    /// This constructor is a shortcut for `DecoderBuilder::new().with_reader(reader)`.
    pub fn new(reader: R) -> Result<Self, Error> {
        DecoderBuilder::new().with_reader(reader)
    }

    /// Get the header extracted from the archive.
    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Get the type of sequence in the archive being decoded.
    #[inline]
    pub fn sequence_type(&self) -> SequenceType {
        self.header().sequence_type()
    }

    /// Get the archive title, if present.
    #[inline]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Get the decoded sequence lengths, if the lengths section is present.
    #[inline]
    pub fn lengths(&self) -> &[u64] {
        &self.lengths
    }

    /// Drain the mask section into a vector of runs, consuming it.
    ///
    /// Intended for the `--mask` / `--total-mask-length` projections, which
    /// report on the mask stream directly rather than through decoded
    /// records.
    pub fn mask_runs(&mut self) -> Result<Vec<MaskUnit>, Error> {
        let mut runs = Vec::new();
        if let Some(mut reader) = self.mask.take() {
            while let Some(unit) = reader.next() {
                runs.push(unit?);
            }
        }
        Ok(runs)
    }

    /// Read the raw decompressed packed-nucleotide bytes verbatim, consuming
    /// the sequence data reader.
    ///
    /// This is the `--4bit` projection: unlike the textual projections, it
    /// does not decode nibbles to characters, does not apply the mask, and
    /// preserves the unused low nibble of a final odd-length byte.
    pub fn raw_data(&mut self) -> Result<Option<Vec<u8>>, Error> {
        match self.seq.take() {
            Some(reader) => {
                let mut inner = reader.into_inner();
                let mut buffer = Vec::new();
                inner.read_to_end(&mut buffer)?;
                Ok(Some(buffer))
            }
            None => Ok(None),
        }
    }

    /// Extract the internal reader.
    pub fn into_inner(self) -> R {
        let reader = self.reader.clone();
        drop(self);
        Rc::into_inner(reader)
            .expect("reference count should be 1 after decoder is dropped")
            .into_inner()
            .expect("lock shouldn't be poisoned")
    }

    /// Attempt to read the next record from the archive.
    fn next_record(&mut self) -> Result<Record<'static>, Error> {
        let id = self
            .ids
            .as_mut()
            .and_then(|r| r.next())
            .transpose()?
            .map(|id| id.into_string().map(Cow::Owned).expect("id should be valid UTF-8"));
        let name = self
            .name
            .as_mut()
            .and_then(|r| r.next())
            .transpose()?
            .map(|name| name.into_string().map(Cow::Owned).expect("name should be valid UTF-8"));
        let length = self.lengths.get(self.n).copied();

        let mut sequence: Option<Cow<'static, str>> = None;
        let mut quality = None;
        if let Some(l) = length {
            sequence = self
                .seq
                .as_mut()
                .map(|r| r.next(l))
                .transpose()?
                .map(Cow::Owned);
            quality = self
                .qual
                .as_mut()
                .map(|r| r.next(l))
                .transpose()?
                .map(Cow::Owned);
            if let Some(seq) = sequence.as_mut() {
                self.mask_sequence(seq.to_mut())?;
            }
        }

        self.n += 1;
        Ok(Record {
            id,
            name,
            sequence,
            quality,
            length,
        })
    }

    /// Apply the mask state machine to the decoded regions of `sequence`.
    fn mask_sequence(&mut self, sequence: &mut str) -> Result<(), Error> {
        let mut mask = self.unit;
        let mut seq = sequence;

        if let Some(mask_reader) = self.mask.as_mut() {
            loop {
                match mask {
                    MaskUnit::Masked(n) => {
                        if n < seq.len() as u64 {
                            seq[..n as usize].make_ascii_lowercase();
                            seq = &mut seq[n as usize..];
                        } else {
                            self.unit = MaskUnit::Masked(n - seq.len() as u64);
                            break;
                        }
                    }
                    MaskUnit::Unmasked(n) => {
                        if n < seq.len() as u64 {
                            seq = &mut seq[n as usize..];
                        } else {
                            self.unit = MaskUnit::Unmasked(n - seq.len() as u64);
                            break;
                        }
                    }
                }
                mask = match mask_reader.next() {
                    Some(Ok(x)) => x,
                    Some(Err(e)) => return Err(Error::Io(e)),
                    None => return Err(Error::Truncated),
                };
            }
        }

        Ok(())
    }
}

impl<R: BufRead + Seek> Iterator for Decoder<'_, R> {
    type Item = Result<Record<'static>, Error>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.n as u64 >= self.header.number_of_sequences() {
            return None;
        }
        Some(self.next_record())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.header.number_of_sequences() as usize - self.n;
        (remaining, Some(remaining))
    }
}

impl<R: BufRead + Seek> ExactSizeIterator for Decoder<'_, R> {}

impl<R: BufRead + Seek> FusedIterator for Decoder<'_, R> {}

/// Parse the header and walk every present section's frame, recording its
/// original and compressed size without decompressing its payload.
///
/// This grounds the `--sizes` / [`Projection::Sizes`](crate::format::Projection::Sizes)
/// output, which wants to report the whole archive's layout without paying
/// for a full decode.
pub(crate) fn section_sizes<R: BufRead + Seek>(mut reader: R) -> Result<Vec<Size>, Error> {
    let buffer = reader.fill_buf()?;
    let (i, header) = self::parser::header(buffer).map_err(|e| match e {
        nom::Err::Incomplete(_) => Error::Truncated,
        nom::Err::Error(e) | nom::Err::Failure(e) => Error::from(e),
    })?;
    let header = header.map_err(Error::UnsupportedVersion)?;
    let consumed = buffer.len() - i.len();
    reader.consume(consumed);

    let flags = header.flags();
    let mut sizes = Vec::new();
    const SECTIONS: &[(Flag, &str)] = &[
        (Flag::Title, "title"),
        (Flag::Id, "ids"),
        (Flag::Name, "names"),
        (Flag::Length, "lengths"),
        (Flag::Mask, "mask"),
        (Flag::Data, "data"),
        (Flag::Quality, "quality"),
    ];
    for &(flag, name) in SECTIONS {
        if !flags.test(flag) {
            continue;
        }
        let buf = reader.fill_buf()?;
        let (i, (original_size, compressed_size)) = self::parser::section_frame(buf)?;
        let consumed = buf.len() - i.len();
        reader.consume(consumed);
        reader.seek(SeekFrom::Current(compressed_size as i64))?;
        sizes.push(Size::new(name, original_size, compressed_size));
    }

    Ok(sizes)
}
