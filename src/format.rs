//! Output projections over a decoded archive, shared between the library
//! and the `naf-cli` front-end.
//!
//! A [`Projection`] names one of the mutually-exclusive views the `unnaf`
//! command line exposes; [`write_projection`] drives the `Decoder` and
//! writes the selected view to an arbitrary sink, so the CLI itself
//! contains no format-specific logic beyond argument parsing.

use std::fmt;
use std::io::BufRead;
use std::io::Seek;
use std::io::Write;
use std::path::Path;

use crate::data::Flag;
use crate::data::Flags;
use crate::data::MaskUnit;
use crate::data::Size;
use crate::decoder::section_sizes;
use crate::error::Error;
use crate::Decoder;
use crate::DecoderBuilder;

/// One of the mutually-exclusive output views of an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Sequence type and format version.
    Format,
    /// The set of sections present in the archive.
    PartList,
    /// Original and compressed size of each present section.
    Sizes,
    /// Number of sequences in the archive.
    Number,
    /// The archive title.
    Title,
    /// Sequence identifiers, one per line.
    Ids,
    /// Sequence identifiers and names, one pair per line.
    Names,
    /// Sequence lengths, one per line.
    Lengths,
    /// Sum of all sequence lengths.
    TotalLength,
    /// Mask runs, one per line.
    Mask,
    /// Sum of all masked-run lengths.
    TotalMaskLength,
    /// Raw decompressed 4-bit packed nucleotide bytes.
    FourBit,
    /// All sequences concatenated with no separator.
    Seq,
    /// Sequences, one per line.
    Sequences,
    /// Reconstituted FASTA records.
    Fasta,
    /// Reconstituted FASTQ records.
    Fastq,
}

impl Projection {
    /// The flags needed to open a [`DecoderBuilder`] for this projection,
    /// and whether the mask should be applied to decoded sequence text.
    fn flags(&self, no_mask: bool) -> Flags {
        match self {
            Projection::Format | Projection::PartList | Projection::Sizes | Projection::Number => {
                Flags::new()
            }
            Projection::Lengths | Projection::TotalLength => Flag::Length.into(),
            Projection::Title => Flag::Title.into(),
            Projection::Ids => Flag::Id.into(),
            Projection::Names => Flag::Id | Flag::Name,
            Projection::Mask | Projection::TotalMaskLength => Flag::Mask.into(),
            Projection::FourBit => Flag::Data.into(),
            Projection::Seq | Projection::Sequences => Flag::Length | Flag::Data,
            Projection::Fasta => {
                let mut flags = Flag::Id | Flag::Name | Flag::Length | Flag::Data;
                if !no_mask {
                    flags |= Flag::Mask;
                }
                flags
            }
            Projection::Fastq => {
                let mut flags = Flag::Id | Flag::Name | Flag::Length | Flag::Data | Flag::Quality;
                if !no_mask {
                    flags |= Flag::Mask;
                }
                flags
            }
        }
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Projection::Format => "Format",
            Projection::PartList => "Part List",
            Projection::Sizes => "Sizes",
            Projection::Number => "Number",
            Projection::Title => "Title",
            Projection::Ids => "IDs",
            Projection::Names => "Names",
            Projection::Lengths => "Lengths",
            Projection::TotalLength => "Total Length",
            Projection::Mask => "Mask",
            Projection::TotalMaskLength => "Total Mask Length",
            Projection::FourBit => "Four Bit",
            Projection::Seq => "Seq",
            Projection::Sequences => "Sequences",
            Projection::Fasta => "FASTA",
            Projection::Fastq => "FASTQ",
        };
        f.write_str(name)
    }
}

/// Decode `path` per `projection` and write the result to `writer`.
///
/// `line_length`, if `Some`, overrides the archive's declared default line
/// length when wrapping FASTA sequence lines; `Some(0)` means no wrapping
/// at all, `None` means use the archive's declared default. FASTQ records
/// are always emitted as four unwrapped lines and ignore `line_length`.
/// `no_mask` disables lowercase-masking in the textual projections that
/// would otherwise apply it.
pub fn write_projection<W: Write, P: AsRef<Path>>(
    path: P,
    projection: Projection,
    line_length: Option<u64>,
    no_mask: bool,
    writer: &mut W,
) -> Result<(), Error> {
    let path = path.as_ref();

    if projection == Projection::Sizes {
        let sizes = sizes_from_path(path)?;
        for size in &sizes {
            writeln!(writer, "{size}")?;
        }
        return Ok(());
    }

    let flags = projection.flags(no_mask);
    let mut decoder = DecoderBuilder::from_flags(flags).with_path(path)?;
    let wrap = line_length.unwrap_or_else(|| decoder.header().line_length());

    match projection {
        Projection::Format => {
            let header = decoder.header();
            writeln!(
                writer,
                "{:?} sequences in NAF format {:?}",
                header.sequence_type(),
                header.format_version()
            )?;
        }
        Projection::PartList => {
            writeln!(writer, "{}", decoder.header().flags())?;
        }
        Projection::Sizes => unreachable!("handled above"),
        Projection::Number => {
            writeln!(writer, "{}", decoder.header().number_of_sequences())?;
        }
        Projection::Title => {
            let title = decoder
                .title()
                .ok_or(Error::UnsupportedProjection("title"))?;
            writeln!(writer, "{title}")?;
        }
        Projection::Lengths => {
            for length in decoder.lengths() {
                writeln!(writer, "{length}")?;
            }
        }
        Projection::TotalLength => {
            let total: u64 = decoder.lengths().iter().sum();
            writeln!(writer, "{total}")?;
        }
        Projection::Mask => {
            for run in decoder.mask_runs()? {
                match run {
                    MaskUnit::Masked(n) => writeln!(writer, "masked: {n}")?,
                    MaskUnit::Unmasked(n) => writeln!(writer, "unmasked: {n}")?,
                }
            }
        }
        Projection::TotalMaskLength => {
            let total: u64 = decoder
                .mask_runs()?
                .into_iter()
                .map(|unit| match unit {
                    MaskUnit::Masked(n) => n,
                    MaskUnit::Unmasked(_) => 0,
                })
                .sum();
            writeln!(writer, "{total}")?;
        }
        Projection::FourBit => {
            let bytes = decoder
                .raw_data()?
                .ok_or(Error::UnsupportedProjection("4bit"))?;
            writer.write_all(&bytes)?;
        }
        Projection::Ids => {
            for record in decoder {
                let record = record?;
                let id = record.id.ok_or(Error::UnsupportedProjection("ids"))?;
                writeln!(writer, "{id}")?;
            }
        }
        Projection::Names => {
            for record in decoder {
                let record = record?;
                let id = record.id.unwrap_or_default();
                let name = record.name.unwrap_or_default();
                writeln!(writer, "{id} {name}")?;
            }
        }
        Projection::Seq => {
            for record in decoder {
                let record = record?;
                if let Some(sequence) = record.sequence {
                    write!(writer, "{sequence}")?;
                }
            }
        }
        Projection::Sequences => {
            for record in decoder {
                let record = record?;
                if let Some(sequence) = record.sequence {
                    writeln!(writer, "{sequence}")?;
                }
            }
        }
        Projection::Fasta => {
            let sep = decoder.header().name_separator();
            for record in decoder {
                let record = record?;
                let id = record.id.unwrap_or_default();
                let sequence = record.sequence.unwrap_or_default();
                match record.name {
                    Some(name) if !name.is_empty() => writeln!(writer, ">{id}{sep}{name}")?,
                    _ => writeln!(writer, ">{id}")?,
                }
                write_wrapped(writer, &sequence, wrap)?;
            }
        }
        Projection::Fastq => {
            let sep = decoder.header().name_separator();
            for record in decoder {
                let record = record?;
                let id = record.id.unwrap_or_default();
                let sequence = record.sequence.unwrap_or_default();
                let quality = record
                    .quality
                    .ok_or(Error::UnsupportedProjection("fastq"))?;
                match record.name {
                    Some(name) if !name.is_empty() => writeln!(writer, "@{id}{sep}{name}")?,
                    _ => writeln!(writer, "@{id}")?,
                }
                writeln!(writer, "{sequence}")?;
                writeln!(writer, "+")?;
                writeln!(writer, "{quality}")?;
            }
        }
    }

    Ok(())
}

/// Write `text` to `writer`, inserting a newline every `wrap` characters
/// (or none at all, if `wrap` is zero).
fn write_wrapped<W: Write>(writer: &mut W, text: &str, wrap: u64) -> Result<(), Error> {
    if wrap == 0 {
        writeln!(writer, "{text}")?;
        return Ok(());
    }
    let wrap = wrap as usize;
    let bytes = text.as_bytes();
    for chunk in bytes.chunks(wrap) {
        writer.write_all(chunk)?;
        writer.write_all(b"\n")?;
    }
    if bytes.is_empty() {
        writer.write_all(b"\n")?;
    }
    Ok(())
}

/// Report the original and compressed size of every section present in
/// the archive at `path`, without decoding any section's payload.
pub fn sizes_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<Size>, Error> {
    let file = std::fs::File::open(path)?;
    sizes_from_reader(std::io::BufReader::new(file))
}

/// Report the original and compressed size of every section present in
/// the archive read from `reader`, without decoding any section's payload.
pub fn sizes_from_reader<R: BufRead + Seek>(reader: R) -> Result<Vec<Size>, Error> {
    section_sizes(reader)
}
