//! Integration tests exercising the decoder against small archives built
//! in memory, compressed with the crate's own `zstd` dependency purely as
//! a test fixture builder (not a production encoder).

use std::io::Cursor;
use std::io::Write;

use naf::DecoderBuilder;
use naf::Flag;

/// Encode `n` as a variable-length big-endian 7-bit-group integer.
fn varint(mut n: u64) -> Vec<u8> {
    let mut groups = vec![(n & 0x7F) as u8];
    n >>= 7;
    while n > 0 {
        groups.push((n & 0x7F) as u8 | 0x80);
        n >>= 7;
    }
    groups.reverse();
    groups
}

/// Compress `data` with zstd, omitting the magic bytes, exactly as the
/// decoder expects each section's payload to be framed.
fn zstd_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = zstd::Encoder::new(Vec::new(), 0).unwrap();
    encoder.include_magicbytes(false).unwrap();
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn push_section(out: &mut Vec<u8>, raw: &[u8]) {
    let compressed = zstd_compress(raw);
    out.extend(varint(raw.len() as u64));
    out.extend(varint(compressed.len() as u64));
    out.extend(compressed);
}

struct ArchiveBuilder {
    flags: u8,
    line_length: u64,
    number_of_sequences: u64,
    title: Option<Vec<u8>>,
    ids: Option<Vec<u8>>,
    names: Option<Vec<u8>>,
    lengths: Option<Vec<u8>>,
    mask: Option<Vec<u8>>,
    data: Option<Vec<u8>>,
    quality: Option<Vec<u8>>,
}

impl ArchiveBuilder {
    fn new(number_of_sequences: u64) -> Self {
        Self {
            flags: 0,
            line_length: 60,
            number_of_sequences,
            title: None,
            ids: None,
            names: None,
            lengths: None,
            mask: None,
            data: None,
            quality: None,
        }
    }

    fn ids(mut self, raw: Vec<u8>) -> Self {
        self.flags |= Flag::Id.as_byte();
        self.ids = Some(raw);
        self
    }

    fn names(mut self, raw: Vec<u8>) -> Self {
        self.flags |= Flag::Name.as_byte();
        self.names = Some(raw);
        self
    }

    fn lengths(mut self, lengths: &[u64]) -> Self {
        self.flags |= Flag::Length.as_byte();
        let mut raw = Vec::new();
        for &l in lengths {
            raw.extend(varint(l));
        }
        self.lengths = Some(raw);
        self
    }

    fn mask(mut self, raw: Vec<u8>) -> Self {
        self.flags |= Flag::Mask.as_byte();
        self.mask = Some(raw);
        self
    }

    fn data(mut self, raw: Vec<u8>) -> Self {
        self.flags |= Flag::Data.as_byte();
        self.data = Some(raw);
        self
    }

    fn quality(mut self, raw: Vec<u8>) -> Self {
        self.flags |= Flag::Quality.as_byte();
        self.quality = Some(raw);
        self
    }

    fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend([0x01, 0xF9, 0xEC]);
        out.push(2); // format version 2
        out.push(0); // sequence type: Dna
        out.push(self.flags);
        out.push(b' '); // name separator
        out.extend(varint(self.line_length));
        out.extend(varint(self.number_of_sequences));

        if let Some(raw) = &self.title {
            push_section(&mut out, raw);
        }
        if let Some(raw) = &self.ids {
            push_section(&mut out, raw);
        }
        if let Some(raw) = &self.names {
            push_section(&mut out, raw);
        }
        if let Some(raw) = &self.lengths {
            push_section(&mut out, raw);
        }
        if let Some(raw) = &self.mask {
            push_section(&mut out, raw);
        }
        if let Some(raw) = &self.data {
            push_section(&mut out, raw);
        }
        if let Some(raw) = &self.quality {
            push_section(&mut out, raw);
        }
        out
    }
}

#[test]
fn decodes_single_unmasked_record() {
    // Id "s1", sequence "ACGT" packed as 0x84, 0x21 (A=8,C=4 | G=2,T=1).
    let bytes = ArchiveBuilder::new(1)
        .ids(b"s1\0".to_vec())
        .lengths(&[4])
        .data(vec![0x84, 0x21])
        .build();

    let mut decoder = DecoderBuilder::new()
        .with_reader(Cursor::new(bytes))
        .unwrap();
    let record = decoder.next().unwrap().unwrap();
    assert_eq!(record.id.as_deref(), Some("s1"));
    assert_eq!(record.sequence.as_deref(), Some("ACGT"));
    assert_eq!(record.length, Some(4));
    assert!(decoder.next().is_none());
}

#[test]
fn decodes_empty_archive_with_all_flags_clear() {
    let bytes = ArchiveBuilder::new(0).build();
    let mut decoder = DecoderBuilder::new()
        .with_reader(Cursor::new(bytes))
        .unwrap();
    assert_eq!(decoder.header().number_of_sequences(), 0);
    assert!(decoder.next().is_none());
}

#[test]
fn applies_mask_starting_masked() {
    // Sequence "ACGTAC", mask runs [2, 2, 2] starting masked:
    // "ac" "GT" "ac" -> "acGTac"
    // Packed: A=8 C=4 | G=2 T=1 | A=8 C=4
    let bytes = ArchiveBuilder::new(1)
        .ids(b"s1\0".to_vec())
        .lengths(&[6])
        .mask(vec![2, 2, 2])
        .data(vec![0x84, 0x21, 0x84])
        .build();

    let mut decoder = DecoderBuilder::new()
        .with_reader(Cursor::new(bytes))
        .unwrap();
    let record = decoder.next().unwrap().unwrap();
    assert_eq!(record.sequence.as_deref(), Some("acGTac"));
}

#[test]
fn mask_run_ending_exactly_at_record_boundary_toggles_for_next_record() {
    // Two records of length 2 each: "AC" "GT", mask run [2, 2] spans
    // exactly one record per run, so the second record starts unmasked.
    let mut ids = Vec::new();
    ids.extend(b"s1\0");
    ids.extend(b"s2\0");

    let bytes = ArchiveBuilder::new(2)
        .ids(ids)
        .lengths(&[2, 2])
        .mask(vec![2, 2])
        .data(vec![0x84, 0x21])
        .build();

    let mut decoder = DecoderBuilder::new()
        .with_reader(Cursor::new(bytes))
        .unwrap();
    let first = decoder.next().unwrap().unwrap();
    let second = decoder.next().unwrap().unwrap();
    assert_eq!(first.sequence.as_deref(), Some("ac"));
    assert_eq!(second.sequence.as_deref(), Some("GT"));
}

#[test]
fn mask_0xff_run_extends_without_flipping() {
    let mut raw_data = Vec::with_capacity(133);
    // 265 'A' bases, all masked (lowercase), packed two per byte.
    for _ in 0..133 {
        raw_data.push(0x88); // A, A
    }

    let bytes = ArchiveBuilder::new(1)
        .ids(b"s1\0".to_vec())
        .lengths(&[265])
        .mask(vec![0xFF, 10])
        .data(raw_data)
        .build();

    let mut decoder = DecoderBuilder::new()
        .with_reader(Cursor::new(bytes))
        .unwrap();
    let record = decoder.next().unwrap().unwrap();
    let sequence = record.sequence.unwrap();
    assert_eq!(sequence.len(), 265);
    assert!(sequence.chars().all(|c| c == 'a'));
}

#[test]
fn rejects_unsupported_format_version() {
    let mut bytes = vec![0x01, 0xF9, 0xEC, 0x03];
    bytes.extend([0x00, b' ']);
    bytes.extend(varint(60));
    bytes.extend(varint(0));
    let result = DecoderBuilder::new().with_reader(Cursor::new(bytes));
    assert!(result.is_err());
}

#[test]
fn rejects_truncated_header() {
    let bytes = vec![0x01, 0xF9, 0xEC, 0x02];
    let result = DecoderBuilder::new().with_reader(Cursor::new(bytes));
    assert!(matches!(result, Err(naf::Error::Truncated)));
}

#[test]
fn sizes_projection_reports_every_present_section() {
    let bytes = ArchiveBuilder::new(1)
        .ids(b"s1\0".to_vec())
        .lengths(&[4])
        .data(vec![0x84, 0x21])
        .build();

    let sizes = naf::format::sizes_from_reader(Cursor::new(bytes)).unwrap();
    let names: Vec<&str> = sizes.iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["ids", "lengths", "data"]);
}

#[test]
fn four_bit_projection_is_raw_passthrough() {
    let bytes = ArchiveBuilder::new(1)
        .ids(b"s1\0".to_vec())
        .lengths(&[4])
        .data(vec![0x84, 0x21])
        .build();

    let mut decoder = DecoderBuilder::new()
        .with_reader(Cursor::new(bytes))
        .unwrap();
    let raw = decoder.raw_data().unwrap().unwrap();
    assert_eq!(raw, vec![0x84, 0x21]);
}

#[test]
fn fasta_projection_wraps_and_lowercases_masked_bases() {
    let mut ids = Vec::new();
    ids.extend(b"s1\0");
    let mut names = Vec::new();
    names.extend(b"example record\0");

    let bytes = ArchiveBuilder::new(1)
        .ids(ids)
        .names(names)
        .lengths(&[6])
        .mask(vec![2, 2, 2])
        .data(vec![0x84, 0x21, 0x84])
        .build();

    let path = std::env::temp_dir().join("naf-test-fasta-projection.naf");
    std::fs::write(&path, &bytes).unwrap();

    let mut out = Vec::new();
    naf::format::write_projection(&path, naf::format::Projection::Fasta, Some(3), false, &mut out)
        .unwrap();
    std::fs::remove_file(&path).ok();

    let text = String::from_utf8(out).unwrap();
    assert_eq!(text, ">s1 example record\nacG\nTac\n");
}

#[test]
fn fastq_projection_emits_unwrapped_four_line_records() {
    // Sequence "ACGT" with quality bytes "!!!!", no mask. A line length
    // of 2 must have no effect: FASTQ records are never wrapped.
    let bytes = ArchiveBuilder::new(1)
        .ids(b"s1\0".to_vec())
        .lengths(&[4])
        .data(vec![0x84, 0x21])
        .quality(b"!!!!".to_vec())
        .build();

    let path = std::env::temp_dir().join("naf-test-fastq-projection.naf");
    std::fs::write(&path, &bytes).unwrap();

    let mut out = Vec::new();
    naf::format::write_projection(&path, naf::format::Projection::Fastq, Some(2), false, &mut out)
        .unwrap();
    std::fs::remove_file(&path).ok();

    let text = String::from_utf8(out).unwrap();
    assert_eq!(text, "@s1\nACGT\n+\n!!!!\n");
}

#[test]
fn number_projection_reads_header_count_without_lengths_section() {
    // Ids-only archive: the sequence count lives in the header, not in a
    // materialized lengths vector (there is no Lengths section at all).
    let bytes = ArchiveBuilder::new(3).ids(b"s1\0s2\0s3\0".to_vec()).build();

    let path = std::env::temp_dir().join("naf-test-number-projection.naf");
    std::fs::write(&path, &bytes).unwrap();

    let mut out = Vec::new();
    naf::format::write_projection(&path, naf::format::Projection::Number, None, false, &mut out)
        .unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(String::from_utf8(out).unwrap(), "3\n");
}
