use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::io::IsTerminal;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use clap::ValueEnum;

use naf::format::write_projection;
use naf::format::Projection;
use naf::DecoderBuilder;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum OutputType {
    Format,
    PartList,
    Sizes,
    Number,
    Title,
    Ids,
    Names,
    Lengths,
    TotalLength,
    Mask,
    TotalMaskLength,
    FourBit,
    Seq,
    Sequences,
    Fasta,
    Fastq,
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<OutputType> for Projection {
    fn from(value: OutputType) -> Self {
        match value {
            OutputType::Format => Projection::Format,
            OutputType::PartList => Projection::PartList,
            OutputType::Sizes => Projection::Sizes,
            OutputType::Number => Projection::Number,
            OutputType::Title => Projection::Title,
            OutputType::Ids => Projection::Ids,
            OutputType::Names => Projection::Names,
            OutputType::Lengths => Projection::Lengths,
            OutputType::TotalLength => Projection::TotalLength,
            OutputType::Mask => Projection::Mask,
            OutputType::TotalMaskLength => Projection::TotalMaskLength,
            OutputType::FourBit => Projection::FourBit,
            OutputType::Seq => Projection::Seq,
            OutputType::Sequences => Projection::Sequences,
            OutputType::Fasta => Projection::Fasta,
            OutputType::Fastq => Projection::Fastq,
        }
    }
}

/// Decode Nucleotide Archive Format (NAF) files.
#[derive(Debug, Parser)]
#[command(name = "unnaf", version, about = "Decode NAF files", long_about = None)]
struct Args {
    /// Write uncompressed output to FILE -- write to STDOUT if not specified.
    #[arg(short, long, value_name = "FILE")]
    output: Option<String>,

    /// What to extract from the archive.
    #[arg(short = 't', long, value_name = "TYPE")]
    output_type: Option<OutputType>,

    /// Override line length to N (0 disables wrapping; unset uses the
    /// archive's declared default).
    #[arg(long, value_name = "N")]
    line_length: Option<u64>,

    /// Ignore the mask, emitting all bases uppercase.
    #[arg(long, default_value_t = false)]
    no_mask: bool,

    /// File to decode.
    filename: String,
}

fn run(args: &Args) -> Result<(), naf::Error> {
    // Default: FASTQ when the archive carries qualities, FASTA otherwise.
    let output_type = match args.output_type {
        Some(ty) => ty,
        None => {
            let header = DecoderBuilder::new()
                .sequence(false)
                .quality(false)
                .mask(false)
                .id(false)
                .name(false)
                .with_path(&args.filename)?
                .header()
                .clone();
            if header.flags().test(naf::Flag::Quality) {
                OutputType::Fastq
            } else {
                OutputType::Fasta
            }
        }
    };
    let projection = Projection::from(output_type);

    if args.output.is_none() && matches!(projection, Projection::FourBit) && std::io::stdout().is_terminal() {
        return Err(naf::Error::Config(
            "refusing to write binary 4-bit output to a terminal; use --output".to_string(),
        ));
    }

    match &args.output {
        Some(path) => {
            let file = File::create(path).map_err(naf::Error::from)?;
            let mut writer = BufWriter::new(file);
            let result = write_projection(&args.filename, projection, args.line_length, args.no_mask, &mut writer)
                .and_then(|()| writer.flush().map_err(naf::Error::from));
            if result.is_err() {
                let _ = std::fs::remove_file(path);
            }
            result
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = BufWriter::new(stdout.lock());
            write_projection(&args.filename, projection, args.line_length, args.no_mask, &mut writer)?;
            writer.flush().map_err(naf::Error::from)
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("unnaf: {e}");
            ExitCode::FAILURE
        }
    }
}
