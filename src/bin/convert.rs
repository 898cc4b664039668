use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser};
use env_logger::Env;
use log::{error, warn};

use smelter::render::{self, Blacklist, Format, GraphOptions, Printer};
use smelter::trace::read::{TraceRecord, TraceReader};
use smelter::trace::write::Compression;
use smelter::trace::EntrySink;

#[derive(Debug, Parser)]
#[clap(
    name = "smelter-convert",
    about = "Convert template-instantiation profiling traces between formats",
    after_help = "\
Exit codes: 1 when the output file cannot be created, 2 for an unknown
format or compression mode. Unreadable or malformed inputs are skipped
with a warning.
    "
)]
struct Opt {
    // ************* //
    // *** FLAGS *** //
    // ************* //
    /// Silence all log output
    #[clap(short = 'q', long = "quiet")]
    quiet: bool,

    /// Verbose logging mode (-v, -vv, -vvv)
    #[clap(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    // *************** //
    // *** OPTIONS *** //
    // *************** //
    /// Write the converted trace to this file, or '-' for stdout
    #[clap(short = 'o', long = "output", value_name = "PATH", default_value = "-")]
    output: String,

    /// Output format: protobuf, yaml, xml, text, graphml, graphviz,
    /// nestedxml, graphml-cg, graphviz-cg, or callgrind
    #[clap(
        short = 'f',
        long = "format",
        value_name = "NAME",
        default_value = "protobuf"
    )]
    format: String,

    /// Drop instantiations matching the regex patterns in this file
    #[clap(short = 'b', long = "blacklist", value_name = "PATH")]
    blacklist: Option<PathBuf>,

    /// Name compression for the binary format: 0 literal, 1 reserved,
    /// 2 dictionary
    #[clap(
        short = 'c',
        long = "compression",
        value_name = "N",
        default_value_t = 2
    )]
    compression: u32,

    /// Read traces from these files instead of stdin
    #[clap(short = 'i', long = "input", value_name = "PATH")]
    input: Vec<PathBuf>,

    /// For call-graph formats, drop nodes cheaper than this many seconds
    #[clap(
        short = 't',
        long = "time-threshold",
        value_name = "SECONDS",
        default_value_t = 0.0
    )]
    time_threshold: f64,

    /// For call-graph formats, drop nodes cheaper than this many bytes
    #[clap(
        short = 'm',
        long = "mem-threshold",
        value_name = "BYTES",
        default_value_t = 0
    )]
    mem_threshold: u64,

    // ************ //
    // *** ARGS *** //
    // ************ //
    /// Input trace files (same as --input)
    #[clap(value_name = "PATH")]
    args: Vec<PathBuf>,
}

fn main() {
    let opt = Opt::parse();

    // Initialize logger
    if !opt.quiet {
        env_logger::Builder::from_env(Env::default().default_filter_or(match opt.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }))
        .format_timestamp(None)
        .init();
    }

    let format: Format = match opt.format.parse() {
        Ok(format) => format,
        Err(()) => {
            error!("unrecognized trace format: {}", opt.format);
            process::exit(2);
        }
    };

    let compression = match Compression::from_mode(opt.compression) {
        Some(Compression::CompressedBytes) => {
            error!("compression mode 1 is reserved and not supported");
            process::exit(2);
        }
        Some(compression) => compression,
        None => {
            error!("unrecognized compression mode: {}", opt.compression);
            process::exit(2);
        }
    };

    let out: Box<dyn Write> = if opt.output == "-" {
        Box::new(io::stdout())
    } else {
        match File::create(&opt.output) {
            Ok(file) => Box::new(BufWriter::new(file)),
            Err(e) => {
                error!("cannot create output file {}: {}", opt.output, e);
                process::exit(1);
            }
        }
    };

    let options = GraphOptions {
        time_threshold: opt.time_threshold,
        memory_threshold: opt.mem_threshold,
    };
    let mut printer = Printer::new(render::make_sink(format, out, compression, options));

    if let Some(path) = &opt.blacklist {
        match Blacklist::from_file(path) {
            Ok(blacklist) => printer.set_blacklist(blacklist),
            Err(e) => warn!("cannot read blacklist file {}: {}", path.display(), e),
        }
    }

    let mut inputs: Vec<PathBuf> = opt.input;
    inputs.extend(opt.args);

    let mut was_inited = false;
    if inputs.is_empty() {
        let stdin = io::stdin();
        convert_input(stdin.lock(), "<stdin>", &mut printer, &mut was_inited);
    } else {
        for path in &inputs {
            let name = path.display().to_string();
            if name == "-" {
                let stdin = io::stdin();
                convert_input(stdin.lock(), "<stdin>", &mut printer, &mut was_inited);
                continue;
            }
            let file = match File::open(path) {
                Ok(file) => file,
                Err(e) => {
                    warn!("cannot open trace file {}: {}", name, e);
                    continue;
                }
            };
            convert_input(
                BufReader::with_capacity(128 * 1024, file),
                &name,
                &mut printer,
                &mut was_inited,
            );
        }
    }

    if was_inited {
        if let Err(e) = printer.finalize() {
            error!("failed to write output: {}", e);
            process::exit(1);
        }
    }
}

/// Pumps one input stream through the printer. Malformed trace data aborts
/// that input only; anything else (an output error, most likely) is fatal.
fn convert_input<R: Read>(
    input: R,
    name: &str,
    printer: &mut Printer<Box<dyn EntrySink>>,
    was_inited: &mut bool,
) {
    if let Err(e) = pump(TraceReader::new(input), printer, was_inited) {
        if e.kind() == io::ErrorKind::InvalidData {
            warn!("skipping the rest of {}: {}", name, e);
        } else {
            error!("failed to write output: {}", e);
            process::exit(1);
        }
    }
}

fn pump<R: Read>(
    reader: TraceReader<R>,
    printer: &mut Printer<Box<dyn EntrySink>>,
    was_inited: &mut bool,
) -> io::Result<()> {
    for record in reader {
        match record? {
            TraceRecord::Header { source_file, .. } => {
                if *was_inited {
                    printer.finalize()?;
                }
                printer.initialize(source_file.as_deref().unwrap_or(""))?;
                *was_inited = true;
            }
            TraceRecord::Begin(entry) => printer.begin_entry(&entry)?,
            TraceRecord::End(entry) => printer.end_entry(&entry)?,
        }
    }
    Ok(())
}
