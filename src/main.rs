use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use rayon::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ebf::bench::{BenchConfig, run_benchmark};
use ebf::{Chunk, Config, FileSource, Host, Interpreter, PauseToken, Status};

#[derive(Parser)]
#[command(name = "ebf", about = "Embedded Brainfuck: a chunked, resumable interpreter")]
struct Cli {
    /// Program files to run. Several files run in parallel with buffered output.
    files: Vec<PathBuf>,

    /// Number of tape cells.
    #[arg(long, default_value_t = 30000)]
    tape_len: usize,

    /// Loop table capacity (total number of bracket pairs in the program).
    #[arg(long, default_value_t = 256)]
    max_loops: usize,

    /// Wrap the data pointer around the tape ends instead of clamping.
    #[arg(long)]
    wrap: bool,

    /// Manual mode: the driver supplies every chunk instead of the interpreter pulling them.
    #[arg(long)]
    manual: bool,

    /// Bytes of program held in memory at a time.
    #[arg(long, default_value_t = 64)]
    chunk_size: usize,

    /// Instruction byte that ends the program.
    #[arg(long, default_value_t = 0)]
    eof: u8,

    /// Stop each program after this many instructions.
    #[arg(long)]
    step_limit: Option<u64>,

    /// Run in benchmark mode: execute random programs and print throughput stats.
    #[arg(long)]
    benchmark: bool,

    /// Random seed for benchmark programs.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Number of benchmark programs.
    #[arg(long, default_value_t = 1 << 10)]
    programs: usize,

    /// Instructions per benchmark program.
    #[arg(long, default_value_t = 64)]
    program_size: usize,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{path}: {source}")]
    Io { path: String, source: io::Error },

    #[error("{path}: {source}")]
    Interpreter { path: String, source: ebf::Error },
}

/// Interpreter settings shared by every program of one invocation.
struct Settings {
    config: Config,
    tape_len: usize,
    chunk_size: usize,
    step_limit: Option<u64>,
}

struct Outcome {
    status: Status,
    pc: usize,
    steps: u64,
}

/// Program source plus the process's standard streams.
struct CliHost<W> {
    source: FileSource<BufReader<File>>,
    out: W,
    stdin: Option<io::Stdin>,
}

impl<'p, W: Write> Host<'p> for CliHost<W> {
    fn output(&mut self, byte: u8) {
        if let Err(err) = self.out.write_all(&[byte]) {
            warn!(error = %err, "failed to write program output");
        }
    }

    fn input(&mut self) -> Option<u8> {
        let stdin = self.stdin.as_mut()?;
        if let Err(err) = self.out.flush() {
            warn!(error = %err, "failed to flush program output before reading input");
        }
        let mut byte = [0u8];
        match stdin.read(&mut byte) {
            Ok(1) => Some(byte[0]),
            _ => None,
        }
    }

    fn next_chunk(&mut self, position: usize) -> Option<Chunk<'p>> {
        Host::<'p>::next_chunk(&mut self.source, position)
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    if cli.benchmark {
        run_benchmark_cli(&cli);
        return;
    }
    if cli.files.is_empty() {
        eprintln!("No program files given. Run with --help for usage.");
        std::process::exit(2);
    }

    let pause = PauseToken::new();
    let handler_token = pause.clone();
    if let Err(err) = ctrlc::set_handler(move || handler_token.pause()) {
        warn!(error = %err, "could not install Ctrl-C handler");
    }

    let settings = Settings {
        config: Config {
            eof: cli.eof,
            wrap_data_pointer: cli.wrap,
            continuous: !cli.manual,
            max_loops: cli.max_loops,
        },
        tape_len: cli.tape_len,
        chunk_size: cli.chunk_size,
        step_limit: cli.step_limit,
    };

    let mut failed = false;
    if let [path] = cli.files.as_slice() {
        let out = io::stdout().lock();
        match run_file(path, &settings, out, Some(io::stdin()), &pause) {
            Ok((outcome, _)) => report(path, &outcome),
            Err(err) => {
                eprintln!("{err}");
                failed = true;
            }
        }
    } else {
        let results: Vec<_> = cli
            .files
            .par_iter()
            .map(|path| run_file(path, &settings, Vec::new(), None, &pause))
            .collect();

        let mut stdout = io::stdout().lock();
        for (path, result) in cli.files.iter().zip(results) {
            match result {
                Ok((outcome, output)) => {
                    if let Err(err) = write_section(&mut stdout, path, &output) {
                        warn!(path = %path.display(), error = %err, "failed to write program output");
                    }
                    report(path, &outcome);
                }
                Err(err) => {
                    eprintln!("{err}");
                    failed = true;
                }
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
}

/// Run one program file to completion, pause or step limit, feeding it
/// chunk by chunk. Returns the outcome and the output writer.
fn run_file<W: Write>(
    path: &Path,
    settings: &Settings,
    out: W,
    stdin: Option<io::Stdin>,
    pause: &PauseToken,
) -> Result<(Outcome, W), CliError> {
    let name = path.display().to_string();
    let io_error = |source| CliError::Io {
        path: name.clone(),
        source,
    };
    let interp_error = |source| CliError::Interpreter {
        path: name.clone(),
        source,
    };

    let file = File::open(path).map_err(io_error)?;
    let host = CliHost {
        source: FileSource::new(BufReader::new(file), settings.chunk_size, settings.config.eof),
        out,
        stdin,
    };
    let mut interp = Interpreter::with_pause_token(host, pause.clone());
    interp
        .init(settings.config, None, settings.tape_len)
        .map_err(interp_error)?;
    info!(path = %name, "running program");

    // In continuous mode the first run only returns once the program stops;
    // in manual mode every chunk boundary comes back here.
    let status = loop {
        let pc = interp.program_counter();
        let chunk = interp
            .host_mut()
            .source
            .read_chunk(pc)
            .map_err(io_error)?
            .ok_or(ebf::Error::UnknownChunk { position: pc })
            .map_err(interp_error)?;
        let result = match settings.step_limit {
            Some(limit) => interp.run_for(chunk, limit.saturating_sub(interp.steps())),
            None => interp.run(chunk),
        };
        let status = result.map_err(interp_error)?;
        if status != Status::ChunkExhausted {
            break status;
        }
    };

    let outcome = Outcome {
        status,
        pc: interp.program_counter(),
        steps: interp.steps(),
    };
    interp.clean_up().map_err(interp_error)?;
    let mut host = interp.into_host();
    host.out.flush().map_err(io_error)?;
    Ok((outcome, host.out))
}

/// Print one program's buffered output under a header naming its file.
fn write_section(out: &mut impl Write, path: &Path, output: &[u8]) -> io::Result<()> {
    writeln!(out, "==> {} <==", path.display())?;
    out.write_all(output)?;
    writeln!(out)
}

fn report(path: &Path, outcome: &Outcome) {
    let path = path.display();
    match outcome.status {
        Status::Halted => info!(%path, steps = outcome.steps, "program finished"),
        Status::Paused => eprintln!(
            "{path}: paused at instruction {} after {} steps",
            outcome.pc, outcome.steps
        ),
        Status::StepLimit => eprintln!(
            "{path}: step limit reached at instruction {} after {} steps",
            outcome.pc, outcome.steps
        ),
        Status::ChunkExhausted => {}
    }
}

fn run_benchmark_cli(cli: &Cli) {
    let config = BenchConfig {
        programs: cli.programs,
        program_size: cli.program_size,
        tape_len: cli.tape_len,
        step_limit: cli.step_limit.unwrap_or(1 << 13),
        chunk_size: cli.chunk_size,
    };
    let report = run_benchmark(&config, cli.seed);

    eprintln!("Benchmark results:");
    eprintln!("  Programs:          {}", report.programs);
    eprintln!("  Halted:            {}", report.halted);
    eprintln!("  Instructions:      {}", report.instructions);
    eprintln!("  Elapsed:           {:.2?}", report.elapsed);
    eprintln!("  Instructions/sec:  {:.0}", report.instructions_per_sec());
}
