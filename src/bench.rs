use std::time::{Duration, Instant};

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rayon::prelude::*;

use crate::config::Config;
use crate::engine::Status;
use crate::host::SliceSource;
use crate::interpreter::Interpreter;

const BODY: &[u8] = b"+-<>.";

/// Configuration for a throughput benchmark over random programs.
pub struct BenchConfig {
    /// Number of programs to generate and run.
    pub programs: usize,
    /// Instructions per program, before the end marker.
    pub program_size: usize,
    /// Tape cells per interpreter.
    pub tape_len: usize,
    /// Maximum instructions executed per program.
    pub step_limit: u64,
    /// Bytes per chunk handed to the interpreter.
    pub chunk_size: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            programs: 1 << 10,
            program_size: 64,
            tape_len: 256,
            step_limit: 1 << 13,
            chunk_size: 16,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BenchReport {
    pub programs: usize,
    /// Programs that ran to their end marker within the step limit.
    pub halted: usize,
    pub instructions: u64,
    pub elapsed: Duration,
}

impl BenchReport {
    pub fn instructions_per_sec(&self) -> f64 {
        self.instructions as f64 / self.elapsed.as_secs_f64()
    }
}

/// Generate a random program of exactly `len` instructions with balanced
/// brackets, followed by a zero end marker.
pub fn random_program(rng: &mut SmallRng, len: usize) -> Vec<u8> {
    let mut program = Vec::with_capacity(len + 1);
    let mut open = 0usize;
    while program.len() < len {
        let remaining = len - program.len();
        // Close whatever is still open once there is just room for it.
        if open > 0 && (remaining <= open || rng.gen_bool(0.1)) {
            program.push(b']');
            open -= 1;
        } else if remaining > open + 1 && rng.gen_bool(0.1) {
            program.push(b'[');
            open += 1;
        } else {
            program.push(BODY[rng.gen_range(0..BODY.len())]);
        }
    }
    program.push(0);
    program
}

/// Run `config.programs` random programs in parallel and measure throughput.
pub fn run_benchmark(config: &BenchConfig, seed: u64) -> BenchReport {
    let mut rng = SmallRng::seed_from_u64(seed);
    let programs: Vec<Vec<u8>> = (0..config.programs)
        .map(|_| random_program(&mut rng, config.program_size))
        .collect();
    let interp_config = Config {
        max_loops: config.program_size,
        ..Config::default()
    };

    let start = Instant::now();
    let results: Vec<(bool, u64)> = programs
        .par_iter()
        .map(|program| {
            let source = SliceSource::new(program, config.chunk_size);
            let first = source.chunk_at(0);
            let mut interp = Interpreter::new(source);
            if interp.init(interp_config, None, config.tape_len).is_err() {
                return (false, 0);
            }
            let halted = first
                .and_then(|chunk| interp.run_for(chunk, config.step_limit).ok())
                .is_some_and(|status| status == Status::Halted);
            (halted, interp.steps())
        })
        .collect();
    let elapsed = start.elapsed();

    BenchReport {
        programs: programs.len(),
        halted: results.iter().filter(|(halted, _)| *halted).count(),
        instructions: results.iter().map(|(_, steps)| steps).sum(),
        elapsed,
    }
}
