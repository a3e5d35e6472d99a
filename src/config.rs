//! Per-target constants and the command-line interface.
//!
//! Snapshot/restore addresses and the fuzz-input buffer are properties of a
//! specific target binary, not something this fuzzer discovers at runtime.
//! They live here as compile-time constants, same as the teacher's
//! `SNAPSHOT_ADDR`.

use clap::Parser;

/// Guest PC at which the working emulator captures its snapshot.
pub const SNAPSHOT_ADDR: usize = 0x101e4;

/// Guest PC at which a fuzz iteration ends and the emulator is restored.
pub const RESTORE_ADDR: usize = 0x101f8;

/// Guest address the mutated fuzz case is written to before each iteration.
pub const FUZZ_INPUT_ADDR: usize = 0x40000;

/// Size in bytes of the fixed-size mutator scratch buffer / guest fuzz-input
/// region.
pub const FUZZ_INPUT_SIZE: usize = 256;

/// Total size of the guest address space backing a single `Mmu`.
pub const GUEST_MEMORY_SIZE: usize = 16 * 1024 * 1024;

/// Size of the stack segment set up before the guest's entry point runs.
pub const STACK_SIZE: usize = 128 * 1024;

/// Number of worker threads to fuzz with.
pub const NUM_WORKERS: usize = 4;

/// Fraction of the scratch buffer mutated per iteration, as `(numerator,
/// denominator)` bounds — matches `spec.md`'s `r ~= 0.05-0.12`.
pub const MUTATION_RATE_MIN: f64 = 0.05;
pub const MUTATION_RATE_MAX: f64 = 0.12;

/// Command line interface. A single positional argument names the guest ELF;
/// everything else a target needs is a compile-time constant above, per
/// `spec.md` section 6. `--corpus-dir`/`--output-dir` only configure where the
/// (out-of-core) corpus reader and crash/queue sinks look, not how the core
/// fuzzes.
#[derive(Parser, Debug)]
#[clap(name = "coffeepot", about = "A coverage-guided snapshot fuzzer for RV64GC targets")]
pub struct Cli {
    /// Path to the RISC-V ELF binary to fuzz
    pub fuzzed_app: String,

    /// Directory containing the initial seed corpus
    #[clap(long, default_value = "./corpus")]
    pub corpus_dir: String,

    /// Directory crash artifacts and newly discovered corpus entries are
    /// written to (as `<output_dir>/crashes` and `<output_dir>/queue`)
    #[clap(long, default_value = "./output")]
    pub output_dir: String,
}
