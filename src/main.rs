use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use console::Term;

use coffeepot::config::{Cli, NUM_WORKERS, SNAPSHOT_ADDR};
use coffeepot::emulator::{Emulator, StopReason};
use coffeepot::pretty_printing::{log, print_stats, LogType};
use coffeepot::{calibrate_seeds, error_exit, read_corpus_dir, worker, HostError, SharedState, Statistics};

/// Loads the target, runs it up to the snapshot address, captures the
/// master snapshot, and calibrates the initial corpus — the sequential
/// setup `spec.md` section 4.6 describes before any worker starts.
fn setup(args: &Cli) -> Result<(Emulator, coffeepot::snapshot::Snapshot, Vec<coffeepot::corpus::FuzzCase>), HostError> {
    let binary = std::fs::read(&args.fuzzed_app)?;

    let mut emu = Emulator::new();
    coffeepot::loader::load(&binary, &mut emu.memory, &mut emu.cpu, &[args.fuzzed_app.as_str()])?;

    let mut cases = read_corpus_dir(&args.corpus_dir)?;
    if cases.is_empty() {
        error_exit("no initial seeds found in corpus directory");
    }

    let mut coverage = coffeepot::coverage::CoverageMap::new();
    match emu.run_until(SNAPSHOT_ADDR as u64, &mut coverage) {
        Ok(StopReason::ReachedTarget) => {}
        Ok(StopReason::Exited(_)) | Err(_) => {
            error_exit("target exited or crashed before reaching the snapshot address");
        }
    }
    log(LogType::Success, "snapshot taken");

    let snap = coffeepot::snapshot::Snapshot::capture(&emu.cpu, &emu.memory);

    let mut calibration_coverage = coffeepot::coverage::CoverageMap::new();
    calibrate_seeds(&mut emu, &snap, &mut calibration_coverage, &mut cases);
    snap.restore(&mut emu.cpu, &mut emu.memory);

    Ok((emu, snap, cases))
}

fn main() -> std::io::Result<()> {
    let args = Cli::parse();

    let (emu, snap, cases) = setup(&args).unwrap_or_else(|e| {
        error_exit(&format!("fatal setup error: {:?}", e));
    });

    let output_dir = std::path::Path::new(&args.output_dir);
    let crash_dir = output_dir.join("crashes");
    let queue_dir = output_dir.join("queue");
    std::fs::create_dir_all(&crash_dir)?;
    std::fs::create_dir_all(&queue_dir)?;

    let shared = Arc::new(SharedState::new(crash_dir, queue_dir));
    for case in cases {
        shared.corpus.record_new_case(case);
    }

    let snap = Arc::new(snap);
    let (tx, rx): (Sender<Statistics>, Receiver<Statistics>) = mpsc::channel();

    for thread_id in 0..NUM_WORKERS {
        let worker_emu = Emulator { cpu: emu.cpu, memory: emu.memory.clone() };
        let snap = snap.clone();
        let shared = shared.clone();
        let tx = tx.clone();
        thread::spawn(move || worker(thread_id, worker_emu, snap, shared, 0xC0FFEE ^ thread_id as u64, tx));
    }
    drop(tx);

    let term = Term::buffered_stdout();
    let start = Instant::now();
    let mut stats = Statistics::default();
    let mut last_print = Instant::now();

    for received in rx {
        stats.total_cases += received.total_cases;
        stats.crashes += received.crashes;
        stats.unique_crashes += received.unique_crashes;
        stats.coverage += received.coverage;
        stats.instr_count += received.instr_count;

        if last_print.elapsed() >= Duration::from_millis(500) {
            print_stats(&term, &stats, start.elapsed().as_secs_f64(), &shared.corpus);
            last_print = Instant::now();
        }
    }

    Ok(())
}
