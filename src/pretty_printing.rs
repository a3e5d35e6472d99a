//! Colored logging and the live stats screen.
//!
//! Grounded on the teacher's `pretty_printing.rs`: same `LogType`/`Green`/
//! `Blue`/`Red` coloring and `console::Term` layout, trimmed to the fields
//! `Statistics`/`Corpus` actually carry in this core (no JIT/ASAN/coverage
//! method knobs to report).

use core::fmt;

use console::Term;
use num_format::{Locale, ToFormattedString};

use crate::config::NUM_WORKERS;
use crate::corpus::Corpus;
use crate::Statistics;

/// Different log-types that can be used to print out messages in different colors.
pub enum LogType {
    Neutral = 0,
    Success = 1,
    Failure = 2,
}

/// Color a string green.
pub struct Green(pub &'static str);
impl fmt::Display for Green {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\x1B[32m{}\x1B[0m", self.0)
    }
}

/// Color a string blue.
pub struct Blue(pub &'static str);
impl fmt::Display for Blue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\x1B[34m{}\x1B[0m", self.0)
    }
}

/// Color a string red.
pub struct Red(pub &'static str);
impl fmt::Display for Red {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\x1B[31m{}\x1B[0m", self.0)
    }
}

/// Small wrapper to print out colored log messages.
pub fn log(kind: LogType, msg: &str) {
    match kind {
        LogType::Neutral => println!("{} {}", Blue("[-]"), msg),
        LogType::Success => println!("{} {}", Green("[+]"), msg),
        LogType::Failure => println!("{} {}", Red("[!]"), msg),
    }
}

/// Full-screen live view, redrawn in place on every call.
pub fn pretty_stats(term: &Term, stats: &Statistics, elapsed_time: f64, corpus: &Corpus) {
    term.move_cursor_to(0, 0).ok();
    term.clear_screen().ok();
    term.write_line(&format!("{}", Green("\t\t[ coffeepot ]\n"))).ok();

    term.write_line(&format!(
        "\t{}\n\t   Run time [sec]: {:8.2}\n\t   Total fuzz cases: {:12}\n\t   Instrs execd [mil]: {:12}",
        Blue("Progression"),
        elapsed_time,
        stats.total_cases.to_formatted_string(&Locale::en),
        (stats.instr_count / 1_000_000).to_formatted_string(&Locale::en),
    ))
    .ok();

    term.write_line(&format!("\n\t{}", Blue("Overall Results"))).ok();
    term.write_line(&format!("\t   Unique crashes: {}", stats.unique_crashes)).ok();
    term.write_line(&format!("\t   Crashes: {}", stats.crashes)).ok();

    let fcps = if elapsed_time > 0.0 { (stats.total_cases as f64 / elapsed_time) as usize } else { 0 };
    term.write_line(&format!("\n\t{}", Blue("Performance"))).ok();
    term.write_line(&format!("\t   Fuzz cases per second: {}", fcps.to_formatted_string(&Locale::en))).ok();

    term.write_line(&format!("\n\t{}", Blue("Coverage"))).ok();
    term.write_line(&format!("\t   Unique edges: {}", stats.coverage)).ok();

    term.write_line(&format!("\n\t{}", Blue("Config"))).ok();
    term.write_line(&format!("\t   Workers: {}", NUM_WORKERS)).ok();

    term.write_line(&format!("\n\t{}", Blue("Corpus"))).ok();
    term.write_line(&format!("\t   Size: {}", corpus.len())).ok();

    term.flush().ok();
}

/// One-line-per-update view, for when stdout isn't an interactive terminal.
pub fn basic_stats(stats: &Statistics, elapsed_time: f64) {
    println!(
        "[{:8.2}] cases: {:12} coverage: {:6} crashes: {:8} ucrashes: {:6} instrs: {:13}",
        elapsed_time,
        stats.total_cases.to_formatted_string(&Locale::en),
        stats.coverage,
        stats.crashes,
        stats.unique_crashes,
        stats.instr_count.to_formatted_string(&Locale::en),
    );
}

/// Picks the pretty screen when attached to a terminal, otherwise the basic view.
pub fn print_stats(term: &Term, stats: &Statistics, elapsed_time: f64, corpus: &Corpus) {
    if term.features().is_attended() {
        pretty_stats(term, stats, elapsed_time, corpus);
    } else {
        basic_stats(stats, elapsed_time);
    }
}
