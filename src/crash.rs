//! Crash deduplication and artifact persistence.
//!
//! Grounded on the teacher's `Corpus.crash_mapping` dedup table and its
//! `crash_file` naming in `lib.rs`'s `worker()` (`"{output}/crashes/{kind}_{pc:x}_{hash}"`),
//! generalized from the teacher's JIT `Fault` variants to this core's
//! `emulator::Fault`.

use std::fs;
use std::io;
use std::path::PathBuf;

use rustc_hash::FxHashSet;
use xxhash_rust::xxh3::xxh3_64;

use crate::emulator::Fault;

/// Counters plus a dedup set and the directory crash artifacts are written
/// to, per `spec.md` section 3's `Crash map`.
#[derive(Debug)]
pub struct CrashMap {
    seen: FxHashSet<u64>,
    pub crashes: u64,
    pub unique_crashes: u64,
    artifact_dir: PathBuf,
}

impl CrashMap {
    pub fn new(artifact_dir: impl Into<PathBuf>) -> Self {
        CrashMap {
            seen: FxHashSet::default(),
            crashes: 0,
            unique_crashes: 0,
            artifact_dir: artifact_dir.into(),
        }
    }

    fn fault_key(fault: &Fault, pc: u64) -> u64 {
        let discriminant: u64 = match fault {
            Fault::Guest(g) => 0x1000 + g.kind as u64,
            Fault::UnsupportedInstruction { .. } => 0x2000,
            Fault::UnsupportedSyscall { .. } => 0x3000,
            Fault::MisalignedJump { .. } => 0x4000,
            // never reaches here in practice: worker() intercepts Ebreak
            // before calling record(), but the match must stay exhaustive.
            Fault::Ebreak { .. } => 0x5000,
        };
        discriminant ^ pc
    }

    /// Records a crash observed at guest `pc` with the scratch input that
    /// triggered it. Returns `true`, and writes an artifact file, the first
    /// time this `(fault kind, pc)` pair is seen; subsequent occurrences
    /// only bump `crashes`.
    pub fn record(&mut self, fault: &Fault, pc: u64, input: &[u8]) -> io::Result<bool> {
        self.crashes += 1;
        let key = Self::fault_key(fault, pc);
        if !self.seen.insert(key) {
            return Ok(false);
        }
        self.unique_crashes += 1;

        fs::create_dir_all(&self.artifact_dir)?;
        let hash = xxh3_64(input);
        let path = self
            .artifact_dir
            .join(format!("crash_{pc:x}_{hash:x}_{}", self.unique_crashes));
        fs::write(path, input)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mmu::{FaultKind, GuestFault};

    #[test]
    fn first_crash_at_a_pc_is_unique() {
        let dir = std::env::temp_dir().join(format!("coffeepot-crash-test-{:x}", xxh3_64(b"a")));
        let mut crashes = CrashMap::new(&dir);
        let fault = Fault::Guest(GuestFault { kind: FaultKind::Unmapped, addr: 0xdead });
        assert!(crashes.record(&fault, 0x1000, b"AAAA").unwrap());
        assert_eq!(crashes.unique_crashes, 1);
        assert_eq!(crashes.crashes, 1);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn repeat_crash_at_same_pc_is_not_unique() {
        let dir = std::env::temp_dir().join(format!("coffeepot-crash-test-{:x}", xxh3_64(b"b")));
        let mut crashes = CrashMap::new(&dir);
        let fault = Fault::Guest(GuestFault { kind: FaultKind::NoWrite, addr: 0x2000 });
        assert!(crashes.record(&fault, 0x1000, b"AAAA").unwrap());
        assert!(!crashes.record(&fault, 0x1000, b"BBBB").unwrap());
        assert_eq!(crashes.unique_crashes, 1);
        assert_eq!(crashes.crashes, 2);
        let _ = fs::remove_dir_all(&dir);
    }
}
