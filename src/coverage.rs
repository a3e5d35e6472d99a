//! Edge-coverage recorder.
//!
//! Grounded on the teacher's `Corpus.coverage_bytemap`/`cov_counter` pair in
//! `lib.rs` and `original_source/c_src/include/coverage.h`'s `CoverageMap`
//! (a hash set of edge fingerprints plus a hit counter). The reference uses
//! a byte-map indexed by a JIT translation table; without a JIT there is no
//! such table, so this records actual `(src_pc, dst_pc)` edges in a hash set
//! instead, which is what `coverage.h`'s callback comment describes doing
//! conceptually ("hash source & destination addresses, check if in map").

use rustc_hash::FxHashSet;
use xxhash_rust::xxh3::xxh3_64;

/// Set of 64-bit edge fingerprints plus the counters `spec.md` section 3
/// names. Owned by the fuzz driver and re-attached to each worker's
/// emulator across restores — it is not part of the snapshot.
#[derive(Debug, Default)]
pub struct CoverageMap {
    seen: FxHashSet<u64>,
    pub unique_edges: u64,
    pub prev_unique_edges: u64,
}

impl CoverageMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn fingerprint(src_pc: u64, dst_pc: u64) -> u64 {
        xxh3_64(&(src_pc.rotate_left(1) ^ dst_pc).to_le_bytes())
    }

    /// Records a taken control transfer. Returns `true` if this edge has
    /// never been seen before ("new" per `spec.md` section 4.3).
    pub fn record_edge(&mut self, src_pc: u64, dst_pc: u64) -> bool {
        let fp = Self::fingerprint(src_pc, dst_pc);
        if self.seen.insert(fp) {
            self.unique_edges += 1;
            true
        } else {
            false
        }
    }

    /// Snapshots `unique_edges` as the baseline for the next iteration's
    /// novelty check (`spec.md` section 4.6).
    pub fn checkpoint(&mut self) {
        self.prev_unique_edges = self.unique_edges;
    }

    pub fn grew_since_checkpoint(&self) -> bool {
        self.unique_edges > self.prev_unique_edges
    }
}
