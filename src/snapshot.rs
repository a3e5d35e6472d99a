//! Snapshot/restore.
//!
//! `spec.md` section 4.5: capture CPU state plus the dirty segments' bytes at
//! `SNAPSHOT_ADDR`, then restore them wholesale at the end of every fuzz
//! iteration. Segments allocated after the snapshot was taken (anonymous
//! `mmap`-style growth during the run) are destroyed on restore rather than
//! kept around half-initialized, resolving the section's open question the
//! same way the teacher's `mmu.rs` already shapes `truncate_segments` to
//! support.

use crate::cpu::Cpu;
use crate::mmu::Mmu;

/// A saved copy of one segment's bytes, keyed by its index in the `Mmu` at
/// capture time.
#[derive(Debug, Clone)]
struct SegmentSnapshot {
    index: usize,
    data: Vec<u8>,
}

/// Captured emulator state. Coverage and crash maps are never part of this:
/// they outlive individual iterations and are re-linked into the emulator by
/// the caller after every restore, per `spec.md` section 9.
#[derive(Debug, Clone)]
pub struct Snapshot {
    cpu: Cpu,
    segment_count: usize,
    segments: Vec<SegmentSnapshot>,
}

impl Snapshot {
    /// Captures the full state of every segment, not just the dirty ones,
    /// since at capture time there is no prior snapshot to diff against.
    pub fn capture(cpu: &Cpu, memory: &Mmu) -> Self {
        let segments = memory
            .iter()
            .enumerate()
            .map(|(index, seg)| SegmentSnapshot { index, data: seg.data.clone() })
            .collect();

        Snapshot {
            cpu: cpu.clone(),
            segment_count: memory.segment_count(),
            segments,
        }
    }

    /// Restores CPU state wholesale, copies back only the segments dirtied
    /// since the last restore (or since capture, for the first iteration),
    /// and destroys any segment allocated after the snapshot was taken.
    pub fn restore(&self, cpu: &mut Cpu, memory: &mut Mmu) {
        *cpu = self.cpu.clone();

        memory.truncate_segments(self.segment_count);

        for dirty in memory.dirty_indices() {
            if let Some(saved) = self.segments.iter().find(|s| s.index == dirty) {
                memory.segment_mut(dirty).data.copy_from_slice(&saved.data);
            }
        }
        memory.clear_dirty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::Register;
    use crate::mmu::Perms;

    #[test]
    fn restore_undoes_register_and_memory_changes() {
        let mut cpu = Cpu::new();
        let mut mem = Mmu::new();
        let base = mem.alloc(0x1000, 0x10, Perms::RW).unwrap();
        mem.write_u64(base, 0x1111_1111_1111_1111).unwrap();
        cpu.set_reg(Register::A0, 5);

        let snap = Snapshot::capture(&cpu, &mem);

        cpu.set_reg(Register::A0, 99);
        mem.write_u64(base, 0xdead_beef_dead_beef).unwrap();

        snap.restore(&mut cpu, &mut mem);

        assert_eq!(cpu.get_reg(Register::A0), 5);
        assert_eq!(mem.read_u64(base).unwrap(), 0x1111_1111_1111_1111);
    }

    #[test]
    fn restore_destroys_segments_allocated_after_capture() {
        let mut cpu = Cpu::new();
        let mut mem = Mmu::new();
        mem.alloc(0x2000, 0x10, Perms::RW).unwrap();
        let snap = Snapshot::capture(&cpu, &mem);

        mem.alloc(0, 0x10, Perms::RW).unwrap();
        assert_eq!(mem.segment_count(), 2);

        snap.restore(&mut cpu, &mut mem);
        assert_eq!(mem.segment_count(), 1);
    }

    #[test]
    fn clean_segments_are_left_untouched_on_restore() {
        let cpu = Cpu::new();
        let mut mem = Mmu::new();
        let base = mem.alloc(0x3000, 0x10, Perms::RW).unwrap();
        mem.write_u64(base, 42).unwrap();
        mem.clear_dirty();

        let snap = Snapshot::capture(&cpu, &mem);
        let mut cpu2 = cpu.clone();
        snap.restore(&mut cpu2, &mut mem);
        assert_eq!(mem.read_u64(base).unwrap(), 42);
    }
}
