//! ELF loading and initial process image construction.
//!
//! Grounded on the teacher's `load_elf_segments` (`lib.rs`) for the
//! header-walk/`PT_LOAD`-copy shape, simplified to `spec.md` section 6's
//! single enclosing allocation (no JIT function table, no symbol table) and
//! extended with the argv/stack setup the teacher's targets never needed
//! because they read fuzz input straight out of a fixed buffer.

use crate::config::STACK_SIZE;
use crate::cpu::{Cpu, Register};
use crate::mmu::{AllocError, GuestFault, Mmu, Perms};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderError {
    BadElf(String),
    Alloc(AllocError),
    Fault(GuestFault),
}

impl From<AllocError> for LoaderError {
    fn from(e: AllocError) -> Self {
        LoaderError::Alloc(e)
    }
}

impl From<GuestFault> for LoaderError {
    fn from(e: GuestFault) -> Self {
        LoaderError::Fault(e)
    }
}

/// Loads `binary` into `memory` inside a single `R|W|X` region spanning every
/// `PT_LOAD` segment, then sets up the stack and `argv` and points `cpu.pc`
/// at the entry point. Returns the entry address.
pub fn load(binary: &[u8], memory: &mut Mmu, cpu: &mut Cpu, argv: &[&str]) -> Result<u64, LoaderError> {
    let (hdr, phdrs) = elfparser::load_segments(binary)
        .ok_or_else(|| LoaderError::BadElf("malformed ELF or program header table".to_string()))?;

    if phdrs.is_empty() {
        return Err(LoaderError::BadElf("no PT_LOAD segments".to_string()));
    }

    let min_vaddr = phdrs.iter().map(|p| p.vaddr).min().unwrap();
    let max_vaddr = phdrs
        .iter()
        .map(|p| p.vaddr.checked_add(p.memsz).unwrap_or(p.vaddr))
        .max()
        .unwrap();

    memory.alloc(min_vaddr, max_vaddr - min_vaddr, Perms::RWX)?;

    for phdr in &phdrs {
        let file_bytes = &binary[phdr.offset..phdr.offset + phdr.filesz];
        memory.copy_in(file_bytes, phdr.vaddr).map_err(|f| {
            LoaderError::BadElf(format!("failed to load segment at {:#x}: {:?}", phdr.vaddr, f))
        })?;
    }

    let sp = setup_stack(memory, argv)?;
    cpu.set_reg(Register::Sp, sp);
    cpu.pc = hdr.entry_addr as u64;

    Ok(cpu.pc)
}

/// Allocates the stack and builds the `argc`/`argv` image `spec.md` section 6
/// describes, returning the initial `sp`.
fn setup_stack(memory: &mut Mmu, argv: &[&str]) -> Result<u64, LoaderError> {
    let base = memory.alloc(0, STACK_SIZE, Perms::RW)?;
    let top = base + STACK_SIZE;
    let mut sp = top & !0xfusize;

    let mut argv_ptrs = Vec::with_capacity(argv.len());
    for arg in argv {
        let bytes = arg.as_bytes();
        let region = memory.alloc(0, bytes.len() + 1, Perms::RW)?;
        memory.copy_in(bytes, region)?;
        memory.write_u8(region + bytes.len(), 0)?;
        argv_ptrs.push(region as u64);
    }

    // three zero terminators (envp + auxv null entries)
    for _ in 0..3 {
        sp -= 8;
        memory.write_u64(sp, 0)?;
    }

    for ptr in argv_ptrs.iter().rev() {
        sp -= 8;
        memory.write_u64(sp, *ptr)?;
    }

    sp -= 8;
    memory.write_u64(sp, argv.len() as u64)?;

    Ok(sp as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_elf(entry: u64, code: &[u8]) -> Vec<u8> {
        let phoff = 64u64;
        let vaddr = 0x10000u64;
        let mut v = Vec::new();
        v.extend_from_slice(&elfparser::ELFMAGIC.to_le_bytes());
        v.push(elfparser::ARCH64);
        v.push(elfparser::LITTLEENDIAN);
        v.push(1);
        v.push(0);
        v.push(0);
        v.extend_from_slice(&[0u8; 7]);
        v.extend_from_slice(&elfparser::TYPEEXEC.to_le_bytes());
        v.extend_from_slice(&elfparser::RISCV.to_le_bytes());
        v.extend_from_slice(&1u32.to_le_bytes());
        v.extend_from_slice(&entry.to_le_bytes());
        v.extend_from_slice(&phoff.to_le_bytes());
        v.extend_from_slice(&0u64.to_le_bytes());
        v.extend_from_slice(&0u32.to_le_bytes());
        v.extend_from_slice(&64u16.to_le_bytes());
        v.extend_from_slice(&56u16.to_le_bytes());
        v.extend_from_slice(&1u16.to_le_bytes());
        v.extend_from_slice(&0u16.to_le_bytes());
        v.extend_from_slice(&0u16.to_le_bytes());
        v.extend_from_slice(&0u16.to_le_bytes());

        v.extend_from_slice(&elfparser::LOADSEGMENT.to_le_bytes());
        v.extend_from_slice(&(elfparser::PF_R | elfparser::PF_X | elfparser::PF_W).to_le_bytes());
        v.extend_from_slice(&0u64.to_le_bytes()); // p_offset, patched below once the code's real offset is known
        v.extend_from_slice(&vaddr.to_le_bytes());
        v.extend_from_slice(&vaddr.to_le_bytes());
        v.extend_from_slice(&(code.len() as u64).to_le_bytes());
        v.extend_from_slice(&(code.len() as u64).to_le_bytes());
        v.extend_from_slice(&0x1000u64.to_le_bytes());

        let data_offset = v.len() as u64;
        // patch in the real p_offset now that we know where the code will land
        let patch_at = phoff as usize + 8;
        v[patch_at..patch_at + 8].copy_from_slice(&data_offset.to_le_bytes());

        v.extend_from_slice(code);
        v
    }

    #[test]
    fn loads_entry_point_and_sets_pc() {
        let binary = minimal_elf(0x10000, &[0x13, 0x00, 0x00, 0x00]); // addi x0,x0,0
        let mut mem = Mmu::new();
        let mut cpu = Cpu::new();
        let entry = load(&binary, &mut mem, &mut cpu, &["target"]).unwrap();
        assert_eq!(entry, 0x10000);
        assert_eq!(cpu.pc, 0x10000);
        assert_eq!(mem.fetch_u32(0x10000).unwrap(), 0x13);
    }

    #[test]
    fn stack_pointer_is_sixteen_byte_aligned() {
        let binary = minimal_elf(0x10000, &[0x13, 0x00, 0x00, 0x00]);
        let mut mem = Mmu::new();
        let mut cpu = Cpu::new();
        load(&binary, &mut mem, &mut cpu, &["target", "-x"]).unwrap();
        assert_eq!(cpu.get_reg(Register::Sp) % 16, 0);
    }

    #[test]
    fn argc_is_written_at_top_of_pushed_frame() {
        let binary = minimal_elf(0x10000, &[0x13, 0x00, 0x00, 0x00]);
        let mut mem = Mmu::new();
        let mut cpu = Cpu::new();
        load(&binary, &mut mem, &mut cpu, &["a", "b"]).unwrap();
        let sp = cpu.get_reg(Register::Sp) as usize;
        assert_eq!(mem.read_u64(sp).unwrap(), 2);
    }

    #[test]
    fn rejects_elf_with_no_load_segments() {
        let mut v = Vec::new();
        v.extend_from_slice(&elfparser::ELFMAGIC.to_le_bytes());
        v.push(elfparser::ARCH64);
        v.push(elfparser::LITTLEENDIAN);
        v.push(1);
        v.push(0);
        v.push(0);
        v.extend_from_slice(&[0u8; 7]);
        v.extend_from_slice(&elfparser::TYPEEXEC.to_le_bytes());
        v.extend_from_slice(&elfparser::RISCV.to_le_bytes());
        v.extend_from_slice(&1u32.to_le_bytes());
        v.extend_from_slice(&0x10000u64.to_le_bytes());
        v.extend_from_slice(&64u64.to_le_bytes());
        v.extend_from_slice(&0u64.to_le_bytes());
        v.extend_from_slice(&0u32.to_le_bytes());
        v.extend_from_slice(&64u16.to_le_bytes());
        v.extend_from_slice(&56u16.to_le_bytes());
        v.extend_from_slice(&0u16.to_le_bytes());
        v.extend_from_slice(&0u16.to_le_bytes());
        v.extend_from_slice(&0u16.to_le_bytes());
        v.extend_from_slice(&0u16.to_le_bytes());

        let mut mem = Mmu::new();
        let mut cpu = Cpu::new();
        assert!(load(&v, &mut mem, &mut cpu, &[]).is_err());
    }
}
