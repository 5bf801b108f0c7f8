//! The interpreter core: one hart's architectural state and its
//! fetch/decode/execute step.

pub mod csr;
mod execute;
pub mod fpu;
pub mod mmu;

use crate::instruction::{
    BranchCondition, CsrOp, Instruction, LoadWidth, RegImmOp, RegRegOp, RegShiftImmOp, StoreWidth,
};
use crate::memory::{Memory, MemoryError};
use crate::registers::Registers;
use crate::timer::{self, MachineTimer};
use crate::PrivilegeLevel;
use csr::CsrFile;
use execute::Executor;

pub use csr::CsrSpecifier;
use mmu::{Mmu, TranslationError};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    /// > The mhartid CSR is an MXLEN-bit read-only register containing the
    /// > integer ID of the hardware thread running the code. This register
    /// > must be readable in any implementation. Hart IDs might not
    /// > necessarily be numbered contiguously in a multiprocessor system,
    /// > but at least one hart must have a hart ID of zero.
    pub hart_id: u32,
    /// Address the `pc` register is reset to.
    pub reset_vector: u32,
}

/// One hart's interpreter state: registers, CSR file, privilege level, and
/// the cycle counter, plus handles to the shared memory fabric and the
/// machine timer.
#[derive(Debug)]
pub struct Core {
    pub(crate) config: Config,
    pub(crate) memory: Arc<Memory>,
    timer: Arc<MachineTimer>,
    pub(crate) registers: Registers,
    pub(crate) csrs: CsrFile,
    pub(crate) privilege: PrivilegeLevel,
    cycles: u64,
}

impl Core {
    /// The misa CSR value: MXL=32, with the A, D, F, I, and M extensions.
    ///
    /// > The misa CSR is a WARL read-write register reporting the ISA
    /// > supported by the hart. This register must be readable in any
    /// > implementation.
    pub const MISA: u32 = (1 << 30) | (1 << 0) | (1 << 3) | (1 << 5) | (1 << 8) | (1 << 12);
    /// The mvendorid CSR is set to 0 to indicate this is a non-commercial
    /// implementation.
    pub const MVENDORID: u32 = 0;
    /// The marchid CSR carries the packed ASCII architecture identifier
    /// (`"HINE"` read as a little-endian word).
    pub const MARCHID: u32 = u32::from_le_bytes(*b"HINE");
    /// The mimpid CSR carries the packed ASCII implementation identifier
    /// (`"VMAC"` read as a little-endian word).
    pub const MIMPID: u32 = u32::from_le_bytes(*b"VMAC");

    pub fn new(memory: Arc<Memory>, machine_timer: Arc<MachineTimer>, config: Config) -> Self {
        let mut core = Self {
            memory,
            timer: machine_timer,
            registers: Registers::new(config.reset_vector),
            csrs: CsrFile::new(),
            privilege: PrivilegeLevel::Machine,
            cycles: 0,
            config,
        };
        core.csrs.set(csr::MVENDORID, Self::MVENDORID);
        core.csrs.set(csr::MARCHID, Self::MARCHID);
        core.csrs.set(csr::MIMPID, Self::MIMPID);
        core.csrs.set(csr::MHARTID, core.config.hart_id);
        core.csrs.set(csr::MISA, Self::MISA);
        core.reset();
        core
    }

    /// Forces the hart back to its reset state: registers and the
    /// user/supervisor CSRs zeroed, privilege back to Machine, the cycle
    /// counter cleared, and `mtime` seeded from the wall clock.
    pub fn reset(&mut self) {
        self.registers.reset();
        *self.registers.pc_mut() = self.config.reset_vector;
        self.csrs.reset();
        self.privilege = PrivilegeLevel::Machine;
        self.cycles = 0;
        self.timer.set_mtime(wall_clock_ticks());
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    /// The shared memory fabric this core reads and writes through.
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn pc(&self) -> u32 {
        self.registers.pc()
    }

    /// Returns the current privilege level the core is in.
    pub fn privilege(&self) -> PrivilegeLevel {
        self.privilege
    }

    /// Forces the privilege level, e.g. to drop a freshly reset hart into
    /// user mode before handing it a program.
    pub fn set_privilege(&mut self, privilege: PrivilegeLevel) {
        self.privilege = privilege;
    }

    /// Number of instructions this core has executed since reset.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Reports whether the core runs in 32-bit mode (the MXL field of
    /// `misa`).
    pub fn is_32_bit(&self) -> bool {
        Self::MISA >> 30 == 1
    }

    /// Provides the address-translation view over this core's memory.
    pub fn mmu(&self) -> Mmu<'_> {
        Mmu::new(&self.memory)
    }

    /// Read the value of a CSR by its specifier.
    ///
    /// Unless `internal` is set, the read is subject to the privilege gate
    /// for `privilege`. Aliased specifiers are projected: the cycle
    /// counter's halves, the memory-mapped `mtime`, the `fcsr` views, and
    /// the always-zero performance-monitoring banks.
    pub fn read_csr(
        &self,
        specifier: CsrSpecifier,
        privilege: PrivilegeLevel,
        internal: bool,
    ) -> Result<u32, Exception> {
        if !internal && !csr::is_accessible(specifier, privilege) {
            return Err(Exception::CsrReadPrivilege(specifier));
        }
        if !self.csrs.is_declared(specifier) {
            return Err(Exception::InvalidCsr(specifier));
        }
        if in_zero_reading_bank(specifier) {
            return Ok(0);
        }
        Ok(match specifier {
            csr::CYCLE | csr::MCYCLE => self.cycles as u32,
            csr::CYCLEH | csr::MCYCLEH => (self.cycles >> 32) as u32,
            csr::TIME => self.timer.mtime() as u32,
            csr::TIMEH => (self.timer.mtime() >> 32) as u32,
            csr::FFLAGS => self.csrs.get(csr::FCSR) & fpu::fflags::MASK,
            csr::FRM => (self.csrs.get(csr::FCSR) >> fpu::FRM_SHIFT) & 0b111,
            _ => self.csrs.get(specifier),
        })
    }

    /// Write `value` to a CSR.
    ///
    /// Writes to declared read-only CSRs are silently discarded; writes to
    /// undeclared or privilege-protected CSRs fail.
    pub fn write_csr(
        &mut self,
        specifier: CsrSpecifier,
        privilege: PrivilegeLevel,
        value: u32,
    ) -> Result<(), Exception> {
        if !csr::is_accessible(specifier, privilege) {
            return Err(Exception::CsrWritePrivilege(specifier));
        }
        if !self.csrs.is_declared(specifier) {
            return Err(Exception::InvalidCsr(specifier));
        }
        if csr::is_read_only(specifier) {
            return Ok(());
        }
        match specifier {
            csr::FFLAGS => {
                let fcsr = self.csrs.get(csr::FCSR);
                self.csrs.set(
                    csr::FCSR,
                    fcsr & !fpu::fflags::MASK | (value & fpu::fflags::MASK),
                );
            }
            csr::FRM => {
                let fcsr = self.csrs.get(csr::FCSR);
                self.csrs
                    .set(csr::FCSR, fcsr & !0xE0 | ((value & 0b111) << fpu::FRM_SHIFT));
            }
            csr::FCSR => self.csrs.set(csr::FCSR, value & 0xFF),
            _ => self.csrs.set(specifier, value),
        }
        Ok(())
    }

    /// Materialises every declared CSR, including the aliased projections,
    /// for an inspector snapshot.
    pub fn csr_snapshot(&self) -> std::collections::HashMap<CsrSpecifier, u32> {
        self.csrs
            .iter_declared()
            .map(|specifier| {
                let value = self
                    .read_csr(specifier, PrivilegeLevel::Machine, true)
                    .unwrap_or(0);
                (specifier, value)
            })
            .collect()
    }

    /// Executes a single instruction, including the fetch and decode steps
    /// and the cycle-counter update. The PC is left wherever the
    /// instruction put it.
    pub fn step(&mut self) -> Result<(), ExecError> {
        let pc = self.registers.pc();
        if pc & 0b11 != 0 {
            return Err(ExecError::MisalignedPc { pc });
        }
        let access = self.mmu().check_access(pc);
        if !access.present {
            return Err(ExecError::FetchFault { pc });
        }
        let raw = match self.memory.read_word(access.physical_address) {
            Ok(raw) => raw,
            Err(MemoryError::AccessFault { address }) => {
                return Err(ExecError::AccessFault { pc, address })
            }
        };
        let instruction =
            Instruction::decode(raw).map_err(|_| ExecError::IllegalInstruction { pc, raw })?;
        self.cycles = self.cycles.wrapping_add(1);
        let result = self.execute_instruction(instruction);
        // The hardwired zero is re-established after every instruction, no
        // matter what the handler did.
        self.registers.enforce_zero();
        result.map_err(|exception| exception.into_error(pc, raw, self.config.hart_id))
    }

    /// Dispatches one decoded instruction to its handler.
    pub fn execute_instruction(&mut self, instruction: Instruction) -> ExecutionResult {
        let mut executor = Executor { core: self };
        match instruction {
            Instruction::OpImm {
                op,
                dest,
                src,
                immediate,
            } => {
                let op = match op {
                    RegImmOp::Addi => Executor::addi,
                    RegImmOp::Slti => Executor::slti,
                    RegImmOp::Sltiu => Executor::sltiu,
                    RegImmOp::Xori => Executor::xori,
                    RegImmOp::Ori => Executor::ori,
                    RegImmOp::Andi => Executor::andi,
                };
                op(&mut executor, dest, src, immediate)
            }
            Instruction::OpShiftImm {
                op,
                dest,
                src,
                shift_amount_u5,
            } => {
                let op = match op {
                    RegShiftImmOp::Slli => Executor::slli,
                    RegShiftImmOp::Srli => Executor::srli,
                    RegShiftImmOp::Srai => Executor::srai,
                };
                op(&mut executor, dest, src, shift_amount_u5)
            }
            Instruction::Auipc { dest, immediate } => executor.auipc(dest, immediate),
            Instruction::Lui { dest, immediate } => executor.lui(dest, immediate),
            Instruction::Op {
                op,
                dest,
                src1,
                src2,
            } => {
                let op = match op {
                    RegRegOp::Add => Executor::add,
                    RegRegOp::Slt => Executor::slt,
                    RegRegOp::Sltu => Executor::sltu,
                    RegRegOp::And => Executor::and,
                    RegRegOp::Or => Executor::or,
                    RegRegOp::Xor => Executor::xor,
                    RegRegOp::Sll => Executor::sll,
                    RegRegOp::Srl => Executor::srl,
                    RegRegOp::Sub => Executor::sub,
                    RegRegOp::Sra => Executor::sra,
                    RegRegOp::Mul => Executor::mul,
                    RegRegOp::Mulh => Executor::mulh,
                    RegRegOp::Mulhsu => Executor::mulhsu,
                    RegRegOp::Mulhu => Executor::mulhu,
                    RegRegOp::Div => Executor::div,
                    RegRegOp::Divu => Executor::divu,
                    RegRegOp::Rem => Executor::rem,
                    RegRegOp::Remu => Executor::remu,
                };
                op(&mut executor, dest, src1, src2)
            }
            Instruction::Jal { dest, offset } => executor.jal(dest, offset),
            Instruction::Jalr { dest, base, offset } => executor.jalr(dest, base, offset),
            Instruction::Branch {
                condition,
                src1,
                src2,
                offset,
            } => {
                let op = match condition {
                    BranchCondition::Beq => Executor::beq,
                    BranchCondition::Bne => Executor::bne,
                    BranchCondition::Blt => Executor::blt,
                    BranchCondition::Bltu => Executor::bltu,
                    BranchCondition::Bge => Executor::bge,
                    BranchCondition::Bgeu => Executor::bgeu,
                };
                op(&mut executor, src1, src2, offset)
            }
            Instruction::Load {
                width,
                dest,
                base,
                offset,
            } => {
                let op = match width {
                    LoadWidth::Lb => Executor::lb,
                    LoadWidth::Lh => Executor::lh,
                    LoadWidth::Lw => Executor::lw,
                    LoadWidth::Lbu => Executor::lbu,
                    LoadWidth::Lhu => Executor::lhu,
                };
                op(&mut executor, dest, base, offset)
            }
            Instruction::Store {
                width,
                src,
                base,
                offset,
            } => {
                let op = match width {
                    StoreWidth::Sb => Executor::sb,
                    StoreWidth::Sh => Executor::sh,
                    StoreWidth::Sw => Executor::sw,
                };
                op(&mut executor, src, base, offset)
            }
            Instruction::Fence => executor.fence(),
            Instruction::Ecall => executor.ecall(),
            Instruction::Ebreak => executor.ebreak(),
            Instruction::Csr { op, dest, csr, src } => executor.csr_reg_op(op, dest, csr, src),
            Instruction::Csri {
                op,
                dest,
                csr,
                immediate,
            } => executor.csr_imm_op(op, dest, csr, immediate),
            Instruction::LoadReserved { dest, addr } => executor.lr_w(dest, addr),
            Instruction::StoreConditional { dest, src, addr } => executor.sc_w(dest, src, addr),
            Instruction::Amo {
                op,
                dest,
                src,
                addr,
            } => executor.amo(op, dest, src, addr),
            Instruction::FpLoad {
                precision,
                dest,
                base,
                offset,
            } => executor.fp_load(precision, dest, base, offset),
            Instruction::FpStore {
                precision,
                src,
                base,
                offset,
            } => executor.fp_store(precision, src, base, offset),
            Instruction::FpFused {
                op,
                precision,
                dest,
                src1,
                src2,
                src3,
                rm,
            } => executor.fp_fused(op, precision, dest, src1, src2, src3, rm),
            Instruction::FpArith {
                op,
                precision,
                dest,
                src1,
                src2,
                rm,
            } => executor.fp_arith(op, precision, dest, src1, src2, rm),
            Instruction::FpSqrt {
                precision,
                dest,
                src,
                rm,
            } => executor.fp_sqrt(precision, dest, src, rm),
            Instruction::FpSignInject {
                op,
                precision,
                dest,
                src1,
                src2,
            } => executor.fp_sign_inject(op, precision, dest, src1, src2),
            Instruction::FpMinMax {
                op,
                precision,
                dest,
                src1,
                src2,
            } => executor.fp_min_max(op, precision, dest, src1, src2),
            Instruction::FpCompare {
                op,
                precision,
                dest,
                src1,
                src2,
            } => executor.fp_compare(op, precision, dest, src1, src2),
            Instruction::FpClassify {
                precision,
                dest,
                src,
            } => executor.fp_classify(precision, dest, src),
            Instruction::FpToInt {
                precision,
                signed,
                dest,
                src,
                rm,
            } => executor.fp_to_int(precision, signed, dest, src, rm),
            Instruction::IntToFp {
                precision,
                signed,
                dest,
                src,
                rm,
            } => executor.int_to_fp(precision, signed, dest, src, rm),
            Instruction::FpConvertFormat { to, dest, src, rm } => {
                executor.fp_convert_format(to, dest, src, rm)
            }
            Instruction::FpMoveToInt { dest, src } => executor.fp_move_to_int(dest, src),
            Instruction::FpMoveFromInt { dest, src } => executor.fp_move_from_int(dest, src),
            Instruction::Uret => executor.unimplemented("uret"),
            Instruction::Sret => executor.unimplemented("sret"),
            Instruction::Mret => executor.unimplemented("mret"),
            Instruction::Wfi => executor.unimplemented("wfi"),
            Instruction::SfenceVma { .. } => executor.unimplemented("sfence.vma"),
            Instruction::SinvalVma { .. } => executor.unimplemented("sinval.vma"),
            Instruction::SinvalGvma { .. } => executor.unimplemented("sinval.gvma"),
            Instruction::SfenceWInval => executor.unimplemented("sfence.w.inval"),
            Instruction::SfenceInvalIr => executor.unimplemented("sfence.inval.ir"),
            Instruction::Tva { dest, src } => executor.tva(dest, src),
        }
    }
}

/// The zero-reading performance-monitoring banks: `mhpmcounter3..31`,
/// `mhpmcounter3h..31h`, and `mhpmevent3..31` read as zero regardless of
/// what was stored.
fn in_zero_reading_bank(specifier: CsrSpecifier) -> bool {
    let banks = [csr::MHPMCOUNTER3, csr::MHPMCOUNTER3H, csr::MHPMEVENT3];
    banks
        .iter()
        .any(|&base| (base..base + csr::PERF_COUNTER_MAX - 3).contains(&specifier))
}

fn wall_clock_ticks() -> u64 {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (since_epoch.as_secs_f64() * timer::TICKS_PER_SECOND as f64) as u64
}

/// Result of executing a single instruction. [`Ok`] if execution went
/// normal, [`Err`] if an exception occurred.
pub type ExecutionResult = Result<(), Exception>;

/// Exception raised while executing one instruction, before the core
/// attaches the PC and raw-word context.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Exception {
    AccessFault { address: u32 },
    PageFault { address: u32 },
    IllegalInstruction,
    CsrReadPrivilege(CsrSpecifier),
    CsrWritePrivilege(CsrSpecifier),
    InvalidCsr(CsrSpecifier),
    UnknownEcall { id: u32 },
    Unimplemented(&'static str),
}

impl Exception {
    fn into_error(self, pc: u32, raw: u32, hart: u32) -> ExecError {
        match self {
            Exception::AccessFault { address } => ExecError::AccessFault { pc, address },
            Exception::PageFault { address } => ExecError::PageFault { pc, address },
            Exception::IllegalInstruction => ExecError::IllegalInstruction { pc, raw },
            Exception::CsrReadPrivilege(specifier) => ExecError::CsrReadPrivilege { pc, specifier },
            Exception::CsrWritePrivilege(specifier) => {
                ExecError::CsrWritePrivilege { pc, specifier }
            }
            Exception::InvalidCsr(specifier) => ExecError::InvalidCsr { pc, specifier },
            Exception::UnknownEcall { id } => ExecError::UnknownEcall { hart, id },
            Exception::Unimplemented(name) => ExecError::UnimplementedInstruction { pc, name },
        }
    }
}

impl From<MemoryError> for Exception {
    fn from(error: MemoryError) -> Self {
        let MemoryError::AccessFault { address } = error;
        Exception::AccessFault { address }
    }
}

impl From<TranslationError> for Exception {
    fn from(error: TranslationError) -> Self {
        match error {
            TranslationError::AccessFault { address } => Exception::AccessFault { address },
            TranslationError::PageFault { address } => Exception::PageFault { address },
        }
    }
}

/// Errors surfaced from [`Core::step`] and the hart runtime. None of these
/// are recovered inside the core; they abort the current batch and carry
/// enough context to be reported.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum ExecError {
    #[error("program counter {pc:#010x} is not word-aligned")]
    MisalignedPc { pc: u32 },
    #[error("instruction address {pc:#010x} is not present")]
    FetchFault { pc: u32 },
    #[error("invalid instruction at {pc:#010x}: {raw:#010x}")]
    IllegalInstruction { pc: u32, raw: u32 },
    #[error("access fault at {address:#010x} (pc {pc:#010x})")]
    AccessFault { pc: u32, address: u32 },
    #[error("page fault for address {address:#010x} (pc {pc:#010x})")]
    PageFault { pc: u32, address: u32 },
    #[error("CSR {specifier:#05x} is not readable from the current privilege level (pc {pc:#010x})")]
    CsrReadPrivilege { pc: u32, specifier: CsrSpecifier },
    #[error("CSR {specifier:#05x} is not writable from the current privilege level (pc {pc:#010x})")]
    CsrWritePrivilege { pc: u32, specifier: CsrSpecifier },
    #[error("access to undeclared CSR {specifier:#05x} (pc {pc:#010x})")]
    InvalidCsr { pc: u32, specifier: CsrSpecifier },
    #[error("hart {hart} called unknown ecall handler {id}")]
    UnknownEcall { hart: u32, id: u32 },
    #[error("instruction not implemented: {name} (pc {pc:#010x})")]
    UnimplementedInstruction { pc: u32, name: &'static str },
    #[error("timer expired: mtime {mtime} has reached mtimecmp {mtimecmp}")]
    TimerOverflow { mtime: u64, mtimecmp: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryRegion, Ram};

    fn test_core() -> Core {
        let memory = Arc::new(Memory::new());
        memory
            .attach_region(0x1000, Arc::new(Ram::new(0x10000).unwrap()))
            .unwrap();
        let machine_timer = Arc::new(MachineTimer::new());
        memory
            .attach_region(
                timer::TIMER_BASE,
                Arc::clone(&machine_timer) as Arc<dyn MemoryRegion>,
            )
            .unwrap();
        Core::new(
            Arc::clone(&memory),
            machine_timer,
            Config {
                hart_id: 0,
                reset_vector: 0x1000,
            },
        )
    }

    #[test]
    fn test_machine_identity() {
        let core = test_core();
        let m = PrivilegeLevel::Machine;
        assert_eq!(0x454E_4948, core.read_csr(csr::MARCHID, m, false).unwrap());
        assert_eq!(0x4341_4D56, core.read_csr(csr::MIMPID, m, false).unwrap());
        assert_eq!(0x4000_1129, core.read_csr(csr::MISA, m, false).unwrap());
        assert!(core.is_32_bit());
    }

    #[test]
    fn test_read_only_write_is_silent() {
        let mut core = test_core();
        let m = PrivilegeLevel::Machine;
        let before = core.read_csr(csr::MISA, m, false).unwrap();
        core.write_csr(csr::MISA, m, 0xFFFF_FFFF).unwrap();
        assert_eq!(before, core.read_csr(csr::MISA, m, false).unwrap());
    }

    #[test]
    fn test_cycle_aliases() {
        let mut core = test_core();
        let m = PrivilegeLevel::Machine;
        core.cycles = 0x1_2345_6789;
        assert_eq!(0x2345_6789, core.read_csr(csr::CYCLE, m, false).unwrap());
        assert_eq!(0x2345_6789, core.read_csr(csr::MCYCLE, m, false).unwrap());
        assert_eq!(1, core.read_csr(csr::CYCLEH, m, false).unwrap());
        assert_eq!(1, core.read_csr(csr::MCYCLEH, m, false).unwrap());
    }

    #[test]
    fn test_time_projects_mtime() {
        let core = test_core();
        core.timer.set_mtime(0xABCD_0123_4567_89EF);
        let m = PrivilegeLevel::Machine;
        assert_eq!(0x4567_89EF, core.read_csr(csr::TIME, m, false).unwrap());
        assert_eq!(0xABCD_0123, core.read_csr(csr::TIMEH, m, false).unwrap());
    }

    #[test]
    fn test_perf_banks_read_zero() {
        let mut core = test_core();
        let m = PrivilegeLevel::Machine;
        core.write_csr(csr::MHPMCOUNTER3 + 5, m, 77).unwrap();
        core.write_csr(csr::MHPMEVENT3 + 5, m, 77).unwrap();
        assert_eq!(0, core.read_csr(csr::MHPMCOUNTER3 + 5, m, false).unwrap());
        assert_eq!(0, core.read_csr(csr::MHPMEVENT3 + 5, m, false).unwrap());
    }

    #[test]
    fn test_fcsr_aliases() {
        let mut core = test_core();
        let m = PrivilegeLevel::Machine;
        core.write_csr(csr::FRM, m, 0b010).unwrap();
        core.write_csr(csr::FFLAGS, m, 0b10001).unwrap();
        assert_eq!(
            0b010_10001,
            core.read_csr(csr::FCSR, m, false).unwrap()
        );
        core.write_csr(csr::FCSR, m, 0b111_00100).unwrap();
        assert_eq!(0b00100, core.read_csr(csr::FFLAGS, m, false).unwrap());
        assert_eq!(0b111, core.read_csr(csr::FRM, m, false).unwrap());
    }

    #[test]
    fn test_privilege_gate_errors() {
        let core = test_core();
        assert_eq!(
            Err(Exception::CsrReadPrivilege(csr::MSTATUS)),
            core.read_csr(csr::MSTATUS, PrivilegeLevel::User, false)
        );
        // Internal reads bypass the gate.
        assert!(core
            .read_csr(csr::MSTATUS, PrivilegeLevel::User, true)
            .is_ok());
        assert_eq!(
            Err(Exception::InvalidCsr(0x004)),
            core.read_csr(0x004, PrivilegeLevel::Machine, false)
        );
    }

    #[test]
    fn test_csr_snapshot_materialises_projections() {
        let mut core = test_core();
        core.cycles = 42;
        core.timer.set_mtime(99);
        let snapshot = core.csr_snapshot();
        assert_eq!(Some(&42), snapshot.get(&csr::CYCLE));
        assert_eq!(Some(&42), snapshot.get(&csr::MCYCLE));
        assert_eq!(Some(&99), snapshot.get(&csr::TIME));
        assert_eq!(Some(&0), snapshot.get(&csr::MHPMCOUNTER3));
        assert_eq!(Some(&Core::MISA), snapshot.get(&csr::MISA));
    }
}
