use super::fpu::{self, SoftFloat};
use super::{csr, Core, Exception, ExecutionResult};
use crate::instruction::{
    AmoOp, CsrOp, FpArithOp, FpCompareOp, FusedOp, MinMaxOp, Precision, RoundingMode, SignInjectOp,
};
use crate::memory::{Memory, MemoryError};
use crate::registers::{FpRegister, Registers, Specifier, A0};
use rustc_apfloat::ieee::{Double, Single};
use rustc_apfloat::{Float, FloatConvert, Round, Status, StatusAnd};
use std::sync::Arc;

const SIGN32: u32 = 1 << 31;
const SIGN64: u64 = 1 << 63;

/// Borrow of a [`Core`] for the duration of one instruction's execution.
///
/// Every handler owns the PC update for its instruction: branches and jumps
/// install the target, everything else advances by four.
#[derive(Debug)]
pub(super) struct Executor<'c> {
    pub core: &'c mut Core,
}

impl Executor<'_> {
    /// Executes an `addi` instruction.
    ///
    /// > ADDI adds the sign-extended 12-bit immediate to register rs1.
    /// > Arithmetic overflow is ignored and the result is simply the low
    /// > XLEN bits of the result.
    pub fn addi(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| s.wrapping_add_signed(imm))
    }

    /// Executes a `slti` instruction.
    ///
    /// > SLTI (set less than immediate) places the value 1 in register rd if
    /// > register rs1 is less than the sign-extended immediate when both are
    /// > treated as signed numbers, else 0 is written to rd.
    pub fn slti(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| ((s as i32) < imm) as u32)
    }

    /// Executes a `sltiu` instruction (unsigned compare against the
    /// sign-extended immediate).
    pub fn sltiu(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| (s < (imm as u32)) as u32)
    }

    pub fn xori(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| s ^ (imm as u32))
    }

    pub fn ori(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| s | (imm as u32))
    }

    pub fn andi(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| s & (imm as u32))
    }

    pub fn slli(&mut self, dest: Specifier, src: Specifier, shamt: u32) -> ExecutionResult {
        self.reg_shamt_op(dest, src, shamt, |s, shamt| s << shamt)
    }

    pub fn srli(&mut self, dest: Specifier, src: Specifier, shamt: u32) -> ExecutionResult {
        self.reg_shamt_op(dest, src, shamt, |s, shamt| s >> shamt)
    }

    /// Executes a `srai` instruction.
    ///
    /// > SRAI is an arithmetic right shift (the original sign bit is copied
    /// > into the vacated upper bits).
    pub fn srai(&mut self, dest: Specifier, src: Specifier, shamt: u32) -> ExecutionResult {
        self.reg_shamt_op(dest, src, shamt, |s, shamt| ((s as i32) >> shamt) as u32)
    }

    /// Executes a `lui` instruction.
    ///
    /// > LUI places the U-immediate value in the top 20 bits of the
    /// > destination register rd, filling in the lowest 12 bits with zeros.
    pub fn lui(&mut self, dest: Specifier, immediate: i32) -> ExecutionResult {
        let registers = &mut self.core.registers;
        registers.set_x(dest, immediate as u32 & !0xFFF);
        increment_pc(registers);
        Ok(())
    }

    /// Executes an `auipc` instruction.
    ///
    /// > AUIPC forms a 32-bit offset from the 20-bit U-immediate, filling in
    /// > the lowest 12 bits with zeros, adds this offset to the address of
    /// > the AUIPC instruction, then places the result in register rd.
    pub fn auipc(&mut self, dest: Specifier, immediate: i32) -> ExecutionResult {
        let registers = &mut self.core.registers;
        let result = registers.pc().wrapping_add_signed(immediate & !0xFFF);
        registers.set_x(dest, result);
        increment_pc(registers);
        Ok(())
    }

    pub fn add(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1.wrapping_add(s2))
    }

    pub fn sub(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1.wrapping_sub(s2))
    }

    pub fn slt(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            ((s1 as i32) < (s2 as i32)) as u32
        })
    }

    pub fn sltu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| (s1 < s2) as u32)
    }

    pub fn and(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 & s2)
    }

    pub fn or(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 | s2)
    }

    pub fn xor(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 ^ s2)
    }

    /// Shifts take their amount from the low 5 bits of `src2`.
    pub fn sll(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 << (s2 & 0x1F))
    }

    pub fn srl(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 >> (s2 & 0x1F))
    }

    pub fn sra(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            ((s1 as i32) >> (s2 & 0x1F)) as u32
        })
    }

    /// Executes a `mul` instruction.
    ///
    /// > MUL performs an XLEN-bit×XLEN-bit multiplication of rs1 by rs2 and
    /// > places the lower XLEN bits in the destination register.
    pub fn mul(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            (s1 as i32).wrapping_mul(s2 as i32) as u32
        })
    }

    /// Executes a `mulh` instruction (upper 32 bits of the signed×signed
    /// product).
    pub fn mulh(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            ((s1 as i32 as i64 * s2 as i32 as i64) >> 32) as u32
        })
    }

    /// Executes a `mulhsu` instruction (upper 32 bits of the
    /// signed×unsigned product).
    pub fn mulhsu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            ((s1 as i32 as i64 * s2 as i64) >> 32) as u32
        })
    }

    /// Executes a `mulhu` instruction (upper 32 bits of the
    /// unsigned×unsigned product).
    pub fn mulhu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            ((s1 as u64 * s2 as u64) >> 32) as u32
        })
    }

    /// Executes a `div` instruction.
    ///
    /// > The quotient of division by zero has all bits set, and the
    /// > remainder of division by zero equals the dividend. Signed division
    /// > overflow occurs only when the most-negative integer is divided by
    /// > −1; the quotient is equal to the dividend, and the remainder is
    /// > zero.
    pub fn div(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| match s2 as i32 {
            0 => u32::MAX,
            divisor => (s1 as i32).wrapping_div(divisor) as u32,
        })
    }

    pub fn divu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| match s2 {
            0 => u32::MAX,
            divisor => s1 / divisor,
        })
    }

    pub fn rem(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| match s2 as i32 {
            0 => s1,
            divisor => (s1 as i32).wrapping_rem(divisor) as u32,
        })
    }

    pub fn remu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| match s2 {
            0 => s1,
            divisor => s1 % divisor,
        })
    }

    pub fn jal(&mut self, dest: Specifier, offset: i32) -> ExecutionResult {
        self.jump_op(dest, |registers| registers.pc().wrapping_add_signed(offset))
    }

    /// The target of `jalr` has its lowest bit cleared before use.
    pub fn jalr(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.jump_op(dest, |registers| {
            registers.x(base).wrapping_add_signed(offset) & !1
        })
    }

    pub fn beq(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| s1 == s2)
    }

    pub fn bne(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| s1 != s2)
    }

    pub fn blt(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| (s1 as i32) < (s2 as i32))
    }

    pub fn bltu(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| s1 < s2)
    }

    pub fn bge(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| (s1 as i32) >= (s2 as i32))
    }

    pub fn bgeu(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| s1 >= s2)
    }

    pub fn lb(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.load_op(dest, base, offset, |memory, address| {
            memory.read_byte(address).map(|value| value as i8 as u32)
        })
    }

    pub fn lbu(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.load_op(dest, base, offset, |memory, address| {
            memory.read_byte(address).map(u32::from)
        })
    }

    pub fn lh(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.load_op(dest, base, offset, |memory, address| {
            memory.read_half(address).map(|value| value as i16 as u32)
        })
    }

    pub fn lhu(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.load_op(dest, base, offset, |memory, address| {
            memory.read_half(address).map(u32::from)
        })
    }

    pub fn lw(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.load_op(dest, base, offset, |memory, address| memory.read_word(address))
    }

    pub fn sb(&mut self, src: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.store_op(src, base, offset, |memory, address, value| {
            memory.write_byte(address, value as u8)
        })
    }

    pub fn sh(&mut self, src: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.store_op(src, base, offset, |memory, address, value| {
            memory.write_half(address, value as u16)
        })
    }

    pub fn sw(&mut self, src: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.store_op(src, base, offset, |memory, address, value| {
            memory.write_word(address, value)
        })
    }

    /// All accesses of a single hart already observe program order, so
    /// `fence` needs no further effect.
    pub fn fence(&mut self) -> ExecutionResult {
        increment_pc(&mut self.core.registers);
        Ok(())
    }

    /// Dispatches on the id in `a0` to the process-wide handler table.
    pub fn ecall(&mut self) -> ExecutionResult {
        let id = self.core.registers.x(A0);
        let handler =
            crate::hart::ecall_handler(id).ok_or(Exception::UnknownEcall { id })?;
        let memory = Arc::clone(&self.core.memory);
        handler(self.core.config.hart_id, &memory, &mut self.core.registers);
        // Handlers receive the raw register file; re-establish the
        // hardwired zero afterwards.
        self.core.registers.enforce_zero();
        increment_pc(&mut self.core.registers);
        Ok(())
    }

    /// `ebreak` leaves all state untouched; the run loop observes it
    /// through the breakpoint check.
    pub fn ebreak(&mut self) -> ExecutionResult {
        increment_pc(&mut self.core.registers);
        Ok(())
    }

    pub fn unimplemented(&mut self, name: &'static str) -> ExecutionResult {
        Err(Exception::Unimplemented(name))
    }

    /// Executes the vendor `tva` instruction: runs the Sv32 walk for the
    /// virtual address in `src` and writes the physical address to `dest`.
    pub fn tva(&mut self, dest: Specifier, src: Specifier) -> ExecutionResult {
        let virtual_address = self.core.registers.x(src);
        let satp = self.core.csrs.get(csr::SATP);
        let physical = self
            .core
            .mmu()
            .translate(satp, virtual_address, false)?;
        let registers = &mut self.core.registers;
        registers.set_x(dest, physical);
        increment_pc(registers);
        Ok(())
    }

    /// Executes a `csrrw`/`csrrs`/`csrrc` instruction.
    ///
    /// > CSRRW reads the old value of the CSR, zero-extends the value to
    /// > XLEN bits, then writes it to integer register rd. The initial value
    /// > in rs1 is written to the CSR. If rd=x0, then the instruction shall
    /// > not read the CSR and shall not cause any of the side effects that
    /// > might occur on a CSR read.
    ///
    /// > For both CSRRS and CSRRC, if rs1=x0, then the instruction will not
    /// > write to the CSR at all.
    pub fn csr_reg_op(
        &mut self,
        op: CsrOp,
        dest: Specifier,
        csr: u16,
        src: Specifier,
    ) -> ExecutionResult {
        let value = self.core.registers.x(src);
        let write = op == CsrOp::ReadWrite || src != Specifier::X0;
        self.csr_op(op, dest, csr, value, write)
    }

    /// Executes a `csrrwi`/`csrrsi`/`csrrci` instruction. The immediate
    /// forms always perform the write.
    pub fn csr_imm_op(
        &mut self,
        op: CsrOp,
        dest: Specifier,
        csr: u16,
        immediate: u32,
    ) -> ExecutionResult {
        self.csr_op(op, dest, csr, immediate, true)
    }

    pub fn lr_w(&mut self, dest: Specifier, addr: Specifier) -> ExecutionResult {
        let address = self.core.registers.x(addr);
        let hart = self.core.config.hart_id;
        let value = self.core.memory.read_word_reserved(address, hart)?;
        let registers = &mut self.core.registers;
        registers.set_x(dest, value);
        increment_pc(registers);
        Ok(())
    }

    /// `sc.w` writes 0 to `dest` on success and 1 on failure.
    pub fn sc_w(&mut self, dest: Specifier, src: Specifier, addr: Specifier) -> ExecutionResult {
        let registers = &self.core.registers;
        let address = registers.x(addr);
        let value = registers.x(src);
        let hart = self.core.config.hart_id;
        let succeeded = self.core.memory.write_word_conditional(address, value, hart)?;
        let registers = &mut self.core.registers;
        registers.set_x(dest, !succeeded as u32);
        increment_pc(registers);
        Ok(())
    }

    /// Executes one of the `amo<op>.w` instructions: the old word is
    /// returned in `dest` and `op(old, src)` is written back, indivisibly.
    pub fn amo(
        &mut self,
        op: AmoOp,
        dest: Specifier,
        src: Specifier,
        addr: Specifier,
    ) -> ExecutionResult {
        let registers = &self.core.registers;
        let address = registers.x(addr);
        let value = registers.x(src);
        let memory = &self.core.memory;
        let old = match op {
            AmoOp::Swap => memory.atomic_swap(address, value),
            AmoOp::Add => memory.atomic_add(address, value),
            AmoOp::Xor => memory.atomic_xor(address, value),
            AmoOp::And => memory.atomic_and(address, value),
            AmoOp::Or => memory.atomic_or(address, value),
            AmoOp::Min => memory.atomic_min(address, value),
            AmoOp::Max => memory.atomic_max(address, value),
            AmoOp::MinU => memory.atomic_min_u(address, value),
            AmoOp::MaxU => memory.atomic_max_u(address, value),
        }?;
        let registers = &mut self.core.registers;
        registers.set_x(dest, old);
        increment_pc(registers);
        Ok(())
    }

    pub fn fp_load(
        &mut self,
        precision: Precision,
        dest: Specifier,
        base: Specifier,
        offset: i32,
    ) -> ExecutionResult {
        let address = self.core.registers.x(base).wrapping_add_signed(offset);
        let memory = &self.core.memory;
        let value = match precision {
            Precision::Single => FpRegister::from_single_bits(memory.read_word(address)?),
            Precision::Double => {
                let lo = memory.read_word(address)?;
                let hi = memory.read_word(address.wrapping_add(4))?;
                FpRegister::from_double_bits(u64::from(hi) << 32 | u64::from(lo))
            }
        };
        let registers = &mut self.core.registers;
        registers.set_f(dest, value);
        increment_pc(registers);
        Ok(())
    }

    pub fn fp_store(
        &mut self,
        precision: Precision,
        src: Specifier,
        base: Specifier,
        offset: i32,
    ) -> ExecutionResult {
        let registers = &self.core.registers;
        let address = registers.x(base).wrapping_add_signed(offset);
        let value = registers.f(src);
        let memory = &self.core.memory;
        match precision {
            Precision::Single => memory.write_word(address, value.single_bits())?,
            Precision::Double => {
                let bits = value.double_bits();
                memory.write_word(address, bits as u32)?;
                memory.write_word(address.wrapping_add(4), (bits >> 32) as u32)?;
            }
        }
        increment_pc(&mut self.core.registers);
        Ok(())
    }

    pub fn fp_arith(
        &mut self,
        op: FpArithOp,
        precision: Precision,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
        rm: RoundingMode,
    ) -> ExecutionResult {
        match precision {
            Precision::Single => self.fp_arith_in::<Single>(op, dest, src1, src2, rm),
            Precision::Double => self.fp_arith_in::<Double>(op, dest, src1, src2, rm),
        }
    }

    fn fp_arith_in<F: SoftFloat>(
        &mut self,
        op: FpArithOp,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
        rm: RoundingMode,
    ) -> ExecutionResult {
        let round = self.rounding_mode(rm)?;
        let registers = &self.core.registers;
        let a = F::from_register(registers.f(src1));
        let b = F::from_register(registers.f(src2));
        let operation = match op {
            FpArithOp::Add => F::add_r,
            FpArithOp::Sub => F::sub_r,
            FpArithOp::Mul => F::mul_r,
            FpArithOp::Div => F::div_r,
        };
        let StatusAnd { status, value } = operation(a, b, round);
        self.accumulate_fp_flags(status);
        self.core.registers.set_f(dest, fpu::canonicalised(value));
        increment_pc(&mut self.core.registers);
        Ok(())
    }

    pub fn fp_fused(
        &mut self,
        op: FusedOp,
        precision: Precision,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
        src3: Specifier,
        rm: RoundingMode,
    ) -> ExecutionResult {
        match precision {
            Precision::Single => self.fp_fused_in::<Single>(op, dest, src1, src2, src3, rm),
            Precision::Double => self.fp_fused_in::<Double>(op, dest, src1, src2, src3, rm),
        }
    }

    /// `∞ × 0` signals invalid regardless of the addend, per the fused
    /// multiply-add rules.
    fn fp_fused_in<F: SoftFloat>(
        &mut self,
        op: FusedOp,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
        src3: Specifier,
        rm: RoundingMode,
    ) -> ExecutionResult {
        let round = self.rounding_mode(rm)?;
        let registers = &self.core.registers;
        let a = F::from_register(registers.f(src1));
        let b = F::from_register(registers.f(src2));
        let c = F::from_register(registers.f(src3));
        let StatusAnd { status, value } = match op {
            FusedOp::MulAdd => a.mul_add_r(b, c, round),
            FusedOp::MulSub => a.mul_add_r(b, -c, round),
            FusedOp::NegMulSub => (-a).mul_add_r(b, c, round),
            FusedOp::NegMulAdd => (-a).mul_add_r(b, -c, round),
        };
        self.accumulate_fp_flags(status);
        self.core.registers.set_f(dest, fpu::canonicalised(value));
        increment_pc(&mut self.core.registers);
        Ok(())
    }

    pub fn fp_sqrt(
        &mut self,
        precision: Precision,
        dest: Specifier,
        src: Specifier,
        rm: RoundingMode,
    ) -> ExecutionResult {
        let round = self.rounding_mode(rm)?;
        let value = self.core.registers.f(src);
        let result = match precision {
            Precision::Single => {
                let (StatusAnd { status, value }, _iterations) =
                    ieee_apsqrt::sqrt_accurate(value.single_bits(), round);
                self.accumulate_fp_flags(status);
                fpu::canonicalised(Single::from_bits(value as u128))
            }
            Precision::Double => {
                let (StatusAnd { status, value }, _iterations) =
                    ieee_apsqrt::sqrt_accurate(value.double_bits(), round);
                self.accumulate_fp_flags(status);
                fpu::canonicalised(Double::from_bits(value as u128))
            }
        };
        self.core.registers.set_f(dest, result);
        increment_pc(&mut self.core.registers);
        Ok(())
    }

    /// Sign injection is pure bit manipulation on the held pattern; no
    /// flags are raised and no NaN is canonicalised.
    pub fn fp_sign_inject(
        &mut self,
        op: SignInjectOp,
        precision: Precision,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        let registers = &mut self.core.registers;
        let a = registers.f(src1);
        let b = registers.f(src2);
        let result = match precision {
            Precision::Single => {
                let sign = match op {
                    SignInjectOp::Copy => b.single_bits() & SIGN32,
                    SignInjectOp::Negate => !b.single_bits() & SIGN32,
                    SignInjectOp::Xor => (a.single_bits() ^ b.single_bits()) & SIGN32,
                };
                let low = a.single_bits() & !SIGN32 | sign;
                FpRegister::from_boxed_single(a.raw() & !0xFFFF_FFFF | u64::from(low))
            }
            Precision::Double => {
                let sign = match op {
                    SignInjectOp::Copy => b.double_bits() & SIGN64,
                    SignInjectOp::Negate => !b.double_bits() & SIGN64,
                    SignInjectOp::Xor => (a.double_bits() ^ b.double_bits()) & SIGN64,
                };
                FpRegister::from_double_bits(a.double_bits() & !SIGN64 | sign)
            }
        };
        registers.set_f(dest, result);
        increment_pc(registers);
        Ok(())
    }

    pub fn fp_min_max(
        &mut self,
        op: MinMaxOp,
        precision: Precision,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        match precision {
            Precision::Single => self.fp_min_max_in::<Single>(op, dest, src1, src2),
            Precision::Double => self.fp_min_max_in::<Double>(op, dest, src1, src2),
        }
    }

    /// If both operands are NaN the result is the canonical NaN; if one is,
    /// the other operand is returned. Either case raises the invalid flag.
    /// For ordered operands `-0.0 < +0.0`.
    fn fp_min_max_in<F: SoftFloat>(
        &mut self,
        op: MinMaxOp,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        let registers = &self.core.registers;
        let a = F::from_register(registers.f(src1));
        let b = F::from_register(registers.f(src2));
        let result = match (a.is_nan(), b.is_nan()) {
            (true, true) => F::canonical_nan_register(),
            (true, false) => b.into_register(),
            (false, true) => a.into_register(),
            (false, false) => match op {
                MinMaxOp::Min => a.minimum(b),
                MinMaxOp::Max => a.maximum(b),
            }
            .into_register(),
        };
        if a.is_nan() || b.is_nan() {
            self.raise_fp_flags(fpu::fflags::NV);
        }
        self.core.registers.set_f(dest, result);
        increment_pc(&mut self.core.registers);
        Ok(())
    }

    pub fn fp_compare(
        &mut self,
        op: FpCompareOp,
        precision: Precision,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        match precision {
            Precision::Single => self.fp_compare_in::<Single>(op, dest, src1, src2),
            Precision::Double => self.fp_compare_in::<Double>(op, dest, src1, src2),
        }
    }

    /// Any NaN operand yields 0. `flt`/`fle` raise the invalid flag for any
    /// NaN; `feq` is a quiet comparison and raises it only for signalling
    /// NaNs.
    fn fp_compare_in<F: SoftFloat>(
        &mut self,
        op: FpCompareOp,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        let registers = &self.core.registers;
        let a = F::from_register(registers.f(src1));
        let b = F::from_register(registers.f(src2));
        let invalid = match op {
            FpCompareOp::Eq => a.is_signaling() || b.is_signaling(),
            FpCompareOp::Lt | FpCompareOp::Le => a.is_nan() || b.is_nan(),
        };
        if invalid {
            self.raise_fp_flags(fpu::fflags::NV);
        }
        let result = match op {
            FpCompareOp::Eq => a == b,
            FpCompareOp::Lt => a < b,
            FpCompareOp::Le => a <= b,
        };
        let registers = &mut self.core.registers;
        registers.set_x(dest, result as u32);
        increment_pc(registers);
        Ok(())
    }

    pub fn fp_classify(
        &mut self,
        precision: Precision,
        dest: Specifier,
        src: Specifier,
    ) -> ExecutionResult {
        let class = match precision {
            Precision::Single => Single::classify(self.core.registers.f(src)),
            Precision::Double => Double::classify(self.core.registers.f(src)),
        };
        let registers = &mut self.core.registers;
        registers.set_x(dest, class.mask());
        increment_pc(registers);
        Ok(())
    }

    pub fn fp_to_int(
        &mut self,
        precision: Precision,
        signed: bool,
        dest: Specifier,
        src: Specifier,
        rm: RoundingMode,
    ) -> ExecutionResult {
        match precision {
            Precision::Single => self.fp_to_int_in::<Single>(signed, dest, src, rm),
            Precision::Double => self.fp_to_int_in::<Double>(signed, dest, src, rm),
        }
    }

    /// Conversions to integer saturate: out-of-range values (including
    /// infinities) clamp to the nearest representable bound and NaN
    /// converts like `+∞`, all with the invalid flag; merely-inexact
    /// conversions raise the inexact flag.
    fn fp_to_int_in<F: SoftFloat>(
        &mut self,
        signed: bool,
        dest: Specifier,
        src: Specifier,
        rm: RoundingMode,
    ) -> ExecutionResult {
        let round = self.rounding_mode(rm)?;
        let value = F::from_register(self.core.registers.f(src));
        let value = if value.is_nan() { F::INFINITY } else { value };
        let (status, result) = if signed {
            let StatusAnd { status, value } = value.to_i128_r(32, round, &mut false);
            (status, value as u32)
        } else {
            let StatusAnd { status, value } = value.to_u128_r(32, round, &mut false);
            (status, value as u32)
        };
        self.accumulate_fp_flags(status);
        let registers = &mut self.core.registers;
        registers.set_x(dest, result);
        increment_pc(registers);
        Ok(())
    }

    pub fn int_to_fp(
        &mut self,
        precision: Precision,
        signed: bool,
        dest: Specifier,
        src: Specifier,
        rm: RoundingMode,
    ) -> ExecutionResult {
        match precision {
            Precision::Single => self.int_to_fp_in::<Single>(signed, dest, src, rm),
            Precision::Double => self.int_to_fp_in::<Double>(signed, dest, src, rm),
        }
    }

    fn int_to_fp_in<F: SoftFloat>(
        &mut self,
        signed: bool,
        dest: Specifier,
        src: Specifier,
        rm: RoundingMode,
    ) -> ExecutionResult {
        let round = self.rounding_mode(rm)?;
        let raw = self.core.registers.x(src);
        let StatusAnd { status, value } = if signed {
            F::from_i128_r(raw as i32 as i128, round)
        } else {
            F::from_u128_r(u128::from(raw), round)
        };
        self.accumulate_fp_flags(status);
        self.core.registers.set_f(dest, value.into_register());
        increment_pc(&mut self.core.registers);
        Ok(())
    }

    /// `fcvt.s.d` / `fcvt.d.s`: conversion between the two formats, with
    /// NaNs canonicalised into the destination format.
    pub fn fp_convert_format(
        &mut self,
        to: Precision,
        dest: Specifier,
        src: Specifier,
        rm: RoundingMode,
    ) -> ExecutionResult {
        let round = self.rounding_mode(rm)?;
        let source = self.core.registers.f(src);
        // Narrowing can lose information; that is already reported through
        // the status flags.
        let mut loses_info = false;
        let result = match to {
            Precision::Single => {
                let value = Double::from_register(source);
                let StatusAnd { status, value }: StatusAnd<Single> =
                    value.convert_r(round, &mut loses_info);
                self.accumulate_fp_flags(status);
                fpu::canonicalised(value)
            }
            Precision::Double => {
                let value = Single::from_register(source);
                let StatusAnd { status, value }: StatusAnd<Double> =
                    value.convert_r(round, &mut loses_info);
                self.accumulate_fp_flags(status);
                fpu::canonicalised(value)
            }
        };
        self.core.registers.set_f(dest, result);
        increment_pc(&mut self.core.registers);
        Ok(())
    }

    /// `fmv.x.w` moves the low 32 bits of the register bit-exactly.
    pub fn fp_move_to_int(&mut self, dest: Specifier, src: Specifier) -> ExecutionResult {
        let registers = &mut self.core.registers;
        let bits = registers.f(src).single_bits();
        registers.set_x(dest, bits);
        increment_pc(registers);
        Ok(())
    }

    /// `fmv.w.x` installs the integer bits in the low half; the upper half
    /// is zeroed.
    pub fn fp_move_from_int(&mut self, dest: Specifier, src: Specifier) -> ExecutionResult {
        let registers = &mut self.core.registers;
        let bits = registers.x(src);
        registers.set_f(dest, FpRegister::from_single_bits(bits));
        increment_pc(registers);
        Ok(())
    }

    // Private generic implementations

    fn reg_imm_op<F>(
        &mut self,
        dest: Specifier,
        src: Specifier,
        immediate: i32,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u32, i32) -> u32,
    {
        let registers = &mut self.core.registers;
        registers.set_x(dest, op(registers.x(src), immediate));
        increment_pc(registers);
        Ok(())
    }

    fn reg_shamt_op<F>(
        &mut self,
        dest: Specifier,
        src: Specifier,
        shift_amount_u5: u32,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u32, u32) -> u32,
    {
        debug_assert!(shift_amount_u5 < 32);
        let registers = &mut self.core.registers;
        registers.set_x(dest, op(registers.x(src), shift_amount_u5));
        increment_pc(registers);
        Ok(())
    }

    fn reg_reg_op<F>(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u32, u32) -> u32,
    {
        let registers = &mut self.core.registers;
        registers.set_x(dest, op(registers.x(src1), registers.x(src2)));
        increment_pc(registers);
        Ok(())
    }

    fn jump_op<F>(&mut self, dest: Specifier, compute_target: F) -> ExecutionResult
    where
        F: FnOnce(&Registers) -> u32,
    {
        let registers = &mut self.core.registers;
        let target = compute_target(registers);
        let link = registers.pc().wrapping_add(4);
        *registers.pc_mut() = target;
        registers.set_x(dest, link);
        Ok(())
    }

    // Takes the branch if `predicate` returns `true`. A misaligned target
    // is reported by the next fetch rather than here.
    fn cond_branch<P>(
        &mut self,
        src1: Specifier,
        src2: Specifier,
        offset: i32,
        predicate: P,
    ) -> ExecutionResult
    where
        P: FnOnce(u32, u32) -> bool,
    {
        let registers = &mut self.core.registers;
        if predicate(registers.x(src1), registers.x(src2)) {
            let pc = registers.pc();
            *registers.pc_mut() = pc.wrapping_add_signed(offset);
        } else {
            increment_pc(registers);
        }
        Ok(())
    }

    fn load_op<F>(&mut self, dest: Specifier, base: Specifier, offset: i32, op: F) -> ExecutionResult
    where
        F: FnOnce(&Memory, u32) -> Result<u32, MemoryError>,
    {
        let address = self.core.registers.x(base).wrapping_add_signed(offset);
        let value = op(&self.core.memory, address)?;
        let registers = &mut self.core.registers;
        registers.set_x(dest, value);
        increment_pc(registers);
        Ok(())
    }

    fn store_op<F>(&mut self, src: Specifier, base: Specifier, offset: i32, op: F) -> ExecutionResult
    where
        F: FnOnce(&Memory, u32, u32) -> Result<(), MemoryError>,
    {
        let registers = &self.core.registers;
        let address = registers.x(base).wrapping_add_signed(offset);
        let value = registers.x(src);
        op(&self.core.memory, address, value)?;
        increment_pc(&mut self.core.registers);
        Ok(())
    }

    fn csr_op(
        &mut self,
        op: CsrOp,
        dest: Specifier,
        csr: u16,
        src_value: u32,
        write: bool,
    ) -> ExecutionResult {
        let privilege = self.core.privilege;
        if dest != Specifier::X0 {
            let old = self.core.read_csr(csr, privilege, false)?;
            self.core.registers.set_x(dest, old);
        }
        if write {
            let value = match op {
                CsrOp::ReadWrite => src_value,
                // The set/clear forms read back through the internal path:
                // the instruction-level privilege check already ran (or was
                // skipped because rd = x0, matching the write-only case).
                CsrOp::ReadSet => self.core.read_csr(csr, privilege, true)? | src_value,
                CsrOp::ReadClear => self.core.read_csr(csr, privilege, true)? & !src_value,
            };
            self.core.write_csr(csr, privilege, value)?;
        }
        increment_pc(&mut self.core.registers);
        Ok(())
    }

    fn rounding_mode(&self, rm: RoundingMode) -> Result<Round, Exception> {
        let frm = (self.core.csrs.get(csr::FCSR) >> fpu::FRM_SHIFT) & 0b111;
        fpu::resolve_rounding_mode(rm, frm).map_err(|_| Exception::IllegalInstruction)
    }

    fn accumulate_fp_flags(&mut self, status: Status) {
        self.raise_fp_flags(fpu::status_to_fflags(status));
    }

    fn raise_fp_flags(&mut self, bits: u32) {
        if bits != 0 {
            let fcsr = self.core.csrs.get(csr::FCSR);
            self.core.csrs.set(csr::FCSR, fcsr | bits);
        }
    }
}

fn increment_pc(registers: &mut Registers) {
    let pc = registers.pc_mut();
    *pc = pc.wrapping_add(4);
}
