//! End-to-end execution scenarios driven through the hart runtime.

use std::sync::Arc;
use vmac_core::core::{csr, ExecError};
use vmac_core::hart::Hart;
use vmac_core::memory::{Memory, Ram};
use vmac_core::registers::{FpRegister, Specifier};
use vmac_core::PrivilegeLevel;

fn x(index: u8) -> Specifier {
    Specifier::new(index).unwrap()
}

/// A hart over 4 MiB of RAM mapped at address zero.
fn hart_at(pc: u32) -> Hart {
    let memory = Arc::new(Memory::new());
    memory
        .attach_region(0, Arc::new(Ram::new(1 << 22).unwrap()))
        .unwrap();
    Hart::new(memory, pc, 0).unwrap()
}

fn load_words(hart: &Hart, base: u32, words: &[u32]) {
    hart.with_core(|core| {
        for (i, &word) in words.iter().enumerate() {
            core.memory().write_word(base + 4 * i as u32, word).unwrap();
        }
    });
}

#[test]
fn addi_chain() {
    let hart = hart_at(0x1000);
    // addi x5, x0, 7; addi x5, x5, -3
    load_words(&hart, 0x1000, &[0x0070_0293, 0xFFD2_8293]);
    assert!(!hart.step(2).unwrap());
    let (regs, _, pc) = hart.snapshot();
    assert_eq!(4, regs[5]);
    assert_eq!(0x1008, pc);
    assert_eq!(2, hart.with_core(|core| core.cycles()));
}

#[test]
fn bne_taken_and_not_taken() {
    let hart = hart_at(0x2000);
    // bne x1, x2, +16
    load_words(&hart, 0x2000, &[0x0020_9863]);
    hart.with_core(|core| {
        core.registers_mut().set_x(x(1), 5);
        core.registers_mut().set_x(x(2), 9);
    });
    hart.step(1).unwrap();
    assert_eq!(0x2010, hart.pc());

    let hart = hart_at(0x2000);
    load_words(&hart, 0x2000, &[0x0020_9863]);
    hart.with_core(|core| {
        core.registers_mut().set_x(x(1), 9);
        core.registers_mut().set_x(x(2), 9);
    });
    hart.step(1).unwrap();
    assert_eq!(0x2004, hart.pc());
}

#[test]
fn lb_sign_extends() {
    let hart = hart_at(0x1000);
    // lb x2, 0(x1)
    load_words(&hart, 0x1000, &[0x0000_8103]);
    hart.with_core(|core| {
        core.memory().write_byte(0x3000, 0xFF).unwrap();
        core.registers_mut().set_x(x(1), 0x3000);
    });
    hart.step(1).unwrap();
    let (regs, _, _) = hart.snapshot();
    assert_eq!(0xFFFF_FFFF, regs[2]);
}

#[test]
fn lr_sc_success_then_failure() {
    let hart = hart_at(0x1000);
    // lr.w x1, (x10); sc.w x2, x3, (x10); sc.w x2, x3, (x10)
    load_words(&hart, 0x1000, &[0x1005_20AF, 0x1835_212F, 0x1835_212F]);
    hart.with_core(|core| {
        core.registers_mut().set_x(x(10), 0x4000);
        core.registers_mut().set_x(x(3), 0xABCD);
    });
    hart.step(2).unwrap();
    let (regs, _, _) = hart.snapshot();
    assert_eq!(0, regs[2], "first sc.w must succeed");
    assert_eq!(
        0xABCD,
        hart.with_core(|core| core.memory().read_word(0x4000).unwrap())
    );
    hart.step(1).unwrap();
    let (regs, _, _) = hart.snapshot();
    assert_eq!(1, regs[2], "sc.w without a reservation must fail");
}

#[test]
fn fadd_with_signalling_nan() {
    let hart = hart_at(0x1000);
    // fadd.s f3, f1, f2
    load_words(&hart, 0x1000, &[0x0020_81D3]);
    hart.with_core(|core| {
        let registers = core.registers_mut();
        registers.set_f(x(1), FpRegister::from_single_bits(0x7F80_0001));
        registers.set_f(x(2), FpRegister::from_single_bits(0x3F80_0000));
    });
    hart.step(1).unwrap();
    let (_, fregs, _) = hart.snapshot();
    assert_eq!(0xFFFF_FFFF_7FC0_0000, fregs[3].raw());
    let fflags = hart.with_core(|core| {
        core.read_csr(csr::FFLAGS, PrivilegeLevel::Machine, true).unwrap()
    });
    assert_ne!(0, fflags & 0x10, "NV must be accrued");
}

#[test]
fn fadd_d_canonicalises_nan() {
    let hart = hart_at(0x1000);
    // fadd.d f3, f1, f2
    load_words(&hart, 0x1000, &[0x0220_81D3]);
    hart.with_core(|core| {
        let registers = core.registers_mut();
        registers.set_f(x(1), FpRegister::from_double_bits(0x7FF0_0000_0000_0001));
        registers.set_f(x(2), FpRegister::from_double_bits(0x3FF0_0000_0000_0000));
    });
    hart.step(1).unwrap();
    let (_, fregs, _) = hart.snapshot();
    assert_eq!(0x7FF8_0000_0000_0000, fregs[3].raw());
    let fflags = hart.with_core(|core| {
        core.read_csr(csr::FFLAGS, PrivilegeLevel::Machine, true).unwrap()
    });
    assert_ne!(0, fflags & 0x10, "NV must be accrued");
}

#[test]
fn fdiv_d_zero_by_zero_canonicalises() {
    let hart = hart_at(0x1000);
    // fdiv.d f3, f1, f2
    load_words(&hart, 0x1000, &[0x1A20_81D3]);
    hart.with_core(|core| {
        let registers = core.registers_mut();
        registers.set_f(x(1), FpRegister::from_double_bits(0));
        registers.set_f(x(2), FpRegister::from_double_bits(0));
    });
    hart.step(1).unwrap();
    let (_, fregs, _) = hart.snapshot();
    assert_eq!(0x7FF8_0000_0000_0000, fregs[3].raw());
    let fflags = hart.with_core(|core| {
        core.read_csr(csr::FFLAGS, PrivilegeLevel::Machine, true).unwrap()
    });
    assert_ne!(0, fflags & 0x10, "0/0 is an invalid operation");
}

#[test]
fn csr_privilege_gate() {
    let hart = hart_at(0x1000);
    // csrrs x1, mstatus, x0
    load_words(&hart, 0x1000, &[0x3000_20F3]);
    hart.with_core(|core| core.set_privilege(PrivilegeLevel::User));
    assert_eq!(
        Err(ExecError::CsrReadPrivilege {
            pc: 0x1000,
            specifier: csr::MSTATUS,
        }),
        hart.step(1)
    );
    // The failed step leaves the PC in place; retry from Machine mode.
    hart.with_core(|core| core.set_privilege(PrivilegeLevel::Machine));
    hart.step(1).unwrap();
    let (regs, _, pc) = hart.snapshot();
    assert_eq!(0, regs[1]);
    assert_eq!(0x1004, pc);
    // A set with an x0 source performs no write.
    assert_eq!(
        0,
        hart.with_core(|core| core
            .read_csr(csr::MSTATUS, PrivilegeLevel::Machine, true)
            .unwrap())
    );
}

#[test]
fn branch_displacement_zero_loops() {
    let hart = hart_at(0x1000);
    // beq x0, x0, 0
    load_words(&hart, 0x1000, &[0x0000_0063]);
    hart.step(1).unwrap();
    assert_eq!(0x1000, hart.pc());
    hart.step(1).unwrap();
    assert_eq!(0x1000, hart.pc());
    assert_eq!(2, hart.with_core(|core| core.cycles()));
}

#[test]
fn shift_boundaries() {
    let hart = hart_at(0x1000);
    // slli x1, x2, 0; srli x1, x2, 31
    load_words(&hart, 0x1000, &[0x0001_1093, 0x01F1_5093]);
    hart.with_core(|core| core.registers_mut().set_x(x(2), 0x8000_0001));
    hart.step(1).unwrap();
    let (regs, _, _) = hart.snapshot();
    assert_eq!(0x8000_0001, regs[1], "shift by zero is the identity");
    hart.step(1).unwrap();
    let (regs, _, _) = hart.snapshot();
    assert_eq!(1, regs[1], "shift by 31 isolates the MSB");
}

#[test]
fn division_contract() {
    let hart = hart_at(0x1000);
    // div x1, x2, x3; rem x4, x2, x3
    load_words(&hart, 0x1000, &[0x0231_40B3, 0x0231_6233]);

    // Division by zero: quotient all ones, remainder the dividend.
    hart.with_core(|core| {
        core.registers_mut().set_x(x(2), 42);
        core.registers_mut().set_x(x(3), 0);
    });
    hart.step(2).unwrap();
    let (regs, _, _) = hart.snapshot();
    assert_eq!(u32::MAX, regs[1]);
    assert_eq!(42, regs[4]);

    // Signed overflow: INT_MIN / -1 = INT_MIN, remainder zero.
    let hart = hart_at(0x1000);
    load_words(&hart, 0x1000, &[0x0231_40B3, 0x0231_6233]);
    hart.with_core(|core| {
        core.registers_mut().set_x(x(2), i32::MIN as u32);
        core.registers_mut().set_x(x(3), -1_i32 as u32);
    });
    hart.step(2).unwrap();
    let (regs, _, _) = hart.snapshot();
    assert_eq!(i32::MIN as u32, regs[1]);
    assert_eq!(0, regs[4]);
}

#[test]
fn fsw_flw_roundtrip() {
    let hart = hart_at(0x1000);
    // fsw f1, 0(x2); flw f3, 0(x2)
    load_words(&hart, 0x1000, &[0x0011_2027, 0x0001_2187]);
    hart.with_core(|core| {
        core.registers_mut().set_x(x(2), 0x5000);
        core.registers_mut()
            .set_f(x(1), FpRegister::from_single_bits(0xC070_0000));
    });
    hart.step(2).unwrap();
    let (_, fregs, _) = hart.snapshot();
    assert_eq!(0xC070_0000, fregs[3].single_bits());
    assert_eq!(
        0xC070_0000,
        hart.with_core(|core| core.memory().read_word(0x5000).unwrap())
    );
}

#[test]
fn fmv_nan_boxing() {
    let hart = hart_at(0x1000);
    // fmv.w.x f1, x2; fmv.x.w x1, f2
    load_words(&hart, 0x1000, &[0xF001_00D3, 0xE001_00D3]);
    hart.with_core(|core| {
        core.registers_mut().set_x(x(2), 0xDEAD_BEEF);
        core.registers_mut()
            .set_f(x(2), FpRegister::from_boxed_single(0xFFFF_FFFF_7FC0_0123));
    });
    hart.step(2).unwrap();
    let (regs, fregs, _) = hart.snapshot();
    // fmv.w.x: low half holds the integer source, upper half is zero.
    assert_eq!(0xDEAD_BEEF, fregs[1].raw());
    // fmv.x.w: returns exactly the held low bits, NaN payload included.
    assert_eq!(0x7FC0_0123, regs[1]);
}

#[test]
fn fcvt_saturates_on_infinity() {
    let hart = hart_at(0x1000);
    // fcvt.w.s x1, f1, rtz
    load_words(&hart, 0x1000, &[0xC000_90D3]);
    hart.with_core(|core| {
        core.registers_mut()
            .set_f(x(1), FpRegister::from_single_bits(0x7F80_0000));
    });
    hart.step(1).unwrap();
    let (regs, _, _) = hart.snapshot();
    assert_eq!(0x7FFF_FFFF, regs[1]);
}

#[test]
fn tva_translates_through_page_tables() {
    let hart = hart_at(0x1000);
    // tva x1, x2
    load_words(&hart, 0x1000, &[0x0001_008B]);
    hart.with_core(|core| {
        let memory = core.memory();
        // Root table at 0x10000 (satp = 0x10): entry for vpn1=1 points at
        // the table in page 0x20; that table maps vpn0=2 to page 0x333
        // with A and D set.
        memory.write_word(0x10000 + 4, 0x20 << 10 | 1).unwrap();
        memory
            .write_word(0x20000 + 2 * 4, 0x333 << 10 | 0b1100_0111)
            .unwrap();
        core.write_csr(csr::SATP, PrivilegeLevel::Machine, 0x10)
            .unwrap();
        core.registers_mut().set_x(x(2), 1 << 22 | 2 << 12 | 0xABC);
    });
    hart.step(1).unwrap();
    let (regs, _, _) = hart.snapshot();
    assert_eq!(0x333 << 12 | 0xABC, regs[1]);
}

#[test]
fn amoadd_returns_old_value() {
    let hart = hart_at(0x1000);
    // amoadd.w x2, x3, (x10)
    load_words(&hart, 0x1000, &[0x0035_212F]);
    hart.with_core(|core| {
        core.memory().write_word(0x4000, 10).unwrap();
        core.registers_mut().set_x(x(10), 0x4000);
        core.registers_mut().set_x(x(3), 5);
    });
    hart.step(1).unwrap();
    let (regs, _, _) = hart.snapshot();
    assert_eq!(10, regs[2]);
    assert_eq!(
        15,
        hart.with_core(|core| core.memory().read_word(0x4000).unwrap())
    );
}

#[test]
fn mulh_takes_the_high_word() {
    let hart = hart_at(0x1000);
    // mulh x1, x2, x3
    load_words(&hart, 0x1000, &[0x0231_10B3]);
    hart.with_core(|core| {
        core.registers_mut().set_x(x(2), i32::MIN as u32);
        core.registers_mut().set_x(x(3), 2);
    });
    hart.step(1).unwrap();
    let (regs, _, _) = hart.snapshot();
    assert_eq!(0xFFFF_FFFF, regs[1]);
}

#[test]
fn write_to_read_only_csr_is_silent() {
    let hart = hart_at(0x1000);
    // csrrw x0, misa, x1
    load_words(&hart, 0x1000, &[0x3010_9073]);
    hart.with_core(|core| core.registers_mut().set_x(x(1), 0xFFFF_FFFF));
    hart.step(1).unwrap();
    let misa = hart.with_core(|core| {
        core.read_csr(csr::MISA, PrivilegeLevel::Machine, true).unwrap()
    });
    assert_eq!(0x4000_1129, misa);
    assert_eq!(0x1004, hart.pc());
}

#[test]
fn unimplemented_privileged_returns() {
    let hart = hart_at(0x1000);
    // mret
    load_words(&hart, 0x1000, &[0x3020_0073]);
    assert_eq!(
        Err(ExecError::UnimplementedInstruction {
            pc: 0x1000,
            name: "mret",
        }),
        hart.step(1)
    );
}

#[test]
fn illegal_instruction_reports_word() {
    let hart = hart_at(0x1000);
    load_words(&hart, 0x1000, &[0xFFFF_FFFF]);
    assert_eq!(
        Err(ExecError::IllegalInstruction {
            pc: 0x1000,
            raw: 0xFFFF_FFFF,
        }),
        hart.step(1)
    );
}

#[test]
fn misaligned_pc_is_fatal() {
    let hart = hart_at(0x1002);
    assert_eq!(Err(ExecError::MisalignedPc { pc: 0x1002 }), hart.step(1));
}
