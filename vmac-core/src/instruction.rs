//! Decoder for the RV32IMAFD instruction set.
//!
//! [`Instruction::decode`] is total: every 32-bit word either decodes into a
//! typed [`Instruction`] record or yields a [`DecodeError`]. The reverse
//! direction, canonical assembly text, is provided through [`fmt::Display`]
//! and is what error messages and the (external) assembly view print.

use crate::registers::Specifier;
use std::fmt;
use thiserror::Error;

/// Data structure that can hold any supported instruction in its decoded
/// form.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Instruction {
    OpImm {
        op: RegImmOp,
        dest: Specifier,
        src: Specifier,
        immediate: i32,
    },
    OpShiftImm {
        op: RegShiftImmOp,
        dest: Specifier,
        src: Specifier,
        shift_amount_u5: u32,
    },
    Auipc {
        dest: Specifier,
        immediate: i32,
    },
    Lui {
        dest: Specifier,
        immediate: i32,
    },
    /// Register-register ALU operations, including the M extension.
    Op {
        op: RegRegOp,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    },
    Jal {
        dest: Specifier,
        offset: i32,
    },
    Jalr {
        dest: Specifier,
        base: Specifier,
        offset: i32,
    },
    Branch {
        condition: BranchCondition,
        src1: Specifier,
        src2: Specifier,
        offset: i32,
    },
    Load {
        width: LoadWidth,
        dest: Specifier,
        base: Specifier,
        offset: i32,
    },
    Store {
        width: StoreWidth,
        src: Specifier,
        base: Specifier,
        offset: i32,
    },
    Fence,
    Ecall,
    Ebreak,
    Csr {
        op: CsrOp,
        dest: Specifier,
        csr: u16,
        src: Specifier,
    },
    Csri {
        op: CsrOp,
        dest: Specifier,
        csr: u16,
        immediate: u32,
    },
    /// `LR.W dest, (addr)`
    LoadReserved {
        dest: Specifier,
        addr: Specifier,
    },
    /// `SC.W dest, src, (addr)`
    StoreConditional {
        dest: Specifier,
        src: Specifier,
        addr: Specifier,
    },
    /// `AMO<op>.W dest, src, (addr)`
    Amo {
        op: AmoOp,
        dest: Specifier,
        src: Specifier,
        addr: Specifier,
    },
    /// `FLW`/`FLD`
    FpLoad {
        precision: Precision,
        dest: Specifier,
        base: Specifier,
        offset: i32,
    },
    /// `FSW`/`FSD`
    FpStore {
        precision: Precision,
        src: Specifier,
        base: Specifier,
        offset: i32,
    },
    /// The fused multiply-add family.
    FpFused {
        op: FusedOp,
        precision: Precision,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
        src3: Specifier,
        rm: RoundingMode,
    },
    FpArith {
        op: FpArithOp,
        precision: Precision,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
        rm: RoundingMode,
    },
    FpSqrt {
        precision: Precision,
        dest: Specifier,
        src: Specifier,
        rm: RoundingMode,
    },
    FpSignInject {
        op: SignInjectOp,
        precision: Precision,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    },
    FpMinMax {
        op: MinMaxOp,
        precision: Precision,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    },
    FpCompare {
        op: FpCompareOp,
        precision: Precision,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    },
    FpClassify {
        precision: Precision,
        dest: Specifier,
        src: Specifier,
    },
    /// `FCVT.W.fmt` / `FCVT.WU.fmt`
    FpToInt {
        precision: Precision,
        signed: bool,
        dest: Specifier,
        src: Specifier,
        rm: RoundingMode,
    },
    /// `FCVT.fmt.W` / `FCVT.fmt.WU`
    IntToFp {
        precision: Precision,
        signed: bool,
        dest: Specifier,
        src: Specifier,
        rm: RoundingMode,
    },
    /// `FCVT.S.D` / `FCVT.D.S`; `to` names the destination format.
    FpConvertFormat {
        to: Precision,
        dest: Specifier,
        src: Specifier,
        rm: RoundingMode,
    },
    /// `FMV.X.W`
    FpMoveToInt {
        dest: Specifier,
        src: Specifier,
    },
    /// `FMV.W.X`
    FpMoveFromInt {
        dest: Specifier,
        src: Specifier,
    },
    // Privileged returns and fence variants. Recognised so the interpreter
    // can report them distinctly, but not implemented by this core.
    Uret,
    Sret,
    Mret,
    Wfi,
    SfenceVma {
        vaddr: Specifier,
        asid: Specifier,
    },
    SinvalVma {
        vaddr: Specifier,
        asid: Specifier,
    },
    SinvalGvma {
        vaddr: Specifier,
        asid: Specifier,
    },
    SfenceWInval,
    SfenceInvalIr,
    /// Vendor instruction: translate the virtual address in `src` and write
    /// the physical address to `dest`.
    Tva {
        dest: Specifier,
        src: Specifier,
    },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RegImmOp {
    Addi,
    Slti,
    Sltiu,
    Xori,
    Ori,
    Andi,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RegShiftImmOp {
    Slli,
    Srli,
    Srai,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RegRegOp {
    Add,
    Slt,
    Sltu,
    And,
    Or,
    Xor,
    Sll,
    Srl,
    Sub,
    Sra,
    // M extension
    Mul,
    Mulh,
    Mulhsu,
    Mulhu,
    Div,
    Divu,
    Rem,
    Remu,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BranchCondition {
    Beq,
    Bne,
    Blt,
    Bltu,
    Bge,
    Bgeu,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LoadWidth {
    Lb,
    Lh,
    Lw,
    Lbu,
    Lhu,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StoreWidth {
    Sb,
    Sh,
    Sw,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CsrOp {
    ReadWrite,
    ReadSet,
    ReadClear,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AmoOp {
    Swap,
    Add,
    Xor,
    And,
    Or,
    Min,
    Max,
    MinU,
    MaxU,
}

/// The two floating-point formats of the F and D extensions.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Precision {
    Single,
    Double,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FusedOp {
    /// `(src1 × src2) + src3`
    MulAdd,
    /// `(src1 × src2) - src3`
    MulSub,
    /// `-(src1 × src2) + src3`
    NegMulSub,
    /// `-(src1 × src2) - src3`
    NegMulAdd,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FpArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SignInjectOp {
    Copy,
    Negate,
    Xor,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MinMaxOp {
    Min,
    Max,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FpCompareOp {
    Eq,
    Lt,
    Le,
}

/// The 3-bit rounding-mode field of floating-point instructions.
///
/// All eight encodings decode; whether a mode is actually usable is decided
/// at execution time, since `Dynamic` has to be resolved through `fcsr.frm`
/// first.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RoundingMode {
    /// Round to nearest, ties to even.
    Rne,
    /// Round towards zero.
    Rtz,
    /// Round down (towards negative infinity).
    Rdn,
    /// Round up (towards positive infinity).
    Rup,
    /// Round to nearest, ties to max magnitude. Encodable but not supported
    /// by this core.
    Rmm,
    /// Reserved encoding `101`.
    Reserved5,
    /// Reserved encoding `110`.
    Reserved6,
    /// Use the mode in `fcsr.frm`.
    Dynamic,
}

impl RoundingMode {
    fn from_u3(value_u3: u8) -> Self {
        match value_u3 & 0b111 {
            0b000 => Self::Rne,
            0b001 => Self::Rtz,
            0b010 => Self::Rdn,
            0b011 => Self::Rup,
            0b100 => Self::Rmm,
            0b101 => Self::Reserved5,
            0b110 => Self::Reserved6,
            _ => Self::Dynamic,
        }
    }
}

impl Instruction {
    pub fn decode(raw: u32) -> Result<Self, DecodeError> {
        match opcode(raw).ok_or(DecodeError::UnsupportedOpcode)? {
            Opcode::OpImm => match i_funct(raw) {
                Some(op) => Ok(Self::OpImm {
                    op,
                    dest: rd(raw),
                    src: rs1(raw),
                    immediate: i_imm(raw),
                }),
                None => match i_shfunct(raw) {
                    Some(op) => Ok(Self::OpShiftImm {
                        op,
                        dest: rd(raw),
                        src: rs1(raw),
                        shift_amount_u5: shamt(raw),
                    }),
                    None => Err(DecodeError::IllegalInstruction),
                },
            },
            Opcode::Auipc => Ok(Self::Auipc {
                dest: rd(raw),
                immediate: u_imm(raw),
            }),
            Opcode::Lui => Ok(Self::Lui {
                dest: rd(raw),
                immediate: u_imm(raw),
            }),
            Opcode::Op => match r_funct(raw) {
                Some(op) => Ok(Self::Op {
                    op,
                    dest: rd(raw),
                    src1: rs1(raw),
                    src2: rs2(raw),
                }),
                None => Err(DecodeError::IllegalInstruction),
            },
            Opcode::Jal => Ok(Self::Jal {
                dest: rd(raw),
                offset: j_imm(raw),
            }),
            Opcode::Jalr => Ok(Self::Jalr {
                dest: rd(raw),
                base: rs1(raw),
                offset: i_imm(raw),
            }),
            Opcode::Branch => match b_funct(raw) {
                Some(condition) => Ok(Self::Branch {
                    condition,
                    src1: rs1(raw),
                    src2: rs2(raw),
                    offset: b_imm(raw),
                }),
                None => Err(DecodeError::IllegalInstruction),
            },
            Opcode::Load => match i_width(raw) {
                Some(width) => Ok(Self::Load {
                    width,
                    dest: rd(raw),
                    base: rs1(raw),
                    offset: i_imm(raw),
                }),
                None => Err(DecodeError::IllegalInstruction),
            },
            Opcode::Store => match s_width(raw) {
                Some(width) => Ok(Self::Store {
                    width,
                    src: rs2(raw),
                    base: rs1(raw),
                    offset: s_imm(raw),
                }),
                None => Err(DecodeError::IllegalInstruction),
            },
            Opcode::MiscMem => match funct3(raw) {
                // All unused fields (fm, rd, rs1) are reserved for future
                // use; the ISA manual requires treating such encodings as a
                // normal fence for forward compatibility.
                0b000 => Ok(Self::Fence),
                _ => Err(DecodeError::IllegalInstruction),
            },
            Opcode::System => decode_system(raw),
            Opcode::Amo => decode_amo(raw),
            Opcode::LoadFp => match fp_width(raw) {
                Some(precision) => Ok(Self::FpLoad {
                    precision,
                    dest: rd(raw),
                    base: rs1(raw),
                    offset: i_imm(raw),
                }),
                None => Err(DecodeError::IllegalInstruction),
            },
            Opcode::StoreFp => match fp_width(raw) {
                Some(precision) => Ok(Self::FpStore {
                    precision,
                    src: rs2(raw),
                    base: rs1(raw),
                    offset: s_imm(raw),
                }),
                None => Err(DecodeError::IllegalInstruction),
            },
            Opcode::Madd => decode_fused(raw, FusedOp::MulAdd),
            Opcode::Msub => decode_fused(raw, FusedOp::MulSub),
            Opcode::Nmsub => decode_fused(raw, FusedOp::NegMulSub),
            Opcode::Nmadd => decode_fused(raw, FusedOp::NegMulAdd),
            Opcode::OpFp => decode_op_fp(raw),
            Opcode::Custom0 => match (funct3(raw), funct7(raw)) {
                (0b000, 0b0000000) => Ok(Self::Tva {
                    dest: rd(raw),
                    src: rs1(raw),
                }),
                _ => Err(DecodeError::IllegalInstruction),
            },
        }
    }
}

fn decode_system(raw: u32) -> Result<Instruction, DecodeError> {
    match funct3(raw) {
        0b000 => {
            if rd(raw) != Specifier::X0 {
                return Err(DecodeError::IllegalInstruction);
            }
            match (funct7(raw), u8::from(rs2(raw)), u8::from(rs1(raw))) {
                (0b0000000, 0b00000, 0) => Ok(Instruction::Ecall),
                (0b0000000, 0b00001, 0) => Ok(Instruction::Ebreak),
                (0b0000000, 0b00010, 0) => Ok(Instruction::Uret),
                (0b0001000, 0b00010, 0) => Ok(Instruction::Sret),
                (0b0011000, 0b00010, 0) => Ok(Instruction::Mret),
                (0b0001000, 0b00101, 0) => Ok(Instruction::Wfi),
                (0b0001001, _, _) => Ok(Instruction::SfenceVma {
                    vaddr: rs1(raw),
                    asid: rs2(raw),
                }),
                (0b0001011, _, _) => Ok(Instruction::SinvalVma {
                    vaddr: rs1(raw),
                    asid: rs2(raw),
                }),
                (0b0110011, _, _) => Ok(Instruction::SinvalGvma {
                    vaddr: rs1(raw),
                    asid: rs2(raw),
                }),
                (0b0001100, 0b00000, 0) => Ok(Instruction::SfenceWInval),
                (0b0001100, 0b00001, 0) => Ok(Instruction::SfenceInvalIr),
                _ => Err(DecodeError::IllegalInstruction),
            }
        }
        funct3 => {
            let op = match funct3 & 0b011 {
                0b01 => CsrOp::ReadWrite,
                0b10 => CsrOp::ReadSet,
                0b11 => CsrOp::ReadClear,
                _ => return Err(DecodeError::IllegalInstruction),
            };
            let csr = csr_specifier(raw);
            Ok(if funct3 & 0b100 == 0 {
                Instruction::Csr {
                    op,
                    dest: rd(raw),
                    csr,
                    src: rs1(raw),
                }
            } else {
                Instruction::Csri {
                    op,
                    dest: rd(raw),
                    csr,
                    immediate: u32::from(rs1(raw)),
                }
            })
        }
    }
}

fn decode_amo(raw: u32) -> Result<Instruction, DecodeError> {
    // Only word-sized atomics exist on RV32.
    if funct3(raw) != 0b010 {
        return Err(DecodeError::IllegalInstruction);
    }
    // The aq/rl ordering bits (funct7[1:0]) do not change the operation of
    // this sequentially-consistent fabric, so they are accepted and ignored.
    let funct5 = funct7(raw) >> 2;
    let (dest, addr, src) = (rd(raw), rs1(raw), rs2(raw));
    let op = match funct5 {
        0b00010 => {
            // LR.W reserves rs2 = 0; anything else is an illegal encoding.
            return if src == Specifier::X0 {
                Ok(Instruction::LoadReserved { dest, addr })
            } else {
                Err(DecodeError::IllegalInstruction)
            };
        }
        0b00011 => return Ok(Instruction::StoreConditional { dest, src, addr }),
        0b00001 => AmoOp::Swap,
        0b00000 => AmoOp::Add,
        0b00100 => AmoOp::Xor,
        0b01100 => AmoOp::And,
        0b01000 => AmoOp::Or,
        0b10000 => AmoOp::Min,
        0b10100 => AmoOp::Max,
        0b11000 => AmoOp::MinU,
        0b11100 => AmoOp::MaxU,
        _ => return Err(DecodeError::IllegalInstruction),
    };
    Ok(Instruction::Amo {
        op,
        dest,
        src,
        addr,
    })
}

fn decode_fused(raw: u32, op: FusedOp) -> Result<Instruction, DecodeError> {
    Ok(Instruction::FpFused {
        op,
        precision: fp_fmt(raw)?,
        dest: rd(raw),
        src1: rs1(raw),
        src2: rs2(raw),
        src3: rs3(raw),
        rm: rm(raw),
    })
}

fn decode_op_fp(raw: u32) -> Result<Instruction, DecodeError> {
    let funct5 = funct7(raw) >> 2;
    let precision = fp_fmt(raw)?;
    let (dest, src1, src2) = (rd(raw), rs1(raw), rs2(raw));
    match funct5 {
        0b00000..=0b00011 => {
            let op = match funct5 {
                0b00000 => FpArithOp::Add,
                0b00001 => FpArithOp::Sub,
                0b00010 => FpArithOp::Mul,
                _ => FpArithOp::Div,
            };
            Ok(Instruction::FpArith {
                op,
                precision,
                dest,
                src1,
                src2,
                rm: rm(raw),
            })
        }
        0b01011 if src2 == Specifier::X0 => Ok(Instruction::FpSqrt {
            precision,
            dest,
            src: src1,
            rm: rm(raw),
        }),
        0b00100 => {
            let op = match funct3(raw) {
                0b000 => SignInjectOp::Copy,
                0b001 => SignInjectOp::Negate,
                0b010 => SignInjectOp::Xor,
                _ => return Err(DecodeError::IllegalInstruction),
            };
            Ok(Instruction::FpSignInject {
                op,
                precision,
                dest,
                src1,
                src2,
            })
        }
        0b00101 => {
            let op = match funct3(raw) {
                0b000 => MinMaxOp::Min,
                0b001 => MinMaxOp::Max,
                _ => return Err(DecodeError::IllegalInstruction),
            };
            Ok(Instruction::FpMinMax {
                op,
                precision,
                dest,
                src1,
                src2,
            })
        }
        0b01000 => {
            // FCVT.S.D / FCVT.D.S; rs2 encodes the source format, which
            // must differ from the destination format.
            let from = match u8::from(src2) {
                0b00000 => Precision::Single,
                0b00001 => Precision::Double,
                _ => return Err(DecodeError::IllegalInstruction),
            };
            if from == precision {
                return Err(DecodeError::IllegalInstruction);
            }
            Ok(Instruction::FpConvertFormat {
                to: precision,
                dest,
                src: src1,
                rm: rm(raw),
            })
        }
        0b10100 => {
            let op = match funct3(raw) {
                0b010 => FpCompareOp::Eq,
                0b001 => FpCompareOp::Lt,
                0b000 => FpCompareOp::Le,
                _ => return Err(DecodeError::IllegalInstruction),
            };
            Ok(Instruction::FpCompare {
                op,
                precision,
                dest,
                src1,
                src2,
            })
        }
        0b11000 => {
            let signed = match u8::from(src2) {
                0b00000 => true,
                0b00001 => false,
                _ => return Err(DecodeError::IllegalInstruction),
            };
            Ok(Instruction::FpToInt {
                precision,
                signed,
                dest,
                src: src1,
                rm: rm(raw),
            })
        }
        0b11010 => {
            let signed = match u8::from(src2) {
                0b00000 => true,
                0b00001 => false,
                _ => return Err(DecodeError::IllegalInstruction),
            };
            Ok(Instruction::IntToFp {
                precision,
                signed,
                dest,
                src: src1,
                rm: rm(raw),
            })
        }
        0b11100 if src2 == Specifier::X0 => match (funct3(raw), precision) {
            // FMV.X.D does not exist on RV32; only the single-precision
            // move is encodable.
            (0b000, Precision::Single) => Ok(Instruction::FpMoveToInt { dest, src: src1 }),
            (0b001, _) => Ok(Instruction::FpClassify {
                precision,
                dest,
                src: src1,
            }),
            _ => Err(DecodeError::IllegalInstruction),
        },
        0b11110 if src2 == Specifier::X0 && funct3(raw) == 0b000 => match precision {
            Precision::Single => Ok(Instruction::FpMoveFromInt { dest, src: src1 }),
            Precision::Double => Err(DecodeError::IllegalInstruction),
        },
        _ => Err(DecodeError::IllegalInstruction),
    }
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum DecodeError {
    /// The word's major opcode is not one this core knows about. This
    /// covers reserved opcodes, compressed parcels, and the custom slots
    /// (other than the one carrying TVA).
    #[error("instruction has unsupported opcode")]
    UnsupportedOpcode,
    /// The major opcode is known but the funct/immediate fields select a
    /// reserved or malformed encoding.
    #[error("illegal instruction encoding")]
    IllegalInstruction,
}

/// Returns the 7-bit *opcode* value of the instruction, or `None` if it
/// isn't supported.
fn opcode(raw: u32) -> Option<Opcode> {
    #[allow(clippy::unusual_byte_groupings)]
    match raw & 0x7F {
        0b00_000_11 => Some(Opcode::Load),
        0b00_001_11 => Some(Opcode::LoadFp),
        0b00_010_11 => Some(Opcode::Custom0),
        0b00_011_11 => Some(Opcode::MiscMem),
        0b00_100_11 => Some(Opcode::OpImm),
        0b00_101_11 => Some(Opcode::Auipc),
        // OP-IMM-32
        // 48b
        0b01_000_11 => Some(Opcode::Store),
        0b01_001_11 => Some(Opcode::StoreFp),
        // custom-1
        0b01_011_11 => Some(Opcode::Amo),
        0b01_100_11 => Some(Opcode::Op),
        0b01_101_11 => Some(Opcode::Lui),
        // OP-32
        // 64b
        0b10_000_11 => Some(Opcode::Madd),
        0b10_001_11 => Some(Opcode::Msub),
        0b10_010_11 => Some(Opcode::Nmsub),
        0b10_011_11 => Some(Opcode::Nmadd),
        0b10_100_11 => Some(Opcode::OpFp),
        // reserved
        // custom-2/rv128
        // 48b
        0b11_000_11 => Some(Opcode::Branch),
        0b11_001_11 => Some(Opcode::Jalr),
        // reserved
        0b11_011_11 => Some(Opcode::Jal),
        0b11_100_11 => Some(Opcode::System),
        // reserved
        // custom-3/rv128
        // >= 80b
        _ => None,
    }
}

/// Returns the 5-bit *rd* value for R-type, I-type, U-type, J-type
/// instructions.
fn rd(raw: u32) -> Specifier {
    Specifier::from_u5(((raw >> 7) & 0x1F) as u8)
}

/// Returns the 5-bit *rs1* value for R-type, I-type, S-type, B-type
/// instructions.
fn rs1(raw: u32) -> Specifier {
    Specifier::from_u5(((raw >> 15) & 0x1F) as u8)
}

/// Returns the 5-bit *rs2* value for R-type, S-type, B-type instructions.
fn rs2(raw: u32) -> Specifier {
    Specifier::from_u5(((raw >> 20) & 0x1F) as u8)
}

/// Returns the 5-bit *rs3* value for R4-type (fused multiply-add)
/// instructions.
fn rs3(raw: u32) -> Specifier {
    Specifier::from_u5((raw >> 27) as u8)
}

fn i_funct(raw: u32) -> Option<RegImmOp> {
    match funct3(raw) {
        0b000 => Some(RegImmOp::Addi),
        0b010 => Some(RegImmOp::Slti),
        0b011 => Some(RegImmOp::Sltiu),
        0b100 => Some(RegImmOp::Xori),
        0b110 => Some(RegImmOp::Ori),
        0b111 => Some(RegImmOp::Andi),
        _ => None,
    }
}

fn i_shfunct(raw: u32) -> Option<RegShiftImmOp> {
    let bit30 = (raw >> 30) & 1;
    match (bit30, funct3(raw)) {
        (0, 0b001) => Some(RegShiftImmOp::Slli),
        (0, 0b101) => Some(RegShiftImmOp::Srli),
        (1, 0b101) => Some(RegShiftImmOp::Srai),
        _ => None,
    }
}

fn i_width(raw: u32) -> Option<LoadWidth> {
    match funct3(raw) {
        0b000 => Some(LoadWidth::Lb),
        0b001 => Some(LoadWidth::Lh),
        0b010 => Some(LoadWidth::Lw),
        0b100 => Some(LoadWidth::Lbu),
        0b101 => Some(LoadWidth::Lhu),
        _ => None,
    }
}

fn s_width(raw: u32) -> Option<StoreWidth> {
    match funct3(raw) {
        0b000 => Some(StoreWidth::Sb),
        0b001 => Some(StoreWidth::Sh),
        0b010 => Some(StoreWidth::Sw),
        _ => None,
    }
}

fn fp_width(raw: u32) -> Option<Precision> {
    match funct3(raw) {
        0b010 => Some(Precision::Single),
        0b011 => Some(Precision::Double),
        _ => None,
    }
}

/// Returns the floating-point format from the two-bit *fmt* field (bits
/// 26-25). Only the S and D formats are supported.
fn fp_fmt(raw: u32) -> Result<Precision, DecodeError> {
    match (raw >> 25) & 0b11 {
        0b00 => Ok(Precision::Single),
        0b01 => Ok(Precision::Double),
        _ => Err(DecodeError::IllegalInstruction),
    }
}

fn r_funct(raw: u32) -> Option<RegRegOp> {
    match (funct7(raw), funct3(raw)) {
        (0b0000000, 0b000) => Some(RegRegOp::Add),
        (0b0000000, 0b001) => Some(RegRegOp::Sll),
        (0b0000000, 0b010) => Some(RegRegOp::Slt),
        (0b0000000, 0b011) => Some(RegRegOp::Sltu),
        (0b0000000, 0b100) => Some(RegRegOp::Xor),
        (0b0000000, 0b101) => Some(RegRegOp::Srl),
        (0b0000000, 0b110) => Some(RegRegOp::Or),
        (0b0000000, 0b111) => Some(RegRegOp::And),
        (0b0100000, 0b000) => Some(RegRegOp::Sub),
        (0b0100000, 0b101) => Some(RegRegOp::Sra),
        (0b0000001, 0b000) => Some(RegRegOp::Mul),
        (0b0000001, 0b001) => Some(RegRegOp::Mulh),
        (0b0000001, 0b010) => Some(RegRegOp::Mulhsu),
        (0b0000001, 0b011) => Some(RegRegOp::Mulhu),
        (0b0000001, 0b100) => Some(RegRegOp::Div),
        (0b0000001, 0b101) => Some(RegRegOp::Divu),
        (0b0000001, 0b110) => Some(RegRegOp::Rem),
        (0b0000001, 0b111) => Some(RegRegOp::Remu),
        _ => None,
    }
}

fn b_funct(raw: u32) -> Option<BranchCondition> {
    match funct3(raw) {
        0b000 => Some(BranchCondition::Beq),
        0b001 => Some(BranchCondition::Bne),
        0b100 => Some(BranchCondition::Blt),
        0b101 => Some(BranchCondition::Bge),
        0b110 => Some(BranchCondition::Bltu),
        0b111 => Some(BranchCondition::Bgeu),
        _ => None,
    }
}

/// Returns the 3-bit *funct3* value for R-type, I-type, S-type, B-type
/// instructions.
fn funct3(raw: u32) -> u8 {
    ((raw >> 12) & 0b111) as u8
}

/// Returns the 7-bit *funct7* value for R-type instructions.
fn funct7(raw: u32) -> u8 {
    (raw >> 25) as u8
}

/// Returns the 3-bit rounding-mode field (same bits as *funct3*).
fn rm(raw: u32) -> RoundingMode {
    RoundingMode::from_u3(funct3(raw))
}

/// Returns the 5-bit *shamt* value for I-type shift instructions.
fn shamt(raw: u32) -> u32 {
    (raw >> 20) & 0x1F
}

/// Returns the 12-bit CSR specifier held in the I-immediate field,
/// zero-extended.
fn csr_specifier(raw: u32) -> u16 {
    ((raw >> 20) & 0xFFF) as u16
}

/// Returns the 12-bit I-immediate sign-extended to 32 bits.
fn i_imm(raw: u32) -> i32 {
    raw as i32 >> 20
}

/// Returns the 12-bit S-immediate sign-extended to 32 bits.
fn s_imm(raw: u32) -> i32 {
    let imm_11_5 = raw & 0x7F00_0000;
    let imm_4_0 = raw & 0x0000_0F80;
    (imm_11_5 | (imm_4_0 << 13)) as i32 >> 20
}

/// Returns the 13-bit B-immediate sign-extended to 32 bits.
fn b_imm(raw: u32) -> i32 {
    let imm_12 = raw & 0x8000_0000;
    let imm_10_5 = raw & 0x7E00_0000;
    let imm_4_1 = raw & 0x0000_0F00;
    let imm_11 = raw & 0x0000_0080;
    (imm_12 | (imm_11 << 23) | (imm_10_5 >> 1) | (imm_4_1 << 12)) as i32 >> 19
}

/// Returns the signed 32-bit U-immediate.
fn u_imm(raw: u32) -> i32 {
    (raw & 0xFFFF_F000) as i32
}

/// Returns the 21-bit J-immediate sign-extended to 32 bits.
fn j_imm(raw: u32) -> i32 {
    let imm_20 = raw & 0x8000_0000;
    let imm_10_1 = raw & 0x7FE0_0000;
    let imm_11 = raw & 0x0010_0000;
    let imm_19_12 = raw & 0x000F_F000;
    (imm_20 | (imm_19_12 << 11) | (imm_11 << 2) | (imm_10_1 >> 9)) as i32 >> 11
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Opcode {
    Load,
    LoadFp,
    Custom0,
    MiscMem,
    OpImm,
    Auipc,
    Store,
    StoreFp,
    Amo,
    Op,
    Lui,
    Madd,
    Msub,
    Nmsub,
    Nmadd,
    OpFp,
    Branch,
    Jalr,
    Jal,
    System,
}

impl Precision {
    fn suffix(self) -> &'static str {
        match self {
            Precision::Single => "s",
            Precision::Double => "d",
        }
    }
}

// Formats an `f` register operand; `Specifier`'s own `Display` prints the
// integer spelling.
struct F(Specifier);

impl fmt::Display for F {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", u8::from(self.0))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;
        match *self {
            OpImm {
                op,
                dest,
                src,
                immediate,
            } => {
                let name = match op {
                    RegImmOp::Addi => "addi",
                    RegImmOp::Slti => "slti",
                    RegImmOp::Sltiu => "sltiu",
                    RegImmOp::Xori => "xori",
                    RegImmOp::Ori => "ori",
                    RegImmOp::Andi => "andi",
                };
                write!(f, "{name} {dest}, {src}, {immediate}")
            }
            OpShiftImm {
                op,
                dest,
                src,
                shift_amount_u5,
            } => {
                let name = match op {
                    RegShiftImmOp::Slli => "slli",
                    RegShiftImmOp::Srli => "srli",
                    RegShiftImmOp::Srai => "srai",
                };
                write!(f, "{name} {dest}, {src}, {shift_amount_u5}")
            }
            Auipc { dest, immediate } => write!(f, "auipc {dest}, {:#x}", immediate as u32 >> 12),
            Lui { dest, immediate } => write!(f, "lui {dest}, {:#x}", immediate as u32 >> 12),
            Op {
                op,
                dest,
                src1,
                src2,
            } => {
                let name = match op {
                    RegRegOp::Add => "add",
                    RegRegOp::Slt => "slt",
                    RegRegOp::Sltu => "sltu",
                    RegRegOp::And => "and",
                    RegRegOp::Or => "or",
                    RegRegOp::Xor => "xor",
                    RegRegOp::Sll => "sll",
                    RegRegOp::Srl => "srl",
                    RegRegOp::Sub => "sub",
                    RegRegOp::Sra => "sra",
                    RegRegOp::Mul => "mul",
                    RegRegOp::Mulh => "mulh",
                    RegRegOp::Mulhsu => "mulhsu",
                    RegRegOp::Mulhu => "mulhu",
                    RegRegOp::Div => "div",
                    RegRegOp::Divu => "divu",
                    RegRegOp::Rem => "rem",
                    RegRegOp::Remu => "remu",
                };
                write!(f, "{name} {dest}, {src1}, {src2}")
            }
            Jal { dest, offset } => write!(f, "jal {dest}, {offset}"),
            Jalr { dest, base, offset } => write!(f, "jalr {dest}, {offset}({base})"),
            Branch {
                condition,
                src1,
                src2,
                offset,
            } => {
                let name = match condition {
                    BranchCondition::Beq => "beq",
                    BranchCondition::Bne => "bne",
                    BranchCondition::Blt => "blt",
                    BranchCondition::Bltu => "bltu",
                    BranchCondition::Bge => "bge",
                    BranchCondition::Bgeu => "bgeu",
                };
                write!(f, "{name} {src1}, {src2}, {offset}")
            }
            Load {
                width,
                dest,
                base,
                offset,
            } => {
                let name = match width {
                    LoadWidth::Lb => "lb",
                    LoadWidth::Lh => "lh",
                    LoadWidth::Lw => "lw",
                    LoadWidth::Lbu => "lbu",
                    LoadWidth::Lhu => "lhu",
                };
                write!(f, "{name} {dest}, {offset}({base})")
            }
            Store {
                width,
                src,
                base,
                offset,
            } => {
                let name = match width {
                    StoreWidth::Sb => "sb",
                    StoreWidth::Sh => "sh",
                    StoreWidth::Sw => "sw",
                };
                write!(f, "{name} {src}, {offset}({base})")
            }
            Fence => write!(f, "fence"),
            Ecall => write!(f, "ecall"),
            Ebreak => write!(f, "ebreak"),
            Csr { op, dest, csr, src } => {
                let name = match op {
                    CsrOp::ReadWrite => "csrrw",
                    CsrOp::ReadSet => "csrrs",
                    CsrOp::ReadClear => "csrrc",
                };
                write!(f, "{name} {dest}, {csr:#05x}, {src}")
            }
            Csri {
                op,
                dest,
                csr,
                immediate,
            } => {
                let name = match op {
                    CsrOp::ReadWrite => "csrrwi",
                    CsrOp::ReadSet => "csrrsi",
                    CsrOp::ReadClear => "csrrci",
                };
                write!(f, "{name} {dest}, {csr:#05x}, {immediate}")
            }
            LoadReserved { dest, addr } => write!(f, "lr.w {dest}, ({addr})"),
            StoreConditional { dest, src, addr } => write!(f, "sc.w {dest}, {src}, ({addr})"),
            Amo {
                op,
                dest,
                src,
                addr,
            } => {
                let name = match op {
                    AmoOp::Swap => "amoswap.w",
                    AmoOp::Add => "amoadd.w",
                    AmoOp::Xor => "amoxor.w",
                    AmoOp::And => "amoand.w",
                    AmoOp::Or => "amoor.w",
                    AmoOp::Min => "amomin.w",
                    AmoOp::Max => "amomax.w",
                    AmoOp::MinU => "amominu.w",
                    AmoOp::MaxU => "amomaxu.w",
                };
                write!(f, "{name} {dest}, {src}, ({addr})")
            }
            FpLoad {
                precision,
                dest,
                base,
                offset,
            } => {
                let name = match precision {
                    Precision::Single => "flw",
                    Precision::Double => "fld",
                };
                write!(f, "{name} {}, {offset}({base})", F(dest))
            }
            FpStore {
                precision,
                src,
                base,
                offset,
            } => {
                let name = match precision {
                    Precision::Single => "fsw",
                    Precision::Double => "fsd",
                };
                write!(f, "{name} {}, {offset}({base})", F(src))
            }
            FpFused {
                op,
                precision,
                dest,
                src1,
                src2,
                src3,
                ..
            } => {
                let name = match op {
                    FusedOp::MulAdd => "fmadd",
                    FusedOp::MulSub => "fmsub",
                    FusedOp::NegMulSub => "fnmsub",
                    FusedOp::NegMulAdd => "fnmadd",
                };
                write!(
                    f,
                    "{name}.{} {}, {}, {}, {}",
                    precision.suffix(),
                    F(dest),
                    F(src1),
                    F(src2),
                    F(src3)
                )
            }
            FpArith {
                op,
                precision,
                dest,
                src1,
                src2,
                ..
            } => {
                let name = match op {
                    FpArithOp::Add => "fadd",
                    FpArithOp::Sub => "fsub",
                    FpArithOp::Mul => "fmul",
                    FpArithOp::Div => "fdiv",
                };
                write!(
                    f,
                    "{name}.{} {}, {}, {}",
                    precision.suffix(),
                    F(dest),
                    F(src1),
                    F(src2)
                )
            }
            FpSqrt {
                precision,
                dest,
                src,
                ..
            } => write!(f, "fsqrt.{} {}, {}", precision.suffix(), F(dest), F(src)),
            FpSignInject {
                op,
                precision,
                dest,
                src1,
                src2,
            } => {
                let name = match op {
                    SignInjectOp::Copy => "fsgnj",
                    SignInjectOp::Negate => "fsgnjn",
                    SignInjectOp::Xor => "fsgnjx",
                };
                write!(
                    f,
                    "{name}.{} {}, {}, {}",
                    precision.suffix(),
                    F(dest),
                    F(src1),
                    F(src2)
                )
            }
            FpMinMax {
                op,
                precision,
                dest,
                src1,
                src2,
            } => {
                let name = match op {
                    MinMaxOp::Min => "fmin",
                    MinMaxOp::Max => "fmax",
                };
                write!(
                    f,
                    "{name}.{} {}, {}, {}",
                    precision.suffix(),
                    F(dest),
                    F(src1),
                    F(src2)
                )
            }
            FpCompare {
                op,
                precision,
                dest,
                src1,
                src2,
            } => {
                let name = match op {
                    FpCompareOp::Eq => "feq",
                    FpCompareOp::Lt => "flt",
                    FpCompareOp::Le => "fle",
                };
                write!(
                    f,
                    "{name}.{} {dest}, {}, {}",
                    precision.suffix(),
                    F(src1),
                    F(src2)
                )
            }
            FpClassify {
                precision,
                dest,
                src,
            } => write!(f, "fclass.{} {dest}, {}", precision.suffix(), F(src)),
            FpToInt {
                precision,
                signed,
                dest,
                src,
                ..
            } => {
                let kind = if signed { "w" } else { "wu" };
                write!(f, "fcvt.{kind}.{} {dest}, {}", precision.suffix(), F(src))
            }
            IntToFp {
                precision,
                signed,
                dest,
                src,
                ..
            } => {
                let kind = if signed { "w" } else { "wu" };
                write!(f, "fcvt.{}.{kind} {}, {src}", precision.suffix(), F(dest))
            }
            FpConvertFormat { to, dest, src, .. } => {
                let from = match to {
                    Precision::Single => Precision::Double,
                    Precision::Double => Precision::Single,
                };
                write!(
                    f,
                    "fcvt.{}.{} {}, {}",
                    to.suffix(),
                    from.suffix(),
                    F(dest),
                    F(src)
                )
            }
            FpMoveToInt { dest, src } => write!(f, "fmv.x.w {dest}, {}", F(src)),
            FpMoveFromInt { dest, src } => write!(f, "fmv.w.x {}, {src}", F(dest)),
            Uret => write!(f, "uret"),
            Sret => write!(f, "sret"),
            Mret => write!(f, "mret"),
            Wfi => write!(f, "wfi"),
            SfenceVma { vaddr, asid } => write!(f, "sfence.vma {vaddr}, {asid}"),
            SinvalVma { vaddr, asid } => write!(f, "sinval.vma {vaddr}, {asid}"),
            SinvalGvma { vaddr, asid } => write!(f, "sinval.gvma {vaddr}, {asid}"),
            SfenceWInval => write!(f, "sfence.w.inval"),
            SfenceInvalIr => write!(f, "sfence.inval.ir"),
            Tva { dest, src } => write!(f, "tva {dest}, {src}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_i_imm() {
        assert_eq!(0, i_imm(0x0000_0000));
        assert_eq!(-1, i_imm(0xFFF0_0000));
        assert_eq!(2047, i_imm(2047 << 20));
        assert_eq!(-2048, i_imm(0x8000_0000));
        assert_eq!(-42, i_imm((-42_i32 << 20) as u32));
        // Check other bits are ignored
        assert_eq!(0, i_imm(0x000F_FFFF));
        assert_eq!(-1, i_imm(0xFFF1_2345));
    }

    #[test]
    fn test_b_imm() {
        // bne x1, x2, +16
        assert_eq!(16, b_imm(0x0020_9863));
        // branch-to-self has displacement 0
        assert_eq!(0, b_imm(0x0000_0063));
    }

    #[test]
    fn test_decode_op_imm() {
        // addi x5, x0, 7
        assert_eq!(
            Instruction::decode(0x0070_0293),
            Ok(Instruction::OpImm {
                op: RegImmOp::Addi,
                dest: Specifier::new(5).unwrap(),
                src: Specifier::X0,
                immediate: 7,
            })
        );
        // addi x5, x5, -3
        assert_eq!(
            Instruction::decode(0xFFD2_8293),
            Ok(Instruction::OpImm {
                op: RegImmOp::Addi,
                dest: Specifier::new(5).unwrap(),
                src: Specifier::new(5).unwrap(),
                immediate: -3,
            })
        );
    }

    #[test]
    fn test_decode_shifts() {
        // srai x1, x2, 4 is distinguished from srli by bit 30
        assert_eq!(
            Instruction::decode(0x4041_5093),
            Ok(Instruction::OpShiftImm {
                op: RegShiftImmOp::Srai,
                dest: Specifier::new(1).unwrap(),
                src: Specifier::new(2).unwrap(),
                shift_amount_u5: 4,
            })
        );
        assert_eq!(
            Instruction::decode(0x0041_5093),
            Ok(Instruction::OpShiftImm {
                op: RegShiftImmOp::Srli,
                dest: Specifier::new(1).unwrap(),
                src: Specifier::new(2).unwrap(),
                shift_amount_u5: 4,
            })
        );
    }

    #[test]
    fn test_decode_m_extension() {
        // mul x1, x2, x3
        assert_eq!(
            Instruction::decode(0x0231_00B3),
            Ok(Instruction::Op {
                op: RegRegOp::Mul,
                dest: Specifier::new(1).unwrap(),
                src1: Specifier::new(2).unwrap(),
                src2: Specifier::new(3).unwrap(),
            })
        );
        // div x1, x2, x3
        assert_eq!(
            Instruction::decode(0x0231_40B3),
            Ok(Instruction::Op {
                op: RegRegOp::Div,
                dest: Specifier::new(1).unwrap(),
                src1: Specifier::new(2).unwrap(),
                src2: Specifier::new(3).unwrap(),
            })
        );
    }

    #[test]
    fn test_decode_system() {
        assert_eq!(Instruction::decode(0x0000_0073), Ok(Instruction::Ecall));
        assert_eq!(Instruction::decode(0x0010_0073), Ok(Instruction::Ebreak));
        assert_eq!(Instruction::decode(0x3020_0073), Ok(Instruction::Mret));
        assert_eq!(Instruction::decode(0x1020_0073), Ok(Instruction::Sret));
        assert_eq!(Instruction::decode(0x1050_0073), Ok(Instruction::Wfi));
        assert_eq!(
            Instruction::decode(0x1200_0073),
            Ok(Instruction::SfenceVma {
                vaddr: Specifier::X0,
                asid: Specifier::X0,
            })
        );
        // csrrs x1, mstatus, x0
        assert_eq!(
            Instruction::decode(0x3000_20F3),
            Ok(Instruction::Csr {
                op: CsrOp::ReadSet,
                dest: Specifier::new(1).unwrap(),
                csr: 0x300,
                src: Specifier::X0,
            })
        );
    }

    #[test]
    fn test_decode_amo() {
        // lr.w x1, (x10)
        assert_eq!(
            Instruction::decode(0x1005_20AF),
            Ok(Instruction::LoadReserved {
                dest: Specifier::new(1).unwrap(),
                addr: Specifier::new(10).unwrap(),
            })
        );
        // lr.w with rs2 != 0 is reserved
        assert_eq!(
            Instruction::decode(0x1035_20AF),
            Err(DecodeError::IllegalInstruction)
        );
        // sc.w x2, x3, (x10)
        assert_eq!(
            Instruction::decode(0x1835_212F),
            Ok(Instruction::StoreConditional {
                dest: Specifier::new(2).unwrap(),
                src: Specifier::new(3).unwrap(),
                addr: Specifier::new(10).unwrap(),
            })
        );
        // amoadd.w x2, x3, (x10)
        assert_eq!(
            Instruction::decode(0x0035_212F),
            Ok(Instruction::Amo {
                op: AmoOp::Add,
                dest: Specifier::new(2).unwrap(),
                src: Specifier::new(3).unwrap(),
                addr: Specifier::new(10).unwrap(),
            })
        );
    }

    #[test]
    fn test_decode_fp() {
        // fadd.s f3, f1, f2 (rm = rne)
        assert_eq!(
            Instruction::decode(0x0020_81D3),
            Ok(Instruction::FpArith {
                op: FpArithOp::Add,
                precision: Precision::Single,
                dest: Specifier::new(3).unwrap(),
                src1: Specifier::new(1).unwrap(),
                src2: Specifier::new(2).unwrap(),
                rm: RoundingMode::Rne,
            })
        );
        // fadd.d differs only in the fmt field
        assert_eq!(
            Instruction::decode(0x0220_81D3),
            Ok(Instruction::FpArith {
                op: FpArithOp::Add,
                precision: Precision::Double,
                dest: Specifier::new(3).unwrap(),
                src1: Specifier::new(1).unwrap(),
                src2: Specifier::new(2).unwrap(),
                rm: RoundingMode::Rne,
            })
        );
        // fmv.w.x f1, x2
        assert_eq!(
            Instruction::decode(0xF001_00D3),
            Ok(Instruction::FpMoveFromInt {
                dest: Specifier::new(1).unwrap(),
                src: Specifier::new(2).unwrap(),
            })
        );
        // fmv.x.w x1, f2
        assert_eq!(
            Instruction::decode(0xE001_00D3),
            Ok(Instruction::FpMoveToInt {
                dest: Specifier::new(1).unwrap(),
                src: Specifier::new(2).unwrap(),
            })
        );
        // fcvt.w.s x1, f2, rtz
        assert_eq!(
            Instruction::decode(0xC001_10D3),
            Ok(Instruction::FpToInt {
                precision: Precision::Single,
                signed: true,
                dest: Specifier::new(1).unwrap(),
                src: Specifier::new(2).unwrap(),
                rm: RoundingMode::Rtz,
            })
        );
        // fmadd.s f3, f1, f2, f4
        assert_eq!(
            Instruction::decode(0x2020_81C3),
            Ok(Instruction::FpFused {
                op: FusedOp::MulAdd,
                precision: Precision::Single,
                dest: Specifier::new(3).unwrap(),
                src1: Specifier::new(1).unwrap(),
                src2: Specifier::new(2).unwrap(),
                src3: Specifier::new(4).unwrap(),
                rm: RoundingMode::Rne,
            })
        );
        // flw f1, 0(x2)
        assert_eq!(
            Instruction::decode(0x0001_2087),
            Ok(Instruction::FpLoad {
                precision: Precision::Single,
                dest: Specifier::new(1).unwrap(),
                base: Specifier::new(2).unwrap(),
                offset: 0,
            })
        );
    }

    #[test]
    fn test_decode_tva() {
        assert_eq!(
            Instruction::decode(0x0001_008B),
            Ok(Instruction::Tva {
                dest: Specifier::new(1).unwrap(),
                src: Specifier::new(2).unwrap(),
            })
        );
    }

    #[test]
    fn test_display() {
        let cases: &[(u32, &str)] = &[
            (0x0070_0293, "addi x5, x0, 7"),
            (0x0020_9863, "bne x1, x2, 16"),
            (0x0000_0073, "ecall"),
            (0x1005_20AF, "lr.w x1, (x10)"),
            (0x0035_212F, "amoadd.w x2, x3, (x10)"),
            (0x0020_81D3, "fadd.s f3, f1, f2"),
            (0xE001_00D3, "fmv.x.w x1, f2"),
            (0x3020_0073, "mret"),
            (0x0001_008B, "tva x1, x2"),
        ];
        for &(raw, text) in cases {
            assert_eq!(text, Instruction::decode(raw).unwrap().to_string());
        }
    }

    proptest! {
        // Decoding must be total: any word either produces a record or a
        // decode error, never a panic.
        #[test]
        fn decode_is_total(raw in any::<u32>()) {
            let _ = Instruction::decode(raw);
        }

        // Decoded instructions always format without panicking.
        #[test]
        fn display_is_total(raw in any::<u32>()) {
            if let Ok(instruction) = Instruction::decode(raw) {
                let _ = instruction.to_string();
            }
        }
    }
}
