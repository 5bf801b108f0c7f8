//! The software floating-point engine behind the F and D extensions.
//!
//! All arithmetic runs on `rustc_apfloat`, so rounding behaviour is chosen
//! per operation instead of by mutating process-global FPU state, and the
//! IEEE exception flags come back as a [`Status`] value that the executor
//! accumulates into `fcsr`.

use crate::instruction::RoundingMode;
use crate::registers::FpRegister;
use rustc_apfloat::ieee::{Double, Single};
use rustc_apfloat::{Float, Round, Status};
use thiserror::Error;

/// `fcsr` flag bits (the `fflags` field).
pub mod fflags {
    /// Inexact.
    pub const NX: u32 = 1 << 0;
    /// Underflow.
    pub const UF: u32 = 1 << 1;
    /// Overflow.
    pub const OF: u32 = 1 << 2;
    /// Divide by zero.
    pub const DZ: u32 = 1 << 3;
    /// Invalid operation.
    pub const NV: u32 = 1 << 4;
    /// All five accrued exception flags.
    pub const MASK: u32 = 0x1F;
}

/// Shift of the rounding-mode field within `fcsr`.
pub const FRM_SHIFT: u32 = 5;

/// The rounding-mode field selected an unsupported or reserved mode. The
/// executor reports this as an illegal instruction.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
#[error("unsupported floating-point rounding mode")]
pub struct UnsupportedRoundingMode;

/// Maps an instruction's rounding-mode field to a concrete rounding mode,
/// resolving `DYN` through the `frm` field of `fcsr`.
///
/// `RMM` and the two reserved encodings are rejected, whether they are
/// selected statically or through `frm`; `DYN` found in `frm` itself has
/// no meaning either.
pub fn resolve_rounding_mode(
    rm: RoundingMode,
    frm: u32,
) -> Result<Round, UnsupportedRoundingMode> {
    match rm {
        RoundingMode::Rne => Ok(Round::NearestTiesToEven),
        RoundingMode::Rtz => Ok(Round::TowardZero),
        RoundingMode::Rdn => Ok(Round::TowardNegative),
        RoundingMode::Rup => Ok(Round::TowardPositive),
        RoundingMode::Rmm | RoundingMode::Reserved5 | RoundingMode::Reserved6 => {
            Err(UnsupportedRoundingMode)
        }
        RoundingMode::Dynamic => match frm & 0b111 {
            0b000 => Ok(Round::NearestTiesToEven),
            0b001 => Ok(Round::TowardZero),
            0b010 => Ok(Round::TowardNegative),
            0b011 => Ok(Round::TowardPositive),
            _ => Err(UnsupportedRoundingMode),
        },
    }
}

/// Converts an operation status into the `fflags` bits it accrues.
pub fn status_to_fflags(status: Status) -> u32 {
    let raw = status.bits();
    let mut bits = 0;
    if raw & Status::INVALID_OP.bits() != 0 {
        bits |= fflags::NV;
    }
    if raw & Status::DIV_BY_ZERO.bits() != 0 {
        bits |= fflags::DZ;
    }
    if raw & Status::OVERFLOW.bits() != 0 {
        bits |= fflags::OF;
    }
    if raw & Status::UNDERFLOW.bits() != 0 {
        bits |= fflags::UF;
    }
    if raw & Status::INEXACT.bits() != 0 {
        bits |= fflags::NX;
    }
    bits
}

/// Bridge between the tagged 64-bit register slot and a `rustc_apfloat`
/// type.
pub trait SoftFloat: Float + Copy {
    /// Reinterprets the register's held bits in this format.
    fn from_register(register: FpRegister) -> Self;

    /// Stores this value into a register slot, tagged with this format's
    /// width.
    fn into_register(self) -> FpRegister;

    /// The canonical quiet-NaN register image for this format.
    fn canonical_nan_register() -> FpRegister;

    /// Classifies the register's held bits in this format.
    fn classify(register: FpRegister) -> FpClass;
}

impl SoftFloat for Single {
    fn from_register(register: FpRegister) -> Self {
        Single::from_bits(register.single_bits() as u128)
    }

    fn into_register(self) -> FpRegister {
        FpRegister::from_single_bits(self.to_bits() as u32)
    }

    fn canonical_nan_register() -> FpRegister {
        // The canonical single qNaN, NaN-boxed with an all-ones upper half.
        FpRegister::from_boxed_single(0xFFFF_FFFF_7FC0_0000)
    }

    fn classify(register: FpRegister) -> FpClass {
        FpClass::of_single(register.single_bits())
    }
}

impl SoftFloat for Double {
    fn from_register(register: FpRegister) -> Self {
        Double::from_bits(register.double_bits() as u128)
    }

    fn into_register(self) -> FpRegister {
        FpRegister::from_double_bits(self.to_bits() as u64)
    }

    fn canonical_nan_register() -> FpRegister {
        // The canonical double qNaN: sign clear, quiet bit set, zero
        // payload.
        FpRegister::from_double_bits(0x7FF8_0000_0000_0000)
    }

    fn classify(register: FpRegister) -> FpClass {
        FpClass::of_double(register.double_bits())
    }
}

/// Writes an arithmetic result back in canonical form: any NaN becomes the
/// format's canonical quiet NaN.
pub fn canonicalised<F: SoftFloat>(value: F) -> FpRegister {
    if value.is_nan() {
        F::canonical_nan_register()
    } else {
        value.into_register()
    }
}

/// Classification of a floating-point bit pattern.
///
/// A NaN is *signalling* iff the most significant bit of the significand is
/// clear (the IEEE 754-2008 convention).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct FpClass {
    pub is_inf: bool,
    pub is_snan: bool,
    pub is_qnan: bool,
    pub is_subnormal: bool,
    pub is_zero: bool,
    pub is_neg: bool,
}

impl FpClass {
    pub fn of_single(bits: u32) -> Self {
        let exponent = (bits >> 23) & 0xFF;
        let significand = bits & 0x7F_FFFF;
        let quiet = significand & 0x40_0000 != 0;
        Self {
            is_inf: exponent == 0xFF && significand == 0,
            is_snan: exponent == 0xFF && significand != 0 && !quiet,
            is_qnan: exponent == 0xFF && quiet,
            is_subnormal: exponent == 0 && significand != 0,
            is_zero: exponent == 0 && significand == 0,
            is_neg: bits >> 31 != 0,
        }
    }

    pub fn of_double(bits: u64) -> Self {
        let exponent = (bits >> 52) & 0x7FF;
        let significand = bits & 0xF_FFFF_FFFF_FFFF;
        let quiet = significand & 0x8_0000_0000_0000 != 0;
        Self {
            is_inf: exponent == 0x7FF && significand == 0,
            is_snan: exponent == 0x7FF && significand != 0 && !quiet,
            is_qnan: exponent == 0x7FF && quiet,
            is_subnormal: exponent == 0 && significand != 0,
            is_zero: exponent == 0 && significand == 0,
            is_neg: bits >> 63 != 0,
        }
    }

    pub fn is_nan(self) -> bool {
        self.is_snan || self.is_qnan
    }

    /// The 10-bit class mask produced by `FCLASS.S`/`FCLASS.D`. Exactly one
    /// bit is set.
    pub fn mask(self) -> u32 {
        if self.is_snan {
            return 1 << 8;
        }
        if self.is_qnan {
            return 1 << 9;
        }
        match (self.is_neg, self.is_inf, self.is_subnormal, self.is_zero) {
            (true, true, _, _) => 1 << 0,
            (true, false, false, false) => 1 << 1,
            (true, false, true, _) => 1 << 2,
            (true, false, false, true) => 1 << 3,
            (false, false, false, true) => 1 << 4,
            (false, false, true, _) => 1 << 5,
            (false, false, false, false) => 1 << 6,
            (false, true, _, _) => 1 << 7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_static_modes() {
        assert_eq!(
            Ok(Round::NearestTiesToEven),
            resolve_rounding_mode(RoundingMode::Rne, 0)
        );
        assert_eq!(
            Ok(Round::TowardZero),
            resolve_rounding_mode(RoundingMode::Rtz, 0)
        );
        assert!(resolve_rounding_mode(RoundingMode::Rmm, 0).is_err());
        assert!(resolve_rounding_mode(RoundingMode::Reserved5, 0).is_err());
    }

    #[test]
    fn test_resolve_dynamic_mode() {
        assert_eq!(
            Ok(Round::TowardNegative),
            resolve_rounding_mode(RoundingMode::Dynamic, 0b010)
        );
        // RMM selected through frm is just as unsupported, and so are the
        // reserved and DYN encodings.
        assert!(resolve_rounding_mode(RoundingMode::Dynamic, 0b100).is_err());
        assert!(resolve_rounding_mode(RoundingMode::Dynamic, 0b101).is_err());
        assert!(resolve_rounding_mode(RoundingMode::Dynamic, 0b110).is_err());
        assert!(resolve_rounding_mode(RoundingMode::Dynamic, 0b111).is_err());
    }

    #[test]
    fn test_status_to_fflags() {
        assert_eq!(0, status_to_fflags(Status::OK));
        assert_eq!(fflags::NV, status_to_fflags(Status::INVALID_OP));
        assert_eq!(fflags::DZ, status_to_fflags(Status::DIV_BY_ZERO));
        assert_eq!(
            fflags::OF | fflags::NX,
            status_to_fflags(Status::OVERFLOW | Status::INEXACT)
        );
        assert_eq!(fflags::UF, status_to_fflags(Status::UNDERFLOW));
    }

    #[test]
    fn test_classify_single() {
        let inf = FpClass::of_single(0x7F80_0000);
        assert!(inf.is_inf && !inf.is_neg);
        assert_eq!(1 << 7, inf.mask());

        let neg_zero = FpClass::of_single(0x8000_0000);
        assert!(neg_zero.is_zero && neg_zero.is_neg);
        assert_eq!(1 << 3, neg_zero.mask());

        let snan = FpClass::of_single(0x7F80_0001);
        assert!(snan.is_snan && !snan.is_qnan);
        assert_eq!(1 << 8, snan.mask());

        let qnan = FpClass::of_single(0x7FC0_0000);
        assert!(qnan.is_qnan && !qnan.is_snan);
        assert_eq!(1 << 9, qnan.mask());

        let subnormal = FpClass::of_single(0x0000_0001);
        assert!(subnormal.is_subnormal);
        assert_eq!(1 << 5, subnormal.mask());

        let one = FpClass::of_single(0x3F80_0000);
        assert_eq!(1 << 6, one.mask());
        let neg_one = FpClass::of_single(0xBF80_0000);
        assert_eq!(1 << 1, neg_one.mask());
    }

    #[test]
    fn test_classify_double() {
        assert_eq!(1 << 0, FpClass::of_double(0xFFF0_0000_0000_0000).mask());
        assert_eq!(1 << 9, FpClass::of_double(0x7FF8_0000_0000_0000).mask());
        assert_eq!(1 << 8, FpClass::of_double(0x7FF0_0000_0000_0001).mask());
        assert_eq!(1 << 4, FpClass::of_double(0).mask());
    }

    #[test]
    fn test_canonicalised() {
        // A NaN produced by arithmetic collapses to the canonical pattern.
        let nan = Single::qnan(Some(0x1234));
        assert_eq!(
            0xFFFF_FFFF_7FC0_0000,
            canonicalised::<Single>(nan).raw()
        );
        let one = Single::from_bits(0x3F80_0000);
        assert_eq!(0x3F80_0000, canonicalised::<Single>(one).raw());
        assert_eq!(
            0x7FF8_0000_0000_0000,
            canonicalised::<Double>(Double::qnan(None)).raw()
        );
    }
}
