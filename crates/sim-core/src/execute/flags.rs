//! Status-flag computation using the datasheet bit formulas.
//!
//! Carry and half carry come from the per-bit carry (or borrow) vector
//! `Rd·Rr + Rr·!R + !R·Rd`, read at bits 7 and 3; overflow from the sign-bit
//! terms. Nothing here uses wider integer arithmetic to infer flags.

use crate::state::Flags;

/// Per-flag update; `None` leaves the flag unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagsUpdate {
    /// Half carry.
    pub h: Option<bool>,
    /// Sign.
    pub s: Option<bool>,
    /// Overflow.
    pub v: Option<bool>,
    /// Negative.
    pub n: Option<bool>,
    /// Zero.
    pub z: Option<bool>,
    /// Carry.
    pub c: Option<bool>,
}

impl FlagsUpdate {
    /// Writes every `Some` field into `flags`.
    pub fn apply(self, flags: &mut Flags) {
        let fields = [
            (self.h, &mut flags.h),
            (self.s, &mut flags.s),
            (self.v, &mut flags.v),
            (self.n, &mut flags.n),
            (self.z, &mut flags.z),
            (self.c, &mut flags.c),
        ];
        for (update, flag) in fields {
            if let Some(value) = update {
                *flag = value;
            }
        }
    }

    /// `V`, `N`, `Z` and `S` for an 8-bit result.
    const fn vnzs(result: u8, v: bool) -> Self {
        let n = result & 0x80 != 0;
        Self {
            h: None,
            s: Some(n ^ v),
            v: Some(v),
            n: Some(n),
            z: Some(result == 0),
            c: None,
        }
    }

    /// `V`, `N`, `Z` and `S` for a 16-bit result.
    const fn vnzs_word(result: u16, v: bool) -> Self {
        let n = result & 0x8000 != 0;
        Self {
            h: None,
            s: Some(n ^ v),
            v: Some(v),
            n: Some(n),
            z: Some(result == 0),
            c: None,
        }
    }
}

const fn bit(value: u8, n: u8) -> bool {
    (value >> n) & 1 != 0
}

/// `ADD`/`ADC`.
#[must_use]
pub const fn add(rd: u8, rr: u8, carry_in: bool) -> (u8, FlagsUpdate) {
    let r = rd.wrapping_add(rr).wrapping_add(carry_in as u8);
    let carries = (rd & rr) | (rr & !r) | (!r & rd);
    let overflow = (rd & rr & !r) | (!rd & !rr & r);
    let mut update = FlagsUpdate::vnzs(r, bit(overflow, 7));
    update.h = Some(bit(carries, 3));
    update.c = Some(bit(carries, 7));
    (r, update)
}

/// `SUB`/`SUBI`/`CP`/`CPI`.
#[must_use]
pub const fn sub(rd: u8, rr: u8, borrow_in: bool) -> (u8, FlagsUpdate) {
    let r = rd.wrapping_sub(rr).wrapping_sub(borrow_in as u8);
    let borrows = (!rd & rr) | (rr & r) | (r & !rd);
    let overflow = (rd & !rr & !r) | (!rd & rr & r);
    let mut update = FlagsUpdate::vnzs(r, bit(overflow, 7));
    update.h = Some(bit(borrows, 3));
    update.c = Some(bit(borrows, 7));
    (r, update)
}

/// `SBC`/`SBCI`/`CPC`: a zero result keeps the previous `Z`, so multi-byte
/// compares report equality only when every byte matched.
#[must_use]
pub const fn sub_with_carry(rd: u8, rr: u8, borrow_in: bool, z_old: bool) -> (u8, FlagsUpdate) {
    let (r, mut update) = sub(rd, rr, borrow_in);
    update.z = Some(r == 0 && z_old);
    (r, update)
}

/// `AND`/`ANDI`/`OR`/`ORI`/`EOR`.
#[must_use]
pub const fn logic(result: u8) -> FlagsUpdate {
    FlagsUpdate::vnzs(result, false)
}

/// `COM`.
#[must_use]
pub const fn com(rd: u8) -> (u8, FlagsUpdate) {
    let r = !rd;
    let mut update = logic(r);
    update.c = Some(true);
    (r, update)
}

/// `NEG`: the flags of `0 - Rd`.
#[must_use]
pub const fn neg(rd: u8) -> (u8, FlagsUpdate) {
    sub(0, rd, false)
}

/// `INC`; carry is untouched.
#[must_use]
pub const fn inc(rd: u8) -> (u8, FlagsUpdate) {
    let r = rd.wrapping_add(1);
    (r, FlagsUpdate::vnzs(r, r == 0x80))
}

/// `DEC`; carry is untouched.
#[must_use]
pub const fn dec(rd: u8) -> (u8, FlagsUpdate) {
    let r = rd.wrapping_sub(1);
    (r, FlagsUpdate::vnzs(r, r == 0x7F))
}

const fn shifted(rd: u8, r: u8) -> FlagsUpdate {
    let c = rd & 1 != 0;
    let n = r & 0x80 != 0;
    let mut update = FlagsUpdate::vnzs(r, n ^ c);
    update.c = Some(c);
    update
}

/// `ASR`.
#[must_use]
pub const fn asr(rd: u8) -> (u8, FlagsUpdate) {
    let r = (rd >> 1) | (rd & 0x80);
    (r, shifted(rd, r))
}

/// `LSR`.
#[must_use]
pub const fn lsr(rd: u8) -> (u8, FlagsUpdate) {
    let r = rd >> 1;
    (r, shifted(rd, r))
}

/// `ROR` through carry.
#[must_use]
pub const fn ror(rd: u8, carry_in: bool) -> (u8, FlagsUpdate) {
    let r = (rd >> 1) | ((carry_in as u8) << 7);
    (r, shifted(rd, r))
}

/// `ADIW`.
#[must_use]
pub const fn add_word(rd: u16, k: u8) -> (u16, FlagsUpdate) {
    let r = rd.wrapping_add(k as u16);
    let rdh7 = rd & 0x8000 != 0;
    let r15 = r & 0x8000 != 0;
    let mut update = FlagsUpdate::vnzs_word(r, !rdh7 && r15);
    update.c = Some(!r15 && rdh7);
    (r, update)
}

/// `SBIW`.
#[must_use]
pub const fn sub_word(rd: u16, k: u8) -> (u16, FlagsUpdate) {
    let r = rd.wrapping_sub(k as u16);
    let rdh7 = rd & 0x8000 != 0;
    let r15 = r & 0x8000 != 0;
    let mut update = FlagsUpdate::vnzs_word(r, rdh7 && !r15);
    update.c = Some(r15 && !rdh7);
    (r, update)
}

/// `MUL`/`MULS`/`MULSU`.
#[must_use]
pub const fn multiply(product: u16) -> FlagsUpdate {
    FlagsUpdate {
        c: Some(product & 0x8000 != 0),
        z: Some(product == 0),
        ..FlagsUpdate::NONE
    }
}

/// `FMUL`/`FMULS`/`FMULSU`: carry from the raw product, zero from the shifted one.
#[must_use]
pub const fn fractional(product: u16) -> (u16, FlagsUpdate) {
    let r = product << 1;
    (
        r,
        FlagsUpdate {
            c: Some(product & 0x8000 != 0),
            z: Some(r == 0),
            ..FlagsUpdate::NONE
        },
    )
}

impl FlagsUpdate {
    /// Leaves every flag unchanged.
    pub const NONE: Self = Self {
        h: None,
        s: None,
        v: None,
        n: None,
        z: None,
        c: None,
    };
}
