//! Frame-counter rollover
//!
//! Data frames carry only the low 16 bits of FCnt. The full 32-bit value
//! is recovered from the last counter accepted for the session: of the
//! candidates sharing the wire bits, the one closest to `last` wins, and a
//! tie goes to the candidate ahead of `last`.

const EPOCH: i64 = 0x1_0000;

/// Recover the full 32-bit counter for a 16-bit wire value
pub fn reconstruct_fcnt(last: u32, wire: u16) -> u32 {
    let last = i64::from(last);
    let base = (last & !0xFFFF) | i64::from(wire);

    [base - EPOCH, base, base + EPOCH]
        .into_iter()
        .filter(|candidate| (0..=i64::from(u32::MAX)).contains(candidate))
        .min_by_key(|candidate| ((candidate - last).abs(), *candidate < last))
        .map(|candidate| candidate as u32)
        .unwrap_or(u32::from(wire))
}
