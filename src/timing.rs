//! Bit timing computation.
//!
//! ```text
//! BITRATE      = PCLK / (PRESCALER * (1 + BS1 + BS2))
//! PRESCALER_BS = PRESCALER * (1 + BS1 + BS2) = PCLK / BITRATE
//! ```

use crate::{
    error::{Error, Result},
    regs::Btr,
};

/// Lowest bit rate accepted, in bits per second.
pub const MIN_BIT_RATE: u32 = 20_000;
/// Highest bit rate accepted, in bits per second.
pub const MAX_BIT_RATE: u32 = 1_000_000;

/// Values as stored in `BTR`: every field is the physical value minus one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub struct Timings {
    pub prescaler: u16,
    pub sjw: u8,
    pub bs1: u8,
    pub bs2: u8,
}

impl Timings {
    /// Physical prescaler, 1..=1024.
    pub fn physical_prescaler(&self) -> u32 {
        u32::from(self.prescaler) + 1
    }

    /// Time quanta per bit.
    pub fn quanta_per_bit(&self) -> u32 {
        1 + (u32::from(self.bs1) + 1) + (u32::from(self.bs2) + 1)
    }

    /// Sample point in per mille of the bit time.
    pub fn sample_point_permille(&self) -> u32 {
        (1 + u32::from(self.bs1) + 1) * 1000 / self.quanta_per_bit()
    }

    /// The timing fields of `BTR`, test mode bits cleared.
    pub fn btr(&self) -> Btr {
        Btr::new()
            .with_brp(self.prescaler & 0x3FF)
            .with_ts1(self.bs1 & 0xF)
            .with_ts2(self.bs2 & 0x7)
            .with_sjw(self.sjw & 0x3)
    }
}

/// Computes timings giving exactly `target_bit_rate` from `pclk`.
///
/// Starts at bs1 = 10, bs2 = 5 to keep the sample point late, then shrinks
/// the longer segment one quantum at a time until the prescaler divides out
/// exactly. The walk only visits one segment ratio per bit length, so rates
/// needing another ratio are reported as unachievable.
pub fn compute_timings(pclk: u32, target_bit_rate: u32) -> Result<Timings> {
    if !(MIN_BIT_RATE..=MAX_BIT_RATE).contains(&target_bit_rate) {
        return Err(Error::UnachievableBitRate(target_bit_rate));
    }

    let prescaler_bs = pclk / target_bit_rate;

    let mut bs1: u32 = 10;
    let mut bs2: u32 = 5;

    let prescaler = loop {
        let bs = 1 + bs1 + bs2;
        let prescaler = prescaler_bs / bs;
        if (1..=1024).contains(&prescaler) && pclk / (prescaler * bs) == target_bit_rate {
            break prescaler;
        }
        if bs1 > bs2 {
            bs1 -= 1;
        } else {
            bs2 -= 1;
        }
        if bs1 == 0 || bs2 == 0 {
            return Err(Error::UnachievableBitRate(target_bit_rate));
        }
    };

    debug_assert!((1..=16).contains(&bs1) && (1..=8).contains(&bs2));

    Ok(Timings {
        prescaler: (prescaler - 1) as u16,
        sjw: 1,
        bs1: (bs1 - 1) as u8,
        bs2: (bs2 - 1) as u8,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PCLK: u32 = 42_000_000;

    fn check_exact(pclk: u32, rate: u32) -> Timings {
        let t = compute_timings(pclk, rate).unwrap();
        assert_eq!(t.physical_prescaler() * t.quanta_per_bit(), pclk / rate);
        assert_eq!(pclk / (t.physical_prescaler() * t.quanta_per_bit()), rate);
        assert!(t.physical_prescaler() <= 1024);
        assert!(t.bs1 < 16 && t.bs2 < 8);
        t
    }

    #[test]
    fn one_megabit_at_42mhz() {
        // 42 = 3 * (1 + 8 + 5), reached after shrinking bs1 from 10 to 8.
        let t = check_exact(PCLK, 1_000_000);
        assert_eq!(
            t,
            Timings {
                prescaler: 2,
                sjw: 1,
                bs1: 7,
                bs2: 4,
            }
        );
        assert_eq!(t.sample_point_permille(), 642);
    }

    #[test]
    fn common_rates_at_42mhz() {
        for rate in [500_000, 250_000, 125_000, 100_000, 50_000, 20_000] {
            check_exact(PCLK, rate);
        }
    }

    #[test]
    fn common_rates_at_36mhz() {
        for rate in [1_000_000, 500_000, 250_000, 125_000] {
            check_exact(36_000_000, rate);
        }
    }

    #[test]
    fn out_of_range_rejected() {
        assert_eq!(
            compute_timings(PCLK, 19_999),
            Err(Error::UnachievableBitRate(19_999))
        );
        assert_eq!(
            compute_timings(PCLK, 1_000_001),
            Err(Error::UnachievableBitRate(1_000_001))
        );
        assert_eq!(compute_timings(PCLK, 0), Err(Error::UnachievableBitRate(0)));
    }

    #[test]
    fn trajectory_misses_are_reported() {
        // 17 MHz / 1 MHz is 17 quanta at prescaler 1, which the walk (starting
        // at 16 and only shrinking) never reaches.
        assert_eq!(
            compute_timings(17_000_000, 1_000_000),
            Err(Error::UnachievableBitRate(1_000_000))
        );
    }

    #[test]
    fn btr_fields() {
        let btr = compute_timings(PCLK, 1_000_000).unwrap().btr();
        assert_eq!(btr.brp(), 2);
        assert_eq!(btr.ts1(), 7);
        assert_eq!(btr.ts2(), 4);
        assert_eq!(btr.sjw(), 1);
    }
}
