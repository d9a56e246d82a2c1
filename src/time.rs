//! F Prime time stamps.
//!
//! Every telemetry and event packet carries an 11 byte time field ahead of
//! its payload: a 2 byte time base, a 1 byte context, and 32 bit seconds and
//! microseconds. It is decoded without any dictionary help.
use hifitime::Epoch;
use serde::Serialize;

use crate::bytes::Cursor;
use crate::Result;

/// A decoded time field.
///
/// `base` names the clock domain. Only [Time::BASE_WORKSTATION] seconds count
/// from the UTC epoch; the other bases are offsets from some process-defined
/// epoch and are only meaningful as raw values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Time {
    pub base: u16,
    pub context: u8,
    pub seconds: u32,
    pub microseconds: u32,
}

impl Time {
    /// Encoded length in bytes.
    pub const LEN: usize = 11;

    pub const BASE_NONE: u16 = 0;
    /// Seconds since processor boot.
    pub const BASE_PROCESSOR: u16 = 1;
    /// Seconds since the UTC epoch, as stamped by ground support equipment.
    pub const BASE_WORKSTATION: u16 = 2;
    pub const BASE_SPACECRAFT: u16 = 3;
    pub const BASE_FPGA: u16 = 4;
    pub const BASE_DONT_CARE: u16 = 0xffff;

    pub fn decode(cur: &mut Cursor) -> Result<Time> {
        Ok(Time {
            base: cur.read_u16()?,
            context: cur.read_u8()?,
            seconds: cur.read_u32()?,
            microseconds: cur.read_u32()?,
        })
    }

    /// Calendar timestamp for workstation-based times, `None` for every
    /// other base.
    pub fn epoch(&self) -> Option<Epoch> {
        if self.base != Self::BASE_WORKSTATION {
            return None;
        }
        Some(Epoch::from_unix_seconds(
            f64::from(self.seconds) + f64::from(self.microseconds) * 1e-6,
        ))
    }

    /// Seconds with the microsecond fraction folded in.
    pub fn as_secs_f64(&self) -> f64 {
        f64::from(self.seconds) + f64::from(self.microseconds) * 1e-6
    }
}
