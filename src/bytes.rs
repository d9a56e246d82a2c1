use serde::Serialize;

use crate::{Error, Result};

/// Stream byte-order policy.
///
/// F Prime serializes with a single byte order chosen at build time for the
/// whole platform, so this applies to every field uniformly, size prefixes
/// included. There is no per-field endianness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Endian {
    Big,
    Little,
}

/// Cursor over a borrowed byte slice tracking the number of bytes consumed.
///
/// Every read advances the position by exactly the requested width; reading
/// past the end is [`Error::Underflow`]. There is no look-ahead or push-back.
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8], endian: Endian) -> Self {
        Cursor {
            buf,
            pos: 0,
            endian,
        }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Consume exactly `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::Underflow {
                wanted: n,
                available: self.remaining(),
            });
        }
        let dat = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(dat)
    }

    /// Remaining bytes, consuming all of them.
    pub fn take_rest(&mut self) -> &'a [u8] {
        let dat = &self.buf[self.pos..];
        self.pos = self.buf.len();
        dat
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let d = self.take(2)?;
        let arr = [d[0], d[1]];
        Ok(match self.endian {
            Endian::Big => u16::from_be_bytes(arr),
            Endian::Little => u16::from_le_bytes(arr),
        })
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let d = self.take(4)?;
        let arr = [d[0], d[1], d[2], d[3]];
        Ok(match self.endian {
            Endian::Big => u32::from_be_bytes(arr),
            Endian::Little => u32::from_le_bytes(arr),
        })
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let d = self.take(8)?;
        let arr = [d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]];
        Ok(match self.endian {
            Endian::Big => u64::from_be_bytes(arr),
            Endian::Little => u64::from_le_bytes(arr),
        })
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.read_u64()? as i64)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_advance_position() {
        let dat = [0x01, 0x02, 0x03, 0x04, 0x05];
        let mut cur = Cursor::new(&dat, Endian::Little);

        assert_eq!(cur.read_u8().unwrap(), 1);
        assert_eq!(cur.position(), 1);
        assert_eq!(cur.read_u16().unwrap(), 0x0302);
        assert_eq!(cur.position(), 3);
        assert_eq!(cur.remaining(), 2);
    }

    #[test]
    fn endian_policy_applies_to_all_widths() {
        let dat = [0x01, 0x02, 0x03, 0x04];
        let mut be = Cursor::new(&dat, Endian::Big);
        assert_eq!(be.read_u32().unwrap(), 0x0102_0304);
        let mut le = Cursor::new(&dat, Endian::Little);
        assert_eq!(le.read_u32().unwrap(), 0x0403_0201);
    }

    #[test]
    fn take_past_end_is_underflow() {
        let dat = [0u8; 3];
        let mut cur = Cursor::new(&dat, Endian::Little);
        cur.take(2).unwrap();

        let err = cur.read_u32().unwrap_err();
        match err {
            Error::Underflow { wanted, available } => {
                assert_eq!(wanted, 4);
                assert_eq!(available, 1);
            }
            other => panic!("expected underflow, got {other:?}"),
        }
        // Position is unchanged by the failed read
        assert_eq!(cur.position(), 2);
    }

    #[test]
    fn take_rest_consumes_everything() {
        let dat = [9, 8, 7];
        let mut cur = Cursor::new(&dat, Endian::Little);
        cur.read_u8().unwrap();
        assert_eq!(cur.take_rest(), &[8, 7]);
        assert!(cur.is_empty());
    }
}
