//! Record framing.
//!
//! Splits a raw byte stream into per-record slices. The three on-disk
//! conventions are selected explicitly when the pipeline is built, never
//! auto-detected. Framed slices are opaque here; payload interpretation is
//! the packet decoder's job.
use std::io::{ErrorKind, Read};

use serde::Serialize;
use tracing::trace;

use crate::bytes::{Cursor, Endian};
use crate::{Error, Result};

/// On-disk record framing convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Framing {
    /// On-board ComLogger files: each record is a `u16` payload size (which
    /// excludes itself) followed by that many packet bytes.
    ComLogger,
    /// Ground-system downlink logs: same shape with a `u32` size.
    Gds,
    /// Parameter database files: no outer size, each entry is
    /// self-describing and needs the dictionary to delimit.
    PrmDb,
}

impl Framing {
    /// Width of the record size prefix in bytes, `None` for [Framing::PrmDb].
    pub fn size_prefix(&self) -> Option<usize> {
        match self {
            Framing::ComLogger => Some(2),
            Framing::Gds => Some(4),
            Framing::PrmDb => None,
        }
    }
}

/// One framed, undecoded record and its byte offset in the stream.
#[derive(Debug, Clone, Serialize)]
pub struct RawRecord {
    pub offset: usize,
    pub data: Vec<u8>,
}

/// Read until `buf` is full or the source is exhausted, returning the number
/// of bytes actually read.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// Iterator over size-prefixed records.
///
/// Records are back to back with no gaps or alignment. A short read at a
/// record boundary is a clean end of stream; a short read inside a declared
/// payload yields [Error::Truncated] once and ends the iteration.
pub struct FramedRecords<R> {
    reader: R,
    prefix: usize,
    endian: Endian,
    offset: usize,
    done: bool,
}

impl<R: Read> FramedRecords<R> {
    /// Frame `reader` per `framing`.
    ///
    /// # Panics
    /// If `framing` is [Framing::PrmDb], which has no size prefix to frame
    /// by; parameter files are decoded through the pipeline instead.
    pub fn new(reader: R, framing: Framing, endian: Endian) -> Self {
        let prefix = framing
            .size_prefix()
            .expect("parameter files are not size-prefixed");
        FramedRecords {
            reader,
            prefix,
            endian,
            offset: 0,
            done: false,
        }
    }
}

impl<R: Read> Iterator for FramedRecords<R> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut prefix = [0u8; 4];
        let prefix = &mut prefix[..self.prefix];
        match read_fully(&mut self.reader, prefix) {
            Ok(n) if n < prefix.len() => {
                // Nothing or a partial prefix at a record boundary: clean EOF
                trace!(offset = self.offset, "end of stream");
                self.done = true;
                return None;
            }
            Ok(_) => {}
            Err(err) => {
                self.done = true;
                return Some(Err(err.into()));
            }
        }

        let mut cur = Cursor::new(prefix, self.endian);
        let declared = match self.prefix {
            2 => cur.read_u16().map(usize::from),
            _ => cur.read_u32().map(|v| v as usize),
        }
        .expect("prefix buffer is exactly prefix width");

        // The declared size is untrusted; read through a take so the buffer
        // grows only as bytes actually arrive and a corrupt prefix degrades
        // into a truncation instead of a giant allocation.
        let mut data = Vec::with_capacity(declared.min(8 * 1024));
        match (&mut self.reader).take(declared as u64).read_to_end(&mut data) {
            Ok(n) if n < declared => {
                self.done = true;
                return Some(Err(Error::Truncated {
                    declared,
                    available: n,
                }));
            }
            Ok(_) => {}
            Err(err) => {
                self.done = true;
                return Some(Err(err.into()));
            }
        }

        let record = RawRecord {
            offset: self.offset,
            data,
        };
        self.offset += self.prefix + declared;
        Some(Ok(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comlogger(dat: &[u8]) -> FramedRecords<&[u8]> {
        FramedRecords::new(dat, Framing::ComLogger, Endian::Little)
    }

    #[test]
    fn records_are_back_to_back() {
        #[rustfmt::skip]
        let dat: &[u8] = &[
            0x03, 0x00, 0xaa, 0xbb, 0xcc,
            0x01, 0x00, 0xdd,
        ];
        let records: Vec<RawRecord> = comlogger(dat).map(Result::unwrap).collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].offset, 0);
        assert_eq!(records[0].data, vec![0xaa, 0xbb, 0xcc]);
        assert_eq!(records[1].offset, 5);
        assert_eq!(records[1].data, vec![0xdd]);
    }

    #[test]
    fn gds_framing_uses_u32_prefix() {
        #[rustfmt::skip]
        let dat: &[u8] = &[
            0x02, 0x00, 0x00, 0x00, 0xaa, 0xbb,
        ];
        let records: Vec<RawRecord> = FramedRecords::new(dat, Framing::Gds, Endian::Little)
            .map(Result::unwrap)
            .collect();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].data, vec![0xaa, 0xbb]);
    }

    #[test]
    fn cut_on_record_boundary_is_clean_eof() {
        #[rustfmt::skip]
        let dat: &[u8] = &[
            0x02, 0x00, 0xaa, 0xbb,
        ];
        let mut it = comlogger(dat);

        assert_eq!(it.next().unwrap().unwrap().data, vec![0xaa, 0xbb]);
        assert!(it.next().is_none());
        // Fused after EOF
        assert!(it.next().is_none());
    }

    #[test]
    fn partial_prefix_is_clean_eof() {
        // One stray byte where a 2 byte prefix should start
        let dat: &[u8] = &[0x02, 0x00, 0xaa, 0xbb, 0x01];
        let mut it = comlogger(dat);

        assert!(it.next().unwrap().is_ok());
        assert!(it.next().is_none());
    }

    #[test]
    fn cut_inside_record_is_truncation() {
        #[rustfmt::skip]
        let dat: &[u8] = &[
            0x02, 0x00, 0xaa, 0xbb, // complete
            0x05, 0x00, 0xcc,       // declares 5, only 1 present
        ];
        let mut it = comlogger(dat);

        assert!(it.next().unwrap().is_ok());
        let err = it.next().unwrap().unwrap_err();
        match err {
            Error::Truncated {
                declared,
                available,
            } => {
                assert_eq!(declared, 5);
                assert_eq!(available, 1);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
        // Reported once; the sequence then ends
        assert!(it.next().is_none());
    }

    #[test]
    fn empty_stream_yields_nothing() {
        let dat: &[u8] = &[];
        assert!(comlogger(dat).next().is_none());
    }

    #[test]
    fn corrupt_prefix_degrades_to_truncation() {
        // A u32 prefix declaring 4 GiB with 2 bytes behind it
        let mut dat = 0xffff_ffffu32.to_le_bytes().to_vec();
        dat.extend_from_slice(&[0xaa, 0xbb]);
        let mut it = FramedRecords::new(&dat[..], Framing::Gds, Endian::Little);

        let err = it.next().unwrap().unwrap_err();
        match err {
            Error::Truncated {
                declared,
                available,
            } => {
                assert_eq!(declared, 0xffff_ffff);
                assert_eq!(available, 2);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
        assert!(it.next().is_none());
    }

    #[test]
    fn big_endian_prefix_policy() {
        let dat: &[u8] = &[0x00, 0x01, 0xaa];
        let records: Vec<RawRecord> = FramedRecords::new(dat, Framing::ComLogger, Endian::Big)
            .map(Result::unwrap)
            .collect();
        assert_eq!(records[0].data, vec![0xaa]);
    }
}
