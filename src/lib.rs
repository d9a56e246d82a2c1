#![doc = include_str!("../README.md")]

mod bytes;
mod error;

pub mod decode;
pub mod dictionary;
pub mod framing;
pub mod packet;
pub mod time;
pub mod value;

pub use bytes::{Cursor, Endian};
pub use decode::{decode_records, Decoder};
pub use error::{Error, Fault, Result};
pub use framing::Framing;
pub use packet::Record;
