//! The decode pipeline: framing composed with packet decoding.
//!
//! [Decoder] produces a lazy pull sequence of [Record]s in exact input
//! order. Per-record faults ride on the records; only stream-level failures
//! (I/O, truncation) surface as `Err` items, and truncation ends the
//! sequence.
use std::io::Read;
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{bounded, unbounded, Receiver};
use tracing::{debug, trace};

use crate::bytes::{Cursor, Endian};
use crate::dictionary::Dictionary;
use crate::framing::{FramedRecords, Framing};
use crate::packet::{decode_packet, decode_parameter_entry, Record};
use crate::{Fault, Result};

/// Decodes a log stream into [Record]s.
///
/// The framing convention is fixed at construction. Decoding is sequential
/// by default; [with_decode_threads](Self::with_decode_threads) moves
/// per-record decoding onto a worker pool, since each framed slice is a pure
/// function of its bytes plus the shared read-only dictionary. Output order
/// is always input order.
///
/// # Example
/// ```no_run
/// use std::fs::File;
/// use std::sync::Arc;
/// use fplog::{Decoder, Framing};
/// use fplog::dictionary::Dictionary;
///
/// let dict = Arc::new(Dictionary::builder().build().unwrap());
/// let file = File::open("FswPkt.com").unwrap();
/// for zult in Decoder::new(Framing::ComLogger).decode(dict, file) {
///     let record = zult.unwrap();
///     println!("{:?}", record.fault());
/// }
/// ```
pub struct Decoder {
    framing: Framing,
    endian: Endian,
    num_threads: Option<u32>,
}

impl Decoder {
    const CHANNEL_CAPACITY: usize = 1024;

    pub fn new(framing: Framing) -> Self {
        Decoder {
            framing,
            endian: Endian::Little,
            num_threads: None,
        }
    }

    /// Set the stream-wide byte order. Defaults to little-endian.
    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    /// Decode framed records on `num` worker threads instead of inline.
    ///
    /// Parameter files ignore this; their entries can only be delimited by
    /// decoding them in order.
    pub fn with_decode_threads(mut self, num: u32) -> Self {
        self.num_threads = Some(num);
        self
    }

    /// Returns a lazy iterator of decoded records.
    ///
    /// Dropping the iterator early stops all reading; no background work is
    /// left outstanding.
    pub fn decode<R>(self, dict: Arc<Dictionary>, reader: R) -> Box<dyn Iterator<Item = Result<Record>> + Send>
    where
        R: Read + Send + 'static,
    {
        match self.framing {
            Framing::PrmDb => Box::new(ParameterEntries {
                dict,
                reader: Some(reader),
                endian: self.endian,
                buf: Vec::new(),
                pos: 0,
                done: false,
            }),
            framing => match self.num_threads {
                None => {
                    let endian = self.endian;
                    Box::new(
                        FramedRecords::new(reader, framing, endian).map(move |zult| {
                            zult.and_then(|raw| decode_packet(&dict, &raw.data, endian))
                        }),
                    )
                }
                Some(num) => Box::new(self.decode_pooled(dict, reader, num)),
            },
        }
    }

    fn decode_pooled<R>(self, dict: Arc<Dictionary>, reader: R, num_threads: u32) -> PooledRecordIter
    where
        R: Read + Send + 'static,
    {
        let (jobs_tx, jobs_rx) = bounded(Self::CHANNEL_CAPACITY);
        let endian = self.endian;
        let framing = self.framing;

        let handle = thread::Builder::new()
            .name("record_decoder".into())
            .spawn(move || {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(num_threads as usize)
                    .build()
                    .expect("failed to construct decode threadpool with requested number of threads");

                for (idx, zult) in FramedRecords::new(reader, framing, endian).enumerate() {
                    let (future_tx, future_rx) = unbounded();

                    match zult {
                        Ok(raw) => {
                            let dict = dict.clone();
                            // spawn_fifo plus the jobs queue keeps record order
                            pool.spawn_fifo(move || {
                                let zult = decode_packet(&dict, &raw.data, endian);
                                if future_tx.send(zult).is_err() {
                                    debug!(record_idx = idx, "failed to send decoded record");
                                }
                            });
                        }
                        Err(err) => {
                            if future_tx.send(Err(err)).is_err() {
                                debug!(record_idx = idx, "failed to send framing error");
                            }
                        }
                    }

                    if jobs_tx.send(future_rx).is_err() {
                        // Consumer hung up; stop framing
                        trace!(record_idx = idx, "consumer gone, stopping");
                        break;
                    }
                }
            })
            .expect("failed to spawn record decoder thread");

        PooledRecordIter {
            jobs: jobs_rx,
            handle: Some(handle),
        }
    }
}

/// Convenience for the common single-threaded, little-endian decode.
pub fn decode_records<R>(
    dict: Arc<Dictionary>,
    reader: R,
    framing: Framing,
) -> Box<dyn Iterator<Item = Result<Record>> + Send>
where
    R: Read + Send + 'static,
{
    Decoder::new(framing).decode(dict, reader)
}

/// Provides decoded records from the worker pool in input order.
struct PooledRecordIter {
    jobs: Receiver<Receiver<Result<Record>>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Iterator for PooledRecordIter {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.jobs.recv() {
            Err(_) => {
                if let Some(handle) = self.handle.take() {
                    handle.join().expect("record decoder thread panicked");
                }
                None
            }
            Ok(rx) => Some(rx.recv().expect("failed to receive decoded record")),
        }
    }
}

/// Iterator over parameter database entries.
///
/// Entries carry no size prefix, so the whole stream is buffered up front
/// and delimited by decoding each entry against the dictionary.
struct ParameterEntries<R> {
    dict: Arc<Dictionary>,
    reader: Option<R>,
    endian: Endian,
    buf: Vec<u8>,
    pos: usize,
    done: bool,
}

impl<R: Read> Iterator for ParameterEntries<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(mut reader) = self.reader.take() {
            if let Err(err) = reader.read_to_end(&mut self.buf) {
                self.done = true;
                return Some(Err(err.into()));
            }
        }
        if self.pos == self.buf.len() {
            // Cut exactly on an entry boundary: clean end of stream
            self.done = true;
            return None;
        }

        let mut cur = Cursor::new(&self.buf[self.pos..], self.endian);
        match decode_parameter_entry(&self.dict, &mut cur) {
            Ok(prm) => {
                self.pos += cur.position();
                match prm.fault {
                    // An unknown id or a value underflow both leave the
                    // entry's extent unknowable, so there is no way to find
                    // the next entry boundary. Parsing the leftover tail
                    // would fabricate records from misaligned bytes.
                    Some(Fault::UnknownId { .. }) | Some(Fault::Underflow { .. }) => {
                        debug!(id = prm.id, "cannot delimit next parameter entry");
                        self.done = true;
                    }
                    _ => {}
                }
                Some(Ok(Record::Parameter(prm)))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
