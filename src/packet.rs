//! Packet decoding.
//!
//! One framed record is one packet: a 4 byte descriptor tag, a 4 byte id,
//! the 11 byte time field, then a payload whose shape only the dictionary
//! knows. Parameter database entries skip the descriptor and are decoded by
//! [decode_parameter_entry].
use serde::Serialize;
use tracing::warn;

use crate::bytes::{Cursor, Endian};
use crate::dictionary::{ChannelDef, ChannelId, Dictionary, EventDef, EventId, ParameterDef, ParameterId};
use crate::time::Time;
use crate::value::{decode_value, Value};
use crate::{Error, Fault, Result};

/// Packet descriptor tag for a telemetry channel sample.
pub const DESCRIPTOR_TELEMETRY: u32 = 1;
/// Packet descriptor tag for an event (log) packet.
pub const DESCRIPTOR_EVENT: u32 = 2;

/// One decoded record.
///
/// New packet kinds extend this enum; anything with an unhandled descriptor
/// tag lands in [Record::Unknown] with its raw bytes intact.
#[derive(Debug, Clone, Serialize)]
pub enum Record {
    Telemetry(TelemetryRecord),
    Event(EventRecord),
    Parameter(ParameterRecord),
    Unknown(UnknownRecord),
}

impl Record {
    /// The per-record fault, if decoding hit one.
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Record::Telemetry(r) => r.fault.as_ref(),
            Record::Event(r) => r.fault.as_ref(),
            Record::Parameter(r) => r.fault.as_ref(),
            Record::Unknown(r) => Some(&r.fault),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.fault().is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TelemetryRecord {
    pub id: ChannelId,
    /// Resolved channel definition, `None` when the id is not in the
    /// dictionary.
    pub channel: Option<ChannelDef>,
    pub time: Time,
    pub value: Option<Value>,
    pub fault: Option<Fault>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub id: EventId,
    pub event: Option<EventDef>,
    pub time: Time,
    /// `(argument name, value)` in declaration order. Partial when argument
    /// decoding underflowed; `None` when the id is unresolved.
    pub arguments: Option<Vec<(String, Value)>>,
    pub fault: Option<Fault>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParameterRecord {
    pub id: ParameterId,
    /// Component name carried by the entry itself.
    pub component: String,
    pub parameter: Option<ParameterDef>,
    pub value: Option<Value>,
    pub fault: Option<Fault>,
}

/// A record whose descriptor tag is neither telemetry nor event.
///
/// The payload shape is unknowable, so the remaining bytes are kept raw.
#[derive(Debug, Clone, Serialize)]
pub struct UnknownRecord {
    pub tag: u32,
    pub data: Vec<u8>,
    pub fault: Fault,
}

/// Flag a size mismatch unless decoding already faulted.
fn check_size(cur: &Cursor, declared: usize, fault: &mut Option<Fault>) {
    if fault.is_none() && cur.position() != declared {
        *fault = Some(Fault::SizeMismatch {
            decoded: cur.position(),
            declared,
        });
    }
}

/// Decode one framed record into a [Record].
///
/// Per-record problems (unknown descriptor tag, unresolved id, payload size
/// mismatch, payload underflow) are reported on the record itself so the
/// stream keeps flowing; see [Fault].
///
/// # Errors
/// [Error::Underflow] if the record is too short for even its descriptor,
/// id, and time fields.
pub fn decode_packet(dict: &Dictionary, data: &[u8], endian: Endian) -> Result<Record> {
    let declared = data.len();
    let mut cur = Cursor::new(data, endian);

    let tag = cur.read_u32()?;
    match tag {
        DESCRIPTOR_TELEMETRY => {
            let id = cur.read_u32()?;
            let time = Time::decode(&mut cur)?;
            let mut fault = None;
            let (channel, value) = match dict.channel(id) {
                None => {
                    // Cannot know the payload shape without a type, so value
                    // decoding stops here. The time field is still returned.
                    warn!(id, "channel id not in dictionary");
                    fault = Some(Fault::UnknownId { id });
                    (None, None)
                }
                Some(chan) => {
                    let value = match decode_value(dict, chan.ty, &mut cur) {
                        Ok(v) => Some(v),
                        Err(Error::Underflow { wanted, available }) => {
                            fault = Some(Fault::Underflow { wanted, available });
                            None
                        }
                        Err(err) => return Err(err),
                    };
                    (Some(chan.clone()), value)
                }
            };
            if channel.is_some() {
                check_size(&cur, declared, &mut fault);
            }
            Ok(Record::Telemetry(TelemetryRecord {
                id,
                channel,
                time,
                value,
                fault,
            }))
        }
        DESCRIPTOR_EVENT => {
            let id = cur.read_u32()?;
            let time = Time::decode(&mut cur)?;
            let mut fault = None;
            let (event, arguments) = match dict.event(id) {
                None => {
                    warn!(id, "event id not in dictionary");
                    fault = Some(Fault::UnknownId { id });
                    (None, None)
                }
                Some(evt) => {
                    // Zero declared arguments decode zero payload bytes
                    let mut args = Vec::with_capacity(evt.args.len());
                    for arg in &evt.args {
                        match decode_value(dict, arg.ty, &mut cur) {
                            Ok(v) => args.push((arg.name.clone(), v)),
                            Err(Error::Underflow { wanted, available }) => {
                                fault = Some(Fault::Underflow { wanted, available });
                                break;
                            }
                            Err(err) => return Err(err),
                        }
                    }
                    (Some(evt.clone()), Some(args))
                }
            };
            if event.is_some() {
                check_size(&cur, declared, &mut fault);
            }
            Ok(Record::Event(EventRecord {
                id,
                event,
                time,
                arguments,
                fault,
            }))
        }
        tag => {
            warn!(tag, "unknown packet descriptor");
            Ok(Record::Unknown(UnknownRecord {
                tag,
                data: cur.take_rest().to_vec(),
                fault: Fault::UnknownPacketKind { tag },
            }))
        }
    }
}

/// Decode one parameter database entry from `cur`.
///
/// Entries carry no outer size: a length-prefixed component name, the
/// parameter id, then the value in the parameter's registered type. With an
/// unresolvable id the entry's extent is unknowable, so the caller must stop
/// framing after a [Fault::UnknownId] here.
///
/// # Errors
/// [Error::Underflow] if the stream ends inside the component name or id.
pub fn decode_parameter_entry(dict: &Dictionary, cur: &mut Cursor) -> Result<ParameterRecord> {
    let name_len = usize::from(cur.read_u16()?);
    let component: String = cur.take(name_len)?.iter().map(|&b| char::from(b)).collect();
    let id = cur.read_u32()?;

    let mut fault = None;
    let (parameter, value) = match dict.parameter(id) {
        None => {
            warn!(id, "parameter id not in dictionary");
            fault = Some(Fault::UnknownId { id });
            (None, None)
        }
        Some(prm) => {
            let value = match decode_value(dict, prm.ty, cur) {
                Ok(v) => Some(v),
                Err(Error::Underflow { wanted, available }) => {
                    fault = Some(Fault::Underflow { wanted, available });
                    None
                }
                Err(err) => return Err(err),
            };
            (Some(prm.clone()), value)
        }
    };

    Ok(ParameterRecord {
        id,
        component,
        parameter,
        value,
        fault,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::Severity;

    fn dict() -> Dictionary {
        Dictionary::builder()
            .enum_type("State", "I32", &[(0, "OFF"), (1, "ON")])
            .channel(100, "power", "voltage", "F32")
            .channel(101, "power", "state", "State")
            .event(5, "health", "Ping", Severity::ActivityLo, &[])
            .event(6, "cmdDisp", "Dispatched", Severity::Command, &[("Opcode", "U32"), ("Ok", "bool")])
            .parameter(12, "gnc", "gain", "U16")
            .build()
            .unwrap()
    }

    #[test]
    fn minimal_event_packet() {
        // The documented 19 byte zero-argument event packet
        #[rustfmt::skip]
        let dat = [
            0x02, 0x00, 0x00, 0x00, // descriptor: event
            0x05, 0x00, 0x00, 0x00, // event id 5
            0x01, 0x00, 0x02,       // time base 1, context 2
            0x64, 0x00, 0x00, 0x00, // 100 s
            0xf4, 0x01, 0x00, 0x00, // 500 us
        ];
        let rec = decode_packet(&dict(), &dat, Endian::Little).unwrap();

        let Record::Event(evt) = rec else {
            panic!("expected event record");
        };
        assert_eq!(evt.id, 5);
        assert_eq!(evt.time.base, 1);
        assert_eq!(evt.time.context, 2);
        assert_eq!(evt.time.seconds, 100);
        assert_eq!(evt.time.microseconds, 500);
        assert_eq!(evt.arguments, Some(vec![]));
        assert_eq!(evt.event.as_ref().unwrap().topology_name(), "health.Ping");
        assert!(evt.fault.is_none());
    }

    #[test]
    fn event_arguments_decode_in_order() {
        #[rustfmt::skip]
        let dat = [
            0x02, 0x00, 0x00, 0x00,
            0x06, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x0a, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x34, 0x12, 0x00, 0x00, // Opcode 0x1234
            0xff,                   // Ok true
        ];
        let rec = decode_packet(&dict(), &dat, Endian::Little).unwrap();

        let Record::Event(evt) = rec else {
            panic!("expected event record");
        };
        assert!(evt.fault.is_none());
        assert_eq!(
            evt.arguments,
            Some(vec![
                ("Opcode".to_string(), Value::Unsigned(0x1234)),
                ("Ok".to_string(), Value::Bool(true)),
            ])
        );
    }

    #[test]
    fn telemetry_packet_with_enum_value() {
        #[rustfmt::skip]
        let dat = [
            0x01, 0x00, 0x00, 0x00, // descriptor: telemetry
            0x65, 0x00, 0x00, 0x00, // channel 101
            0x01, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00, // State::ON
        ];
        let rec = decode_packet(&dict(), &dat, Endian::Little).unwrap();

        let Record::Telemetry(tlm) = rec else {
            panic!("expected telemetry record");
        };
        assert!(tlm.fault.is_none());
        assert_eq!(tlm.channel.as_ref().unwrap().topology_name(), "power.state");
        assert_eq!(tlm.value.as_ref().unwrap().enum_name(), Some("ON"));
    }

    #[test]
    fn unknown_descriptor_keeps_raw_payload() {
        #[rustfmt::skip]
        let dat = [
            0x03, 0x00, 0x00, 0x00, // descriptor 3: not telemetry or event
            0xaa, 0xbb,
        ];
        let rec = decode_packet(&dict(), &dat, Endian::Little).unwrap();

        let Record::Unknown(unk) = rec else {
            panic!("expected unknown record");
        };
        assert_eq!(unk.tag, 3);
        assert_eq!(unk.data, vec![0xaa, 0xbb]);
        assert_eq!(unk.fault, Fault::UnknownPacketKind { tag: 3 });
    }

    #[test]
    fn unresolved_channel_id_still_returns_time() {
        #[rustfmt::skip]
        let dat = [
            0x01, 0x00, 0x00, 0x00,
            0xff, 0x00, 0x00, 0x00, // channel 255: not in dictionary
            0x02, 0x00, 0x07,
            0x2a, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0xde, 0xad, // undecodable payload
        ];
        let rec = decode_packet(&dict(), &dat, Endian::Little).unwrap();

        let Record::Telemetry(tlm) = rec else {
            panic!("expected telemetry record");
        };
        assert_eq!(tlm.fault, Some(Fault::UnknownId { id: 255 }));
        assert!(tlm.channel.is_none());
        assert!(tlm.value.is_none());
        // Time decoding needs no dictionary lookup
        assert_eq!(tlm.time.base, 2);
        assert_eq!(tlm.time.seconds, 42);
    }

    #[test]
    fn size_mismatch_keeps_decoded_value() {
        // Channel 100 is F32 (4 bytes) but the record carries 6 extra bytes
        #[rustfmt::skip]
        let dat = [
            0x01, 0x00, 0x00, 0x00,
            0x64, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x80, 0x3f, // 1.0f
            0xde, 0xad,             // trailing garbage
        ];
        let rec = decode_packet(&dict(), &dat, Endian::Little).unwrap();

        let Record::Telemetry(tlm) = rec else {
            panic!("expected telemetry record");
        };
        assert_eq!(
            tlm.fault,
            Some(Fault::SizeMismatch {
                decoded: 23,
                declared: 25
            })
        );
        // Partial results survive the fault
        assert_eq!(tlm.value, Some(Value::Float(1.0)));
    }

    #[test]
    fn event_payload_underflow_keeps_partial_arguments() {
        #[rustfmt::skip]
        let dat = [
            0x02, 0x00, 0x00, 0x00,
            0x06, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x34, 0x12, 0x00, 0x00, // Opcode decodes fine
                                    // Ok is missing
        ];
        let rec = decode_packet(&dict(), &dat, Endian::Little).unwrap();

        let Record::Event(evt) = rec else {
            panic!("expected event record");
        };
        assert!(matches!(evt.fault, Some(Fault::Underflow { .. })));
        assert_eq!(
            evt.arguments,
            Some(vec![("Opcode".to_string(), Value::Unsigned(0x1234))])
        );
    }

    #[test]
    fn record_too_short_for_header_is_underflow() {
        let dat = [0x01, 0x00];
        let err = decode_packet(&dict(), &dat, Endian::Little).unwrap_err();
        assert!(matches!(err, Error::Underflow { .. }), "got {err:?}");
    }

    #[test]
    fn parameter_entry() {
        #[rustfmt::skip]
        let dat = [
            0x03, 0x00, b'g', b'n', b'c', // component name
            0x0c, 0x00, 0x00, 0x00,       // parameter id 12
            0x2c, 0x01,                   // U16 value 300
        ];
        let mut cur = Cursor::new(&dat, Endian::Little);
        let prm = decode_parameter_entry(&dict(), &mut cur).unwrap();

        assert!(prm.fault.is_none());
        assert_eq!(prm.component, "gnc");
        assert_eq!(prm.id, 12);
        assert_eq!(prm.parameter.as_ref().unwrap().topology_name(), "gnc.gain");
        assert_eq!(prm.value, Some(Value::Unsigned(300)));
        assert!(cur.is_empty());
    }

    #[test]
    fn parameter_entry_with_unknown_id() {
        #[rustfmt::skip]
        let dat = [
            0x03, 0x00, b'g', b'n', b'c',
            0x63, 0x00, 0x00, 0x00, // parameter id 99: unknown
            0x2c, 0x01,
        ];
        let mut cur = Cursor::new(&dat, Endian::Little);
        let prm = decode_parameter_entry(&dict(), &mut cur).unwrap();

        assert_eq!(prm.fault, Some(Fault::UnknownId { id: 99 }));
        assert!(prm.value.is_none());
    }
}
