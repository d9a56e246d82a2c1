//! F Prime dictionary type registry.
//!
//! A [Dictionary] is the in-memory form of a flight-software build's type
//! schema: every telemetry channel, event, and parameter by numeric id, and
//! every named type they reference. It is built once from the externally
//! parsed dictionary source, validated, and then shared read-only across all
//! decoding.
use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use crate::{Error, Result};

/// Index of a type in the dictionary's descriptor arena.
///
/// Composite types reference their members by `TypeRef` rather than by
/// nesting owned descriptors, which keeps the arena flat and lets the
/// builder resolve forward references.
pub type TypeRef = usize;

pub type ChannelId = u32;
pub type EventId = u32;
pub type ParameterId = u32;

/// Fixed-width machine type.
///
/// `Bool` is one byte on the wire: `0x00` is false, any other value is true.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Primitive {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Bool,
}

impl Primitive {
    /// Encoded width in bytes.
    pub fn width(&self) -> usize {
        use Primitive::*;
        match self {
            U8 | I8 | Bool => 1,
            U16 | I16 => 2,
            U32 | I32 | F32 => 4,
            U64 | I64 | F64 => 8,
        }
    }

    pub fn is_integer(&self) -> bool {
        !matches!(self, Primitive::F32 | Primitive::F64 | Primitive::Bool)
    }

    pub fn is_unsigned_integer(&self) -> bool {
        matches!(
            self,
            Primitive::U8 | Primitive::U16 | Primitive::U32 | Primitive::U64
        )
    }
}

/// Describes how to decode one value.
#[derive(Debug, Clone)]
pub enum TypeDef {
    Primitive(Primitive),
    /// Integer of `repr`'s width with symbolic names for known raw values.
    /// Raw values without an entry still decode; they are carried as
    /// unrecognized rather than failing, since dictionary/firmware version
    /// skew is routine.
    Enum {
        repr: Primitive,
        entries: HashMap<i64, String>,
    },
    /// `count` elements of `element`, back to back. The count is fixed by the
    /// schema, not encoded in the stream.
    Array { element: TypeRef, count: usize },
    /// Unsigned length prefix of `prefix`'s width followed by that many bytes
    /// of single-byte-encoded text.
    Text { prefix: Primitive },
    /// Fields in declaration order, packed with no padding or alignment.
    Struct { fields: Vec<(String, TypeRef)> },
}

/// Event severity classification from the dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Fatal,
    WarningHi,
    WarningLo,
    Command,
    ActivityHi,
    ActivityLo,
    Diagnostic,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelDef {
    pub id: ChannelId,
    pub component: String,
    pub name: String,
    #[serde(skip)]
    pub ty: TypeRef,
}

impl ChannelDef {
    /// `component.name`, the human readable identity of this channel.
    pub fn topology_name(&self) -> String {
        format!("{}.{}", self.component, self.name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EventArg {
    pub name: String,
    #[serde(skip)]
    pub ty: TypeRef,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventDef {
    pub id: EventId,
    pub component: String,
    pub name: String,
    pub severity: Severity,
    /// Arguments in declaration order; the order defines the wire layout.
    pub args: Vec<EventArg>,
}

impl EventDef {
    pub fn topology_name(&self) -> String {
        format!("{}.{}", self.component, self.name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParameterDef {
    pub id: ParameterId,
    pub component: String,
    pub name: String,
    #[serde(skip)]
    pub ty: TypeRef,
}

impl ParameterDef {
    pub fn topology_name(&self) -> String {
        format!("{}.{}", self.component, self.name)
    }
}

/// Immutable registry of types, channels, events, and parameters.
///
/// Channel, event, and parameter ids are independent namespaces. Decoders
/// take the dictionary as a shared read-only handle; nothing here is mutated
/// after [DictionaryBuilder::build].
#[derive(Debug, Clone)]
pub struct Dictionary {
    types: Vec<TypeDef>,
    by_name: HashMap<String, TypeRef>,
    channels: HashMap<ChannelId, ChannelDef>,
    events: HashMap<EventId, EventDef>,
    parameters: HashMap<ParameterId, ParameterDef>,
}

impl Dictionary {
    pub fn builder() -> DictionaryBuilder {
        DictionaryBuilder::new()
    }

    /// Resolve a type name to its arena index.
    pub fn type_ref(&self, name: &str) -> Option<TypeRef> {
        self.by_name.get(name).copied()
    }

    /// Descriptor for `ty`.
    ///
    /// # Panics
    /// If `ty` did not come from this dictionary.
    pub fn typedef(&self, ty: TypeRef) -> &TypeDef {
        &self.types[ty]
    }

    pub fn channel(&self, id: ChannelId) -> Option<&ChannelDef> {
        self.channels.get(&id)
    }

    pub fn event(&self, id: EventId) -> Option<&EventDef> {
        self.events.get(&id)
    }

    pub fn parameter(&self, id: ParameterId) -> Option<&ParameterDef> {
        self.parameters.get(&id)
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn num_events(&self) -> usize {
        self.events.len()
    }

    pub fn num_parameters(&self) -> usize {
        self.parameters.len()
    }
}

enum RawType {
    Enum {
        repr: String,
        entries: Vec<(i64, String)>,
    },
    Array {
        element: String,
        count: usize,
    },
    Text {
        prefix: String,
    },
    Struct {
        fields: Vec<(String, String)>,
    },
}

struct RawChannel {
    id: ChannelId,
    component: String,
    name: String,
    ty: String,
}

struct RawEvent {
    id: EventId,
    component: String,
    name: String,
    severity: Severity,
    args: Vec<(String, String)>,
}

struct RawParameter {
    id: ParameterId,
    component: String,
    name: String,
    ty: String,
}

/// Builds a [Dictionary] from definitions that reference each other by name.
///
/// Forward references are fine; names are resolved to arena indices at
/// [build](Self::build) time. The fundamental F Prime types (`U8`..`F64`,
/// `bool`, `string`) and the standard framework aliases (`FwChanIdType` and
/// friends) are pre-registered.
///
/// # Example
/// ```
/// use fplog::dictionary::{Dictionary, Severity};
///
/// let dict = Dictionary::builder()
///     .array_type("Vec3", "F32", 3)
///     .channel(100, "gnc", "velocity", "Vec3")
///     .event(5, "health", "PingOk", Severity::ActivityLo, &[])
///     .build()
///     .unwrap();
/// assert_eq!(dict.channel(100).unwrap().topology_name(), "gnc.velocity");
/// ```
pub struct DictionaryBuilder {
    raw_types: Vec<(String, RawType)>,
    channels: Vec<RawChannel>,
    events: Vec<RawEvent>,
    parameters: Vec<RawParameter>,
}

impl Default for DictionaryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Fundamental type names every dictionary starts with.
const FUNDAMENTALS: &[(&str, Primitive)] = &[
    ("U8", Primitive::U8),
    ("U16", Primitive::U16),
    ("U32", Primitive::U32),
    ("U64", Primitive::U64),
    ("I8", Primitive::I8),
    ("I16", Primitive::I16),
    ("I32", Primitive::I32),
    ("I64", Primitive::I64),
    ("F32", Primitive::F32),
    ("F64", Primitive::F64),
    ("bool", Primitive::Bool),
];

/// Framework aliases for the configurable F Prime id and store types, bound
/// to their default representations.
const ALIASES: &[(&str, &str)] = &[
    ("FwBuffSizeType", "U16"),
    ("FwChanIdType", "U32"),
    ("FwEnumStoreType", "I32"),
    ("FwEventIdType", "U32"),
    ("FwOpcodeType", "U32"),
    ("FwPacketDescriptorType", "U32"),
    ("FwPrmIdType", "U32"),
    ("FwTimeBaseStoreType", "U16"),
    ("FwTimeContextStoreType", "U8"),
];

impl DictionaryBuilder {
    pub fn new() -> Self {
        DictionaryBuilder {
            raw_types: Vec::new(),
            channels: Vec::new(),
            events: Vec::new(),
            parameters: Vec::new(),
        }
    }

    /// Define an enum backed by the integer primitive named `repr`.
    pub fn enum_type(mut self, name: &str, repr: &str, entries: &[(i64, &str)]) -> Self {
        self.raw_types.push((
            name.to_string(),
            RawType::Enum {
                repr: repr.to_string(),
                entries: entries
                    .iter()
                    .map(|(raw, sym)| (*raw, (*sym).to_string()))
                    .collect(),
            },
        ));
        self
    }

    /// Define a fixed-size array of `count` elements of the type named
    /// `element`.
    pub fn array_type(mut self, name: &str, element: &str, count: usize) -> Self {
        self.raw_types.push((
            name.to_string(),
            RawType::Array {
                element: element.to_string(),
                count,
            },
        ));
        self
    }

    /// Define a length-prefixed string type whose prefix is the unsigned
    /// integer primitive named `prefix`.
    pub fn text_type(mut self, name: &str, prefix: &str) -> Self {
        self.raw_types.push((
            name.to_string(),
            RawType::Text {
                prefix: prefix.to_string(),
            },
        ));
        self
    }

    /// Define a composite struct; field order is wire order.
    pub fn struct_type(mut self, name: &str, fields: &[(&str, &str)]) -> Self {
        self.raw_types.push((
            name.to_string(),
            RawType::Struct {
                fields: fields
                    .iter()
                    .map(|(f, t)| ((*f).to_string(), (*t).to_string()))
                    .collect(),
            },
        ));
        self
    }

    pub fn channel(mut self, id: ChannelId, component: &str, name: &str, ty: &str) -> Self {
        self.channels.push(RawChannel {
            id,
            component: component.to_string(),
            name: name.to_string(),
            ty: ty.to_string(),
        });
        self
    }

    pub fn event(
        mut self,
        id: EventId,
        component: &str,
        name: &str,
        severity: Severity,
        args: &[(&str, &str)],
    ) -> Self {
        self.events.push(RawEvent {
            id,
            component: component.to_string(),
            name: name.to_string(),
            severity,
            args: args
                .iter()
                .map(|(a, t)| ((*a).to_string(), (*t).to_string()))
                .collect(),
        });
        self
    }

    pub fn parameter(mut self, id: ParameterId, component: &str, name: &str, ty: &str) -> Self {
        self.parameters.push(RawParameter {
            id,
            component: component.to_string(),
            name: name.to_string(),
            ty: ty.to_string(),
        });
        self
    }

    /// Resolve all name references and produce the immutable registry.
    ///
    /// # Errors
    /// [Error::Schema] for unresolvable type names, non-integer enum
    /// representations, non-unsigned-integer string prefixes, or cyclic type
    /// references.
    pub fn build(self) -> Result<Dictionary> {
        let mut resolver = Resolver::new(&self.raw_types);

        let mut channels = HashMap::new();
        for c in &self.channels {
            let ty = resolver.resolve(&c.ty)?;
            let def = ChannelDef {
                id: c.id,
                component: c.component.clone(),
                name: c.name.clone(),
                ty,
            };
            if let Some(prev) = channels.insert(c.id, def) {
                warn!(id = c.id, name = %prev.topology_name(), "channel id redefined");
            }
        }

        let mut events = HashMap::new();
        for e in &self.events {
            let mut args = Vec::with_capacity(e.args.len());
            for (name, ty) in &e.args {
                args.push(EventArg {
                    name: name.clone(),
                    ty: resolver.resolve(ty)?,
                });
            }
            let def = EventDef {
                id: e.id,
                component: e.component.clone(),
                name: e.name.clone(),
                severity: e.severity,
                args,
            };
            if let Some(prev) = events.insert(e.id, def) {
                warn!(id = e.id, name = %prev.topology_name(), "event id redefined");
            }
        }

        let mut parameters = HashMap::new();
        for p in &self.parameters {
            let ty = resolver.resolve(&p.ty)?;
            let def = ParameterDef {
                id: p.id,
                component: p.component.clone(),
                name: p.name.clone(),
                ty,
            };
            if let Some(prev) = parameters.insert(p.id, def) {
                warn!(id = p.id, name = %prev.topology_name(), "parameter id redefined");
            }
        }

        // Named types not reachable from any channel/event/parameter are
        // still resolved so schema faults surface here, not at decode time.
        for (name, _) in &self.raw_types {
            resolver.resolve(name)?;
        }

        let Resolver {
            types, by_name, ..
        } = resolver;

        Ok(Dictionary {
            types,
            by_name,
            channels,
            events,
            parameters,
        })
    }
}

/// Memoized name-to-arena resolution with cycle detection.
struct Resolver<'a> {
    raw: HashMap<&'a str, &'a RawType>,
    types: Vec<TypeDef>,
    by_name: HashMap<String, TypeRef>,
    in_progress: Vec<String>,
}

impl<'a> Resolver<'a> {
    fn new(raw_types: &'a [(String, RawType)]) -> Self {
        let mut raw: HashMap<&str, &RawType> = HashMap::new();
        for (name, ty) in raw_types {
            if raw.insert(name.as_str(), ty).is_some() {
                warn!(name = %name, "type redefined, later definition wins");
            }
        }

        let mut types = Vec::new();
        let mut by_name = HashMap::new();
        for (name, prim) in FUNDAMENTALS {
            types.push(TypeDef::Primitive(*prim));
            by_name.insert((*name).to_string(), types.len() - 1);
        }
        for (alias, target) in ALIASES {
            let idx = by_name[*target];
            by_name.insert((*alias).to_string(), idx);
        }
        // The default F Prime string: FwBuffSizeType length then the bytes.
        types.push(TypeDef::Text {
            prefix: Primitive::U16,
        });
        by_name.insert("string".to_string(), types.len() - 1);

        Resolver {
            raw,
            types,
            by_name,
            in_progress: Vec::new(),
        }
    }

    fn primitive(&mut self, name: &str) -> Result<Primitive> {
        let idx = self.resolve(name)?;
        match self.types[idx] {
            TypeDef::Primitive(p) => Ok(p),
            _ => Err(Error::Schema(format!("type '{name}' is not a primitive"))),
        }
    }

    fn resolve(&mut self, name: &str) -> Result<TypeRef> {
        if let Some(idx) = self.by_name.get(name) {
            return Ok(*idx);
        }
        if self.in_progress.iter().any(|n| n == name) {
            return Err(Error::Schema(format!(
                "cycle in type definitions involving '{name}'"
            )));
        }
        let Some(raw) = self.raw.get(name).copied() else {
            return Err(Error::Schema(format!("unknown type '{name}'")));
        };

        self.in_progress.push(name.to_string());
        let def = match raw {
            RawType::Enum { repr, entries } => {
                let repr = self.primitive(repr)?;
                if !repr.is_integer() {
                    return Err(Error::Schema(format!(
                        "enum '{name}' representation '{repr:?}' is not an integer"
                    )));
                }
                TypeDef::Enum {
                    repr,
                    entries: entries.iter().map(|(r, s)| (*r, s.clone())).collect(),
                }
            }
            RawType::Array { element, count } => TypeDef::Array {
                element: self.resolve(element)?,
                count: *count,
            },
            RawType::Text { prefix } => {
                let prefix = self.primitive(prefix)?;
                if !prefix.is_unsigned_integer() {
                    return Err(Error::Schema(format!(
                        "string '{name}' length prefix '{prefix:?}' is not an unsigned integer"
                    )));
                }
                TypeDef::Text { prefix }
            }
            RawType::Struct { fields } => {
                let mut resolved = Vec::with_capacity(fields.len());
                for (field, ty) in fields {
                    resolved.push((field.clone(), self.resolve(ty)?));
                }
                TypeDef::Struct { fields: resolved }
            }
        };
        self.in_progress.pop();

        self.types.push(def);
        let idx = self.types.len() - 1;
        self.by_name.insert(name.to_string(), idx);
        Ok(idx)
    }
}
