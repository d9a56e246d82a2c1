//! Dictionary-driven value decoding.
//!
//! [decode_value] walks a [TypeDef](crate::dictionary::TypeDef) and consumes
//! exactly the bytes that descriptor requires from the cursor, with no
//! look-ahead. Bounds against the enclosing record are the packet decoder's
//! job; the only failure here is running out of bytes mid-field.
use serde::Serialize;

use crate::bytes::Cursor;
use crate::dictionary::{Dictionary, Primitive, TypeDef, TypeRef};
use crate::Result;

/// A decoded semantic value tree.
///
/// Integer widths are erased; the dictionary still knows them if a renderer
/// cares. Struct fields keep declaration order, which downstream tabular
/// output depends on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Bool(bool),
    Signed(i64),
    Unsigned(u64),
    Float(f64),
    Text(String),
    /// Enum raw value with a dictionary mapping.
    Enum { name: String, raw: i64 },
    /// Enum raw value the dictionary does not know. Not a decode failure;
    /// firmware regularly emits values newer than the loaded dictionary.
    UnrecognizedEnum { raw: i64 },
    Array(Vec<Value>),
    Struct(Vec<(String, Value)>),
}

impl Value {
    /// The symbolic enum name, if this is a recognized enum value.
    pub fn enum_name(&self) -> Option<&str> {
        match self {
            Value::Enum { name, .. } => Some(name),
            _ => None,
        }
    }
}

fn decode_integer(prim: Primitive, cur: &mut Cursor) -> Result<i64> {
    Ok(match prim {
        Primitive::U8 => i64::from(cur.read_u8()?),
        Primitive::U16 => i64::from(cur.read_u16()?),
        Primitive::U32 => i64::from(cur.read_u32()?),
        Primitive::U64 => cur.read_u64()? as i64,
        Primitive::I8 => i64::from(cur.read_i8()?),
        Primitive::I16 => i64::from(cur.read_i16()?),
        Primitive::I32 => i64::from(cur.read_i32()?),
        Primitive::I64 => cur.read_i64()?,
        // The builder rejects non-integer enum reprs and string prefixes
        Primitive::F32 | Primitive::F64 | Primitive::Bool => {
            unreachable!("non-integer primitive in integer position")
        }
    })
}

fn decode_primitive(prim: Primitive, cur: &mut Cursor) -> Result<Value> {
    Ok(match prim {
        Primitive::U8 => Value::Unsigned(u64::from(cur.read_u8()?)),
        Primitive::U16 => Value::Unsigned(u64::from(cur.read_u16()?)),
        Primitive::U32 => Value::Unsigned(u64::from(cur.read_u32()?)),
        Primitive::U64 => Value::Unsigned(cur.read_u64()?),
        Primitive::I8 => Value::Signed(i64::from(cur.read_i8()?)),
        Primitive::I16 => Value::Signed(i64::from(cur.read_i16()?)),
        Primitive::I32 => Value::Signed(i64::from(cur.read_i32()?)),
        Primitive::I64 => Value::Signed(cur.read_i64()?),
        Primitive::F32 => Value::Float(f64::from(cur.read_f32()?)),
        Primitive::F64 => Value::Float(cur.read_f64()?),
        // 0x00 is false, anything else is true
        Primitive::Bool => Value::Bool(cur.read_u8()? != 0),
    })
}

/// Decode one value of type `ty` from `cur`.
///
/// # Errors
/// [Error::Underflow](crate::Error::Underflow) if the cursor is exhausted
/// mid-field.
pub fn decode_value(dict: &Dictionary, ty: TypeRef, cur: &mut Cursor) -> Result<Value> {
    match dict.typedef(ty) {
        TypeDef::Primitive(prim) => decode_primitive(*prim, cur),
        TypeDef::Enum { repr, entries } => {
            let raw = decode_integer(*repr, cur)?;
            Ok(match entries.get(&raw) {
                Some(name) => Value::Enum {
                    name: name.clone(),
                    raw,
                },
                None => Value::UnrecognizedEnum { raw },
            })
        }
        TypeDef::Array { element, count } => {
            let mut elements = Vec::with_capacity(*count);
            for _ in 0..*count {
                elements.push(decode_value(dict, *element, cur)?);
            }
            Ok(Value::Array(elements))
        }
        TypeDef::Text { prefix } => {
            let len = match prefix {
                Primitive::U8 => usize::from(cur.read_u8()?),
                Primitive::U16 => usize::from(cur.read_u16()?),
                Primitive::U32 => cur.read_u32()? as usize,
                Primitive::U64 => cur.read_u64()? as usize,
                _ => unreachable!("non-unsigned string length prefix"),
            };
            let raw = cur.take(len)?;
            // Single-byte widening; embedded NUL or non-ASCII bytes are kept
            // as-is rather than failing the decode.
            Ok(Value::Text(raw.iter().map(|&b| char::from(b)).collect()))
        }
        TypeDef::Struct { fields } => {
            let mut out = Vec::with_capacity(fields.len());
            for (name, field_ty) in fields {
                out.push((name.clone(), decode_value(dict, *field_ty, cur)?));
            }
            Ok(Value::Struct(out))
        }
    }
}
