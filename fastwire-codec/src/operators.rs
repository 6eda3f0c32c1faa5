/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Field operator rules.
//!
//! For every (operator, type, presence) combination this module decides
//! three things on encode: whether a presence map bit is claimed and how it
//! is set, whether raw bytes go on the wire, and how the dictionary entry
//! changes. Decoding is the exact dual, so both sides of a connection track
//! identical dictionaries.

use crate::dictionary::{Dictionary, DictionaryState};
use crate::pmap::PresenceMap;
use crate::reader::{Reader, MAX_BYTES_32, MAX_BYTES_64};
use crate::writer::Writer;
use bytes::Bytes;
use fastwire_core::{BindError, DecodeError, Decimal, EncodeError, FastError, Result, Value};
use fastwire_template::{FieldType, Instruction, Operator};
use std::io::Read;

/// Mutable encode state for the current scope.
pub struct EncodeScope<'a> {
    /// Field byte buffer of the scope.
    pub writer: &'a mut Writer,
    /// Presence map of the scope.
    pub pmap: &'a mut PresenceMap,
    /// Operator dictionary of the codec.
    pub dict: &'a mut Dictionary,
    /// Template governing the message.
    pub template_id: u32,
}

/// Mutable decode state for the current scope.
pub struct DecodeScope<'a, R> {
    /// Wire reader.
    pub reader: &'a mut Reader<R>,
    /// Presence map of the scope.
    pub pmap: &'a mut PresenceMap,
    /// Operator dictionary of the codec.
    pub dict: &'a mut Dictionary,
    /// Template governing the message.
    pub template_id: u32,
}

/// Encodes one scalar field under its operator.
///
/// # Arguments
/// * `scope` - The current scope state
/// * `instr` - The field instruction
/// * `value` - The field value from the message adapter, already coerced
///
/// # Errors
/// Returns the FAST dynamic errors (D3, D5, D6) and range errors defined
/// for the operator rules.
pub fn encode_field(
    scope: &mut EncodeScope<'_>,
    instr: &Instruction,
    value: Option<Value>,
) -> Result<()> {
    match instr.operator {
        Operator::None => encode_none(scope, instr, value),
        Operator::Constant => encode_constant(scope, instr, value),
        Operator::Default => encode_default(scope, instr, value),
        Operator::Copy => encode_copy(scope, instr, value),
        Operator::Increment => encode_increment(scope, instr, value),
        Operator::Delta => encode_delta(scope, instr, value),
        Operator::Tail => encode_tail(scope, instr, value),
    }
}

/// Decodes one scalar field under its operator.
///
/// # Arguments
/// * `scope` - The current scope state
/// * `instr` - The field instruction
///
/// # Errors
/// Returns the FAST dynamic errors (D5, D6, D7) and the structural errors
/// of the wire forms.
pub fn decode_field<R: Read>(
    scope: &mut DecodeScope<'_, R>,
    instr: &Instruction,
) -> Result<Option<Value>> {
    match instr.operator {
        Operator::None => read_value(scope.reader, instr),
        Operator::Constant => decode_constant(scope, instr),
        Operator::Default => decode_default(scope, instr),
        Operator::Copy => decode_copy(scope, instr),
        Operator::Increment => decode_increment(scope, instr),
        Operator::Delta => decode_delta(scope, instr),
        Operator::Tail => decode_tail(scope, instr),
    }
}

// ---------------------------------------------------------------------------
// none
// ---------------------------------------------------------------------------

fn encode_none(
    scope: &mut EncodeScope<'_>,
    instr: &Instruction,
    value: Option<Value>,
) -> Result<()> {
    match value {
        Some(v) => {
            write_value(scope.writer, instr, &v);
            Ok(())
        }
        None if instr.is_nullable() => {
            scope.writer.write_null();
            Ok(())
        }
        None => Err(missing_on_encode(instr)),
    }
}

// ---------------------------------------------------------------------------
// constant
// ---------------------------------------------------------------------------

fn encode_constant(
    scope: &mut EncodeScope<'_>,
    instr: &Instruction,
    value: Option<Value>,
) -> Result<()> {
    // The constant value never travels; a mandatory constant is implied by
    // the template, an optional one claims a presence bit.
    if instr.is_nullable() {
        scope.pmap.append(value.is_some());
    }
    Ok(())
}

fn decode_constant<R: Read>(
    scope: &mut DecodeScope<'_, R>,
    instr: &Instruction,
) -> Result<Option<Value>> {
    if instr.is_nullable() && !scope.pmap.next_bit() {
        return Ok(None);
    }
    constant_initial(instr).map(Some)
}

// ---------------------------------------------------------------------------
// default
// ---------------------------------------------------------------------------

fn encode_default(
    scope: &mut EncodeScope<'_>,
    instr: &Instruction,
    value: Option<Value>,
) -> Result<()> {
    match value {
        Some(v) => {
            if instr.initial.as_ref() == Some(&v) {
                scope.pmap.append(false);
            } else {
                scope.pmap.append(true);
                write_value(scope.writer, instr, &v);
            }
            Ok(())
        }
        None => {
            if !instr.is_nullable() {
                return Err(missing_on_encode(instr));
            }
            if instr.initial.is_none() {
                scope.pmap.append(false);
            } else {
                scope.pmap.append(true);
                scope.writer.write_null();
            }
            Ok(())
        }
    }
}

fn decode_default<R: Read>(
    scope: &mut DecodeScope<'_, R>,
    instr: &Instruction,
) -> Result<Option<Value>> {
    if scope.pmap.next_bit() {
        return read_value(scope.reader, instr);
    }
    match &instr.initial {
        Some(initial) => Ok(Some(initial.clone())),
        None if instr.is_nullable() => Ok(None),
        None => Err(absent_on_decode(instr)),
    }
}

// ---------------------------------------------------------------------------
// copy
// ---------------------------------------------------------------------------

fn encode_copy(
    scope: &mut EncodeScope<'_>,
    instr: &Instruction,
    value: Option<Value>,
) -> Result<()> {
    let prev = scope.dict.get(scope.template_id, &instr.name).clone();
    match value {
        Some(v) => {
            let absent_reads = match &prev {
                DictionaryState::Assigned(p) => Some(p),
                DictionaryState::Undefined => instr.initial.as_ref(),
                DictionaryState::Empty => None,
            };
            if absent_reads == Some(&v) {
                scope.pmap.append(false);
            } else {
                scope.pmap.append(true);
                write_value(scope.writer, instr, &v);
            }
            scope.dict.assign(scope.template_id, &instr.name, v);
            Ok(())
        }
        None => encode_state_null(scope, instr, &prev),
    }
}

fn decode_copy<R: Read>(
    scope: &mut DecodeScope<'_, R>,
    instr: &Instruction,
) -> Result<Option<Value>> {
    if scope.pmap.next_bit() {
        return read_into_dictionary(scope, instr);
    }
    match scope.dict.get(scope.template_id, &instr.name).clone() {
        DictionaryState::Assigned(p) => Ok(Some(p)),
        DictionaryState::Undefined => match &instr.initial {
            Some(initial) => {
                scope
                    .dict
                    .assign(scope.template_id, &instr.name, initial.clone());
                Ok(Some(initial.clone()))
            }
            None if instr.is_nullable() => {
                scope.dict.set_empty(scope.template_id, &instr.name);
                Ok(None)
            }
            None => Err(absent_on_decode(instr)),
        },
        DictionaryState::Empty if instr.is_nullable() => Ok(None),
        DictionaryState::Empty => Err(absent_on_decode(instr)),
    }
}

// ---------------------------------------------------------------------------
// increment
// ---------------------------------------------------------------------------

fn encode_increment(
    scope: &mut EncodeScope<'_>,
    instr: &Instruction,
    value: Option<Value>,
) -> Result<()> {
    let prev = scope.dict.get(scope.template_id, &instr.name).clone();
    match value {
        Some(v) => {
            let absent_reads = match &prev {
                DictionaryState::Assigned(p) => successor(p),
                DictionaryState::Undefined => instr.initial.clone(),
                DictionaryState::Empty => None,
            };
            if absent_reads.as_ref() == Some(&v) {
                scope.pmap.append(false);
            } else {
                scope.pmap.append(true);
                write_value(scope.writer, instr, &v);
            }
            scope.dict.assign(scope.template_id, &instr.name, v);
            Ok(())
        }
        None => encode_state_null(scope, instr, &prev),
    }
}

fn decode_increment<R: Read>(
    scope: &mut DecodeScope<'_, R>,
    instr: &Instruction,
) -> Result<Option<Value>> {
    if scope.pmap.next_bit() {
        return read_into_dictionary(scope, instr);
    }
    match scope.dict.get(scope.template_id, &instr.name).clone() {
        DictionaryState::Assigned(p) => {
            let next = successor(&p).ok_or_else(|| integer_expected(instr, &p))?;
            scope
                .dict
                .assign(scope.template_id, &instr.name, next.clone());
            Ok(Some(next))
        }
        DictionaryState::Undefined => match &instr.initial {
            Some(initial) => {
                scope
                    .dict
                    .assign(scope.template_id, &instr.name, initial.clone());
                Ok(Some(initial.clone()))
            }
            None if instr.is_nullable() => {
                scope.dict.set_empty(scope.template_id, &instr.name);
                Ok(None)
            }
            None => Err(absent_on_decode(instr)),
        },
        DictionaryState::Empty if instr.is_nullable() => Ok(None),
        DictionaryState::Empty => Err(absent_on_decode(instr)),
    }
}

// ---------------------------------------------------------------------------
// delta
// ---------------------------------------------------------------------------

fn encode_delta(
    scope: &mut EncodeScope<'_>,
    instr: &Instruction,
    value: Option<Value>,
) -> Result<()> {
    let nullable = instr.is_nullable();
    let prev = scope.dict.get(scope.template_id, &instr.name).clone();

    let Some(v) = value else {
        if !nullable {
            return Err(missing_on_encode(instr));
        }
        scope.writer.write_null();
        scope.dict.set_empty(scope.template_id, &instr.name);
        return Ok(());
    };

    let base = match prev {
        DictionaryState::Assigned(p) => p,
        DictionaryState::Undefined => instr
            .initial
            .clone()
            .unwrap_or_else(|| type_default(instr.field_type)),
        DictionaryState::Empty => {
            return Err(FastError::Encode(EncodeError::PreviousValueEmpty {
                name: instr.name.clone(),
            }));
        }
    };

    if instr.field_type.is_integer() {
        let (lhs, rhs) = (
            v.to_i128().ok_or_else(|| integer_expected(instr, &v))?,
            base.to_i128().ok_or_else(|| integer_expected(instr, &base))?,
        );
        let delta = i64::try_from(lhs - rhs).map_err(|_| {
            FastError::Encode(EncodeError::ValueOutOfRange {
                name: instr.name.clone(),
            })
        })?;
        scope.writer.write_int(nullable, delta);
    } else if instr.field_type == FieldType::Decimal {
        let (vd, bd) = (
            v.as_decimal().ok_or_else(|| integer_expected(instr, &v))?,
            base.as_decimal()
                .ok_or_else(|| integer_expected(instr, &base))?,
        );
        let exp_delta = i64::from(vd.exponent) - i64::from(bd.exponent);
        let mant_delta =
            i64::try_from(i128::from(vd.mantissa) - i128::from(bd.mantissa)).map_err(|_| {
                FastError::Encode(EncodeError::ValueOutOfRange {
                    name: instr.name.clone(),
                })
            })?;
        scope.writer.write_int(nullable, exp_delta);
        scope.writer.write_int(false, mant_delta);
    } else {
        let vb = value_octets(&v);
        let bb = value_octets(&base);
        let prefix = common_prefix(vb, bb);
        let suffix = common_suffix(vb, bb);

        // tail replacement: truncate after the common prefix, append the rest
        let tail_sub = (bb.len() - prefix) as i64;
        let tail_diff = &vb[prefix..];
        // head replacement: only expressible when at least one byte goes
        let head_usable = bb.len() - suffix >= 1;
        let head_diff = &vb[..vb.len() - suffix];

        if head_usable && head_diff.len() < tail_diff.len() {
            let head_sub = -((bb.len() - suffix) as i64);
            scope.writer.write_int(nullable, head_sub);
            write_diff(scope.writer, instr.field_type, head_diff);
        } else {
            scope.writer.write_int(nullable, tail_sub);
            write_diff(scope.writer, instr.field_type, tail_diff);
        }
    }

    scope.dict.assign(scope.template_id, &instr.name, v);
    Ok(())
}

fn decode_delta<R: Read>(
    scope: &mut DecodeScope<'_, R>,
    instr: &Instruction,
) -> Result<Option<Value>> {
    let nullable = instr.is_nullable();

    if instr.field_type.is_integer() {
        let delta = if nullable {
            scope.reader.read_int_nullable(MAX_BYTES_64)?
        } else {
            Some(scope.reader.read_int(MAX_BYTES_64)?)
        };
        let Some(delta) = delta else {
            scope.dict.set_empty(scope.template_id, &instr.name);
            return Ok(None);
        };
        let base = delta_base(scope, instr)?;
        let raw = base.to_i128().ok_or_else(|| integer_expected(instr, &base))? + i128::from(delta);
        let v = integer_from_i128(instr.field_type, raw)?;
        scope.dict.assign(scope.template_id, &instr.name, v.clone());
        return Ok(Some(v));
    }

    if instr.field_type == FieldType::Decimal {
        let exp_delta = if nullable {
            scope.reader.read_int_nullable(MAX_BYTES_32)?
        } else {
            Some(scope.reader.read_int(MAX_BYTES_32)?)
        };
        let Some(exp_delta) = exp_delta else {
            scope.dict.set_empty(scope.template_id, &instr.name);
            return Ok(None);
        };
        let mant_delta = scope.reader.read_int(MAX_BYTES_64)?;
        let base = delta_base(scope, instr)?;
        let bd = base
            .as_decimal()
            .ok_or_else(|| integer_expected(instr, &base))?;
        let exponent = i32::try_from(i64::from(bd.exponent) + exp_delta)
            .map_err(|_| FastError::Decode(DecodeError::IntegerOverflow))?;
        let mantissa = i64::try_from(i128::from(bd.mantissa) + i128::from(mant_delta))
            .map_err(|_| FastError::Decode(DecodeError::IntegerOverflow))?;
        let v = Value::Decimal(Decimal::new(exponent, mantissa));
        scope.dict.assign(scope.template_id, &instr.name, v.clone());
        return Ok(Some(v));
    }

    let sub = if nullable {
        scope.reader.read_int_nullable(MAX_BYTES_32)?
    } else {
        Some(scope.reader.read_int(MAX_BYTES_32)?)
    };
    let Some(sub) = sub else {
        scope.dict.set_empty(scope.template_id, &instr.name);
        return Ok(None);
    };
    let diff = read_diff(scope.reader, instr.field_type)?;
    let base = delta_base(scope, instr)?;
    let bb = value_octets(&base);

    let cut = usize::try_from(sub.unsigned_abs())
        .map_err(|_| FastError::Decode(DecodeError::IntegerOverflow))?;
    if cut > bb.len() {
        return Err(FastError::Decode(DecodeError::SubtractionTooLong {
            subtraction: sub,
            length: bb.len(),
        }));
    }

    let mut merged = Vec::with_capacity(bb.len() - cut + diff.len());
    if sub >= 0 {
        merged.extend_from_slice(&bb[..bb.len() - cut]);
        merged.extend_from_slice(&diff);
    } else {
        merged.extend_from_slice(&diff);
        merged.extend_from_slice(&bb[cut..]);
    }

    let v = value_from_octets(instr.field_type, merged)?;
    scope.dict.assign(scope.template_id, &instr.name, v.clone());
    Ok(Some(v))
}

fn delta_base<R>(scope: &DecodeScope<'_, R>, instr: &Instruction) -> Result<Value> {
    match scope.dict.get(scope.template_id, &instr.name) {
        DictionaryState::Assigned(p) => Ok(p.clone()),
        DictionaryState::Undefined => Ok(instr
            .initial
            .clone()
            .unwrap_or_else(|| type_default(instr.field_type))),
        DictionaryState::Empty => Err(FastError::Decode(DecodeError::PreviousValueEmpty {
            name: instr.name.clone(),
        })),
    }
}

// ---------------------------------------------------------------------------
// tail
// ---------------------------------------------------------------------------

fn encode_tail(
    scope: &mut EncodeScope<'_>,
    instr: &Instruction,
    value: Option<Value>,
) -> Result<()> {
    let prev = scope.dict.get(scope.template_id, &instr.name).clone();
    match value {
        Some(v) => {
            let absent_reads = match &prev {
                DictionaryState::Assigned(p) => Some(p),
                DictionaryState::Undefined => instr.initial.as_ref(),
                DictionaryState::Empty => None,
            };
            if absent_reads == Some(&v) {
                scope.pmap.append(false);
                scope.dict.assign(scope.template_id, &instr.name, v);
                return Ok(());
            }
            scope.pmap.append(true);

            let base = match &prev {
                DictionaryState::Assigned(p) => p.clone(),
                DictionaryState::Undefined => instr
                    .initial
                    .clone()
                    .unwrap_or_else(|| type_default(instr.field_type)),
                DictionaryState::Empty => type_default(instr.field_type),
            };
            let vb = value_octets(&v);
            let bb = value_octets(&base);
            let tail: &[u8] = if vb.len() == bb.len() {
                &vb[common_prefix(vb, bb)..]
            } else if vb.len() > bb.len() {
                vb
            } else {
                // a shorter value cannot be reached by replacing a tail
                return Err(FastError::Encode(EncodeError::ValueNotRepresentable {
                    name: instr.name.clone(),
                }));
            };
            write_tail(scope.writer, instr, tail)?;
            scope.dict.assign(scope.template_id, &instr.name, v);
            Ok(())
        }
        None => encode_state_null(scope, instr, &prev),
    }
}

fn decode_tail<R: Read>(
    scope: &mut DecodeScope<'_, R>,
    instr: &Instruction,
) -> Result<Option<Value>> {
    if scope.pmap.next_bit() {
        let tail = read_tail(scope.reader, instr)?;
        let Some(tail) = tail else {
            scope.dict.set_empty(scope.template_id, &instr.name);
            return Ok(None);
        };
        let base = match scope.dict.get(scope.template_id, &instr.name) {
            DictionaryState::Assigned(p) => p.clone(),
            DictionaryState::Undefined => instr
                .initial
                .clone()
                .unwrap_or_else(|| type_default(instr.field_type)),
            DictionaryState::Empty => type_default(instr.field_type),
        };
        let bb = value_octets(&base);
        let merged = if tail.len() >= bb.len() {
            tail
        } else {
            let mut merged = Vec::with_capacity(bb.len());
            merged.extend_from_slice(&bb[..bb.len() - tail.len()]);
            merged.extend_from_slice(&tail);
            merged
        };
        let v = value_from_octets(instr.field_type, merged)?;
        scope.dict.assign(scope.template_id, &instr.name, v.clone());
        return Ok(Some(v));
    }
    match scope.dict.get(scope.template_id, &instr.name).clone() {
        DictionaryState::Assigned(p) => Ok(Some(p)),
        DictionaryState::Undefined => match &instr.initial {
            Some(initial) => {
                scope
                    .dict
                    .assign(scope.template_id, &instr.name, initial.clone());
                Ok(Some(initial.clone()))
            }
            None if instr.is_nullable() => {
                scope.dict.set_empty(scope.template_id, &instr.name);
                Ok(None)
            }
            None => Err(absent_on_decode(instr)),
        },
        DictionaryState::Empty if instr.is_nullable() => Ok(None),
        DictionaryState::Empty => Err(absent_on_decode(instr)),
    }
}

// ---------------------------------------------------------------------------
// shared pieces
// ---------------------------------------------------------------------------

/// Writes a null for a state-holding operator (copy, increment, tail): the
/// bit stays clear when the absent reading is already null, otherwise the
/// bit is set and a null goes on the wire. Either way the entry empties.
fn encode_state_null(
    scope: &mut EncodeScope<'_>,
    instr: &Instruction,
    prev: &DictionaryState,
) -> Result<()> {
    if !instr.is_nullable() {
        return Err(missing_on_encode(instr));
    }
    let absent_reads_null = prev.is_empty() || (prev.is_undefined() && instr.initial.is_none());
    if absent_reads_null {
        scope.pmap.append(false);
    } else {
        scope.pmap.append(true);
        scope.writer.write_null();
    }
    scope.dict.set_empty(scope.template_id, &instr.name);
    Ok(())
}

/// Reads an explicit value and records it: a null empties the entry, a
/// value is assigned.
fn read_into_dictionary<R: Read>(
    scope: &mut DecodeScope<'_, R>,
    instr: &Instruction,
) -> Result<Option<Value>> {
    match read_value(scope.reader, instr)? {
        Some(v) => {
            scope.dict.assign(scope.template_id, &instr.name, v.clone());
            Ok(Some(v))
        }
        None => {
            scope.dict.set_empty(scope.template_id, &instr.name);
            Ok(None)
        }
    }
}

/// Writes a value in the field's wire form; nullability follows presence.
fn write_value(writer: &mut Writer, instr: &Instruction, value: &Value) {
    let nullable = instr.is_nullable();
    match value {
        Value::UInt32(v) => writer.write_uint(nullable, u64::from(*v)),
        Value::UInt64(v) => writer.write_uint(nullable, *v),
        Value::Int32(v) => writer.write_int(nullable, i64::from(*v)),
        Value::Int64(v) => writer.write_int(nullable, *v),
        Value::Ascii(s) => writer.write_ascii(nullable, s),
        Value::Unicode(s) => writer.write_unicode(nullable, s),
        Value::Bytes(b) => writer.write_bytes(nullable, b),
        Value::Decimal(d) => {
            writer.write_int(nullable, i64::from(d.exponent));
            writer.write_int(false, d.mantissa);
        }
    }
}

/// Reads a value in the field's wire form; nullability follows presence.
fn read_value<R: Read>(reader: &mut Reader<R>, instr: &Instruction) -> Result<Option<Value>> {
    let nullable = instr.is_nullable();
    match instr.field_type {
        FieldType::UInt32 => {
            let raw = if nullable {
                reader.read_uint_nullable(MAX_BYTES_32)?
            } else {
                Some(reader.read_uint(MAX_BYTES_32)?)
            };
            raw.map(|v| {
                u32::try_from(v)
                    .map(Value::UInt32)
                    .map_err(|_| FastError::Decode(DecodeError::IntegerOverflow))
            })
            .transpose()
        }
        FieldType::UInt64 => {
            let raw = if nullable {
                reader.read_uint_nullable(MAX_BYTES_64)?
            } else {
                Some(reader.read_uint(MAX_BYTES_64)?)
            };
            Ok(raw.map(Value::UInt64))
        }
        FieldType::Int32 => {
            let raw = if nullable {
                reader.read_int_nullable(MAX_BYTES_32)?
            } else {
                Some(reader.read_int(MAX_BYTES_32)?)
            };
            raw.map(|v| {
                i32::try_from(v)
                    .map(Value::Int32)
                    .map_err(|_| FastError::Decode(DecodeError::IntegerOverflow))
            })
            .transpose()
        }
        FieldType::Int64 => {
            let raw = if nullable {
                reader.read_int_nullable(MAX_BYTES_64)?
            } else {
                Some(reader.read_int(MAX_BYTES_64)?)
            };
            Ok(raw.map(Value::Int64))
        }
        FieldType::AsciiString => {
            let raw = if nullable {
                reader.read_ascii_nullable()?
            } else {
                Some(reader.read_ascii()?)
            };
            Ok(raw.map(Value::Ascii))
        }
        FieldType::UnicodeString => {
            let raw = if nullable {
                reader.read_unicode_nullable()?
            } else {
                Some(reader.read_unicode()?)
            };
            Ok(raw.map(Value::Unicode))
        }
        FieldType::ByteVector => {
            let raw = if nullable {
                reader.read_bytes_nullable()?
            } else {
                Some(reader.read_bytes()?)
            };
            Ok(raw.map(Value::Bytes))
        }
        FieldType::Decimal => {
            let exponent = if nullable {
                reader.read_int_nullable(MAX_BYTES_32)?
            } else {
                Some(reader.read_int(MAX_BYTES_32)?)
            };
            match exponent {
                None => Ok(None),
                Some(e) => {
                    let exponent = i32::try_from(e)
                        .map_err(|_| FastError::Decode(DecodeError::IntegerOverflow))?;
                    let mantissa = reader.read_int(MAX_BYTES_64)?;
                    Ok(Some(Value::Decimal(Decimal::new(exponent, mantissa))))
                }
            }
        }
        FieldType::Group | FieldType::Sequence | FieldType::TemplateRef => {
            Err(FastError::Bind(BindError::TypeMismatch {
                field: instr.name.clone(),
                expected: "scalar",
                actual: "composite",
            }))
        }
    }
}

/// The constant operator's value, guaranteed by template validation.
fn constant_initial(instr: &Instruction) -> Result<Value> {
    instr.initial.clone().ok_or_else(|| {
        FastError::Template(fastwire_core::TemplateError::ConstantWithoutInitial {
            field: instr.name.clone(),
        })
    })
}

/// The next value of an integer, wrapping at the type boundary.
fn successor(value: &Value) -> Option<Value> {
    match value {
        Value::UInt32(v) => Some(Value::UInt32(v.wrapping_add(1))),
        Value::Int32(v) => Some(Value::Int32(v.wrapping_add(1))),
        Value::UInt64(v) => Some(Value::UInt64(v.wrapping_add(1))),
        Value::Int64(v) => Some(Value::Int64(v.wrapping_add(1))),
        _ => None,
    }
}

/// The value an operator falls back to when nothing was ever stored.
fn type_default(kind: FieldType) -> Value {
    match kind {
        FieldType::Int32 => Value::Int32(0),
        FieldType::UInt64 => Value::UInt64(0),
        FieldType::Int64 => Value::Int64(0),
        FieldType::AsciiString => Value::Ascii(String::new()),
        FieldType::UnicodeString => Value::Unicode(String::new()),
        FieldType::ByteVector => Value::Bytes(Bytes::new()),
        FieldType::Decimal => Value::Decimal(Decimal::ZERO),
        _ => Value::UInt32(0),
    }
}

fn integer_from_i128(kind: FieldType, raw: i128) -> Result<Value> {
    let overflow = || FastError::Decode(DecodeError::IntegerOverflow);
    match kind {
        FieldType::UInt32 => u32::try_from(raw).map(Value::UInt32).map_err(|_| overflow()),
        FieldType::Int32 => i32::try_from(raw).map(Value::Int32).map_err(|_| overflow()),
        FieldType::UInt64 => u64::try_from(raw).map(Value::UInt64).map_err(|_| overflow()),
        FieldType::Int64 => i64::try_from(raw).map(Value::Int64).map_err(|_| overflow()),
        _ => Err(overflow()),
    }
}

fn value_octets(value: &Value) -> &[u8] {
    match value {
        Value::Ascii(s) | Value::Unicode(s) => s.as_bytes(),
        Value::Bytes(b) => b,
        _ => &[],
    }
}

fn value_from_octets(kind: FieldType, octets: Vec<u8>) -> Result<Value> {
    match kind {
        FieldType::AsciiString => String::from_utf8(octets)
            .map(Value::Ascii)
            .map_err(|_| FastError::Decode(DecodeError::InvalidString)),
        FieldType::UnicodeString => String::from_utf8(octets)
            .map(Value::Unicode)
            .map_err(|e| FastError::Decode(DecodeError::InvalidUtf8(e))),
        _ => Ok(Value::Bytes(Bytes::from(octets))),
    }
}

/// Writes a delta diff. ASCII diffs use the stop-bit string form; unicode
/// and byte-vector diffs are length-prefixed raw bytes, because a diff may
/// split a multi-byte character.
fn write_diff(writer: &mut Writer, kind: FieldType, diff: &[u8]) {
    if kind == FieldType::AsciiString {
        let text: String = diff.iter().map(|&b| (b & 0x7F) as char).collect();
        writer.write_ascii(false, &text);
    } else {
        writer.write_bytes(false, diff);
    }
}

fn read_diff<R: Read>(reader: &mut Reader<R>, kind: FieldType) -> Result<Vec<u8>> {
    if kind == FieldType::AsciiString {
        Ok(reader.read_ascii()?.into_bytes())
    } else {
        Ok(reader.read_bytes()?.to_vec())
    }
}

/// Writes a tail replacement; same forms as delta diffs, but the token is
/// nullable when the field is optional.
fn write_tail(writer: &mut Writer, instr: &Instruction, tail: &[u8]) -> Result<()> {
    let nullable = instr.is_nullable();
    if instr.field_type == FieldType::AsciiString {
        let text = std::str::from_utf8(tail).map_err(|_| {
            FastError::Encode(EncodeError::ValueNotRepresentable {
                name: instr.name.clone(),
            })
        })?;
        writer.write_ascii(nullable, text);
    } else {
        writer.write_bytes(nullable, tail);
    }
    Ok(())
}

fn read_tail<R: Read>(reader: &mut Reader<R>, instr: &Instruction) -> Result<Option<Vec<u8>>> {
    let nullable = instr.is_nullable();
    if instr.field_type == FieldType::AsciiString {
        let raw = if nullable {
            reader.read_ascii_nullable()?
        } else {
            Some(reader.read_ascii()?)
        };
        Ok(raw.map(String::into_bytes))
    } else {
        let raw = if nullable {
            reader.read_bytes_nullable()?
        } else {
            Some(reader.read_bytes()?)
        };
        Ok(raw.map(|b| b.to_vec()))
    }
}

fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

fn common_suffix(a: &[u8], b: &[u8]) -> usize {
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

fn missing_on_encode(instr: &Instruction) -> FastError {
    FastError::Encode(EncodeError::MissingMandatoryField {
        name: instr.name.clone(),
    })
}

fn absent_on_decode(instr: &Instruction) -> FastError {
    FastError::Decode(DecodeError::MandatoryFieldAbsent {
        name: instr.name.clone(),
    })
}

fn integer_expected(instr: &Instruction, found: &Value) -> FastError {
    FastError::Bind(BindError::TypeMismatch {
        field: instr.name.clone(),
        expected: "integer",
        actual: found.type_name(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Harness {
        dict: Dictionary,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                dict: Dictionary::new(),
            }
        }

        fn encode(&mut self, instr: &Instruction, value: Option<Value>) -> (Vec<u8>, Vec<bool>) {
            let mut writer = Writer::new();
            let mut pmap = PresenceMap::new();
            let mut scope = EncodeScope {
                writer: &mut writer,
                pmap: &mut pmap,
                dict: &mut self.dict,
                template_id: 1,
            };
            encode_field(&mut scope, instr, value).unwrap();
            let bits = (0..pmap.len()).map(|i| pmap.bit(i)).collect();
            (writer.into_bytes(), bits)
        }

        fn encode_err(&mut self, instr: &Instruction, value: Option<Value>) -> FastError {
            let mut writer = Writer::new();
            let mut pmap = PresenceMap::new();
            let mut scope = EncodeScope {
                writer: &mut writer,
                pmap: &mut pmap,
                dict: &mut self.dict,
                template_id: 1,
            };
            encode_field(&mut scope, instr, value).unwrap_err()
        }

        fn decode(
            &mut self,
            instr: &Instruction,
            bytes: &[u8],
            bits: &[bool],
        ) -> Result<Option<Value>> {
            let mut reader = Reader::new(bytes);
            let mut pmap = PresenceMap::new();
            for &bit in bits {
                pmap.append(bit);
            }
            let mut scope = DecodeScope {
                reader: &mut reader,
                pmap: &mut pmap,
                dict: &mut self.dict,
                template_id: 1,
            };
            decode_field(&mut scope, instr)
        }
    }

    fn uint_copy() -> Instruction {
        Instruction::new(1, "Qty", FieldType::UInt32).with_operator(Operator::Copy)
    }

    #[test]
    fn test_copy_encode_repeats() {
        let instr = uint_copy();
        let mut h = Harness::new();

        let (bytes, bits) = h.encode(&instr, Some(Value::UInt32(7)));
        assert_eq!(bytes, vec![0x87]);
        assert_eq!(bits, vec![true]);

        let (bytes, bits) = h.encode(&instr, Some(Value::UInt32(7)));
        assert!(bytes.is_empty());
        assert_eq!(bits, vec![false]);

        let (bytes, bits) = h.encode(&instr, Some(Value::UInt32(8)));
        assert_eq!(bytes, vec![0x88]);
        assert_eq!(bits, vec![true]);
    }

    #[test]
    fn test_copy_decode_repeats() {
        let instr = uint_copy();
        let mut h = Harness::new();

        assert_eq!(
            h.decode(&instr, &[0x87], &[true]).unwrap(),
            Some(Value::UInt32(7))
        );
        assert_eq!(h.decode(&instr, &[], &[false]).unwrap(), Some(Value::UInt32(7)));
        assert_eq!(
            h.decode(&instr, &[0x88], &[true]).unwrap(),
            Some(Value::UInt32(8))
        );
    }

    #[test]
    fn test_copy_initial_value_matches_without_bytes() {
        let instr = uint_copy().with_initial(5u32);
        let mut h = Harness::new();
        let (bytes, bits) = h.encode(&instr, Some(Value::UInt32(5)));
        assert!(bytes.is_empty());
        assert_eq!(bits, vec![false]);

        let mut h = Harness::new();
        assert_eq!(h.decode(&instr, &[], &[false]).unwrap(), Some(Value::UInt32(5)));
    }

    #[test]
    fn test_copy_mandatory_undefined_is_d5() {
        let instr = uint_copy();
        let mut h = Harness::new();
        let err = h.decode(&instr, &[], &[false]).unwrap_err();
        assert!(matches!(
            err,
            FastError::Decode(DecodeError::MandatoryFieldAbsent { .. })
        ));
    }

    #[test]
    fn test_copy_null_idempotence() {
        let instr = uint_copy().optional();
        let mut h = Harness::new();

        // undefined with no initial already reads as null
        let (bytes, bits) = h.encode(&instr, None);
        assert!(bytes.is_empty());
        assert_eq!(bits, vec![false]);
        assert!(h.dict.get(1, "Qty").is_empty());

        // and again, now from the empty state
        let (bytes, bits) = h.encode(&instr, None);
        assert!(bytes.is_empty());
        assert_eq!(bits, vec![false]);
    }

    #[test]
    fn test_copy_null_after_value_writes_null() {
        let instr = uint_copy().optional();
        let mut h = Harness::new();
        let _ = h.encode(&instr, Some(Value::UInt32(7)));
        let (bytes, bits) = h.encode(&instr, None);
        assert_eq!(bytes, vec![0x80]);
        assert_eq!(bits, vec![true]);
        assert!(h.dict.get(1, "Qty").is_empty());
    }

    #[test]
    fn test_constant_mandatory_is_silent() {
        let instr = Instruction::new(1, "Ex", FieldType::AsciiString)
            .with_operator(Operator::Constant)
            .with_initial("XNYS");
        let mut h = Harness::new();
        let (bytes, bits) = h.encode(&instr, Some(Value::Ascii("XNYS".into())));
        assert!(bytes.is_empty());
        assert!(bits.is_empty());

        assert_eq!(
            h.decode(&instr, &[], &[]).unwrap(),
            Some(Value::Ascii("XNYS".into()))
        );
    }

    #[test]
    fn test_constant_optional_claims_bit() {
        let instr = Instruction::new(1, "Ex", FieldType::AsciiString)
            .with_operator(Operator::Constant)
            .with_initial("XNYS")
            .optional();
        let mut h = Harness::new();

        let (_, bits) = h.encode(&instr, Some(Value::Ascii("XNYS".into())));
        assert_eq!(bits, vec![true]);
        let (_, bits) = h.encode(&instr, None);
        assert_eq!(bits, vec![false]);

        assert_eq!(
            h.decode(&instr, &[], &[true]).unwrap(),
            Some(Value::Ascii("XNYS".into()))
        );
        assert_eq!(h.decode(&instr, &[], &[false]).unwrap(), None);
    }

    #[test]
    fn test_default_matches_initial() {
        let instr = Instruction::new(1, "Flag", FieldType::UInt32)
            .with_operator(Operator::Default)
            .with_initial(1u32);
        let mut h = Harness::new();

        let (bytes, bits) = h.encode(&instr, Some(Value::UInt32(1)));
        assert!(bytes.is_empty());
        assert_eq!(bits, vec![false]);

        let (bytes, bits) = h.encode(&instr, Some(Value::UInt32(9)));
        assert_eq!(bytes, vec![0x89]);
        assert_eq!(bits, vec![true]);

        assert_eq!(h.decode(&instr, &[], &[false]).unwrap(), Some(Value::UInt32(1)));
        assert_eq!(
            h.decode(&instr, &[0x89], &[true]).unwrap(),
            Some(Value::UInt32(9))
        );
    }

    #[test]
    fn test_increment_baseline() {
        let instr =
            Instruction::new(1, "Seq", FieldType::UInt64).with_operator(Operator::Increment);
        let mut h = Harness::new();

        let (bytes, bits) = h.encode(&instr, Some(Value::UInt64(5)));
        assert_eq!(bytes, vec![0x85]);
        assert_eq!(bits, vec![true]);

        // successor needs no bit and no bytes
        let (bytes, bits) = h.encode(&instr, Some(Value::UInt64(6)));
        assert!(bytes.is_empty());
        assert_eq!(bits, vec![false]);

        let (bytes, bits) = h.encode(&instr, Some(Value::UInt64(9)));
        assert_eq!(bytes, vec![0x89]);
        assert_eq!(bits, vec![true]);
    }

    #[test]
    fn test_increment_decode() {
        let instr =
            Instruction::new(1, "Seq", FieldType::UInt64).with_operator(Operator::Increment);
        let mut h = Harness::new();

        assert_eq!(
            h.decode(&instr, &[0x85], &[true]).unwrap(),
            Some(Value::UInt64(5))
        );
        assert_eq!(h.decode(&instr, &[], &[false]).unwrap(), Some(Value::UInt64(6)));
        assert_eq!(h.decode(&instr, &[], &[false]).unwrap(), Some(Value::UInt64(7)));
    }

    #[test]
    fn test_delta_int_round_trip() {
        let instr = Instruction::new(1, "Px", FieldType::Int64).with_operator(Operator::Delta);
        let mut enc = Harness::new();
        let mut dec = Harness::new();

        for value in [100i64, 105, 95, 95] {
            let (bytes, bits) = enc.encode(&instr, Some(Value::Int64(value)));
            assert!(bits.is_empty());
            assert_eq!(
                dec.decode(&instr, &bytes, &[]).unwrap(),
                Some(Value::Int64(value))
            );
        }
    }

    #[test]
    fn test_delta_int_seeded_by_initial() {
        let instr = Instruction::new(1, "Px", FieldType::Int64)
            .with_operator(Operator::Delta)
            .with_initial(100i64);
        let mut h = Harness::new();
        // 103 - 100 = 3
        let (bytes, _) = h.encode(&instr, Some(Value::Int64(103)));
        assert_eq!(bytes, vec![0x83]);
    }

    #[test]
    fn test_delta_string_appends_suffix() {
        let instr =
            Instruction::new(1, "Sym", FieldType::AsciiString).with_operator(Operator::Delta);
        let mut enc = Harness::new();
        let mut dec = Harness::new();

        let (bytes, _) = enc.encode(&instr, Some(Value::Ascii("ABC".into())));
        assert_eq!(bytes, vec![0x80, 0x41, 0x42, 0xC3]);
        assert_eq!(
            dec.decode(&instr, &bytes, &[]).unwrap(),
            Some(Value::Ascii("ABC".into()))
        );

        let (bytes, _) = enc.encode(&instr, Some(Value::Ascii("ABCD".into())));
        assert_eq!(bytes, vec![0x80, 0xC4]);
        assert_eq!(
            dec.decode(&instr, &bytes, &[]).unwrap(),
            Some(Value::Ascii("ABCD".into()))
        );
    }

    #[test]
    fn test_delta_string_replaces_head() {
        let instr =
            Instruction::new(1, "Sym", FieldType::AsciiString).with_operator(Operator::Delta);
        let mut enc = Harness::new();
        let mut dec = Harness::new();

        let _ = enc.encode(&instr, Some(Value::Ascii("GEH6".into())));
        let _ = dec.decode(&instr, &[0x80, b'G', b'E', b'H', b'6' | 0x80], &[]);

        // "MEH6" shares the tail; one head byte changes
        let (bytes, _) = enc.encode(&instr, Some(Value::Ascii("MEH6".into())));
        assert_eq!(bytes, vec![0xFF, 0xCD]);
        assert_eq!(
            dec.decode(&instr, &bytes, &[]).unwrap(),
            Some(Value::Ascii("MEH6".into()))
        );
    }

    #[test]
    fn test_delta_subtraction_too_long_is_d7() {
        let instr =
            Instruction::new(1, "Sym", FieldType::AsciiString).with_operator(Operator::Delta);
        let mut h = Harness::new();
        // base is empty; removing five bytes cannot work
        let err = h.decode(&instr, &[0x85, 0xC1], &[]).unwrap_err();
        assert!(matches!(
            err,
            FastError::Decode(DecodeError::SubtractionTooLong {
                subtraction: 5,
                length: 0
            })
        ));
    }

    #[test]
    fn test_delta_optional_null() {
        let instr = Instruction::new(1, "Sym", FieldType::AsciiString)
            .with_operator(Operator::Delta)
            .optional();
        let mut h = Harness::new();
        let (bytes, bits) = h.encode(&instr, None);
        assert_eq!(bytes, vec![0x80]);
        assert!(bits.is_empty());
        assert!(h.dict.get(1, "Sym").is_empty());

        let mut h = Harness::new();
        assert_eq!(h.decode(&instr, &[0x80], &[]).unwrap(), None);
        assert!(h.dict.get(1, "Sym").is_empty());
    }

    #[test]
    fn test_delta_on_empty_state_is_d6() {
        let instr = Instruction::new(1, "Sym", FieldType::AsciiString)
            .with_operator(Operator::Delta)
            .optional();
        let mut h = Harness::new();
        h.dict.set_empty(1, "Sym");
        let err = h.encode_err(&instr, Some(Value::Ascii("A".into())));
        assert!(matches!(
            err,
            FastError::Encode(EncodeError::PreviousValueEmpty { .. })
        ));
    }

    #[test]
    fn test_delta_decimal_component_wise() {
        let instr = Instruction::new(1, "Px", FieldType::Decimal).with_operator(Operator::Delta);
        let mut enc = Harness::new();
        let mut dec = Harness::new();

        for value in [Decimal::new(-2, 941), Decimal::new(-2, 945), Decimal::new(-1, 95)] {
            let (bytes, _) = enc.encode(&instr, Some(Value::Decimal(value)));
            assert_eq!(
                dec.decode(&instr, &bytes, &[]).unwrap(),
                Some(Value::Decimal(value))
            );
        }
    }

    #[test]
    fn test_tail_round_trip() {
        let instr = Instruction::new(1, "Sym", FieldType::AsciiString)
            .with_operator(Operator::Tail)
            .optional();
        let mut enc = Harness::new();
        let mut dec = Harness::new();

        let (bytes, bits) = enc.encode(&instr, Some(Value::Ascii("GEH6".into())));
        assert_eq!(bits, vec![true]);
        assert_eq!(
            dec.decode(&instr, &bytes, &bits).unwrap(),
            Some(Value::Ascii("GEH6".into()))
        );

        // same length, last byte differs: only the changed tail travels
        let (bytes, bits) = enc.encode(&instr, Some(Value::Ascii("GEH7".into())));
        assert_eq!(bytes, vec![b'7' | 0x80]);
        assert_eq!(bits, vec![true]);
        assert_eq!(
            dec.decode(&instr, &bytes, &bits).unwrap(),
            Some(Value::Ascii("GEH7".into()))
        );

        // identical value: clear bit, no bytes
        let (bytes, bits) = enc.encode(&instr, Some(Value::Ascii("GEH7".into())));
        assert!(bytes.is_empty());
        assert_eq!(bits, vec![false]);
        assert_eq!(
            dec.decode(&instr, &bytes, &bits).unwrap(),
            Some(Value::Ascii("GEH7".into()))
        );
    }

    #[test]
    fn test_tail_shorter_value_is_d3() {
        let instr =
            Instruction::new(1, "Sym", FieldType::AsciiString).with_operator(Operator::Tail);
        let mut h = Harness::new();
        let _ = h.encode(&instr, Some(Value::Ascii("ABCD".into())));
        let err = h.encode_err(&instr, Some(Value::Ascii("AB".into())));
        assert!(matches!(
            err,
            FastError::Encode(EncodeError::ValueNotRepresentable { .. })
        ));
    }

    #[test]
    fn test_none_optional_null() {
        let instr = Instruction::new(1, "Qty", FieldType::UInt32).optional();
        let mut h = Harness::new();
        let (bytes, bits) = h.encode(&instr, None);
        assert_eq!(bytes, vec![0x80]);
        assert!(bits.is_empty());
        assert_eq!(h.decode(&instr, &[0x80], &[]).unwrap(), None);
    }

    #[test]
    fn test_none_mandatory_missing_is_d5() {
        let instr = Instruction::new(1, "Qty", FieldType::UInt32);
        let mut h = Harness::new();
        let err = h.encode_err(&instr, None);
        assert!(matches!(
            err,
            FastError::Encode(EncodeError::MissingMandatoryField { .. })
        ));
    }

    #[test]
    fn test_presence_shifts_wire_values() {
        let mandatory = Instruction::new(1, "Qty", FieldType::UInt32);
        let optional = mandatory.clone().optional();
        let mut h = Harness::new();

        let (bytes, _) = h.encode(&mandatory, Some(Value::UInt32(0)));
        assert_eq!(bytes, vec![0x80]);
        let (bytes, _) = h.encode(&optional, Some(Value::UInt32(0)));
        assert_eq!(bytes, vec![0x81]);
    }
}
