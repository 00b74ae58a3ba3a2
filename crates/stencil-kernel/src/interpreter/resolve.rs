//! Field, index and slice resolution.
//!
//! A key is resolved against a base value in a fixed order: a record method,
//! then a numeric index into a list, string or bytes, then a record field,
//! then a map entry. Lax access (`?.`, `?[`) turns "absent" into nil; it never
//! hides type errors or unexported fields.

use std::sync::Arc;

use crate::ast::FieldSegment;
use crate::error::{RuntimeError, RuntimeReason};
use crate::value::{Record, Value};

/// Look up `key` on `base`.
///
/// `Ok(None)` means the key is well typed but absent: out of bounds, no such
/// field, or no such map entry.
pub fn lookup(base: &Value, key: &Value) -> Result<Option<Value>, RuntimeError> {
    match base {
        Value::Null => Ok(None),
        Value::Record(record) => lookup_record(record, key),
        Value::List(items) => {
            let i = position(base, key)?;
            Ok(i.and_then(|i| items.get(i)).cloned())
        }
        Value::String(s) => {
            let i = position(base, key)?;
            Ok(i.and_then(|i| s.as_bytes().get(i)).map(|b| Value::Uint(u64::from(*b))))
        }
        Value::Bytes(bytes) => {
            let i = position(base, key)?;
            Ok(i.and_then(|i| bytes.get(i)).map(|b| Value::Uint(u64::from(*b))))
        }
        Value::Map(map) => {
            let key = map_key(key)?;
            Ok(map.get(&key).cloned())
        }
        other => Err(RuntimeError::new(
            RuntimeReason::InvalidIndex,
            format!("can't index item of type {}", other.type_name()),
        )),
    }
}

/// Resolve `key` on `base`, failing on absence unless `lax`.
///
/// A nil base is a nil dereference. Missing map entries are nil either way.
pub fn resolve_index(base: &Value, key: &Value, lax: bool) -> Result<Value, RuntimeError> {
    if base.is_null() {
        if lax {
            return Ok(Value::Null);
        }
        return Err(RuntimeError::new(
            RuntimeReason::NilDereference,
            format!("nil pointer evaluating {key}"),
        ));
    }
    match lookup(base, key)? {
        Some(value) => Ok(value),
        None if lax => Ok(Value::Null),
        None => match base {
            Value::Map(_) => Ok(Value::Null),
            Value::Record(record) => Err(RuntimeError::new(
                RuntimeReason::UnknownField,
                format!(
                    "there is no field or method \"{key}\" in {}",
                    record.record_type().name()
                ),
            )),
            _ => Err(RuntimeError::new(
                RuntimeReason::InvalidIndex,
                format!("index out of range: {key}"),
            )),
        },
    }
}

/// Follow a `.A.B?.C` path from `base`.
///
/// A lax segment that comes out nil ends the walk with nil.
pub fn resolve_path(mut base: Value, path: &[FieldSegment]) -> Result<Value, RuntimeError> {
    for segment in path {
        let key = Value::String(segment.name.clone());
        base = resolve_index(&base, &key, segment.lax)?;
        if segment.lax && base.is_null() {
            return Ok(Value::Null);
        }
    }
    Ok(base)
}

fn lookup_record(record: &Record, key: &Value) -> Result<Option<Value>, RuntimeError> {
    let Some(name) = key.as_text() else {
        return Err(RuntimeError::new(
            RuntimeReason::InvalidIndex,
            format!(
                "cannot index {} with {}",
                record.record_type().name(),
                key.type_name()
            ),
        ));
    };
    if let Some(method) = record.bound_method(&name) {
        return Ok(Some(Value::Func(method)));
    }
    match record.record_type().field(&name) {
        Some((_, def)) if !def.exported => Err(RuntimeError::new(
            RuntimeReason::UnexportedField,
            format!(
                "{name} is an unexported field of {}",
                record.record_type().name()
            ),
        )),
        Some((slot, _)) => Ok(record.values().get(slot).cloned()),
        None => Ok(None),
    }
}

/// A numeric key as a position, `None` if negative.
fn position(base: &Value, key: &Value) -> Result<Option<usize>, RuntimeError> {
    let index = match key {
        Value::Int(i) => *i,
        Value::Uint(u) => i64::try_from(*u).unwrap_or(i64::MAX),
        Value::Float(f) if f.fract() == 0.0 => *f as i64,
        other => {
            return Err(RuntimeError::new(
                RuntimeReason::InvalidIndex,
                format!(
                    "cannot index {} with {}",
                    base.type_name(),
                    other.type_name()
                ),
            ))
        }
    };
    Ok(usize::try_from(index).ok())
}

/// Convert an index value into a map key.
pub fn map_key(key: &Value) -> Result<String, RuntimeError> {
    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Bytes(_) | Value::Int(_) | Value::Uint(_) | Value::Float(_) | Value::Bool(_) => {
            Ok(key.to_string())
        }
        other => Err(RuntimeError::new(
            RuntimeReason::InvalidIndex,
            format!("cannot use {} as a map key", other.type_name()),
        )),
    }
}

/// `base[start:end]` on lists, strings and bytes.
pub fn slice(base: &Value, start: Option<&Value>, end: Option<&Value>) -> Result<Value, RuntimeError> {
    let len = match base {
        Value::List(items) => items.len(),
        Value::String(s) => s.len(),
        Value::Bytes(b) => b.len(),
        other => {
            return Err(RuntimeError::new(
                RuntimeReason::InvalidOperation,
                format!("cannot slice {}", other.type_name()),
            ))
        }
    };
    let bound = |v: Option<&Value>, default: usize| -> Result<usize, RuntimeError> {
        match v {
            None => Ok(default),
            Some(v) => position(base, v)?.ok_or_else(|| {
                RuntimeError::new(RuntimeReason::InvalidIndex, format!("invalid slice index {v}"))
            }),
        }
    };
    let start = bound(start, 0)?;
    let end = bound(end, len)?;
    if start > end || end > len {
        return Err(RuntimeError::new(
            RuntimeReason::InvalidIndex,
            format!("slice bounds out of range [{start}:{end}] with length {len}"),
        ));
    }
    Ok(match base {
        Value::List(items) => Value::List(Arc::new(items[start..end].to_vec())),
        Value::String(s) => match s.get(start..end) {
            Some(part) => Value::String(part.to_string()),
            None => Value::Bytes(s.as_bytes()[start..end].to_vec()),
        },
        Value::Bytes(b) => Value::Bytes(b[start..end].to_vec()),
        _ => Value::Null,
    })
}

/// Return `base` with the value at `path` replaced by `value`.
///
/// Maps gain or replace the entry; records must have the field exported.
pub fn assign_path(base: Value, path: &[FieldSegment], value: Value) -> Result<Value, RuntimeError> {
    let Some((segment, rest)) = path.split_first() else {
        return Ok(value);
    };
    match base {
        Value::Map(mut map) => {
            let inner = map.get(&segment.name).cloned().unwrap_or_default();
            let updated = assign_path(inner, rest, value)?;
            Arc::make_mut(&mut map).insert(segment.name.clone(), updated);
            Ok(Value::Map(map))
        }
        Value::Record(mut record) => {
            let exported = match record.record_type().field(&segment.name) {
                Some((_, def)) => def.exported,
                None => {
                    return Err(RuntimeError::new(
                        RuntimeReason::UnknownField,
                        format!(
                            "there is no field \"{}\" in {}",
                            segment.name,
                            record.record_type().name()
                        ),
                    ))
                }
            };
            if !exported {
                return Err(RuntimeError::new(
                    RuntimeReason::UnexportedField,
                    format!(
                        "{} is an unexported field of {}",
                        segment.name,
                        record.record_type().name()
                    ),
                ));
            }
            let inner = record.get(&segment.name).cloned().unwrap_or_default();
            let updated = assign_path(inner, rest, value)?;
            record.set(&segment.name, updated);
            Ok(Value::Record(record))
        }
        Value::Null => Err(RuntimeError::new(
            RuntimeReason::NilDereference,
            format!("nil pointer assigning {}", segment.name),
        )),
        other => Err(RuntimeError::new(
            RuntimeReason::InvalidOperation,
            format!(
                "cannot assign field {} on {}",
                segment.name,
                other.type_name()
            ),
        )),
    }
}
