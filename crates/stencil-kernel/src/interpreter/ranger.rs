//! Iteration for `range`.

use std::sync::Arc;

use crate::error::{RuntimeError, RuntimeReason};
use crate::value::{Value, ValueMap};

/// A source of `(index, value)` pairs for a `range` loop.
pub trait Ranger {
    /// Whether the index is meaningful, allowing `range k, v := ...`.
    fn provides_index(&self) -> bool;

    /// The next pair, or `None` once exhausted.
    fn range(&mut self) -> Option<(Value, Value)>;

    /// Called once when the loop ends, however it ends.
    fn done(&mut self) {}
}

/// Lists yield their positions and elements.
pub struct ListRanger {
    items: Arc<Vec<Value>>,
    next: usize,
}

impl ListRanger {
    pub fn new(items: Arc<Vec<Value>>) -> Self {
        Self { items, next: 0 }
    }
}

impl Ranger for ListRanger {
    fn provides_index(&self) -> bool {
        true
    }

    fn range(&mut self) -> Option<(Value, Value)> {
        let value = self.items.get(self.next)?.clone();
        let index = Value::Int(self.next as i64);
        self.next += 1;
        Some((index, value))
    }
}

/// Maps yield keys and values in insertion order.
pub struct MapRanger {
    map: Arc<ValueMap>,
    next: usize,
}

impl MapRanger {
    pub fn new(map: Arc<ValueMap>) -> Self {
        Self { map, next: 0 }
    }
}

impl Ranger for MapRanger {
    fn provides_index(&self) -> bool {
        true
    }

    fn range(&mut self) -> Option<(Value, Value)> {
        let (key, value) = self.map.get_index(self.next)?;
        self.next += 1;
        Some((Value::String(key.clone()), value.clone()))
    }
}

/// Integers from `from` up to, not including, `to`.
pub struct IntsRanger {
    next: i64,
    to: i64,
}

impl IntsRanger {
    pub fn new(from: i64, to: i64) -> Self {
        Self { next: from, to }
    }
}

impl Ranger for IntsRanger {
    fn provides_index(&self) -> bool {
        true
    }

    fn range(&mut self) -> Option<(Value, Value)> {
        if self.next >= self.to {
            return None;
        }
        let i = self.next;
        self.next += 1;
        Some((Value::Int(i), Value::Int(i)))
    }
}

struct EmptyRanger;

impl Ranger for EmptyRanger {
    fn provides_index(&self) -> bool {
        true
    }

    fn range(&mut self) -> Option<(Value, Value)> {
        None
    }
}

/// The ranger for a collection value. Nil ranges as empty.
pub fn ranger_for(value: &Value) -> Result<Box<dyn Ranger>, RuntimeError> {
    match value {
        Value::Null => Ok(Box::new(EmptyRanger)),
        Value::List(items) => Ok(Box::new(ListRanger::new(items.clone()))),
        Value::Map(map) => Ok(Box::new(MapRanger::new(map.clone()))),
        Value::Record(record) => match record.record_type().range_hook() {
            Some(hook) => Ok(hook(record)),
            None => Err(cannot_range(value)),
        },
        _ => Err(cannot_range(value)),
    }
}

fn cannot_range(value: &Value) -> RuntimeError {
    RuntimeError::new(
        RuntimeReason::InvalidOperation,
        format!("cannot range over {}", value.type_name()),
    )
}
