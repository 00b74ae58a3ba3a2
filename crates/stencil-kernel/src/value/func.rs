//! Callable values.
//!
//! Three shapes exist. Typed functions declare the kinds of their parameters
//! and receive converted values. Raw functions receive the unevaluated
//! argument list and the running evaluator. Safe writers take over the
//! output of a pipeline and write bytes directly.

use std::fmt;
use std::sync::Arc;

use super::Value;
use crate::escape::SafeWriter;
use crate::interpreter::Arguments;

pub type TypedFn = Arc<dyn Fn(Vec<Value>) -> anyhow::Result<Value> + Send + Sync>;

pub type RawFn = Arc<dyn Fn(&mut Arguments<'_, '_>) -> anyhow::Result<Value> + Send + Sync>;

/// Expected kind of a typed function parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    Any,
    Bool,
    Int,
    Uint,
    Float,
    String,
    Bytes,
    List,
    Map,
}

impl Param {
    pub fn as_str(self) -> &'static str {
        match self {
            Param::Any => "any",
            Param::Bool => "bool",
            Param::Int => "int",
            Param::Uint => "uint",
            Param::Float => "float",
            Param::String => "string",
            Param::Bytes => "bytes",
            Param::List => "list",
            Param::Map => "map",
        }
    }

    /// Convert `value` to this kind, or `None` if no conversion applies.
    ///
    /// Numbers convert between each other (floats truncate toward zero,
    /// negative values never become uint), strings and bytes convert both
    /// ways, and `Any` accepts everything.
    pub fn convert(self, value: Value) -> Option<Value> {
        match (self, value) {
            (Param::Any, v) => Some(v),
            (Param::Bool, v @ Value::Bool(_)) => Some(v),
            (Param::Int, v @ Value::Int(_)) => Some(v),
            (Param::Int, Value::Uint(u)) => i64::try_from(u).ok().map(Value::Int),
            (Param::Int, Value::Float(f)) if f.is_finite() => Some(Value::Int(f.trunc() as i64)),
            (Param::Uint, v @ Value::Uint(_)) => Some(v),
            (Param::Uint, Value::Int(i)) => u64::try_from(i).ok().map(Value::Uint),
            (Param::Uint, Value::Float(f)) if f.is_finite() && f >= 0.0 => {
                Some(Value::Uint(f.trunc() as u64))
            }
            (Param::Float, v @ Value::Float(_)) => Some(v),
            (Param::Float, Value::Int(i)) => Some(Value::Float(i as f64)),
            (Param::Float, Value::Uint(u)) => Some(Value::Float(u as f64)),
            (Param::String, v @ Value::String(_)) => Some(v),
            (Param::String, Value::Bytes(b)) => {
                Some(Value::String(String::from_utf8_lossy(&b).into_owned()))
            }
            (Param::Bytes, v @ Value::Bytes(_)) => Some(v),
            (Param::Bytes, Value::String(s)) => Some(Value::Bytes(s.into_bytes())),
            (Param::List, v @ Value::List(_)) => Some(v),
            (Param::Map, v @ Value::Map(_)) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameter list of a typed function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    params: Vec<Param>,
    /// The last parameter repeats zero or more times.
    variadic: bool,
}

impl Signature {
    pub fn new(params: impl IntoIterator<Item = Param>) -> Self {
        Self {
            params: params.into_iter().collect(),
            variadic: false,
        }
    }

    /// The last of `params` accepts any number of arguments, including none.
    pub fn variadic(params: impl IntoIterator<Item = Param>) -> Self {
        let params: Vec<Param> = params.into_iter().collect();
        let variadic = !params.is_empty();
        Self { params, variadic }
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn is_variadic(&self) -> bool {
        self.variadic
    }

    pub fn accepts(&self, count: usize) -> bool {
        if self.variadic {
            count + 1 >= self.params.len()
        } else {
            count == self.params.len()
        }
    }

    /// Expected kind of argument `i`, assuming the count was accepted.
    pub fn param(&self, i: usize) -> Param {
        match self.params.get(i) {
            Some(p) => *p,
            None => self.params.last().copied().unwrap_or(Param::Any),
        }
    }

    pub fn describe_count(&self) -> String {
        if self.variadic {
            format!("at least {}", self.params.len() - 1)
        } else {
            self.params.len().to_string()
        }
    }
}

pub enum FuncKind {
    Typed { signature: Signature, call: TypedFn },
    Raw(RawFn),
    Writer(SafeWriter),
}

struct FuncInner {
    name: String,
    kind: FuncKind,
}

/// A callable value. Cloning shares the underlying function.
#[derive(Clone)]
pub struct Func(Arc<FuncInner>);

impl Func {
    pub fn typed<F>(name: impl Into<String>, signature: Signature, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::from_kind(
            name,
            FuncKind::Typed {
                signature,
                call: Arc::new(f),
            },
        )
    }

    pub fn raw<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Arguments<'_, '_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::from_kind(name, FuncKind::Raw(Arc::new(f)))
    }

    pub fn writer(name: impl Into<String>, writer: SafeWriter) -> Self {
        Self::from_kind(name, FuncKind::Writer(writer))
    }

    fn from_kind(name: impl Into<String>, kind: FuncKind) -> Self {
        Func(Arc::new(FuncInner {
            name: name.into(),
            kind,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn kind(&self) -> &FuncKind {
        &self.0.kind
    }

    pub fn is_writer(&self) -> bool {
        matches!(self.0.kind, FuncKind::Writer(_))
    }

    pub fn ptr_eq(&self, other: &Func) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.0.kind {
            FuncKind::Typed { .. } => "typed",
            FuncKind::Raw(_) => "raw",
            FuncKind::Writer(_) => "writer",
        };
        write!(f, "Func({}, {kind})", self.0.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variadic_counts() {
        let sig = Signature::variadic([Param::String, Param::Any]);
        assert!(!sig.accepts(0));
        assert!(sig.accepts(1));
        assert!(sig.accepts(5));
        assert_eq!(sig.param(4), Param::Any);
        assert_eq!(sig.describe_count(), "at least 1");
    }

    #[test]
    fn conversions() {
        assert_eq!(Param::Int.convert(Value::Float(2.9)), Some(Value::Int(2)));
        assert_eq!(Param::Uint.convert(Value::Int(-1)), None);
        assert_eq!(
            Param::String.convert(Value::Bytes(b"hi".to_vec())),
            Some(Value::from("hi"))
        );
        assert_eq!(Param::Bool.convert(Value::Int(1)), None);
        assert_eq!(Param::Any.convert(Value::Null), Some(Value::Null));
    }
}
