//! Function calls and argument binding.

use crate::ast::{Expr, ExprKind};
use crate::error::{RuntimeError, RuntimeReason};
use crate::value::{Func, FuncKind, Value};

use super::Runtime;

/// An argument waiting to be evaluated, or a value piped in from the
/// previous pipeline command.
pub(super) enum Slot<'e> {
    Expr(&'e Expr),
    Value(Value),
}

/// Build the argument slots for a call, inserting the piped value at the
/// first `_` or after the last argument.
pub(super) fn slots<'e>(args: &'e [Expr], piped: Option<Value>) -> Vec<Slot<'e>> {
    let mut slots: Vec<Slot<'e>> = args.iter().map(Slot::Expr).collect();
    if let Some(value) = piped {
        let placeholder = args
            .iter()
            .position(|arg| matches!(arg.kind, ExprKind::Underscore));
        match placeholder {
            Some(i) => slots[i] = Slot::Value(value),
            None => slots.push(Slot::Value(value)),
        }
    }
    slots
}

/// Unevaluated arguments handed to a raw function.
///
/// Arguments are evaluated on demand, so a raw function can skip some or
/// treat evaluation failures as data (see `isset`).
pub struct Arguments<'r, 'a> {
    runtime: &'r mut Runtime<'a>,
    slots: Vec<Slot<'r>>,
    name: String,
}

impl<'r, 'a> Arguments<'r, 'a> {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Evaluate argument `i`.
    pub fn get(&mut self, i: usize) -> Result<Value, RuntimeError> {
        match self.slots.get(i) {
            Some(Slot::Expr(expr)) => {
                let expr = *expr;
                self.runtime.eval(expr)
            }
            Some(Slot::Value(value)) => Ok(value.clone()),
            None => Err(RuntimeError::new(
                RuntimeReason::InvalidArgumentCount,
                format!("{}: missing argument {}", self.name, i + 1),
            )),
        }
    }

    /// Fail unless the call has between `min` and `max` arguments.
    pub fn expect_count(&self, min: usize, max: usize) -> Result<(), RuntimeError> {
        let n = self.slots.len();
        if n < min || n > max {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{min} to {max}")
            };
            return Err(RuntimeError::new(
                RuntimeReason::InvalidArgumentCount,
                format!("{}: expected {expected} arguments, got {n}", self.name),
            ));
        }
        Ok(())
    }

    /// The renderer running the call.
    pub fn runtime(&mut self) -> &mut Runtime<'a> {
        self.runtime
    }
}

/// Turn a callable's error into a runtime error, keeping runtime errors
/// raised inside nested evaluation as they are.
pub(super) fn function_error(name: &str, err: anyhow::Error) -> RuntimeError {
    match err.downcast::<RuntimeError>() {
        Ok(err) => err,
        Err(err) => RuntimeError::new(RuntimeReason::Function, format!("{name}: {err:#}"))
            .with_detail("function", name),
    }
}

impl<'a> Runtime<'a> {
    pub(super) fn slot_value(&mut self, slot: Slot<'_>) -> Result<Value, RuntimeError> {
        match slot {
            Slot::Expr(expr) => self.eval(expr),
            Slot::Value(value) => Ok(value),
        }
    }

    /// Call `func` with the given argument slots.
    pub(super) fn call_func(&mut self, func: &Func, slots: Vec<Slot<'_>>) -> Result<Value, RuntimeError> {
        tracing::trace!(function = func.name(), args = slots.len(), "call");
        match func.kind() {
            FuncKind::Typed { signature, call } => {
                if !signature.accepts(slots.len()) {
                    return Err(RuntimeError::new(
                        RuntimeReason::InvalidArgumentCount,
                        format!(
                            "{}: expected {} arguments, got {}",
                            func.name(),
                            signature.describe_count(),
                            slots.len()
                        ),
                    ));
                }
                let mut values = Vec::with_capacity(slots.len());
                for (i, slot) in slots.into_iter().enumerate() {
                    let value = self.slot_value(slot)?;
                    let param = signature.param(i);
                    let kind = value.type_name();
                    let converted = param.convert(value).ok_or_else(|| {
                        RuntimeError::new(
                            RuntimeReason::InvalidValue,
                            format!(
                                "{}: argument {} must be {param}, got {kind}",
                                func.name(),
                                i + 1
                            ),
                        )
                    })?;
                    values.push(converted);
                }
                call(values).map_err(|err| function_error(func.name(), err))
            }
            FuncKind::Raw(call) => {
                let call = call.clone();
                let mut args = Arguments {
                    runtime: self,
                    slots,
                    name: func.name().to_string(),
                };
                call(&mut args).map_err(|err| function_error(func.name(), err))
            }
            FuncKind::Writer(_) => Err(RuntimeError::new(
                RuntimeReason::Structural,
                format!(
                    "safe writer {} can only be used as the last command of a pipeline",
                    func.name()
                ),
            )),
        }
    }
}

/// The function a callee expression evaluated to.
pub(super) fn callable(value: Value, callee: &Expr) -> Result<Func, RuntimeError> {
    match value {
        Value::Func(func) => Ok(func),
        other => Err(RuntimeError::new(
            RuntimeReason::NotCallable,
            format!("{callee} is not a function, it is {}", other.type_name()),
        )),
    }
}
