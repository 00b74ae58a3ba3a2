//! Default variables available to every template.
//!
//! Typed functions receive converted arguments; `isset`, `exec`,
//! `includeIfExists` and `writeJson` need the running renderer and are raw.

use std::sync::{Arc, OnceLock};

use anyhow::{bail, Context};

use crate::env::Environment;
use crate::escape::{escape_html, html_escaper, raw_writer};
use crate::interpreter::{Arguments, IntsRanger};
use crate::value::{Func, Param, Record, RecordType, Signature, Value, ValueMap};

/// Add every builtin to `env` as a default variable.
pub fn register(env: &mut Environment) {
    let mut typed = |name: &str, signature: Signature, f: fn(Vec<Value>) -> anyhow::Result<Value>| {
        env.set_default(name, Func::typed(name, signature, f));
    };

    typed("len", Signature::new([Param::Any]), len);
    typed("lower", Signature::new([Param::String]), |args| {
        Ok(Value::String(text(&args[0]).to_lowercase()))
    });
    typed("upper", Signature::new([Param::String]), |args| {
        Ok(Value::String(text(&args[0]).to_uppercase()))
    });
    typed("hasPrefix", Signature::new([Param::String, Param::String]), |args| {
        Ok(Value::Bool(text(&args[0]).starts_with(text(&args[1]))))
    });
    typed("hasSuffix", Signature::new([Param::String, Param::String]), |args| {
        Ok(Value::Bool(text(&args[0]).ends_with(text(&args[1]))))
    });
    typed("repeat", Signature::new([Param::String, Param::Int]), repeat);
    typed(
        "replace",
        Signature::variadic([Param::String, Param::String, Param::String, Param::Int]),
        replace,
    );
    typed("split", Signature::new([Param::String, Param::String]), |args| {
        let parts = text(&args[0]).split(text(&args[1])).map(Value::from);
        Ok(Value::list(parts))
    });
    typed("trimSpace", Signature::new([Param::String]), |args| {
        Ok(Value::from(text(&args[0]).trim()))
    });
    typed("html", Signature::new([Param::String]), |args| {
        Ok(Value::String(escape_html(text(&args[0]))))
    });
    typed("url", Signature::new([Param::String]), |args| {
        let encoded: String = url::form_urlencoded::byte_serialize(text(&args[0]).as_bytes()).collect();
        Ok(Value::String(encoded))
    });
    typed("json", Signature::new([Param::Any]), |args| {
        let encoded = serde_json::to_string(&args[0]).context("json")?;
        Ok(Value::String(encoded))
    });
    typed("map", Signature::variadic([Param::Any]), map);
    typed("slice", Signature::variadic([Param::Any]), |args| {
        Ok(Value::List(Arc::new(args)))
    });
    typed("ints", Signature::new([Param::Int, Param::Int]), |args| {
        let (Value::Int(from), Value::Int(to)) = (&args[0], &args[1]) else {
            bail!("ints expects two integers");
        };
        Ok(Value::Record(
            Record::new(ints_type()).with("From", *from).with("To", *to),
        ))
    });

    env.set_default("isset", Func::raw("isset", isset));
    env.set_default("exec", Func::raw("exec", exec));
    env.set_default("includeIfExists", Func::raw("includeIfExists", include_if_exists));
    env.set_default("writeJson", Func::raw("writeJson", write_json));

    env.set_default("raw", Func::writer("raw", raw_writer()));
    env.set_default("unsafe", Func::writer("unsafe", raw_writer()));
    env.set_default("safeHtml", Func::writer("safeHtml", html_escaper()));
}

/// The string inside an argument already converted to `Param::String`.
fn text(value: &Value) -> &str {
    value.as_str().unwrap_or_default()
}

fn len(args: Vec<Value>) -> anyhow::Result<Value> {
    let n = match &args[0] {
        Value::String(s) => s.len(),
        Value::Bytes(b) => b.len(),
        Value::List(items) => items.len(),
        Value::Map(map) => map.len(),
        Value::Null => 0,
        other => bail!("cannot take the length of {}", other.type_name()),
    };
    Ok(Value::Int(i64::try_from(n)?))
}

fn repeat(args: Vec<Value>) -> anyhow::Result<Value> {
    let count = args[1].as_i64().unwrap_or_default();
    let Ok(count) = usize::try_from(count) else {
        bail!("negative repeat count {count}");
    };
    Ok(Value::String(text(&args[0]).repeat(count)))
}

/// `replace s old new [n]`: replace the first `n` matches, all when `n` is
/// missing or negative.
fn replace(args: Vec<Value>) -> anyhow::Result<Value> {
    if args.len() > 4 {
        bail!("expected 3 or 4 arguments, got {}", args.len());
    }
    let (s, from, to) = (text(&args[0]), text(&args[1]), text(&args[2]));
    let replaced = match args.get(3).and_then(Value::as_i64) {
        Some(n) if n >= 0 => s.replacen(from, to, usize::try_from(n)?),
        _ => s.replace(from, to),
    };
    Ok(Value::String(replaced))
}

/// `map "k1" v1 "k2" v2 ...`
fn map(args: Vec<Value>) -> anyhow::Result<Value> {
    if args.len() % 2 != 0 {
        bail!("expected key/value pairs, got {} arguments", args.len());
    }
    let mut map = ValueMap::with_capacity(args.len() / 2);
    let mut args = args.into_iter();
    while let (Some(key), Some(value)) = (args.next(), args.next()) {
        let Some(key) = key.as_text() else {
            bail!("map keys must be strings, got {}", key.type_name());
        };
        map.insert(key.into_owned(), value);
    }
    Ok(Value::from(map))
}

fn ints_type() -> &'static Arc<RecordType> {
    static INTS: OnceLock<Arc<RecordType>> = OnceLock::new();
    INTS.get_or_init(|| {
        RecordType::builder("Ints")
            .field("From")
            .field("To")
            .range(|record| {
                let bound = |name| record.get(name).and_then(Value::as_i64).unwrap_or_default();
                Box::new(IntsRanger::new(bound("From"), bound("To")))
            })
            .build()
    })
}

/// True when every argument evaluates without error to a non-nil value.
fn isset(args: &mut Arguments<'_, '_>) -> anyhow::Result<Value> {
    if args.is_empty() {
        bail!("expected at least 1 argument");
    }
    for i in 0..args.len() {
        match args.get(i) {
            Ok(value) if !value.is_null() => {}
            _ => return Ok(Value::Bool(false)),
        }
    }
    Ok(Value::Bool(true))
}

/// Name and optional context of `exec` and `includeIfExists`.
fn template_args(args: &mut Arguments<'_, '_>) -> anyhow::Result<(String, Option<Value>)> {
    args.expect_count(1, 2)?;
    let name = args.get(0)?;
    let Some(name) = name.as_text().map(|n| n.into_owned()) else {
        bail!("template name must be a string, got {}", name.type_name());
    };
    let context = if args.len() == 2 { Some(args.get(1)?) } else { None };
    Ok((name, context))
}

/// Render another template in place and return its `return` value.
fn exec(args: &mut Arguments<'_, '_>) -> anyhow::Result<Value> {
    let (name, context) = template_args(args)?;
    Ok(args.runtime().execute_template(&name, context)?)
}

fn include_if_exists(args: &mut Arguments<'_, '_>) -> anyhow::Result<Value> {
    let (name, context) = template_args(args)?;
    args.runtime().include_if_exists(&name, context)?;
    Ok(Value::Null)
}

/// Write a value as JSON, unescaped.
fn write_json(args: &mut Arguments<'_, '_>) -> anyhow::Result<Value> {
    args.expect_count(1, 1)?;
    let value = args.get(0)?;
    let encoded = serde_json::to_vec(&value).context("writeJson")?;
    args.runtime().write(&encoded)?;
    Ok(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn call(name: &str, args: Vec<Value>) -> anyhow::Result<Value> {
        let env = Environment::new();
        let Some(Value::Func(f)) = env.lookup(name) else {
            panic!("{name} is not registered");
        };
        match f.kind() {
            crate::value::FuncKind::Typed { call, .. } => call(args),
            _ => panic!("{name} is not typed"),
        }
    }

    #[rstest]
    #[case::string(Value::from("héllo"), 6)]
    #[case::list(Value::list([1, 2, 3]), 3)]
    #[case::map(Value::map([("a", 1)]), 1)]
    #[case::nil(Value::Null, 0)]
    fn len_counts(#[case] value: Value, #[case] expected: i64) {
        assert_eq!(call("len", vec![value]).unwrap(), Value::Int(expected));
    }

    #[test]
    fn len_rejects_scalars() {
        assert!(call("len", vec![Value::Int(3)]).is_err());
    }

    #[rstest]
    #[case(vec!["aaa", "a", "b"], None, "bbb")]
    #[case(vec!["aaa", "a", "b"], Some(2), "bba")]
    #[case(vec!["aaa", "a", "b"], Some(-1), "bbb")]
    fn replace_limits(#[case] strs: Vec<&str>, #[case] n: Option<i64>, #[case] expected: &str) {
        let mut args: Vec<Value> = strs.into_iter().map(Value::from).collect();
        args.extend(n.map(Value::Int));
        assert_eq!(call("replace", args).unwrap(), Value::from(expected));
    }

    #[test]
    fn map_pairs_up_arguments() {
        let built = call("map", vec![Value::from("a"), Value::Int(1)]).unwrap();
        assert_eq!(built, Value::map([("a", 1)]));
        assert!(call("map", vec![Value::from("a")]).is_err());
        assert!(call("map", vec![Value::Int(1), Value::Int(1)]).is_err());
    }

    #[test]
    fn url_encodes_query_text() {
        assert_eq!(
            call("url", vec![Value::from("a b&c")]).unwrap(),
            Value::from("a+b%26c")
        );
    }

    #[test]
    fn split_and_repeat() {
        assert_eq!(
            call("split", vec![Value::from("a,b"), Value::from(",")]).unwrap(),
            Value::list(["a", "b"])
        );
        assert_eq!(
            call("repeat", vec![Value::from("ab"), Value::Int(2)]).unwrap(),
            Value::from("abab")
        );
        assert!(call("repeat", vec![Value::from("ab"), Value::Int(-2)]).is_err());
    }
}
