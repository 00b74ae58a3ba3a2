//! Host records: values of a registered record type.
//!
//! A [`RecordType`] is built once by the host and shared. It fixes the field
//! layout (so field lookups are a hash lookup into a slot table), the methods
//! callable from templates, and optional hooks that let a record render
//! itself or act as a range source.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::func::{Func, Signature};
use super::Value;
use crate::error::RuntimeError;
use crate::interpreter::{Ranger, Runtime};

/// A method: receives the record and already-converted arguments.
pub type MethodFn = Arc<dyn Fn(&Record, Vec<Value>) -> anyhow::Result<Value> + Send + Sync>;

/// Writes a record to the output in place of its default formatting.
pub type RenderFn = Arc<dyn Fn(&Record, &mut Runtime<'_>) -> Result<(), RuntimeError> + Send + Sync>;

/// Produces a fresh iterator over a record for `range`.
pub type RangeFn = Arc<dyn Fn(&Record) -> Box<dyn Ranger> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    /// Templates may only read exported fields.
    pub exported: bool,
}

#[derive(Clone)]
struct Method {
    signature: Signature,
    call: MethodFn,
}

/// Layout and behaviour shared by all records of one type.
pub struct RecordType {
    name: String,
    fields: Vec<FieldDef>,
    index: HashMap<String, usize>,
    methods: HashMap<String, Method>,
    render: Option<RenderFn>,
    range: Option<RangeFn>,
}

impl RecordType {
    pub fn builder(name: impl Into<String>) -> RecordTypeBuilder {
        RecordTypeBuilder {
            ty: RecordType {
                name: name.into(),
                fields: Vec::new(),
                index: HashMap::new(),
                methods: HashMap::new(),
                render: None,
                range: None,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Slot and definition of a field, matched case-sensitively.
    pub fn field(&self, name: &str) -> Option<(usize, &FieldDef)> {
        self.index.get(name).map(|&slot| (slot, &self.fields[slot]))
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn render_hook(&self) -> Option<&RenderFn> {
        self.render.as_ref()
    }

    pub fn range_hook(&self) -> Option<&RangeFn> {
        self.range.as_ref()
    }
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordType")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub struct RecordTypeBuilder {
    ty: RecordType,
}

impl RecordTypeBuilder {
    /// Add a field. Names starting with an uppercase letter are exported.
    pub fn field(self, name: impl Into<String>) -> Self {
        let name = name.into();
        let exported = name.chars().next().is_some_and(char::is_uppercase);
        self.field_with_visibility(name, exported)
    }

    pub fn field_with_visibility(mut self, name: impl Into<String>, exported: bool) -> Self {
        let name = name.into();
        match self.ty.index.get(&name) {
            Some(&slot) => self.ty.fields[slot].exported = exported,
            None => {
                self.ty.index.insert(name.clone(), self.ty.fields.len());
                self.ty.fields.push(FieldDef { name, exported });
            }
        }
        self
    }

    pub fn method<F>(mut self, name: impl Into<String>, signature: Signature, f: F) -> Self
    where
        F: Fn(&Record, Vec<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.ty.methods.insert(
            name.into(),
            Method {
                signature,
                call: Arc::new(f),
            },
        );
        self
    }

    pub fn render<F>(mut self, f: F) -> Self
    where
        F: Fn(&Record, &mut Runtime<'_>) -> Result<(), RuntimeError> + Send + Sync + 'static,
    {
        self.ty.render = Some(Arc::new(f));
        self
    }

    pub fn range<F>(mut self, f: F) -> Self
    where
        F: Fn(&Record) -> Box<dyn Ranger> + Send + Sync + 'static,
    {
        self.ty.range = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Arc<RecordType> {
        Arc::new(self.ty)
    }
}

/// An instance of a [`RecordType`].
#[derive(Clone)]
pub struct Record {
    ty: Arc<RecordType>,
    values: Arc<Vec<Value>>,
}

impl Record {
    /// A record with every field set to nil.
    pub fn new(ty: &Arc<RecordType>) -> Self {
        Self {
            ty: ty.clone(),
            values: Arc::new(vec![Value::Null; ty.fields.len()]),
        }
    }

    /// Set a field, builder style. Unknown names are ignored.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value.into());
        self
    }

    /// Set a field. Returns false if the type has no such field.
    pub fn set(&mut self, name: &str, value: Value) -> bool {
        match self.ty.index.get(name) {
            Some(&slot) => {
                Arc::make_mut(&mut self.values)[slot] = value;
                true
            }
            None => false,
        }
    }

    /// Read a field regardless of visibility.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.ty.index.get(name).map(|&slot| &self.values[slot])
    }

    pub fn record_type(&self) -> &Arc<RecordType> {
        &self.ty
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn exported_fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.ty
            .fields
            .iter()
            .zip(self.values.iter())
            .filter(|(def, _)| def.exported)
            .map(|(def, value)| (def.name.as_str(), value))
    }

    /// A method bound to this record, as a callable value.
    pub fn bound_method(&self, name: &str) -> Option<Func> {
        let Method { signature, call } = self.ty.methods.get(name)?.clone();
        let receiver = self.clone();
        let label = format!("{}.{}", self.ty.name, name);
        Some(Func::typed(label, signature, move |args| call(&receiver, args)))
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.ty, &other.ty)
            && (Arc::ptr_eq(&self.values, &other.values) || self.values == other.values)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(&self.ty.name);
        for (def, value) in self.ty.fields.iter().zip(self.values.iter()) {
            s.field(&def.name, value);
        }
        s.finish()
    }
}
