//! Variables visible to every render of a set.
//!
//! Identifier lookup falls back here once the scope chain misses: first the
//! globals the host added at runtime, then the defaults (builtins and
//! anything registered while building the set).

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::builtins;
use crate::value::Value;

pub struct Environment {
    globals: RwLock<HashMap<String, Value>>,
    defaults: HashMap<String, Value>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// An environment with the builtin functions as defaults.
    pub fn new() -> Self {
        let mut env = Self::empty();
        builtins::register(&mut env);
        env
    }

    /// An environment with nothing in it.
    pub fn empty() -> Self {
        Self {
            globals: RwLock::new(HashMap::new()),
            defaults: HashMap::new(),
        }
    }

    /// Add or replace a global. Safe while renders are running.
    pub fn add_global(&self, name: impl Into<String>, value: impl Into<Value>) {
        let mut globals = self.globals.write().unwrap_or_else(PoisonError::into_inner);
        globals.insert(name.into(), value.into());
    }

    /// Add or replace a default variable.
    pub fn set_default(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.defaults.insert(name.into(), value.into());
    }

    /// Globals shadow defaults.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let globals = self.globals.read().unwrap_or_else(PoisonError::into_inner);
        globals
            .get(name)
            .or_else(|| self.defaults.get(name))
            .cloned()
    }

    /// Every name defined here, sorted.
    pub fn names(&self) -> Vec<String> {
        let globals = self.globals.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = globals
            .keys()
            .chain(self.defaults.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globals_shadow_defaults() {
        let mut env = Environment::empty();
        env.set_default("site", "default");
        assert_eq!(env.lookup("site"), Some(Value::from("default")));
        env.add_global("site", "global");
        assert_eq!(env.lookup("site"), Some(Value::from("global")));
        assert_eq!(env.names(), vec!["site".to_string()]);
    }

    #[test]
    fn builtins_are_defaults() {
        let env = Environment::new();
        assert!(matches!(env.lookup("len"), Some(Value::Func(_))));
        assert!(env.lookup("nope").is_none());
    }
}
