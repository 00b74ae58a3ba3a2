//! Parsed template storage.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::template::Template;

/// Stores templates by canonical name. Must tolerate concurrent use.
pub trait Cache: Send + Sync {
    fn get(&self, path: &str) -> Option<Arc<Template>>;
    fn put(&self, path: &str, template: Arc<Template>);
}

/// A map behind a reader/writer lock.
#[derive(Debug, Default)]
pub struct InMemCache {
    templates: RwLock<HashMap<String, Arc<Template>>>,
}

impl InMemCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.templates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for InMemCache {
    fn get(&self, path: &str) -> Option<Arc<Template>> {
        let templates = self.templates.read().unwrap_or_else(PoisonError::into_inner);
        templates.get(path).cloned()
    }

    fn put(&self, path: &str, template: Arc<Template>) {
        let mut templates = self.templates.write().unwrap_or_else(PoisonError::into_inner);
        templates.insert(path.to_string(), template);
    }
}
