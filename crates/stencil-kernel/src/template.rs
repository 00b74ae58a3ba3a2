//! Parsed, linked templates.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::ast::{BlockNode, Node};
use crate::interpreter::BlockMap;
use crate::lexer::{quote, DEFAULT_LEFT_DELIM as L, DEFAULT_RIGHT_DELIM as R};
use crate::parser::{ParsedTemplate, Reference};

/// A template with its `extends` parent and imports resolved.
///
/// Immutable once built and shared as `Arc<Template>`, so one parse serves
/// any number of concurrent renders.
#[derive(Debug)]
pub struct Template {
    name: Arc<str>,
    extends_ref: Option<Reference>,
    import_refs: Vec<Reference>,
    extends: Option<Arc<Template>>,
    imports: Vec<Arc<Template>>,
    root: Vec<Node>,
    /// Blocks declared in this template's own source.
    declared: HashMap<String, Arc<BlockNode>>,
    /// Blocks visible when this template renders: the parent's, then each
    /// import's, then its own, later ones replacing earlier ones.
    blocks: BlockMap,
}

impl Template {
    /// Link a parsed template to its already-built parent and imports.
    pub fn assemble(
        parsed: ParsedTemplate,
        extends: Option<Arc<Template>>,
        imports: Vec<Arc<Template>>,
    ) -> Self {
        let mut blocks = HashMap::new();
        let linked = extends.iter().chain(imports.iter());
        for template in linked {
            for (name, block) in template.blocks.iter() {
                blocks.insert(name.clone(), block.clone());
            }
        }
        for (name, block) in &parsed.blocks {
            blocks.insert(name.clone(), block.clone());
        }

        Self {
            name: Arc::from(parsed.name),
            extends_ref: parsed.extends,
            import_refs: parsed.imports,
            extends,
            imports,
            root: parsed.root,
            declared: parsed.blocks,
            blocks: Arc::new(blocks),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_arc(&self) -> Arc<str> {
        self.name.clone()
    }

    pub fn root(&self) -> &[Node] {
        &self.root
    }

    /// Merged block map.
    pub fn blocks(&self) -> &BlockMap {
        &self.blocks
    }

    pub fn block(&self, name: &str) -> Option<&Arc<BlockNode>> {
        self.blocks.get(name)
    }

    /// Blocks declared in this template's own source.
    pub fn declared_blocks(&self) -> &HashMap<String, Arc<BlockNode>> {
        &self.declared
    }

    pub fn extends(&self) -> Option<&Arc<Template>> {
        self.extends.as_ref()
    }

    pub fn imports(&self) -> &[Arc<Template>] {
        &self.imports
    }

    /// The template at the top of the `extends` chain; rendering starts
    /// from its root.
    pub fn root_template(&self) -> &Template {
        let mut current = self;
        while let Some(parent) = &current.extends {
            current = parent;
        }
        current
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = &self.extends_ref {
            write!(f, "{L} extends {} {R}", quote(&parent.path))?;
        }
        for import in &self.import_refs {
            write!(f, "{L} import {} {R}", quote(&import.path))?;
        }
        for node in &self.root {
            write!(f, "{node}")?;
        }
        Ok(())
    }
}
