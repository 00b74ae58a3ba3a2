//! Variable scopes for the renderer.
//!
//! Scopes live in an arena and link to their parent by index. Entering a
//! control body, block or include pushes a frame; leaving pops it. A `yield
//! content` temporarily re-points the current frame at the scope where the
//! content was captured, so new frames always record their parent
//! explicitly instead of assuming the one below them.
//!
//! Each frame may carry a block map. Lookups walk outward through the
//! parent chain, so an included template sees its own blocks first and the
//! includer's after.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::BlockNode;
use crate::value::Value;

/// Named blocks visible to a template.
pub type BlockMap = Arc<HashMap<String, Arc<BlockNode>>>;

/// Index of a frame in the arena.
pub type ScopeId = usize;

#[derive(Debug, Default)]
struct Frame {
    parent: Option<ScopeId>,
    vars: HashMap<String, Value>,
    blocks: Option<BlockMap>,
}

/// The scope arena of one render.
#[derive(Debug)]
pub struct Scopes {
    frames: Vec<Frame>,
    current: ScopeId,
}

impl Default for Scopes {
    fn default() -> Self {
        Self::new()
    }
}

impl Scopes {
    /// An arena holding one empty root frame.
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::default()],
            current: 0,
        }
    }

    /// Drop every frame and start over with a root frame holding `blocks`.
    pub fn reset(&mut self, blocks: Option<BlockMap>) {
        self.frames.truncate(1);
        if let Some(root) = self.frames.first_mut() {
            root.vars.clear();
            root.blocks = blocks;
        }
        self.current = 0;
    }

    pub fn current(&self) -> ScopeId {
        self.current
    }

    /// Point lookups at another live frame.
    pub fn set_current(&mut self, id: ScopeId) {
        debug_assert!(id < self.frames.len());
        self.current = id;
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Push a child of the current frame and make it current.
    pub fn new_scope(&mut self) {
        self.push(None);
    }

    /// Like [`new_scope`](Self::new_scope), with its own block map.
    pub fn new_scope_with_blocks(&mut self, blocks: BlockMap) {
        self.push(Some(blocks));
    }

    fn push(&mut self, blocks: Option<BlockMap>) {
        self.frames.push(Frame {
            parent: Some(self.current),
            vars: HashMap::new(),
            blocks,
        });
        self.current = self.frames.len() - 1;
    }

    /// Pop the most recently pushed frame and return to its parent.
    ///
    /// The root frame is never popped.
    pub fn release_scope(&mut self) {
        if self.frames.len() > 1 {
            if let Some(frame) = self.frames.pop() {
                self.current = frame.parent.unwrap_or(0);
            }
        }
    }

    /// Bind `name` in the current frame, shadowing outer bindings.
    pub fn let_var(&mut self, name: impl Into<String>, value: Value) {
        self.frames[self.current].vars.insert(name.into(), value);
    }

    /// Assign to the nearest frame that already binds `name`.
    ///
    /// Returns false, changing nothing, if no frame does.
    pub fn set_var(&mut self, name: &str, value: Value) -> bool {
        let mut id = Some(self.current);
        while let Some(i) = id {
            let frame = &mut self.frames[i];
            if let Some(slot) = frame.vars.get_mut(name) {
                *slot = value;
                return true;
            }
            id = frame.parent;
        }
        false
    }

    /// Assign if `name` is bound somewhere, otherwise bind it here.
    pub fn set_or_let(&mut self, name: &str, value: Value) {
        if self.resolve(name).is_some() {
            self.set_var(name, value);
        } else {
            self.let_var(name, value);
        }
    }

    /// Whether the current frame itself binds `name`.
    pub fn is_local(&self, name: &str) -> bool {
        self.frames[self.current].vars.contains_key(name)
    }

    pub fn resolve(&self, name: &str) -> Option<&Value> {
        self.chain().find_map(|frame| frame.vars.get(name))
    }

    pub fn lookup_block(&self, name: &str) -> Option<Arc<BlockNode>> {
        self.chain()
            .filter_map(|frame| frame.blocks.as_ref())
            .find_map(|blocks| blocks.get(name).cloned())
    }

    /// Frames from the current one outward.
    fn chain(&self) -> impl Iterator<Item = &Frame> {
        let mut id = Some(self.current);
        std::iter::from_fn(move || {
            let frame = &self.frames[id?];
            id = frame.parent;
            Some(frame)
        })
    }
}
