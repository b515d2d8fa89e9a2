use std::collections::HashMap;
use std::sync::Arc;

use smalls_types::TypeId;

/// A name as it is visible across module boundaries: what it resolves to
/// and what importers are allowed to see of it.
#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub name: String,
    pub type_id: TypeId,
    pub is_const: bool,
    pub is_function: bool,
}

impl Export {
    pub fn new(name: impl Into<String>, type_id: TypeId) -> Self {
        Self {
            name: name.into(),
            type_id,
            is_const: false,
            is_function: false,
        }
    }
}

#[derive(Debug, Default)]
struct Frame {
    bindings: HashMap<String, Export>,
}

/// Structurally-shared name table: pushing a scope shares every binding
/// from its parent without copying, and dropping the child frame is the
/// only thing `end_scope` needs to do. Closures capture a scope by cloning
/// the `Arc<Frame>` chain, never by deep-copying bindings.
#[derive(Debug, Clone)]
pub struct Environment {
    frames: Vec<Arc<Frame>>,
}

impl Environment {
    pub fn new() -> Self {
        Self {
            frames: vec![Arc::new(Frame::default())],
        }
    }

    pub fn begin_scope(&mut self) {
        self.frames.push(Arc::new(Frame::default()));
    }

    pub fn end_scope(&mut self) {
        self.frames.pop();
        if self.frames.is_empty() {
            self.frames.push(Arc::new(Frame::default()));
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Declares `export` in the innermost scope. Returns `false` (and
    /// leaves the existing binding untouched) if the name is already bound
    /// in that same scope -- shadowing an outer scope is fine, redeclaring
    /// within one is not.
    pub fn declare(&mut self, export: Export) -> bool {
        let frame = Arc::make_mut(self.frames.last_mut().expect("at least one frame"));
        if frame.bindings.contains_key(&export.name) {
            return false;
        }
        frame.bindings.insert(export.name.clone(), export);
        true
    }

    pub fn resolve(&self, name: &str) -> Option<&Export> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.bindings.get(name))
    }

    /// Like `resolve`, but also returns the frame index the binding was
    /// found in (0 = module/global scope). Used by capture analysis to tell
    /// whether a name was declared inside the current lambda or somewhere
    /// outside it.
    pub fn resolve_with_depth(&self, name: &str) -> Option<(&Export, usize)> {
        self.frames
            .iter()
            .enumerate()
            .rev()
            .find_map(|(depth, frame)| frame.bindings.get(name).map(|export| (export, depth)))
    }

    /// Every name visible right now, innermost scope first -- used to build
    /// "did you mean?" suggestion lists.
    pub fn visible_names(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut names = Vec::new();
        for frame in self.frames.iter().rev() {
            for name in frame.bindings.keys() {
                if seen.insert(name.clone()) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    /// Snapshot of the current scope chain flattened into one export map,
    /// the shape a module's public symbol table is published as.
    pub fn snapshot(&self) -> HashMap<String, Export> {
        let mut flat = HashMap::new();
        for frame in &self.frames {
            for (name, export) in &frame.bindings {
                flat.insert(name.clone(), export.clone());
            }
        }
        flat
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_scope_shadows_without_mutating_outer() {
        let mut env = Environment::new();
        env.declare(Export::new("x", TypeId::INT));
        env.begin_scope();
        env.declare(Export::new("x", TypeId::STRING));
        assert_eq!(env.resolve("x").unwrap().type_id, TypeId::STRING);
        env.end_scope();
        assert_eq!(env.resolve("x").unwrap().type_id, TypeId::INT);
    }

    #[test]
    fn redeclaring_in_same_scope_is_rejected() {
        let mut env = Environment::new();
        assert!(env.declare(Export::new("x", TypeId::INT)));
        assert!(!env.declare(Export::new("x", TypeId::STRING)));
    }

    #[test]
    fn unresolved_name_is_none() {
        let env = Environment::new();
        assert!(env.resolve("missing").is_none());
    }
}
