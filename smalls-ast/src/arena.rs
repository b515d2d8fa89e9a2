use typed_arena::Arena;

use crate::Program;

/// Owns every `Program` parsed for one compilation session.
///
/// The analysis passes in `smalls-resolver` borrow `&Program` out of here
/// for the lifetime of a compile; dropping the `ScriptArena` drops every
/// tree it holds in one move, which is what "AST nodes live as long as the
/// compilation unit" means in practice for a tree that, unlike the
/// expressions inside it, is never partially freed.
pub struct ScriptArena {
    programs: Arena<Program>,
}

impl ScriptArena {
    pub fn new() -> Self {
        Self {
            programs: Arena::new(),
        }
    }

    /// Move `program` into the arena and hand back a stable reference to it.
    pub fn alloc_program(&self, program: Program) -> &Program {
        self.programs.alloc(program)
    }
}

impl Default for ScriptArena {
    fn default() -> Self {
        Self::new()
    }
}
