use crate::lang::{FunctionDecl, Type};
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Global,
    Local,
    Param,
    Field,
    LoopVar,
    Function,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol<'a> {
    pub kind: SymbolKind,
    pub ty: Type,
    pub initialized: bool,
    /// Known integer value, for folding constant indices.
    pub constant: Option<i64>,
    /// Element types of a vector initialized from a literal.
    pub elements: Option<Vec<Type>>,
    /// Statically known vector length.
    pub size: Option<i64>,
    /// Declaration of a function symbol.
    pub function: Option<&'a FunctionDecl>,
}

impl<'a> Symbol<'a> {
    pub fn new(kind: SymbolKind, ty: Type, initialized: bool) -> Self {
        Symbol {
            kind,
            ty,
            initialized,
            constant: None,
            elements: None,
            size: None,
            function: None,
        }
    }

    pub fn function(decl: &'a FunctionDecl) -> Self {
        Symbol {
            function: Some(decl),
            ..Symbol::new(SymbolKind::Function, Type::Function, true)
        }
    }

    /// Variables whose uses are checked for prior initialization.
    pub fn tracks_initialization(&self) -> bool {
        matches!(
            self.kind,
            SymbolKind::Global | SymbolKind::Local | SymbolKind::LoopVar
        )
    }
}

type Frame<'a> = IndexMap<String, Symbol<'a>>;

/// Lexical scopes as a stack of frames. Frame 0 holds globals and
/// functions.
///
/// Updating a symbol from an inner frame writes a shadow copy into the
/// innermost frame, so the outer entry is untouched once that frame pops.
#[derive(Debug, Clone)]
pub struct SymbolTable<'a> {
    frames: Vec<Frame<'a>>,
}

impl Default for SymbolTable<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> SymbolTable<'a> {
    pub fn new() -> Self {
        SymbolTable {
            frames: vec![Frame::new()],
        }
    }

    pub fn push(&mut self) {
        self.frames.push(Frame::new());
    }

    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol<'a>> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    /// Lookup restricted to the innermost frame.
    pub fn lookup_local(&self, name: &str) -> Option<&Symbol<'a>> {
        self.frames.last().and_then(|frame| frame.get(name))
    }

    pub fn declare(&mut self, name: &str, symbol: Symbol<'a>) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), symbol);
        }
    }

    /// Apply `f` to the visible symbol `name`, copying it into the innermost
    /// frame first when it lives further out. Returns false when undeclared.
    pub fn update(&mut self, name: &str, f: impl FnOnce(&mut Symbol<'a>)) -> bool {
        let Some(depth) = self
            .frames
            .iter()
            .rposition(|frame| frame.contains_key(name))
        else {
            return false;
        };
        let top = self.frames.len() - 1;
        if depth != top {
            let Some(copy) = self.frames[depth].get(name).cloned() else {
                return false;
            };
            self.frames[top].insert(name.to_string(), copy);
        }
        match self.frames[top].get_mut(name) {
            Some(symbol) => {
                f(symbol);
                true
            }
            None => false,
        }
    }

    pub fn mark_initialized(&mut self, name: &str) -> bool {
        self.update(name, |symbol| symbol.initialized = true)
    }

    /// Drop the known value of `name` in every frame that holds it. An
    /// assignment may sit on a path that does not always run, so no copy
    /// keeps describing the declaration-time value.
    pub fn forget_value(&mut self, name: &str) {
        for frame in &mut self.frames {
            if let Some(symbol) = frame.get_mut(name) {
                symbol.constant = None;
                symbol.size = None;
                symbol.elements = None;
            }
        }
    }

    /// A function symbol visible from the current scope.
    pub fn function(&self, name: &str) -> Option<&'a FunctionDecl> {
        self.lookup(name).and_then(|symbol| symbol.function)
    }

    /// Global-frame symbols in declaration order.
    pub fn globals(&self) -> impl Iterator<Item = (&String, &Symbol<'a>)> {
        self.frames.iter().take(1).flat_map(|frame| frame.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(kind: SymbolKind, initialized: bool) -> Symbol<'static> {
        Symbol::new(kind, Type::Int, initialized)
    }

    #[test]
    fn test_inner_frames_shadow() {
        let mut table = SymbolTable::new();
        table.declare("x", var(SymbolKind::Global, true));
        table.push();
        table.declare("x", Symbol::new(SymbolKind::Local, Type::Bool, true));
        assert_eq!(table.lookup("x").map(|s| &s.ty), Some(&Type::Bool));
        table.pop();
        assert_eq!(table.lookup("x").map(|s| &s.ty), Some(&Type::Int));
    }

    #[test]
    fn test_initialization_inside_frame_does_not_leak() {
        let mut table = SymbolTable::new();
        table.declare("g", var(SymbolKind::Global, false));
        table.push();
        assert!(table.mark_initialized("g"));
        assert!(table.lookup("g").unwrap().initialized);
        table.pop();
        assert!(!table.lookup("g").unwrap().initialized);
    }

    #[test]
    fn test_update_in_own_frame_persists() {
        let mut table = SymbolTable::new();
        table.declare("g", var(SymbolKind::Global, false));
        assert!(table.mark_initialized("g"));
        assert!(table.lookup("g").unwrap().initialized);
        assert!(!table.mark_initialized("missing"));
    }

    #[test]
    fn test_forgetting_reaches_the_declaration() {
        let mut table = SymbolTable::new();
        let mut i = var(SymbolKind::Global, true);
        i.constant = Some(0);
        table.declare("i", i);
        table.push();
        table.mark_initialized("i");
        table.forget_value("i");
        table.pop();
        assert_eq!(table.lookup("i").unwrap().constant, None);
    }

    #[test]
    fn test_global_frame_never_pops() {
        let mut table = SymbolTable::new();
        table.pop();
        table.declare("x", var(SymbolKind::Global, true));
        assert_eq!(table.depth(), 1);
        assert_eq!(table.globals().count(), 1);
    }
}
