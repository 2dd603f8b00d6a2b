use crate::asm::layout::FIRST_LOCAL_OFFSET;
use crate::lang::{Stmt, Type};
use std::collections::HashMap;

/// Where a variable lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// `fp - offset`
    Local,
    /// `fp + offset`
    Param,
    /// `[this] + offset`
    Field,
    /// `GLOBAL_BASE + offset`
    Global,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub scope: Scope,
    pub offset: i64,
    pub ty: Type,
    /// Element types of a vector, where known.
    pub elements: Option<Vec<Type>>,
}

impl Slot {
    pub fn new(scope: Scope, offset: i64, ty: Type) -> Self {
        Slot {
            scope,
            offset,
            ty,
            elements: None,
        }
    }
}

/// Variable map of the procedure being generated. Top-level code runs in a
/// frame with no procedure, whose declarations become globals.
#[derive(Debug, Clone)]
pub struct Frame {
    proc: Option<String>,
    pub vars: HashMap<String, Slot>,
    next_local: i64,
    pub local_count: usize,
}

impl Frame {
    pub fn global() -> Self {
        Frame {
            proc: None,
            vars: HashMap::new(),
            next_local: FIRST_LOCAL_OFFSET,
            local_count: 0,
        }
    }

    pub fn procedure(label: &str, local_count: usize) -> Self {
        Frame {
            proc: Some(label.to_string()),
            local_count,
            ..Frame::global()
        }
    }

    pub fn is_procedure(&self) -> bool {
        self.proc.is_some()
    }

    /// Label of the procedure being generated.
    pub fn label(&self) -> Option<&str> {
        self.proc.as_deref()
    }

    /// Label of the shared epilogue that `return` branches to.
    pub fn return_label(&self) -> Option<String> {
        self.proc.as_ref().map(|label| format!("L_{}_return", label))
    }

    pub fn bind(&mut self, name: &str, slot: Slot) -> Option<Slot> {
        self.vars.insert(name.to_string(), slot)
    }

    /// Next free local slot offset.
    pub fn alloc_local(&mut self) -> i64 {
        let offset = self.next_local;
        self.next_local += 1;
        offset
    }
}

/// Stack slots a body needs: one per declaration and one per `for` loop
/// variable, not descending into nested functions or classes.
pub fn count_locals(body: &[Stmt]) -> usize {
    body.iter().map(count_stmt).sum()
}

fn count_stmt(stmt: &Stmt) -> usize {
    match stmt {
        Stmt::Let(_) => 1,
        Stmt::For { body, .. } => 1 + count_locals(body),
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => count_locals(then_branch) + else_branch.as_deref().map_or(0, count_locals),
        Stmt::While { body, .. } | Stmt::Block(body) => count_locals(body),
        Stmt::Expr(_) | Stmt::Function(_) | Stmt::Class(_) | Stmt::Return(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::build::*;

    #[test]
    fn test_count_locals() {
        let body = vec![
            let_typed("a", Type::Int, int(1)),
            if_else(
                boolean(true),
                vec![declare("b", Type::Int)],
                vec![block(vec![declare("c", Type::Int)])],
            ),
            for_loop("i", int(0), int(3), vec![declare("d", Type::Int)]),
            while_loop(boolean(false), vec![declare("e", Type::Int)]),
            function("inner", vec![], Type::Null, vec![declare("z", Type::Int)]),
        ];
        assert_eq!(count_locals(&body), 6);
    }

    #[test]
    fn test_frames() {
        let mut frame = Frame::procedure("Point_init", 2);
        assert_eq!(frame.label(), Some("Point_init"));
        assert_eq!(frame.return_label().as_deref(), Some("L_Point_init_return"));
        assert_eq!(frame.alloc_local(), 1);
        assert_eq!(frame.alloc_local(), 2);
        assert!(!Frame::global().is_procedure());
        assert_eq!(Frame::global().return_label(), None);
    }
}
