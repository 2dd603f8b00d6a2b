//! Terse constructors for AST nodes.
//!
//! Front ends and tests build trees with these instead of spelling out
//! every `Box::new` by hand.

use super::node::*;
use super::types::Type;

// ───────────────────────────── Expressions ──────────────────────────────

pub fn int(n: i64) -> Expr {
    Expr::Int(n)
}

pub fn boolean(b: bool) -> Expr {
    Expr::Bool(b)
}

pub fn string(s: &str) -> Expr {
    Expr::Str(s.to_string())
}

pub fn null() -> Expr {
    Expr::Null
}

pub fn ident(name: &str) -> Expr {
    Expr::Ident(name.to_string())
}

pub fn bin(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

pub fn add(left: Expr, right: Expr) -> Expr {
    bin(BinaryOp::Add, left, right)
}

pub fn neg(operand: Expr) -> Expr {
    Expr::Unary {
        op: UnaryOp::Neg,
        operand: Box::new(operand),
    }
}

/// `!operand`, which dereferences when `operand` is a reference.
pub fn not(operand: Expr) -> Expr {
    Expr::Unary {
        op: UnaryOp::Not,
        operand: Box::new(operand),
    }
}

pub fn ternary(condition: Expr, then_value: Expr, else_value: Expr) -> Expr {
    Expr::Ternary {
        condition: Box::new(condition),
        then_value: Box::new(then_value),
        else_value: Box::new(else_value),
    }
}

pub fn assign(name: &str, value: Expr) -> Expr {
    Expr::Assign {
        target: LValue::Name(name.to_string()),
        value: Box::new(value),
    }
}

pub fn assign_index(vector: Expr, index: Expr, value: Expr) -> Expr {
    Expr::Assign {
        target: LValue::Index {
            vector: Box::new(vector),
            index: Box::new(index),
        },
        value: Box::new(value),
    }
}

pub fn assign_field(object: Expr, field: &str, value: Expr) -> Expr {
    Expr::Assign {
        target: LValue::Field {
            object: Box::new(object),
            field: field.to_string(),
        },
        value: Box::new(value),
    }
}

pub fn ref_assign(name: &str, value: Expr) -> Expr {
    Expr::RefAssign {
        target: LValue::Name(name.to_string()),
        value: Box::new(value),
    }
}

pub fn vector(items: Vec<Expr>) -> Expr {
    Expr::Vector(items)
}

pub fn index(vector: Expr, index: Expr) -> Expr {
    Expr::Index {
        vector: Box::new(vector),
        index: Box::new(index),
    }
}

pub fn scan() -> Expr {
    Expr::Scan
}

pub fn print(value: Expr) -> Expr {
    Expr::Print(Box::new(value))
}

pub fn list(size: Expr) -> Expr {
    Expr::List(Box::new(size))
}

pub fn length(vector: Expr) -> Expr {
    Expr::Length(Box::new(vector))
}

pub fn exit(code: Expr) -> Expr {
    Expr::Exit(Box::new(code))
}

pub fn reference(name: &str) -> Expr {
    Expr::Ref(name.to_string())
}

pub fn new(class: &str, args: Vec<Expr>) -> Expr {
    Expr::New {
        class: class.to_string(),
        args,
    }
}

pub fn method_call(object: Expr, method: &str, args: Vec<Expr>) -> Expr {
    Expr::MethodCall {
        object: Box::new(object),
        method: method.to_string(),
        args,
    }
}

pub fn field_access(object: Expr, field: &str) -> Expr {
    Expr::Field {
        object: Box::new(object),
        field: field.to_string(),
    }
}

pub fn lambda(param: &str, body: Expr) -> Expr {
    Expr::Lambda(Lambda {
        param: param.to_string(),
        body: Box::new(body),
    })
}

pub fn map(lambda: Expr, vector: Expr) -> Expr {
    Expr::Map {
        lambda: Box::new(lambda),
        vector: Box::new(vector),
    }
}

pub fn call(name: &str, args: Vec<Expr>) -> Expr {
    Expr::Call {
        name: name.to_string(),
        args,
    }
}

// ────────────────────────────── Statements ──────────────────────────────

pub fn expr(e: Expr) -> Stmt {
    Stmt::Expr(e)
}

/// `let name: ty = value;`
pub fn let_typed(name: &str, ty: Type, value: Expr) -> Stmt {
    Stmt::Let(VarDecl {
        name: name.to_string(),
        ty: Some(ty),
        value: Some(value),
    })
}

/// `let name = value;`
pub fn let_infer(name: &str, value: Expr) -> Stmt {
    Stmt::Let(VarDecl {
        name: name.to_string(),
        ty: None,
        value: Some(value),
    })
}

/// `let name: ty;`
pub fn declare(name: &str, ty: Type) -> Stmt {
    Stmt::Let(VarDecl {
        name: name.to_string(),
        ty: Some(ty),
        value: None,
    })
}

pub fn param(name: &str, ty: Type) -> Param {
    Param {
        name: name.to_string(),
        ty,
    }
}

pub fn function_decl(
    name: &str,
    params: Vec<Param>,
    return_type: Type,
    body: Vec<Stmt>,
) -> FunctionDecl {
    FunctionDecl {
        name: name.to_string(),
        params,
        return_type,
        body,
    }
}

pub fn function(name: &str, params: Vec<Param>, return_type: Type, body: Vec<Stmt>) -> Stmt {
    Stmt::Function(function_decl(name, params, return_type, body))
}

/// Class fields are plain declarations.
pub fn field(name: &str, ty: Type) -> VarDecl {
    VarDecl {
        name: name.to_string(),
        ty: Some(ty),
        value: None,
    }
}

pub fn field_init(name: &str, ty: Type, value: Expr) -> VarDecl {
    VarDecl {
        name: name.to_string(),
        ty: Some(ty),
        value: Some(value),
    }
}

/// Methods are function declarations; pass them through `function` and this
/// unwraps them.
pub fn class(name: &str, fields: Vec<VarDecl>, methods: Vec<Stmt>) -> Stmt {
    let methods = methods
        .into_iter()
        .filter_map(|stmt| match stmt {
            Stmt::Function(decl) => Some(decl),
            _ => None,
        })
        .collect();
    Stmt::Class(ClassDecl {
        name: name.to_string(),
        fields,
        methods,
    })
}

pub fn if_then(condition: Expr, then_branch: Vec<Stmt>) -> Stmt {
    Stmt::If {
        condition,
        then_branch,
        else_branch: None,
    }
}

pub fn if_else(condition: Expr, then_branch: Vec<Stmt>, else_branch: Vec<Stmt>) -> Stmt {
    Stmt::If {
        condition,
        then_branch,
        else_branch: Some(else_branch),
    }
}

pub fn while_loop(condition: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::While { condition, body }
}

pub fn for_loop(var: &str, start: Expr, end: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::For {
        var: var.to_string(),
        start,
        end,
        body,
    }
}

pub fn block(body: Vec<Stmt>) -> Stmt {
    Stmt::Block(body)
}

pub fn ret(value: Expr) -> Stmt {
    Stmt::Return(Some(value))
}
