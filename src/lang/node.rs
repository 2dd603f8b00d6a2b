use super::types::Type;
use serde::{Deserialize, Serialize};

/// A statement of a NITLang program.
///
/// Statements appear at the top level of a program, inside function and
/// method bodies, and inside the bodies of control-flow constructs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// Expression evaluated for its effect: `f(1);`, `x = 2;`.
    Expr(Expr),

    /// `let name: type = value;` (type and value are each optional).
    Let(VarDecl),

    /// `func name(a: int) <int> { ... }`
    Function(FunctionDecl),

    /// `class Name { let f: int; func m() <null> { ... } }`
    Class(ClassDecl),

    // ─────────────────────────── Control flow ───────────────────────────
    /// `if cond then { ... } else { ... }`
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
    },

    /// `while cond do { ... }`
    While { condition: Expr, body: Vec<Stmt> },

    /// `for var in start..end { ... }`, iterating while `var < end`.
    For {
        var: String,
        start: Expr,
        end: Expr,
        body: Vec<Stmt>,
    },

    /// Nested `{ ... }`. Does not open a scope.
    Block(Vec<Stmt>),

    /// `return;` or `return expr;`
    Return(Option<Expr>),
}

/// Variable declaration. Also used for class fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: String,
    pub ty: Option<Type>,
    pub value: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Type,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    pub fields: Vec<VarDecl>,
    pub methods: Vec<FunctionDecl>,
}

/// `lambda x -> body`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lambda {
    pub param: String,
    pub body: Box<Expr>,
}

/// Left-hand side of `=` and `:=`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LValue {
    Name(String),
    Index { vector: Box<Expr>, index: Box<Expr> },
    Field { object: Box<Expr>, field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `!x`: logical not, or dereference when `x` is a reference.
    Not,
}

/// Expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    // ───────────────────────────── Leaves ───────────────────────────────
    Int(i64),
    Bool(bool),
    Str(String),
    Null,
    Ident(String),

    // ──────────────────────────── Operators ─────────────────────────────
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// `cond ? a : b`
    Ternary {
        condition: Box<Expr>,
        then_value: Box<Expr>,
        else_value: Box<Expr>,
    },

    // ─────────────────────────── Assignment ─────────────────────────────
    /// `target = value`
    Assign { target: LValue, value: Box<Expr> },
    /// `target := value`, storing through a reference.
    RefAssign { target: LValue, value: Box<Expr> },

    // ───────────────────────────── Vectors ──────────────────────────────
    /// `[a, b, c]`
    Vector(Vec<Expr>),
    /// `v[i]`
    Index { vector: Box<Expr>, index: Box<Expr> },

    // ──────────────────────────── Built-ins ─────────────────────────────
    Scan,
    Print(Box<Expr>),
    /// `list(n)`: fresh vector of `n` uninitialized elements.
    List(Box<Expr>),
    Length(Box<Expr>),
    Exit(Box<Expr>),

    // ──────────────────────────── References ────────────────────────────
    /// `ref x`
    Ref(String),

    // ───────────────────────────── Objects ──────────────────────────────
    /// `new Class(args)`
    New { class: String, args: Vec<Expr> },
    /// `object.method(args)`
    MethodCall {
        object: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    /// `object.field`
    Field { object: Box<Expr>, field: String },

    // ───────────────────────── Functions & lambdas ──────────────────────
    Lambda(Lambda),
    /// `map(lambda, vector)`. The first operand is expected to be a lambda.
    Map { lambda: Box<Expr>, vector: Box<Expr> },
    /// `name(args)`
    Call { name: String, args: Vec<Expr> },
}

impl Expr {
    /// Direct sub-expressions, in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Int(_)
            | Expr::Bool(_)
            | Expr::Str(_)
            | Expr::Null
            | Expr::Ident(_)
            | Expr::Scan
            | Expr::Ref(_) => Vec::new(),
            Expr::Binary { left, right, .. } => vec![left, right],
            Expr::Unary { operand, .. } => vec![operand],
            Expr::Ternary {
                condition,
                then_value,
                else_value,
            } => vec![condition, then_value, else_value],
            Expr::Assign { target, value } | Expr::RefAssign { target, value } => {
                let mut out = target.children();
                out.push(value);
                out
            }
            Expr::Vector(items) => items.iter().collect(),
            Expr::Index { vector, index } => vec![vector, index],
            Expr::Print(e) | Expr::List(e) | Expr::Length(e) | Expr::Exit(e) => vec![e],
            Expr::New { args, .. } | Expr::Call { args, .. } => args.iter().collect(),
            Expr::MethodCall { object, args, .. } => {
                let mut out: Vec<&Expr> = vec![object];
                out.extend(args.iter());
                out
            }
            Expr::Field { object, .. } => vec![object],
            Expr::Lambda(lambda) => vec![&lambda.body],
            Expr::Map { lambda, vector } => vec![lambda, vector],
        }
    }

    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Expr::Ident(name) => Some(name),
            _ => None,
        }
    }
}

impl LValue {
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            LValue::Name(_) => Vec::new(),
            LValue::Index { vector, index } => vec![vector, index],
            LValue::Field { object, .. } => vec![object],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children_of_method_call() {
        let call = Expr::MethodCall {
            object: Box::new(Expr::Ident("p".to_string())),
            method: "move".to_string(),
            args: vec![Expr::Int(1), Expr::Int(2)],
        };
        assert_eq!(
            call.children(),
            vec![
                &Expr::Ident("p".to_string()),
                &Expr::Int(1),
                &Expr::Int(2)
            ]
        );
    }

    #[test]
    fn test_operator_classes() {
        assert!(BinaryOp::Mod.is_arithmetic());
        assert!(BinaryOp::Ne.is_comparison());
        assert!(BinaryOp::Or.is_logical());
        assert!(!BinaryOp::Add.is_comparison());
    }
}
