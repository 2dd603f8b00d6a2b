use super::class_table::ClassTable;
use super::const_eval::const_int;
use super::scope::{SymbolKind, SymbolTable};
use crate::lang::{BinaryOp, Expr, Type, UnaryOp};

/// Static type of an expression in the current scope. Never reports
/// anything; what cannot be determined is `Type::Unknown`.
pub fn type_of(expr: &Expr, symbols: &SymbolTable<'_>, classes: &ClassTable<'_>) -> Type {
    let ty = |e: &Expr| type_of(e, symbols, classes);

    match expr {
        Expr::Int(_) => Type::Int,
        Expr::Bool(_) => Type::Bool,
        Expr::Str(_) => Type::String,
        Expr::Null => Type::Null,
        Expr::Ident(name) => symbols
            .lookup(name)
            .map(|symbol| symbol.ty.clone())
            .unwrap_or(Type::Unknown),

        Expr::Binary { op, left, right } => {
            if *op == BinaryOp::Add && concat_chain(expr, symbols, classes) {
                return Type::String;
            }
            let (l, r) = (ty(left), ty(right));
            if op.is_arithmetic() {
                if l == Type::Int && r == Type::Int {
                    return Type::Int;
                }
            } else if op.is_logical() {
                if l == Type::Bool && r == Type::Bool {
                    return Type::Bool;
                }
            } else if op.is_comparison() && is_scalar(&l) && is_scalar(&r) {
                return Type::Bool;
            }
            Type::Unknown
        }
        Expr::Unary { op, operand } => match (op, ty(operand)) {
            (UnaryOp::Neg, Type::Int) => Type::Int,
            (UnaryOp::Not, Type::Bool) => Type::Bool,
            (UnaryOp::Not, Type::Ref(pointee)) => *pointee,
            _ => Type::Unknown,
        },
        Expr::Ternary {
            then_value,
            else_value,
            ..
        } => {
            let (a, b) = (ty(then_value), ty(else_value));
            if a == b { a } else { Type::Unknown }
        }

        Expr::Assign { value, .. } | Expr::RefAssign { value, .. } => ty(value),

        Expr::Vector(_) | Expr::List(_) | Expr::Map { .. } => Type::Vector,
        Expr::Index { vector, index } => index_type(vector, index, symbols, classes),

        Expr::Scan | Expr::Length(_) => Type::Int,
        Expr::Print(_) => Type::Null,
        Expr::Exit(_) => Type::NoReturn,

        Expr::Ref(name) => Type::ref_to(ty(&Expr::Ident(name.clone()))),

        Expr::New { class, .. } => {
            if classes.contains(class) {
                Type::Class(class.clone())
            } else {
                Type::Unknown
            }
        }
        Expr::Field { object, field } => classes
            .of_type(&ty(object))
            .and_then(|class| class.field(field))
            .map(|info| info.ty.clone())
            .unwrap_or(Type::Unknown),
        Expr::MethodCall { object, method, .. } => classes
            .of_type(&ty(object))
            .and_then(|class| class.method(method))
            .map(|decl| decl.return_type.clone())
            .unwrap_or(Type::Unknown),

        Expr::Lambda(_) => Type::Function,
        Expr::Call { name, .. } => symbols
            .function(name)
            .map(|decl| decl.return_type.clone())
            .unwrap_or(Type::Unknown),
    }
}

fn is_scalar(ty: &Type) -> bool {
    matches!(ty, Type::Int | Type::Bool)
}

/// Whether a `+` chain has a string operand anywhere along it.
pub fn concat_chain(expr: &Expr, symbols: &SymbolTable<'_>, classes: &ClassTable<'_>) -> bool {
    match expr {
        Expr::Binary {
            op: BinaryOp::Add,
            left,
            right,
        } => concat_chain(left, symbols, classes) || concat_chain(right, symbols, classes),
        other => type_of(other, symbols, classes) == Type::String,
    }
}

fn index_type(
    vector: &Expr,
    index: &Expr,
    symbols: &SymbolTable<'_>,
    classes: &ClassTable<'_>,
) -> Type {
    match vector {
        Expr::Vector(_) => Type::Int,
        Expr::Ident(name) => {
            let Some(symbol) = symbols.lookup(name) else {
                return Type::Unknown;
            };
            if symbol.ty != Type::Vector {
                return Type::Unknown;
            }
            if symbol.kind == SymbolKind::Param {
                return Type::Int;
            }
            let element = const_int(index, symbols).and_then(|i| {
                let elements = symbol.elements.as_ref()?;
                usize::try_from(i).ok().and_then(|i| elements.get(i)).cloned()
            });
            element.unwrap_or(Type::Int)
        }
        other => {
            if type_of(other, symbols, classes) == Type::Vector {
                Type::Int
            } else {
                Type::Unknown
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::build::*;
    use crate::semantic::scope::Symbol;

    fn scope_with(name: &str, symbol: Symbol<'static>) -> SymbolTable<'static> {
        let mut table = SymbolTable::new();
        table.declare(name, symbol);
        table
    }

    #[test]
    fn test_operators() {
        let table = SymbolTable::new();
        let classes = ClassTable::new();
        let t = |e: Expr| type_of(&e, &table, &classes);

        assert_eq!(t(add(int(1), int(2))), Type::Int);
        assert_eq!(t(bin(BinaryOp::Mod, int(7), int(2))), Type::Int);
        assert_eq!(t(bin(BinaryOp::Lt, int(1), boolean(true))), Type::Bool);
        assert_eq!(t(bin(BinaryOp::And, boolean(true), int(1))), Type::Unknown);
        assert_eq!(t(neg(boolean(true))), Type::Unknown);
        assert_eq!(t(not(boolean(false))), Type::Bool);
    }

    #[test]
    fn test_string_concat_chain() {
        let table = SymbolTable::new();
        let classes = ClassTable::new();
        let e = add(add(int(1), string("x")), int(2));
        assert_eq!(type_of(&e, &table, &classes), Type::String);
        let e = add(bin(BinaryOp::Mul, int(1), int(2)), int(3));
        assert_eq!(type_of(&e, &table, &classes), Type::Int);
    }

    #[test]
    fn test_dereference() {
        let table = scope_with(
            "r",
            Symbol::new(SymbolKind::Local, Type::ref_to(Type::Bool), true),
        );
        let classes = ClassTable::new();
        assert_eq!(type_of(&not(ident("r")), &table, &classes), Type::Bool);
        assert_eq!(
            type_of(&reference("r"), &table, &classes),
            Type::ref_to(Type::ref_to(Type::Bool))
        );
    }

    #[test]
    fn test_index_uses_element_types() {
        let mut v = Symbol::new(SymbolKind::Global, Type::Vector, true);
        v.elements = Some(vec![Type::Int, Type::String]);
        v.size = Some(2);
        let table = scope_with("v", v);
        let classes = ClassTable::new();
        assert_eq!(type_of(&index(ident("v"), int(1)), &table, &classes), Type::String);
        assert_eq!(type_of(&index(ident("v"), int(5)), &table, &classes), Type::Int);
        assert_eq!(type_of(&index(ident("q"), int(0)), &table, &classes), Type::Unknown);
        assert_eq!(
            type_of(&index(vector(vec![int(1)]), int(0)), &table, &classes),
            Type::Int
        );
    }

    #[test]
    fn test_ternary_and_builtins() {
        let table = SymbolTable::new();
        let classes = ClassTable::new();
        let t = |e: Expr| type_of(&e, &table, &classes);
        assert_eq!(t(ternary(boolean(true), int(1), int(2))), Type::Int);
        assert_eq!(t(ternary(boolean(true), int(1), string("a"))), Type::Unknown);
        assert_eq!(t(exit(int(1))), Type::NoReturn);
        assert_eq!(t(print(int(1))), Type::Null);
        assert_eq!(t(list(int(3))), Type::Vector);
        assert_eq!(t(lambda("x", ident("x"))), Type::Function);
        assert_eq!(t(new("Missing", vec![])), Type::Unknown);
    }
}
