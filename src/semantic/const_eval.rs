use super::scope::SymbolTable;
use crate::lang::{BinaryOp, Expr, Type, UnaryOp};

/// Fold an integer expression built from literals, negation, `+ - * /`
/// and variables with a recorded constant. `None` when it cannot be
/// folded, including division by zero and overflow.
pub fn const_int(expr: &Expr, symbols: &SymbolTable<'_>) -> Option<i64> {
    match expr {
        Expr::Int(n) => Some(*n),
        Expr::Ident(name) => symbols
            .lookup(name)
            .filter(|symbol| symbol.ty == Type::Int)
            .and_then(|symbol| symbol.constant),
        Expr::Unary {
            op: UnaryOp::Neg,
            operand,
        } => const_int(operand, symbols)?.checked_neg(),
        Expr::Binary { op, left, right } => {
            let a = const_int(left, symbols)?;
            let b = const_int(right, symbols)?;
            match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                // Truncating, like the machine's `div`.
                BinaryOp::Div if b != 0 => a.checked_div(b),
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::build::*;
    use crate::semantic::scope::{Symbol, SymbolKind};

    #[test]
    fn test_folds_arithmetic() {
        let table = SymbolTable::new();
        let e = bin(BinaryOp::Mul, add(int(2), int(3)), neg(int(4)));
        assert_eq!(const_int(&e, &table), Some(-20));
    }

    #[test]
    fn test_division_truncates() {
        let table = SymbolTable::new();
        assert_eq!(
            const_int(&bin(BinaryOp::Div, int(-7), int(2)), &table),
            Some(-3)
        );
        assert_eq!(const_int(&bin(BinaryOp::Div, int(1), int(0)), &table), None);
    }

    #[test]
    fn test_constant_variables() {
        let mut table = SymbolTable::new();
        let mut n = Symbol::new(SymbolKind::Global, Type::Int, true);
        n.constant = Some(4);
        table.declare("n", n);
        table.declare("m", Symbol::new(SymbolKind::Global, Type::Int, true));
        assert_eq!(const_int(&add(ident("n"), int(1)), &table), Some(5));
        assert_eq!(const_int(&ident("m"), &table), None);
        assert_eq!(const_int(&bin(BinaryOp::Mod, int(5), int(2)), &table), None);
    }
}
