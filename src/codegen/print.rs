use super::frame::Frame;
use super::generator::{Generator, Value};
use crate::asm::{Instr, Intrinsic, Register};
use crate::lang::{BinaryOp, Expr, Type};

impl Generator<'_, '_> {
    /// `print(value)`: one typed print per part, then a newline.
    ///
    /// A top-level `+` chain containing a string is printed part by part
    /// instead of being concatenated first; sub-chains without a string are
    /// still evaluated as arithmetic.
    pub(super) fn gen_print(&mut self, value: &Expr, frame: &mut Frame) -> Value {
        let mut parts = Vec::new();
        self.flatten(value, frame, &mut parts);

        for part in parts {
            let (reg, ty) = self.gen_expr(part, frame);
            let print = match ty {
                Type::Vector => Intrinsic::Vprint(reg.into()),
                Type::String => Intrinsic::Sprint(reg.into()),
                _ => Intrinsic::Iput(reg.into()),
            };
            self.emit(Instr::Intrinsic(print));
        }
        self.emit(Instr::Intrinsic(Intrinsic::Nl));
        (Register::result(), Type::Null)
    }

    fn flatten<'e>(&self, expr: &'e Expr, frame: &Frame, parts: &mut Vec<&'e Expr>) {
        match expr {
            Expr::Binary {
                op: BinaryOp::Add,
                left,
                right,
            } if self.concat_has_string(expr, frame) => {
                self.flatten(left, frame, parts);
                self.flatten(right, frame, parts);
            }
            other => parts.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::build::*;
    use crate::semantic::ClassTable;

    fn parts_of(e: &Expr) -> Vec<Expr> {
        let classes = ClassTable::new();
        let generator = Generator::new(&classes);
        let mut parts = Vec::new();
        generator.flatten(e, &Frame::global(), &mut parts);
        parts.into_iter().cloned().collect()
    }

    #[test]
    fn test_flatten_keeps_arithmetic_subchains() {
        let e = add(add(int(1), int(2)), string("a"));
        assert_eq!(parts_of(&e), vec![add(int(1), int(2)), string("a")]);
    }

    #[test]
    fn test_flatten_splits_string_chains() {
        let e = add(add(string("x="), int(1)), string("!"));
        assert_eq!(parts_of(&e), vec![string("x="), int(1), string("!")]);
        assert_eq!(parts_of(&int(4)), vec![int(4)]);
    }
}
