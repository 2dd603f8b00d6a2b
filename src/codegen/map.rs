use super::frame::{Frame, Scope, Slot};
use super::generator::{Generator, Value};
use crate::asm::layout::FIRST_PARAM_OFFSET;
use crate::asm::{ArithOp, Cond, Instr, Intrinsic, Operand, Register};
use crate::lang::{Expr, Lambda, Type};
use log::debug;

/// Label-safe name of a type.
fn type_tag(ty: &Type) -> String {
    match ty {
        Type::Ref(_) => "ref".to_string(),
        Type::Class(name) => name.clone(),
        other => other.to_string(),
    }
}

impl Generator<'_, '_> {
    /// `map(lambda, vector)`: a fresh vector of the lambda applied to each
    /// element.
    ///
    /// The lambda is specialized once per distinct known element type.
    /// With more than one specialization each element is dispatched on its
    /// index to the one matching its recorded type.
    pub(super) fn gen_map(&mut self, lambda: &Expr, vector: &Expr, frame: &mut Frame) -> Value {
        let Expr::Lambda(lambda) = lambda else {
            return self.placeholder("map expects a lambda".to_string());
        };

        let elements = self
            .element_types(vector, frame)
            .unwrap_or_else(|| vec![Type::Int]);
        let mut variants: Vec<Type> = Vec::new();
        for ty in &elements {
            if !ty.is_unknown() && !variants.contains(ty) {
                variants.push(ty.clone());
            }
        }
        if variants.is_empty() {
            variants.push(Type::Int);
        }
        let specializations: Vec<(Type, String)> = variants
            .into_iter()
            .map(|ty| {
                let label = self.specialize(lambda, &ty);
                (ty, label)
            })
            .collect();

        // Result vector with the source's length.
        let (source, _) = self.gen_expr(vector, frame);
        let header = self.reg();
        self.emit(Instr::arith(ArithOp::Sub, header.clone(), &source, 1i64));
        let size = self.reg();
        self.emit(Instr::Ld {
            dst: size.clone(),
            addr: header.into(),
        });
        let cells = self.reg();
        self.emit(Instr::arith(ArithOp::Add, cells.clone(), &size, 1i64));
        let base = self.reg();
        self.emit(Instr::Intrinsic(Intrinsic::Mem {
            dst: base.clone(),
            size: cells.into(),
        }));
        self.emit(Instr::St {
            addr: (&base).into(),
            src: (&size).into(),
        });
        let out = self.reg();
        self.emit(Instr::arith(ArithOp::Add, out.clone(), base, 1i64));

        let i = self.reg();
        self.emit(Instr::mov(i.clone(), 0i64));
        let start = self.new_label();
        let end = self.new_label();
        self.label(start.clone());
        let done = self.reg();
        self.emit(Instr::Cmp {
            cond: Cond::Ge,
            dst: done.clone(),
            lhs: (&i).into(),
            rhs: size.into(),
        });
        self.emit(Instr::Bnz(done.into(), end.clone()));

        let element = self.reg();
        self.emit(Instr::Intrinsic(Intrinsic::Vget {
            dst: element.clone(),
            vector: (&source).into(),
            index: (&i).into(),
        }));
        let saved = self.save_registers();
        self.emit(Instr::Push(element.into()));
        let result = self.reg();

        match specializations.as_slice() {
            [(_, only)] => {
                self.emit(Instr::Call(only.clone()));
                self.emit(Instr::mov(result.clone(), Register::result()));
            }
            _ => self.dispatch(&elements, &specializations, &i, &result),
        }

        self.drop_args(1);
        self.restore_registers(&saved);
        let addr = self.reg();
        self.emit(Instr::arith(ArithOp::Add, addr.clone(), &out, &i));
        self.emit(Instr::St {
            addr: addr.into(),
            src: result.into(),
        });
        self.emit(Instr::arith(ArithOp::Add, i.clone(), &i, 1i64));
        self.emit(Instr::Br(start));
        self.label(end);

        (out, Type::Vector)
    }

    /// Chain of `index != k` tests picking the specialization for element
    /// `k`. Indices without a known type fall through to the first one.
    fn dispatch(
        &mut self,
        elements: &[Type],
        specializations: &[(Type, String)],
        index: &Register,
        result: &Register,
    ) {
        let finish = self.new_label();
        for (k, ty) in elements.iter().enumerate() {
            let Some((_, label)) = specializations.iter().find(|(t, _)| t == ty) else {
                continue;
            };
            let next = self.new_label();
            let miss = self.reg();
            self.emit(Instr::Cmp {
                cond: Cond::Ne,
                dst: miss.clone(),
                lhs: index.into(),
                rhs: Operand::Imm(k as i64),
            });
            self.emit(Instr::Bnz(miss.into(), next.clone()));
            self.emit(Instr::Call(label.clone()));
            self.emit(Instr::mov(result.clone(), Register::result()));
            self.emit(Instr::Br(finish.clone()));
            self.label(next);
        }
        if let Some((_, fallback)) = specializations.first() {
            self.emit(Instr::Call(fallback.clone()));
            self.emit(Instr::mov(result.clone(), Register::result()));
        }
        self.label(finish);
    }

    /// Emit the lambda as a one-parameter procedure whose parameter has
    /// type `ty`, jumped over where it is emitted.
    fn specialize(&mut self, lambda: &Lambda, ty: &Type) -> String {
        let tag = type_tag(ty);
        let name = format!("{}_lambda_{}", self.new_label(), tag);
        let skip = format!("{}_end_{}", self.new_label(), tag);
        debug!("specializing lambda '{}' for {}", name, ty);

        self.emit(Instr::Br(skip.clone()));
        let saved = self.reset_registers();
        let mut frame = Frame::procedure(&name, 0);
        frame.bind(&lambda.param, Slot::new(Scope::Param, FIRST_PARAM_OFFSET, ty.clone()));

        self.prologue(&name, 0);
        let (value, _) = self.gen_expr(&lambda.body, &mut frame);
        self.emit(Instr::mov(Register::result(), value));
        self.epilogue(&frame);
        self.restore_register_count(saved);
        self.label(skip);
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tags_are_label_safe() {
        assert_eq!(type_tag(&Type::Int), "int");
        assert_eq!(type_tag(&Type::ref_to(Type::Bool)), "ref");
        assert_eq!(type_tag(&Type::Class("Point".to_string())), "Point");
    }
}
