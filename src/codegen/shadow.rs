//! Types the generator can tell without emitting anything. They decide
//! print intrinsics, concatenation and map specializations.

use super::frame::{Frame, Scope, Slot};
use super::generator::{Generator, deref_type};
use crate::asm::layout::FIRST_PARAM_OFFSET;
use crate::lang::{BinaryOp, Expr, Type, UnaryOp};

/// Longest `list(n)` whose element types are tracked slot by slot.
const MAX_TRACKED_ELEMENTS: i64 = 1024;

impl Generator<'_, '_> {
    pub(super) fn static_type(&self, expr: &Expr, frame: &Frame) -> Type {
        let classes = self.classes;
        match expr {
            Expr::Int(_) => Type::Int,
            Expr::Bool(_) => Type::Bool,
            Expr::Str(_) => Type::String,
            Expr::Null => Type::Null,
            Expr::Ident(name) => self.slot_type(name, frame),

            Expr::Binary { op, left, right } => {
                let string = |e: &Expr| self.static_type(e, frame) == Type::String;
                if *op == BinaryOp::Add && (string(left) || string(right)) {
                    Type::String
                } else if op.is_arithmetic() {
                    Type::Int
                } else {
                    Type::Bool
                }
            }
            Expr::Unary {
                op: UnaryOp::Neg, ..
            } => Type::Int,
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
            } => match self.static_type(operand, frame) {
                Type::Ref(pointee) => deref_type(*pointee),
                _ => Type::Bool,
            },
            Expr::Ternary { then_value, .. } => self.static_type(then_value, frame),
            Expr::Assign { value, .. } | Expr::RefAssign { value, .. } => {
                self.static_type(value, frame)
            }

            Expr::Vector(_) | Expr::List(_) | Expr::Map { .. } => Type::Vector,
            Expr::Index { vector, index } => self.index_type(vector, index, frame),
            Expr::Scan | Expr::Length(_) => Type::Int,
            Expr::Print(_) => Type::Null,
            Expr::Exit(_) => Type::NoReturn,
            Expr::Ref(name) => Type::ref_to(self.slot_type(name, frame)),

            Expr::New { class, .. } => Type::Class(class.clone()),
            Expr::Field { object, field } => classes
                .of_type(&self.static_type(object, frame))
                .and_then(|class| class.field(field))
                .map(|info| info.ty.clone())
                .unwrap_or(Type::Unknown),
            Expr::MethodCall { object, method, .. } => classes
                .of_type(&self.static_type(object, frame))
                .and_then(|class| class.method(method))
                .map(|decl| decl.return_type.clone())
                .unwrap_or(Type::Unknown),

            Expr::Lambda(_) => Type::Function,
            Expr::Call { name, .. } => self
                .callee(name)
                .map(|callee| callee.return_type.clone())
                .unwrap_or(Type::Unknown),
        }
    }

    fn slot_type(&self, name: &str, frame: &Frame) -> Type {
        self.lookup(name, frame)
            .map(|slot| slot.ty.clone())
            .unwrap_or(Type::Unknown)
    }

    /// Type of `vector[index]`: the tracked element type for a constant
    /// index into a variable, `int` otherwise.
    pub(super) fn index_type(&self, vector: &Expr, index: &Expr, frame: &Frame) -> Type {
        let (Expr::Ident(name), Expr::Int(i)) = (vector, index) else {
            return Type::Int;
        };
        self.lookup(name, frame)
            .and_then(|slot| slot.elements.as_ref())
            .and_then(|elements| usize::try_from(*i).ok().and_then(|i| elements.get(i)))
            .filter(|ty| !ty.is_unknown())
            .cloned()
            .unwrap_or(Type::Int)
    }

    /// Per-element types of a vector value, where they can be known.
    pub(super) fn element_types(&self, value: &Expr, frame: &Frame) -> Option<Vec<Type>> {
        match value {
            Expr::Vector(items) => Some(
                items
                    .iter()
                    .map(|item| self.static_type(item, frame))
                    .collect(),
            ),
            Expr::List(size) => match **size {
                Expr::Int(n) if (0..=MAX_TRACKED_ELEMENTS).contains(&n) => {
                    Some(vec![Type::Unknown; n as usize])
                }
                _ => None,
            },
            Expr::Ident(name) => self.lookup(name, frame)?.elements.clone(),
            Expr::Map { lambda, vector } => {
                let Expr::Lambda(lambda) = &**lambda else {
                    return None;
                };
                let sources = self
                    .element_types(vector, frame)
                    .unwrap_or_else(|| vec![Type::Int]);
                let results = sources
                    .into_iter()
                    .map(|ty| {
                        if ty.is_unknown() {
                            return Type::Unknown;
                        }
                        // Same view the specialization gets: its parameter
                        // and the globals.
                        let mut body = Frame::procedure(&lambda.param, 0);
                        body.bind(&lambda.param, Slot::new(Scope::Param, FIRST_PARAM_OFFSET, ty));
                        self.static_type(&lambda.body, &body)
                    })
                    .collect();
                Some(results)
            }
            _ => None,
        }
    }

    /// Remember the type stored by `name[i] = value` for a constant `i`.
    pub(super) fn record_element(&mut self, vector: &Expr, index: &Expr, ty: &Type, frame: &mut Frame) {
        let (Expr::Ident(name), Expr::Int(i)) = (vector, index) else {
            return;
        };
        let Ok(i) = usize::try_from(*i) else {
            return;
        };
        if let Some(element) = self
            .lookup_mut(name, frame)
            .and_then(|slot| slot.elements.as_mut())
            .and_then(|elements| elements.get_mut(i))
        {
            *element = ty.clone();
        }
    }

    /// Whether a `+` chain has a string operand anywhere along it.
    pub(super) fn concat_has_string(&self, expr: &Expr, frame: &Frame) -> bool {
        match expr {
            Expr::Binary {
                op: BinaryOp::Add,
                left,
                right,
            } => self.concat_has_string(left, frame) || self.concat_has_string(right, frame),
            other => self.static_type(other, frame) == Type::String,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::build::*;
    use crate::semantic::ClassTable;

    fn frame_with(name: &str, slot: Slot) -> Frame {
        let mut frame = Frame::procedure("main", 1);
        frame.bind(name, slot);
        frame
    }

    #[test]
    fn test_static_types() {
        let classes = ClassTable::new();
        let generator = Generator::new(&classes);
        let frame = frame_with("s", Slot::new(Scope::Local, 1, Type::String));
        let t = |e: Expr| generator.static_type(&e, &frame);

        assert_eq!(t(add(int(1), ident("s"))), Type::String);
        assert_eq!(t(bin(BinaryOp::Mod, int(1), int(2))), Type::Int);
        assert_eq!(t(bin(BinaryOp::Ge, int(1), int(2))), Type::Bool);
        assert_eq!(t(reference("s")), Type::ref_to(Type::String));
        assert_eq!(t(ident("missing")), Type::Unknown);
    }

    #[test]
    fn test_element_tracking() {
        let classes = ClassTable::new();
        let mut generator = Generator::new(&classes);
        let mut slot = Slot::new(Scope::Local, 1, Type::Vector);
        slot.elements = generator.element_types(&list(int(2)), &Frame::global());
        let mut frame = frame_with("v", slot);

        assert_eq!(generator.index_type(&ident("v"), &int(0), &frame), Type::Int);
        generator.record_element(&ident("v"), &int(0), &Type::String, &mut frame);
        assert_eq!(generator.index_type(&ident("v"), &int(0), &frame), Type::String);
        // Out of range and dynamic indices are left alone.
        generator.record_element(&ident("v"), &int(9), &Type::String, &mut frame);
        assert_eq!(generator.index_type(&ident("v"), &ident("i"), &frame), Type::Int);
    }

    #[test]
    fn test_concat_detection() {
        let classes = ClassTable::new();
        let generator = Generator::new(&classes);
        let frame = Frame::global();
        assert!(generator.concat_has_string(&add(add(int(1), string("a")), int(2)), &frame));
        assert!(!generator.concat_has_string(&add(int(1), int(2)), &frame));
    }

    #[test]
    fn test_map_result_elements_follow_the_lambda() {
        let classes = ClassTable::new();
        let generator = Generator::new(&classes);
        let source = vector(vec![int(1), string("a"), list(int(1))]);
        let mapped = map(lambda("x", add(ident("x"), int(1))), source);
        assert_eq!(
            generator.element_types(&mapped, &Frame::global()),
            Some(vec![Type::Int, Type::String, Type::Int])
        );
    }
}
