use super::frame::{Frame, Scope, Slot, count_locals};
use crate::asm::layout::{FIRST_PARAM_OFFSET, GLOBAL_BASE, NULL_DEREF_EXIT};
use crate::asm::{ArithOp, Cond, Instr, Intrinsic, Line, Operand, Register};
use crate::lang::{
    BinaryOp, ClassDecl, Expr, FunctionDecl, LValue, Program, Stmt, Type, UnaryOp, VarDecl,
};
use crate::semantic::ClassTable;
use log::debug;
use std::collections::{HashMap, HashSet};

/// Register holding a value, with the type the generator tracked for it.
pub(super) type Value = (Register, Type);

/// A free function as seen from a call site.
#[derive(Debug, Clone)]
pub(super) struct Callee {
    pub label: String,
    pub return_type: Type,
}

/// Tree walker that lowers a checked program to TSVM assembly.
///
/// Registers are numbered from `r1` per procedure and never reused within
/// one; `r0` only ever carries return values. Every call saves the live
/// registers `r1..rN` around itself, so a callee may clobber anything.
pub struct Generator<'g, 'a> {
    pub(super) classes: &'g ClassTable<'a>,
    /// Visible free functions, innermost scope last. The bottom scope
    /// holds the top-level ones.
    functions: Vec<HashMap<String, Callee>>,
    /// Procedure labels handed out so far.
    procs: HashSet<String>,
    lines: Vec<Line>,
    next_reg: u32,
    next_label: u32,
    pub(super) globals: HashMap<String, Slot>,
    next_global: i64,
}

impl<'g, 'a> Generator<'g, 'a> {
    pub fn new(classes: &'g ClassTable<'a>) -> Self {
        Generator {
            classes,
            functions: vec![HashMap::new()],
            procs: HashSet::new(),
            lines: Vec::new(),
            next_reg: 1,
            next_label: 0,
            globals: HashMap::new(),
            next_global: 0,
        }
    }

    pub fn generate(mut self, program: &Program) -> Vec<Line> {
        self.register_top_level(program);

        let mut frame = Frame::global();
        for stmt in &program.statements {
            self.gen_stmt(stmt, &mut frame);
        }
        debug!(
            "generated {} lines ({} globals, {} labels)",
            self.lines.len(),
            self.next_global,
            self.next_label
        );
        self.lines
    }

    // ───────────────────────────── Emission ─────────────────────────────

    pub(super) fn emit(&mut self, instr: Instr) {
        self.lines.push(Line::Instr(instr));
    }

    pub(super) fn label(&mut self, name: String) {
        self.lines.push(Line::Label(name));
    }

    pub(super) fn comment(&mut self, text: String) {
        self.lines.push(Line::Comment(text));
    }

    pub(super) fn reg(&mut self) -> Register {
        let reg = Register::r(self.next_reg);
        self.next_reg += 1;
        reg
    }

    pub(super) fn new_label(&mut self) -> String {
        self.next_label += 1;
        format!("L{}", self.next_label)
    }

    /// Stand-in for something that cannot be lowered: an error comment and
    /// a zeroed register, so generation always produces a whole program.
    pub(super) fn placeholder(&mut self, message: String) -> Value {
        self.comment(format!("Error: {}", message));
        let reg = self.reg();
        self.emit(Instr::mov(reg.clone(), 0i64));
        (reg, Type::Unknown)
    }

    /// Start numbering registers from `r1` for a new procedure. Returns the
    /// counter to put back once the procedure is done.
    pub(super) fn reset_registers(&mut self) -> u32 {
        std::mem::replace(&mut self.next_reg, 1)
    }

    pub(super) fn restore_register_count(&mut self, saved: u32) {
        self.next_reg = saved;
    }

    // ─────────────────────────── Calling convention ──────────────────────

    pub(super) fn prologue(&mut self, label: &str, locals: usize) {
        self.emit(Instr::Proc(label.to_string()));
        self.emit(Instr::Push(Register::Fp.into()));
        self.emit(Instr::mov(Register::Fp, Register::Sp));
        if locals > 0 {
            self.emit(Instr::arith(ArithOp::Sub, Register::Sp, Register::Sp, locals as i64));
        }
    }

    pub(super) fn epilogue(&mut self, frame: &Frame) {
        if let Some(label) = frame.return_label() {
            self.label(label);
        }
        if frame.local_count > 0 {
            self.emit(Instr::arith(
                ArithOp::Add,
                Register::Sp,
                Register::Sp,
                frame.local_count as i64,
            ));
        }
        self.emit(Instr::Pop(Register::Fp));
        self.emit(Instr::Ret);
    }

    pub(super) fn save_registers(&mut self) -> Vec<Register> {
        let live: Vec<Register> = (1..self.next_reg).map(Register::r).collect();
        for reg in &live {
            self.emit(Instr::Push(reg.into()));
        }
        live
    }

    pub(super) fn restore_registers(&mut self, saved: &[Register]) {
        for reg in saved.iter().rev() {
            self.emit(Instr::Pop(reg.clone()));
        }
    }

    /// Push arguments right to left, so the first lands at `fp+2` (or
    /// `fp+3` behind a receiver). Returns how many were pushed.
    fn push_args(&mut self, args: &[Expr], frame: &mut Frame) -> i64 {
        for arg in args.iter().rev() {
            let (value, _) = self.gen_expr(arg, frame);
            self.emit(Instr::Push(value.into()));
        }
        args.len() as i64
    }

    pub(super) fn drop_args(&mut self, count: i64) {
        if count > 0 {
            self.emit(Instr::arith(ArithOp::Add, Register::Sp, Register::Sp, count));
        }
    }

    pub(super) fn take_result(&mut self) -> Register {
        let reg = self.reg();
        self.emit(Instr::mov(reg.clone(), Register::result()));
        reg
    }

    /// Exit with `NULL_DEREF_EXIT` unless `pointer` is non-zero.
    fn null_check(&mut self, pointer: &Register) {
        let ok = self.new_label();
        self.emit(Instr::Bnz(pointer.into(), ok.clone()));
        let code = self.reg();
        self.emit(Instr::mov(code.clone(), NULL_DEREF_EXIT));
        self.emit(Instr::Intrinsic(Intrinsic::Exit(code.into())));
        self.label(ok);
    }

    // ───────────────────────────── Functions ────────────────────────────

    /// Top-level functions are callable from anywhere and keep their own
    /// names as labels. Method labels are reserved too, so a nested
    /// function never takes one.
    fn register_top_level(&mut self, program: &Program) {
        for decl in program.functions() {
            if self.procs.insert(decl.name.clone()) {
                self.bind_function(decl, decl.name.clone());
            }
        }
        for class in program.classes() {
            for method in &class.methods {
                self.procs.insert(format!("{}_{}", class.name, method.name));
            }
        }
    }

    fn bind_function(&mut self, decl: &FunctionDecl, label: String) {
        let callee = Callee {
            label,
            return_type: decl.return_type.clone(),
        };
        if let Some(scope) = self.functions.last_mut() {
            scope.insert(decl.name.clone(), callee);
        }
    }

    /// Innermost visible function called `name`.
    pub(super) fn callee(&self, name: &str) -> Option<&Callee> {
        self.functions.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Label for a function nested in `outer`: `outer_name`, numbered when
    /// a sibling scope already used it.
    fn nested_label(&mut self, outer: &str, name: &str) -> String {
        let base = format!("{}_{}", outer, name);
        let mut label = base.clone();
        let mut n = 1;
        while self.procs.contains(&label) {
            n += 1;
            label = format!("{}_{}", base, n);
        }
        self.procs.insert(label.clone());
        label
    }

    // ───────────────────────────── Variables ────────────────────────────

    pub(super) fn lookup<'s>(&'s self, name: &str, frame: &'s Frame) -> Option<&'s Slot> {
        frame.vars.get(name).or_else(|| self.globals.get(name))
    }

    pub(super) fn lookup_mut<'s>(&'s mut self, name: &str, frame: &'s mut Frame) -> Option<&'s mut Slot> {
        match frame.vars.get_mut(name) {
            Some(slot) => Some(slot),
            None => self.globals.get_mut(name),
        }
    }

    /// Bind `name` to a fresh slot: a local inside a procedure, a global at
    /// the top level. Returns the binding it shadows.
    fn declare(
        &mut self,
        name: &str,
        ty: Type,
        elements: Option<Vec<Type>>,
        frame: &mut Frame,
    ) -> Option<Slot> {
        if frame.is_procedure() {
            let mut slot = Slot::new(Scope::Local, frame.alloc_local(), ty);
            slot.elements = elements;
            frame.bind(name, slot)
        } else {
            let mut slot = Slot::new(Scope::Global, self.next_global, ty);
            slot.elements = elements;
            self.next_global += 1;
            self.globals.insert(name.to_string(), slot)
        }
    }

    fn unbind(&mut self, name: &str, previous: Option<Slot>, frame: &mut Frame) {
        let vars = if frame.is_procedure() {
            &mut frame.vars
        } else {
            &mut self.globals
        };
        match previous {
            Some(slot) => {
                vars.insert(name.to_string(), slot);
            }
            None => {
                vars.remove(name);
            }
        }
    }

    /// Emit the address of a variable into a fresh register.
    fn address(&mut self, name: &str, frame: &Frame) -> Register {
        let Some(slot) = self.lookup(name, frame).cloned() else {
            return self.placeholder(format!("Var {} not in map", name)).0;
        };
        match slot.scope {
            Scope::Local => {
                let addr = self.reg();
                self.emit(Instr::arith(ArithOp::Sub, addr.clone(), Register::Fp, slot.offset));
                addr
            }
            Scope::Param => {
                let addr = self.reg();
                self.emit(Instr::arith(ArithOp::Add, addr.clone(), Register::Fp, slot.offset));
                addr
            }
            Scope::Field => {
                let this = self.address("this", frame);
                let object = self.reg();
                self.emit(Instr::Ld {
                    dst: object.clone(),
                    addr: this.into(),
                });
                let addr = self.reg();
                self.emit(Instr::arith(ArithOp::Add, addr.clone(), object, slot.offset));
                addr
            }
            Scope::Global => {
                let addr = self.reg();
                self.emit(Instr::mov(addr.clone(), GLOBAL_BASE + slot.offset));
                addr
            }
        }
    }

    fn load(&mut self, name: &str, frame: &Frame) -> Value {
        let Some(ty) = self.lookup(name, frame).map(|slot| slot.ty.clone()) else {
            return self.placeholder(format!("Var {} not in map", name));
        };
        let addr = self.address(name, frame);
        let value = self.reg();
        self.emit(Instr::Ld {
            dst: value.clone(),
            addr: addr.into(),
        });
        (value, ty)
    }

    fn store(&mut self, addr: Register, value: &Register) {
        self.emit(Instr::St {
            addr: addr.into(),
            src: value.into(),
        });
    }

    // ───────────────────────────── Statements ───────────────────────────

    fn gen_block(&mut self, body: &[Stmt], frame: &mut Frame) {
        for stmt in body {
            self.gen_stmt(stmt, frame);
        }
    }

    fn gen_stmt(&mut self, stmt: &Stmt, frame: &mut Frame) {
        match stmt {
            Stmt::Expr(expr) => {
                self.gen_expr(expr, frame);
            }
            Stmt::Let(decl) => self.gen_let(decl, frame),
            Stmt::Function(decl) => match frame.label() {
                Some(outer) => {
                    // Nested: callable from here on, and jumped over where
                    // it is declared.
                    let label = self.nested_label(outer, &decl.name);
                    self.bind_function(decl, label.clone());
                    let skip = self.new_label();
                    self.emit(Instr::Br(skip.clone()));
                    self.gen_procedure(decl, &label, None);
                    self.label(skip);
                }
                None => self.gen_procedure(decl, &decl.name, None),
            },
            Stmt::Class(decl) => self.gen_class(decl),

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let else_label = self.new_label();
                let end_label = self.new_label();
                let (cond, _) = self.gen_expr(condition, frame);
                self.emit(Instr::Bz(cond.into(), else_label.clone()));
                self.gen_block(then_branch, frame);
                self.emit(Instr::Br(end_label.clone()));
                self.label(else_label);
                if let Some(else_branch) = else_branch {
                    self.gen_block(else_branch, frame);
                }
                self.label(end_label);
            }
            Stmt::While { condition, body } => {
                let start = self.new_label();
                let end = self.new_label();
                self.label(start.clone());
                let (cond, _) = self.gen_expr(condition, frame);
                self.emit(Instr::Bz(cond.into(), end.clone()));
                self.gen_block(body, frame);
                self.emit(Instr::Br(start));
                self.label(end);
            }
            Stmt::For {
                var,
                start,
                end,
                body,
            } => self.gen_for(var, start, end, body, frame),
            Stmt::Block(body) => self.gen_block(body, frame),

            Stmt::Return(value) => {
                let Some(exit) = frame.return_label() else {
                    self.comment("Error: Return used outside of function".to_string());
                    return;
                };
                if let Some(value) = value {
                    let (result, _) = self.gen_expr(value, frame);
                    self.emit(Instr::mov(Register::result(), result));
                }
                self.emit(Instr::Br(exit));
            }
        }
    }

    fn gen_let(&mut self, decl: &VarDecl, frame: &mut Frame) {
        let value = decl.value.as_ref().map(|v| self.gen_expr(v, frame));
        let ty = match (&decl.ty, &value) {
            // A bare `ref` learns its pointee from the initializer.
            (Some(Type::Ref(pointee)), Some((_, actual @ Type::Ref(_)))) if pointee.is_unknown() => {
                actual.clone()
            }
            (Some(declared), _) => declared.clone(),
            (None, Some((_, actual))) => actual.clone(),
            (None, None) => Type::Unknown,
        };
        let elements = match (&ty, &decl.value) {
            (Type::Vector, Some(init)) => self.element_types(init, frame),
            _ => None,
        };
        self.declare(&decl.name, ty, elements, frame);

        if let Some((value, _)) = value {
            let addr = self.address(&decl.name, frame);
            self.store(addr, &value);
        }
    }

    /// `for var in start..end`: `end` is evaluated once, the body runs while
    /// `var < end`, and `var` steps by one after each pass.
    fn gen_for(&mut self, var: &str, start: &Expr, end: &Expr, body: &[Stmt], frame: &mut Frame) {
        let (first, _) = self.gen_expr(start, frame);
        let previous = self.declare(var, Type::Int, None, frame);
        let addr = self.address(var, frame);
        self.store(addr, &first);
        let (limit, _) = self.gen_expr(end, frame);

        let cond_label = self.new_label();
        let end_label = self.new_label();
        self.functions.push(HashMap::new());
        self.label(cond_label.clone());
        let (current, _) = self.load(var, frame);
        let cond = self.reg();
        self.emit(Instr::Cmp {
            cond: Cond::Lt,
            dst: cond.clone(),
            lhs: current.into(),
            rhs: limit.into(),
        });
        self.emit(Instr::Bz(cond.into(), end_label.clone()));

        self.gen_block(body, frame);

        let addr = self.address(var, frame);
        let step = self.reg();
        self.emit(Instr::Ld {
            dst: step.clone(),
            addr: (&addr).into(),
        });
        self.emit(Instr::arith(ArithOp::Add, step.clone(), &step, 1i64));
        self.store(addr, &step);
        self.emit(Instr::Br(cond_label));
        self.label(end_label);
        self.functions.pop();

        self.unbind(var, previous, frame);
    }

    /// Emit a procedure for a function or method. Registers restart at `r1`
    /// and are restored for the enclosing body afterwards.
    fn gen_procedure(&mut self, decl: &FunctionDecl, label: &str, class: Option<&str>) {
        let locals = count_locals(&decl.body);
        debug!("emitting procedure '{}' ({} locals)", label, locals);

        let saved = self.reset_registers();
        let mut frame = Frame::procedure(label, locals);
        let mut offset = FIRST_PARAM_OFFSET;
        if let Some(class) = class {
            let this = Slot::new(Scope::Param, offset, Type::Class(class.to_string()));
            frame.bind("this", this);
            offset += 1;
            if let Some(info) = self.classes.get(class) {
                for (name, field) in &info.fields {
                    let slot = Slot::new(Scope::Field, field.offset as i64, field.ty.clone());
                    frame.bind(name, slot);
                }
            }
        }
        for param in &decl.params {
            frame.bind(&param.name, Slot::new(Scope::Param, offset, param.ty.clone()));
            offset += 1;
        }

        self.prologue(label, locals);
        self.functions.push(HashMap::new());
        self.gen_block(&decl.body, &mut frame);
        self.functions.pop();
        self.epilogue(&frame);
        self.restore_register_count(saved);
    }

    fn gen_class(&mut self, decl: &ClassDecl) {
        let classes = self.classes;
        let registered = classes
            .get(&decl.name)
            .filter(|info| std::ptr::eq(info.decl, decl));
        let Some(info) = registered else {
            self.comment(format!("Error: Class {} was not registered", decl.name));
            return;
        };
        for method in info.methods.values() {
            let label = format!("{}_{}", decl.name, method.name);
            self.gen_procedure(method, &label, Some(&decl.name));
        }
    }

    // ──────────────────────────── Expressions ───────────────────────────

    pub(super) fn gen_expr(&mut self, expr: &Expr, frame: &mut Frame) -> Value {
        match expr {
            Expr::Int(n) => {
                let reg = self.reg();
                self.emit(Instr::mov(reg.clone(), *n));
                (reg, Type::Int)
            }
            Expr::Bool(b) => {
                let reg = self.reg();
                self.emit(Instr::mov(reg.clone(), i64::from(*b)));
                (reg, Type::Bool)
            }
            Expr::Str(text) => {
                let reg = self.reg();
                self.emit(Instr::Sload {
                    dst: reg.clone(),
                    text: text.clone(),
                });
                (reg, Type::String)
            }
            Expr::Null => {
                let reg = self.reg();
                self.emit(Instr::mov(reg.clone(), 0i64));
                (reg, Type::Null)
            }
            Expr::Ident(name) => self.load(name, frame),

            Expr::Binary { op, left, right } => self.gen_binary(*op, left, right, frame),
            Expr::Unary { op, operand } => self.gen_unary(*op, operand, frame),
            Expr::Ternary {
                condition,
                then_value,
                else_value,
            } => {
                let else_label = self.new_label();
                let end_label = self.new_label();
                let result = self.reg();
                let (cond, _) = self.gen_expr(condition, frame);
                self.emit(Instr::Bz(cond.into(), else_label.clone()));
                let (a, ty) = self.gen_expr(then_value, frame);
                self.emit(Instr::mov(result.clone(), a));
                self.emit(Instr::Br(end_label.clone()));
                self.label(else_label);
                let (b, _) = self.gen_expr(else_value, frame);
                self.emit(Instr::mov(result.clone(), b));
                self.label(end_label);
                (result, ty)
            }

            Expr::Assign { target, value } => self.gen_assign(target, value, frame),
            Expr::RefAssign { target, value } => self.gen_ref_assign(target, value, frame),

            Expr::Vector(items) => self.gen_vector(items, frame),
            Expr::Index { vector, index } => {
                let ty = self.index_type(vector, index, frame);
                let (base, _) = self.gen_expr(vector, frame);
                let (i, _) = self.gen_expr(index, frame);
                let dst = self.reg();
                self.emit(Instr::Intrinsic(Intrinsic::Vget {
                    dst: dst.clone(),
                    vector: base.into(),
                    index: i.into(),
                }));
                (dst, ty)
            }

            Expr::Scan => {
                let dst = self.reg();
                self.emit(Instr::Intrinsic(Intrinsic::Iget(dst.clone())));
                (dst, Type::Int)
            }
            Expr::Print(value) => self.gen_print(value, frame),
            Expr::List(size) => {
                let (n, _) = self.gen_expr(size, frame);
                let cells = self.reg();
                self.emit(Instr::arith(ArithOp::Add, cells.clone(), &n, 1i64));
                let base = self.reg();
                self.emit(Instr::Intrinsic(Intrinsic::Mem {
                    dst: base.clone(),
                    size: cells.into(),
                }));
                self.emit(Instr::St {
                    addr: (&base).into(),
                    src: n.into(),
                });
                let data = self.reg();
                self.emit(Instr::arith(ArithOp::Add, data.clone(), base, 1i64));
                (data, Type::Vector)
            }
            Expr::Length(vector) => {
                let (data, _) = self.gen_expr(vector, frame);
                let header = self.reg();
                self.emit(Instr::arith(ArithOp::Sub, header.clone(), data, 1i64));
                let len = self.reg();
                self.emit(Instr::Ld {
                    dst: len.clone(),
                    addr: header.into(),
                });
                (len, Type::Int)
            }
            Expr::Exit(code) => {
                let (code, _) = self.gen_expr(code, frame);
                self.emit(Instr::Intrinsic(Intrinsic::Exit(code.into())));
                (Register::result(), Type::NoReturn)
            }

            Expr::Ref(name) => {
                let Some(ty) = self.lookup(name, frame).map(|slot| slot.ty.clone()) else {
                    return self.placeholder(format!("Var {} not in map", name));
                };
                (self.address(name, frame), Type::ref_to(ty))
            }

            Expr::New { class, args } => self.gen_new(class, args, frame),
            Expr::MethodCall {
                object,
                method,
                args,
            } => self.gen_method_call(object, method, args, frame),
            Expr::Field { object, field } => {
                let (obj, ty) = self.gen_expr(object, frame);
                let classes = self.classes;
                let Some(info) = classes.of_type(&ty).and_then(|class| class.field(field)) else {
                    return self
                        .placeholder(format!("Access to field {} of unknown class {}", field, ty));
                };
                let addr = self.reg();
                self.emit(Instr::arith(ArithOp::Add, addr.clone(), obj, info.offset as i64));
                let value = self.reg();
                self.emit(Instr::Ld {
                    dst: value.clone(),
                    addr: addr.into(),
                });
                (value, info.ty.clone())
            }

            Expr::Lambda(_) => {
                let (reg, _) = self.placeholder("Lambda visited directly".to_string());
                (reg, Type::Function)
            }
            Expr::Map { lambda, vector } => self.gen_map(lambda, vector, frame),
            Expr::Call { name, args } => self.gen_call(name, args, frame),
        }
    }

    fn gen_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, frame: &mut Frame) -> Value {
        let (l, lt) = self.gen_expr(left, frame);
        let (r, rt) = self.gen_expr(right, frame);

        if op == BinaryOp::Add && (lt == Type::String || rt == Type::String) {
            let l = self.stringify(l, &lt);
            let r = self.stringify(r, &rt);
            let dst = self.reg();
            self.emit(Instr::Intrinsic(Intrinsic::Sconcat {
                dst: dst.clone(),
                left: l.into(),
                right: r.into(),
            }));
            return (dst, Type::String);
        }

        let dst = self.reg();
        match lower(op) {
            Lowered::Arith(arith) => {
                self.emit(Instr::arith(arith, dst.clone(), l, r));
                let ty = if op.is_logical() { Type::Bool } else { Type::Int };
                (dst, ty)
            }
            Lowered::Cmp(cond) => {
                self.emit(Instr::Cmp {
                    cond,
                    dst: dst.clone(),
                    lhs: l.into(),
                    rhs: r.into(),
                });
                (dst, Type::Bool)
            }
        }
    }

    /// String form of a concatenation operand.
    fn stringify(&mut self, reg: Register, ty: &Type) -> Register {
        match ty {
            Type::Int | Type::Bool => {
                let dst = self.reg();
                self.emit(Instr::Intrinsic(Intrinsic::Itos {
                    dst: dst.clone(),
                    value: reg.into(),
                }));
                dst
            }
            Type::Vector => {
                let dst = self.reg();
                self.emit(Instr::Intrinsic(Intrinsic::Vtos {
                    dst: dst.clone(),
                    vector: reg.into(),
                }));
                dst
            }
            _ => reg,
        }
    }

    fn gen_unary(&mut self, op: UnaryOp, operand: &Expr, frame: &mut Frame) -> Value {
        let (value, ty) = self.gen_expr(operand, frame);
        let dst = self.reg();
        match (op, ty) {
            (UnaryOp::Neg, _) => {
                self.emit(Instr::arith(ArithOp::Sub, dst.clone(), 0i64, value));
                (dst, Type::Int)
            }
            (UnaryOp::Not, Type::Ref(pointee)) => {
                self.null_check(&value);
                self.emit(Instr::Ld {
                    dst: dst.clone(),
                    addr: value.into(),
                });
                (dst, deref_type(*pointee))
            }
            (UnaryOp::Not, _) => {
                self.emit(Instr::Cmp {
                    cond: Cond::Eq,
                    dst: dst.clone(),
                    lhs: value.into(),
                    rhs: Operand::Imm(0),
                });
                (dst, Type::Bool)
            }
        }
    }

    fn gen_assign(&mut self, target: &LValue, value: &Expr, frame: &mut Frame) -> Value {
        let (src, ty) = self.gen_expr(value, frame);
        match target {
            LValue::Name(name) => {
                if self.lookup(name, frame).is_none() {
                    self.comment(format!("Error: Var {} not in map", name));
                    return (src, ty);
                }
                let addr = self.address(name, frame);
                self.store(addr, &src);
                if ty == Type::Vector {
                    let elements = self.element_types(value, frame);
                    if let Some(slot) = self.lookup_mut(name, frame) {
                        slot.elements = elements;
                    }
                }
            }
            LValue::Index { vector, index } => {
                let (base, _) = self.gen_expr(vector, frame);
                let (i, _) = self.gen_expr(index, frame);
                let addr = self.reg();
                self.emit(Instr::arith(ArithOp::Add, addr.clone(), base, i));
                self.store(addr, &src);
                self.record_element(vector, index, &ty, frame);
            }
            LValue::Field { object, field } => {
                let (obj, obj_ty) = self.gen_expr(object, frame);
                let classes = self.classes;
                match classes.of_type(&obj_ty).and_then(|class| class.field(field)) {
                    Some(info) => {
                        let addr = self.reg();
                        self.emit(Instr::arith(ArithOp::Add, addr.clone(), obj, info.offset as i64));
                        self.store(addr, &src);
                    }
                    None => self.comment(format!(
                        "Error: Assignment to field {} of unknown class {}",
                        field, obj_ty
                    )),
                }
            }
        }
        (src, ty)
    }

    /// `name := value` stores through the reference held in `name`.
    fn gen_ref_assign(&mut self, target: &LValue, value: &Expr, frame: &mut Frame) -> Value {
        let (src, ty) = self.gen_expr(value, frame);
        let LValue::Name(name) = target else {
            self.comment("Error: Reference assignment needs a variable target".to_string());
            return (src, ty);
        };
        let (pointer, _) = self.load(name, frame);
        self.null_check(&pointer);
        self.store(pointer, &src);
        (src, ty)
    }

    /// Vector literal: a length header followed by the elements. The value
    /// is the address of element 0.
    fn gen_vector(&mut self, items: &[Expr], frame: &mut Frame) -> Value {
        let len = items.len() as i64;
        let base = self.reg();
        self.emit(Instr::Intrinsic(Intrinsic::Mem {
            dst: base.clone(),
            size: Operand::Imm(len + 1),
        }));
        self.emit(Instr::St {
            addr: (&base).into(),
            src: Operand::Imm(len),
        });
        let data = self.reg();
        self.emit(Instr::arith(ArithOp::Add, data.clone(), base, 1i64));

        for (i, item) in items.iter().enumerate() {
            let (value, _) = self.gen_expr(item, frame);
            let addr = self.reg();
            self.emit(Instr::arith(ArithOp::Add, addr.clone(), &data, i as i64));
            self.store(addr, &value);
        }
        (data, Type::Vector)
    }

    fn gen_new(&mut self, class: &str, args: &[Expr], frame: &mut Frame) -> Value {
        let classes = self.classes;
        let Some(info) = classes.get(class) else {
            return self.placeholder(format!("Unknown class {}", class));
        };
        let object = self.reg();
        self.emit(Instr::Intrinsic(Intrinsic::Mem {
            dst: object.clone(),
            size: Operand::Imm(info.size() as i64),
        }));

        // Field initializers see globals only.
        let mut defaults = Frame::global();
        for field in info.fields.values() {
            if let Some(init) = field.init {
                let (value, _) = self.gen_expr(init, &mut defaults);
                let addr = self.reg();
                self.emit(Instr::arith(ArithOp::Add, addr.clone(), &object, field.offset as i64));
                self.store(addr, &value);
            }
        }

        if info.init().is_some() {
            let saved = self.save_registers();
            let count = self.push_args(args, frame);
            self.emit(Instr::Push((&object).into()));
            self.emit(Instr::Call(format!("{}_init", class)));
            self.drop_args(count + 1);
            self.restore_registers(&saved);
        }
        (object, Type::Class(class.to_string()))
    }

    fn gen_method_call(
        &mut self,
        object: &Expr,
        method: &str,
        args: &[Expr],
        frame: &mut Frame,
    ) -> Value {
        let saved = self.save_registers();
        let count = self.push_args(args, frame);
        let (obj, ty) = self.gen_expr(object, frame);

        let classes = self.classes;
        let resolved = classes
            .of_type(&ty)
            .and_then(|class| class.method(method).map(|decl| (class, decl)));
        let Some((class, decl)) = resolved else {
            self.drop_args(count);
            self.restore_registers(&saved);
            return self.placeholder(format!("Call to method {} of unknown class {}", method, ty));
        };

        self.emit(Instr::Push(obj.into()));
        self.emit(Instr::Call(format!("{}_{}", class.name, method)));
        self.drop_args(count + 1);
        self.restore_registers(&saved);
        (self.take_result(), decl.return_type.clone())
    }

    fn gen_call(&mut self, name: &str, args: &[Expr], frame: &mut Frame) -> Value {
        let Some(Callee { label, return_type }) = self.callee(name).cloned() else {
            return self.placeholder(format!("Call to undefined function {}", name));
        };
        let saved = self.save_registers();
        let count = self.push_args(args, frame);
        self.emit(Instr::Call(label));
        self.drop_args(count);
        self.restore_registers(&saved);
        (self.take_result(), return_type)
    }
}

enum Lowered {
    Arith(ArithOp),
    Cmp(Cond),
}

fn lower(op: BinaryOp) -> Lowered {
    match op {
        BinaryOp::Add => Lowered::Arith(ArithOp::Add),
        BinaryOp::Sub => Lowered::Arith(ArithOp::Sub),
        BinaryOp::Mul => Lowered::Arith(ArithOp::Mul),
        BinaryOp::Div => Lowered::Arith(ArithOp::Div),
        BinaryOp::Mod => Lowered::Arith(ArithOp::Mod),
        BinaryOp::And => Lowered::Arith(ArithOp::And),
        BinaryOp::Or => Lowered::Arith(ArithOp::Or),
        BinaryOp::Lt => Lowered::Cmp(Cond::Lt),
        BinaryOp::Le => Lowered::Cmp(Cond::Le),
        BinaryOp::Gt => Lowered::Cmp(Cond::Gt),
        BinaryOp::Ge => Lowered::Cmp(Cond::Ge),
        BinaryOp::Eq => Lowered::Cmp(Cond::Eq),
        BinaryOp::Ne => Lowered::Cmp(Cond::Ne),
    }
}

/// What a dereference yields; an unknown pointee is treated as `int`.
pub(super) fn deref_type(pointee: Type) -> Type {
    if pointee.is_unknown() { Type::Int } else { pointee }
}
