use super::class_table::{ClassInfo, ClassTable, FieldInfo};
use super::const_eval::const_int;
use super::scope::{Symbol, SymbolKind, SymbolTable};
use super::semantic_error::SemanticError;
use super::type_of::type_of;
use crate::lang::{
    ClassDecl, Expr, FunctionDecl, LValue, Param, Program, Stmt, Type, VarDecl,
};
use indexmap::IndexMap;
use log::debug;

/// Where the walk currently is.
#[derive(Debug, Clone, Copy, Default)]
pub struct Context<'a> {
    pub class: Option<&'a ClassDecl>,
    pub function: Option<&'a FunctionDecl>,
    /// A `return` has been seen somewhere in the current function body.
    pub saw_return: bool,
}

impl<'a> Context<'a> {
    fn enter_function(&self, function: &'a FunctionDecl) -> Self {
        Context {
            class: self.class,
            function: Some(function),
            saw_return: false,
        }
    }
}

pub struct Checker<'a> {
    pub classes: ClassTable<'a>,
    pub symbols: SymbolTable<'a>,
    pub errors: Vec<SemanticError>,
}

impl Default for Checker<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Checker<'a> {
    pub fn new() -> Self {
        Checker {
            classes: ClassTable::new(),
            symbols: SymbolTable::new(),
            errors: Vec::new(),
        }
    }

    pub fn check_program(&mut self, program: &'a Program) {
        let top = Context::default();
        for class in program.classes() {
            self.register_class(class);
        }
        for function in program.functions() {
            self.register_function(function, &top);
        }
        let mut ctx = top;
        for stmt in &program.statements {
            self.visit_stmt(stmt, &mut ctx);
        }
    }

    fn error(&mut self, ctx: &Context<'_>, message: impl Into<String>) {
        let mut err = SemanticError::new(message);
        if let Some(class) = ctx.class {
            err = err.in_class(&class.name);
        }
        if let Some(function) = ctx.function {
            err = err.in_function(&function.name);
        }
        self.errors.push(err);
    }

    fn ty(&self, expr: &Expr) -> Type {
        type_of(expr, &self.symbols, &self.classes)
    }

    // ──────────────────────────── Registration ────────────────────────────

    fn register_class(&mut self, decl: &'a ClassDecl) {
        let top = Context::default();
        if self.classes.contains(&decl.name) {
            self.error(&top, format!("Class '{}' is already defined.", decl.name));
            return;
        }

        let mut fields: IndexMap<String, FieldInfo<'a>> = IndexMap::new();
        for field in &decl.fields {
            if fields.contains_key(&field.name) {
                self.error(
                    &top,
                    format!(
                        "Field '{}' already defined in class '{}'",
                        field.name, decl.name
                    ),
                );
                continue;
            }
            let ty = match (&field.ty, &field.value) {
                (Some(ty), _) => ty.clone(),
                (None, Some(value)) => self.ty(value),
                (None, None) => {
                    self.error(
                        &top,
                        format!(
                            "Cannot declare '{}' without type or initial value.",
                            field.name
                        ),
                    );
                    Type::Unknown
                }
            };
            let offset = fields.len();
            fields.insert(
                field.name.clone(),
                FieldInfo {
                    ty,
                    offset,
                    init: field.value.as_ref(),
                },
            );
        }

        let mut methods: IndexMap<String, &'a FunctionDecl> = IndexMap::new();
        for method in &decl.methods {
            if methods.contains_key(&method.name) {
                self.error(
                    &top,
                    format!(
                        "Method '{}' already defined in class '{}'",
                        method.name, decl.name
                    ),
                );
                continue;
            }
            methods.insert(method.name.clone(), method);
        }

        debug!(
            "registered class {} ({} fields, {} methods)",
            decl.name,
            fields.len(),
            methods.len()
        );
        self.classes.insert(ClassInfo {
            name: decl.name.clone(),
            decl,
            fields,
            methods,
        });
    }

    fn register_function(&mut self, decl: &'a FunctionDecl, ctx: &Context<'_>) {
        if self.symbols.lookup_local(&decl.name).is_some() {
            self.error(ctx, format!("Function '{}' is already defined.", decl.name));
            return;
        }
        debug!("registered function {}", decl.name);
        self.symbols.declare(&decl.name, Symbol::function(decl));
    }

    // ───────────────────────────── Statements ─────────────────────────────

    fn visit_block(&mut self, stmts: &'a [Stmt], ctx: &mut Context<'a>) {
        for stmt in stmts {
            self.visit_stmt(stmt, ctx);
        }
    }

    fn visit_stmt(&mut self, stmt: &'a Stmt, ctx: &mut Context<'a>) {
        match stmt {
            Stmt::Expr(expr) => self.visit_expr(expr, ctx),
            Stmt::Let(decl) => self.visit_let(decl, ctx),
            Stmt::Function(decl) => {
                // Top-level functions are registered up front; nested ones
                // become callable from their declaration on.
                if ctx.function.is_some() {
                    self.register_function(decl, ctx);
                }
                self.visit_function(decl, ctx);
            }
            Stmt::Class(decl) => self.visit_class(decl),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.visit_condition(condition, ctx);
                self.visit_block(then_branch, ctx);
                if let Some(else_branch) = else_branch {
                    self.visit_block(else_branch, ctx);
                }
            }
            Stmt::While { condition, body } => {
                self.visit_condition(condition, ctx);
                self.visit_block(body, ctx);
            }
            Stmt::For {
                var,
                start,
                end,
                body,
            } => {
                self.visit_expr(start, ctx);
                self.visit_expr(end, ctx);
                if self.ty(start) != Type::Int {
                    self.error(ctx, "For loop start expression must be integer");
                }
                if self.ty(end) != Type::Int {
                    self.error(ctx, "For loop end expression must be integer");
                }
                self.symbols.push();
                self.symbols
                    .declare(var, Symbol::new(SymbolKind::LoopVar, Type::Int, true));
                self.visit_block(body, ctx);
                self.symbols.pop();
            }
            Stmt::Block(stmts) => self.visit_block(stmts, ctx),
            Stmt::Return(value) => self.visit_return(value.as_ref(), ctx),
        }
    }

    fn visit_condition(&mut self, condition: &'a Expr, ctx: &mut Context<'a>) {
        self.visit_expr(condition, ctx);
        if self.ty(condition) != Type::Bool {
            self.error(ctx, "Condition in if/while must be bool");
        }
    }

    fn visit_class(&mut self, decl: &'a ClassDecl) {
        // A duplicate declaration was reported at registration; its body is
        // not checked against the first one's table.
        let registered = self
            .classes
            .get(&decl.name)
            .is_some_and(|info| std::ptr::eq(info.decl, decl));
        if !registered {
            return;
        }

        let mut class_ctx = Context {
            class: Some(decl),
            function: None,
            saw_return: false,
        };
        for field in &decl.fields {
            if let Some(value) = &field.value {
                self.visit_expr(value, &mut class_ctx);
                let (Some(expected), actual) = (&field.ty, self.ty(value)) else {
                    continue;
                };
                if !expected.accepts(&actual) {
                    self.error(
                        &class_ctx,
                        format!(
                            "Variable '{}': assigned value of wrong type (expected {}, got {})",
                            field.name, expected, actual
                        ),
                    );
                }
            }
        }

        let methods: Vec<&'a FunctionDecl> = self
            .classes
            .get(&decl.name)
            .map(|info| info.methods.values().copied().collect())
            .unwrap_or_default();
        for method in methods {
            self.visit_function(method, &class_ctx);
        }
    }

    fn visit_function(&mut self, decl: &'a FunctionDecl, ctx: &Context<'a>) {
        let mut inner = ctx.enter_function(decl);
        self.symbols.push();

        if let Some(class) = inner.class {
            self.symbols.declare(
                "this",
                Symbol::new(SymbolKind::Param, Type::Class(class.name.clone()), true),
            );
            let fields: Vec<(String, Type)> = self
                .classes
                .get(&class.name)
                .map(|info| {
                    info.fields
                        .iter()
                        .map(|(name, field)| (name.clone(), field.ty.clone()))
                        .collect()
                })
                .unwrap_or_default();
            for (name, ty) in fields {
                self.symbols
                    .declare(&name, Symbol::new(SymbolKind::Field, ty, true));
            }
        }

        for Param { name, ty } in &decl.params {
            if self.symbols.lookup_local(name).is_some() {
                self.error(&inner, format!("Parameter '{}' already defined.", name));
            }
            self.symbols
                .declare(name, Symbol::new(SymbolKind::Param, ty.clone(), true));
        }

        self.visit_block(&decl.body, &mut inner);

        if !inner.saw_return && decl.return_type != Type::Null {
            self.error(
                &inner,
                format!(
                    "Function '{}' should return '{}', but implicitly returned 'null'",
                    decl.name, decl.return_type
                ),
            );
        }
        self.symbols.pop();
    }

    fn visit_let(&mut self, decl: &'a VarDecl, ctx: &mut Context<'a>) {
        let name = &decl.name;
        if let Some(existing) = self.symbols.lookup(name) {
            let clash = match existing.kind {
                SymbolKind::Field => false,
                _ if ctx.function.is_none() => true,
                SymbolKind::Param | SymbolKind::Local => true,
                _ => false,
            };
            if clash {
                self.error(ctx, format!("Variable '{}' already defined in this scope.", name));
                return;
            }
        }

        let value_type = decl.value.as_ref().map(|value| {
            self.visit_expr(value, ctx);
            self.ty(value)
        });

        let ty = match (&decl.ty, value_type) {
            (None, None) => {
                self.error(
                    ctx,
                    format!("Cannot declare '{}' without type or initial value.", name),
                );
                return;
            }
            (None, Some(actual)) => actual,
            (Some(declared), None) => declared.clone(),
            (Some(declared), Some(actual)) => {
                if *declared == Type::Vector && actual != Type::Vector {
                    self.error(
                        ctx,
                        format!("Declared '{}' as vector but assigned '{}'", name, actual),
                    );
                } else if !declared.accepts(&actual) {
                    self.error(
                        ctx,
                        format!(
                            "Variable '{}': assigned value of wrong type (expected {}, got {})",
                            name, declared, actual
                        ),
                    );
                }
                match (declared, actual) {
                    // `let r: ref = ref x` learns what it points to.
                    (Type::Ref(pointee), actual @ Type::Ref(_)) if pointee.is_unknown() => actual,
                    (declared, _) => declared.clone(),
                }
            }
        };

        let kind = if ctx.function.is_none() {
            SymbolKind::Global
        } else {
            SymbolKind::Local
        };
        let mut symbol = Symbol::new(kind, ty, decl.value.is_some());
        if let Some(value) = &decl.value {
            self.describe_value(&mut symbol, value);
        }
        self.symbols.declare(name, symbol);
    }

    /// Record what is statically known about a declaration's value.
    fn describe_value(&self, symbol: &mut Symbol<'a>, value: &Expr) {
        match symbol.ty {
            Type::Int => symbol.constant = const_int(value, &self.symbols),
            Type::Vector => match value {
                Expr::Vector(items) => {
                    symbol.size = Some(items.len() as i64);
                    symbol.elements = Some(items.iter().map(|item| self.ty(item)).collect());
                }
                Expr::List(size) => symbol.size = const_int(size, &self.symbols),
                _ => {}
            },
            _ => {}
        }
    }

    fn visit_return(&mut self, value: Option<&'a Expr>, ctx: &mut Context<'a>) {
        let Some(function) = ctx.function else {
            self.error(ctx, "Return used outside of function");
            return;
        };
        ctx.saw_return = true;

        let actual = match value {
            Some(value) => {
                self.visit_expr(value, ctx);
                self.ty(value)
            }
            None => Type::Null,
        };
        if !function.return_type.accepts(&actual) {
            self.error(
                ctx,
                format!(
                    "Function '{}' should return '{}', but returned '{}'",
                    function.name, function.return_type, actual
                ),
            );
        }
    }

    // ──────────────────────────── Expressions ─────────────────────────────

    fn visit_exprs(&mut self, exprs: &'a [Expr], ctx: &mut Context<'a>) {
        for expr in exprs {
            self.visit_expr(expr, ctx);
        }
    }

    fn visit_expr(&mut self, expr: &'a Expr, ctx: &mut Context<'a>) {
        match expr {
            Expr::Int(_) | Expr::Bool(_) | Expr::Str(_) | Expr::Null | Expr::Scan => {}
            Expr::Ident(name) => self.check_initialized(name, ctx),

            Expr::Binary { left, right, .. } => {
                self.visit_expr(left, ctx);
                self.visit_expr(right, ctx);
            }
            Expr::Unary { operand, .. } => self.visit_expr(operand, ctx),
            Expr::Ternary {
                condition,
                then_value,
                else_value,
            } => {
                self.visit_expr(condition, ctx);
                self.visit_expr(then_value, ctx);
                self.visit_expr(else_value, ctx);
                if self.ty(condition) != Type::Bool {
                    self.error(ctx, "Ternary condition must be bool");
                }
                let (a, b) = (self.ty(then_value), self.ty(else_value));
                if a != b && !a.is_unknown() && !b.is_unknown() {
                    self.error(
                        ctx,
                        format!(
                            "Ternary branches must have the same type but got '{}' and '{}'",
                            a, b
                        ),
                    );
                }
            }

            Expr::Assign { target, value } => self.visit_assign(target, value, ctx),
            Expr::RefAssign { target, value } => self.visit_ref_assign(target, value, ctx),

            Expr::Vector(items) => self.visit_exprs(items, ctx),
            Expr::Index { vector, index } => self.visit_index(vector, index, ctx),

            Expr::Print(value) => self.visit_expr(value, ctx),
            Expr::List(size) => {
                self.visit_expr(size, ctx);
                if self.ty(size) != Type::Int {
                    self.error(ctx, "List() argument must be int");
                }
            }
            Expr::Length(vector) => {
                self.visit_expr(vector, ctx);
                let ty = self.ty(vector);
                if ty != Type::Vector && !ty.is_unknown() {
                    self.error(ctx, format!("Length() argument must be a vector, not {}", ty));
                }
            }
            Expr::Exit(code) => {
                self.visit_expr(code, ctx);
                let ty = self.ty(code);
                if ty != Type::Int && !ty.is_unknown() {
                    self.error(ctx, "Exit code must be an integer");
                }
            }

            Expr::Ref(name) => {
                if self.symbols.lookup(name).is_none() {
                    self.error(ctx, format!("Variable '{}' not declared in expression", name));
                }
            }

            Expr::New { class, args } => self.visit_new(class, args, ctx),
            Expr::MethodCall {
                object,
                method,
                args,
            } => self.visit_method_call(object, method, args, ctx),
            Expr::Field { object, field } => {
                self.visit_expr(object, ctx);
                if object.as_ident() == Some("this") {
                    match ctx.class {
                        None => self.error(ctx, "'this' can only be used inside a method."),
                        Some(class) => {
                            let known = self
                                .classes
                                .get(&class.name)
                                .is_some_and(|info| info.field(field).is_some());
                            if !known {
                                self.error(
                                    ctx,
                                    format!("Class '{}' has no field '{}'", class.name, field),
                                );
                            }
                        }
                    }
                } else {
                    self.error(
                        ctx,
                        format!(
                            "Field '{}' is private and cannot be accessed from outside the class.",
                            field
                        ),
                    );
                }
            }

            Expr::Lambda(lambda) => {
                self.symbols.push();
                self.symbols.declare(
                    &lambda.param,
                    Symbol::new(SymbolKind::Param, Type::Int, true),
                );
                self.visit_expr(&lambda.body, ctx);
                self.symbols.pop();
            }
            Expr::Map { lambda, vector } => {
                self.visit_expr(lambda, ctx);
                self.visit_expr(vector, ctx);
                let f = self.ty(lambda);
                if f != Type::Function {
                    self.error(
                        ctx,
                        format!("Argument 1 for 'map' must be a lambda, got {}", f),
                    );
                }
                let v = self.ty(vector);
                if v != Type::Vector {
                    self.error(
                        ctx,
                        format!("Argument 2 for 'map' must be a vector, got {}", v),
                    );
                }
            }
            Expr::Call { name, args } => self.visit_call(name, args, ctx),
        }
    }

    fn check_initialized(&mut self, name: &str, ctx: &Context<'_>) {
        match self.symbols.lookup(name) {
            Some(symbol) if symbol.tracks_initialization() && !symbol.initialized => {
                self.error(
                    ctx,
                    format!(
                        "Variable '{}' used without being initialized in expression",
                        name
                    ),
                );
            }
            Some(_) => {}
            None => self.error(ctx, format!("Variable '{}' not declared in expression", name)),
        }
    }

    fn visit_assign(&mut self, target: &'a LValue, value: &'a Expr, ctx: &mut Context<'a>) {
        self.visit_expr(value, ctx);
        let actual = self.ty(value);

        match target {
            LValue::Field { object, field } => {
                self.visit_expr(object, ctx);
                if object.as_ident() != Some("this") {
                    self.error(
                        ctx,
                        format!(
                            "Field '{}' is private and cannot be modified from outside the class.",
                            field
                        ),
                    );
                    return;
                }
                let Some(class) = ctx.class else {
                    self.error(ctx, "'this' can only be used inside a method.");
                    return;
                };
                let expected = self
                    .classes
                    .get(&class.name)
                    .and_then(|info| info.field(field))
                    .map(|info| info.ty.clone());
                match expected {
                    None => self.error(
                        ctx,
                        format!("No field '{}' in class '{}'", field, class.name),
                    ),
                    Some(expected) if !expected.accepts(&actual) => self.error(
                        ctx,
                        format!(
                            "Type error assigning to field '{}' (expected {}, got {})",
                            field, expected, actual
                        ),
                    ),
                    Some(_) => {}
                }
            }
            LValue::Index { vector, index } => {
                self.visit_index(vector, index, ctx);
                let name = match vector.as_ref() {
                    Expr::Vector(_) => {
                        self.error(ctx, "Cannot assign to element of a vector literal.");
                        return;
                    }
                    Expr::Ident(name) => name,
                    _ => return,
                };
                match self.symbols.lookup(name).map(|symbol| symbol.ty.clone()) {
                    None => {
                        self.error(ctx, format!("Assign to undeclared variable '{}'", name));
                    }
                    Some(Type::Vector) => {
                        self.symbols.mark_initialized(name);
                    }
                    Some(_) => self.error(
                        ctx,
                        format!("Cannot index variable '{}' which is not a vector.", name),
                    ),
                }
            }
            LValue::Name(name) => {
                let Some(expected) = self.symbols.lookup(name).map(|symbol| symbol.ty.clone())
                else {
                    self.error(ctx, format!("Assign to undeclared variable '{}'", name));
                    return;
                };
                if !expected.accepts(&actual) {
                    self.error(
                        ctx,
                        format!(
                            "Type error in assignment to '{}' (expected {}, got {})",
                            name, expected, actual
                        ),
                    );
                    return;
                }
                self.symbols.mark_initialized(name);
                self.symbols.forget_value(name);
            }
        }
    }

    fn visit_ref_assign(&mut self, target: &'a LValue, value: &'a Expr, ctx: &mut Context<'a>) {
        self.visit_expr(value, ctx);
        let LValue::Name(name) = target else {
            self.error(ctx, "Cannot use ':=' on complex expression.");
            return;
        };
        let Some(ty) = self.symbols.lookup(name).map(|symbol| symbol.ty.clone()) else {
            self.error(ctx, format!("Assign to undeclared variable '{}'", name));
            return;
        };
        let Some(expected) = ty.pointee() else {
            self.error(
                ctx,
                format!("Cannot use ':=' on non-reference variable '{}'", name),
            );
            return;
        };
        let actual = self.ty(value);
        if !expected.accepts(&actual) {
            self.error(
                ctx,
                format!(
                    "Type error in ref assignment to '{}' (expected {}, got {})",
                    name, expected, actual
                ),
            );
        }
    }

    fn visit_index(&mut self, vector: &'a Expr, index: &'a Expr, ctx: &mut Context<'a>) {
        self.visit_expr(index, ctx);

        let (label, size) = match vector {
            Expr::Vector(_) => {
                self.visit_expr(vector, ctx);
                return;
            }
            Expr::Ident(name) => {
                let Some(symbol) = self
                    .symbols
                    .lookup(name)
                    .filter(|symbol| symbol.ty == Type::Vector)
                else {
                    self.error(ctx, format!("Cannot index '{}': not a vector", name));
                    return;
                };
                if !symbol.initialized {
                    self.error(ctx, format!("Vector '{}' indexing before initialize", name));
                    return;
                }
                (name.clone(), symbol.size)
            }
            other => {
                self.visit_expr(other, ctx);
                let ty = self.ty(other);
                if ty != Type::Vector && !ty.is_unknown() {
                    self.error(
                        ctx,
                        format!("Cannot index a value of type '{}': not a vector", ty),
                    );
                    return;
                }
                (String::new(), None)
            }
        };

        let index_type = self.ty(index);
        if index_type != Type::Int {
            self.error(
                ctx,
                format!("Vector index must be integer, got {}", index_type),
            );
            return;
        }

        if let (Some(size), Some(i)) = (size, const_int(index, &self.symbols)) {
            if i < 0 || i >= size {
                self.error(
                    ctx,
                    format!(
                        "Index {} out of bounds for vector '{}' (size {})",
                        i, label, size
                    ),
                );
            }
        }
    }

    /// Arity and per-argument type checks shared by calls, method calls and
    /// constructors. `what` names the callee in messages.
    fn check_arguments(
        &mut self,
        what: &str,
        params: &[Param],
        args: &'a [Expr],
        ctx: &mut Context<'a>,
    ) -> bool {
        if params.len() != args.len() {
            self.error(
                ctx,
                format!(
                    "{} expects {} arguments, got {}",
                    what,
                    params.len(),
                    args.len()
                ),
            );
            return false;
        }
        for (i, (param, arg)) in params.iter().zip(args).enumerate() {
            self.visit_expr(arg, ctx);
            let actual = self.ty(arg);
            if !param.ty.accepts(&actual) {
                self.error(
                    ctx,
                    format!(
                        "{} argument {} type mismatch: expected {}, got {}",
                        what,
                        i + 1,
                        param.ty,
                        actual
                    ),
                );
            }
        }
        true
    }

    fn visit_call(&mut self, name: &str, args: &'a [Expr], ctx: &mut Context<'a>) {
        let Some(decl) = self.symbols.function(name) else {
            self.error(ctx, format!("Call to undefined function '{}'", name));
            return;
        };
        self.check_arguments(&format!("Function '{}'", name), &decl.params, args, ctx);
    }

    fn visit_method_call(
        &mut self,
        object: &'a Expr,
        method: &str,
        args: &'a [Expr],
        ctx: &mut Context<'a>,
    ) {
        self.visit_expr(object, ctx);
        let object_type = self.ty(object);
        let Some(class) = self.classes.of_type(&object_type) else {
            self.error(
                ctx,
                format!(
                    "Cannot call method '{}' on non-class type '{}'",
                    method, object_type
                ),
            );
            return;
        };
        let class_name = class.name.clone();
        let Some(decl) = class.method(method) else {
            self.error(
                ctx,
                format!("Class '{}' has no method '{}'", class_name, method),
            );
            return;
        };
        self.check_arguments(&format!("Method '{}'", method), &decl.params, args, ctx);
    }

    fn visit_new(&mut self, class: &str, args: &'a [Expr], ctx: &mut Context<'a>) {
        let Some(info) = self.classes.get(class) else {
            self.error(ctx, format!("Cannot 'new' undefined class '{}'", class));
            return;
        };
        match info.init() {
            Some(init) => {
                let label = "Constructor 'init'";
                if init.params.len() != args.len() {
                    self.visit_exprs(args, ctx);
                    self.error(
                        ctx,
                        format!(
                            "{} for class '{}' expects {} arguments, got {}",
                            label,
                            class,
                            init.params.len(),
                            args.len()
                        ),
                    );
                } else {
                    self.check_arguments(label, &init.params, args, ctx);
                }
            }
            None => {
                self.visit_exprs(args, ctx);
                if !args.is_empty() {
                    self.error(
                        ctx,
                        format!(
                            "Class '{}' has no 'init' constructor but arguments were provided.",
                            class
                        ),
                    );
                }
            }
        }
    }
}
