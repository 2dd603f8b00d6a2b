//! # Code generation
//!
//! Lowers a checked [`Program`] to TSVM assembly text.
//!
//! ## Frames
//!
//! ```text
//!   fp+3.. further arguments (or arguments after `this`)
//!   fp+2   first argument, or `this` for methods
//!   fp+1   return address
//!   fp+0   caller's fp
//!   fp-1.. locals, one slot per declaration or loop variable
//! ```
//!
//! Globals live at `GLOBAL_BASE + k` in the order they are generated, and
//! their initializers run before `main` is entered. Vectors are a length
//! header followed by the elements; a vector value points at element 0.
//!
//! Generation never fails. Constructs it cannot lower (which a successful
//! check rules out) become `# Error:` comments with a zeroed register.

mod frame;
mod generator;
mod map;
mod print;
mod shadow;

pub use generator::Generator;

use crate::asm::{Line, render};
use crate::lang::Program;
use crate::semantic::Analysis;

/// Assembly text for a program that passed [`crate::semantic::check`].
pub fn generate(program: &Program, analysis: &Analysis<'_>) -> String {
    render(&generate_lines(program, analysis))
}

pub fn generate_lines(program: &Program, analysis: &Analysis<'_>) -> Vec<Line> {
    Generator::new(&analysis.classes).generate(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::layout::NULL_DEREF_EXIT;
    use crate::asm::{Instr, load};
    use crate::driver::run;
    use crate::lang::build::*;
    use crate::lang::{Stmt, Type};
    use crate::runtime::Outcome;
    use crate::semantic::check;
    use std::io::Cursor;

    fn assemble(statements: Vec<Stmt>) -> String {
        let program = Program::new(statements);
        let analysis = check(&program);
        assert!(analysis.is_ok(), "{:?}", analysis.errors);
        generate(&program, &analysis)
    }

    fn main_fn(body: Vec<Stmt>) -> Stmt {
        function("main", vec![], Type::Null, body)
    }

    #[test]
    fn test_prologue_and_epilogue() {
        let asm = assemble(vec![main_fn(vec![
            let_typed("a", Type::Int, int(1)),
            let_typed("b", Type::Int, int(2)),
        ])]);
        let expected_start = "proc main\n    push fp\n    mov fp, sp\n    sub sp, sp, 2\n";
        assert!(asm.starts_with(expected_start), "{}", asm);
        assert!(
            asm.ends_with("L_main_return:\n    add sp, sp, 2\n    pop fp\n    ret\n"),
            "{}",
            asm
        );
    }

    #[test]
    fn test_globals_are_numbered_in_order() {
        let asm = assemble(vec![
            let_typed("x", Type::Int, int(5)),
            let_typed("y", Type::Int, int(6)),
            main_fn(vec![]),
        ]);
        assert!(asm.contains("mov r2, 10000\n    st [r2], r1"), "{}", asm);
        assert!(asm.contains("mov r4, 10001\n    st [r4], r3"), "{}", asm);
    }

    #[test]
    fn test_output_loads() {
        let asm = assemble(vec![
            class(
                "Counter",
                vec![field_init("n", Type::Int, int(0))],
                vec![function(
                    "bump",
                    vec![],
                    Type::Int,
                    vec![
                        expr(assign("n", add(ident("n"), int(1)))),
                        ret(ident("n")),
                    ],
                )],
            ),
            main_fn(vec![
                let_typed("c", Type::Class("Counter".to_string()), new("Counter", vec![])),
                expr(print(add(string("n="), method_call(ident("c"), "bump", vec![])))),
                for_loop("i", int(0), int(3), vec![expr(print(ident("i")))]),
                expr(print(map(lambda("x", add(ident("x"), int(1))), vector(vec![int(1), int(2)])))),
            ]),
        ]);
        let program = load(&asm).unwrap();
        assert!(program.label("Counter_bump").is_some());
        assert!(program.label("main").is_some());
    }

    #[test]
    fn test_nested_function_is_jumped_over() {
        let lines = {
            let program = Program::new(vec![main_fn(vec![
                function("helper", vec![], Type::Int, vec![ret(int(1))]),
                expr(print(call("helper", vec![]))),
            ])]);
            let analysis = check(&program);
            generate_lines(&program, &analysis)
        };
        let proc_at = lines
            .iter()
            .position(|line| *line == Line::Instr(Instr::Proc("main_helper".to_string())))
            .unwrap();
        assert_eq!(lines[proc_at - 1], Line::Instr(Instr::Br("L1".to_string())));
        assert!(lines.contains(&Line::Instr(Instr::Call("main_helper".to_string()))));
    }

    #[test]
    fn test_nested_functions_get_their_own_labels() {
        let asm = assemble(vec![
            function(
                "f",
                vec![],
                Type::Int,
                vec![
                    function("helper", vec![], Type::Int, vec![ret(int(1))]),
                    ret(call("helper", vec![])),
                ],
            ),
            main_fn(vec![
                function("helper", vec![], Type::Int, vec![ret(int(2))]),
                for_loop(
                    "i",
                    int(0),
                    int(1),
                    vec![
                        function("helper", vec![], Type::Int, vec![ret(int(3))]),
                        expr(print(call("helper", vec![]))),
                    ],
                ),
                expr(print(add(call("f", vec![]), call("helper", vec![])))),
            ]),
        ]);
        let program = load(&asm).unwrap();
        for label in ["f_helper", "main_helper", "main_helper_2"] {
            assert!(program.label(label).is_some(), "{} missing in\n{}", label, asm);
        }
        assert!(asm.contains("    call f_helper\n"), "{}", asm);
        assert!(asm.contains("    call main_helper_2\n"), "{}", asm);
        assert!(asm.contains("    call main_helper\n"), "{}", asm);
    }

    #[test]
    fn test_calls_save_live_registers() {
        let asm = assemble(vec![
            function("one", vec![], Type::Int, vec![ret(int(1))]),
            main_fn(vec![expr(print(add(int(5), call("one", vec![]))))]),
        ]);
        assert!(
            asm.contains("mov r1, 5\n    push r1\n    call one\n    pop r1\n    mov r2, r0"),
            "{}",
            asm
        );
    }

    #[test]
    fn test_heterogeneous_map_specializes_per_type() {
        let asm = assemble(vec![main_fn(vec![
            let_infer("v", vector(vec![int(1), string("a")])),
            expr(print(map(lambda("x", add(ident("x"), ident("x"))), ident("v")))),
        ])]);
        let procs: Vec<&str> = asm
            .lines()
            .filter_map(|line| line.strip_prefix("proc "))
            .collect();
        let int = procs.iter().find(|p| p.ends_with("_lambda_int")).unwrap();
        let string = procs.iter().find(|p| p.ends_with("_lambda_string")).unwrap();
        assert!(asm.contains("cmp!= "), "{}", asm);
        let program = load(&asm).unwrap();
        assert!(program.label(int).is_some());
        assert!(program.label(string).is_some());
    }

    #[test]
    fn test_generation_is_deterministic() {
        let statements = vec![
            let_typed("g", Type::Int, int(3)),
            main_fn(vec![expr(print(add(string("g="), ident("g"))))]),
        ];
        assert_eq!(assemble(statements.clone()), assemble(statements));
    }

    #[test]
    fn test_unlowerable_nodes_become_comments() {
        let program = Program::new(vec![main_fn(vec![expr(ident("ghost"))])]);
        let analysis = check(&program);
        let asm = generate(&program, &analysis);
        assert!(asm.contains("# Error: Var ghost not in map"), "{}", asm);
    }

    /// Generate without insisting on a clean check, then run.
    fn run_unchecked(statements: Vec<Stmt>) -> (Outcome, String) {
        let program = Program::new(statements);
        let analysis = check(&program);
        let asm = generate(&program, &analysis);
        let mut output = Vec::new();
        let outcome = run(&asm, &mut Cursor::new(Vec::new()), &mut output).unwrap();
        (outcome, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_null_reference_exits() {
        let (outcome, out) = run_unchecked(vec![main_fn(vec![
            let_typed("r", Type::bare_ref(), null()),
            expr(print(not(ident("r")))),
            expr(print(int(1))),
        ])]);
        assert_eq!(outcome, Outcome::Exited(NULL_DEREF_EXIT));
        assert_eq!(out, "");

        let (outcome, out) = run_unchecked(vec![main_fn(vec![
            let_typed("r", Type::bare_ref(), null()),
            expr(ref_assign("r", int(5))),
            expr(print(int(1))),
        ])]);
        assert_eq!(outcome, Outcome::Exited(NULL_DEREF_EXIT));
        assert_eq!(out, "");
    }
}
