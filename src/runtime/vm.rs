use crate::asm::layout;
use crate::asm::op::{ArithOp, Instr, Intrinsic, Operand, Register};
use crate::asm::program::Program;
use crate::runtime::memory::Memory;
use crate::runtime::runtime_error::{Fault, RuntimeError};
use log::{debug, trace};
use std::collections::HashMap;
use std::io::{BufRead, Write};

#[derive(Debug, Clone)]
pub struct VmConfig {
    pub memory_size: usize,
    pub stack_top: i64,
    pub global_base: i64,
    pub heap_base: i64,
    /// Procedure entered after global initialization.
    pub entry: String,
    pub max_steps: Option<usize>,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            memory_size: layout::MEMORY_SIZE,
            stack_top: layout::STACK_TOP,
            global_base: layout::GLOBAL_BASE,
            heap_base: layout::HEAP_BASE,
            entry: layout::ENTRY_PROC.to_string(),
            max_steps: None,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The entry procedure returned or the program ran off its end.
    Returned,
    /// `exit` was called with this status.
    Exited(i64),
}

impl Outcome {
    pub fn status(self) -> i64 {
        match self {
            Outcome::Returned => 0,
            Outcome::Exited(code) => code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Top-level code runs; procedure bodies reached by fall-through are
    /// skipped.
    Globals,
    /// Running from the entry procedure; `proc` markers are no-ops.
    Entry,
}

enum Flow {
    Next,
    Jump(usize),
    Halt(Outcome),
}

pub struct Vm {
    config: VmConfig,
    memory: Memory,
    registers: HashMap<String, i64>,
    sp: i64,
    fp: i64,
    steps: usize,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self {
            memory: Memory::new(config.memory_size, config.heap_base),
            registers: HashMap::new(),
            sp: config.stack_top,
            fp: config.stack_top,
            steps: 0,
            config,
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Current value of a register; unknown registers read as 0.
    pub fn register(&self, reg: &Register) -> i64 {
        match reg {
            Register::Sp => self.sp,
            Register::Fp => self.fp,
            Register::Named(name) => self.registers.get(name).copied().unwrap_or(0),
        }
    }

    fn set(&mut self, reg: &Register, value: i64) {
        match reg {
            Register::Sp => self.sp = value,
            Register::Fp => self.fp = value,
            Register::Named(name) => {
                self.registers.insert(name.clone(), value);
            }
        }
    }

    fn value(&self, operand: &Operand) -> i64 {
        match operand {
            Operand::Reg(reg) => self.register(reg),
            Operand::Imm(n) => *n,
        }
    }

    // Execution

    /// Run the global phase, then enter the entry procedure. Output is
    /// flushed however the run ends, faults included.
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        program: &Program,
        input: &mut R,
        output: &mut W,
    ) -> Result<Outcome, RuntimeError> {
        let result = self.execute(program, input, output);
        let flushed = output
            .flush()
            .map_err(|e| RuntimeError::new(Fault::Io(e.to_string())));
        let outcome = result?;
        flushed?;
        debug!("halted after {} steps: {:?}", self.steps, outcome);
        Ok(outcome)
    }

    fn execute<R: BufRead, W: Write>(
        &mut self,
        program: &Program,
        input: &mut R,
        output: &mut W,
    ) -> Result<Outcome, RuntimeError> {
        let entry = program
            .label(&self.config.entry)
            .ok_or_else(|| RuntimeError::new(Fault::MissingEntry(self.config.entry.clone())))?;

        debug!("global phase");
        let mut ip = 0;
        while ip < program.len() {
            if let Instr::Proc(name) = &program.instrs[ip] {
                trace!("skipping procedure {}", name);
                ip = program.skip_procedure(ip);
                continue;
            }
            match self.step(program, ip, Phase::Globals, input, output)? {
                Flow::Next => ip += 1,
                Flow::Jump(target) => ip = target,
                Flow::Halt(outcome) => return Ok(outcome),
            }
        }

        debug!("entering {}", self.config.entry);
        self.push(layout::RETURN_SENTINEL)
            .map_err(RuntimeError::new)?;
        ip = entry;
        while ip < program.len() {
            match self.step(program, ip, Phase::Entry, input, output)? {
                Flow::Next => ip += 1,
                Flow::Jump(target) => ip = target,
                Flow::Halt(outcome) => return Ok(outcome),
            }
        }
        Ok(Outcome::Returned)
    }

    fn step<R: BufRead, W: Write>(
        &mut self,
        program: &Program,
        ip: usize,
        phase: Phase,
        input: &mut R,
        output: &mut W,
    ) -> Result<Flow, RuntimeError> {
        let instr = &program.instrs[ip];
        self.exec(program, instr, ip, phase, input, output)
            .map_err(|fault| {
                RuntimeError::new(fault).with_context(ip, program.source_line(ip), instr.to_string())
            })
    }

    fn check_limits(&mut self) -> Result<(), Fault> {
        self.steps += 1;
        if let Some(max) = self.config.max_steps {
            if self.steps > max {
                return Err(Fault::StepLimit(max));
            }
        }
        Ok(())
    }

    fn exec<R: BufRead, W: Write>(
        &mut self,
        program: &Program,
        instr: &Instr,
        ip: usize,
        phase: Phase,
        input: &mut R,
        output: &mut W,
    ) -> Result<Flow, Fault> {
        self.check_limits()?;
        trace!("{:>5}  {}", ip, instr);

        match instr {
            Instr::Mov { dst, src } => {
                let v = self.value(src);
                self.set(dst, v);
            }
            Instr::Sload { dst, text } => {
                let ptr = self.memory.alloc_string(text)?;
                self.set(dst, ptr);
            }
            Instr::Push(src) => {
                let v = self.value(src);
                self.push(v)?;
            }
            Instr::Pop(dst) => {
                let v = self.pop()?;
                self.set(dst, v);
            }
            Instr::Ld { dst, addr } => {
                let v = self.memory.read(self.value(addr))?;
                self.set(dst, v);
            }
            Instr::St { addr, src } => {
                let addr = self.value(addr);
                let v = self.value(src);
                self.memory.write(addr, v)?;
            }
            Instr::Arith { op, dst, lhs, rhs } => {
                let v = arith(*op, self.value(lhs), self.value(rhs))?;
                self.set(dst, v);
            }
            Instr::Cmp {
                cond,
                dst,
                lhs,
                rhs,
            } => {
                let v = cond.holds(self.value(lhs), self.value(rhs)) as i64;
                self.set(dst, v);
            }
            Instr::Br(label) => return Ok(Flow::Jump(resolve(program, label)?)),
            Instr::Bz(cond, label) => {
                if self.value(cond) == 0 {
                    return Ok(Flow::Jump(resolve(program, label)?));
                }
            }
            Instr::Bnz(cond, label) => {
                if self.value(cond) != 0 {
                    return Ok(Flow::Jump(resolve(program, label)?));
                }
            }
            Instr::Call(label) => {
                let target = resolve(program, label)?;
                self.push(ip as i64 + 1)?;
                return Ok(Flow::Jump(target));
            }
            Instr::Intrinsic(intrinsic) => return self.intrinsic(intrinsic, input, output),
            Instr::Ret => {
                let addr = self.pop()?;
                if addr == layout::RETURN_SENTINEL {
                    return Ok(Flow::Halt(Outcome::Returned));
                }
                return match usize::try_from(addr) {
                    Ok(target) if target <= program.len() => Ok(Flow::Jump(target)),
                    _ => Err(Fault::BadReturnAddress(addr)),
                };
            }
            Instr::Proc(_) => {
                // Globals never step onto a marker; the run loop skips them.
                debug_assert_eq!(phase, Phase::Entry);
            }
        }
        Ok(Flow::Next)
    }

    fn push(&mut self, value: i64) -> Result<(), Fault> {
        let sp = self.sp - 1;
        self.memory.write(sp, value)?;
        self.sp = sp;
        Ok(())
    }

    fn pop(&mut self) -> Result<i64, Fault> {
        let v = self.memory.read(self.sp)?;
        self.sp += 1;
        Ok(v)
    }

    // Intrinsics

    fn intrinsic<R: BufRead, W: Write>(
        &mut self,
        intrinsic: &Intrinsic,
        input: &mut R,
        output: &mut W,
    ) -> Result<Flow, Fault> {
        match intrinsic {
            Intrinsic::Iput(v) => emit(output, &self.value(v).to_string())?,
            Intrinsic::Sprint(ptr) => {
                let text = self.memory.read_string(self.value(ptr))?;
                emit(output, &text)?;
            }
            Intrinsic::Vprint(ptr) => {
                let text = self.format_vector(self.value(ptr))?;
                emit(output, &text)?;
            }
            Intrinsic::Nl => emit(output, "\n")?,
            Intrinsic::Iget(dst) => {
                output.flush().map_err(|e| Fault::Io(e.to_string()))?;
                let v = read_int(input)?;
                self.set(dst, v);
            }
            Intrinsic::Exit(code) => return Ok(Flow::Halt(Outcome::Exited(self.value(code)))),
            Intrinsic::Mem { dst, size } => {
                let size = self.value(size);
                let ptr = self.memory.alloc(size)?;
                self.set(dst, ptr);
            }
            Intrinsic::Vget { dst, vector, index } => {
                let v = self.vector_get(self.value(vector), self.value(index))?;
                self.set(dst, v);
            }
            Intrinsic::Itos { dst, value } => {
                let text = self.value(value).to_string();
                let ptr = self.memory.alloc_string(&text)?;
                self.set(dst, ptr);
            }
            Intrinsic::Vtos { dst, vector } => {
                let text = self.format_vector(self.value(vector))?;
                let ptr = self.memory.alloc_string(&text)?;
                self.set(dst, ptr);
            }
            Intrinsic::Sconcat { dst, left, right } => {
                let mut text = self.memory.read_string(self.value(left))?;
                text.push_str(&self.memory.read_string(self.value(right))?);
                let ptr = self.memory.alloc_string(&text)?;
                self.set(dst, ptr);
            }
        }
        Ok(Flow::Next)
    }

    /// Element count stored in the word before a vector pointer.
    fn vector_len(&self, ptr: i64) -> Result<i64, Fault> {
        if ptr < self.config.global_base {
            return Err(Fault::InvalidVector(ptr));
        }
        match self.memory.read(ptr - 1) {
            Ok(size) if size >= 0 => Ok(size),
            _ => Err(Fault::InvalidVector(ptr)),
        }
    }

    fn vector_get(&self, ptr: i64, index: i64) -> Result<i64, Fault> {
        let size = self.vector_len(ptr)?;
        if index < 0 || index >= size {
            return Err(Fault::IndexOutOfBounds { index, size });
        }
        match self.memory.read(ptr + index) {
            Err(Fault::UninitializedRead(_)) => Err(Fault::UninitializedElement(index)),
            other => other,
        }
    }

    fn format_vector(&self, ptr: i64) -> Result<String, Fault> {
        let size = self.vector_len(ptr)?;
        let mut items = Vec::new();
        for i in 0..size {
            items.push(self.vector_get(ptr, i)?.to_string());
        }
        Ok(format!("[{}]", items.join(",")))
    }
}

fn resolve(program: &Program, label: &str) -> Result<usize, Fault> {
    program
        .label(label)
        .ok_or_else(|| Fault::UndefinedLabel(label.to_string()))
}

fn arith(op: ArithOp, a: i64, b: i64) -> Result<i64, Fault> {
    let overflow = || Fault::Overflow(op.mnemonic());
    match op {
        ArithOp::Add => a.checked_add(b).ok_or_else(overflow),
        ArithOp::Sub => a.checked_sub(b).ok_or_else(overflow),
        ArithOp::Mul => a.checked_mul(b).ok_or_else(overflow),
        ArithOp::Div => {
            if b == 0 {
                return Err(Fault::DivisionByZero);
            }
            a.checked_div(b).ok_or_else(overflow)
        }
        ArithOp::Mod => {
            if b == 0 {
                return Err(Fault::ModuloByZero);
            }
            if b == -1 {
                return Ok(0);
            }
            let r = a % b;
            Ok(if r != 0 && (r < 0) != (b < 0) { r + b } else { r })
        }
        ArithOp::And => Ok((a != 0 && b != 0) as i64),
        ArithOp::Or => Ok((a != 0 || b != 0) as i64),
    }
}

fn emit<W: Write>(output: &mut W, text: &str) -> Result<(), Fault> {
    output
        .write_all(text.as_bytes())
        .map_err(|e| Fault::Io(e.to_string()))
}

fn read_int<R: BufRead>(input: &mut R) -> Result<i64, Fault> {
    let mut line = String::new();
    let n = input
        .read_line(&mut line)
        .map_err(|e| Fault::Io(e.to_string()))?;
    if n == 0 {
        return Err(Fault::InvalidInput("end of input".to_string()));
    }
    line.trim()
        .parse::<i64>()
        .map_err(|_| Fault::InvalidInput(line.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::loader::load;
    use std::io::Cursor;

    fn run_with_input(src: &str, input: &str) -> (Result<Outcome, RuntimeError>, String) {
        let program = load(src).unwrap();
        let mut vm = Vm::new();
        let mut out = Vec::new();
        let result = vm.run(&program, &mut Cursor::new(input.to_string()), &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    fn run_src(src: &str) -> (Result<Outcome, RuntimeError>, String) {
        run_with_input(src, "")
    }

    fn assert_fault(src: &str, expected: Fault) {
        match run_src(src).0 {
            Err(e) => assert_eq!(e.fault, expected),
            Ok(outcome) => panic!("expected {:?}, got {:?}", expected, outcome),
        }
    }

    fn main_body(body: &str) -> String {
        format!("proc main\n{}\nret\n", body)
    }

    #[test]
    fn test_print_integer() {
        let (result, out) = run_src(&main_body("mov r1, 5\ncall iput, r1\ncall nl"));
        assert_eq!(result, Ok(Outcome::Returned));
        assert_eq!(out, "5\n");
    }

    #[test]
    fn test_division_truncates() {
        let (_, out) = run_src(&main_body(
            "mov r1, -7\ndiv r2, r1, 2\ncall iput, r2\ncall nl\ndiv r3, 7, -2\ncall iput, r3",
        ));
        assert_eq!(out, "-3\n-3");
    }

    #[test]
    fn test_output_is_flushed_on_fault() {
        let program = load(&main_body("mov r1, 5\ncall iput, r1\ndiv r2, r1, 0")).unwrap();
        let mut out = std::io::BufWriter::new(Vec::new());
        let result = Vm::new().run(&program, &mut Cursor::new(String::new()), &mut out);
        assert!(result.is_err());
        assert!(out.buffer().is_empty());
        assert_eq!(out.get_ref().as_slice(), b"5");
    }

    #[test]
    fn test_modulo_follows_divisor() {
        assert_eq!(arith(ArithOp::Mod, -7, 3), Ok(2));
        assert_eq!(arith(ArithOp::Mod, 7, -3), Ok(-2));
        assert_eq!(arith(ArithOp::Mod, 7, 3), Ok(1));
        assert_eq!(arith(ArithOp::Mod, i64::MIN, -1), Ok(0));
    }

    #[test]
    fn test_arith_faults() {
        assert_eq!(arith(ArithOp::Div, 1, 0), Err(Fault::DivisionByZero));
        assert_eq!(arith(ArithOp::Mod, 1, 0), Err(Fault::ModuloByZero));
        assert_eq!(arith(ArithOp::Add, i64::MAX, 1), Err(Fault::Overflow("add")));
        assert_eq!(arith(ArithOp::Div, i64::MIN, -1), Err(Fault::Overflow("div")));
        assert_eq!(arith(ArithOp::And, 3, 0), Ok(0));
        assert_eq!(arith(ArithOp::Or, 0, -2), Ok(1));
    }

    #[test]
    fn test_globals_run_before_main() {
        let src = "mov r1, 10000\nst [r1], 42\n\
                   proc main\nld r2, [10000]\ncall iput, r2\nret\n\
                   call iput, 7\n";
        let (result, out) = run_src(src);
        assert_eq!(result, Ok(Outcome::Returned));
        // Top-level code after main runs in the global phase too.
        assert_eq!(out, "742");
    }

    #[test]
    fn test_global_phase_can_call_procedures() {
        let src = "proc seven\nmov r0, 7\nret\n\
                   call seven\nmov r5, 10001\nst [r5], r0\n\
                   proc main\nld r1, [10001]\ncall iput, r1\nret\n";
        let (result, out) = run_src(src);
        assert_eq!(result, Ok(Outcome::Returned));
        assert_eq!(out, "7");
    }

    #[test]
    fn test_call_and_return() {
        let src = "proc twice\npush fp\nmov fp, sp\nadd r1, fp, 2\nld r2, [r1]\nmul r0, r2, 2\npop fp\nret\n\
                   proc main\npush 21\ncall twice\nadd sp, sp, 1\ncall iput, r0\nret\n";
        let (result, out) = run_src(src);
        assert_eq!(result, Ok(Outcome::Returned));
        assert_eq!(out, "42");
    }

    #[test]
    fn test_exit_status() {
        let (result, out) = run_src(&main_body("call exit, 2\ncall iput, 1"));
        assert_eq!(result, Ok(Outcome::Exited(2)));
        assert_eq!(out, "");
    }

    #[test]
    fn test_missing_main() {
        let program = load("mov r1, 1\n").unwrap();
        let mut out = Vec::new();
        let err = Vm::new()
            .run(&program, &mut Cursor::new(String::new()), &mut out)
            .unwrap_err();
        assert_eq!(err.fault, Fault::MissingEntry("main".to_string()));
    }

    #[test]
    fn test_uninitialized_read() {
        assert_fault(
            &main_body("call mem, r1, 3\nld r2, [r1]"),
            Fault::UninitializedRead(20000),
        );
    }

    #[test]
    fn test_vectors() {
        let body = "call mem, r1, 3\nst [r1], 2\nadd r1, r1, 1\n\
                    st [r1], 4\nadd r2, r1, 1\nst [r2], 5\n\
                    call vprint, r1\ncall nl\ncall vget, r3, r1, 1\ncall iput, r3";
        let (result, out) = run_src(&main_body(body));
        assert_eq!(result, Ok(Outcome::Returned));
        assert_eq!(out, "[4,5]\n5");
    }

    #[test]
    fn test_vget_faults() {
        let alloc = "call mem, r1, 3\nst [r1], 2\nadd r1, r1, 1\n";
        assert_fault(
            &main_body(&format!("{}call vget, r2, r1, 2", alloc)),
            Fault::IndexOutOfBounds { index: 2, size: 2 },
        );
        assert_fault(
            &main_body(&format!("{}call vget, r2, r1, 0", alloc)),
            Fault::UninitializedElement(0),
        );
        assert_fault(
            &main_body("call vget, r2, 0, 0"),
            Fault::InvalidVector(0),
        );
    }

    #[test]
    fn test_strings() {
        let body = "sload r1, \"n=\"\ncall itos, r2, 12\ncall sconcat, r3, r1, r2\n\
                    call sprint, r3\ncall nl";
        let (_, out) = run_src(&main_body(body));
        assert_eq!(out, "n=12\n");
    }

    #[test]
    fn test_input() {
        let body = "call iget, r1\ncall iget, r2\nadd r3, r1, r2\ncall iput, r3";
        let (result, out) = run_with_input(&main_body(body), "3\n 4 \n");
        assert_eq!(result, Ok(Outcome::Returned));
        assert_eq!(out, "7");

        let (result, _) = run_with_input(&main_body("call iget, r1"), "abc\n");
        assert_eq!(
            result.unwrap_err().fault,
            Fault::InvalidInput("abc".to_string())
        );
        let (result, _) = run_with_input(&main_body("call iget, r1"), "");
        assert!(matches!(result.unwrap_err().fault, Fault::InvalidInput(_)));
    }

    #[test]
    fn test_step_limit() {
        let program = load("proc main\nL1:\nbr L1\nret\n").unwrap();
        let config = VmConfig {
            max_steps: Some(100),
            ..VmConfig::default()
        };
        let mut out = Vec::new();
        let err = Vm::with_config(config)
            .run(&program, &mut Cursor::new(String::new()), &mut out)
            .unwrap_err();
        assert_eq!(err.fault, Fault::StepLimit(100));
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn test_error_carries_location() {
        let (result, _) = run_src(&main_body("mov r1, 0\ndiv r2, 1, r1"));
        let err = result.unwrap_err();
        assert_eq!(err.line, Some(3));
        assert_eq!(err.to_string(), "Division by zero (line 3: div r2, 1, r1)");
    }

    #[test]
    fn test_registers_default_to_zero() {
        let (_, out) = run_src(&main_body("call iput, r9"));
        assert_eq!(out, "0");
    }
}
