use std::fmt;

// =============================================================================
// Operands
// =============================================================================

/// A machine register. General registers are created on first use.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Register {
    Sp,
    Fp,
    Named(String),
}

impl Register {
    /// Virtual register `rN`.
    pub fn r(n: u32) -> Self {
        Register::Named(format!("r{}", n))
    }

    /// `r0`, where callees leave their result.
    pub fn result() -> Self {
        Register::r(0)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Register::Sp => f.write_str("sp"),
            Register::Fp => f.write_str("fp"),
            Register::Named(name) => f.write_str(name),
        }
    }
}

/// Register or immediate integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Reg(Register),
    Imm(i64),
}

impl From<Register> for Operand {
    fn from(reg: Register) -> Self {
        Operand::Reg(reg)
    }
}

impl From<&Register> for Operand {
    fn from(reg: &Register) -> Self {
        Operand::Reg(reg.clone())
    }
}

impl From<i64> for Operand {
    fn from(n: i64) -> Self {
        Operand::Imm(n)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(reg) => write!(f, "{}", reg),
            Operand::Imm(n) => write!(f, "{}", n),
        }
    }
}

// =============================================================================
// Instructions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    /// Truncates toward zero.
    Div,
    /// Result takes the sign of the divisor.
    Mod,
    /// Logical and of two truth values, yielding 0 or 1.
    And,
    /// Logical or of two truth values, yielding 0 or 1.
    Or,
}

impl ArithOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "sub",
            ArithOp::Mul => "mul",
            ArithOp::Div => "div",
            ArithOp::Mod => "mod",
            ArithOp::And => "and",
            ArithOp::Or => "or",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Self> {
        Some(match s {
            "add" => ArithOp::Add,
            "sub" => ArithOp::Sub,
            "mul" => ArithOp::Mul,
            "div" => ArithOp::Div,
            "mod" => ArithOp::Mod,
            "and" => ArithOp::And,
            "or" => ArithOp::Or,
            _ => return None,
        })
    }
}

/// Comparison condition of a `cmp` instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Cond {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Cond::Eq => "cmp==",
            Cond::Ne => "cmp!=",
            Cond::Lt => "cmp<",
            Cond::Le => "cmp<=",
            Cond::Gt => "cmp>",
            Cond::Ge => "cmp>=",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Self> {
        Some(match s {
            "cmp==" => Cond::Eq,
            "cmp!=" => Cond::Ne,
            "cmp<" => Cond::Lt,
            "cmp<=" => Cond::Le,
            "cmp>" => Cond::Gt,
            "cmp>=" => Cond::Ge,
            _ => return None,
        })
    }

    pub fn holds(self, a: i64, b: i64) -> bool {
        match self {
            Cond::Eq => a == b,
            Cond::Ne => a != b,
            Cond::Lt => a < b,
            Cond::Le => a <= b,
            Cond::Gt => a > b,
            Cond::Ge => a >= b,
        }
    }
}

/// Built-in routines reached through `call <name>, operands...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intrinsic {
    /// Print an integer (no newline).
    Iput(Operand),
    /// Print a NUL-terminated string (no newline).
    Sprint(Operand),
    /// Print a length-prefixed vector as `[a,b,c]` (no newline).
    Vprint(Operand),
    /// Print a newline.
    Nl,
    /// Read one integer line from the console.
    Iget(Register),
    /// Terminate with the given status.
    Exit(Operand),
    /// Bump-allocate `size` uninitialized cells.
    Mem { dst: Register, size: Operand },
    /// Bounds-checked vector element read.
    Vget {
        dst: Register,
        vector: Operand,
        index: Operand,
    },
    /// Integer to freshly allocated string.
    Itos { dst: Register, value: Operand },
    /// Vector to freshly allocated string, formatted like `vprint`.
    Vtos { dst: Register, vector: Operand },
    /// Concatenate two strings into a fresh one.
    Sconcat {
        dst: Register,
        left: Operand,
        right: Operand,
    },
}

impl Intrinsic {
    pub fn name(&self) -> &'static str {
        match self {
            Intrinsic::Iput(_) => "iput",
            Intrinsic::Sprint(_) => "sprint",
            Intrinsic::Vprint(_) => "vprint",
            Intrinsic::Nl => "nl",
            Intrinsic::Iget(_) => "iget",
            Intrinsic::Exit(_) => "exit",
            Intrinsic::Mem { .. } => "mem",
            Intrinsic::Vget { .. } => "vget",
            Intrinsic::Itos { .. } => "itos",
            Intrinsic::Vtos { .. } => "vtos",
            Intrinsic::Sconcat { .. } => "sconcat",
        }
    }
}

impl fmt::Display for Intrinsic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call {}", self.name())?;
        match self {
            Intrinsic::Nl => Ok(()),
            Intrinsic::Iput(v) | Intrinsic::Sprint(v) | Intrinsic::Vprint(v) | Intrinsic::Exit(v) => {
                write!(f, ", {}", v)
            }
            Intrinsic::Iget(dst) => write!(f, ", {}", dst),
            Intrinsic::Mem { dst, size } => write!(f, ", {}, {}", dst, size),
            Intrinsic::Vget { dst, vector, index } => {
                write!(f, ", {}, {}, {}", dst, vector, index)
            }
            Intrinsic::Itos { dst, value } => write!(f, ", {}, {}", dst, value),
            Intrinsic::Vtos { dst, vector } => write!(f, ", {}, {}", dst, vector),
            Intrinsic::Sconcat { dst, left, right } => {
                write!(f, ", {}, {}, {}", dst, left, right)
            }
        }
    }
}

/// One TSVM instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
    Mov { dst: Register, src: Operand },
    /// Copy a string literal into fresh heap cells, NUL-terminated.
    Sload { dst: Register, text: String },
    Push(Operand),
    Pop(Register),
    /// `ld dst, [addr]`
    Ld { dst: Register, addr: Operand },
    /// `st [addr], src`
    St { addr: Operand, src: Operand },
    Arith {
        op: ArithOp,
        dst: Register,
        lhs: Operand,
        rhs: Operand,
    },
    /// Writes 1 when the condition holds, 0 otherwise.
    Cmp {
        cond: Cond,
        dst: Register,
        lhs: Operand,
        rhs: Operand,
    },

    // =========================================================================
    // Control flow
    // =========================================================================
    Br(String),
    /// Branch when the operand is zero.
    Bz(Operand, String),
    /// Branch when the operand is non-zero.
    Bnz(Operand, String),
    /// Push the return address (next instruction) and jump to a procedure.
    Call(String),
    Intrinsic(Intrinsic),
    /// Pop a return address and jump to it; the sentinel ends the run.
    Ret,
    /// Procedure boundary marker. Registers a label, never executed.
    Proc(String),
}

impl Instr {
    pub fn arith(op: ArithOp, dst: Register, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> Self {
        Instr::Arith {
            op,
            dst,
            lhs: lhs.into(),
            rhs: rhs.into(),
        }
    }

    pub fn mov(dst: Register, src: impl Into<Operand>) -> Self {
        Instr::Mov {
            dst,
            src: src.into(),
        }
    }

    /// Label this instruction may transfer control to, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            Instr::Br(label) | Instr::Bz(_, label) | Instr::Bnz(_, label) | Instr::Call(label) => {
                Some(label)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Mov { dst, src } => write!(f, "mov {}, {}", dst, src),
            Instr::Sload { dst, text } => write!(f, "sload {}, {}", dst, quote(text)),
            Instr::Push(src) => write!(f, "push {}", src),
            Instr::Pop(dst) => write!(f, "pop {}", dst),
            Instr::Ld { dst, addr } => write!(f, "ld {}, [{}]", dst, addr),
            Instr::St { addr, src } => write!(f, "st [{}], {}", addr, src),
            Instr::Arith { op, dst, lhs, rhs } => {
                write!(f, "{} {}, {}, {}", op.mnemonic(), dst, lhs, rhs)
            }
            Instr::Cmp {
                cond,
                dst,
                lhs,
                rhs,
            } => write!(f, "{} {}, {}, {}", cond.mnemonic(), dst, lhs, rhs),
            Instr::Br(label) => write!(f, "br {}", label),
            Instr::Bz(cond, label) => write!(f, "bz {}, {}", cond, label),
            Instr::Bnz(cond, label) => write!(f, "bnz {}, {}", cond, label),
            Instr::Call(label) => write!(f, "call {}", label),
            Instr::Intrinsic(intrinsic) => write!(f, "{}", intrinsic),
            Instr::Ret => write!(f, "ret"),
            Instr::Proc(name) => write!(f, "proc {}", name),
        }
    }
}

// =============================================================================
// Listing
// =============================================================================

/// A line of assembly as emitted by the code generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Instr(Instr),
    Label(String),
    Comment(String),
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Line::Instr(instr @ Instr::Proc(_)) => write!(f, "{}", instr),
            Line::Instr(instr) => write!(f, "    {}", instr),
            Line::Label(name) => write!(f, "{}:", name),
            Line::Comment(text) => write!(f, "# {}", text),
        }
    }
}

/// Render lines as newline-separated assembly text.
pub fn render(lines: &[Line]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(&line.to_string());
        out.push('\n');
    }
    out
}

/// Double-quote a string literal, escaping what the loader unescapes.
fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_shapes() {
        let lines = vec![
            Line::Instr(Instr::Proc("main".to_string())),
            Line::Instr(Instr::Push(Register::Fp.into())),
            Line::Instr(Instr::mov(Register::Fp, Register::Sp)),
            Line::Instr(Instr::Ld {
                dst: Register::r(2),
                addr: Register::r(1).into(),
            }),
            Line::Instr(Instr::Cmp {
                cond: Cond::Le,
                dst: Register::r(3),
                lhs: Register::r(2).into(),
                rhs: Operand::Imm(10),
            }),
            Line::Instr(Instr::Intrinsic(Intrinsic::Vget {
                dst: Register::r(4),
                vector: Register::r(1).into(),
                index: Operand::Imm(0),
            })),
            Line::Label("L1".to_string()),
            Line::Comment("Error: Var q not in map".to_string()),
        ];
        assert_eq!(
            render(&lines),
            "proc main\n    push fp\n    mov fp, sp\n    ld r2, [r1]\n    cmp<= r3, r2, 10\n    call vget, r4, r1, 0\nL1:\n# Error: Var q not in map\n"
        );
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("say \"hi\"\n"), "\"say \\\"hi\\\"\\n\"");
        assert_eq!(quote("a#b"), "\"a#b\"");
    }
}
