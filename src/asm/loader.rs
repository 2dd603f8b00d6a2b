//! Assembly text loader.
//!
//! One instruction, label (`name:`) or `proc name` per line. `#` starts a
//! comment outside string literals and commas only separate operands.

use super::op::{ArithOp, Cond, Instr, Intrinsic, Operand, Register};
use super::program::Program;
use log::debug;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("line {line}: malformed instruction '{text}': {reason}")]
    Malformed {
        line: usize,
        text: String,
        reason: String,
    },
    #[error("line {line}: unknown instruction '{mnemonic}'")]
    UnknownMnemonic { line: usize, mnemonic: String },
    #[error("line {line}: label '{label}' is already defined")]
    DuplicateLabel { line: usize, label: String },
    #[error("line {line}: undefined label '{label}'")]
    UndefinedLabel { line: usize, label: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Str(String),
    /// `[inner]`
    Mem(String),
}

pub fn load(source: &str) -> Result<Program, LoadError> {
    let mut program = Program::new();

    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        let tokens = tokenize(raw).map_err(|reason| malformed(line, raw, reason))?;
        let Some(first) = tokens.first() else {
            continue;
        };

        if let Token::Word(word) = first {
            if let Some(label) = word.strip_suffix(':') {
                if tokens.len() != 1 || !is_name(label) {
                    return Err(malformed(line, raw, "a label stands alone on its line"));
                }
                let at = program.len();
                define_label(&mut program, label, at, line)?;
                continue;
            }
        }

        let mut parser = LineParser {
            tokens: tokens.into_iter(),
            line,
            text: raw.trim(),
        };
        let instr = parser.instruction()?;
        parser.finish()?;

        if let Instr::Proc(name) = &instr {
            // Calls land on the first instruction of the body, not the marker.
            let at = program.len() + 1;
            define_label(&mut program, name, at, line)?;
        }
        program.push(instr, line);
    }

    for (ip, instr) in program.instrs.iter().enumerate() {
        if let Some(label) = instr.target() {
            if !program.labels.contains_key(label) {
                return Err(LoadError::UndefinedLabel {
                    line: program.source_lines[ip],
                    label: label.to_string(),
                });
            }
        }
    }

    debug!(
        "loaded {} instructions, {} labels",
        program.len(),
        program.labels.len()
    );
    Ok(program)
}

fn define_label(
    program: &mut Program,
    name: &str,
    target: usize,
    line: usize,
) -> Result<(), LoadError> {
    if program.labels.contains_key(name) {
        return Err(LoadError::DuplicateLabel {
            line,
            label: name.to_string(),
        });
    }
    program.labels.insert(name.to_string(), target);
    Ok(())
}

fn malformed(line: usize, text: &str, reason: impl Into<String>) -> LoadError {
    LoadError::Malformed {
        line,
        text: text.trim().to_string(),
        reason: reason.into(),
    }
}

fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// =============================================================================
// Tokenizer
// =============================================================================

fn tokenize(line: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            '#' => break,
            ',' => {
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '"' => {
                chars.next();
                tokens.push(Token::Str(read_string(&mut chars)?));
            }
            '[' => {
                chars.next();
                let mut inner = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(c) => inner.push(c),
                        None => return Err("missing ']'".to_string()),
                    }
                }
                tokens.push(Token::Mem(inner.trim().to_string()));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || c == ',' || c == '#' || c == '"' {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    Ok(tokens)
}

fn read_string(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<String, String> {
    let mut out = String::new();
    loop {
        match chars.next() {
            Some('"') => return Ok(out),
            Some('\\') => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('0') => out.push('\0'),
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                Some(other) => return Err(format!("unknown escape '\\{}'", other)),
                None => return Err("unterminated string literal".to_string()),
            },
            Some(c) => out.push(c),
            None => return Err("unterminated string literal".to_string()),
        }
    }
}

// =============================================================================
// Parser
// =============================================================================

struct LineParser<'a> {
    tokens: std::vec::IntoIter<Token>,
    line: usize,
    text: &'a str,
}

impl LineParser<'_> {
    fn error(&self, reason: impl Into<String>) -> LoadError {
        malformed(self.line, self.text, reason)
    }

    fn next(&mut self, what: &str) -> Result<Token, LoadError> {
        self.tokens
            .next()
            .ok_or_else(|| self.error(format!("expected {}", what)))
    }

    fn word(&mut self, what: &str) -> Result<String, LoadError> {
        match self.next(what)? {
            Token::Word(word) => Ok(word),
            _ => Err(self.error(format!("expected {}", what))),
        }
    }

    fn finish(&mut self) -> Result<(), LoadError> {
        match self.tokens.next() {
            None => Ok(()),
            Some(_) => Err(self.error("too many operands")),
        }
    }

    fn register(&mut self) -> Result<Register, LoadError> {
        let word = self.word("a register")?;
        parse_register(&word).ok_or_else(|| self.error(format!("'{}' is not a register", word)))
    }

    fn operand(&mut self) -> Result<Operand, LoadError> {
        let word = self.word("an operand")?;
        parse_operand(&word).ok_or_else(|| self.error(format!("'{}' is not an operand", word)))
    }

    fn memory(&mut self) -> Result<Operand, LoadError> {
        match self.next("a memory reference")? {
            Token::Mem(inner) => parse_operand(&inner)
                .ok_or_else(|| self.error(format!("'[{}]' is not a memory reference", inner))),
            _ => Err(self.error("expected a memory reference")),
        }
    }

    fn label(&mut self) -> Result<String, LoadError> {
        let word = self.word("a label")?;
        if is_name(&word) {
            Ok(word)
        } else {
            Err(self.error(format!("'{}' is not a label", word)))
        }
    }

    fn instruction(&mut self) -> Result<Instr, LoadError> {
        let mnemonic = self.word("an instruction")?;

        if let Some(op) = ArithOp::from_mnemonic(&mnemonic) {
            return Ok(Instr::Arith {
                op,
                dst: self.register()?,
                lhs: self.operand()?,
                rhs: self.operand()?,
            });
        }
        if let Some(cond) = Cond::from_mnemonic(&mnemonic) {
            return Ok(Instr::Cmp {
                cond,
                dst: self.register()?,
                lhs: self.operand()?,
                rhs: self.operand()?,
            });
        }

        let instr = match mnemonic.as_str() {
            "mov" => Instr::Mov {
                dst: self.register()?,
                src: self.operand()?,
            },
            "sload" => {
                let dst = self.register()?;
                match self.next("a string literal")? {
                    Token::Str(text) => Instr::Sload { dst, text },
                    _ => return Err(self.error("expected a string literal")),
                }
            }
            "push" => Instr::Push(self.operand()?),
            "pop" => Instr::Pop(self.register()?),
            "ld" => Instr::Ld {
                dst: self.register()?,
                addr: self.memory()?,
            },
            "st" => Instr::St {
                addr: self.memory()?,
                src: self.operand()?,
            },
            "br" => Instr::Br(self.label()?),
            "bz" => Instr::Bz(self.operand()?, self.label()?),
            "bnz" => Instr::Bnz(self.operand()?, self.label()?),
            "call" => {
                let target = self.label()?;
                match self.intrinsic(&target)? {
                    Some(intrinsic) => Instr::Intrinsic(intrinsic),
                    None => Instr::Call(target),
                }
            }
            "ret" => Instr::Ret,
            "proc" => Instr::Proc(self.label()?),
            _ => {
                return Err(LoadError::UnknownMnemonic {
                    line: self.line,
                    mnemonic,
                });
            }
        };
        Ok(instr)
    }

    /// Operands of the intrinsic `name`; `None` for a procedure call.
    fn intrinsic(&mut self, name: &str) -> Result<Option<Intrinsic>, LoadError> {
        let intrinsic = match name {
            "iput" => Intrinsic::Iput(self.operand()?),
            "sprint" => Intrinsic::Sprint(self.operand()?),
            "vprint" => Intrinsic::Vprint(self.operand()?),
            "nl" => Intrinsic::Nl,
            "iget" => Intrinsic::Iget(self.register()?),
            "exit" => Intrinsic::Exit(self.operand()?),
            "mem" => Intrinsic::Mem {
                dst: self.register()?,
                size: self.operand()?,
            },
            "vget" => Intrinsic::Vget {
                dst: self.register()?,
                vector: self.operand()?,
                index: self.operand()?,
            },
            "itos" => Intrinsic::Itos {
                dst: self.register()?,
                value: self.operand()?,
            },
            "vtos" => Intrinsic::Vtos {
                dst: self.register()?,
                vector: self.operand()?,
            },
            "sconcat" => Intrinsic::Sconcat {
                dst: self.register()?,
                left: self.operand()?,
                right: self.operand()?,
            },
            _ => return Ok(None),
        };
        Ok(Some(intrinsic))
    }
}

fn parse_register(word: &str) -> Option<Register> {
    match word {
        "sp" => Some(Register::Sp),
        "fp" => Some(Register::Fp),
        _ if is_name(word) => Some(Register::Named(word.to_string())),
        _ => None,
    }
}

fn parse_operand(word: &str) -> Option<Operand> {
    if let Ok(n) = word.parse::<i64>() {
        return Some(Operand::Imm(n));
    }
    parse_register(word).map(Operand::Reg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::op::{Line, render};

    fn load_ok(src: &str) -> Program {
        match load(src) {
            Ok(program) => program,
            Err(e) => panic!("load failed: {}", e),
        }
    }

    #[test]
    fn test_labels_and_proc_markers() {
        let program = load_ok(
            "mov r1, 5   # global init\n\
             proc main\n\
             push fp\n\
             L1:\n\
             \n\
             ret\n",
        );
        assert_eq!(program.len(), 4);
        assert_eq!(program.instrs[1], Instr::Proc("main".to_string()));
        assert_eq!(program.label("main"), Some(2));
        assert_eq!(program.label("L1"), Some(3));
        assert_eq!(program.source_line(3), Some(6));
    }

    #[test]
    fn test_string_keeps_hash_and_commas() {
        let program = load_ok("sload r1, \"a, b # c\\n\"");
        assert_eq!(
            program.instrs[0],
            Instr::Sload {
                dst: Register::r(1),
                text: "a, b # c\n".to_string(),
            }
        );
    }

    #[test]
    fn test_memory_operands() {
        let program = load_ok("ld r2, [r1]\nst [fp], -4\n");
        assert_eq!(
            program.instrs[0],
            Instr::Ld {
                dst: Register::r(2),
                addr: Operand::Reg(Register::r(1)),
            }
        );
        assert_eq!(
            program.instrs[1],
            Instr::St {
                addr: Operand::Reg(Register::Fp),
                src: Operand::Imm(-4),
            }
        );
    }

    #[test]
    fn test_call_distinguishes_intrinsics() {
        let program = load_ok("proc f\nret\ncall f\ncall mem, r1, 4\ncall nl\n");
        assert_eq!(program.instrs[2], Instr::Call("f".to_string()));
        assert_eq!(
            program.instrs[3],
            Instr::Intrinsic(Intrinsic::Mem {
                dst: Register::r(1),
                size: Operand::Imm(4),
            })
        );
        assert_eq!(program.instrs[4], Instr::Intrinsic(Intrinsic::Nl));
    }

    #[test]
    fn test_rendered_listing_loads_back() {
        let lines = vec![
            Line::Instr(Instr::Proc("main".to_string())),
            Line::Instr(Instr::Sload {
                dst: Register::r(1),
                text: "quote \" here".to_string(),
            }),
            Line::Label("L_main_return".to_string()),
            Line::Instr(Instr::Ret),
        ];
        let program = load_ok(&render(&lines));
        assert_eq!(
            program.instrs[1],
            Instr::Sload {
                dst: Register::r(1),
                text: "quote \" here".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_mnemonic() {
        let err = load("mov r1, 1\njmp L1\n").unwrap_err();
        assert_eq!(
            err,
            LoadError::UnknownMnemonic {
                line: 2,
                mnemonic: "jmp".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_label() {
        let err = load("L1:\nmov r1, 1\nL1:\n").unwrap_err();
        assert!(matches!(err, LoadError::DuplicateLabel { line: 3, .. }));
    }

    #[test]
    fn test_undefined_label() {
        let err = load("br nowhere\n").unwrap_err();
        assert_eq!(err.to_string(), "line 1: undefined label 'nowhere'");
    }

    #[test]
    fn test_malformed_lines() {
        assert!(matches!(load("add r1, r2\n"), Err(LoadError::Malformed { .. })));
        assert!(matches!(load("ld r1, r2\n"), Err(LoadError::Malformed { .. })));
        assert!(matches!(load("sload r1, \"open\n"), Err(LoadError::Malformed { .. })));
        assert!(matches!(load("mov r1, 2, 3\n"), Err(LoadError::Malformed { .. })));
        assert!(matches!(load("pop 7\n"), Err(LoadError::Malformed { line: 1, .. })));
    }
}
