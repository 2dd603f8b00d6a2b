use super::op::Instr;
use std::collections::HashMap;

/// A loaded assembly program: the instruction stream with labels resolved to
/// instruction indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub instrs: Vec<Instr>,
    /// 1-based source line of each instruction, for diagnostics.
    pub source_lines: Vec<usize>,
    pub labels: HashMap<String, usize>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    pub fn source_line(&self, ip: usize) -> Option<usize> {
        self.source_lines.get(ip).copied()
    }

    pub(crate) fn push(&mut self, instr: Instr, line: usize) {
        self.instrs.push(instr);
        self.source_lines.push(line);
    }

    /// Index just past the `ret` that closes the procedure whose `proc`
    /// marker sits at `start`. Nested procedures are skipped whole.
    pub fn skip_procedure(&self, start: usize) -> usize {
        let mut depth = 0usize;
        let mut ip = start;
        while ip < self.instrs.len() {
            match self.instrs[ip] {
                Instr::Proc(_) => depth += 1,
                Instr::Ret => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return ip + 1;
                    }
                }
                _ => {}
            }
            ip += 1;
        }
        ip
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::op::{Instr, Operand};

    #[test]
    fn test_skip_procedure_handles_nesting() {
        let mut program = Program::new();
        let instrs = vec![
            Instr::Proc("outer".to_string()),
            Instr::Push(Operand::Imm(1)),
            Instr::Proc("inner".to_string()),
            Instr::Ret,
            Instr::Ret,
            Instr::Push(Operand::Imm(2)),
        ];
        for (i, instr) in instrs.into_iter().enumerate() {
            program.push(instr, i + 1);
        }
        assert_eq!(program.skip_procedure(0), 5);
        assert_eq!(program.skip_procedure(2), 4);
    }

    #[test]
    fn test_skip_unterminated_runs_to_end() {
        let mut program = Program::new();
        program.push(Instr::Proc("f".to_string()), 1);
        program.push(Instr::Push(Operand::Imm(1)), 2);
        assert_eq!(program.skip_procedure(0), 2);
    }
}
