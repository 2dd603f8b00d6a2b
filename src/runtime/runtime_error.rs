/// Conditions that halt the machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    #[error("Memory access out of bounds at {0}")]
    AddressOutOfBounds(i64),
    #[error("Read uninitialized memory at address {0}")]
    UninitializedRead(i64),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Modulo by zero")]
    ModuloByZero,
    #[error("Arithmetic overflow in {0}")]
    Overflow(&'static str),
    #[error("Vector index {index} out of bounds (size {size})")]
    IndexOutOfBounds { index: i64, size: i64 },
    #[error("Vector index {0} is uninitialized")]
    UninitializedElement(i64),
    #[error("Invalid vector pointer")]
    InvalidVector(i64),
    #[error("Invalid input")]
    InvalidInput(String),
    #[error("Out of memory: cannot allocate {requested} cells")]
    OutOfMemory { requested: i64 },
    #[error("Cannot allocate a negative number of cells ({0})")]
    NegativeAllocation(i64),
    #[error("Invalid return address {0}")]
    BadReturnAddress(i64),
    #[error("Execution step limit exceeded ({0})")]
    StepLimit(usize),
    #[error("Undefined label '{0}'")]
    UndefinedLabel(String),
    #[error("No '{0}' procedure found")]
    MissingEntry(String),
    #[error("I/O error: {0}")]
    Io(String),
}

/// A fault plus where it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub fault: Fault,
    pub ip: Option<usize>,
    pub line: Option<usize>,
    pub instruction: Option<String>,
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.fault)?;
        match (self.ip, self.line, &self.instruction) {
            (_, Some(line), Some(instr)) => write!(f, " (line {}: {})", line, instr),
            (Some(ip), None, Some(instr)) => write!(f, " (instruction {}: {})", ip, instr),
            _ => Ok(()),
        }
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.fault)
    }
}

impl RuntimeError {
    pub fn new(fault: Fault) -> Self {
        RuntimeError {
            fault,
            ip: None,
            line: None,
            instruction: None,
        }
    }

    pub fn with_context(mut self, ip: usize, line: Option<usize>, instruction: String) -> Self {
        self.ip = Some(ip);
        self.line = line;
        self.instruction = Some(instruction);
        self
    }
}

impl From<Fault> for RuntimeError {
    fn from(fault: Fault) -> Self {
        RuntimeError::new(fault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_location() {
        let err = RuntimeError::new(Fault::DivisionByZero).with_context(
            4,
            Some(9),
            "div r1, r1, 0".to_string(),
        );
        assert_eq!(err.to_string(), "Division by zero (line 9: div r1, r1, 0)");
    }

    #[test]
    fn test_display_bare() {
        let err: RuntimeError = Fault::MissingEntry("main".to_string()).into();
        assert_eq!(err.to_string(), "No 'main' procedure found");
    }
}
