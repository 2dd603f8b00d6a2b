/// A diagnostic from the semantic checker, rendered as
/// `Error in class 'C': in function 'f': message`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Error {}{message}", prefix(.class, .function))]
pub struct SemanticError {
    /// Class being checked when the error was found.
    pub class: Option<String>,
    /// Function or method being checked when the error was found.
    pub function: Option<String>,
    pub message: String,
}

fn prefix(class: &Option<String>, function: &Option<String>) -> String {
    let mut out = String::new();
    if let Some(class) = class {
        out.push_str(&format!("in class '{}': ", class));
    }
    if let Some(function) = function {
        out.push_str(&format!("in function '{}': ", function));
    }
    out
}

impl SemanticError {
    pub fn new(message: impl Into<String>) -> Self {
        SemanticError {
            class: None,
            function: None,
            message: message.into(),
        }
    }

    pub fn in_class(mut self, class: &str) -> Self {
        self.class = Some(class.to_string());
        self
    }

    pub fn in_function(mut self, function: &str) -> Self {
        self.function = Some(function.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_message() {
        let err = SemanticError::new("Return used outside of function");
        assert_eq!(err.to_string(), "Error Return used outside of function");
    }

    #[test]
    fn test_full_context() {
        let err = SemanticError::new("Parameter 'x' already defined.")
            .in_class("Point")
            .in_function("init");
        assert_eq!(
            err.to_string(),
            "Error in class 'Point': in function 'init': Parameter 'x' already defined."
        );
    }
}
