use serde::{Deserialize, Serialize};

/// A NITLang type.
///
/// Declarations in the AST only ever use the first group of variants
/// (`int`, `bool`, `string`, `vector`, `ref`, `null` and class names).
/// The checker's inference additionally produces `noreturn`, `function`
/// and `unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Int,
    Bool,
    String,
    Vector,
    /// Reference to a value of the pointee type. A bare `ref` annotation
    /// carries `Unknown` as its pointee.
    Ref(Box<Type>),
    Null,
    /// Instance of a user-defined class.
    Class(String),

    // ─────────────────────────── Inferred only ──────────────────────────
    NoReturn,
    Function,
    /// Could not be determined. Never reported as a mismatch.
    Unknown,
}

impl Type {
    /// `ref` with no known pointee.
    pub fn bare_ref() -> Self {
        Type::Ref(Box::new(Type::Unknown))
    }

    pub fn ref_to(pointee: Type) -> Self {
        Type::Ref(Box::new(pointee))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Type::Unknown)
    }

    /// Pointee of a reference type, `None` for anything else.
    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Ref(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn class_name(&self) -> Option<&str> {
        match self {
            Type::Class(name) => Some(name),
            _ => None,
        }
    }

    /// Whether a value of type `actual` may be used where `self` is expected.
    ///
    /// `Unknown` on either side is always compatible, and two references
    /// are compatible regardless of what they point to.
    pub fn accepts(&self, actual: &Type) -> bool {
        match (self, actual) {
            (Type::Unknown, _) | (_, Type::Unknown) => true,
            (Type::Ref(_), Type::Ref(_)) => true,
            (expected, actual) => expected == actual,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Bool => write!(f, "bool"),
            Type::String => write!(f, "string"),
            Type::Vector => write!(f, "vector"),
            Type::Ref(inner) if inner.is_unknown() => write!(f, "ref"),
            Type::Ref(inner) => write!(f, "ref<{}>", inner),
            Type::Null => write!(f, "null"),
            Type::Class(name) => write!(f, "{}", name),
            Type::NoReturn => write!(f, "noreturn"),
            Type::Function => write!(f, "function"),
            Type::Unknown => write!(f, "unknown"),
        }
    }
}
