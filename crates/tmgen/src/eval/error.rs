use crate::vendor::VendorError;

#[derive(thiserror::Error, Debug)]
pub enum EvalError {
    #[error("unknown global `global.{0}`")]
    UnknownGlobal(String),
    #[error("unknown metadata `{0}`")]
    UnknownMetadata(String),
    #[error("namespace `{0}` is not available in this context")]
    UnavailableNamespace(&'static str),
    #[error("undefined function `{0}`")]
    UndefinedFunction(String),
    #[error("call to `{name}` failed")]
    Function {
        name: String,
        #[source]
        source: FunctionError,
    },
    #[error("operator `{operator}` cannot be applied to {lhs} and {rhs}")]
    BinaryTypeMismatch {
        operator: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },
    #[error("operator `{operator}` cannot be applied to {operand}")]
    UnaryTypeMismatch {
        operator: &'static str,
        operand: &'static str,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("attribute `{0}` does not exist")]
    MissingAttribute(String),
    #[error("index {index} out of range for list of length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("cannot interpolate {0} into a template")]
    TemplateInterpolation(&'static str),
    #[error("duplicate key `{0}` in for expression")]
    DuplicateKey(String),
    #[error("`{0}` could not be fully evaluated")]
    Unresolved(String),
    #[error("unable to resolve vendor reference `{reference}`")]
    Vendor {
        reference: String,
        #[source]
        source: VendorError,
    },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FunctionError {
    #[error("expected {expected} arguments, got {got}")]
    Arity { expected: String, got: usize },
    #[error("argument {index}: expected {expected}, got {got}")]
    ArgumentType {
        index: usize,
        expected: &'static str,
        got: &'static str,
    },
    #[error("final argument must be a list to be expanded, got {0}")]
    ExpandNonList(&'static str),
    #[error("{0}")]
    Invalid(String),
}
