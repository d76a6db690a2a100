use thiserror::Error;

#[derive(Error, Debug)]
pub enum PnpError {
    #[error("Parameter {parameter} has dimension {got}, expected {expected} (one per item)")]
    DimensionMismatch {
        parameter: String,
        expected: usize,
        got: usize,
    },

    #[error("Sum-product search requires an acyclic continuation graph (revisited vertex {vertex})")]
    CyclicProgram { vertex: usize },

    #[error("Example {example} has {count} label-consistent executions but multiple labels are not allowed")]
    MultipleLabels { example: usize, count: usize },

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Unbound variable: {0}")]
    UnboundVariable(String),

    #[error("Variable {name} does not hold a value of type {expected}")]
    VariableType { name: String, expected: &'static str },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Sampling expected exactly one finished execution, got {finished}")]
    SampleFailed { finished: usize },

    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, PnpError>;
