//! Runtime errors raised while executing a template

use thiserror::Error;

use crate::parser::ast::Location;

/// Execution failure, with the template position where it happened
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecError {
    #[error("{location}: can't evaluate {name}: {reason}")]
    Accessor {
        name: String,
        reason: String,
        location: Location,
    },

    #[error("{location}: error calling {name}: {message}")]
    Function {
        name: String,
        message: String,
        location: Location,
    },

    #[error("{location}: wrong number of args for {name}: want {expected} got {got}")]
    ArgCount {
        name: String,
        expected: String,
        got: usize,
        location: Location,
    },

    #[error("{location}: function \"{name}\" not defined")]
    UndefinedFunction { name: String, location: Location },

    #[error("{location}: can't give argument to non-function {operand}")]
    NotAFunction { operand: String, location: Location },

    #[error("{location}: range can't iterate over {value}")]
    NotIterable { value: String, location: Location },

    #[error("{location}: can't use {value} to iterate over more than one variable")]
    RangeVariables { value: String, location: Location },

    #[error("{location}: no such template \"{name}\"")]
    UndefinedTemplate { name: String, location: Location },

    #[error("{location}: exceeded maximum template depth ({limit})")]
    DepthExceeded { limit: usize, location: Location },

    #[error("template \"{name}\" is not defined")]
    NotDefined { name: String },
}

impl ExecError {
    pub fn location(&self) -> Option<&Location> {
        match self {
            Self::Accessor { location, .. }
            | Self::Function { location, .. }
            | Self::ArgCount { location, .. }
            | Self::UndefinedFunction { location, .. }
            | Self::NotAFunction { location, .. }
            | Self::NotIterable { location, .. }
            | Self::RangeVariables { location, .. }
            | Self::UndefinedTemplate { location, .. }
            | Self::DepthExceeded { location, .. } => Some(location),
            Self::NotDefined { .. } => None,
        }
    }
}
