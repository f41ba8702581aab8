use thiserror::Error;

use crate::{Addr, OpCode};

//

/// Everything that can go wrong before the first instruction runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("line {line}: duplicate label `{label}`, first declared on line {first}")]
    DuplicateLabel {
        label: String,
        line: usize,
        first: usize,
    },

    #[error("line {line}: undefined label `{label}`")]
    UndefinedLabel { label: String, line: usize },

    #[error("line {line}: unknown register `{register}`, expected TIME or POWER")]
    UnknownRegister { register: String, line: usize },

    #[error("line {line}: unknown opcode `{mnemonic}`")]
    UnknownOpcode { mnemonic: String, line: usize },

    #[error("line {line}: malformed {opcode}: {reason}")]
    MalformedInstruction {
        opcode: OpCode,
        line: usize,
        reason: String,
    },

    #[error("instruction {index} jumps to {target}, past the end of a {len} instruction program")]
    TargetOutOfRange {
        index: Addr,
        target: Addr,
        len: usize,
    },
}

impl LoadError {
    /// Source line the error points at, if it came from source text.
    pub const fn line(&self) -> Option<usize> {
        match self {
            LoadError::Syntax { line, .. }
            | LoadError::DuplicateLabel { line, .. }
            | LoadError::UndefinedLabel { line, .. }
            | LoadError::UnknownRegister { line, .. }
            | LoadError::UnknownOpcode { line, .. }
            | LoadError::MalformedInstruction { line, .. } => Some(*line),
            LoadError::TargetOutOfRange { .. } => None,
        }
    }
}
