use thiserror::Error;

use crate::MAX_TICKS_PER_BEAT;

//

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SongError {
    #[error("line {line}: expected `tempo <bpm>`")]
    Tempo { line: usize },

    #[error(
        "line {line}: expected `tpb <ticks>` with 1 to {max} ticks",
        max = MAX_TICKS_PER_BEAT
    )]
    TicksPerBeat { line: usize },

    #[error("line {line}: unrecognized token `{token}`")]
    Token { token: String, line: usize },

    #[error("line {line}: `{token}` has a zero duration")]
    ZeroDuration { token: String, line: usize },

    #[error("line {line}: `{token}` is too high a pitch for POWER")]
    Pitch { token: String, line: usize },
}

impl SongError {
    pub const fn line(&self) -> usize {
        match self {
            Self::Tempo { line }
            | Self::TicksPerBeat { line }
            | Self::Token { line, .. }
            | Self::ZeroDuration { line, .. }
            | Self::Pitch { line, .. } => *line,
        }
    }
}
