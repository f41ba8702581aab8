use std::fmt;

use lalrpop_util::{lalrpop_mod, ParseError};

mod error;
mod program;
mod resolve;

pub use error::LoadError;
pub use program::{Addr, Instruction, LabelTable, Listing, OpCode, Program, Register};
pub use resolve::{resolve, ResolveOptions};

//

lalrpop_mod!(pub grammar);

//

/// Parses and resolves `.mwasm` source with the default options.
pub fn load(input: &str) -> Result<(Program, LabelTable), LoadError> {
    Assembly::parse(input)?.resolve()
}

//

/// Raw line records in source order, before any label is resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assembly<'input>(pub Vec<Line<'input>>);

impl<'input> Assembly<'input> {
    pub fn parse(input: &'input str) -> Result<Self, LoadError> {
        let index = LineIndex::new(input);

        let records = grammar::LinesParser::new()
            .parse(input)
            .map_err(|err| syntax_error(&index, err))?;

        Ok(Self(
            records
                .into_iter()
                .map(|(offset, kind)| Line {
                    line: index.line(offset),
                    kind,
                })
                .collect(),
        ))
    }

    pub fn resolve(&self) -> Result<(Program, LabelTable), LoadError> {
        self.resolve_with(&ResolveOptions::default())
    }

    pub fn resolve_with(
        &self,
        options: &ResolveOptions,
    ) -> Result<(Program, LabelTable), LoadError> {
        resolve(&self.0, options)
    }
}

impl fmt::Display for Assembly<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for line in self.0.iter() {
            match &line.kind {
                LineKind::Label(label) => writeln!(f, "{}:", label.0)?,
                LineKind::Instr(instr) => writeln!(f, "    {instr}")?,
            }
        }

        Ok(())
    }
}

//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line<'input> {
    /// 1-based source line
    pub line: usize,
    pub kind: LineKind<'input>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind<'input> {
    Label(Label<'input>),
    Instr(RawInstr<'input>),
}

/// An instruction line whose mnemonic and operands are still plain tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInstr<'input> {
    pub mnemonic: &'input str,
    pub operands: Vec<Operand<'input>>,
}

impl fmt::Display for RawInstr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.mnemonic)?;
        for operand in self.operands.iter() {
            write!(f, " {operand}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand<'input> {
    /// register or label name
    Word(&'input str),
    /// integer literal, range-checked during resolution
    Int(&'input str),
}

impl<'input> Operand<'input> {
    pub const fn as_str(&self) -> &'input str {
        match self {
            Operand::Word(s) | Operand::Int(s) => s,
        }
    }
}

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label<'input>(pub &'input str);

//

struct LineIndex(Vec<usize>);

impl LineIndex {
    fn new(input: &str) -> Self {
        Self(
            input
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i)
                .collect(),
        )
    }

    fn line(&self, offset: usize) -> usize {
        self.0.partition_point(|&nl| nl < offset) + 1
    }
}

fn syntax_error<T: fmt::Display>(
    index: &LineIndex,
    err: ParseError<usize, T, &'static str>,
) -> LoadError {
    let (offset, message) = match err {
        ParseError::InvalidToken { location } => (location, "unrecognized character".to_owned()),
        ParseError::UnrecognizedEof { location, .. } => {
            (location, "unexpected end of input".to_owned())
        }
        ParseError::UnrecognizedToken {
            token: (offset, token, _),
            ..
        }
        | ParseError::ExtraToken {
            token: (offset, token, _),
        } => {
            let token = token.to_string();
            if token == "\n" {
                (offset, "unexpected end of line".to_owned())
            } else {
                (offset, format!("unexpected `{token}`"))
            }
        }
        ParseError::User { error } => (0, error.to_owned()),
    };

    LoadError::Syntax {
        line: index.line(offset),
        message,
    }
}

//
