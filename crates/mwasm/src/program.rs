use std::{
    borrow::Cow,
    collections::{BTreeMap, HashMap},
    fmt,
};

use crate::LoadError;

//

/// Index into a [`Program`]. A target equal to the program length jumps past the end.
pub type Addr = usize;

//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    Time,
    Power,
}

impl Register {
    pub const ALL: [Register; 2] = [Register::Time, Register::Power];

    /// Case-insensitive lookup by source name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|reg| reg.as_str().eq_ignore_ascii_case(name))
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Register::Time => "TIME",
            Register::Power => "POWER",
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//

/// One machine instruction.
///
/// `T` is the jump target: a label name while assembling, an [`Addr`] once resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction<T = Addr> {
    Set(Register, i32),
    Inc(Register),
    /// Jumps if the register is already zero, otherwise decrements it and falls through.
    DecJz(Register, T),
    Goto(T),
    /// Emits the current value of TIME.
    Print,
    Halt,
}

impl<T> Instruction<T> {
    pub const fn opcode(&self) -> OpCode {
        macro_rules! gen {
            ($($var:ident),* $(,)?) => {
                match self {
                    $(Self::$var { .. } => OpCode::$var,)*
                }
            };
        }
        gen! {
            Set,
            Inc,
            DecJz,
            Goto,
            Print,
            Halt,
        }
    }

    pub const fn target(&self) -> Option<&T> {
        match self {
            Self::DecJz(_, target) | Self::Goto(target) => Some(target),
            _ => None,
        }
    }

    pub fn map_target<U>(self, f: impl FnOnce(T) -> U) -> Instruction<U> {
        match self.try_map_target(|t| Ok::<_, std::convert::Infallible>(f(t))) {
            Ok(instr) => instr,
            Err(never) => match never {},
        }
    }

    pub fn try_map_target<U, E>(
        self,
        f: impl FnOnce(T) -> Result<U, E>,
    ) -> Result<Instruction<U>, E> {
        Ok(match self {
            Self::Set(reg, val) => Instruction::Set(reg, val),
            Self::Inc(reg) => Instruction::Inc(reg),
            Self::DecJz(reg, target) => Instruction::DecJz(reg, f(target)?),
            Self::Goto(target) => Instruction::Goto(f(target)?),
            Self::Print => Instruction::Print,
            Self::Halt => Instruction::Halt,
        })
    }
}

impl<T: fmt::Display> fmt::Display for Instruction<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.opcode())?;
        match self {
            Self::Set(reg, val) => write!(f, " {reg} {val}"),
            Self::Inc(reg) => write!(f, " {reg}"),
            Self::DecJz(reg, target) => write!(f, " {reg} {target}"),
            Self::Goto(target) => write!(f, " {target}"),
            Self::Print | Self::Halt => Ok(()),
        }
    }
}

//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Set,
    Inc,
    DecJz,
    Goto,
    Print,
    Halt,
}

impl OpCode {
    pub const ALL: [OpCode; 6] = [
        OpCode::Set,
        OpCode::Inc,
        OpCode::DecJz,
        OpCode::Goto,
        OpCode::Print,
        OpCode::Halt,
    ];

    /// Case-insensitive lookup by mnemonic.
    pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(mnemonic))
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            OpCode::Set => "SET",
            OpCode::Inc => "INC",
            OpCode::DecJz => "DECJZ",
            OpCode::Goto => "GOTO",
            OpCode::Print => "PRINT",
            OpCode::Halt => "HALT",
        }
    }

    /// Human readable operand list, for diagnostics.
    pub const fn operand_shape(&self) -> &'static str {
        match self {
            OpCode::Set => "a register and an integer",
            OpCode::Inc => "a register",
            OpCode::DecJz => "a register and a label",
            OpCode::Goto => "a label",
            OpCode::Print | OpCode::Halt => "no operands",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//

/// A resolved, immutable instruction sequence.
///
/// Every jump target is at most `len()`, jumping to `len()` ends the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program(Vec<Instruction>);

impl Program {
    /// Builds a program from already resolved instructions, checking every target.
    pub fn new(instructions: Vec<Instruction>) -> Result<Self, LoadError> {
        let len = instructions.len();
        for (index, instr) in instructions.iter().enumerate() {
            if let Some(&target) = instr.target() {
                if target > len {
                    return Err(LoadError::TargetOutOfRange { index, target, len });
                }
            }
        }
        Ok(Self(instructions))
    }

    pub(crate) fn new_unchecked(instructions: Vec<Instruction>) -> Self {
        Self(instructions)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, addr: Addr) -> Option<&Instruction> {
        self.0.get(addr)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.0
    }

    pub fn listing<'a>(&'a self, labels: &'a LabelTable) -> Listing<'a> {
        Listing {
            program: self,
            labels,
        }
    }
}

//

/// Label name to instruction index, built once at load time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
    names: HashMap<String, Addr>,
    fold_case: bool,
}

impl LabelTable {
    pub(crate) fn new(fold_case: bool) -> Self {
        Self {
            names: HashMap::new(),
            fold_case,
        }
    }

    pub(crate) fn key<'a>(&self, name: &'a str) -> Cow<'a, str> {
        if self.fold_case {
            Cow::Owned(name.to_lowercase())
        } else {
            Cow::Borrowed(name)
        }
    }

    pub(crate) fn insert(&mut self, key: String, addr: Addr) {
        self.names.insert(key, addr);
    }

    pub fn get(&self, name: &str) -> Option<Addr> {
        self.names.get(self.key(name).as_ref()).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Addr)> {
        self.names.iter().map(|(name, addr)| (name.as_str(), *addr))
    }

    /// Names sorted alphabetically, grouped by the index they point at.
    fn by_addr(&self) -> BTreeMap<Addr, Vec<&str>> {
        let mut out: BTreeMap<Addr, Vec<&str>> = BTreeMap::new();
        for (name, addr) in self.iter() {
            out.entry(addr).or_default().push(name);
        }
        for names in out.values_mut() {
            names.sort_unstable();
        }
        out
    }
}

//

/// Source-like rendering of a resolved program.
///
/// Jump targets print as their first label in alphabetical order. A target with no
/// label gets a made-up `@<index>:` label so the text always loads back into the
/// same program.
pub struct Listing<'a> {
    program: &'a Program,
    labels: &'a LabelTable,
}

impl Listing<'_> {
    /// `@<index>`, with more `@`s in front while that clashes with a real label.
    fn made_up_label(&self, addr: Addr) -> String {
        let mut name = format!("@{addr}");
        while self.labels.get(&name).is_some() {
            name.insert(0, '@');
        }
        name
    }
}

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let by_addr = self.labels.by_addr();

        let mut made_up = BTreeMap::new();
        for instr in self.program.instructions() {
            if let Some(&target) = instr.target() {
                if !by_addr.contains_key(&target) {
                    made_up
                        .entry(target)
                        .or_insert_with(|| self.made_up_label(target));
                }
            }
        }

        for addr in 0..=self.program.len() {
            for name in by_addr.get(&addr).into_iter().flatten() {
                writeln!(f, "{name}:")?;
            }
            if let Some(name) = made_up.get(&addr) {
                writeln!(f, "{name}:")?;
            }

            if let Some(instr) = self.program.get(addr) {
                let instr = instr.map_target(|target| {
                    match by_addr.get(&target).and_then(|names| names.first()) {
                        Some(&name) => name,
                        None => made_up[&target].as_str(),
                    }
                });
                writeln!(f, "    {instr}")?;
            }
        }

        Ok(())
    }
}

//
