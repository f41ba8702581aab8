use std::collections::{hash_map::Entry, HashMap};

use tracing::debug;

use crate::{
    Instruction, Label, LabelTable, Line, LineKind, LoadError, OpCode, Operand, Program, RawInstr,
    Register,
};

//

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Match labels case-insensitively. Mnemonics and registers always are.
    pub fold_label_case: bool,
}

/// Turns raw line records into a program with every jump target patched to an index.
///
/// Labels are collected first so forward references work, then each instruction is
/// decoded and its target looked up. The first problem in source order is returned.
pub fn resolve(
    lines: &[Line<'_>],
    options: &ResolveOptions,
) -> Result<(Program, LabelTable), LoadError> {
    let labels = collect_labels(lines, options)?;

    let mut instructions = Vec::new();
    for line in lines {
        let LineKind::Instr(raw) = &line.kind else {
            continue;
        };

        let instr = decode(raw, line.line)?.try_map_target(|name| {
            labels.get(name).ok_or_else(|| LoadError::UndefinedLabel {
                label: name.to_owned(),
                line: line.line,
            })
        })?;
        instructions.push(instr);
    }

    debug!(
        instructions = instructions.len(),
        labels = labels.len(),
        "resolved program"
    );

    Ok((Program::new_unchecked(instructions), labels))
}

fn collect_labels(lines: &[Line<'_>], options: &ResolveOptions) -> Result<LabelTable, LoadError> {
    let mut labels = LabelTable::new(options.fold_label_case);
    let mut declared_on = HashMap::new();
    let mut next = 0;

    for line in lines {
        match &line.kind {
            LineKind::Label(Label(name)) => {
                if name.is_empty() {
                    return Err(LoadError::Syntax {
                        line: line.line,
                        message: "empty label definition".to_owned(),
                    });
                }

                match declared_on.entry(labels.key(name).into_owned()) {
                    Entry::Occupied(first) => {
                        return Err(LoadError::DuplicateLabel {
                            label: (*name).to_owned(),
                            line: line.line,
                            first: *first.get(),
                        });
                    }
                    Entry::Vacant(e) => {
                        labels.insert(e.key().clone(), next);
                        e.insert(line.line);
                    }
                }
            }
            LineKind::Instr(_) => next += 1,
        }
    }

    Ok(labels)
}

fn decode<'input>(
    raw: &RawInstr<'input>,
    line: usize,
) -> Result<Instruction<&'input str>, LoadError> {
    let opcode = OpCode::from_mnemonic(raw.mnemonic).ok_or_else(|| LoadError::UnknownOpcode {
        mnemonic: raw.mnemonic.to_owned(),
        line,
    })?;
    let operands = Operands { opcode, line };

    Ok(match (opcode, raw.operands.as_slice()) {
        (OpCode::Set, [reg, val]) => {
            Instruction::Set(operands.register(reg)?, operands.int(val)?)
        }
        (OpCode::Inc, [reg]) => Instruction::Inc(operands.register(reg)?),
        // any token names a label, `GOTO 1` jumps to `1:`
        (OpCode::DecJz, [reg, target]) => {
            Instruction::DecJz(operands.register(reg)?, target.as_str())
        }
        (OpCode::Goto, [target]) => Instruction::Goto(target.as_str()),
        (OpCode::Print, []) => Instruction::Print,
        (OpCode::Halt, []) => Instruction::Halt,
        (_, found) => {
            return Err(operands.malformed(format!(
                "expected {}, found {} operand(s)",
                opcode.operand_shape(),
                found.len()
            )))
        }
    })
}

struct Operands {
    opcode: OpCode,
    line: usize,
}

impl Operands {
    fn malformed(&self, reason: String) -> LoadError {
        LoadError::MalformedInstruction {
            opcode: self.opcode,
            line: self.line,
            reason,
        }
    }

    fn register(&self, operand: &Operand<'_>) -> Result<Register, LoadError> {
        match operand {
            Operand::Word(name) => Register::from_name(name).ok_or_else(|| {
                LoadError::UnknownRegister {
                    register: (*name).to_owned(),
                    line: self.line,
                }
            }),
            Operand::Int(lit) => {
                Err(self.malformed(format!("expected a register, found `{lit}`")))
            }
        }
    }

    fn int(&self, operand: &Operand<'_>) -> Result<i32, LoadError> {
        match operand {
            Operand::Int(lit) => lit
                .parse()
                .map_err(|_| self.malformed(format!("`{lit}` does not fit in a 32-bit register"))),
            Operand::Word(word) => {
                Err(self.malformed(format!("expected an integer, found `{word}`")))
            }
        }
    }
}

//
