use std::{fmt, mem};

use mwasm::{Addr, Instruction, Program, Register};
use thiserror::Error;
use tracing::{debug, trace};

//

/// Why a run stopped. None of these are errors by themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    Halted,
    StepLimitExceeded,
    /// The program counter reached the end of the program without a `HALT`.
    FellOffEnd,
}

//

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Registers {
    pub time: i32,
    pub power: i32,
}

impl Registers {
    pub const fn new(time: i32, power: i32) -> Self {
        Self { time, power }
    }

    pub const fn get(&self, reg: Register) -> i32 {
        match reg {
            Register::Time => self.time,
            Register::Power => self.power,
        }
    }

    pub fn get_mut(&mut self, reg: Register) -> &mut i32 {
        match reg {
            Register::Time => &mut self.time,
            Register::Power => &mut self.power,
        }
    }
}

impl fmt::Display for Registers {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TIME={} POWER={}", self.time, self.power)
    }
}

//

/// Outcome of [`VirtMachine::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Termination {
    pub reason: Reason,
    pub registers: Registers,
    /// Values of TIME, one per executed `PRINT`, in order.
    pub outputs: Vec<i32>,
    pub steps: usize,
}

impl Termination {
    /// Treats anything but an explicit `HALT` as a failure.
    pub fn halted(self) -> Result<Self, RunError> {
        match self.reason {
            Reason::Halted => Ok(self),
            Reason::StepLimitExceeded => Err(RunError::StepLimitExceeded(Box::new(self))),
            Reason::FellOffEnd => Err(RunError::FellOffEnd(Box::new(self))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error("step limit reached, possible infinite loop")]
    StepLimitExceeded(Box<Termination>),
    #[error("program ended without HALT")]
    FellOffEnd(Box<Termination>),
}

impl RunError {
    /// The run as it was when it stopped, outputs included.
    pub fn termination(&self) -> &Termination {
        match self {
            RunError::StepLimitExceeded(t) | RunError::FellOffEnd(t) => t,
        }
    }
}

//

pub struct VirtMachine {
    fuel: Option<usize>,
    init: Registers,

    pc: Addr,
    regs: Registers,
    steps: usize,
    output: Vec<i32>,
    done: Option<Reason>,
}

impl VirtMachine {
    pub const fn new() -> Self {
        Self {
            fuel: None,
            init: Registers::new(0, 0),
            pc: 0,
            regs: Registers::new(0, 0),
            steps: 0,
            output: Vec::new(),
            done: None,
        }
    }

    /// Maximum number of instructions a run may execute, `None` for no limit.
    pub fn set_fuel(&mut self, fuel: Option<usize>) {
        self.fuel = fuel;
    }

    /// Register values every run starts from.
    pub fn set_registers(&mut self, regs: Registers) {
        self.init = regs;
    }

    pub fn run(&mut self, program: &Program) -> Termination {
        self.reset();

        let reason = loop {
            if let Some(reason) = self.step(program) {
                break reason;
            }
        };

        debug!(?reason, steps = self.steps, regs = %self.regs, "run finished");

        Termination {
            reason,
            registers: self.regs,
            outputs: mem::take(&mut self.output),
            steps: self.steps,
        }
    }

    pub fn reset(&mut self) {
        self.pc = 0;
        self.regs = self.init;
        self.steps = 0;
        self.output.clear();
        self.done = None;
    }

    /// Executes at most one instruction.
    ///
    /// Returns the termination reason once the run is over; after that every call
    /// returns the same reason without touching the state.
    pub fn step(&mut self, program: &Program) -> Option<Reason> {
        if self.done.is_none() {
            self.done = self.exec(program);
        }
        self.done
    }

    fn exec(&mut self, program: &Program) -> Option<Reason> {
        let Some(&instr) = program.get(self.pc) else {
            return Some(Reason::FellOffEnd);
        };

        if self.fuel.is_some_and(|fuel| self.steps >= fuel) {
            return Some(Reason::StepLimitExceeded);
        }
        self.steps += 1;

        trace!(pc = self.pc, %instr, "exec");

        self.pc = match instr {
            Instruction::Set(reg, val) => {
                *self.regs.get_mut(reg) = val;
                self.pc + 1
            }
            Instruction::Inc(reg) => {
                let val = self.regs.get_mut(reg);
                *val = val.wrapping_add(1);
                self.pc + 1
            }
            Instruction::DecJz(reg, target) => {
                let val = self.regs.get_mut(reg);
                if *val == 0 {
                    target
                } else {
                    *val = val.wrapping_sub(1);
                    self.pc + 1
                }
            }
            Instruction::Goto(target) => target,
            Instruction::Print => {
                self.output.push(self.regs.time);
                self.pc + 1
            }
            Instruction::Halt => return Some(Reason::Halted),
        };

        None
    }

    pub const fn pc(&self) -> Addr {
        self.pc
    }

    pub const fn registers(&self) -> Registers {
        self.regs
    }

    pub const fn steps(&self) -> usize {
        self.steps
    }

    /// Output of the run in progress.
    pub fn outputs(&self) -> &[i32] {
        &self.output
    }
}

impl Default for VirtMachine {
    fn default() -> Self {
        Self::new()
    }
}

//

#[cfg(test)]
mod tests {
    use mwasm::load;

    use super::*;

    fn run(src: &str, fuel: Option<usize>, regs: Registers) -> Termination {
        let (program, _) = load(src).unwrap();
        let mut vm = VirtMachine::new();
        vm.set_fuel(fuel);
        vm.set_registers(regs);
        vm.run(&program)
    }

    #[test]
    fn counter() {
        let asm = r#"
                  SET TIME 0
            loop: PRINT       ; print 0, 1, 2, 3, ..
                  INC TIME
                  GOTO loop   ; infinite loop
            "#;
        let result = run(asm, Some(50), Registers::default());
        assert_eq!(result.reason, Reason::StepLimitExceeded);
        assert_eq!(result.steps, 50);
        assert_eq!(result.registers.time, 16);

        let printed: Vec<String> = result.outputs.iter().map(ToString::to_string).collect();
        insta::assert_snapshot!(printed.join(" "), @"0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16");
    }

    #[test]
    fn countdown_tests_before_decrementing() {
        let asm = "
                SET TIME 3
            top:
                PRINT
                DECJZ TIME bottom
                GOTO top
            bottom:
                HALT
        ";
        let result = run(asm, None, Registers::default());
        assert_eq!(result.reason, Reason::Halted);
        // the zero is printed too, DECJZ only jumps once TIME already is 0
        assert_eq!(result.outputs, [3, 2, 1, 0]);
        assert_eq!(result.registers, Registers::new(0, 0));
    }

    #[test]
    fn countdown_demo() {
        let result = run(
            include_str!("../../../demos/countdown.mwasm"),
            Some(1_000),
            Registers::default(),
        );
        assert_eq!(result.reason, Reason::Halted);
        assert_eq!(result.outputs, [3, 2, 1]);
    }

    #[test]
    fn add_demo() {
        let result = run(
            include_str!("../../../demos/add.mwasm"),
            None,
            Registers::new(3, 2),
        );
        assert_eq!(result.reason, Reason::Halted);
        assert_eq!(result.registers, Registers::new(5, 0));
        assert!(result.outputs.is_empty());
    }

    #[test]
    fn decjz_on_zero_jumps_without_decrementing() {
        let asm = "DECJZ POWER end\nHALT\nend:";

        let zero = run(asm, None, Registers::new(0, 0));
        assert_eq!(zero.reason, Reason::FellOffEnd);
        assert_eq!(zero.registers.power, 0);
        assert_eq!(zero.steps, 1);

        let three = run(asm, None, Registers::new(0, 3));
        assert_eq!(three.reason, Reason::Halted);
        assert_eq!(three.registers.power, 2);
        assert_eq!(three.steps, 2);
    }

    #[test]
    fn registers_wrap_around() {
        let result = run(
            "SET TIME 2147483647\nINC TIME\nPRINT\nSET POWER -2147483648\nDECJZ POWER x\nHALT\nx:",
            None,
            Registers::default(),
        );
        assert_eq!(result.reason, Reason::Halted);
        assert_eq!(result.outputs, [i32::MIN]);
        assert_eq!(result.registers, Registers::new(i32::MIN, i32::MAX));
    }

    #[test]
    fn step_limit_is_exact() {
        for limit in [0, 1, 7, 100] {
            let result = run("spin: GOTO spin", Some(limit), Registers::default());
            assert_eq!(result.reason, Reason::StepLimitExceeded);
            assert_eq!(result.steps, limit);
            assert!(result.outputs.is_empty());
        }

        // HALT as the last permitted step still counts as halting
        let result = run("PRINT\nHALT", Some(2), Registers::default());
        assert_eq!(result.reason, Reason::Halted);

        let result = run("PRINT\nHALT", Some(1), Registers::default());
        assert_eq!(result.reason, Reason::StepLimitExceeded);
        assert_eq!(result.outputs, [0]);
    }

    #[test]
    fn fell_off_end() {
        let result = run("SET TIME 7\nPRINT", Some(10), Registers::default());
        assert_eq!(result.reason, Reason::FellOffEnd);
        assert_eq!(result.outputs, [7]);
        assert_eq!(result.steps, 2);

        let result = run("", Some(0), Registers::default());
        assert_eq!(result.reason, Reason::FellOffEnd);
        assert_eq!(result.steps, 0);
    }

    #[test]
    fn runs_are_independent() {
        let (program, _) = load("INC TIME\nINC POWER\nPRINT\nHALT").unwrap();
        let mut vm = VirtMachine::new();
        vm.set_registers(Registers::new(10, 20));

        let first = vm.run(&program);
        let second = vm.run(&program);
        assert_eq!(first, second);
        assert_eq!(first.registers, Registers::new(11, 21));
        assert_eq!(first.outputs, [11]);

        let other = VirtMachine::new().run(&program);
        assert_eq!(other.outputs, [1]);
    }

    #[test]
    fn halted_keeps_partial_outputs() {
        let ok = run("PRINT\nHALT", None, Registers::new(4, 0)).halted();
        assert_eq!(ok.map(|t| t.outputs), Ok(vec![4]));

        let err = run("l: PRINT\nINC TIME\nGOTO l", Some(6), Registers::default())
            .halted()
            .unwrap_err();
        assert!(matches!(err, RunError::StepLimitExceeded(_)));
        assert_eq!(err.termination().outputs, [0, 1]);
        assert_eq!(err.to_string(), "step limit reached, possible infinite loop");

        let err = run("PRINT", None, Registers::default()).halted().unwrap_err();
        assert!(matches!(err, RunError::FellOffEnd(_)));
    }

    #[test]
    fn single_stepping() {
        let (program, _) = load("SET TIME 2\nPRINT\nHALT").unwrap();
        let mut vm = VirtMachine::new();
        vm.reset();

        assert_eq!(vm.step(&program), None);
        assert_eq!(vm.registers().time, 2);
        assert_eq!(vm.pc(), 1);
        assert_eq!(vm.step(&program), None);
        assert_eq!(vm.outputs(), [2]);
        assert_eq!(vm.step(&program), Some(Reason::Halted));
        assert_eq!(vm.steps(), 3);

        assert_eq!(vm.step(&program), Some(Reason::Halted));
        assert_eq!(vm.steps(), 3);
        assert_eq!(vm.pc(), 2);
    }

    #[test]
    fn hand_built_program() {
        let program = Program::new(vec![
            Instruction::Set(Register::Power, 2),
            Instruction::DecJz(Register::Power, 3),
            Instruction::Goto(1),
        ])
        .unwrap();
        let result = VirtMachine::new().run(&program);
        assert_eq!(result.reason, Reason::FellOffEnd);
        assert_eq!(result.steps, 6);
    }
}
