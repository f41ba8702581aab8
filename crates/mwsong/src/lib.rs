//! Compiles a small note and rest language into `.mwasm` programs.
//!
//! POWER carries the pitch in Hz and every `PRINT` is one tick of tone, so a note
//! lasting `n` ticks prints `n` times. Rests set POWER to 0 and tick silently.
//!
//! ```text
//! tempo 120
//! tpb 8                       # ticks per beat, a quarter note is one beat
//! C4/4 D#4/8 Bb3/16 | R/8     # [A-G][#b]<octave>/<fraction of a whole note>
//! ```

use std::fmt::{self, Write};

use mwasm::{Instruction, Register};
use tracing::debug;

mod error;

pub use error::SongError;

//

pub const DEFAULT_TEMPO: u32 = 120;
pub const DEFAULT_TICKS_PER_BEAT: u32 = 8;
/// Largest `tpb` for which a whole note still fits in TIME.
pub const MAX_TICKS_PER_BEAT: u32 = i32::MAX as u32 / 4;

/// Parses a song and returns its `.mwasm` source.
pub fn compile(source: &str) -> Result<String, SongError> {
    Ok(Song::parse(source)?.to_mwasm())
}

//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Song {
    /// Beats per minute. Only recorded in the output, a tick has no fixed length.
    pub tempo: u32,
    pub ticks_per_beat: u32,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// `power` is the pitch in Hz. `denominator` is 4 for a quarter note, 8 for an eighth.
    Note { power: i32, denominator: u32 },
    Rest { denominator: u32 },
    /// Prints TIME.
    PrintTemp,
}

impl Default for Song {
    fn default() -> Self {
        Self {
            tempo: DEFAULT_TEMPO,
            ticks_per_beat: DEFAULT_TICKS_PER_BEAT,
            events: Vec::new(),
        }
    }
}

impl Song {
    /// `tempo` and `tpb` lines apply to the whole song wherever they appear, the last
    /// one wins. `#` starts a comment at the beginning of a token, so `C#4/4` is a note.
    pub fn parse(source: &str) -> Result<Self, SongError> {
        let mut song = Self::default();

        for (index, raw) in source.lines().enumerate() {
            let line = index + 1;
            let tokens: Vec<&str> = raw
                .split_whitespace()
                .take_while(|token| !token.starts_with('#'))
                .collect();

            match tokens.as_slice() {
                [] => {}
                [head, rest @ ..] if head.eq_ignore_ascii_case("tempo") => {
                    let bpm: u32 = single_number(rest).ok_or(SongError::Tempo { line })?;
                    song.tempo = bpm.max(1);
                }
                [head, rest @ ..] if head.eq_ignore_ascii_case("tpb") => {
                    song.ticks_per_beat = single_number(rest)
                        .filter(|tpb| (1..=MAX_TICKS_PER_BEAT).contains(tpb))
                        .ok_or(SongError::TicksPerBeat { line })?;
                }
                _ => {
                    for token in tokens.iter().filter(|&&token| token != "|") {
                        song.events.push(Event::parse(token, line)?);
                    }
                }
            }
        }

        Ok(song)
    }

    /// Ticks for a `1/denominator` note: a whole note is four beats, never less than one tick.
    pub fn ticks(&self, denominator: u32) -> i32 {
        let ticks = (4 * u64::from(self.ticks_per_beat) / u64::from(denominator.max(1))).max(1);
        i32::try_from(ticks).unwrap_or(i32::MAX)
    }

    pub fn to_mwasm(&self) -> String {
        let mut asm = Emitter::default();
        _ = writeln!(
            &mut asm.out,
            "; tempo {} bpm, {} ticks per beat",
            self.tempo, self.ticks_per_beat
        );

        for event in self.events.iter() {
            match *event {
                Event::Note { power, denominator } => {
                    asm.tone(power, self.ticks(denominator), ("note", "end_note"), true);
                }
                Event::Rest { denominator } => {
                    asm.tone(0, self.ticks(denominator), ("rest", "end_rest"), false);
                }
                Event::PrintTemp => asm.emit(Instruction::<&str>::Print),
            }
        }
        asm.emit(Instruction::<&str>::Halt);

        debug!(
            events = self.events.len(),
            labels = asm.labels,
            "compiled song"
        );

        asm.out
    }
}

fn single_number(rest: &[&str]) -> Option<u32> {
    match rest {
        [value] => digits(value),
        _ => None,
    }
}

fn digits(text: &str) -> Option<u32> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

impl Event {
    fn parse(token: &str, line: usize) -> Result<Self, SongError> {
        let unrecognized = || SongError::Token {
            token: token.to_owned(),
            line,
        };

        if token.eq_ignore_ascii_case("print_temp") {
            return Ok(Self::PrintTemp);
        }

        let (pitch, denominator) = token.split_once('/').ok_or_else(unrecognized)?;
        let power = if pitch.eq_ignore_ascii_case("r") {
            None
        } else {
            let midi = midi_number(pitch).ok_or_else(unrecognized)?;
            Some(power_from_midi(midi).ok_or_else(|| SongError::Pitch {
                token: token.to_owned(),
                line,
            })?)
        };

        let denominator = digits(denominator).ok_or_else(unrecognized)?;
        if denominator == 0 {
            return Err(SongError::ZeroDuration {
                token: token.to_owned(),
                line,
            });
        }

        Ok(match power {
            Some(power) => Self::Note { power, denominator },
            None => Self::Rest { denominator },
        })
    }
}

/// `C4` is 60, `A4` is 69. A `#` raises by a semitone, a `b` lowers.
fn midi_number(pitch: &str) -> Option<i64> {
    let mut chars = pitch.chars();
    let base = match chars.next()?.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let rest = chars.as_str();
    let (shift, octave) = match rest.as_bytes().first()? {
        b'#' => (1, &rest[1..]),
        b'b' | b'B' => (-1, &rest[1..]),
        _ => (0, rest),
    };

    let unsigned = octave.strip_prefix('-').unwrap_or(octave);
    if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let octave: i64 = octave.parse().ok()?;

    octave.checked_mul(12)?.checked_add(12 + base + shift)
}

/// Equal temperament with `A4` at 440 Hz, rounded to whole Hz.
fn power_from_midi(midi: i64) -> Option<i32> {
    let hz = (440.0 * 2f64.powf((midi - 69) as f64 / 12.0)).round();
    (hz <= f64::from(i32::MAX)).then_some(hz as i32)
}

//

#[derive(Default)]
struct Emitter {
    out: String,
    labels: usize,
}

impl Emitter {
    fn fresh_label(&mut self, hint: &str) -> String {
        self.labels += 1;
        format!("{hint}_{}", self.labels)
    }

    fn label(&mut self, name: &str) {
        _ = writeln!(&mut self.out, "{name}:");
    }

    fn emit<T: fmt::Display>(&mut self, instr: Instruction<T>) {
        _ = writeln!(&mut self.out, "    {instr}");
    }

    /// Counts TIME down from `ticks`, printing once per tick when `audible`.
    fn tone(&mut self, power: i32, ticks: i32, (hint, end_hint): (&str, &str), audible: bool) {
        let top = self.fresh_label(hint);
        let end = self.fresh_label(end_hint);

        self.emit(Instruction::<&str>::Set(Register::Power, power));
        self.emit(Instruction::<&str>::Set(Register::Time, ticks));
        self.label(&top);
        self.emit(Instruction::DecJz(Register::Time, end.as_str()));
        if audible {
            self.emit(Instruction::<&str>::Print);
        }
        self.emit(Instruction::Goto(top.as_str()));
        self.label(&end);
    }
}

//

#[cfg(test)]
mod tests {
    use mwvm::{Reason, VirtMachine};

    use super::*;

    const TWINKLE: &str = include_str!("../../../demos/twinkle.song");

    fn play(source: &str) -> mwvm::Termination {
        let asm = compile(source).unwrap();
        let (program, _) = mwasm::load(&asm).unwrap();
        VirtMachine::new().run(&program)
    }

    #[test]
    fn compile_short_song() {
        let asm = compile("tpb 2\nC4/4 R/8 | A4/8   # done").unwrap();
        insta::assert_snapshot!(asm, @r###"
        ; tempo 120 bpm, 2 ticks per beat
            SET POWER 262
            SET TIME 2
        note_1:
            DECJZ TIME end_note_2
            PRINT
            GOTO note_1
        end_note_2:
            SET POWER 0
            SET TIME 1
        rest_3:
            DECJZ TIME end_rest_4
            GOTO rest_3
        end_rest_4:
            SET POWER 440
            SET TIME 1
        note_5:
            DECJZ TIME end_note_6
            PRINT
            GOTO note_5
        end_note_6:
            HALT
        "###);
    }

    #[test]
    fn short_song_halts() {
        let result = play("tpb 2\nC4/4 R/8 | A4/8");
        assert_eq!(result.reason, Reason::Halted);
        // one PRINT per tick of tone, none while resting
        assert_eq!(result.outputs, vec![1, 0, 0]);
        assert_eq!(result.registers.to_string(), "TIME=0 POWER=440");
        assert_eq!(result.steps, 21);
    }

    #[test]
    fn twinkle_demo() {
        let song = Song::parse(TWINKLE).unwrap();
        assert_eq!((song.tempo, song.ticks_per_beat), (120, 8));
        let powers: Vec<i32> = song
            .events
            .iter()
            .filter_map(|event| match event {
                Event::Note { power, .. } => Some(*power),
                _ => None,
            })
            .collect();
        assert_eq!(
            powers,
            vec![262, 262, 392, 392, 440, 440, 392, 349, 349, 330, 330, 294, 294, 262]
        );

        let result = play(TWINKLE);
        assert_eq!(result.reason, Reason::Halted);
        // twelve quarter notes of 8 ticks and two half notes of 16
        assert_eq!(result.outputs.len(), 12 * 8 + 2 * 16);
    }

    #[test]
    fn pitches() {
        let song = Song::parse("C#4/4 Db4/4 bb3/4 B3/4 a-1/4 A0/4 c10/4").unwrap();
        let powers: Vec<i32> = song
            .events
            .iter()
            .map(|event| match event {
                Event::Note { power, .. } => *power,
                other => panic!("{other:?}"),
            })
            .collect();
        assert_eq!(powers, vec![277, 277, 233, 247, 14, 28, 16744]);
    }

    #[test]
    fn durations() {
        let song = Song::parse("tpb 3\nC4/1 C4/2 C4/4 C4/8 C4/64").unwrap();
        let ticks: Vec<i32> = song
            .events
            .iter()
            .map(|event| match event {
                Event::Note { denominator, .. } => song.ticks(*denominator),
                other => panic!("{other:?}"),
            })
            .collect();
        assert_eq!(ticks, vec![12, 6, 3, 1, 1]);
        assert_eq!(Song::default().ticks(4), 8);
    }

    #[test]
    fn settings_apply_to_the_whole_song() {
        let song = Song::parse("C4/4\nTEMPO 0\ntpb 4 # later wins\nR/4").unwrap();
        assert_eq!(song.tempo, 1);
        assert_eq!(song.ticks_per_beat, 4);
        assert_eq!(
            song.events,
            vec![
                Event::Note {
                    power: 262,
                    denominator: 4,
                },
                Event::Rest { denominator: 4 },
            ]
        );
    }

    #[test]
    fn print_temp() {
        let result = play("print_temp\nR/4\nPRINT_TEMP");
        assert_eq!(result.reason, Reason::Halted);
        assert_eq!(result.outputs, vec![0, 0]);
    }

    #[test]
    fn errors() {
        let cases = [
            ("tempo", SongError::Tempo { line: 1 }),
            ("\ntempo fast", SongError::Tempo { line: 2 }),
            ("tpb 0", SongError::TicksPerBeat { line: 1 }),
            ("tpb 536870912", SongError::TicksPerBeat { line: 1 }),
            (
                "C4/4 H4/4",
                SongError::Token {
                    token: "H4/4".to_owned(),
                    line: 1,
                },
            ),
            (
                "C/4",
                SongError::Token {
                    token: "C/4".to_owned(),
                    line: 1,
                },
            ),
            (
                "C4",
                SongError::Token {
                    token: "C4".to_owned(),
                    line: 1,
                },
            ),
            (
                "R/0",
                SongError::ZeroDuration {
                    token: "R/0".to_owned(),
                    line: 1,
                },
            ),
            (
                "A40/4",
                SongError::Pitch {
                    token: "A40/4".to_owned(),
                    line: 1,
                },
            ),
        ];
        for (source, expected) in cases {
            assert_eq!(Song::parse(source), Err(expected), "{source}");
        }

        insta::assert_snapshot!(
            compile("tpb 9999999999").unwrap_err(),
            @"line 1: expected `tpb <ticks>` with 1 to 536870911 ticks"
        );
    }
}
