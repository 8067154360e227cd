use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::ir::{matching_indexes, Instr};
use crate::Settings;

/// Concretely executes the input-free prefix of the program. Everything the
/// abstract machine can compute is replaced by the handful of instructions
/// that materialize its final state; evaluation stops at the first op whose
/// effect depends on input.
pub fn partial_eval(instrs: Vec<Instr>, settings: &Settings) -> Vec<Instr> {
    if !settings.partial_eval {
        return instrs;
    }

    Evaluator::default().run(instrs)
}

#[derive(Default)]
struct Evaluator {
    /// Known deviations from the all-zero initial tape; entries are never 0
    tape: BTreeMap<i64, u8>,
    /// Offsets the emitted prefix has left holding a non-zero byte
    printed_nonzero: BTreeSet<i64>,
    /// Abstract pointer, relative to the start position
    offset: i64,
    /// Pointer position the emitted prefix ends at
    materialized_offset: i64,
    new_instrs: Vec<Instr>,
}

impl Evaluator {
    fn run(mut self, instrs: Vec<Instr>) -> Vec<Instr> {
        let matching = matching_indexes(&instrs);
        let mut loops_without_read: HashSet<usize> = HashSet::new();

        let mut ip = 0;
        while ip < instrs.len() {
            match &instrs[ip] {
                Instr::MoveRight => self.offset += 1,
                Instr::MoveLeft => self.offset -= 1,
                Instr::AddPtr { delta } => self.offset += delta,
                Instr::Inc => self.bump(self.offset, 1),
                Instr::Dec => self.bump(self.offset, 0xff),
                Instr::Sum { amount, offset } => self.bump(self.offset + offset, *amount as u8),
                Instr::Zero => {
                    self.tape.remove(&self.offset);
                }
                Instr::MulAdd {
                    amount,
                    offset,
                    neg_induction,
                } => {
                    let induction = self.tape.get(&self.offset).copied().unwrap_or(0);
                    let repeat = if *neg_induction {
                        (!induction).wrapping_add(1)
                    } else {
                        induction
                    };
                    self.bump(self.offset + offset, repeat.wrapping_mul(*amount as u8));
                }
                Instr::MemScan { stride } => {
                    // the scan sits inside its own bracket pair, so the loop
                    // walks it stride by stride to the first zero cell
                    if self.tape.contains_key(&self.offset) {
                        self.offset += stride;
                    }
                }
                Instr::Write => {
                    self.seek(self.offset);
                    self.new_instrs.push(Instr::Zero);
                    let val = self.tape.get(&self.offset).copied().unwrap_or(0);
                    if val != 0 {
                        self.new_instrs.push(Instr::Sum {
                            amount: val as i8,
                            offset: 0,
                        });
                        self.printed_nonzero.insert(self.offset);
                    } else {
                        self.tape.remove(&self.offset);
                        self.printed_nonzero.remove(&self.offset);
                    }
                    self.new_instrs.push(Instr::Write);
                }
                Instr::Read => {
                    self.materialize_all();
                    return self.splice(instrs, ip);
                }
                Instr::JumpIfZero { .. } => {
                    if !loops_without_read.contains(&ip) {
                        if contains_read(&instrs[ip..=matching[&ip]]) {
                            self.materialize_all();
                            return self.splice(instrs, ip);
                        }
                        loops_without_read.insert(ip);
                    }
                    if !self.tape.contains_key(&self.offset) {
                        // statically dead: land on the mate, which falls through
                        ip = matching[&ip];
                        continue;
                    }
                }
                Instr::JumpUnlessZero { .. } => {
                    if self.tape.contains_key(&self.offset) {
                        // re-enter through the loop head's own test
                        ip = matching[&ip];
                        continue;
                    }
                }
                // past the end the tape is dead, nothing left to materialize
                Instr::End => return self.splice(instrs, ip),
            }
            ip += 1;
        }

        let len = instrs.len();
        self.splice(instrs, len)
    }

    fn bump(&mut self, offset: i64, by: u8) {
        let val = self.tape.get(&offset).copied().unwrap_or(0).wrapping_add(by);
        if val == 0 {
            self.tape.remove(&offset);
        } else {
            self.tape.insert(offset, val);
        }
    }

    /// Emits the pointer motion to `to`, folding zero-length seeks.
    fn seek(&mut self, to: i64) {
        if to != self.materialized_offset {
            self.new_instrs.push(Instr::AddPtr {
                delta: to - self.materialized_offset,
            });
            self.materialized_offset = to;
        }
    }

    /// Makes the real tape equal to the abstract one: write every known
    /// deviation, re-zero whatever earlier flushes left behind, then park
    /// the pointer at the live position.
    fn materialize_all(&mut self) {
        let entries: Vec<(i64, u8)> = self.tape.iter().map(|(&k, &v)| (k, v)).collect();
        for (mem_offset, val) in entries {
            self.seek(mem_offset);
            self.new_instrs.push(Instr::Zero);
            self.new_instrs.push(Instr::Sum {
                amount: val as i8,
                offset: 0,
            });
        }

        let must_zero: Vec<i64> = self
            .printed_nonzero
            .iter()
            .copied()
            .filter(|offset| !self.tape.contains_key(offset))
            .collect();
        for mem_offset in must_zero {
            self.seek(mem_offset);
            self.new_instrs.push(Instr::Zero);
        }
        self.printed_nonzero.clear();

        self.seek(self.offset);
    }

    /// The emitted prefix replaces everything evaluated so far; the suffix
    /// from `ip` on runs as the residual program.
    fn splice(mut self, instrs: Vec<Instr>, ip: usize) -> Vec<Instr> {
        self.new_instrs.extend(instrs.into_iter().skip(ip));
        self.new_instrs
    }
}

fn contains_read(instrs: &[Instr]) -> bool {
    instrs.iter().any(|instr| matches!(instr, Instr::Read))
}
