use std::collections::HashMap;

use crate::lexer::SourceOp;

use super::{Instr, Label};

/// Maps each source op to its IR variant. Bracket pairs receive their label
/// pair here; the lexer has already guaranteed they balance.
pub fn lower(ops: &[SourceOp]) -> Vec<Instr> {
    let labels = assign_labels(ops);

    ops.iter()
        .enumerate()
        .map(|(i, op)| match op {
            SourceOp::MoveRight => Instr::MoveRight,
            SourceOp::MoveLeft => Instr::MoveLeft,
            SourceOp::Inc => Instr::Inc,
            SourceOp::Dec => Instr::Dec,
            SourceOp::Write => Instr::Write,
            SourceOp::Read => Instr::Read,
            SourceOp::JumpIfZero => {
                let (own, target) = labels[&i];
                Instr::JumpIfZero { own, target }
            }
            SourceOp::JumpUnlessZero => {
                let (own, target) = labels[&i];
                Instr::JumpUnlessZero { own, target }
            }
            SourceOp::Eof => Instr::End,
        })
        .collect()
}

/// Pairs brackets with a left-to-right scan over a stack of unmatched `[`s.
/// A pair is numbered when its `]` arrives, so inner loops get the lower
/// numbers: the `[` owns the even label and targets the odd one, its `]` the
/// other way around.
fn assign_labels(ops: &[SourceOp]) -> HashMap<usize, (Label, Label)> {
    let mut left_bracket_locs = vec![];
    let mut labels = HashMap::new();
    let mut counter = 0u32;

    for (i, op) in ops.iter().enumerate() {
        match op {
            SourceOp::JumpIfZero => left_bracket_locs.push(i),
            SourceOp::JumpUnlessZero => {
                let lhs = left_bracket_locs.pop().expect("brackets balance");
                labels.insert(lhs, (Label(counter), Label(counter + 1)));
                labels.insert(i, (Label(counter + 1), Label(counter)));
                counter += 2;
            }
            _ => {}
        }
    }

    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn lowered(src: &str) -> Vec<Instr> {
        lower(&Lexer::new(src).collect_ops().unwrap())
    }

    #[test]
    fn lowering_round_trips() {
        let src = "->+<[.,[-]]";
        let printed: String = lowered(src)
            .iter()
            .filter_map(|instr| instr.source_symbol())
            .collect();
        assert_eq!(printed, src);
    }

    #[test]
    fn appends_the_terminator() {
        assert_eq!(lowered("+").last(), Some(&Instr::End));
    }

    #[test]
    fn inner_loops_are_numbered_first() {
        let instrs = lowered("[[]]");
        assert_eq!(
            instrs[1],
            Instr::JumpIfZero {
                own: Label(0),
                target: Label(1)
            }
        );
        assert_eq!(
            instrs[2],
            Instr::JumpUnlessZero {
                own: Label(1),
                target: Label(0)
            }
        );
        assert_eq!(
            instrs[0],
            Instr::JumpIfZero {
                own: Label(2),
                target: Label(3)
            }
        );
        assert_eq!(
            instrs[3],
            Instr::JumpUnlessZero {
                own: Label(3),
                target: Label(2)
            }
        );
    }
}
