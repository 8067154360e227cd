use std::collections::BTreeMap;

use crate::ir::{valid_stride, Instr};
use crate::Settings;

/// Rewrites recognizable innermost loops. A `[body]` whose body is nothing
/// but moves and increments can become either a `MemScan` (pure pointer walk
/// with a maskable stride) or a `MulAdd` sequence (balanced walk whose
/// induction cell steps by exactly one).
pub fn simplify_loops(mut instrs: Vec<Instr>, settings: &Settings) -> Vec<Instr> {
    if !settings.simplify_loops && !settings.vectorize_mem_scans {
        return instrs;
    }

    // any bracket in between resets the candidate, so only innermost pairs
    // are ever classified and bodies never contain nested jumps
    let mut candidate = None;
    let mut i = 0;
    while i < instrs.len() {
        match instrs[i] {
            Instr::JumpIfZero { .. } => candidate = Some(i),
            Instr::JumpUnlessZero { .. } => {
                if let Some(lhs) = candidate.take() {
                    if let Some(replacement) = classify_loop(&instrs, lhs, i, settings) {
                        let len = replacement.len();
                        instrs.splice(lhs..=i, replacement);
                        i = lhs + len;
                        continue;
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }

    instrs
}

/// Returns the instructions replacing `instrs[lhs..=rhs]` when the body
/// matches a known shape, brackets included.
fn classify_loop(
    instrs: &[Instr],
    lhs: usize,
    rhs: usize,
    settings: &Settings,
) -> Option<Vec<Instr>> {
    let mut curr_mem_offset = 0i64;
    let mut increment_at_offset: BTreeMap<i64, i64> = BTreeMap::new();

    for instr in &instrs[lhs + 1..rhs] {
        match instr {
            Instr::MoveRight => curr_mem_offset += 1,
            Instr::MoveLeft => curr_mem_offset -= 1,
            Instr::Inc => *increment_at_offset.entry(curr_mem_offset).or_insert(0) += 1,
            Instr::Dec => *increment_at_offset.entry(curr_mem_offset).or_insert(0) -= 1,
            _ => return None,
        }
    }

    // pointer walks that touch no cell become a single scan
    if settings.vectorize_mem_scans
        && valid_stride(curr_mem_offset)
        && increment_at_offset.is_empty()
    {
        return Some(vec![
            instrs[lhs].clone(),
            Instr::MemScan {
                stride: curr_mem_offset,
            },
            instrs[rhs].clone(),
        ]);
    }

    if !settings.simplify_loops {
        return None;
    }

    let induction_inc = *increment_at_offset.get(&0)?;
    if induction_inc != 1 && induction_inc != -1 {
        return None;
    }
    if curr_mem_offset != 0 {
        return None;
    }

    // counting up means the trip count is the negation of the start value
    let neg_induction = induction_inc > 0;
    let mut new_instrs: Vec<Instr> = increment_at_offset
        .iter()
        .filter(|&(&offset, &amount)| offset != 0 && amount as i8 != 0)
        .map(|(&offset, &amount)| Instr::MulAdd {
            amount: amount as i8,
            offset,
            neg_induction,
        })
        .collect();
    new_instrs.push(Instr::Zero);

    Some(new_instrs)
}
