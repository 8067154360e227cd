use std::collections::HashMap;

use super::Instr;

/// Two-way index from each jump to its mate, keyed by position. Positions go
/// stale whenever a pass rewrites the sequence, so this is rebuilt rather
/// than carried; labels are what persist.
pub fn matching_indexes(instrs: &[Instr]) -> HashMap<usize, usize> {
    let mut left_bracket_locs = vec![];
    let mut matching = HashMap::new();

    for (i, instr) in instrs.iter().enumerate() {
        match instr {
            Instr::JumpIfZero { .. } => left_bracket_locs.push(i),
            Instr::JumpUnlessZero { .. } => {
                let lhs = left_bracket_locs
                    .pop()
                    .expect("passes keep bracket pairs balanced");
                matching.insert(lhs, i);
                matching.insert(i, lhs);
            }
            _ => {}
        }
    }

    matching
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::lower;
    use crate::lexer::Lexer;

    #[test]
    fn index_is_an_involution() {
        let instrs = lower(&Lexer::new("[[+]-[.]]").collect_ops().unwrap());
        let matching = matching_indexes(&instrs);

        for (&i, &j) in matching.iter() {
            assert_ne!(i, j);
            assert_eq!(matching[&j], i);
            let (lhs, rhs) = if i < j { (i, j) } else { (j, i) };
            assert!(matches!(instrs[lhs], Instr::JumpIfZero { .. }));
            assert!(matches!(instrs[rhs], Instr::JumpUnlessZero { .. }));

            // each side's own label is the other side's target
            let (lhs_own, lhs_target) = instrs[lhs].labels().unwrap();
            let (rhs_own, rhs_target) = instrs[rhs].labels().unwrap();
            assert_eq!(lhs_own, rhs_target);
            assert_eq!(lhs_target, rhs_own);
        }
        assert_eq!(matching.len(), 6);
    }

    #[test]
    fn nested_pairs_match_their_own_depth() {
        let instrs = lower(&Lexer::new("[[-]]").collect_ops().unwrap());
        let matching = matching_indexes(&instrs);
        assert_eq!(matching[&0], 4);
        assert_eq!(matching[&1], 3);
    }
}
