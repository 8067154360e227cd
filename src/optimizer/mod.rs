use crate::ir::Instr;
use crate::Settings;

use self::inst_combine::inst_combine;
use self::partial_eval::partial_eval;
use self::simplify_loops::simplify_loops;

pub mod inst_combine;
pub mod partial_eval;
pub mod simplify_loops;

/// Runs the enabled passes in their fixed order. Loop recognition goes first
/// so the combiner and the evaluator see the fused ops.
pub fn optimize(instrs: Vec<Instr>, settings: &Settings) -> Vec<Instr> {
    let instrs = simplify_loops(instrs, settings);
    let instrs = inst_combine(instrs, settings);
    partial_eval(instrs, settings)
}
