pub mod backend;
pub mod error;
pub mod interpreter;
pub mod ir;
pub mod jit;
pub mod lexer;
pub mod optimizer;

pub use error::CompileError;

/// Bytes of tape handed to every compiled program, centered so programs can
/// walk in both directions. Must stay even.
pub const TAPE_SIZE: usize = 320_000;

/// Which optimization passes run over the IR.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Rewrite simple multiply-add loops into straight-line `MulAdd`s
    pub simplify_loops: bool,

    /// Rewrite pure pointer-walk loops into `MemScan`
    pub vectorize_mem_scans: bool,

    /// Coalesce runs of moves/increments into `Sum`/`AddPtr`
    pub run_inst_combine: bool,

    /// Concretely execute the input-free prefix of the program
    pub partial_eval: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            simplify_loops: true,
            vectorize_mem_scans: true,
            run_inst_combine: true,
            partial_eval: true,
        }
    }
}
