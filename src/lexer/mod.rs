use thiserror::Error;

pub mod lexer;

pub use lexer::Lexer;

/// The source op set: one variant per command symbol plus a synthetic
/// terminator appended once the whole file has been consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceOp {
    // `>`: shift the data pointer right by one cell
    MoveRight,
    // `<`: shift the data pointer left by one cell
    MoveLeft,

    // `+`: add one to the byte at the data pointer (mod 256)
    Inc,
    // `-`: subtract one from the byte at the data pointer (mod 256)
    Dec,

    // `.`: write the byte at the data pointer to standard output
    Write,
    // `,`: read one byte from standard input into the data pointer
    Read,

    // `[`: if the byte at the data pointer is zero, jump past the matching `]`
    JumpIfZero,
    // `]`: if the byte at the data pointer is non-zero, jump back to the matching `[`
    JumpUnlessZero,

    // End of the program, no more ops left
    Eof,
}

impl SourceOp {
    /// The command symbol this op lexes from, `None` for the terminator.
    pub fn symbol(self) -> Option<char> {
        match self {
            SourceOp::MoveRight => Some('>'),
            SourceOp::MoveLeft => Some('<'),
            SourceOp::Inc => Some('+'),
            SourceOp::Dec => Some('-'),
            SourceOp::Write => Some('.'),
            SourceOp::Read => Some(','),
            SourceOp::JumpIfZero => Some('['),
            SourceOp::JumpUnlessZero => Some(']'),
            SourceOp::Eof => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum LexerError {
    #[error("Can't find other symbol ({other:}) for {symbol:}")]
    MisbalancedSymbol { symbol: char, other: char },
}
