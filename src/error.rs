use thiserror::Error;

use crate::lexer::LexerError;

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("IO Error")]
    FileIO(
        #[from]
        std::io::Error,
    ),

    #[error(transparent)]
    Lexer(#[from] LexerError),

    #[error("Memscan stride of {0} is not supported")]
    UnsupportedStride(i64),

    #[error("The {backend} back end can not encode a {op} instruction")]
    UnsupportedOp {
        backend: &'static str,
        op: &'static str,
    },

    #[error("Unable to map executable memory for the JIT")]
    ExecutableMap,
}
