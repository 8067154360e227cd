use super::{LexerError, SourceOp};

#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    /** Human Readable positions in file */
    pub cur_line: usize,
    pub cur_col: usize,

    chars: std::iter::Peekable<std::str::Chars<'a>>,
    balancing_state: i32,
}

impl<'a> Lexer<'a> {
    pub fn new(chars: &'a str) -> Lexer<'a> {
        Lexer {
            cur_col: 1,
            cur_line: 1,

            chars: chars.chars().peekable(),
            balancing_state: 0,
        }
    }

    fn transform_to_op(&mut self, c: char) -> Result<Option<SourceOp>, LexerError> {
        match c {
            '>' => Ok(Some(SourceOp::MoveRight)),
            '<' => Ok(Some(SourceOp::MoveLeft)),
            '+' => Ok(Some(SourceOp::Inc)),
            '-' => Ok(Some(SourceOp::Dec)),
            '.' => Ok(Some(SourceOp::Write)),
            ',' => Ok(Some(SourceOp::Read)),
            '[' => {
                self.balancing_state += 1;
                Ok(Some(SourceOp::JumpIfZero))
            }
            ']' => {
                if self.balancing_state >= 1 {
                    self.balancing_state -= 1;
                    Ok(Some(SourceOp::JumpUnlessZero))
                } else {
                    Err(LexerError::MisbalancedSymbol {
                        symbol: ']',
                        other: '[',
                    })
                }
            }
            // every other byte is a comment and produces nothing
            _ => Ok(None),
        }
    }

    fn consume_char(&mut self) -> Option<char> {
        match self.chars.next() {
            Some(c) => {
                self.cur_col += 1;
                if c == '\n' {
                    self.cur_line += 1;
                    self.cur_col = 1;
                }
                Some(c)
            }
            None => None,
        }
    }

    pub fn next_op(&mut self) -> Result<SourceOp, LexerError> {
        while let Some(c) = self.consume_char() {
            if let Some(op) = self.transform_to_op(c)? {
                return Ok(op);
            }
        }

        if self.balancing_state > 0 {
            Err(LexerError::MisbalancedSymbol {
                symbol: '[',
                other: ']',
            })
        } else {
            Ok(SourceOp::Eof)
        }
    }

    /// Lexes the whole input, appending the synthetic terminator.
    pub fn collect_ops(&mut self) -> Result<Vec<SourceOp>, LexerError> {
        let mut v = vec![];
        loop {
            match self.next_op() {
                Ok(SourceOp::Eof) => {
                    v.push(SourceOp::Eof);
                    return Ok(v);
                }
                Err(e) => return Err(e),
                Ok(op) => v.push(op),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_every_symbol_and_ignores_comments() {
        let ops = Lexer::new("a> <b+\n-.,[ comment ]!").collect_ops().unwrap();
        assert_eq!(
            ops,
            vec![
                SourceOp::MoveRight,
                SourceOp::MoveLeft,
                SourceOp::Inc,
                SourceOp::Dec,
                SourceOp::Write,
                SourceOp::Read,
                SourceOp::JumpIfZero,
                SourceOp::JumpUnlessZero,
                SourceOp::Eof,
            ]
        );
    }

    #[test]
    fn rejects_close_bracket_without_open() {
        assert!(matches!(
            Lexer::new("+]").collect_ops(),
            Err(LexerError::MisbalancedSymbol { symbol: ']', .. })
        ));
    }

    #[test]
    fn rejects_unclosed_open_bracket() {
        assert!(matches!(
            Lexer::new("[[+]").collect_ops(),
            Err(LexerError::MisbalancedSymbol { symbol: '[', .. })
        ));
    }

    #[test]
    fn round_trips_through_symbols() {
        let src = "++[->+<].";
        let ops = Lexer::new(src).collect_ops().unwrap();
        let printed: String = ops.iter().filter_map(|op| op.symbol()).collect();
        assert_eq!(printed, src);
    }
}
