use std::fmt;

use crate::error::CompileError;

pub mod brackets;
pub mod lower;

pub use brackets::matching_indexes;
pub use lower::lower;

/// Loop identity that survives pass renumbering. Rendered as `labelN` in
/// textual output; the matching bracket owns the adjacent number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "label{}", self.0)
    }
}

/// One IR instruction. Lowering produces only the one-to-one variants; the
/// optimization passes introduce the fused ones.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /// Pointer += 1
    MoveRight,
    /// Pointer -= 1
    MoveLeft,
    /// Cell += 1 (mod 256)
    Inc,
    /// Cell -= 1 (mod 256)
    Dec,
    /// Write the current cell to standard output
    Write,
    /// Read one byte from standard input into the current cell
    Read,
    /// Loop head: taken when the current cell is zero
    JumpIfZero { own: Label, target: Label },
    /// Loop backedge: taken while the current cell is non-zero
    JumpUnlessZero { own: Label, target: Label },
    /// Program termination
    End,
    /// Cell = 0
    Zero,
    /// Cell at pointer+offset += amount (mod 256)
    Sum { amount: i8, offset: i64 },
    /// Cell at pointer+offset += amount * cell[0], with the multiplier
    /// two's-complement negated first when the loop induction counts up
    MulAdd {
        amount: i8,
        offset: i64,
        neg_induction: bool,
    },
    /// Pointer += delta
    AddPtr { delta: i64 },
    /// Advance the pointer by multiples of stride to the first zero cell
    MemScan { stride: i64 },
}

/// Strides the scan mask tables cover.
pub fn valid_stride(stride: i64) -> bool {
    matches!(stride, 1 | 2 | 4 | -1 | -2 | -4)
}

/// Where an op's bytes land and what its surroundings look like. Only the
/// position-dependent variants (I/O calls, branch tails) read it.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeCtx {
    /// Address of the op's first byte
    pub at: u64,
    pub putchar: u64,
    pub getchar: u64,
    /// Branch target for the zero direction, when known
    pub on_zero: Option<u64>,
    /// Branch target for the non-zero direction, when known
    pub on_not_zero: Option<u64>,
}

/// A branch tail encodes into at most 17 bytes; stubs are padded to this so
/// any later shape can be rewritten in place.
pub const BRANCH_FOOTPRINT: usize = 21;

fn instr_str(line: &str) -> String {
    format!("\t{}\n", line)
}

fn rel32(target: u64, next_instr: u64) -> [u8; 4] {
    (target.wrapping_sub(next_instr) as u32).to_le_bytes()
}

// opcode + modrm + displacement for a byte operation on (%rdi) at `offset`
fn mem_rdi(opcode: u8, offset: i64, out: &mut Vec<u8>) {
    if offset == 0 {
        out.extend_from_slice(&[opcode, 0x07]);
    } else if i8::try_from(offset).is_ok() {
        out.extend_from_slice(&[opcode, 0x47, offset as u8]);
    } else {
        out.extend_from_slice(&[opcode, 0x87]);
        out.extend_from_slice(&(offset as i32).to_le_bytes());
    }
}

// mov rax, rdi / cmp byte ptr [rdi], 0 / conditional tail per known targets
fn encode_branch(ctx: EncodeCtx) -> Vec<u8> {
    let mut code = vec![0x48, 0x89, 0xf8, 0x80, 0x3f, 0x00];
    match (ctx.on_zero, ctx.on_not_zero) {
        (None, None) => {
            // nothing resolved yet: return the tape pointer to the driver,
            // padded so either final shape fits over it
            code = vec![0x48, 0x89, 0xf8, 0xc3];
            code.resize(BRANCH_FOOTPRINT, 0x90);
        }
        (Some(zero), None) => {
            code.extend_from_slice(&[0x0f, 0x84]);
            code.extend_from_slice(&rel32(zero, ctx.at + 12));
            code.push(0xc3);
        }
        (None, Some(not_zero)) => {
            code.extend_from_slice(&[0x0f, 0x85]);
            code.extend_from_slice(&rel32(not_zero, ctx.at + 12));
            code.push(0xc3);
        }
        (Some(zero), Some(not_zero)) => {
            code.extend_from_slice(&[0x0f, 0x84]);
            code.extend_from_slice(&rel32(zero, ctx.at + 12));
            code.push(0xe9);
            code.extend_from_slice(&rel32(not_zero, ctx.at + 17));
        }
    }
    code
}

impl Instr {
    pub fn op_name(&self) -> &'static str {
        match self {
            Instr::MoveRight => "MoveRight",
            Instr::MoveLeft => "MoveLeft",
            Instr::Inc => "Inc",
            Instr::Dec => "Dec",
            Instr::Write => "Write",
            Instr::Read => "Read",
            Instr::JumpIfZero { .. } => "JumpIfZero",
            Instr::JumpUnlessZero { .. } => "JumpUnlessZero",
            Instr::End => "End",
            Instr::Zero => "Zero",
            Instr::Sum { .. } => "Sum",
            Instr::MulAdd { .. } => "MulAdd",
            Instr::AddPtr { .. } => "AddPtr",
            Instr::MemScan { .. } => "MemScan",
        }
    }

    /// The command symbol an op lowers from, `None` for fused ops and `End`.
    pub fn source_symbol(&self) -> Option<char> {
        match self {
            Instr::MoveRight => Some('>'),
            Instr::MoveLeft => Some('<'),
            Instr::Inc => Some('+'),
            Instr::Dec => Some('-'),
            Instr::Write => Some('.'),
            Instr::Read => Some(','),
            Instr::JumpIfZero { .. } => Some('['),
            Instr::JumpUnlessZero { .. } => Some(']'),
            _ => None,
        }
    }

    pub fn is_jump(&self) -> bool {
        matches!(
            self,
            Instr::JumpIfZero { .. } | Instr::JumpUnlessZero { .. }
        )
    }

    /// Jumps and `End` terminate a basic block.
    pub fn ends_block(&self) -> bool {
        self.is_jump() || matches!(self, Instr::End)
    }

    pub fn labels(&self) -> Option<(Label, Label)> {
        match self {
            Instr::JumpIfZero { own, target } | Instr::JumpUnlessZero { own, target } => {
                Some((*own, *target))
            }
            _ => None,
        }
    }

    /// The AT&T assembly fragment for this op. `%rdi` holds the tape pointer
    /// throughout, pushed around libc calls.
    pub fn render_text(&self) -> Result<String, CompileError> {
        let text = match self {
            Instr::MoveRight => instr_str("inc\t%rdi"),
            Instr::MoveLeft => instr_str("dec\t%rdi"),
            Instr::Inc => instr_str("incb\t(%rdi)"),
            Instr::Dec => instr_str("decb\t(%rdi)"),
            Instr::Write => {
                let mut assembly = String::new();
                assembly += &instr_str("push\t%rdi");
                assembly += &instr_str("movb\t(%rdi), %dil");
                assembly += &instr_str("call\tputchar");
                assembly += &instr_str("pop\t%rdi");
                assembly
            }
            Instr::Read => {
                let mut assembly = String::new();
                assembly += &instr_str("push\t%rdi");
                assembly += &instr_str("call\tgetchar");
                assembly += &instr_str("pop\t%rdi");
                assembly += &instr_str("movb\t%al, (%rdi)");
                assembly
            }
            Instr::JumpIfZero { own, target } => {
                let mut assembly = format!("{}:\n", own);
                assembly += &instr_str("cmpb\t$0, (%rdi)");
                assembly += &instr_str(&format!("je\t{}", target));
                assembly
            }
            Instr::JumpUnlessZero { own, target } => {
                let mut assembly = format!("{}:\n", own);
                assembly += &instr_str("cmpb\t$0, (%rdi)");
                assembly += &instr_str(&format!("jne\t{}", target));
                assembly
            }
            Instr::End => instr_str("ret"),
            Instr::Zero => instr_str("movb\t$0, (%rdi)"),
            Instr::Sum { amount, offset } => {
                let offset_str = if *offset == 0 {
                    String::new()
                } else {
                    offset.to_string()
                };
                instr_str(&format!("addb\t${}, {}(%rdi)", amount, offset_str))
            }
            Instr::MulAdd {
                amount,
                offset,
                neg_induction,
            } => {
                let offset_str = if *offset == 0 {
                    String::new()
                } else {
                    offset.to_string()
                };
                let mut assembly = instr_str("movb\t(%rdi), %al");
                if *neg_induction {
                    assembly += &instr_str("xorb\t$-1, %al");
                    assembly += &instr_str("addb\t$1, %al");
                }
                assembly += &instr_str(&format!("movb\t${}, %r10b", amount));
                assembly += &instr_str("mulb\t%r10b");
                assembly += &instr_str(&format!("addb\t%al, {}(%rdi)", offset_str));
                assembly
            }
            Instr::AddPtr { delta } => instr_str(&format!("add\t${}, %rdi", delta)),
            Instr::MemScan { stride } => {
                if !valid_stride(*stride) {
                    return Err(CompileError::UnsupportedStride(*stride));
                }
                let is_neg = *stride < 0;
                let absolute_stride = stride.abs();

                let mut assembly = instr_str("vpxor\t%xmm0, %xmm0, %xmm0");
                if is_neg {
                    assembly += &instr_str("mov\t%rdi, %r10");
                    assembly += &instr_str("sub\t$31, %r10");
                    assembly += &instr_str("vpcmpeqb\t(%r10), %ymm0, %ymm0");
                } else {
                    assembly += &instr_str("vpcmpeqb\t(%rdi), %ymm0, %ymm0");
                }

                if absolute_stride != 1 {
                    let mask_label = format!(
                        ".STRIDE{}MASK{}",
                        absolute_stride,
                        if is_neg { "NEG" } else { "" }
                    );
                    assembly += &instr_str(&format!("vpand\t{}(%rip), %ymm0, %ymm0", mask_label));
                }

                assembly += &instr_str("vpmovmskb\t%ymm0, %r10");
                if is_neg {
                    assembly += &instr_str("lzcntl\t%r10d, %r10d");
                    assembly += &instr_str("sub\t%r10, %rdi");
                } else {
                    assembly += &instr_str("tzcntl\t%r10d, %r10d");
                    assembly += &instr_str("add\t%r10, %rdi");
                }
                assembly
            }
        };
        Ok(text)
    }

    /// Raw x86-64 bytes for this op under the JIT's block ABI: `%rdi` is the
    /// tape pointer, `%rsi` the status-word pointer, both live across ops.
    pub fn encode(&self, ctx: EncodeCtx) -> Result<Vec<u8>, CompileError> {
        let code = match self {
            Instr::MoveRight => vec![0x48, 0xff, 0xc7],
            Instr::MoveLeft => vec![0x48, 0xff, 0xcf],
            Instr::Inc => vec![0xfe, 0x07],
            Instr::Dec => vec![0xfe, 0x0f],
            Instr::Write => {
                // push rdi / push rsi twice keeps rsi alive over the call and
                // leaves rsp 16-byte aligned at the call site
                let mut code = vec![0x57, 0x56, 0x56, 0x40, 0x8a, 0x3f, 0xe8];
                code.extend_from_slice(&rel32(ctx.putchar, ctx.at + 11));
                code.extend_from_slice(&[0x5e, 0x5e, 0x5f]);
                code
            }
            Instr::Read => {
                let mut code = vec![0x57, 0x56, 0x56, 0xe8];
                code.extend_from_slice(&rel32(ctx.getchar, ctx.at + 8));
                code.extend_from_slice(&[0x5e, 0x5e, 0x5f, 0x88, 0x07]);
                code
            }
            Instr::JumpIfZero { .. } | Instr::JumpUnlessZero { .. } => encode_branch(ctx),
            // the driver reads the final tape pointer out of rax
            Instr::End => vec![0x48, 0x89, 0xf8, 0xc3],
            Instr::Zero => vec![0xc6, 0x07, 0x00],
            Instr::Sum { amount, offset } => {
                let mut code = vec![];
                mem_rdi(0x80, *offset, &mut code);
                code.push(*amount as u8);
                code
            }
            Instr::MulAdd {
                amount,
                offset,
                neg_induction,
            } => {
                let mut code = vec![0x8a, 0x07];
                if *neg_induction {
                    // al = -al, as xor -1 / add 1
                    code.extend_from_slice(&[0x34, 0xff, 0x04, 0x01]);
                }
                code.extend_from_slice(&[0x41, 0xb2, *amount as u8, 0x41, 0xf6, 0xe2]);
                mem_rdi(0x00, *offset, &mut code);
                code
            }
            Instr::AddPtr { delta } => {
                let mut code = vec![0x48, 0x81, 0xc7];
                code.extend_from_slice(&(*delta as i32).to_le_bytes());
                code
            }
            Instr::MemScan { .. } => {
                return Err(CompileError::UnsupportedOp {
                    backend: "machine-code",
                    op: self.op_name(),
                })
            }
        };
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_stub_fills_the_footprint() {
        let code = Instr::JumpIfZero {
            own: Label(0),
            target: Label(1),
        }
        .encode(EncodeCtx::default())
        .unwrap();
        assert_eq!(code.len(), BRANCH_FOOTPRINT);
        assert_eq!(&code[..4], &[0x48, 0x89, 0xf8, 0xc3]);
        assert!(code[4..].iter().all(|&b| b == 0x90));
    }

    #[test]
    fn branch_shapes_fit_inside_the_stub() {
        let both = EncodeCtx {
            at: 0x1000,
            on_zero: Some(0x2000),
            on_not_zero: Some(0x3000),
            ..Default::default()
        };
        let code = Instr::JumpUnlessZero {
            own: Label(1),
            target: Label(0),
        }
        .encode(both)
        .unwrap();
        assert_eq!(code.len(), 17);
        assert!(code.len() <= BRANCH_FOOTPRINT);
        // je rel32 measured from the byte after the je
        assert_eq!(&code[6..8], &[0x0f, 0x84]);
        assert_eq!(code[8..12], (0x2000u32 - (0x1000 + 12)).to_le_bytes());
        // jmp rel32 measured from the end of the tail
        assert_eq!(code[12], 0xe9);
        assert_eq!(code[13..17], (0x3000u32 - (0x1000 + 17)).to_le_bytes());
    }

    #[test]
    fn write_calls_pc_relative() {
        let ctx = EncodeCtx {
            at: 0x1000,
            putchar: 0x2000,
            ..Default::default()
        };
        let code = Instr::Write.encode(ctx).unwrap();
        assert_eq!(code.len(), 14);
        assert_eq!(code[6], 0xe8);
        assert_eq!(code[7..11], (0x2000u32 - (0x1000 + 11)).to_le_bytes());
    }

    #[test]
    fn sum_picks_the_shortest_displacement() {
        let zero = Instr::Sum {
            amount: 3,
            offset: 0,
        };
        assert_eq!(zero.encode(EncodeCtx::default()).unwrap(), vec![0x80, 0x07, 3]);

        let near = Instr::Sum {
            amount: -1,
            offset: 5,
        };
        assert_eq!(
            near.encode(EncodeCtx::default()).unwrap(),
            vec![0x80, 0x47, 5, 0xff]
        );

        let far = Instr::Sum {
            amount: 1,
            offset: 400,
        };
        let code = far.encode(EncodeCtx::default()).unwrap();
        assert_eq!(&code[..2], &[0x80, 0x87]);
        assert_eq!(code[2..6], 400i32.to_le_bytes());
    }

    #[test]
    fn memscan_rejects_unsupported_strides() {
        let scan = Instr::MemScan { stride: 3 };
        assert!(matches!(
            scan.render_text(),
            Err(CompileError::UnsupportedStride(3))
        ));
    }

    #[test]
    fn memscan_never_encodes() {
        let scan = Instr::MemScan { stride: 1 };
        assert!(scan.encode(EncodeCtx::default()).is_err());
    }
}
