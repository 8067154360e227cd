use std::collections::HashMap;
use std::mem;

use crate::error::CompileError;
use crate::ir::{matching_indexes, EncodeCtx, Instr, BRANCH_FOOTPRINT};
use crate::TAPE_SIZE;

use self::memory::ExecutableBuffer;

pub mod memory;

/// Budgeted buffer bytes per IR op; the widest encodings are branch tails.
const BYTES_PER_OP: usize = 32;

/// The block ABI: tape pointer in, status word through the second argument,
/// live tape pointer back out.
type BlockFn = extern "C" fn(*mut u8, *mut u32) -> *mut u8;

struct Block {
    /// Buffer offset of the prologue
    start: usize,
    /// Buffer offset of the branch tail, rewritten as targets are learned
    tail: usize,
    /// IR index of the terminator
    term_ip: usize,
    on_zero: Option<u64>,
    on_not_zero: Option<u64>,
}

/// Lazy per-basic-block compiler. Blocks are materialized the first time
/// control wants to enter them; every block returns to the driver through an
/// unresolved branch direction, which the driver then patches with the
/// freshly learned target.
pub struct Jit<'a> {
    instrs: &'a [Instr],
    matching: HashMap<usize, usize>,
    buffer: ExecutableBuffer,
    cursor: usize,
    blocks: Vec<Block>,
    block_starting_at: HashMap<usize, usize>,
    block_ending_at: HashMap<usize, usize>,
    putchar: u64,
    getchar: u64,
}

impl<'a> Jit<'a> {
    pub fn new(instrs: &'a [Instr]) -> Result<Self, CompileError> {
        let buffer = ExecutableBuffer::allocate(instrs.len() * BYTES_PER_OP + 4096)?;
        Ok(Jit {
            instrs,
            matching: matching_indexes(instrs),
            buffer,
            cursor: 0,
            blocks: vec![],
            block_starting_at: HashMap::new(),
            block_ending_at: HashMap::new(),
            putchar: libc::putchar as usize as u64,
            getchar: libc::getchar as usize as u64,
        })
    }

    fn block_at(&mut self, ip: usize) -> Result<usize, CompileError> {
        if let Some(&index) = self.block_starting_at.get(&ip) {
            return Ok(index);
        }
        self.compile_block(ip)
    }

    /// Encodes the block beginning at `start_ip` into the next free bytes:
    /// prologue, straight-line body, then the branch tail.
    fn compile_block(&mut self, start_ip: usize) -> Result<usize, CompileError> {
        let mut term_ip = start_ip;
        while !self.instrs[term_ip].ends_block() {
            term_ip += 1;
        }

        let index = self.blocks.len();
        let start = self.cursor;

        // mov dword ptr [rsi], index: tells the driver who ran last
        let mut prologue = vec![0xc7, 0x06];
        prologue.extend_from_slice(&(index as u32).to_le_bytes());
        self.emit(&prologue);

        for ip in start_ip..term_ip {
            let ctx = EncodeCtx {
                at: self.buffer.address_at(self.cursor),
                putchar: self.putchar,
                getchar: self.getchar,
                ..Default::default()
            };
            let code = self.instrs[ip].encode(ctx)?;
            self.emit(&code);
        }

        let tail = self.cursor;
        // a backedge resolves immediately: control reached this `]` through
        // its loop head, so the head's re-test already has an address
        let on_not_zero = match &self.instrs[term_ip] {
            Instr::JumpUnlessZero { .. } => {
                let head_ip = self.matching[&term_ip];
                let head = *self
                    .block_ending_at
                    .get(&head_ip)
                    .expect("loop head compiled before its backedge");
                Some(self.buffer.address_at(self.blocks[head].tail))
            }
            _ => None,
        };

        let ctx = EncodeCtx {
            at: self.buffer.address_at(tail),
            on_not_zero,
            ..Default::default()
        };
        let code = self.instrs[term_ip].encode(ctx)?;
        self.buffer.write(tail, &code);
        self.cursor = tail + BRANCH_FOOTPRINT;

        self.blocks.push(Block {
            start,
            tail,
            term_ip,
            on_zero: None,
            on_not_zero,
        });
        self.block_starting_at.insert(start_ip, index);
        self.block_ending_at.insert(term_ip, index);

        Ok(index)
    }

    fn emit(&mut self, bytes: &[u8]) {
        self.buffer.write(self.cursor, bytes);
        self.cursor += bytes.len();
    }

    /// Rewrites a block's tail in place with one more direction resolved.
    fn patch(&mut self, block: usize, cell_is_zero: bool, target: u64) -> Result<(), CompileError> {
        {
            let block = &mut self.blocks[block];
            if cell_is_zero {
                block.on_zero = Some(target);
            } else {
                block.on_not_zero = Some(target);
            }
        }

        let block = &self.blocks[block];
        let ctx = EncodeCtx {
            at: self.buffer.address_at(block.tail),
            on_zero: block.on_zero,
            on_not_zero: block.on_not_zero,
            ..Default::default()
        };
        let code = self.instrs[block.term_ip].encode(ctx)?;
        self.buffer.write(block.tail, &code);
        Ok(())
    }

    /// Alternates between running compiled code and extending it. Compiled
    /// code owns the tape until a branch with an unresolved direction hands
    /// control back here along with the live tape pointer.
    pub fn run(&mut self, tape: &mut [u8], start: usize) -> Result<usize, CompileError> {
        let mut current = self.block_at(0)?;
        let mut tape_ptr = unsafe { tape.as_mut_ptr().add(start) };
        let mut status: u32 = 0;

        loop {
            let entry = self.buffer.address_at(self.blocks[current].start);
            let block_fn: BlockFn = unsafe { mem::transmute(entry) };
            tape_ptr = block_fn(tape_ptr, &mut status);

            // status names the last block whose prologue ran, which is the
            // block that returned: a tail only returns when its own
            // unresolved direction is taken, and a loop head's re-test
            // reached by a backedge never falls through (the backedge just
            // tested the same cell non-zero)
            let returned = status as usize;
            let term_ip = self.blocks[returned].term_ip;
            match &self.instrs[term_ip] {
                Instr::End => break,
                Instr::JumpIfZero { .. } => {
                    let cell_is_zero = unsafe { *tape_ptr } == 0;
                    let next_ip = if cell_is_zero {
                        self.matching[&term_ip] + 1
                    } else {
                        term_ip + 1
                    };
                    let next = self.block_at(next_ip)?;
                    let target = self.buffer.address_at(self.blocks[next].start);
                    self.patch(returned, cell_is_zero, target)?;
                    current = next;
                }
                Instr::JumpUnlessZero { .. } => {
                    // the non-zero direction was patched at creation, so a
                    // return through this tail means the loop is done
                    let next = self.block_at(term_ip + 1)?;
                    let target = self.buffer.address_at(self.blocks[next].start);
                    self.patch(returned, true, target)?;
                    current = next;
                }
                _ => unreachable!("blocks end in a branch or End"),
            }
        }

        Ok(unsafe { tape_ptr.offset_from(tape.as_ptr()) } as usize)
    }
}

/// Compiles and runs the program against a fresh centered tape.
pub fn execute(instrs: &[Instr]) -> Result<(), CompileError> {
    let mut tape = vec![0u8; TAPE_SIZE];
    Jit::new(instrs)?.run(&mut tape, TAPE_SIZE / 2)?;
    Ok(())
}
