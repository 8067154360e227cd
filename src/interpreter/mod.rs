use std::cell::RefCell;
use std::io::{Read, Write};
use std::rc::Rc;

use crate::ir::{matching_indexes, Instr};

/// The machine state a program mutates: the tape, the data pointer and the
/// two byte streams.
pub struct Runtime {
    /// Pointer into the tape
    data_pointer: usize,

    /// Our statically allocated tape
    tape: Vec<u8>,

    in_stream: Box<dyn Read>,
    out_stream: Box<dyn Write>,
}

impl Runtime {
    /// A zeroed tape with the pointer parked at its midpoint.
    pub fn new(tape_size: usize, in_stream: Box<dyn Read>, out_stream: Box<dyn Write>) -> Self {
        Self {
            data_pointer: tape_size / 2,
            tape: vec![0; tape_size],
            in_stream,
            out_stream,
        }
    }

    /// Takes over an existing tape, for runs that need a seeded start state.
    pub fn with_tape(
        tape: Vec<u8>,
        data_pointer: usize,
        in_stream: Box<dyn Read>,
        out_stream: Box<dyn Write>,
    ) -> Self {
        Self {
            data_pointer,
            tape,
            in_stream,
            out_stream,
        }
    }

    pub fn tape(&self) -> &[u8] {
        &self.tape
    }

    pub fn data_pointer(&self) -> usize {
        self.data_pointer
    }

    fn index_at(&self, offset: i64) -> usize {
        let index = self.data_pointer.wrapping_add_signed(offset as isize);
        if index >= self.tape.len() {
            panic!(
                "Data pointer ({}) out of bounds (max length {})",
                index,
                self.tape.len()
            );
        }
        index
    }

    fn add_at_offset(&mut self, offset: i64, by: u8) {
        let index = self.index_at(offset);
        self.tape[index] = self.tape[index].wrapping_add(by);
    }

    fn value_at(&self, offset: i64) -> u8 {
        self.tape[self.index_at(offset)]
    }

    fn shift_data_pointer(&mut self, by: i64) {
        self.data_pointer = self.data_pointer.wrapping_add_signed(by as isize);
        // only reads and writes check bounds, shifting freely is fine
    }

    fn write(&mut self) {
        let byte = [self.value_at(0)];
        self.out_stream.write_all(&byte).unwrap();
    }

    fn read(&mut self) {
        let mut byte = [0u8];
        let index = self.index_at(0);
        // EOF leaves a zero so input-terminated loops halt
        self.tape[index] = match self.in_stream.read(&mut byte).unwrap() {
            0 => 0,
            _ => byte[0],
        };
    }
}

/// An output sink that stays readable after the `Runtime` swallowed its
/// writing half. Clone it, hand one half to the runtime, keep the other.
#[derive(Clone, Default)]
pub struct SharedSink(Rc<RefCell<Vec<u8>>>);

impl SharedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.0.borrow().clone()
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Reference executor for the full IR, fused ops included. The back ends are
/// checked against what this does.
pub struct IrInterpreter {}

impl IrInterpreter {
    pub fn new() -> Self {
        Self {}
    }

    pub fn run(&mut self, runtime: &mut Runtime, instrs: &[Instr]) {
        let matching = matching_indexes(instrs);

        let mut pc = 0;
        while pc < instrs.len() {
            match &instrs[pc] {
                Instr::MoveRight => runtime.shift_data_pointer(1),
                Instr::MoveLeft => runtime.shift_data_pointer(-1),
                Instr::Inc => runtime.add_at_offset(0, 1),
                Instr::Dec => runtime.add_at_offset(0, 0xff),
                Instr::Write => runtime.write(),
                Instr::Read => runtime.read(),
                Instr::JumpIfZero { .. } => {
                    if runtime.value_at(0) == 0 {
                        pc = matching[&pc];
                    }
                }
                Instr::JumpUnlessZero { .. } => {
                    if runtime.value_at(0) != 0 {
                        pc = matching[&pc];
                    }
                }
                Instr::End => break,
                Instr::Zero => {
                    let index = runtime.index_at(0);
                    runtime.tape[index] = 0;
                }
                Instr::Sum { amount, offset } => runtime.add_at_offset(*offset, *amount as u8),
                Instr::MulAdd {
                    amount,
                    offset,
                    neg_induction,
                } => {
                    let mut induction = runtime.value_at(0);
                    if *neg_induction {
                        induction = (!induction).wrapping_add(1);
                    }
                    runtime.add_at_offset(*offset, induction.wrapping_mul(*amount as u8));
                }
                Instr::AddPtr { delta } => runtime.shift_data_pointer(*delta),
                Instr::MemScan { stride } => {
                    while runtime.value_at(0) != 0 {
                        runtime.shift_data_pointer(*stride);
                    }
                }
            }
            pc += 1;
        }
    }
}

impl Default for IrInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::lower;
    use crate::lexer::Lexer;

    fn run_source(src: &str, input: &[u8]) -> (Vec<u8>, Vec<u8>, usize) {
        let instrs = lower(&Lexer::new(src).collect_ops().unwrap());
        let sink = SharedSink::new();
        let input = std::io::Cursor::new(input.to_vec());
        let mut runtime = Runtime::new(64, Box::new(input), Box::new(sink.clone()));
        IrInterpreter::new().run(&mut runtime, &instrs);
        (sink.bytes(), runtime.tape().to_vec(), runtime.data_pointer())
    }

    #[test]
    fn writes_the_incremented_cell() {
        let (output, _, pointer) = run_source(">+.", &[]);
        assert_eq!(output, vec![1]);
        assert_eq!(pointer, 33);
    }

    #[test]
    fn cat_copies_input_to_output() {
        let (output, _, _) = run_source(",[.,]", b"abc");
        assert_eq!(output, b"abc");
    }

    #[test]
    fn io_loop_prints_once_and_exits() {
        let (output, tape, _) = run_source("+[.-]", &[]);
        assert_eq!(output, vec![1]);
        assert_eq!(tape[32], 0);
    }

    #[test]
    fn mem_scan_stops_on_the_first_zero_cell() {
        let mut tape = vec![0u8; 16];
        tape[0] = 1;
        tape[1] = 1;
        tape[2] = 1;
        tape[4] = 1;
        let mut runtime = Runtime::with_tape(
            tape,
            0,
            Box::new(std::io::empty()),
            Box::new(std::io::sink()),
        );
        IrInterpreter::new().run(&mut runtime, &[Instr::MemScan { stride: 1 }, Instr::End]);
        assert_eq!(runtime.data_pointer(), 3);
    }
}
