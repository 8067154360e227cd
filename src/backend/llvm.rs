use crate::error::CompileError;
use crate::ir::Instr;
use crate::TAPE_SIZE;

/// Emits the program as a textual SSA module for an external optimizer. The
/// tape pointer is a value threaded through the function; every loop edge
/// joins it with a φ whose back-edge operand is filled in once the matching
/// `]` has been emitted.
pub fn compile(instrs: &[Instr]) -> Result<String, CompileError> {
    Emitter::default().compile(instrs)
}

#[derive(Default)]
struct Emitter {
    lines: Vec<String>,
    next_value: usize,
    /// Name of the block currently being filled
    cur_block: String,
    /// SSA name of the tape pointer in that block
    cur_ptr: String,
    open_loops: Vec<OpenLoop>,
}

struct OpenLoop {
    /// Index of the body block's pointer φ, rewritten at the `]`
    body_phi_line: usize,
    body_phi_name: String,
    body_label: String,
    exit_label: String,
    /// Predecessor feeding both forward edges
    head_block: String,
    head_ptr: String,
}

impl Emitter {
    fn compile(mut self, instrs: &[Instr]) -> Result<String, CompileError> {
        self.lines.push("declare i32 @putchar(i32)".into());
        self.lines.push("declare i32 @getchar()".into());
        self.lines
            .push("declare void @llvm.memset.p0.i64(ptr, i8, i64, i1)".into());
        self.lines.push(String::new());
        self.lines.push("define i32 @main() {".into());
        self.lines.push("entry:".into());
        self.lines
            .push(format!("  %tape = alloca [{} x i8], align 16", TAPE_SIZE));
        self.lines.push(format!(
            "  call void @llvm.memset.p0.i64(ptr %tape, i8 0, i64 {}, i1 false)",
            TAPE_SIZE
        ));
        let mid = self.fresh("p");
        self.lines.push(format!(
            "  {} = getelementptr inbounds i8, ptr %tape, i64 {}",
            mid,
            TAPE_SIZE / 2
        ));
        self.cur_block = "entry".into();
        self.cur_ptr = mid;

        for instr in instrs {
            self.emit(instr)?;
        }
        self.lines.push("}".into());

        Ok(self.lines.join("\n") + "\n")
    }

    fn fresh(&mut self, prefix: &str) -> String {
        let name = format!("%{}{}", prefix, self.next_value);
        self.next_value += 1;
        name
    }

    fn gep(&mut self, offset: i64) -> String {
        if offset == 0 {
            return self.cur_ptr.clone();
        }
        let name = self.fresh("p");
        self.lines.push(format!(
            "  {} = getelementptr inbounds i8, ptr {}, i64 {}",
            name, self.cur_ptr, offset
        ));
        name
    }

    fn load(&mut self, addr: &str) -> String {
        let name = self.fresh("v");
        self.lines.push(format!("  {} = load i8, ptr {}", name, addr));
        name
    }

    fn advance_ptr(&mut self, delta: i64) {
        self.cur_ptr = self.gep(delta);
    }

    fn add_at(&mut self, offset: i64, amount: i8) {
        let addr = self.gep(offset);
        let val = self.load(&addr);
        let sum = self.fresh("v");
        self.lines
            .push(format!("  {} = add i8 {}, {}", sum, val, amount));
        self.lines.push(format!("  store i8 {}, ptr {}", sum, addr));
    }

    fn emit(&mut self, instr: &Instr) -> Result<(), CompileError> {
        match instr {
            Instr::MoveRight => self.advance_ptr(1),
            Instr::MoveLeft => self.advance_ptr(-1),
            Instr::AddPtr { delta } => self.advance_ptr(*delta),
            Instr::Inc => self.add_at(0, 1),
            Instr::Dec => self.add_at(0, -1),
            Instr::Sum { amount, offset } => self.add_at(*offset, *amount),
            Instr::Zero => self
                .lines
                .push(format!("  store i8 0, ptr {}", self.cur_ptr)),
            Instr::MulAdd {
                amount,
                offset,
                neg_induction,
            } => {
                let induction = self.load(&self.cur_ptr.clone());
                let multiplier = if *neg_induction {
                    let neg = self.fresh("v");
                    self.lines
                        .push(format!("  {} = sub i8 0, {}", neg, induction));
                    neg
                } else {
                    induction
                };
                let product = self.fresh("v");
                self.lines
                    .push(format!("  {} = mul i8 {}, {}", product, multiplier, amount));
                let addr = self.gep(*offset);
                let val = self.load(&addr);
                let sum = self.fresh("v");
                self.lines
                    .push(format!("  {} = add i8 {}, {}", sum, val, product));
                self.lines.push(format!("  store i8 {}, ptr {}", sum, addr));
            }
            Instr::Write => {
                let val = self.load(&self.cur_ptr.clone());
                let wide = self.fresh("v");
                self.lines
                    .push(format!("  {} = zext i8 {} to i32", wide, val));
                let ret = self.fresh("v");
                self.lines
                    .push(format!("  {} = call i32 @putchar(i32 {})", ret, wide));
            }
            Instr::Read => {
                let ret = self.fresh("v");
                self.lines.push(format!("  {} = call i32 @getchar()", ret));
                let narrow = self.fresh("v");
                self.lines
                    .push(format!("  {} = trunc i32 {} to i8", narrow, ret));
                self.lines
                    .push(format!("  store i8 {}, ptr {}", narrow, self.cur_ptr));
            }
            Instr::JumpIfZero { own, target } => {
                let body_label = own.to_string();
                let exit_label = target.to_string();

                let val = self.load(&self.cur_ptr.clone());
                let cond = self.fresh("v");
                self.lines
                    .push(format!("  {} = icmp eq i8 {}, 0", cond, val));
                self.lines.push(format!(
                    "  br i1 {}, label %{}, label %{}",
                    cond, exit_label, body_label
                ));
                self.lines.push(String::new());
                self.lines.push(format!("{}:", body_label));

                let phi = self.fresh("p");
                let body_phi_line = self.lines.len();
                // the back-edge operand is unknown until the `]`
                self.lines.push(String::new());
                self.open_loops.push(OpenLoop {
                    body_phi_line,
                    body_phi_name: phi.clone(),
                    body_label: body_label.clone(),
                    exit_label,
                    head_block: std::mem::replace(&mut self.cur_block, body_label),
                    head_ptr: std::mem::replace(&mut self.cur_ptr, phi),
                });
            }
            Instr::JumpUnlessZero { .. } => {
                let frame = self.open_loops.pop().expect("brackets balance");

                let val = self.load(&self.cur_ptr.clone());
                let cond = self.fresh("v");
                self.lines
                    .push(format!("  {} = icmp ne i8 {}, 0", cond, val));
                self.lines.push(format!(
                    "  br i1 {}, label %{}, label %{}",
                    cond, frame.body_label, frame.exit_label
                ));

                self.lines[frame.body_phi_line] = format!(
                    "  {} = phi ptr [ {}, %{} ], [ {}, %{} ]",
                    frame.body_phi_name,
                    frame.head_ptr,
                    frame.head_block,
                    self.cur_ptr,
                    self.cur_block
                );

                self.lines.push(String::new());
                self.lines.push(format!("{}:", frame.exit_label));
                let exit_phi = self.fresh("p");
                self.lines.push(format!(
                    "  {} = phi ptr [ {}, %{} ], [ {}, %{} ]",
                    exit_phi, frame.head_ptr, frame.head_block, self.cur_ptr, self.cur_block
                ));
                self.cur_block = frame.exit_label;
                self.cur_ptr = exit_phi;
            }
            Instr::End => self.lines.push("  ret i32 0".into()),
            Instr::MemScan { .. } => {
                return Err(CompileError::UnsupportedOp {
                    backend: "structured-IR",
                    op: instr.op_name(),
                })
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::lower;
    use crate::lexer::Lexer;

    fn emitted(src: &str) -> String {
        compile(&lower(&Lexer::new(src).collect_ops().unwrap())).unwrap()
    }

    #[test]
    fn entry_builds_and_centers_the_tape() {
        let text = emitted("+.");
        assert!(text.contains("%tape = alloca [320000 x i8]"));
        assert!(text.contains("i8 0, i64 320000"));
        assert!(text.contains("getelementptr inbounds i8, ptr %tape, i64 160000"));
        assert!(text.contains("call i32 @putchar"));
        assert!(text.contains("ret i32 0"));
    }

    #[test]
    fn loops_join_the_pointer_with_two_phis() {
        let text = emitted("+[>-<-]");
        assert_eq!(text.matches("= phi ptr [ ").count(), 2);
        assert!(text.contains("label0:"));
        assert!(text.contains("label1:"));
        assert!(text.contains("br i1"));
    }

    #[test]
    fn backedge_operand_points_at_the_tail_block() {
        let text = emitted("[>]");
        // the body block's phi names itself through the backedge: the body
        // both starts and ends the loop, so its own value flows back
        let phi_line = text
            .lines()
            .find(|l| l.contains("= phi ptr") && l.contains("%entry"))
            .unwrap();
        assert!(phi_line.contains("%label0"));
    }

    #[test]
    fn nested_loops_patch_their_own_frames() {
        let text = emitted("+[[-]>]");
        assert_eq!(text.matches("= phi ptr [ ").count(), 4);
        assert!(text.contains("label2:"));
        assert!(text.contains("label3:"));
    }

    #[test]
    fn scans_are_rejected() {
        let result = compile(&[Instr::MemScan { stride: 1 }, Instr::End]);
        assert!(matches!(
            result,
            Err(CompileError::UnsupportedOp {
                backend: "structured-IR",
                ..
            })
        ));
    }
}
