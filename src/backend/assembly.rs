use crate::error::CompileError;
use crate::ir::Instr;
use crate::TAPE_SIZE;

/// Renders the optimized IR as one AT&T-syntax assembly file: the scan mask
/// tables, the entry point that callocs the tape, then `bf_main` built from
/// each op's fragment.
pub fn compile(instrs: &[Instr]) -> Result<String, CompileError> {
    let mut assembly = program_preamble();
    for instr in instrs {
        assembly += &instr.render_text()?;
    }
    Ok(assembly)
}

/// 32-byte comparison masks for the strided scans, both directions. The
/// forward table overlaps the reversed one shifted by a single byte, so each
/// stride costs 33 bytes of read-only data.
fn vector_masks() -> String {
    let mut masks = String::new();

    masks += ".STRIDE2MASK:\n";
    masks += "\t.byte\t255\n";
    masks += ".STRIDE2MASKNEG:\n";
    for i in 0..32 {
        masks += if i % 2 == 1 {
            "\t.byte\t255\n"
        } else {
            "\t.byte\t0\n"
        };
    }

    masks += ".STRIDE4MASK:\n";
    masks += "\t.byte\t255\n";
    masks += ".STRIDE4MASKNEG:\n";
    for i in 0..32 {
        masks += if i % 4 == 3 {
            "\t.byte\t255\n"
        } else {
            "\t.byte\t0\n"
        };
    }

    masks
}

fn program_preamble() -> String {
    // calloc hands back a zeroed tape; the pointer starts at its midpoint
    format!(
        "{}.global main\n\
         main:\n\
         \tsubq\t$8, %rsp\n\
         \tmovl\t${}, %edi\n\
         \tmovl\t$1, %esi\n\
         \tcall\tcalloc\n\
         \tleaq\t{}(%rax), %rdi\n\
         \tcall\tbf_main\n\
         \tmovl\t$0, %eax\n\
         \taddq\t$8, %rsp\n\
         \tret\n\
         \n\
         bf_main:\n",
        vector_masks(),
        TAPE_SIZE,
        TAPE_SIZE / 2
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Label;

    #[test]
    fn preamble_centers_the_tape_pointer() {
        let text = program_preamble();
        assert!(text.contains("movl\t$320000, %edi"));
        assert!(text.contains("leaq\t160000(%rax), %rdi"));
        assert!(text.contains("call\tbf_main"));
    }

    #[test]
    fn forward_masks_are_the_reversed_tables_shifted_by_one() {
        let masks = vector_masks();
        let stride2: Vec<&str> = masks
            .lines()
            .skip_while(|l| *l != ".STRIDE2MASK:")
            .skip(1)
            .take_while(|l| l.starts_with('\t'))
            .collect();
        // first byte of the forward table, then the whole NEG table header
        assert_eq!(stride2, vec!["\t.byte\t255"]);
        let neg2: Vec<&str> = masks
            .lines()
            .skip_while(|l| *l != ".STRIDE2MASKNEG:")
            .skip(1)
            .take_while(|l| l.starts_with('\t'))
            .collect();
        assert_eq!(neg2.len(), 32);
        assert_eq!(neg2[0], "\t.byte\t0");
        assert_eq!(neg2[1], "\t.byte\t255");
        assert_eq!(neg2[31], "\t.byte\t255");
    }

    #[test]
    fn renders_loops_with_their_labels() {
        let instrs = vec![
            Instr::JumpIfZero {
                own: Label(0),
                target: Label(1),
            },
            Instr::Dec,
            Instr::JumpUnlessZero {
                own: Label(1),
                target: Label(0),
            },
            Instr::End,
        ];
        let text = compile(&instrs).unwrap();
        assert!(text.contains("label0:\n\tcmpb\t$0, (%rdi)\n\tje\tlabel1\n"));
        assert!(text.contains("label1:\n\tcmpb\t$0, (%rdi)\n\tjne\tlabel0\n"));
        assert!(text.ends_with("\tret\n"));
    }

    #[test]
    fn strided_scans_pick_their_mask_table() {
        let fwd = Instr::MemScan { stride: 4 }.render_text().unwrap();
        assert!(fwd.contains("vpand\t.STRIDE4MASK(%rip), %ymm0, %ymm0"));
        assert!(fwd.contains("tzcntl"));

        let back = Instr::MemScan { stride: -2 }.render_text().unwrap();
        assert!(back.contains("vpand\t.STRIDE2MASKNEG(%rip), %ymm0, %ymm0"));
        assert!(back.contains("lzcntl"));

        let unit = Instr::MemScan { stride: 1 }.render_text().unwrap();
        assert!(!unit.contains("vpand"));
    }
}
