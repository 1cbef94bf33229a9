use std::io::{self, Write};

use crate::cfg::{Cfg, Successor};
use crate::rtl::kind::Kind;

use super::{
    arm::Selector,
    frame::{RegisterMap, ScratchPool},
};

/// First real block in an expand dump; ids 0 and 1 are the conventional
/// ENTRY and EXIT markers and never carry records.
pub const ENTRY_BLOCK: usize = 2;

/// Writes the whole listing: preamble, prologue, every block reachable
/// from the entry, epilogue. Blocks are visited depth-first with a block's
/// jump target emitted before its fallthrough, as an explicit worklist
/// over block ids.
pub fn write_function<W: Write>(cfg: &Cfg, regs: &RegisterMap, out: &mut W) -> io::Result<()> {
    writeln!(out, "\t.arch armv6")?;
    writeln!(out, "\t.text")?;
    writeln!(out, "\t.global main")?;
    writeln!(out, "main:")?;
    writeln!(out, "\tpush {{fp, lr}}")?;
    writeln!(out, "\tmov fp, sp")?;
    writeln!(out, "\tsub sp, sp, #{}", regs.frame_size())?;

    let pool = ScratchPool::new();
    let mut selector = Selector::new(regs, cfg.index(), &pool);
    let mut visited = vec![false; cfg.block_count()];
    let mut worklist = vec![ENTRY_BLOCK];

    while let Some(num) = worklist.pop() {
        if num == 0 || num >= visited.len() || visited[num] {
            continue;
        }
        visited[num] = true;

        let Some(block) = cfg.block(num) else {
            // structurally present but empty: a no-op that falls through
            worklist.push(num + 1);
            continue;
        };

        writeln!(out, "BB_{}:", num)?;
        for record in block.records() {
            for line in selector.select(record) {
                writeln!(out, "{}", line)?;
            }
        }

        // a block that does not end in a jump branches to its fallthrough
        // explicitly, since the next emitted block is usually not adjacent
        let ends_in_jump = block.records().last().map(|r| r.kind()) == Some(Kind::JumpInsn);
        if !ends_in_jump {
            if let Successor::Block(next) = block.fall_to() {
                writeln!(out, "\tb BB_{}", next)?;
            }
        }
        selector.end_block();

        // the jump target lands on top of the stack and is emitted first
        if let Successor::Block(next) = block.fall_to() {
            worklist.push(next);
        }
        if let Some(target) = block.jump_to() {
            worklist.push(target);
        }
    }

    writeln!(out, "\tmov sp, fp")?;
    writeln!(out, "\tpop {{fp, pc}}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtl::record::Record;

    fn emit(texts: &[&str]) -> String {
        let records: Vec<Record> = texts.iter().map(|t| Record::parse(t).unwrap()).collect();
        let regs = RegisterMap::discover(&records);
        let cfg = Cfg::build(records);
        let mut out = Vec::new();
        write_function(&cfg, &regs, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn frame_reservation_matches_the_slot_count() {
        let asm = emit(&[
            r#"(insn 5 4 6 2 (set (reg:SI 110) (const_int 1)) "t.c":2 -1 (nil))"#,
            r#"(insn 6 5 0 2 (set (reg:SI 111) (const_int 2)) "t.c":3 -1 (nil))"#,
        ]);
        assert!(asm.contains("\tsub sp, sp, #8\n"));
        assert!(asm.starts_with("\t.arch armv6\n\t.text\n\t.global main\nmain:\n"));
        assert!(asm.ends_with("\tmov sp, fp\n\tpop {fp, pc}\n"));
    }

    #[test]
    fn jump_target_is_emitted_before_the_fallthrough() {
        let asm = emit(&[
            r#"(jump_insn 10 9 12 2 (set (pc) (label_ref 20)) "t.c":2 -1 (nil) -> 20)"#,
            r#"(code_label 12 10 13 3 4 "" [1 uses])"#,
            r#"(insn 13 12 20 3 (set (reg:SI 110) (const_int 1)) "t.c":3 -1 (nil))"#,
            r#"(code_label 20 13 21 4 5 "" [1 uses])"#,
            r#"(insn 21 20 0 4 (set (reg:SI 111) (const_int 2)) "t.c":4 -1 (nil))"#,
        ]);

        let bb4 = asm.find("BB_4:").unwrap();
        let bb3 = asm.find("BB_3:").unwrap();
        assert!(bb4 < bb3);
        assert!(asm.contains("\tb BB_4\n"));
    }

    #[test]
    fn fallthrough_block_gets_a_synthesized_branch() {
        let asm = emit(&[
            r#"(insn 5 4 12 2 (set (reg:SI 110) (const_int 1)) "t.c":2 -1 (nil))"#,
            r#"(code_label 12 5 13 3 4 "" [1 uses])"#,
            r#"(insn 13 12 0 3 (set (reg:SI 111) (const_int 2)) "t.c":3 -1 (nil))"#,
        ]);
        // block 2 falls into block 3 and says so
        assert!(asm.contains("\tb BB_3\nBB_3:\n"));
    }

    #[test]
    fn absent_indices_fall_through_to_the_next_block() {
        let asm = emit(&[
            r#"(insn 13 12 0 4 (set (reg:SI 111) (const_int 2)) "t.c":3 -1 (nil))"#,
        ]);
        // blocks 2 and 3 are empty, emission lands on 4
        assert!(asm.contains("BB_4:\n"));
        assert!(!asm.contains("BB_2:"));
        assert!(!asm.contains("BB_3:"));
    }
}
