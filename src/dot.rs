use std::io::{self, Write};

use itertools::Itertools;

use crate::cfg::{Cfg, Successor};

/// Graphviz rendering of the block graph. A pure consumer of the core's
/// read-only surface: block ids, successor sets, and the recursive record
/// renderer (whose escaping of `"`, `<`, `>` keeps these labels valid).
pub fn write_dot<W: Write>(cfg: &Cfg, name: &str, out: &mut W) -> io::Result<()> {
    writeln!(out, "digraph \"{}\" {{", name)?;
    writeln!(out, "overlap=false;")?;
    writeln!(out, "subgraph \"cluster_{}\" {{", name)?;
    writeln!(out, "    label=\"{} ()\";", name)?;
    writeln!(out, "    bb_0 [shape=Mdiamond,label=\"ENTRY\"];")?;
    writeln!(out, "    bb_1 [shape=Mdiamond,label=\"EXIT\"];")?;

    for block in cfg.blocks() {
        let label = block
            .records()
            .iter()
            .map(|record| format!("{}: {}\\l", record.id(), record.expr().render()))
            .join("|");
        writeln!(
            out,
            "    bb_{} [shape=record, label=\"{{{}}}\"];",
            block.num(),
            label
        )?;
    }

    writeln!(out, "    bb_0 -> bb_2;")?;
    for block in cfg.blocks() {
        for succ in block.successors().iter().sorted() {
            let target = match succ {
                Successor::Block(num) => *num,
                Successor::Exit => 1,
            };
            writeln!(out, "    bb_{} -> bb_{};", block.num(), target)?;
        }
    }

    writeln!(out, "}}")?;
    writeln!(out, "}}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtl::record::Record;

    #[test]
    fn entry_exit_and_edges_are_present() {
        let records = [
            r#"(insn 5 4 6 2 (set (reg:SI 110) (const_int 1)) "t.c":2 -1 (nil))"#,
            r#"(jump_insn 6 5 12 2 (set (pc) (label_ref 12)) "t.c":3 -1 (nil) -> 12)"#,
            r#"(code_label 12 6 13 3 4 "" [1 uses])"#,
            r#"(insn 13 12 0 3 (set (reg:SI 111) (const_int 2)) "t.c":4 -1 (nil))"#,
        ]
        .map(|t| Record::parse(t).unwrap());
        let cfg = Cfg::build(records.to_vec());

        let mut out = Vec::new();
        write_dot(&cfg, "main", &mut out).unwrap();
        let dot = String::from_utf8(out).unwrap();

        assert!(dot.contains("bb_0 [shape=Mdiamond,label=\"ENTRY\"];"));
        assert!(dot.contains("bb_1 [shape=Mdiamond,label=\"EXIT\"];"));
        assert!(dot.contains("bb_0 -> bb_2;"));
        assert!(dot.contains("bb_2 -> bb_3;"));
        assert!(dot.contains("bb_3 -> bb_1;"));
        // escaped source location survives into the record label
        assert!(dot.contains("\\\"t.c\\\":2"));
    }
}
