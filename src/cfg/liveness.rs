use std::collections::HashSet;

use thiserror::Error;

use crate::rtl::kind::Kind;

use super::{BasicBlock, Cfg, Successor};

pub type LiveSet = HashSet<String>;

// the finite register universe converges in far fewer passes; this only
// catches bookkeeping bugs
const PASS_LIMIT: usize = 1000;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LivenessError {
    #[error(
        "live set bookkeeping out of sync: {blocks} blocks, {live_in} live-in sets, {live_out} live-out sets"
    )]
    SetMismatch {
        blocks: usize,
        live_in: usize,
        live_out: usize,
    },

    #[error("liveness did not converge after {0} passes")]
    Diverged(usize),
}

/// Backward fixed point over the block graph: per block,
/// out = union of successor ins (EXIT contributes nothing) and
/// in = uses + (out - defs), applied record by record in reverse.
/// Always runs at least one full pass; stops once no block's live-in
/// changes.
pub fn analyze(cfg: &mut Cfg) -> Result<(), LivenessError> {
    let Cfg {
        blocks,
        live_in,
        live_out,
        ..
    } = cfg;

    for pass in 1.. {
        if pass > PASS_LIMIT {
            return Err(LivenessError::Diverged(PASS_LIMIT));
        }
        if live_in.len() != blocks.len() || live_out.len() != blocks.len() {
            return Err(LivenessError::SetMismatch {
                blocks: blocks.len(),
                live_in: live_in.len(),
                live_out: live_out.len(),
            });
        }

        let mut changed = false;
        for num in 0..blocks.len() {
            let Some(block) = blocks[num].as_ref() else {
                continue;
            };
            let new_out = successor_union(block, live_in);
            let new_in = transfer(block, new_out.clone());

            changed |= new_in != live_in[num];
            live_out[num] = new_out;
            live_in[num] = new_in;
        }

        log::debug!("liveness pass {}: changed={}", pass, changed);
        if !changed {
            break;
        }
    }

    Ok(())
}

fn successor_union(block: &BasicBlock, live_in: &[LiveSet]) -> LiveSet {
    let mut out = LiveSet::new();
    for succ in block.successors() {
        if let Successor::Block(s) = succ {
            if let Some(set) = live_in.get(*s) {
                out.extend(set.iter().cloned());
            }
        }
    }
    out
}

/// Walks the block's records last to first, removing definitions and adding
/// uses. A NOTE record, or a record whose operation is a USE, marks the
/// start of the block's meaningful body and stops the walk.
fn transfer(block: &BasicBlock, mut live: LiveSet) -> LiveSet {
    for record in block.records().iter().rev() {
        if record.kind() == Kind::Note {
            break;
        }
        if record.body().map(|body| body.kind()) == Some(Kind::Use) {
            break;
        }

        for def in record.defs() {
            live.remove(&def);
        }
        live.extend(record.uses());
    }
    live
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtl::record::Record;

    fn cfg_of(texts: &[&str]) -> Cfg {
        let records = texts
            .iter()
            .map(|t| Record::parse(t).unwrap())
            .collect::<Vec<_>>();
        Cfg::build(records)
    }

    fn names(items: &[&str]) -> LiveSet {
        items.iter().map(|s| s.to_string()).collect()
    }

    //     block 2: 201 <- 7; goto L20
    //     block 5: L20: 200 <- 1; 202 <- 200 + 201
    fn jump_pair() -> Cfg {
        cfg_of(&[
            r#"(insn 10 9 11 2 (set (reg:SI 201) (const_int 7)) "t.c":1 -1 (nil))"#,
            r#"(jump_insn 11 10 12 2 (set (pc) (label_ref 20)) "t.c":2 -1 (nil) -> 20)"#,
            r#"(code_label 20 11 21 5 3 "" [1 uses])"#,
            r#"(insn 21 20 22 5 (set (reg:SI 200) (const_int 1)) "t.c":4 -1 (nil))"#,
            r#"(insn 22 21 0 5 (set (reg:SI 202) (plus:SI (reg:SI 200) (reg:SI 201))) "t.c":5 -1 (nil))"#,
        ])
    }

    #[test]
    fn live_out_is_the_union_of_successor_ins() {
        let mut cfg = jump_pair();
        analyze(&mut cfg).unwrap();

        assert_eq!(cfg.live_in(5), &names(&["201"]));
        assert_eq!(cfg.live_out(2), cfg.live_in(5));
        // 200 is defined in block 5 and never needed by block 2
        assert!(!cfg.live_out(2).contains("200"));
        assert!(cfg.live_in(2).is_empty());
        assert!(cfg.live_out(5).is_empty());
    }

    #[test]
    fn analysis_is_idempotent() {
        let mut cfg = jump_pair();
        analyze(&mut cfg).unwrap();
        let ins = cfg.live_in.clone();
        let outs = cfg.live_out.clone();

        analyze(&mut cfg).unwrap();
        assert_eq!(cfg.live_in, ins);
        assert_eq!(cfg.live_out, outs);
    }

    #[test]
    fn walk_stops_at_a_use_record() {
        let mut cfg = cfg_of(&[
            r#"(insn 17 16 18 4 (set (reg:SI 115) (const_int 3)) "t.c":1 -1 (nil))"#,
            r#"(insn 18 17 19 4 (set (reg/i:SI 0) (reg:SI 115)) "t.c":2 -1 (nil))"#,
            r#"(insn 19 18 0 4 (use (reg/i:SI 0)) "t.c":2 -1 (nil))"#,
        ]);
        analyze(&mut cfg).unwrap();

        // the trailing USE cuts the walk short of every other record
        assert!(cfg.live_in(4).is_empty());
        assert!(cfg.live_out(4).is_empty());
    }

    #[test]
    fn self_loop_reaches_a_fixed_point() {
        let mut cfg = cfg_of(&[
            r#"(code_label 7 0 8 3 2 "" [1 uses])"#,
            r#"(insn 8 7 9 3 (set (reg:SI 112) (plus:SI (reg:SI 112) (reg:SI 113))) "t.c":1 -1 (nil))"#,
            r#"(jump_insn 9 8 0 3 (set (pc) (if_then_else (le (reg:CC 100) (const_int 0)) (label_ref 7) (pc))) "t.c":2 -1 (nil) -> 7)"#,
        ]);
        analyze(&mut cfg).unwrap();

        assert_eq!(cfg.live_in(3), &names(&["112", "113", "100"]));
        assert_eq!(cfg.live_out(3), &names(&["112", "113", "100"]));
    }

    #[test]
    fn mismatched_bookkeeping_is_fatal() {
        let mut cfg = jump_pair();
        cfg.live_in.pop();
        assert!(matches!(
            analyze(&mut cfg),
            Err(LivenessError::SetMismatch { .. })
        ));
    }
}
