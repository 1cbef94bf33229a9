pub mod liveness;

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::rtl::{kind::Kind, record::Record};

use self::liveness::LiveSet;

/// Where control can go after a block: another block, or off the end of
/// the function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Successor {
    Block(usize),
    Exit,
}

impl fmt::Display for Successor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Successor::Block(n) => write!(f, "{}", n),
            Successor::Exit => write!(f, "EXIT"),
        }
    }
}

/// A maximal straight-line run of records sharing one declared block id.
/// Immutable after construction apart from the derived successor set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    num: usize,
    records: Vec<Record>,
    successors: HashSet<Successor>,
    jump_to: Option<usize>,
    fall_to: Successor,
}

impl BasicBlock {
    fn new(num: usize, records: Vec<Record>, index: &HashMap<i64, i64>) -> BasicBlock {
        let last = records.last().expect("a block holds at least one record");

        let jump_to = (last.kind() == Kind::JumpInsn)
            .then(|| {
                last.jump_target()?
                    .parse::<i64>()
                    .ok()
                    .and_then(|id| index.get(&id))
                    .map(|&block| block as usize)
            })
            .flatten();

        let fall_to = match index.get(&last.next_id()) {
            Some(&block) if last.next_id() > 0 && block > 0 => Successor::Block(block as usize),
            _ => Successor::Exit,
        };

        let mut successors = HashSet::new();
        if let Some(block) = jump_to {
            successors.insert(Successor::Block(block));
        }
        successors.insert(fall_to);

        BasicBlock {
            num,
            records,
            successors,
            jump_to,
            fall_to,
        }
    }

    pub fn num(&self) -> usize {
        self.num
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn successors(&self) -> &HashSet<Successor> {
        &self.successors
    }

    /// Taken edge of a block ending in a jump, when its target resolves.
    pub fn jump_to(&self) -> Option<usize> {
        self.jump_to
    }

    /// Not-taken edge: the block holding the next record id, or EXIT.
    pub fn fall_to(&self) -> Successor {
        self.fall_to
    }
}

/// The per-function block graph. Index equals declared block id; absent
/// indices are blocks that exist structurally but carry no records. The
/// live sets are derived state owned by the graph and filled in by the
/// liveness pass.
#[derive(Debug)]
pub struct Cfg {
    blocks: Vec<Option<BasicBlock>>,
    index: HashMap<i64, i64>,
    live_in: Vec<LiveSet>,
    live_out: Vec<LiveSet>,
}

impl Cfg {
    /// Groups the record stream by declared block id and derives each
    /// block's successor set. Records with an unknown block id are
    /// excluded here.
    pub fn build(records: Vec<Record>) -> Cfg {
        let mut grouped: Vec<Vec<Record>> = Vec::new();
        let mut index = HashMap::new();

        for record in records {
            if record.block_id() < 0 {
                log::debug!("record {} excluded from the block graph", record.id());
                continue;
            }
            let block = record.block_id() as usize;
            if grouped.len() <= block {
                grouped.resize_with(block + 1, Vec::new);
            }
            index.insert(record.id(), record.block_id());
            grouped[block].push(record);
        }

        let blocks: Vec<Option<BasicBlock>> = grouped
            .into_iter()
            .enumerate()
            .map(|(num, records)| {
                if records.is_empty() {
                    None
                } else {
                    Some(BasicBlock::new(num, records, &index))
                }
            })
            .collect();

        let live_in = vec![LiveSet::new(); blocks.len()];
        let live_out = vec![LiveSet::new(); blocks.len()];

        Cfg {
            blocks,
            index,
            live_in,
            live_out,
        }
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, num: usize) -> Option<&BasicBlock> {
        self.blocks.get(num).and_then(Option::as_ref)
    }

    /// Blocks that carry records, in increasing id order.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter().flatten()
    }

    /// Record id to block id, for jump-target and fallthrough resolution.
    pub fn index(&self) -> &HashMap<i64, i64> {
        &self.index
    }

    pub fn live_in(&self, num: usize) -> &LiveSet {
        &self.live_in[num]
    }

    pub fn live_out(&self, num: usize) -> &LiveSet {
        &self.live_out[num]
    }
}
