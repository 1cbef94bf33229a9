use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;

use crate::rtl::{kind::Kind, record::Record};

pub const WORD: i64 = 4;

/// Machine registers handed out for the duration of a template expansion.
pub const SCRATCH_REGS: [&str; 4] = ["r2", "r3", "r4", "r5"];

/// Home of every virtual register: a slot below the frame pointer,
/// assigned at the register's first appearance as a definition target and
/// never moved afterwards. The slot count fixes the frame size.
#[derive(Debug, Default)]
pub struct RegisterMap {
    slots: HashMap<String, i64>,
    count: usize,
}

impl RegisterMap {
    /// Forward scan of the record stream, before any code is emitted, so
    /// that a use can be resolved even when its defining store appears
    /// later in the text.
    pub fn discover(records: &[Record]) -> RegisterMap {
        let mut map = RegisterMap::default();
        for record in records {
            let Some(body) = record.body() else {
                continue;
            };
            if body.kind() != Kind::Set {
                continue;
            }
            let Some(dst) = body.nth_expr(0) else {
                continue;
            };
            if dst.kind() == Kind::Register {
                if let Some(name) = dst.token(1) {
                    map.assign(name);
                }
            }
        }
        map
    }

    pub fn assign(&mut self, reg: &str) -> i64 {
        if let Some(&offset) = self.slots.get(reg) {
            return offset;
        }
        self.count += 1;
        let offset = -WORD * self.count as i64;
        self.slots.insert(reg.to_string(), offset);
        log::trace!("vreg {} homed at [fp, #{}]", reg, offset);
        offset
    }

    pub fn lookup(&self, reg: &str) -> Option<i64> {
        self.slots.get(reg).copied()
    }

    pub fn slot_count(&self) -> usize {
        self.count
    }

    pub fn frame_size(&self) -> i64 {
        WORD * self.count as i64
    }
}

/// Scratch-register allocator. Acquisition hands back a guard that frees
/// the register when dropped, so every exit path releases.
#[derive(Debug, Default)]
pub struct ScratchPool {
    taken: [Cell<bool>; SCRATCH_REGS.len()],
}

impl ScratchPool {
    pub fn new() -> ScratchPool {
        ScratchPool::default()
    }

    pub fn acquire(&self) -> Option<Scratch<'_>> {
        for (index, taken) in self.taken.iter().enumerate() {
            if !taken.get() {
                taken.set(true);
                return Some(Scratch { pool: self, index });
            }
        }
        None
    }
}

#[derive(Debug)]
pub struct Scratch<'a> {
    pool: &'a ScratchPool,
    index: usize,
}

impl Scratch<'_> {
    pub fn name(&self) -> &'static str {
        SCRATCH_REGS[self.index]
    }
}

impl fmt::Display for Scratch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Drop for Scratch<'_> {
    fn drop(&mut self) {
        self.pool.taken[self.index].set(false);
    }
}
