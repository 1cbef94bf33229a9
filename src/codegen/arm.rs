use std::collections::HashMap;
use std::fmt;

use strum::Display;

use crate::rtl::{
    kind::Kind,
    record::{self, Record},
    sexp::Expr,
};

use super::frame::{RegisterMap, Scratch, ScratchPool};

/// Marker on every diagnostic line emitted when no signature matches.
/// Code generation continues past it.
pub const UNSUPPORTED: &str = "@ unsupported";

/// Canonical shape of a lowered operand. Selection matches these shapes
/// structurally; the rendered text (`[fp, #-8]`, `mem[105, #-8]`, `#4`)
/// only appears in diagnostics and home-table keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// virtual register homed at a stack slot
    Slot(i64),
    /// hard register named by a `reg/i` operand
    Hard(String),
    /// register with no stack home, the frame pointer vreg mostly
    Bare(String),
    /// memory location, keyed by the same synthesized name liveness uses
    Mem(String),
    Const(i64),
    Plus(Box<Operand>, Box<Operand>),
    Compare(Box<Operand>, Box<Operand>),
    LessEqual(Box<Operand>, Box<Operand>),
    Condition(String),
    /// label reference carrying the target record id
    Label(i64),
    Pc,
    IfThenElse(Box<Operand>, Box<Operand>, Box<Operand>),
    Opaque(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Slot(offset) => write!(f, "[fp, #{}]", offset),
            Operand::Hard(reg) => write!(f, "{}", reg),
            Operand::Bare(name) => write!(f, "{}", name),
            Operand::Mem(name) => write!(f, "{}", name),
            Operand::Const(value) => write!(f, "#{}", value),
            Operand::Plus(a, b) => write!(f, "{}, {}", a, b),
            Operand::Compare(a, b) => write!(f, "COMPARE {}, {}", a, b),
            Operand::LessEqual(a, b) => write!(f, "le {}, {}", a, b),
            Operand::Condition(name) => write!(f, "CC {}", name),
            Operand::Label(id) => write!(f, "label_ref {}", id),
            Operand::Pc => write!(f, "PC"),
            Operand::IfThenElse(test, then, otherwise) => {
                write!(f, "if {} then {} else {}", test, then, otherwise)
            }
            Operand::Opaque(text) => write!(f, "{}", text),
        }
    }
}

/// Lowers one operand expression to its canonical shape. A plain register
/// resolves through the stack homes; everything unresolvable turns opaque
/// and falls to the diagnostic path at selection time.
pub fn lower(expr: &Expr, regs: &RegisterMap) -> Operand {
    match expr.kind() {
        Kind::Register => match expr.token(1) {
            Some(name) => match regs.lookup(name) {
                Some(offset) => Operand::Slot(offset),
                None => Operand::Bare(name.to_string()),
            },
            None => Operand::Opaque(expr.render()),
        },
        Kind::ImmutableRegister => match expr.token(1) {
            Some(name) => Operand::Hard(format!("r{}", name)),
            None => Operand::Opaque(expr.render()),
        },
        Kind::FloatRegister => match expr.token(1) {
            Some(name) => Operand::Bare(name.to_string()),
            None => Operand::Opaque(expr.render()),
        },
        Kind::ConditionRegister => match expr.token(1) {
            Some(name) => Operand::Condition(name.to_string()),
            None => Operand::Opaque(expr.render()),
        },
        Kind::Memory => Operand::Mem(record::memory_entity(expr)),
        Kind::ConstInt => match expr.token(1).and_then(|t| t.parse().ok()) {
            Some(value) => Operand::Const(value),
            None => Operand::Opaque(expr.render()),
        },
        Kind::Plus => match (expr.nth_expr(0), expr.nth_expr(1)) {
            (Some(a), Some(b)) => {
                Operand::Plus(Box::new(lower(a, regs)), Box::new(lower(b, regs)))
            }
            _ => Operand::Opaque(expr.render()),
        },
        Kind::Compare => match (expr.nth_expr(0), expr.nth_expr(1)) {
            (Some(a), Some(b)) => {
                Operand::Compare(Box::new(lower(a, regs)), Box::new(lower(b, regs)))
            }
            _ => Operand::Opaque(expr.render()),
        },
        Kind::LessEqual => match (expr.nth_expr(0), expr.nth_expr(1)) {
            (Some(a), Some(b)) => {
                Operand::LessEqual(Box::new(lower(a, regs)), Box::new(lower(b, regs)))
            }
            _ => Operand::Opaque(expr.render()),
        },
        Kind::LabelRef => match expr.token(1).and_then(|t| t.parse().ok()) {
            Some(id) => Operand::Label(id),
            None => Operand::Opaque(expr.render()),
        },
        Kind::ProgramCounter => Operand::Pc,
        Kind::IfThenElse => match (expr.nth_expr(0), expr.nth_expr(1), expr.nth_expr(2)) {
            (Some(test), Some(then), Some(otherwise)) => Operand::IfThenElse(
                Box::new(lower(test, regs)),
                Box::new(lower(then, regs)),
                Box::new(lower(otherwise, regs)),
            ),
            _ => Operand::Opaque(expr.render()),
        },
        _ => Operand::Opaque(expr.render()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Signature {
    SetRegisterFromConstant,
    SetMemoryFromRegister,
    SetRegisterFromMemory,
    AddRegisterRegister,
    CompareAgainstConstant,
    ConditionalBranch,
    UnconditionalBranchToLabel,
    ReturnValue,
}

/// The signature table. Arms are checked top to bottom and the first match
/// wins; operand shapes overlap, so the order here is part of the contract.
pub fn classify(dst: &Operand, src: &Operand) -> Option<Signature> {
    use Operand::*;

    match (dst, src) {
        (Slot(_), Const(_)) => Some(Signature::SetRegisterFromConstant),
        (Mem(_), Slot(_)) => Some(Signature::SetMemoryFromRegister),
        (Slot(_), Mem(_)) => Some(Signature::SetRegisterFromMemory),
        (Slot(_), Plus(a, b))
            if matches!(**a, Slot(_)) && matches!(**b, Slot(_) | Const(_)) =>
        {
            Some(Signature::AddRegisterRegister)
        }
        (Condition(_), Compare(a, b))
            if matches!(**a, Slot(_)) && matches!(**b, Const(_)) =>
        {
            Some(Signature::CompareAgainstConstant)
        }
        (Pc, IfThenElse(test, then, otherwise))
            if matches!(**test, LessEqual(..))
                && matches!(**then, Label(_))
                && matches!(**otherwise, Pc) =>
        {
            Some(Signature::ConditionalBranch)
        }
        (Pc, Label(_)) => Some(Signature::UnconditionalBranchToLabel),
        (Hard(_), Slot(_) | Const(_)) => Some(Signature::ReturnValue),
        _ => None,
    }
}

/// Per-function instruction selector. Holds the home table (rendered
/// memory name to the slot its value last came to rest in) and the scratch
/// window (destination slot to the machine register still carrying it,
/// cleared at block boundaries and at calls).
pub struct Selector<'a> {
    regs: &'a RegisterMap,
    index: &'a HashMap<i64, i64>,
    pool: &'a ScratchPool,
    homes: HashMap<String, i64>,
    window: HashMap<i64, Scratch<'a>>,
}

impl<'a> Selector<'a> {
    pub fn new(
        regs: &'a RegisterMap,
        index: &'a HashMap<i64, i64>,
        pool: &'a ScratchPool,
    ) -> Selector<'a> {
        Selector {
            regs,
            index,
            pool,
            homes: HashMap::new(),
            window: HashMap::new(),
        }
    }

    /// Lowers one record to assembly lines. An unsupported shape produces a
    /// single diagnostic line, never a failure.
    pub fn select(&mut self, record: &Record) -> Vec<String> {
        match record.kind() {
            Kind::Note | Kind::CodeLabel | Kind::Barrier => Vec::new(),
            Kind::CallInsn => self.select_call(record),
            Kind::PlainInsn | Kind::JumpInsn => self.select_insn(record),
            _ => Vec::new(),
        }
    }

    /// Window bindings do not survive the block.
    pub fn end_block(&mut self) {
        self.window.clear();
    }

    fn select_insn(&mut self, record: &Record) -> Vec<String> {
        let Some(body) = record.body() else {
            return Vec::new();
        };
        match body.kind() {
            Kind::Use => Vec::new(),
            Kind::Set => {
                let (Some(dst), Some(src)) = (body.nth_expr(0), body.nth_expr(1)) else {
                    log::warn!("insn {}: set with a missing operand", record.id());
                    return vec![format!("\t{}: insn {}", UNSUPPORTED, record.id())];
                };
                let dst = lower(dst, self.regs);
                let src = lower(src, self.regs);
                match classify(&dst, &src) {
                    Some(sig) => {
                        log::trace!("insn {}: {}", record.id(), sig);
                        self.expand(sig, &dst, &src)
                            .unwrap_or_else(|| vec![placeholder(&dst, &src)])
                    }
                    None => vec![placeholder(&dst, &src)],
                }
            }
            _ => vec![format!(
                "\t{}: insn {} ({})",
                UNSUPPORTED,
                record.id(),
                body.kind()
            )],
        }
    }

    fn select_call(&mut self, record: &Record) -> Vec<String> {
        // a call clobbers the scratch window
        self.window.clear();
        match call_symbol(record.expr()) {
            Some(name) => vec![format!("\tbl {}", name)],
            None => vec![format!(
                "\t{}: call {} names no symbol",
                UNSUPPORTED,
                record.id()
            )],
        }
    }

    /// Template expansion for one matched signature. `None` means the match
    /// could not be completed (no home, pool dry) and the caller emits the
    /// diagnostic line instead.
    fn expand(&mut self, sig: Signature, dst: &Operand, src: &Operand) -> Option<Vec<String>> {
        use Operand::*;

        let mut lines = Vec::new();
        let mut held: Vec<Scratch<'a>> = Vec::new();

        match (sig, dst, src) {
            (Signature::SetRegisterFromConstant, Slot(offset), Const(value)) => {
                let scratch = self.pool.acquire()?;
                lines.push(format!("\tmov {}, #{}", scratch, value));
                lines.push(format!("\tstr {}, [fp, #{}]", scratch, offset));
            }
            (Signature::SetMemoryFromRegister, Mem(name), Slot(offset)) => {
                // no code; the value already rests in the source slot
                log::debug!("{} homed at [fp, #{}]", name, offset);
                self.homes.insert(name.clone(), *offset);
            }
            (Signature::SetRegisterFromMemory, Slot(offset), Mem(name)) => {
                let home = *self.homes.get(name)?;
                let scratch = self.pool.acquire()?;
                lines.push(format!("\tldr {}, [fp, #{}]", scratch, home));
                lines.push(format!("\tstr {}, [fp, #{}]", scratch, offset));
                // the loaded value stays bound for a following add
                self.window.insert(*offset, scratch);
            }
            (Signature::AddRegisterRegister, Slot(offset), Plus(lhs, rhs)) => {
                let lhs = self.operand_register(lhs, &mut held, &mut lines)?;
                let rhs = match rhs.as_ref() {
                    Const(value) => format!("#{}", value),
                    other => self.operand_register(other, &mut held, &mut lines)?,
                };
                let dest = self.pool.acquire()?;
                lines.push(format!("\tadd {}, {}, {}", dest, lhs, rhs));
                lines.push(format!("\tstr {}, [fp, #{}]", dest, offset));
            }
            (Signature::CompareAgainstConstant, Condition(_), Compare(lhs, rhs)) => {
                let (Slot(offset), Const(value)) = (lhs.as_ref(), rhs.as_ref()) else {
                    return None;
                };
                let scratch = self.pool.acquire()?;
                lines.push(format!("\tldr {}, [fp, #{}]", scratch, offset));
                lines.push(format!("\tcmp {}, #{}", scratch, value));
            }
            (Signature::ConditionalBranch, Pc, IfThenElse(_, then, _)) => {
                let Label(target) = then.as_ref() else {
                    return None;
                };
                let block = self.label_block(*target)?;
                lines.push(format!("\tble BB_{}", block));
            }
            (Signature::UnconditionalBranchToLabel, Pc, Label(target)) => {
                let block = self.label_block(*target)?;
                lines.push(format!("\tb BB_{}", block));
            }
            (Signature::ReturnValue, Hard(reg), Slot(offset)) => {
                lines.push(format!("\tldr {}, [fp, #{}]", reg, offset));
            }
            (Signature::ReturnValue, Hard(reg), Const(value)) => {
                lines.push(format!("\tmov {}, #{}", reg, value));
            }
            _ => return None,
        }

        drop(held);
        Some(lines)
    }

    /// Puts a slot operand into a machine register: reuses the window
    /// binding when one is live, otherwise loads into a fresh scratch.
    /// Either way the register is consumed by this expansion.
    fn operand_register(
        &mut self,
        operand: &Operand,
        held: &mut Vec<Scratch<'a>>,
        lines: &mut Vec<String>,
    ) -> Option<String> {
        let Operand::Slot(offset) = operand else {
            return None;
        };
        if let Some(bound) = self.window.remove(offset) {
            let name = bound.name().to_string();
            held.push(bound);
            return Some(name);
        }
        let scratch = self.pool.acquire()?;
        lines.push(format!("\tldr {}, [fp, #{}]", scratch, offset));
        let name = scratch.name().to_string();
        held.push(scratch);
        Some(name)
    }

    fn label_block(&self, target: i64) -> Option<i64> {
        self.index.get(&target).copied().filter(|&block| block > 0)
    }
}

fn placeholder(dst: &Operand, src: &Operand) -> String {
    log::warn!("no selection signature for {} <- {}", dst, src);
    format!("\t{}: {} <- {}", UNSUPPORTED, dst, src)
}

/// First symbol reference in a call body, with the quoting and injected
/// escapes stripped.
fn call_symbol(expr: &Expr) -> Option<String> {
    if expr.kind() == Kind::SymbolRef {
        let raw = expr
            .token(1)
            .or_else(|| expr.nth_expr(0).and_then(|e| e.token(0)))?;
        return Some(raw.chars().filter(|c| *c != '\\' && *c != '"').collect());
    }
    for child in expr.exprs() {
        if let Some(name) = call_symbol(child) {
            return Some(name);
        }
    }
    None
}
