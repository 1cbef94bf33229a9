use std::collections::HashSet;

use super::{
    kind::Kind,
    sexp::{self, Expr, Item, ParseError},
};

/// Sentinel block id for records whose positional fields did not parse.
/// Such records are kept out of the block graph but do not abort the run.
pub const UNKNOWN_BLOCK: i64 = -1;

/// One top-level instruction record: the classified expression tree plus
/// the pre-numbered stream metadata from token positions 1 through 4.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    expr: Expr,
    id: i64,
    prev_id: i64,
    next_id: i64,
    block_id: i64,
}

impl Record {
    pub fn parse(text: &str) -> Result<Record, ParseError> {
        let mut expr = sexp::parse(text)?;
        expr.classify();
        Ok(Record::from_expr(expr))
    }

    fn from_expr(expr: Expr) -> Record {
        let ids = expr.kind().is_record().then(|| ids_of(&expr)).flatten();
        match ids {
            Some([id, prev_id, next_id, block_id]) => Record {
                expr,
                id,
                prev_id,
                next_id,
                block_id,
            },
            None => Record {
                expr,
                id: 0,
                prev_id: 0,
                next_id: 0,
                block_id: UNKNOWN_BLOCK,
            },
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn prev_id(&self) -> i64 {
        self.prev_id
    }

    pub fn next_id(&self) -> i64 {
        self.next_id
    }

    pub fn block_id(&self) -> i64 {
        self.block_id
    }

    pub fn kind(&self) -> Kind {
        self.expr.kind()
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// The nested operation expression, at item position 5 of the record.
    pub fn body(&self) -> Option<&Expr> {
        match self.expr.items().get(5) {
            Some(Item::Expr(e)) => Some(e),
            _ => None,
        }
    }

    /// Jump records carry their target appended as the final literal token.
    pub fn jump_target(&self) -> Option<&str> {
        self.expr.last_token()
    }

    /// Virtual registers written by this record: the destination operand of
    /// its SET, nothing otherwise.
    pub fn defs(&self) -> HashSet<String> {
        let mut out = HashSet::new();
        if let Some(body) = self.body() {
            if body.kind() == Kind::Set {
                if let Some(dst) = body.nth_expr(0) {
                    operand_registers(dst, &mut out);
                }
            }
        }
        out
    }

    /// Virtual registers read by this record: the source operand of its SET.
    pub fn uses(&self) -> HashSet<String> {
        let mut out = HashSet::new();
        if let Some(body) = self.body() {
            if body.kind() == Kind::Set {
                if let Some(src) = body.nth_expr(1) {
                    operand_registers(src, &mut out);
                }
            }
        }
        out
    }
}

fn operand_registers(expr: &Expr, out: &mut HashSet<String>) {
    match expr.kind() {
        Kind::Register | Kind::FloatRegister | Kind::ImmutableRegister | Kind::ConditionRegister => {
            if let Some(name) = expr.token(1) {
                out.insert(name.to_string());
            }
        }
        // distinct memory locations are tracked as distinct entities
        Kind::Memory => {
            out.insert(memory_entity(expr));
        }
        Kind::Plus | Kind::Compare | Kind::LessEqual | Kind::IfThenElse => {
            for child in expr.exprs() {
                operand_registers(child, out);
            }
        }
        _ => {}
    }
}

/// Synthesized liveness name for a memory operand, keyed on its base
/// register and constant offset.
pub fn memory_entity(mem: &Expr) -> String {
    let Some(inner) = mem.nth_expr(0) else {
        return format!("mem[{}]", mem.render());
    };

    if inner.kind() == Kind::Plus {
        let base = inner
            .nth_expr(0)
            .filter(|e| e.kind().is_register())
            .and_then(|e| e.token(1));
        let offset = inner
            .exprs()
            .find(|e| e.kind() == Kind::ConstInt)
            .and_then(|e| e.token(1));
        if let (Some(base), Some(offset)) = (base, offset) {
            return format!("mem[{}, #{}]", base, offset);
        }
    }

    if inner.kind().is_register() {
        if let Some(name) = inner.token(1) {
            return format!("mem[{}, #0]", name);
        }
    }

    format!("mem[{}]", inner.render())
}

fn ids_of(expr: &Expr) -> Option<[i64; 4]> {
    let mut out = [0i64; 4];
    for (slot, index) in out.iter_mut().zip(1..) {
        *slot = expr.token(index)?.parse().ok()?;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(text: &str) -> Record {
        Record::parse(text).unwrap()
    }

    #[test]
    fn positional_fields() {
        let rec = record(
            r#"(insn 18 17 19 4 (set (reg:SI 116) (plus:SI (reg:SI 117) (reg:SI 118))) "fib.c":8 -1 (nil))"#,
        );
        assert_eq!(rec.kind(), Kind::PlainInsn);
        assert_eq!(rec.id(), 18);
        assert_eq!(rec.prev_id(), 17);
        assert_eq!(rec.next_id(), 19);
        assert_eq!(rec.block_id(), 4);

        let body = rec.body().unwrap();
        assert_eq!(body.kind(), Kind::Set);
        assert_eq!(body.nth_expr(0).unwrap().kind(), Kind::Register);
        assert_eq!(body.nth_expr(0).unwrap().token(1), Some("116"));
        assert_eq!(body.nth_expr(1).unwrap().kind(), Kind::Plus);
    }

    #[test]
    fn defs_and_uses_of_an_add() {
        let rec = record(
            r#"(insn 18 17 19 4 (set (reg:SI 116) (plus:SI (reg:SI 117) (reg:SI 118))) "fib.c":8 -1 (nil))"#,
        );
        assert_eq!(rec.defs(), HashSet::from(["116".to_string()]));
        assert_eq!(
            rec.uses(),
            HashSet::from(["117".to_string(), "118".to_string()])
        );
    }

    #[test]
    fn memory_destination_is_a_distinct_entity() {
        let rec = record(
            r#"(insn 6 5 7 2 (set (mem/c:SI (plus:SI (reg/f:SI 105) (const_int -8)) [0 S4 A32]) (reg:SI 110)) "fib.c":3 -1 (nil))"#,
        );
        assert_eq!(rec.defs(), HashSet::from(["mem[105, #-8]".to_string()]));
        assert_eq!(rec.uses(), HashSet::from(["110".to_string()]));
    }

    #[test]
    fn condition_register_flows_through_a_branch() {
        let rec = record(
            r#"(jump_insn 14 13 15 3 (set (pc) (if_then_else (le (reg:CC 100) (const_int 0)) (label_ref 7) (pc))) "fib.c":7 -1 (nil) -> 7)"#,
        );
        assert!(rec.defs().is_empty());
        assert_eq!(rec.uses(), HashSet::from(["100".to_string()]));
        assert_eq!(rec.jump_target(), Some("7"));
    }

    #[test]
    fn malformed_fields_mark_the_block_unknown() {
        let rec = record("(insn a b c d (nil))");
        assert_eq!(rec.block_id(), UNKNOWN_BLOCK);

        // not a record form at all
        let rec = record("(set (reg:SI 1) (const_int 0))");
        assert_eq!(rec.block_id(), UNKNOWN_BLOCK);
    }

    #[test]
    fn use_body_carries_nothing() {
        let rec = record(r#"(insn 19 18 0 4 (use (reg/i:SI 0)) "fib.c":10 -1 (nil))"#);
        assert!(rec.defs().is_empty());
        assert!(rec.uses().is_empty());
        assert_eq!(rec.body().unwrap().kind(), Kind::Use);
    }
}
