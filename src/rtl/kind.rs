use std::collections::HashMap;

use once_cell::sync::Lazy;
use strum::{Display, EnumIter};

/// Semantic tag of an expression node, derived from its leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Kind {
    Note,
    Barrier,
    CodeLabel,
    PlainInsn,
    JumpInsn,
    CallInsn,

    Set,
    Use,

    Register,
    FloatRegister,
    ImmutableRegister,
    ConditionRegister,
    Memory,
    ConstInt,
    Plus,
    Compare,
    LabelRef,
    ProgramCounter,
    IfThenElse,
    LessEqual,
    SymbolRef,

    Unclassified,
}

static KEYWORDS: Lazy<HashMap<&'static str, Kind>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("note", Kind::Note);
    m.insert("barrier", Kind::Barrier);
    m.insert("code_label", Kind::CodeLabel);
    m.insert("insn", Kind::PlainInsn);
    m.insert("jump_insn", Kind::JumpInsn);
    m.insert("call_insn", Kind::CallInsn);
    m.insert("set", Kind::Set);
    m.insert("use", Kind::Use);
    m.insert("reg:SI", Kind::Register);
    m.insert("reg/f:SI", Kind::FloatRegister);
    m.insert("reg/i:SI", Kind::ImmutableRegister);
    m.insert("reg:CC", Kind::ConditionRegister);
    m.insert("mem:SI", Kind::Memory);
    m.insert("mem/c:SI", Kind::Memory);
    m.insert("const_int", Kind::ConstInt);
    m.insert("plus:SI", Kind::Plus);
    m.insert("compare:CC", Kind::Compare);
    m.insert("label_ref", Kind::LabelRef);
    m.insert("pc", Kind::ProgramCounter);
    m.insert("if_then_else", Kind::IfThenElse);
    m.insert("le", Kind::LessEqual);
    m.insert("symbol_ref:SI", Kind::SymbolRef);
    m
});

impl Kind {
    pub fn from_keyword(word: &str) -> Kind {
        KEYWORDS.get(word).copied().unwrap_or(Kind::Unclassified)
    }

    /// Top-level record kinds, the only ones carrying positional id fields.
    pub fn is_record(self) -> bool {
        matches!(
            self,
            Kind::Note
                | Kind::Barrier
                | Kind::CodeLabel
                | Kind::PlainInsn
                | Kind::JumpInsn
                | Kind::CallInsn
        )
    }

    pub fn is_register(self) -> bool {
        matches!(
            self,
            Kind::Register
                | Kind::FloatRegister
                | Kind::ImmutableRegister
                | Kind::ConditionRegister
        )
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn known_keywords() {
        assert_eq!(Kind::from_keyword("insn"), Kind::PlainInsn);
        assert_eq!(Kind::from_keyword("set"), Kind::Set);
        assert_eq!(Kind::from_keyword("reg:SI"), Kind::Register);
        assert_eq!(Kind::from_keyword("plus:SI"), Kind::Plus);
        assert_eq!(Kind::from_keyword("mem/c:SI"), Kind::Memory);
        assert_eq!(Kind::from_keyword("if_then_else"), Kind::IfThenElse);
    }

    #[test]
    fn unknown_keywords_stay_generic() {
        assert_eq!(Kind::from_keyword("parallel"), Kind::Unclassified);
        assert_eq!(Kind::from_keyword("reg:DI"), Kind::Unclassified);
        assert_eq!(Kind::from_keyword(""), Kind::Unclassified);
    }

    #[test]
    fn every_kind_is_reachable_from_a_keyword() {
        for kind in Kind::iter() {
            if kind == Kind::Unclassified {
                continue;
            }
            assert!(
                KEYWORDS.values().any(|&k| k == kind),
                "no keyword maps to {}",
                kind
            );
        }
    }
}
