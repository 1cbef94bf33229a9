use std::fmt;

use itertools::Itertools;
use thiserror::Error;

use super::kind::Kind;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected '(' at offset {0}")]
    NotAnExpression(usize),

    #[error("unbalanced record: '(' at offset {0} is never closed")]
    Unbalanced(usize),
}

/// One child of an expression: a literal token or a nested form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Token(String),
    Expr(Expr),
}

/// A parsed parenthesized form. The kind is derived from the first literal
/// token once `classify` has run; until then every node is `Unclassified`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    kind: Kind,
    items: Vec<Item>,
}

pub fn parse(src: &str) -> Result<Expr, ParseError> {
    let chars: Vec<char> = src.chars().collect();
    let start = chars
        .iter()
        .position(|c| !c.is_whitespace())
        .unwrap_or(chars.len());
    if chars.get(start) != Some(&'(') {
        return Err(ParseError::NotAnExpression(start));
    }
    let (expr, _) = parse_at(&chars, start)?;
    Ok(expr)
}

fn parse_at(chars: &[char], open: usize) -> Result<(Expr, usize), ParseError> {
    let mut items = Vec::new();
    let mut token = String::new();

    let mut i = open + 1;
    while i < chars.len() {
        let ch = chars[i];
        match ch {
            ')' => {
                flush(&mut token, &mut items);
                let expr = Expr {
                    kind: Kind::Unclassified,
                    items,
                };
                return Ok((expr, i + 1));
            }
            '(' => {
                flush(&mut token, &mut items);
                let (child, next) = parse_at(chars, i)?;
                items.push(Item::Expr(child));
                i = next;
                continue;
            }
            c if c.is_whitespace() => flush(&mut token, &mut items),
            // these land in a graph-description sink later, escape them now
            '"' | '<' | '>' => {
                token.push('\\');
                token.push(ch);
            }
            c => token.push(c),
        }
        i += 1;
    }

    Err(ParseError::Unbalanced(open))
}

fn flush(token: &mut String, items: &mut Vec<Item>) {
    if !token.is_empty() {
        items.push(Item::Token(std::mem::take(token)));
    }
}

impl Expr {
    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Tags this node and every nested node with the kind named by its
    /// first literal token. Never fails; unknown keywords stay generic.
    pub fn classify(&mut self) {
        self.kind = match self.items.first() {
            Some(Item::Token(word)) => Kind::from_keyword(word),
            _ => Kind::Unclassified,
        };
        for item in &mut self.items {
            if let Item::Expr(child) = item {
                child.classify();
            }
        }
    }

    /// The literal token at `index`, counting every child.
    pub fn token(&self, index: usize) -> Option<&str> {
        match self.items.get(index) {
            Some(Item::Token(t)) => Some(t.as_str()),
            _ => None,
        }
    }

    /// The `n`-th nested form, counting only nested forms.
    pub fn nth_expr(&self, n: usize) -> Option<&Expr> {
        self.exprs().nth(n)
    }

    pub fn exprs(&self) -> impl Iterator<Item = &Expr> {
        self.items.iter().filter_map(|item| match item {
            Item::Expr(e) => Some(e),
            Item::Token(_) => None,
        })
    }

    pub fn last_token(&self) -> Option<&str> {
        self.items.iter().rev().find_map(|item| match item {
            Item::Token(t) => Some(t.as_str()),
            Item::Expr(_) => None,
        })
    }

    /// Flat text form, nested nodes in braces. This is the read-only
    /// renderer the graph export consumes.
    pub fn render(&self) -> String {
        self.items
            .iter()
            .map(|item| match item {
                Item::Token(t) => t.clone(),
                Item::Expr(e) => format!("{{{}}}", e.render()),
            })
            .join(" ")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}
