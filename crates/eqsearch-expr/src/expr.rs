//! Expression trees.
//!
//! `Expr` is immutable by convention: every rewrite builds a new tree via
//! `replace_at`. Equality and hashing are structural, and the `Display` impl
//! is the canonical serialization (see `parser` for the matching grammar).

use crate::position::Position;
use crate::Number;
use num_traits::{CheckedAdd, CheckedDiv, CheckedMul, CheckedSub, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Binary operators. `Eq` only ever appears at the root of an equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Op {
    Eq,
    Add,
    Sub,
    Mul,
    Div,
}

impl Op {
    pub fn symbol(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
        }
    }

    pub(crate) fn precedence(self) -> u8 {
        match self {
            Op::Eq => 0,
            Op::Add | Op::Sub => 1,
            Op::Mul | Op::Div => 2,
        }
    }

    /// Exact evaluation on literals. `None` on overflow, division by zero,
    /// or for `=`.
    pub fn eval(self, a: Number, b: Number) -> Option<Number> {
        match self {
            Op::Add => a.checked_add(&b),
            Op::Sub => a.checked_sub(&b),
            Op::Mul => a.checked_mul(&b),
            Op::Div => {
                if b.is_zero() {
                    return None;
                }
                a.checked_div(&b)
            }
            Op::Eq => None,
        }
    }
}

const PREC_NEG: u8 = 3;
const PREC_ATOM: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Num(Number),
    Var(String),
    Neg(Box<Expr>),
    Binary {
        op: Op,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    pub fn int(n: i64) -> Self {
        Expr::Num(Number::from_integer(n))
    }

    pub fn num(n: Number) -> Self {
        Expr::Num(n)
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn neg(inner: Expr) -> Self {
        Expr::Neg(Box::new(inner))
    }

    pub fn binary(op: Op, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn equation(left: Expr, right: Expr) -> Self {
        Expr::binary(Op::Eq, left, right)
    }

    pub fn add(left: Expr, right: Expr) -> Self {
        Expr::binary(Op::Add, left, right)
    }

    pub fn sub(left: Expr, right: Expr) -> Self {
        Expr::binary(Op::Sub, left, right)
    }

    pub fn mul(left: Expr, right: Expr) -> Self {
        Expr::binary(Op::Mul, left, right)
    }

    pub fn div(left: Expr, right: Expr) -> Self {
        Expr::binary(Op::Div, left, right)
    }

    pub fn as_num(&self) -> Option<Number> {
        match self {
            Expr::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_var(&self) -> Option<&str> {
        match self {
            Expr::Var(name) => Some(name),
            _ => None,
        }
    }

    pub fn op(&self) -> Option<Op> {
        match self {
            Expr::Binary { op, .. } => Some(*op),
            _ => None,
        }
    }

    /// Short node label, used for hashed features and diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Expr::Num(_) => "num",
            Expr::Var(_) => "var",
            Expr::Neg(_) => "neg",
            Expr::Binary { op, .. } => op.symbol(),
        }
    }

    pub fn child(&self, index: u32) -> Option<&Expr> {
        match (self, index) {
            (Expr::Neg(inner), 0) => Some(inner),
            (Expr::Binary { left, .. }, 0) => Some(left),
            (Expr::Binary { right, .. }, 1) => Some(right),
            _ => None,
        }
    }

    pub fn children(&self) -> impl Iterator<Item = &Expr> {
        self.child(0).into_iter().chain(self.child(1))
    }

    /// Number of nodes.
    pub fn size(&self) -> usize {
        1 + self.children().map(Expr::size).sum::<usize>()
    }

    pub fn at(&self, pos: &Position) -> Option<&Expr> {
        pos.as_slice()
            .iter()
            .try_fold(self, |node, &idx| node.child(idx))
    }

    /// Rebuild the tree with the sub-expression at `pos` replaced.
    pub fn replace_at(&self, pos: &Position, replacement: Expr) -> Option<Expr> {
        replace_path(self, pos.as_slice(), replacement)
    }

    /// All positions, in pre-order.
    pub fn positions(&self) -> Vec<Position> {
        fn walk(expr: &Expr, prefix: &mut Vec<u32>, out: &mut Vec<Position>) {
            out.push(Position::new(prefix.clone()));
            for (idx, child) in expr.children().enumerate() {
                prefix.push(idx as u32);
                walk(child, prefix, out);
                prefix.pop();
            }
        }

        let mut out = Vec::with_capacity(self.size());
        walk(self, &mut Vec::new(), &mut out);
        out
    }

    /// Flattened pre-order index of a position (legacy addressing).
    pub fn preorder_index(&self, pos: &Position) -> Option<usize> {
        self.positions().iter().position(|p| p == pos)
    }

    pub fn position_at_preorder(&self, index: usize) -> Option<Position> {
        self.positions().into_iter().nth(index)
    }

    pub fn canonical(&self) -> String {
        self.to_string()
    }

    pub fn is_equation(&self) -> bool {
        matches!(self, Expr::Binary { op: Op::Eq, .. })
    }

    /// `x = <value>`: a variable alone on the left, a literal on the right.
    pub fn is_solved(&self) -> bool {
        match self {
            Expr::Binary {
                op: Op::Eq,
                left,
                right,
            } => matches!((left.as_ref(), right.as_ref()), (Expr::Var(_), Expr::Num(_))),
            _ => false,
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Num(_) | Expr::Var(_) => PREC_ATOM,
            Expr::Neg(_) => PREC_NEG,
            Expr::Binary { op, .. } => op.precedence(),
        }
    }
}

fn replace_path(expr: &Expr, path: &[u32], replacement: Expr) -> Option<Expr> {
    match (path.split_first(), expr) {
        (None, _) => Some(replacement),
        (Some((&0, rest)), Expr::Neg(inner)) => {
            Some(Expr::neg(replace_path(inner, rest, replacement)?))
        }
        (Some((&0, rest)), Expr::Binary { op, left, right }) => Some(Expr::Binary {
            op: *op,
            left: Box::new(replace_path(left, rest, replacement)?),
            right: right.clone(),
        }),
        (Some((&1, rest)), Expr::Binary { op, left, right }) => Some(Expr::Binary {
            op: *op,
            left: left.clone(),
            right: Box::new(replace_path(right, rest, replacement)?),
        }),
        _ => None,
    }
}

pub(crate) fn fmt_number(n: &Number, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if n.is_integer() {
        write!(f, "{}", n.numer())
    } else {
        write!(f, "[{}/{}]", n.numer(), n.denom())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Num(n) => fmt_number(n, f),
            Expr::Var(name) => f.write_str(name),
            Expr::Neg(inner) => match inner.as_ref() {
                Expr::Var(name) => write!(f, "-{name}"),
                other => write!(f, "-({other})"),
            },
            // Coefficient juxtaposition: `2x`, `-3y`, `[1/2]z`.
            Expr::Binary {
                op: Op::Mul,
                left,
                right,
            } if matches!((left.as_ref(), right.as_ref()), (Expr::Num(_), Expr::Var(_))) => {
                write!(f, "{left}{right}")
            }
            Expr::Binary { op, left, right } => {
                let prec = op.precedence();
                if left.precedence() < prec {
                    write!(f, "({left})")?;
                } else {
                    write!(f, "{left}")?;
                }
                write!(f, " {} ", op.symbol())?;
                if right.precedence() <= prec {
                    write!(f, "({right})")
                } else {
                    write!(f, "{right}")
                }
            }
        }
    }
}

impl FromStr for Expr {
    type Err = crate::parser::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::parser::parse_expr(s)
    }
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Expr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        crate::parser::parse_expr(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Expr {
        // 2x + 3 = 7
        Expr::equation(
            Expr::add(Expr::mul(Expr::int(2), Expr::var("x")), Expr::int(3)),
            Expr::int(7),
        )
    }

    #[test]
    fn canonical_uses_juxtaposition_for_coefficients() {
        assert_eq!(sample().canonical(), "2x + 3 = 7");
    }

    #[test]
    fn canonical_parenthesizes_right_nested_same_precedence() {
        let e = Expr::sub(Expr::var("a"), Expr::sub(Expr::var("b"), Expr::var("c")));
        assert_eq!(e.canonical(), "a - (b - c)");
        let e = Expr::sub(Expr::sub(Expr::var("a"), Expr::var("b")), Expr::var("c"));
        assert_eq!(e.canonical(), "a - b - c");
    }

    #[test]
    fn canonical_prints_fractions_in_brackets() {
        let e = Expr::num(Number::new(6, 4));
        assert_eq!(e.canonical(), "[3/2]");
        let e = Expr::neg(Expr::int(3));
        assert_eq!(e.canonical(), "-(3)");
    }

    #[test]
    fn positions_are_preorder() {
        let e = sample();
        let positions: Vec<String> = e.positions().iter().map(|p| p.to_string()).collect();
        assert_eq!(
            positions,
            vec!["/", "/0", "/0/0", "/0/0/0", "/0/0/1", "/0/1", "/1"]
        );
        assert_eq!(e.size(), 7);
        assert_eq!(e.preorder_index(&Position::new(vec![1])), Some(6));
        assert_eq!(e.position_at_preorder(5), Some(Position::new(vec![0, 1])));
    }

    #[test]
    fn replace_at_builds_new_tree() {
        let e = sample();
        let replaced = e
            .replace_at(&Position::new(vec![0, 1]), Expr::int(5))
            .expect("valid position");
        assert_eq!(replaced.canonical(), "2x + 5 = 7");
        assert_eq!(e.canonical(), "2x + 3 = 7");
        assert!(e.replace_at(&Position::new(vec![1, 0]), Expr::int(0)).is_none());
    }

    #[test]
    fn solved_predicate() {
        assert!(Expr::equation(Expr::var("x"), Expr::int(2)).is_solved());
        assert!(!Expr::equation(Expr::int(2), Expr::var("x")).is_solved());
        assert!(!sample().is_solved());
    }

    #[test]
    fn eval_is_exact_and_checked() {
        let two = Number::from_integer(2);
        let zero = Number::from_integer(0);
        assert_eq!(Op::Div.eval(Number::from_integer(3), two), Some(Number::new(3, 2)));
        assert_eq!(Op::Div.eval(two, Number::from_integer(-4)), Some(Number::new(-1, 2)));
        assert_eq!(Op::Div.eval(two, zero), None);
        assert_eq!(Op::Mul.eval(Number::from_integer(i64::MAX), two), None);
    }
}
