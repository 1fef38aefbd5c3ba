//! Left-hand patterns and right-hand templates for axioms.
//!
//! Patterns bind named metavariables; a name used twice must bind
//! structurally equal sub-expressions (`?a - ?a`). Templates rebuild an
//! expression from the bindings and may fold literal arithmetic (`Eval`).

use eqsearch_expr::{Expr, Op};
use num_traits::Zero;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// Any sub-expression.
    Any(&'static str),
    /// A numeric literal.
    Lit(&'static str),
    /// A non-zero numeric literal.
    NonZero(&'static str),
    /// Exactly this integer literal.
    Const(i64),
    Neg(Box<Pattern>),
    Binary(Op, Box<Pattern>, Box<Pattern>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template {
    Bound(&'static str),
    Const(i64),
    Neg(Box<Template>),
    Binary(Op, Box<Template>, Box<Template>),
    /// Fold `op` over two sub-templates that must instantiate to literals.
    Eval(Op, Box<Template>, Box<Template>),
}

/// Metavariable bindings produced by a successful match.
#[derive(Debug, Default, Clone)]
pub struct Bindings<'e> {
    slots: Vec<(&'static str, &'e Expr)>,
}

impl<'e> Bindings<'e> {
    pub fn get(&self, name: &str) -> Option<&'e Expr> {
        self.slots
            .iter()
            .find(|(slot, _)| *slot == name)
            .map(|(_, expr)| *expr)
    }

    fn bind(&mut self, name: &'static str, expr: &'e Expr) -> bool {
        match self.get(name) {
            Some(existing) => existing == expr,
            None => {
                self.slots.push((name, expr));
                true
            }
        }
    }

    /// Substitute `{name}` placeholders with the canonical form of the binding.
    pub fn render(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (name, expr) in &self.slots {
            out = out.replace(&format!("{{{name}}}"), &expr.canonical());
        }
        out
    }
}

impl Pattern {
    pub fn matches<'e>(&self, expr: &'e Expr, bindings: &mut Bindings<'e>) -> bool {
        match (self, expr) {
            (Pattern::Any(name), _) => bindings.bind(name, expr),
            (Pattern::Lit(name), Expr::Num(_)) => bindings.bind(name, expr),
            (Pattern::NonZero(name), Expr::Num(n)) if !n.is_zero() => bindings.bind(name, expr),
            (Pattern::Const(c), Expr::Num(n)) => n.is_integer() && *n.numer() == *c,
            (Pattern::Neg(inner), Expr::Neg(e)) => inner.matches(e, bindings),
            (
                Pattern::Binary(op, lp, rp),
                Expr::Binary {
                    op: eop,
                    left,
                    right,
                },
            ) if op == eop => lp.matches(left, bindings) && rp.matches(right, bindings),
            _ => false,
        }
    }
}

impl Template {
    pub fn instantiate(&self, bindings: &Bindings<'_>) -> Option<Expr> {
        match self {
            Template::Bound(name) => bindings.get(name).cloned(),
            Template::Const(c) => Some(Expr::int(*c)),
            Template::Neg(inner) => Some(Expr::neg(inner.instantiate(bindings)?)),
            Template::Binary(op, l, r) => Some(Expr::binary(
                *op,
                l.instantiate(bindings)?,
                r.instantiate(bindings)?,
            )),
            Template::Eval(op, l, r) => {
                let a = l.instantiate(bindings)?.as_num()?;
                let b = r.instantiate(bindings)?.as_num()?;
                Some(Expr::num(op.eval(a, b)?))
            }
        }
    }
}

/// Pattern constructors.
pub mod p {
    use super::Pattern;
    use eqsearch_expr::Op;

    pub fn any(name: &'static str) -> Pattern {
        Pattern::Any(name)
    }

    pub fn lit(name: &'static str) -> Pattern {
        Pattern::Lit(name)
    }

    pub fn nonzero(name: &'static str) -> Pattern {
        Pattern::NonZero(name)
    }

    pub fn konst(value: i64) -> Pattern {
        Pattern::Const(value)
    }

    pub fn neg(inner: Pattern) -> Pattern {
        Pattern::Neg(Box::new(inner))
    }

    pub fn bin(op: Op, l: Pattern, r: Pattern) -> Pattern {
        Pattern::Binary(op, Box::new(l), Box::new(r))
    }

    pub fn eq(l: Pattern, r: Pattern) -> Pattern {
        bin(Op::Eq, l, r)
    }

    pub fn add(l: Pattern, r: Pattern) -> Pattern {
        bin(Op::Add, l, r)
    }

    pub fn sub(l: Pattern, r: Pattern) -> Pattern {
        bin(Op::Sub, l, r)
    }

    pub fn mul(l: Pattern, r: Pattern) -> Pattern {
        bin(Op::Mul, l, r)
    }

    pub fn div(l: Pattern, r: Pattern) -> Pattern {
        bin(Op::Div, l, r)
    }
}

/// Template constructors.
pub mod t {
    use super::Template;
    use eqsearch_expr::Op;

    pub fn v(name: &'static str) -> Template {
        Template::Bound(name)
    }

    pub fn konst(value: i64) -> Template {
        Template::Const(value)
    }

    pub fn neg(inner: Template) -> Template {
        Template::Neg(Box::new(inner))
    }

    pub fn bin(op: Op, l: Template, r: Template) -> Template {
        Template::Binary(op, Box::new(l), Box::new(r))
    }

    pub fn eval(op: Op, l: Template, r: Template) -> Template {
        Template::Eval(op, Box::new(l), Box::new(r))
    }

    pub fn eq(l: Template, r: Template) -> Template {
        bin(Op::Eq, l, r)
    }

    pub fn add(l: Template, r: Template) -> Template {
        bin(Op::Add, l, r)
    }

    pub fn sub(l: Template, r: Template) -> Template {
        bin(Op::Sub, l, r)
    }

    pub fn mul(l: Template, r: Template) -> Template {
        bin(Op::Mul, l, r)
    }

    pub fn div(l: Template, r: Template) -> Template {
        bin(Op::Div, l, r)
    }
}
