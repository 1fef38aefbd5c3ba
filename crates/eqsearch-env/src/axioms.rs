//! The axiom registry.
//!
//! An axiom is a named rewrite rule: one or more `(pattern, template)`
//! alternatives tried in order at a single site. Axioms are stateless; the
//! registry is built once and shared read-only behind an `Arc`.

use crate::pattern::{p, t, Bindings, Pattern, Template};
use eqsearch_expr::{Expr, Op, Position};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Index of an axiom in its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AxiomId(pub u16);

impl fmt::Display for AxiomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AxiomError {
    #[error("duplicate axiom name `{0}`")]
    Duplicate(String),
    #[error("unknown axiom `{0}`")]
    Unknown(String),
    #[error("axiom `{axiom}` names unknown inverse `{inverse}`")]
    UnknownInverse { axiom: String, inverse: String },
}

#[derive(Debug, Clone)]
pub struct Axiom {
    name: &'static str,
    /// Human-readable description; `{name}` placeholders are filled from the
    /// match bindings.
    description: &'static str,
    rules: Vec<(Pattern, Template)>,
    inverse: Option<&'static str>,
}

/// One axiom application: the rewritten sub-expression and the whole result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub axiom: AxiomId,
    pub position: Position,
    pub before: Expr,
    pub after: Expr,
    pub result: Expr,
    pub description: String,
}

impl Axiom {
    pub fn new(
        name: &'static str,
        description: &'static str,
        lhs: Pattern,
        rhs: Template,
    ) -> Self {
        Self {
            name,
            description,
            rules: vec![(lhs, rhs)],
            inverse: None,
        }
    }

    /// Add another alternative, tried after the existing ones.
    pub fn or(mut self, lhs: Pattern, rhs: Template) -> Self {
        self.rules.push((lhs, rhs));
        self
    }

    pub fn with_inverse(mut self, inverse: &'static str) -> Self {
        self.inverse = Some(inverse);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    pub fn inverse(&self) -> Option<&'static str> {
        self.inverse
    }

    /// Rewrite `node` at its root, with the rendered description.
    pub fn rewrite_node(&self, node: &Expr) -> Option<(Expr, String)> {
        self.rules.iter().find_map(|(lhs, rhs)| {
            let mut bindings = Bindings::default();
            if !lhs.matches(node, &mut bindings) {
                return None;
            }
            let after = rhs.instantiate(&bindings)?;
            Some((after, bindings.render(self.description)))
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct AxiomSet {
    axioms: Vec<Axiom>,
    by_name: HashMap<&'static str, AxiomId>,
}

impl AxiomSet {
    pub fn from_axioms(axioms: Vec<Axiom>) -> Result<Self, AxiomError> {
        let mut by_name = HashMap::with_capacity(axioms.len());
        for (idx, axiom) in axioms.iter().enumerate() {
            if by_name.insert(axiom.name, AxiomId(idx as u16)).is_some() {
                return Err(AxiomError::Duplicate(axiom.name.to_string()));
            }
        }
        for axiom in &axioms {
            if let Some(inverse) = axiom.inverse {
                if !by_name.contains_key(inverse) {
                    return Err(AxiomError::UnknownInverse {
                        axiom: axiom.name.to_string(),
                        inverse: inverse.to_string(),
                    });
                }
            }
        }
        Ok(Self { axioms, by_name })
    }

    /// The linear-equation axioms, in enumeration order.
    pub fn standard() -> Self {
        let axioms = standard_axioms();
        let by_name = axioms
            .iter()
            .enumerate()
            .map(|(idx, a)| (a.name, AxiomId(idx as u16)))
            .collect();
        Self { axioms, by_name }
    }

    /// Restrict to the named axioms, keeping registry order. Inverses that
    /// fall outside the subset are dropped.
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> Result<Self, AxiomError> {
        for name in names {
            if !self.by_name.contains_key(name.as_ref()) {
                return Err(AxiomError::Unknown(name.as_ref().to_string()));
            }
        }
        let keep: Vec<Axiom> = self
            .axioms
            .iter()
            .filter(|a| names.iter().any(|n| n.as_ref() == a.name))
            .cloned()
            .collect();
        let kept: Vec<&'static str> = keep.iter().map(|a| a.name).collect();
        let keep = keep
            .into_iter()
            .map(|mut a| {
                if a.inverse.is_some_and(|inv| !kept.contains(&inv)) {
                    a.inverse = None;
                }
                a
            })
            .collect();
        Self::from_axioms(keep)
    }

    pub fn len(&self) -> usize {
        self.axioms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axioms.is_empty()
    }

    pub fn get(&self, id: AxiomId) -> &Axiom {
        &self.axioms[id.0 as usize]
    }

    pub fn id(&self, name: &str) -> Option<AxiomId> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AxiomId, &Axiom)> {
        self.axioms
            .iter()
            .enumerate()
            .map(|(idx, a)| (AxiomId(idx as u16), a))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.axioms.iter().map(|a| a.name)
    }

    pub fn apply_at(&self, id: AxiomId, expr: &Expr, pos: &Position) -> Option<Rewrite> {
        let before = expr.at(pos)?;
        let (after, description) = self.get(id).rewrite_node(before)?;
        let result = expr.replace_at(pos, after.clone())?;
        Some(Rewrite {
            axiom: id,
            position: pos.clone(),
            before: before.clone(),
            after,
            result,
            description,
        })
    }

    /// Every application of one axiom, positions in pre-order.
    pub fn applications(&self, id: AxiomId, expr: &Expr) -> Vec<Rewrite> {
        expr.positions()
            .iter()
            .filter_map(|pos| self.apply_at(id, expr, pos))
            .collect()
    }

    /// Every application of every axiom: registry order, then pre-order.
    pub fn all_applications(&self, expr: &Expr) -> Vec<Rewrite> {
        let positions = expr.positions();
        let mut out = Vec::new();
        for (id, _) in self.iter() {
            out.extend(
                positions
                    .iter()
                    .filter_map(|pos| self.apply_at(id, expr, pos)),
            );
        }
        out
    }
}

fn standard_axioms() -> Vec<Axiom> {
    use p::{any, lit, nonzero};

    let eval = Axiom::new(
        "eval",
        "Simplify the arithmetic on {a} and {b}",
        p::add(lit("a"), lit("b")),
        t::eval(Op::Add, t::v("a"), t::v("b")),
    )
    .or(
        p::sub(lit("a"), lit("b")),
        t::eval(Op::Sub, t::v("a"), t::v("b")),
    )
    .or(
        p::mul(lit("a"), lit("b")),
        t::eval(Op::Mul, t::v("a"), t::v("b")),
    )
    .or(
        p::div(lit("a"), nonzero("b")),
        t::eval(Op::Div, t::v("a"), t::v("b")),
    );

    vec![
        eval,
        Axiom::new(
            "add_zero",
            "Drop the added zero",
            p::add(any("a"), p::konst(0)),
            t::v("a"),
        )
        .or(p::add(p::konst(0), any("a")), t::v("a")),
        Axiom::new(
            "sub_zero",
            "Drop the subtracted zero",
            p::sub(any("a"), p::konst(0)),
            t::v("a"),
        ),
        Axiom::new(
            "mul_one",
            "Drop the factor 1",
            p::mul(any("a"), p::konst(1)),
            t::v("a"),
        )
        .or(p::mul(p::konst(1), any("a")), t::v("a")),
        Axiom::new(
            "mul_zero",
            "Multiplying by zero gives zero",
            p::mul(any("a"), p::konst(0)),
            t::konst(0),
        )
        .or(p::mul(p::konst(0), any("a")), t::konst(0)),
        Axiom::new(
            "div_one",
            "Dividing by 1 changes nothing",
            p::div(any("a"), p::konst(1)),
            t::v("a"),
        ),
        Axiom::new(
            "sub_self",
            "{a} minus itself is zero",
            p::sub(any("a"), any("a")),
            t::konst(0),
        ),
        Axiom::new(
            "add_comm",
            "Swap the terms of {a} + {b}",
            p::add(any("a"), any("b")),
            t::add(t::v("b"), t::v("a")),
        )
        .with_inverse("add_comm"),
        Axiom::new(
            "mul_comm",
            "Swap the factors of {a} * {b}",
            p::mul(any("a"), any("b")),
            t::mul(t::v("b"), t::v("a")),
        )
        .with_inverse("mul_comm"),
        Axiom::new(
            "add_assoc",
            "Regroup the sum to the right",
            p::add(p::add(any("a"), any("b")), any("c")),
            t::add(t::v("a"), t::add(t::v("b"), t::v("c"))),
        )
        .with_inverse("add_assoc_rev"),
        Axiom::new(
            "add_assoc_rev",
            "Regroup the sum to the left",
            p::add(any("a"), p::add(any("b"), any("c"))),
            t::add(t::add(t::v("a"), t::v("b")), t::v("c")),
        )
        .with_inverse("add_assoc"),
        Axiom::new(
            "mul_assoc",
            "Regroup the product to the right",
            p::mul(p::mul(any("a"), any("b")), any("c")),
            t::mul(t::v("a"), t::mul(t::v("b"), t::v("c"))),
        )
        .with_inverse("mul_assoc_rev"),
        Axiom::new(
            "mul_assoc_rev",
            "Regroup the product to the left",
            p::mul(any("a"), p::mul(any("b"), any("c"))),
            t::mul(t::mul(t::v("a"), t::v("b")), t::v("c")),
        )
        .with_inverse("mul_assoc"),
        Axiom::new(
            "dist",
            "Distribute {a} over the sum",
            p::mul(any("a"), p::add(any("b"), any("c"))),
            t::add(
                t::mul(t::v("a"), t::v("b")),
                t::mul(t::v("a"), t::v("c")),
            ),
        )
        .with_inverse("factor"),
        Axiom::new(
            "factor",
            "Factor {a} out of the sum",
            p::add(p::mul(any("a"), any("b")), p::mul(any("a"), any("c"))),
            t::mul(t::v("a"), t::add(t::v("b"), t::v("c"))),
        )
        .with_inverse("dist"),
        Axiom::new(
            "combine",
            "Combine the {x} terms",
            p::add(p::mul(lit("a"), any("x")), p::mul(lit("b"), any("x"))),
            t::mul(t::eval(Op::Add, t::v("a"), t::v("b")), t::v("x")),
        )
        .or(
            p::sub(p::mul(lit("a"), any("x")), p::mul(lit("b"), any("x"))),
            t::mul(t::eval(Op::Sub, t::v("a"), t::v("b")), t::v("x")),
        ),
        Axiom::new(
            "neg_to_mul",
            "Write -{a} as -1 * {a}",
            p::neg(any("a")),
            t::mul(t::konst(-1), t::v("a")),
        ),
        Axiom::new(
            "eq_symm",
            "Swap the sides of the equation",
            p::eq(any("a"), any("b")),
            t::eq(t::v("b"), t::v("a")),
        )
        .with_inverse("eq_symm"),
        Axiom::new(
            "sub_both",
            "Subtract {c} from both sides",
            p::eq(p::add(any("a"), any("c")), any("b")),
            t::eq(
                t::sub(t::add(t::v("a"), t::v("c")), t::v("c")),
                t::sub(t::v("b"), t::v("c")),
            ),
        ),
        Axiom::new(
            "add_both",
            "Add {c} to both sides",
            p::eq(p::sub(any("a"), any("c")), any("b")),
            t::eq(
                t::add(t::sub(t::v("a"), t::v("c")), t::v("c")),
                t::add(t::v("b"), t::v("c")),
            ),
        ),
        Axiom::new(
            "div_both",
            "Divide both sides by {k}",
            p::eq(p::mul(nonzero("k"), any("a")), any("b")),
            t::eq(
                t::div(t::mul(t::v("k"), t::v("a")), t::v("k")),
                t::div(t::v("b"), t::v("k")),
            ),
        ),
        Axiom::new(
            "mul_both",
            "Multiply both sides by {k}",
            p::eq(p::div(any("a"), nonzero("k")), any("b")),
            t::eq(
                t::mul(t::div(t::v("a"), t::v("k")), t::v("k")),
                t::mul(t::v("b"), t::v("k")),
            ),
        ),
        Axiom::new(
            "cancel_add",
            "Cancel + {c} and - {c}",
            p::sub(p::add(any("a"), any("c")), any("c")),
            t::v("a"),
        ),
        Axiom::new(
            "cancel_sub",
            "Cancel - {c} and + {c}",
            p::add(p::sub(any("a"), any("c")), any("c")),
            t::v("a"),
        ),
        Axiom::new(
            "cancel_mul",
            "Cancel the factor {k}",
            p::div(p::mul(nonzero("k"), any("a")), nonzero("k")),
            t::v("a"),
        ),
        Axiom::new(
            "cancel_div",
            "Cancel the divisor {k}",
            p::mul(p::div(any("a"), nonzero("k")), nonzero("k")),
            t::v("a"),
        ),
        Axiom::new(
            "sub_const",
            "Subtract {c} from both sides",
            p::eq(p::add(any("a"), lit("c")), lit("b")),
            t::eq(t::v("a"), t::eval(Op::Sub, t::v("b"), t::v("c"))),
        ),
        Axiom::new(
            "add_const",
            "Add {c} to both sides",
            p::eq(p::sub(any("a"), lit("c")), lit("b")),
            t::eq(t::v("a"), t::eval(Op::Add, t::v("b"), t::v("c"))),
        ),
        Axiom::new(
            "div_coeff",
            "Divide both sides by {k}",
            p::eq(p::mul(nonzero("k"), any("a")), lit("b")),
            t::eq(t::v("a"), t::eval(Op::Div, t::v("b"), t::v("k"))),
        ),
        Axiom::new(
            "mul_coeff",
            "Multiply both sides by {k}",
            p::eq(p::div(any("a"), nonzero("k")), lit("b")),
            t::eq(t::v("a"), t::eval(Op::Mul, t::v("b"), t::v("k"))),
        ),
    ]
}
