//! Seeded generator of single-variable linear equations.
//!
//! Every generated problem has an integer solution and is solvable with the
//! standard axioms in at most three moves. The same seed always yields the
//! same problem.

use eqsearch_expr::Expr;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const VARIABLE: &str = "x";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// `a x + b = c`
    AffineSum,
    /// `a x - b = c`
    AffineDiff,
    /// `a x = c`
    Scaled,
    /// `x + b = c`
    Shifted,
    /// `x / a = c`
    Divided,
    /// `b + a x = c`
    ConstantFirst,
}

const SHAPES: [Shape; 6] = [
    Shape::AffineSum,
    Shape::AffineDiff,
    Shape::Scaled,
    Shape::Shifted,
    Shape::Divided,
    Shape::ConstantFirst,
];

pub fn generate(seed: u64) -> Expr {
    let mut rng = StdRng::seed_from_u64(seed);
    let shape = SHAPES[rng.random_range(0..SHAPES.len())];
    let x: i64 = rng.random_range(-10..=10);
    let a: i64 = rng.random_range(2..=9) * if rng.random_bool(0.5) { 1 } else { -1 };
    let b: i64 = rng.random_range(1..=20);
    let ax = || Expr::mul(Expr::int(a), Expr::var(VARIABLE));

    match shape {
        Shape::AffineSum => Expr::equation(Expr::add(ax(), Expr::int(b)), Expr::int(a * x + b)),
        Shape::AffineDiff => Expr::equation(Expr::sub(ax(), Expr::int(b)), Expr::int(a * x - b)),
        Shape::Scaled => Expr::equation(ax(), Expr::int(a * x)),
        Shape::Shifted => Expr::equation(
            Expr::add(Expr::var(VARIABLE), Expr::int(b)),
            Expr::int(x + b),
        ),
        Shape::Divided => Expr::equation(
            Expr::div(Expr::var(VARIABLE), Expr::int(a)),
            Expr::int(x),
        ),
        Shape::ConstantFirst => {
            Expr::equation(Expr::add(Expr::int(b), ax()), Expr::int(a * x + b))
        }
    }
}

/// `count` problems from consecutive seeds starting at `first_seed`.
pub fn generate_batch(first_seed: u64, count: usize) -> Vec<(u64, Expr)> {
    (0..count as u64)
        .map(|offset| {
            let seed = first_seed.wrapping_add(offset);
            (seed, generate(seed))
        })
        .collect()
}
