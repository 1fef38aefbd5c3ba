use eqsearch_env::abstraction::AbstractionStep;
use eqsearch_env::{generate, Abstraction, AxiomSet};
use eqsearch_expr::{Expr, Op};
use proptest::prelude::*;

fn leaf() -> impl Strategy<Value = Expr> {
    prop_oneof![
        (-5i64..=5).prop_map(Expr::int),
        prop_oneof![Just("x"), Just("y")].prop_map(Expr::var),
    ]
}

fn term() -> impl Strategy<Value = Expr> {
    leaf().prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            inner.clone().prop_map(Expr::neg),
            (
                prop_oneof![Just(Op::Add), Just(Op::Sub), Just(Op::Mul), Just(Op::Div)],
                inner.clone(),
                inner,
            )
                .prop_map(|(op, l, r)| Expr::binary(op, l, r)),
        ]
    })
}

fn equation() -> impl Strategy<Value = Expr> {
    prop_oneof![
        (term(), term()).prop_map(|(l, r)| Expr::equation(l, r)),
        any::<u64>().prop_map(generate),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn invertible_axioms_undo_each_other(e in equation()) {
        let axioms = AxiomSet::standard();
        for (id, axiom) in axioms.iter() {
            let Some(inverse) = axiom.inverse().and_then(|name| axioms.id(name)) else {
                continue;
            };
            for rewrite in axioms.applications(id, &e) {
                let back = axioms
                    .apply_at(inverse, &rewrite.result, &rewrite.position)
                    .map(|rw| rw.result);
                prop_assert_eq!(back.as_ref(), Some(&e), "{} at {}", axiom.name(), rewrite.position);
            }
        }
    }

    #[test]
    fn tree_offset_pair_equals_manual_composition(
        e in equation(),
        first in 0usize..64,
        second in 0usize..64,
        target in 0usize..64,
    ) {
        let axioms = AxiomSet::standard();
        let ids: Vec<_> = axioms.iter().map(|(id, _)| id).collect();
        let a1 = ids[first % ids.len()];
        let a2 = ids[second % ids.len()];

        for rewrite in axioms.applications(a1, &e) {
            let sites = rewrite.result.positions();
            let q = &sites[target % sites.len()];
            let d = q.relative_to(&rewrite.position);

            let abstraction = Abstraction::new(
                "pair",
                vec![
                    AbstractionStep { axiom: a1, offset: None },
                    AbstractionStep { axiom: a2, offset: Some(d.clone()) },
                ],
            );
            let compiled = abstraction
                .apply_from(&e, &rewrite.position, &axioms)
                .map(|app| app.result);

            let manual = rewrite
                .position
                .offset(&d)
                .and_then(|site| axioms.apply_at(a2, &rewrite.result, &site))
                .map(|rw| rw.result);

            prop_assert_eq!(compiled, manual);
        }
    }

    #[test]
    fn every_rewrite_only_touches_its_site(e in equation()) {
        let axioms = AxiomSet::standard();
        for rewrite in axioms.all_applications(&e) {
            prop_assert_eq!(rewrite.result.at(&rewrite.position), Some(&rewrite.after));
            let restored = rewrite.result.replace_at(&rewrite.position, rewrite.before.clone());
            prop_assert_eq!(
                restored.as_ref(),
                Some(&e)
            );
        }
    }
}

#[test]
fn generated_problems_solve_within_three_moves() {
    let env = eqsearch_env::Environment::default();
    for seed in 0..100 {
        let start = eqsearch_env::State::new(generate(seed));
        let mut frontier = vec![start.clone()];
        let mut solved = false;
        for _ in 0..3 {
            let mut next = Vec::new();
            for state in &frontier {
                for t in env.expand(state) {
                    if t.next.is_solved() {
                        solved = true;
                    }
                    next.push(t.next);
                }
            }
            if solved {
                break;
            }
            frontier = next;
        }
        assert!(solved, "seed {seed}: {start}");
    }
}
