use eqsearch_expr::{parse_expr, Expr, Number, Op, Position};
use proptest::prelude::*;

fn leaf() -> impl Strategy<Value = Expr> {
    prop_oneof![
        (-20i64..=20).prop_map(Expr::int),
        (-9i64..=9, 1i64..=6).prop_map(|(n, d)| Expr::num(Number::new(n, d))),
        proptest::string::string_regex("[a-z][a-z0-9]{0,2}")
            .unwrap()
            .prop_map(Expr::var),
    ]
}

fn term() -> impl Strategy<Value = Expr> {
    leaf().prop_recursive(5, 32, 2, |inner| {
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

fn expression() -> impl Strategy<Value = Expr> {
    prop_oneof![
        term(),
        (term(), term()).prop_map(|(l, r)| Expr::equation(l, r)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn canonical_form_is_stable_under_reparse(e in expression()) {
        let canonical = e.canonical();
        let reparsed = parse_expr(&canonical).expect("canonical output must parse");
        prop_assert_eq!(reparsed.canonical(), canonical);
    }

    #[test]
    fn reparse_reproduces_the_same_tree(e in expression()) {
        let reparsed = parse_expr(&e.canonical()).expect("canonical output must parse");
        prop_assert_eq!(reparsed, e);
    }

    #[test]
    fn relative_offsets_roundtrip_between_any_two_sites(e in expression(), a in 0usize..64, b in 0usize..64) {
        let positions = e.positions();
        let from = &positions[a % positions.len()];
        let to = &positions[b % positions.len()];
        let rel = to.relative_to(from);
        let offset = from.offset(&rel);
        prop_assert_eq!(offset.as_ref(), Some(to));
    }

    #[test]
    fn preorder_index_and_position_agree(e in expression(), i in 0usize..64) {
        let index = i % e.size();
        let pos: Position = e.position_at_preorder(index).expect("index in range");
        prop_assert_eq!(e.preorder_index(&pos), Some(index));
        prop_assert!(e.at(&pos).is_some());
    }
}

#[test]
fn expr_serializes_as_its_canonical_string() {
    let e = parse_expr("2 * x + 3 = 7").expect("parse");
    let json = serde_json::to_string(&e).expect("serialize");
    assert_eq!(json, "\"2x + 3 = 7\"");
    let back: Expr = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, e);
}
