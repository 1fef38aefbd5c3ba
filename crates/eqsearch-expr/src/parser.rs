//! Equation surface syntax.
//!
//! Grammar (whitespace is allowed between tokens):
//!
//! ```text
//! equation := sum ( "=" sum )?
//! sum      := product ( ("+" | "-") product )*
//! product  := unary ( ("*" | "/") unary )*
//! unary    := literal ident?          -- `2x` is Mul(2, x)
//!           | "-" unary
//!           | ident
//!           | "(" sum ")"
//! literal  := "-"? digits | "[" "-"? digits "/" digits "]"
//! ident    := [a-z][a-z0-9_]*
//! ```
//!
//! Binary operators are left-associative. A `-` glued to a digit in operand
//! position is part of the literal (`x - -3`). `=` is only accepted at the top
//! level. This is exactly the language the canonical printer emits.

use crate::expr::{Expr, Op};
use crate::Number;
use nom::{
    branch::alt,
    bytes::complete::take_while,
    character::complete::{char as pchar, digit1, multispace0, satisfy},
    combinator::{all_consuming, map, map_opt, opt, recognize},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid expression `{input}` (at byte {offset})")]
    Syntax { input: String, offset: usize },
}

pub fn parse_expr(text: &str) -> Result<Expr, ParseError> {
    let trimmed = text.trim();
    match all_consuming(equation)(trimmed) {
        Ok((_, expr)) => Ok(expr),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(ParseError::Syntax {
            input: trimmed.to_string(),
            offset: trimmed.len() - e.input.len(),
        }),
        Err(nom::Err::Incomplete(_)) => Err(ParseError::Syntax {
            input: trimmed.to_string(),
            offset: trimmed.len(),
        }),
    }
}

fn equation(input: &str) -> IResult<&str, Expr> {
    let (input, left) = sum(input)?;
    let (input, right) = opt(preceded(symbol('='), sum))(input)?;
    let (input, _) = multispace0(input)?;
    Ok((
        input,
        match right {
            Some(right) => Expr::equation(left, right),
            None => left,
        },
    ))
}

fn sum(input: &str) -> IResult<&str, Expr> {
    let (mut input, mut acc) = product(input)?;
    loop {
        let mut additive = alt((
            map(symbol('+'), |_| Op::Add),
            map(symbol('-'), |_| Op::Sub),
        ));
        let Ok((rest, op)) = additive(input) else {
            return Ok((input, acc));
        };
        let (rest, rhs) = product(rest)?;
        acc = Expr::binary(op, acc, rhs);
        input = rest;
    }
}

fn product(input: &str) -> IResult<&str, Expr> {
    let (mut input, mut acc) = unary(input)?;
    loop {
        let mut multiplicative = alt((
            map(symbol('*'), |_| Op::Mul),
            map(symbol('/'), |_| Op::Div),
        ));
        let Ok((rest, op)) = multiplicative(input) else {
            return Ok((input, acc));
        };
        let (rest, rhs) = unary(rest)?;
        acc = Expr::binary(op, acc, rhs);
        input = rest;
    }
}

fn unary(input: &str) -> IResult<&str, Expr> {
    let (input, _) = multispace0(input)?;

    if let Ok((rest, value)) = literal(input) {
        // Coefficient juxtaposition binds tighter than any operator.
        return match parse_ident(rest) {
            Ok((rest, name)) => Ok((rest, Expr::mul(Expr::num(value), Expr::var(name)))),
            Err(_) => Ok((rest, Expr::num(value))),
        };
    }

    if let Ok((rest, _)) = pchar::<&str, nom::error::Error<&str>>('-')(input) {
        let (rest, operand) = unary(rest)?;
        return Ok((rest, Expr::neg(operand)));
    }

    alt((
        map(parse_ident, |name: &str| Expr::var(name)),
        delimited(pchar('('), sum, preceded(multispace0, pchar(')'))),
    ))(input)
}

fn literal(input: &str) -> IResult<&str, Number> {
    alt((rational_literal, integer_literal))(input)
}

fn integer_literal(input: &str) -> IResult<&str, Number> {
    map(signed_digits, Number::from_integer)(input)
}

fn rational_literal(input: &str) -> IResult<&str, Number> {
    map_opt(
        delimited(
            pchar('['),
            tuple((
                preceded(multispace0, signed_digits),
                preceded(multispace0, pchar('/')),
                preceded(multispace0, signed_digits),
            )),
            preceded(multispace0, pchar(']')),
        ),
        |(numer, _, denom)| {
            if denom <= 0 {
                None
            } else {
                Some(Number::new(numer, denom))
            }
        },
    )(input)
}

fn signed_digits(input: &str) -> IResult<&str, i64> {
    map_opt(recognize(pair(opt(pchar('-')), digit1)), |s: &str| {
        s.parse::<i64>().ok()
    })(input)
}

fn parse_ident(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_lowercase()),
        take_while(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'),
    ))(input)
}

fn symbol<'a>(c: char) -> impl FnMut(&'a str) -> IResult<&'a str, char> {
    preceded(multispace0, pchar(c))
}
