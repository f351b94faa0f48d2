//! The filter condition language.
//!
//! Rule text such as `{ measurement = 'cpu' and host notin ['a'] }; { status = 'debug' }`
//! compiles into [`WhereConditions`]: a point matches if any `{}` group holds,
//! and a group holds if all of its comma-separated expressions hold.

pub mod ast;
pub mod errors;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{Node, Op, WhereCondition, WhereConditions};
pub use errors::ParseError;
pub use eval::Subject;

/// Compiles rule text. The first lexical or grammatical error aborts the whole string.
pub fn compile(text: &str) -> Result<WhereConditions, ParseError> {
    parser::Parser::new(text).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_compile_is_reentrant_across_threads() {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                std::thread::spawn(move || {
                    let text = format!("{{ a = {i} and (b in ['x', 'y'] or c > {i}.5) }}");
                    compile(&text).map(|conds| conds.to_string())
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            let printed = handle
                .join()
                .expect("thread panicked")
                .expect("failed to compile");
            assert_eq!(
                printed,
                format!("{{ a = {i} and (b in ['x', 'y'] or c > {i}.5) }}")
            );
        }
    }

    #[test]
    fn test_reparse_known_rules() {
        for text in [
            "{ measurement = 'cpu' and (host notin ['ubt-dev-01']) }",
            "{a>1}; {b>1}",
            "{}",
            "{ `host name` = 'a\\'b', n >= -0x10, f < 1e-7 }",
            "{ source = re(`^nginx-\\d+`) || status in ['warn', \"error\"] }",
            "{ a = 1 or b = 2 and c = 3 or d = true }",
        ] {
            let first = compile(text).expect("failed to compile");
            let second = compile(&first.to_string()).expect("failed to recompile");
            assert_eq!(first, second, "round trip changed {text:?}");
        }
    }

    fn ident() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-z_][a-z0-9_]{0,8}",
            "[a-z]{1,4} [a-z]{1,4}",
        ]
    }

    fn literal() -> impl Strategy<Value = String> {
        prop_oneof![
            any::<i64>().prop_map(|i| i.to_string()),
            any::<f64>()
                .prop_filter("finite", |f| f.is_finite())
                .prop_map(|f| format!("{f:?}")),
            "[ -~]{0,12}".prop_map(|s| format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))),
            any::<bool>().prop_map(|b| b.to_string()),
            "[a-z0-9.]{1,8}".prop_map(|p| format!("re(`^{p}$`)")),
        ]
    }

    fn comparison() -> impl Strategy<Value = String> {
        let op = prop_oneof![
            Just("="),
            Just("!="),
            Just("<"),
            Just("<="),
            Just(">"),
            Just(">="),
        ];
        prop_oneof![
            (ident(), op, literal()).prop_map(|(k, op, v)| format!("`{k}` {op} {v}")),
            (ident(), prop::bool::ANY, prop::collection::vec(literal(), 0..4)).prop_map(
                |(k, negate, items)| {
                    let kw = if negate { "notin" } else { "in" };
                    format!("`{k}` {kw} [{}]", items.join(", "))
                }
            ),
        ]
    }

    fn expr() -> impl Strategy<Value = String> {
        comparison().prop_recursive(4, 16, 2, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{a} and {b}")),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{a} || {b}")),
                inner.prop_map(|a| format!("({a})")),
            ]
        })
    }

    fn rules() -> impl Strategy<Value = String> {
        prop::collection::vec(prop::collection::vec(expr(), 0..3), 0..3).prop_map(|groups| {
            groups
                .into_iter()
                .map(|g| format!("{{{}}}", g.join(", ")))
                .collect::<Vec<_>>()
                .join("; ")
        })
    }

    proptest! {
        #[test]
        fn test_stringify_reparse_is_stable(text in rules()) {
            let first = compile(&text).expect("generated rule should compile");
            let printed = first.to_string();
            let second = compile(&printed).expect("printed rule should compile");
            prop_assert_eq!(first, second);
        }
    }
}
