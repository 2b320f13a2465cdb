//! Property-based test generators using proptest.
//!
//! Strategies produce values and filter expressions over the library
//! catalog from [`crate::fixtures`].

use entiorm_codec::Value;
use entiorm_core::query::{FilterArg, FilterCall};
use proptest::prelude::*;

/// Strategy for scalar values storable in a plain property.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        "[a-zA-Z %_]{0,12}".prop_map(Value::Text),
    ]
}

/// Strategy for book titles, biased towards `LIKE` metacharacters.
pub fn title_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-c%_\\\\]{0,8}").expect("Invalid regex")
}

/// Strategy for `like` prefixes; same alphabet as [`title_strategy`].
pub fn like_prefix_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-c%_\\\\]{0,4}").expect("Invalid regex")
}

/// Strategy for comparison operator symbols.
pub fn compare_operator_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["=", "!=", "<", "<=", ">", ">="])
}

/// Strategy for valid leaf calls on `Book`.
pub fn leaf_call_strategy() -> impl Strategy<Value = FilterCall> {
    prop_oneof![
        "[a-c]{0,3}".prop_map(|title| FilterCall::equals("title", title.as_str())),
        (1800i64..2000).prop_map(|year| FilterCall::equals("year", year)),
        (compare_operator_strategy(), 1800i64..2000)
            .prop_map(|(op, year)| FilterCall::compare("year", op, year)),
        like_prefix_strategy().prop_map(|prefix| FilterCall::like("title", &prefix)),
        prop::collection::vec(7i64..=8, 0..3).prop_map(|ids| {
            FilterCall::equals(
                "author",
                Value::Array(ids.into_iter().map(Value::Integer).collect()),
            )
        }),
    ]
}

/// Strategy for `AND`/`OR` trees over [`leaf_call_strategy`].
pub fn filter_call_strategy() -> impl Strategy<Value = FilterCall> {
    leaf_call_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(|calls| FilterCall::and(calls)),
            prop::collection::vec(inner, 0..4).prop_map(|calls| FilterCall::or(calls)),
        ]
    })
}

/// Strategy for calls that must fail to resolve: unknown functions,
/// unknown properties or malformed arguments, possibly nested.
pub fn invalid_call_strategy() -> impl Strategy<Value = FilterCall> {
    let broken = prop_oneof![
        "[a-z]{3,8}Op".prop_map(|name| FilterCall::new(name, vec![])),
        "[a-z]{3,8}x".prop_map(|property| FilterCall::equals(&property, 1i64)),
        Just(FilterCall::new("equals", vec![FilterArg::from("title")])),
        Just(FilterCall::compare("year", "~", 1i64)),
        Just(FilterCall::like("title->name", "a")),
    ];
    (broken, leaf_call_strategy(), any::<bool>()).prop_map(|(broken, valid, conjunction)| {
        if conjunction {
            FilterCall::and([valid, broken])
        } else {
            FilterCall::or([broken, valid])
        }
    })
}
