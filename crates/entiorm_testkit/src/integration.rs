//! Cross-crate integration test helpers.
//!
//! Scenario functions exercising entities, containers, snapshots and both
//! query backends together, plus a tiny evaluator for builder fragments so
//! the two backends can be compared on the same rows.

use crate::fixtures::Library;
use entiorm_codec::Value;
use entiorm_core::query::{
    ArrayCollectionHelper, ArrayFunctionResolver, BuilderFunctionResolver, CompareOperator,
    FilterCall, QueryBuilder, QueryBuilderHelper, QueryFragment, QueryFunctionResolver,
    UnderscoreReflection,
};
use entiorm_core::to_array::into_value;
use entiorm_core::{CoreResult, Entity, EntityRef, EntitySnapshot, ToArrayMode};
use std::sync::Arc;

/// Matches `text` against a SQL `LIKE` pattern escaped with backslashes.
pub fn sql_like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '\\' => LikeToken::Literal(chars.next().unwrap_or('\\')),
            '%' => LikeToken::Any,
            '_' => LikeToken::One,
            other => LikeToken::Literal(other),
        });
    }
    like_tokens(&text, &tokens)
}

#[derive(Clone, Copy)]
enum LikeToken {
    Literal(char),
    One,
    Any,
}

fn like_tokens(text: &[char], tokens: &[LikeToken]) -> bool {
    match tokens.split_first() {
        None => text.is_empty(),
        Some((LikeToken::Any, rest)) => (0..=text.len()).any(|skip| like_tokens(&text[skip..], rest)),
        Some((LikeToken::One, rest)) => !text.is_empty() && like_tokens(&text[1..], rest),
        Some((LikeToken::Literal(c), rest)) => {
            text.first() == Some(c) && like_tokens(&text[1..], rest)
        }
    }
}

/// Evaluates a fragment rendered by the default builder functions against
/// one row, with SQL null semantics. `column` maps qualified column names
/// to row values.
pub fn fragment_matches(fragment: &QueryFragment, column: &dyn Fn(&str) -> Value) -> bool {
    match fragment {
        QueryFragment::And(parts) => parts.iter().all(|p| fragment_matches(p, column)),
        QueryFragment::Or(parts) => parts.iter().any(|p| fragment_matches(p, column)),
        QueryFragment::Expression { sql, args } => expression_matches(sql, args, column),
    }
}

fn expression_matches(sql: &str, args: &[Value], column: &dyn Fn(&str) -> Value) -> bool {
    match sql {
        "1=1" => return true,
        "1=0" => return false,
        _ => {}
    }
    if let Some(name) = sql.strip_suffix(" IS NOT NULL") {
        return !column(name).is_null();
    }
    if let Some(name) = sql.strip_suffix(" IS NULL") {
        return column(name).is_null();
    }
    if let Some((name, _)) = sql.split_once(" IN (") {
        let value = column(name);
        return !value.is_null() && args.contains(&value);
    }
    if let Some((name, _)) = sql.split_once(" LIKE ") {
        return match (column(name).as_text(), args.first().and_then(Value::as_text)) {
            (Some(text), Some(pattern)) => sql_like(text, pattern),
            _ => false,
        };
    }
    let mut words = sql.split_whitespace();
    let (Some(name), Some(symbol), Some(arg)) = (words.next(), words.next(), args.first()) else {
        panic!("unsupported fragment: {sql}");
    };
    let value = column(name);
    if value.is_null() || arg.is_null() {
        return false;
    }
    CompareOperator::parse(symbol)
        .unwrap_or_else(|_| panic!("unsupported operator in fragment: {sql}"))
        .matches(&value, arg)
}

/// Relationship scenarios over the seeded library.
pub mod relationships {
    use super::*;

    /// A loaded book resolves its author from the raw id through the
    /// attached repository.
    pub fn test_has_one_resolves_from_raw_id(library: &Library) {
        let book = library.get("Book", 1);
        let mut book = book.write();
        assert_eq!(book.get_raw_value("author").unwrap(), Value::Integer(7));

        let author = book.get_entity("author").unwrap().expect("author is set");
        assert!(Arc::ptr_eq(&author, &library.get("Author", 7)));
        assert_eq!(
            author.write().get("name").unwrap(),
            Value::from("Frank Herbert")
        );
        assert!(!book.is_modified(Some("author")).unwrap());
    }

    /// One-has-many collections are found through the reverse property.
    pub fn test_one_has_many_by_reverse(library: &Library) {
        let author = library.get("Author", 7);
        let books = author.write().get_collection("books").unwrap();
        let mut ids: Vec<i64> = books
            .iter()
            .filter_map(|b| b.read().id().and_then(|id| id.as_integer()))
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, [1, 2, 4]);
    }

    /// Adding to a many-has-many collection marks the property modified
    /// and shows up in the raw ids.
    pub fn test_many_has_many_add(library: &Library) {
        let book = library.get("Book", 3);
        let tag = library.get("Tag", 3);
        let mut book = book.write();
        assert!(book.add_to("tags", Arc::clone(&tag)).unwrap());
        assert!(!book.add_to("tags", tag).unwrap());
        assert!(book.is_modified(Some("tags")).unwrap());
        assert_eq!(
            book.get_raw_value("tags").unwrap(),
            Value::Array(vec![Value::Integer(3)])
        );
    }
}

/// Lifecycle scenarios: persistence, cloning and snapshots.
pub mod lifecycle {
    use super::*;

    /// A duplicate shares members but never collections with its source.
    pub fn test_clone_independence(library: &Library) {
        let source = library.get("Book", 1);
        let mut copy = source.write().duplicate().unwrap();

        assert!(!copy.is_persisted());
        assert!(copy.is_modified(None).unwrap());
        assert_eq!(copy.get_raw_value("id").unwrap(), Value::Null);
        assert_eq!(copy.get_collection("tags").unwrap().len(), 2);

        copy.remove_from("tags", &library.get("Tag", 1)).unwrap();
        assert_eq!(copy.get_collection("tags").unwrap().len(), 1);
        assert_eq!(source.write().get_collection("tags").unwrap().len(), 2);
        assert!(!source.read().is_modified(None).unwrap());

        assert!(!copy.has_value("id").unwrap());
        assert!(copy.get("id").unwrap_err().is_invalid_state());
        copy.on_persist(5i64).unwrap();
        assert_eq!(copy.get("id").unwrap(), Value::Integer(5));
    }

    /// Serialize, encode, decode and deserialize restores the same state.
    pub fn test_snapshot_round_trip(library: &Library) {
        let book = library.get("Book", 2);
        let mut book = book.write();
        book.set_value("title", "Dune Messiah (revised)").unwrap();
        book.get_entity("author").unwrap();

        let snapshot = book.serialize();
        let bytes = snapshot.encode().unwrap();
        let decoded = EntitySnapshot::decode(&bytes).unwrap();
        assert_eq!(decoded, snapshot);

        let mut restored =
            Entity::deserialize(library.metadata("Book"), decoded).unwrap();
        restored.on_attach(library.repository(), library.metadata("Book"));
        assert_eq!(restored.persisted_id(), Some(&Value::Integer(2)));
        assert!(restored.is_modified(Some("title")).unwrap());
        assert!(!restored.is_modified(Some("year")).unwrap());
        assert!(restored.is_initialized("author"));
        assert_eq!(
            restored.get("title").unwrap(),
            Value::from("Dune Messiah (revised)")
        );
        let author = restored.get_entity("author").unwrap().expect("author is set");
        assert!(Arc::ptr_eq(&author, &library.get("Author", 7)));
    }

    fn restore(library: &Library, entity: &Entity) -> Entity {
        let bytes = entity.serialize().encode().unwrap();
        let snapshot = EntitySnapshot::decode(&bytes).unwrap();
        let mut restored = Entity::deserialize(library.metadata("Book"), snapshot).unwrap();
        restored.on_attach(library.repository(), library.metadata("Book"));
        restored
    }

    fn observable(entity: &mut Entity) -> (bool, bool, Option<Value>, Value) {
        let modified = entity.is_modified(None).unwrap();
        let array = entity.to_array(ToArrayMode::AsId).unwrap();
        (
            modified,
            entity.is_persisted(),
            entity.persisted_id().cloned(),
            into_value(array),
        )
    }

    /// A snapshot round trip preserves the modified flags, persistence,
    /// identity and the id-shaped export, for transient and loaded books.
    pub fn test_snapshot_preserves_observable_state(library: &Library) {
        let mut draft = library.create("Book");
        draft
            .set_value("title", "Persuasion")
            .unwrap()
            .set_value("author", library.get("Author", 8))
            .unwrap();
        let mut restored = restore(library, &draft);
        let expected = observable(&mut draft);
        assert!(expected.0);
        assert!(!expected.1);
        assert_eq!(expected.2, None);
        assert_eq!(observable(&mut restored), expected);

        let loaded = library.get("Book", 1);
        let mut loaded = loaded.write();
        loaded.set_value("year", 1966i64).unwrap();
        assert!(!loaded.is_initialized("author"));
        let mut restored = restore(library, &loaded);
        assert!(!restored.is_initialized("author"));
        assert!(!restored.is_modified(Some("title")).unwrap());
        let expected = observable(&mut loaded);
        assert!(expected.0);
        assert_eq!(expected.2, Some(Value::Integer(1)));
        assert_eq!(expected.3.get("author"), Some(&Value::Integer(7)));
        assert_eq!(observable(&mut restored), expected);
    }

    /// Persisting a new entity assigns identity and clears modifications.
    pub fn test_persist_and_remove(library: &Library) {
        let mut book = library.create("Book");
        book.set_value("title", "Persuasion")
            .unwrap()
            .set_value("author", library.get("Author", 8))
            .unwrap();
        assert!(book.is_modified(Some("title")).unwrap());

        book.on_persist(4i64).unwrap();
        assert_eq!(book.persisted_id(), Some(&Value::Integer(4)));
        assert!(!book.is_modified(None).unwrap());
        assert_eq!(book.get_raw_value("author").unwrap(), Value::Integer(8));

        book.on_after_remove();
        assert!(!book.is_persisted());
    }
}

/// Query scenarios running both backends over the seeded books.
pub mod queries {
    use super::*;

    /// Ids of the seeded books the array backend selects.
    pub fn array_matches(library: &Library, call: &FilterCall) -> CoreResult<Vec<i64>> {
        let helper = ArrayCollectionHelper::new(Arc::clone(&library.catalog), "Book")?;
        let books = library.map.all("Book");
        let matched = ArrayFunctionResolver::new().filter(&helper, call, &books)?;
        Ok(ids(&matched))
    }

    /// Ids of the seeded books the builder backend's fragment selects.
    pub fn builder_matches(library: &Library, call: &FilterCall) -> CoreResult<Vec<i64>> {
        let helper = QueryBuilderHelper::new(
            Arc::clone(&library.catalog),
            "Book",
            Arc::new(UnderscoreReflection),
            QueryBuilder::new("book", "e"),
        )?;
        let fragment = BuilderFunctionResolver::new().resolve_call(&helper, call)?;
        let mut matched = Vec::new();
        for book in library.map.all("Book") {
            let book = book.read();
            let column = |name: &str| {
                let property = match name.strip_prefix("e.") {
                    Some("author_id") => "author",
                    Some(other) => other,
                    None => panic!("unexpected column {name}"),
                };
                book.get_raw_value(property).unwrap_or_default()
            };
            if fragment_matches(&fragment, &column) {
                matched.extend(book.id().and_then(|id| id.as_integer()));
            }
        }
        Ok(matched)
    }

    fn ids(entities: &[EntityRef]) -> Vec<i64> {
        entities
            .iter()
            .filter_map(|e| e.read().id().and_then(|id| id.as_integer()))
            .collect()
    }

    /// `AND` and `OR` combine default functions on both backends.
    pub fn test_and_or(library: &Library) {
        let call = FilterCall::or([
            FilterCall::and([
                FilterCall::like("title", "Dune"),
                FilterCall::compare("year", ">", 1966i64),
            ]),
            FilterCall::equals("author", 8i64),
        ]);
        assert_eq!(array_matches(library, &call).unwrap(), [2, 3]);
        assert_eq!(builder_matches(library, &call).unwrap(), [2, 3]);
    }

    /// `!=` against a value skips books without one on both backends.
    pub fn test_not_equal_skips_null(library: &Library) {
        let call = FilterCall::compare("year", "!=", 1965i64);
        assert_eq!(array_matches(library, &call).unwrap(), [2, 3]);
        assert_eq!(builder_matches(library, &call).unwrap(), [2, 3]);

        let missing = FilterCall::equals("year", Value::Null);
        assert_eq!(array_matches(library, &missing).unwrap(), [4]);
        assert_eq!(builder_matches(library, &missing).unwrap(), [4]);
    }

    /// Unknown operators fail on both backends, naming the backend.
    pub fn test_unknown_operator(library: &Library) {
        let call = FilterCall::and([
            FilterCall::equals("title", "Dune"),
            FilterCall::new("unknownOp", vec![]),
        ]);
        let array = array_matches(library, &call).unwrap_err();
        let builder = builder_matches(library, &call).unwrap_err();
        assert!(array.is_logic() && builder.is_logic());
        assert!(array.to_string().contains("unknownOp"));
        assert!(array.to_string().contains("array"));
        assert!(builder.to_string().contains("builder"));
    }
}
