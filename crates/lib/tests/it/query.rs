//! Writing and reading result trees.

use std::collections::BTreeMap;

use normcache::{
    ArgValue, Cache, CacheConfig, EntityKey, FieldKey, FieldSelection, ReadOutcome, SelectionSet,
    StoreValue,
    policy::{TypePolicies, TypePolicy},
    query::QueryError,
};
use serde_json::json;

use crate::helpers::*;

#[test]
fn test_round_trip_applies_client_fields() {
    let (cache, _vars) = countries_cache();
    let args = code_filter("U");
    cache
        .write_query(&countries_shape(), &args, &countries_result(&[us()]))
        .unwrap();

    assert_eq!(
        cache.read_query(&countries_shape(), &args).unwrap(),
        ReadOutcome::Complete(json!({
            "countries": [{
                "__typename": "Country",
                "code": "US",
                "name": "United States",
                "capital": "Washington D.C.",
                "emoji": "🇺🇸",
                "selected": false,
            }]
        }))
    );
}

#[test]
fn test_argument_order_does_not_matter() {
    let (cache, _vars) = countries_cache();
    let built_forward = json!({"arg": {"code": {"regex": "U"}, "continent": {"eq": "NA"}}});
    let mut reordered = serde_json::Map::new();
    reordered.insert("continent".to_string(), json!({"eq": "NA"}));
    reordered.insert("code".to_string(), json!({"regex": "U"}));
    let built_backward = json!({ "arg": reordered });

    cache
        .write_query(&countries_shape(), &built_forward, &countries_result(&[us()]))
        .unwrap();
    let outcome = cache.read_query(&countries_shape(), &built_backward).unwrap();
    assert_eq!(codes(outcome.data().unwrap()), vec!["US"]);

    let root = cache.record(&EntityKey::Root).unwrap();
    assert_eq!(root.len(), 1);
}

#[test]
fn test_literal_and_variable_arguments_share_a_slot() {
    let (cache, _vars) = countries_cache();
    cache
        .write_query(&countries_shape(), &code_filter("F"), &countries_result(&[fr()]))
        .unwrap();

    let mut code = BTreeMap::new();
    code.insert("regex".to_string(), ArgValue::literal("F"));
    let mut filter = BTreeMap::new();
    filter.insert("code".to_string(), ArgValue::Object(code));
    let literal = SelectionSet::new().field(
        FieldSelection::new("countries")
            .arg("filter", ArgValue::Object(filter))
            .select(SelectionSet::new().scalar("code")),
    );

    let outcome = cache.read_query(&literal, &json!({})).unwrap();
    assert_eq!(outcome, ReadOutcome::Complete(json!({"countries": [{"code": "FR"}]})));
}

#[test]
fn test_different_arguments_are_different_slots() {
    let (cache, _vars) = countries_cache();
    cache
        .write_query(&countries_shape(), &code_filter("U"), &countries_result(&[us()]))
        .unwrap();

    let outcome = cache.read_query(&countries_shape(), &code_filter("F")).unwrap();
    assert_eq!(outcome.missing(), ["countries"]);
}

#[test]
fn test_missing_entity_field_is_incomplete() {
    let (cache, _vars) = countries_cache();
    let partial = json!({"countries": [{"__typename": "Country", "code": "US", "name": "USA"}]});
    cache.write_query(&countries_shape(), &json!({}), &partial).unwrap();

    let outcome = cache.read_query(&countries_shape(), &json!({})).unwrap();
    assert!(!outcome.is_complete());
    assert_eq!(
        outcome.missing(),
        ["countries.0.capital", "countries.0.emoji"]
    );
}

#[test]
fn test_stored_null_is_not_missing() {
    let (cache, _vars) = countries_cache();
    let shape = SelectionSet::new().scalar("motd");
    cache.write_query(&shape, &json!({}), &json!({"motd": null})).unwrap();

    assert_eq!(
        cache.read_query(&shape, &json!({})).unwrap(),
        ReadOutcome::Complete(json!({"motd": null}))
    );
    assert_eq!(
        cache.read_field(&EntityKey::Root, "motd", None).unwrap(),
        Some(StoreValue::null())
    );
    assert_eq!(cache.read_field(&EntityKey::Root, "other", None).unwrap(), None);
}

#[test]
fn test_objects_without_identity_stay_inline() {
    let policies = TypePolicies::new().add_type("Country", TypePolicy::new().key_fields(["code"]));
    let cache = Cache::with_policies(policies);
    let shape = SelectionSet::new().field(
        FieldSelection::new("country").arg("code", json!("FR")).select(
            SelectionSet::new().scalars(["__typename", "code"]).field(
                FieldSelection::new("languages")
                    .select(SelectionSet::new().scalars(["__typename", "name"])),
            ),
        ),
    );
    let result = json!({
        "country": {
            "__typename": "Country",
            "code": "FR",
            "languages": [{"__typename": "Language", "name": "French"}],
        }
    });
    cache.write_query(&shape, &json!({}), &result).unwrap();

    // ROOT and the country; the language lives inside the country record.
    assert_eq!(cache.len(), 2);
    let country = cache.record(&country_key("FR")).unwrap();
    let languages = country.get_field("languages").unwrap().as_list().unwrap();
    assert_eq!(languages[0].as_inline().unwrap().typename(), Some("Language"));

    let root = cache.record(&EntityKey::Root).unwrap();
    assert!(
        root.get(&FieldKey::with_args("country", &json!({"code": "FR"})))
            .is_some()
    );
    assert_eq!(cache.read_query(&shape, &json!({})).unwrap(), ReadOutcome::Complete(result));
}

#[test]
fn test_aliases_read_back_under_alias() {
    let (cache, _vars) = countries_cache();
    let shape = SelectionSet::new().field(
        FieldSelection::new("countries").alias("all").select(
            SelectionSet::new()
                .scalars(["code", "name", "emoji"])
                .field(FieldSelection::new("nameWithEmoji").alias("label").client()),
        ),
    );
    cache
        .write_query(&shape, &json!({}), &json!({"all": [fr()]}))
        .unwrap();

    assert_eq!(
        cache.read_query(&shape, &json!({})).unwrap(),
        ReadOutcome::Complete(json!({"all": [{
            "code": "FR",
            "name": "France",
            "emoji": "🇫🇷",
            "label": "France 🇫🇷",
        }]}))
    );
    assert!(
        cache
            .record(&EntityKey::Root)
            .unwrap()
            .get_field("countries")
            .is_some()
    );
}

#[test]
fn test_failed_write_is_atomic() {
    let (cache, _vars) = countries_cache();
    cache
        .write_query(&countries_shape(), &json!({}), &countries_result(&[fr()]))
        .unwrap();

    let broken = countries_result(&[
        country("FR", "La France", "Paris", "🇫🇷"),
        json!({"__typename": "Country", "name": "Nowhere"}),
    ]);
    let err = cache
        .write_query(&countries_shape(), &json!({}), &broken)
        .unwrap_err();
    assert!(err.is_identity_missing());

    let outcome = cache.read_query(&countries_shape(), &json!({})).unwrap();
    assert_eq!(outcome.data().unwrap()["countries"][0]["name"], "France");
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_result_root_must_be_an_object() {
    let (cache, _vars) = countries_cache();
    let err = cache
        .write_query(&countries_shape(), &json!({}), &json!([1, 2]))
        .unwrap_err();
    assert!(err.is_query_error());
    assert!(matches!(
        err,
        normcache::Error::Query(QueryError::ExpectedObject { .. })
    ));
}

#[test]
fn test_require_typename_rejects_untyped_objects() {
    let (cache, _vars) = countries_cache_with(CacheConfig::default().with_require_typename(true));
    let untyped = json!({"countries": [{"code": "US"}]});
    let err = cache
        .write_query(&countries_shape(), &json!({}), &untyped)
        .unwrap_err();
    match err {
        normcache::Error::Query(err) => assert_eq!(err.path(), "countries.0"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(cache.is_empty());
}

#[test]
fn test_custom_typename_field() {
    let config = CacheConfig::default().with_typename_field("kind");
    let (cache, _vars) = countries_cache_with(config);
    let shape = SelectionSet::new().field(
        FieldSelection::new("countries").select(SelectionSet::new().scalars(["kind", "code"])),
    );
    let result = json!({"countries": [{"kind": "Country", "code": "FR"}]});
    cache.write_query(&shape, &json!({}), &result).unwrap();

    assert!(cache.contains(&country_key("FR")));
    assert_eq!(
        cache.read_query(&shape, &json!({})).unwrap(),
        ReadOutcome::Complete(result)
    );
}

#[test]
fn test_untyped_inline_record_omits_typename() {
    let policies = TypePolicies::new().add_type("Country", TypePolicy::new().key_fields(["code"]));
    let cache = Cache::with_policies(policies);
    let shape = SelectionSet::new().field(
        FieldSelection::new("country").arg("code", json!("FR")).select(
            SelectionSet::new().scalars(["__typename", "code"]).field(
                FieldSelection::new("languages")
                    .select(SelectionSet::new().scalars(["__typename", "name"])),
            ),
        ),
    );
    let result = json!({
        "country": {
            "__typename": "Country",
            "code": "FR",
            "languages": [{"name": "French"}],
        }
    });
    cache.write_query(&shape, &json!({}), &result).unwrap();

    assert_eq!(
        cache.read_query(&shape, &json!({})).unwrap(),
        ReadOutcome::Complete(json!({
            "country": {
                "__typename": "Country",
                "code": "FR",
                "languages": [{"name": "French"}],
            }
        }))
    );
}
