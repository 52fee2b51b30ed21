//! Identity and merge behavior observed through the cache.

use normcache::{
    Cache, EntityKey, StoreValue,
    policy::{PolicyError, TypePolicies, TypePolicy, merge},
};
use serde_json::json;

use crate::helpers::*;

#[test]
fn test_equal_identity_yields_one_record() {
    let (cache, _vars) = countries_cache();
    let from_list = cache
        .identify(&us())
        .unwrap()
        .expect("Country has key fields");
    let written = cache
        .write_entity("Country", &json!({"code": "US", "name": "USA"}))
        .unwrap();
    let rewritten = cache.write_entity("Country", &us()).unwrap();

    assert_eq!(from_list, written);
    assert_eq!(written, rewritten);
    assert_eq!(written, country_key("US"));
    assert_eq!(cache.len(), 1);
    assert_eq!(
        cache.read_field(&written, "name", None).unwrap(),
        Some(StoreValue::from("United States"))
    );
}

#[test]
fn test_identify_without_typename_is_none() {
    let (cache, _vars) = countries_cache();
    assert_eq!(cache.identify(&json!({"code": "US"})).unwrap(), None);
    assert_eq!(
        cache
            .identify(&json!({"__typename": "Language", "name": "French"}))
            .unwrap(),
        None
    );
    assert!(cache.is_empty());
}

#[test]
fn test_missing_identity_field_is_an_error() {
    let (cache, _vars) = countries_cache();
    let err = cache
        .write_entity("Country", &json!({"name": "Atlantis"}))
        .unwrap_err();
    assert!(err.is_identity_missing());
    assert!(cache.is_empty());
}

fn capital_cache(policy: Option<normcache::policy::MergeFn>) -> Cache {
    let mut country = TypePolicy::new().key_fields(["code"]);
    if let Some(policy) = policy {
        country = country.merge("capital", policy);
    }
    Cache::with_policies(TypePolicies::new().add_type("Country", country))
}

fn write_capital(cache: &Cache, capital: &str) -> EntityKey {
    cache
        .write_entity("Country", &json!({"code": "FR", "capital": capital}))
        .unwrap()
}

#[test]
fn test_merge_without_policy_is_last_write_wins() {
    let cache = capital_cache(None);
    write_capital(&cache, "Paris");
    let key = write_capital(&cache, "Lyon");
    assert_eq!(cache.read_field(&key, "capital", None).unwrap(), Some("Lyon".into()));
}

#[test]
fn test_merge_prefer_incoming() {
    let cache = capital_cache(Some(merge::prefer_incoming()));
    write_capital(&cache, "Paris");
    let key = write_capital(&cache, "Lyon");
    assert_eq!(cache.read_field(&key, "capital", None).unwrap(), Some("Lyon".into()));
}

#[test]
fn test_merge_rejecting_policy_keeps_existing() {
    let cache = capital_cache(Some(merge::keep_existing()));
    write_capital(&cache, "Paris");
    let key = write_capital(&cache, "Lyon");
    assert_eq!(cache.read_field(&key, "capital", None).unwrap(), Some("Paris".into()));
}

#[test]
fn test_union_list_merge() {
    let policies = TypePolicies::new().add_type(
        "Country",
        TypePolicy::new()
            .key_fields(["code"])
            .merge("languages", merge::union_list()),
    );
    let cache = Cache::with_policies(policies);
    cache
        .write_entity("Country", &json!({"code": "BE", "languages": ["nl", "fr"]}))
        .unwrap();
    let key = cache
        .write_entity("Country", &json!({"code": "BE", "languages": ["fr", "de"]}))
        .unwrap();

    assert_eq!(
        cache.read_field(&key, "languages", None).unwrap(),
        Some(StoreValue::List(vec!["nl".into(), "fr".into(), "de".into()]))
    );
}

#[test]
fn test_extract_renders_references() {
    let (cache, _vars) = countries_cache();
    cache
        .write_query(&countries_shape(), &json!({}), &countries_result(&[fr()]))
        .unwrap();

    let snapshot = cache.extract();
    assert_eq!(
        snapshot["ROOT_QUERY"]["countries"],
        json!([{"__ref": r#"Country:{"code":"FR"}"#}])
    );
    assert_eq!(snapshot[r#"Country:{"code":"FR"}"#]["capital"], "Paris");
    assert_eq!(snapshot[r#"Country:{"code":"FR"}"#]["__typename"], "Country");
}

#[test]
fn test_identify_looks_only_at_key_fields() {
    let policies = TypePolicies::new()
        .add_type("Continent", TypePolicy::new().key_fields(["code"]))
        .add_type(
            "Country",
            TypePolicy::new().key_fields(["code"]).merge(
                "name",
                merge::from_fn(|_, _, context| {
                    Err(PolicyError::MergeFailed {
                        typename: context.typename.to_string(),
                        field: context.field.to_string(),
                        reason: "rejected".to_string(),
                    }
                    .into())
                }),
            ),
        );
    let cache = Cache::with_policies(policies);
    cache.write_entity("Country", &json!({"code": "US"})).unwrap();

    // The continent lacks its key field and the name merge fails; neither matters for the key.
    let payload = json!({
        "__typename": "Country",
        "code": "US",
        "name": "United States",
        "continent": {"__typename": "Continent", "name": "North America"},
    });
    assert_eq!(cache.identify(&payload).unwrap(), Some(country_key("US")));

    let err = cache
        .identify(&json!({"__typename": "Country", "code": ["U", "S"]}))
        .unwrap_err();
    assert!(matches!(
        err,
        normcache::Error::Store(normcache::store::StoreError::InvalidIdentity { .. })
    ));
    assert!(
        cache
            .identify(&json!({"__typename": "Country", "name": "Atlantis"}))
            .unwrap_err()
            .is_identity_missing()
    );
}
