//! Read policies: computed fields, variable reads and explicit dereference.

use normcache::{
    Cache, FieldSelection, ReadOutcome, SelectionSet, StoreValue,
    policy::{PolicyError, TypePolicies, TypePolicy},
};
use serde_json::json;

use crate::helpers::*;

#[test]
fn test_computed_sibling_field() {
    let (cache, _vars) = countries_cache();
    let key = cache.write_entity("Country", &fr()).unwrap();

    assert_eq!(
        cache.read_field(&key, "nameWithEmoji", None).unwrap(),
        Some(StoreValue::from("France 🇫🇷"))
    );
}

#[test]
fn test_selected_follows_variable_without_rewrite() {
    let (cache, vars) = countries_cache();
    let us = cache.write_entity("Country", &us()).unwrap();
    let fr = cache.write_entity("Country", &fr()).unwrap();
    assert_eq!(cache.read_field(&us, "selected", None).unwrap(), Some(false.into()));

    vars.selected.set(SelectedCountry::code("US"));
    assert_eq!(cache.read_field(&us, "selected", None).unwrap(), Some(true.into()));
    assert_eq!(cache.read_field(&fr, "selected", None).unwrap(), Some(false.into()));

    vars.selected.set(SelectedCountry::code("FR"));
    assert_eq!(cache.read_field(&us, "selected", None).unwrap(), Some(false.into()));
    assert_eq!(cache.read_field(&fr, "selected", None).unwrap(), Some(true.into()));
}

#[test]
fn test_read_policy_sees_stored_value() {
    let policies = TypePolicies::new().add_type(
        "Country",
        TypePolicy::new().key_fields(["code"]).read("name", |existing, _| {
            Ok(existing
                .and_then(StoreValue::as_str)
                .map(|name| StoreValue::from(name.to_uppercase())))
        }),
    );
    let cache = Cache::with_policies(policies);
    let key = cache.write_entity("Country", &fr()).unwrap();

    assert_eq!(cache.read_field(&key, "name", None).unwrap(), Some("FRANCE".into()));
    assert_eq!(cache.read_field(&key, "missing", None).unwrap(), None);
}

#[test]
fn test_read_ref_field_dereferences_explicitly() {
    let policies = TypePolicies::new()
        .add_type("Country", TypePolicy::new().key_fields(["code"]))
        .add_type(
            "City",
            TypePolicy::new()
                .key_fields(["name"])
                .read("countryName", |_, ctx| {
                    let Some(StoreValue::Ref(country)) = ctx.read_field("country")? else {
                        return Ok(None);
                    };
                    ctx.read_ref_field(&country, "name")
                }),
        );
    let cache = Cache::with_policies(policies);
    let city = cache
        .write_entity(
            "City",
            &json!({
                "name": "Lyon",
                "country": {"__typename": "Country", "code": "FR", "name": "France"},
            }),
        )
        .unwrap();

    assert_eq!(cache.read_field(&city, "countryName", None).unwrap(), Some("France".into()));
    assert!(cache.contains(&country_key("FR")));
}

#[test]
fn test_failing_policy_propagates() {
    let policies = TypePolicies::new().add_type(
        "Query",
        TypePolicy::new().read("broken", |_, ctx| {
            Err(PolicyError::ReadFailed {
                typename: ctx.typename().to_string(),
                field: ctx.field().name().to_string(),
                reason: "not configured".to_string(),
            }
            .into())
        }),
    );
    let cache = Cache::with_policies(policies);
    let shape = SelectionSet::new().scalar("broken");

    let err = cache.read_query(&shape, &json!({})).unwrap_err();
    assert!(err.is_policy_error());
    assert_eq!(err.module(), "policy");
}

#[test]
fn test_self_referential_policy_hits_recursion_limit() {
    let policies = TypePolicies::new().add_type(
        "Query",
        TypePolicy::new().read("loop", |_, ctx| ctx.read_field("loop")),
    );
    let cache = Cache::with_policies(policies);

    let err = cache
        .read_query(&SelectionSet::new().scalar("loop"), &json!({}))
        .unwrap_err();
    assert!(matches!(
        err,
        normcache::Error::Policy(PolicyError::RecursionLimit { .. })
    ));
}

#[test]
fn test_typed_sibling_lookup_reports_unexpected_value() {
    let policies = TypePolicies::new().add_type(
        "Country",
        TypePolicy::new()
            .key_fields(["code"])
            .read("label", |_, ctx| {
                let population = ctx.read_field_as::<u64>("population")?;
                Ok(population.map(|n| StoreValue::from(n.to_string())))
            }),
    );
    let cache = Cache::with_policies(policies);
    let key = cache
        .write_entity("Country", &json!({"code": "FR", "population": "many"}))
        .unwrap();

    let err = cache.read_field(&key, "label", None).unwrap_err();
    assert!(err.is_type_error());
}

#[test]
fn test_root_client_fields_project_variable_values() {
    let (cache, vars) = countries_cache();
    let shape = SelectionSet::new()
        .field(FieldSelection::new("carForm").client().select(
            SelectionSet::new().scalars(["brand", "fastEnough"]),
        ))
        .field(FieldSelection::new("cityForm").client().select(
            SelectionSet::new().scalars(["name", "population"]),
        ));

    vars.car_form.set(CarForm {
        brand: "Renault".to_string(),
        model: "5".to_string(),
        year: "1972".to_string(),
        fast_enough: true,
    });
    vars.city_form.update(|form| CityForm {
        name: "Lyon".to_string(),
        ..form.clone()
    });

    assert_eq!(
        cache.read_query(&shape, &json!({})).unwrap(),
        ReadOutcome::Complete(json!({
            "carForm": {"brand": "Renault", "fastEnough": true},
            "cityForm": {"name": "Lyon", "population": null},
        }))
    );
}

#[test]
fn test_unknown_variable_is_not_found() {
    let policies = TypePolicies::new().add_type(
        "Query",
        TypePolicy::new().read("draft", |_, ctx| Ok(Some(ctx.var_json("draft")?.into()))),
    );
    let cache = Cache::with_policies(policies);

    let err = cache
        .read_query(&SelectionSet::new().scalar("draft"), &json!({}))
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(err.is_reactive_error());
}
