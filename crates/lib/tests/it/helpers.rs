use normcache::{
    ArgValue, Cache, CacheConfig, EntityKey, FieldSelection, QueryShape, ReactiveVar,
    SelectionSet, StoreValue,
    policy::{FieldPolicy, TypePolicies, TypePolicy, merge},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

// ==========================
// SELECTION STATE
// ==========================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectedCountry {
    pub code: String,
    pub name: String,
    pub capital: String,
}

impl SelectedCountry {
    pub fn code(code: &str) -> Self {
        Self {
            code: code.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarForm {
    pub brand: String,
    pub model: String,
    pub year: String,
    pub fast_enough: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CityForm {
    pub name: String,
    pub country: String,
    pub population: Option<u64>,
}

/// Handles to the variables a countries cache is created with.
pub struct CountryVars {
    pub code: ReactiveVar<String>,
    pub selected: ReactiveVar<SelectedCountry>,
    pub car_form: ReactiveVar<CarForm>,
    pub city_form: ReactiveVar<CityForm>,
}

// ==========================
// POLICIES AND CACHES
// ==========================

/// Policies of the countries application.
pub fn country_policies() -> TypePolicies {
    TypePolicies::new()
        .add_type(
            "Country",
            TypePolicy::new()
                .key_fields(["code"])
                .read("nameWithEmoji", |_, ctx| {
                    let name = ctx.read_field_as::<String>("name")?.unwrap_or_default();
                    let emoji = ctx.read_field_as::<String>("emoji")?.unwrap_or_default();
                    Ok(Some(StoreValue::from(format!("{name} {emoji}"))))
                })
                .read("selected", |_, ctx| {
                    let code = ctx.read_field_as::<String>("code")?;
                    let selected = ctx.var::<SelectedCountry>("selectedCountry")?;
                    Ok(Some(StoreValue::from(code.as_deref() == Some(selected.code.as_str()))))
                }),
        )
        .add_type(
            "Query",
            TypePolicy::new()
                .field("countries", FieldPolicy::merging(merge::prefer_incoming()))
                .read("carForm", |_, ctx| Ok(Some(ctx.var_json("carForm")?.into())))
                .read("cityForm", |_, ctx| Ok(Some(ctx.var_json("cityForm")?.into()))),
        )
}

pub fn countries_cache() -> (Cache, CountryVars) {
    countries_cache_with(CacheConfig::default())
}

pub fn countries_cache_with(config: CacheConfig) -> (Cache, CountryVars) {
    let cache = Cache::new(config, country_policies());
    let vars = CountryVars {
        code: cache.make_var("code", String::new()).unwrap(),
        selected: cache
            .make_var("selectedCountry", SelectedCountry::default())
            .unwrap(),
        car_form: cache.make_var("carForm", CarForm::default()).unwrap(),
        city_form: cache.make_var("cityForm", CityForm::default()).unwrap(),
    };
    (cache, vars)
}

// ==========================
// SHAPES AND PAYLOADS
// ==========================

/// `countries(filter: $arg) { __typename code name capital emoji selected @client }`
pub fn countries_shape() -> QueryShape {
    SelectionSet::new().field(
        FieldSelection::new("countries")
            .arg("filter", ArgValue::var("arg"))
            .select(
                SelectionSet::new()
                    .scalars(["__typename", "code", "name", "capital", "emoji"])
                    .field(FieldSelection::new("selected").client()),
            ),
    )
}

/// Query variables filtering countries by code pattern.
pub fn code_filter(regex: &str) -> Value {
    json!({"arg": {"code": {"regex": regex}}})
}

pub fn country(code: &str, name: &str, capital: &str, emoji: &str) -> Value {
    json!({
        "__typename": "Country",
        "code": code,
        "name": name,
        "capital": capital,
        "emoji": emoji,
    })
}

pub fn us() -> Value {
    country("US", "United States", "Washington D.C.", "🇺🇸")
}

pub fn fr() -> Value {
    country("FR", "France", "Paris", "🇫🇷")
}

pub fn countries_result(countries: &[Value]) -> Value {
    json!({ "countries": countries })
}

pub fn country_key(code: &str) -> EntityKey {
    EntityKey::from_identity("Country", [("code", &json!(code))])
}

/// Codes of the countries in a complete read, in list order.
pub fn codes(data: &Value) -> Vec<String> {
    data["countries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|country| country["code"].as_str().unwrap().to_string())
        .collect()
}

/// `selected` flag of the country with `code` in a complete read.
pub fn selected(data: &Value, code: &str) -> bool {
    data["countries"]
        .as_array()
        .unwrap()
        .iter()
        .find(|country| country["code"] == code)
        .and_then(|country| country["selected"].as_bool())
        .unwrap()
}
