//! Client-side filter/sort pipeline.
//!
//! [`apply`] is a pure function from a collection and a [`FilterSpec`] to
//! the displayed subset, in display order. It owns no state; the
//! `FilterSpec` lives with the caller and is rebuilt on every change.
//!
//! # Matching
//!
//! | Criterion | Semantics |
//! |-----------|-----------|
//! | [`Criterion::Equals`] | case-insensitive equality (categorical fields) |
//! | [`Criterion::Contains`] | case-insensitive substring (free-text fields) |
//! | [`Criterion::DateRange`] | `from <= date <= to`, either bound optional |
//!
//! Active criteria compose with AND. The optional free-text `search` term
//! matches if any of the kind's search fields contains it.
//!
//! # Ordering
//!
//! With a sort field, entities are ordered by that field (case-insensitive
//! for text, chronological for dates, numeric for numbers). Entities
//! missing the field go last in both directions. The sort is stable, so
//! ties keep their input order. Without a sort field the input order is
//! preserved.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{Entity, FieldValue};

/// Fields filtered by exact (case-insensitive) value rather than substring.
const CATEGORICAL_FIELDS: &[&str] = &[
    "city",
    "state",
    "country",
    "company",
    "companyName",
    "status",
    "stage",
    "priority",
    "assignedUser",
    "assignedUserId",
    "userId",
    "customer",
    "customerId",
    "deal",
    "dealId",
    "role",
    "roles",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Equals(String),
    Contains(String),
    DateRange {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
}

impl Criterion {
    /// Empty values and unbounded ranges impose no constraint.
    pub fn is_active(&self) -> bool {
        match self {
            Criterion::Equals(v) | Criterion::Contains(v) => !v.trim().is_empty(),
            Criterion::DateRange { from, to } => from.is_some() || to.is_some(),
        }
    }

    fn matches(&self, value: Option<FieldValue>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match self {
            Criterion::Equals(expected) => value.as_text() == expected.trim().to_lowercase(),
            Criterion::Contains(needle) => value.as_text().contains(&needle.trim().to_lowercase()),
            Criterion::DateRange { from, to } => match value.as_date() {
                Some(date) => {
                    from.map_or(true, |f| f <= date) && to.map_or(true, |t| date <= t)
                }
                None => false,
            },
        }
    }

    fn describe(&self) -> String {
        match self {
            Criterion::Equals(v) | Criterion::Contains(v) => v.clone(),
            Criterion::DateRange { from, to } => match (from, to) {
                (Some(f), Some(t)) => format!("{} to {}", f, t),
                (Some(f), None) => format!("from {}", f),
                (None, Some(t)) => format!("until {}", t),
                (None, None) => String::new(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortDirection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Asc),
            "desc" | "descending" => Ok(SortDirection::Desc),
            other => anyhow::bail!("Unknown sort direction: '{}'. Must be asc or desc.", other),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => f.write_str("Ascending"),
            SortDirection::Desc => f.write_str("Descending"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// Filter criteria keyed by field name, plus an optional search term and sort.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    #[serde(default)]
    pub criteria: BTreeMap<String, Criterion>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort: Option<SortSpec>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equals(mut self, field: &str, value: impl Into<String>) -> Self {
        self.criteria
            .insert(field.to_string(), Criterion::Equals(value.into()));
        self
    }

    pub fn contains(mut self, field: &str, value: impl Into<String>) -> Self {
        self.criteria
            .insert(field.to_string(), Criterion::Contains(value.into()));
        self
    }

    pub fn date_range(mut self, field: &str, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.criteria
            .insert(field.to_string(), Criterion::DateRange { from, to });
        self
    }

    /// Adds a criterion whose kind follows from the field: exact match for
    /// categorical fields, substring match for everything else.
    pub fn with(self, field: &str, value: impl Into<String>) -> Self {
        if is_categorical(field) {
            self.equals(field, value)
        } else {
            self.contains(field, value)
        }
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn sort_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.sort = Some(SortSpec {
            field: field.to_string(),
            direction,
        });
        self
    }

    fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }
}

pub fn is_categorical(field: &str) -> bool {
    CATEGORICAL_FIELDS.contains(&field)
}

/// Derives the displayed subset and order of `items` under `spec`.
pub fn apply<E: Entity>(items: &[E], spec: &FilterSpec) -> Vec<E> {
    let active: Vec<(&String, &Criterion)> = spec
        .criteria
        .iter()
        .filter(|(_, c)| c.is_active())
        .collect();
    let search = spec.search_term();

    let mut out: Vec<E> = items
        .iter()
        .filter(|item| {
            active
                .iter()
                .all(|(field, criterion)| criterion.matches(item.field(field)))
        })
        .filter(|item| match &search {
            Some(term) => E::search_fields().iter().any(|f| {
                item.field(f)
                    .map(|v| v.as_text().contains(term.as_str()))
                    .unwrap_or(false)
            }),
            None => true,
        })
        .cloned()
        .collect();

    if let Some(sort) = spec.sort.as_ref().filter(|s| !s.field.is_empty()) {
        // `sort_by` is stable: equal keys keep their input order.
        out.sort_by(|a, b| compare_by(a, b, &sort.field, sort.direction));
    }
    out
}

fn compare_by<E: Entity>(a: &E, b: &E, field: &str, direction: SortDirection) -> Ordering {
    match (a.field(field), b.field(field)) {
        (Some(x), Some(y)) => match direction {
            SortDirection::Asc => x.compare(&y),
            SortDirection::Desc => y.compare(&x),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// A human-readable summary of one active filter or the sort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveFilter {
    pub label: String,
    pub value: String,
}

/// Lists the active search term, criteria and sort, in that order.
pub fn active_filters(spec: &FilterSpec) -> Vec<ActiveFilter> {
    let mut active = Vec::new();
    if let Some(term) = spec.search.as_deref().filter(|s| !s.trim().is_empty()) {
        active.push(ActiveFilter {
            label: "Search".to_string(),
            value: term.to_string(),
        });
    }
    for (field, criterion) in &spec.criteria {
        if criterion.is_active() {
            active.push(ActiveFilter {
                label: humanize(field),
                value: criterion.describe(),
            });
        }
    }
    if let Some(sort) = &spec.sort {
        active.push(ActiveFilter {
            label: "Sort".to_string(),
            value: format!("{} ({})", sort.field, sort.direction),
        });
    }
    active
}

/// `companyName` → `Company Name`.
fn humanize(field: &str) -> String {
    let mut out = String::with_capacity(field.len() + 4);
    for (i, ch) in field.chars().enumerate() {
        if i == 0 {
            out.extend(ch.to_uppercase());
        } else if ch.is_uppercase() {
            out.push(' ');
            out.push(ch);
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Customer, EntityId, Task};

    fn customer(id: i64, name: &str) -> Customer {
        Customer {
            id: Some(EntityId::Int(id)),
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn acme_beta() -> Vec<Customer> {
        vec![customer(1, "Acme"), customer(2, "Beta")]
    }

    fn ids<E: Entity>(items: &[E]) -> Vec<String> {
        items
            .iter()
            .map(|e| e.id().map(|i| i.to_string()).unwrap_or_default())
            .collect()
    }

    fn task(id: i64, due: Option<&str>, status: &str) -> Task {
        Task {
            id: Some(EntityId::Int(id)),
            description: format!("task {}", id),
            due_date: due.map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap()),
            status: Some(status.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_name_substring_case_insensitive() {
        let out = apply(&acme_beta(), &FilterSpec::new().contains("name", "be"));
        assert_eq!(out, vec![customer(2, "Beta")]);
    }

    #[test]
    fn test_sort_name_descending() {
        let out = apply(
            &acme_beta(),
            &FilterSpec::new().sort_by("name", SortDirection::Desc),
        );
        assert_eq!(ids(&out), vec!["2", "1"]);
    }

    #[test]
    fn test_no_sort_preserves_input_order() {
        let items = vec![customer(3, "Zed"), customer(1, "Acme"), customer(2, "Beta")];
        let out = apply(&items, &FilterSpec::new());
        assert_eq!(out, items);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let items = vec![customer(3, "zed"), customer(1, "Acme"), customer(2, "beta")];
        let spec = FilterSpec::new()
            .contains("name", "e")
            .sort_by("name", SortDirection::Asc);
        let once = apply(&items, &spec);
        let twice = apply(&items, &spec);
        assert_eq!(once, twice);
        assert_eq!(ids(&once), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_categorical_equality_ignores_case() {
        let mut a = customer(1, "Acme");
        a.city = Some("Pune".to_string());
        let mut b = customer(2, "Beta");
        b.city = Some("Punekar".to_string());
        let out = apply(&[a.clone(), b], &FilterSpec::new().with("city", "PUNE"));
        assert_eq!(out, vec![a]);
    }

    #[test]
    fn test_criteria_compose_with_and() {
        let mut a = customer(1, "Acme");
        a.city = Some("Pune".to_string());
        a.country = Some("India".to_string());
        let mut b = customer(2, "Beta");
        b.city = Some("Pune".to_string());
        b.country = Some("Kenya".to_string());
        let spec = FilterSpec::new()
            .equals("city", "pune")
            .equals("country", "india");
        assert_eq!(ids(&apply(&[a, b], &spec)), vec!["1"]);
    }

    #[test]
    fn test_empty_criterion_is_inactive() {
        let spec = FilterSpec::new().equals("city", "  ").contains("name", "");
        assert_eq!(apply(&acme_beta(), &spec).len(), 2);
    }

    #[test]
    fn test_missing_field_fails_active_criterion() {
        let spec = FilterSpec::new().equals("city", "Pune");
        assert!(apply(&acme_beta(), &spec).is_empty());
    }

    #[test]
    fn test_date_range_inclusive_and_open_ended() {
        let tasks = vec![
            task(1, Some("2024-01-01"), "Pending"),
            task(2, Some("2024-01-15"), "Pending"),
            task(3, Some("2024-02-01"), "Completed"),
            task(4, None, "Pending"),
        ];
        let from = NaiveDate::from_ymd_opt(2024, 1, 1);
        let to = NaiveDate::from_ymd_opt(2024, 1, 15);
        let out = apply(&tasks, &FilterSpec::new().date_range("dueDate", from, to));
        assert_eq!(ids(&out), vec!["1", "2"]);

        let out = apply(&tasks, &FilterSpec::new().date_range("dueDate", to, None));
        assert_eq!(ids(&out), vec!["2", "3"]);
    }

    #[test]
    fn test_missing_sort_field_sorts_last_both_directions() {
        let tasks = vec![
            task(1, None, "Pending"),
            task(2, Some("2024-03-01"), "Pending"),
            task(3, Some("2024-01-01"), "Pending"),
        ];
        let asc = apply(&tasks, &FilterSpec::new().sort_by("dueDate", SortDirection::Asc));
        assert_eq!(ids(&asc), vec!["3", "2", "1"]);
        let desc = apply(&tasks, &FilterSpec::new().sort_by("dueDate", SortDirection::Desc));
        assert_eq!(ids(&desc), vec!["2", "3", "1"]);
    }

    #[test]
    fn test_sort_is_stable_for_ties() {
        let tasks = vec![
            task(5, None, "Pending"),
            task(1, None, "Completed"),
            task(3, None, "pending"),
            task(2, None, "Completed"),
        ];
        let out = apply(&tasks, &FilterSpec::new().sort_by("status", SortDirection::Asc));
        assert_eq!(ids(&out), vec!["1", "2", "5", "3"]);
        let out = apply(&tasks, &FilterSpec::new().sort_by("status", SortDirection::Desc));
        assert_eq!(ids(&out), vec!["5", "3", "1", "2"]);
    }

    #[test]
    fn test_search_term_spans_search_fields() {
        let mut a = customer(1, "Acme");
        a.email = Some("hello@globex.test".to_string());
        let mut b = customer(2, "Beta");
        b.company_name = Some("Globex Ltd".to_string());
        let c = customer(3, "Gamma");
        let out = apply(&[a, b, c], &FilterSpec::new().search("GLOBEX"));
        assert_eq!(ids(&out), vec!["1", "2"]);
    }

    #[test]
    fn test_active_filters_summary() {
        let spec = FilterSpec::new()
            .search("acme")
            .equals("companyName", "Acme Corp")
            .equals("city", "")
            .sort_by("name", SortDirection::Desc);
        let active = active_filters(&spec);
        assert_eq!(
            active,
            vec![
                ActiveFilter {
                    label: "Search".to_string(),
                    value: "acme".to_string()
                },
                ActiveFilter {
                    label: "Company Name".to_string(),
                    value: "Acme Corp".to_string()
                },
                ActiveFilter {
                    label: "Sort".to_string(),
                    value: "name (Descending)".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_sort_direction_parse() {
        assert_eq!("DESC".parse::<SortDirection>().unwrap(), SortDirection::Desc);
        assert!("sideways".parse::<SortDirection>().is_err());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_customer() -> impl Strategy<Value = Customer> {
            (
                1i64..50,
                "[A-Za-z ]{0,6}",
                prop::option::of(prop_oneof![Just("Pune"), Just("pune"), Just("Delhi")]),
            )
                .prop_map(|(id, name, city)| Customer {
                    city: city.map(str::to_string),
                    ..customer(id, &name)
                })
        }

        fn arb_spec() -> impl Strategy<Value = FilterSpec> {
            (
                prop::option::of("[a-z]{0,2}"),
                prop::option::of(prop_oneof![Just("pune"), Just("DELHI"), Just("")]),
                prop::option::of((prop_oneof![Just("name"), Just("city"), Just("id")], any::<bool>())),
            )
                .prop_map(|(search, city, sort)| {
                    let mut spec = FilterSpec::new();
                    if let Some(term) = search {
                        spec = spec.search(term);
                    }
                    if let Some(city) = city {
                        spec = spec.equals("city", city);
                    }
                    if let Some((field, desc)) = sort {
                        let direction = if desc { SortDirection::Desc } else { SortDirection::Asc };
                        spec = spec.sort_by(field, direction);
                    }
                    spec
                })
        }

        proptest! {
            #[test]
            fn test_apply_is_idempotent_for_generated_collections(
                items in prop::collection::vec(arb_customer(), 0..12),
                spec in arb_spec(),
            ) {
                let once = apply(&items, &spec);
                let twice = apply(&once, &spec);
                prop_assert_eq!(twice, once);
            }

            #[test]
            fn test_apply_selects_a_subset(
                items in prop::collection::vec(arb_customer(), 0..12),
                spec in arb_spec(),
            ) {
                let out = apply(&items, &spec);
                prop_assert!(out.len() <= items.len());
                prop_assert!(out.iter().all(|c| items.contains(c)));
            }

            #[test]
            fn test_unsorted_apply_keeps_input_order(
                items in prop::collection::vec(arb_customer(), 0..12),
                spec in arb_spec(),
            ) {
                let spec = FilterSpec { sort: None, ..spec };
                let out = apply(&items, &spec);
                let expected: Vec<Customer> = items
                    .iter()
                    .filter(|c| out.contains(c))
                    .cloned()
                    .collect();
                prop_assert_eq!(out, expected);
            }
        }
    }
}
