// src/db/features.rs
// DOCUMENTATION: Query-string driven filtering, sorting, field selection and paging
// PURPOSE: Turn `?price[gte]=500&sort=-ratingsAverage&page=2` into bound SQL clauses

use crate::db::resource::{find_field, Field, FieldKind};
use crate::errors::AppError;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

pub const DEFAULT_LIMIT: i64 = 100;
pub const MAX_LIMIT: i64 = 1000;

/// Query keys that never become filters
const RESERVED_KEYS: [&str; 4] = ["page", "sort", "limit", "fields"];

/// Fields that may repeat in the query string; repeated values are OR-ed.
/// Any other repeated key keeps its last value.
const REPEATABLE_FIELDS: [&str; 6] = [
    "duration",
    "maxGroupSize",
    "difficulty",
    "ratingsAverage",
    "ratingsQuantity",
    "price",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gte,
    Gt,
    Lte,
    Lt,
}

impl FilterOp {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "gte" => Some(FilterOp::Gte),
            "gt" => Some(FilterOp::Gt),
            "lte" => Some(FilterOp::Lte),
            "lt" => Some(FilterOp::Lt),
            _ => None,
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            FilterOp::Eq => " = ",
            FilterOp::Gte => " >= ",
            FilterOp::Gt => " > ",
            FilterOp::Lte => " <= ",
            FilterOp::Lt => " < ",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Include(Vec<String>),
    Exclude(Vec<String>),
}

/// Parsed list-query options
#[derive(Debug, Clone, PartialEq)]
pub struct ApiFeatures {
    pub filters: Vec<Filter>,
    pub sort: Vec<SortKey>,
    pub projection: Option<Projection>,
    pub page: i64,
    pub limit: i64,
}

impl Default for ApiFeatures {
    fn default() -> Self {
        ApiFeatures {
            filters: Vec::new(),
            sort: Vec::new(),
            projection: None,
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl ApiFeatures {
    /// Parse raw query pairs in the order they appeared
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self, AppError> {
        let mut features = ApiFeatures::default();

        for (key, value) in pairs {
            match key.as_str() {
                "page" => features.page = parse_positive("page", value)?,
                "limit" => features.limit = parse_positive("limit", value)?.min(MAX_LIMIT),
                "sort" => features.sort = parse_sort(value),
                "fields" => features.projection = parse_projection(value)?,
                _ => {
                    let (field, op) = parse_filter_key(key)?;
                    features.add_filter(field, op, value.clone());
                }
            }
        }

        if features.checked_offset().is_none() {
            return Err(AppError::InvalidInput(format!(
                "page {} is out of range for limit {}",
                features.page, features.limit
            )));
        }

        Ok(features)
    }

    /// GET /tours/top-5-tours
    pub fn top_tours() -> Self {
        ApiFeatures {
            limit: 5,
            sort: parse_sort("-ratingsAverage,price"),
            projection: Some(Projection::Include(
                ["name", "price", "ratingsAverage", "summary", "difficulty"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            )),
            ..ApiFeatures::default()
        }
    }

    /// Equality filter that replaces any earlier one on the same field
    pub fn with_filter(mut self, field: &str, value: &str) -> Self {
        self.filters.retain(|f| !(f.field == field && f.op == FilterOp::Eq));
        self.filters.push(Filter {
            field: field.to_string(),
            op: FilterOp::Eq,
            values: vec![value.to_string()],
        });
        self
    }

    fn add_filter(&mut self, field: String, op: FilterOp, value: String) {
        let repeatable = op == FilterOp::Eq && REPEATABLE_FIELDS.contains(&field.as_str());
        match self
            .filters
            .iter_mut()
            .find(|f| f.field == field && f.op == op)
        {
            Some(existing) if repeatable => existing.values.push(value),
            Some(existing) => existing.values = vec![value],
            None => self.filters.push(Filter {
                field,
                op,
                values: vec![value],
            }),
        }
    }

    fn checked_offset(&self) -> Option<i64> {
        (self.page - 1).checked_mul(self.limit)
    }

    /// Rows to skip; pages past the addressable range are clamped
    pub fn offset(&self) -> i64 {
        self.checked_offset().unwrap_or(i64::MAX)
    }

    /// Append ` AND <cond>` for every filter; the builder must already hold a WHERE clause
    pub fn push_filters(
        &self,
        qb: &mut QueryBuilder<'_, Postgres>,
        fields: &[Field],
    ) -> Result<(), AppError> {
        for filter in &self.filters {
            let field = find_field(fields, &filter.field).ok_or_else(|| {
                AppError::InvalidInput(format!("Cannot filter by field: {}", filter.field))
            })?;

            qb.push(" AND (");
            for (i, raw) in filter.values.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push(field.column).push(filter.op.sql());
                push_value(qb, field, raw)?;
            }
            qb.push(")");
        }
        Ok(())
    }

    /// Append ` ORDER BY ...`, falling back to `default` when no sort was requested
    pub fn push_order(
        &self,
        qb: &mut QueryBuilder<'_, Postgres>,
        fields: &[Field],
        default: &str,
    ) -> Result<(), AppError> {
        qb.push(" ORDER BY ");
        if self.sort.is_empty() {
            qb.push(default);
            return Ok(());
        }

        for (i, key) in self.sort.iter().enumerate() {
            let field = find_field(fields, &key.field).ok_or_else(|| {
                AppError::InvalidInput(format!("Cannot sort by field: {}", key.field))
            })?;
            if i > 0 {
                qb.push(", ");
            }
            qb.push(field.column)
                .push(if key.descending { " DESC" } else { " ASC" });
        }
        Ok(())
    }

    pub fn push_pagination(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push(" LIMIT ")
            .push_bind(self.limit)
            .push(" OFFSET ")
            .push_bind(self.offset());
    }

    /// Apply `fields=` to one serialized document; `id` is always kept on include
    pub fn project(&self, doc: Value) -> Value {
        let mut map = match doc {
            Value::Object(map) => map,
            other => return other,
        };
        match &self.projection {
            Some(Projection::Include(keep)) => {
                map.retain(|k, _| k == "id" || keep.iter().any(|f| f == k));
            }
            Some(Projection::Exclude(drop)) => {
                map.retain(|k, _| !drop.iter().any(|f| f == k));
            }
            None => {}
        }
        Value::Object(map)
    }
}

fn parse_positive(name: &str, value: &str) -> Result<i64, AppError> {
    match value.trim().parse::<i64>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(AppError::InvalidInput(format!(
            "{} must be a positive integer",
            name
        ))),
    }
}

fn parse_sort(value: &str) -> Vec<SortKey> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_prefix('-') {
            Some(field) => SortKey {
                field: field.to_string(),
                descending: true,
            },
            None => SortKey {
                field: s.to_string(),
                descending: false,
            },
        })
        .collect()
}

fn parse_projection(value: &str) -> Result<Option<Projection>, AppError> {
    let parts: Vec<&str> = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        return Ok(None);
    }

    let excluded = parts.iter().filter(|p| p.starts_with('-')).count();
    if excluded == parts.len() {
        Ok(Some(Projection::Exclude(
            parts.iter().map(|p| p[1..].to_string()).collect(),
        )))
    } else if excluded == 0 {
        Ok(Some(Projection::Include(
            parts.iter().map(|p| p.to_string()).collect(),
        )))
    } else {
        Err(AppError::InvalidInput(
            "fields cannot mix inclusion and exclusion".to_string(),
        ))
    }
}

/// `price` -> (price, Eq), `price[gte]` -> (price, Gte)
fn parse_filter_key(key: &str) -> Result<(String, FilterOp), AppError> {
    let Some((field, rest)) = key.split_once('[') else {
        return Ok((key.to_string(), FilterOp::Eq));
    };
    rest.strip_suffix(']')
        .and_then(FilterOp::parse)
        .map(|op| (field.to_string(), op))
        .ok_or_else(|| AppError::InvalidInput(format!("Unsupported filter: {}", key)))
}

fn push_value(
    qb: &mut QueryBuilder<'_, Postgres>,
    field: &Field,
    raw: &str,
) -> Result<(), AppError> {
    let invalid = || {
        AppError::InvalidInput(format!("Invalid value for {}: {}", field.name, raw))
    };

    match field.kind {
        FieldKind::Text => {
            qb.push_bind(raw.to_string());
        }
        FieldKind::Number => {
            qb.push_bind(raw.parse::<f64>().map_err(|_| invalid())?);
        }
        FieldKind::Bool => {
            qb.push_bind(raw.parse::<bool>().map_err(|_| invalid())?);
        }
        FieldKind::Uuid => {
            qb.push_bind(Uuid::parse_str(raw).map_err(|_| invalid())?);
        }
        FieldKind::Timestamp => {
            qb.push_bind(parse_timestamp(raw).ok_or_else(invalid)?);
        }
    }
    Ok(())
}

/// RFC 3339 or a bare `YYYY-MM-DD` (midnight UTC)
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: &[Field] = &[
        Field::new("name", "t.name", FieldKind::Text),
        Field::new("price", "t.price", FieldKind::Number),
        Field::new("duration", "t.duration", FieldKind::Number),
        Field::new("difficulty", "t.difficulty", FieldKind::Text),
        Field::new("ratingsAverage", "t.ratings_average", FieldKind::Number),
        Field::new("createdAt", "t.created_at", FieldKind::Timestamp),
    ];

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let features = ApiFeatures::from_pairs(&[]).unwrap();
        assert_eq!(features.page, 1);
        assert_eq!(features.limit, DEFAULT_LIMIT);
        assert_eq!(features.offset(), 0);
        assert!(features.filters.is_empty());
    }

    #[test]
    fn test_parses_operators_sort_and_paging() {
        let features = ApiFeatures::from_pairs(&pairs(&[
            ("price[gte]", "500"),
            ("duration[lt]", "10"),
            ("difficulty", "easy"),
            ("sort", "-ratingsAverage,price"),
            ("page", "3"),
            ("limit", "10"),
        ]))
        .unwrap();

        assert_eq!(features.filters.len(), 3);
        assert_eq!(features.filters[0].op, FilterOp::Gte);
        assert_eq!(features.filters[1].op, FilterOp::Lt);
        assert_eq!(features.filters[2].op, FilterOp::Eq);
        assert_eq!(
            features.sort,
            vec![
                SortKey { field: "ratingsAverage".into(), descending: true },
                SortKey { field: "price".into(), descending: false },
            ]
        );
        assert_eq!(features.offset(), 20);
    }

    #[test]
    fn test_rejects_bad_paging_and_operators() {
        assert!(ApiFeatures::from_pairs(&pairs(&[("page", "0")])).is_err());
        assert!(ApiFeatures::from_pairs(&pairs(&[("limit", "abc")])).is_err());
        assert!(ApiFeatures::from_pairs(&pairs(&[("price[regex]", "1")])).is_err());
        assert!(ApiFeatures::from_pairs(&pairs(&[("fields", "name,-price")])).is_err());
    }

    #[test]
    fn test_huge_page_is_rejected() {
        let max = i64::MAX.to_string();
        let err = ApiFeatures::from_pairs(&pairs(&[("page", max.as_str())])).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        // Order of page and limit in the query does not matter
        let err = ApiFeatures::from_pairs(&pairs(&[("limit", "1000"), ("page", "10000000000000000")]))
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let features = ApiFeatures {
            page: i64::MAX,
            ..ApiFeatures::default()
        };
        assert_eq!(features.offset(), i64::MAX);
    }

    #[test]
    fn test_limit_is_capped() {
        let features = ApiFeatures::from_pairs(&pairs(&[("limit", "50000")])).unwrap();
        assert_eq!(features.limit, MAX_LIMIT);
    }

    #[test]
    fn test_parameter_pollution() {
        let features = ApiFeatures::from_pairs(&pairs(&[
            ("duration", "5"),
            ("duration", "9"),
            ("name", "a"),
            ("name", "b"),
            ("sort", "price"),
            ("sort", "duration"),
        ]))
        .unwrap();

        let duration = features.filters.iter().find(|f| f.field == "duration").unwrap();
        assert_eq!(duration.values, vec!["5", "9"]);
        let name = features.filters.iter().find(|f| f.field == "name").unwrap();
        assert_eq!(name.values, vec!["b"]);
        assert_eq!(features.sort.len(), 1);
        assert_eq!(features.sort[0].field, "duration");
    }

    #[test]
    fn test_builds_bound_sql() {
        let features = ApiFeatures::from_pairs(&pairs(&[
            ("price[gte]", "500"),
            ("duration", "5"),
            ("duration", "7"),
            ("sort", "-ratingsAverage,price"),
        ]))
        .unwrap();

        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM tours t WHERE t.secret_tour = false");
        features.push_filters(&mut qb, FIELDS).unwrap();
        features.push_order(&mut qb, FIELDS, "t.created_at DESC").unwrap();
        features.push_pagination(&mut qb);

        assert_eq!(
            qb.sql(),
            "SELECT * FROM tours t WHERE t.secret_tour = false \
             AND (t.price >= $1) AND (t.duration = $2 OR t.duration = $3) \
             ORDER BY t.ratings_average DESC, t.price ASC LIMIT $4 OFFSET $5"
        );
    }

    #[test]
    fn test_default_order_and_unknown_fields() {
        let features = ApiFeatures::default();
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 WHERE true");
        features.push_order(&mut qb, FIELDS, "t.created_at DESC").unwrap();
        assert!(qb.sql().ends_with("ORDER BY t.created_at DESC"));

        let features = ApiFeatures::from_pairs(&pairs(&[("password", "x")])).unwrap();
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 WHERE true");
        assert!(features.push_filters(&mut qb, FIELDS).is_err());

        let features = ApiFeatures::from_pairs(&pairs(&[("sort", "secret")])).unwrap();
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 WHERE true");
        assert!(features.push_order(&mut qb, FIELDS, "t.id").is_err());
    }

    #[test]
    fn test_invalid_typed_values() {
        let features = ApiFeatures::from_pairs(&pairs(&[("price", "cheap")])).unwrap();
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 WHERE true");
        assert!(features.push_filters(&mut qb, FIELDS).is_err());

        let features =
            ApiFeatures::from_pairs(&pairs(&[("createdAt[gte]", "2021-03-01")])).unwrap();
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 WHERE true");
        assert!(features.push_filters(&mut qb, FIELDS).is_ok());
    }

    #[test]
    fn test_projection() {
        let doc = serde_json::json!({ "id": 1, "name": "x", "price": 2, "summary": "s" });

        let features = ApiFeatures::from_pairs(&pairs(&[("fields", "name,price")])).unwrap();
        let projected = features.project(doc.clone());
        assert_eq!(projected, serde_json::json!({ "id": 1, "name": "x", "price": 2 }));

        let features = ApiFeatures::from_pairs(&pairs(&[("fields", "-summary")])).unwrap();
        let projected = features.project(doc);
        assert_eq!(projected, serde_json::json!({ "id": 1, "name": "x", "price": 2 }));
    }

    #[test]
    fn test_top_tours_alias() {
        let features = ApiFeatures::top_tours();
        assert_eq!(features.limit, 5);
        assert_eq!(features.sort[0].field, "ratingsAverage");
        assert!(features.sort[0].descending);
        assert!(matches!(features.projection, Some(Projection::Include(ref f)) if f.len() == 5));
    }

    #[test]
    fn test_with_filter_replaces_equality() {
        let features = ApiFeatures::from_pairs(&pairs(&[("tour", "a")]))
            .unwrap()
            .with_filter("tour", "b");
        assert_eq!(features.filters.len(), 1);
        assert_eq!(features.filters[0].values, vec!["b"]);
    }

    #[test]
    fn test_parse_timestamp() {
        assert!(parse_timestamp("2021-06-19T09:00:00Z").is_some());
        assert!(parse_timestamp("2021-06-19").is_some());
        assert!(parse_timestamp("June 19").is_none());
    }
}
