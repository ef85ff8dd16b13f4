//! Search, sort and pagination for the record tables.
//!
//! Every list endpoint takes the same `search`/`sort`/`dir`/`page`/`pageSize`
//! query parameters. Resources describe themselves through [`Listable`]:
//! which text a search looks at, and what key each sortable column yields.

use std::cmp::Ordering;

use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use time::Date;

use crate::error::ApiError;
use crate::util::lenient_usize;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn apply(self, ord: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    }
}

/// `asc`/`desc` in any case; blank means unset.
fn lenient_direction<'de, D>(deserializer: D) -> Result<Option<SortDirection>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(v) if v.eq_ignore_ascii_case("asc") => Ok(Some(SortDirection::Asc)),
        Some(v) if v.eq_ignore_ascii_case("desc") => Ok(Some(SortDirection::Desc)),
        Some(v) => Err(D::Error::custom(format!("unknown sort direction `{v}`"))),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default, deserialize_with = "lenient_direction")]
    pub dir: Option<SortDirection>,
    #[serde(default, deserialize_with = "lenient_usize")]
    pub page: Option<usize>,
    #[serde(default, deserialize_with = "lenient_usize")]
    pub page_size: Option<usize>,
}

/// A comparable value extracted from a row for one column.
#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    Text(String),
    Number(f64),
    /// Unparseable dates sort before every real date.
    Date(Option<Date>),
    Flag(bool),
}

impl SortKey {
    pub fn text(value: Option<&str>) -> Self {
        SortKey::Text(value.unwrap_or_default().to_lowercase())
    }

    fn compare(&self, other: &SortKey) -> Ordering {
        match (self, other) {
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
            (SortKey::Number(a), SortKey::Number(b)) => a.total_cmp(b),
            (SortKey::Date(a), SortKey::Date(b)) => a.cmp(b),
            (SortKey::Flag(a), SortKey::Flag(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

pub trait SortColumn: Sized + Copy {
    fn parse(name: &str) -> Option<Self>;
    fn default_column() -> Self;
    fn default_direction(self) -> SortDirection {
        SortDirection::Asc
    }
}

pub trait Listable {
    type Column: SortColumn;

    /// Text fields a search term is matched against.
    fn search_fields(&self) -> Vec<&str>;

    fn sort_key(&self, column: Self::Column) -> SortKey;

    fn matches(&self, term_lower: &str) -> bool {
        self.search_fields()
            .iter()
            .any(|field| field.to_lowercase().contains(term_lower))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_items: usize,
    pub total_pages: usize,
    pub current_page: usize,
    pub page_size: usize,
    pub start_item: usize,
    pub end_item: usize,
}

/// Either the whole filtered table or one page of it.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Listing<T> {
    All(Vec<T>),
    Page(Page<T>),
}

impl<T: Serialize> IntoResponse for Listing<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

pub fn paginate<T>(items: Vec<T>, page: usize, page_size: usize) -> Page<T> {
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    let total_items = items.len();
    let total_pages = total_items.div_ceil(page_size).max(1);
    let current_page = page.clamp(1, total_pages);
    let start = (current_page - 1) * page_size;
    let end = (start + page_size).min(total_items);

    let items: Vec<T> = items.into_iter().skip(start).take(page_size).collect();

    Page {
        items,
        total_items,
        total_pages,
        current_page,
        page_size,
        start_item: if total_items == 0 { 0 } else { start + 1 },
        end_item: end,
    }
}

/// Filters by search term, sorts (stable) and optionally paginates.
pub fn apply<T: Listable>(items: Vec<T>, query: &ListQuery) -> Result<Listing<T>, ApiError> {
    let column = match query.sort.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => T::Column::parse(name)
            .ok_or_else(|| ApiError::bad_request(format!("Unknown sort column: {name}")))?,
        None => T::Column::default_column(),
    };
    let direction = query.dir.unwrap_or_else(|| column.default_direction());

    let term = query
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_default();

    let mut rows: Vec<T> = if term.is_empty() {
        items
    } else {
        items.into_iter().filter(|item| item.matches(&term)).collect()
    };

    rows.sort_by(|a, b| direction.apply(a.sort_key(column).compare(&b.sort_key(column))));

    Ok(match query.page {
        None => Listing::All(rows),
        Some(page) => Listing::Page(paginate(
            rows,
            page,
            query.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        )),
    })
}
