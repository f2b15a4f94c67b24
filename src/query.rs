//! Query protocol codec.
//!
//! List endpoints take a flat query string. Filters ride on plain keys with an
//! optional `operator:` prefix on the value (`?price=between:100,500`), `eq` is
//! written bare (`?status=active`), and the reserved keys `limit`, `page`/`offset`,
//! `sort` and the search key bypass the operator protocol.
//!
//! Inside the crate filters and sorts are typed ([`FilterExpr`], [`SortOrder`]);
//! strings only appear at the query-string boundary.

use std::fmt;
use std::str::FromStr;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_LIST_LIMIT;

pub const LIMIT_KEY: &str = "limit";
pub const PAGE_KEY: &str = "page";
pub const OFFSET_KEY: &str = "offset";
pub const SORT_KEY: &str = "sort";

const OPERATOR_DELIMITER: char = ':';
const VALUE_DELIMITER: char = ',';

// Query-component set: `:` and `,` stay literal so the wire reads `status=in:a,b`.
const QUERY_VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b']')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

// --- Operators ---

/// FilterOperator
///
/// The closed set of comparison operators a filter value may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Eq,
    Neq,
    In,
    NotIn,
    Like,
    Between,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 10] = [
        FilterOperator::Eq,
        FilterOperator::Neq,
        FilterOperator::In,
        FilterOperator::NotIn,
        FilterOperator::Like,
        FilterOperator::Between,
        FilterOperator::Gt,
        FilterOperator::Gte,
        FilterOperator::Lt,
        FilterOperator::Lte,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Neq => "neq",
            FilterOperator::In => "in",
            FilterOperator::NotIn => "not_in",
            FilterOperator::Like => "like",
            FilterOperator::Between => "between",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
        }
    }

    /// Operators whose value is a comma-joined list.
    pub fn is_multi_value(&self) -> bool {
        matches!(
            self,
            FilterOperator::In | FilterOperator::NotIn | FilterOperator::Between
        )
    }

    /// Candidate order for prefix matching: longest name first, so `not_in` is tried
    /// before `in` and `lte` before `lt`.
    fn by_name_length_desc() -> [FilterOperator; 10] {
        let mut ops = Self::ALL;
        ops.sort_by(|a, b| b.as_str().len().cmp(&a.as_str().len()));
        ops
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| format!("unknown filter operator '{}'", s))
    }
}

// --- Filter Expressions ---

/// FilterExpr
///
/// One field's filter: an operator and its values. Single-value operators hold exactly
/// one value; `in`, `not_in` and `between` hold a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterExpr {
    pub operator: FilterOperator,
    pub values: Vec<String>,
}

impl FilterExpr {
    pub fn new<I, S>(operator: FilterOperator, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            operator,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn eq(value: impl Into<String>) -> Self {
        Self::new(FilterOperator::Eq, [value])
    }

    /// The values joined with `,`, as they appear after the operator prefix.
    pub fn value(&self) -> String {
        self.values.join(&VALUE_DELIMITER.to_string())
    }

    /// encode
    ///
    /// `eq` is written bare; every other operator is written `operator:value`.
    pub fn encode(&self) -> String {
        match self.operator {
            FilterOperator::Eq => self.value(),
            op => format!("{}{}{}", op.as_str(), OPERATOR_DELIMITER, self.value()),
        }
    }

    /// decode
    ///
    /// Parses a stored filter value. Operator names are matched longest-first against
    /// the text before the first `:`. A string with no known prefix is the value itself
    /// under `default_operator`.
    pub fn decode(raw: &str, default_operator: FilterOperator) -> Self {
        let (operator, rest) = split_operator(raw).unwrap_or((default_operator, raw));
        Self {
            operator,
            values: split_values(operator, rest),
        }
    }

    /// An expression with no non-empty value carries no filter.
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(|v| v.is_empty())
    }
}

fn split_operator(raw: &str) -> Option<(FilterOperator, &str)> {
    FilterOperator::by_name_length_desc()
        .into_iter()
        .find_map(|op| {
            raw.strip_prefix(op.as_str())
                .and_then(|rest| rest.strip_prefix(OPERATOR_DELIMITER))
                .map(|rest| (op, rest))
        })
}

fn split_values(operator: FilterOperator, rest: &str) -> Vec<String> {
    if !operator.is_multi_value() {
        return vec![rest.to_string()];
    }
    if rest.is_empty() {
        return Vec::new();
    }
    rest.split(VALUE_DELIMITER).map(str::to_string).collect()
}

/// FilterField
///
/// A filterable field and the operators its panel offers. The first declared operator is
/// the one a bare value decodes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterField {
    pub name: String,
    pub operators: Vec<FilterOperator>,
}

impl FilterField {
    pub fn new(name: impl Into<String>, operators: &[FilterOperator]) -> Self {
        Self {
            name: name.into(),
            operators: operators.to_vec(),
        }
    }

    pub fn default_operator(&self) -> FilterOperator {
        self.operators.first().copied().unwrap_or(FilterOperator::Eq)
    }

    pub fn decode(&self, raw: &str) -> FilterExpr {
        FilterExpr::decode(raw, self.default_operator())
    }
}

// --- Sorting ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// SortOrder
///
/// The `sort` parameter. On the wire it reads `sort=field+asc`; decoded it is the
/// space-separated `field asc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrder {
    pub field: String,
    pub direction: SortDirection,
}

impl SortOrder {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    pub fn to_param(&self) -> String {
        format!("{} {}", self.field, self.direction.as_str())
    }

    /// Accepts `field asc`, an undecoded `field+asc`, or a bare `field` (ascending).
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw
            .split(|c: char| c == '+' || c.is_whitespace())
            .filter(|p| !p.is_empty());
        let field = parts.next()?.to_string();
        let direction = match parts.next().map(str::to_ascii_lowercase).as_deref() {
            None | Some("asc") => SortDirection::Asc,
            Some("desc") => SortDirection::Desc,
            Some(_) => return None,
        };
        Some(Self { field, direction })
    }
}

// --- Parameter Bag ---

/// PaginationParams
///
/// Ordered, string-keyed parameter bag mirrored 1:1 with a query string. A key holds one
/// or more values; keys keep their first-insertion position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationParams {
    entries: Vec<(String, Vec<String>)>,
}

impl PaginationParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// from_query_str
    ///
    /// Parses `a=1&b=in:x,y` (a leading `?` is ignored). Repeated keys accumulate values.
    pub fn from_query_str(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self::from_pairs(url::form_urlencoded::parse(query.as_bytes()).into_owned())
    }

    /// Builds a bag from a framework-provided parameter list, preserving order.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut params = Self::new();
        for (key, value) in pairs {
            params.append(key, value);
        }
        params
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_all(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn get_all(&self, key: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, values)| values.as_slice())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Replaces the key's values with a single value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.set_all(key, vec![value.into()]);
    }

    /// Replaces the key's values, keeping its position when it already exists.
    pub fn set_all(&mut self, key: impl Into<String>, values: Vec<String>) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = values,
            None => self.entries.push((key, values)),
        }
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => existing.push(value),
            None => self.entries.push((key, vec![value])),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(k, values)| (k.as_str(), values.as_slice()))
    }

    /// Sets a filter field to its encoded expression, or drops the key for an empty one.
    pub fn set_filter(&mut self, field: impl Into<String>, expr: &FilterExpr) {
        let field = field.into();
        if expr.is_empty() {
            self.remove(&field);
        } else {
            self.set(field, expr.encode());
        }
    }

    pub fn filter(&self, field: &FilterField) -> Option<FilterExpr> {
        self.get(&field.name).map(|raw| field.decode(raw))
    }

    pub fn set_sort(&mut self, sort: &SortOrder) {
        self.set(SORT_KEY, sort.to_param());
    }

    pub fn sort(&self) -> Option<SortOrder> {
        self.get(SORT_KEY).and_then(SortOrder::parse)
    }

    pub fn page(&self) -> Option<u32> {
        self.get(PAGE_KEY).and_then(|p| p.trim().parse().ok())
    }

    pub fn limit(&self) -> Option<u32> {
        self.get(LIMIT_KEY)
            .and_then(|l| l.trim().parse().ok())
            .filter(|l| *l > 0)
    }

    /// to_query_string
    ///
    /// Serializes without a leading `?`. `:` and `,` are left literal and spaces
    /// become `+`.
    pub fn to_query_string(&self) -> String {
        let mut out = String::new();
        for (key, values) in &self.entries {
            for value in values {
                if !out.is_empty() {
                    out.push('&');
                }
                out.push_str(&encode_component(key));
                out.push('=');
                out.push_str(&encode_component(value));
            }
        }
        out
    }
}

impl fmt::Display for PaginationParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_string())
    }
}

fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, QUERY_VALUE)
        .to_string()
        .replace("%20", "+")
}

// --- Page / Offset ---

/// `offset = (page - 1) * limit`. Page is 1-based; anything below 1 counts as 1.
pub fn page_to_offset(page: u32, limit: u32) -> u64 {
    u64::from(page.max(1) - 1) * u64::from(limit)
}

/// Inverse of [`page_to_offset`] for a backend echo. Offsets past the last
/// representable page saturate at `u32::MAX`.
pub fn offset_to_page(offset: u64, limit: u32) -> u32 {
    if limit == 0 {
        return 1;
    }
    u32::try_from(offset / u64::from(limit))
        .unwrap_or(u32::MAX)
        .saturating_add(1)
}

/// to_wire
///
/// Converts UI list state into backend parameters: `page` becomes `offset`, and `limit`
/// is filled from `default_limit` when the state carries a page without one. Both are
/// moved to the end as `offset=..&limit=..`. Every other key passes through untouched.
pub fn to_wire(params: &PaginationParams, default_limit: u32) -> PaginationParams {
    let mut wire = params.clone();
    let page = wire.remove(PAGE_KEY).and_then(|values| {
        values
            .first()
            .and_then(|p| p.trim().parse::<u32>().ok())
    });
    let limit = params.limit();
    wire.remove(LIMIT_KEY);

    match (page, limit) {
        (Some(page), limit) => {
            let limit = limit.unwrap_or(default_limit);
            wire.remove(OFFSET_KEY);
            wire.set(OFFSET_KEY, page_to_offset(page, limit).to_string());
            wire.set(LIMIT_KEY, limit.to_string());
        }
        (None, Some(limit)) => wire.set(LIMIT_KEY, limit.to_string()),
        (None, None) => {}
    }
    wire
}

/// from_wire
///
/// Inverse of [`to_wire`]: `offset`/`limit` become `page`/`limit`.
pub fn from_wire(wire: &PaginationParams, default_limit: u32) -> PaginationParams {
    let mut params = wire.clone();
    let offset = params
        .remove(OFFSET_KEY)
        .and_then(|values| values.first().and_then(|o| o.trim().parse::<u64>().ok()));
    if let Some(offset) = offset {
        let limit = wire.limit().unwrap_or(default_limit);
        params.set(PAGE_KEY, offset_to_page(offset, limit).to_string());
    }
    params
}

// --- List Query Builder ---

/// ListQuery
///
/// Builder for a list request. Holds UI-side state (1-based page) and serializes to
/// the backend representation with [`ListQuery::to_query_string`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    params: PaginationParams,
    default_limit: u32,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            params: PaginationParams::new(),
            default_limit: DEFAULT_LIST_LIMIT,
        }
    }
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_params(params: PaginationParams, default_limit: u32) -> Self {
        Self {
            params,
            default_limit,
        }
    }

    pub fn filter<I, S>(mut self, field: &str, operator: FilterOperator, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params
            .set_filter(field, &FilterExpr::new(operator, values));
        self
    }

    pub fn eq(self, field: &str, value: impl Into<String>) -> Self {
        self.filter(field, FilterOperator::Eq, [value])
    }

    pub fn search(mut self, key: &str, term: impl Into<String>) -> Self {
        let term = term.into();
        if term.is_empty() {
            self.params.remove(key);
        } else {
            self.params.set(key, term);
        }
        self
    }

    pub fn sort(mut self, sort: SortOrder) -> Self {
        self.params.set_sort(&sort);
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.params.set(PAGE_KEY, page.max(1).to_string());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.params.set(LIMIT_KEY, limit.to_string());
        self
    }

    pub fn params(&self) -> &PaginationParams {
        &self.params
    }

    pub fn to_wire(&self) -> PaginationParams {
        to_wire(&self.params, self.default_limit)
    }

    pub fn to_query_string(&self) -> String {
        self.to_wire().to_query_string()
    }

    /// Appends the wire query to `path`, if there is one.
    pub fn apply_to_path(&self, path: &str) -> String {
        let query = self.to_query_string();
        if query.is_empty() {
            path.to_string()
        } else if path.contains('?') {
            format!("{}&{}", path, query)
        } else {
            format!("{}?{}", path, query)
        }
    }
}
