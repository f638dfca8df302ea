//! Translates a filter/pagination/sort request into a Cypher predicate.
//!
//! One rendered WHERE clause covers scalar filters, free-text search, the
//! radius predicate, and the caller's visibility, all ANDed. The radius
//! predicate is deliberately a within-disc membership test rather than a
//! nearest-first query: membership composes with arbitrary ORDER BY keys,
//! at the cost of results not being distance-ordered.

use uuid::Uuid;

use civiclens_common::{
    validate_coordinates, Category, Priority, Status, DEFAULT_RADIUS_METERS,
};

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;
pub const MAX_PAGE_LIMIT_ADMIN: u32 = 1000;

// --- Parameters ---

/// A parameter destined for `neo4rs::Query::param`. Collected by name so a
/// rendered clause can be replayed onto both the data and the count query.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Float(f64),
    Int(i64),
    Bool(bool),
}

pub fn apply_params(mut q: neo4rs::Query, params: &[(String, ParamValue)]) -> neo4rs::Query {
    for (key, value) in params {
        q = match value {
            ParamValue::Str(s) => q.param(key.as_str(), s.as_str()),
            ParamValue::Float(f) => q.param(key.as_str(), *f),
            ParamValue::Int(i) => q.param(key.as_str(), *i),
            ParamValue::Bool(b) => q.param(key.as_str(), *b),
        };
    }
    q
}

// --- Visibility ---

/// Role-dependent read predicate, applied on every list/read path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// No additional restriction.
    Admin,
    /// Public issues plus the caller's own.
    User(Uuid),
}

impl Visibility {
    pub fn is_admin(&self) -> bool {
        matches!(self, Visibility::Admin)
    }
}

// --- Geo strategy ---

/// How location parameters constrain the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeoStrategy {
    /// No coordinates supplied.
    None,
    /// Point-in-disc membership on a sphere, radius in meters.
    WithinRadius { lat: f64, lng: f64, radius_meters: f64 },
    /// Coordinates supplied but invalid: short-circuit to zero results
    /// instead of erroring, keeping the read path lenient.
    EmptyResult,
}

impl GeoStrategy {
    pub fn from_request(latitude: Option<f64>, longitude: Option<f64>, radius: Option<f64>) -> Self {
        match (latitude, longitude) {
            (None, None) => GeoStrategy::None,
            (Some(lat), Some(lng)) if validate_coordinates(lng, lat) => {
                GeoStrategy::WithinRadius {
                    lat,
                    lng,
                    radius_meters: radius.unwrap_or(DEFAULT_RADIUS_METERS).max(0.0),
                }
            }
            // Half-supplied or out-of-bounds coordinates
            _ => GeoStrategy::EmptyResult,
        }
    }
}

// --- Pagination ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    /// Clamp raw request values: page >= 1, limit within [1, 100]
    /// ([1, 1000] for admins). Malformed values fall back to page=1, limit=20.
    pub fn clamp(page: Option<u32>, limit: Option<u32>, admin: bool) -> Self {
        let max_limit = if admin { MAX_PAGE_LIMIT_ADMIN } else { MAX_PAGE_LIMIT };
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, max_limit),
        }
    }

    pub fn skip(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }

    /// Derive page metadata from the total count of matching documents.
    pub fn meta(&self, total_count: u64) -> PageMeta {
        let total_pages = total_count.div_ceil(self.limit as u64);
        PageMeta {
            current_page: self.page,
            total_pages,
            total_count,
            limit: self.limit,
            has_next_page: (self.page as u64) < total_pages,
            has_prev_page: self.page > 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PageMeta {
    pub current_page: u32,
    pub total_pages: u64,
    pub total_count: u64,
    pub limit: u32,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

// --- Sorting ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "asc" | "ascending" | "1" => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }

    fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: SortField,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Priority,
    Status,
    Title,
    Upvotes,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self { field: SortField::CreatedAt, order: SortOrder::Desc }
    }
}

impl SortSpec {
    /// Whitelist sort keys; anything unrecognized falls back to
    /// created_at descending rather than unspecified ordering.
    pub fn from_request(sort_by: Option<&str>, sort_order: Option<&str>) -> Self {
        let field = match sort_by.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("created_at") | Some("createdat") => SortField::CreatedAt,
            Some("updated_at") | Some("updatedat") => SortField::UpdatedAt,
            Some("priority") => SortField::Priority,
            Some("status") => SortField::Status,
            Some("title") => SortField::Title,
            Some("upvotes") | Some("votes") => SortField::Upvotes,
            _ => return SortSpec::default(),
        };
        SortSpec {
            field,
            order: sort_order.map(SortOrder::from_str_loose).unwrap_or_default(),
        }
    }

    pub fn order_clause(&self) -> String {
        let key = match self.field {
            SortField::CreatedAt => "i.created_at",
            SortField::UpdatedAt => "i.updated_at",
            SortField::Priority => "i.priority",
            SortField::Status => "i.status",
            SortField::Title => "i.title",
            SortField::Upvotes => "size(i.upvotes)",
        };
        format!("ORDER BY {key} {}", self.order.keyword())
    }
}

// --- Filter ---

/// User-supplied scalar filters plus search and location parameters.
#[derive(Debug, Clone, Default)]
pub struct IssueFilter {
    pub status: Option<Status>,
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub reported_by: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub search: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius_meters: Option<f64>,
}

impl IssueFilter {
    pub fn geo_strategy(&self) -> GeoStrategy {
        GeoStrategy::from_request(self.latitude, self.longitude, self.radius_meters)
    }
}

/// A predicate ready to attach to both the data and the count query.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPredicate {
    pub where_clause: String,
    pub params: Vec<(String, ParamValue)>,
}

/// Render the combined predicate, or None when the geo strategy
/// short-circuits to an empty result set.
pub fn render_predicate(filter: &IssueFilter, visibility: Visibility) -> Option<RenderedPredicate> {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<(String, ParamValue)> = Vec::new();

    if let Some(status) = filter.status {
        clauses.push("i.status = $status".to_string());
        params.push(("status".to_string(), ParamValue::Str(status.to_string())));
    }
    if let Some(category) = filter.category {
        clauses.push("i.category = $category".to_string());
        params.push(("category".to_string(), ParamValue::Str(category.to_string())));
    }
    if let Some(priority) = filter.priority {
        clauses.push("i.priority = $priority".to_string());
        params.push(("priority".to_string(), ParamValue::Str(priority.to_string())));
    }
    if let Some(reported_by) = filter.reported_by {
        clauses.push("i.reported_by = $reported_by".to_string());
        params.push(("reported_by".to_string(), ParamValue::Str(reported_by.to_string())));
    }
    if let Some(assigned_to) = filter.assigned_to {
        clauses.push("i.assigned_to = $assigned_to".to_string());
        params.push(("assigned_to".to_string(), ParamValue::Str(assigned_to.to_string())));
    }

    if let Visibility::User(caller) = visibility {
        clauses.push("(i.is_public = true OR i.reported_by = $caller_id)".to_string());
        params.push(("caller_id".to_string(), ParamValue::Str(caller.to_string())));
    }

    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        clauses.push(
            "(toLower(i.title) CONTAINS $search OR toLower(i.description) CONTAINS $search)"
                .to_string(),
        );
        params.push(("search".to_string(), ParamValue::Str(search.to_lowercase())));
    }

    match filter.geo_strategy() {
        GeoStrategy::None => {}
        GeoStrategy::EmptyResult => return None,
        GeoStrategy::WithinRadius { lat, lng, radius_meters } => {
            clauses.push(
                "point.distance(point({latitude: i.lat, longitude: i.lng}), \
                 point({latitude: $center_lat, longitude: $center_lng})) <= $radius_m"
                    .to_string(),
            );
            params.push(("center_lat".to_string(), ParamValue::Float(lat)));
            params.push(("center_lng".to_string(), ParamValue::Float(lng)));
            params.push(("radius_m".to_string(), ParamValue::Float(radius_meters)));
        }
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    Some(RenderedPredicate { where_clause, params })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param_names(p: &RenderedPredicate) -> Vec<&str> {
        p.params.iter().map(|(k, _)| k.as_str()).collect()
    }

    #[test]
    fn empty_filter_renders_empty_where_for_admin() {
        let p = render_predicate(&IssueFilter::default(), Visibility::Admin).unwrap();
        assert_eq!(p.where_clause, "");
        assert!(p.params.is_empty());
    }

    #[test]
    fn scalar_filters_are_anded() {
        let filter = IssueFilter {
            status: Some(Status::Resolved),
            category: Some(Category::Pothole),
            ..Default::default()
        };
        let p = render_predicate(&filter, Visibility::Admin).unwrap();
        assert!(p.where_clause.starts_with("WHERE "));
        assert!(p.where_clause.contains("i.status = $status"));
        assert!(p.where_clause.contains(" AND "));
        assert!(p.where_clause.contains("i.category = $category"));
        assert_eq!(param_names(&p), vec!["status", "category"]);
    }

    #[test]
    fn user_visibility_injects_public_or_own() {
        let caller = Uuid::new_v4();
        let p = render_predicate(&IssueFilter::default(), Visibility::User(caller)).unwrap();
        assert!(p.where_clause.contains("i.is_public = true OR i.reported_by = $caller_id"));
        assert_eq!(
            p.params[0],
            ("caller_id".to_string(), ParamValue::Str(caller.to_string()))
        );
    }

    #[test]
    fn search_is_lowercased_and_compatible_with_filters() {
        let filter = IssueFilter {
            status: Some(Status::Pending),
            search: Some("  BROKEN Light ".to_string()),
            ..Default::default()
        };
        let p = render_predicate(&filter, Visibility::Admin).unwrap();
        assert!(p.where_clause.contains("toLower(i.title) CONTAINS $search"));
        assert!(p.where_clause.contains("i.status = $status"));
        assert!(p
            .params
            .contains(&("search".to_string(), ParamValue::Str("broken light".to_string()))));
    }

    #[test]
    fn blank_search_is_ignored() {
        let filter = IssueFilter { search: Some("   ".to_string()), ..Default::default() };
        let p = render_predicate(&filter, Visibility::Admin).unwrap();
        assert_eq!(p.where_clause, "");
    }

    #[test]
    fn valid_coordinates_add_disc_predicate() {
        let filter = IssueFilter {
            latitude: Some(40.7589),
            longitude: Some(-73.9851),
            ..Default::default()
        };
        let p = render_predicate(&filter, Visibility::Admin).unwrap();
        assert!(p.where_clause.contains("point.distance"));
        assert!(p
            .params
            .contains(&("radius_m".to_string(), ParamValue::Float(DEFAULT_RADIUS_METERS))));
    }

    #[test]
    fn invalid_coordinates_short_circuit() {
        let filter = IssueFilter {
            latitude: Some(91.0),
            longitude: Some(0.0),
            ..Default::default()
        };
        assert_eq!(render_predicate(&filter, Visibility::Admin), None);
    }

    #[test]
    fn half_supplied_coordinates_short_circuit() {
        let filter = IssueFilter { latitude: Some(40.0), ..Default::default() };
        assert_eq!(filter.geo_strategy(), GeoStrategy::EmptyResult);
    }

    #[test]
    fn pagination_clamps_and_defaults() {
        let p = Pagination::clamp(None, None, false);
        assert_eq!((p.page, p.limit), (1, 20));

        let p = Pagination::clamp(Some(0), Some(0), false);
        assert_eq!((p.page, p.limit), (1, 1));

        let p = Pagination::clamp(Some(3), Some(500), false);
        assert_eq!((p.page, p.limit), (3, 100));

        let p = Pagination::clamp(Some(3), Some(500), true);
        assert_eq!((p.page, p.limit), (3, 500));

        let p = Pagination::clamp(Some(2), Some(5000), true);
        assert_eq!((p.page, p.limit), (2, 1000));
    }

    #[test]
    fn skip_is_page_minus_one_times_limit() {
        let p = Pagination { page: 4, limit: 25 };
        assert_eq!(p.skip(), 75);
    }

    #[test]
    fn page_meta_math() {
        let p = Pagination { page: 2, limit: 20 };
        let meta = p.meta(45);
        assert_eq!(meta.total_pages, 3);
        assert_eq!(meta.total_count, 45);
        assert!(meta.has_next_page);
        assert!(meta.has_prev_page);

        let meta = Pagination { page: 1, limit: 20 }.meta(0);
        assert_eq!(meta.total_pages, 0);
        assert!(!meta.has_next_page);
        assert!(!meta.has_prev_page);

        let meta = Pagination { page: 3, limit: 20 }.meta(60);
        assert_eq!(meta.total_pages, 3);
        assert!(!meta.has_next_page);
    }

    #[test]
    fn sort_whitelist_falls_back_to_created_at() {
        let s = SortSpec::from_request(Some("created_at"), Some("asc"));
        assert_eq!(s.order_clause(), "ORDER BY i.created_at ASC");

        let s = SortSpec::from_request(Some("upvotes"), None);
        assert_eq!(s.order_clause(), "ORDER BY size(i.upvotes) DESC");

        let s = SortSpec::from_request(Some("evil_field; DROP"), Some("asc"));
        assert_eq!(s.order_clause(), "ORDER BY i.created_at DESC");

        let s = SortSpec::from_request(None, None);
        assert_eq!(s.order_clause(), "ORDER BY i.created_at DESC");
    }

    #[test]
    fn geo_strategy_default_radius() {
        match GeoStrategy::from_request(Some(10.0), Some(20.0), None) {
            GeoStrategy::WithinRadius { radius_meters, .. } => {
                assert_eq!(radius_meters, DEFAULT_RADIUS_METERS)
            }
            other => panic!("expected WithinRadius, got {other:?}"),
        }
    }
}
