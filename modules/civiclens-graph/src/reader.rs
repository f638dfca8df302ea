use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use neo4rs::query;
use serde::Serialize;
use uuid::Uuid;

use civiclens_common::{
    Address, AdminNote, Category, CivicLensError, GeoPoint, Issue, IssueImage, Priority, Role,
    Status, StatusChange, UserSummary,
};

use crate::query::{
    apply_params, render_predicate, IssueFilter, PageMeta, Pagination, RenderedPredicate,
    SortSpec, Visibility,
};
use crate::writer::db_err;
use crate::GraphClient;

/// Read-side wrapper for the graph. Every listing path goes through the
/// rendered predicate, so the caller's visibility is enforced in the store,
/// not in the response shaping.
pub struct IssueReader {
    client: GraphClient,
}

impl IssueReader {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    /// List issues matching the filter under the caller's visibility.
    /// The data query and the count query share one predicate and run
    /// concurrently; the response is assembled only after both resolve.
    pub async fn list(
        &self,
        filter: &IssueFilter,
        visibility: Visibility,
        pagination: Pagination,
        sort: SortSpec,
    ) -> Result<(Vec<Issue>, PageMeta), CivicLensError> {
        let Some(predicate) = render_predicate(filter, visibility) else {
            // Invalid coordinates: empty result, not an error
            return Ok((Vec::new(), pagination.meta(0)));
        };

        let (issues, total) = tokio::join!(
            self.fetch_page(&predicate, pagination, sort),
            self.count(&predicate),
        );
        let (issues, total) = (issues?, total?);

        Ok((issues, pagination.meta(total)))
    }

    async fn fetch_page(
        &self,
        predicate: &RenderedPredicate,
        pagination: Pagination,
        sort: SortSpec,
    ) -> Result<Vec<Issue>, CivicLensError> {
        // Children are gathered with pattern comprehensions, not an
        // aggregation stage: collect() after ORDER BY would not preserve
        // the sorted row order.
        let cypher = format!(
            "MATCH (i:Issue)
             {where_clause}
             WITH i
             {order_clause}
             SKIP $skip LIMIT $limit
             RETURN i,
                    [(i)-[:HAS_NOTE]->(note:AdminNote) | note] AS notes,
                    [(i)-[:STATUS_CHANGED]->(sc:StatusChange) | sc] AS history",
            where_clause = predicate.where_clause,
            order_clause = sort.order_clause(),
        );

        let q = apply_params(query(&cypher), &predicate.params)
            .param("skip", pagination.skip() as i64)
            .param("limit", pagination.limit as i64);

        let mut issues = Vec::new();
        let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
        while let Some(row) = stream.next().await.map_err(db_err)? {
            if let Some(issue) = row_to_issue(&row) {
                issues.push(issue);
            }
        }
        Ok(issues)
    }

    async fn count(&self, predicate: &RenderedPredicate) -> Result<u64, CivicLensError> {
        let cypher = format!(
            "MATCH (i:Issue) {} RETURN count(i) AS total",
            predicate.where_clause
        );
        let q = apply_params(query(&cypher), &predicate.params);

        let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
        let total = match stream.next().await.map_err(db_err)? {
            Some(row) => row.get::<i64>("total").unwrap_or(0),
            None => 0,
        };
        Ok(total.max(0) as u64)
    }

    /// Fetch one issue by id with its notes and history. Visibility and
    /// note filtering are the caller's responsibility (they need the raw
    /// record to decide).
    pub async fn get(&self, id: Uuid) -> Result<Option<Issue>, CivicLensError> {
        let q = query(
            "MATCH (i:Issue {id: $id})
             RETURN i,
                    [(i)-[:HAS_NOTE]->(note:AdminNote) | note] AS notes,
                    [(i)-[:STATUS_CHANGED]->(sc:StatusChange) | sc] AS history",
        )
        .param("id", id.to_string());

        let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
        match stream.next().await.map_err(db_err)? {
            Some(row) => Ok(row_to_issue(&row)),
            None => Ok(None),
        }
    }

    /// Resolve user ids to display summaries in one round trip. Unknown ids
    /// are simply absent from the map.
    pub async fn resolve_users(
        &self,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, UserSummary>, CivicLensError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let id_strs: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        let q = query(
            "MATCH (u:User) WHERE u.id IN $ids
             RETURN u.id AS id, u.first_name AS first_name, u.last_name AS last_name, u.email AS email",
        )
        .param("ids", id_strs);

        let mut users = HashMap::new();
        let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
        while let Some(row) = stream.next().await.map_err(db_err)? {
            let id_str: String = row.get("id").unwrap_or_default();
            let Ok(id) = Uuid::parse_str(&id_str) else {
                continue;
            };
            let first: String = row.get("first_name").unwrap_or_default();
            let last: String = row.get("last_name").unwrap_or_default();
            users.insert(
                id,
                UserSummary {
                    id,
                    name: format!("{first} {last}").trim().to_string(),
                    email: row.get("email").unwrap_or_default(),
                },
            );
        }
        Ok(users)
    }

    /// Aggregate counts for the admin dashboard: overall status/priority
    /// tallies, per-category counts, and a 12-month trailing histogram.
    pub async fn stats(&self) -> Result<IssueStats, CivicLensError> {
        let overall = self.overall_stats().await?;
        let by_category = self.category_counts().await?;
        let monthly = self.monthly_counts().await?;
        Ok(IssueStats { overall, by_category, monthly })
    }

    async fn overall_stats(&self) -> Result<OverallStats, CivicLensError> {
        let q = query(
            "MATCH (i:Issue)
             RETURN count(i) AS total,
                    sum(CASE WHEN i.status = 'pending' THEN 1 ELSE 0 END) AS pending,
                    sum(CASE WHEN i.status = 'in_progress' THEN 1 ELSE 0 END) AS in_progress,
                    sum(CASE WHEN i.status = 'resolved' THEN 1 ELSE 0 END) AS resolved,
                    sum(CASE WHEN i.priority = 'urgent' THEN 1 ELSE 0 END) AS urgent,
                    sum(CASE WHEN i.priority = 'high' THEN 1 ELSE 0 END) AS high",
        );

        let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
        let stats = match stream.next().await.map_err(db_err)? {
            Some(row) => OverallStats {
                total_issues: row.get("total").unwrap_or(0),
                pending_issues: row.get("pending").unwrap_or(0),
                in_progress_issues: row.get("in_progress").unwrap_or(0),
                resolved_issues: row.get("resolved").unwrap_or(0),
                urgent_issues: row.get("urgent").unwrap_or(0),
                high_priority_issues: row.get("high").unwrap_or(0),
            },
            None => OverallStats::default(),
        };
        Ok(stats)
    }

    async fn category_counts(&self) -> Result<Vec<BucketCount>, CivicLensError> {
        let q = query(
            "MATCH (i:Issue)
             RETURN i.category AS bucket, count(*) AS cnt
             ORDER BY cnt DESC",
        );

        let mut counts = Vec::new();
        let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
        while let Some(row) = stream.next().await.map_err(db_err)? {
            let bucket: String = row.get("bucket").unwrap_or_default();
            let cnt: i64 = row.get("cnt").unwrap_or(0);
            counts.push(BucketCount { bucket, count: cnt });
        }
        Ok(counts)
    }

    async fn monthly_counts(&self) -> Result<Vec<BucketCount>, CivicLensError> {
        // created_at is stored as "%Y-%m-%dT..." so the first 7 chars are the
        // month bucket; newest 12 buckets form the trailing histogram.
        let q = query(
            "MATCH (i:Issue)
             RETURN substring(i.created_at, 0, 7) AS bucket, count(*) AS cnt
             ORDER BY bucket DESC
             LIMIT 12",
        );

        let mut counts = Vec::new();
        let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
        while let Some(row) = stream.next().await.map_err(db_err)? {
            let bucket: String = row.get("bucket").unwrap_or_default();
            let cnt: i64 = row.get("cnt").unwrap_or(0);
            counts.push(BucketCount { bucket, count: cnt });
        }
        Ok(counts)
    }
}

// --- Stats types ---

#[derive(Debug, Clone, Serialize)]
pub struct IssueStats {
    pub overall: OverallStats,
    pub by_category: Vec<BucketCount>,
    pub monthly: Vec<BucketCount>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OverallStats {
    pub total_issues: i64,
    pub pending_issues: i64,
    pub in_progress_issues: i64,
    pub resolved_issues: i64,
    pub urgent_issues: i64,
    pub high_priority_issues: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BucketCount {
    pub bucket: String,
    pub count: i64,
}

// --- Row conversion ---

pub fn row_to_issue(row: &neo4rs::Row) -> Option<Issue> {
    let n: neo4rs::Node = row.get("i").ok()?;

    let id_str: String = n.get("id").ok()?;
    let id = Uuid::parse_str(&id_str).ok()?;

    let title: String = n.get("title").unwrap_or_default();
    let description: String = n.get("description").unwrap_or_default();
    let category_str: String = n.get("category").unwrap_or_default();
    let priority_str: String = n.get("priority").unwrap_or_default();
    let status_str: String = n.get("status").unwrap_or_default();

    let lat: f64 = n.get("lat").unwrap_or(0.0);
    let lng: f64 = n.get("lng").unwrap_or(0.0);

    let address_json: String = n.get("address").unwrap_or_default();
    let address: Address = serde_json::from_str(&address_json).unwrap_or_default();
    let images_json: String = n.get("images").unwrap_or_default();
    let images: Vec<IssueImage> = serde_json::from_str(&images_json).unwrap_or_default();

    let reported_by_str: String = n.get("reported_by").unwrap_or_default();
    let reported_by = Uuid::parse_str(&reported_by_str).ok()?;
    let assigned_to_str: String = n.get("assigned_to").unwrap_or_default();
    let assigned_to = Uuid::parse_str(&assigned_to_str).ok();

    let upvotes = parse_uuid_list(&n, "upvotes");
    let downvotes = parse_uuid_list(&n, "downvotes");

    let is_public: bool = n.get("is_public").unwrap_or(true);
    let ert: String = n.get("estimated_resolution_time").unwrap_or_default();

    let mut admin_notes = extract_notes(row);
    admin_notes.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    let mut status_history = extract_history(row);
    status_history.sort_by(|a, b| a.changed_at.cmp(&b.changed_at));

    Some(Issue {
        id,
        title,
        description,
        category: Category::from_str_loose(&category_str),
        priority: Priority::from_str_loose(&priority_str),
        status: Status::from_str_loose(&status_str),
        location: GeoPoint { lat, lng },
        address,
        images,
        reported_by,
        assigned_to,
        upvotes,
        downvotes,
        is_public,
        estimated_resolution_time: if ert.is_empty() { None } else { Some(ert) },
        admin_notes,
        status_history,
        created_at: parse_datetime_prop(&n, "created_at"),
        updated_at: parse_datetime_prop(&n, "updated_at"),
    })
}

fn extract_notes(row: &neo4rs::Row) -> Vec<AdminNote> {
    let nodes: Vec<neo4rs::Node> = row.get("notes").unwrap_or_default();
    nodes
        .into_iter()
        .filter_map(|n| {
            let author_str: String = n.get("author").ok()?;
            Some(AdminNote {
                text: n.get("text").unwrap_or_default(),
                author: Uuid::parse_str(&author_str).ok()?,
                is_public: n.get("is_public").unwrap_or(false),
                created_at: parse_datetime_prop(&n, "created_at"),
            })
        })
        .collect()
}

fn extract_history(row: &neo4rs::Row) -> Vec<StatusChange> {
    let nodes: Vec<neo4rs::Node> = row.get("history").unwrap_or_default();
    nodes
        .into_iter()
        .filter_map(|n| {
            let status_str: String = n.get("status").ok()?;
            let changed_by_str: String = n.get("changed_by").unwrap_or_default();
            let reason: String = n.get("reason").unwrap_or_default();
            Some(StatusChange {
                status: Status::from_str_loose(&status_str),
                changed_by: Uuid::parse_str(&changed_by_str).ok()?,
                changed_at: parse_datetime_prop(&n, "changed_at"),
                reason: if reason.is_empty() { None } else { Some(reason) },
            })
        })
        .collect()
}

fn parse_uuid_list(n: &neo4rs::Node, prop: &str) -> Vec<Uuid> {
    let raw: Vec<String> = n.get(prop).unwrap_or_default();
    raw.iter().filter_map(|s| Uuid::parse_str(s).ok()).collect()
}

pub fn parse_datetime_prop(n: &neo4rs::Node, prop: &str) -> DateTime<Utc> {
    // Writer stores as "%Y-%m-%dT%H:%M:%S%.6f" (no timezone, implicitly UTC)
    if let Ok(s) = n.get::<String>(prop) {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
            return dt.with_timezone(&Utc);
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f") {
            return naive.and_utc();
        }
    }
    Utc::now()
}

/// Convenience used by handlers that already hold a `Role` + caller id.
pub fn visibility_for(role: Role, caller: Uuid) -> Visibility {
    if role.is_admin() {
        Visibility::Admin
    } else {
        Visibility::User(caller)
    }
}
