pub mod ai;
pub mod issues;
pub mod stats;

use std::collections::HashMap;

use serde::{Deserialize, Deserializer};
use serde_json::json;
use uuid::Uuid;

use civiclens_common::{Issue, UserSummary};

// --- Query structs ---

/// List parameters. Numeric fields parse leniently: malformed paging falls
/// back to the clamp defaults and malformed coordinates take the
/// empty-result path, instead of rejecting the whole query string with 400.
#[derive(Deserialize, Default)]
pub struct ListQuery {
    #[serde(default, deserialize_with = "lenient_u32")]
    pub page: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub reported_by: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub search: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub radius: Option<f64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

fn lenient_u32<'de, D>(d: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(d)?;
    Ok(raw.and_then(|s| s.trim().parse().ok()))
}

/// Unparseable values become NaN, which the coordinate validator rejects,
/// so `latitude=abc` yields an empty listing rather than an error.
fn lenient_f64<'de, D>(d: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(d)?;
    Ok(raw.map(|s| s.trim().parse().unwrap_or(f64::NAN)))
}

// --- Response shaping ---

/// Collect every user id an issue references, for batch resolution.
pub fn referenced_user_ids(issues: &[&Issue]) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = Vec::new();
    for issue in issues {
        ids.push(issue.reported_by);
        if let Some(assignee) = issue.assigned_to {
            ids.push(assignee);
        }
        for note in &issue.admin_notes {
            ids.push(note.author);
        }
        for change in &issue.status_history {
            ids.push(change.changed_by);
        }
    }
    ids.sort();
    ids.dedup();
    ids
}

fn user_json(id: Uuid, users: &HashMap<Uuid, UserSummary>) -> serde_json::Value {
    match users.get(&id) {
        Some(u) => json!({ "id": u.id, "name": u.name, "email": u.email }),
        None => json!({ "id": id }),
    }
}

/// Shape an issue for the wire, with user references resolved to display
/// summaries and vote membership collapsed to counts.
pub fn issue_view(issue: &Issue, users: &HashMap<Uuid, UserSummary>) -> serde_json::Value {
    let tally = issue.tally();
    json!({
        "id": issue.id,
        "title": issue.title,
        "description": issue.description,
        "category": issue.category,
        "priority": issue.priority,
        "status": issue.status,
        "location": { "lat": issue.location.lat, "lng": issue.location.lng },
        "address": issue.address,
        "images": issue.images,
        "reported_by": user_json(issue.reported_by, users),
        "assigned_to": issue.assigned_to.map(|id| user_json(id, users)),
        "votes": {
            "upvotes": tally.upvotes,
            "downvotes": tally.downvotes,
            "total_votes": tally.total_votes,
        },
        "is_public": issue.is_public,
        "estimated_resolution_time": issue.estimated_resolution_time,
        "admin_notes": issue.admin_notes.iter().map(|n| json!({
            "text": n.text,
            "author": user_json(n.author, users),
            "is_public": n.is_public,
            "created_at": n.created_at,
        })).collect::<Vec<_>>(),
        "status_history": issue.status_history.iter().map(|c| json!({
            "status": c.status,
            "changed_by": user_json(c.changed_by, users),
            "changed_at": c.changed_at,
            "reason": c.reason,
        })).collect::<Vec<_>>(),
        "created_at": issue.created_at,
        "updated_at": issue.updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::Uri;
    use civiclens_common::{Address, Category, GeoPoint, NewIssue};
    use civiclens_graph::{GeoStrategy, Pagination};

    fn parse_query(query: &str) -> ListQuery {
        let uri: Uri = format!("/api/issues?{query}").parse().unwrap();
        let Query(q) = Query::<ListQuery>::try_from_uri(&uri).unwrap();
        q
    }

    #[test]
    fn malformed_paging_falls_back_to_defaults() {
        let q = parse_query("page=abc&limit=xyz");
        assert_eq!(q.page, None);
        assert_eq!(q.limit, None);

        let p = Pagination::clamp(q.page, q.limit, false);
        assert_eq!((p.page, p.limit), (1, 20));
    }

    #[test]
    fn well_formed_paging_still_parses() {
        let q = parse_query("page=3&limit=50");
        assert_eq!((q.page, q.limit), (Some(3), Some(50)));
    }

    #[test]
    fn malformed_coordinates_take_empty_result_path() {
        let q = parse_query("latitude=north&longitude=-73.9851");
        assert!(q.latitude.is_some_and(f64::is_nan));
        assert_eq!(
            GeoStrategy::from_request(q.latitude, q.longitude, q.radius),
            GeoStrategy::EmptyResult
        );
    }

    #[test]
    fn valid_coordinates_survive_lenient_parsing() {
        let q = parse_query("latitude=40.7589&longitude=-73.9851&radius=2500");
        assert_eq!(q.latitude, Some(40.7589));
        assert!(matches!(
            GeoStrategy::from_request(q.latitude, q.longitude, q.radius),
            GeoStrategy::WithinRadius { .. }
        ));
    }

    fn sample_issue(reporter: Uuid) -> Issue {
        Issue::new(NewIssue {
            title: "Pothole".to_string(),
            description: "Deep pothole".to_string(),
            category: Category::Pothole,
            priority: None,
            location: GeoPoint { lat: 40.7589, lng: -73.9851 },
            address: Address::default(),
            images: Vec::new(),
            reported_by: reporter,
        })
        .unwrap()
    }

    #[test]
    fn referenced_ids_are_deduped() {
        let reporter = Uuid::new_v4();
        let admin = Uuid::new_v4();
        let mut issue = sample_issue(reporter);
        issue.add_note("note one", admin, true);
        issue.add_note("note two", admin, false);

        let ids = referenced_user_ids(&[&issue]);
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&reporter));
        assert!(ids.contains(&admin));
    }

    #[test]
    fn view_resolves_known_users() {
        let reporter = Uuid::new_v4();
        let issue = sample_issue(reporter);
        let mut users = HashMap::new();
        users.insert(
            reporter,
            UserSummary {
                id: reporter,
                name: "Ada Lee".to_string(),
                email: "ada@example.com".to_string(),
            },
        );

        let view = issue_view(&issue, &users);
        assert_eq!(view["reported_by"]["name"], "Ada Lee");
        assert_eq!(view["votes"]["total_votes"], 0);
        assert!(view["assigned_to"].is_null());
    }

    #[test]
    fn view_falls_back_to_bare_id() {
        let issue = sample_issue(Uuid::new_v4());
        let view = issue_view(&issue, &HashMap::new());
        assert_eq!(view["reported_by"]["id"], json!(issue.reported_by));
        assert!(view["reported_by"]["name"].is_null());
    }
}
