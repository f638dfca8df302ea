use chrono::{DateTime, Utc};
use neo4rs::query;
use tracing::info;
use uuid::Uuid;

use civiclens_common::{
    CivicLensError, Issue, IssueImage, Priority, Role, Status, UserRecord, VoteTally, VoteType,
};

use crate::query::{apply_params, ParamValue};
use crate::GraphClient;

/// Write-side wrapper for the graph. Handles issue creation, admin updates,
/// votes, deletion, and user mirroring.
pub struct IssueWriter {
    client: GraphClient,
}

/// Admin patch over an issue. All preconditions are validated before any
/// field is touched; the patch itself is applied in a single statement.
#[derive(Debug, Clone, Default)]
pub struct IssuePatch {
    pub status: Option<Status>,
    pub status_reason: Option<String>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<Uuid>,
    pub is_public: Option<bool>,
    pub estimated_resolution_time: Option<String>,
    pub admin_note: Option<String>,
    pub note_is_public: bool,
}

impl IssueWriter {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    /// Persist a validated issue, including its initial status history entry.
    pub async fn create_issue(&self, issue: &Issue) -> Result<Uuid, CivicLensError> {
        let first = issue
            .status_history
            .first()
            .ok_or_else(|| CivicLensError::Validation("issue has no status history".to_string()))?;

        let q = query(
            "CREATE (i:Issue {
                id: $id,
                title: $title,
                description: $description,
                category: $category,
                priority: $priority,
                status: $status,
                lat: $lat,
                lng: $lng,
                address: $address,
                images: $images,
                reported_by: $reported_by,
                assigned_to: $assigned_to,
                upvotes: [],
                downvotes: [],
                is_public: $is_public,
                estimated_resolution_time: $estimated_resolution_time,
                created_at: $created_at,
                updated_at: $updated_at
            })
            CREATE (i)-[:STATUS_CHANGED]->(:StatusChange {
                status: $status,
                changed_by: $reported_by,
                changed_at: $created_at,
                reason: $first_reason
            })
            RETURN i.id AS id",
        )
        .param("id", issue.id.to_string())
        .param("title", issue.title.as_str())
        .param("description", issue.description.as_str())
        .param("category", issue.category.to_string())
        .param("priority", issue.priority.to_string())
        .param("status", issue.status.to_string())
        .param("lat", issue.location.lat)
        .param("lng", issue.location.lng)
        .param("address", serde_json::to_string(&issue.address).unwrap_or_default())
        .param("images", serde_json::to_string(&issue.images).unwrap_or_default())
        .param("reported_by", issue.reported_by.to_string())
        .param(
            "assigned_to",
            issue.assigned_to.map(|u| u.to_string()).unwrap_or_default(),
        )
        .param("is_public", issue.is_public)
        .param(
            "estimated_resolution_time",
            issue.estimated_resolution_time.clone().unwrap_or_default(),
        )
        .param("created_at", format_datetime(&issue.created_at))
        .param("updated_at", format_datetime(&issue.updated_at))
        .param("first_reason", first.reason.clone().unwrap_or_default());

        let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
        while stream.next().await.map_err(db_err)?.is_some() {}

        info!(issue_id = %issue.id, category = %issue.category, "issue created");
        Ok(issue.id)
    }

    /// Apply an admin patch. Validates every precondition (assignee exists and
    /// holds the admin role) before mutating anything, then applies all field
    /// changes, the optional history entry, and the optional note in one
    /// statement. Returns true if the status actually changed.
    pub async fn update_issue(
        &self,
        issue_id: Uuid,
        caller: Uuid,
        patch: &IssuePatch,
    ) -> Result<bool, CivicLensError> {
        // Precondition: assignee must resolve to an admin.
        if let Some(assignee) = patch.assigned_to {
            match self.find_user(assignee).await? {
                Some(user) if user.role.is_admin() => {}
                _ => {
                    return Err(CivicLensError::Validation(
                        "Invalid assignee - user must be an admin".to_string(),
                    ))
                }
            }
        }

        let current_status = self
            .issue_status(issue_id)
            .await?
            .ok_or_else(|| CivicLensError::NotFound("Issue not found".to_string()))?;

        let status_changed = patch.status.is_some_and(|s| s != current_status);
        let note_text = patch
            .admin_note
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());

        let now = format_datetime(&Utc::now());
        let mut sets: Vec<&str> = vec!["i.updated_at = $now"];
        let mut params: Vec<(String, ParamValue)> = vec![
            ("id".to_string(), ParamValue::Str(issue_id.to_string())),
            ("now".to_string(), ParamValue::Str(now.clone())),
        ];

        if let Some(status) = patch.status {
            sets.push("i.status = $status");
            params.push(("status".to_string(), ParamValue::Str(status.to_string())));
        }
        if let Some(priority) = patch.priority {
            sets.push("i.priority = $priority");
            params.push(("priority".to_string(), ParamValue::Str(priority.to_string())));
        }
        if let Some(assignee) = patch.assigned_to {
            sets.push("i.assigned_to = $assigned_to");
            params.push(("assigned_to".to_string(), ParamValue::Str(assignee.to_string())));
        }
        if let Some(is_public) = patch.is_public {
            sets.push("i.is_public = $is_public");
            params.push(("is_public".to_string(), ParamValue::Bool(is_public)));
        }
        if let Some(ert) = &patch.estimated_resolution_time {
            sets.push("i.estimated_resolution_time = $ert");
            params.push(("ert".to_string(), ParamValue::Str(ert.clone())));
        }

        let mut creates = String::new();
        if status_changed {
            creates.push_str(
                "\nCREATE (i)-[:STATUS_CHANGED]->(:StatusChange {
                    status: $status, changed_by: $caller, changed_at: $now, reason: $reason })",
            );
            params.push(("caller".to_string(), ParamValue::Str(caller.to_string())));
            params.push((
                "reason".to_string(),
                ParamValue::Str(patch.status_reason.clone().unwrap_or_default()),
            ));
        }
        if let Some(text) = note_text {
            creates.push_str(
                "\nCREATE (i)-[:HAS_NOTE]->(:AdminNote {
                    text: $note_text, author: $note_author, is_public: $note_is_public, created_at: $now })",
            );
            params.push(("note_text".to_string(), ParamValue::Str(text.to_string())));
            params.push(("note_author".to_string(), ParamValue::Str(caller.to_string())));
            params.push(("note_is_public".to_string(), ParamValue::Bool(patch.note_is_public)));
        }

        let cypher = format!(
            "MATCH (i:Issue {{id: $id}})\nSET {}{}",
            sets.join(", "),
            creates
        );

        let q = apply_params(query(&cypher), &params);
        self.client.graph.run(q).await.map_err(db_err)?;

        info!(issue_id = %issue_id, status_changed, "issue updated");
        Ok(status_changed)
    }

    /// Record a vote in a single statement: the voter is removed from both
    /// sets and re-inserted into the chosen one, so the sets stay disjoint
    /// and concurrent votes by different voters are both preserved.
    pub async fn apply_vote(
        &self,
        issue_id: Uuid,
        voter: Uuid,
        vote: VoteType,
    ) -> Result<VoteTally, CivicLensError> {
        let reported_by = self
            .issue_reporter(issue_id)
            .await?
            .ok_or_else(|| CivicLensError::NotFound("Issue not found".to_string()))?;
        if reported_by == voter {
            return Err(CivicLensError::Validation(
                "You cannot vote on your own issue".to_string(),
            ));
        }

        let vote_str = match vote {
            VoteType::Up => "up",
            VoteType::Down => "down",
            VoteType::Remove => "remove",
        };

        let q = query(
            "MATCH (i:Issue {id: $id})
             SET i.upvotes = [v IN i.upvotes WHERE v <> $voter]
                 + CASE WHEN $vote = 'up' THEN [$voter] ELSE [] END,
                 i.downvotes = [v IN i.downvotes WHERE v <> $voter]
                 + CASE WHEN $vote = 'down' THEN [$voter] ELSE [] END,
                 i.updated_at = $now
             RETURN size(i.upvotes) AS up, size(i.downvotes) AS down",
        )
        .param("id", issue_id.to_string())
        .param("voter", voter.to_string())
        .param("vote", vote_str)
        .param("now", format_datetime(&Utc::now()));

        let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
        let row = stream
            .next()
            .await
            .map_err(db_err)?
            .ok_or_else(|| CivicLensError::NotFound("Issue not found".to_string()))?;

        let up: i64 = row.get("up").unwrap_or(0);
        let down: i64 = row.get("down").unwrap_or(0);
        Ok(VoteTally {
            upvotes: up as usize,
            downvotes: down as usize,
            total_votes: (up + down) as usize,
        })
    }

    /// Delete an issue and its owned history/note children. Returns the
    /// issue's images so the caller can cascade storage cleanup best-effort.
    pub async fn delete_issue(&self, issue_id: Uuid) -> Result<Vec<IssueImage>, CivicLensError> {
        let q = query("MATCH (i:Issue {id: $id}) RETURN i.images AS images")
            .param("id", issue_id.to_string());
        let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
        let row = stream
            .next()
            .await
            .map_err(db_err)?
            .ok_or_else(|| CivicLensError::NotFound("Issue not found".to_string()))?;
        let images_json: String = row.get("images").unwrap_or_default();
        let images: Vec<IssueImage> = serde_json::from_str(&images_json).unwrap_or_default();

        let q = query(
            "MATCH (i:Issue {id: $id})
             OPTIONAL MATCH (i)-[:STATUS_CHANGED|HAS_NOTE]->(child)
             DETACH DELETE i, child",
        )
        .param("id", issue_id.to_string());
        self.client.graph.run(q).await.map_err(db_err)?;

        info!(issue_id = %issue_id, image_count = images.len(), "issue deleted");
        Ok(images)
    }

    /// Mirror a user identity into the graph so reads can resolve display
    /// summaries. Idempotent MERGE keyed on id.
    pub async fn upsert_user(&self, user: &UserRecord) -> Result<(), CivicLensError> {
        let q = query(
            "MERGE (u:User {id: $id})
             SET u.first_name = $first_name,
                 u.last_name = $last_name,
                 u.email = $email,
                 u.role = $role",
        )
        .param("id", user.id.to_string())
        .param("first_name", user.first_name.as_str())
        .param("last_name", user.last_name.as_str())
        .param("email", user.email.as_str())
        .param("role", if user.role.is_admin() { "admin" } else { "user" });

        self.client.graph.run(q).await.map_err(db_err)
    }

    pub async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, CivicLensError> {
        let q = query("MATCH (u:User {id: $id}) RETURN u").param("id", id.to_string());
        let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
        let Some(row) = stream.next().await.map_err(db_err)? else {
            return Ok(None);
        };
        let Ok(node) = row.get::<neo4rs::Node>("u") else {
            return Ok(None);
        };
        let role_str: String = node.get("role").unwrap_or_default();
        Ok(Some(UserRecord {
            id,
            first_name: node.get("first_name").unwrap_or_default(),
            last_name: node.get("last_name").unwrap_or_default(),
            email: node.get("email").unwrap_or_default(),
            role: Role::from_str_loose(&role_str),
        }))
    }

    async fn issue_status(&self, issue_id: Uuid) -> Result<Option<Status>, CivicLensError> {
        let q = query("MATCH (i:Issue {id: $id}) RETURN i.status AS status")
            .param("id", issue_id.to_string());
        let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
        Ok(stream.next().await.map_err(db_err)?.map(|row| {
            let s: String = row.get("status").unwrap_or_default();
            Status::from_str_loose(&s)
        }))
    }

    async fn issue_reporter(&self, issue_id: Uuid) -> Result<Option<Uuid>, CivicLensError> {
        let q = query("MATCH (i:Issue {id: $id}) RETURN i.reported_by AS reported_by")
            .param("id", issue_id.to_string());
        let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
        Ok(stream
            .next()
            .await
            .map_err(db_err)?
            .and_then(|row| {
                let s: String = row.get("reported_by").unwrap_or_default();
                Uuid::parse_str(&s).ok()
            }))
    }
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

pub(crate) fn db_err(e: neo4rs::Error) -> CivicLensError {
    CivicLensError::Database(e.to_string())
}
