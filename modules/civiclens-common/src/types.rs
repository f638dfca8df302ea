use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CivicLensError;
use crate::geo::validate_coordinates;

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 2000;

// --- Geo Types ---

/// A single geodetic point. Always (lng, lat), WGS84.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Pothole,
    StreetLight,
    Drainage,
    TrafficSignal,
    RoadDamage,
    Sidewalk,
    Graffiti,
    Garbage,
    WaterLeak,
    ParkMaintenance,
    NoiseComplaint,
    Other,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Pothole => write!(f, "pothole"),
            Category::StreetLight => write!(f, "street_light"),
            Category::Drainage => write!(f, "drainage"),
            Category::TrafficSignal => write!(f, "traffic_signal"),
            Category::RoadDamage => write!(f, "road_damage"),
            Category::Sidewalk => write!(f, "sidewalk"),
            Category::Graffiti => write!(f, "graffiti"),
            Category::Garbage => write!(f, "garbage"),
            Category::WaterLeak => write!(f, "water_leak"),
            Category::ParkMaintenance => write!(f, "park_maintenance"),
            Category::NoiseComplaint => write!(f, "noise_complaint"),
            Category::Other => write!(f, "other"),
        }
    }
}

impl Category {
    pub const ALL: [Category; 12] = [
        Category::Pothole,
        Category::StreetLight,
        Category::Drainage,
        Category::TrafficSignal,
        Category::RoadDamage,
        Category::Sidewalk,
        Category::Graffiti,
        Category::Garbage,
        Category::WaterLeak,
        Category::ParkMaintenance,
        Category::NoiseComplaint,
        Category::Other,
    ];

    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "pothole" => Category::Pothole,
            "street_light" => Category::StreetLight,
            "drainage" => Category::Drainage,
            "traffic_signal" => Category::TrafficSignal,
            "road_damage" => Category::RoadDamage,
            "sidewalk" => Category::Sidewalk,
            "graffiti" => Category::Graffiti,
            "garbage" => Category::Garbage,
            "water_leak" => Category::WaterLeak,
            "park_maintenance" => Category::ParkMaintenance,
            "noise_complaint" => Category::NoiseComplaint,
            _ => Category::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
            Priority::Urgent => write!(f, "urgent"),
        }
    }
}

impl Priority {
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" => Priority::Low,
            "high" => Priority::High,
            "urgent" => Priority::Urgent,
            _ => Priority::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Pending,
    InProgress,
    Resolved,
    Rejected,
    Duplicate,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Pending => write!(f, "pending"),
            Status::InProgress => write!(f, "in_progress"),
            Status::Resolved => write!(f, "resolved"),
            Status::Rejected => write!(f, "rejected"),
            Status::Duplicate => write!(f, "duplicate"),
        }
    }
}

impl Status {
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "in_progress" => Status::InProgress,
            "resolved" => Status::Resolved,
            "rejected" => Status::Rejected,
            "duplicate" => Status::Duplicate,
            _ => Status::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteType {
    Up,
    Down,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }
}

// --- Value Types ---

/// Denormalized human-readable address components. Best-effort, may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        self.street.is_none() && self.city.is_none()
    }
}

/// An image attached to an issue. Owned by the issue; storage objects are
/// cleaned up best-effort when the issue is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueImage {
    pub url: String,
    /// Reference into the external image store, used for cascade deletion.
    pub storage_id: String,
    pub original_name: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminNote {
    pub text: String,
    pub author: Uuid,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: Status,
    pub changed_by: Uuid,
    pub changed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Display summary for a referenced user (reporter, assignee, note author).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
}

impl UserRecord {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: format!("{} {}", self.first_name, self.last_name).trim().to_string(),
            email: self.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub upvotes: usize,
    pub downvotes: usize,
    pub total_votes: usize,
}

// --- Issue ---

/// Creation-time input, validated by `Issue::new`.
#[derive(Debug, Clone)]
pub struct NewIssue {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub priority: Option<Priority>,
    pub location: GeoPoint,
    pub address: Address,
    pub images: Vec<IssueImage>,
    pub reported_by: Uuid,
}

/// A single reported civic problem with location, category, status,
/// and engagement metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub priority: Priority,
    pub status: Status,
    pub location: GeoPoint,
    pub address: Address,
    pub images: Vec<IssueImage>,
    pub reported_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub upvotes: Vec<Uuid>,
    pub downvotes: Vec<Uuid>,
    pub is_public: bool,
    pub estimated_resolution_time: Option<String>,
    pub admin_notes: Vec<AdminNote>,
    pub status_history: Vec<StatusChange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Issue {
    /// Validate and construct a new issue. Writes the first status history
    /// entry. Rejects empty/oversized text and out-of-bounds coordinates.
    pub fn new(input: NewIssue) -> Result<Self, CivicLensError> {
        let title = input.title.trim().to_string();
        let description = input.description.trim().to_string();

        if title.is_empty() {
            return Err(CivicLensError::Validation("Title is required".to_string()));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(CivicLensError::Validation(format!(
                "Title must be at most {MAX_TITLE_LEN} characters"
            )));
        }
        if description.is_empty() {
            return Err(CivicLensError::Validation("Description is required".to_string()));
        }
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(CivicLensError::Validation(format!(
                "Description must be at most {MAX_DESCRIPTION_LEN} characters"
            )));
        }
        if !validate_coordinates(input.location.lng, input.location.lat) {
            return Err(CivicLensError::Validation("Invalid coordinates provided".to_string()));
        }

        let now = Utc::now();
        let status = Status::Pending;

        Ok(Self {
            id: Uuid::new_v4(),
            title,
            description,
            category: input.category,
            priority: input.priority.unwrap_or_default(),
            status,
            location: input.location,
            address: input.address,
            images: input.images,
            reported_by: input.reported_by,
            assigned_to: None,
            upvotes: Vec::new(),
            downvotes: Vec::new(),
            is_public: true,
            estimated_resolution_time: None,
            admin_notes: Vec::new(),
            status_history: vec![StatusChange {
                status,
                changed_by: input.reported_by,
                changed_at: now,
                reason: None,
            }],
            created_at: now,
            updated_at: now,
        })
    }

    pub fn tally(&self) -> VoteTally {
        VoteTally {
            upvotes: self.upvotes.len(),
            downvotes: self.downvotes.len(),
            total_votes: self.upvotes.len() + self.downvotes.len(),
        }
    }

    /// Apply a vote. Removes the voter from both sets first so the sets stay
    /// disjoint, then inserts into the chosen set. `Remove` leaves the voter
    /// absent from both. Idempotent per vote type. Reporters may not vote on
    /// their own issue.
    pub fn apply_vote(&mut self, voter: Uuid, vote: VoteType) -> Result<VoteTally, CivicLensError> {
        if voter == self.reported_by {
            return Err(CivicLensError::Validation(
                "You cannot vote on your own issue".to_string(),
            ));
        }

        self.upvotes.retain(|v| *v != voter);
        self.downvotes.retain(|v| *v != voter);

        match vote {
            VoteType::Up => self.upvotes.push(voter),
            VoteType::Down => self.downvotes.push(voter),
            VoteType::Remove => {}
        }

        self.updated_at = Utc::now();
        Ok(self.tally())
    }

    /// Change status, appending a history entry when the value actually differs.
    /// Returns true if the status changed.
    pub fn set_status(&mut self, status: Status, changed_by: Uuid, reason: Option<String>) -> bool {
        if status == self.status {
            return false;
        }
        self.status = status;
        self.status_history.push(StatusChange {
            status,
            changed_by,
            changed_at: Utc::now(),
            reason,
        });
        self.updated_at = Utc::now();
        true
    }

    /// Append an admin note if the text is non-empty after trimming.
    /// Returns true if a note was added.
    pub fn add_note(&mut self, text: &str, author: Uuid, is_public: bool) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        self.admin_notes.push(AdminNote {
            text: text.to_string(),
            author,
            is_public,
            created_at: Utc::now(),
        });
        self.updated_at = Utc::now();
        true
    }

    /// Whether a caller may read this issue. Admins see everything; other
    /// callers see public issues and their own.
    pub fn visible_to(&self, role: Role, caller: Uuid) -> bool {
        role.is_admin() || self.is_public || self.reported_by == caller
    }

    /// Strip notes a non-admin reader must not see.
    pub fn retain_public_notes(&mut self) {
        self.admin_notes.retain(|n| n.is_public);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::DEFAULT_RADIUS_METERS;

    fn new_issue(reporter: Uuid) -> Issue {
        Issue::new(NewIssue {
            title: "Pothole on 5th Ave".to_string(),
            description: "Deep pothole near the crosswalk".to_string(),
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
    fn creation_writes_first_history_entry() {
        let issue = new_issue(Uuid::new_v4());
        assert_eq!(issue.status, Status::Pending);
        assert_eq!(issue.priority, Priority::Medium);
        assert_eq!(issue.status_history.len(), 1);
        assert_eq!(issue.status_history[0].status, Status::Pending);
        assert!(issue.is_public);
    }

    #[test]
    fn creation_rejects_empty_title() {
        let err = Issue::new(NewIssue {
            title: "   ".to_string(),
            description: "desc".to_string(),
            category: Category::Other,
            priority: None,
            location: GeoPoint { lat: 0.0, lng: 0.0 },
            address: Address::default(),
            images: Vec::new(),
            reported_by: Uuid::new_v4(),
        });
        assert!(matches!(err, Err(CivicLensError::Validation(_))));
    }

    #[test]
    fn creation_rejects_oversized_text() {
        let err = Issue::new(NewIssue {
            title: "t".repeat(MAX_TITLE_LEN + 1),
            description: "desc".to_string(),
            category: Category::Other,
            priority: None,
            location: GeoPoint { lat: 0.0, lng: 0.0 },
            address: Address::default(),
            images: Vec::new(),
            reported_by: Uuid::new_v4(),
        });
        assert!(matches!(err, Err(CivicLensError::Validation(_))));
    }

    #[test]
    fn creation_rejects_bad_coordinates() {
        let err = Issue::new(NewIssue {
            title: "Flooded underpass".to_string(),
            description: "Standing water after rain".to_string(),
            category: Category::Drainage,
            priority: None,
            location: GeoPoint { lat: 91.0, lng: 0.0 },
            address: Address::default(),
            images: Vec::new(),
            reported_by: Uuid::new_v4(),
        });
        assert!(matches!(err, Err(CivicLensError::Validation(_))));
    }

    #[test]
    fn vote_sets_stay_disjoint() {
        let mut issue = new_issue(Uuid::new_v4());
        let voter = Uuid::new_v4();

        issue.apply_vote(voter, VoteType::Up).unwrap();
        assert!(issue.upvotes.contains(&voter));

        let tally = issue.apply_vote(voter, VoteType::Down).unwrap();
        assert!(!issue.upvotes.contains(&voter));
        assert!(issue.downvotes.contains(&voter));
        assert_eq!(tally.upvotes, 0);
        assert_eq!(tally.downvotes, 1);
    }

    #[test]
    fn repeated_vote_is_idempotent() {
        let mut issue = new_issue(Uuid::new_v4());
        let voter = Uuid::new_v4();

        let first = issue.apply_vote(voter, VoteType::Up).unwrap();
        let second = issue.apply_vote(voter, VoteType::Up).unwrap();
        assert_eq!(first, second);
        assert_eq!(issue.upvotes.len(), 1);
    }

    #[test]
    fn remove_clears_both_sets() {
        let mut issue = new_issue(Uuid::new_v4());
        let voter = Uuid::new_v4();

        issue.apply_vote(voter, VoteType::Up).unwrap();
        let tally = issue.apply_vote(voter, VoteType::Remove).unwrap();
        assert_eq!(tally.total_votes, 0);
        assert!(issue.upvotes.is_empty());
        assert!(issue.downvotes.is_empty());

        // Remove again: still fine, still empty
        let tally = issue.apply_vote(voter, VoteType::Remove).unwrap();
        assert_eq!(tally.total_votes, 0);
    }

    #[test]
    fn reporter_cannot_vote_on_own_issue() {
        let reporter = Uuid::new_v4();
        let mut issue = new_issue(reporter);

        for vote in [VoteType::Up, VoteType::Down, VoteType::Remove] {
            let err = issue.apply_vote(reporter, vote);
            assert!(matches!(err, Err(CivicLensError::Validation(_))));
        }
        assert!(issue.upvotes.is_empty());
        assert!(issue.downvotes.is_empty());
    }

    #[test]
    fn concurrent_voters_both_counted() {
        let mut issue = new_issue(Uuid::new_v4());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        issue.apply_vote(a, VoteType::Up).unwrap();
        let tally = issue.apply_vote(b, VoteType::Down).unwrap();
        assert_eq!(tally.upvotes, 1);
        assert_eq!(tally.downvotes, 1);
        assert_eq!(tally.total_votes, 2);
    }

    #[test]
    fn status_change_appends_history() {
        let mut issue = new_issue(Uuid::new_v4());
        let admin = Uuid::new_v4();

        let changed = issue.set_status(Status::InProgress, admin, Some("assigned crew".to_string()));
        assert!(changed);
        assert_eq!(issue.status_history.len(), 2);
        let last = issue.status_history.last().unwrap();
        assert_eq!(last.status, Status::InProgress);
        assert_eq!(last.reason.as_deref(), Some("assigned crew"));
        assert_eq!(last.changed_by, admin);
    }

    #[test]
    fn same_status_does_not_append_history() {
        let mut issue = new_issue(Uuid::new_v4());
        let changed = issue.set_status(Status::Pending, Uuid::new_v4(), None);
        assert!(!changed);
        assert_eq!(issue.status_history.len(), 1);
    }

    #[test]
    fn blank_note_is_dropped() {
        let mut issue = new_issue(Uuid::new_v4());
        assert!(!issue.add_note("   ", Uuid::new_v4(), false));
        assert!(issue.add_note("needs a crew", Uuid::new_v4(), false));
        assert_eq!(issue.admin_notes.len(), 1);
    }

    #[test]
    fn visibility_rules() {
        let reporter = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let mut issue = new_issue(reporter);
        issue.is_public = false;

        assert!(issue.visible_to(Role::Admin, stranger));
        assert!(issue.visible_to(Role::User, reporter));
        assert!(!issue.visible_to(Role::User, stranger));

        issue.is_public = true;
        assert!(issue.visible_to(Role::User, stranger));
    }

    #[test]
    fn non_public_notes_filtered() {
        let mut issue = new_issue(Uuid::new_v4());
        issue.add_note("public update", Uuid::new_v4(), true);
        issue.add_note("internal detail", Uuid::new_v4(), false);

        issue.retain_public_notes();
        assert_eq!(issue.admin_notes.len(), 1);
        assert!(issue.admin_notes[0].is_public);
    }

    #[test]
    fn category_round_trips_loosely() {
        for cat in Category::ALL {
            assert_eq!(Category::from_str_loose(&cat.to_string()), cat);
        }
        assert_eq!(Category::from_str_loose("unknown thing"), Category::Other);
    }

    #[test]
    fn default_radius_is_5km() {
        assert_eq!(DEFAULT_RADIUS_METERS, 5000.0);
    }
}
