use neo4rs::{query, ConfigBuilder, Graph};
use tracing::info;

/// Thin wrapper around neo4rs::Graph providing connection setup.
#[derive(Clone)]
pub struct GraphClient {
    pub(crate) graph: Graph,
}

impl GraphClient {
    /// Connect to Neo4j with the given credentials.
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self, neo4rs::Error> {
        let config = ConfigBuilder::default()
            .uri(uri)
            .user(user)
            .password(password)
            .fetch_size(500)
            .max_connections(10)
            .build()
            .unwrap();
        let graph = Graph::connect(config).await?;
        Ok(Self { graph })
    }

    /// Get a reference to the underlying neo4rs Graph.
    pub fn inner(&self) -> &Graph {
        &self.graph
    }

    /// Create the constraints and indexes the issue queries rely on:
    /// unique issue/user ids, lat/lng range indexes for the radius predicate,
    /// and title/description text indexes for search. Idempotent.
    pub async fn ensure_schema(&self) -> Result<(), neo4rs::Error> {
        let statements = [
            "CREATE CONSTRAINT issue_id IF NOT EXISTS FOR (i:Issue) REQUIRE i.id IS UNIQUE",
            "CREATE CONSTRAINT user_id IF NOT EXISTS FOR (u:User) REQUIRE u.id IS UNIQUE",
            "CREATE INDEX issue_lat IF NOT EXISTS FOR (i:Issue) ON (i.lat)",
            "CREATE INDEX issue_lng IF NOT EXISTS FOR (i:Issue) ON (i.lng)",
            "CREATE INDEX issue_status IF NOT EXISTS FOR (i:Issue) ON (i.status)",
            "CREATE INDEX issue_category IF NOT EXISTS FOR (i:Issue) ON (i.category)",
            "CREATE INDEX issue_created_at IF NOT EXISTS FOR (i:Issue) ON (i.created_at)",
            "CREATE TEXT INDEX issue_title IF NOT EXISTS FOR (i:Issue) ON (i.title)",
            "CREATE TEXT INDEX issue_description IF NOT EXISTS FOR (i:Issue) ON (i.description)",
        ];

        for stmt in statements {
            self.graph.run(query(stmt)).await?;
        }
        info!("graph schema ensured");
        Ok(())
    }
}
