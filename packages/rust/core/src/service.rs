//! The learning path service: graph sessions, pathfinding, learner state.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use learnpath_graph::{ConceptGraph, GraphBuilder, LearningPath, PathOptions};
use learnpath_ingest::Ingestor;
use learnpath_learner::LearnerTracker;
use learnpath_shared::{
    AppConfig, GraphId, IngestWarning, LearnPathError, LearnerId, Result, WeightVector,
};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::progress::ProgressReporter;

/// Result of one `build_graph` call.
#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
    /// `None` when nothing usable was extracted and no graph was stored.
    pub graph_id: Option<GraphId>,
    /// Canonical labels, sorted.
    pub nodes: Vec<String>,
    /// Directed `(from, to)` pairs.
    pub edges: Vec<(String, String)>,
    pub warnings: Vec<IngestWarning>,
}

impl BuildOutcome {
    fn from_graph(graph: &ConceptGraph, graph_id: Option<GraphId>) -> Self {
        Self {
            graph_id,
            nodes: graph.nodes().into_iter().map(str::to_string).collect(),
            edges: graph.edges().into_iter().map(|e| (e.from, e.to)).collect(),
            warnings: graph.warnings().to_vec(),
        }
    }
}

/// Inputs to `find_path`.
#[derive(Debug, Clone)]
pub struct PathRequest {
    pub start: String,
    pub goal: String,
    /// Falls back to `pathfinding.default_weights`.
    pub weights: Option<WeightVector>,
    /// When set, the learner's mastery and interests adjust edge costs.
    pub learner_id: Option<LearnerId>,
    /// Falls back to the most recent build.
    pub graph_id: Option<GraphId>,
}

impl PathRequest {
    pub fn new(start: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            goal: goal.into(),
            weights: None,
            learner_id: None,
            graph_id: None,
        }
    }
}

/// Counts and provenance of a stored graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSummary {
    pub graph_id: GraphId,
    pub nodes: usize,
    pub edges: usize,
    pub sources: Vec<String>,
    pub built_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Graph sessions
// ---------------------------------------------------------------------------

/// Bounded registry of built graphs, oldest evicted first.
#[derive(Debug)]
struct GraphSessions {
    graphs: HashMap<GraphId, Arc<ConceptGraph>>,
    order: VecDeque<GraphId>,
    current: Option<GraphId>,
    capacity: usize,
}

impl GraphSessions {
    fn new(capacity: usize) -> Self {
        Self {
            graphs: HashMap::new(),
            order: VecDeque::new(),
            current: None,
            capacity: capacity.max(1),
        }
    }

    fn insert(&mut self, graph: Arc<ConceptGraph>) -> GraphId {
        let id = graph.id();
        while self.order.len() >= self.capacity {
            let Some(evicted) = self.order.pop_front() else {
                break;
            };
            self.graphs.remove(&evicted);
            debug!(graph_id = %evicted, "graph session evicted");
        }
        self.graphs.insert(id, graph);
        self.order.push_back(id);
        self.current = Some(id);
        id
    }

    fn resolve(&self, id: Option<GraphId>) -> Result<Arc<ConceptGraph>> {
        match id {
            Some(id) => self
                .graphs
                .get(&id)
                .cloned()
                .ok_or_else(|| LearnPathError::GraphNotFound(id.to_string())),
            None => self
                .current
                .and_then(|id| self.graphs.get(&id).cloned())
                .ok_or(LearnPathError::GraphNotBuilt),
        }
    }
}

// ---------------------------------------------------------------------------
// LearningPathService
// ---------------------------------------------------------------------------

/// Shared state behind every operation. One instance per process.
pub struct LearningPathService {
    config: AppConfig,
    ingestor: Ingestor,
    builder: GraphBuilder,
    path_options: PathOptions,
    sessions: RwLock<GraphSessions>,
    learners: LearnerTracker,
}

impl LearningPathService {
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ingestor: Ingestor::new(config.ingest.clone())?,
            builder: GraphBuilder::new(config.graph.clone()),
            path_options: PathOptions::from(&config),
            sessions: RwLock::new(GraphSessions::new(config.service.max_graphs)),
            learners: LearnerTracker::new(),
            config,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Ingest `urls` and build a concept graph from them.
    ///
    /// The graph is stored and becomes current only when it has at least one
    /// concept; otherwise the outcome carries the warnings and no id.
    #[instrument(skip_all, fields(urls = urls.len()))]
    pub async fn build_graph(
        &self,
        urls: &[String],
        progress: &dyn ProgressReporter,
    ) -> Result<BuildOutcome> {
        let urls: Vec<String> = urls
            .iter()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .collect();
        if urls.is_empty() {
            return Err(LearnPathError::validation("No URLs provided."));
        }

        let start = Instant::now();

        progress.phase("Fetching documents");
        let output = self.ingestor.ingest(&urls).await;

        progress.phase("Building concept graph");
        let graph = self.builder.build(&output)?;

        let outcome = if graph.is_empty() {
            info!(
                warnings = graph.warnings().len(),
                "no concepts extracted, graph not stored"
            );
            BuildOutcome::from_graph(&graph, None)
        } else {
            let graph = Arc::new(graph);
            let id = self.sessions.write().await.insert(graph.clone());
            BuildOutcome::from_graph(&graph, Some(id))
        };

        progress.done(&outcome);
        info!(
            graph_id = ?outcome.graph_id,
            nodes = outcome.nodes.len(),
            edges = outcome.edges.len(),
            warnings = outcome.warnings.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "build complete"
        );

        Ok(outcome)
    }

    /// Store a prebuilt graph and make it current.
    pub async fn register(&self, graph: ConceptGraph) -> GraphId {
        self.sessions.write().await.insert(Arc::new(graph))
    }

    /// Find the preferred learning path on a stored graph.
    #[instrument(skip_all, fields(start = %request.start, goal = %request.goal))]
    pub async fn find_path(&self, request: &PathRequest) -> Result<LearningPath> {
        let graph = self.sessions.read().await.resolve(request.graph_id)?;

        let weights = request
            .weights
            .unwrap_or(self.config.pathfinding.default_weights);
        let learner = match &request.learner_id {
            Some(id) => Some(self.learners.snapshot(id).await),
            None => None,
        };

        let path = learnpath_graph::find_path(
            &graph,
            &request.start,
            &request.goal,
            &weights,
            learner.as_ref(),
            &self.path_options,
        )?;

        info!(
            graph_id = %graph.id(),
            hops = path.hops,
            cost = path.cost,
            "path found"
        );
        Ok(path)
    }

    /// Record mastery for a concept; returns the learner's full state.
    pub async fn update_learner(
        &self,
        learner: &LearnerId,
        concept: &str,
        mastery: f64,
    ) -> Result<BTreeMap<String, f64>> {
        self.learners.update(learner, concept, mastery).await
    }

    pub async fn knowledge_state(&self, learner: &LearnerId) -> BTreeMap<String, f64> {
        self.learners.get(learner).await
    }

    pub async fn add_interest(&self, learner: &LearnerId, concept: &str) -> Result<Vec<String>> {
        self.learners.add_interest(learner, concept).await
    }

    pub async fn graph_summary(&self, id: GraphId) -> Result<GraphSummary> {
        let graph = self.sessions.read().await.resolve(Some(id))?;
        Ok(GraphSummary {
            graph_id: graph.id(),
            nodes: graph.node_count(),
            edges: graph.edge_count(),
            sources: graph.sources().to_vec(),
            built_at: graph.built_at(),
        })
    }
}
