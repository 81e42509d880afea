//! Generation orchestrator: runs the traversal passes for a seed, writes the
//! DOT / JSON artifacts and persists the lookup cache.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::cache::LookupCache;
use crate::config::Config;
use crate::corpus::{is_placeholder_link, validate_name, CorpusSource};
use crate::error::Result;
use crate::graph::{
    render_image, to_document, to_dot, BreadthSampler, TraversalContext, TraversalSettings,
    TraversalStats,
};

/// One graph-generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphRequest {
    /// Normalized community name.
    pub seed: String,
    /// Max depth `D`.
    pub depth: u32,
    pub allow_nsfw: bool,
    pub render_image: bool,
    pub verbose: bool,
}

impl GraphRequest {
    pub fn new(seed: impl Into<String>, depth: u32) -> Self {
        Self {
            seed: seed.into(),
            depth,
            allow_nsfw: false,
            render_image: false,
            verbose: false,
        }
    }

    pub fn with_nsfw(mut self, allow: bool) -> Self {
        self.allow_nsfw = allow;
        self
    }

    pub fn with_render(mut self, render: bool) -> Self {
        self.render_image = render;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Keep the depth within `1..=limit`.
    pub fn clamped(mut self, limit: u32) -> Self {
        self.depth = self.depth.clamp(1, limit.max(1));
        self
    }
}

/// Output files for a (seed, depth, nsfw) triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub json: PathBuf,
    pub dot: PathBuf,
}

impl ArtifactPaths {
    /// `<dir>/<seed>_d<depth>[_nsfw].json` and the matching `.gv`.
    pub fn new(output_dir: &Path, seed: &str, depth: u32, allow_nsfw: bool) -> Self {
        let suffix = if allow_nsfw { "_nsfw" } else { "" };
        let stem = format!("{}_d{}{}", seed, depth, suffix);
        Self {
            json: output_dir.join(format!("{}.json", stem)),
            dot: output_dir.join(format!("{}.gv", stem)),
        }
    }
}

/// What a successful generation produced.
#[derive(Debug, Clone)]
pub struct GraphArtifacts {
    pub paths: ArtifactPaths,
    pub image: Option<PathBuf>,
    pub node_count: usize,
    pub stats: TraversalStats,
}

/// Expected, user-facing reasons a generation produces no graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationFailure {
    #[error("'{0}' is not in the database")]
    NotFound(String),
    #[error("Graph for '{0}' is empty, try a different seed.")]
    EmptyGraph(String),
}

/// Status plus payload of a generation call.
#[derive(Debug, Clone)]
pub enum GenerationOutcome {
    Success(GraphArtifacts),
    Failure(GenerationFailure),
}

impl GenerationOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            GenerationOutcome::Success(_) => "Success",
            GenerationOutcome::Failure(_) => "Failure",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, GenerationOutcome::Success(_))
    }
}

/// Knobs the orchestrator needs from configuration.
#[derive(Debug, Clone)]
pub struct RecommenderSettings {
    pub output_dir: PathBuf,
    pub depth_limit: u32,
    pub prune_ratio: f64,
    pub default_node_size: u32,
    pub max_children: Option<usize>,
    pub sample_seed: u64,
    pub dot_binary: String,
    pub render_format: String,
}

impl Default for RecommenderSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("static"),
            depth_limit: 3,
            prune_ratio: 0.2,
            default_node_size: 10,
            max_children: None,
            sample_seed: 0,
            dot_binary: "dot".to_string(),
            render_format: "png".to_string(),
        }
    }
}

impl RecommenderSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            output_dir: config.output_dir().to_path_buf(),
            depth_limit: config.graph.depth_limit,
            prune_ratio: config.graph.prune_ratio,
            default_node_size: config.graph.default_node_size,
            max_children: config.graph.max_children,
            sample_seed: config.graph.sample_seed,
            dot_binary: config.render.dot_binary.clone(),
            render_format: config.render.format.clone(),
        }
    }
}

/// Builds related-community graphs from a corpus through a persistent lookup cache.
pub struct Recommender<C: CorpusSource> {
    corpus: C,
    cache: LookupCache,
    settings: RecommenderSettings,
}

impl<C: CorpusSource> Recommender<C> {
    pub fn new(corpus: C, cache: LookupCache, settings: RecommenderSettings) -> Self {
        Self {
            corpus,
            cache,
            settings,
        }
    }

    pub fn settings(&self) -> &RecommenderSettings {
        &self.settings
    }

    pub fn cache(&self) -> &LookupCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut LookupCache {
        &mut self.cache
    }

    pub fn corpus(&self) -> &C {
        &self.corpus
    }

    pub fn artifact_paths(&self, request: &GraphRequest) -> ArtifactPaths {
        ArtifactPaths::new(
            &self.settings.output_dir,
            &request.seed,
            request.depth,
            request.allow_nsfw,
        )
    }

    /// JSON artifact from an earlier call with the same parameters, if any.
    pub fn existing_artifact(&self, request: &GraphRequest) -> Option<PathBuf> {
        let json = self.artifact_paths(request).json;
        json.is_file().then_some(json)
    }

    /// Generate the graph for `request.seed`.
    ///
    /// `Ok(Failure)` covers the expected outcomes (unknown seed, empty graph);
    /// `Err` is reserved for storage, I/O and rendering failures.
    pub fn generate_graph(&mut self, request: &GraphRequest) -> Result<GenerationOutcome> {
        validate_name(&request.seed)?;
        let request = request.clone().clamped(self.settings.depth_limit);
        let depth = request.depth;

        let sampler = BreadthSampler::new(self.settings.max_children, self.settings.sample_seed);
        let traversal = TraversalSettings {
            max_depth: depth,
            allow_nsfw: request.allow_nsfw,
            prune_ratio: self.settings.prune_ratio,
            verbose: request.verbose,
        };
        let mut ctx = TraversalContext::new(
            &self.corpus,
            &mut self.cache,
            &sampler,
            traversal,
            self.settings.default_node_size,
        );

        let Some(seed) = ctx.resolve(&request.seed)? else {
            log::info!("Seed '{}' not found in corpus", request.seed);
            return Ok(GenerationOutcome::Failure(GenerationFailure::NotFound(request.seed)));
        };

        if !seed.up_links.is_empty() {
            log::debug!("Traversing up from {}", seed.name);
            ctx.add_edges(&seed.name, depth, true, false)?;
        }

        log::debug!("Traversing up, then down ({} referrers)", seed.up_links.len());
        for referrer in seed.up_links.iter().filter(|r| !is_placeholder_link(r)) {
            ctx.add_edges(referrer, depth - 1, true, true)?;
        }

        if !seed.down_links.is_empty() {
            log::debug!("Traversing straight down from {}", seed.name);
            ctx.add_edges(&seed.name, depth, false, false)?;
        }

        let stats = ctx.stats();
        let graph = ctx.into_graph();

        if graph.is_empty() {
            log::info!(
                "Graph for '{}' is empty ({} censored)",
                request.seed,
                stats.censored
            );
            return Ok(GenerationOutcome::Failure(GenerationFailure::EmptyGraph(request.seed)));
        }

        let paths = self.artifact_paths(&request);
        fs::create_dir_all(&self.settings.output_dir)?;

        fs::write(&paths.dot, to_dot(&graph))?;
        let image = if request.render_image {
            Some(render_image(
                &paths.dot,
                &self.settings.dot_binary,
                &self.settings.render_format,
            )?)
        } else {
            None
        };

        fs::write(&paths.json, serde_json::to_vec(&to_document(&graph))?)?;

        if self.cache.path().is_some() {
            self.cache.save()?;
        }

        log::info!(
            "Graph for '{}' (depth {}): {} nodes, {} edges, {} censored; cache {} hits / {} misses",
            request.seed,
            depth,
            graph.node_count(),
            stats.edges_added,
            stats.censored,
            self.cache.hits(),
            self.cache.misses()
        );

        Ok(GenerationOutcome::Success(GraphArtifacts {
            paths,
            image,
            node_count: graph.node_count(),
            stats,
        }))
    }
}
