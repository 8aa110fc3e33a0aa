//! Five-list question IR -> SPARQL.
//!
//! The pipeline runs one stage per module:
//!
//! | stage | module |
//! |-------|--------|
//! | root words -> schema entities | [`mapping`] |
//! | minimal connected schema subgraph | [`subgraph`] |
//! | per-occurrence schema paths | [`annotate`] |
//! | paths -> SPARQL triples | [`clean`] |
//! | `L4` rows -> filters, grouping, ordering | [`filters`] |
//! | `L3` operators -> `NOT EXISTS`, `||`, `UNION` | [`logical`] |
//! | final text | [`assemble`] |
//!
//! ```no_run
//! use nl2sparql_compiler::Compiler;
//! use nl2sparql_ir::parse_ir_lists;
//! use nl2sparql_schema::SchemaIndex;
//!
//! let schema = SchemaIndex::load("city.ttl")?;
//! let ir = parse_ir_lists(r#"
//! L1 = [["point", ["building"]], ["building", ["point"]]]
//! L2 = [["point1", "point", ["building1"], []], ["building1", "building", ["point1"], []]]
//! L3 = []
//! L4 = []
//! L5 = ["SELECT", [["point1"], [], [], []]]
//! "#)?;
//! let query = Compiler::new(&schema).compile(&ir, "http://example.org/city#", "http://example.org/graph")?;
//! println!("{query}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod annotate;
pub mod assemble;
pub mod clean;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod filters;
pub mod fuzzy;
pub mod logical;
pub mod mapping;
pub mod resolve;
pub mod subgraph;
pub mod triples;

use nl2sparql_ir::{repair, validate, QueryIr};
use nl2sparql_schema::SchemaIndex;
use tracing::{debug, info_span};

pub use assemble::CompiledQuery;
pub use collaborators::{
    AcceptProposed, ManualResolver, MappingConfirmer, NoSynonyms, RejectUnmapped, SynonymSource,
    SynonymTable,
};
pub use config::{CompilerConfig, PointsConfig};
pub use error::{CollaboratorError, CompileError, DisconnectedSchemaError, UnmappableQueryError};
pub use mapping::{MappedEntity, MappingTable};

use assemble::{assemble, effective_projection, prune_unreferenced, QueryHead};
use resolve::ResolvedQuery;
use subgraph::SpanRequest;

/// Compiler bound to one schema and its collaborators.
pub struct Compiler<'a> {
    schema: &'a SchemaIndex,
    config: CompilerConfig,
    synonyms: &'a dyn SynonymSource,
    resolver: &'a dyn ManualResolver,
    confirmer: &'a dyn MappingConfirmer,
}

impl<'a> Compiler<'a> {
    /// No synonyms, unmapped words rejected, proposals accepted as-is.
    pub fn new(schema: &'a SchemaIndex) -> Self {
        Self {
            schema,
            config: CompilerConfig::default(),
            synonyms: &NoSynonyms,
            resolver: &RejectUnmapped,
            confirmer: &AcceptProposed,
        }
    }

    pub fn with_config(mut self, config: CompilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_synonyms(mut self, synonyms: &'a dyn SynonymSource) -> Self {
        self.synonyms = synonyms;
        self
    }

    pub fn with_resolver(mut self, resolver: &'a dyn ManualResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_confirmer(mut self, confirmer: &'a dyn MappingConfirmer) -> Self {
        self.confirmer = confirmer;
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn compile(
        &self,
        ir: &QueryIr,
        namespace: &str,
        graph_uri: &str,
    ) -> Result<CompiledQuery, CompileError> {
        let _span = info_span!("compile", graph = %graph_uri).entered();
        let config = &self.config;

        let ir = repair(ir.clone());
        validate(&ir)?;

        let mapping = mapping::map_root_words(
            &ir,
            self.schema,
            self.synonyms,
            self.resolver,
            self.confirmer,
            config,
        )?;
        debug!(entries = mapping.len(), "mapping confirmed");

        let mut resolved = ResolvedQuery::new(&ir, &mapping)?;
        if let Some(points) = &config.points {
            resolved = resolved.with_point_coordinates(self.schema, points);
        }

        let request = SpanRequest::for_query(&ir, &mapping, &resolved);
        let subgraph = subgraph::synthesize(self.schema, &request, config.max_candidate_paths)?;
        debug!(nodes = subgraph.nodes().count(), "query subgraph synthesized");

        let groups = annotate::annotate(&resolved, &subgraph, config.max_annotation_paths)?;
        let groups = clean::clean(groups, self.schema);
        debug!(groups = groups.len(), "paths cleaned");

        let filters = filters::compile_filters(&ir.filters, &resolved, &config.schema_prefix)?;
        let (groups, filters) = logical::apply_operators(&ir.operators, groups, filters, &resolved)?;

        let items = effective_projection(&ir.projection, &resolved);
        let groups = if config.prune_unreferenced_properties {
            prune_unreferenced(groups, &items, &filters, &resolved)
        } else {
            groups
        };

        let head = QueryHead {
            prefix: &config.schema_prefix,
            namespace,
            graph_uri,
        };
        let query = assemble(&head, &ir.projection, &items, &groups, &filters);
        debug!(lines = query.lines.len(), "query assembled");
        Ok(query)
    }
}

/// Compile with default configuration and collaborators.
pub fn compile(
    ir: &QueryIr,
    schema: &SchemaIndex,
    namespace: &str,
    graph_uri: &str,
) -> Result<CompiledQuery, CompileError> {
    Compiler::new(schema).compile(ir, namespace, graph_uri)
}
