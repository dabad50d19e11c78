//! End-to-end pipeline: domain text to loop AST text.
//!
//! One linear pipeline with optional stages:
//!
//! ```text
//! parse domain → fix parameters → from_domain → [insert band]
//!     → [split leftmost band] → [tile leftmost band] → build_ast → print
//! ```
//!
//! The first failing stage stops the pipeline; no partial text is produced.

use crate::codegen::{build_ast, print_ast, AstNode};
use crate::frontend::{parse_set, parse_union_map, parse_union_set};
use crate::polyhedral::{Set, Space};
use crate::schedule::ScheduleTree;
use crate::transform::{BandSplit, Tiling, Transform};
use crate::utils::errors::PolyResult;
use crate::utils::print_schedule;
use log::{debug, info};

/// Optional stages of a pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Parameters bound to a value in the domain
    pub param_values: Vec<(String, i64)>,
    /// Parameter-only set the generated code may assume
    pub param_context: Option<String>,
    /// Schedule map inserted as a band below the domain
    pub schedule: Option<String>,
    /// Split the leftmost band before this member
    pub split: Option<usize>,
    /// Tile sizes for the leftmost band
    pub tile_sizes: Option<Vec<i64>>,
}

/// Everything a pipeline run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Tree before any transform
    pub original: ScheduleTree,
    /// Tree after the split and tiling stages
    pub transformed: ScheduleTree,
    /// Names of the transforms that ran, in order
    pub applied_transforms: Vec<String>,
    pub ast: AstNode,
    pub ast_text: String,
    pub schedule_text: String,
}

/// Pipeline builder.
#[derive(Debug, Clone)]
pub struct Pipeline {
    domain: String,
    config: PipelineConfig,
}

impl Pipeline {
    /// Pipeline over a union domain such as `"[n] -> { S[i] : 0 <= i < n }"`.
    pub fn new(domain: impl Into<String>) -> Self {
        Self::with_config(domain, PipelineConfig::default())
    }

    pub fn with_config(domain: impl Into<String>, config: PipelineConfig) -> Self {
        Self {
            domain: domain.into(),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Restrict code generation to parameters satisfying `context`,
    /// e.g. `"[n] -> { : n >= 1 }"`.
    pub fn param_context(mut self, context: impl Into<String>) -> Self {
        self.config.param_context = Some(context.into());
        self
    }

    /// Bind a parameter to a value.
    pub fn fix_param(mut self, name: impl Into<String>, value: i64) -> Self {
        self.config.param_values.push((name.into(), value));
        self
    }

    /// Insert a band from a schedule map, e.g. `"{ S[i, j] -> [i, j] }"`.
    pub fn schedule(mut self, map: impl Into<String>) -> Self {
        self.config.schedule = Some(map.into());
        self
    }

    /// Split the leftmost band before member `pos`.
    pub fn split(mut self, pos: usize) -> Self {
        self.config.split = Some(pos);
        self
    }

    /// Tile the leftmost band.
    pub fn tile(mut self, sizes: &[i64]) -> Self {
        self.config.tile_sizes = Some(sizes.to_vec());
        self
    }

    /// Transform stages in execution order: split, then tiling.
    fn stages(&self) -> Vec<Box<dyn Transform>> {
        let mut stages: Vec<Box<dyn Transform>> = Vec::new();
        if let Some(pos) = self.config.split {
            stages.push(Box::new(BandSplit::new(pos)));
        }
        if let Some(ref sizes) = self.config.tile_sizes {
            stages.push(Box::new(Tiling::new(sizes.clone())));
        }
        stages
    }

    /// Parse the domain, bind parameters and insert the schedule band.
    pub fn build_tree(&self) -> PolyResult<ScheduleTree> {
        let mut domain = parse_union_set(&self.domain, &[])?;
        for (name, value) in &self.config.param_values {
            debug!("binding parameter {} = {}", name, value);
            domain = domain.fix_param_by_name(name, *value)?;
        }
        let tree = ScheduleTree::from_domain(domain);
        match self.config.schedule {
            Some(ref text) => {
                let map = parse_union_map(text, &tree.domain().params)?;
                tree.insert_band(&map)
            }
            None => Ok(tree),
        }
    }

    /// Parameter context the generated code assumes: the given context
    /// plus every bound parameter.
    fn context(&self) -> PolyResult<Set> {
        let mut context = match self.config.param_context {
            Some(ref text) => parse_set(text, &[])?,
            None => Set::universe(Space::params(Vec::new())),
        };
        for (name, value) in &self.config.param_values {
            let binding = Set::universe(Space::params(vec![name.clone()])).fix_param_by_name(name, *value)?;
            context = context.intersect(&binding)?;
        }
        Ok(context)
    }

    /// Run every stage.
    pub fn run(&self) -> PolyResult<PipelineOutput> {
        let original = self.build_tree()?;
        let mut transformed = original.clone();
        let mut applied_transforms = Vec::new();
        for stage in self.stages() {
            info!("applying {}", stage.name());
            transformed = stage.apply(&transformed)?;
            applied_transforms.push(stage.name().to_string());
        }

        let ast = build_ast(&transformed, &self.context()?)?;
        let ast_text = print_ast(&ast);
        let schedule_text = print_schedule(&transformed);
        debug!("generated {} lines of loop code", ast_text.lines().count());

        Ok(PipelineOutput {
            original,
            transformed,
            applied_transforms,
            ast,
            ast_text,
            schedule_text,
        })
    }

    /// Run every stage and return the loop code only.
    pub fn compile(&self) -> PolyResult<String> {
        self.run().map(|out| out.ast_text)
    }
}
