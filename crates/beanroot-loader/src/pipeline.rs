//! Running the plugin pipeline.

use std::time::Instant;
use thiserror::Error;
use tracing::debug;

use beanroot_core::{Directive, Options, ProcessingMode};
use beanroot_plugin::{default_stages, DeprecatedPlugins, Plugin, PluginInput, PluginRegistry};

use crate::LoadError;

/// A plugin that failed outright rather than reporting ledger errors.
///
/// This aborts the whole load.
#[derive(Debug, Error)]
#[error("plugin {plugin} failed")]
pub struct PipelineFailure {
    /// Name of the plugin.
    pub plugin: String,
    /// What it returned.
    #[source]
    pub source: anyhow::Error,
}

/// Run the default stages (unless `options` asks for raw processing) and
/// then every declared plugin, in declaration order.
///
/// A plugin name that resolves to nothing is reported and skipped. The
/// errors of all stages come back concatenated in stage order.
pub fn run_pipeline(
    directives: Vec<Directive>,
    options: &Options,
    registry: &PluginRegistry,
    deprecated: &DeprecatedPlugins,
) -> Result<(Vec<Directive>, Vec<LoadError>), PipelineFailure> {
    let mut directives = directives;
    let mut errors = Vec::new();

    if options.plugin_processing_mode == ProcessingMode::Default {
        for stage in default_stages() {
            directives = run_stage(stage.as_ref(), None, directives, options, &mut errors)?;
        }
    }

    for decl in &options.plugin {
        let name = deprecated.resolve(&decl.name);
        let Some(plugin) = registry.find(name) else {
            errors.push(LoadError::PluginLoad {
                name: decl.name.clone(),
            });
            continue;
        };
        directives = run_stage(
            plugin.as_ref(),
            decl.config.as_deref(),
            directives,
            options,
            &mut errors,
        )?;
    }

    Ok((directives, errors))
}

fn run_stage(
    plugin: &dyn Plugin,
    config: Option<&str>,
    directives: Vec<Directive>,
    options: &Options,
    errors: &mut Vec<LoadError>,
) -> Result<Vec<Directive>, PipelineFailure> {
    let start = Instant::now();
    let output = plugin
        .process(PluginInput {
            directives,
            options,
            config,
        })
        .map_err(|source| PipelineFailure {
            plugin: plugin.name().to_string(),
            source,
        })?;
    debug!(
        plugin = plugin.name(),
        directives = output.directives.len(),
        errors = output.errors.len(),
        elapsed = ?start.elapsed(),
        "stage finished"
    );
    errors.extend(output.errors.into_iter().map(LoadError::from));
    Ok(output.directives)
}
