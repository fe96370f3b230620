use std::path::Path;

use anyhow::Context;

use crate::config::RunConfig;
use crate::engine::RunSummary;
use crate::judge_cmd::{JudgeOptions, execute};

/// Run the cases described by a TOML run file.
pub fn run(config_path: &Path) -> anyhow::Result<RunSummary> {
    let config = RunConfig::load(config_path)
        .with_context(|| format!("loading run file {}", config_path.display()))?;

    let mars = config.mars.to_config().context("in [mars]")?;
    let candidate = config.candidate.build().context("in [candidate]")?;
    let standard = match &config.standard {
        Some(section) => Some(section.build().context("in [standard]")?),
        None => None,
    };
    let differ = config.diff.to_differ().context("in [diff]")?;

    let opts = JudgeOptions {
        cases: config.cases.clone(),
        mars,
        differ,
        appendix: config.infinite_loop_appendix,
        handler: config.handler.to_source(),
        scheduler: config.scheduler.clone(),
        passes: config.passes.clone(),
        log: config.log.clone(),
        csv: config.csv.clone(),
    };
    let summary = execute(opts, candidate, standard)?;
    Ok(summary)
}
