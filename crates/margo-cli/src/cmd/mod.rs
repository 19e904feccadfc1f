pub mod daily;
pub mod dims;
pub mod health;
pub mod profit;
pub mod range;
pub mod status;

use anyhow::Result;

use margo_core::LakeLayout;
use margo_pipeline::PipelineEnv;
use margo_source::RpcConnectionFactory;

use crate::config::Config;

/// Build the shared pipeline environment from the config: lake layout plus
/// a connection factory for the configured ERP.
pub(crate) fn pipeline_env(config: &Config) -> Result<PipelineEnv> {
    let layout = LakeLayout::new(&config.lake.root);
    let factory = RpcConnectionFactory::new(config.source()?);
    Ok(PipelineEnv::new(layout, Box::new(factory)))
}
