//! `margo dims` - refresh star-schema dimensions

use anyhow::Result;
use clap::Args;

use margo_extract::Dimension;
use margo_extract::dimensions;
use margo_source::WorkerContext;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct DimsArgs {
    /// Refresh a single dimension (products, taxes, cashiers, vendors)
    pub dimension: Option<Dimension>,

    /// Ignore sync watermarks and refetch everything
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: DimsArgs, config: &Config) -> Result<()> {
    let env = super::pipeline_env(config)?;
    let mut ctx = WorkerContext::new(&*env.factory);
    let client = ctx.client()?;

    let dims: Vec<Dimension> = match args.dimension {
        Some(dim) => vec![dim],
        None => Dimension::ALL.to_vec(),
    };

    let counts = dimensions::refresh_all(client, &env.layout, &env.marks, &dims, args.force);
    for dim in &dims {
        match counts.get(dim.name()) {
            Some(n) => println!("{}: {n} rows fetched", dim.name()),
            None => println!("{}: refresh failed", dim.name()),
        }
    }

    if counts.len() != dims.len() {
        anyhow::bail!("{} dimension(s) failed to refresh", dims.len() - counts.len());
    }
    Ok(())
}
