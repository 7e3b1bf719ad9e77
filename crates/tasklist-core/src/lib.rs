pub mod cli;
pub mod codec;
pub mod commands;
pub mod config;
pub mod dashboard;
pub mod datastore;
pub mod datetime;
pub mod edit;
pub mod ops;
pub mod reminder;
pub mod render;
pub mod schema;
pub mod session;
pub mod task;
pub mod view;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let cli = cli::GlobalCli::parse_from(
    raw_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    command = cli.command.name(),
    "starting todo CLI"
  );
  debug!(?cli.rc_overrides, "rc overrides");

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    cli
      .rc_overrides
      .into_iter()
      .map(|kv| (kv.key, kv.value))
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let store =
    datastore::DataStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open datastore at \
         {}",
        data_dir.display()
      )
    })?;

  let session =
    session::Session::load(
      &store, &cfg
    )?;
  let renderer = render::Renderer::new(
    &cfg,
    session.theme.resolve(),
    session.fields.clone()
  )?;

  commands::dispatch(
    &store,
    &cfg,
    &session,
    &renderer,
    cli.command
  )?;

  info!("done");
  Ok(())
}
