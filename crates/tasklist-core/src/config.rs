use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::schema::FieldSet;
use crate::view::SortKey;

const RC_ENV_VAR: &str = "TASKLISTRC";
const RC_FILE_NAME: &str =
  ".tasklistrc";
const DEFAULT_DATA_DIR: &str =
  ".tasklist";
const DEFAULT_REMINDER_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    map.insert(
      "data.location".to_string(),
      format!("~/{DEFAULT_DATA_DIR}")
    );
    map.insert(
      "color".to_string(),
      "on".to_string()
    );
    map.insert(
      "list.sort".to_string(),
      "none".to_string()
    );
    map.insert(
      "reminder.interval".to_string(),
      DEFAULT_REMINDER_SECS.to_string()
    );
    map.insert(
      "fields".to_string(),
      "all".to_string()
    );

    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc = resolve_rc_path(
      rc_override
    )?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading rc file");
      cfg.read_rc(&path)?;
    } else {
      debug!(
        "no rc file found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  /// The `color` switch. Unknown
  /// spellings are an error rather
  /// than silently off.
  pub fn color_enabled(
    &self
  ) -> anyhow::Result<bool> {
    let raw = self
      .get("color")
      .unwrap_or_else(|| {
        "on".to_string()
      });
    parse_bool(&raw).ok_or_else(|| {
      anyhow!(
        "invalid `color` setting: {raw}"
      )
    })
  }

  pub fn field_set(
    &self
  ) -> anyhow::Result<FieldSet> {
    let raw = self
      .get("fields")
      .unwrap_or_default();
    FieldSet::parse(&raw).with_context(
      || {
        format!(
          "invalid `fields` setting: \
           {raw}"
        )
      }
    )
  }

  pub fn default_sort(
    &self
  ) -> anyhow::Result<SortKey> {
    let raw = self
      .get("list.sort")
      .unwrap_or_default();
    raw.parse::<SortKey>().with_context(
      || {
        format!(
          "invalid `list.sort` setting: \
           {raw}"
        )
      }
    )
  }

  pub fn reminder_interval(
    &self
  ) -> anyhow::Result<Duration> {
    let raw = self
      .get("reminder.interval")
      .unwrap_or_else(|| {
        DEFAULT_REMINDER_SECS
          .to_string()
      });
    let secs: u64 =
      raw.trim().parse().with_context(
        || {
          format!(
            "invalid \
             `reminder.interval` \
             setting: {raw}"
          )
        }
      )?;
    if secs == 0 {
      return Err(anyhow!(
        "`reminder.interval` must be \
         at least one second"
      ));
    }
    Ok(Duration::from_secs(secs))
  }

  /// Reads one rc file into the map.
  /// Includes are followed in place, so
  /// later lines override what an
  /// include set. A file already read is
  /// skipped, which breaks include loops.
  #[tracing::instrument(skip(self))]
  fn read_rc(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = fs::canonicalize(path)
      .with_context(|| {
        format!(
          "failed to read {}",
          path.display()
        )
      })?;
    if self.loaded_files.contains(&path)
    {
      warn!(rc = %path.display(), "rc file already read; skipping");
      return Ok(());
    }
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;
    self
      .loaded_files
      .push(path.clone());

    for (idx, raw) in
      text.lines().enumerate()
    {
      let entry = parse_rc_line(raw)
        .map_err(|why| {
          anyhow!(
            "{}:{}: {why}: {}",
            path.display(),
            idx + 1,
            raw.trim()
          )
        })?;
      match entry {
        | None => {}
        | Some(RcLine::Include(
          target
        )) => {
          let target =
            beside(&path, target);
          if target.exists() {
            debug!(include = %target.display(), "following include");
            self.read_rc(&target)?;
          } else {
            warn!(include = %target.display(), "included rc file missing; skipping");
          }
        }
        | Some(RcLine::Setting {
          key,
          value
        }) => {
          trace!(key, value, "rc setting");
          self.map.insert(
            key.to_string(),
            value.to_string()
          );
        }
      }
    }

    Ok(())
  }
}

/// A meaningful line of an rc file.
#[derive(Debug, PartialEq, Eq)]
enum RcLine<'a> {
  Include(&'a str),
  Setting {
    key: &'a str,
    value: &'a str
  }
}

/// `None` for blank and comment-only
/// lines. A `#` starts a comment
/// anywhere on the line.
fn parse_rc_line(
  raw: &str
) -> Result<Option<RcLine<'_>>, &'static str>
{
  let line = raw
    .split_once('#')
    .map_or(raw, |(before, _)| before)
    .trim();
  if line.is_empty() {
    return Ok(None);
  }
  if let Some(target) =
    line.strip_prefix("include ")
  {
    let target = target.trim();
    if target.is_empty() {
      return Err(
        "include needs a path"
      );
    }
    return Ok(Some(RcLine::Include(
      target
    )));
  }
  match line.split_once('=') {
    | Some((key, value))
      if !key.trim().is_empty() =>
    {
      Ok(Some(RcLine::Setting {
        key: key.trim(),
        value: value.trim()
      }))
    }
    | _ => Err(
      "expected `key = value` or \
       `include <path>`"
    )
  }
}

/// Include targets are relative to the
/// file that names them.
fn beside(
  rc: &Path,
  target: &str
) -> PathBuf {
  let target = home_path(target);
  if target.is_absolute() {
    return target;
  }
  match rc.parent() {
    | Some(dir) => dir.join(target),
    | None => target
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    home_path(&cfg_value)
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(home_path(&rc_env)));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping rc file"
    );
    return Ok(None);
  };
  let candidate =
    home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(DEFAULT_DATA_DIR))
}

/// Expands a leading `~/`.
fn home_path(text: &str) -> PathBuf {
  match (
    text.strip_prefix("~/"),
    dirs::home_dir()
  ) {
    | (Some(rest), Some(home)) => {
      home.join(rest)
    }
    | _ => PathBuf::from(text)
  }
}

fn parse_bool(
  s: &str
) -> Option<bool> {
  match s
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Some(true),
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}
