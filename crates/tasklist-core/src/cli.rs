use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::codec::Format;
use crate::edit::{FieldEdit, FormInput};
use crate::session::Theme;
use crate::view::{CategoryFilter, Selector, SortKey, ViewSpec};

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "todo",
    version,
    about = "A local task list with import/export, reminders and a dashboard",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Override a config key, e.g. `--rc list.sort=due`.
    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    /// Config file to read instead of ~/.tasklistrc.
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory to use instead of `data.location`.
    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Log in with the demo credentials.
    Login { user: String, password: String },

    /// Forget the login.
    Logout,

    /// List items, optionally filtered and sorted.
    List(ListArgs),

    /// Show every field of one item.
    Show {
        /// Position as shown by `list`, or an id prefix. All digits
        /// means a position; write `id:1234` for a numeric id prefix.
        selector: Selector,
    },

    /// Create an item.
    Add {
        /// Title; may be omitted when `--template` supplies one.
        title: Option<String>,

        /// Seed the form from a saved template (id or id prefix).
        #[arg(long)]
        template: Option<String>,

        #[command(flatten)]
        form: FormArgs,
    },

    /// Change an existing item.
    Edit {
        /// Position as shown by `list`, or an id prefix. All digits
        /// means a position; write `id:1234` for a numeric id prefix.
        selector: Selector,

        #[arg(long)]
        title: Option<String>,

        #[command(flatten)]
        form: FormArgs,
    },

    /// Flip an item between done and not done.
    Toggle {
        /// Position as shown by `list`, or an id prefix. All digits
        /// means a position; write `id:1234` for a numeric id prefix.
        selector: Selector,
    },

    /// Flip one subtask of an item.
    ToggleSubtask {
        /// Position as shown by `list`, or an id prefix. All digits
        /// means a position; write `id:1234` for a numeric id prefix.
        selector: Selector,
        /// Subtask index as shown by `show`.
        subtask: usize,
    },

    /// Remove an item.
    Delete {
        /// Position as shown by `list`, or an id prefix. All digits
        /// means a position; write `id:1234` for a numeric id prefix.
        selector: Selector,

        /// Skip the confirmation prompt.
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Write all items to a file.
    Export {
        #[arg(long, default_value = "json")]
        format: Format,

        /// Output path; `-` writes to stdout. Defaults to todos.<format>.
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Merge items from a .json or .csv file.
    Import { file: PathBuf },

    /// Completion rate and counts by category and priority.
    Dashboard,

    /// Distinct categories with item counts.
    Categories,

    /// Distinct tags with item counts.
    Tags,

    /// Manage reusable templates.
    Template {
        #[command(subcommand)]
        action: TemplateCommand,
    },

    /// Show or set the color theme.
    Theme { theme: Option<Theme> },

    /// Fire due reminders, repeating every `reminder.interval` seconds.
    Watch {
        /// Run a single scan and exit.
        #[arg(long)]
        once: bool,

        /// Seconds between scans, overriding `reminder.interval`.
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Delete all stored data, including the login.
    Reset {
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::Logout => "logout",
            Self::List(_) => "list",
            Self::Show { .. } => "show",
            Self::Add { .. } => "add",
            Self::Edit { .. } => "edit",
            Self::Toggle { .. } => "toggle",
            Self::ToggleSubtask { .. } => "toggle-subtask",
            Self::Delete { .. } => "delete",
            Self::Export { .. } => "export",
            Self::Import { .. } => "import",
            Self::Dashboard => "dashboard",
            Self::Categories => "categories",
            Self::Tags => "tags",
            Self::Template { .. } => "template",
            Self::Theme { .. } => "theme",
            Self::Watch { .. } => "watch",
            Self::Reset { .. } => "reset",
        }
    }

    /// Everything except `login` sits behind the login gate.
    pub fn requires_login(&self) -> bool {
        !matches!(self, Self::Login { .. })
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum TemplateCommand {
    /// Save a template.
    Add {
        title: String,
        #[arg(long, default_value = "")]
        detail: String,
    },
    /// List saved templates.
    List,
    /// Delete a template by id or id prefix.
    Delete { id: String },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    #[arg(long, conflicts_with = "uncategorized")]
    pub category: Option<String>,

    /// Only items without a category.
    #[arg(long)]
    pub uncategorized: bool,

    #[arg(long)]
    pub tag: Option<String>,

    /// Case-insensitive text match on title and detail.
    #[arg(long)]
    pub search: Option<String>,

    /// none | due | priority; defaults to `list.sort`.
    #[arg(long)]
    pub sort: Option<SortKey>,
}

impl ListArgs {
    pub fn into_view(self, default_sort: SortKey) -> ViewSpec {
        let category = if self.uncategorized {
            Some(CategoryFilter::Uncategorized)
        } else {
            self.category.map(CategoryFilter::Named)
        };
        ViewSpec {
            category,
            tag: self.tag,
            search: self.search,
            sort: self.sort.unwrap_or(default_sort),
        }
    }
}

/// Flags shared by `add` and `edit`.
#[derive(Args, Debug, Clone, Default)]
pub struct FormArgs {
    #[arg(long, conflicts_with = "clear_detail")]
    pub detail: Option<String>,
    #[arg(long)]
    pub clear_detail: bool,

    #[arg(long, conflicts_with = "clear_category")]
    pub category: Option<String>,
    #[arg(long)]
    pub clear_category: bool,

    /// YYYY-MM-DD, today, tomorrow, yesterday, a weekday, or +Nd/+Nw.
    #[arg(long, conflicts_with = "clear_due")]
    pub due: Option<String>,
    #[arg(long)]
    pub clear_due: bool,

    /// YYYY-MM-DDTHH:MM, RFC3339, or +Nm/+Nh/+Nd.
    #[arg(long, conflicts_with = "clear_reminder")]
    pub remind: Option<String>,
    #[arg(long)]
    pub clear_reminder: bool,

    /// high | medium | low.
    #[arg(long)]
    pub priority: Option<String>,

    /// Comma-separated; may be repeated.
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    #[arg(long = "rm-tag")]
    pub remove_tags: Vec<String>,

    #[arg(long = "note")]
    pub notes: Vec<String>,
    /// Note index as shown by `show`.
    #[arg(long = "rm-note")]
    pub remove_notes: Vec<usize>,

    #[arg(long = "link")]
    pub links: Vec<String>,
    #[arg(long = "rm-link")]
    pub remove_links: Vec<usize>,

    #[arg(long = "subtask")]
    pub subtasks: Vec<String>,
    #[arg(long = "rm-subtask")]
    pub remove_subtasks: Vec<usize>,
}

fn field_edit(value: Option<String>, clear: bool) -> FieldEdit<String> {
    match (value, clear) {
        (_, true) => FieldEdit::Clear,
        (Some(value), false) => FieldEdit::Set(value),
        (None, false) => FieldEdit::Keep,
    }
}

impl FormArgs {
    pub fn into_form(self, title: Option<String>) -> FormInput {
        FormInput {
            title,
            detail: field_edit(self.detail, self.clear_detail),
            category: field_edit(self.category, self.clear_category),
            due: field_edit(self.due, self.clear_due),
            reminder: field_edit(self.remind, self.clear_reminder),
            priority: self.priority,
            add_tags: self.tags,
            remove_tags: self.remove_tags,
            add_notes: self.notes,
            remove_notes: self.remove_notes,
            add_links: self.links,
            remove_links: self.remove_links,
            add_subtasks: self.subtasks,
            remove_subtasks: self.remove_subtasks,
        }
    }
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}
