use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, anyhow};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use crate::cli::{Command, FormArgs, ListArgs, TemplateCommand};
use crate::codec::{self, Format};
use crate::config::Config;
use crate::dashboard::{summarize, tag_counts};
use crate::datastore::DataStore;
use crate::datetime::{local_now, local_today};
use crate::edit::{EditSession, Submitted};
use crate::ops::{delete_todo, toggle_check, toggle_subtask_check};
use crate::reminder;
use crate::render::Renderer;
use crate::session::{self, Session, Theme};
use crate::task::{Template, Todo};
use crate::view::{IdIndex, Selector, build_view};

const NOTHING_CHANGED: &str = "Nothing changed.";

#[instrument(skip(store, cfg, session, renderer, command), fields(command = command.name()))]
pub fn dispatch(
    store: &DataStore,
    cfg: &Config,
    session: &Session,
    renderer: &Renderer,
    command: Command,
) -> anyhow::Result<()> {
    if command.requires_login() {
        session.require_login()?;
    }
    debug!(command = command.name(), "dispatching command");

    match command {
        Command::Login { user, password } => cmd_login(store, &user, &password),
        Command::Logout => cmd_logout(store),
        Command::List(args) => cmd_list(store, session, renderer, args),
        Command::Show { selector } => cmd_show(store, renderer, &selector),
        Command::Add {
            title,
            template,
            form,
        } => cmd_add(store, session, title, template.as_deref(), form),
        Command::Edit {
            selector,
            title,
            form,
        } => cmd_edit(store, session, &selector, title, form),
        Command::Toggle { selector } => cmd_toggle(store, &selector),
        Command::ToggleSubtask { selector, subtask } => {
            cmd_toggle_subtask(store, &selector, subtask)
        }
        Command::Delete { selector, yes } => cmd_delete(store, &selector, yes),
        Command::Export { format, output } => cmd_export(store, format, output),
        Command::Import { file } => cmd_import(store, &file),
        Command::Dashboard => cmd_dashboard(store, renderer),
        Command::Categories => cmd_categories(store, renderer),
        Command::Tags => cmd_tags(store, renderer),
        Command::Template { action } => cmd_template(store, renderer, action),
        Command::Theme { theme } => cmd_theme(store, session, theme),
        Command::Watch { once, interval } => cmd_watch(store, cfg, once, interval),
        Command::Reset { yes } => cmd_reset(store, yes),
    }
}

fn resolve(todos: &[Todo], selector: &Selector) -> anyhow::Result<Option<usize>> {
    let position = IdIndex::build(todos).resolve(todos.len(), selector)?;
    if position.is_none() {
        debug!(%selector, len = todos.len(), "selector is out of range");
    }
    Ok(position)
}

fn report_feedback(feedback: &[String]) {
    for msg in feedback {
        eprintln!("warning: {msg}");
    }
}

#[instrument(skip(store, password))]
fn cmd_login(store: &DataStore, user: &str, password: &str) -> anyhow::Result<()> {
    info!("command login");
    if session::login(store, user, password)? {
        println!("Logged in.");
        Ok(())
    } else {
        Err(anyhow!("invalid username or password"))
    }
}

#[instrument(skip(store))]
fn cmd_logout(store: &DataStore) -> anyhow::Result<()> {
    info!("command logout");
    session::logout(store)?;
    println!("Logged out.");
    Ok(())
}

#[instrument(skip(store, session, renderer, args))]
fn cmd_list(
    store: &DataStore,
    session: &Session,
    renderer: &Renderer,
    args: ListArgs,
) -> anyhow::Result<()> {
    info!("command list");
    let todos = store.load_todos()?;
    let view = args.into_view(session.default_sort);
    let rows = build_view(&todos, &view);
    debug!(total = todos.len(), shown = rows.len(), sort = %view.sort, "built view");
    renderer.print_todo_table(&rows, local_today())
}

#[instrument(skip(store, renderer))]
fn cmd_show(store: &DataStore, renderer: &Renderer, selector: &Selector) -> anyhow::Result<()> {
    info!("command show");
    let todos = store.load_todos()?;
    match resolve(&todos, selector)? {
        Some(pos) => renderer.print_todo_info(pos, &todos[pos], local_today()),
        None => {
            println!("No item at {selector}.");
            Ok(())
        }
    }
}

#[instrument(skip(store, session, title, form))]
fn cmd_add(
    store: &DataStore,
    session: &Session,
    title: Option<String>,
    template: Option<&str>,
    form: FormArgs,
) -> anyhow::Result<()> {
    info!("command add");

    let mut edit = match template {
        Some(key) => {
            let templates = store.load_templates()?;
            let idx = find_template(&templates, key)?;
            EditSession::from_template(session.fields.clone(), &templates[idx])
        }
        None => EditSession::create(session.fields.clone()),
    };
    edit.apply(&form.into_form(title), local_now())?;
    report_feedback(edit.feedback());

    let mut todos = store.load_todos()?;
    match edit.submit(&mut todos)? {
        Submitted::Created { index } | Submitted::Updated { index } => {
            store.save_todos(&todos)?;
            println!("Created item {index}.");
        }
        Submitted::Missing { .. } => println!("{NOTHING_CHANGED}"),
    }
    Ok(())
}

#[instrument(skip(store, session, title, form))]
fn cmd_edit(
    store: &DataStore,
    session: &Session,
    selector: &Selector,
    title: Option<String>,
    form: FormArgs,
) -> anyhow::Result<()> {
    info!("command edit");

    let mut todos = store.load_todos()?;
    let Some(pos) = resolve(&todos, selector)? else {
        println!("{NOTHING_CHANGED}");
        return Ok(());
    };

    let mut edit = EditSession::update(session.fields.clone(), pos, &todos[pos]);
    edit.apply(&form.into_form(title), local_now())?;
    report_feedback(edit.feedback());

    match edit.submit(&mut todos)? {
        Submitted::Created { index } | Submitted::Updated { index } => {
            store.save_todos(&todos)?;
            println!("Modified item {index}.");
        }
        Submitted::Missing { .. } => println!("{NOTHING_CHANGED}"),
    }
    Ok(())
}

#[instrument(skip(store))]
fn cmd_toggle(store: &DataStore, selector: &Selector) -> anyhow::Result<()> {
    info!("command toggle");

    let mut todos = store.load_todos()?;
    let Some(pos) = resolve(&todos, selector)? else {
        println!("{NOTHING_CHANGED}");
        return Ok(());
    };
    if !toggle_check(&mut todos, pos) {
        println!("{NOTHING_CHANGED}");
        return Ok(());
    }
    store.save_todos(&todos)?;

    let state = if todos[pos].checked { "done" } else { "open" };
    println!("Item {pos} is now {state}.");
    Ok(())
}

#[instrument(skip(store))]
fn cmd_toggle_subtask(store: &DataStore, selector: &Selector, subtask: usize) -> anyhow::Result<()> {
    info!("command toggle-subtask");

    let mut todos = store.load_todos()?;
    let Some(pos) = resolve(&todos, selector)? else {
        println!("{NOTHING_CHANGED}");
        return Ok(());
    };
    if !toggle_subtask_check(&mut todos, pos, subtask) {
        println!("{NOTHING_CHANGED}");
        return Ok(());
    }
    store.save_todos(&todos)?;

    let (done, total) = todos[pos].subtask_progress();
    println!("Toggled subtask {subtask} of item {pos} ({done}/{total} done).");
    Ok(())
}

#[instrument(skip(store))]
fn cmd_delete(store: &DataStore, selector: &Selector, yes: bool) -> anyhow::Result<()> {
    info!("command delete");

    let mut todos = store.load_todos()?;
    let Some(pos) = resolve(&todos, selector)? else {
        println!("{NOTHING_CHANGED}");
        return Ok(());
    };

    if !yes {
        let prompt = format!("Delete item {pos} '{}'? [y/N] ", todos[pos].title);
        if !confirm(io::stdin().lock(), io::stdout().lock(), &prompt)? {
            println!("{NOTHING_CHANGED}");
            return Ok(());
        }
    }

    match delete_todo(&mut todos, pos) {
        Some(removed) => {
            store.save_todos(&todos)?;
            println!("Deleted item {pos} '{}'.", removed.title);
        }
        None => println!("{NOTHING_CHANGED}"),
    }
    Ok(())
}

/// Reads one answer line; only `y` or `yes` confirms.
pub fn confirm<R: BufRead, W: Write>(mut input: R, mut output: W, prompt: &str) -> anyhow::Result<bool> {
    write!(output, "{prompt}")?;
    output.flush()?;

    let mut answer = String::new();
    input
        .read_line(&mut answer)
        .context("failed to read confirmation")?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

#[instrument(skip(store))]
fn cmd_export(store: &DataStore, format: Format, output: Option<PathBuf>) -> anyhow::Result<()> {
    info!("command export");

    let todos = store.load_todos()?;
    let text = codec::encode(&todos, format)?;

    let path = output.unwrap_or_else(|| PathBuf::from(format.default_file_name()));
    if path.as_os_str() == "-" {
        let mut out = io::stdout().lock();
        out.write_all(text.as_bytes())?;
        out.flush()?;
        return Ok(());
    }

    write_export(&path, &text)?;
    info!(count = todos.len(), path = %path.display(), %format, "exported items");
    println!("Exported {} item(s) to {}.", todos.len(), path.display());
    Ok(())
}

fn write_export(path: &Path, text: &str) -> anyhow::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    tmp.write_all(text.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path)
        .map_err(|e| anyhow!("failed to write {}: {}", path.display(), e))?;
    Ok(())
}

#[instrument(skip(store))]
fn cmd_import(store: &DataStore, file: &Path) -> anyhow::Result<()> {
    info!("command import");

    let decoded = codec::read_import_file(file)?;
    if decoded.dropped > 0 || decoded.skipped > 0 {
        warn!(
            dropped = decoded.dropped,
            skipped = decoded.skipped,
            "some import rows were not usable"
        );
    }

    let mut todos = store.load_todos()?;
    let report = codec::merge_imported(&mut todos, decoded.candidates);
    debug!(
        added = report.added,
        duplicates = report.duplicates,
        "merged imported items"
    );

    if report.added == 0 {
        println!("Nothing was imported.");
        return Ok(());
    }
    store.save_todos(&todos)?;
    println!("Imported {} item(s).", report.added);
    Ok(())
}

#[instrument(skip(store, renderer))]
fn cmd_dashboard(store: &DataStore, renderer: &Renderer) -> anyhow::Result<()> {
    info!("command dashboard");
    let todos = store.load_todos()?;
    renderer.print_dashboard(&summarize(&todos))
}

#[instrument(skip(store, renderer))]
fn cmd_categories(store: &DataStore, renderer: &Renderer) -> anyhow::Result<()> {
    info!("command categories");
    let todos = store.load_todos()?;
    renderer.print_counts("Category", &summarize(&todos).by_category)
}

#[instrument(skip(store, renderer))]
fn cmd_tags(store: &DataStore, renderer: &Renderer) -> anyhow::Result<()> {
    info!("command tags");
    let todos = store.load_todos()?;
    renderer.print_counts("Tag", &tag_counts(&todos))
}

#[instrument(skip(store, renderer, action))]
fn cmd_template(
    store: &DataStore,
    renderer: &Renderer,
    action: TemplateCommand,
) -> anyhow::Result<()> {
    info!("command template");

    let mut templates = store.load_templates()?;
    match action {
        TemplateCommand::Add { title, detail } => {
            let title = title.trim();
            if title.is_empty() {
                return Err(anyhow!("template title is required"));
            }
            let template = Template::new(title.to_string(), detail.trim().to_string());
            let short = short_template_id(&template);
            templates.push(template);
            store.save_templates(&templates)?;
            println!("Created template {short}.");
        }
        TemplateCommand::List => renderer.print_templates(&templates)?,
        TemplateCommand::Delete { id } => {
            let idx = find_template(&templates, &id)?;
            let removed = templates.remove(idx);
            store.save_templates(&templates)?;
            println!(
                "Deleted template {} '{}'.",
                short_template_id(&removed),
                removed.title
            );
        }
    }
    Ok(())
}

fn short_template_id(template: &Template) -> String {
    template.id.simple().to_string()[..8].to_string()
}

/// Finds a template by id prefix. Unknown and ambiguous prefixes fail.
pub fn find_template(templates: &[Template], key: &str) -> anyhow::Result<usize> {
    let prefix = key.trim().replace('-', "").to_ascii_lowercase();
    if prefix.is_empty() {
        return Err(anyhow!("template id is required"));
    }

    let mut hits = templates
        .iter()
        .enumerate()
        .filter(|(_, t)| t.id.simple().to_string().starts_with(&prefix))
        .map(|(idx, _)| idx);
    let first = hits
        .next()
        .ok_or_else(|| anyhow!("no template with id {key}"))?;
    if hits.next().is_some() {
        return Err(anyhow!("template id {key} is ambiguous"));
    }
    Ok(first)
}

#[instrument(skip(store, session))]
fn cmd_theme(store: &DataStore, session: &Session, theme: Option<Theme>) -> anyhow::Result<()> {
    info!("command theme");
    match theme {
        None => {
            let appearance = session.theme.resolve();
            println!("{} ({appearance:?})", session.theme);
        }
        Some(theme) => {
            session::save_theme(store, theme)?;
            println!("Theme set to {theme}.");
        }
    }
    Ok(())
}

#[instrument(skip(store, cfg))]
fn cmd_watch(
    store: &DataStore,
    cfg: &Config,
    once: bool,
    interval: Option<u64>,
) -> anyhow::Result<()> {
    info!("command watch");

    let interval = match interval {
        Some(0) => return Err(anyhow!("--interval must be at least 1 second")),
        Some(secs) => Duration::from_secs(secs),
        None => cfg.reminder_interval()?,
    };

    loop {
        for todo in reminder::scan(store, local_now())? {
            let at = todo.reminder_time.as_deref().unwrap_or_default();
            println!("Reminder: {} ({at})", todo.title);
        }
        if once {
            return Ok(());
        }
        std::thread::sleep(interval);
    }
}

#[instrument(skip(store))]
fn cmd_reset(store: &DataStore, yes: bool) -> anyhow::Result<()> {
    info!("command reset");
    if !yes {
        return Err(anyhow!("reset deletes every stored item; pass --yes to confirm"));
    }
    let removed = store.clear()?;
    println!("Removed {removed} stored key(s).");
    Ok(())
}
