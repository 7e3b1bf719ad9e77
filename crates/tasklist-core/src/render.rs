use std::io::{self, IsTerminal, Write};

use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::dashboard::Summary;
use crate::datetime::is_overdue;
use crate::schema::{Field, FieldSet};
use crate::session::Appearance;
use crate::task::{Template, Todo};
use crate::view::ViewRow;

const BAR_WIDTH: usize = 30;
const EMPTY_PLACEHOLDER: &str = "No items.";

#[derive(Debug, Clone, Copy)]
struct Palette {
    accent: &'static str,
    muted: &'static str,
    alert: &'static str,
    bar: &'static str,
}

impl Palette {
    fn for_appearance(appearance: Appearance) -> Self {
        match appearance {
            Appearance::Light => Self {
                accent: "34",
                muted: "90",
                alert: "31",
                bar: "36",
            },
            Appearance::Dark => Self {
                accent: "33",
                muted: "2",
                alert: "91",
                bar: "96",
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    palette: Palette,
    fields: FieldSet,
}

impl Renderer {
    pub fn new(cfg: &Config, appearance: Appearance, fields: FieldSet) -> anyhow::Result<Self> {
        let color = cfg.color_enabled()? && io::stdout().is_terminal();

        Ok(Self {
            color,
            palette: Palette::for_appearance(appearance),
            fields,
        })
    }

    #[tracing::instrument(skip(self, rows, today))]
    pub fn print_todo_table(&self, rows: &[ViewRow<'_>], today: NaiveDate) -> anyhow::Result<()> {
        self.write_todo_table(io::stdout().lock(), rows, today)
    }

    pub fn write_todo_table<W: Write>(
        &self,
        mut out: W,
        rows: &[ViewRow<'_>],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        if rows.is_empty() {
            writeln!(out, "{}", self.paint(EMPTY_PLACEHOLDER, self.palette.muted))?;
            return Ok(());
        }

        let columns = self.table_columns();
        let headers: Vec<String> = columns.iter().map(|c| c.header().to_string()).collect();

        let body: Vec<Vec<String>> = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|column| self.cell(*column, row, today))
                    .collect::<Vec<_>>()
            })
            .collect();

        write_table(&mut out, headers, body)
    }

    fn table_columns(&self) -> Vec<Column> {
        Column::ALL
            .into_iter()
            .filter(|column| column.field().is_none_or(|field| self.fields.has(field)))
            .collect()
    }

    fn cell(&self, column: Column, row: &ViewRow<'_>, today: NaiveDate) -> String {
        let todo = row.todo;
        let text = match column {
            Column::Position => return self.paint(&row.index.to_string(), self.palette.accent),
            Column::Id => todo.short_id(),
            Column::Done => checkbox(todo.checked).to_string(),
            Column::Priority => todo.effective_priority().to_string(),
            Column::Due => {
                let due = sanitize(todo.due_date.as_deref().unwrap_or_default());
                if !todo.checked && is_overdue(&due, today) {
                    return self.paint(&due, self.palette.alert);
                }
                due
            }
            Column::Category => sanitize(todo.category_name().unwrap_or_default()),
            Column::Title => sanitize(&todo.title),
            Column::Tags => todo
                .tags
                .iter()
                .map(|tag| format!("#{}", sanitize(tag)))
                .collect::<Vec<_>>()
                .join(" "),
            Column::Subtasks => match todo.subtask_progress() {
                (_, 0) => String::new(),
                (done, total) => format!("{done}/{total}"),
            },
        };

        if todo.checked {
            self.paint(&text, self.palette.muted)
        } else {
            text
        }
    }

    #[tracing::instrument(skip(self, todo))]
    pub fn print_todo_info(&self, index: usize, todo: &Todo, today: NaiveDate) -> anyhow::Result<()> {
        self.write_todo_info(io::stdout().lock(), index, todo, today)
    }

    pub fn write_todo_info<W: Write>(
        &self,
        mut out: W,
        index: usize,
        todo: &Todo,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let fields = &self.fields;
        writeln!(out, "position  {index}")?;
        writeln!(
            out,
            "id        {}",
            todo.id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string())
        )?;
        writeln!(out, "title     {}", sanitize(&todo.title))?;
        writeln!(out, "done      {}", if todo.checked { "yes" } else { "no" })?;

        if fields.has(Field::Detail) {
            writeln!(out, "detail    {}", sanitize(todo.detail_text()))?;
        }
        if fields.has(Field::Category) {
            writeln!(
                out,
                "category  {}",
                sanitize(todo.category_name().unwrap_or_default())
            )?;
        }
        if fields.has(Field::Priority) {
            writeln!(out, "priority  {}", todo.effective_priority())?;
        }
        if fields.has(Field::Due)
            && let Some(due) = &todo.due_date
        {
            let shown = if !todo.checked && is_overdue(due, today) {
                self.paint(&format!("{} (overdue)", sanitize(due)), self.palette.alert)
            } else {
                sanitize(due)
            };
            writeln!(out, "due       {shown}")?;
        }
        if fields.has(Field::Reminder)
            && let Some(at) = &todo.reminder_time
        {
            let state = if todo.notified { " (sent)" } else { "" };
            writeln!(out, "reminder  {}{state}", sanitize(at))?;
        }
        if fields.has(Field::Tags) && !todo.tags.is_empty() {
            writeln!(out, "tags      {}", sanitize(&todo.tags.join(", ")))?;
        }

        if fields.has(Field::Notes) {
            write_numbered(&mut out, "notes", todo.notes.iter().map(String::as_str))?;
        }
        if fields.has(Field::Links) {
            write_numbered(&mut out, "links", todo.links.iter().map(String::as_str))?;
        }
        if fields.has(Field::Subtasks) && !todo.subtasks.is_empty() {
            writeln!(out, "subtasks")?;
            for (idx, sub) in todo.subtasks.iter().enumerate() {
                writeln!(out, "  {idx}. {} {}", checkbox(sub.checked), sanitize(&sub.text))?;
            }
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, summary))]
    pub fn print_dashboard(&self, summary: &Summary) -> anyhow::Result<()> {
        self.write_dashboard(io::stdout().lock(), summary)
    }

    pub fn write_dashboard<W: Write>(&self, mut out: W, summary: &Summary) -> anyhow::Result<()> {
        writeln!(out, "Total      {}", summary.total)?;
        writeln!(out, "Completed  {}", summary.completed)?;
        writeln!(out, "Rate       {}%", summary.completion_rate)?;

        writeln!(out)?;
        writeln!(out, "By category")?;
        self.write_bars(&mut out, &summary.by_category)?;

        writeln!(out)?;
        writeln!(out, "By priority")?;
        let priorities: Vec<(String, usize)> = summary
            .by_priority
            .iter()
            .map(|(priority, count)| (priority.to_string(), *count))
            .collect();
        self.write_bars(&mut out, &priorities)?;
        Ok(())
    }

    /// Horizontal bars scaled so the largest count fills the bar width.
    fn write_bars<W: Write>(&self, out: &mut W, rows: &[(String, usize)]) -> anyhow::Result<()> {
        if rows.is_empty() {
            writeln!(out, "  {}", self.paint(EMPTY_PLACEHOLDER, self.palette.muted))?;
            return Ok(());
        }

        let rows: Vec<(String, usize)> = rows
            .iter()
            .map(|(label, count)| (sanitize(label), *count))
            .collect();
        let label_width = rows
            .iter()
            .map(|(label, _)| UnicodeWidthStr::width(label.as_str()))
            .max()
            .unwrap_or(0);
        let max = rows.iter().map(|(_, count)| *count).max().unwrap_or(0);

        for (label, count) in &rows {
            let len = if max == 0 {
                0
            } else {
                (count * BAR_WIDTH).div_ceil(max)
            };
            let padding = label_width.saturating_sub(UnicodeWidthStr::width(label.as_str()));
            writeln!(
                out,
                "  {label}{} {} {count}",
                " ".repeat(padding),
                self.paint(&"#".repeat(len), self.palette.bar)
            )?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, templates))]
    pub fn print_templates(&self, templates: &[Template]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if templates.is_empty() {
            writeln!(out, "{}", self.paint(EMPTY_PLACEHOLDER, self.palette.muted))?;
            return Ok(());
        }

        let headers = vec!["ID".to_string(), "Title".to_string(), "Detail".to_string()];
        let rows = templates
            .iter()
            .map(|t| {
                vec![
                    self.paint(&t.id.simple().to_string()[..8], self.palette.accent),
                    sanitize(&t.title),
                    sanitize(&t.detail),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)
    }

    /// Two-column name/count listing used by `categories` and `tags`.
    pub fn print_counts(&self, label: &str, counts: &[(String, usize)]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if counts.is_empty() {
            writeln!(out, "{}", self.paint(EMPTY_PLACEHOLDER, self.palette.muted))?;
            return Ok(());
        }
        let headers = vec![label.to_string(), "Count".to_string()];
        let rows = counts
            .iter()
            .map(|(name, count)| vec![sanitize(name), count.to_string()])
            .collect();
        write_table(&mut out, headers, rows)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Position,
    Id,
    Done,
    Priority,
    Due,
    Category,
    Title,
    Tags,
    Subtasks,
}

impl Column {
    const ALL: [Column; 9] = [
        Column::Position,
        Column::Id,
        Column::Done,
        Column::Priority,
        Column::Due,
        Column::Category,
        Column::Title,
        Column::Tags,
        Column::Subtasks,
    ];

    fn header(self) -> &'static str {
        match self {
            Self::Position => "#",
            Self::Id => "ID",
            Self::Done => "Done",
            Self::Priority => "Pri",
            Self::Due => "Due",
            Self::Category => "Category",
            Self::Title => "Title",
            Self::Tags => "Tags",
            Self::Subtasks => "Sub",
        }
    }

    /// The optional field a column belongs to, if any.
    fn field(self) -> Option<Field> {
        match self {
            Self::Priority => Some(Field::Priority),
            Self::Due => Some(Field::Due),
            Self::Category => Some(Field::Category),
            Self::Tags => Some(Field::Tags),
            Self::Subtasks => Some(Field::Subtasks),
            Self::Position | Self::Id | Self::Done | Self::Title => None,
        }
    }
}

fn checkbox(checked: bool) -> &'static str {
    if checked { "[x]" } else { "[ ]" }
}

fn write_numbered<'a, W: Write>(
    out: &mut W,
    label: &str,
    items: impl Iterator<Item = &'a str>,
) -> anyhow::Result<()> {
    let items: Vec<&str> = items.collect();
    if items.is_empty() {
        return Ok(());
    }
    writeln!(out, "{label}")?;
    for (idx, item) in items.iter().enumerate() {
        writeln!(out, "  {idx}. {}", sanitize(item))?;
    }
    Ok(())
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

/// Stored text is shown, never interpreted: line breaks and tabs become
/// spaces, other control characters (ESC included) become U+FFFD.
fn sanitize(text: &str) -> String {
    text.chars()
        .map(|ch| match ch {
            '\n' | '\r' | '\t' => ' ',
            ch if ch.is_control() => '\u{fffd}',
            ch => ch,
        })
        .collect()
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{Renderer, sanitize, strip_ansi, write_table};
    use crate::config::Config;
    use crate::dashboard::summarize;
    use crate::schema::FieldSet;
    use crate::session::Appearance;
    use crate::task::Todo;
    use crate::view::{ViewSpec, build_view};

    fn plain_renderer(fields: FieldSet) -> Renderer {
        let mut cfg = Config::default();
        cfg.apply_overrides([("color".to_string(), "off".to_string())]);
        Renderer::new(&cfg, Appearance::Light, fields).expect("renderer")
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 17).expect("valid date")
    }

    #[test]
    fn table_aligns_wide_characters() {
        let mut out = Vec::new();
        write_table(
            &mut out,
            vec!["A".into(), "B".into()],
            vec![vec!["買い物".into(), "x".into()], vec!["ab".into(), "y".into()]],
        )
        .expect("write");
        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "A      B ");
        assert_eq!(lines[2], "買い物 x ");
        assert_eq!(lines[3], "ab     y ");
    }

    #[test]
    fn empty_view_shows_placeholder() {
        let renderer = plain_renderer(FieldSet::all());
        let mut out = Vec::new();
        renderer
            .write_todo_table(&mut out, &[], today())
            .expect("write");
        assert_eq!(String::from_utf8(out).expect("utf8"), "No items.\n");
    }

    #[test]
    fn hidden_fields_drop_columns() {
        let renderer = plain_renderer(FieldSet::parse("due").expect("fields"));
        let todos = vec![Todo::new("a".into())];
        let rows = build_view(&todos, &ViewSpec::default());
        let mut out = Vec::new();
        renderer
            .write_todo_table(&mut out, &rows, today())
            .expect("write");
        let text = String::from_utf8(out).expect("utf8");
        let header = text.lines().next().expect("header");
        assert!(header.contains("Due"));
        assert!(!header.contains("Tags"));
        assert!(!header.contains("Category"));
    }

    #[test]
    fn dashboard_lists_rate_and_bars() {
        let renderer = plain_renderer(FieldSet::all());
        let mut todos = vec![Todo::new("a".into()), Todo::new("b".into())];
        todos[0].checked = true;
        todos[0].category = Some("work".into());
        let mut out = Vec::new();
        renderer
            .write_dashboard(&mut out, &summarize(&todos))
            .expect("write");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains("Rate       50%"));
        assert!(text.contains(&format!("work          {} 1", "#".repeat(30))));
        assert!(text.contains(&format!("medium {} 2", "#".repeat(30))));
        assert!(text.contains("high   "));
    }

    #[test]
    fn strips_color_codes() {
        assert_eq!(strip_ansi("\x1b[31mred\x1b[0m"), "red");
    }

    #[test]
    fn control_characters_in_titles_are_neutralised() {
        assert_eq!(sanitize("a\tb\r\nc"), "a b  c");
        assert_eq!(sanitize("\u{1b}[2J"), "\u{fffd}[2J");

        let renderer = plain_renderer(FieldSet::all());
        let todos = vec![Todo::new("\u{1b}[2J\nx".to_string())];
        let rows = build_view(&todos, &ViewSpec::default());
        let mut out = Vec::new();
        renderer
            .write_todo_table(&mut out, &rows, today())
            .expect("write");
        let text = String::from_utf8(out).expect("utf8");
        assert!(!text.contains('\u{1b}'));
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().nth(2).expect("row").contains("\u{fffd}[2J x"));

        let mut out = Vec::new();
        renderer
            .write_todo_info(&mut out, 0, &todos[0], today())
            .expect("write");
        let text = String::from_utf8(out).expect("utf8");
        assert!(!text.contains('\u{1b}'));
        assert!(text.contains("title     \u{fffd}[2J x"));
    }
}
