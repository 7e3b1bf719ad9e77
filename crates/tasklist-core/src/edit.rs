use anyhow::anyhow;
use chrono::NaiveDateTime;
use tracing::{debug, warn};
use url::Url;

use crate::datetime::{format_date, format_reminder, parse_due_expr, parse_reminder_expr};
use crate::schema::{Field, FieldSet};
use crate::task::{Priority, Subtask, Template, Todo, normalize_tags};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode {
    Create,
    Update { index: usize },
}

/// A form value: leave as is, replace, or remove.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldEdit<T> {
    #[default]
    Keep,
    Set(T),
    Clear,
}

impl<T> FieldEdit<T> {
    fn is_keep(&self) -> bool {
        matches!(self, Self::Keep)
    }
}

/// Raw form input as typed by the user. Dates are parsed on apply.
#[derive(Debug, Clone, Default)]
pub struct FormInput {
    pub title: Option<String>,
    pub detail: FieldEdit<String>,
    pub category: FieldEdit<String>,
    pub due: FieldEdit<String>,
    pub reminder: FieldEdit<String>,
    pub priority: Option<String>,
    pub add_tags: Vec<String>,
    pub remove_tags: Vec<String>,
    pub add_notes: Vec<String>,
    pub remove_notes: Vec<usize>,
    pub add_links: Vec<String>,
    pub remove_links: Vec<usize>,
    pub add_subtasks: Vec<String>,
    pub remove_subtasks: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submitted {
    Created { index: usize },
    Updated { index: usize },
    /// The target position no longer exists; nothing was written.
    Missing { index: usize },
}

/// Form state bound to one record (update) or none (create). The note,
/// link, and subtask lists are working copies until `submit`.
#[derive(Debug, Clone)]
pub struct EditSession {
    mode: EditMode,
    fields: FieldSet,
    base: Todo,
    title: String,
    detail: Option<String>,
    category: Option<String>,
    due_date: Option<String>,
    reminder_time: Option<String>,
    priority: Option<String>,
    tags: Vec<String>,
    notes: Vec<String>,
    links: Vec<String>,
    subtasks: Vec<Subtask>,
    feedback: Vec<String>,
}

impl EditSession {
    pub fn create(fields: FieldSet) -> Self {
        Self::from_record(EditMode::Create, fields, Todo::new(String::new()))
    }

    pub fn from_template(fields: FieldSet, template: &Template) -> Self {
        Self::from_record(EditMode::Create, fields, template.instantiate())
    }

    pub fn update(fields: FieldSet, index: usize, existing: &Todo) -> Self {
        Self::from_record(EditMode::Update { index }, fields, existing.clone())
    }

    fn from_record(mode: EditMode, fields: FieldSet, base: Todo) -> Self {
        Self {
            mode,
            fields,
            title: base.title.clone(),
            detail: base.detail.clone(),
            category: base.category.clone(),
            due_date: base.due_date.clone(),
            reminder_time: base.reminder_time.clone(),
            priority: base.priority.clone(),
            tags: base.tags.clone(),
            notes: base.notes.clone(),
            links: base.links.clone(),
            subtasks: base.subtasks.clone(),
            feedback: vec![],
            base,
        }
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    /// Messages about input that was rejected without failing the form.
    pub fn feedback(&self) -> &[String] {
        &self.feedback
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn links(&self) -> &[String] {
        &self.links
    }

    pub fn subtasks(&self) -> &[Subtask] {
        &self.subtasks
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn set_title(&mut self, title: &str) {
        self.title = title.trim().to_string();
    }

    pub fn add_note(&mut self, text: &str) -> anyhow::Result<()> {
        self.fields.require(Field::Notes)?;
        let text = text.trim();
        if !text.is_empty() {
            self.notes.push(text.to_string());
        }
        Ok(())
    }

    pub fn remove_note(&mut self, idx: usize) -> anyhow::Result<()> {
        self.fields.require(Field::Notes)?;
        remove_at(&mut self.notes, idx, "note", &mut self.feedback);
        Ok(())
    }

    /// Returns whether the link was accepted. A malformed URL is reported
    /// through `feedback` and left out.
    pub fn add_link(&mut self, raw: &str) -> anyhow::Result<bool> {
        self.fields.require(Field::Links)?;
        let candidate = raw.trim();
        match Url::parse(candidate) {
            Ok(url) => {
                debug!(link = %url, "accepted link");
                self.links.push(candidate.to_string());
                Ok(true)
            }
            Err(err) => {
                warn!(link = candidate, error = %err, "rejected link");
                self.feedback
                    .push(format!("Invalid link '{candidate}': {err}. Not added."));
                Ok(false)
            }
        }
    }

    pub fn remove_link(&mut self, idx: usize) -> anyhow::Result<()> {
        self.fields.require(Field::Links)?;
        remove_at(&mut self.links, idx, "link", &mut self.feedback);
        Ok(())
    }

    pub fn add_subtask(&mut self, text: &str) -> anyhow::Result<()> {
        self.fields.require(Field::Subtasks)?;
        let text = text.trim();
        if !text.is_empty() {
            self.subtasks.push(Subtask::new(text.to_string()));
        }
        Ok(())
    }

    pub fn remove_subtask(&mut self, idx: usize) -> anyhow::Result<()> {
        self.fields.require(Field::Subtasks)?;
        remove_at(&mut self.subtasks, idx, "subtask", &mut self.feedback);
        Ok(())
    }

    /// Applies a whole form. Removals run before additions so indices
    /// refer to the lists as they were shown.
    #[tracing::instrument(skip(self, form, now))]
    pub fn apply(&mut self, form: &FormInput, now: NaiveDateTime) -> anyhow::Result<()> {
        self.check_enabled(form)?;

        if let Some(title) = &form.title {
            self.set_title(title);
        }

        apply_text(&mut self.detail, &form.detail);
        apply_text(&mut self.category, &form.category);

        match &form.due {
            FieldEdit::Keep => {}
            FieldEdit::Clear => self.due_date = None,
            FieldEdit::Set(raw) => {
                let date = parse_due_expr(raw, now.date())?;
                self.due_date = Some(format_date(date));
            }
        }

        match &form.reminder {
            FieldEdit::Keep => {}
            FieldEdit::Clear => self.reminder_time = None,
            FieldEdit::Set(raw) => {
                let at = parse_reminder_expr(raw, now)?;
                self.reminder_time = Some(format_reminder(at));
            }
        }

        if let Some(raw) = &form.priority {
            let priority = Priority::parse(raw)
                .ok_or_else(|| anyhow!("invalid priority '{raw}' (expected high, medium or low)"))?;
            self.priority = Some(priority.as_str().to_string());
        }

        if !form.remove_tags.is_empty() {
            let drop = normalize_tags(&form.remove_tags);
            self.tags.retain(|tag| !drop.contains(tag));
        }
        if !form.add_tags.is_empty() {
            let merged = self.tags.iter().chain(form.add_tags.iter());
            self.tags = normalize_tags(merged);
        }

        for idx in sorted_desc(&form.remove_notes) {
            self.remove_note(idx)?;
        }
        for note in &form.add_notes {
            self.add_note(note)?;
        }

        for idx in sorted_desc(&form.remove_links) {
            self.remove_link(idx)?;
        }
        for link in &form.add_links {
            self.add_link(link)?;
        }

        for idx in sorted_desc(&form.remove_subtasks) {
            self.remove_subtask(idx)?;
        }
        for text in &form.add_subtasks {
            self.add_subtask(text)?;
        }

        Ok(())
    }

    fn check_enabled(&self, form: &FormInput) -> anyhow::Result<()> {
        let touched = [
            (Field::Detail, !form.detail.is_keep()),
            (Field::Category, !form.category.is_keep()),
            (Field::Due, !form.due.is_keep()),
            (Field::Reminder, !form.reminder.is_keep()),
            (Field::Priority, form.priority.is_some()),
            (
                Field::Tags,
                !form.add_tags.is_empty() || !form.remove_tags.is_empty(),
            ),
        ];
        for (field, used) in touched {
            if used {
                self.fields.require(field)?;
            }
        }
        Ok(())
    }

    /// Writes the form into `todos`. Update keeps every field the form
    /// doesn't own; create appends a fresh unchecked record.
    #[tracing::instrument(skip(self, todos), fields(mode = ?self.mode))]
    pub fn submit(self, todos: &mut Vec<Todo>) -> anyhow::Result<Submitted> {
        if self.title.trim().is_empty() {
            return Err(anyhow!("title is required"));
        }

        match self.mode {
            EditMode::Create => {
                let mut record = Todo::new(String::new());
                self.write_into(&mut record);
                todos.push(record);
                Ok(Submitted::Created {
                    index: todos.len() - 1,
                })
            }
            EditMode::Update { index } => {
                let Some(slot) = todos.get_mut(index) else {
                    debug!(index, len = todos.len(), "edit target out of range");
                    return Ok(Submitted::Missing { index });
                };
                let mut record = slot.clone();
                let reminder_changed = record.reminder_time != self.reminder_time;
                self.write_into(&mut record);
                if reminder_changed {
                    record.notified = false;
                }
                *slot = record;
                Ok(Submitted::Updated { index })
            }
        }
    }

    fn write_into(self, record: &mut Todo) {
        record.title = self.title;
        let fields = &self.fields;
        if fields.has(Field::Detail) {
            record.detail = self.detail.filter(|d| !d.is_empty());
        } else if self.mode == EditMode::Create {
            // A template's detail is kept even when the field is hidden.
            record.detail = self.base.detail;
        }
        if fields.has(Field::Category) {
            record.category = self.category.filter(|c| !c.trim().is_empty());
        }
        if fields.has(Field::Due) {
            record.due_date = self.due_date;
        }
        if fields.has(Field::Reminder) {
            record.reminder_time = self.reminder_time;
        }
        if fields.has(Field::Priority) {
            record.priority = self.priority;
        }
        if fields.has(Field::Tags) {
            record.tags = self.tags;
        }
        if fields.has(Field::Notes) {
            record.notes = self.notes;
        }
        if fields.has(Field::Links) {
            record.links = self.links;
        }
        if fields.has(Field::Subtasks) {
            record.subtasks = self.subtasks;
        }
    }
}

fn apply_text(slot: &mut Option<String>, edit: &FieldEdit<String>) {
    match edit {
        FieldEdit::Keep => {}
        FieldEdit::Clear => *slot = None,
        FieldEdit::Set(value) => {
            let value = value.trim();
            *slot = (!value.is_empty()).then(|| value.to_string());
        }
    }
}

fn remove_at<T>(items: &mut Vec<T>, idx: usize, what: &str, feedback: &mut Vec<String>) {
    if idx < items.len() {
        items.remove(idx);
    } else {
        debug!(idx, len = items.len(), what, "removal index out of range");
        feedback.push(format!("No {what} at index {idx}."));
    }
}

fn sorted_desc(indices: &[usize]) -> Vec<usize> {
    let mut out = indices.to_vec();
    out.sort_unstable_by(|a, b| b.cmp(a));
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{EditSession, FieldEdit, FormInput, Submitted};
    use crate::schema::FieldSet;
    use crate::task::{Template, Todo};

    fn now() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 17)
            .and_then(|d| d.and_hms_opt(8, 0, 0))
            .expect("valid now")
    }

    #[test]
    fn create_requires_title_and_appends_unchecked() {
        let mut todos = vec![Todo::new("existing".into())];

        let session = EditSession::create(FieldSet::all());
        assert!(session.submit(&mut todos).is_err());
        assert_eq!(todos.len(), 1);

        let mut session = EditSession::create(FieldSet::all());
        let form = FormInput {
            title: Some("  write report ".into()),
            detail: FieldEdit::Set("quarterly".into()),
            due: FieldEdit::Set("tomorrow".into()),
            priority: Some("高".into()),
            add_tags: vec!["work, q1".into(), "work".into()],
            ..FormInput::default()
        };
        session.apply(&form, now()).expect("apply");
        let outcome = session.submit(&mut todos).expect("submit");
        assert_eq!(outcome, Submitted::Created { index: 1 });

        let created = &todos[1];
        assert_eq!(created.title, "write report");
        assert_eq!(created.detail.as_deref(), Some("quarterly"));
        assert_eq!(created.due_date.as_deref(), Some("2026-02-18"));
        assert_eq!(created.priority.as_deref(), Some("high"));
        assert_eq!(created.tags, vec!["work", "q1"]);
        assert!(!created.checked);
        assert!(created.id.is_some());
        assert_ne!(created.id, todos[0].id);
    }

    #[test]
    fn update_merges_and_keeps_off_form_fields() {
        let mut original = Todo::new("old".into());
        original.checked = true;
        original.notified = true;
        original.reminder_time = Some("2026-02-17T07:00".into());
        original
            .extra
            .insert("color".into(), serde_json::json!("red"));
        let id = original.id;
        let mut todos = vec![original];

        let mut session = EditSession::update(FieldSet::all(), 0, &todos[0]);
        let form = FormInput {
            title: Some("new".into()),
            reminder: FieldEdit::Set("2026-02-18T09:00".into()),
            ..FormInput::default()
        };
        session.apply(&form, now()).expect("apply");
        assert_eq!(
            session.submit(&mut todos).expect("submit"),
            Submitted::Updated { index: 0 }
        );

        let updated = &todos[0];
        assert_eq!(updated.title, "new");
        assert!(updated.checked);
        assert_eq!(updated.id, id);
        assert!(!updated.notified);
        assert_eq!(updated.extra.get("color"), Some(&serde_json::json!("red")));
    }

    #[test]
    fn invalid_link_is_rejected_but_form_continues() {
        let mut todos = vec![Todo::new("a".into())];
        let mut session = EditSession::update(FieldSet::all(), 0, &todos[0]);
        let form = FormInput {
            add_links: vec!["not a url".into(), "https://example.com/a".into()],
            add_notes: vec!["first".into()],
            ..FormInput::default()
        };
        session.apply(&form, now()).expect("apply");
        assert_eq!(session.links(), ["https://example.com/a".to_string()]);
        assert_eq!(session.feedback().len(), 1);
        session.submit(&mut todos).expect("submit");
        assert_eq!(todos[0].links.len(), 1);
        assert_eq!(todos[0].notes, vec!["first"]);
    }

    #[test]
    fn working_lists_remove_by_index() {
        let mut todo = Todo::new("a".into());
        todo.notes = vec!["n0".into(), "n1".into(), "n2".into()];
        let mut session = EditSession::update(FieldSet::all(), 0, &todo);
        let form = FormInput {
            remove_notes: vec![0, 2, 9],
            ..FormInput::default()
        };
        session.apply(&form, now()).expect("apply");
        assert_eq!(session.notes(), ["n1".to_string()]);
        assert_eq!(session.feedback().len(), 1);
    }

    #[test]
    fn disabled_fields_are_rejected_and_preserved() {
        let fields = FieldSet::parse("tags").expect("fields");
        let mut todo = Todo::new("a".into());
        todo.due_date = Some("2026-01-01".into());
        let mut todos = vec![todo];

        let mut session = EditSession::update(fields.clone(), 0, &todos[0]);
        let form = FormInput {
            due: FieldEdit::Clear,
            ..FormInput::default()
        };
        assert!(session.apply(&form, now()).is_err());

        let mut session = EditSession::update(fields, 0, &todos[0]);
        session.set_title("b");
        session.submit(&mut todos).expect("submit");
        assert_eq!(todos[0].due_date.as_deref(), Some("2026-01-01"));
    }

    #[test]
    fn update_of_missing_position_is_a_noop() {
        let mut todos = vec![Todo::new("a".into())];
        let snapshot = todos[0].clone();
        let session = EditSession::update(FieldSet::all(), 0, &snapshot);
        todos.clear();
        assert_eq!(
            session.submit(&mut todos).expect("submit"),
            Submitted::Missing { index: 0 }
        );
        assert!(todos.is_empty());
    }

    #[test]
    fn template_seeds_create_mode() {
        let template = Template::new("standup".into(), "notes from standup".into());
        let mut todos = vec![];
        let session = EditSession::from_template(FieldSet::all(), &template);
        session.submit(&mut todos).expect("submit");
        assert_eq!(todos[0].title, "standup");
        assert_eq!(todos[0].detail.as_deref(), Some("notes from standup"));
    }
}
