use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::datastore::DataStore;
use crate::datetime::parse_stored_reminder;
use crate::task::Todo;

/// Positions of unchecked, not yet notified records whose reminder time
/// has passed. Unparseable reminder times never fire.
pub fn collect_due(todos: &[Todo], now: NaiveDateTime) -> Vec<usize> {
    let mut due = Vec::new();
    for (idx, todo) in todos.iter().enumerate() {
        if todo.checked || todo.notified {
            continue;
        }
        let Some(raw) = todo.reminder_time.as_deref() else {
            continue;
        };
        match parse_stored_reminder(raw) {
            Some(at) if at <= now => due.push(idx),
            Some(_) => {}
            None => {
                warn!(idx, reminder = raw, "ignoring unparseable reminder time");
            }
        }
    }
    due
}

pub fn mark_fired(todos: &mut [Todo], positions: &[usize]) {
    for &idx in positions {
        if let Some(todo) = todos.get_mut(idx) {
            todo.notified = true;
        }
    }
}

/// One load-mark-save cycle. Returns the records that fired, already
/// marked as notified. Nothing is written when nothing fired.
#[tracing::instrument(skip(store, now))]
pub fn scan(store: &DataStore, now: NaiveDateTime) -> anyhow::Result<Vec<Todo>> {
    let mut todos = store.load_todos()?;
    let due = collect_due(&todos, now);
    if due.is_empty() {
        debug!(%now, "no reminders due");
        return Ok(vec![]);
    }

    mark_fired(&mut todos, &due);
    store.save_todos(&todos)?;
    info!(fired = due.len(), "fired reminders");

    Ok(due.into_iter().map(|idx| todos[idx].clone()).collect())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tempfile::tempdir;

    use super::{collect_due, scan};
    use crate::datastore::DataStore;
    use crate::task::Todo;

    fn now() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 17)
            .and_then(|d| d.and_hms_opt(9, 0, 0))
            .expect("valid now")
    }

    fn with_reminder(title: &str, at: &str) -> Todo {
        let mut todo = Todo::new(title.to_string());
        todo.reminder_time = Some(at.to_string());
        todo
    }

    #[test]
    fn picks_only_pending_unnotified_past_reminders() {
        let mut checked = with_reminder("checked", "2026-02-17T08:00");
        checked.checked = true;
        let mut notified = with_reminder("notified", "2026-02-17T08:00");
        notified.notified = true;

        let todos = vec![
            with_reminder("due", "2026-02-17T08:59"),
            with_reminder("exact", "2026-02-17T09:00"),
            with_reminder("later", "2026-02-17T09:01"),
            checked,
            notified,
            with_reminder("garbage", "soon"),
            Todo::new("none".into()),
        ];
        assert_eq!(collect_due(&todos, now()), vec![0, 1]);
    }

    #[test]
    fn scan_fires_once() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open");
        store
            .save_todos(&[
                with_reminder("a", "2026-02-17T08:00"),
                with_reminder("b", "2026-02-18T08:00"),
            ])
            .expect("save");

        let fired = scan(&store, now()).expect("scan");
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].title, "a");
        assert!(fired[0].notified);

        let stored = store.load_todos().expect("load");
        assert!(stored[0].notified);
        assert!(!stored[1].notified);

        assert!(scan(&store, now()).expect("rescan").is_empty());
    }
}
