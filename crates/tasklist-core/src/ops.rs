//! In-place mutations on a loaded list, addressed by stored position.
//! Each returns whether anything changed; a bad position is a no-op.

use tracing::debug;

use crate::task::Todo;

pub fn toggle_check(todos: &mut [Todo], idx: usize) -> bool {
    let Some(todo) = todos.get_mut(idx) else {
        debug!(idx, len = todos.len(), "toggle: position out of range");
        return false;
    };
    todo.checked = !todo.checked;
    true
}

pub fn delete_todo(todos: &mut Vec<Todo>, idx: usize) -> Option<Todo> {
    if idx >= todos.len() {
        debug!(idx, len = todos.len(), "delete: position out of range");
        return None;
    }
    Some(todos.remove(idx))
}

pub fn toggle_subtask_check(todos: &mut [Todo], idx: usize, sub_idx: usize) -> bool {
    let Some(sub) = todos
        .get_mut(idx)
        .and_then(|todo| todo.subtasks.get_mut(sub_idx))
    else {
        debug!(idx, sub_idx, "toggle subtask: position out of range");
        return false;
    };
    sub.checked = !sub.checked;
    true
}

#[cfg(test)]
mod tests {
    use super::{delete_todo, toggle_check, toggle_subtask_check};
    use crate::task::{Subtask, Todo};

    fn list(titles: &[&str]) -> Vec<Todo> {
        titles.iter().map(|t| Todo::new(t.to_string())).collect()
    }

    #[test]
    fn delete_shifts_later_positions() {
        let mut todos = list(&["A", "B", "C"]);
        let removed = delete_todo(&mut todos, 0).expect("removed");
        assert_eq!(removed.title, "A");
        assert_eq!(todos.len(), 2);
        assert_eq!(todos[0].title, "B");
        assert_eq!(todos[1].title, "C");

        assert!(delete_todo(&mut todos, 5).is_none());
        assert_eq!(todos.len(), 2);
    }

    #[test]
    fn toggle_flips_only_one_record() {
        let mut todos = list(&["A", "B"]);
        let before = todos.clone();
        assert!(toggle_check(&mut todos, 1));
        assert_eq!(todos[0], before[0]);
        assert!(todos[1].checked);
        assert_eq!(todos[1].title, before[1].title);

        assert!(!toggle_check(&mut todos, 2));
    }

    #[test]
    fn subtask_toggle_ignores_bad_indices() {
        let mut todos = list(&["A"]);
        todos[0].subtasks = vec![Subtask::new("one".into()), Subtask::new("two".into())];

        assert!(toggle_subtask_check(&mut todos, 0, 1));
        assert!(todos[0].subtasks[1].checked);
        assert!(!todos[0].subtasks[0].checked);

        assert!(!toggle_subtask_check(&mut todos, 0, 2));
        assert!(!toggle_subtask_check(&mut todos, 3, 0));
    }
}
