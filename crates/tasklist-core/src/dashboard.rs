use crate::task::{Priority, Todo};

pub const UNCATEGORIZED: &str = "uncategorized";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub completed: usize,
    /// Whole percent, 0 for an empty list.
    pub completion_rate: u32,
    /// Category counts in first-seen order.
    pub by_category: Vec<(String, usize)>,
    /// Always high, medium, low.
    pub by_priority: [(Priority, usize); 3],
}

pub fn summarize(todos: &[Todo]) -> Summary {
    let total = todos.len();
    let completed = todos.iter().filter(|todo| todo.checked).count();

    let mut by_category: Vec<(String, usize)> = Vec::new();
    for todo in todos {
        let name = todo.category_name().unwrap_or(UNCATEGORIZED);
        match by_category.iter_mut().find(|(seen, _)| seen.as_str() == name) {
            Some((_, count)) => *count += 1,
            None => by_category.push((name.to_string(), 1)),
        }
    }

    let mut by_priority = Priority::ALL.map(|priority| (priority, 0_usize));
    for todo in todos {
        let wanted = todo.effective_priority();
        if let Some((_, count)) = by_priority.iter_mut().find(|(p, _)| *p == wanted) {
            *count += 1;
        }
    }

    Summary {
        total,
        completed,
        completion_rate: completion_rate(completed, total),
        by_category,
        by_priority,
    }
}

/// Tag counts in first-seen order.
pub fn tag_counts(todos: &[Todo]) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for tag in todos.iter().flat_map(|todo| todo.tags.iter()) {
        match counts.iter_mut().find(|(seen, _)| seen == tag) {
            Some((_, count)) => *count += 1,
            None => counts.push((tag.clone(), 1)),
        }
    }
    counts
}

/// `round(100 * completed / total)` with halves rounded up.
pub fn completion_rate(completed: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    let scaled = (completed as u64) * 100;
    let total = total as u64;
    ((scaled * 2 + total) / (total * 2)) as u32
}
