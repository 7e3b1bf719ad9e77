use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    /// Accepts the stored labels plus the short and CJK aliases.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" | "h" | "高" => Some(Self::High),
            "medium" | "med" | "m" | "中" => Some(Self::Medium),
            "low" | "l" | "低" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subtask {
    pub text: String,

    #[serde(default)]
    pub checked: bool,
}

impl Subtask {
    pub fn new(text: String) -> Self {
        Self {
            text,
            checked: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    #[serde(default)]
    pub checked: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_time: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub notified: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtasks: Vec<Subtask>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Todo {
    pub fn new(title: String) -> Self {
        Self {
            id: Some(Uuid::new_v4()),
            title,
            detail: None,
            checked: false,
            category: None,
            due_date: None,
            reminder_time: None,
            notified: false,
            tags: vec![],
            notes: vec![],
            links: vec![],
            subtasks: vec![],
            priority: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn detail_text(&self) -> &str {
        self.detail.as_deref().unwrap_or_default()
    }

    /// Category used for grouping; `None` when absent or blank.
    pub fn category_name(&self) -> Option<&str> {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Stored labels that don't parse rank as medium.
    pub fn effective_priority(&self) -> Priority {
        self.priority
            .as_deref()
            .and_then(Priority::parse)
            .unwrap_or(Priority::Medium)
    }

    pub fn subtask_progress(&self) -> (usize, usize) {
        let done = self.subtasks.iter().filter(|sub| sub.checked).count();
        (done, self.subtasks.len())
    }

    pub fn short_id(&self) -> String {
        self.id
            .map(|id| id.simple().to_string()[..8].to_string())
            .unwrap_or_else(|| "-".to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Template {
    pub id: Uuid,
    pub title: String,

    #[serde(default)]
    pub detail: String,
}

impl Template {
    pub fn new(title: String, detail: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            detail,
        }
    }

    pub fn instantiate(&self) -> Todo {
        let mut todo = Todo::new(self.title.clone());
        if !self.detail.is_empty() {
            todo.detail = Some(self.detail.clone());
        }
        todo
    }
}

/// Trims, splits on commas, and drops blanks and repeats while keeping
/// first-seen order. Matching is case-sensitive.
pub fn normalize_tags<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for chunk in raw {
        for tag in chunk.as_ref().split(',') {
            let tag = tag.trim();
            if !tag.is_empty() && !out.iter().any(|seen| seen == tag) {
                out.push(tag.to_string());
            }
        }
    }
    out
}
