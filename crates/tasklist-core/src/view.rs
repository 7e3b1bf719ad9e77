use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use tracing::trace;
use uuid::Uuid;

use crate::datetime::parse_stored_date;
use crate::task::Todo;

const MIN_ID_PREFIX: usize = 4;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default,
)]
pub enum SortKey {
  #[default]
  None,
  Due,
  Priority
}

impl FromStr for SortKey {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "" | "none" => Ok(Self::None),
      | "due" | "duedate" => {
        Ok(Self::Due)
      }
      | "priority" => Ok(Self::Priority),
      | other => Err(anyhow!(
        "unknown sort key: {other} \
         (expected none, due or \
         priority)"
      ))
    }
  }
}

impl fmt::Display for SortKey {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(match self {
      | Self::None => "none",
      | Self::Due => "due",
      | Self::Priority => "priority"
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryFilter {
  Named(String),
  /// Absent or blank category.
  Uncategorized
}

#[derive(Debug, Clone, Default)]
pub struct ViewSpec {
  pub category: Option<CategoryFilter>,
  pub tag:      Option<String>,
  pub search:   Option<String>,
  pub sort:     SortKey
}

/// One visible row; `index` is the
/// record's position in the stored
/// list and is what mutations use.
#[derive(Debug, Clone, Copy)]
pub struct ViewRow<'a> {
  pub index: usize,
  pub todo:  &'a Todo
}

impl ViewSpec {
  pub fn matches(
    &self,
    todo: &Todo
  ) -> bool {
    let category_ok =
      match &self.category {
        | None => true,
        | Some(
          CategoryFilter::Uncategorized
        ) => todo.category_name().is_none(),
        | Some(CategoryFilter::Named(
          name
        )) => {
          todo.category_name()
            == Some(name.trim())
        }
      };
    if !category_ok {
      return false;
    }

    if let Some(tag) = &self.tag
      && !todo
        .tags
        .iter()
        .any(|t| t == tag)
    {
      return false;
    }

    if let Some(needle) = &self.search {
      let needle =
        needle.to_lowercase();
      let hit = todo
        .title
        .to_lowercase()
        .contains(&needle)
        || todo
          .detail_text()
          .to_lowercase()
          .contains(&needle);
      if !hit {
        return false;
      }
    }

    true
  }
}

#[tracing::instrument(skip(
  todos, spec
))]
pub fn build_view<'a>(
  todos: &'a [Todo],
  spec: &ViewSpec
) -> Vec<ViewRow<'a>> {
  let mut rows: Vec<ViewRow<'a>> =
    todos
      .iter()
      .enumerate()
      .filter(|(_, todo)| {
        spec.matches(todo)
      })
      .map(|(index, todo)| {
        ViewRow {
          index,
          todo
        }
      })
      .collect();

  // sort_by is stable, so ties keep
  // stored order.
  match spec.sort {
    | SortKey::None => {}
    | SortKey::Due => {
      rows.sort_by(|a, b| {
        compare_due(a.todo, b.todo)
      })
    }
    | SortKey::Priority => {
      rows.sort_by_key(|row| {
        row.todo.effective_priority()
      })
    }
  }

  trace!(
    total = todos.len(),
    shown = rows.len(),
    sort = %spec.sort,
    "built view"
  );
  rows
}

/// Dated before undated, dated
/// ascending.
fn compare_due(
  a: &Todo,
  b: &Todo
) -> Ordering {
  let da = a
    .due_date
    .as_deref()
    .and_then(parse_stored_date);
  let db = b
    .due_date
    .as_deref()
    .and_then(parse_stored_date);
  match (da, db) {
    | (Some(x), Some(y)) => x.cmp(&y),
    | (Some(_), None) => Ordering::Less,
    | (None, Some(_)) => {
      Ordering::Greater
    }
    | (None, None) => Ordering::Equal
  }
}

/// How a command names its target
/// record. An all-digit token is a
/// position; `id:` forces an id
/// prefix even when it is all digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
  Position(usize),
  Id(String)
}

impl FromStr for Selector {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let token = s.trim();
    let (token, forced_id) =
      match token.strip_prefix("id:") {
        | Some(rest) => (rest, true),
        | None => (token, false)
      };
    if !forced_id
      && !token.is_empty()
      && token
        .chars()
        .all(|c| c.is_ascii_digit())
    {
      let pos = token.parse::<usize>()
        .map_err(|e| anyhow!("invalid position {token}: {e}"))?;
      return Ok(Self::Position(pos));
    }

    let hex: String = token
      .chars()
      .filter(|c| *c != '-')
      .collect::<String>()
      .to_ascii_lowercase();
    if hex.len() < MIN_ID_PREFIX
      || !hex
        .chars()
        .all(|c| c.is_ascii_hexdigit())
    {
      return Err(anyhow!(
        "invalid selector '{token}': \
         expected a position or an id \
         prefix of at least \
         {MIN_ID_PREFIX} hex digits"
      ));
    }
    Ok(Self::Id(hex))
  }
}

impl fmt::Display for Selector {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | Self::Position(pos) => {
        write!(f, "#{pos}")
      }
      | Self::Id(id) => {
        write!(f, "id {id}")
      }
    }
  }
}

/// id -> position, rebuilt from each
/// freshly loaded list.
#[derive(Debug, Clone, Default)]
pub struct IdIndex {
  by_id: HashMap<Uuid, usize>
}

impl IdIndex {
  pub fn build(
    todos: &[Todo]
  ) -> Self {
    let by_id = todos
      .iter()
      .enumerate()
      .filter_map(|(pos, todo)| {
        todo.id.map(|id| (id, pos))
      })
      .collect();
    Self {
      by_id
    }
  }

  /// Resolves a selector to a stored
  /// position. An out-of-range
  /// position yields `None`; an id
  /// that is unknown or ambiguous is
  /// an error.
  pub fn resolve(
    &self,
    len: usize,
    selector: &Selector
  ) -> anyhow::Result<Option<usize>> {
    match selector {
      | Selector::Position(pos) => {
        Ok((*pos < len).then_some(*pos))
      }
      | Selector::Id(prefix) => {
        let mut hits = self
          .by_id
          .iter()
          .filter(|(id, _)| {
            id.simple()
              .to_string()
              .starts_with(prefix.as_str())
          })
          .map(|(_, pos)| *pos);
        let first =
          hits.next().ok_or_else(|| {
            anyhow!(
              "no item with id \
               {prefix}"
            )
          })?;
        if hits.next().is_some() {
          return Err(anyhow!(
            "id prefix {prefix} is \
             ambiguous"
          ));
        }
        Ok(Some(first))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::{
    CategoryFilter,
    IdIndex,
    Selector,
    SortKey,
    ViewSpec,
    build_view
  };
  use crate::task::Todo;

  fn todo(
    title: &str,
    due: Option<&str>,
    priority: Option<&str>
  ) -> Todo {
    let mut t =
      Todo::new(title.to_string());
    t.due_date = due.map(str::to_string);
    t.priority =
      priority.map(str::to_string);
    t
  }

  fn titles(
    todos: &[Todo],
    spec: &ViewSpec
  ) -> Vec<String> {
    build_view(todos, spec)
      .iter()
      .map(|row| row.todo.title.clone())
      .collect()
  }

  #[test]
  fn due_sort_puts_undated_last() {
    let todos = vec![
      todo("none-1", None, None),
      todo("late", Some("2026-05-01"), None),
      todo("early", Some("2026-01-01"), None),
      todo("none-2", None, None),
    ];
    let spec = ViewSpec {
      sort: SortKey::Due,
      ..ViewSpec::default()
    };
    assert_eq!(
      titles(&todos, &spec),
      vec![
        "early", "late", "none-1",
        "none-2"
      ]
    );

    let rows = build_view(&todos, &spec);
    assert_eq!(rows[0].index, 2);
    assert_eq!(rows[1].index, 1);
  }

  #[test]
  fn priority_sort_is_stable_and_lenient()
  {
    let todos = vec![
      todo("m1", None, None),
      todo("l", None, Some("low")),
      todo("odd", None, Some("urgent")),
      todo("h", None, Some("high")),
    ];
    let spec = ViewSpec {
      sort: SortKey::Priority,
      ..ViewSpec::default()
    };
    assert_eq!(
      titles(&todos, &spec),
      vec!["h", "m1", "odd", "l"]
    );
  }

  #[test]
  fn filters_keep_original_positions() {
    let mut a = todo("a", None, None);
    a.category = Some("work".into());
    let b = todo("b", None, None);
    let mut c = todo("c", None, None);
    c.category = Some("  ".into());
    c.tags = vec!["x".into()];
    let todos = vec![a, b, c];

    let spec = ViewSpec {
      category: Some(
        CategoryFilter::Uncategorized
      ),
      ..ViewSpec::default()
    };
    let rows = build_view(&todos, &spec);
    let positions: Vec<usize> =
      rows.iter().map(|r| r.index).collect();
    assert_eq!(positions, vec![1, 2]);

    let spec = ViewSpec {
      tag: Some("x".into()),
      ..ViewSpec::default()
    };
    assert_eq!(
      build_view(&todos, &spec)[0].index,
      2
    );

    let spec = ViewSpec {
      category: Some(
        CategoryFilter::Named(
          "home".into()
        )
      ),
      ..ViewSpec::default()
    };
    assert!(
      build_view(&todos, &spec).is_empty()
    );
  }

  #[test]
  fn selectors_resolve_positions_and_ids() {
    let todos = vec![
      todo("a", None, None),
      todo("b", None, None),
    ];
    let index = IdIndex::build(&todos);

    let pos: Selector =
      "1".parse().expect("position");
    assert_eq!(
      index
        .resolve(todos.len(), &pos)
        .expect("resolve"),
      Some(1)
    );
    let far: Selector =
      "7".parse().expect("position");
    assert_eq!(
      index
        .resolve(todos.len(), &far)
        .expect("resolve"),
      None
    );

    let id = todos[1]
      .id
      .expect("id")
      .hyphenated()
      .to_string();
    let by_id: Selector =
      id.parse().expect("id");
    assert_eq!(
      index
        .resolve(todos.len(), &by_id)
        .expect("resolve"),
      Some(1)
    );

    assert!(
      "ab".parse::<Selector>().is_err()
    );
    assert!(
      "id:12"
        .parse::<Selector>()
        .is_err()
    );
    assert!(
      "zzzzzz"
        .parse::<Selector>()
        .is_err()
    );
  }

  #[test]
  fn id_marker_reads_digits_as_prefix() {
    let digits: Selector = "id:1234"
      .parse()
      .expect("id prefix");
    assert_eq!(
      digits,
      Selector::Id("1234".to_string())
    );
    let plain: Selector =
      "1234".parse().expect("position");
    assert_eq!(
      plain,
      Selector::Position(1234)
    );
    let hex: Selector = "id:ABCD-ef"
      .parse()
      .expect("id prefix");
    assert_eq!(
      hex,
      Selector::Id("abcdef".to_string())
    );
  }
}
