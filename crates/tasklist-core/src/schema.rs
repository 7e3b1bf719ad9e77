use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;

/// Optional record fields beyond `title` and `checked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Detail,
    Category,
    Due,
    Reminder,
    Tags,
    Notes,
    Links,
    Subtasks,
    Priority,
}

impl Field {
    pub const ALL: [Field; 9] = [
        Field::Detail,
        Field::Category,
        Field::Due,
        Field::Reminder,
        Field::Tags,
        Field::Notes,
        Field::Links,
        Field::Subtasks,
        Field::Priority,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Detail => "detail",
            Self::Category => "category",
            Self::Due => "due",
            Self::Reminder => "reminder",
            Self::Tags => "tags",
            Self::Notes => "notes",
            Self::Links => "links",
            Self::Subtasks => "subtasks",
            Self::Priority => "priority",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Field::ALL
            .into_iter()
            .find(|field| field.name() == wanted)
            .ok_or_else(|| anyhow!("unknown field: {s}"))
    }
}

/// The optional fields the list and edit views expose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSet {
    enabled: BTreeSet<Field>,
}

impl Default for FieldSet {
    fn default() -> Self {
        Self::all()
    }
}

impl FieldSet {
    pub fn all() -> Self {
        Self {
            enabled: Field::ALL.into_iter().collect(),
        }
    }

    /// Parses the comma list used by the `fields` config key.
    /// `all` and `none` are accepted as shorthands.
    pub fn parse(spec: &str) -> anyhow::Result<Self> {
        let trimmed = spec.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" | "all" => return Ok(Self::all()),
            "none" => {
                return Ok(Self {
                    enabled: BTreeSet::new(),
                });
            }
            _ => {}
        }

        let mut enabled = BTreeSet::new();
        for part in trimmed.split(',') {
            if part.trim().is_empty() {
                continue;
            }
            enabled.insert(part.parse::<Field>()?);
        }
        Ok(Self { enabled })
    }

    pub fn has(&self, field: Field) -> bool {
        self.enabled.contains(&field)
    }

    pub fn require(&self, field: Field) -> anyhow::Result<()> {
        if self.has(field) {
            Ok(())
        } else {
            Err(anyhow!(
                "field '{field}' is disabled by the `fields` setting"
            ))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Field> + '_ {
        self.enabled.iter().copied()
    }
}
