use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  Local,
  NaiveDate,
  NaiveDateTime,
  Weekday
};
use regex::Regex;

pub const DATE_FORMAT: &str =
  "%Y-%m-%d";
pub const REMINDER_FORMAT: &str =
  "%Y-%m-%dT%H:%M";

#[must_use]
pub fn local_now() -> NaiveDateTime {
  Local::now().naive_local()
}

#[must_use]
pub fn local_today() -> NaiveDate {
  Local::now().date_naive()
}

/// Parses a due date typed on the
/// command line into a calendar day.
pub fn parse_due_expr(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "today" => return Ok(today),
    | "tomorrow" => {
      return Ok(
        today + Duration::days(1)
      );
    }
    | "yesterday" => {
      return Ok(
        today - Duration::days(1)
      );
    }
    | _ => {}
  }

  if let Some(target_weekday) =
    parse_weekday_name(&lower)
  {
    return Ok(next_weekday_date(
      today,
      target_weekday
    ));
  }

  let rel_re = Regex::new(
    r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dw])$"
  )
  .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(&lower)
  {
    let num: i64 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!(
          "missing relative amount"
        )
      })?
      .parse()
      .context(
        "invalid relative number"
      )?;
    let out_of_range = || {
      anyhow!(
        "relative date out of range: \
         {input}"
      )
    };
    let days = match caps
      .name("unit")
      .map(|m| m.as_str())
    {
      | Some("w") => num.checked_mul(7),
      | _ => Some(num)
    }
    .ok_or_else(out_of_range)?;
    let negative = caps
      .name("sign")
      .is_some_and(|m| m.as_str() == "-");
    let delta = Duration::try_days(
      if negative { -days } else { days }
    )
    .ok_or_else(out_of_range)?;
    return today
      .checked_add_signed(delta)
      .ok_or_else(out_of_range);
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token,
      DATE_FORMAT
    )
  {
    return Ok(date);
  }

  Err(anyhow!(
    "unrecognized due date: {input}"
  ))
  .with_context(|| {
    "supported formats: YYYY-MM-DD, \
     today/tomorrow/yesterday, \
     weekday names (e.g. friday), \
     +Nd/-Nd/+Nw"
  })
}

/// Parses a reminder time typed on the
/// command line into local wall time.
pub fn parse_reminder_expr(
  input: &str,
  now: NaiveDateTime
) -> anyhow::Result<NaiveDateTime> {
  let token = input.trim();

  let rel_re = Regex::new(
    r"^\+(?P<num>\d+)(?P<unit>[mhd])$"
  )
  .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(token)
  {
    let num: i64 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!(
          "missing relative amount"
        )
      })?
      .parse()
      .context(
        "invalid relative number"
      )?;
    let out_of_range = || {
      anyhow!(
        "relative reminder out of \
         range: {input}"
      )
    };
    let duration = match caps
      .name("unit")
      .map(|m| m.as_str())
    {
      | Some("m") => {
        Duration::try_minutes(num)
      }
      | Some("h") => {
        Duration::try_hours(num)
      }
      | _ => Duration::try_days(num)
    }
    .ok_or_else(out_of_range)?;
    return now
      .checked_add_signed(duration)
      .ok_or_else(out_of_range);
  }

  parse_stored_reminder(token)
    .ok_or_else(|| {
      anyhow!(
        "unrecognized reminder time: \
         {input}"
      )
    })
    .with_context(|| {
      "supported formats: \
       YYYY-MM-DDTHH:MM[:SS], \
       YYYY-MM-DD HH:MM, RFC3339, \
       +Nm/+Nh/+Nd"
    })
}

/// Lenient read of a stored `dueDate`.
/// A datetime value counts for its day.
#[must_use]
pub fn parse_stored_date(
  raw: &str
) -> Option<NaiveDate> {
  let token = raw.trim();
  if let Ok(date) =
    NaiveDate::parse_from_str(
      token,
      DATE_FORMAT
    )
  {
    return Some(date);
  }
  parse_stored_reminder(token)
    .map(|dt| dt.date())
}

/// Lenient read of a stored
/// `reminderTime`. RFC3339 values are
/// shifted into local time.
#[must_use]
pub fn parse_stored_reminder(
  raw: &str
) -> Option<NaiveDateTime> {
  let token = raw.trim();
  for fmt in [
    REMINDER_FORMAT,
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S"
  ] {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return Some(ndt);
    }
  }

  DateTime::parse_from_rfc3339(token)
    .ok()
    .map(|dt| {
      dt.with_timezone(&Local)
        .naive_local()
    })
}

#[must_use]
pub fn format_date(
  date: NaiveDate
) -> String {
  date.format(DATE_FORMAT).to_string()
}

#[must_use]
pub fn format_reminder(
  dt: NaiveDateTime
) -> String {
  dt.format(REMINDER_FORMAT).to_string()
}

/// Day granularity: due today is not
/// overdue.
#[must_use]
pub fn is_overdue(
  due: &str,
  today: NaiveDate
) -> bool {
  parse_stored_date(due)
    .is_some_and(|date| date < today)
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = from
    .weekday()
    .num_days_from_monday()
    as i64;
  let target_idx = target
    .num_days_from_monday()
    as i64;
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  from
    .checked_add_signed(Duration::days(
      delta
    ))
    .unwrap_or(from)
}
