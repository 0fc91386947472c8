//! Five-field cron expressions: `minute hour day-of-month month day-of-week`.
//!
//! Each field accepts `*`, `N`, `N-M`, `*/S`, `N/S`, `N-M/S` and comma lists.
//! Day-of-week runs 0-7 with both 0 and 7 meaning Sunday. When both the
//! day-of-month and day-of-week fields are restricted, a time matches if
//! either one does (classic cron behavior).

use chrono::{DateTime, Datelike, TimeZone, Timelike};
use std::fmt;

/// One cron field as a bitset of allowed values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Field {
    bits: u64,
    /// Written as `*` (possibly with a step)
    wildcard: bool,
}

impl Field {
    fn contains(&self, value: u32) -> bool {
        value < 64 && self.bits & (1u64 << value) != 0
    }

    fn parse(field: &str, min: u32, max: u32, name: &str) -> Result<Self, String> {
        let mut bits = 0u64;
        let mut wildcard = false;

        for part in field.split(',') {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => {
                    let step: u32 = step
                        .parse()
                        .map_err(|_| format!("invalid step '{step}' in {name} field"))?;
                    if step == 0 {
                        return Err(format!("step cannot be zero in {name} field"));
                    }
                    if step > max {
                        return Err(format!("step {step} is larger than {max} in {name} field"));
                    }
                    (range, step)
                }
                None => (part, 1),
            };

            let (start, end) = if range == "*" {
                wildcard = true;
                (min, max)
            } else if let Some((a, b)) = range.split_once('-') {
                (
                    parse_value(a, min, max, name)?,
                    parse_value(b, min, max, name)?,
                )
            } else {
                let v = parse_value(range, min, max, name)?;
                // `N/S` means from N to the end of the range
                (v, if step > 1 { max } else { v })
            };

            if start > end {
                return Err(format!("range {start}-{end} is reversed in {name} field"));
            }

            let mut v = start;
            while v <= end {
                bits |= 1u64 << v;
                match v.checked_add(step) {
                    Some(next) => v = next,
                    None => break,
                }
            }
        }

        Ok(Self { bits, wildcard })
    }
}

fn parse_value(s: &str, min: u32, max: u32, name: &str) -> Result<u32, String> {
    let v: u32 = s
        .parse()
        .map_err(|_| format!("invalid number '{s}' in {name} field"))?;
    if v < min || v > max {
        return Err(format!("{v} is outside {min}-{max} in {name} field"));
    }
    Ok(v)
}

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    source: String,
    minutes: Field,
    hours: Field,
    days_of_month: Field,
    months: Field,
    days_of_week: Field,
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self, String> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(format!(
                "expected 5 fields (minute hour day-of-month month day-of-week), got {}",
                fields.len()
            ));
        }

        let mut days_of_week = Field::parse(fields[4], 0, 7, "day-of-week")?;
        if days_of_week.contains(7) {
            days_of_week.bits = (days_of_week.bits & !(1u64 << 7)) | 1;
        }

        Ok(Self {
            source: fields.join(" "),
            minutes: Field::parse(fields[0], 0, 59, "minute")?,
            hours: Field::parse(fields[1], 0, 23, "hour")?,
            days_of_month: Field::parse(fields[2], 1, 31, "day-of-month")?,
            months: Field::parse(fields[3], 1, 12, "month")?,
            days_of_week,
        })
    }

    /// Whether `dt`, read in its own time zone, falls on this schedule.
    /// Seconds are ignored.
    pub fn matches<Tz: TimeZone>(&self, dt: &DateTime<Tz>) -> bool {
        if !(self.minutes.contains(dt.minute())
            && self.hours.contains(dt.hour())
            && self.months.contains(dt.month()))
        {
            return false;
        }

        let dom = self.days_of_month.contains(dt.day());
        let dow = self
            .days_of_week
            .contains(dt.weekday().num_days_from_sunday());

        match (self.days_of_month.wildcard, self.days_of_week.wildcard) {
            (false, false) => dom || dow,
            _ => dom && dow,
        }
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
