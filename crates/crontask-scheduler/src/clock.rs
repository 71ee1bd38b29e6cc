use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, SchedulerError};

/// Invoked on every firing instant. Must return promptly; long work is spawned.
pub type FireCallback = Arc<dyn Fn() + Send + Sync>;

/// Source of firing instants for cron expressions.
pub trait ClockSource: Send + Sync {
    /// True if `expression` is accepted.
    fn validate(&self, expression: &str) -> bool;

    /// Like [`validate`](Self::validate) but carries the rejection reason.
    fn check(&self, expression: &str) -> Result<()> {
        if self.validate(expression) {
            Ok(())
        } else {
            Err(SchedulerError::InvalidCron {
                expression: expression.to_string(),
                reason: "expression rejected by clock source".to_string(),
            })
        }
    }

    /// Arm a timer that calls `on_fire` at every firing instant until the
    /// returned [`Subscription`] is cancelled or dropped.
    fn subscribe(&self, expression: &str, on_fire: FireCallback) -> Result<Subscription>;
}

/// Live timer handle. Cancelling stops future firings only; work already
/// dispatched by `on_fire` keeps running.
#[derive(Debug)]
pub struct Subscription {
    token: CancellationToken,
}

impl Subscription {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// [`ClockSource`] backed by the `cron` crate, evaluated in UTC.
///
/// Accepts 5-field (`min hour dom mon dow`) and 6-field
/// (`sec min hour dom mon dow`) expressions.
#[derive(Debug, Default, Clone)]
pub struct CronClock;

impl CronClock {
    pub fn new() -> Self {
        Self
    }

    /// Parse `expression` into a schedule.
    pub fn parse(expression: &str) -> Result<Schedule> {
        let normalized = normalize(expression).map_err(|reason| SchedulerError::InvalidCron {
            expression: expression.to_string(),
            reason,
        })?;
        Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
            expression: expression.to_string(),
            reason: e.to_string(),
        })
    }

    /// First firing instant strictly after `after`.
    pub fn next_after(expression: &str, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        Ok(Self::parse(expression)?.after(&after).next())
    }
}

impl ClockSource for CronClock {
    fn validate(&self, expression: &str) -> bool {
        Self::parse(expression).is_ok()
    }

    fn check(&self, expression: &str) -> Result<()> {
        Self::parse(expression).map(|_| ())
    }

    fn subscribe(&self, expression: &str, on_fire: FireCallback) -> Result<Subscription> {
        let schedule = Self::parse(expression)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SchedulerError::Internal(format!("no tokio runtime for timer: {e}")))?;

        let token = CancellationToken::new();
        runtime.spawn(run_timer(
            schedule,
            expression.to_string(),
            token.clone(),
            on_fire,
        ));
        Ok(Subscription::new(token))
    }
}

/// Sleep until each firing instant, fire, repeat. Instants that passed while
/// the callback or the runtime lagged are skipped, not replayed.
async fn run_timer(
    schedule: Schedule,
    expression: String,
    token: CancellationToken,
    on_fire: FireCallback,
) {
    let mut last = Utc::now();
    loop {
        let Some(next) = schedule.after(&last).next() else {
            warn!(%expression, "cron schedule has no further firings");
            break;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();

        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        on_fire();
        last = next.max(Utc::now());
    }
    debug!(%expression, "timer stopped");
}

/// Bring an expression into the 6/7-field form the `cron` crate parses.
///
/// A 5-field expression gets a leading `0` seconds field. Numeric weekdays use
/// the conventional 0-7 numbering (0 and 7 are Sunday) and are rewritten to the
/// crate's 1-7 numbering (1 is Sunday).
fn normalize(expression: &str) -> std::result::Result<String, String> {
    let mut fields: Vec<String> = expression.split_whitespace().map(String::from).collect();
    match fields.len() {
        5 => fields.insert(0, "0".to_string()),
        6 => {}
        n => return Err(format!("expected 5 or 6 fields, found {n}")),
    }
    fields[5] = translate_weekdays(&fields[5])?;
    Ok(fields.join(" "))
}

fn translate_weekdays(field: &str) -> std::result::Result<String, String> {
    field
        .split(',')
        .map(translate_weekday_item)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map(|items| items.join(","))
}

/// One comma-separated item: `range[/step]` where range is `*`, `n`, `a-b` or a name.
fn translate_weekday_item(item: &str) -> std::result::Result<String, String> {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (item, None),
    };
    let with_step = |r: String| match step {
        Some(s) => format!("{r}/{s}"),
        None => r,
    };

    let Some(first) = range.chars().next() else {
        return Err(format!("empty day-of-week item in '{item}'"));
    };
    if !first.is_ascii_digit() {
        return Ok(item.to_string());
    }

    match range.split_once('-') {
        None => Ok(with_step(weekday_ordinal(range)?.to_string())),
        Some((start, end)) => {
            let start_n = weekday_number(start)?;
            let end_n = weekday_number(end)?;
            let start_o = weekday_ordinal(start)?;
            // `n-7` ends on Sunday, which wraps to ordinal 1 in the crate's numbering.
            if end_n == 7 && start_n != 0 {
                if let Some(step) = step {
                    return expand_stepped_to_sunday(start_n, step, item);
                }
                if start_n == 7 {
                    return Ok("1".to_string());
                }
                return Ok(format!("{start_o}-7,1"));
            }
            let end_o = if end_n == 7 { 7 } else { end_n + 1 };
            Ok(with_step(format!("{start_o}-{end_o}")))
        }
    }
}

/// `a-7/s` wraps past Sunday, so list the days explicitly instead.
fn expand_stepped_to_sunday(
    start_n: u32,
    step: &str,
    item: &str,
) -> std::result::Result<String, String> {
    let step = match step.parse::<usize>() {
        Ok(n) if n > 0 => n,
        _ => return Err(format!("invalid step in day-of-week item '{item}'")),
    };
    let mut ordinals: Vec<u32> = Vec::new();
    for n in (start_n..=7).step_by(step) {
        let ordinal = n % 7 + 1;
        if !ordinals.contains(&ordinal) {
            ordinals.push(ordinal);
        }
    }
    Ok(ordinals
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(","))
}

fn weekday_number(s: &str) -> std::result::Result<u32, String> {
    match s.parse::<u32>() {
        Ok(n) if n <= 7 => Ok(n),
        _ => Err(format!("day-of-week '{s}' is out of range 0-7")),
    }
}

fn weekday_ordinal(s: &str) -> std::result::Result<u32, String> {
    Ok(weekday_number(s)? % 7 + 1)
}
