//! Window specifications and the window clause builder
//!
//! A query carries at most one window. The builder walks
//! `NoWindow -> Specified -> Rendered`; a second `specify` is always rejected,
//! even when the first spec was never rendered.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, TranslationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn millis(self) -> i64 {
        match self {
            TimeUnit::Milliseconds => 1,
            TimeUnit::Seconds => 1_000,
            TimeUnit::Minutes => 60_000,
            TimeUnit::Hours => 3_600_000,
            TimeUnit::Days => 86_400_000,
        }
    }

    /// Unit keyword in the target engine's vocabulary
    pub fn keyword(self) -> &'static str {
        match self {
            TimeUnit::Milliseconds => "MILLISECONDS",
            TimeUnit::Seconds => "SECONDS",
            TimeUnit::Minutes => "MINUTES",
            TimeUnit::Hours => "HOURS",
            TimeUnit::Days => "DAYS",
        }
    }
}

/// A duration kept in the unit it was declared with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowDuration {
    pub value: i64,
    pub unit: TimeUnit,
}

impl WindowDuration {
    pub fn new(value: i64, unit: TimeUnit) -> Self {
        Self { value, unit }
    }

    pub fn milliseconds(value: i64) -> Self {
        Self::new(value, TimeUnit::Milliseconds)
    }

    pub fn seconds(value: i64) -> Self {
        Self::new(value, TimeUnit::Seconds)
    }

    pub fn minutes(value: i64) -> Self {
        Self::new(value, TimeUnit::Minutes)
    }

    pub fn hours(value: i64) -> Self {
        Self::new(value, TimeUnit::Hours)
    }

    pub fn days(value: i64) -> Self {
        Self::new(value, TimeUnit::Days)
    }

    /// Express a std duration in its natural unit: the largest unit that
    /// divides it evenly. Sub-millisecond precision is dropped.
    pub fn from_std(duration: std::time::Duration) -> Self {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        if millis == 0 {
            return Self::milliseconds(0);
        }
        for unit in [TimeUnit::Days, TimeUnit::Hours, TimeUnit::Minutes, TimeUnit::Seconds] {
            if millis % unit.millis() == 0 {
                return Self::new(millis / unit.millis(), unit);
            }
        }
        Self::milliseconds(millis)
    }

    pub fn is_positive(&self) -> bool {
        self.value > 0
    }

    pub fn as_millis(&self) -> i128 {
        self.value as i128 * self.unit.millis() as i128
    }
}

impl fmt::Display for WindowDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit.keyword())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum WindowKind {
    Tumbling { size: WindowDuration },
    Hopping { size: WindowDuration, advance: WindowDuration },
    Session { gap: WindowDuration },
}

impl WindowKind {
    pub fn name(&self) -> &'static str {
        match self {
            WindowKind::Tumbling { .. } => "TUMBLING",
            WindowKind::Hopping { .. } => "HOPPING",
            WindowKind::Session { .. } => "SESSION",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub kind: WindowKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace: Option<WindowDuration>,
    #[serde(default)]
    pub finalize: bool,
}

impl WindowSpec {
    pub fn tumbling(size: WindowDuration) -> Self {
        Self::from_kind(WindowKind::Tumbling { size })
    }

    pub fn hopping(size: WindowDuration, advance: WindowDuration) -> Self {
        Self::from_kind(WindowKind::Hopping { size, advance })
    }

    pub fn session(gap: WindowDuration) -> Self {
        Self::from_kind(WindowKind::Session { gap })
    }

    fn from_kind(kind: WindowKind) -> Self {
        Self {
            kind,
            grace: None,
            finalize: false,
        }
    }

    pub fn with_grace(mut self, grace: WindowDuration) -> Self {
        self.grace = Some(grace);
        self
    }

    pub fn finalized(mut self) -> Self {
        self.finalize = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        match &self.kind {
            WindowKind::Tumbling { size } => require_positive("size", size)?,
            WindowKind::Hopping { size, advance } => {
                require_positive("size", size)?;
                require_positive("advance", advance)?;
                if advance.as_millis() > size.as_millis() {
                    return Err(TranslationError::InvalidWindowSpec(format!(
                        "hopping advance ({}) must not exceed size ({})",
                        advance, size
                    )));
                }
            }
            WindowKind::Session { gap } => require_positive("gap", gap)?,
        }
        if let Some(grace) = &self.grace {
            require_positive("grace period", grace)?;
        }
        Ok(())
    }

    /// Literal window clause, e.g. `WINDOW TUMBLING (SIZE 5 MINUTES)`
    pub fn to_clause(&self) -> String {
        let mut params = match &self.kind {
            WindowKind::Tumbling { size } => format!("SIZE {}", size),
            WindowKind::Hopping { size, advance } => {
                format!("SIZE {}, ADVANCE BY {}", size, advance)
            }
            WindowKind::Session { gap } => format!("GAP {}", gap),
        };
        if let Some(grace) = &self.grace {
            params.push_str(&format!(", GRACE PERIOD {}", grace));
        }
        format!("WINDOW {} ({})", self.kind.name(), params)
    }
}

fn require_positive(what: &str, duration: &WindowDuration) -> Result<()> {
    if duration.is_positive() {
        Ok(())
    } else {
        Err(TranslationError::InvalidWindowSpec(format!(
            "{} must be greater than zero, got {}",
            what, duration
        )))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WindowState {
    #[default]
    NoWindow,
    Specified(WindowSpec),
    Rendered { spec: WindowSpec, clause: String },
}

/// Tracks the single window a query may carry
#[derive(Debug, Clone, Default)]
pub struct WindowClauseBuilder {
    state: WindowState,
}

impl WindowClauseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a plan's already-validated window
    pub fn for_plan(window: Option<&WindowSpec>) -> Self {
        let state = match window {
            Some(spec) => WindowState::Specified(spec.clone()),
            None => WindowState::NoWindow,
        };
        Self { state }
    }

    pub fn state(&self) -> &WindowState {
        &self.state
    }

    pub fn spec(&self) -> Option<&WindowSpec> {
        match &self.state {
            WindowState::NoWindow => None,
            WindowState::Specified(spec) | WindowState::Rendered { spec, .. } => Some(spec),
        }
    }

    pub fn specify(&mut self, spec: WindowSpec) -> Result<()> {
        if !matches!(self.state, WindowState::NoWindow) {
            return Err(TranslationError::MultipleWindowSpec);
        }
        spec.validate()?;
        self.state = WindowState::Specified(spec);
        Ok(())
    }

    /// Request `EMIT FINAL` semantics on the current window
    pub fn finalize(&mut self) -> Result<()> {
        match &mut self.state {
            WindowState::NoWindow => Err(TranslationError::InvalidEmitMode(
                "finalization requested without a window".to_string(),
            )),
            WindowState::Specified(spec) => {
                spec.finalize = true;
                Ok(())
            }
            WindowState::Rendered { .. } => Err(TranslationError::InvalidEmitMode(
                "window clause has already been rendered".to_string(),
            )),
        }
    }

    /// Render the clause, moving to `Rendered`. Returns `None` when no window exists.
    pub fn render(&mut self) -> Option<&str> {
        let state = std::mem::take(&mut self.state);
        self.state = match state {
            WindowState::Specified(spec) => {
                let clause = spec.to_clause();
                WindowState::Rendered { spec, clause }
            }
            other => other,
        };
        match &self.state {
            WindowState::Rendered { clause, .. } => Some(clause.as_str()),
            _ => None,
        }
    }

    pub fn into_spec(self) -> Option<WindowSpec> {
        match self.state {
            WindowState::NoWindow => None,
            WindowState::Specified(spec) | WindowState::Rendered { spec, .. } => Some(spec),
        }
    }
}
