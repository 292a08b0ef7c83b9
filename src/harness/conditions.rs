//! Skip conditions
//!
//! A condition is either a fixed boolean or a predicate over the test context, and both are evaluated the same
//! way. `skip_if` skips when the condition holds, `skip_unless` when it does not.

use std::fmt;

use super::errors::{HarnessError, HarnessResult};

/// What a skip predicate can look at.
#[derive(Debug, Clone, Copy)]
pub struct TestContext<'a> {
    pub test_name: &'a str,
    pub hub_name: &'a str,
}

type Predicate = Box<dyn Fn(&TestContext<'_>) -> bool + Send + Sync>;

pub enum SkipCondition {
    Always(bool),
    Predicate(Predicate),
}

impl SkipCondition {
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&TestContext<'_>) -> bool + Send + Sync + 'static,
    {
        SkipCondition::Predicate(Box::new(f))
    }

    pub fn evaluate(&self, ctx: &TestContext<'_>) -> bool {
        match self {
            SkipCondition::Always(value) => *value,
            SkipCondition::Predicate(f) => f(ctx),
        }
    }
}

impl From<bool> for SkipCondition {
    fn from(value: bool) -> Self {
        SkipCondition::Always(value)
    }
}

impl fmt::Debug for SkipCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipCondition::Always(value) => f.debug_tuple("Always").field(value).finish(),
            SkipCondition::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Unconditional skip signal.
pub fn skipped(reason: impl Into<String>) -> HarnessError {
    HarnessError::Skipped {
        reason: Some(reason.into()),
    }
}

/// Skip when `condition` holds.
pub fn skip_if(condition: &SkipCondition, ctx: &TestContext<'_>) -> HarnessResult<()> {
    if condition.evaluate(ctx) {
        Err(HarnessError::Skipped { reason: None })
    } else {
        Ok(())
    }
}

/// Skip unless `condition` holds.
pub fn skip_unless(condition: &SkipCondition, ctx: &TestContext<'_>) -> HarnessResult<()> {
    if condition.evaluate(ctx) {
        Ok(())
    } else {
        Err(HarnessError::Skipped { reason: None })
    }
}

/// Holds on Windows builds.
pub fn on_windows() -> SkipCondition {
    SkipCondition::Always(cfg!(windows))
}

/// Holds when the test runs on the hub named `name`.
pub fn using_hub(name: &'static str) -> SkipCondition {
    SkipCondition::predicate(move |ctx| ctx.hub_name == name)
}
