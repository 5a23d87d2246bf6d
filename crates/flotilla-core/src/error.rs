//! Multi-error aggregation for fan-out operations.
//!
//! Any operation that fans out (parallel step actions, scaling every
//! environment, a rollback walk) collects all individual failures instead
//! of failing fast, so partial progress stays visible to the caller.

use std::fmt;

/// An aggregate of errors collected from a fan-out operation.
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<anyhow::Error>,
}

impl MultiError {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn push(&mut self, err: anyhow::Error) {
        self.errors.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[anyhow::Error] {
        &self.errors
    }

    /// `Ok(())` when nothing was collected, otherwise the combined error.
    pub fn into_result(self) -> anyhow::Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.into())
        }
    }
}

impl From<Vec<anyhow::Error>> for MultiError {
    fn from(errors: Vec<anyhow::Error>) -> Self {
        Self { errors }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s) occurred:", self.errors.len())?;
        for err in &self.errors {
            write!(f, " [{err}]")?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}
