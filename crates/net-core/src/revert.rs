//! Scoped undo list for multi-step mutations
//!
//! Each reversible step pushes its undo action once it has succeeded. If the
//! operation fails before reaching its success point the actions are run in
//! reverse order; on success they are discarded.

use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, error, warn};

type UndoFn = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

struct UndoStep {
    description: String,
    undo: UndoFn,
}

pub struct RevertScope {
    label: String,
    steps: Vec<UndoStep>,
}

impl RevertScope {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            steps: Vec::new(),
        }
    }

    /// Push the undo action for a step that just succeeded.
    pub fn add<F, Fut>(&mut self, description: impl Into<String>, undo: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let description = description.into();
        debug!("{}: registered undo step '{}'", self.label, description);
        self.steps.push(UndoStep {
            description,
            undo: Box::new(move || undo().boxed()),
        });
    }

    /// Run every pending undo action, most recent first.
    ///
    /// Failing actions are logged and do not stop the remaining ones; the
    /// descriptions of the failed steps are returned.
    pub async fn fail(mut self) -> Vec<String> {
        let steps = std::mem::take(&mut self.steps);
        if steps.is_empty() {
            return Vec::new();
        }

        warn!("{}: reverting {} step(s)", self.label, steps.len());
        let mut failed = Vec::new();
        for step in steps.into_iter().rev() {
            debug!("{}: undoing '{}'", self.label, step.description);
            if let Err(err) = (step.undo)().await {
                error!(
                    "{}: failed to undo '{}': {:#}",
                    self.label, step.description, err
                );
                failed.push(step.description);
            }
        }
        failed
    }

    /// Discard the pending undo actions.
    pub fn success(mut self) {
        self.steps.clear();
    }

    /// Revert on `Err`, discard on `Ok`, and hand the result back.
    pub async fn finish<T, E>(self, result: Result<T, E>) -> Result<T, E> {
        match result {
            Ok(value) => {
                self.success();
                Ok(value)
            }
            Err(err) => {
                self.fail().await;
                Err(err)
            }
        }
    }
}

impl Drop for RevertScope {
    fn drop(&mut self) {
        if !self.steps.is_empty() {
            warn!(
                "{}: dropped with {} undo step(s) not run",
                self.label,
                self.steps.len()
            );
        }
    }
}

impl std::fmt::Debug for RevertScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let steps: Vec<&str> = self.steps.iter().map(|s| s.description.as_str()).collect();
        f.debug_struct("RevertScope")
            .field("label", &self.label)
            .field("steps", &steps)
            .finish()
    }
}
