//! ObservationScope for automatic begin/complete logging
//!
//! - Logs `{name}_BEGIN` on creation
//! - Logs `{name}_COMPLETE` on `complete()`
//! - Logs `{name}_FAILED` on `fail()`
//! - Logs `{name}_ERROR` on drop if neither was called

use std::time::Instant;

use super::logger::Logger;

/// A scope that logs the lifecycle of one workflow.
///
/// ```ignore
/// let scope = ObservationScope::with_fields("PROMOTE", &[("target", "r1")]);
/// // ... do work ...
/// scope.complete(); // logs PROMOTE_COMPLETE
/// ```
///
/// Fields given at creation are repeated on every closing line together
/// with `elapsed_ms`.
pub struct ObservationScope {
    name: &'static str,
    completed: bool,
    fields: Vec<(&'static str, String)>,
    started: Instant,
}

impl ObservationScope {
    pub fn new(name: &'static str) -> Self {
        Self::with_fields(name, &[])
    }

    pub fn with_fields(name: &'static str, fields: &[(&'static str, &str)]) -> Self {
        Logger::info(&format!("{}_BEGIN", name), fields);

        Self {
            name,
            completed: false,
            fields: fields.iter().map(|(k, v)| (*k, v.to_string())).collect(),
            started: Instant::now(),
        }
    }

    fn closing_fields<'s>(&'s self, elapsed: &'s str) -> Vec<(&'s str, &'s str)> {
        let mut fields: Vec<(&str, &str)> =
            self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        fields.push(("elapsed_ms", elapsed));
        fields
    }

    fn elapsed_ms(&self) -> String {
        self.started.elapsed().as_millis().to_string()
    }

    /// Mark the scope as successfully completed
    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    /// Mark the scope as completed with additional fields
    pub fn complete_with_fields(mut self, extra_fields: &[(&str, &str)]) {
        self.completed = true;
        let elapsed = self.elapsed_ms();
        let mut fields = self.closing_fields(&elapsed);
        fields.extend(extra_fields.iter().copied());
        Logger::info(&format!("{}_COMPLETE", self.name), &fields);
    }

    /// Mark the scope as failed, naming the error code.
    pub fn fail(mut self, code: &str, reason: &str) {
        self.completed = true;
        let elapsed = self.elapsed_ms();
        let mut fields = self.closing_fields(&elapsed);
        fields.push(("code", code));
        fields.push(("reason", reason));
        Logger::error(&format!("{}_FAILED", self.name), &fields);
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        if !self.completed {
            let elapsed = self.elapsed_ms();
            let mut fields = self.closing_fields(&elapsed);
            fields.push(("reason", "scope dropped without completion"));
            Logger::error(&format!("{}_ERROR", self.name), &fields);
        }
    }
}
