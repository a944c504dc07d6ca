use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};

use porter_domain::ResourceGroup;
use tracing::warn;

use crate::error::{ApplyError, DriverError};
use crate::worker::Hook;

/// Writes build failures to a terminal-facing writer.
pub struct ErrorEmitterHook {
    writer: Box<dyn Write>,
    color: bool,
}

impl ErrorEmitterHook {
    #[must_use]
    pub fn new(writer: Box<dyn Write>, color: bool) -> Self {
        Self { writer, color }
    }

    #[must_use]
    pub fn stderr(color: bool) -> Self {
        Self::new(Box::new(io::stderr()), color)
    }

    fn emit(&mut self, text: &str) {
        if let Err(error) = self
            .writer
            .write_all(text.as_bytes())
            .and_then(|()| self.writer.flush())
        {
            warn!(%error, "could not write build errors");
        }
    }
}

impl Hook for ErrorEmitterHook {
    fn on_error(&mut self, error: &ApplyError) {
        let text = porter_report::render_build_error(&error.to_string(), self.color);
        self.emit(&text);
    }

    fn on_consolidated_errors(
        &mut self,
        _group: &ResourceGroup,
        errors: &BTreeMap<String, DriverError>,
        _applied: &BTreeSet<String>,
    ) {
        let errors: Vec<(String, String)> = errors
            .iter()
            .map(|(name, error)| (name.clone(), error.to_string()))
            .collect();
        let text = porter_report::render_consolidated_errors(&errors, self.color);
        self.emit(&text);
    }
}
