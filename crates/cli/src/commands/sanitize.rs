//! Sanitize command handler.

use clap::Args;
use gamefi_core::AppResult;
use gamefi_knowledge::{Sanitizer, SanitizerRules};

/// Run a query through the SQL gate without executing it
#[derive(Args, Debug)]
pub struct SanitizeCommand {
    /// Raw query, optionally prefixed with `SQL:`
    pub query: String,
}

impl SanitizeCommand {
    pub fn execute(&self) -> AppResult<()> {
        let gate = Sanitizer::new(SanitizerRules::default())?;
        let query = gate.sanitize(&self.query)?;
        println!("{}", query);
        Ok(())
    }
}
