use async_trait::async_trait;
use mterm_core::error::Result;
use mterm_core::interpreter::{Interpreter, ResolvedCommand, SessionContext};
use std::sync::Arc;

/// Tries `primary`, then `secondary` when the primary cannot interpret.
pub struct FallbackInterpreter {
    primary: Arc<dyn Interpreter>,
    secondary: Arc<dyn Interpreter>,
    name: String,
}

impl FallbackInterpreter {
    pub fn new(primary: Arc<dyn Interpreter>, secondary: Arc<dyn Interpreter>) -> Self {
        let name = format!("{}+{}", primary.name(), secondary.name());
        Self {
            primary,
            secondary,
            name,
        }
    }
}

#[async_trait]
impl Interpreter for FallbackInterpreter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn interpret(&self, text: &str, context: &SessionContext) -> Result<ResolvedCommand> {
        match self.primary.interpret(text, context).await {
            Ok(resolved) => Ok(resolved),
            Err(err) => {
                tracing::warn!(
                    "[FallbackInterpreter] {} failed ({}); trying {}",
                    self.primary.name(),
                    err,
                    self.secondary.name()
                );
                self.secondary.interpret(text, context).await
            }
        }
    }

    async fn converse(&self, text: &str, context: &SessionContext) -> Result<String> {
        match self.primary.converse(text, context).await {
            Ok(reply) => Ok(reply),
            Err(err) => {
                tracing::debug!(
                    "[FallbackInterpreter] {} cannot converse: {}",
                    self.primary.name(),
                    err
                );
                self.secondary.converse(text, context).await
            }
        }
    }
}
