pub mod clear_attempts;
pub mod server;

// Internal "interpreter" for `Action`, kept apart so `mod.rs` stays small.
mod run;

#[derive(Debug)]
pub enum Action {
    Server(server::Args),
    ClearAttempts(clear_attempts::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
