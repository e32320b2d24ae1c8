//! Base trait for long-running pipeline tasks.
//!
//! Pumps, the pipeline assembler and the application implement this trait so
//! they can be driven and spawned uniformly on the runtime.

/// Trait for executing pipeline tasks asynchronously.
pub trait Runner {
    /// Error type for task execution failures.
    type Error;
    /// Value produced when the task completes.
    type Output;

    /// Executes the task until completion or error.
    ///
    /// # Returns
    /// The task output or an error if the task execution fails
    fn run(self) -> impl std::future::Future<Output = Result<Self::Output, Self::Error>> + Send
    where
        Self: Sized;
}
