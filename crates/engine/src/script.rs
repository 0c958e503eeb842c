//! Script runner seam
//!
//! The scripting runtime lives outside the ledger. The processor only needs
//! a call that turns `(script, transaction)` into a patch or an error.

use ledger_concurrency::Transaction;
use ledger_core::{ScriptError, TransactionMutableData};

/// Evaluates a transaction's script
///
/// Implementations may be called from several processor threads at once.
/// A panic inside `run` is caught by the processor and treated like an
/// error.
pub trait ScriptRunner: Send + Sync {
    /// Run `script` against `transaction` and propose the next revision
    fn run(
        &self,
        script: &str,
        transaction: &Transaction,
    ) -> Result<TransactionMutableData, ScriptError>;
}

impl<F> ScriptRunner for F
where
    F: Fn(&str, &Transaction) -> Result<TransactionMutableData, ScriptError> + Send + Sync,
{
    fn run(
        &self,
        script: &str,
        transaction: &Transaction,
    ) -> Result<TransactionMutableData, ScriptError> {
        self(script, transaction)
    }
}

/// Runner that fails every script; useful when scripts are not expected
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectingRunner;

impl ScriptRunner for RejectingRunner {
    fn run(
        &self,
        script: &str,
        _transaction: &Transaction,
    ) -> Result<TransactionMutableData, ScriptError> {
        Err(ScriptError::new(format!("no script runtime configured for '{}'", script)))
    }
}
