use crate::error::{IapError, Result};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Caller initializes purchasing with the loaded catalog.
    Initialize,
    /// Store reports initialization success.
    InitOk,
    /// Store reports initialization failure; detail is the reason.
    InitFail,
    /// Caller buys `product`; detail `auto` enables auto-confirm.
    Purchase,
    /// Store completes a transaction for `product`; detail is the transaction id.
    Approve,
    /// Store fails a transaction for `product`; detail is the reason.
    Decline,
    Restore,
    RestoreOk,
    /// Store fails the restore; detail is the message.
    RestoreFail,
    Price,
    Currency,
    Dispose,
    /// Sleeps for `detail` milliseconds.
    Wait,
}

/// One line of a scenario script: `action, product, detail`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct ScriptStep {
    pub action: Action,
    pub product: Option<String>,
    pub detail: Option<String>,
}

impl ScriptStep {
    pub fn require_product(&self) -> Result<&str> {
        self.product.as_deref().ok_or_else(|| {
            IapError::ScriptError(format!("{:?} needs a product", self.action))
        })
    }

    pub fn require_detail(&self) -> Result<&str> {
        self.detail.as_deref().ok_or_else(|| {
            IapError::ScriptError(format!("{:?} needs a detail", self.action))
        })
    }
}

/// Reads scenario steps from CSV, lazily and line by line.
pub struct ScriptReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> ScriptReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn steps(self) -> impl Iterator<Item = Result<ScriptStep>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(IapError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_valid_stream() {
        let data = "action, product, detail\ninitialize, ,\npurchase, coin_100, auto\napprove, coin_100, T1";
        let steps: Vec<Result<ScriptStep>> = ScriptReader::new(data.as_bytes()).steps().collect();

        assert_eq!(steps.len(), 3);
        let purchase = steps[1].as_ref().unwrap();
        assert_eq!(purchase.action, Action::Purchase);
        assert_eq!(purchase.product.as_deref(), Some("coin_100"));
        assert_eq!(purchase.detail.as_deref(), Some("auto"));
        assert_eq!(steps[0].as_ref().unwrap().product, None);
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = "action, product, detail\nteleport, coin_100,";
        let steps: Vec<Result<ScriptStep>> = ScriptReader::new(data.as_bytes()).steps().collect();
        assert!(steps[0].is_err());
    }

    #[test]
    fn test_missing_fields_are_reported() {
        let step = ScriptStep {
            action: Action::Approve,
            product: None,
            detail: None,
        };
        assert!(matches!(step.require_product(), Err(IapError::ScriptError(_))));
        assert!(matches!(step.require_detail(), Err(IapError::ScriptError(_))));
    }
}
