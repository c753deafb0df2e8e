use serde::{Deserialize, Serialize};

/// Price a runner asks for one job.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the smallest unit of `currency`.
    pub amount: u64,
    pub currency: String,
    /// Settlement protocol (e.g. `lightning`).
    pub protocol: String,
}

impl Price {
    pub fn new(amount: u64, currency: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
            protocol: protocol.into(),
        }
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.amount == 0
    }
}
