use serde::{Deserialize, Serialize};

use crate::{PylonError, Result};

/// Runtime bounds for the pipeline.
///
/// These are **safety bounds**, not economic parameters: they cap memory and per-block work so
/// a single block can never be asked to settle or pay out an unbounded number of entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeBounds {
    pub max_pending_executions: usize,
    pub max_coin_inputs_per_recipe: usize,
    pub max_stakers: usize,
}

impl RuntimeBounds {
    pub const HARD_MAX_PENDING_EXECUTIONS: usize = 10_000_000;
    pub const HARD_MAX_COIN_INPUTS_PER_RECIPE: usize = 256;
    pub const HARD_MAX_STAKERS: usize = 5_000_000;

    pub const DEFAULT_MAX_PENDING_EXECUTIONS: usize = 1_000_000;
    pub const DEFAULT_MAX_COIN_INPUTS_PER_RECIPE: usize = 16;
    pub const DEFAULT_MAX_STAKERS: usize = 500_000;

    pub fn new(
        max_pending_executions: usize,
        max_coin_inputs_per_recipe: usize,
        max_stakers: usize,
    ) -> Result<Self> {
        let b = RuntimeBounds {
            max_pending_executions,
            max_coin_inputs_per_recipe,
            max_stakers,
        };
        b.validate()?;
        Ok(b)
    }

    pub fn validate(self) -> Result<()> {
        check(
            "max_pending_executions",
            self.max_pending_executions,
            Self::HARD_MAX_PENDING_EXECUTIONS,
        )?;
        check(
            "max_coin_inputs_per_recipe",
            self.max_coin_inputs_per_recipe,
            Self::HARD_MAX_COIN_INPUTS_PER_RECIPE,
        )?;
        check("max_stakers", self.max_stakers, Self::HARD_MAX_STAKERS)?;
        Ok(())
    }
}

fn check(name: &str, value: usize, hard_max: usize) -> Result<()> {
    if value == 0 || value > hard_max {
        return Err(PylonError::InvalidInput(format!(
            "{name} out of bounds: {value} (allowed 1..={hard_max})"
        )));
    }
    Ok(())
}

impl Default for RuntimeBounds {
    fn default() -> Self {
        Self {
            max_pending_executions: Self::DEFAULT_MAX_PENDING_EXECUTIONS,
            max_coin_inputs_per_recipe: Self::DEFAULT_MAX_COIN_INPUTS_PER_RECIPE,
            max_stakers: Self::DEFAULT_MAX_STAKERS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(RuntimeBounds::default().validate().is_ok());
    }

    #[test]
    fn zero_and_above_hard_max_rejected() {
        assert!(RuntimeBounds::new(0, 1, 1).is_err());
        let too_many_inputs = RuntimeBounds::HARD_MAX_COIN_INPUTS_PER_RECIPE + 1;
        assert!(RuntimeBounds::new(1, too_many_inputs, 1).is_err());
        assert!(RuntimeBounds::new(1, 1, RuntimeBounds::HARD_MAX_STAKERS + 1).is_err());
        assert!(RuntimeBounds::new(1, 1, 1).is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let b: RuntimeBounds = serde_json::from_str(r#"{"max_stakers": 10}"#).unwrap();
        assert_eq!(b.max_stakers, 10);
        assert_eq!(
            b.max_pending_executions,
            RuntimeBounds::DEFAULT_MAX_PENDING_EXECUTIONS
        );
    }
}
