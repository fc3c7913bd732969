use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    /// Rejected before any random draw is made.
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("balance overflowed to a non-finite value in trial {trial}, year {year}")]
    NumericOverflow { trial: u32, year: u32 },
    /// Every balance was finite but an aggregate over them was not.
    #[error("final-balance {statistic} overflowed to a non-finite value")]
    SummaryOverflow { statistic: &'static str },
}

impl SimulationError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_parameter_message_names_the_field() {
        let err = SimulationError::invalid("annual_volatility", "must be >= 0");
        assert_eq!(
            err.to_string(),
            "invalid parameter 'annual_volatility': must be >= 0"
        );
    }

    #[test]
    fn overflow_message_locates_the_trial_year() {
        let err = SimulationError::NumericOverflow { trial: 3, year: 12 };
        assert!(err.to_string().contains("trial 3, year 12"));
    }

    #[test]
    fn summary_overflow_message_names_the_statistic() {
        let err = SimulationError::SummaryOverflow { statistic: "std_dev" };
        assert_eq!(
            err.to_string(),
            "final-balance std_dev overflowed to a non-finite value"
        );
    }
}
