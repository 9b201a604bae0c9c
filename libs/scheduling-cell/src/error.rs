use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulingError {
    #[error("Invalid day key '{0}': expected DD-MM-YYYY")]
    InvalidDayKey(String),

    #[error("Invalid date range: {from} is after {to}")]
    InvalidDateRange { from: String, to: String },

    #[error("Upstream request failed: {0}")]
    Upstream(String),
}
