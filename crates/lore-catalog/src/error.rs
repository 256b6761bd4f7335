#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate unit id: {0}")]
    DuplicateId(String),

    #[error("proposed triggers already covered by unit '{unit_id}'")]
    DuplicateCoverage { unit_id: String },

    #[error("proposed body too small: {len} bytes (minimum {min})")]
    ScopeTooNarrow { len: usize, min: usize },

    #[error("proposed body too large: {len} bytes (maximum {max})")]
    ScopeTooBroad { len: usize, max: usize },

    #[error("full-content budget exceeded: {requested} units requested, at most {max} allowed")]
    BudgetExceeded { requested: usize, max: usize },

    #[error("registry version changed: expected {expected}, found {actual}")]
    ConcurrentModification { expected: u64, actual: u64 },

    #[error("invalid unit: {0}")]
    Invalid(String),
}
