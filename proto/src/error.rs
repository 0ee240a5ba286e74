use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterParseError {
    #[error("filter `{0}` is missing `=`")]
    MissingEquals(String),
    #[error("filter `{0}` is missing an operator")]
    MissingOperator(String),
    #[error("unknown filter operator `{0}`")]
    UnknownOperator(String),
    #[error("filter has an empty column name")]
    EmptyColumn,
    #[error("`in` filter value must be a parenthesized list, got `{0}`")]
    InvalidList(String),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid frame: {0}")]
    InvalidFrame(#[from] serde_json::Error),
}
