use aufnahme_core::InvalidTransition;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("failed to decode stored row: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
