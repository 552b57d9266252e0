#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("session store error: {0:#}")]
    Sessions(anyhow::Error),

    #[error("catalog error: {0:#}")]
    Catalog(anyhow::Error),

    #[error("failed to deliver reply to {customer_id}: {error:#}")]
    Delivery {
        customer_id: String,
        error: anyhow::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
