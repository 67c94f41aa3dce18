use anyhow::Result;

/// Every background loop is joined on one thread, so shared state only needs short-lived locks.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
