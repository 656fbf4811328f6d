/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Debate adjudication backends.
pub mod judge;
/// Bounded background queue for judgment jobs.
pub mod judgment_pool;
/// Verdict pipeline, interim scoring and verdict lookup.
pub mod judgment_service;
mod membership;
/// Sending and listing debate messages.
pub mod message_service;
/// Incremental room refresh backed by the cache.
pub mod poll_service;
/// Room creation, joining and the exit workflow.
pub mod room_service;

#[cfg(test)]
mod test_support;
