/// Room, membership, message and verdict persistence.
pub mod debate_store;
/// Database model definitions.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
