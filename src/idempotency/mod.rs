pub mod emitter;
pub mod store;
pub mod store_sqlx;

pub use emitter::IdempotentEmitter;
pub use store::IdempotencyStore;
pub use store_sqlx::SqlxIdempotencyStore;
