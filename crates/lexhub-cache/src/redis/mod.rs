//! Redis store and pub/sub broker.

pub mod client;
pub mod operations;
pub mod pubsub;

pub use client::RedisClient;
pub use operations::RedisStore;
pub use pubsub::RedisPubSub;
