mod connection;
mod keys;
mod lock;
mod options;
mod pending;
mod redis_backend;

pub use keys::{bucket_of, buckets_in_range, encode_point, EncodedPoint, BUCKET_SIZE, MAX_READ_BUCKETS};
pub use options::*;
pub use redis_backend::*;

cfg_if::cfg_if! {
    if #[cfg(test)] {
    }
}
