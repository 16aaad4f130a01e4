pub mod bucket;
pub mod s3;
pub mod store;
pub mod transfer;

pub use bucket::BucketProfile;
pub use s3::S3ObjectStore;
pub use store::{FsObjectStore, MemoryObjectStore, ObjectStore, StoreError};
pub use transfer::Uploader;
