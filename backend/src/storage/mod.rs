pub mod local_store;
pub mod object_store;
pub mod s3_service;

pub use local_store::LocalObjectStore;
pub use object_store::{ObjectStore, ObjectStoreError, SignedUrl};
pub use s3_service::S3Service;
