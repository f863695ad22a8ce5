//! Content-addressed object cache for filegen.
//!
//! Files are keyed by the SHA-512 digest of their bytes, so identical content
//! is stored exactly once no matter what it was called or where it came from.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use objectcache::{ObjectCache, ObjectStore};
//! use std::path::Path;
//!
//! let cache = ObjectCache::at_path("/var/lib/filegen/objectcache").unwrap();
//!
//! // Move an existing file into the cache
//! let digest = cache.insert(Path::new("/tmp/build/output.tar")).unwrap();
//! println!("cached as {}", digest);
//!
//! // Or store bytes directly
//! let digest = cache.store(b"hello\n").unwrap();
//! assert!(cache.exists(&digest));
//! ```
//!
//! # Concurrency
//!
//! - Objects are write-once; an existing object is never rewritten
//! - Inserting the same content concurrently races to the same result
//! - No locking required

pub mod config;
pub mod hash;
pub mod remediation;
pub mod store;

pub use config::CacheConfig;
pub use hash::{Digest, HashError, DIGEST_LEN};
pub use remediation::{ClearImmutable, NoRemediation, Remediation};
pub use store::{ObjectCache, ObjectStore};
