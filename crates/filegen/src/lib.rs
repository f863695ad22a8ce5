//! Path-addressed file generation.
//!
//! A [`Manager`] maps path prefixes to [`Generator`]s. Requests are routed to
//! the generator with the longest matching prefix, which produces the file's
//! bytes on demand. Generators come from a TOML configuration file (see
//! [`loader`]) or from directory trees registered directly.
//!
//! ```no_run
//! use filegen::{Manager, Request};
//!
//! # async fn example() -> filegen::Result<()> {
//! let manager = Manager::new();
//! manager.register_directory("/srv/files", "/")?;
//!
//! let file = manager.get_file(&Request::new("/etc/motd")).await?;
//! println!("{} bytes", file.data.len());
//! # Ok(())
//! # }
//! ```
//!
//! Configuration changes are applied by restarting the process; see
//! [`ReloadSupervisor`].

pub mod computed;
pub mod error;
pub mod generator;
pub mod loader;
pub mod registry;
pub mod request;
pub mod static_tree;
pub mod supervisor;
pub mod watch;

pub use computed::ComputedGenerator;
pub use error::{FilegenError, Result};
pub use generator::{GeneratedFile, Generator};
pub use loader::{ConfigurationSnapshot, GeneratorEntry, GeneratorKind};
pub use registry::{escape_html, Manager, Registration, RegistrationSummary, StagedRegistration};
pub use request::Request;
pub use static_tree::StaticTreeGenerator;
pub use supervisor::{ExecRestarter, ReloadSupervisor, Restarter, SupervisorState};
pub use watch::{watch_file, watch_file_from, FileEvent, Fingerprint};
