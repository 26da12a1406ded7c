//! storage-e2e library crate
//!
//! Fixtures, polling primitives and helpers for Kubernetes persistent
//! storage end-to-end scenarios. Every cluster interaction goes through the
//! `oc`/`kubectl` CLI wrapped by [`cli::Cli`]; fixtures are plain values
//! built from a [`StorageContext`] and submitted from YAML templates.
//!
//! ```no_run
//! use storage_e2e::{PersistentVolumeClaim, StorageClass, StorageContext, SuiteConfig};
//!
//! # async fn scenario() -> storage_e2e::Result<()> {
//! let ctx = StorageContext::detect(&SuiteConfig::from_env()?).await?;
//! let sc = StorageClass::builder(&ctx).build();
//! sc.create(&ctx).await?;
//! let pvc = PersistentVolumeClaim::builder(&ctx)
//!     .storage_class(&sc.name)
//!     .build();
//! pvc.create(&ctx).await?;
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod cleanup;
pub mod cli;
pub mod cloud;
pub mod config;
pub mod context;
pub mod crd;
pub mod error;
pub mod resources;
pub mod telemetry;
pub mod template;
pub mod util;
pub mod wait;

pub use cleanup::CleanupStack;
pub use cli::{Cli, CommandOutput, CommandRunner, ProcessRunner};
pub use cloud::{CloudProvider, CloudVolume, SupportMatrix};
pub use config::SuiteConfig;
pub use context::StorageContext;
pub use error::{Error, Result};
pub use resources::{
    Deployment, Fixture, LocalVolume, LocalVolumeSet, NfsServer, PersistentVolume,
    PersistentVolumeClaim, Pod, PvKind, Service, StorageClass, VolumeType,
};
pub use template::{ExtraParameters, TemplateParams};
pub use wait::{ExpectedState, NotFoundPolicy, PollConfig};
