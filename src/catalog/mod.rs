//! System Settings pane catalog.
//!
//! Readers in [`sources`] turn the sidebar manifest, the preference-pane
//! directories, and the embedded fallback table into `PaneCandidate`s. The
//! [`reconcile`] module merges them into unique `PaneCatalogEntry`s against a
//! hardware snapshot, and [`discovery`] runs the whole thing once per call.

pub mod discovery;
pub mod identity;
pub mod model;
pub mod reconcile;
pub mod sources;
pub mod strategy;
pub mod tables;

pub use discovery::{
    CancelToken, DiscoveryError, DiscoverySettings, PaneDiscoverer, PaneDiscovery,
};
pub use identity::{CapabilityTag, PaneId, SourceKind};
pub use model::{
    DiscoveryIssue, DiscoverySummary, FailureReason, IssueKind, PaneCandidate, PaneCatalogEntry,
    SourceFailure, SourceRead,
};
pub use reconcile::{PaneReconciler, VisibilityPolicy};
pub use sources::{
    ExtensionManifestReader, ExtraRequirements, LegacyDirectoryReader, PaneSource,
    StaticFallbackReader,
};
pub use strategy::{OsVersion, VersionStrategy};
