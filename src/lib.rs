//! Discovery of macOS authorization surfaces.
//!
//! The core is the System Settings pane catalog (`catalog`): independent
//! sources are read concurrently, reconciled into one deduplicated list and
//! filtered against the host's hardware profile. `checks` gathers the
//! security, system, network and privacy findings that make up the rest of a
//! discovery report, `compare` diffs two stored reports, and `web` serves
//! all of it over a local JSON API.

pub mod catalog;
pub mod checks;
pub mod compare;
pub mod config;
pub mod engine;
pub mod hardware;
pub mod host;
pub mod logging;
pub mod report;
pub mod report_schema;
pub mod web;

pub use catalog::{
    CancelToken, DiscoveryError, DiscoverySettings, PaneCatalogEntry, PaneDiscoverer,
    PaneDiscovery, PaneId, SourceKind,
};
pub use config::Config;
pub use engine::{DiscoveryEngine, ProgressUpdate};
pub use hardware::HardwareCapabilitySet;
pub use host::{CommandOutput, Host, HostError, MemoryHost, SystemHost};
pub use report::{DiscoveryReport, ReportStore};

/// Split a comma- or whitespace-separated list, dropping empty items.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .replace(',', " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_accepts_commas_and_spaces() {
        assert_eq!(
            split_list("/Library/PreferencePanes, ~/x  /y,,"),
            vec!["/Library/PreferencePanes", "~/x", "/y"]
        );
        assert!(split_list(" , ").is_empty());
    }
}
