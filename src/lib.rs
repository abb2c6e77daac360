mod config;
mod debounce;
mod error;
mod events;
mod ingest;
mod paths;
mod resolver;
mod rules;
mod stability;
mod template;
mod watcher;

pub use config::{load_rules, write_sample_rules, RuleRecord, RulesDocument, WatcherConfig};
pub use debounce::Debouncer;
pub use error::{Result, SorterError};
pub use events::{EventType, ProcessingOutcome, ReportKind, SortReport};
pub use ingest::{Ingestor, TEMP_PREFIX};
pub use paths::{normalize_path, paths_equal};
pub use resolver::{DestinationIndex, EpisodeResolver};
pub use rules::{find_matching_rule, Rule, RuleSet};
pub use stability::{StabilityGate, StabilityState, WatchedFile};
pub use template::{NameTemplate, ParsedName};
pub use watcher::{start, WatcherHandle};
