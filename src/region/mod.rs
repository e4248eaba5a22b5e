//! Region detection and resolution for browser sessions

pub mod detector;
pub mod report;
pub mod resolver;
pub mod signal;
pub mod strategy;
pub mod target;

pub use report::{ResolutionReport, ResolveState};
pub use resolver::LocationResolver;
pub use signal::{LocationSignal, LocationState, SignalSource};
pub use strategy::{AttemptOutcome, ChangeAttempt, StrategyMethod};
pub use target::{TargetRegion, LOCATION_KEYS, URL_PARAM_KEYS};
