pub mod browser;
pub mod config;
pub mod error;
pub mod geo;
pub mod region;
pub mod session;

//  Re-export commonly used items
pub use browser::chrome::{ChromeDriver, ConnectionMode};
pub use config::ResolverConfig;
pub use error::BrowserError;
pub use geo::{GeoLookup, GeolocationSettings};
pub use region::{
    AttemptOutcome, ChangeAttempt, LocationResolver, LocationSignal, LocationState,
    ResolutionReport, ResolveState, SignalSource, StrategyMethod, TargetRegion,
};
pub use session::{BrowserSession, Locator, LocatorCandidate, SessionCookie};
