//! `sim` - Event generator: truth vertices, helical tracks, smeared perigee parameters.

pub mod generator;
pub mod replay;
pub mod scenarios;

pub use generator::{EventGenerator, GeneratorConfig, SimEvent, TruthTrack, TruthVertex};
pub use replay::{load_events, save_events, EventLog};
pub use scenarios::{Scenario, ScenarioKind};
