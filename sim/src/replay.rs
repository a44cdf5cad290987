//! Replay: serialize/deserialize generated events for offline refits.

use crate::generator::{GeneratorConfig, SimEvent};
use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// A recorded set of events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    pub scenario_name: String,
    pub seed: u64,
    /// Generator settings; the field used to fit must match `generator.bz`
    pub generator: GeneratorConfig,
    pub events: Vec<SimEvent>,
}

/// Save an event log to a JSON file.
pub fn save_events(log: &EventLog, path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, log)?;
    Ok(())
}

/// Load an event log from a JSON file.
pub fn load_events(path: &Path) -> anyhow::Result<EventLog> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let log: EventLog = serde_json::from_reader(reader)?;
    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::EventGenerator;

    #[test]
    fn log_survives_disk() {
        let generator = GeneratorConfig { mean_multiplicity: 5.0, ..Default::default() };
        let mut gen = EventGenerator::new(generator.clone(), 9);
        let log = EventLog {
            scenario_name: "test".into(),
            seed: 9,
            generator,
            events: vec![gen.generate(), gen.generate()],
        };
        let path = std::env::temp_dir().join(format!("vtx_event_log_{}.json", std::process::id()));
        save_events(&log, &path).unwrap();
        let loaded = load_events(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.events.len(), 2);
        assert_eq!(loaded.events[0].vertices, log.events[0].vertices);
        assert_eq!(loaded.events[1].tracks.len(), log.events[1].tracks.len());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_events(Path::new("/nonexistent/vtx_events.json")).is_err());
    }
}
