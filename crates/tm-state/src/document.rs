//! Document: explicit owner of a timeline
//!
//! There is no process-wide "current document". Whoever needs the timeline
//! is handed the document's [`SharedTimeline`] (or a clone of it).

use tm_core::{TimelineConfig, TimelineResult};

use crate::{SharedTimeline, TimeConverter, TimelineSnapshot};

#[derive(Debug)]
pub struct Document {
    name: String,
    timeline: SharedTimeline,
}

impl Document {
    pub fn new(name: &str, config: TimelineConfig) -> TimelineResult<Self> {
        Ok(Self {
            name: name.to_string(),
            timeline: SharedTimeline::new(config)?,
        })
    }

    /// Open a document from saved change lists. The snapshot's tick
    /// resolution replaces the one in `config`.
    pub fn from_snapshot(
        name: &str,
        config: TimelineConfig,
        snapshot: &TimelineSnapshot,
    ) -> TimelineResult<Self> {
        let converter = TimeConverter::from_snapshot(config, snapshot)?;
        log::info!(
            "Opened document '{}' ({} ticks per quarter)",
            name,
            converter.ticks_per_quarter()
        );
        Ok(Self {
            name: name.to_string(),
            timeline: SharedTimeline::from_converter(converter),
        })
    }

    pub fn from_json(name: &str, config: TimelineConfig, json: &str) -> TimelineResult<Self> {
        Self::from_snapshot(name, config, &TimelineSnapshot::from_json(json)?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rename(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn timeline(&self) -> &SharedTimeline {
        &self.timeline
    }

    pub fn to_json(&self) -> TimelineResult<String> {
        self.timeline.snapshot().to_json()
    }

    /// Replace the timeline contents in place; listeners are notified and
    /// existing handles stay valid
    pub fn load_json(&self, json: &str) -> TimelineResult<()> {
        self.timeline.load(&TimelineSnapshot::from_json(json)?)
    }
}
