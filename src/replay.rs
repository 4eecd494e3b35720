//! Event script replay
//!
//! A script is JSON Lines, one record per line, replayed through an
//! [`InputService`] on a virtual clock. Before each record the clock is
//! advanced to the record's time and due timers fire, so hold timers,
//! sequence windows and repeat-key replays behave as they would live.
//!
//! ```text
//! {"type":"key","time_us":0,"code":18,"action":"down"}
//! {"type":"touch","time_us":10000,"pointer_id":0,"action":"down","x":120.0,"y":300.0}
//! {"type":"frame","time_us":16000}
//! {"type":"screen","time_us":20000,"status":"locked"}
//! {"type":"flag","time_us":20000,"key":"screenshot_enabled","value":false}
//! {"type":"tap3","time_us":30000}
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::dispatch::{LaunchRequest, RecordingDispatcher};
use crate::engine::ScreenStatus;
use crate::input::error::{InputError, Result};
use crate::input::events::{KeyAction, KeyCode, PointerAction, PointerEvent, Timestamp, ToolType};
use crate::input::keyboard::KeyboardState;
use crate::input::touch::TouchState;
use crate::service::{InputService, ServiceEvent, ServiceOutput, ServiceStats};
use crate::timer::ManualTimerService;

/// One line of an event script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptRecord {
    Key {
        time_us: Timestamp,
        code: KeyCode,
        action: KeyAction,
    },
    Touch {
        time_us: Timestamp,
        pointer_id: i32,
        action: PointerAction,
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
        #[serde(default)]
        tool: ToolType,
    },
    Frame {
        time_us: Timestamp,
    },
    Screen {
        time_us: Timestamp,
        status: ScreenStatus,
    },
    Flag {
        time_us: Timestamp,
        key: String,
        value: bool,
    },
    /// Touchpad three-finger tap
    Tap3 {
        time_us: Timestamp,
    },
}

impl ScriptRecord {
    pub fn time_us(&self) -> Timestamp {
        match self {
            Self::Key { time_us, .. }
            | Self::Touch { time_us, .. }
            | Self::Frame { time_us }
            | Self::Screen { time_us, .. }
            | Self::Flag { time_us, .. }
            | Self::Tap3 { time_us } => *time_us,
        }
    }
}

/// Parse a JSON Lines script
pub fn parse_script(content: &str) -> Result<Vec<ScriptRecord>> {
    content
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(number, line)| {
            serde_json::from_str(line)
                .map_err(|e| InputError::InvalidParameter(format!("script line {number}: {e}")))
        })
        .collect()
}

/// Everything a replay produced
#[derive(Debug, Clone, Default)]
pub struct ReplayReport {
    pub records: usize,
    /// Records whose time precedes the virtual clock
    pub late_records: usize,
    pub outputs: Vec<ServiceOutput>,
    pub launches: Vec<LaunchRequest>,
    pub stats: ServiceStats,
}

/// Replays scripts through a service on a virtual clock
pub struct ScriptRunner {
    service: InputService<ManualTimerService>,
    dispatcher: Arc<RecordingDispatcher>,
    keyboard: KeyboardState,
    touch: TouchState,
}

impl ScriptRunner {
    /// Wrap a service whose dispatcher is `dispatcher`
    pub fn new(service: InputService<ManualTimerService>, dispatcher: Arc<RecordingDispatcher>) -> Self {
        Self {
            service,
            dispatcher,
            keyboard: KeyboardState::new(),
            touch: TouchState::new(),
        }
    }

    pub fn service(&self) -> &InputService<ManualTimerService> {
        &self.service
    }

    /// Replay every record, then let pending timers run out
    pub fn run(&mut self, records: &[ScriptRecord]) -> ReplayReport {
        let mut report = ReplayReport::default();

        for record in records {
            let now_ms = self.service.timers().now_ms();
            let record_ms = record.time_us().max(0) as u64 / 1000;
            if record_ms < now_ms {
                warn!(
                    "Record at {}us is behind the virtual clock ({}ms)",
                    record.time_us(),
                    now_ms
                );
                report.late_records += 1;
            } else {
                report.outputs.extend(self.service.advance_to(record_ms));
            }

            if let Some(event) = self.to_event(record) {
                report.outputs.extend(self.service.process(event));
            }
            report.records += 1;
        }

        while let Some(deadline) = self.service.timers().next_deadline() {
            report.outputs.extend(self.service.advance_to(deadline));
        }

        report.launches = self.dispatcher.take();
        report.stats = self.service.stats();
        debug!(
            "Replayed {} records: {} outputs, {} launches",
            report.records,
            report.outputs.len(),
            report.launches.len()
        );
        report
    }

    fn to_event(&mut self, record: &ScriptRecord) -> Option<ServiceEvent> {
        let event = match record {
            ScriptRecord::Key {
                time_us,
                code,
                action,
            } => ServiceEvent::Key(match action {
                KeyAction::Down => self.keyboard.handle_key_down(*code, *time_us),
                KeyAction::Up => self.keyboard.handle_key_up(*code, *time_us),
                KeyAction::Cancel => self.keyboard.handle_key_cancel(*code, *time_us),
            }),
            ScriptRecord::Touch {
                time_us,
                pointer_id,
                action,
                x,
                y,
                tool,
            } => {
                let event = match action {
                    PointerAction::Down => {
                        Some(self.touch.handle_down(*pointer_id, *x, *y, *tool, *time_us))
                    }
                    PointerAction::Move => self.touch.handle_move(*pointer_id, *x, *y, *time_us),
                    PointerAction::Up => self.touch.handle_up(*pointer_id, *x, *y, *time_us),
                    PointerAction::Cancel => self.touch.handle_cancel(*pointer_id, *time_us),
                    PointerAction::TripleTap => {
                        Some(PointerEvent::new(*pointer_id, PointerAction::TripleTap, *time_us))
                    }
                };
                match event {
                    Some(event) if event.action == PointerAction::TripleTap => {
                        ServiceEvent::Pointer(event)
                    }
                    Some(event) => ServiceEvent::Touch(event),
                    None => {
                        warn!("Touch record for untracked pointer {}", pointer_id);
                        return None;
                    }
                }
            }
            ScriptRecord::Frame { time_us } => ServiceEvent::Frame {
                frame_time: *time_us,
            },
            ScriptRecord::Screen { status, .. } => ServiceEvent::ScreenStatus(*status),
            ScriptRecord::Flag { key, value, .. } => ServiceEvent::ConfigChanged {
                key: key.clone(),
                value: *value,
            },
            ScriptRecord::Tap3 { time_us } => {
                ServiceEvent::Pointer(PointerEvent::new(0, PointerAction::TripleTap, *time_us))
            }
        };
        Some(event)
    }
}
