//! Activity inference from tool-result payloads.
//!
//! Game tools report server ticks, travel arrivals and cooldowns somewhere
//! inside their JSON results. The tracker scrapes those keys (recursively,
//! with wrapper keys searched first), keeps a running estimate of wall-clock
//! seconds per server tick, and derives a wait deadline. While a mysis is
//! traveling or cooling down, the run loop withholds the synthetic
//! encouragement.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;

/// Default seconds per server tick until two observations refine it.
const DEFAULT_TICK_SECS: f64 = 30.0;

/// Wait applied when only a fractional travel_progress is known.
const FALLBACK_TRAVEL_SECS: f64 = 60.0;

/// Wrapper keys descended before any other nested value.
const WRAPPER_KEYS: [&str; 4] = ["data", "result", "payload", "response"];

const TICK_KEYS: [&str; 2] = ["current_tick", "tick"];
const ARRIVAL_KEYS: [&str; 2] = ["arrival_tick", "travel_arrival_tick"];
const COOLDOWN_KEYS: [&str; 2] = ["cooldown_ticks", "cooldown_remaining"];

/// What a mysis is doing right now, for operator display and nudge gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Idle,
    Traveling { until_ms: i64 },
    Cooldown { until_ms: i64 },
    LlmCall,
    McpCall,
}

impl Activity {
    pub fn label(&self) -> &'static str {
        match self {
            Activity::Idle => "idle",
            Activity::Traveling { .. } => "traveling",
            Activity::Cooldown { .. } => "cooldown",
            Activity::LlmCall => "llm_call",
            Activity::McpCall => "mcp_call",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitKind {
    Traveling,
    Cooldown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallKind {
    Llm,
    Mcp,
}

#[derive(Debug, Default)]
pub struct ActivityTracker {
    last_server_tick: u64,
    tick_secs: Option<f64>,
    last_tick_at: Option<DateTime<Utc>>,
    wait: Option<(WaitKind, DateTime<Utc>)>,
    call: Option<CallKind>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_server_tick(&self) -> u64 {
        self.last_server_tick
    }

    /// Estimated seconds per server tick.
    pub fn tick_secs(&self) -> f64 {
        self.tick_secs.unwrap_or(DEFAULT_TICK_SECS)
    }

    /// Scrape a tool-result payload. Non-JSON payloads are ignored.
    pub fn observe_tool_result(&mut self, payload: &str) {
        self.observe_at(payload, Utc::now());
    }

    pub(crate) fn observe_at(&mut self, payload: &str, now: DateTime<Utc>) {
        let Ok(value) = serde_json::from_str::<Value>(payload) else {
            return;
        };

        if let Some(tick) = find_number(&value, &TICK_KEYS) {
            self.note_tick(tick as u64, now);
        }

        if let Some(arrival) = find_number(&value, &ARRIVAL_KEYS) {
            let arrival = arrival as u64;
            if arrival > self.last_server_tick {
                let ticks_left = (arrival - self.last_server_tick) as f64;
                let until = now + secs(ticks_left * self.tick_secs());
                self.wait = Some((WaitKind::Traveling, until));
            } else {
                self.wait = None;
            }
        }

        if let Some(progress) = find_number(&value, &["travel_progress"]) {
            if progress >= 1.0 {
                self.wait = None;
            } else if progress > 0.0 {
                self.wait = Some((WaitKind::Traveling, now + secs(FALLBACK_TRAVEL_SECS)));
            }
        }

        if let Some(cooldown) = find_number(&value, &COOLDOWN_KEYS) {
            if cooldown > 0.0 {
                let until = now + secs(cooldown * self.tick_secs());
                self.wait = Some((WaitKind::Cooldown, until));
            }
        }
    }

    /// Update the tick counter and refine the seconds-per-tick estimate from
    /// the wall-clock delta between two observations.
    fn note_tick(&mut self, tick: u64, now: DateTime<Utc>) {
        if let Some(prev_at) = self.last_tick_at {
            if tick > self.last_server_tick {
                let elapsed = (now - prev_at).num_milliseconds() as f64 / 1000.0;
                let sample = elapsed / (tick - self.last_server_tick) as f64;
                if sample > 0.0 {
                    self.tick_secs = Some(match self.tick_secs {
                        Some(old) => (old + sample) / 2.0,
                        None => sample,
                    });
                }
            }
        }
        if tick >= self.last_server_tick {
            self.last_server_tick = tick;
            self.last_tick_at = Some(now);
        }
    }

    pub fn begin_llm_call(&mut self) {
        self.call = Some(CallKind::Llm);
    }

    pub fn begin_mcp_call(&mut self) {
        self.call = Some(CallKind::Mcp);
    }

    pub fn end_call(&mut self) {
        self.call = None;
    }

    /// True while a travel/cooldown deadline is in the future; the run loop
    /// withholds synthetic encouragements for as long as this holds.
    pub fn is_waiting(&self) -> bool {
        self.is_waiting_at(Utc::now())
    }

    pub(crate) fn is_waiting_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.wait, Some((_, until)) if until > now)
    }

    pub fn current(&self) -> Activity {
        self.current_at(Utc::now())
    }

    pub(crate) fn current_at(&self, now: DateTime<Utc>) -> Activity {
        match self.call {
            Some(CallKind::Llm) => return Activity::LlmCall,
            Some(CallKind::Mcp) => return Activity::McpCall,
            None => {}
        }
        match self.wait {
            Some((WaitKind::Traveling, until)) if until > now => Activity::Traveling {
                until_ms: until.timestamp_millis(),
            },
            Some((WaitKind::Cooldown, until)) if until > now => Activity::Cooldown {
                until_ms: until.timestamp_millis(),
            },
            _ => Activity::Idle,
        }
    }
}

fn secs(s: f64) -> ChronoDuration {
    ChronoDuration::milliseconds((s * 1000.0) as i64)
}

/// Search for the first of `keys` in a JSON value. Direct keys win, then
/// wrapper keys are descended in priority order, then everything else.
fn find_number(value: &Value, keys: &[&str]) -> Option<f64> {
    match value {
        Value::Object(obj) => {
            for key in keys {
                if let Some(n) = obj.get(*key).and_then(Value::as_f64) {
                    return Some(n);
                }
            }
            for wrapper in WRAPPER_KEYS {
                if let Some(inner) = obj.get(wrapper) {
                    if let Some(n) = find_number(inner, keys) {
                        return Some(n);
                    }
                }
            }
            for (key, inner) in obj {
                if WRAPPER_KEYS.contains(&key.as_str()) {
                    continue;
                }
                if inner.is_object() || inner.is_array() {
                    if let Some(n) = find_number(inner, keys) {
                        return Some(n);
                    }
                }
            }
            None
        }
        Value::Array(items) => items.iter().find_map(|v| find_number(v, keys)),
        _ => None,
    }
}
