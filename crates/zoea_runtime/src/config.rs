//! Runtime configuration for the swarm.

use std::time::Duration;

/// Tunables for the Commander and every mysis it runs.
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// Fleet capacity; CreateMysis is rejected beyond this.
    pub max_myses: usize,
    /// Upper bound on provider rounds within one turn.
    pub max_tool_iterations: usize,
    /// How many recent memories the composer may see.
    pub max_context_messages: usize,
    /// Synthetic-encouragement turns before a mysis goes idle.
    pub autonomous_turn_limit: u32,
    /// Delay between autonomous turns.
    pub turn_delay: Duration,
    /// How long Stop waits for an in-flight turn.
    pub stop_timeout: Duration,
    /// Fleet-wide bound on StopAll.
    pub stop_all_timeout: Duration,
    /// Bound on blocking event publication.
    pub publish_timeout: Duration,
    /// How long a restart waits for the previous run loop to drain.
    pub drain_timeout: Duration,
    /// Minimum per-subscriber event queue length.
    pub subscriber_buffer: usize,
    /// The synthetic user prompt inserted when a mysis has nothing to do.
    pub encouragement: String,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            max_myses: 16,
            max_tool_iterations: 10,
            max_context_messages: 20,
            autonomous_turn_limit: 3,
            turn_delay: Duration::from_secs(2),
            stop_timeout: Duration::from_secs(5),
            stop_all_timeout: Duration::from_secs(10),
            publish_timeout: Duration::from_secs(1),
            drain_timeout: Duration::from_secs(3),
            subscriber_buffer: 64,
            encouragement: "Continue working toward your goals. Check your surroundings and \
                            decide on your next action."
                .to_string(),
        }
    }
}

impl SwarmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_myses(mut self, max: usize) -> Self {
        self.max_myses = max;
        self
    }

    pub fn with_max_tool_iterations(mut self, max: usize) -> Self {
        self.max_tool_iterations = max;
        self
    }

    pub fn with_max_context_messages(mut self, max: usize) -> Self {
        self.max_context_messages = max;
        self
    }

    pub fn with_autonomous_turn_limit(mut self, limit: u32) -> Self {
        self.autonomous_turn_limit = limit;
        self
    }

    pub fn with_turn_delay(mut self, delay: Duration) -> Self {
        self.turn_delay = delay;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn with_stop_all_timeout(mut self, timeout: Duration) -> Self {
        self.stop_all_timeout = timeout;
        self
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    pub fn with_encouragement(mut self, text: impl Into<String>) -> Self {
        self.encouragement = text.into();
        self
    }

    /// Load configuration from `ZOEA_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(val) = env_usize("ZOEA_MAX_MYSES") {
            config.max_myses = val;
        }
        if let Some(val) = env_usize("ZOEA_MAX_TOOL_ITERATIONS") {
            config.max_tool_iterations = val;
        }
        if let Some(val) = env_usize("ZOEA_MAX_CONTEXT_MESSAGES") {
            config.max_context_messages = val;
        }
        if let Some(val) = env_usize("ZOEA_AUTONOMOUS_TURN_LIMIT") {
            config.autonomous_turn_limit = val as u32;
        }
        if let Some(val) = env_usize("ZOEA_TURN_DELAY_MS") {
            config.turn_delay = Duration::from_millis(val as u64);
        }
        if let Ok(text) = std::env::var("ZOEA_ENCOURAGEMENT") {
            if !text.is_empty() {
                config.encouragement = text;
            }
        }

        config
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
