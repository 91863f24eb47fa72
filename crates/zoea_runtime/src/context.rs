//! Context composition — the bounded message list sent to the LLM each turn.
//!
//! The composed list is `[system?] + [historical, compressed] + [current
//! turn, uncompressed]`. History older than the current turn is compressed
//! to the latest tool loop; repeated snapshot-tool results are compacted to
//! the newest; anything that would break tool-call/result pairing is
//! stripped, because downstream chat APIs reject unpaired messages.

use tracing::warn;

use zoea_core::{
    is_tool_call_content, parse_tool_calls, parse_tool_result, Memory, MemoryRole, MemorySource,
};
use zoea_llms::ChatMessage;

/// Read-only tools whose results are point-in-time snapshots; only the
/// newest result per tool is worth sending.
const SNAPSHOT_TOOLS: [&str; 2] = ["zoea_swarm_status", "zoea_list_myses"];

fn is_snapshot_tool(name: &str) -> bool {
    name.starts_with("get_") || SNAPSHOT_TOOLS.contains(&name)
}

/// The composer's output.
#[derive(Debug)]
pub struct ComposedContext {
    pub messages: Vec<ChatMessage>,
    /// True when a synthetic encouragement had to be inserted.
    pub added_synthetic: bool,
    /// False when there was nothing to prompt the model with (the turn is
    /// skipped).
    pub has_prompt: bool,
}

/// Compose the message list for one turn.
///
/// `recent_newest_first` is the bounded window from the store (newest
/// first). `latest_broadcast` is consulted only when the window holds no
/// prompt. The synthetic encouragement is in-memory only and never
/// persisted.
pub fn compose(
    system: Option<&Memory>,
    recent_newest_first: &[Memory],
    latest_broadcast: impl FnOnce() -> Option<Memory>,
    allow_synthetic: bool,
    encouragement: &str,
) -> ComposedContext {
    // Chronological window, without persona rows (the system memory is
    // prepended separately).
    let mut window: Vec<Memory> = recent_newest_first
        .iter()
        .rev()
        .filter(|m| m.role != MemoryRole::System)
        .cloned()
        .collect();

    let boundary = window.iter().rposition(Memory::is_prompt);

    let mut added_synthetic = false;
    let mut has_prompt = true;

    let mut composed: Vec<Memory> = match boundary {
        Some(idx) => {
            let current = window.split_off(idx);
            let mut list = latest_tool_loop(&window);
            list.extend(current);
            list
        }
        None => {
            let mut list = latest_tool_loop(&window);
            if let Some(broadcast) = latest_broadcast() {
                list.push(broadcast);
            } else if allow_synthetic {
                let mysis_id = recent_newest_first
                    .first()
                    .map(|m| m.mysis_id.clone())
                    .unwrap_or_default();
                list.push(Memory::user(mysis_id, MemorySource::System, encouragement));
                added_synthetic = true;
            } else {
                has_prompt = false;
            }
            list
        }
    };

    compact_snapshots(&mut composed);
    remove_orphans(&mut composed);

    let mut messages = Vec::with_capacity(composed.len() + 1);
    if let Some(system) = system {
        messages.push(ChatMessage::system(system.content.clone()));
    }
    for memory in &composed {
        if let Some(message) = memory_to_message(memory) {
            messages.push(message);
        }
    }

    ComposedContext {
        messages,
        added_synthetic,
        has_prompt,
    }
}

/// Extract the most recent complete tool loop: the newest assistant memory
/// encoding tool calls, followed by its run of tool-role memories.
fn latest_tool_loop(memories: &[Memory]) -> Vec<Memory> {
    let Some(call_idx) = memories
        .iter()
        .rposition(|m| m.role == MemoryRole::Assistant && is_tool_call_content(&m.content))
    else {
        return Vec::new();
    };

    let mut block = vec![memories[call_idx].clone()];
    for memory in &memories[call_idx + 1..] {
        if memory.role != MemoryRole::Tool {
            break;
        }
        block.push(memory.clone());
    }
    block
}

/// Keep only the newest result per snapshot tool. Ids resolve to tool names
/// through the assistant tool-call memories present in the list.
fn compact_snapshots(memories: &mut Vec<Memory>) {
    let mut id_to_tool = std::collections::HashMap::new();
    for memory in memories.iter() {
        if memory.role == MemoryRole::Assistant {
            if let Some(calls) = parse_tool_calls(&memory.content) {
                for call in calls {
                    id_to_tool.insert(call.id, call.name);
                }
            }
        }
    }

    // Last index per snapshot tool wins.
    let mut latest: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for (idx, memory) in memories.iter().enumerate() {
        if memory.role != MemoryRole::Tool {
            continue;
        }
        let Some((call_id, _)) = parse_tool_result(&memory.content) else {
            continue;
        };
        if let Some(tool) = id_to_tool.get(call_id) {
            if is_snapshot_tool(tool) {
                latest.insert(tool.as_str(), idx);
            }
        }
    }

    let latest_indices: std::collections::HashSet<usize> = latest.values().copied().collect();
    let mut idx = 0;
    memories.retain(|memory| {
        let keep = if memory.role != MemoryRole::Tool {
            true
        } else {
            match parse_tool_result(&memory.content) {
                Some((call_id, _)) => match id_to_tool.get(call_id) {
                    Some(tool) if is_snapshot_tool(tool) => latest_indices.contains(&idx),
                    _ => true,
                },
                None => true,
            }
        };
        idx += 1;
        keep
    });
}

/// Drop assistant memories whose calls lack results, then results whose
/// calls are gone. One round converges: every result pairs with exactly one
/// assistant memory.
fn remove_orphans(memories: &mut Vec<Memory>) {
    let result_ids: std::collections::HashSet<String> = memories
        .iter()
        .filter(|m| m.role == MemoryRole::Tool)
        .filter_map(|m| parse_tool_result(&m.content).map(|(id, _)| id.to_string()))
        .collect();

    memories.retain(|memory| {
        if memory.role != MemoryRole::Assistant {
            return true;
        }
        match parse_tool_calls(&memory.content) {
            Some(calls) => calls.iter().all(|c| result_ids.contains(&c.id)),
            None => true,
        }
    });

    let declared_ids: std::collections::HashSet<String> = memories
        .iter()
        .filter(|m| m.role == MemoryRole::Assistant)
        .filter_map(|m| parse_tool_calls(&m.content))
        .flatten()
        .map(|c| c.id)
        .collect();

    memories.retain(|memory| {
        if memory.role != MemoryRole::Tool {
            return true;
        }
        match parse_tool_result(&memory.content) {
            Some((id, _)) => declared_ids.contains(id),
            None => false,
        }
    });
}

/// Convert one memory into its chat message form.
fn memory_to_message(memory: &Memory) -> Option<ChatMessage> {
    match memory.role {
        MemoryRole::System => Some(ChatMessage::system(memory.content.clone())),
        MemoryRole::User => Some(ChatMessage::user(memory.content.clone())),
        MemoryRole::Assistant => {
            if let Some(calls) = parse_tool_calls(&memory.content) {
                let calls = calls
                    .into_iter()
                    .map(|c| zoea_llms::ToolCall::new(c.id, c.name, c.arguments))
                    .collect();
                Some(ChatMessage::assistant_tool_calls("", calls))
            } else {
                Some(ChatMessage::assistant(memory.content.clone()))
            }
        }
        MemoryRole::Tool => match parse_tool_result(&memory.content) {
            Some((id, text)) => Some(ChatMessage::tool(id, text)),
            None => {
                warn!(memory = memory.id, "tool memory without result encoding, skipping");
                None
            }
        },
    }
}
