//! Circulation: one end-to-end cycle binding Recall, the Capsule Builder,
//! the Identity Digest, and the Proposal Compiler around a caller-supplied
//! model-invocation callback.
//!
//! `invoke_model` is a plain closure, not a trait object or agent
//! hierarchy — this crate has no notion of "agents" beyond the `agent_id`
//! string threaded through events and nodes.

use crate::archive::{ArchiveStore, Event};
use crate::capsule::build_capsule;
use crate::compiler::{CompileResult, Compiler};
use crate::config::Config;
use crate::error::CirculationError;
use crate::id::new_session_key;
use crate::identity::build_identity_digest;
use crate::lattice::LatticeStore;
use crate::proposal::{parse_first_proposal, strip_proposal_blocks};
use crate::recall::{recall, RecallError, RecallOptions};
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{instrument, warn};

impl From<RecallError> for CirculationError {
    fn from(err: RecallError) -> Self {
        match err {
            RecallError::Archive(e) => Self::Archive(e),
            RecallError::Lattice(e) => Self::Lattice(e),
        }
    }
}

/// Caller-supplied context for one cycle: who is speaking and over what
/// channel.
#[derive(Debug, Clone)]
pub struct CirculationContext {
    pub agent_id: String,
    pub channel: Option<String>,
    pub peer: Option<String>,
    pub model: Option<String>,
    pub session_key: Option<String>,
}

/// The outcome of one completed cycle.
#[derive(Debug, Clone)]
pub struct CirculationResult {
    pub reply: String,
    pub presence_event_hash: String,
    pub author_event_hash: String,
    pub assistant_event_hash: String,
    pub proposal: Option<CompileResult>,
}

/// Run one Circulation cycle: recall recent and semantically related
/// history, render the Capsule, assemble the Identity Digest prompt, call
/// `invoke_model`, compile any proposal out of the reply, and append the
/// presence/author/assistant events chained in that order.
///
/// The three archive appends (steps 3, 5, 8) and the proposal compile
/// (step 7) form the cycle's logical transaction boundary. The archive is
/// append-only, so a model failure between steps 5 and 8 cannot be undone
/// at the storage level; instead a `circulation_aborted` system event is
/// appended off the author event so the hash chain remains parsable, and
/// this function still returns `Err`.
///
/// # Errors
///
/// Returns [`CirculationError::Archive`]/[`CirculationError::Lattice`] if
/// either store fails (these are fatal; the cycle does not recover).
/// Returns [`CirculationError::ModelFailed`] or
/// [`CirculationError::ModelEmptyReply`] if `invoke_model` errors or
/// returns only whitespace. A malformed or invalid `<lattice_update>`
/// proposal does NOT cause an `Err`: it is logged and `proposal` is `None`
/// in the returned [`CirculationResult`], but the reply is still emitted.
#[instrument(skip(archive, lattice, config, invoke_model), fields(agent_id = %context.agent_id))]
pub fn run(
    archive: &mut ArchiveStore,
    lattice: &LatticeStore,
    config: &Config,
    utterance: &str,
    context: &CirculationContext,
    now: DateTime<Utc>,
    invoke_model: impl FnOnce(&str) -> Result<String, CirculationError>,
) -> Result<CirculationResult, CirculationError> {
    let session_key = context
        .session_key
        .clone()
        .unwrap_or_else(|| new_session_key(&context.agent_id));

    // 1. Recall
    let recalled = recall(archive, lattice, utterance, &RecallOptions::default())?;

    // 2. Capsule
    let capsule = build_capsule(lattice, &config.capsule, now)?;

    // 3. Presence event: a lightweight system probe, head of this cycle's chain.
    let presence = archive.append_event(
        None,
        now,
        &session_key,
        "identity_check",
        &context.agent_id,
        context.model.as_deref(),
        context.channel.as_deref(),
        context.peer.as_deref(),
        json!({
            "probe": "presence",
            "clock": now.to_rfc3339(),
            "latticeSize": lattice.node_count()?,
            "archiveSize": archive.event_count()?,
        }),
    )?;

    // 4. Identity digest prompt assembly
    let digest = build_identity_digest(
        &config.identity.name,
        &config.identity.role,
        &capsule,
        now.date_naive(),
    );
    let prompt = render_prompt(&digest, &recalled, context, utterance);

    // 5. Author event
    let author = archive.append_event(
        Some(&presence.event_hash),
        now,
        &session_key,
        "author_message",
        &context.agent_id,
        context.model.as_deref(),
        context.channel.as_deref(),
        context.peer.as_deref(),
        json!({"text": utterance}),
    )?;

    // 6. Model invocation
    let reply = match invoke_model(&prompt) {
        Ok(reply) if reply.trim().is_empty() => {
            abort(archive, &session_key, context, now, &author.event_hash, "empty reply")?;
            return Err(CirculationError::ModelEmptyReply);
        }
        Ok(reply) => reply,
        Err(err) => {
            abort(archive, &session_key, context, now, &author.event_hash, &err.to_string())?;
            return Err(err);
        }
    };

    // 7. Proposal parsing & compilation — failures are recoverable.
    let visible_text = strip_proposal_blocks(&reply);
    let proposal = parse_first_proposal(&reply).and_then(|proposal| {
        let compiler = Compiler::new(lattice);
        match compiler.compile(&proposal, &context.agent_id, now) {
            Ok(result) => Some(result),
            Err(err) => {
                warn!(error = %err, "proposal compilation failed; reply still emitted");
                None
            }
        }
    });

    // 8. Assistant event
    let assistant = archive.append_event(
        Some(&author.event_hash),
        now,
        &session_key,
        "assistant_message",
        &context.agent_id,
        context.model.as_deref(),
        context.channel.as_deref(),
        context.peer.as_deref(),
        json!({"text": visible_text, "raw": reply}),
    )?;

    Ok(CirculationResult {
        reply: visible_text,
        presence_event_hash: presence.event_hash,
        author_event_hash: author.event_hash,
        assistant_event_hash: assistant.event_hash,
        proposal,
    })
}

fn abort(
    archive: &mut ArchiveStore,
    session_key: &str,
    context: &CirculationContext,
    now: DateTime<Utc>,
    parent_hash: &str,
    reason: &str,
) -> Result<Event, CirculationError> {
    archive
        .append_event(
            Some(parent_hash),
            now,
            session_key,
            "system_event",
            &context.agent_id,
            context.model.as_deref(),
            context.channel.as_deref(),
            context.peer.as_deref(),
            json!({"action": "circulation_aborted", "reason": reason}),
        )
        .map_err(Into::into)
}

fn render_prompt(digest: &str, recalled: &[Event], context: &CirculationContext, utterance: &str) -> String {
    let mut out = String::with_capacity(digest.len() + recalled.len() * 64 + utterance.len() + 64);
    out.push_str(digest);
    out.push('\n');
    for event in recalled {
        let label = event.peer.as_deref().unwrap_or(&event.agent_id);
        let text = event.payload.get("text").and_then(|v| v.as_str()).unwrap_or("");
        out.push_str(&format!("{label}: {text}\n"));
    }
    let speaker = context.peer.as_deref().unwrap_or(&context.agent_id);
    out.push_str(&format!("{speaker}: {utterance}\n"));
    out
}
