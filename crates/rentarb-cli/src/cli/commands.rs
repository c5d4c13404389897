use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rentarb_core::collaborators::ConversationSource;
use rentarb_core::constants::OVERRIDE_RELOAD_MS;
use rentarb_core::models::{BadgeState, Conversation, ManualOverrideSet};
use rentarb_core::reconcile::manual_extra;
use rentarb_core::sources::{FileConversationSource, HttpConversationSource};
use rentarb_core::store::OverrideStore;
use rentarb_core::streaming::{read_push_lines, PushBus, PushSocketClient};
use rentarb_core::{BadgeRuntime, CoreConfig, ReconciliationEngine};
use tokio::io::{AsyncBufRead, BufReader};
use tokio::task::JoinHandle;

/// Where the authoritative conversation list comes from.
#[derive(Debug, Clone)]
pub enum ConversationInput {
    Endpoint(String),
    Snapshot(PathBuf),
}

/// Where push events come from.
#[derive(Debug, Clone)]
pub enum PushInput {
    /// JSON lines on stdin; the watch ends at EOF
    Stdin,
    Socket(PathBuf),
}

/// Push events as JSON lines from any async reader.
pub type PushLines = Box<dyn AsyncBufRead + Unpin + Send>;

enum PushFeed {
    Lines(PushLines),
    Socket(PathBuf),
}

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub user_id: String,
    pub input: Option<ConversationInput>,
    pub push: PushInput,
    pub pretty: bool,
}

fn conversation_source(
    input: Option<ConversationInput>,
    core: &CoreConfig,
) -> Result<Arc<dyn ConversationSource>> {
    let input = input.or_else(|| core.endpoint.clone().map(ConversationInput::Endpoint));
    match input {
        Some(ConversationInput::Endpoint(endpoint)) => {
            let source = HttpConversationSource::new(&endpoint)
                .with_context(|| format!("Failed to create HTTP client for {}", endpoint))?;
            Ok(Arc::new(source))
        }
        Some(ConversationInput::Snapshot(path)) => Ok(Arc::new(FileConversationSource::new(path))),
        None => bail!("No conversation source: pass --endpoint or --snapshot, or set an endpoint in config"),
    }
}

fn write_json<T: serde::Serialize, W: Write>(out: &mut W, value: &T, pretty: bool) -> Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut *out, value)?;
    } else {
        serde_json::to_writer(&mut *out, value)?;
    }
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

/// Run the badge runtime and print every published state as JSON until Ctrl-C
/// (or stdin EOF when push events come from stdin).
pub async fn run_watch(core: &CoreConfig, options: WatchOptions) -> Result<()> {
    let feed = match &options.push {
        PushInput::Stdin => PushFeed::Lines(Box::new(BufReader::new(tokio::io::stdin()))),
        PushInput::Socket(path) => PushFeed::Socket(path.clone()),
    };
    watch(core, options, feed, &mut std::io::stdout()).await
}

/// Like [`run_watch`] with push events read from `lines`. Returns once `lines` hits EOF
/// and everything it delivered has been applied.
pub async fn run_watch_lines<W: Write>(
    core: &CoreConfig,
    options: WatchOptions,
    lines: PushLines,
    out: &mut W,
) -> Result<()> {
    watch(core, options, PushFeed::Lines(lines), out).await
}

async fn watch<W: Write>(
    core: &CoreConfig,
    options: WatchOptions,
    feed: PushFeed,
    out: &mut W,
) -> Result<()> {
    let source = conversation_source(options.input, core)?;
    let store = Arc::new(OverrideStore::open(&core.data_dir));
    let push = PushBus::new();

    let engine = ReconciliationEngine::new(source, store.clone(), core.timings);
    let mut runtime = BadgeRuntime::spawn(engine, &push, store.as_ref());
    let handle = runtime.handle();
    let mut state_rx = handle.subscribe();

    // Sign in before any push event can be queued
    tracing::info!(user = %options.user_id, "watching badge");
    handle.sign_in(options.user_id);

    let mut push_task: JoinHandle<()> = match feed {
        PushFeed::Lines(lines) => {
            let bus = push.clone();
            tokio::spawn(async move {
                match read_push_lines(lines, &bus).await {
                    Ok(count) => tracing::info!(events = count, "push input closed"),
                    Err(e) => tracing::warn!("Failed to read push events: {}", e),
                }
            })
        }
        PushFeed::Socket(path) => tokio::spawn(PushSocketClient::with_path(path).run(push.clone())),
    };

    let reload_store = store.clone();
    let reload_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(OVERRIDE_RELOAD_MS));
        loop {
            interval.tick().await;
            if reload_store.reload() {
                tracing::debug!("override file changed on disk");
            }
        }
    });

    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state: BadgeState = *state_rx.borrow_and_update();
                write_json(out, &state, options.pretty)?;
            }
            _ = &mut push_task => {
                // Input is exhausted; let the runtime settle before reporting the final state
                if handle.flush().await && state_rx.has_changed().unwrap_or(false) {
                    let state: BadgeState = *state_rx.borrow_and_update();
                    write_json(out, &state, options.pretty)?;
                }
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    reload_task.abort();
    push_task.abort();
    runtime.shutdown().await;
    Ok(())
}

pub fn flag(store: &OverrideStore, conversation_id: &str, message_id: Option<&str>) -> Result<bool> {
    let changed = match message_id {
        Some(message_id) => store.flag_message(conversation_id, message_id),
        None => store.flag_conversation(conversation_id),
    }
    .context("Failed to update override store")?;
    Ok(changed)
}

pub fn unflag(
    store: &OverrideStore,
    conversation_id: &str,
    message_id: Option<&str>,
) -> Result<bool> {
    let changed = match message_id {
        Some(message_id) => store.clear_message(conversation_id, message_id),
        None => store.clear_conversation(conversation_id),
    }
    .context("Failed to update override store")?;
    Ok(changed)
}

pub fn clear_overrides(store: &OverrideStore) -> Result<bool> {
    store.clear_all().context("Failed to clear override store")
}

pub fn show_overrides(store: &OverrideStore, pretty: bool) -> Result<ManualOverrideSet> {
    let overrides = store.snapshot();
    write_json(&mut std::io::stdout(), &overrides, pretty)?;
    Ok(overrides)
}

/// Manual extra for a snapshot file against the current overrides.
pub fn extra(store: &OverrideStore, snapshot: &Path) -> Result<u32> {
    let content = std::fs::read(snapshot)
        .with_context(|| format!("Failed to read snapshot: {}", snapshot.display()))?;
    let conversations: Vec<Conversation> = serde_json::from_slice(&content)
        .with_context(|| format!("Failed to parse snapshot: {}", snapshot.display()))?;
    Ok(manual_extra(&conversations, &store.snapshot()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_flag_and_unflag() {
        let dir = tempdir().unwrap();
        let store = OverrideStore::open(dir.path());

        assert!(flag(&store, "A", None).unwrap());
        assert!(!flag(&store, "A", None).unwrap());
        assert!(flag(&store, "B", Some("m1")).unwrap());

        let reopened = OverrideStore::open(dir.path());
        assert!(reopened.snapshot().is_conversation_flagged("A"));
        assert_eq!(reopened.snapshot().flagged_message_count("B"), 1);

        assert!(unflag(&store, "B", Some("m1")).unwrap());
        assert!(unflag(&store, "A", None).unwrap());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_clear_overrides() {
        let dir = tempdir().unwrap();
        let store = OverrideStore::open(dir.path());
        assert!(!clear_overrides(&store).unwrap());

        flag(&store, "A", None).unwrap();
        assert!(clear_overrides(&store).unwrap());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_extra_against_snapshot() {
        let dir = tempdir().unwrap();
        let snapshot = dir.path().join("snapshot.json");
        std::fs::write(
            &snapshot,
            r#"[{"participantId": "A", "unreadCount": 0}, {"participantId": "B", "unreadCount": 2}]"#,
        )
        .unwrap();

        let store = OverrideStore::open(dir.path());
        flag(&store, "A", None).unwrap();
        flag(&store, "B", None).unwrap();
        flag(&store, "gone", None).unwrap();

        assert_eq!(extra(&store, &snapshot).unwrap(), 2);
    }

    #[test]
    fn test_extra_rejects_malformed_snapshot() {
        let dir = tempdir().unwrap();
        let snapshot = dir.path().join("snapshot.json");
        std::fs::write(&snapshot, "not json").unwrap();

        let store = OverrideStore::open(dir.path());
        let err = extra(&store, &snapshot).unwrap_err();
        assert!(err.to_string().contains("Failed to parse snapshot"));
    }

    #[test]
    fn test_missing_source_is_an_error() {
        let core = CoreConfig::new(tempdir().unwrap().path());
        assert!(conversation_source(None, &core).is_err());

        let source = conversation_source(
            Some(ConversationInput::Snapshot(PathBuf::from("convs.json"))),
            &core,
        );
        assert!(source.is_ok());
    }

    #[tokio::test]
    async fn test_watch_reports_final_state_at_input_eof() {
        let dir = tempdir().unwrap();
        let snapshot = dir.path().join("snapshot.json");
        std::fs::write(
            &snapshot,
            r#"[{"participantId": "A", "unreadCount": 0}, {"participantId": "B", "unreadCount": 1}]"#,
        )
        .unwrap();

        let core = CoreConfig::new(dir.path());
        let options = WatchOptions {
            user_id: "admin".to_string(),
            input: Some(ConversationInput::Snapshot(snapshot)),
            push: PushInput::Stdin,
            pretty: false,
        };
        let lines: &'static [u8] = b"{\"type\":\"new-message\",\"recipientId\":\"admin\"}\n\
            {\"type\":\"new-message\",\"recipientId\":\"admin\"}\n";
        let mut out = Vec::new();

        run_watch_lines(&core, options, Box::new(std::io::Cursor::new(lines)), &mut out)
            .await
            .unwrap();

        let output = String::from_utf8(out).unwrap();
        let last = output.lines().last().expect("no state printed");
        let state: BadgeState = serde_json::from_str(last).unwrap();
        assert_eq!(state.combined_count, 3);
        assert_eq!(state.base_unread, 3);
    }

    #[tokio::test]
    async fn test_snapshot_source_reads_file() {
        let dir = tempdir().unwrap();
        let snapshot = dir.path().join("snapshot.json");
        std::fs::write(&snapshot, r#"[{"participantId": "A", "unreadCount": 1}]"#).unwrap();

        let core = CoreConfig::new(dir.path());
        let source =
            conversation_source(Some(ConversationInput::Snapshot(snapshot)), &core).unwrap();
        let conversations = source.fetch_conversations().await.unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].unread_count, 1);
    }
}
