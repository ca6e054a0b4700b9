//! Playback session orchestrator.
//!
//! Binds the capability store, stream planner, playlist generator, GoP
//! index, and the transcode manager's stop hook into the per-session state
//! machine behind the public playback API. Every operation runs under the
//! session lock; planner computation is pure and catalog reads are
//! prefetched outside critical decisions.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::catalog::{Catalog, ItemSummary};
use crate::config::SessionConfig;
use crate::events::{EventPublisher, PlaybackEvent};
use crate::metrics;
use crate::models::{
    ClientCapabilities, GeneratorId, ItemId, MediaPartId, MediaSourceFacts, PlaybackSession,
    PlaybackState, SeedDescriptor, SessionId, StreamPlan,
};
use crate::repository::SessionRepository;
use crate::service::capability::CapabilityService;
use crate::service::gop::{GopIndexService, KeyframeLookup};
use crate::service::locks::SessionLocks;
use crate::service::planner::{self, TranscodePolicy};
use crate::service::playlist::PlaylistService;
use crate::{Error, Result};

/// Stops live encoder jobs for a session. Implemented by the transcode
/// manager; a no-op stands in when transcoding is disabled.
#[async_trait]
pub trait JobStopper: Send + Sync {
    async fn stop_for_session(&self, session_id: &SessionId);
}

#[derive(Debug, Default)]
pub struct NoopJobStopper;

#[async_trait]
impl JobStopper for NoopJobStopper {
    async fn stop_for_session(&self, _session_id: &SessionId) {}
}

/// Client-reported status driving `decide`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecideStatus {
    Ended,
    Playing,
    Jump,
}

/// What the client should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecideAction {
    Continue,
    Stop,
    Prompt,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackStartPayload {
    pub session_id: SessionId,
    pub generator_id: GeneratorId,
    pub item: ItemSummary,
    pub capability_version: i32,
    pub capability_version_mismatch: bool,
    pub stream_plan: StreamPlan,
    pub playback_url: String,
    pub trickplay_url: Option<String>,
    pub duration_ms: u64,
    pub playlist_index: i64,
    pub playlist_total: i64,
    pub shuffle: bool,
    pub repeat: bool,
    pub heartbeat_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackResumePayload {
    pub session_id: SessionId,
    pub item_id: ItemId,
    pub stream_plan: StreamPlan,
    pub playback_url: String,
    pub playhead_ms: u64,
    pub state: PlaybackState,
    pub capability_version: i32,
    pub capability_version_mismatch: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    pub session_id: SessionId,
    pub capability_version: i32,
    pub capability_version_mismatch: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecidePayload {
    pub action: DecideAction,
    pub stream_plan: Option<StreamPlan>,
    pub next_item_id: Option<ItemId>,
    pub playback_url: Option<String>,
    pub trickplay_url: Option<String>,
    pub capability_version: i32,
    pub capability_version_mismatch: bool,
    pub playlist_index: i64,
    pub playlist_total: i64,
}

pub type SeekPayload = KeyframeLookup;

/// Parameters of `start`, bundled: the HTTP layer maps its request body
/// onto this.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub user_id: String,
    pub seed: SeedDescriptor,
    pub capability: Option<ClientCapabilities>,
    pub capability_version: Option<i32>,
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub originator: Option<String>,
    pub context: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct PlaybackService {
    sessions: SessionRepository,
    capabilities: CapabilityService,
    playlist: PlaylistService,
    catalog: Arc<dyn Catalog>,
    gop: GopIndexService,
    events: Arc<dyn EventPublisher>,
    job_stopper: Arc<dyn JobStopper>,
    policy: TranscodePolicy,
    config: SessionConfig,
    locks: SessionLocks,
}

impl PlaybackService {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        sessions: SessionRepository,
        capabilities: CapabilityService,
        playlist: PlaylistService,
        catalog: Arc<dyn Catalog>,
        gop: GopIndexService,
        events: Arc<dyn EventPublisher>,
        job_stopper: Arc<dyn JobStopper>,
        policy: TranscodePolicy,
        config: SessionConfig,
        locks: SessionLocks,
    ) -> Self {
        Self {
            sessions,
            capabilities,
            playlist,
            catalog,
            gop,
            events,
            job_stopper,
            policy,
            config,
            locks,
        }
    }

    /// Open a session: resolve the seed, plan the first item, return
    /// everything the client needs to begin pulling media.
    pub async fn start(&self, request: StartRequest) -> Result<PlaybackStartPayload> {
        let mut session =
            PlaybackSession::new(request.user_id, self.config.inactivity_window());
        session.device_id = request.device_id.clone();
        session.originator = request.originator;
        session.context = request.context;
        self.sessions.insert(&session).await?;

        let lock = self.locks.for_session(&session.id);
        let _guard = lock.lock().await;

        let capability_outcome = match request.capability {
            Some(declaration) => {
                self.capabilities
                    .upsert(
                        &session.id,
                        declaration,
                        request.device_id,
                        request.device_name,
                        request.capability_version,
                    )
                    .await?
            }
            None => {
                self.capabilities
                    .check_version(&session.id, request.capability_version)
                    .await?
            }
        };

        let (generator, current) = self.playlist.create(&session.id, request.seed).await?;
        let current = current
            .ok_or_else(|| Error::NotFound("Generator has no current item".to_string()))?;

        let (summary, facts, plan) = self.plan_item(&session.id, &current.item_id).await?;
        let playback_url = playback_url_for(&plan, &session.id)?;
        let trickplay_url = trickplay_url(&facts);

        session.current_item_id = Some(current.item_id.clone());
        session.generator_id = Some(generator.id.clone());
        session.capability_version = capability_outcome.effective_version;
        self.sessions.update(&session).await?;

        metrics::playback::SESSIONS_STARTED_TOTAL.inc();
        metrics::playback::SESSIONS_ACTIVE.inc();
        self.events.publish(PlaybackEvent::SessionStarted {
            session_id: session.id.clone(),
            item_id: current.item_id.clone(),
        });

        tracing::info!(
            session_id = %session.id,
            generator_id = %generator.id,
            item_id = %current.item_id,
            method = ?plan.method,
            "playback session started"
        );

        Ok(PlaybackStartPayload {
            session_id: session.id,
            generator_id: generator.id,
            item: summary,
            capability_version: capability_outcome.effective_version,
            capability_version_mismatch: capability_outcome.mismatch,
            duration_ms: facts.part.duration_ms,
            playback_url,
            trickplay_url,
            stream_plan: plan,
            playlist_index: generator.cursor,
            playlist_total: generator.total_count,
            shuffle: generator.shuffle,
            repeat: generator.repeat,
            heartbeat_interval_seconds: self.config.heartbeat_hint_seconds,
        })
    }

    /// Reload a session and re-plan its current item against the effective
    /// capability.
    pub async fn resume(
        &self,
        session_id: &SessionId,
        capability: Option<ClientCapabilities>,
        capability_version: Option<i32>,
    ) -> Result<PlaybackResumePayload> {
        let lock = self.locks.for_session(session_id);
        let _guard = lock.lock().await;

        let mut session = self.load_live(session_id).await?;
        let capability_outcome = match capability {
            Some(declaration) => {
                self.capabilities
                    .upsert(session_id, declaration, None, None, capability_version)
                    .await?
            }
            None => {
                self.capabilities
                    .check_version(session_id, capability_version)
                    .await?
            }
        };

        let item_id = session
            .current_item_id
            .clone()
            .ok_or_else(|| Error::InvalidInput("Session has no current item".to_string()))?;
        let (_, _, plan) = self.plan_item(session_id, &item_id).await?;
        let playback_url = playback_url_for(&plan, session_id)?;

        session.capability_version = capability_outcome.effective_version;
        session.touch(self.config.inactivity_window());
        self.sessions.update(&session).await?;

        Ok(PlaybackResumePayload {
            session_id: session.id.clone(),
            item_id,
            stream_plan: plan,
            playback_url,
            playhead_ms: session.playhead_ms,
            state: session.state,
            capability_version: capability_outcome.effective_version,
            capability_version_mismatch: capability_outcome.mismatch,
        })
    }

    /// Refresh expiry, store the playhead, optionally absorb a capability
    /// declaration. Never blocks on anything but the session lock.
    pub async fn heartbeat(
        &self,
        session_id: &SessionId,
        playhead_ms: u64,
        state: PlaybackState,
        part_id: Option<MediaPartId>,
        capability: Option<ClientCapabilities>,
        capability_version: Option<i32>,
    ) -> Result<HeartbeatPayload> {
        let lock = self.locks.for_session(session_id);
        let _guard = lock.lock().await;

        let mut session = self.load_live(session_id).await?;
        if !session.state.can_transition_to(state) {
            return Err(Error::InvalidInput(format!(
                "session is {}, cannot become {}",
                session.state.as_str(),
                state.as_str()
            )));
        }

        let capability_outcome = match capability {
            Some(declaration) => {
                self.capabilities
                    .upsert(session_id, declaration, None, None, capability_version)
                    .await?
            }
            None => {
                self.capabilities
                    .check_version(session_id, capability_version)
                    .await?
            }
        };

        session.playhead_ms = playhead_ms;
        session.state = state;
        if part_id.is_some() {
            session.current_part_id = part_id;
        }
        session.capability_version = capability_outcome.effective_version;
        session.touch(self.config.inactivity_window());
        self.sessions.update(&session).await?;

        self.events.publish(PlaybackEvent::Progress {
            session_id: session.id.clone(),
            item_id: session.current_item_id.clone(),
            playhead_ms,
            state,
        });

        Ok(HeartbeatPayload {
            session_id: session.id,
            capability_version: capability_outcome.effective_version,
            capability_version_mismatch: capability_outcome.mismatch,
        })
    }

    /// Decide what happens after the current item: advance, stop, prompt,
    /// or tell the client to re-plan after a capability change.
    pub async fn decide(
        &self,
        session_id: &SessionId,
        status: DecideStatus,
        progress_ms: u64,
        jump_index: Option<i64>,
        capability: Option<ClientCapabilities>,
        capability_version: Option<i32>,
    ) -> Result<DecidePayload> {
        let lock = self.locks.for_session(session_id);
        let _guard = lock.lock().await;

        let mut session = self.load_live(session_id).await?;
        session.playhead_ms = progress_ms;
        session.touch(self.config.inactivity_window());

        let capability_outcome = match capability {
            Some(declaration) => {
                self.capabilities
                    .upsert(session_id, declaration, None, None, capability_version)
                    .await?
            }
            None => {
                self.capabilities
                    .check_version(session_id, capability_version)
                    .await?
            }
        };
        session.capability_version = capability_outcome.effective_version;

        let generator_id = session
            .generator_id
            .clone()
            .ok_or_else(|| Error::InvalidInput("Session has no generator".to_string()))?;

        // A mid-session capability change invalidates the served plan; the
        // client reloads without advancing.
        if capability_outcome.created {
            self.sessions.update(&session).await?;
            let current = self.playlist.current(&generator_id).await?;
            let plan = match &session.current_item_id {
                Some(item_id) => Some(self.plan_item(session_id, item_id).await?),
                None => None,
            };
            let (plan, url, trickplay) = match plan {
                Some((_, facts, plan)) => {
                    let url = playback_url_for(&plan, session_id)?;
                    let trickplay = trickplay_url(&facts);
                    (Some(plan), Some(url), trickplay)
                }
                None => (None, None, None),
            };
            return Ok(DecidePayload {
                action: DecideAction::Refresh,
                stream_plan: plan,
                next_item_id: session.current_item_id.clone(),
                playback_url: url,
                trickplay_url: trickplay,
                capability_version: capability_outcome.effective_version,
                capability_version_mismatch: capability_outcome.mismatch,
                playlist_index: current.current_index,
                playlist_total: current.total_count,
            });
        }

        let navigate = match status {
            DecideStatus::Playing => {
                self.sessions.update(&session).await?;
                let current = self.playlist.current(&generator_id).await?;
                return Ok(DecidePayload {
                    action: DecideAction::Prompt,
                    stream_plan: None,
                    next_item_id: None,
                    playback_url: None,
                    trickplay_url: None,
                    capability_version: capability_outcome.effective_version,
                    capability_version_mismatch: capability_outcome.mismatch,
                    playlist_index: current.current_index,
                    playlist_total: current.total_count,
                });
            }
            DecideStatus::Ended => self.playlist.step_unlocked(&generator_id, true).await?,
            DecideStatus::Jump => {
                let index = jump_index.ok_or_else(|| {
                    Error::InvalidInput("jump status requires jumpIndex".to_string())
                })?;
                self.playlist.jump_unlocked(&generator_id, index).await?
            }
        };

        let Some(item) = navigate.item else {
            // Playlist exhausted: the session winds down.
            session.state = PlaybackState::Ended;
            self.sessions.update(&session).await?;
            self.job_stopper.stop_for_session(session_id).await;
            return Ok(DecidePayload {
                action: DecideAction::Stop,
                stream_plan: None,
                next_item_id: None,
                playback_url: None,
                trickplay_url: None,
                capability_version: capability_outcome.effective_version,
                capability_version_mismatch: capability_outcome.mismatch,
                playlist_index: navigate.current_index,
                playlist_total: navigate.total_count,
            });
        };

        let planned = match self.plan_item(session_id, &item.item_id).await {
            Ok(planned) => planned,
            Err(Error::NotFound(_)) => {
                // The item vanished from the catalog mid-playlist.
                session.state = PlaybackState::Ended;
                self.sessions.update(&session).await?;
                self.job_stopper.stop_for_session(session_id).await;
                return Ok(DecidePayload {
                    action: DecideAction::Stop,
                    stream_plan: None,
                    next_item_id: None,
                    playback_url: None,
                    trickplay_url: None,
                    capability_version: capability_outcome.effective_version,
                    capability_version_mismatch: capability_outcome.mismatch,
                    playlist_index: navigate.current_index,
                    playlist_total: navigate.total_count,
                });
            }
            Err(e) => return Err(e),
        };
        let (_, facts, plan) = planned;
        let url = playback_url_for(&plan, session_id)?;
        let trickplay = trickplay_url(&facts);

        session.current_item_id = Some(item.item_id.clone());
        session.current_part_id = None;
        session.playhead_ms = 0;
        self.sessions.update(&session).await?;

        self.events.publish(PlaybackEvent::ItemChanged {
            session_id: session.id.clone(),
            item_id: item.item_id.clone(),
            playlist_index: navigate.current_index,
        });

        Ok(DecidePayload {
            action: DecideAction::Continue,
            stream_plan: Some(plan),
            next_item_id: Some(item.item_id),
            playback_url: Some(url),
            trickplay_url: trickplay,
            capability_version: capability_outcome.effective_version,
            capability_version_mismatch: capability_outcome.mismatch,
            playlist_index: navigate.current_index,
            playlist_total: navigate.total_count,
        })
    }

    /// Snap a seek target to the nearest keyframe. The transcode itself is
    /// not restarted here; the next segment request carries that cost.
    pub async fn seek(
        &self,
        session_id: &SessionId,
        target_ms: u64,
        part_id: &MediaPartId,
    ) -> Result<SeekPayload> {
        let lock = self.locks.for_session(session_id);
        let _guard = lock.lock().await;

        let mut session = self.load_live(session_id).await?;
        session.touch(self.config.inactivity_window());
        self.sessions.update(&session).await?;

        self.gop.nearest_keyframe(part_id, target_ms).await
    }

    /// End a session. The record stays until natural expiry.
    pub async fn stop(&self, session_id: &SessionId) -> Result<()> {
        let lock = self.locks.for_session(session_id);
        let _guard = lock.lock().await;

        let mut session = self.load_live(session_id).await?;
        session.state = PlaybackState::Ended;
        self.sessions.update(&session).await?;

        self.job_stopper.stop_for_session(session_id).await;
        metrics::playback::SESSIONS_ACTIVE.dec();
        self.events.publish(PlaybackEvent::SessionStopped {
            session_id: session.id.clone(),
        });

        tracing::info!(session_id = %session_id, "playback session stopped");
        Ok(())
    }

    /// Remove expired sessions and their dependents. Called periodically
    /// by the sweeper and cheap enough to call opportunistically.
    pub async fn sweep_expired(&self) -> Result<u64> {
        let expired = self.sessions.delete_expired(Utc::now()).await?;
        for session_id in &expired {
            self.capabilities.delete_for_session(session_id).await?;
            self.playlist.delete_for_session(session_id).await?;
            self.job_stopper.stop_for_session(session_id).await;
            self.locks.remove(session_id);
        }
        let generators = self.playlist.sweep_expired().await?;
        if !expired.is_empty() || generators > 0 {
            tracing::info!(
                sessions = expired.len(),
                generators,
                "expired playback state swept"
            );
        }
        Ok(expired.len() as u64)
    }

    /// Spawn the periodic sweeper task.
    pub fn spawn_sweeper(self: Arc<Self>, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep_expired().await {
                    tracing::warn!(error = %e, "session sweep failed");
                }
            }
        })
    }

    /// Load a session, lazily collecting it when expired.
    async fn load_live(&self, session_id: &SessionId) -> Result<PlaybackSession> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Session {session_id} not found")))?;

        if session.is_expired(Utc::now()) {
            self.sessions.delete(session_id).await?;
            self.capabilities.delete_for_session(session_id).await?;
            self.playlist.delete_for_session(session_id).await?;
            self.locks.remove(session_id);
            return Err(Error::NotFound(format!("Session {session_id} expired")));
        }
        Ok(session)
    }

    /// Fetch facts and plan one item under the session's effective
    /// capability.
    async fn plan_item(
        &self,
        session_id: &SessionId,
        item_id: &ItemId,
    ) -> Result<(ItemSummary, MediaSourceFacts, StreamPlan)> {
        let summary = self
            .catalog
            .item(item_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Item {item_id} not found")))?;
        let facts = self
            .catalog
            .source_facts(item_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Item {item_id} has no media source")))?;

        let effective = self.capabilities.effective(session_id).await?;
        let plan = planner::plan(&facts, &effective.capabilities, &self.policy, None)?;
        let method = format!("{:?}", plan.method);
        metrics::playback::PLANS_TOTAL
            .with_label_values(&[method.as_str()])
            .inc();
        Ok((summary, facts, plan))
    }
}

/// Manifest URLs carry the session so the segment layer can re-derive the
/// variant; direct URLs are served by the catalog as-is.
fn playback_url_for(plan: &StreamPlan, session_id: &SessionId) -> Result<String> {
    if let Some(manifest) = &plan.manifest_url {
        return Ok(format!("{manifest}?sessionId={session_id}"));
    }
    plan.direct_url
        .clone()
        .ok_or_else(|| Error::Internal("plan carries no playback URL".to_string()))
}

fn trickplay_url(facts: &MediaSourceFacts) -> Option<String> {
    facts
        .trickplay
        .as_ref()
        .map(|_| format!("/stream/part/{}/trickplay.vtt", facts.part.id))
}
