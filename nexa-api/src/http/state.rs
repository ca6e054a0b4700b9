//! Shared handler state.

use sqlx::PgPool;
use std::sync::Arc;

use nexa_core::catalog::Catalog;
use nexa_core::service::{CapabilityService, PlaybackService, PlaylistService, TranscodePolicy};
use nexa_transcode::{SubtitleService, TranscodeManager};

/// Validates an opaque bearer credential into an opaque identity.
/// Authentication itself is an external collaborator.
pub trait IdentityValidator: Send + Sync {
    fn validate(&self, token: &str) -> Option<String>;
}

/// Accepts any non-empty credential and uses it as the identity. The
/// default until a real validator is wired in deployment.
#[derive(Debug, Default)]
pub struct PermissiveValidator;

impl IdentityValidator for PermissiveValidator {
    fn validate(&self, token: &str) -> Option<String> {
        (!token.is_empty()).then(|| token.to_string())
    }
}

#[derive(Clone)]
pub struct AppState {
    pub playback: Arc<PlaybackService>,
    pub playlist: PlaylistService,
    pub capabilities: CapabilityService,
    pub catalog: Arc<dyn Catalog>,
    pub transcode: Arc<TranscodeManager>,
    pub subtitles: SubtitleService,
    pub policy: TranscodePolicy,
    pub db: PgPool,
    pub auth: Arc<dyn IdentityValidator>,
    pub metrics_enabled: bool,
}
