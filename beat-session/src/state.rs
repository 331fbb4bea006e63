use beat_core::{Connectivity, Identity, Profile, StoreError};
use serde::{Deserialize, Serialize};

/// Why a session settled for synthesized data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DegradeReason {
    /// Every fetch attempt failed with an offline/network error
    RetriesExhausted,
    PermissionDenied,
    Unexpected(String),
}

impl DegradeReason {
    pub(crate) fn from_store_error(error: &StoreError) -> Self {
        match error {
            StoreError::PermissionDenied { .. } => Self::PermissionDenied,
            other => Self::Unexpected(other.to_string()),
        }
    }
}

/// Profile resolution state machine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionState {
    #[default]
    Idle,
    Authenticating,
    FetchingProfile,
    /// Waiting out the retry delay after a transient failure
    Retrying,
    /// Persisting a freshly synthesized profile
    Creating,
    Ready,
    Degraded(DegradeReason),
}

impl ResolutionState {
    /// `Ready` and `Degraded` end a resolution cycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Degraded(_))
    }

    pub fn is_resolving(&self) -> bool {
        matches!(
            self,
            Self::Authenticating | Self::FetchingProfile | Self::Retrying | Self::Creating
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Authenticating => "authenticating",
            Self::FetchingProfile => "fetching_profile",
            Self::Retrying => "retrying",
            Self::Creating => "creating",
            Self::Ready => "ready",
            Self::Degraded(_) => "degraded",
        }
    }
}

/// What consumers see of the current session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    pub state: ResolutionState,
    /// Retries consumed by the most recent resolution cycle
    pub retry_count: u32,
    pub connectivity: Connectivity,
}

impl SessionSnapshot {
    pub(crate) fn signed_out(connectivity: Connectivity) -> Self {
        Self {
            identity: None,
            profile: None,
            state: ResolutionState::Idle,
            retry_count: 0,
            connectivity,
        }
    }

    /// True while a resolution cycle is still running
    pub fn loading(&self) -> bool {
        self.state.is_resolving()
    }

    pub fn is_offline(&self) -> bool {
        !self.connectivity.is_online()
    }

    pub fn uid(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.uid.as_str())
    }
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self::signed_out(Connectivity::Online)
    }
}
