//! Lifecycle bookkeeping for one worker instance

/// Where a worker instance is in its install/activate lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Constructed, no event handled yet
    Parsed,
    Installing,
    /// Installed; waiting unless skip-waiting was requested
    Installed,
    Activating,
    Activated,
    /// Install failed; this instance will never control pages
    Redundant,
}

/// Lifecycle state plus the two host-facing flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    pub state: LifecycleState,
    /// Set once the worker asked to skip the waiting phase
    pub skip_waiting: bool,
    /// Set once the worker took control of already-open pages
    pub clients_claimed: bool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: LifecycleState::Parsed,
            skip_waiting: false,
            clients_claimed: false,
        }
    }
}

impl Lifecycle {
    /// Installed but held back until the previous version lets go
    pub fn is_waiting(&self) -> bool {
        self.state == LifecycleState::Installed && !self.skip_waiting
    }

    pub fn is_active(&self) -> bool {
        self.state == LifecycleState::Activated
    }
}
