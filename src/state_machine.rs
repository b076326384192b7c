//! Per-language batch lifecycle: Idle → Collecting → Sending → Idle.
//! A language may start collecting a new batch while an older one is still sending.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::translate::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BatchPhase {
    Idle,
    Collecting,
    Sending,
}

impl std::fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchPhase::Idle => write!(f, "Idle"),
            BatchPhase::Collecting => write!(f, "Collecting"),
            BatchPhase::Sending => write!(f, "Sending"),
        }
    }
}

impl BatchPhase {
    /// Returns whether moving from `self` to `next` is valid.
    pub fn can_transition_to(self, next: BatchPhase) -> bool {
        matches!(
            (self, next),
            (BatchPhase::Idle, BatchPhase::Collecting)
                | (BatchPhase::Collecting, BatchPhase::Sending)
                | (BatchPhase::Sending, BatchPhase::Idle)
                // new enqueue while an older batch is in flight
                | (BatchPhase::Sending, BatchPhase::Collecting)
        )
    }
}

/// Latest phase change, published to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    pub language: Language,
    pub phase: BatchPhase,
}

/// Phase of every language, with a watch channel for observers.
pub struct PhaseBoard {
    phases: RwLock<HashMap<Language, BatchPhase>>,
    change_tx: watch::Sender<Option<PhaseChange>>,
}

impl PhaseBoard {
    pub fn new() -> Self {
        let (change_tx, _) = watch::channel(None);
        Self {
            phases: RwLock::new(HashMap::new()),
            change_tx,
        }
    }

    pub fn current(&self, language: Language) -> BatchPhase {
        self.phases
            .read()
            .get(&language)
            .copied()
            .unwrap_or(BatchPhase::Idle)
    }

    /// Move `language` to `next`. No-op when already there.
    pub fn transition(&self, language: Language, next: BatchPhase) -> Result<BatchPhase, String> {
        let mut phases = self.phases.write();
        let current = phases.get(&language).copied().unwrap_or(BatchPhase::Idle);
        if current == next {
            return Ok(next);
        }
        if !current.can_transition_to(next) {
            let msg = format!("invalid batch transition for {language}: {current} -> {next}");
            warn!("{}", msg);
            return Err(msg);
        }
        phases.insert(language, next);
        self.change_tx.send_replace(Some(PhaseChange {
            language,
            phase: next,
        }));
        debug!(language = %language, from = %current, to = %next, "batch_phase");
        Ok(next)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<PhaseChange>> {
        self.change_tx.subscribe()
    }
}

impl Default for PhaseBoard {
    fn default() -> Self {
        Self::new()
    }
}
