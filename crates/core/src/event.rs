//! Events - what triggers an evaluation pass.

use crate::id::{EventId, TaskId};
use crate::Time;
use serde::{Deserialize, Serialize};

/// Kind of event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Job creation or a periodic nudge
    Initiate,
    /// A collaborator reports progress on a task
    Update,
}

/// Location of a built artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Artifact server
    pub server: String,

    /// Content hash or digest
    pub hash: String,
}

/// Build progress reported by the build collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuildStatus {
    /// Build accepted, result comes later
    Scheduled {
        /// Collaborator build id
        build_id: String,
    },
    /// Artifact available
    Completed {
        /// The artifact
        artifact: Artifact,
    },
    /// Build failed
    Failed {
        /// Failure description
        reason: String,
    },
}

/// Test progress reported by the test collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TestStatus {
    /// Test accepted, result comes later
    Scheduled {
        /// Collaborator test id
        test_id: String,
    },
    /// Test finished and wrote its output
    Completed {
        /// Where the output lives
        output_location: String,
    },
    /// Test failed
    Failed {
        /// Failure description
        reason: String,
    },
}

/// Data carried by an event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Nothing attached
    #[default]
    Empty,
    /// Build update
    BuildUpdate(BuildStatus),
    /// Test update
    TestUpdate(TestStatus),
}

/// An external stimulus driving evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier
    pub id: EventId,

    /// Event kind
    pub kind: EventKind,

    /// Task the event is about, if any
    #[serde(default)]
    pub target_task: Option<TaskId>,

    /// Attached data
    #[serde(default)]
    pub payload: EventPayload,

    /// When it happened
    pub timestamp: Time,
}

impl Event {
    /// Create a new event.
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: EventId::new(),
            kind,
            target_task: None,
            payload: EventPayload::Empty,
            timestamp: chrono::Utc::now(),
        }
    }

    /// An `Initiate` event with no target.
    pub fn initiate() -> Self {
        Self::new(EventKind::Initiate)
    }

    /// An `Update` event for one task.
    pub fn update(target: TaskId, payload: EventPayload) -> Self {
        Self {
            target_task: Some(target),
            payload,
            ..Self::new(EventKind::Update)
        }
    }

    /// Whether this event is an update aimed at the given task.
    pub fn is_update_for(&self, id: &TaskId) -> bool {
        self.kind == EventKind::Update && self.target_task.as_ref() == Some(id)
    }
}
