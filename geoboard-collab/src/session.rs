//! Client-side interaction state machine.
//!
//! An [`EditorSession`] owns the client's [`FeatureMirror`] and the single
//! mode value that gates every mutation entry point:
//!
//! ```text
//!                select_tool          finish_drawing
//!        Idle ───────────────► Drawing ──────────────► Idle
//!         │ ▲
//!         │ └───────────── toggle_edit_mode ──────────┐
//!         ├──────────────► EditBrowsing ◄── save_edit ─┤
//!         │                     │  select_for_edit     │
//!         │                     ▼                      │
//!         │                  Editing ──────────────────┘
//!         │                          (toggle = cancel)
//!         └──────────────► DeleteBrowsing ◄──┐
//!            toggle_delete_mode    │ select_for_delete
//!                                  └─────────┘
//! ```
//!
//! Exactly one of drawing, editing, deleting can be active; an operation
//! invoked in any other mode fails with [`SessionError::WrongMode`] no
//! matter what the UI's buttons happen to allow. Dialogs are modeled as
//! async request/response calls on the [`Prompter`] collaborator, and the
//! outgoing transport as a [`MutationSender`], so the whole machine runs
//! against fakes in tests.
//!
//! Mutations are optimistic: the mirror changes first, then the request
//! goes to the server. The confirmation comes back on the broadcast channel
//! like everyone else's and collapses into the optimistic copy because the
//! mirror is idempotent by id.

use async_trait::async_trait;
use uuid::Uuid;

use geoboard_core::{DrawTool, FeatureMirror, FeatureRecord, Geometry, GeometryError, Sketch};

use crate::client::{SyncClient, SyncEvent};
use crate::protocol::ProtocolError;

/// Dialog collaborator: user-facing prompts as async request/response.
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Ask for a line of text. Always resolves with what the user entered;
    /// empty is allowed.
    async fn request_text(&self, default_value: &str) -> String;

    /// Ask the user to confirm a destructive action on the named feature.
    async fn request_confirmation(&self, description: &str) -> bool;
}

/// Outgoing mutation transport, implemented by [`SyncClient`].
#[async_trait]
pub trait MutationSender: Send + Sync {
    async fn send_create(&self, record: &FeatureRecord) -> Result<(), ProtocolError>;
    async fn send_update(&self, record: &FeatureRecord) -> Result<(), ProtocolError>;
    async fn send_delete(&self, id: Uuid) -> Result<(), ProtocolError>;
}

#[async_trait]
impl MutationSender for SyncClient {
    async fn send_create(&self, record: &FeatureRecord) -> Result<(), ProtocolError> {
        SyncClient::send_create(self, record).await
    }

    async fn send_update(&self, record: &FeatureRecord) -> Result<(), ProtocolError> {
        SyncClient::send_update(self, record).await
    }

    async fn send_delete(&self, id: Uuid) -> Result<(), ProtocolError> {
        SyncClient::send_delete(self, id).await
    }
}

/// The mutually exclusive interaction modes.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorMode {
    Idle,
    /// A drawing tool is armed, waiting for the capture widget to finish.
    Drawing(DrawTool),
    /// Edit mode is on; every feature is selectable.
    EditBrowsing,
    /// One feature is being edited. `snapshot` is its pre-edit copy,
    /// retained so a cancel can put it back byte-for-byte.
    Editing { id: Uuid, snapshot: FeatureRecord },
    /// Delete mode is on; selecting a feature asks for confirmation.
    DeleteBrowsing,
}

impl EditorMode {
    /// Short name for error messages and logs.
    pub fn name(&self) -> &'static str {
        match self {
            EditorMode::Idle => "idle",
            EditorMode::Drawing(_) => "drawing",
            EditorMode::EditBrowsing => "browsing in edit mode",
            EditorMode::Editing { .. } => "editing",
            EditorMode::DeleteBrowsing => "browsing in delete mode",
        }
    }
}

/// How a feature should be rendered right now.
///
/// Computed from the mode on demand; no per-feature visual state is
/// stored, so ending a mode restores every feature implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emphasis {
    Normal,
    Highlighted,
    Dimmed,
}

/// Session errors.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// The operation is not legal in the current mode.
    WrongMode {
        operation: &'static str,
        mode: &'static str,
    },
    /// The mirror holds no feature with this id.
    UnknownFeature(Uuid),
    /// The capture widget finished a gesture for a different tool.
    SketchMismatch { expected: DrawTool, got: DrawTool },
    /// The captured gesture does not form a valid shape.
    Geometry(GeometryError),
    /// The mutation could not be sent; the optimistic local change remains
    /// visible but unconfirmed.
    Transport(ProtocolError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WrongMode { operation, mode } => {
                write!(f, "cannot {operation} while {mode}")
            }
            Self::UnknownFeature(id) => write!(f, "no feature with id {id}"),
            Self::SketchMismatch { expected, got } => {
                write!(f, "active tool is {expected} but the sketch is {got}")
            }
            Self::Geometry(e) => write!(f, "invalid shape: {e}"),
            Self::Transport(e) => write!(f, "transport failed: {e}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<GeometryError> for SessionError {
    fn from(e: GeometryError) -> Self {
        Self::Geometry(e)
    }
}

impl From<ProtocolError> for SessionError {
    fn from(e: ProtocolError) -> Self {
        Self::Transport(e)
    }
}

/// The interaction state machine driving create/edit/delete workflows.
pub struct EditorSession<S: MutationSender, P: Prompter> {
    sender: S,
    prompter: P,
    mirror: FeatureMirror,
    mode: EditorMode,
    /// Feature awaiting delete confirmation, if any.
    pending_delete: Option<Uuid>,
}

impl<S: MutationSender, P: Prompter> EditorSession<S, P> {
    pub fn new(sender: S, prompter: P) -> Self {
        Self {
            sender,
            prompter,
            mirror: FeatureMirror::new(),
            mode: EditorMode::Idle,
            pending_delete: None,
        }
    }

    pub fn mode(&self) -> &EditorMode {
        &self.mode
    }

    pub fn mirror(&self) -> &FeatureMirror {
        &self.mirror
    }

    /// Arm a drawing tool. Legal only from `Idle`.
    pub fn select_tool(&mut self, tool: DrawTool) -> Result<(), SessionError> {
        match self.mode {
            EditorMode::Idle => {
                self.mode = EditorMode::Drawing(tool);
                Ok(())
            }
            ref mode => Err(SessionError::WrongMode {
                operation: "select a drawing tool",
                mode: mode.name(),
            }),
        }
    }

    /// Complete the armed drawing gesture.
    ///
    /// Validates the captured sketch, asks for a label (empty answer falls
    /// back to a generated placeholder), inserts the new record into the
    /// mirror optimistically, and sends the create. An invalid gesture is
    /// abandoned: the error is returned and the mode drops back to `Idle`.
    pub async fn finish_drawing(&mut self, sketch: Sketch) -> Result<FeatureRecord, SessionError> {
        let tool = match self.mode {
            EditorMode::Drawing(tool) => tool,
            ref mode => {
                return Err(SessionError::WrongMode {
                    operation: "finish a drawing",
                    mode: mode.name(),
                })
            }
        };
        if sketch.tool() != tool {
            return Err(SessionError::SketchMismatch {
                expected: tool,
                got: sketch.tool(),
            });
        }

        let geometry = match sketch.into_geometry() {
            Ok(geometry) => geometry,
            Err(e) => {
                // Gesture abandoned (too few points, degenerate shape).
                self.mode = EditorMode::Idle;
                return Err(e.into());
            }
        };

        let fallback = placeholder_label(Some(tool), self.mirror.len() + 1);
        let entered = self.prompter.request_text(&fallback).await;
        let label = if entered.is_empty() { fallback } else { entered };

        let record = FeatureRecord::new(geometry, label);
        self.mirror.apply_created(record.clone());
        self.mode = EditorMode::Idle;

        self.sender.send_create(&record).await?;
        Ok(record)
    }

    /// Toggle edit mode. From `Editing` this is the cancel path: the
    /// pre-edit snapshot goes back into the mirror, discarding any
    /// in-progress geometry changes, and nothing is sent to the server.
    pub fn toggle_edit_mode(&mut self) -> Result<(), SessionError> {
        match std::mem::replace(&mut self.mode, EditorMode::Idle) {
            EditorMode::Idle => {
                self.mode = EditorMode::EditBrowsing;
                Ok(())
            }
            EditorMode::EditBrowsing => Ok(()),
            EditorMode::Editing { snapshot, .. } => {
                self.mirror.restore(snapshot);
                Ok(())
            }
            other => {
                let mode = other.name();
                self.mode = other;
                Err(SessionError::WrongMode {
                    operation: "toggle edit mode",
                    mode,
                })
            }
        }
    }

    /// Select a feature for vertex editing.
    ///
    /// Snapshots the feature's pre-edit state. Selecting a new feature
    /// while another is being edited first restores the previous one from
    /// its snapshot — only the actively edited feature may ever diverge
    /// locally from server state.
    pub fn select_for_edit(&mut self, id: Uuid) -> Result<(), SessionError> {
        match self.mode {
            EditorMode::EditBrowsing | EditorMode::Editing { .. } => {}
            ref mode => {
                return Err(SessionError::WrongMode {
                    operation: "select a feature to edit",
                    mode: mode.name(),
                })
            }
        }

        if let EditorMode::Editing { id: previous, snapshot } =
            std::mem::replace(&mut self.mode, EditorMode::EditBrowsing)
        {
            if previous == id {
                self.mode = EditorMode::Editing { id: previous, snapshot };
                return Ok(());
            }
            self.mirror.restore(snapshot);
        }

        let snapshot = self
            .mirror
            .get(&id)
            .cloned()
            .ok_or(SessionError::UnknownFeature(id))?;
        self.mode = EditorMode::Editing { id, snapshot };
        Ok(())
    }

    /// Apply an in-progress vertex change to the edited feature (local
    /// preview only; nothing is sent until [`save_edit`](Self::save_edit)).
    pub fn update_working_geometry(&mut self, geometry: Geometry) -> Result<(), SessionError> {
        let id = match self.mode {
            EditorMode::Editing { id, .. } => id,
            ref mode => {
                return Err(SessionError::WrongMode {
                    operation: "edit geometry",
                    mode: mode.name(),
                })
            }
        };
        if !self.mirror.set_geometry(id, geometry) {
            return Err(SessionError::UnknownFeature(id));
        }
        Ok(())
    }

    /// Commit the in-progress edit.
    ///
    /// Re-prompts the label (prefilled with the current one; empty answer
    /// falls back to a placeholder), sends the update, and returns to
    /// `EditBrowsing`.
    pub async fn save_edit(&mut self) -> Result<FeatureRecord, SessionError> {
        let id = match self.mode {
            EditorMode::Editing { id, .. } => id,
            ref mode => {
                return Err(SessionError::WrongMode {
                    operation: "save an edit",
                    mode: mode.name(),
                })
            }
        };
        let current = self
            .mirror
            .get(&id)
            .cloned()
            .ok_or(SessionError::UnknownFeature(id))?;

        let entered = self.prompter.request_text(&current.label).await;
        let label = if entered.is_empty() {
            placeholder_label(None, self.mirror.len())
        } else {
            entered
        };

        let record = FeatureRecord::with_id(id, current.geometry, label);
        self.mirror.apply_updated(record.clone());
        self.mode = EditorMode::EditBrowsing;

        self.sender.send_update(&record).await?;
        Ok(record)
    }

    /// Toggle delete mode.
    pub fn toggle_delete_mode(&mut self) -> Result<(), SessionError> {
        match self.mode {
            EditorMode::Idle => {
                self.mode = EditorMode::DeleteBrowsing;
                Ok(())
            }
            EditorMode::DeleteBrowsing => {
                self.pending_delete = None;
                self.mode = EditorMode::Idle;
                Ok(())
            }
            ref mode => Err(SessionError::WrongMode {
                operation: "toggle delete mode",
                mode: mode.name(),
            }),
        }
    }

    /// Select a feature for deletion and ask for confirmation.
    ///
    /// While the confirmation is pending the feature is highlighted and the
    /// rest are dimmed. Affirmative: the feature leaves the mirror and a
    /// delete is sent. Negative: nothing changes. Either way the mode stays
    /// `DeleteBrowsing` until toggled off. Returns whether the delete
    /// happened.
    pub async fn select_for_delete(&mut self, id: Uuid) -> Result<bool, SessionError> {
        if self.mode != EditorMode::DeleteBrowsing {
            return Err(SessionError::WrongMode {
                operation: "select a feature to delete",
                mode: self.mode.name(),
            });
        }
        let record = self
            .mirror
            .get(&id)
            .cloned()
            .ok_or(SessionError::UnknownFeature(id))?;

        self.pending_delete = Some(id);
        let confirmed = self.prompter.request_confirmation(&record.label).await;
        self.pending_delete = None;

        if !confirmed {
            return Ok(false);
        }

        self.mirror.apply_deleted(id);
        self.sender.send_delete(id).await?;
        Ok(true)
    }

    /// Reconcile a remote event against local state.
    ///
    /// Feeds the mirror; the only mode interaction is a remote deletion (or
    /// a resync that lost) the feature currently being edited, which drops
    /// the edit context back to `EditBrowsing`.
    pub fn apply_remote(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::SnapshotReceived(records) => {
                self.mirror.apply_snapshot(records);
                if let EditorMode::Editing { id, .. } = &self.mode {
                    if !self.mirror.contains(id) {
                        log::info!("edited feature {id} gone after resync, edit dropped");
                        self.mode = EditorMode::EditBrowsing;
                    }
                }
            }
            SyncEvent::RecordCreated(record) => {
                self.mirror.apply_created(record);
            }
            SyncEvent::RecordUpdated(record) => {
                self.mirror.apply_updated(record);
            }
            SyncEvent::RecordDeleted(id) => {
                self.mirror.apply_deleted(id);
                if matches!(&self.mode, EditorMode::Editing { id: editing, .. } if *editing == id) {
                    log::info!("feature {id} deleted remotely while being edited, edit dropped");
                    self.mode = EditorMode::EditBrowsing;
                }
            }
            SyncEvent::Connected => log::info!("connected to board server"),
            SyncEvent::Disconnected => log::warn!("disconnected from board server"),
            SyncEvent::PeerJoined(info) => log::info!("peer {} joined", info.name),
            SyncEvent::PeerLeft(id) => log::info!("peer {id} left"),
        }
    }

    /// How the given feature should currently be rendered.
    pub fn emphasis(&self, id: &Uuid) -> Emphasis {
        match &self.mode {
            EditorMode::Editing { id: editing, .. } => {
                if editing == id {
                    Emphasis::Highlighted
                } else {
                    Emphasis::Dimmed
                }
            }
            EditorMode::DeleteBrowsing => match &self.pending_delete {
                Some(pending) if pending == id => Emphasis::Highlighted,
                Some(_) => Emphasis::Dimmed,
                None => Emphasis::Normal,
            },
            _ => Emphasis::Normal,
        }
    }
}

/// Generated label for an unnamed feature.
fn placeholder_label(tool: Option<DrawTool>, ordinal: usize) -> String {
    match tool {
        Some(DrawTool::Freehand) => format!("Sketch {ordinal}"),
        _ => format!("Area {ordinal}"),
    }
}
