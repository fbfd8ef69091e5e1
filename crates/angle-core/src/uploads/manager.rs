//! Optimistic image manager.
//!
//! One actor task per owner holds the authoritative image list. Uploads,
//! removals and reorders are commands; their network calls run as tasks in a
//! `JoinSet` and report back to the actor, which applies results in arrival
//! order. Dropping every [`ImageManager`] handle stops the actor, aborts the
//! in-flight requests and revokes outstanding previews.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinSet;

use super::api::{UploadApi, UploadProgress};
use super::preview::PreviewStore;
use super::reorder::{move_image, restore_order};
use crate::error::{Error, Result};
use crate::models::{
    reindex_positions, Image, ImageId, ImageOwner, PendingUpload, PendingUploadId,
};
use crate::validation::{FileSelection, UploadPolicy, ValidationError};

const NOTICE_CAPACITY: usize = 64;

/// What the UI renders: confirmed images plus in-flight uploads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImageSet {
    /// Ordered by position, contiguous from 0.
    pub confirmed: Vec<Image>,
    pub pending: Vec<PendingUpload>,
    /// Images with a delete request in flight.
    pub removing: Vec<ImageId>,
    pub reorder_in_flight: bool,
}

impl ImageSet {
    /// Confirmed plus pending entries.
    pub fn occupied(&self) -> usize {
        self.confirmed.len() + self.pending.len()
    }

    pub fn is_settled(&self) -> bool {
        self.pending.is_empty() && self.removing.is_empty() && !self.reorder_in_flight
    }
}

/// Outcome of [`ImageManager::add`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddReport {
    /// Uploads started, in submission order.
    pub accepted: Vec<PendingUploadId>,
    /// Files that failed validation; never sent.
    pub rejected: Vec<ValidationError>,
    /// Valid files beyond the remaining capacity.
    pub dropped: usize,
}

/// User-facing notification about a settled operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Uploaded { file_name: String, image_id: ImageId },
    UploadFailed { file_name: String, message: String },
    RemoveFailed { image_id: ImageId, message: String },
    ReorderFailed { message: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uploaded { file_name, .. } => write!(f, "Uploaded {file_name}"),
            Self::UploadFailed { file_name, message } => {
                write!(f, "Failed to upload {file_name}: {message}")
            }
            Self::RemoveFailed { image_id, message } => {
                write!(f, "Failed to remove image {image_id}: {message}")
            }
            Self::ReorderFailed { message } => {
                write!(f, "Failed to save image order: {message}")
            }
        }
    }
}

enum Command {
    Add {
        files: Vec<FileSelection>,
        reply: oneshot::Sender<AddReport>,
    },
    Remove {
        image_id: ImageId,
        reply: oneshot::Sender<Result<()>>,
    },
    Reorder {
        from: usize,
        to: usize,
        reply: oneshot::Sender<Result<()>>,
    },
}

enum Completion {
    Upload {
        pending_id: PendingUploadId,
        preview_url: String,
        file_name: String,
        result: Result<Image>,
    },
    Remove {
        image_id: ImageId,
        result: Result<()>,
        reply: oneshot::Sender<Result<()>>,
    },
    Reorder {
        snapshot: Vec<ImageId>,
        result: Result<()>,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Handle to the image manager actor of one owner.
#[derive(Clone)]
pub struct ImageManager {
    owner: ImageOwner,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ImageSet>,
    notices: broadcast::Sender<Notice>,
    previews: PreviewStore,
}

impl fmt::Debug for ImageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageManager")
            .field("owner", &self.owner)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl ImageManager {
    /// Start a manager for `owner` seeded with its confirmed images.
    ///
    /// Avatars and store logos are always limited to a single image.
    pub fn spawn<A: UploadApi>(
        api: A,
        owner: ImageOwner,
        policy: UploadPolicy,
        mut initial: Vec<Image>,
    ) -> Self {
        let policy = if owner.is_single_image() {
            UploadPolicy {
                multiple: false,
                ..policy
            }
        } else {
            policy
        };
        initial.sort_by_key(|image| image.position);
        reindex_positions(&mut initial);

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ImageSet {
            confirmed: initial,
            ..ImageSet::default()
        });
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let previews = PreviewStore::default();

        let actor = ManagerActor {
            api: Arc::new(api),
            owner,
            policy,
            state: state_tx,
            notices: notices.clone(),
            previews: previews.clone(),
            progress_tx,
            tasks: JoinSet::new(),
        };
        tokio::spawn(actor.run(command_rx, progress_rx));

        Self {
            owner,
            commands,
            state,
            notices,
            previews,
        }
    }

    pub const fn owner(&self) -> ImageOwner {
        self.owner
    }

    pub fn snapshot(&self) -> ImageSet {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ImageSet> {
        self.state.clone()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub const fn previews(&self) -> &PreviewStore {
        &self.previews
    }

    /// Validate `files` and start uploading the ones that fit.
    ///
    /// Returns once the uploads are pending, not when they finish.
    pub async fn add(&self, files: Vec<FileSelection>) -> Result<AddReport> {
        let (reply, report) = oneshot::channel();
        self.send(Command::Add { files, reply })?;
        report.await.map_err(|_| Error::Closed("image manager"))
    }

    /// Delete an image; local state changes only after the server confirms.
    pub async fn remove(&self, image_id: ImageId) -> Result<()> {
        let (reply, result) = oneshot::channel();
        self.send(Command::Remove { image_id, reply })?;
        result.await.map_err(|_| Error::Closed("image manager"))?
    }

    /// Move the image at `from` to `to`. The new order is visible at once;
    /// the call resolves when the server accepted it or the previous order
    /// was restored.
    pub async fn reorder(&self, from: usize, to: usize) -> Result<()> {
        let (reply, result) = oneshot::channel();
        self.send(Command::Reorder { from, to, reply })?;
        result.await.map_err(|_| Error::Closed("image manager"))?
    }

    /// Wait until no upload, removal or reorder is in flight.
    pub async fn settled(&self) -> Result<ImageSet> {
        let mut state = self.state.clone();
        let settled = state
            .wait_for(ImageSet::is_settled)
            .await
            .map_err(|_| Error::Closed("image manager"))?
            .clone();
        Ok(settled)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::Closed("image manager"))
    }
}

struct ManagerActor<A> {
    api: Arc<A>,
    owner: ImageOwner,
    policy: UploadPolicy,
    state: watch::Sender<ImageSet>,
    notices: broadcast::Sender<Notice>,
    previews: PreviewStore,
    progress_tx: mpsc::UnboundedSender<(PendingUploadId, u8)>,
    tasks: JoinSet<Completion>,
}

impl<A: UploadApi> ManagerActor<A> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut progress: mpsc::UnboundedReceiver<(PendingUploadId, u8)>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => match joined {
                    Ok(completion) => self.complete(completion),
                    Err(error) => tracing::error!(owner = %self.owner, %error, "Image task failed"),
                },
                Some((pending_id, percent)) = progress.recv() => self.progress(pending_id, percent),
            }
        }

        let aborted = self.tasks.len();
        self.tasks.shutdown().await;
        let revoked = self.previews.revoke_all();
        tracing::debug!(owner = %self.owner, aborted, revoked, "Image manager stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Add { files, reply } => {
                let report = self.add(files);
                let _ = reply.send(report);
            }
            Command::Remove { image_id, reply } => self.remove(image_id, reply),
            Command::Reorder { from, to, reply } => self.reorder(from, to, reply),
        }
    }

    fn add(&mut self, files: Vec<FileSelection>) -> AddReport {
        let mut report = AddReport::default();
        let mut valid = Vec::with_capacity(files.len());
        for file in files {
            match self.policy.validate_file(&file) {
                Ok(()) => valid.push(file),
                Err(error) => {
                    tracing::info!(owner = %self.owner, %error, "Rejected file before upload");
                    report.rejected.push(error);
                }
            }
        }

        let occupied = self.state.borrow().occupied();
        let (accepted, dropped) = self.policy.fit_capacity(occupied, valid);
        report.dropped = dropped;
        if dropped > 0 {
            tracing::info!(owner = %self.owner, dropped, "Image limit reached; dropping files");
        }

        for file in accepted {
            report.accepted.push(self.start_upload(file));
        }
        report
    }

    fn start_upload(&mut self, file: FileSelection) -> PendingUploadId {
        let pending_id = PendingUploadId::new();
        let preview_url = self.previews.create(pending_id, &file);
        let file_name = file.name.clone();
        self.state.send_modify(|set| {
            set.pending.push(PendingUpload {
                id: pending_id,
                file_name: file_name.clone(),
                preview_url: preview_url.clone(),
                progress: 0,
            });
        });

        let api = Arc::clone(&self.api);
        let owner = self.owner;
        let progress_tx = self.progress_tx.clone();
        self.tasks.spawn(async move {
            let progress: UploadProgress = Arc::new(move |percent| {
                let _ = progress_tx.send((pending_id, percent));
            });
            let result = api.upload(owner, file, progress).await;
            Completion::Upload {
                pending_id,
                preview_url,
                file_name,
                result,
            }
        });
        pending_id
    }

    fn remove(&mut self, image_id: ImageId, reply: oneshot::Sender<Result<()>>) {
        let known = self
            .state
            .borrow()
            .confirmed
            .iter()
            .any(|image| image.id == image_id);
        if !known {
            let _ = reply.send(Err(Error::InvalidInput(format!(
                "image {image_id} does not belong to {}",
                self.owner
            ))));
            return;
        }
        let already_removing = self.state.borrow().removing.contains(&image_id);
        if already_removing {
            let _ = reply.send(Err(Error::Busy(format!("image {image_id} is being removed"))));
            return;
        }

        self.state.send_modify(|set| set.removing.push(image_id));
        let api = Arc::clone(&self.api);
        self.tasks.spawn(async move {
            let result = api.delete(image_id).await;
            Completion::Remove {
                image_id,
                result,
                reply,
            }
        });
    }

    fn reorder(&mut self, from: usize, to: usize, reply: oneshot::Sender<Result<()>>) {
        let ImageOwner::Item(item_id) = self.owner else {
            let _ = reply.send(Err(Error::InvalidInput(format!(
                "images of {} cannot be reordered",
                self.owner
            ))));
            return;
        };
        if self.state.borrow().reorder_in_flight {
            let _ = reply.send(Err(Error::Busy(
                "a reorder is already being saved".to_string(),
            )));
            return;
        }

        let (snapshot, reordered) = {
            let set = self.state.borrow();
            let snapshot: Vec<ImageId> = set.confirmed.iter().map(|image| image.id).collect();
            (snapshot, move_image(&set.confirmed, from, to))
        };
        let reordered = match reordered {
            Ok(reordered) => reordered,
            Err(error) => {
                let _ = reply.send(Err(error));
                return;
            }
        };
        if from == to {
            let _ = reply.send(Ok(()));
            return;
        }

        let image_ids: Vec<ImageId> = reordered.iter().map(|image| image.id).collect();
        self.state.send_modify(|set| {
            set.confirmed = reordered;
            set.reorder_in_flight = true;
        });

        let api = Arc::clone(&self.api);
        self.tasks.spawn(async move {
            let result = api.reorder(item_id, image_ids).await;
            Completion::Reorder {
                snapshot,
                result,
                reply,
            }
        });
    }

    fn progress(&self, pending_id: PendingUploadId, percent: u8) {
        self.state.send_if_modified(|set| {
            match set.pending.iter_mut().find(|pending| pending.id == pending_id) {
                Some(pending) if pending.progress != percent => {
                    pending.progress = percent;
                    true
                }
                _ => false,
            }
        });
    }

    fn complete(&self, completion: Completion) {
        match completion {
            Completion::Upload {
                pending_id,
                preview_url,
                file_name,
                result,
            } => {
                self.previews.revoke(&preview_url);
                let confirmed = result.as_ref().ok().cloned();
                self.state.send_modify(|set| {
                    set.pending.retain(|pending| pending.id != pending_id);
                    if let Some(image) = confirmed {
                        if !set.confirmed.iter().any(|known| known.id == image.id) {
                            set.confirmed.push(image);
                        }
                        reindex_positions(&mut set.confirmed);
                    }
                });
                match result {
                    Ok(image) => {
                        tracing::info!(owner = %self.owner, image_id = %image.id, file = %file_name, "Upload confirmed");
                        self.notify(Notice::Uploaded {
                            file_name,
                            image_id: image.id,
                        });
                    }
                    Err(error) => {
                        tracing::warn!(owner = %self.owner, file = %file_name, %error, "Upload failed");
                        self.notify(Notice::UploadFailed {
                            file_name,
                            message: error.to_string(),
                        });
                    }
                }
            }
            Completion::Remove {
                image_id,
                result,
                reply,
            } => {
                let removed = result.is_ok();
                self.state.send_modify(|set| {
                    set.removing.retain(|id| *id != image_id);
                    if removed {
                        set.confirmed.retain(|image| image.id != image_id);
                        reindex_positions(&mut set.confirmed);
                    }
                });
                if let Err(error) = &result {
                    tracing::warn!(owner = %self.owner, %image_id, %error, "Image removal failed");
                    self.notify(Notice::RemoveFailed {
                        image_id,
                        message: error.to_string(),
                    });
                }
                let _ = reply.send(result);
            }
            Completion::Reorder {
                snapshot,
                result,
                reply,
            } => {
                let failed = result.is_err();
                self.state.send_modify(|set| {
                    set.reorder_in_flight = false;
                    if failed {
                        set.confirmed = restore_order(&snapshot, &set.confirmed);
                    }
                });
                if let Err(error) = &result {
                    tracing::warn!(owner = %self.owner, %error, "Reorder rejected; restored previous order");
                    self.notify(Notice::ReorderFailed {
                        message: error.to_string(),
                    });
                }
                let _ = reply.send(result);
            }
        }
    }

    fn notify(&self, notice: Notice) {
        // Nobody listening is fine.
        let _ = self.notices.send(notice);
    }
}
