//! File transfers.
//!
//! Outgoing transfers start in `Preparing`. Incoming transfers start in
//! `Waiting` until they are accepted or rejected. Nothing is actually
//! transmitted: progress and completion are driven by the caller.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use commspi_core::ListenerRegistry;
use tracing::{debug, info};

use super::contact::Contact;
use super::context::{ProviderContext, next_id};
use crate::error::{OperationFailed, ProviderResult};
use crate::operation_set::{OperationSet, OperationSetKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileTransferDirection {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileTransferStatus {
    Preparing,
    Waiting,
    InProgress,
    Completed,
    Canceled,
    Refused,
    Failed,
}

impl FileTransferStatus {
    /// Returns true once the transfer can no longer change.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Canceled | Self::Refused | Self::Failed
        )
    }
}

#[derive(Debug, Clone)]
pub struct FileTransferStatusChangeEvent {
    pub transfer: Arc<FileTransfer>,
    pub old_status: FileTransferStatus,
    pub new_status: FileTransferStatus,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

pub trait FileTransferStatusListener: Send + Sync {
    fn status_changed(&self, event: &FileTransferStatusChangeEvent);
}

#[derive(Debug)]
struct TransferState {
    status: FileTransferStatus,
    transferred: u64,
}

/// A single file moving between the local user and a contact.
#[derive(Debug)]
pub struct FileTransfer {
    id: String,
    contact: Arc<Contact>,
    direction: FileTransferDirection,
    file_name: String,
    size: u64,
    state: Mutex<TransferState>,
    listeners: ListenerRegistry<dyn FileTransferStatusListener>,
}

impl FileTransfer {
    fn new(
        contact: &Arc<Contact>,
        direction: FileTransferDirection,
        file_name: &str,
        size: u64,
        status: FileTransferStatus,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: next_id(),
            contact: contact.clone(),
            direction,
            file_name: file_name.to_string(),
            size,
            state: Mutex::new(TransferState {
                status,
                transferred: 0,
            }),
            listeners: ListenerRegistry::new(),
        })
    }

    fn state(&self) -> MutexGuard<'_, TransferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn contact(&self) -> &Arc<Contact> {
        &self.contact
    }

    pub fn direction(&self) -> FileTransferDirection {
        self.direction
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn status(&self) -> FileTransferStatus {
        self.state().status
    }

    pub fn transferred_bytes(&self) -> u64 {
        self.state().transferred
    }

    /// Records progress. Values beyond the file size are clamped.
    pub fn set_transferred_bytes(&self, bytes: u64) {
        self.state().transferred = bytes.min(self.size);
    }

    /// Moves the transfer to `new_status`. Setting the current status again
    /// does nothing, and a transfer in a final status keeps it.
    pub fn change_status(self: &Arc<Self>, new_status: FileTransferStatus, reason: Option<&str>) {
        let old_status = {
            let mut state = self.state();
            if state.status == new_status {
                return;
            }
            if state.status.is_final() {
                debug!(
                    transfer = %self.id,
                    status = ?state.status,
                    ?new_status,
                    "Ignoring status change of finished transfer"
                );
                return;
            }
            if new_status == FileTransferStatus::Completed {
                state.transferred = self.size;
            }
            std::mem::replace(&mut state.status, new_status)
        };
        debug!(transfer = %self.id, ?old_status, ?new_status, "File transfer status changed");

        let event = FileTransferStatusChangeEvent {
            transfer: self.clone(),
            old_status,
            new_status,
            reason: reason.map(str::to_string),
            timestamp: Utc::now(),
        };
        self.listeners.dispatch(|l| l.status_changed(&event));
    }

    pub fn add_status_listener(&self, listener: Arc<dyn FileTransferStatusListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_status_listener(&self, listener: &Arc<dyn FileTransferStatusListener>) {
        self.listeners.remove(listener);
    }
}

impl fmt::Display for FileTransfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes) {:?}", self.file_name, self.size, self.direction)
    }
}

#[derive(Debug, Clone)]
pub struct FileTransferEvent {
    pub transfer: Arc<FileTransfer>,
    pub timestamp: DateTime<Utc>,
}

/// Receives transfer requests and newly started transfers.
pub trait FileTransferListener: Send + Sync {
    fn file_transfer_request_received(&self, _event: &FileTransferEvent) {}
    fn file_transfer_request_rejected(&self, _event: &FileTransferEvent) {}
    fn file_transfer_created(&self, _event: &FileTransferEvent) {}
}

/// File transfer operation set of the mock provider.
#[derive(Debug)]
pub struct FileTransferOperations {
    context: Arc<ProviderContext>,
    listeners: ListenerRegistry<dyn FileTransferListener>,
}

impl FileTransferOperations {
    pub(crate) fn new(context: Arc<ProviderContext>) -> Self {
        Self {
            context,
            listeners: ListenerRegistry::new(),
        }
    }

    /// Largest file this provider accepts, in bytes.
    pub fn maximum_file_length(&self) -> u64 {
        self.context.config().max_file_length
    }

    /// Starts sending `file_name` to `to`.
    ///
    /// # Errors
    ///
    /// Fails with `ProviderNotRegistered` when the provider is signed off
    /// and with `IllegalArgument` when the file exceeds
    /// [`maximum_file_length`](Self::maximum_file_length).
    pub fn send_file(
        &self,
        to: &Arc<Contact>,
        file_name: &str,
        size: u64,
    ) -> ProviderResult<Arc<FileTransfer>> {
        self.context.ensure_registered("send a file")?;
        self.check_size(file_name, size)?;

        let transfer = FileTransfer::new(
            to,
            FileTransferDirection::Outgoing,
            file_name,
            size,
            FileTransferStatus::Preparing,
        );
        info!(to = %to.address(), file = %file_name, size, "Sending file");
        self.fire(&transfer, |l, e| l.file_transfer_created(e));
        Ok(transfer)
    }

    /// Simulates `from` offering `file_name`.
    ///
    /// # Errors
    ///
    /// Fails with `IllegalArgument` when the file exceeds
    /// [`maximum_file_length`](Self::maximum_file_length).
    pub fn receive_file(
        &self,
        from: &Arc<Contact>,
        file_name: &str,
        size: u64,
    ) -> ProviderResult<Arc<FileTransfer>> {
        self.check_size(file_name, size)?;
        let transfer = FileTransfer::new(
            from,
            FileTransferDirection::Incoming,
            file_name,
            size,
            FileTransferStatus::Waiting,
        );
        info!(from = %from.address(), file = %file_name, size, "File offered");
        self.fire(&transfer, |l, e| l.file_transfer_request_received(e));
        Ok(transfer)
    }

    /// Accepts an incoming request and starts the transfer.
    pub fn accept(&self, transfer: &Arc<FileTransfer>) {
        if transfer.status() != FileTransferStatus::Waiting {
            return;
        }
        transfer.change_status(FileTransferStatus::InProgress, None);
        self.fire(transfer, |l, e| l.file_transfer_created(e));
    }

    /// Rejects an incoming request.
    pub fn reject(&self, transfer: &Arc<FileTransfer>) {
        if transfer.status() != FileTransferStatus::Waiting {
            return;
        }
        transfer.change_status(FileTransferStatus::Refused, None);
        self.fire(transfer, |l, e| l.file_transfer_request_rejected(e));
    }

    pub fn add_file_transfer_listener(&self, listener: Arc<dyn FileTransferListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_file_transfer_listener(&self, listener: &Arc<dyn FileTransferListener>) {
        self.listeners.remove(listener);
    }

    fn check_size(&self, file_name: &str, size: u64) -> ProviderResult<()> {
        let max = self.maximum_file_length();
        if size > max {
            return Err(OperationFailed::illegal_argument(format!(
                "{file_name} is {size} bytes, the limit is {max}"
            ))
            .with_provider(self.context.protocol_name()));
        }
        Ok(())
    }

    fn fire<F>(&self, transfer: &Arc<FileTransfer>, notify: F)
    where
        F: Fn(&dyn FileTransferListener, &FileTransferEvent),
    {
        let event = FileTransferEvent {
            transfer: transfer.clone(),
            timestamp: Utc::now(),
        };
        self.listeners.dispatch(|l| notify(l, &event));
    }
}

impl OperationSet for FileTransferOperations {
    fn kind(&self) -> OperationSetKind {
        OperationSetKind::FileTransfer
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OperationFailedCode;
    use crate::mock::config::MockProviderConfig;

    #[derive(Default)]
    struct Recorder {
        log: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.log.lock().unwrap())
        }
    }

    impl FileTransferListener for Recorder {
        fn file_transfer_request_received(&self, e: &FileTransferEvent) {
            self.log.lock().unwrap().push(format!("request {}", e.transfer.file_name()));
        }

        fn file_transfer_request_rejected(&self, e: &FileTransferEvent) {
            self.log.lock().unwrap().push(format!("rejected {}", e.transfer.file_name()));
        }

        fn file_transfer_created(&self, e: &FileTransferEvent) {
            self.log.lock().unwrap().push(format!("created {}", e.transfer.file_name()));
        }
    }

    impl FileTransferStatusListener for Recorder {
        fn status_changed(&self, e: &FileTransferStatusChangeEvent) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{:?} -> {:?}", e.old_status, e.new_status));
        }
    }

    fn transfers(config: MockProviderConfig) -> (FileTransferOperations, Arc<Recorder>) {
        let ops = FileTransferOperations::new(Arc::new(ProviderContext::new(config)));
        let recorder = Arc::new(Recorder::default());
        ops.add_file_transfer_listener(recorder.clone());
        (ops, recorder)
    }

    #[test]
    fn outgoing_transfer() {
        let (ops, recorder) = transfers(MockProviderConfig::default());
        let bob = Contact::new("bob");

        let transfer = ops.send_file(&bob, "notes.txt", 1200).unwrap();
        transfer.add_status_listener(recorder.clone());
        assert_eq!(transfer.direction(), FileTransferDirection::Outgoing);
        assert_eq!(transfer.status(), FileTransferStatus::Preparing);

        transfer.change_status(FileTransferStatus::InProgress, None);
        transfer.set_transferred_bytes(600);
        assert_eq!(transfer.transferred_bytes(), 600);
        transfer.change_status(FileTransferStatus::Completed, None);
        transfer.change_status(FileTransferStatus::Completed, None);

        assert_eq!(transfer.transferred_bytes(), 1200);
        assert!(transfer.status().is_final());
        assert_eq!(
            recorder.take(),
            vec![
                "created notes.txt",
                "Preparing -> InProgress",
                "InProgress -> Completed",
            ]
        );
    }

    #[test]
    fn incoming_accept_and_reject() {
        let (ops, recorder) = transfers(MockProviderConfig::default());
        let carol = Contact::new("carol");

        let photo = ops.receive_file(&carol, "photo.png", 10).unwrap();
        let song = ops.receive_file(&carol, "song.ogg", 10).unwrap();
        ops.accept(&photo);
        ops.reject(&song);
        ops.reject(&photo);

        assert_eq!(photo.status(), FileTransferStatus::InProgress);
        assert_eq!(song.status(), FileTransferStatus::Refused);
        assert_eq!(
            recorder.take(),
            vec![
                "request photo.png",
                "request song.ogg",
                "created photo.png",
                "rejected song.ogg",
            ]
        );
    }

    #[test]
    fn oversized_files_are_rejected() {
        let (ops, recorder) = transfers(MockProviderConfig::default().with_max_file_length(100));
        let err = ops.send_file(&Contact::new("bob"), "big.iso", 101).unwrap_err();
        assert_eq!(err.code(), OperationFailedCode::IllegalArgument);
        assert_eq!(ops.maximum_file_length(), 100);
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn sending_requires_registration() {
        let (ops, _) = transfers(MockProviderConfig::default().with_start_registered(false));
        let err = ops.send_file(&Contact::new("bob"), "a.txt", 1).unwrap_err();
        assert_eq!(err.code(), OperationFailedCode::ProviderNotRegistered);
    }

    #[test]
    fn transferred_bytes_are_clamped() {
        let (ops, _) = transfers(MockProviderConfig::default());
        let transfer = ops.send_file(&Contact::new("bob"), "a.txt", 5).unwrap();
        transfer.set_transferred_bytes(50);
        assert_eq!(transfer.transferred_bytes(), 5);
        insta::assert_snapshot!(transfer.to_string(), @"a.txt (5 bytes) Outgoing");
    }

    #[test]
    fn finished_transfers_keep_their_status() {
        let (ops, recorder) = transfers(MockProviderConfig::default());
        let transfer = ops.send_file(&Contact::new("bob"), "a.txt", 5).unwrap();
        transfer.add_status_listener(recorder.clone());
        recorder.take();

        transfer.change_status(FileTransferStatus::Completed, None);
        transfer.change_status(FileTransferStatus::InProgress, None);
        transfer.change_status(FileTransferStatus::Failed, Some("late error"));

        assert_eq!(transfer.status(), FileTransferStatus::Completed);
        assert_eq!(transfer.transferred_bytes(), 5);
        assert_eq!(recorder.take(), vec!["Preparing -> Completed"]);
    }
}
