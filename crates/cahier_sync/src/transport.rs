//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use cahier_protocol::{LogSubmission, PullRequest, PullResponse, PushRequest, PushResponse};
use parking_lot::Mutex;

/// Network communication with the remote authority.
///
/// Abstracts the HTTP layer so the engines can be driven against a mock
/// in tests. The bearer credential is the implementation's concern; the
/// engines only verify it exists before calling.
pub trait SyncTransport: Send + Sync {
    /// Submits an outbound batch of pending changes.
    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse>;

    /// Requests the delta since the given instant.
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse>;

    /// Reports a cycle outcome. Best-effort; callers must tolerate
    /// failure.
    fn submit_log(&self, submission: &LogSubmission) -> SyncResult<()>;
}

/// A mock transport for testing.
///
/// Responses are preset and reused; every request is recorded for
/// assertions.
#[derive(Default)]
pub struct MockTransport {
    connected: std::sync::atomic::AtomicBool,
    push_response: Mutex<Option<PushResponse>>,
    pull_response: Mutex<Option<PullResponse>>,
    push_requests: Mutex<Vec<PushRequest>>,
    pull_requests: Mutex<Vec<PullRequest>>,
    log_submissions: Mutex<Vec<LogSubmission>>,
}

impl MockTransport {
    /// Creates a connected mock with no preset responses.
    pub fn new() -> Self {
        let transport = Self::default();
        transport
            .connected
            .store(true, std::sync::atomic::Ordering::SeqCst);
        transport
    }

    /// Presets the push response.
    pub fn set_push_response(&self, response: PushResponse) {
        *self.push_response.lock() = Some(response);
    }

    /// Presets the pull response.
    pub fn set_pull_response(&self, response: PullResponse) {
        *self.pull_response.lock() = Some(response);
    }

    /// Simulates losing or regaining connectivity.
    pub fn set_connected(&self, connected: bool) {
        self.connected
            .store(connected, std::sync::atomic::Ordering::SeqCst);
    }

    /// Push requests seen so far.
    pub fn push_requests(&self) -> Vec<PushRequest> {
        self.push_requests.lock().clone()
    }

    /// Pull requests seen so far.
    pub fn pull_requests(&self) -> Vec<PullRequest> {
        self.pull_requests.lock().clone()
    }

    /// Log submissions seen so far.
    pub fn log_submissions(&self) -> Vec<LogSubmission> {
        self.log_submissions.lock().clone()
    }

    fn check_connected(&self) -> SyncResult<()> {
        if self.connected.load(std::sync::atomic::Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::connectivity("mock transport offline"))
        }
    }
}

impl SyncTransport for MockTransport {
    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.check_connected()?;
        self.push_requests.lock().push(request.clone());
        self.push_response
            .lock()
            .clone()
            .ok_or_else(|| SyncError::Server("no mock push response set".into()))
    }

    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        self.check_connected()?;
        self.pull_requests.lock().push(request.clone());
        self.pull_response
            .lock()
            .clone()
            .ok_or_else(|| SyncError::Server("no mock pull response set".into()))
    }

    fn submit_log(&self, submission: &LogSubmission) -> SyncResult<()> {
        self.check_connected()?;
        self.log_submissions.lock().push(submission.clone());
        Ok(())
    }
}
