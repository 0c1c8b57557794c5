//! Tasks: one request/response pair tracked from enqueue to completion.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::action::{Action, ProgressThrottle};
use crate::buffer::ReceiveBuffer;
use crate::error::TransferError;
use crate::locator::Locator;

/// Unique, monotonically assigned identity of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Mark(u64);

impl Mark {
    /// Get the raw u64 value of this mark.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Global counter for generating marks.
static NEXT_MARK: AtomicU64 = AtomicU64::new(0);

fn next_mark() -> Mark {
    Mark(NEXT_MARK.fetch_add(1, Ordering::Relaxed))
}

/// HTTP methods supported by the runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    /// HTTP GET method.
    Get,
    /// HTTP POST method with a multipart body.
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

/// How an upload field's value is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// The value is sent as the part's content.
    Text,
    /// The value is a path; the file's contents are sent.
    File,
}

/// One field of a multipart POST body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadField {
    kind: FieldKind,
    key: String,
    value: String,
    file_name: Option<String>,
}

impl UploadField {
    /// A plain text field.
    pub fn text(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: FieldKind::Text,
            key: key.into(),
            value: value.into(),
            file_name: None,
        }
    }

    /// A file field whose contents are read from `path` at transfer time.
    pub fn file(key: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            kind: FieldKind::File,
            key: key.into(),
            value: path.as_ref().to_string_lossy().into_owned(),
            file_name: None,
        }
    }

    /// Set the filename reported for this part.
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// The field kind.
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// The form field name.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The text content, or the file path for [`FieldKind::File`].
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The explicit filename, if any.
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }
}

/// What to send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    locator: Locator,
    method: Method,
    fields: Vec<UploadField>,
}

impl Request {
    /// A GET request.
    pub fn get(locator: impl Into<Locator>) -> Self {
        Self {
            locator: locator.into(),
            method: Method::Get,
            fields: Vec::new(),
        }
    }

    /// A multipart POST request.
    pub fn post(locator: impl Into<Locator>, fields: Vec<UploadField>) -> Self {
        Self {
            locator: locator.into(),
            method: Method::Post,
            fields,
        }
    }

    /// The target locator.
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// The HTTP method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Upload fields (empty for GET).
    pub fn fields(&self) -> &[UploadField] {
        &self.fields
    }
}

/// Final outcome of a task.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum TaskStatus {
    /// The task has not finished yet.
    #[default]
    Pending,
    /// The transfer completed. Any HTTP status, including 4xx and 5xx.
    Completed {
        /// HTTP status code returned by the server.
        http_status: u16,
    },
    /// The transfer failed.
    Failed(TransferError),
}

impl TaskStatus {
    /// Check if the transfer completed.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// The HTTP status code, if the transfer completed.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Completed { http_status } => Some(*http_status),
            _ => None,
        }
    }

    /// The failure, if the transfer failed.
    pub fn error(&self) -> Option<&TransferError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// What was received.
#[derive(Debug, Default)]
pub struct Response {
    body: ReceiveBuffer,
    download_total: Option<u64>,
    status: TaskStatus,
}

impl Response {
    /// The body received so far.
    pub fn body(&self) -> &[u8] {
        self.body.as_bytes()
    }

    /// The body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.body.as_bytes())
    }

    /// The receive buffer.
    pub fn buffer(&self) -> &ReceiveBuffer {
        &self.body
    }

    /// Total download size, once the engine has reported one.
    pub fn download_total(&self) -> Option<u64> {
        self.download_total
    }

    /// The final status.
    pub fn status(&self) -> &TaskStatus {
        &self.status
    }

    /// Record the total download size the first time a nonzero value is seen.
    pub(crate) fn note_download_total(&mut self, total: u64) {
        if self.download_total.is_none() && total > 0 {
            self.download_total = Some(total);
        }
    }

    /// Append a received chunk, reserving the declared total first if known.
    pub(crate) fn receive(&mut self, chunk: &[u8]) -> Result<(), TransferError> {
        if let Some(total) = self.download_total {
            self.body.reserve_total(total)?;
        }
        self.body.append(chunk)?;
        Ok(())
    }

    pub(crate) fn finish(&mut self, result: Result<u16, TransferError>) {
        self.status = match result {
            Ok(http_status) => TaskStatus::Completed { http_status },
            Err(err) => TaskStatus::Failed(err),
        };
    }
}

/// Opaque caller data carried by a task and dropped with it.
pub type UserData = Box<dyn Any + Send>;

/// One request/response unit.
///
/// A task starts unhandled, becomes handled exactly once when the executor
/// admits it, and is dropped after its [`Action::done`] callback returns.
pub struct Task {
    mark: Mark,
    request: Request,
    response: Response,
    action: Arc<dyn Action>,
    user_data: Option<UserData>,
    handled: bool,
    throttle: ProgressThrottle,
}

impl Task {
    /// Create a task with a fresh mark.
    pub fn new(request: Request, action: Arc<dyn Action>) -> Self {
        Self {
            mark: next_mark(),
            request,
            response: Response::default(),
            action,
            user_data: None,
            handled: false,
            throttle: ProgressThrottle::default(),
        }
    }

    /// Attach caller data.
    pub fn with_user_data(mut self, user_data: Option<UserData>) -> Self {
        self.user_data = user_data;
        self
    }

    /// The task's mark.
    pub fn mark(&self) -> Mark {
        self.mark
    }

    /// The request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The response.
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// The attached action.
    pub fn action(&self) -> &Arc<dyn Action> {
        &self.action
    }

    /// Whether the task has been admitted to the transfer engine.
    pub fn is_handled(&self) -> bool {
        self.handled
    }

    /// Caller data downcast to `T`.
    pub fn user_data<T: Any>(&self) -> Option<&T> {
        self.user_data.as_deref()?.downcast_ref::<T>()
    }

    pub(crate) fn mark_handled(&mut self) {
        self.handled = true;
    }

    pub(crate) fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    pub(crate) fn throttle_mut(&mut self) -> &mut ProgressThrottle {
        &mut self.throttle
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("mark", &self.mark)
            .field("request", &self.request)
            .field("response", &self.response)
            .field("handled", &self.handled)
            .finish_non_exhaustive()
    }
}
