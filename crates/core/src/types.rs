/// Run identifiers are UUID v4, generated when a run is requested.
pub type RunId = uuid::Uuid;

/// Operation identifiers correlate a connection's event stream to one
/// logical run. UUID v4, bound at `run-started`.
pub type OperationId = uuid::Uuid;

/// Connection identities are opaque tokens (UUID v4 in text form).
pub type ConnectionId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
