use thiserror::Error;

/// Everything that can go wrong while building or submitting a route. All of these are meant to
/// be shown to the user as-is.
#[derive(Error, Debug, PartialEq)]
pub enum RecorderError {
    #[error("No road found near that point. Click closer to a road, or turn off routing.")]
    Snapping,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The storage collaborator's reason, verbatim
    #[error("{0}")]
    DuplicateRun(String),
    #[error("Network failure: {0}")]
    NetworkFailure(String),
    #[error("The route changed while waiting for a routing response; ignoring the response")]
    StaleRoute,
    #[error("The routing response refers to an unknown segment: {0}")]
    UnresolvedTraversal(String),
    #[error("Nothing to redo")]
    NothingToRedo,
}

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Can't submit a run with no distance")]
    ZeroDistance,
    #[error("Please set a duration")]
    MissingDuration,
    #[error("Duration must be longer than zero")]
    ZeroDuration,
    #[error("Duration {0:?} should have format HH:MM:SS.sss")]
    InvalidDuration(String),
    #[error("Date {0:?} should be a real date with format YYYY-MM-DD, e.g. '2021-06-01'")]
    InvalidDate(String),
}
