//! Domain types shared by the pipeline stages.

mod feedback;
mod finding;
mod mapping;
mod version;

pub use feedback::{FeedbackEntry, FeedbackKind, FeedbackUpdate, InstanceFeedback, Stored};
pub use finding::{ErrorGroup, Finding, InvalidFinding, MissingFinding};
pub use mapping::Mapping;
pub use version::{Version, VersionDetail, VersionStatus};
