//! Edit sessions for Gridpad documents.
//!
//! One [`EditSession`] owns the live state of one open document: the grid
//! (or rich-text document), its cell metadata, the dirty flag, and the save
//! state. All mutations flow through the session; the [`AutoSaveManager`]
//! debounces them into single-flight, timeout-bounded saves.

mod autosave;
mod error;
mod session;

pub use autosave::{AutoSaveConfig, AutoSaveManager};
pub use error::SessionError;
pub use session::{
    EditOutcome, EditSession, FormatChange, LoadedContent, SaveOutcome, SaveState, SessionConfig,
};
