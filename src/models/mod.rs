mod analysis;
mod session;

pub use analysis::{AnalysisRecord, Expression};
pub use session::{instant_after, FocusSession};
