pub mod block;
pub mod position;
pub mod response;
pub mod state;
pub mod trial;

pub use block::{BlockMap, BlockType};
pub use position::Position;
pub use response::{BinaryAnswer, Response, ResponseDraft};
pub use state::ExperimentState;
pub use trial::{PresentationTimings, RecordIdentity, TrialRecord, TrialSpec};
