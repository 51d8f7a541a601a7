pub mod config;
pub mod counter;
pub mod error;
pub mod factory;
pub mod playlist;
pub mod properties;
pub mod recorder;
pub mod results;
pub mod sequencer;
pub mod state;

pub use config::{
    BlockSettings, ExperimentConfig, FileSource, MediaKind, ResponseMode, StatusTexts,
};
pub use counter::{Step, TrialCounter};
pub use error::{ConfigError, ExperimentError, PropertyError, ResponseError};
pub use factory::{BlockPrototype, TrialCatalog, TrialFactory, TrialProduct, TrialSet};
pub use properties::PropertyStore;
pub use recorder::ResponseRecorder;
pub use results::{CsvResultsWriter, TrialSink};
pub use sequencer::{BlockInstance, BlockSchedule, BlockSequencer};
pub use state::{
    ExperimentEvent, ExperimentStateMachine, Playback, Presentation, SessionInfo, StateListener,
};
