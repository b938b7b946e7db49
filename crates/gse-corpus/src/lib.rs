pub mod eval;
pub mod select;
pub mod topics;
pub mod training;
pub mod validation;

pub use eval::{Evaluation, ScoredPair};
pub use select::{
    ChooserError, Definition, RetryPolicy, SelectStats, SelectedMeaning, SenseChooser,
    SenseGroup, build_prompt, group_candidates, select_meaning, select_meanings,
};
pub use topics::{
    AttachStats, KnowledgeRow, TopicLineError, TopicTable, TopicWord, attach_knowledge,
    parse_topic_words,
};
pub use training::{TrainingRow, TrainingStats, generate_training_data};
pub use validation::{DistilRecord, ValidationRow, ValidationStats, generate_validation_data};
