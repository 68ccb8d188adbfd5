mod ids;
mod query;
mod status;
mod task;

pub use ids::TaskId;
pub use query::{
    DueCondition, DueDateFilter, DueDateRange, ExpandedKeyword, ParsedQuery, QUERY_LANGUAGE,
    RangeOperator,
};
pub use status::{OTHER_CATEGORY, StatusCategories, StatusCategory};
pub use task::{Task, TaskBuilder};
